use crate::cascade;
use crate::codes;
use crate::error::CoreError;
use crate::ipc::helpers::{
    begin, commit, db_conn, get_nullable_str, get_optional_bool, get_optional_str,
    get_required_str, get_str_list, respond, to_json, HandlerErr, HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{now_timestamp, Role};
use crate::store;
use crate::sync;
use serde_json::json;

fn parse_role_param(params: &serde_json::Value) -> Result<Role, HandlerErr> {
    let raw = get_required_str(params, "role")?;
    Ok(Role::parse(&raw)?)
}

/// `role` may be absent or `"all"`.
fn parse_role_filter(params: &serde_json::Value) -> Result<Option<Role>, HandlerErr> {
    match get_optional_str(params, "role")? {
        None => Ok(None),
        Some(r) if r.is_empty() || r.eq_ignore_ascii_case("all") => Ok(None),
        Some(r) => Ok(Some(Role::parse(&r)?)),
    }
}

fn handle_generate_code(_state: &mut AppState, req: &Request) -> HandlerResult {
    let raw = get_optional_str(&req.params, "role")?;
    let role = Role::for_code(raw.as_deref());
    let code = codes::generate_code(role, &mut rand::rng());
    Ok(json!({ "code": code, "role": role }))
}

fn handle_create(state: &mut AppState, req: &Request) -> HandlerResult {
    let max_attempts = state.config.max_code_attempts;
    let conn = db_conn(state)?;
    let params = &req.params;

    let name = get_required_str(params, "name")?;
    let role = parse_role_param(params)?;
    let supplied_id = get_optional_str(params, "userId")?.filter(|s| !s.is_empty());
    let email = get_optional_str(params, "email")?.filter(|s| !s.is_empty());
    let avatar = get_optional_str(params, "avatar")?.unwrap_or_default();
    let class_id = get_optional_str(params, "classId")?.filter(|s| !s.is_empty());
    let parent_id = get_optional_str(params, "parentId")?.filter(|s| !s.is_empty());
    let subject = get_optional_str(params, "subject")?.filter(|s| !s.is_empty());
    let class_ids = get_str_list(params, "classIds")?;

    if role != Role::Student && (class_id.is_some() || parent_id.is_some()) {
        return Err(HandlerErr::bad_params(
            "classId and parentId only apply to students",
        ));
    }
    if role != Role::Teacher && (subject.is_some() || class_ids.is_some()) {
        return Err(HandlerErr::bad_params(
            "subject and classIds only apply to teachers",
        ));
    }
    if subject.is_some() && class_ids.is_some() {
        return Err(HandlerErr::bad_params(
            "classIds are derived from subject; send one or the other",
        ));
    }

    let tx = begin(conn)?;

    let code = match supplied_id {
        Some(id) => {
            if store::user_exists(&tx, &id)? {
                return Err(CoreError::Conflict(format!("user id {} is taken", id)).into());
            }
            id
        }
        None => codes::allocate_user_code(&tx, role, max_attempts, &mut rand::rng())?,
    };

    if let Some(cid) = class_id.as_deref() {
        if !store::class_exists(&tx, cid)? {
            tx.execute(
                "INSERT INTO classes(id, name, created_at) VALUES(?, ?, ?)",
                (cid, cid, now_timestamp()),
            )?;
            log::info!("created class {} for student {}", cid, code);
        }
    }

    tx.execute(
        "INSERT INTO users(id, name, role, email, avatar, class_id, subject, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &code,
            &name,
            role.as_str(),
            &email,
            &avatar,
            &class_id,
            &subject,
            now_timestamp(),
        ),
    )?;

    if let Some(pid) = parent_id.as_deref() {
        sync::assign_student_to_parent_in(&tx, &code, pid)?;
    }
    if role == Role::Teacher {
        if subject.is_some() {
            sync::sync_teacher_to_classes_by_subject_in(&tx, &code)?;
        } else if let Some(ids) = class_ids.as_deref() {
            sync::set_teacher_classes_in(&tx, &code, ids)?;
        }
    }

    let user = store::require_user(&tx, &code)?;
    commit(tx)?;
    log::info!("created {} {}", role, code);
    Ok(json!({ "code": code, "user": to_json(&user)? }))
}

fn handle_list(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    let role = parse_role_filter(&req.params)?;
    let users = store::list_users(conn, role)?;
    Ok(json!({ "users": to_json(&users)? }))
}

fn handle_get(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    let user_id = get_required_str(&req.params, "userId")?;
    let user = store::require_user(conn, &user_id)?;
    Ok(json!({ "user": to_json(&user)? }))
}

/// The admin code sheet: identity and links, without avatar or email.
fn handle_codes(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    let role = parse_role_filter(&req.params)?;
    let codes: Vec<serde_json::Value> = store::list_users(conn, role)?
        .into_iter()
        .map(|u| {
            json!({
                "id": u.id,
                "name": u.name,
                "role": u.role,
                "classId": u.class_id,
                "parentId": u.parent_id,
                "childrenIds": u.children_ids,
                "subject": u.subject,
                "classIds": u.class_ids,
            })
        })
        .collect();
    Ok(json!({ "codes": codes }))
}

fn handle_update(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    let params = &req.params;
    let user_id = get_required_str(params, "userId")?;

    let name = get_optional_str(params, "name")?;
    let avatar = get_optional_str(params, "avatar")?;
    let email = get_nullable_str(params, "email")?;
    let messaging = get_optional_bool(params, "messagingAvailability")?;
    let class_id = get_nullable_str(params, "classId")?;
    let subject = get_nullable_str(params, "subject")?;
    let class_ids = get_str_list(params, "classIds")?;

    let tx = begin(conn)?;
    let user = store::require_user(&tx, &user_id)?;

    if class_id.is_some() && user.role != Role::Student {
        return Err(HandlerErr::bad_params("classId only applies to students"));
    }
    if (subject.is_some() || class_ids.is_some()) && user.role != Role::Teacher {
        return Err(HandlerErr::bad_params(
            "subject and classIds only apply to teachers",
        ));
    }

    if let Some(name) = name {
        if name.is_empty() {
            return Err(HandlerErr::bad_params("name must not be empty"));
        }
        tx.execute("UPDATE users SET name = ? WHERE id = ?", (&name, &user_id))?;
    }
    if let Some(avatar) = avatar {
        tx.execute("UPDATE users SET avatar = ? WHERE id = ?", (&avatar, &user_id))?;
    }
    if let Some(email) = email {
        tx.execute("UPDATE users SET email = ? WHERE id = ?", (&email, &user_id))?;
    }
    if let Some(m) = messaging {
        tx.execute(
            "UPDATE users SET messaging_availability = ? WHERE id = ?",
            (m as i64, &user_id),
        )?;
    }
    if let Some(class_id) = class_id {
        if let Some(cid) = class_id.as_deref() {
            if !store::class_exists(&tx, cid)? {
                return Err(CoreError::not_found("class", cid).into());
            }
        }
        tx.execute(
            "UPDATE users SET class_id = ? WHERE id = ?",
            (&class_id, &user_id),
        )?;
    }

    let mut teacher_sync = None;
    if let Some(subject) = subject {
        tx.execute(
            "UPDATE users SET subject = ? WHERE id = ?",
            (&subject, &user_id),
        )?;
        if subject.is_some() {
            teacher_sync = Some(sync::sync_teacher_to_classes_by_subject_in(&tx, &user_id)?);
        } else {
            // Classes derived from the old subject go with it.
            sync::set_teacher_classes_in(&tx, &user_id, &[])?;
        }
    }
    if let Some(ids) = class_ids {
        if store::require_user(&tx, &user_id)?.subject.is_some() {
            return Err(HandlerErr::bad_params(
                "classIds are derived from subject; clear subject first",
            ));
        }
        sync::set_teacher_classes_in(&tx, &user_id, &ids)?;
    }

    let user = store::require_user(&tx, &user_id)?;
    commit(tx)?;
    Ok(json!({
        "user": to_json(&user)?,
        "teacherSync": to_json(&teacher_sync)?,
    }))
}

fn handle_delete(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    let user_id = get_required_str(&req.params, "userId")?;
    let report = cascade::delete_user(conn, &user_id)?;
    Ok(json!({ "deleted": to_json(&report)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let res = match req.method.as_str() {
        "users.generateCode" => handle_generate_code(state, req),
        "users.create" => handle_create(state, req),
        "users.list" => handle_list(state, req),
        "users.get" => handle_get(state, req),
        "users.codes" => handle_codes(state, req),
        "users.update" => handle_update(state, req),
        "users.delete" => handle_delete(state, req),
        _ => return None,
    };
    Some(respond(&req.id, res))
}

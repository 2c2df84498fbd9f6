use crate::cascade;
use crate::error::CoreError;
use crate::ipc::helpers::{
    begin, commit, db_conn, get_optional_str, get_required_str, get_str_list, prefixed_id,
    respond, to_json, HandlerErr, HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::model::now_timestamp;
use crate::store;
use crate::sync;
use serde_json::json;

fn handle_classes_list(state: &mut AppState, _req: &Request) -> HandlerResult {
    let Some(conn) = state.db.as_ref() else {
        return Ok(json!({ "classes": [] }));
    };
    let classes = store::list_classes(conn)?;
    Ok(json!({ "classes": to_json(&classes)? }))
}

fn handle_classes_create(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    let name = get_required_str(&req.params, "name")?;
    let class_id = get_optional_str(&req.params, "classId")?
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| prefixed_id("C"));
    let subject_ids = get_str_list(&req.params, "subjectIds")?.unwrap_or_default();

    let tx = begin(conn)?;
    if store::class_exists(&tx, &class_id)? {
        return Err(CoreError::Conflict(format!("class {} already exists", class_id)).into());
    }
    tx.execute(
        "INSERT INTO classes(id, name, created_at) VALUES(?, ?, ?)",
        (&class_id, &name, now_timestamp()),
    )?;
    let resync = if subject_ids.is_empty() {
        None
    } else {
        Some(sync::set_class_subjects_in(&tx, &class_id, &subject_ids)?)
    };
    let class = store::load_class(&tx, &class_id)?
        .ok_or_else(|| CoreError::not_found("class", class_id.as_str()))?;
    commit(tx)?;

    log::info!("created class {} ({})", class_id, name);
    Ok(json!({ "class": to_json(&class)?, "resync": to_json(&resync)? }))
}

fn handle_classes_update(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    let class_id = get_required_str(&req.params, "classId")?;
    let name = get_optional_str(&req.params, "name")?;
    let subject_ids = get_str_list(&req.params, "subjectIds")?;

    let tx = begin(conn)?;
    if !store::class_exists(&tx, &class_id)? {
        return Err(CoreError::not_found("class", class_id.as_str()).into());
    }
    if let Some(name) = name {
        if name.is_empty() {
            return Err(HandlerErr::bad_params("name must not be empty"));
        }
        tx.execute(
            "UPDATE classes SET name = ? WHERE id = ?",
            (&name, &class_id),
        )?;
    }
    let resync = match subject_ids {
        Some(ids) => Some(sync::set_class_subjects_in(&tx, &class_id, &ids)?),
        None => None,
    };
    let class = store::load_class(&tx, &class_id)?
        .ok_or_else(|| CoreError::not_found("class", class_id.as_str()))?;
    commit(tx)?;

    Ok(json!({ "class": to_json(&class)?, "resync": to_json(&resync)? }))
}

fn handle_classes_delete(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    let class_id = get_required_str(&req.params, "classId")?;
    let out = cascade::delete_class(conn, &class_id)?;
    Ok(json!({ "deleted": to_json(&out)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let res = match req.method.as_str() {
        "classes.list" => handle_classes_list(state, req),
        "classes.create" => handle_classes_create(state, req),
        "classes.update" => handle_classes_update(state, req),
        "classes.delete" => handle_classes_delete(state, req),
        _ => return None,
    };
    Some(respond(&req.id, res))
}

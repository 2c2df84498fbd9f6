use crate::error::CoreError;
use crate::ipc::helpers::{
    begin, class_links, commit, db_conn, get_optional_str, get_required_str, get_str_list,
    parse_date, prefixed_id, replace_class_links, respond, to_json, today, HandlerErr,
    HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{now_timestamp, parse_enum_value, Announcement, Role, ANNOUNCEMENT_PRIORITIES};
use crate::store;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde_json::json;

const LINKS: &str = "announcement_classes";
const OWNER: &str = "announcement_id";

fn load_announcement(conn: &Connection, id: &str) -> Result<Announcement, HandlerErr> {
    let row = conn
        .query_row(
            "SELECT id, title, content, date, priority, teacher_id, created_at
             FROM announcements WHERE id = ?",
            [id],
            |r| {
                Ok(Announcement {
                    id: r.get(0)?,
                    title: r.get(1)?,
                    content: r.get(2)?,
                    date: r.get(3)?,
                    priority: r.get(4)?,
                    teacher_id: r.get(5)?,
                    class_ids: Vec::new(),
                    created_at: r.get(6)?,
                })
            },
        )
        .optional()?;
    let mut a = row.ok_or_else(|| CoreError::not_found("announcement", id))?;
    a.class_ids = class_links(conn, LINKS, OWNER, &a.id)?;
    Ok(a)
}

fn handle_list(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    let teacher_id = get_optional_str(&req.params, "teacherId")?;
    let class_id = get_optional_str(&req.params, "classId")?;

    let mut sql = String::from("SELECT a.id FROM announcements a WHERE 1 = 1");
    let mut bind: Vec<Value> = Vec::new();
    if let Some(t) = teacher_id {
        sql.push_str(" AND a.teacher_id = ?");
        bind.push(Value::Text(t));
    }
    if let Some(c) = class_id {
        sql.push_str(
            " AND EXISTS (SELECT 1 FROM announcement_classes ac WHERE ac.announcement_id = a.id AND ac.class_id = ?)",
        );
        bind.push(Value::Text(c));
    }
    sql.push_str(" ORDER BY a.created_at DESC, a.id");

    let ids = store::query_strings(conn, &sql, params_from_iter(bind))?;
    let announcements = ids
        .iter()
        .map(|id| load_announcement(conn, id))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "announcements": to_json(&announcements)? }))
}

fn handle_create(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    let p = &req.params;
    let title = get_required_str(p, "title")?;
    let content = get_required_str(p, "content")?;
    let date = match get_optional_str(p, "date")?.filter(|s| !s.is_empty()) {
        Some(d) => parse_date("date", &d)?,
        None => today(),
    };
    let priority = match get_optional_str(p, "priority")?.filter(|s| !s.is_empty()) {
        Some(v) => parse_enum_value("priority", &v, ANNOUNCEMENT_PRIORITIES)?,
        None => "medium".to_string(),
    };
    let teacher_id = get_required_str(p, "teacherId")?;
    let class_ids = get_str_list(p, "classIds")?.unwrap_or_default();

    let tx = begin(conn)?;
    store::require_user_with_role(&tx, &teacher_id, Role::Teacher)?;
    let id = prefixed_id("ANN");
    tx.execute(
        "INSERT INTO announcements(id, title, content, date, priority, teacher_id, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            &title,
            &content,
            &date,
            &priority,
            &teacher_id,
            now_timestamp(),
        ),
    )?;
    replace_class_links(&tx, LINKS, OWNER, &id, &class_ids)?;
    let a = load_announcement(&tx, &id)?;
    commit(tx)?;
    Ok(json!({ "announcement": to_json(&a)? }))
}

fn handle_update(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    let p = &req.params;
    let id = get_required_str(p, "announcementId")?;

    let tx = begin(conn)?;
    load_announcement(&tx, &id)?;
    for key in ["title", "content"] {
        if let Some(v) = get_optional_str(p, key)? {
            if v.is_empty() {
                return Err(HandlerErr::bad_params(format!("{} must not be empty", key)));
            }
            tx.execute(
                &format!("UPDATE announcements SET {} = ? WHERE id = ?", key),
                (&v, &id),
            )?;
        }
    }
    if let Some(v) = get_optional_str(p, "date")? {
        let d = parse_date("date", &v)?;
        tx.execute("UPDATE announcements SET date = ? WHERE id = ?", (&d, &id))?;
    }
    if let Some(v) = get_optional_str(p, "priority")? {
        let pr = parse_enum_value("priority", &v, ANNOUNCEMENT_PRIORITIES)?;
        tx.execute(
            "UPDATE announcements SET priority = ? WHERE id = ?",
            (&pr, &id),
        )?;
    }
    if let Some(class_ids) = get_str_list(p, "classIds")? {
        replace_class_links(&tx, LINKS, OWNER, &id, &class_ids)?;
    }
    let a = load_announcement(&tx, &id)?;
    commit(tx)?;
    Ok(json!({ "announcement": to_json(&a)? }))
}

fn handle_delete(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    let id = get_required_str(&req.params, "announcementId")?;

    let tx = begin(conn)?;
    load_announcement(&tx, &id)?;
    tx.execute(
        "DELETE FROM announcement_classes WHERE announcement_id = ?",
        [&id],
    )?;
    tx.execute("DELETE FROM announcements WHERE id = ?", [&id])?;
    commit(tx)?;
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let res = match req.method.as_str() {
        "announcements.list" => handle_list(state, req),
        "announcements.create" => handle_create(state, req),
        "announcements.update" => handle_update(state, req),
        "announcements.delete" => handle_delete(state, req),
        _ => return None,
    };
    Some(respond(&req.id, res))
}

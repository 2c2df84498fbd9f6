use crate::error::CoreError;
use crate::ipc::helpers::{
    begin, class_links, commit, db_conn, get_optional_str, get_required_str, get_str_list,
    parse_date, prefixed_id, replace_class_links, respond, to_json, today, HandlerErr,
    HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{now_timestamp, Homework, Role};
use crate::store;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde_json::json;

const LINKS: &str = "homework_classes";
const OWNER: &str = "homework_id";

fn load_homework(conn: &Connection, homework_id: &str) -> Result<Homework, HandlerErr> {
    let row = conn
        .query_row(
            "SELECT id, title, subject, due_date, assigned_date, teacher_id, created_at
             FROM homework WHERE id = ?",
            [homework_id],
            |r| {
                Ok(Homework {
                    id: r.get(0)?,
                    title: r.get(1)?,
                    subject: r.get(2)?,
                    due_date: r.get(3)?,
                    assigned_date: r.get(4)?,
                    teacher_id: r.get(5)?,
                    class_ids: Vec::new(),
                    created_at: r.get(6)?,
                })
            },
        )
        .optional()?;
    let mut hw = row.ok_or_else(|| CoreError::not_found("homework", homework_id))?;
    hw.class_ids = class_links(conn, LINKS, OWNER, &hw.id)?;
    Ok(hw)
}

fn handle_list(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    let teacher_id = get_optional_str(&req.params, "teacherId")?;
    let class_id = get_optional_str(&req.params, "classId")?;

    let mut sql = String::from("SELECT h.id FROM homework h WHERE 1 = 1");
    let mut bind: Vec<Value> = Vec::new();
    if let Some(t) = teacher_id {
        sql.push_str(" AND h.teacher_id = ?");
        bind.push(Value::Text(t));
    }
    if let Some(c) = class_id {
        sql.push_str(
            " AND EXISTS (SELECT 1 FROM homework_classes hc WHERE hc.homework_id = h.id AND hc.class_id = ?)",
        );
        bind.push(Value::Text(c));
    }
    sql.push_str(" ORDER BY h.created_at DESC, h.id");

    let ids = store::query_strings(conn, &sql, params_from_iter(bind))?;
    let homework = ids
        .iter()
        .map(|id| load_homework(conn, id))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "homework": to_json(&homework)? }))
}

fn handle_create(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    let p = &req.params;
    let title = get_required_str(p, "title")?;
    let subject = get_required_str(p, "subject")?;
    let due_date = parse_date("dueDate", &get_required_str(p, "dueDate")?)?;
    let assigned_date = match get_optional_str(p, "assignedDate")?.filter(|s| !s.is_empty()) {
        Some(d) => parse_date("assignedDate", &d)?,
        None => today(),
    };
    let teacher_id = get_required_str(p, "teacherId")?;
    let class_ids = get_str_list(p, "classIds")?.unwrap_or_default();

    let tx = begin(conn)?;
    store::require_user_with_role(&tx, &teacher_id, Role::Teacher)?;
    let id = prefixed_id("HW");
    tx.execute(
        "INSERT INTO homework(id, title, subject, due_date, assigned_date, teacher_id, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            &title,
            &subject,
            &due_date,
            &assigned_date,
            &teacher_id,
            now_timestamp(),
        ),
    )?;
    replace_class_links(&tx, LINKS, OWNER, &id, &class_ids)?;
    let hw = load_homework(&tx, &id)?;
    commit(tx)?;
    Ok(json!({ "homework": to_json(&hw)? }))
}

fn handle_update(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    let p = &req.params;
    let id = get_required_str(p, "homeworkId")?;

    let tx = begin(conn)?;
    load_homework(&tx, &id)?;
    for (key, column) in [("title", "title"), ("subject", "subject")] {
        if let Some(v) = get_optional_str(p, key)? {
            if v.is_empty() {
                return Err(HandlerErr::bad_params(format!("{} must not be empty", key)));
            }
            tx.execute(
                &format!("UPDATE homework SET {} = ? WHERE id = ?", column),
                (&v, &id),
            )?;
        }
    }
    for (key, column) in [("dueDate", "due_date"), ("assignedDate", "assigned_date")] {
        if let Some(v) = get_optional_str(p, key)? {
            let d = parse_date(key, &v)?;
            tx.execute(
                &format!("UPDATE homework SET {} = ? WHERE id = ?", column),
                (&d, &id),
            )?;
        }
    }
    if let Some(class_ids) = get_str_list(p, "classIds")? {
        replace_class_links(&tx, LINKS, OWNER, &id, &class_ids)?;
    }
    let hw = load_homework(&tx, &id)?;
    commit(tx)?;
    Ok(json!({ "homework": to_json(&hw)? }))
}

fn handle_delete(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    let id = get_required_str(&req.params, "homeworkId")?;

    let tx = begin(conn)?;
    load_homework(&tx, &id)?;
    tx.execute("DELETE FROM homework_classes WHERE homework_id = ?", [&id])?;
    tx.execute("DELETE FROM homework WHERE id = ?", [&id])?;
    commit(tx)?;
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let res = match req.method.as_str() {
        "homework.list" => handle_list(state, req),
        "homework.create" => handle_create(state, req),
        "homework.update" => handle_update(state, req),
        "homework.delete" => handle_delete(state, req),
        _ => return None,
    };
    Some(respond(&req.id, res))
}

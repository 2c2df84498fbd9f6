use crate::error::CoreError;
use crate::ipc::helpers::{
    begin, commit, db_conn, get_optional_str, get_required_str, parse_date, respond, to_json,
    HandlerErr, HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{now_timestamp, parse_enum_value, Attendance, Role, ATTENDANCE_STATUSES};
use crate::store;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

fn map_attendance(r: &rusqlite::Row<'_>) -> rusqlite::Result<Attendance> {
    Ok(Attendance {
        id: r.get(0)?,
        student_id: r.get(1)?,
        date: r.get(2)?,
        status: r.get(3)?,
        created_at: r.get(4)?,
    })
}

fn load_attendance(conn: &Connection, id: &str) -> Result<Attendance, HandlerErr> {
    conn.query_row(
        "SELECT id, student_id, date, status, created_at FROM attendance WHERE id = ?",
        [id],
        map_attendance,
    )
    .optional()?
    .ok_or_else(|| CoreError::not_found("attendance", id).into())
}

fn handle_list(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    let student_id = get_optional_str(&req.params, "studentId")?;
    let date = match get_optional_str(&req.params, "date")? {
        Some(d) => Some(parse_date("date", &d)?),
        None => None,
    };

    let mut sql =
        String::from("SELECT id, student_id, date, status, created_at FROM attendance WHERE 1 = 1");
    let mut bind: Vec<Value> = Vec::new();
    if let Some(s) = student_id {
        sql.push_str(" AND student_id = ?");
        bind.push(Value::Text(s));
    }
    if let Some(d) = date {
        sql.push_str(" AND date = ?");
        bind.push(Value::Text(d));
    }
    sql.push_str(" ORDER BY date DESC, created_at DESC, id");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(bind), map_attendance)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "attendance": to_json(&rows)? }))
}

fn handle_create(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    let p = &req.params;
    let student_id = get_required_str(p, "studentId")?;
    let date = parse_date("date", &get_required_str(p, "date")?)?;
    let status = parse_enum_value("status", &get_required_str(p, "status")?, ATTENDANCE_STATUSES)?;

    store::require_user_with_role(conn, &student_id, Role::Student)?;
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO attendance(id, student_id, date, status, created_at) VALUES(?, ?, ?, ?, ?)",
        (&id, &student_id, &date, &status, now_timestamp()),
    )?;
    Ok(json!({ "attendance": to_json(&load_attendance(conn, &id)?)? }))
}

fn handle_update(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    let p = &req.params;
    let id = get_required_str(p, "attendanceId")?;

    let tx = begin(conn)?;
    load_attendance(&tx, &id)?;
    if let Some(d) = get_optional_str(p, "date")? {
        let date = parse_date("date", &d)?;
        tx.execute("UPDATE attendance SET date = ? WHERE id = ?", (&date, &id))?;
    }
    if let Some(s) = get_optional_str(p, "status")? {
        let status = parse_enum_value("status", &s, ATTENDANCE_STATUSES)?;
        tx.execute(
            "UPDATE attendance SET status = ? WHERE id = ?",
            (&status, &id),
        )?;
    }
    let row = load_attendance(&tx, &id)?;
    commit(tx)?;
    Ok(json!({ "attendance": to_json(&row)? }))
}

fn handle_delete(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    let id = get_required_str(&req.params, "attendanceId")?;
    let n = conn.execute("DELETE FROM attendance WHERE id = ?", [&id])?;
    if n == 0 {
        return Err(CoreError::not_found("attendance", id).into());
    }
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let res = match req.method.as_str() {
        "attendance.list" => handle_list(state, req),
        "attendance.create" => handle_create(state, req),
        "attendance.update" => handle_update(state, req),
        "attendance.delete" => handle_delete(state, req),
        _ => return None,
    };
    Some(respond(&req.id, res))
}

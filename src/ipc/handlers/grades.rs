use crate::error::CoreError;
use crate::ipc::helpers::{
    begin, commit, db_conn, get_optional_f64, get_optional_str, get_required_str, parse_date,
    respond, to_json, today, HandlerErr, HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{parse_enum_value, Grade, Role, GRADE_KINDS};
use crate::store;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

const GRADE_COLUMNS: &str =
    "id, student_id, subject, assignment, marks_obtained, max_marks, kind, date";

fn map_grade(r: &rusqlite::Row<'_>) -> rusqlite::Result<Grade> {
    Ok(Grade {
        id: r.get(0)?,
        student_id: r.get(1)?,
        subject: r.get(2)?,
        assignment: r.get(3)?,
        marks_obtained: r.get(4)?,
        max_marks: r.get(5)?,
        kind: r.get(6)?,
        date: r.get(7)?,
    })
}

fn load_grade(conn: &Connection, id: &str) -> Result<Grade, HandlerErr> {
    let sql = format!("SELECT {} FROM grades WHERE id = ?", GRADE_COLUMNS);
    conn.query_row(&sql, [id], map_grade)
        .optional()?
        .ok_or_else(|| CoreError::not_found("grade", id).into())
}

fn check_marks(marks: f64, max: f64) -> Result<(), HandlerErr> {
    if max <= 0.0 {
        return Err(HandlerErr::bad_params("maxMarks must be greater than 0"));
    }
    if !(0.0..=max).contains(&marks) {
        return Err(HandlerErr::bad_params(
            "marksObtained must be between 0 and maxMarks",
        ));
    }
    Ok(())
}

fn handle_list(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    let student_id = get_optional_str(&req.params, "studentId")?;
    let grades = match student_id {
        Some(sid) => {
            let sql = format!(
                "SELECT {} FROM grades WHERE student_id = ? ORDER BY date DESC, id",
                GRADE_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([&sid], map_grade)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
        None => {
            let sql = format!("SELECT {} FROM grades ORDER BY date DESC, id", GRADE_COLUMNS);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], map_grade)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
    };
    Ok(json!({ "grades": to_json(&grades)? }))
}

fn handle_create(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    let p = &req.params;
    let student_id = get_required_str(p, "studentId")?;
    let subject = get_required_str(p, "subject")?;
    let assignment = get_required_str(p, "assignment")?;
    let marks = get_optional_f64(p, "marksObtained")?
        .ok_or_else(|| HandlerErr::bad_params("missing marksObtained"))?;
    let max = get_optional_f64(p, "maxMarks")?
        .ok_or_else(|| HandlerErr::bad_params("missing maxMarks"))?;
    check_marks(marks, max)?;
    let kind = match get_optional_str(p, "kind")?.filter(|s| !s.is_empty()) {
        Some(k) => parse_enum_value("kind", &k, GRADE_KINDS)?,
        None => "quiz".to_string(),
    };
    let date = match get_optional_str(p, "date")?.filter(|s| !s.is_empty()) {
        Some(d) => parse_date("date", &d)?,
        None => today(),
    };

    store::require_user_with_role(conn, &student_id, Role::Student)?;
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO grades(id, student_id, subject, assignment, marks_obtained, max_marks, kind, date)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (&id, &student_id, &subject, &assignment, marks, max, &kind, &date),
    )?;
    Ok(json!({ "grade": to_json(&load_grade(conn, &id)?)? }))
}

fn handle_update(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    let p = &req.params;
    let id = get_required_str(p, "gradeId")?;

    let tx = begin(conn)?;
    let current = load_grade(&tx, &id)?;
    let marks = get_optional_f64(p, "marksObtained")?.unwrap_or(current.marks_obtained);
    let max = get_optional_f64(p, "maxMarks")?.unwrap_or(current.max_marks);
    check_marks(marks, max)?;
    tx.execute(
        "UPDATE grades SET marks_obtained = ?, max_marks = ? WHERE id = ?",
        (marks, max, &id),
    )?;

    for key in ["subject", "assignment"] {
        if let Some(v) = get_optional_str(p, key)? {
            if v.is_empty() {
                return Err(HandlerErr::bad_params(format!("{} must not be empty", key)));
            }
            tx.execute(
                &format!("UPDATE grades SET {} = ? WHERE id = ?", key),
                (&v, &id),
            )?;
        }
    }
    if let Some(k) = get_optional_str(p, "kind")? {
        let kind = parse_enum_value("kind", &k, GRADE_KINDS)?;
        tx.execute("UPDATE grades SET kind = ? WHERE id = ?", (&kind, &id))?;
    }
    if let Some(d) = get_optional_str(p, "date")? {
        let date = parse_date("date", &d)?;
        tx.execute("UPDATE grades SET date = ? WHERE id = ?", (&date, &id))?;
    }

    let grade = load_grade(&tx, &id)?;
    commit(tx)?;
    Ok(json!({ "grade": to_json(&grade)? }))
}

fn handle_delete(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    let id = get_required_str(&req.params, "gradeId")?;
    let n = conn.execute("DELETE FROM grades WHERE id = ?", [&id])?;
    if n == 0 {
        return Err(CoreError::not_found("grade", id).into());
    }
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let res = match req.method.as_str() {
        "grades.list" => handle_list(state, req),
        "grades.create" => handle_create(state, req),
        "grades.update" => handle_update(state, req),
        "grades.delete" => handle_delete(state, req),
        _ => return None,
    };
    Some(respond(&req.id, res))
}

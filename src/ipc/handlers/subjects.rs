use crate::cascade;
use crate::ipc::helpers::{
    db_conn, get_required_str, prefixed_id, respond, to_json, HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::model::Subject;
use crate::store;
use serde_json::json;

fn handle_subjects_list(state: &mut AppState, _req: &Request) -> HandlerResult {
    let Some(conn) = state.db.as_ref() else {
        return Ok(json!({ "subjects": [] }));
    };
    let subjects = store::list_subjects(conn)?;
    Ok(json!({ "subjects": to_json(&subjects)? }))
}

/// Names are unique; creating an existing name returns that subject.
fn handle_subjects_create(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    let name = get_required_str(&req.params, "name")?;

    if let Some(existing) = store::find_subject_by_name(conn, &name)? {
        return Ok(json!({ "subject": to_json(&existing)?, "created": false }));
    }
    let subject = Subject {
        id: prefixed_id("SUB"),
        name,
    };
    conn.execute(
        "INSERT INTO subjects(id, name) VALUES(?, ?)",
        (&subject.id, &subject.name),
    )?;
    log::info!("created subject {} ({})", subject.id, subject.name);
    Ok(json!({ "subject": to_json(&subject)?, "created": true }))
}

fn handle_subjects_delete(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    let subject_id = get_required_str(&req.params, "subjectId")?;
    let out = cascade::delete_subject(conn, &subject_id)?;
    Ok(json!({ "deleted": to_json(&out)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let res = match req.method.as_str() {
        "subjects.list" => handle_subjects_list(state, req),
        "subjects.create" => handle_subjects_create(state, req),
        "subjects.delete" => handle_subjects_delete(state, req),
        _ => return None,
    };
    Some(respond(&req.id, res))
}

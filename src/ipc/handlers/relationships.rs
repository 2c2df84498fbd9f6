use crate::ipc::helpers::{db_conn, get_required_str, respond, to_json, HandlerResult};
use crate::ipc::types::{AppState, Request};
use crate::store;
use crate::sync;
use serde_json::json;

fn handle_assign_student(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    let student_id = get_required_str(&req.params, "studentId")?;
    let parent_id = get_required_str(&req.params, "parentId")?;

    let change = sync::assign_student_to_parent(conn, &student_id, &parent_id)?;
    let parent = store::require_user(conn, &parent_id)?;
    Ok(json!({
        "studentId": student_id,
        "parentId": parent_id,
        "previousParentId": change.previous_parent_id,
        "childrenIds": parent.children_ids,
    }))
}

fn handle_unassign_student(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    let student_id = get_required_str(&req.params, "studentId")?;
    let change = sync::unassign_student(conn, &student_id)?;
    Ok(json!({
        "studentId": student_id,
        "previousParentId": change.previous_parent_id,
    }))
}

fn handle_list(state: &mut AppState, _req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    let rel = sync::list_relationships(conn)?;
    to_json(&rel)
}

fn handle_teacher_sync(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    let teacher_id = get_required_str(&req.params, "teacherId")?;
    let out = sync::sync_teacher_to_classes_by_subject(conn, &teacher_id)?;
    to_json(&out)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let res = match req.method.as_str() {
        "relationships.assignStudent" => handle_assign_student(state, req),
        "relationships.unassignStudent" => handle_unassign_student(state, req),
        "relationships.list" => handle_list(state, req),
        "teachers.syncClasses" => handle_teacher_sync(state, req),
        _ => return None,
    };
    Some(respond(&req.id, res))
}

use crate::error::CoreError;
use crate::ipc::helpers::{
    begin, commit, db_conn, get_optional_bool, get_optional_str, get_required_str, respond,
    to_json, HandlerErr, HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{
    now_timestamp, parse_enum_value, Attachment, Message, ATTACHMENT_MIME_TYPES,
    MAX_ATTACHMENTS, MAX_ATTACHMENT_BYTES, MESSAGE_KINDS,
};
use crate::store;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

const MESSAGE_COLUMNS: &str = "id, sender_id, receiver_id, kind, content, audio_src, timestamp, is_read";

fn map_message(r: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: r.get(0)?,
        sender_id: r.get(1)?,
        receiver_id: r.get(2)?,
        kind: r.get(3)?,
        content: r.get(4)?,
        audio_src: r.get(5)?,
        timestamp: r.get(6)?,
        is_read: r.get::<_, i64>(7)? != 0,
        attachments: Vec::new(),
    })
}

fn attachments_for(conn: &Connection, message_id: &str) -> Result<Vec<Attachment>, HandlerErr> {
    let mut stmt = conn.prepare(
        "SELECT id, file_name, mime_type, size_bytes, url
         FROM message_attachments WHERE message_id = ? ORDER BY rowid",
    )?;
    let rows = stmt
        .query_map([message_id], |r| {
            Ok(Attachment {
                id: r.get(0)?,
                file_name: r.get(1)?,
                mime_type: r.get(2)?,
                size_bytes: r.get(3)?,
                url: r.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn query_messages<P: rusqlite::Params>(
    conn: &Connection,
    where_order: &str,
    params: P,
) -> Result<Vec<Message>, HandlerErr> {
    let sql = format!("SELECT {} FROM messages {}", MESSAGE_COLUMNS, where_order);
    let mut stmt = conn.prepare(&sql)?;
    let mut messages = stmt
        .query_map(params, map_message)?
        .collect::<Result<Vec<_>, _>>()?;
    for m in messages.iter_mut() {
        m.attachments = attachments_for(conn, &m.id)?;
    }
    Ok(messages)
}

fn load_message(conn: &Connection, id: &str) -> Result<Message, HandlerErr> {
    query_messages(conn, "WHERE id = ?", [id])?
        .into_iter()
        .next()
        .ok_or_else(|| CoreError::not_found("message", id).into())
}

struct NewAttachment {
    file_name: String,
    mime_type: String,
    size_bytes: i64,
    url: String,
}

fn parse_attachments(params: &serde_json::Value) -> Result<Vec<NewAttachment>, HandlerErr> {
    let items = match params.get("attachments") {
        None | Some(serde_json::Value::Null) => return Ok(Vec::new()),
        Some(serde_json::Value::Array(items)) => items,
        Some(_) => return Err(HandlerErr::bad_params("attachments must be an array")),
    };
    if items.len() > MAX_ATTACHMENTS {
        return Err(HandlerErr::bad_params(format!(
            "at most {} attachments per message",
            MAX_ATTACHMENTS
        )));
    }

    let mut out = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let file_name = get_required_str(item, "fileName")?;
        let mime_type = get_required_str(item, "mimeType")?.to_ascii_lowercase();
        let url = get_required_str(item, "url")?;
        let size_bytes = item
            .get("sizeBytes")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| HandlerErr::bad_params(format!("attachments[{}].sizeBytes missing", i)))?;

        if !ATTACHMENT_MIME_TYPES.contains(&mime_type.as_str()) {
            return Err(HandlerErr {
                code: "bad_params",
                message: format!("attachment type not allowed: {}", mime_type),
                details: Some(json!({ "index": i, "allowed": ATTACHMENT_MIME_TYPES })),
            });
        }
        if !(0..=MAX_ATTACHMENT_BYTES).contains(&size_bytes) {
            return Err(HandlerErr {
                code: "bad_params",
                message: format!("attachment {} exceeds {} bytes", file_name, MAX_ATTACHMENT_BYTES),
                details: Some(json!({ "index": i })),
            });
        }
        out.push(NewAttachment {
            file_name,
            mime_type,
            size_bytes,
            url,
        });
    }
    Ok(out)
}

fn handle_send(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    let p = &req.params;
    let sender_id = get_required_str(p, "senderId")?;
    let receiver_id = get_required_str(p, "receiverId")?;
    let content = get_optional_str(p, "content")?.filter(|s| !s.is_empty());
    let audio_src = get_optional_str(p, "audioSrc")?.filter(|s| !s.is_empty());
    let timestamp = get_optional_str(p, "timestamp")?
        .filter(|s| !s.is_empty())
        .unwrap_or_else(now_timestamp);
    let is_read = get_optional_bool(p, "isRead")?.unwrap_or(false);
    let attachments = parse_attachments(p)?;

    let kind = match get_optional_str(p, "kind")?.filter(|s| !s.is_empty()) {
        Some(k) => parse_enum_value("kind", &k, MESSAGE_KINDS)?,
        None if !attachments.is_empty() && content.is_none() => "file".to_string(),
        None => "text".to_string(),
    };
    match kind.as_str() {
        "text" if content.is_none() && attachments.is_empty() => {
            return Err(HandlerErr::bad_params("text messages need content"));
        }
        "voice" if audio_src.is_none() => {
            return Err(HandlerErr::bad_params("voice messages need audioSrc"));
        }
        "file" if attachments.is_empty() => {
            return Err(HandlerErr::bad_params("file messages need attachments"));
        }
        _ => {}
    }

    let tx = begin(conn)?;
    store::require_user(&tx, &sender_id)?;
    store::require_user(&tx, &receiver_id)?;

    let id = Uuid::new_v4().to_string();
    tx.execute(
        "INSERT INTO messages(id, sender_id, receiver_id, kind, content, audio_src, timestamp, is_read)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            &sender_id,
            &receiver_id,
            &kind,
            &content,
            &audio_src,
            &timestamp,
            is_read as i64,
        ),
    )?;
    for a in &attachments {
        tx.execute(
            "INSERT INTO message_attachments(id, message_id, file_name, mime_type, size_bytes, url)
             VALUES(?, ?, ?, ?, ?, ?)",
            (
                Uuid::new_v4().to_string(),
                &id,
                &a.file_name,
                &a.mime_type,
                a.size_bytes,
                &a.url,
            ),
        )?;
    }
    let message = load_message(&tx, &id)?;
    commit(tx)?;
    Ok(json!({ "message": to_json(&message)? }))
}

fn handle_conversation(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    let a = get_required_str(&req.params, "userA")?;
    let b = get_required_str(&req.params, "userB")?;
    let messages = query_messages(
        conn,
        "WHERE (sender_id = ?1 AND receiver_id = ?2) OR (sender_id = ?2 AND receiver_id = ?1)
         ORDER BY timestamp ASC, rowid ASC",
        [&a, &b],
    )?;
    Ok(json!({ "messages": to_json(&messages)? }))
}

fn handle_for_user(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    let user_id = get_required_str(&req.params, "userId")?;
    let messages = query_messages(
        conn,
        "WHERE sender_id = ?1 OR receiver_id = ?1 ORDER BY timestamp DESC, rowid DESC",
        [&user_id],
    )?;
    Ok(json!({ "messages": to_json(&messages)? }))
}

fn handle_mark_read(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    let id = get_required_str(&req.params, "messageId")?;
    let n = conn.execute("UPDATE messages SET is_read = 1 WHERE id = ?", [&id])?;
    if n == 0 {
        return Err(CoreError::not_found("message", id).into());
    }
    Ok(json!({ "message": to_json(&load_message(conn, &id)?)? }))
}

fn handle_delete(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    let id = get_required_str(&req.params, "messageId")?;

    let tx = begin(conn)?;
    let exists = tx
        .query_row("SELECT 1 FROM messages WHERE id = ?", [&id], |r| {
            r.get::<_, i64>(0)
        })
        .optional()?;
    if exists.is_none() {
        return Err(CoreError::not_found("message", id).into());
    }
    tx.execute("DELETE FROM message_attachments WHERE message_id = ?", [&id])?;
    tx.execute("DELETE FROM messages WHERE id = ?", [&id])?;
    commit(tx)?;
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let res = match req.method.as_str() {
        "messages.send" => handle_send(state, req),
        "messages.conversation" => handle_conversation(state, req),
        "messages.forUser" => handle_for_user(state, req),
        "messages.markRead" => handle_mark_read(state, req),
        "messages.delete" => handle_delete(state, req),
        _ => return None,
    };
    Some(respond(&req.id, res))
}

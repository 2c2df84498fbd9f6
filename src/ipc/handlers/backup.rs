use crate::backup;
use crate::db;
use crate::ipc::helpers::{db_conn, get_required_str, respond, HandlerErr, HandlerResult};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn io_failed(e: anyhow::Error, path: &str) -> HandlerErr {
    HandlerErr {
        code: "io_failed",
        message: format!("{:#}", e),
        details: Some(json!({ "path": path })),
    }
}

fn handle_stats(state: &mut AppState, _req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    let counts = backup::table_counts(conn)
        .map_err(|e| HandlerErr::new("db_query_failed", format!("{:#}", e)))?;
    Ok(json!({ "counts": counts }))
}

fn handle_export_bundle(state: &mut AppState, req: &Request) -> HandlerResult {
    let out_path = get_required_str(&req.params, "outPath")?;
    let conn = db_conn(state)?;
    let workspace_path = state
        .workspace
        .clone()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))?;

    let export = backup::export_bundle(conn, &workspace_path, &PathBuf::from(&out_path))
        .map_err(|e| io_failed(e, &out_path))?;
    Ok(json!({
        "path": out_path,
        "bundleFormat": export.bundle_format,
        "dbSha256": export.db_sha256,
        "counts": export.counts,
    }))
}

fn handle_import_bundle(state: &mut AppState, req: &Request) -> HandlerResult {
    let in_path = get_required_str(&req.params, "inPath")?;
    let workspace_path = state
        .workspace
        .clone()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))?;

    let src = PathBuf::from(&in_path);
    if !src.is_file() {
        return Err(HandlerErr {
            code: "not_found",
            message: "bundle file not found".into(),
            details: Some(json!({ "path": in_path })),
        });
    }

    // Drop open handle before replacing file.
    state.db = None;
    let import = backup::import_bundle(&src, &workspace_path);

    // Reopen whichever database is in place now, imported or original.
    let conn = db::open_db(&workspace_path)
        .map_err(|e| HandlerErr::new("db_open_failed", format!("{:#}", e)))?;
    state.db = Some(conn);

    let import = import.map_err(|e| io_failed(e, &in_path))?;
    Ok(json!({
        "workspacePath": workspace_path.to_string_lossy(),
        "bundleFormat": import.bundle_format,
        "exportedAt": import.exported_at,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let res = match req.method.as_str() {
        "backup.stats" => handle_stats(state, req),
        "backup.exportBundle" => handle_export_bundle(state, req),
        "backup.importBundle" => handle_import_bundle(state, req),
        _ => return None,
    };
    Some(respond(&req.id, res))
}

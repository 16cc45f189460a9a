use crate::backup;
use crate::ipc::error::{respond, IpcError};
use crate::ipc::handlers::core::open_workspace;
use crate::ipc::helpers::{parse_opt_string, required_str, workspace_path};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value as JsonValue};
use std::path::PathBuf;

fn handle_export_bundle(state: &mut AppState, req: &Request) -> Result<JsonValue, IpcError> {
    let ws = workspace_path(state)?.to_path_buf();
    let out_path = PathBuf::from(required_str(&req.params, "outPath")?);
    let summary = backup::export_workspace_bundle(&ws, &out_path)?;
    tracing::info!(
        out = %out_path.display(),
        attachments = summary.attachment_count,
        "workspace bundle exported"
    );
    Ok(json!({
        "ok": true,
        "path": out_path.to_string_lossy(),
        "bundleFormat": summary.bundle_format,
        "entryCount": summary.entry_count,
        "attachmentCount": summary.attachment_count,
    }))
}

fn handle_import_bundle(state: &mut AppState, req: &Request) -> Result<JsonValue, IpcError> {
    let in_path = PathBuf::from(required_str(&req.params, "inPath")?);
    let target = match parse_opt_string(req.params.get("workspacePath"), "workspacePath")? {
        Some(p) => PathBuf::from(p),
        None => workspace_path(state)?.to_path_buf(),
    };

    // The database file is replaced underneath any open connection.
    if state.workspace.as_deref() == Some(target.as_path()) {
        state.db = None;
    }
    let imported = backup::import_workspace_bundle(&in_path, &target);
    let summary = match imported {
        Ok(s) => s,
        Err(e) => {
            if state.db.is_none() {
                if let Some(ws) = state.workspace.clone() {
                    let _ = open_workspace(state, ws);
                }
            }
            return Err(e.into());
        }
    };
    open_workspace(state, target.clone())?;
    tracing::info!(
        workspace = %target.display(),
        attachments = summary.attachment_count,
        "workspace bundle imported"
    );
    Ok(json!({
        "ok": true,
        "workspacePath": target.to_string_lossy(),
        "bundleFormatDetected": summary.bundle_format_detected,
        "attachmentCount": summary.attachment_count,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "backup.exportWorkspaceBundle" => handle_export_bundle(state, req),
        "backup.importWorkspaceBundle" => handle_import_bundle(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}

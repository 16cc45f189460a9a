use crate::attachments;
use crate::ipc::error::{respond, IpcError};
use crate::ipc::handlers::setup::load_attachment_setup;
use crate::ipc::helpers::{
    db_conn, ensure_exists, new_id, now_ts, parse_opt_string, required_str, workspace_path,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{json, Value as JsonValue};
use std::path::{Path, PathBuf};

fn attachment_to_json(row: &rusqlite::Row<'_>) -> rusqlite::Result<JsonValue> {
    Ok(json!({
        "id": row.get::<_, String>(0)?,
        "messageId": row.get::<_, String>(1)?,
        "fileName": row.get::<_, String>(2)?,
        "sizeBytes": row.get::<_, i64>(3)?,
        "sha256": row.get::<_, String>(4)?,
        "createdAt": row.get::<_, String>(5)?,
    }))
}

/// Removes each blob in `shas` that no attachment row references any more.
/// Blob removal is best effort; rows are already gone.
pub fn prune_blobs(conn: &Connection, workspace: &Path, shas: &[String]) {
    for sha in shas {
        let still_used = conn
            .query_row(
                "SELECT 1 FROM attachments WHERE sha256 = ? LIMIT 1",
                [sha],
                |_r| Ok(()),
            )
            .optional();
        match still_used {
            Ok(Some(())) => {}
            Ok(None) => {
                if let Err(e) = attachments::remove_blob(workspace, sha) {
                    tracing::warn!(sha256 = %sha, "failed to remove blob: {e:#}");
                }
            }
            Err(e) => tracing::warn!(sha256 = %sha, "blob reference check failed: {e}"),
        }
    }
}

fn handle_attachments_add(state: &mut AppState, req: &Request) -> Result<JsonValue, IpcError> {
    let conn = db_conn(state)?;
    let ws = workspace_path(state)?;
    let message_id = required_str(&req.params, "messageId")?;
    let source = PathBuf::from(required_str(&req.params, "sourcePath")?);
    ensure_exists(conn, "messages", &message_id, "message")?;

    let meta = std::fs::metadata(&source).map_err(|e| {
        IpcError::new("io_failed", format!("{}: {}", source.to_string_lossy(), e))
    })?;
    if !meta.is_file() {
        return Err(IpcError::bad_params("sourcePath must be a file"));
    }
    let limit = load_attachment_setup(conn).max_bytes;
    if meta.len() > limit {
        return Err(IpcError::new(
            "too_large",
            format!("attachment exceeds {} bytes", limit),
        )
        .with_details(json!({ "sizeBytes": meta.len(), "maxBytes": limit })));
    }

    let file_name = match parse_opt_string(req.params.get("fileName"), "fileName")? {
        Some(n) => n,
        None => source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| IpcError::bad_params("sourcePath has no file name"))?,
    };

    let blob = attachments::store_file(ws, &source)?;
    let attachment_id = new_id();
    if let Err(e) = conn.execute(
        "INSERT INTO attachments(id, message_id, file_name, size_bytes, sha256, created_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        params![
            attachment_id,
            message_id,
            file_name,
            blob.size_bytes as i64,
            blob.sha256,
            now_ts()
        ],
    ) {
        prune_blobs(conn, ws, std::slice::from_ref(&blob.sha256));
        return Err(IpcError::db("db_insert_failed")(e));
    }
    tracing::info!(attachment_id = %attachment_id, message_id = %message_id, size = blob.size_bytes, "attachment stored");
    Ok(json!({
        "attachmentId": attachment_id,
        "sha256": blob.sha256,
        "sizeBytes": blob.size_bytes,
        "fileName": file_name,
    }))
}

fn handle_attachments_list(state: &mut AppState, req: &Request) -> Result<JsonValue, IpcError> {
    let conn = db_conn(state)?;
    let message_id = required_str(&req.params, "messageId")?;
    ensure_exists(conn, "messages", &message_id, "message")?;
    let mut stmt = conn.prepare(
        "SELECT id, message_id, file_name, size_bytes, sha256, created_at
         FROM attachments WHERE message_id = ?
         ORDER BY created_at, rowid",
    )?;
    let rows = stmt
        .query_map([&message_id], attachment_to_json)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "attachments": rows }))
}

fn handle_attachments_export(state: &mut AppState, req: &Request) -> Result<JsonValue, IpcError> {
    let conn = db_conn(state)?;
    let ws = workspace_path(state)?;
    let attachment_id = required_str(&req.params, "attachmentId")?;
    let out_path = PathBuf::from(required_str(&req.params, "outPath")?);
    let sha: String = conn
        .query_row(
            "SELECT sha256 FROM attachments WHERE id = ?",
            [&attachment_id],
            |r| r.get(0),
        )
        .optional()?
        .ok_or_else(|| IpcError::not_found("attachment not found"))?;

    if !attachments::blob_path(ws, &sha).is_file() {
        return Err(IpcError::new("integrity_failed", "attachment blob is missing")
            .with_details(json!({ "sha256": sha })));
    }
    if !attachments::verify_blob(ws, &sha)? {
        return Err(
            IpcError::new("integrity_failed", "attachment content does not match its hash")
                .with_details(json!({ "sha256": sha })),
        );
    }
    let bytes = attachments::export_blob(ws, &sha, &out_path)?;
    Ok(json!({ "outPath": out_path.to_string_lossy(), "sizeBytes": bytes }))
}

fn handle_attachments_delete(state: &mut AppState, req: &Request) -> Result<JsonValue, IpcError> {
    let conn = db_conn(state)?;
    let ws = workspace_path(state)?;
    let attachment_id = required_str(&req.params, "attachmentId")?;
    let sha: String = conn
        .query_row(
            "SELECT sha256 FROM attachments WHERE id = ?",
            [&attachment_id],
            |r| r.get(0),
        )
        .optional()?
        .ok_or_else(|| IpcError::not_found("attachment not found"))?;
    conn.execute("DELETE FROM attachments WHERE id = ?", [&attachment_id])
        .map_err(IpcError::db("db_delete_failed"))?;
    prune_blobs(conn, ws, &[sha]);
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "attachments.add" => handle_attachments_add(state, req),
        "attachments.list" => handle_attachments_list(state, req),
        "attachments.export" => handle_attachments_export(state, req),
        "attachments.delete" => handle_attachments_delete(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}

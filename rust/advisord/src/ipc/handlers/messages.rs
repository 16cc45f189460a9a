use crate::ipc::error::{respond, IpcError};
use crate::ipc::handlers::attachments::prune_blobs;
use crate::ipc::helpers::{
    db_conn, ensure_exists, new_id, now_ts, parse_bool, parse_opt_string, required_str,
};
use crate::ipc::records::{user_role, ROLE_ADVISOR};
use crate::ipc::types::{AppState, Request};
use rusqlite::{params, OptionalExtension};
use serde_json::{json, Value as JsonValue};

const KIND_MESSAGE: &str = "message";
const KIND_FEEDBACK: &str = "feedback";

const MESSAGE_COLUMNS: &str = "m.id, m.sender_id, m.recipient_id, m.kind, m.subject, m.body,
    m.plan_id, m.created_at, m.read_at,
    (SELECT COUNT(*) FROM attachments a WHERE a.message_id = m.id)";

fn message_to_json(row: &rusqlite::Row<'_>) -> rusqlite::Result<JsonValue> {
    Ok(json!({
        "id": row.get::<_, String>(0)?,
        "senderId": row.get::<_, String>(1)?,
        "recipientId": row.get::<_, String>(2)?,
        "kind": row.get::<_, String>(3)?,
        "subject": row.get::<_, Option<String>>(4)?,
        "body": row.get::<_, String>(5)?,
        "planId": row.get::<_, Option<String>>(6)?,
        "createdAt": row.get::<_, String>(7)?,
        "readAt": row.get::<_, Option<String>>(8)?,
        "attachmentCount": row.get::<_, i64>(9)?,
    }))
}

fn handle_messages_send(state: &mut AppState, req: &Request) -> Result<JsonValue, IpcError> {
    let conn = db_conn(state)?;
    let sender_id = required_str(&req.params, "senderId")?;
    let recipient_id = required_str(&req.params, "recipientId")?;
    let body = required_str(&req.params, "body")?;
    let subject = parse_opt_string(req.params.get("subject"), "subject")?;
    let plan_id = parse_opt_string(req.params.get("planId"), "planId")?;
    let kind = parse_opt_string(req.params.get("kind"), "kind")?
        .map(|k| k.to_ascii_lowercase())
        .unwrap_or_else(|| KIND_MESSAGE.to_string());

    if sender_id == recipient_id {
        return Err(IpcError::bad_params("sender and recipient must differ"));
    }
    let sender_role = user_role(conn, &sender_id)?
        .ok_or_else(|| IpcError::not_found("sender not found"))?;
    ensure_exists(conn, "users", &recipient_id, "recipient")?;
    match kind.as_str() {
        KIND_MESSAGE => {}
        KIND_FEEDBACK => {
            if sender_role != ROLE_ADVISOR {
                return Err(IpcError::bad_params("feedback must come from an advisor"));
            }
        }
        other => return Err(IpcError::bad_params(format!("unknown kind: {}", other))),
    }
    if let Some(pid) = plan_id.as_deref() {
        let owner: String = conn
            .query_row(
                "SELECT student_id FROM student_plans WHERE id = ?",
                [pid],
                |r| r.get(0),
            )
            .optional()?
            .ok_or_else(|| IpcError::not_found("plan not found"))?;
        if owner != sender_id && owner != recipient_id {
            return Err(IpcError::bad_params(
                "planId must belong to the sender or recipient",
            ));
        }
    }

    let message_id = new_id();
    conn.execute(
        "INSERT INTO messages(id, sender_id, recipient_id, kind, subject, body, plan_id, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            message_id,
            sender_id,
            recipient_id,
            kind,
            subject,
            body,
            plan_id,
            now_ts()
        ],
    )
    .map_err(IpcError::db("db_insert_failed"))?;
    tracing::debug!(message_id = %message_id, kind = %kind, "message sent");
    Ok(json!({ "messageId": message_id }))
}

fn handle_messages_list(state: &mut AppState, req: &Request) -> Result<JsonValue, IpcError> {
    let conn = db_conn(state)?;
    let user_id = required_str(&req.params, "userId")?;
    ensure_exists(conn, "users", &user_id, "user")?;
    let box_name = parse_opt_string(req.params.get("box"), "box")?
        .unwrap_or_else(|| "inbox".to_string());
    let unread_only = parse_bool(req.params.get("unreadOnly"), false, "unreadOnly")?;
    let column = match box_name.as_str() {
        "inbox" => "m.recipient_id",
        "sent" => "m.sender_id",
        other => return Err(IpcError::bad_params(format!("unknown box: {}", other))),
    };
    let mut sql = format!(
        "SELECT {} FROM messages m WHERE {} = ?",
        MESSAGE_COLUMNS, column
    );
    if unread_only {
        sql.push_str(" AND m.read_at IS NULL");
    }
    sql.push_str(" ORDER BY m.created_at DESC, m.rowid DESC");

    let mut stmt = conn.prepare(&sql)?;
    let messages = stmt
        .query_map([&user_id], message_to_json)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "messages": messages }))
}

fn handle_messages_thread(state: &mut AppState, req: &Request) -> Result<JsonValue, IpcError> {
    let conn = db_conn(state)?;
    let user_a = required_str(&req.params, "userA")?;
    let user_b = required_str(&req.params, "userB")?;
    ensure_exists(conn, "users", &user_a, "user")?;
    ensure_exists(conn, "users", &user_b, "user")?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM messages m
         WHERE (m.sender_id = ?1 AND m.recipient_id = ?2)
            OR (m.sender_id = ?2 AND m.recipient_id = ?1)
         ORDER BY m.created_at, m.rowid",
        MESSAGE_COLUMNS
    ))?;
    let messages = stmt
        .query_map(params![user_a, user_b], message_to_json)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "messages": messages }))
}

fn handle_messages_mark_read(state: &mut AppState, req: &Request) -> Result<JsonValue, IpcError> {
    let conn = db_conn(state)?;
    let message_id = required_str(&req.params, "messageId")?;
    ensure_exists(conn, "messages", &message_id, "message")?;
    conn.execute(
        "UPDATE messages SET read_at = COALESCE(read_at, ?) WHERE id = ?",
        params![now_ts(), message_id],
    )
    .map_err(IpcError::db("db_update_failed"))?;
    let read_at: Option<String> = conn.query_row(
        "SELECT read_at FROM messages WHERE id = ?",
        [&message_id],
        |r| r.get(0),
    )?;
    Ok(json!({ "messageId": message_id, "readAt": read_at }))
}

fn handle_messages_delete(state: &mut AppState, req: &Request) -> Result<JsonValue, IpcError> {
    let conn = db_conn(state)?;
    let message_id = required_str(&req.params, "messageId")?;
    ensure_exists(conn, "messages", &message_id, "message")?;

    let mut sha_stmt =
        conn.prepare("SELECT DISTINCT sha256 FROM attachments WHERE message_id = ?")?;
    let shas = sha_stmt
        .query_map([&message_id], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    let tx = conn
        .unchecked_transaction()
        .map_err(IpcError::db("db_tx_failed"))?;
    if let Err(e) = tx.execute("DELETE FROM attachments WHERE message_id = ?", [&message_id]) {
        let _ = tx.rollback();
        return Err(IpcError::new("db_delete_failed", e.to_string())
            .with_details(json!({ "table": "attachments" })));
    }
    if let Err(e) = tx.execute("DELETE FROM messages WHERE id = ?", [&message_id]) {
        let _ = tx.rollback();
        return Err(IpcError::new("db_delete_failed", e.to_string())
            .with_details(json!({ "table": "messages" })));
    }
    tx.commit().map_err(IpcError::db("db_commit_failed"))?;

    if let Some(ws) = state.workspace.as_deref() {
        prune_blobs(conn, ws, &shas);
    }
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "messages.send" => handle_messages_send(state, req),
        "messages.list" => handle_messages_list(state, req),
        "messages.thread" => handle_messages_thread(state, req),
        "messages.markRead" => handle_messages_mark_read(state, req),
        "messages.delete" => handle_messages_delete(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}

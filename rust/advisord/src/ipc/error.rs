use crate::ipc::types::Request;
use crate::plan::PlanError;
use serde_json::json;
use thiserror::Error;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

/// Handler failure carried back to the caller as an `ok: false` envelope.
#[derive(Debug, Error)]
#[error("{code}: {message}")]
pub struct IpcError {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl IpcError {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("not_found", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("conflict", message)
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Maps a SQLite failure to `code`, or to `conflict` for constraint
    /// violations.
    pub fn db(code: &'static str) -> impl FnOnce(rusqlite::Error) -> IpcError {
        move |e| {
            if e.sqlite_error_code() == Some(rusqlite::ErrorCode::ConstraintViolation) {
                IpcError::conflict(e.to_string())
            } else {
                IpcError::new(code, e.to_string())
            }
        }
    }
}

impl From<rusqlite::Error> for IpcError {
    fn from(e: rusqlite::Error) -> Self {
        IpcError::db("db_query_failed")(e)
    }
}

impl From<PlanError> for IpcError {
    fn from(e: PlanError) -> Self {
        IpcError::bad_params(e.to_string())
    }
}

impl From<anyhow::Error> for IpcError {
    fn from(e: anyhow::Error) -> Self {
        IpcError::new("io_failed", format!("{e:#}"))
    }
}

pub fn respond(req: &Request, result: Result<serde_json::Value, IpcError>) -> serde_json::Value {
    match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => {
            tracing::warn!(id = %req.id, method = %req.method, code = e.code, "{}", e.message);
            err(&req.id, e.code, e.message, e.details)
        }
    }
}

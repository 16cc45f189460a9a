use crate::ipc::error::IpcError;
use crate::ipc::types::AppState;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension};
use serde_json::Value as JsonValue;
use std::path::Path;
use uuid::Uuid;

pub fn db_conn(state: &AppState) -> Result<&Connection, IpcError> {
    state
        .db
        .as_ref()
        .ok_or_else(|| IpcError::new("no_workspace", "select a workspace first"))
}

pub fn workspace_path(state: &AppState) -> Result<&Path, IpcError> {
    state
        .workspace
        .as_deref()
        .ok_or_else(|| IpcError::new("no_workspace", "select a workspace first"))
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn now_ts() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_ts(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

pub fn required_str(params: &JsonValue, key: &str) -> Result<String, IpcError> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| IpcError::bad_params(format!("missing {}", key)))
}

pub fn required_object<'a>(
    params: &'a JsonValue,
    key: &str,
) -> Result<&'a serde_json::Map<String, JsonValue>, IpcError> {
    params
        .get(key)
        .and_then(|v| v.as_object())
        .ok_or_else(|| IpcError::bad_params(format!("missing {}", key)))
}

/// Missing, null and blank strings all read as `None`.
pub fn parse_opt_string(v: Option<&JsonValue>, label: &str) -> Result<Option<String>, IpcError> {
    match v {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => {
            let s = v
                .as_str()
                .ok_or_else(|| IpcError::bad_params(format!("{} must be string or null", label)))?
                .trim()
                .to_string();
            if s.is_empty() {
                Ok(None)
            } else {
                Ok(Some(s))
            }
        }
    }
}

pub fn parse_opt_u32(v: Option<&JsonValue>, label: &str) -> Result<Option<u32>, IpcError> {
    match v {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| {
                IpcError::bad_params(format!("{} must be a non-negative integer or null", label))
            }),
    }
}

pub fn parse_opt_f64(v: Option<&JsonValue>, label: &str) -> Result<Option<f64>, IpcError> {
    match v {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v
            .as_f64()
            .filter(|n| n.is_finite())
            .map(Some)
            .ok_or_else(|| IpcError::bad_params(format!("{} must be a number or null", label))),
    }
}

pub fn parse_bool(v: Option<&JsonValue>, default: bool, label: &str) -> Result<bool, IpcError> {
    match v {
        None => Ok(default),
        Some(v) if v.is_null() => Ok(default),
        Some(v) => v
            .as_bool()
            .ok_or_else(|| IpcError::bad_params(format!("{} must be boolean", label))),
    }
}

pub fn parse_string_array(v: Option<&JsonValue>, label: &str) -> Result<Vec<String>, IpcError> {
    match v {
        None => Ok(Vec::new()),
        Some(v) if v.is_null() => Ok(Vec::new()),
        Some(v) => {
            let bad = || IpcError::bad_params(format!("{} must be array of strings", label));
            let arr = v.as_array().ok_or_else(bad)?;
            let mut out = Vec::with_capacity(arr.len());
            for item in arr {
                let s = item.as_str().ok_or_else(bad)?.trim().to_string();
                if !s.is_empty() {
                    out.push(s);
                }
            }
            Ok(out)
        }
    }
}

pub fn json_array_string(values: &[String]) -> String {
    serde_json::to_string(values).unwrap_or_else(|_| "[]".to_string())
}

pub fn parse_json_array_string(raw: &str) -> Vec<String> {
    serde_json::from_str::<Vec<String>>(raw).unwrap_or_default()
}

pub fn row_exists(conn: &Connection, sql: &str, id: &str) -> Result<bool, IpcError> {
    Ok(conn
        .query_row(sql, [id], |_r| Ok(()))
        .optional()?
        .is_some())
}

pub fn ensure_exists(conn: &Connection, table: &str, id: &str, what: &str) -> Result<(), IpcError> {
    let sql = format!("SELECT 1 FROM {} WHERE id = ?", table);
    if row_exists(conn, &sql, id)? {
        Ok(())
    } else {
        Err(IpcError::not_found(format!("{} not found", what)))
    }
}

use crate::db;
use crate::ipc::error::{respond, IpcError};
use crate::ipc::helpers::{db_conn, required_object, required_str};
use crate::ipc::types::{AppState, Request};
use crate::plan::SentinelTokens;
use rusqlite::Connection;
use serde_json::{json, Map, Value as JsonValue};

const SECTION_PLANNING: &str = "planning";
const SECTION_ATTACHMENTS: &str = "attachments";

const DEFAULT_SEMESTERS_PER_YEAR: u32 = 2;
const DEFAULT_MAX_ATTACHMENT_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Clone, Debug)]
pub struct PlanningSetup {
    pub semesters_per_year: u32,
    pub tokens: SentinelTokens,
}

#[derive(Clone, Debug)]
pub struct AttachmentSetup {
    pub max_bytes: u64,
}

fn settings_key(section: &str) -> String {
    format!("setup.{}", section)
}

fn load_setup_section(conn: &Connection, section: &str) -> Map<String, JsonValue> {
    db::settings_get_json(conn, &settings_key(section))
        .ok()
        .flatten()
        .and_then(|v| v.as_object().cloned())
        .unwrap_or_default()
}

fn token_list(obj: &Map<String, JsonValue>, key: &str, default: Vec<String>) -> Vec<String> {
    obj.get(key)
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str())
                .map(|s| s.trim().to_ascii_uppercase())
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
        })
        .filter(|v| !v.is_empty())
        .unwrap_or(default)
}

pub fn load_planning_setup(conn: &Connection) -> PlanningSetup {
    let obj = load_setup_section(conn, SECTION_PLANNING);
    let semesters_per_year = obj
        .get("semestersPerYear")
        .and_then(|v| v.as_u64())
        .and_then(|v| u32::try_from(v).ok())
        .filter(|v| *v > 0)
        .unwrap_or(DEFAULT_SEMESTERS_PER_YEAR);
    let defaults = SentinelTokens::default();
    PlanningSetup {
        semesters_per_year,
        tokens: SentinelTokens {
            gap: token_list(&obj, "gapTokens", defaults.gap),
            outbound: token_list(&obj, "outboundTokens", defaults.outbound),
        },
    }
}

pub fn load_attachment_setup(conn: &Connection) -> AttachmentSetup {
    let obj = load_setup_section(conn, SECTION_ATTACHMENTS);
    let max_bytes = obj
        .get("maxBytes")
        .and_then(|v| v.as_u64())
        .filter(|v| *v > 0)
        .unwrap_or(DEFAULT_MAX_ATTACHMENT_BYTES);
    AttachmentSetup { max_bytes }
}

fn planning_json(s: &PlanningSetup) -> JsonValue {
    json!({
        "semestersPerYear": s.semesters_per_year,
        "gapTokens": s.tokens.gap,
        "outboundTokens": s.tokens.outbound,
    })
}

fn attachments_json(s: &AttachmentSetup) -> JsonValue {
    json!({ "maxBytes": s.max_bytes })
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> Result<JsonValue, IpcError> {
    let conn = db_conn(state)?;
    let planning = planning_json(&load_planning_setup(conn));
    let attachments = attachments_json(&load_attachment_setup(conn));
    match req.params.get("section").and_then(|v| v.as_str()) {
        None => Ok(json!({ "planning": planning, "attachments": attachments })),
        Some(SECTION_PLANNING) => Ok(planning),
        Some(SECTION_ATTACHMENTS) => Ok(attachments),
        Some(other) => Err(IpcError::bad_params(format!("unknown section: {}", other))),
    }
}

fn validate_token_array(v: &JsonValue, label: &str) -> Result<(), IpcError> {
    let ok = v
        .as_array()
        .map(|arr| {
            !arr.is_empty()
                && arr
                    .iter()
                    .all(|t| t.as_str().map(|s| !s.trim().is_empty()).unwrap_or(false))
        })
        .unwrap_or(false);
    if ok {
        Ok(())
    } else {
        Err(IpcError::bad_params(format!(
            "patch.{} must be a non-empty array of strings",
            label
        )))
    }
}

fn validate_patch(section: &str, patch: &Map<String, JsonValue>) -> Result<(), IpcError> {
    for (k, v) in patch {
        match (section, k.as_str()) {
            (SECTION_PLANNING, "semestersPerYear") => {
                let n = v.as_u64().unwrap_or(0);
                if !(1..=6).contains(&n) {
                    return Err(IpcError::bad_params(
                        "patch.semestersPerYear must be an integer in 1..=6",
                    ));
                }
            }
            (SECTION_PLANNING, "gapTokens") | (SECTION_PLANNING, "outboundTokens") => {
                validate_token_array(v, k)?;
            }
            (SECTION_ATTACHMENTS, "maxBytes") => {
                if v.as_u64().filter(|n| *n > 0).is_none() {
                    return Err(IpcError::bad_params(
                        "patch.maxBytes must be a positive integer",
                    ));
                }
            }
            _ => {
                return Err(IpcError::bad_params(format!(
                    "unknown setting {}.{}",
                    section, k
                )))
            }
        }
    }
    Ok(())
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> Result<JsonValue, IpcError> {
    let conn = db_conn(state)?;
    let section = required_str(&req.params, "section")?;
    if section != SECTION_PLANNING && section != SECTION_ATTACHMENTS {
        return Err(IpcError::bad_params(format!("unknown section: {}", section)));
    }
    let patch = required_object(&req.params, "patch")?;
    validate_patch(&section, patch)?;

    let mut current = load_setup_section(conn, &section);
    for (k, v) in patch {
        current.insert(k.clone(), v.clone());
    }
    db::settings_set_json(conn, &settings_key(&section), &JsonValue::Object(current))
        .map_err(|e| IpcError::new("db_update_failed", e.to_string()))?;
    tracing::info!(section = %section, "setup updated");

    let updated = if section == SECTION_PLANNING {
        planning_json(&load_planning_setup(conn))
    } else {
        attachments_json(&load_attachment_setup(conn))
    };
    Ok(updated)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "setup.get" => handle_setup_get(state, req),
        "setup.update" => handle_setup_update(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}

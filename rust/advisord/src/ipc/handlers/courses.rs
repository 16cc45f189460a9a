use crate::ipc::error::{respond, IpcError};
use crate::ipc::helpers::{
    db_conn, ensure_exists, new_id, now_ts, parse_opt_f64, parse_opt_string, required_object,
    required_str,
};
use crate::ipc::records::parse_course_type;
use crate::ipc::types::{AppState, Request};
use crate::plan::{effective_course_type, override_for, CourseType, TypeOverride};
use rusqlite::{params, types::Value, Connection, OptionalExtension};
use serde_json::{json, Value as JsonValue};

fn course_to_json(row: &rusqlite::Row<'_>) -> rusqlite::Result<JsonValue> {
    Ok(json!({
        "id": row.get::<_, String>(0)?,
        "code": row.get::<_, String>(1)?,
        "title": row.get::<_, String>(2)?,
        "credits": row.get::<_, f64>(3)?,
        "defaultType": row.get::<_, Option<String>>(4)?,
        "createdAt": row.get::<_, String>(5)?,
        "updatedAt": row.get::<_, String>(6)?,
    }))
}

fn parse_type(v: Option<&JsonValue>, label: &str) -> Result<Option<CourseType>, IpcError> {
    match parse_opt_string(v, label)? {
        None => Ok(None),
        Some(s) => s
            .parse::<CourseType>()
            .map(Some)
            .map_err(IpcError::bad_params),
    }
}

fn parse_credits(v: Option<&JsonValue>, label: &str) -> Result<f64, IpcError> {
    let n = parse_opt_f64(v, label)?
        .ok_or_else(|| IpcError::bad_params(format!("missing {}", label)))?;
    if n < 0.0 {
        return Err(IpcError::bad_params(format!("{} must be >= 0", label)));
    }
    Ok(n)
}

fn course_overrides(conn: &Connection, course_id: &str) -> Result<Vec<TypeOverride>, IpcError> {
    let mut stmt = conn.prepare(
        "SELECT programme_id, course_type FROM course_type_overrides
         WHERE course_id = ?
         ORDER BY rowid",
    )?;
    let rows = stmt
        .query_map([course_id], |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows
        .into_iter()
        .filter_map(|(programme_id, t)| {
            t.parse().ok().map(|course_type| TypeOverride {
                programme_id,
                course_type,
            })
        })
        .collect())
}

fn handle_courses_list(state: &mut AppState, _req: &Request) -> Result<JsonValue, IpcError> {
    let Some(conn) = state.db.as_ref() else {
        return Ok(json!({ "courses": [] }));
    };
    let mut stmt = conn.prepare(
        "SELECT id, code, title, credits, default_type, created_at, updated_at
         FROM courses
         ORDER BY code",
    )?;
    let courses = stmt
        .query_map([], course_to_json)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "courses": courses }))
}

fn handle_courses_create(state: &mut AppState, req: &Request) -> Result<JsonValue, IpcError> {
    let conn = db_conn(state)?;
    let code = required_str(&req.params, "code")?.to_ascii_uppercase();
    let title = required_str(&req.params, "title")?;
    let credits = parse_credits(req.params.get("credits"), "credits")?;
    let default_type = parse_type(req.params.get("defaultType"), "defaultType")?;

    let course_id = new_id();
    let ts = now_ts();
    conn.execute(
        "INSERT INTO courses(id, code, title, credits, default_type, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        params![
            course_id,
            code,
            title,
            credits,
            default_type.map(|t| t.as_str()),
            ts,
            ts
        ],
    )
    .map_err(IpcError::db("db_insert_failed"))?;
    Ok(json!({ "courseId": course_id, "code": code }))
}

fn handle_courses_get(state: &mut AppState, req: &Request) -> Result<JsonValue, IpcError> {
    let conn = db_conn(state)?;
    let course_id = required_str(&req.params, "courseId")?;
    let mut course = conn
        .query_row(
            "SELECT id, code, title, credits, default_type, created_at, updated_at
             FROM courses WHERE id = ?",
            [&course_id],
            course_to_json,
        )
        .optional()?
        .ok_or_else(|| IpcError::not_found("course not found"))?;
    course["overrides"] = json!(course_overrides(conn, &course_id)?);
    Ok(course)
}

fn handle_courses_update(state: &mut AppState, req: &Request) -> Result<JsonValue, IpcError> {
    let conn = db_conn(state)?;
    let course_id = required_str(&req.params, "courseId")?;
    let patch = required_object(&req.params, "patch")?;
    ensure_exists(conn, "courses", &course_id, "course")?;

    let mut fields: Vec<&str> = Vec::new();
    let mut values: Vec<Value> = Vec::new();
    for (k, v) in patch {
        match k.as_str() {
            "code" => {
                let s = parse_opt_string(Some(v), "patch.code")?
                    .ok_or_else(|| IpcError::bad_params("patch.code must not be empty"))?;
                fields.push("code = ?");
                values.push(Value::Text(s.to_ascii_uppercase()));
            }
            "title" => {
                let s = parse_opt_string(Some(v), "patch.title")?
                    .ok_or_else(|| IpcError::bad_params("patch.title must not be empty"))?;
                fields.push("title = ?");
                values.push(Value::Text(s));
            }
            "credits" => {
                fields.push("credits = ?");
                values.push(Value::Real(parse_credits(Some(v), "patch.credits")?));
            }
            "defaultType" => {
                fields.push("default_type = ?");
                values.push(match parse_type(Some(v), "patch.defaultType")? {
                    Some(t) => Value::Text(t.as_str().to_string()),
                    None => Value::Null,
                });
            }
            other => {
                return Err(IpcError::bad_params(format!("unknown patch field: {}", other)));
            }
        }
    }
    if fields.is_empty() {
        return Ok(json!({ "ok": true }));
    }

    fields.push("updated_at = ?");
    values.push(Value::Text(now_ts()));
    values.push(Value::Text(course_id));
    let sql = format!("UPDATE courses SET {} WHERE id = ?", fields.join(", "));
    conn.execute(&sql, rusqlite::params_from_iter(values))
        .map_err(IpcError::db("db_update_failed"))?;
    Ok(json!({ "ok": true }))
}

/// Profile entries keep their course code; only the catalog row and its
/// overrides go.
fn handle_courses_delete(state: &mut AppState, req: &Request) -> Result<JsonValue, IpcError> {
    let conn = db_conn(state)?;
    let course_id = required_str(&req.params, "courseId")?;
    ensure_exists(conn, "courses", &course_id, "course")?;

    let tx = conn
        .unchecked_transaction()
        .map_err(IpcError::db("db_tx_failed"))?;
    if let Err(e) = tx.execute(
        "DELETE FROM course_type_overrides WHERE course_id = ?",
        [&course_id],
    ) {
        let _ = tx.rollback();
        return Err(IpcError::new("db_delete_failed", e.to_string())
            .with_details(json!({ "table": "course_type_overrides" })));
    }
    if let Err(e) = tx.execute("DELETE FROM courses WHERE id = ?", [&course_id]) {
        let _ = tx.rollback();
        return Err(IpcError::new("db_delete_failed", e.to_string())
            .with_details(json!({ "table": "courses" })));
    }
    tx.commit().map_err(IpcError::db("db_commit_failed"))?;
    Ok(json!({ "ok": true }))
}

fn handle_overrides_set(state: &mut AppState, req: &Request) -> Result<JsonValue, IpcError> {
    let conn = db_conn(state)?;
    let course_id = required_str(&req.params, "courseId")?;
    let programme_id = required_str(&req.params, "programmeId")?;
    let course_type = parse_type(req.params.get("courseType"), "courseType")?
        .ok_or_else(|| IpcError::bad_params("missing courseType"))?;
    ensure_exists(conn, "courses", &course_id, "course")?;
    ensure_exists(conn, "programmes", &programme_id, "programme")?;

    conn.execute(
        "INSERT INTO course_type_overrides(course_id, programme_id, course_type)
         VALUES(?, ?, ?)
         ON CONFLICT(course_id, programme_id) DO UPDATE SET course_type = excluded.course_type",
        params![course_id, programme_id, course_type.as_str()],
    )
    .map_err(IpcError::db("db_insert_failed"))?;
    Ok(json!({
        "courseId": course_id,
        "programmeId": programme_id,
        "courseType": course_type,
    }))
}

fn handle_overrides_clear(state: &mut AppState, req: &Request) -> Result<JsonValue, IpcError> {
    let conn = db_conn(state)?;
    let course_id = required_str(&req.params, "courseId")?;
    let programme_id = required_str(&req.params, "programmeId")?;
    let removed = conn
        .execute(
            "DELETE FROM course_type_overrides WHERE course_id = ? AND programme_id = ?",
            params![course_id, programme_id],
        )
        .map_err(IpcError::db("db_delete_failed"))?;
    Ok(json!({ "removed": removed > 0 }))
}

fn handle_effective_type(state: &mut AppState, req: &Request) -> Result<JsonValue, IpcError> {
    let conn = db_conn(state)?;
    let course_id = required_str(&req.params, "courseId")?;
    let programme_id = required_str(&req.params, "programmeId")?;
    let default_type: Option<String> = conn
        .query_row(
            "SELECT default_type FROM courses WHERE id = ?",
            [&course_id],
            |r| r.get(0),
        )
        .optional()?
        .ok_or_else(|| IpcError::not_found("course not found"))?;
    let default_type = parse_course_type(default_type);
    let overrides = course_overrides(conn, &course_id)?;

    Ok(json!({
        "courseId": course_id,
        "programmeId": programme_id,
        "defaultType": default_type,
        "overrideType": override_for(&overrides, &programme_id),
        "effectiveType": effective_course_type(default_type, &overrides, &programme_id),
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "courses.list" => handle_courses_list(state, req),
        "courses.create" => handle_courses_create(state, req),
        "courses.get" => handle_courses_get(state, req),
        "courses.update" => handle_courses_update(state, req),
        "courses.delete" => handle_courses_delete(state, req),
        "courses.overrides.set" => handle_overrides_set(state, req),
        "courses.overrides.clear" => handle_overrides_clear(state, req),
        "courses.effectiveType" => handle_effective_type(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}

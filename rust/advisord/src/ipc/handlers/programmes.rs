use crate::ipc::error::{respond, IpcError};
use crate::ipc::handlers::setup::load_planning_setup;
use crate::ipc::helpers::{
    db_conn, ensure_exists, json_array_string, new_id, now_ts, parse_json_array_string,
    parse_opt_f64, parse_opt_string, parse_opt_u32, parse_string_array, required_object,
    required_str,
};
use crate::ipc::records::{load_programme, programme_mapping, ROLE_STUDENT};
use crate::ipc::types::{AppState, Request};
use crate::plan::{normalize_code, AcademicSession};
use rusqlite::{params, types::Value, Connection, OptionalExtension};
use serde_json::{json, Value as JsonValue};

fn programme_to_json(row: &rusqlite::Row<'_>) -> rusqlite::Result<JsonValue> {
    Ok(json!({
        "id": row.get::<_, String>(0)?,
        "code": row.get::<_, String>(1)?,
        "name": row.get::<_, String>(2)?,
        "totalCredits": row.get::<_, f64>(3)?,
        "createdAt": row.get::<_, String>(4)?,
        "updatedAt": row.get::<_, String>(5)?,
    }))
}

fn semester_to_json(row: &rusqlite::Row<'_>) -> rusqlite::Result<JsonValue> {
    let courses_json: String = row.get(4)?;
    Ok(json!({
        "id": row.get::<_, String>(0)?,
        "programmeId": row.get::<_, String>(1)?,
        "academicYear": row.get::<_, Option<String>>(2)?,
        "semester": row.get::<_, Option<i64>>(3)?,
        "courses": parse_json_array_string(&courses_json),
        "createdAt": row.get::<_, String>(5)?,
        "updatedAt": row.get::<_, String>(6)?,
    }))
}

fn required_credits(v: Option<&JsonValue>, label: &str) -> Result<f64, IpcError> {
    let n = parse_opt_f64(v, label)?
        .ok_or_else(|| IpcError::bad_params(format!("missing {}", label)))?;
    if n < 0.0 {
        return Err(IpcError::bad_params(format!("{} must be >= 0", label)));
    }
    Ok(n)
}

fn handle_programmes_list(state: &mut AppState, _req: &Request) -> Result<JsonValue, IpcError> {
    let Some(conn) = state.db.as_ref() else {
        return Ok(json!({ "programmes": [] }));
    };
    let mut stmt = conn.prepare(
        "SELECT p.id, p.code, p.name, p.total_credits, p.created_at, p.updated_at,
                (SELECT COUNT(*) FROM users u WHERE u.programme_id = p.id) AS student_count,
                (SELECT COUNT(*) FROM programme_semesters s WHERE s.programme_id = p.id) AS semester_count
         FROM programmes p
         ORDER BY p.code",
    )?;
    let programmes = stmt
        .query_map([], |r| {
            let mut v = programme_to_json(r)?;
            v["studentCount"] = json!(r.get::<_, i64>(6)?);
            v["semesterCount"] = json!(r.get::<_, i64>(7)?);
            Ok(v)
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "programmes": programmes }))
}

fn handle_programmes_create(state: &mut AppState, req: &Request) -> Result<JsonValue, IpcError> {
    let conn = db_conn(state)?;
    let code = required_str(&req.params, "code")?.to_ascii_uppercase();
    let name = required_str(&req.params, "name")?;
    let total_credits = required_credits(req.params.get("totalCredits"), "totalCredits")?;

    let programme_id = new_id();
    let ts = now_ts();
    conn.execute(
        "INSERT INTO programmes(id, code, name, total_credits, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        params![programme_id, code, name, total_credits, ts, ts],
    )
    .map_err(IpcError::db("db_insert_failed"))?;
    tracing::info!(programme_id = %programme_id, code = %code, "programme created");
    Ok(json!({ "programmeId": programme_id }))
}

fn handle_programmes_get(state: &mut AppState, req: &Request) -> Result<JsonValue, IpcError> {
    let conn = db_conn(state)?;
    let programme_id = required_str(&req.params, "programmeId")?;
    conn.query_row(
        "SELECT id, code, name, total_credits, created_at, updated_at
         FROM programmes WHERE id = ?",
        [&programme_id],
        programme_to_json,
    )
    .optional()?
    .ok_or_else(|| IpcError::not_found("programme not found"))
}

fn handle_programmes_update(state: &mut AppState, req: &Request) -> Result<JsonValue, IpcError> {
    let conn = db_conn(state)?;
    let programme_id = required_str(&req.params, "programmeId")?;
    let patch = required_object(&req.params, "patch")?;
    ensure_exists(conn, "programmes", &programme_id, "programme")?;

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
            "name" => {
                let s = parse_opt_string(Some(v), "patch.name")?
                    .ok_or_else(|| IpcError::bad_params("patch.name must not be empty"))?;
                fields.push("name = ?");
                values.push(Value::Text(s));
            }
            "totalCredits" => {
                fields.push("total_credits = ?");
                values.push(Value::Real(required_credits(
                    Some(v),
                    "patch.totalCredits",
                )?));
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
    values.push(Value::Text(programme_id));
    let sql = format!("UPDATE programmes SET {} WHERE id = ?", fields.join(", "));
    conn.execute(&sql, rusqlite::params_from_iter(values))
        .map_err(IpcError::db("db_update_failed"))?;
    Ok(json!({ "ok": true }))
}

fn handle_programmes_delete(state: &mut AppState, req: &Request) -> Result<JsonValue, IpcError> {
    let conn = db_conn(state)?;
    let programme_id = required_str(&req.params, "programmeId")?;
    ensure_exists(conn, "programmes", &programme_id, "programme")?;

    let enrolled: i64 = conn.query_row(
        "SELECT COUNT(*) FROM users WHERE programme_id = ? AND role = ?",
        params![programme_id, ROLE_STUDENT],
        |r| r.get(0),
    )?;
    if enrolled > 0 {
        return Err(
            IpcError::conflict("programme still has enrolled students")
                .with_details(json!({ "studentCount": enrolled })),
        );
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(IpcError::db("db_tx_failed"))?;

    let steps: [(&str, &str); 5] = [
        (
            "messages",
            "UPDATE messages SET plan_id = NULL
             WHERE plan_id IN (SELECT id FROM student_plans WHERE programme_id = ?1)",
        ),
        (
            "student_plans",
            "DELETE FROM student_plans WHERE programme_id = ?1",
        ),
        (
            "course_type_overrides",
            "DELETE FROM course_type_overrides WHERE programme_id = ?1",
        ),
        (
            "programme_semesters",
            "DELETE FROM programme_semesters WHERE programme_id = ?1",
        ),
        ("programmes", "DELETE FROM programmes WHERE id = ?1"),
    ];
    for (table, sql) in steps {
        if let Err(e) = tx.execute(sql, [&programme_id]) {
            let _ = tx.rollback();
            return Err(IpcError::new("db_delete_failed", e.to_string())
                .with_details(json!({ "table": table })));
        }
    }
    tx.commit().map_err(IpcError::db("db_commit_failed"))?;
    tracing::info!(programme_id = %programme_id, "programme deleted");
    Ok(json!({ "ok": true }))
}

/// Course codes for a stored semester plan: trimmed, upper-cased, blanks
/// dropped, first occurrence kept.
fn normalized_courses(raw: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(raw.len());
    for code in raw.iter().filter_map(|c| normalize_code(c)) {
        if !out.contains(&code) {
            out.push(code);
        }
    }
    out
}

/// Validates an optional session. Both parts or neither.
fn parse_session(
    conn: &Connection,
    academic_year: Option<String>,
    semester: Option<u32>,
) -> Result<Option<(String, u32)>, IpcError> {
    match (academic_year, semester) {
        (Some(y), Some(s)) => {
            let session = AcademicSession::parse(&y, s)?;
            let per_year = load_planning_setup(conn).semesters_per_year;
            if s > per_year {
                return Err(IpcError::bad_params(format!(
                    "semester must be in 1..={}",
                    per_year
                )));
            }
            Ok(Some((session.label(), s)))
        }
        (None, None) => Ok(None),
        _ => Err(IpcError::bad_params(
            "academicYear and semester must be given together",
        )),
    }
}

fn handle_semesters_list(state: &mut AppState, req: &Request) -> Result<JsonValue, IpcError> {
    let conn = db_conn(state)?;
    let programme_id = required_str(&req.params, "programmeId")?;
    ensure_exists(conn, "programmes", &programme_id, "programme")?;
    let mut stmt = conn.prepare(
        "SELECT id, programme_id, academic_year, semester, courses_json, created_at, updated_at
         FROM programme_semesters
         WHERE programme_id = ?
         ORDER BY rowid",
    )?;
    let semesters = stmt
        .query_map([&programme_id], semester_to_json)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "semesters": semesters }))
}

fn handle_semesters_create(state: &mut AppState, req: &Request) -> Result<JsonValue, IpcError> {
    let conn = db_conn(state)?;
    let programme_id = required_str(&req.params, "programmeId")?;
    ensure_exists(conn, "programmes", &programme_id, "programme")?;
    let session = parse_session(
        conn,
        parse_opt_string(req.params.get("academicYear"), "academicYear")?,
        parse_opt_u32(req.params.get("semester"), "semester")?,
    )?;
    let courses = normalized_courses(parse_string_array(req.params.get("courses"), "courses")?);

    let semester_id = new_id();
    let ts = now_ts();
    conn.execute(
        "INSERT INTO programme_semesters(id, programme_id, academic_year, semester, courses_json, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        params![
            semester_id,
            programme_id,
            session.as_ref().map(|(y, _)| y.clone()),
            session.as_ref().map(|(_, s)| *s),
            json_array_string(&courses),
            ts,
            ts
        ],
    )
    .map_err(IpcError::db("db_insert_failed"))?;
    Ok(json!({ "semesterId": semester_id, "courses": courses }))
}

fn handle_semesters_update(state: &mut AppState, req: &Request) -> Result<JsonValue, IpcError> {
    let conn = db_conn(state)?;
    let semester_id = required_str(&req.params, "semesterId")?;
    let patch = required_object(&req.params, "patch")?;
    let current = conn
        .query_row(
            "SELECT academic_year, semester FROM programme_semesters WHERE id = ?",
            [&semester_id],
            |r| Ok((r.get::<_, Option<String>>(0)?, r.get::<_, Option<u32>>(1)?)),
        )
        .optional()?
        .ok_or_else(|| IpcError::not_found("semester plan not found"))?;

    let (mut academic_year, mut semester) = current;
    let mut courses: Option<Vec<String>> = None;
    for (k, v) in patch {
        match k.as_str() {
            "academicYear" => academic_year = parse_opt_string(Some(v), "patch.academicYear")?,
            "semester" => semester = parse_opt_u32(Some(v), "patch.semester")?,
            "courses" => {
                courses = Some(normalized_courses(parse_string_array(
                    Some(v),
                    "patch.courses",
                )?))
            }
            other => {
                return Err(IpcError::bad_params(format!("unknown patch field: {}", other)));
            }
        }
    }
    let session = parse_session(conn, academic_year, semester)?;

    let mut fields: Vec<&str> = vec!["academic_year = ?", "semester = ?"];
    let mut values: Vec<Value> = vec![
        session
            .as_ref()
            .map(|(y, _)| Value::Text(y.clone()))
            .unwrap_or(Value::Null),
        session
            .as_ref()
            .map(|(_, s)| Value::Integer(i64::from(*s)))
            .unwrap_or(Value::Null),
    ];
    if let Some(c) = courses.as_ref() {
        fields.push("courses_json = ?");
        values.push(Value::Text(json_array_string(c)));
    }
    fields.push("updated_at = ?");
    values.push(Value::Text(now_ts()));
    values.push(Value::Text(semester_id));
    let sql = format!(
        "UPDATE programme_semesters SET {} WHERE id = ?",
        fields.join(", ")
    );
    conn.execute(&sql, rusqlite::params_from_iter(values))
        .map_err(IpcError::db("db_update_failed"))?;
    Ok(json!({ "ok": true }))
}

fn handle_semesters_delete(state: &mut AppState, req: &Request) -> Result<JsonValue, IpcError> {
    let conn = db_conn(state)?;
    let semester_id = required_str(&req.params, "semesterId")?;
    let n = conn
        .execute("DELETE FROM programme_semesters WHERE id = ?", [&semester_id])
        .map_err(IpcError::db("db_delete_failed"))?;
    if n == 0 {
        return Err(IpcError::not_found("semester plan not found"));
    }
    Ok(json!({ "ok": true }))
}

fn handle_programmes_mapping(state: &mut AppState, req: &Request) -> Result<JsonValue, IpcError> {
    let conn = db_conn(state)?;
    let programme_id = required_str(&req.params, "programmeId")?;
    let programme = load_programme(conn, &programme_id)?;
    let setup = load_planning_setup(conn);
    let mapping = programme_mapping(conn, &programme.id, &setup)?;
    Ok(json!({
        "programmeId": programme.id,
        "code": programme.code,
        "name": programme.name,
        "semestersPerYear": setup.semesters_per_year,
        "mapping": mapping.to_labelled_json(),
        "slots": mapping.to_slot_list_json(),
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "programmes.list" => handle_programmes_list(state, req),
        "programmes.create" => handle_programmes_create(state, req),
        "programmes.get" => handle_programmes_get(state, req),
        "programmes.update" => handle_programmes_update(state, req),
        "programmes.delete" => handle_programmes_delete(state, req),
        "programmes.semesters.list" => handle_semesters_list(state, req),
        "programmes.semesters.create" => handle_semesters_create(state, req),
        "programmes.semesters.update" => handle_semesters_update(state, req),
        "programmes.semesters.delete" => handle_semesters_delete(state, req),
        "programmes.mapping" => handle_programmes_mapping(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}

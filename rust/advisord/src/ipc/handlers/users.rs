use crate::ipc::error::{respond, IpcError};
use crate::ipc::handlers::attachments::prune_blobs;
use crate::ipc::handlers::setup::load_planning_setup;
use crate::ipc::helpers::{
    db_conn, ensure_exists, new_id, now_ts, parse_opt_string, parse_opt_u32, required_object,
    required_str,
};
use crate::ipc::records::{load_catalog, load_profile, user_role, ROLE_ADVISOR, ROLE_STUDENT};
use crate::ipc::types::{AppState, Request};
use crate::plan::{compute_progress, PlanPosition};
use rusqlite::{params, types::Value, Connection, OptionalExtension};
use serde_json::{json, Value as JsonValue};

const USER_COLUMNS: &str = "id, role, name, email, programme_id, intake, advisor_id,
    current_year, current_semester, created_at, updated_at";

fn user_to_json(row: &rusqlite::Row<'_>) -> rusqlite::Result<JsonValue> {
    Ok(json!({
        "id": row.get::<_, String>(0)?,
        "role": row.get::<_, String>(1)?,
        "name": row.get::<_, String>(2)?,
        "email": row.get::<_, String>(3)?,
        "programmeId": row.get::<_, Option<String>>(4)?,
        "intake": row.get::<_, Option<String>>(5)?,
        "advisorId": row.get::<_, Option<String>>(6)?,
        "currentYear": row.get::<_, Option<i64>>(7)?,
        "currentSemester": row.get::<_, Option<i64>>(8)?,
        "createdAt": row.get::<_, String>(9)?,
        "updatedAt": row.get::<_, String>(10)?,
    }))
}

fn validate_role(role: &str) -> bool {
    matches!(role, ROLE_STUDENT | ROLE_ADVISOR)
}

fn validate_email(email: &str) -> Result<String, IpcError> {
    let e = email.trim();
    match e.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(e.to_string()),
        _ => Err(IpcError::bad_params(format!("invalid email: {}", email))),
    }
}

fn ensure_advisor(conn: &Connection, advisor_id: &str) -> Result<(), IpcError> {
    match user_role(conn, advisor_id)?.as_deref() {
        None => Err(IpcError::not_found("advisor not found")),
        Some(ROLE_ADVISOR) => Ok(()),
        Some(_) => Err(IpcError::bad_params("advisorId must refer to an advisor")),
    }
}

fn fetch_user(conn: &Connection, user_id: &str) -> Result<JsonValue, IpcError> {
    conn.query_row(
        &format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS),
        [user_id],
        user_to_json,
    )
    .optional()?
    .ok_or_else(|| IpcError::not_found("user not found"))
}

fn handle_users_list(state: &mut AppState, req: &Request) -> Result<JsonValue, IpcError> {
    let Some(conn) = state.db.as_ref() else {
        return Ok(json!({ "users": [] }));
    };
    let role = parse_opt_string(req.params.get("role"), "role")?;
    if let Some(r) = role.as_deref() {
        if !validate_role(r) {
            return Err(IpcError::bad_params(format!("unknown role: {}", r)));
        }
    }

    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM users WHERE (?1 IS NULL OR role = ?1) ORDER BY name, email",
        USER_COLUMNS
    ))?;
    let users = stmt
        .query_map([role], user_to_json)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "users": users }))
}

fn handle_users_get(state: &mut AppState, req: &Request) -> Result<JsonValue, IpcError> {
    let conn = db_conn(state)?;
    let user_id = required_str(&req.params, "userId")?;
    fetch_user(conn, &user_id)
}

fn handle_users_create(state: &mut AppState, req: &Request) -> Result<JsonValue, IpcError> {
    let conn = db_conn(state)?;
    let role = required_str(&req.params, "role")?.to_ascii_lowercase();
    if !validate_role(&role) {
        return Err(IpcError::bad_params(format!("unknown role: {}", role)));
    }
    let name = required_str(&req.params, "name")?;
    let email = validate_email(&required_str(&req.params, "email")?)?;
    let programme_id = parse_opt_string(req.params.get("programmeId"), "programmeId")?;
    let intake = parse_opt_string(req.params.get("intake"), "intake")?;
    let advisor_id = parse_opt_string(req.params.get("advisorId"), "advisorId")?;

    if role != ROLE_STUDENT && (programme_id.is_some() || advisor_id.is_some()) {
        return Err(IpcError::bad_params(
            "programmeId and advisorId apply to students only",
        ));
    }
    if let Some(pid) = programme_id.as_deref() {
        ensure_exists(conn, "programmes", pid, "programme")?;
    }
    if let Some(aid) = advisor_id.as_deref() {
        ensure_advisor(conn, aid)?;
    }

    let user_id = new_id();
    let ts = now_ts();
    conn.execute(
        "INSERT INTO users(id, role, name, email, programme_id, intake, advisor_id, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![user_id, role, name, email, programme_id, intake, advisor_id, ts, ts],
    )
    .map_err(IpcError::db("db_insert_failed"))?;
    tracing::info!(user_id = %user_id, role = %role, "user created");
    Ok(json!({ "userId": user_id }))
}

fn handle_users_update(state: &mut AppState, req: &Request) -> Result<JsonValue, IpcError> {
    let conn = db_conn(state)?;
    let user_id = required_str(&req.params, "userId")?;
    let patch = required_object(&req.params, "patch")?;
    let role = user_role(conn, &user_id)?.ok_or_else(|| IpcError::not_found("user not found"))?;

    let mut fields: Vec<&str> = Vec::new();
    let mut values: Vec<Value> = Vec::new();
    for (k, v) in patch {
        match k.as_str() {
            "name" => {
                let s = parse_opt_string(Some(v), "patch.name")?
                    .ok_or_else(|| IpcError::bad_params("patch.name must not be empty"))?;
                fields.push("name = ?");
                values.push(Value::Text(s));
            }
            "email" => {
                let s = parse_opt_string(Some(v), "patch.email")?
                    .ok_or_else(|| IpcError::bad_params("patch.email must not be empty"))?;
                fields.push("email = ?");
                values.push(Value::Text(validate_email(&s)?));
            }
            "intake" => {
                fields.push("intake = ?");
                values.push(match parse_opt_string(Some(v), "patch.intake")? {
                    Some(s) => Value::Text(s),
                    None => Value::Null,
                });
            }
            "programmeId" => {
                if role != ROLE_STUDENT {
                    return Err(IpcError::bad_params("only students have a programme"));
                }
                fields.push("programme_id = ?");
                match parse_opt_string(Some(v), "patch.programmeId")? {
                    Some(pid) => {
                        ensure_exists(conn, "programmes", &pid, "programme")?;
                        values.push(Value::Text(pid));
                    }
                    None => values.push(Value::Null),
                }
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
    values.push(Value::Text(user_id.clone()));
    let sql = format!("UPDATE users SET {} WHERE id = ?", fields.join(", "));
    conn.execute(&sql, rusqlite::params_from_iter(values))
        .map_err(IpcError::db("db_update_failed"))?;
    Ok(json!({ "ok": true }))
}

fn handle_users_set_position(state: &mut AppState, req: &Request) -> Result<JsonValue, IpcError> {
    let conn = db_conn(state)?;
    let user_id = required_str(&req.params, "userId")?;
    match user_role(conn, &user_id)?.as_deref() {
        None => return Err(IpcError::not_found("user not found")),
        Some(ROLE_STUDENT) => {}
        Some(_) => return Err(IpcError::bad_params("only students have a plan position")),
    }
    let year = parse_opt_u32(req.params.get("year"), "year")?;
    let semester = parse_opt_u32(req.params.get("semester"), "semester")?;
    let position = match (year, semester) {
        (Some(y), Some(s)) => {
            let setup = load_planning_setup(conn);
            Some(PlanPosition::new(y, s, setup.semesters_per_year)?)
        }
        (None, None) => None,
        _ => {
            return Err(IpcError::bad_params(
                "year and semester must be given together",
            ))
        }
    };

    conn.execute(
        "UPDATE users SET current_year = ?, current_semester = ?, updated_at = ? WHERE id = ?",
        params![
            position.map(|p| p.year),
            position.map(|p| p.semester),
            now_ts(),
            user_id
        ],
    )
    .map_err(IpcError::db("db_update_failed"))?;
    Ok(json!({ "position": position }))
}

fn handle_users_assign_advisor(
    state: &mut AppState,
    req: &Request,
) -> Result<JsonValue, IpcError> {
    let conn = db_conn(state)?;
    let student_id = required_str(&req.params, "studentId")?;
    match user_role(conn, &student_id)?.as_deref() {
        None => return Err(IpcError::not_found("student not found")),
        Some(ROLE_STUDENT) => {}
        Some(_) => return Err(IpcError::bad_params("studentId must refer to a student")),
    }
    let advisor_id = parse_opt_string(req.params.get("advisorId"), "advisorId")?;
    if let Some(aid) = advisor_id.as_deref() {
        ensure_advisor(conn, aid)?;
    }
    conn.execute(
        "UPDATE users SET advisor_id = ?, updated_at = ? WHERE id = ?",
        params![advisor_id, now_ts(), student_id],
    )
    .map_err(IpcError::db("db_update_failed"))?;
    Ok(json!({ "studentId": student_id, "advisorId": advisor_id }))
}

fn handle_advisors_advisees(state: &mut AppState, req: &Request) -> Result<JsonValue, IpcError> {
    let conn = db_conn(state)?;
    let advisor_id = required_str(&req.params, "advisorId")?;
    ensure_advisor(conn, &advisor_id)?;
    let setup = load_planning_setup(conn);
    let catalog = load_catalog(conn)?;

    let mut stmt = conn.prepare(
        "SELECT u.id, u.name, u.email, u.programme_id, p.total_credits
         FROM users u
         LEFT JOIN programmes p ON p.id = u.programme_id
         WHERE u.advisor_id = ?
         ORDER BY u.name",
    )?;
    let rows = stmt
        .query_map([&advisor_id], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, Option<String>>(3)?,
                r.get::<_, Option<f64>>(4)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut advisees = Vec::with_capacity(rows.len());
    for (id, name, email, programme_id, total_credits) in rows {
        let entries = load_profile(conn, &id, programme_id.as_deref(), &catalog)?;
        let progress = compute_progress(&entries, total_credits.unwrap_or(0.0), &setup.tokens);
        advisees.push(json!({
            "id": id,
            "name": name,
            "email": email,
            "programmeId": programme_id,
            "earnedCredits": progress.earned_credits,
            "requiredCredits": progress.required_credits,
            "percentage": progress.percentage,
        }));
    }
    Ok(json!({ "advisees": advisees }))
}

fn handle_users_delete(state: &mut AppState, req: &Request) -> Result<JsonValue, IpcError> {
    let conn = db_conn(state)?;
    let user_id = required_str(&req.params, "userId")?;
    ensure_exists(conn, "users", &user_id, "user")?;

    let mut sha_stmt = conn.prepare(
        "SELECT DISTINCT a.sha256 FROM attachments a
         JOIN messages m ON m.id = a.message_id
         WHERE m.sender_id = ?1 OR m.recipient_id = ?1",
    )?;
    let shas = sha_stmt
        .query_map([&user_id], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    let tx = conn
        .unchecked_transaction()
        .map_err(IpcError::db("db_tx_failed"))?;

    // Explicit dependency order; there is no ON DELETE CASCADE.
    let steps: [(&str, &str); 6] = [
        (
            "attachments",
            "DELETE FROM attachments WHERE message_id IN (
               SELECT id FROM messages WHERE sender_id = ?1 OR recipient_id = ?1
               OR plan_id IN (SELECT id FROM student_plans WHERE student_id = ?1))",
        ),
        (
            "messages",
            "DELETE FROM messages WHERE sender_id = ?1 OR recipient_id = ?1
             OR plan_id IN (SELECT id FROM student_plans WHERE student_id = ?1)",
        ),
        (
            "student_plans",
            "DELETE FROM student_plans WHERE student_id = ?1",
        ),
        (
            "profile_entries",
            "DELETE FROM profile_entries WHERE student_id = ?1",
        ),
        (
            "users",
            "UPDATE users SET advisor_id = NULL WHERE advisor_id = ?1",
        ),
        ("users", "DELETE FROM users WHERE id = ?1"),
    ];
    for (table, sql) in steps {
        if let Err(e) = tx.execute(sql, [&user_id]) {
            let _ = tx.rollback();
            return Err(IpcError::new("db_delete_failed", e.to_string())
                .with_details(json!({ "table": table })));
        }
    }
    tx.commit().map_err(IpcError::db("db_commit_failed"))?;

    if let Some(ws) = state.workspace.as_deref() {
        prune_blobs(conn, ws, &shas);
    }
    tracing::info!(user_id = %user_id, "user deleted");
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "users.list" => handle_users_list(state, req),
        "users.get" => handle_users_get(state, req),
        "users.create" => handle_users_create(state, req),
        "users.update" => handle_users_update(state, req),
        "users.setPosition" => handle_users_set_position(state, req),
        "users.assignAdvisor" => handle_users_assign_advisor(state, req),
        "users.delete" => handle_users_delete(state, req),
        "advisors.advisees" => handle_advisors_advisees(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}

use crate::ipc::error::{respond, IpcError};
use crate::ipc::handlers::setup::load_planning_setup;
use crate::ipc::helpers::{db_conn, new_id, now_ts, parse_opt_string, required_str};
use crate::ipc::records::{
    load_catalog, load_profile, load_student, programme_mapping, resolve_position,
    student_programme,
};
use crate::ipc::types::{AppState, Request};
use crate::plan::{build_plan_payload, recommend_courses, PlanPayload, PlanPosition};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{json, Value as JsonValue};

/// Payload for the student's remaining semesters from the resolved position.
fn preview_payload(
    conn: &Connection,
    params: &JsonValue,
) -> Result<(String, PlanPosition, PlanPayload), IpcError> {
    let student_id = required_str(params, "studentId")?;
    let student = load_student(conn, &student_id)?;
    let programme = student_programme(conn, &student)?;
    let setup = load_planning_setup(conn);
    let mapping = programme_mapping(conn, &programme.id, &setup)?;
    if mapping.is_empty() {
        tracing::warn!(programme_id = %programme.id, "programme has no default plan");
    }
    let position = resolve_position(params, &student, &mapping, &setup)?;
    let catalog = load_catalog(conn)?;

    let sliced = mapping.slice_from(position);
    let payload = build_plan_payload(&sliced, &catalog, &programme.id, &setup.tokens);
    if !payload.unresolved.is_empty() {
        tracing::warn!(
            student_id = %student.id,
            unresolved = ?payload.unresolved,
            "plan references courses missing from the catalog"
        );
    }
    Ok((student.id, position, payload))
}

fn payload_json(payload: &PlanPayload) -> Result<JsonValue, IpcError> {
    serde_json::to_value(payload)
        .map_err(|e| IpcError::new("io_failed", format!("failed to encode plan: {}", e)))
}

fn handle_plans_preview(state: &mut AppState, req: &Request) -> Result<JsonValue, IpcError> {
    let conn = db_conn(state)?;
    let (student_id, position, payload) = preview_payload(conn, &req.params)?;
    Ok(json!({
        "studentId": student_id,
        "position": position,
        "payload": payload_json(&payload)?,
    }))
}

fn handle_plans_create(state: &mut AppState, req: &Request) -> Result<JsonValue, IpcError> {
    let conn = db_conn(state)?;
    let (student_id, position, payload) = preview_payload(conn, &req.params)?;
    let title = parse_opt_string(req.params.get("title"), "title")?.unwrap_or_else(|| {
        format!(
            "Plan from Year {} Semester {}",
            position.year, position.semester
        )
    });
    let payload_value = payload_json(&payload)?;

    let plan_id = new_id();
    conn.execute(
        "INSERT INTO student_plans(id, student_id, programme_id, title, start_year, start_semester, payload_json, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            plan_id,
            student_id,
            payload.programme_id,
            title,
            position.year,
            position.semester,
            payload_value.to_string(),
            now_ts()
        ],
    )
    .map_err(IpcError::db("db_insert_failed"))?;
    tracing::info!(plan_id = %plan_id, student_id = %student_id, "plan created");
    Ok(json!({
        "planId": plan_id,
        "title": title,
        "position": position,
        "payload": payload_value,
    }))
}

fn handle_plans_list(state: &mut AppState, req: &Request) -> Result<JsonValue, IpcError> {
    let conn = db_conn(state)?;
    let student_id = required_str(&req.params, "studentId")?;
    load_student(conn, &student_id)?;
    let mut stmt = conn.prepare(
        "SELECT id, programme_id, title, start_year, start_semester, payload_json, created_at
         FROM student_plans
         WHERE student_id = ?
         ORDER BY created_at DESC, rowid DESC",
    )?;
    let plans = stmt
        .query_map([&student_id], |r| {
            let payload: JsonValue =
                serde_json::from_str(&r.get::<_, String>(5)?).unwrap_or(JsonValue::Null);
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "programmeId": r.get::<_, String>(1)?,
                "title": r.get::<_, String>(2)?,
                "startYear": r.get::<_, Option<i64>>(3)?,
                "startSemester": r.get::<_, Option<i64>>(4)?,
                "semesterCount": payload.get("semesters").and_then(|s| s.as_array()).map(|s| s.len()).unwrap_or(0),
                "totalCredits": payload.get("totalCredits").cloned().unwrap_or(json!(0.0)),
                "createdAt": r.get::<_, String>(6)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "plans": plans }))
}

fn handle_plans_get(state: &mut AppState, req: &Request) -> Result<JsonValue, IpcError> {
    let conn = db_conn(state)?;
    let plan_id = required_str(&req.params, "planId")?;
    let row = conn
        .query_row(
            "SELECT id, student_id, programme_id, title, start_year, start_semester, payload_json, created_at
             FROM student_plans WHERE id = ?",
            [&plan_id],
            |r| {
                Ok((
                    json!({
                        "id": r.get::<_, String>(0)?,
                        "studentId": r.get::<_, String>(1)?,
                        "programmeId": r.get::<_, String>(2)?,
                        "title": r.get::<_, String>(3)?,
                        "startYear": r.get::<_, Option<i64>>(4)?,
                        "startSemester": r.get::<_, Option<i64>>(5)?,
                        "createdAt": r.get::<_, String>(7)?,
                    }),
                    r.get::<_, String>(6)?,
                ))
            },
        )
        .optional()?;
    let Some((mut plan, payload_raw)) = row else {
        return Err(IpcError::not_found("plan not found"));
    };
    plan["payload"] = serde_json::from_str(&payload_raw).map_err(|e| {
        IpcError::new("db_query_failed", format!("stored plan is not valid JSON: {}", e))
    })?;
    Ok(plan)
}

/// Messages that referenced the plan keep their text; the link is cleared.
fn handle_plans_delete(state: &mut AppState, req: &Request) -> Result<JsonValue, IpcError> {
    let conn = db_conn(state)?;
    let plan_id = required_str(&req.params, "planId")?;

    let tx = conn
        .unchecked_transaction()
        .map_err(IpcError::db("db_tx_failed"))?;
    if let Err(e) = tx.execute(
        "UPDATE messages SET plan_id = NULL WHERE plan_id = ?",
        [&plan_id],
    ) {
        let _ = tx.rollback();
        return Err(IpcError::new("db_delete_failed", e.to_string())
            .with_details(json!({ "table": "messages" })));
    }
    let n = match tx.execute("DELETE FROM student_plans WHERE id = ?", [&plan_id]) {
        Ok(n) => n,
        Err(e) => {
            let _ = tx.rollback();
            return Err(IpcError::new("db_delete_failed", e.to_string())
                .with_details(json!({ "table": "student_plans" })));
        }
    };
    if n == 0 {
        let _ = tx.rollback();
        return Err(IpcError::not_found("plan not found"));
    }
    tx.commit().map_err(IpcError::db("db_commit_failed"))?;
    Ok(json!({ "ok": true }))
}

fn handle_plans_recommend(state: &mut AppState, req: &Request) -> Result<JsonValue, IpcError> {
    let conn = db_conn(state)?;
    let student_id = required_str(&req.params, "studentId")?;
    let student = load_student(conn, &student_id)?;
    let programme = student_programme(conn, &student)?;
    let setup = load_planning_setup(conn);
    let mapping = programme_mapping(conn, &programme.id, &setup)?;
    let position = resolve_position(&req.params, &student, &mapping, &setup)?;
    let catalog = load_catalog(conn)?;
    let profile = load_profile(conn, &student.id, Some(&programme.id), &catalog)?;

    let rec = recommend_courses(&mapping, position, &profile, &setup.tokens);
    Ok(json!({
        "studentId": student.id,
        "studentName": student.name,
        "programmeId": programme.id,
        "position": rec.position,
        "outstanding": rec.outstanding,
        "upcoming": rec.upcoming.to_labelled_json(),
        "upcomingSlots": rec.upcoming.to_slot_list_json(),
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "plans.preview" => handle_plans_preview(state, req),
        "plans.create" => handle_plans_create(state, req),
        "plans.list" => handle_plans_list(state, req),
        "plans.get" => handle_plans_get(state, req),
        "plans.delete" => handle_plans_delete(state, req),
        "plans.recommend" => handle_plans_recommend(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}

use crate::ipc::error::{respond, IpcError};
use crate::ipc::handlers::setup::load_planning_setup;
use crate::ipc::helpers::{
    db_conn, new_id, now_ts, parse_opt_f64, parse_opt_string, parse_opt_u32, required_str,
};
use crate::ipc::records::{load_catalog, load_profile, load_programme, load_student};
use crate::ipc::types::{AppState, Request};
use crate::plan::{compute_progress, normalize_code, AcademicSession, EntryStatus};
use rusqlite::{params, OptionalExtension};
use serde_json::{json, Value as JsonValue};

fn entry_to_json(row: &rusqlite::Row<'_>) -> rusqlite::Result<JsonValue> {
    let academic_year: String = row.get(3)?;
    let semester: i64 = row.get(4)?;
    Ok(json!({
        "id": row.get::<_, String>(0)?,
        "studentId": row.get::<_, String>(1)?,
        "courseCode": row.get::<_, String>(2)?,
        "academicYear": if academic_year.is_empty() { None } else { Some(academic_year) },
        "semester": if semester == 0 { None } else { Some(semester) },
        "status": row.get::<_, String>(5)?,
        "grade": row.get::<_, Option<String>>(6)?,
        "credits": row.get::<_, f64>(7)?,
        "updatedAt": row.get::<_, String>(8)?,
    }))
}

fn handle_entries_list(state: &mut AppState, req: &Request) -> Result<JsonValue, IpcError> {
    let conn = db_conn(state)?;
    let student_id = required_str(&req.params, "studentId")?;
    load_student(conn, &student_id)?;
    let mut stmt = conn.prepare(
        "SELECT id, student_id, course_code, academic_year, semester, status, grade, credits, updated_at
         FROM profile_entries
         WHERE student_id = ?
         ORDER BY academic_year, semester, course_code",
    )?;
    let entries = stmt
        .query_map([&student_id], entry_to_json)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "entries": entries }))
}

fn handle_entries_upsert(state: &mut AppState, req: &Request) -> Result<JsonValue, IpcError> {
    let conn = db_conn(state)?;
    let student_id = required_str(&req.params, "studentId")?;
    load_student(conn, &student_id)?;
    let course_code = normalize_code(&required_str(&req.params, "courseCode")?)
        .ok_or_else(|| IpcError::bad_params("missing courseCode"))?;
    let status: EntryStatus = required_str(&req.params, "status")?
        .parse()
        .map_err(IpcError::bad_params)?;
    let grade = parse_opt_string(req.params.get("grade"), "grade")?;

    let academic_year = parse_opt_string(req.params.get("academicYear"), "academicYear")?;
    let semester = parse_opt_u32(req.params.get("semester"), "semester")?;
    let (year_key, semester_key) = match (academic_year, semester) {
        (Some(y), Some(s)) => (AcademicSession::parse(&y, s)?.label(), s),
        (None, None) => (String::new(), 0),
        _ => {
            return Err(IpcError::bad_params(
                "academicYear and semester must be given together",
            ))
        }
    };

    let setup = load_planning_setup(conn);
    let credits = match parse_opt_f64(req.params.get("credits"), "credits")? {
        Some(c) if c < 0.0 => return Err(IpcError::bad_params("credits must be >= 0")),
        Some(c) => c,
        None if setup.tokens.is_sentinel(&course_code) => 0.0,
        None => conn
            .query_row(
                "SELECT credits FROM courses WHERE code = ?",
                [&course_code],
                |r| r.get::<_, f64>(0),
            )
            .optional()?
            .ok_or_else(|| {
                IpcError::bad_params(format!(
                    "credits required: {} is not in the catalog",
                    course_code
                ))
            })?,
    };

    conn.execute(
        "INSERT INTO profile_entries(id, student_id, course_code, academic_year, semester, status, grade, credits, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(student_id, course_code, academic_year, semester) DO UPDATE SET
           status = excluded.status,
           grade = excluded.grade,
           credits = excluded.credits,
           updated_at = excluded.updated_at",
        params![
            new_id(),
            student_id,
            course_code,
            year_key,
            semester_key,
            status.as_str(),
            grade,
            credits,
            now_ts()
        ],
    )
    .map_err(IpcError::db("db_insert_failed"))?;

    let entry_id: String = conn.query_row(
        "SELECT id FROM profile_entries
         WHERE student_id = ? AND course_code = ? AND academic_year = ? AND semester = ?",
        params![student_id, course_code, year_key, semester_key],
        |r| r.get(0),
    )?;
    Ok(json!({
        "entryId": entry_id,
        "courseCode": course_code,
        "status": status,
        "credits": credits,
    }))
}

fn handle_entries_delete(state: &mut AppState, req: &Request) -> Result<JsonValue, IpcError> {
    let conn = db_conn(state)?;
    let entry_id = required_str(&req.params, "entryId")?;
    let n = conn
        .execute("DELETE FROM profile_entries WHERE id = ?", [&entry_id])
        .map_err(IpcError::db("db_delete_failed"))?;
    if n == 0 {
        return Err(IpcError::not_found("profile entry not found"));
    }
    Ok(json!({ "ok": true }))
}

fn handle_progress(state: &mut AppState, req: &Request) -> Result<JsonValue, IpcError> {
    let conn = db_conn(state)?;
    let student_id = required_str(&req.params, "studentId")?;
    let student = load_student(conn, &student_id)?;
    let required = match student.programme_id.as_deref() {
        Some(pid) => load_programme(conn, pid)?.total_credits,
        None => 0.0,
    };
    let setup = load_planning_setup(conn);
    let catalog = load_catalog(conn)?;
    let entries = load_profile(conn, &student.id, student.programme_id.as_deref(), &catalog)?;
    let progress = compute_progress(&entries, required, &setup.tokens);

    Ok(json!({
        "studentId": student.id,
        "programmeId": student.programme_id,
        "earnedCredits": progress.earned_credits,
        "inProgressCredits": progress.in_progress_credits,
        "requiredCredits": progress.required_credits,
        "percentage": progress.percentage,
        "earnedByType": progress.earned_by_type,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "profile.entries.list" => handle_entries_list(state, req),
        "profile.entries.upsert" => handle_entries_upsert(state, req),
        "profile.entries.delete" => handle_entries_delete(state, req),
        "profile.progress" => handle_progress(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}

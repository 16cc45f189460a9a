//! Typed loads from the workspace database into the plain values the
//! planning code works on.

use crate::ipc::error::IpcError;
use crate::ipc::handlers::setup::PlanningSetup;
use crate::ipc::helpers::{parse_json_array_string, parse_ts};
use crate::plan::{
    effective_course_type, AcademicSession, Catalog, CatalogCourse, CourseType, EntryStatus,
    PlanPosition, ProfileEntry, SemesterMapping, SemesterPlan, TypeOverride,
};
use rusqlite::{Connection, OptionalExtension};
use std::collections::HashMap;

pub const ROLE_STUDENT: &str = "student";
pub const ROLE_ADVISOR: &str = "advisor";

#[derive(Debug, Clone)]
pub struct StudentRecord {
    pub id: String,
    pub name: String,
    pub programme_id: Option<String>,
    pub current_year: Option<u32>,
    pub current_semester: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct ProgrammeRecord {
    pub id: String,
    pub code: String,
    pub name: String,
    pub total_credits: f64,
}

pub fn user_role(conn: &Connection, user_id: &str) -> Result<Option<String>, IpcError> {
    Ok(conn
        .query_row("SELECT role FROM users WHERE id = ?", [user_id], |r| r.get(0))
        .optional()?)
}

pub fn load_student(conn: &Connection, student_id: &str) -> Result<StudentRecord, IpcError> {
    let row = conn
        .query_row(
            "SELECT id, role, name, programme_id, current_year, current_semester
             FROM users WHERE id = ?",
            [student_id],
            |r| {
                Ok((
                    r.get::<_, String>(1)?,
                    StudentRecord {
                        id: r.get(0)?,
                        name: r.get(2)?,
                        programme_id: r.get(3)?,
                        current_year: r.get(4)?,
                        current_semester: r.get(5)?,
                    },
                ))
            },
        )
        .optional()?;
    match row {
        None => Err(IpcError::not_found("student not found")),
        Some((role, _)) if role != ROLE_STUDENT => {
            Err(IpcError::bad_params("user is not a student"))
        }
        Some((_, student)) => Ok(student),
    }
}

pub fn load_programme(conn: &Connection, programme_id: &str) -> Result<ProgrammeRecord, IpcError> {
    conn.query_row(
        "SELECT id, code, name, total_credits FROM programmes WHERE id = ?",
        [programme_id],
        |r| {
            Ok(ProgrammeRecord {
                id: r.get(0)?,
                code: r.get(1)?,
                name: r.get(2)?,
                total_credits: r.get(3)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| IpcError::not_found("programme not found"))
}

/// The student's programme, or `bad_params` when none is assigned.
pub fn student_programme(
    conn: &Connection,
    student: &StudentRecord,
) -> Result<ProgrammeRecord, IpcError> {
    let Some(pid) = student.programme_id.as_deref() else {
        return Err(IpcError::bad_params("student has no programme"));
    };
    load_programme(conn, pid)
}

pub fn load_semester_plans(
    conn: &Connection,
    programme_id: &str,
) -> Result<Vec<SemesterPlan>, IpcError> {
    let mut stmt = conn.prepare(
        "SELECT id, academic_year, semester, courses_json, created_at
         FROM programme_semesters
         WHERE programme_id = ?
         ORDER BY rowid",
    )?;
    let rows = stmt
        .query_map([programme_id], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, Option<String>>(1)?,
                r.get::<_, Option<u32>>(2)?,
                r.get::<_, String>(3)?,
                r.get::<_, String>(4)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut plans = Vec::with_capacity(rows.len());
    for (id, academic_year, semester, courses_json, created_at) in rows {
        let session = match (academic_year, semester) {
            (Some(y), Some(s)) => Some(AcademicSession::parse(&y, s)?),
            _ => None,
        };
        plans.push(SemesterPlan {
            id,
            session,
            created_at: parse_ts(&created_at),
            courses: parse_json_array_string(&courses_json),
        });
    }
    Ok(plans)
}

pub fn programme_mapping(
    conn: &Connection,
    programme_id: &str,
    setup: &PlanningSetup,
) -> Result<SemesterMapping, IpcError> {
    let plans = load_semester_plans(conn, programme_id)?;
    Ok(SemesterMapping::from_semester_plans(
        &plans,
        setup.semesters_per_year,
    )?)
}

pub fn parse_course_type(raw: Option<String>) -> Option<CourseType> {
    raw.and_then(|s| s.parse().ok())
}

pub fn load_catalog(conn: &Connection) -> Result<Catalog, IpcError> {
    let mut overrides: HashMap<String, Vec<TypeOverride>> = HashMap::new();
    let mut ov_stmt = conn.prepare(
        "SELECT course_id, programme_id, course_type FROM course_type_overrides ORDER BY rowid",
    )?;
    let ov_rows = ov_stmt
        .query_map([], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    for (course_id, programme_id, course_type) in ov_rows {
        let Ok(course_type) = course_type.parse::<CourseType>() else {
            continue;
        };
        overrides.entry(course_id).or_default().push(TypeOverride {
            programme_id,
            course_type,
        });
    }

    let mut stmt = conn.prepare("SELECT id, code, title, credits, default_type FROM courses")?;
    let courses = stmt
        .query_map([], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, f64>(3)?,
                r.get::<_, Option<String>>(4)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(courses
        .into_iter()
        .map(|(id, code, title, credits, default_type)| CatalogCourse {
            code,
            title,
            credits,
            default_type: parse_course_type(default_type),
            overrides: overrides.remove(&id).unwrap_or_default(),
        })
        .collect())
}

/// Profile entries with course types resolved for `programme_id`.
pub fn load_profile(
    conn: &Connection,
    student_id: &str,
    programme_id: Option<&str>,
    catalog: &Catalog,
) -> Result<Vec<ProfileEntry>, IpcError> {
    let mut stmt = conn.prepare(
        "SELECT course_code, credits, status FROM profile_entries
         WHERE student_id = ?
         ORDER BY academic_year, semester, course_code",
    )?;
    let rows = stmt
        .query_map([student_id], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, f64>(1)?,
                r.get::<_, String>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut out = Vec::with_capacity(rows.len());
    for (course_code, credits, status) in rows {
        let Ok(status) = status.parse::<EntryStatus>() else {
            tracing::warn!(student_id, course_code = %course_code, "skipping entry with unknown status");
            continue;
        };
        let course_type = catalog.get(&course_code).and_then(|c| match programme_id {
            Some(pid) => effective_course_type(c.default_type, &c.overrides, pid),
            None => c.default_type,
        });
        out.push(ProfileEntry {
            course_code,
            credits,
            status,
            course_type,
        });
    }
    Ok(out)
}

/// Explicit `(year, semester)` params win, then the stored student position,
/// then the start of the mapping.
pub fn resolve_position(
    params: &serde_json::Value,
    student: &StudentRecord,
    mapping: &SemesterMapping,
    setup: &PlanningSetup,
) -> Result<PlanPosition, IpcError> {
    use crate::ipc::helpers::parse_opt_u32;

    let year = parse_opt_u32(params.get("year"), "year")?;
    let semester = parse_opt_u32(params.get("semester"), "semester")?;
    match (year, semester) {
        (Some(y), Some(s)) => Ok(PlanPosition::new(y, s, setup.semesters_per_year)?),
        (None, None) => match (student.current_year, student.current_semester) {
            (Some(y), Some(s)) => Ok(PlanPosition::new(y, s, setup.semesters_per_year)?),
            _ => Ok(mapping.start().unwrap_or(PlanPosition::START)),
        },
        _ => Err(IpcError::bad_params(
            "year and semester must be given together",
        )),
    }
}

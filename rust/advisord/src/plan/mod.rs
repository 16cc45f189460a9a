//! Programme plan mapping, plan slicing, plan payloads, course-type
//! resolution, credit progress and course recommendations.
//!
//! Nothing here touches the workspace: callers load records and pass plain
//! values in.

mod course_type;
mod error;
mod mapping;
mod payload;
mod progress;
mod recommend;
mod session;

pub use course_type::{effective_course_type, override_for, CourseType, TypeOverride};
pub use error::PlanError;
pub use mapping::{normalize_code, SemesterMapping, SemesterPlan};
pub use payload::{build_plan_payload, Catalog, CatalogCourse, PlanPayload, SentinelTokens};
pub use progress::{compute_progress, EntryStatus, ProfileEntry};
pub use recommend::recommend_courses;
pub use session::{AcademicSession, PlanPosition};

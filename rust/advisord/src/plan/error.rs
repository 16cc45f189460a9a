use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("invalid academic year {0:?}")]
    InvalidAcademicYear(String),

    #[error("semester {semester} is outside 1..={per_year}")]
    SemesterOutOfRange { semester: u32, per_year: u32 },

    #[error("semester must be >= 1")]
    InvalidSemester,

    #[error("year must be >= 1 (got {0})")]
    InvalidYear(u32),

    #[error("semestersPerYear must be >= 1")]
    InvalidSemestersPerYear,
}

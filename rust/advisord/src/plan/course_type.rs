use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CourseType {
    Core,
    Elective,
    GeneralEducation,
    Unrestricted,
}

impl CourseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CourseType::Core => "core",
            CourseType::Elective => "elective",
            CourseType::GeneralEducation => "general_education",
            CourseType::Unrestricted => "unrestricted",
        }
    }
}

impl fmt::Display for CourseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CourseType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "core" => Ok(CourseType::Core),
            "elective" => Ok(CourseType::Elective),
            "general_education" | "ge" => Ok(CourseType::GeneralEducation),
            "unrestricted" | "unrestricted_elective" | "ue" => Ok(CourseType::Unrestricted),
            other => Err(format!("unknown course type: {other}")),
        }
    }
}

/// A programme-specific replacement for a course's default type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeOverride {
    pub programme_id: String,
    pub course_type: CourseType,
}

/// The override registered for `programme_id`, if any. First match wins.
pub fn override_for(overrides: &[TypeOverride], programme_id: &str) -> Option<CourseType> {
    overrides
        .iter()
        .find(|o| o.programme_id == programme_id)
        .map(|o| o.course_type)
}

/// Programme override, else the course default. `None` only when the course
/// has no default and no override applies.
pub fn effective_course_type(
    default_type: Option<CourseType>,
    overrides: &[TypeOverride],
    programme_id: &str,
) -> Option<CourseType> {
    override_for(overrides, programme_id).or(default_type)
}

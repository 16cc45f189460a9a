use super::{CourseType, SentinelTokens};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Passed,
    Failed,
    Current,
    Planned,
    Withdrawn,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Passed => "passed",
            EntryStatus::Failed => "failed",
            EntryStatus::Current => "current",
            EntryStatus::Planned => "planned",
            EntryStatus::Withdrawn => "withdrawn",
        }
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "passed" | "pass" => Ok(EntryStatus::Passed),
            "failed" | "fail" => Ok(EntryStatus::Failed),
            "current" | "in_progress" => Ok(EntryStatus::Current),
            "planned" => Ok(EntryStatus::Planned),
            "withdrawn" => Ok(EntryStatus::Withdrawn),
            other => Err(format!("unknown entry status: {other}")),
        }
    }
}

/// One row of a student's academic profile.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileEntry {
    pub course_code: String,
    pub credits: f64,
    pub status: EntryStatus,
    pub course_type: Option<CourseType>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub earned_credits: f64,
    pub in_progress_credits: f64,
    pub required_credits: f64,
    pub percentage: f64,
    pub earned_by_type: BTreeMap<String, f64>,
}

fn counted_credits(entry: &ProfileEntry, tokens: &SentinelTokens) -> f64 {
    if tokens.is_sentinel(&entry.course_code) {
        return 0.0;
    }
    entry.credits.max(0.0)
}

pub fn earned_credits(entries: &[ProfileEntry], tokens: &SentinelTokens) -> f64 {
    entries
        .iter()
        .filter(|e| e.status == EntryStatus::Passed)
        .map(|e| counted_credits(e, tokens))
        .sum()
}

/// `earned / required` as a percentage in `0..=100`; zero when nothing is
/// required.
pub fn progress_percentage(earned: f64, required: f64) -> f64 {
    if required <= 0.0 || !required.is_finite() {
        return 0.0;
    }
    (100.0 * earned / required).clamp(0.0, 100.0)
}

pub fn compute_progress(
    entries: &[ProfileEntry],
    required_credits: f64,
    tokens: &SentinelTokens,
) -> Progress {
    let earned = earned_credits(entries, tokens);
    let in_progress_credits = entries
        .iter()
        .filter(|e| e.status == EntryStatus::Current)
        .map(|e| counted_credits(e, tokens))
        .sum();

    let mut earned_by_type: BTreeMap<String, f64> = BTreeMap::new();
    for e in entries.iter().filter(|e| e.status == EntryStatus::Passed) {
        let credits = counted_credits(e, tokens);
        if credits == 0.0 {
            continue;
        }
        let key = e
            .course_type
            .map(|t| t.as_str().to_string())
            .unwrap_or_else(|| "unclassified".to_string());
        *earned_by_type.entry(key).or_insert(0.0) += credits;
    }

    Progress {
        earned_credits: earned,
        in_progress_credits,
        required_credits: required_credits.max(0.0),
        percentage: progress_percentage(earned, required_credits),
        earned_by_type,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(code: &str, credits: f64, status: EntryStatus) -> ProfileEntry {
        ProfileEntry {
            course_code: code.to_string(),
            credits,
            status,
            course_type: Some(CourseType::Core),
        }
    }

    #[test]
    fn empty_or_unpassed_profiles_earn_nothing() {
        let tokens = SentinelTokens::default();
        assert_eq!(earned_credits(&[], &tokens), 0.0);
        let entries = vec![
            entry("CS101", 4.0, EntryStatus::Failed),
            entry("CS102", 4.0, EntryStatus::Current),
            entry("CS103", 4.0, EntryStatus::Planned),
            entry("CS104", 4.0, EntryStatus::Withdrawn),
        ];
        assert_eq!(earned_credits(&entries, &tokens), 0.0);
        let p = compute_progress(&entries, 160.0, &tokens);
        assert_eq!(p.percentage, 0.0);
        assert_eq!(p.in_progress_credits, 4.0);
        assert!(p.earned_by_type.is_empty());
    }

    #[test]
    fn sums_passed_credits_and_groups_by_type() {
        let tokens = SentinelTokens::default();
        let mut ge = entry("GE100", 2.0, EntryStatus::Passed);
        ge.course_type = Some(CourseType::GeneralEducation);
        let mut none = entry("XX100", 1.0, EntryStatus::Passed);
        none.course_type = None;
        let entries = vec![
            entry("CS101", 4.0, EntryStatus::Passed),
            entry("CS102", 4.0, EntryStatus::Passed),
            entry("CS103", 4.0, EntryStatus::Failed),
            ge,
            none,
            entry("GAP", 12.0, EntryStatus::Passed),
            entry("CS999", -3.0, EntryStatus::Passed),
        ];
        let p = compute_progress(&entries, 30.0, &tokens);
        assert_eq!(p.earned_credits, 11.0);
        assert!((p.percentage - 100.0 * 11.0 / 30.0).abs() < 1e-9);
        assert_eq!(p.earned_by_type.get("core"), Some(&8.0));
        assert_eq!(p.earned_by_type.get("general_education"), Some(&2.0));
        assert_eq!(p.earned_by_type.get("unclassified"), Some(&1.0));
    }

    #[test]
    fn percentage_is_clamped_and_zero_without_requirement() {
        assert_eq!(progress_percentage(10.0, 0.0), 0.0);
        assert_eq!(progress_percentage(10.0, -5.0), 0.0);
        assert_eq!(progress_percentage(200.0, 160.0), 100.0);
        assert_eq!(progress_percentage(40.0, 160.0), 25.0);
    }

    #[test]
    fn status_parsing() {
        assert_eq!("Passed".parse::<EntryStatus>(), Ok(EntryStatus::Passed));
        assert_eq!("in_progress".parse::<EntryStatus>(), Ok(EntryStatus::Current));
        assert!("audit".parse::<EntryStatus>().is_err());
    }
}

use super::mapping::normalize_code;
use super::payload::SemesterKind;
use super::{EntryStatus, PlanPosition, ProfileEntry, SemesterMapping, SentinelTokens};
use serde::Serialize;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutstandingCourse {
    pub code: String,
    pub year: u32,
    pub semester: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Recommendation {
    pub position: PlanPosition,
    /// Required courses from earlier semesters not yet passed or in progress.
    pub outstanding: Vec<OutstandingCourse>,
    /// Remaining semesters with passed and in-progress courses removed.
    pub upcoming: SemesterMapping,
}

pub fn recommend_courses(
    full: &SemesterMapping,
    position: PlanPosition,
    profile: &[ProfileEntry],
    tokens: &SentinelTokens,
) -> Recommendation {
    let settled: HashSet<String> = profile
        .iter()
        .filter(|e| matches!(e.status, EntryStatus::Passed | EntryStatus::Current))
        .filter_map(|e| normalize_code(&e.course_code))
        .collect();

    let mut outstanding = Vec::new();
    for (p, codes) in full.before(position).slots() {
        // Gap and outbound semesters carry no coursework.
        if tokens.classify(codes) != SemesterKind::Regular {
            continue;
        }
        for code in codes {
            if tokens.is_sentinel(code) || settled.contains(code) {
                continue;
            }
            outstanding.push(OutstandingCourse {
                code: code.clone(),
                year: p.year,
                semester: p.semester,
            });
        }
    }

    let upcoming = full
        .slice_from(position)
        .retain_courses(|code| tokens.is_sentinel(code) || !settled.contains(code));

    Recommendation {
        position,
        outstanding,
        upcoming,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(year: u32, semester: u32) -> PlanPosition {
        PlanPosition { year, semester }
    }

    fn entry(code: &str, status: EntryStatus) -> ProfileEntry {
        ProfileEntry {
            course_code: code.to_string(),
            credits: 4.0,
            status,
            course_type: None,
        }
    }

    fn full_mapping() -> SemesterMapping {
        let mut m = SemesterMapping::default();
        m.insert_slot(pos(1, 1), vec!["CS101".into(), "MA101".into()]);
        m.insert_slot(pos(1, 2), vec!["CS102".into(), "GAP".into()]);
        m.insert_slot(pos(2, 1), vec!["CS201".into(), "CS202".into()]);
        m.insert_slot(pos(2, 2), vec!["CS299".into()]);
        m
    }

    #[test]
    fn failed_earlier_courses_become_outstanding() {
        let profile = vec![
            entry("CS101", EntryStatus::Passed),
            entry("ma101", EntryStatus::Failed),
            entry("CS102", EntryStatus::Current),
        ];
        let r = recommend_courses(&full_mapping(), pos(2, 1), &profile, &SentinelTokens::default());
        assert_eq!(
            r.outstanding,
            vec![OutstandingCourse {
                code: "MA101".into(),
                year: 1,
                semester: 1
            }]
        );
        assert_eq!(r.upcoming.slot_count(), 2);
        assert_eq!(r.upcoming.start(), Some(pos(2, 1)));
    }

    #[test]
    fn courses_taken_ahead_of_schedule_drop_from_upcoming() {
        let profile = vec![entry("CS202", EntryStatus::Passed)];
        let r = recommend_courses(&full_mapping(), pos(2, 1), &profile, &SentinelTokens::default());
        assert_eq!(r.upcoming.courses_at(pos(2, 1)).unwrap(), &["CS201".to_string()]);
    }

    #[test]
    fn sentinels_stay_in_upcoming_and_never_outstanding() {
        let r = recommend_courses(&full_mapping(), pos(1, 2), &[], &SentinelTokens::default());
        assert_eq!(
            r.upcoming.courses_at(pos(1, 2)).unwrap(),
            &["CS102".to_string(), "GAP".to_string()]
        );
        let r = recommend_courses(&full_mapping(), pos(2, 1), &[], &SentinelTokens::default());
        assert!(r.outstanding.iter().all(|c| c.code != "GAP"));
        let codes: Vec<_> = r.outstanding.iter().map(|c| c.code.as_str()).collect();
        assert_eq!(codes, vec!["CS101", "MA101"]);
    }

    #[test]
    fn courses_in_flagged_semesters_are_never_outstanding() {
        let mut m = SemesterMapping::default();
        m.insert_slot(pos(1, 1), vec!["CS101".into()]);
        m.insert_slot(pos(1, 2), vec!["EXCHANGE".into(), "CS201".into()]);
        m.insert_slot(pos(2, 1), vec!["CS301".into()]);
        let profile = vec![entry("CS101", EntryStatus::Passed)];
        let r = recommend_courses(&m, pos(2, 1), &profile, &SentinelTokens::default());
        assert!(r.outstanding.is_empty(), "{:?}", r.outstanding);
    }

    #[test]
    fn at_the_start_nothing_is_outstanding() {
        let full = full_mapping();
        let r = recommend_courses(&full, pos(1, 1), &[], &SentinelTokens::default());
        assert!(r.outstanding.is_empty());
        assert_eq!(r.upcoming, full);
    }
}

use super::course_type::{effective_course_type, CourseType, TypeOverride};
use super::{PlanPosition, SemesterMapping};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct CatalogCourse {
    pub code: String,
    pub title: String,
    pub credits: f64,
    pub default_type: Option<CourseType>,
    pub overrides: Vec<TypeOverride>,
}

/// Course catalog keyed by normalised code.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    by_code: HashMap<String, CatalogCourse>,
}

impl Catalog {
    pub fn get(&self, code: &str) -> Option<&CatalogCourse> {
        self.by_code.get(code)
    }
}

impl FromIterator<CatalogCourse> for Catalog {
    fn from_iter<I: IntoIterator<Item = CatalogCourse>>(iter: I) -> Self {
        let by_code = iter
            .into_iter()
            .map(|c| (c.code.trim().to_ascii_uppercase(), c))
            .collect();
        Catalog { by_code }
    }
}

/// Placeholder codes marking semesters that carry no coursework.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentinelTokens {
    pub gap: Vec<String>,
    pub outbound: Vec<String>,
}

impl Default for SentinelTokens {
    fn default() -> Self {
        Self {
            gap: vec!["GAP".into(), "GAP_SEMESTER".into(), "LOA".into()],
            outbound: vec!["OUTBOUND".into(), "EXCHANGE".into(), "SEP".into()],
        }
    }
}

impl SentinelTokens {
    pub fn is_gap(&self, code: &str) -> bool {
        self.gap.iter().any(|t| t.eq_ignore_ascii_case(code.trim()))
    }

    pub fn is_outbound(&self, code: &str) -> bool {
        self.outbound
            .iter()
            .any(|t| t.eq_ignore_ascii_case(code.trim()))
    }

    pub fn is_sentinel(&self, code: &str) -> bool {
        self.is_gap(code) || self.is_outbound(code)
    }

    pub fn classify(&self, courses: &[String]) -> SemesterKind {
        if courses.iter().any(|c| self.is_gap(c)) {
            SemesterKind::Gap
        } else if courses.iter().any(|c| self.is_outbound(c)) {
            SemesterKind::Outbound
        } else {
            SemesterKind::Regular
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SemesterKind {
    Regular,
    Gap,
    Outbound,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseSnapshot {
    pub code: String,
    pub title: String,
    pub credits: f64,
    pub course_type: Option<CourseType>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedSemester {
    pub year: u32,
    pub semester: u32,
    pub kind: SemesterKind,
    pub courses: Vec<CourseSnapshot>,
    pub credits: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanPayload {
    pub programme_id: String,
    pub start: Option<PlanPosition>,
    pub semesters: Vec<PlannedSemester>,
    pub total_credits: f64,
    pub unresolved: Vec<String>,
}

/// Turns a (usually sliced) mapping into the document stored for a new
/// student plan. Gap and outbound semesters carry no courses.
pub fn build_plan_payload(
    mapping: &SemesterMapping,
    catalog: &Catalog,
    programme_id: &str,
    tokens: &SentinelTokens,
) -> PlanPayload {
    let mut semesters = Vec::with_capacity(mapping.slot_count());
    let mut unresolved: Vec<String> = Vec::new();
    let mut total_credits = 0.0;

    for (position, codes) in mapping.slots() {
        let kind = tokens.classify(codes);
        let mut courses = Vec::new();
        if kind == SemesterKind::Regular {
            for code in codes {
                match catalog.get(code) {
                    Some(course) => courses.push(CourseSnapshot {
                        code: code.clone(),
                        title: course.title.clone(),
                        credits: course.credits.max(0.0),
                        course_type: effective_course_type(
                            course.default_type,
                            &course.overrides,
                            programme_id,
                        ),
                    }),
                    None => {
                        if !unresolved.contains(code) {
                            unresolved.push(code.clone());
                        }
                    }
                }
            }
        } else {
            tracing::debug!(
                year = position.year,
                semester = position.semester,
                ?kind,
                "semester flagged; course codes ignored"
            );
        }
        let credits: f64 = courses.iter().map(|c| c.credits).sum();
        total_credits += credits;
        semesters.push(PlannedSemester {
            year: position.year,
            semester: position.semester,
            kind,
            courses,
            credits,
        });
    }

    PlanPayload {
        programme_id: programme_id.to_string(),
        start: mapping.start(),
        semesters,
        total_credits,
        unresolved,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn course(code: &str, credits: f64, default_type: Option<CourseType>) -> CatalogCourse {
        CatalogCourse {
            code: code.to_string(),
            title: format!("{code} title"),
            credits,
            default_type,
            overrides: Vec::new(),
        }
    }

    fn mapping(slots: &[((u32, u32), &[&str])]) -> SemesterMapping {
        let mut m = SemesterMapping::default();
        for ((year, semester), codes) in slots {
            m.insert_slot(
                PlanPosition {
                    year: *year,
                    semester: *semester,
                },
                codes.iter().map(|c| c.to_string()).collect(),
            );
        }
        m
    }

    #[test]
    fn resolves_snapshots_and_totals_credits() {
        let mut cs101 = course("CS101", 4.0, Some(CourseType::Core));
        cs101.overrides.push(TypeOverride {
            programme_id: "ds".into(),
            course_type: CourseType::Elective,
        });
        let catalog: Catalog = vec![cs101, course("MA101", 3.0, None)].into_iter().collect();
        let m = mapping(&[((1, 1), &["CS101", "MA101"]), ((1, 2), &["XX999"])]);

        let p = build_plan_payload(&m, &catalog, "ds", &SentinelTokens::default());
        assert_eq!(p.start, Some(PlanPosition { year: 1, semester: 1 }));
        assert_eq!(p.semesters.len(), 2);
        assert_eq!(p.semesters[0].credits, 7.0);
        assert_eq!(p.semesters[0].courses[0].course_type, Some(CourseType::Elective));
        assert_eq!(p.semesters[0].courses[1].course_type, None);
        assert!(p.semesters[1].courses.is_empty());
        assert_eq!(p.unresolved, vec!["XX999".to_string()]);
        assert_eq!(p.total_credits, 7.0);
    }

    #[test]
    fn gap_and_outbound_semesters_are_flagged_without_credits() {
        let catalog: Catalog = vec![course("CS201", 4.0, Some(CourseType::Core))]
            .into_iter()
            .collect();
        let m = mapping(&[
            ((2, 1), &["gap"]),
            ((2, 2), &["EXCHANGE", "CS201"]),
            ((3, 1), &["OUTBOUND", "GAP"]),
            ((3, 2), &["CS201"]),
        ]);

        let p = build_plan_payload(&m, &catalog, "cs", &SentinelTokens::default());
        let kinds: Vec<_> = p.semesters.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![
                SemesterKind::Gap,
                SemesterKind::Outbound,
                SemesterKind::Gap,
                SemesterKind::Regular
            ]
        );
        assert!(p.semesters[1].courses.is_empty());
        assert_eq!(p.semesters[1].credits, 0.0);
        assert_eq!(p.total_credits, 4.0);
        assert!(p.unresolved.is_empty());
    }

    #[test]
    fn empty_mapping_gives_empty_payload() {
        let p = build_plan_payload(
            &SemesterMapping::default(),
            &Catalog::default(),
            "cs",
            &SentinelTokens::default(),
        );
        assert_eq!(p.start, None);
        assert!(p.semesters.is_empty());
        assert_eq!(p.total_credits, 0.0);
    }
}

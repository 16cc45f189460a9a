use super::{AcademicSession, PlanError, PlanPosition};
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value as JsonValue};
use std::collections::BTreeMap;

/// One entry of a programme's default plan as stored.
#[derive(Debug, Clone, PartialEq)]
pub struct SemesterPlan {
    pub id: String,
    pub session: Option<AcademicSession>,
    pub created_at: Option<DateTime<Utc>>,
    pub courses: Vec<String>,
}

/// Upper-cased, trimmed course code; `None` for blanks.
pub fn normalize_code(raw: &str) -> Option<String> {
    let t = raw.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_ascii_uppercase())
    }
}

/// `Year N -> Semester M -> [course codes]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SemesterMapping {
    years: BTreeMap<u32, BTreeMap<u32, Vec<String>>>,
}

impl SemesterMapping {
    pub fn from_semester_plans(
        plans: &[SemesterPlan],
        semesters_per_year: u32,
    ) -> Result<Self, PlanError> {
        if semesters_per_year == 0 {
            return Err(PlanError::InvalidSemestersPerYear);
        }

        let mut ordered: Vec<&SemesterPlan> = plans.iter().collect();
        let all_sessions = !ordered.is_empty() && ordered.iter().all(|p| p.session.is_some());
        // Both sorts are stable, so plans sharing a key keep their input order.
        if all_sessions {
            ordered.sort_by_key(|p| p.session);
        } else {
            ordered.sort_by_key(|p| (p.created_at.is_none(), p.created_at));
        }

        let first_year = ordered
            .iter()
            .filter_map(|p| p.session.map(|s| s.start_year))
            .min()
            .unwrap_or(0);

        let mut mapping = SemesterMapping::default();
        for (i, plan) in ordered.iter().enumerate() {
            let position = match plan.session {
                Some(session) if all_sessions => {
                    let year = (session.start_year - first_year) as u32 + 1;
                    PlanPosition::new(year, session.semester, semesters_per_year)?
                }
                _ => {
                    let i = i as u32;
                    PlanPosition {
                        year: i / semesters_per_year + 1,
                        semester: i % semesters_per_year + 1,
                    }
                }
            };
            let slot = mapping.slot_mut(position);
            if !slot.is_empty() {
                tracing::debug!(
                    plan = %plan.id,
                    year = position.year,
                    semester = position.semester,
                    "merging semester plan into occupied slot"
                );
            }
            for code in plan.courses.iter().filter_map(|c| normalize_code(c)) {
                if !slot.contains(&code) {
                    slot.push(code);
                }
            }
        }
        Ok(mapping)
    }

    fn slot_mut(&mut self, position: PlanPosition) -> &mut Vec<String> {
        self.years
            .entry(position.year)
            .or_default()
            .entry(position.semester)
            .or_default()
    }

    /// Inserts a slot verbatim, replacing any existing one.
    pub fn insert_slot(&mut self, position: PlanPosition, courses: Vec<String>) {
        *self.slot_mut(position) = courses;
    }

    /// Slots in plan order.
    pub fn slots(&self) -> impl Iterator<Item = (PlanPosition, &[String])> + '_ {
        self.years.iter().flat_map(|(&year, semesters)| {
            semesters.iter().map(move |(&semester, courses)| {
                (PlanPosition { year, semester }, courses.as_slice())
            })
        })
    }

    #[cfg(test)]
    pub fn courses_at(&self, position: PlanPosition) -> Option<&[String]> {
        self.years
            .get(&position.year)
            .and_then(|s| s.get(&position.semester))
            .map(|c| c.as_slice())
    }

    pub fn start(&self) -> Option<PlanPosition> {
        self.slots().next().map(|(p, _)| p)
    }

    pub fn slot_count(&self) -> usize {
        self.years.values().map(|s| s.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.slot_count() == 0
    }

    /// Every slot at or after `position`.
    pub fn slice_from(&self, position: PlanPosition) -> SemesterMapping {
        let mut out = SemesterMapping::default();
        for (p, courses) in self.slots() {
            if p >= position {
                out.insert_slot(p, courses.to_vec());
            }
        }
        out
    }

    /// Every slot strictly before `position`.
    pub fn before(&self, position: PlanPosition) -> SemesterMapping {
        let mut out = SemesterMapping::default();
        for (p, courses) in self.slots() {
            if p < position {
                out.insert_slot(p, courses.to_vec());
            }
        }
        out
    }

    /// Keeps slots but drops the course codes `keep` rejects.
    pub fn retain_courses<F>(&self, mut keep: F) -> SemesterMapping
    where
        F: FnMut(&str) -> bool,
    {
        let mut out = SemesterMapping::default();
        for (p, courses) in self.slots() {
            let kept = courses
                .iter()
                .filter(|c| keep(c.as_str()))
                .cloned()
                .collect();
            out.insert_slot(p, kept);
        }
        out
    }

    /// `{"Year 1": {"Semester 1": ["CS101", ...]}, ...}`
    pub fn to_labelled_json(&self) -> JsonValue {
        let mut years = Map::new();
        for (year, semesters) in &self.years {
            let mut obj = Map::new();
            for (semester, courses) in semesters {
                obj.insert(format!("Semester {semester}"), json!(courses));
            }
            years.insert(format!("Year {year}"), JsonValue::Object(obj));
        }
        JsonValue::Object(years)
    }

    pub fn to_slot_list_json(&self) -> JsonValue {
        JsonValue::Array(
            self.slots()
                .map(|(p, courses)| {
                    json!({
                        "year": p.year,
                        "semester": p.semester,
                        "courses": courses,
                    })
                })
                .collect(),
        )
    }
}

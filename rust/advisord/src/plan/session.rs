use super::PlanError;
use serde::Serialize;

/// An academic session: the start year of an academic year plus a semester
/// number within it. Orders by year, then semester.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcademicSession {
    pub start_year: i32,
    pub semester: u32,
}

impl AcademicSession {
    /// Accepts `2023/2024`, `2023-2024`, `2023-24` or a bare `2023`.
    pub fn parse(academic_year: &str, semester: u32) -> Result<Self, PlanError> {
        let start_year = parse_start_year(academic_year)?;
        if semester == 0 {
            return Err(PlanError::InvalidSemester);
        }
        Ok(Self {
            start_year,
            semester,
        })
    }

    pub fn label(&self) -> String {
        format!("{}/{}", self.start_year, self.start_year + 1)
    }
}

fn parse_start_year(raw: &str) -> Result<i32, PlanError> {
    let bad = || PlanError::InvalidAcademicYear(raw.to_string());
    let t = raw.trim();
    let (first, second) = match t.split_once(['/', '-']) {
        Some((a, b)) => (a.trim(), Some(b.trim())),
        None => (t, None),
    };
    if first.len() != 4 || !first.bytes().all(|b| b.is_ascii_digit()) {
        return Err(bad());
    }
    let start: i32 = first.parse().map_err(|_| bad())?;

    match second {
        None => Ok(start),
        Some(end) if end.len() == 4 => {
            let end: i32 = end.parse().map_err(|_| bad())?;
            if end == start + 1 {
                Ok(start)
            } else {
                Err(bad())
            }
        }
        Some(end) if end.len() == 2 => {
            let end: i32 = end.parse().map_err(|_| bad())?;
            if end == (start + 1) % 100 {
                Ok(start)
            } else {
                Err(bad())
            }
        }
        Some(_) => Err(bad()),
    }
}

/// A student's place in a programme plan, counted from `Year 1, Semester 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PlanPosition {
    pub year: u32,
    pub semester: u32,
}

impl PlanPosition {
    pub const START: PlanPosition = PlanPosition {
        year: 1,
        semester: 1,
    };

    pub fn new(year: u32, semester: u32, semesters_per_year: u32) -> Result<Self, PlanError> {
        if semesters_per_year == 0 {
            return Err(PlanError::InvalidSemestersPerYear);
        }
        if year == 0 {
            return Err(PlanError::InvalidYear(year));
        }
        if semester == 0 || semester > semesters_per_year {
            return Err(PlanError::SemesterOutOfRange {
                semester,
                per_year: semesters_per_year,
            });
        }
        Ok(Self { year, semester })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_academic_year_spellings() {
        for raw in ["2023/2024", "2023-2024", "2023-24", " 2023 "] {
            let s = AcademicSession::parse(raw, 1).expect(raw);
            assert_eq!(s.start_year, 2023, "{raw}");
        }
    }

    #[test]
    fn rejects_non_consecutive_years() {
        assert!(AcademicSession::parse("2023/2025", 1).is_err());
        assert!(AcademicSession::parse("2023-26", 1).is_err());
        assert!(AcademicSession::parse("AY23", 1).is_err());
        assert!(AcademicSession::parse("", 1).is_err());
    }

    #[test]
    fn century_rollover_short_form() {
        let s = AcademicSession::parse("2099-00", 2).expect("parse");
        assert_eq!(s.start_year, 2099);
        assert_eq!(s.label(), "2099/2100");
    }

    #[test]
    fn sessions_order_by_year_then_semester() {
        let a = AcademicSession::parse("2023/2024", 2).unwrap();
        let b = AcademicSession::parse("2024/2025", 1).unwrap();
        assert!(a < b);
    }

    #[test]
    fn position_validation() {
        assert!(PlanPosition::new(1, 1, 2).is_ok());
        assert_eq!(PlanPosition::new(0, 1, 2), Err(PlanError::InvalidYear(0)));
        assert_eq!(
            PlanPosition::new(1, 3, 2),
            Err(PlanError::SemesterOutOfRange {
                semester: 3,
                per_year: 2
            })
        );
        assert_eq!(
            PlanPosition::new(1, 1, 0),
            Err(PlanError::InvalidSemestersPerYear)
        );
    }
}

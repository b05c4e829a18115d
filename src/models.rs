use std::collections::BTreeMap;

use serde::Serialize;
use uuid::Uuid;

use crate::aspect::Aspect;
use crate::grade::Grade;

/// One course offering's evaluation aggregates, as ingested. Raw inputs are
/// never mutated by scoring; derived values live in the scorecard types.
#[derive(Debug, Clone)]
pub struct CourseRecord {
    pub id: Uuid,
    pub title: String,
    pub department: String,
    pub instructor: String,
    pub term: String,
    pub responses: i64,
    pub invited_responses: i64,
    /// Raw mean rating per rated aspect; absent key means unrated.
    pub ratings: BTreeMap<Aspect, f64>,
    pub hours_mean: Option<f64>,
    pub recommend_mean: Option<f64>,
    pub comment_count: i64,
}

impl CourseRecord {
    /// Raw mean for an aspect, treating non-finite values as missing.
    pub fn raw_mean(&self, aspect: Aspect) -> Option<f64> {
        self.ratings.get(&aspect).copied().filter(|v| v.is_finite())
    }
}

/// All taught courses folded into one weighted observation per aspect.
#[derive(Debug, Clone)]
pub struct InstructorRecord {
    pub name: String,
    pub departments: Vec<String>,
    pub total_ratings: i64,
    /// Per aspect: (responses-weighted raw mean, summed responses) over the
    /// courses that rate the aspect.
    pub folded: BTreeMap<Aspect, (f64, i64)>,
}

impl InstructorRecord {
    pub fn observation(&self, aspect: Aspect) -> (Option<f64>, i64) {
        match self.folded.get(&aspect) {
            Some(&(raw, n)) => (Some(raw), n),
            None => (None, 0),
        }
    }
}

/// Derived triple for one (record, aspect, scope). `None` means "No Data"
/// and is surfaced as such; a numeric placeholder is never substituted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredValue {
    pub score: Option<f64>,
    pub percentile: Option<f64>,
    pub grade: Option<Grade>,
}

impl ScoredValue {
    pub const NO_DATA: ScoredValue = ScoredValue {
        score: None,
        percentile: None,
        grade: None,
    };
}

/// Population a score is computed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Global,
    Department,
}

impl Scope {
    pub fn as_str(self) -> &'static str {
        match self {
            Scope::Global => "global",
            Scope::Department => "department",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CourseScorecard {
    pub course_id: Uuid,
    pub global: BTreeMap<Aspect, ScoredValue>,
    pub department: BTreeMap<Aspect, ScoredValue>,
}

impl CourseScorecard {
    pub fn value(&self, aspect: Aspect, scope: Scope) -> ScoredValue {
        let map = match scope {
            Scope::Global => &self.global,
            Scope::Department => &self.department,
        };
        map.get(&aspect).copied().unwrap_or(ScoredValue::NO_DATA)
    }
}

#[derive(Debug, Clone)]
pub struct InstructorScorecard {
    pub name: String,
    pub departments: Vec<String>,
    pub total_ratings: i64,
    pub scores: BTreeMap<Aspect, ScoredValue>,
    /// Position in the descending instructor-overall ordering, 1 = best.
    /// Absent when the instructor has no overall score.
    pub global_rank: Option<i64>,
}

impl InstructorScorecard {
    pub fn overall(&self) -> ScoredValue {
        self.scores
            .get(&Aspect::InstructorOverall)
            .copied()
            .unwrap_or(ScoredValue::NO_DATA)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DepartmentSummary {
    pub name: String,
    pub instructor_count: usize,
    pub mean_overall_score: Option<f64>,
    pub mean_global_rank: Option<f64>,
}

/// Result of one full scoring pass. Computed in one shot over the complete
/// snapshot and published atomically; never partially updated.
#[derive(Debug, Clone)]
pub struct ScoringOutcome {
    pub courses: Vec<CourseScorecard>,
    pub instructors: Vec<InstructorScorecard>,
    pub departments: Vec<DepartmentSummary>,
}

/// Row shape for the stored-score course listing. Courses with no stored
/// score for the aspect still appear, with both fields absent.
#[derive(Debug, Clone)]
pub struct CourseScoreRow {
    pub title: String,
    pub instructor: String,
    pub term: String,
    pub department: String,
    pub responses: i64,
    pub score: Option<f64>,
    pub grade: Option<String>,
}

impl CourseScoreRow {
    pub fn summary_line(&self) -> String {
        let scored = match (self.score, self.grade.as_deref()) {
            (Some(score), Some(grade)) => format!("score {score:.2} ({grade})"),
            _ => "No Data".to_string(),
        };
        format!(
            "{} ({}, {}, {}) {} across {} responses",
            self.title, self.instructor, self.department, self.term, scored, self.responses
        )
    }
}

/// Row shape for the stored instructor leaderboard.
#[derive(Debug, Clone)]
pub struct InstructorRow {
    pub name: String,
    pub departments: String,
    pub total_ratings: i64,
    pub overall_score: Option<f64>,
    pub overall_grade: Option<String>,
    pub global_rank: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AspectScoreExport {
    pub score: f64,
    pub percentile: f64,
    pub grade: String,
}

/// JSON export shape consumed by the downstream site build.
#[derive(Debug, Clone, Serialize)]
pub struct InstructorExport {
    pub name: String,
    pub departments: Vec<String>,
    pub total_ratings: i64,
    pub eb_score: Option<f64>,
    pub overall_grade: Option<String>,
    pub global_rank: Option<i64>,
    pub aspects: BTreeMap<String, AspectScoreExport>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_mean_filters_non_finite() {
        let mut ratings = BTreeMap::new();
        ratings.insert(Aspect::CourseOverall, f64::NAN);
        ratings.insert(Aspect::Materials, 4.5);
        let course = CourseRecord {
            id: Uuid::new_v4(),
            title: "Intro Statistics".to_string(),
            department: "Statistics".to_string(),
            instructor: "Rivera".to_string(),
            term: "2023 Fall".to_string(),
            responses: 40,
            invited_responses: 55,
            ratings,
            hours_mean: None,
            recommend_mean: None,
            comment_count: 0,
        };
        assert_eq!(course.raw_mean(Aspect::CourseOverall), None);
        assert_eq!(course.raw_mean(Aspect::Materials), Some(4.5));
        assert_eq!(course.raw_mean(Aspect::Section), None);
    }

    #[test]
    fn course_listing_shows_no_data_for_unscored_rows() {
        let mut row = CourseScoreRow {
            title: "Logic and Formal Systems".to_string(),
            instructor: "Okafor".to_string(),
            term: "2023 Fall".to_string(),
            department: "Philosophy".to_string(),
            responses: 0,
            score: None,
            grade: None,
        };
        assert!(row.summary_line().contains("No Data"));

        row.score = Some(4.318);
        row.grade = Some("B+".to_string());
        let line = row.summary_line();
        assert!(line.contains("score 4.32 (B+)"));
        assert!(!line.contains("No Data"));
    }
}

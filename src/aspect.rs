use serde::{Deserialize, Serialize};

/// The closed set of rated survey dimensions that receive shrinkage scores.
///
/// Auxiliary aggregates (weekly hours, recommend rate, comment counts) are
/// carried on the course record but are never scored, so they are not part
/// of this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aspect {
    CourseOverall,
    Materials,
    Assignments,
    Feedback,
    Section,
    InstructorOverall,
    Effectiveness,
    Accessibility,
    Enthusiasm,
    Discussion,
    InstructorFeedback,
    TimelyReturns,
}

pub const ALL_ASPECTS: [Aspect; 12] = [
    Aspect::CourseOverall,
    Aspect::Materials,
    Aspect::Assignments,
    Aspect::Feedback,
    Aspect::Section,
    Aspect::InstructorOverall,
    Aspect::Effectiveness,
    Aspect::Accessibility,
    Aspect::Enthusiasm,
    Aspect::Discussion,
    Aspect::InstructorFeedback,
    Aspect::TimelyReturns,
];

impl Aspect {
    /// Stable key used for CSV headers, database rows, and CLI arguments.
    pub fn key(self) -> &'static str {
        match self {
            Aspect::CourseOverall => "course_mean_rating",
            Aspect::Materials => "materials_mean_rating",
            Aspect::Assignments => "assignments_mean_rating",
            Aspect::Feedback => "feedback_mean_rating",
            Aspect::Section => "section_mean_rating",
            Aspect::InstructorOverall => "instructor_mean_rating",
            Aspect::Effectiveness => "effective_mean_rating",
            Aspect::Accessibility => "accessible_mean_rating",
            Aspect::Enthusiasm => "enthusiasm_mean_rating",
            Aspect::Discussion => "discussion_mean_rating",
            Aspect::InstructorFeedback => "inst_feedback_mean_rating",
            Aspect::TimelyReturns => "returns_mean_rating",
        }
    }

    /// Survey question wording, for report headings.
    pub fn label(self) -> &'static str {
        match self {
            Aspect::CourseOverall => "Evaluate the course overall",
            Aspect::Materials => "Course materials",
            Aspect::Assignments => "Assignments",
            Aspect::Feedback => "Feedback received on work produced",
            Aspect::Section => "Section component",
            Aspect::InstructorOverall => "Evaluate your instructor overall",
            Aspect::Effectiveness => "Gives effective lectures or presentations",
            Aspect::Accessibility => "Is accessible outside of class",
            Aspect::Enthusiasm => "Generates enthusiasm for the subject matter",
            Aspect::Discussion => "Facilitates discussion and participation",
            Aspect::InstructorFeedback => "Gives useful feedback on assignments",
            Aspect::TimelyReturns => "Returns assignments in a timely fashion",
        }
    }

    pub fn from_key(key: &str) -> Option<Aspect> {
        ALL_ASPECTS.iter().copied().find(|a| a.key() == key)
    }
}

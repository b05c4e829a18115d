use std::fmt::Write;

use chrono::NaiveDate;

use crate::aspect::{Aspect, ALL_ASPECTS};
use crate::grade::ordinal;
use crate::models::{CourseRecord, Scope, ScoredValue, ScoringOutcome};

fn fmt_scored(value: ScoredValue) -> String {
    match (value.score, value.grade) {
        (Some(score), Some(grade)) => format!("{score:.2} ({grade})"),
        _ => "No Data".to_string(),
    }
}

pub fn build_report(
    department: Option<&str>,
    generated_on: NaiveDate,
    courses: &[CourseRecord],
    outcome: &ScoringOutcome,
) -> String {
    let mut output = String::new();
    let scope_label = department.unwrap_or("all departments");
    let scope = if department.is_some() {
        Scope::Department
    } else {
        Scope::Global
    };

    let _ = writeln!(output, "# Course Evaluation Rankings");
    let _ = writeln!(
        output,
        "Generated {} for {} ({} courses, {} instructors)",
        generated_on,
        scope_label,
        courses.len(),
        outcome.instructors.len()
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Top Courses");

    let mut ranked: Vec<usize> = (0..courses.len())
        .filter(|&idx| {
            department.map_or(true, |d| courses[idx].department == d)
                && outcome.courses[idx]
                    .value(Aspect::CourseOverall, scope)
                    .score
                    .is_some()
        })
        .collect();
    ranked.sort_by(|&a, &b| {
        let sa = outcome.courses[a].value(Aspect::CourseOverall, scope).score;
        let sb = outcome.courses[b].value(Aspect::CourseOverall, scope).score;
        sb.partial_cmp(&sa)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| courses[a].title.cmp(&courses[b].title))
    });

    if ranked.is_empty() {
        let _ = writeln!(output, "No scored courses in this scope.");
    } else {
        for &idx in ranked.iter().take(10) {
            let course = &courses[idx];
            let value = outcome.courses[idx].value(Aspect::CourseOverall, scope);
            let _ = writeln!(
                output,
                "- {} ({}, {}) with {} across {} responses",
                course.title,
                course.instructor,
                course.term,
                fmt_scored(value),
                course.responses
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Top Instructors");

    let mut instructors: Vec<&crate::models::InstructorScorecard> = outcome
        .instructors
        .iter()
        .filter(|i| {
            i.global_rank.is_some()
                && department.map_or(true, |d| i.departments.iter().any(|x| x == d))
        })
        .collect();
    instructors.sort_by_key(|i| i.global_rank);

    if instructors.is_empty() {
        let _ = writeln!(output, "No ranked instructors in this scope.");
    } else {
        for card in instructors.iter().take(10) {
            let rank = card.global_rank.unwrap_or(0);
            let _ = writeln!(
                output,
                "- {} ({}) {} overall, {} of all instructors, {} total ratings",
                card.name,
                card.departments.join(", "),
                fmt_scored(card.overall()),
                ordinal(rank),
                card.total_ratings
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Departments");

    let departments: Vec<_> = outcome
        .departments
        .iter()
        .filter(|d| department.map_or(true, |name| d.name == name))
        .collect();
    if departments.is_empty() {
        let _ = writeln!(output, "No department rollups in this scope.");
    } else {
        for dept in departments {
            match (dept.mean_overall_score, dept.mean_global_rank) {
                (Some(score), Some(rank)) => {
                    let _ = writeln!(
                        output,
                        "- {}: {} instructors, mean score {:.2}, mean global rank {:.1}",
                        dept.name, dept.instructor_count, score, rank
                    );
                }
                _ => {
                    let _ = writeln!(
                        output,
                        "- {}: {} instructors, No Data",
                        dept.name, dept.instructor_count
                    );
                }
            }
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Rating Coverage");

    for aspect in ALL_ASPECTS {
        let rated = courses.iter().filter(|c| c.raw_mean(aspect).is_some()).count();
        let _ = writeln!(
            output,
            "- {}: {} of {} courses rated",
            aspect.label(),
            rated,
            courses.len()
        );
    }

    output
}

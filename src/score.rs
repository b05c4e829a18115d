use std::collections::BTreeMap;

use anyhow::bail;

use crate::aspect::{Aspect, ALL_ASPECTS};
use crate::bayes;
use crate::grade::{classify, percentile, GradePolicy};
use crate::models::{
    CourseRecord, CourseScorecard, DepartmentSummary, InstructorRecord, InstructorScorecard,
    ScoredValue, ScoringOutcome,
};

/// Run the full scoring pass over a complete snapshot of course records.
///
/// For every aspect the pipeline (population stats, shrinkage, percentile
/// rank, letter grade) runs once per population: globally, once per
/// department, and over the folded instructor observations. Missing data
/// flows through as No Data; a negative response count anywhere aborts the
/// pass before anything is scored, since the shrinkage math is unsound for
/// negative weights.
///
/// Pure function of its input, so re-running on an unchanged snapshot is
/// byte-identical. Grouping uses ordered maps and all orderings break ties
/// on id or name to keep that true.
pub fn run_pass(courses: &[CourseRecord], policy: GradePolicy) -> anyhow::Result<ScoringOutcome> {
    for course in courses {
        if course.responses < 0 || course.invited_responses < 0 {
            bail!(
                "course {} ({}) has a negative response count",
                course.id,
                course.title
            );
        }
    }

    let mut cards: Vec<CourseScorecard> = courses
        .iter()
        .map(|c| CourseScorecard {
            course_id: c.id,
            global: BTreeMap::new(),
            department: BTreeMap::new(),
        })
        .collect();

    // Global scope: one population holding every course.
    let all_indices: Vec<usize> = (0..courses.len()).collect();
    for aspect in ALL_ASPECTS {
        let values = score_population(courses, &all_indices, aspect, policy);
        for (&idx, value) in all_indices.iter().zip(values) {
            cards[idx].global.insert(aspect, value);
        }
    }

    // Department scope: one population per department.
    let mut by_department: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (idx, course) in courses.iter().enumerate() {
        by_department
            .entry(course.department.as_str())
            .or_default()
            .push(idx);
    }
    for indices in by_department.values() {
        for aspect in ALL_ASPECTS {
            let values = score_population(courses, indices, aspect, policy);
            for (&idx, value) in indices.iter().zip(values) {
                cards[idx].department.insert(aspect, value);
            }
        }
    }

    let instructors = score_instructors(&fold_instructors(courses), policy);
    let departments = summarize_departments(&instructors);

    Ok(ScoringOutcome {
        courses: cards,
        instructors,
        departments,
    })
}

/// Stats -> shrink -> rank -> classify for one aspect over one population.
/// Returns one ScoredValue per member, in the order of `indices`.
fn score_population(
    courses: &[CourseRecord],
    indices: &[usize],
    aspect: Aspect,
    policy: GradePolicy,
) -> Vec<ScoredValue> {
    let observations: Vec<(Option<f64>, i64)> = indices
        .iter()
        .map(|&idx| (courses[idx].raw_mean(aspect), courses[idx].responses))
        .collect();
    score_observations(&observations, policy)
}

fn score_observations(observations: &[(Option<f64>, i64)], policy: GradePolicy) -> Vec<ScoredValue> {
    let stats = bayes::population_stats(observations);
    let scores: Vec<Option<f64>> = observations
        .iter()
        .map(|&(raw, n)| bayes::shrink(raw, n, &stats))
        .collect();

    // Percentiles come from one shared snapshot of the scored population.
    let mut distribution: Vec<f64> = scores.iter().filter_map(|s| *s).collect();
    distribution.sort_by(f64::total_cmp);

    scores
        .into_iter()
        .map(|score| match score {
            Some(value) => {
                let rank = percentile(value, &distribution);
                ScoredValue {
                    score: Some(value),
                    percentile: Some(rank),
                    grade: Some(classify(policy, rank)),
                }
            }
            None => ScoredValue::NO_DATA,
        })
        .collect()
}

/// Fold every course naming an instructor into one weighted observation per
/// aspect: raw mean weighted by response count, n summed. Courses with zero
/// responses carry no weight; if an instructor's only ratings for an aspect
/// have zero responses the plain mean stands in (the score shrinks fully to
/// the prior either way).
pub fn fold_instructors(courses: &[CourseRecord]) -> Vec<InstructorRecord> {
    struct Fold {
        departments: Vec<String>,
        total_ratings: i64,
        // per aspect: (sum raw*n, sum n, sum raw, count)
        sums: BTreeMap<Aspect, (f64, i64, f64, usize)>,
    }

    let mut folds: BTreeMap<&str, Fold> = BTreeMap::new();
    for course in courses {
        let fold = folds.entry(course.instructor.as_str()).or_insert_with(|| Fold {
            departments: Vec::new(),
            total_ratings: 0,
            sums: BTreeMap::new(),
        });
        if !fold.departments.contains(&course.department) {
            fold.departments.push(course.department.clone());
        }
        fold.total_ratings += course.responses;
        for aspect in ALL_ASPECTS {
            if let Some(raw) = course.raw_mean(aspect) {
                let entry = fold.sums.entry(aspect).or_insert((0.0, 0, 0.0, 0));
                entry.0 += raw * course.responses as f64;
                entry.1 += course.responses;
                entry.2 += raw;
                entry.3 += 1;
            }
        }
    }

    folds
        .into_iter()
        .map(|(name, mut fold)| {
            fold.departments.sort();
            let folded = fold
                .sums
                .into_iter()
                .map(|(aspect, (weighted_sum, n, raw_sum, count))| {
                    let raw = if n > 0 {
                        weighted_sum / n as f64
                    } else {
                        raw_sum / count as f64
                    };
                    (aspect, (raw, n))
                })
                .collect();
            InstructorRecord {
                name: name.to_string(),
                departments: fold.departments,
                total_ratings: fold.total_ratings,
                folded,
            }
        })
        .collect()
}

/// Score the instructor population per aspect, then assign integer global
/// ranks (1 = best) on the instructor-overall ordering, ties broken by name.
fn score_instructors(
    instructors: &[InstructorRecord],
    policy: GradePolicy,
) -> Vec<InstructorScorecard> {
    let mut cards: Vec<InstructorScorecard> = instructors
        .iter()
        .map(|i| InstructorScorecard {
            name: i.name.clone(),
            departments: i.departments.clone(),
            total_ratings: i.total_ratings,
            scores: BTreeMap::new(),
            global_rank: None,
        })
        .collect();

    for aspect in ALL_ASPECTS {
        let observations: Vec<(Option<f64>, i64)> =
            instructors.iter().map(|i| i.observation(aspect)).collect();
        for (card, value) in cards.iter_mut().zip(score_observations(&observations, policy)) {
            card.scores.insert(aspect, value);
        }
    }

    let mut order: Vec<usize> = (0..cards.len())
        .filter(|&idx| cards[idx].overall().score.is_some())
        .collect();
    order.sort_by(|&a, &b| {
        let sa = cards[a].overall().score.unwrap_or(f64::NEG_INFINITY);
        let sb = cards[b].overall().score.unwrap_or(f64::NEG_INFINITY);
        sb.total_cmp(&sa).then_with(|| cards[a].name.cmp(&cards[b].name))
    });
    for (position, idx) in order.into_iter().enumerate() {
        cards[idx].global_rank = Some(position as i64 + 1);
    }

    cards
}

/// Roll instructor results up per department: member count, mean overall
/// score, mean global rank. Instructors without an overall score are not
/// counted.
fn summarize_departments(instructors: &[InstructorScorecard]) -> Vec<DepartmentSummary> {
    let mut stats: BTreeMap<&str, (usize, f64, f64)> = BTreeMap::new();
    for card in instructors {
        let (score, rank) = match (card.overall().score, card.global_rank) {
            (Some(score), Some(rank)) => (score, rank),
            _ => continue,
        };
        for department in &card.departments {
            let entry = stats.entry(department.as_str()).or_insert((0, 0.0, 0.0));
            entry.0 += 1;
            entry.1 += score;
            entry.2 += rank as f64;
        }
    }

    stats
        .into_iter()
        .map(|(name, (count, score_sum, rank_sum))| DepartmentSummary {
            name: name.to_string(),
            instructor_count: count,
            mean_overall_score: (count > 0).then(|| score_sum / count as f64),
            mean_global_rank: (count > 0).then(|| rank_sum / count as f64),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn course(
        title: &str,
        department: &str,
        instructor: &str,
        responses: i64,
        ratings: &[(Aspect, f64)],
    ) -> CourseRecord {
        CourseRecord {
            id: Uuid::new_v4(),
            title: title.to_string(),
            department: department.to_string(),
            instructor: instructor.to_string(),
            term: "2023 Fall".to_string(),
            responses,
            invited_responses: responses,
            ratings: ratings.iter().copied().collect::<BTreeMap<_, _>>(),
            hours_mean: None,
            recommend_mean: None,
            comment_count: 0,
        }
    }

    fn overall(v: f64) -> Vec<(Aspect, f64)> {
        vec![(Aspect::CourseOverall, v)]
    }

    #[test]
    fn worked_three_course_population() {
        let courses = vec![
            course("Alpha", "Statistics", "Rivera", 3, &overall(5.0)),
            course("Beta", "Statistics", "Okafor", 79, &overall(4.97)),
            course("Gamma", "Statistics", "Chen", 0, &overall(3.0)),
        ];
        let outcome = run_pass(&courses, GradePolicy::Fine).unwrap();

        let m = (5.0 + 4.97 + 3.0) / 3.0;
        let c = (3.0 + 79.0 + 0.0) / 3.0;

        let s1 = outcome.courses[0].global[&Aspect::CourseOverall].score.unwrap();
        let s2 = outcome.courses[1].global[&Aspect::CourseOverall].score.unwrap();
        let s3 = outcome.courses[2].global[&Aspect::CourseOverall].score.unwrap();

        assert!((s1 - (c * m + 5.0 * 3.0) / (c + 3.0)).abs() < 1e-12);
        assert!((s2 - (c * m + 4.97 * 79.0) / (c + 79.0)).abs() < 1e-12);
        // Zero responses collapse to the prior mean exactly.
        assert_eq!(s3, m);

        // Low-n Alpha is pulled well below its 5.0 raw mean; high-n Beta
        // lands above both others.
        assert!(s1 < 4.5 && s1 > m);
        assert!(s2 > s1 && s2 > s3);

        let p = |i: usize| outcome.courses[i].global[&Aspect::CourseOverall].percentile.unwrap();
        assert_eq!(p(2), 0.0);
        assert!((p(0) - 100.0 / 3.0).abs() < 1e-9);
        assert!((p(1) - 200.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn department_scope_uses_departmental_prior() {
        let courses = vec![
            course("Stat A", "Statistics", "Rivera", 10, &overall(4.8)),
            course("Stat B", "Statistics", "Okafor", 10, &overall(4.6)),
            course("Phil A", "Philosophy", "Laurent", 10, &overall(2.0)),
            course("Phil B", "Philosophy", "Moss", 10, &overall(2.2)),
        ];
        let outcome = run_pass(&courses, GradePolicy::Fine).unwrap();

        let stat_a = &outcome.courses[0];
        let global = stat_a.value(Aspect::CourseOverall, crate::models::Scope::Global);
        let dept = stat_a.value(Aspect::CourseOverall, crate::models::Scope::Department);

        // Globally the prior sits at 3.4; within Statistics it sits at 4.7,
        // so the department-scoped score shrinks far less.
        assert!(global.score.unwrap() < dept.score.unwrap());
        assert!((dept.score.unwrap() - 4.75).abs() < 0.05);

        // Department percentiles only rank against departmental peers.
        assert_eq!(dept.percentile, Some(50.0));
    }

    #[test]
    fn no_data_stays_isolated_per_aspect() {
        let ratings = vec![(Aspect::CourseOverall, 4.2), (Aspect::Materials, 4.0)];
        let courses = vec![
            course("Full", "History", "Ames", 20, &ratings),
            course("Partial", "History", "Baker", 20, &overall(3.9)),
        ];
        let outcome = run_pass(&courses, GradePolicy::Fine).unwrap();

        let partial = &outcome.courses[1];
        assert_eq!(partial.global[&Aspect::Materials], ScoredValue::NO_DATA);
        let scored = partial.global[&Aspect::CourseOverall];
        assert!(scored.score.is_some());
        assert!(scored.grade.is_some());
    }

    #[test]
    fn aspect_with_no_valid_data_is_no_data_for_everyone() {
        let courses = vec![
            course("One", "History", "Ames", 15, &overall(4.0)),
            course("Two", "History", "Baker", 25, &overall(3.5)),
        ];
        let outcome = run_pass(&courses, GradePolicy::Fine).unwrap();
        for card in &outcome.courses {
            assert_eq!(
                card.value(Aspect::Section, crate::models::Scope::Global),
                ScoredValue::NO_DATA
            );
            assert_eq!(
                card.value(Aspect::Section, crate::models::Scope::Department),
                ScoredValue::NO_DATA
            );
        }
    }

    #[test]
    fn negative_responses_abort_the_pass() {
        let mut bad = course("Bad", "History", "Ames", 5, &overall(4.0));
        bad.responses = -1;
        let err = run_pass(&[bad], GradePolicy::Fine).unwrap_err();
        assert!(err.to_string().contains("negative response count"));
    }

    #[test]
    fn pass_is_idempotent() {
        let courses = vec![
            course("Alpha", "Statistics", "Rivera", 3, &overall(5.0)),
            course("Beta", "Statistics", "Okafor", 79, &overall(4.97)),
            course("Gamma", "Philosophy", "Chen", 12, &overall(3.1)),
        ];
        let first = run_pass(&courses, GradePolicy::Fine).unwrap();
        let second = run_pass(&courses, GradePolicy::Fine).unwrap();
        assert_eq!(format!("{first:?}"), format!("{second:?}"));
    }

    #[test]
    fn instructor_fold_is_response_weighted() {
        let courses = vec![
            course(
                "Fall",
                "Statistics",
                "Rivera",
                30,
                &[(Aspect::InstructorOverall, 4.0)],
            ),
            course(
                "Spring",
                "Statistics",
                "Rivera",
                10,
                &[(Aspect::InstructorOverall, 5.0)],
            ),
            course(
                "Other",
                "Philosophy",
                "Rivera",
                0,
                &[(Aspect::InstructorOverall, 1.0)],
            ),
        ];
        let folded = fold_instructors(&courses);
        assert_eq!(folded.len(), 1);
        let rivera = &folded[0];
        assert_eq!(rivera.total_ratings, 40);
        assert_eq!(rivera.departments, vec!["Philosophy", "Statistics"]);

        let (raw, n) = rivera.observation(Aspect::InstructorOverall);
        assert_eq!(n, 40);
        // The zero-response 1.0 rating carries no weight.
        let expected = (4.0 * 30.0 + 5.0 * 10.0) / 40.0;
        assert!((raw.unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn instructor_ranks_are_dense_and_ordered() {
        let courses = vec![
            course("A", "Statistics", "Rivera", 50, &[(Aspect::InstructorOverall, 4.9)]),
            course("B", "Statistics", "Okafor", 50, &[(Aspect::InstructorOverall, 4.1)]),
            course("C", "Statistics", "Chen", 50, &[(Aspect::InstructorOverall, 3.2)]),
            course("D", "Statistics", "Unrated", 50, &overall(4.0)),
        ];
        let outcome = run_pass(&courses, GradePolicy::Fine).unwrap();

        let rank_of = |name: &str| {
            outcome
                .instructors
                .iter()
                .find(|i| i.name == name)
                .unwrap()
                .global_rank
        };
        assert_eq!(rank_of("Rivera"), Some(1));
        assert_eq!(rank_of("Okafor"), Some(2));
        assert_eq!(rank_of("Chen"), Some(3));
        assert_eq!(rank_of("Unrated"), None);
    }

    #[test]
    fn department_summary_averages_members() {
        let courses = vec![
            course("A", "Statistics", "Rivera", 50, &[(Aspect::InstructorOverall, 5.0)]),
            course("B", "Statistics", "Okafor", 50, &[(Aspect::InstructorOverall, 3.0)]),
            course("C", "Philosophy", "Laurent", 50, &[(Aspect::InstructorOverall, 4.0)]),
        ];
        let outcome = run_pass(&courses, GradePolicy::Fine).unwrap();

        let stats = outcome
            .departments
            .iter()
            .find(|d| d.name == "Statistics")
            .unwrap();
        assert_eq!(stats.instructor_count, 2);
        let rivera_score = outcome
            .instructors
            .iter()
            .find(|i| i.name == "Rivera")
            .unwrap()
            .overall()
            .score
            .unwrap();
        let okafor_score = outcome
            .instructors
            .iter()
            .find(|i| i.name == "Okafor")
            .unwrap()
            .overall()
            .score
            .unwrap();
        let expected = (rivera_score + okafor_score) / 2.0;
        assert!((stats.mean_overall_score.unwrap() - expected).abs() < 1e-12);
    }
}

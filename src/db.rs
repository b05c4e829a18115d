use std::collections::BTreeMap;

use anyhow::{bail, Context};
use chrono::Utc;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::aspect::{Aspect, ALL_ASPECTS};
use crate::models::{
    AspectScoreExport, CourseRecord, CourseScoreRow, InstructorExport, InstructorRow, Scope,
    ScoringOutcome,
};

const SCHEMA_STATEMENTS: &[&str] = &[
    "CREATE SCHEMA IF NOT EXISTS course_evals",
    r#"
    CREATE TABLE IF NOT EXISTS course_evals.courses (
        id UUID PRIMARY KEY,
        title TEXT NOT NULL,
        department TEXT NOT NULL,
        instructor TEXT NOT NULL,
        term TEXT NOT NULL,
        responses BIGINT NOT NULL DEFAULT 0,
        invited_responses BIGINT NOT NULL DEFAULT 0,
        course_mean_rating DOUBLE PRECISION,
        materials_mean_rating DOUBLE PRECISION,
        assignments_mean_rating DOUBLE PRECISION,
        feedback_mean_rating DOUBLE PRECISION,
        section_mean_rating DOUBLE PRECISION,
        instructor_mean_rating DOUBLE PRECISION,
        effective_mean_rating DOUBLE PRECISION,
        accessible_mean_rating DOUBLE PRECISION,
        enthusiasm_mean_rating DOUBLE PRECISION,
        discussion_mean_rating DOUBLE PRECISION,
        inst_feedback_mean_rating DOUBLE PRECISION,
        returns_mean_rating DOUBLE PRECISION,
        hours_mean DOUBLE PRECISION,
        recommend_mean DOUBLE PRECISION,
        comment_count BIGINT NOT NULL DEFAULT 0,
        source_key TEXT NOT NULL UNIQUE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS course_evals.course_scores (
        course_id UUID NOT NULL REFERENCES course_evals.courses (id) ON DELETE CASCADE,
        aspect TEXT NOT NULL,
        scope TEXT NOT NULL,
        score DOUBLE PRECISION NOT NULL,
        percentile DOUBLE PRECISION NOT NULL,
        grade TEXT NOT NULL,
        PRIMARY KEY (course_id, aspect, scope)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS course_evals.instructors (
        name TEXT PRIMARY KEY,
        departments TEXT NOT NULL,
        total_ratings BIGINT NOT NULL,
        overall_score DOUBLE PRECISION,
        overall_grade TEXT,
        global_rank BIGINT,
        scored_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS course_evals.instructor_scores (
        instructor_name TEXT NOT NULL,
        aspect TEXT NOT NULL,
        score DOUBLE PRECISION NOT NULL,
        percentile DOUBLE PRECISION NOT NULL,
        grade TEXT NOT NULL,
        PRIMARY KEY (instructor_name, aspect)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS course_evals.departments (
        name TEXT PRIMARY KEY,
        instructor_count BIGINT NOT NULL,
        mean_overall_score DOUBLE PRECISION,
        mean_global_rank DOUBLE PRECISION
    )
    "#,
    "CREATE INDEX IF NOT EXISTS courses_department_idx ON course_evals.courses (department)",
    "CREATE INDEX IF NOT EXISTS course_scores_lookup_idx ON course_evals.course_scores (aspect, scope, score)",
];

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    for statement in SCHEMA_STATEMENTS {
        sqlx::query(statement)
            .execute(pool)
            .await
            .context("failed to apply schema statement")?;
    }
    Ok(())
}

fn rating_columns() -> String {
    ALL_ASPECTS
        .iter()
        .map(|a| a.key())
        .collect::<Vec<_>>()
        .join(", ")
}

async fn upsert_course(
    pool: &PgPool,
    course: &CourseRecord,
    source_key: &str,
) -> anyhow::Result<bool> {
    let placeholders = (8..8 + ALL_ASPECTS.len())
        .map(|i| format!("${i}"))
        .collect::<Vec<_>>()
        .join(", ");
    let updates = ALL_ASPECTS
        .iter()
        .map(|a| format!("{key} = EXCLUDED.{key}", key = a.key()))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "INSERT INTO course_evals.courses \
         (id, title, department, instructor, term, responses, invited_responses, {ratings}, \
          hours_mean, recommend_mean, comment_count, source_key) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, {placeholders}, $20, $21, $22, $23) \
         ON CONFLICT (source_key) DO UPDATE SET \
         title = EXCLUDED.title, department = EXCLUDED.department, \
         instructor = EXCLUDED.instructor, term = EXCLUDED.term, \
         responses = EXCLUDED.responses, invited_responses = EXCLUDED.invited_responses, \
         {updates}, hours_mean = EXCLUDED.hours_mean, \
         recommend_mean = EXCLUDED.recommend_mean, comment_count = EXCLUDED.comment_count",
        ratings = rating_columns(),
    );

    let mut query = sqlx::query(&sql)
        .bind(course.id)
        .bind(&course.title)
        .bind(&course.department)
        .bind(&course.instructor)
        .bind(&course.term)
        .bind(course.responses)
        .bind(course.invited_responses);
    for aspect in ALL_ASPECTS {
        query = query.bind(course.raw_mean(aspect));
    }
    let result = query
        .bind(course.hours_mean)
        .bind(course.recommend_mean)
        .bind(course.comment_count)
        .bind(source_key)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let demo: &[(&str, &str, &str, &str, i64, i64, &[(Aspect, f64)])] = &[
        (
            "Introduction to Statistical Inference",
            "Statistics",
            "Marisol Rivera",
            "2022 Fall",
            79,
            104,
            &[
                (Aspect::CourseOverall, 4.97),
                (Aspect::Materials, 4.71),
                (Aspect::Assignments, 4.64),
                (Aspect::InstructorOverall, 4.92),
                (Aspect::Effectiveness, 4.88),
                (Aspect::Enthusiasm, 4.95),
            ],
        ),
        (
            "Topics in Bayesian Modeling",
            "Statistics",
            "Marisol Rivera",
            "2023 Spring",
            3,
            11,
            &[
                (Aspect::CourseOverall, 5.0),
                (Aspect::InstructorOverall, 5.0),
                (Aspect::Discussion, 5.0),
            ],
        ),
        (
            "Early Modern Philosophy",
            "Philosophy",
            "Theo Laurent",
            "2022 Fall",
            41,
            63,
            &[
                (Aspect::CourseOverall, 4.12),
                (Aspect::Materials, 3.9),
                (Aspect::Assignments, 3.75),
                (Aspect::InstructorOverall, 4.4),
                (Aspect::Discussion, 4.61),
                (Aspect::Accessibility, 4.05),
            ],
        ),
        (
            "Logic and Formal Systems",
            "Philosophy",
            "Ines Okafor",
            "2023 Fall",
            0,
            18,
            &[(Aspect::CourseOverall, 3.0)],
        ),
        (
            "The Victorian Novel",
            "English",
            "Priya Chandrasekhar",
            "2023 Spring",
            22,
            30,
            &[
                (Aspect::CourseOverall, 4.55),
                (Aspect::Feedback, 4.3),
                (Aspect::InstructorOverall, 4.7),
                (Aspect::InstructorFeedback, 4.48),
                (Aspect::TimelyReturns, 4.1),
            ],
        ),
        (
            "Shakespeare's Late Plays",
            "English",
            "Priya Chandrasekhar",
            "2022 Fall",
            35,
            44,
            &[
                (Aspect::CourseOverall, 4.3),
                (Aspect::Section, 4.0),
                (Aspect::InstructorOverall, 4.5),
                (Aspect::Enthusiasm, 4.8),
            ],
        ),
    ];

    for (title, department, instructor, term, responses, invited, ratings) in demo {
        let course = CourseRecord {
            id: Uuid::new_v4(),
            title: title.to_string(),
            department: department.to_string(),
            instructor: instructor.to_string(),
            term: term.to_string(),
            responses: *responses,
            invited_responses: *invited,
            ratings: ratings.iter().copied().collect(),
            hours_mean: Some(6.5),
            recommend_mean: Some(4.2),
            comment_count: responses / 3,
        };
        let source_key = format!("seed-{}-{}", department.to_lowercase(), term.replace(' ', "-"));
        let source_key = format!("{source_key}-{}", title.to_lowercase().replace(' ', "-"));
        upsert_course(pool, &course, &source_key).await?;
    }

    Ok(())
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        title: String,
        department: String,
        instructor: String,
        term: String,
        responses: i64,
        invited_responses: Option<i64>,
        course_mean_rating: Option<f64>,
        materials_mean_rating: Option<f64>,
        assignments_mean_rating: Option<f64>,
        feedback_mean_rating: Option<f64>,
        section_mean_rating: Option<f64>,
        instructor_mean_rating: Option<f64>,
        effective_mean_rating: Option<f64>,
        accessible_mean_rating: Option<f64>,
        enthusiasm_mean_rating: Option<f64>,
        discussion_mean_rating: Option<f64>,
        inst_feedback_mean_rating: Option<f64>,
        returns_mean_rating: Option<f64>,
        hours_mean: Option<f64>,
        recommend_mean: Option<f64>,
        comment_count: Option<i64>,
        source_key: Option<String>,
    }

    fn rating_of(row: &CsvRow, aspect: Aspect) -> Option<f64> {
        let value = match aspect {
            Aspect::CourseOverall => row.course_mean_rating,
            Aspect::Materials => row.materials_mean_rating,
            Aspect::Assignments => row.assignments_mean_rating,
            Aspect::Feedback => row.feedback_mean_rating,
            Aspect::Section => row.section_mean_rating,
            Aspect::InstructorOverall => row.instructor_mean_rating,
            Aspect::Effectiveness => row.effective_mean_rating,
            Aspect::Accessibility => row.accessible_mean_rating,
            Aspect::Enthusiasm => row.enthusiasm_mean_rating,
            Aspect::Discussion => row.discussion_mean_rating,
            Aspect::InstructorFeedback => row.inst_feedback_mean_rating,
            Aspect::TimelyReturns => row.returns_mean_rating,
        };
        // Non-finite values are treated as missing at this boundary so the
        // engine never sees them.
        value.filter(|v| v.is_finite())
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut inserted = 0usize;

    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result.with_context(|| format!("bad CSV record on line {}", line + 2))?;
        if row.responses < 0 || row.invited_responses.unwrap_or(0) < 0 {
            bail!(
                "negative response count for '{}' ({}) on line {}",
                row.title,
                row.term,
                line + 2
            );
        }

        let mut ratings: BTreeMap<Aspect, f64> = BTreeMap::new();
        for aspect in ALL_ASPECTS {
            if let Some(value) = rating_of(&row, aspect) {
                ratings.insert(aspect, value);
            }
        }

        let course = CourseRecord {
            id: Uuid::new_v4(),
            title: row.title.clone(),
            department: row.department.clone(),
            instructor: row.instructor.clone(),
            term: row.term.clone(),
            responses: row.responses,
            invited_responses: row.invited_responses.unwrap_or(0),
            ratings,
            hours_mean: row.hours_mean.filter(|v| v.is_finite()),
            recommend_mean: row.recommend_mean.filter(|v| v.is_finite()),
            comment_count: row.comment_count.unwrap_or(0),
        };
        let source_key = row
            .source_key
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

        if upsert_course(pool, &course, &source_key).await? {
            inserted += 1;
        }
    }

    Ok(inserted)
}

pub async fn fetch_courses(
    pool: &PgPool,
    department: Option<&str>,
) -> anyhow::Result<Vec<CourseRecord>> {
    let mut sql = format!(
        "SELECT id, title, department, instructor, term, responses, invited_responses, \
         {}, hours_mean, recommend_mean, comment_count \
         FROM course_evals.courses",
        rating_columns()
    );
    if department.is_some() {
        sql.push_str(" WHERE department = $1");
    }
    sql.push_str(" ORDER BY department, title, term");

    let mut query = sqlx::query(&sql);
    if let Some(value) = department {
        query = query.bind(value);
    }
    let rows = query.fetch_all(pool).await?;

    let mut courses = Vec::with_capacity(rows.len());
    for row in rows {
        let mut ratings = BTreeMap::new();
        for aspect in ALL_ASPECTS {
            if let Some(value) = row.get::<Option<f64>, _>(aspect.key()) {
                ratings.insert(aspect, value);
            }
        }
        courses.push(CourseRecord {
            id: row.get("id"),
            title: row.get("title"),
            department: row.get("department"),
            instructor: row.get("instructor"),
            term: row.get("term"),
            responses: row.get("responses"),
            invited_responses: row.get("invited_responses"),
            ratings,
            hours_mean: row.get("hours_mean"),
            recommend_mean: row.get("recommend_mean"),
            comment_count: row.get("comment_count"),
        });
    }

    Ok(courses)
}

/// Replace every stored score with the results of one pass, all inside a
/// single transaction so consumers never see a half-updated record set.
pub async fn persist_outcome(
    pool: &PgPool,
    courses: &[CourseRecord],
    outcome: &ScoringOutcome,
) -> anyhow::Result<()> {
    let mut tx: Transaction<'_, Postgres> = pool.begin().await?;

    sqlx::query("DELETE FROM course_evals.course_scores")
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM course_evals.instructor_scores")
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM course_evals.instructors")
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM course_evals.departments")
        .execute(&mut *tx)
        .await?;

    for (course, card) in courses.iter().zip(&outcome.courses) {
        for aspect in ALL_ASPECTS {
            for scope in [Scope::Global, Scope::Department] {
                let value = card.value(aspect, scope);
                let (score, rank, grade) = match (value.score, value.percentile, value.grade) {
                    (Some(s), Some(p), Some(g)) => (s, p, g),
                    _ => continue,
                };
                sqlx::query(
                    "INSERT INTO course_evals.course_scores \
                     (course_id, aspect, scope, score, percentile, grade) \
                     VALUES ($1, $2, $3, $4, $5, $6)",
                )
                .bind(course.id)
                .bind(aspect.key())
                .bind(scope.as_str())
                .bind(score)
                .bind(rank)
                .bind(grade.as_str())
                .execute(&mut *tx)
                .await?;
            }
        }
    }

    let scored_at = Utc::now();
    for card in &outcome.instructors {
        let overall = card.overall();
        sqlx::query(
            "INSERT INTO course_evals.instructors \
             (name, departments, total_ratings, overall_score, overall_grade, global_rank, scored_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(&card.name)
        .bind(card.departments.join(", "))
        .bind(card.total_ratings)
        .bind(overall.score)
        .bind(overall.grade.map(|g| g.as_str()))
        .bind(card.global_rank)
        .bind(scored_at)
        .execute(&mut *tx)
        .await?;

        for (aspect, value) in &card.scores {
            let (score, rank, grade) = match (value.score, value.percentile, value.grade) {
                (Some(s), Some(p), Some(g)) => (s, p, g),
                _ => continue,
            };
            sqlx::query(
                "INSERT INTO course_evals.instructor_scores \
                 (instructor_name, aspect, score, percentile, grade) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(&card.name)
            .bind(aspect.key())
            .bind(score)
            .bind(rank)
            .bind(grade.as_str())
            .execute(&mut *tx)
            .await?;
        }
    }

    for dept in &outcome.departments {
        sqlx::query(
            "INSERT INTO course_evals.departments \
             (name, instructor_count, mean_overall_score, mean_global_rank) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(&dept.name)
        .bind(dept.instructor_count as i64)
        .bind(dept.mean_overall_score)
        .bind(dept.mean_global_rank)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

pub async fn top_courses(
    pool: &PgPool,
    aspect: Aspect,
    department: Option<&str>,
    limit: i64,
) -> anyhow::Result<Vec<CourseScoreRow>> {
    let scope = if department.is_some() {
        Scope::Department
    } else {
        Scope::Global
    };
    // LEFT JOIN so courses with no stored score for the aspect still list,
    // trailing the scored ones as "No Data" rows.
    let mut sql = String::from(
        "SELECT c.title, c.instructor, c.term, c.department, c.responses, s.score, s.grade \
         FROM course_evals.courses c \
         LEFT JOIN course_evals.course_scores s \
         ON s.course_id = c.id AND s.aspect = $1 AND s.scope = $2",
    );
    if department.is_some() {
        sql.push_str(" WHERE c.department = $4");
    }
    sql.push_str(" ORDER BY s.score DESC NULLS LAST, c.title LIMIT $3");

    let mut query = sqlx::query(&sql)
        .bind(aspect.key())
        .bind(scope.as_str())
        .bind(limit);
    if let Some(value) = department {
        query = query.bind(value);
    }

    let rows = query.fetch_all(pool).await?;
    Ok(rows
        .into_iter()
        .map(|row| CourseScoreRow {
            title: row.get("title"),
            instructor: row.get("instructor"),
            term: row.get("term"),
            department: row.get("department"),
            responses: row.get("responses"),
            score: row.get("score"),
            grade: row.get("grade"),
        })
        .collect())
}

pub async fn top_instructors(
    pool: &PgPool,
    department: Option<&str>,
    limit: i64,
) -> anyhow::Result<Vec<InstructorRow>> {
    let mut sql = String::from(
        "SELECT name, departments, total_ratings, overall_score, overall_grade, global_rank \
         FROM course_evals.instructors WHERE global_rank IS NOT NULL",
    );
    if department.is_some() {
        sql.push_str(" AND $2 = ANY(string_to_array(departments, ', '))");
    }
    sql.push_str(" ORDER BY global_rank LIMIT $1");

    let mut query = sqlx::query(&sql).bind(limit);
    if let Some(value) = department {
        query = query.bind(value);
    }

    let rows = query.fetch_all(pool).await?;
    Ok(rows
        .into_iter()
        .map(|row| InstructorRow {
            name: row.get("name"),
            departments: row.get("departments"),
            total_ratings: row.get("total_ratings"),
            overall_score: row.get("overall_score"),
            overall_grade: row.get("overall_grade"),
            global_rank: row.get("global_rank"),
        })
        .collect())
}

/// Full instructor dump for the JSON hand-off consumed by the site build.
pub async fn export_instructors(pool: &PgPool) -> anyhow::Result<Vec<InstructorExport>> {
    let rows = sqlx::query(
        "SELECT name, departments, total_ratings, overall_score, overall_grade, global_rank \
         FROM course_evals.instructors ORDER BY name",
    )
    .fetch_all(pool)
    .await?;

    let mut exports: Vec<InstructorExport> = rows
        .into_iter()
        .map(|row| {
            let departments: String = row.get("departments");
            InstructorExport {
                name: row.get("name"),
                departments: departments
                    .split(", ")
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect(),
                total_ratings: row.get("total_ratings"),
                eb_score: row.get("overall_score"),
                overall_grade: row.get("overall_grade"),
                global_rank: row.get("global_rank"),
                aspects: BTreeMap::new(),
            }
        })
        .collect();

    let score_rows = sqlx::query(
        "SELECT instructor_name, aspect, score, percentile, grade \
         FROM course_evals.instructor_scores ORDER BY instructor_name, aspect",
    )
    .fetch_all(pool)
    .await?;

    let mut by_name: BTreeMap<String, Vec<(String, AspectScoreExport)>> = BTreeMap::new();
    for row in score_rows {
        by_name
            .entry(row.get("instructor_name"))
            .or_default()
            .push((
                row.get("aspect"),
                AspectScoreExport {
                    score: row.get("score"),
                    percentile: row.get("percentile"),
                    grade: row.get("grade"),
                },
            ));
    }
    for export in &mut exports {
        if let Some(scores) = by_name.remove(&export.name) {
            export.aspects = scores.into_iter().collect();
        }
    }

    Ok(exports)
}

use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;

mod aspect;
mod bayes;
mod db;
mod grade;
mod models;
mod report;
mod score;

use aspect::Aspect;
use grade::{ordinal, GradePolicy};

#[derive(Parser)]
#[command(name = "course-eval-rankings")]
#[command(about = "Empirical-Bayes rankings over course evaluation aggregates", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import course aggregates from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Run the full scoring pass and persist every score and grade
    Score {
        #[arg(long, value_enum, default_value_t = GradePolicy::Fine)]
        grade_policy: GradePolicy,
    },
    /// List top courses by stored score for one aspect
    Courses {
        #[arg(long)]
        department: Option<String>,
        #[arg(long, default_value = "course_mean_rating")]
        aspect: String,
        #[arg(long, default_value_t = 10)]
        limit: i64,
    },
    /// List instructors by global rank
    Instructors {
        #[arg(long)]
        department: Option<String>,
        #[arg(long, default_value_t = 10)]
        limit: i64,
    },
    /// Generate a markdown report
    Report {
        #[arg(long)]
        department: Option<String>,
        #[arg(long, value_enum, default_value_t = GradePolicy::Fine)]
        grade_policy: GradePolicy,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Export scored instructors as JSON
    Export {
        #[arg(long, default_value = "instructors.json")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let ingested = db::import_csv(&pool, &csv).await?;
            println!("Ingested {ingested} courses from {}.", csv.display());
        }
        Commands::Score { grade_policy } => {
            let courses = db::fetch_courses(&pool, None).await?;
            if courses.is_empty() {
                println!("No courses to score.");
                return Ok(());
            }
            let outcome = score::run_pass(&courses, grade_policy)?;
            db::persist_outcome(&pool, &courses, &outcome).await?;
            println!(
                "Scored {} courses, {} instructors, {} departments.",
                courses.len(),
                outcome.instructors.len(),
                outcome.departments.len()
            );
        }
        Commands::Courses {
            department,
            aspect,
            limit,
        } => {
            let aspect = Aspect::from_key(&aspect)
                .with_context(|| format!("unknown aspect '{aspect}'"))?;
            let rows = db::top_courses(&pool, aspect, department.as_deref(), limit).await?;

            if rows.is_empty() {
                println!("No courses found. Run `seed` or `import` first.");
                return Ok(());
            }

            println!("Top courses by {}:", aspect.label());
            for row in rows {
                println!("- {}", row.summary_line());
            }
        }
        Commands::Instructors { department, limit } => {
            let rows = db::top_instructors(&pool, department.as_deref(), limit).await?;

            if rows.is_empty() {
                println!("No ranked instructors. Run `score` first.");
                return Ok(());
            }

            println!("Top instructors:");
            for row in rows {
                let score = match row.overall_score {
                    Some(value) => format!("{value:.2}"),
                    None => "No Data".to_string(),
                };
                let grade = row.overall_grade.unwrap_or_else(|| "No Data".to_string());
                let rank = row
                    .global_rank
                    .map(ordinal)
                    .unwrap_or_else(|| "unranked".to_string());
                println!(
                    "- {} ({}) score {} ({}), {} overall, {} total ratings",
                    row.name, row.departments, score, grade, rank, row.total_ratings
                );
            }
        }
        Commands::Report {
            department,
            grade_policy,
            out,
        } => {
            let courses = db::fetch_courses(&pool, None).await?;
            let outcome = score::run_pass(&courses, grade_policy)?;
            let report = report::build_report(
                department.as_deref(),
                Utc::now().date_naive(),
                &courses,
                &outcome,
            );
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
        Commands::Export { out } => {
            let instructors = db::export_instructors(&pool).await?;
            if instructors.is_empty() {
                println!("No scored instructors to export. Run `score` first.");
                return Ok(());
            }
            let json = serde_json::to_string_pretty(&instructors)?;
            std::fs::write(&out, json)?;
            println!(
                "Exported {} instructors to {}.",
                instructors.len(),
                out.display()
            );
        }
    }

    Ok(())
}

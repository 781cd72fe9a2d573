use std::path::PathBuf;

use anyhow::Context;
use clap::{ArgGroup, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use grade_bulletin::bulletin::{self, Language};
use grade_bulletin::config::Settings;
use grade_bulletin::db::{self, PgGradeStore};
use grade_bulletin::models::RankScope;
use grade_bulletin::roles::Role;
use grade_bulletin::{ranking, GradeEngine};

#[derive(Parser)]
#[command(name = "grade-bulletin")]
#[command(about = "Trimester averages, rankings and bulletins for a school", long_about = None)]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import grades from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Subject and overall averages for one student
    Averages {
        #[arg(long)]
        student: Uuid,
        #[arg(long)]
        trimester: Uuid,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Rank a class or a level by overall average
    #[command(group(
        ArgGroup::new("scope")
            .args(["class", "level"])
            .required(true)
            .multiple(false)
    ))]
    Ranks {
        #[arg(long)]
        class: Option<Uuid>,
        #[arg(long)]
        level: Option<Uuid>,
        #[arg(long)]
        trimester: Uuid,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Generate a markdown bulletin
    Bulletin {
        #[arg(long)]
        student: Uuid,
        #[arg(long)]
        trimester: Uuid,
        #[arg(long, value_enum, default_value_t = Language::Fr)]
        language: Language,
        #[arg(long, default_value = "bulletin.md")]
        out: PathBuf,
    },
}

impl Commands {
    /// Whether `role` may run this command, and the action named when it may not.
    fn permission(&self, role: Role) -> (bool, &'static str) {
        match self {
            Commands::InitDb => (role.can_manage_grades(), "change the schema"),
            Commands::Seed => (role.can_manage_grades(), "seed grades"),
            Commands::Import { .. } => (role.can_manage_grades(), "import grades"),
            Commands::Averages { .. } => (role.can_calculate_grades(), "calculate averages"),
            Commands::Ranks { .. } => (role.can_view_rankings(), "view rankings"),
            Commands::Bulletin { .. } => (role.can_view_student_data(), "view bulletins"),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = cli.settings;

    let (allowed, action) = cli.command.permission(settings.role);
    settings.require(allowed, action)?;

    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .connect(settings.database_url()?)
        .await
        .context("failed to connect to Postgres")?;

    let engine = GradeEngine::new(PgGradeStore::new(pool.clone()), settings.weighting);

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
            let written = db::import_csv(&pool, &csv).await?;
            println!("Wrote {written} grades from {}.", csv.display());
        }
        Commands::Averages {
            student,
            trimester,
            json,
        } => {
            let standing = engine.compute_student_standing(student, trimester).await?;

            if json {
                let subjects: Vec<_> = standing
                    .subjects
                    .iter()
                    .map(|line| {
                        serde_json::json!({
                            "subject_id": line.subject.subject_id,
                            "subject_name": line.subject.name,
                            "coefficient": line.subject.coefficient,
                            "average": line.average.average,
                            "grade_count": line.average.grade_count,
                        })
                    })
                    .collect();
                let payload = serde_json::json!({
                    "student_id": student,
                    "trimester_id": trimester,
                    "subject_averages": subjects,
                    "overall_average": standing.overall,
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
                return Ok(());
            }

            if standing.subjects.is_empty() {
                println!("No grades recorded for this trimester.");
                return Ok(());
            }

            println!("Subject averages for {}:", standing.placement.full_name);
            for line in &standing.subjects {
                println!(
                    "- {} {:.2} across {} grades",
                    line.subject.name, line.average.average, line.average.grade_count
                );
            }

            match standing.overall {
                Some(overall) => println!(
                    "Overall average {:.2} (total coefficient {})",
                    overall.average, overall.total_coefficient
                ),
                None => println!("Overall average N/A"),
            }
        }
        Commands::Ranks {
            class,
            level,
            trimester,
            limit,
            json,
        } => {
            let scope = match (class, level) {
                (Some(id), _) => RankScope::Class(id),
                (None, Some(id)) => RankScope::Level(id),
                (None, None) => anyhow::bail!("either --class or --level is required"),
            };
            let ranks = engine.compute_ranks(scope, trimester).await?;

            if json {
                let ordered = ranking::ordered_ranks(&ranks);
                println!("{}", serde_json::to_string_pretty(&ordered)?);
                return Ok(());
            }

            if ranks.is_empty() {
                println!("No graded students in {scope}.");
                return Ok(());
            }

            println!("Ranking for {scope}:");
            for entry in ranking::ordered_ranks(&ranks).into_iter().take(limit) {
                println!(
                    "- #{} of {}: {}",
                    entry.rank, entry.cohort_size, entry.student_id
                );
            }
        }
        Commands::Bulletin {
            student,
            trimester,
            language,
            out,
        } => {
            let assembled = bulletin::assemble(&engine, student, trimester).await?;
            let report = bulletin::render_markdown(&assembled, language);
            std::fs::write(&out, report)?;
            println!("Bulletin written to {}.", out.display());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_is_checked_without_a_database() {
        let cli = Cli::parse_from([
            "grade-bulletin",
            "--role",
            "parent",
            "ranks",
            "--class",
            "6b0f7c1e-3a55-4a8e-9a0f-0d7b5f1c2a11",
            "--trimester",
            "f1e2d3c4-b5a6-4798-8a9b-0c1d2e3f4a33",
        ]);

        let (allowed, action) = cli.command.permission(cli.settings.role);
        assert!(!allowed);
        assert_eq!(action, "view rankings");
        assert!(cli.settings.require(allowed, action).is_err());
    }

    #[test]
    fn permissions_follow_roles() {
        let import = Commands::Import {
            csv: PathBuf::from("grades.csv"),
        };
        assert!(import.permission(Role::Teacher).0);
        assert!(!import.permission(Role::Manager).0);

        let averages = Commands::Averages {
            student: Uuid::nil(),
            trimester: Uuid::nil(),
            json: false,
        };
        assert!(averages.permission(Role::Administrator).0);
        assert!(!averages.permission(Role::Teacher).0);
        assert!(Commands::InitDb.permission(Role::Teacher).0);
        assert!(!Commands::Seed.permission(Role::Student).0);
    }
}

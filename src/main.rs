use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::{ArgGroup, Args, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use groupscholar_engagement_analytics::models::EngagementBand;
use groupscholar_engagement_analytics::search::SearchField;
use groupscholar_engagement_analytics::skills::SkillDependencyGraph;
use groupscholar_engagement_analytics::telemetry::TracingTelemetry;
use groupscholar_engagement_analytics::{report, source, trend, AnalysisBatch, EngineConfig};

mod db;

const DEFAULT_LOG_FILTER: &str = "groupscholar_engagement_analytics=info,cohort_engagement=info";

#[derive(Parser)]
#[command(name = "cohort-engagement")]
#[command(about = "Engagement analytics for Group Scholar cohorts", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Where a batch comes from and how it is tuned.
#[derive(Args, Clone)]
#[command(group(
    ArgGroup::new("scope")
        .args(["activities", "cohort"])
        .multiple(false)
))]
struct SourceArgs {
    /// Activity CSV; when absent, records are read from DATABASE_URL
    #[arg(long)]
    activities: Option<PathBuf>,
    /// Student directory CSV, used together with --activities
    #[arg(long, requires = "activities")]
    profiles: Option<PathBuf>,
    #[arg(long)]
    cohort: Option<String>,
    #[arg(long, default_value_t = 90)]
    since_days: i64,
    /// JSON file overriding engine defaults
    #[arg(long)]
    config: Option<PathBuf>,
    /// JSON skill table of {"skill": ["prerequisite", ...]}
    #[arg(long)]
    skills: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import students and activities from CSV files
    Import {
        #[arg(long)]
        profiles: PathBuf,
        #[arg(long)]
        activities: PathBuf,
        #[arg(long)]
        cohort: String,
    },
    /// Rank students by engagement
    Rank {
        #[command(flatten)]
        source: SourceArgs,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Split students into low, medium and high engagement bands
    Categorize {
        #[command(flatten)]
        source: SourceArgs,
    },
    /// Search students by name, email or id
    Search {
        #[command(flatten)]
        source: SourceArgs,
        query: String,
        /// Match free text within the configured edit distance
        #[arg(long)]
        fuzzy: bool,
        /// List indexed terms starting with the query
        #[arg(long, conflicts_with = "fuzzy")]
        autocomplete: bool,
    },
    /// Show one student with rank, percentile and collaborators
    Student {
        #[command(flatten)]
        source: SourceArgs,
        id: String,
    },
    /// Suggest activity categories for a student
    Recommend {
        #[command(flatten)]
        source: SourceArgs,
        id: String,
    },
    /// Detect collaboration communities
    Communities {
        #[command(flatten)]
        source: SourceArgs,
    },
    /// Shortest prerequisite chain towards a skill
    Path {
        /// Skills already held, comma separated
        #[arg(long, value_delimiter = ',')]
        have: Vec<String>,
        target: String,
        #[arg(long)]
        skills: Option<PathBuf>,
    },
    /// Generate a markdown report
    Report {
        #[command(flatten)]
        source: SourceArgs,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

async fn connect() -> anyhow::Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

fn load_skills(path: Option<&PathBuf>) -> anyhow::Result<SkillDependencyGraph> {
    match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            Ok(SkillDependencyGraph::from_json(&raw)?)
        }
        None => Ok(SkillDependencyGraph::default_curriculum()),
    }
}

async fn load_batch(args: &SourceArgs) -> anyhow::Result<AnalysisBatch> {
    let as_of = Utc::now().date_naive();
    let config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    let skills = load_skills(args.skills.as_ref())?;

    let (records, profiles) = match &args.activities {
        Some(path) => {
            let records = source::load_activities(path)
                .with_context(|| format!("failed to load {}", path.display()))?;
            let records = trend::within_window(records, as_of, args.since_days);
            let profiles = match &args.profiles {
                Some(path) => source::load_profiles(path)
                    .with_context(|| format!("failed to load {}", path.display()))?,
                None => Vec::new(),
            };
            (records, profiles)
        }
        None => {
            let pool = connect().await?;
            let since_date = trend::cutoff_date(as_of, args.since_days);
            let records =
                db::fetch_activities(&pool, since_date, args.cohort.as_deref()).await?;
            let profiles = db::fetch_profiles(&pool, args.cohort.as_deref()).await?;
            (records, profiles)
        }
    };

    info!(
        records = records.len(),
        profiles = profiles.len(),
        "loaded record batch"
    );
    let batch = AnalysisBatch::build(
        records,
        &profiles,
        skills,
        config,
        as_of,
        Arc::new(TracingTelemetry),
    )?;
    Ok(batch)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with_ansi(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::InitDb => {
            let pool = connect().await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let pool = connect().await?;
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import {
            profiles,
            activities,
            cohort,
        } => {
            let pool = connect().await?;
            let students = source::load_profiles(&profiles)?;
            let records = source::load_activities(&activities)?;
            let inserted = db::import_csv(&pool, &students, &records, &cohort).await?;
            println!(
                "Inserted {inserted} activities for {} students from {}.",
                students.len(),
                activities.display()
            );
        }
        Commands::Rank { source, limit } => {
            let batch = load_batch(&source).await?;
            let ranked = batch.ranked_list();

            if ranked.is_empty() {
                println!("No students with engagement in this window.");
                return Ok(());
            }

            println!("Top students by engagement:");
            for entry in ranked.iter().take(limit) {
                println!(
                    "- #{} {} ({}) score {:.2}, percentile {}{}",
                    entry.rank,
                    entry.summary.display_name,
                    entry.summary.email,
                    entry.summary.aggregate_score,
                    entry.percentile,
                    if entry.is_top_performer { ", top performer" } else { "" }
                );
            }
        }
        Commands::Categorize { source } => {
            let batch = load_batch(&source).await?;
            let categories = batch.categorize();
            for band in [EngagementBand::High, EngagementBand::Medium, EngagementBand::Low] {
                let nodes = categories.band(band);
                println!("{} engagement ({}):", band.label(), nodes.len());
                for node in nodes.iter().rev() {
                    println!("- {} score {:.2}", node.payload.display_name, node.score);
                }
            }
        }
        Commands::Search {
            source,
            query,
            fuzzy,
            autocomplete,
        } => {
            let batch = load_batch(&source).await?;
            let search = batch.search();
            if autocomplete {
                for completion in search.autocomplete(&query, 10) {
                    println!("- {} ({} records)", completion.term, completion.records.len());
                }
            } else if fuzzy {
                for hit in batch.fuzzy_search(&query) {
                    println!("- {} (distance {})", hit.record, hit.distance);
                }
            } else {
                let hits = search.multi_field_search(&query);
                if hits.is_empty() {
                    println!("No students match {query:?}.");
                }
                for hit in hits {
                    println!("- {hit}");
                }
                if let Some(exact) = search.exact_search(SearchField::Id, &query) {
                    println!("Exact id match: {exact}");
                }
            }
        }
        Commands::Student { source, id } => {
            let mut batch = load_batch(&source).await?;
            let Some(student) = batch.student(&id) else {
                println!("No student with id {id}.");
                return Ok(());
            };
            let position = batch.index().position_of(&id).unwrap_or_default();
            println!(
                "{} ({}) score {:.2}, index position {} of {}, percentile {}",
                student.display_name,
                student.email,
                student.aggregate_score,
                position + 1,
                batch.index().len(),
                batch.index().percentile(student.aggregate_score)
            );
            if let Some(node) = batch.graph().node(&id) {
                for (peer, weight) in node.neighbors.iter() {
                    println!("- collaborates with {peer} ({weight}x)");
                }
            }
            let stats = batch.cache_stats();
            info!(
                size = stats.size,
                hits = stats.hits,
                misses = stats.misses,
                "recency cache"
            );
        }
        Commands::Recommend { source, id } => {
            let batch = load_batch(&source).await?;
            let recommendations = batch.recommend(&id);
            if recommendations.is_empty() {
                println!("No recommendations for {id}.");
            }
            for rec in recommendations {
                println!(
                    "- {} score {:.2} (peers {:.2}, gap {:.2})",
                    rec.category, rec.score, rec.collaborative, rec.content
                );
            }
        }
        Commands::Communities { source } => {
            let batch = load_batch(&source).await?;
            let components = batch.graph().connected_components();
            println!("{} connected groups.", components.len());
            for (i, community) in batch.communities().iter().enumerate() {
                println!(
                    "- community {}: {} ({} internal links)",
                    i + 1,
                    community.members.join(", "),
                    community.internal_edges
                );
            }
        }
        Commands::Path {
            have,
            target,
            skills,
        } => {
            let skills = load_skills(skills.as_ref())?;
            match skills.learning_path(&have, &target) {
                Some(path) => println!("{}", path.join(" -> ")),
                None => println!("No learning path to {target} from the given skills."),
            }
        }
        Commands::Report { source, out } => {
            let batch = load_batch(&source).await?;
            let report = report::build_report(&batch, source.cohort.as_deref(), source.since_days);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

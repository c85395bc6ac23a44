use std::future::Future;
use std::path::PathBuf;

use anyhow::{anyhow, Context};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod analytics;
mod calendar;
mod config;
mod db;
mod error;
mod models;
mod report;
mod stats;

use calendar::AsOf;
use config::Config;
use db::PgSnapshotSource;

#[derive(Parser)]
#[command(name = "church-analytics")]
#[command(about = "Dashboard analytics for church member and pastoral alert data", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Scope {
    /// Church to compute for; defaults to tenant.fallback_church_id
    #[arg(long, env = "CHURCH_ID")]
    church: Option<Uuid>,
    /// Evaluate as of this RFC 3339 instant instead of now
    #[arg(long, value_name = "TIMESTAMP")]
    as_of: Option<DateTime<Utc>>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed {
        #[arg(long, env = "CHURCH_ID")]
        church: Option<Uuid>,
    },
    /// Import members from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long, env = "CHURCH_ID")]
        church: Option<Uuid>,
    },
    /// Compute dashboard analytics as JSON
    Analytics {
        #[command(flatten)]
        scope: Scope,
        /// Write JSON here instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Summarise member engagement
    Stats {
        #[command(flatten)]
        scope: Scope,
    },
    /// Generate a markdown report
    Report {
        #[command(flatten)]
        scope: Scope,
        #[arg(long, default_value = "dashboard-report.md")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config::resolve(cli.config.as_deref())?;
    let tz = config.timezone()?;

    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to the church database")?;

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed { church } => {
            let church = config.church_or_fallback(church);
            db::seed(&pool, church, Utc::now()).await?;
            println!("Seed data inserted for church {church}.");
        }
        Commands::Import { csv, church } => {
            let church = config.church_or_fallback(church);
            let written = db::import_csv(&pool, church, &csv).await?;
            println!("Imported {written} members from {}.", csv.display());
        }
        Commands::Analytics { scope, out } => {
            let church = config.church_or_fallback(scope.church);
            let as_of = AsOf::new(scope.as_of.unwrap_or_else(Utc::now), tz);
            let source = PgSnapshotSource::new(pool);
            info!(%church, now = %as_of.now, "computing dashboard analytics");

            let analytics = until_interrupted(analytics::compute_dashboard_analytics(
                &source, church, as_of,
            ))
            .await??;
            let json = serde_json::to_string_pretty(&analytics)?;

            match out {
                Some(path) => {
                    std::fs::write(&path, json)?;
                    println!("Analytics written to {}.", path.display());
                }
                None => println!("{json}"),
            }
        }
        Commands::Stats { scope } => {
            let church = config.church_or_fallback(scope.church);
            let as_of = AsOf::new(scope.as_of.unwrap_or_else(Utc::now), tz);
            let source = PgSnapshotSource::new(pool);

            let stats =
                until_interrupted(stats::compute_member_stats(&source, church, as_of)).await??;

            println!("Active members: {}", stats.total);
            for entry in &stats.by_stage {
                println!("- {}: {}", entry.stage.as_str(), entry.count);
            }
            println!(
                "Engagement: high {}, medium {}, low {}, inactive {}",
                stats.engagement.high,
                stats.engagement.medium,
                stats.engagement.low,
                stats.engagement.inactive
            );
            println!("Active in the last week: {}", stats.recent_activity);
        }
        Commands::Report { scope, out } => {
            let church = config.church_or_fallback(scope.church);
            let as_of = AsOf::new(scope.as_of.unwrap_or_else(Utc::now), tz);
            let source = PgSnapshotSource::new(pool);

            let (analytics, stats) = until_interrupted(async {
                tokio::try_join!(
                    analytics::compute_dashboard_analytics(&source, church, as_of),
                    stats::compute_member_stats(&source, church, as_of),
                )
            })
            .await??;

            let report = report::build_report(church, as_of, &analytics, &stats);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

/// Runs `work` unless Ctrl-C arrives first, in which case the in-flight
/// queries are dropped.
async fn until_interrupted<F: Future>(work: F) -> anyhow::Result<F::Output> {
    tokio::select! {
        output = work => Ok(output),
        signal = tokio::signal::ctrl_c() => Err(interrupted(signal)),
    }
}

fn interrupted(signal: std::io::Result<()>) -> anyhow::Error {
    match signal {
        Ok(()) => {
            warn!("interrupted, abandoning in-flight queries");
            anyhow!("interrupted")
        }
        Err(e) => anyhow::Error::new(e).context("failed to listen for Ctrl-C"),
    }
}

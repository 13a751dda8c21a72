use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod api;
mod config;
mod engine;
mod error;
mod identity;
mod import;
mod models;
mod payments;
mod report;
mod service;
mod store;
mod valuation;

use config::{RecordSettings, ServerSettings};
use identity::HttpIdentityProvider;
use service::RecordService;
use store::{MemoryStore, PgStore, RecordStore};

#[derive(Parser)]
#[command(name = "academic-records")]
#[command(about = "Grades, transcripts and attendance with aggregates kept in step", long_about = None)]
struct Cli {
    #[arg(long, env = "DATABASE_URL", global = true, hide_env_values = true)]
    database_url: Option<String>,

    #[arg(long, env = "DB_MAX_CONNECTIONS", default_value_t = 5, global = true)]
    db_max_connections: u32,

    #[command(flatten)]
    records: RecordSettings,

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
    /// Rebuild transcripts and attendance summaries from raw records
    Recompute {
        #[arg(long)]
        student: Option<String>,
    },
    /// Write a markdown transcript for one student
    Report {
        #[arg(long)]
        student: String,
        #[arg(long, default_value = "transcript.md")]
        out: PathBuf,
    },
    /// Run the HTTP API
    Serve(ServerSettings),
}

async fn connect(cli: &Cli) -> anyhow::Result<PgStore> {
    let database_url = cli
        .database_url
        .as_deref()
        .context("DATABASE_URL must be set to a production Postgres instance")?;
    PgStore::connect(database_url, cli.db_max_connections)
        .await
        .context("failed to connect to Postgres")
}

async fn record_service(cli: &Cli, in_memory: bool) -> anyhow::Result<RecordService> {
    let store: Arc<dyn RecordStore> = if in_memory {
        info!("using in-memory record store");
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(connect(cli).await?)
    };
    Ok(RecordService::new(
        store,
        cli.records.scale(),
        cli.records.defaults(),
    ))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
    info!("shutdown requested");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::InitDb => {
            let store = connect(&cli).await?;
            store.migrate().await.context("failed to apply migrations")?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let records = record_service(&cli, false).await?;
            let inserted = import::seed(&records).await?;
            println!("Seed data inserted ({inserted} records).");
        }
        Commands::Import { csv } => {
            let records = record_service(&cli, false).await?;
            let summary = import::import_grades_csv(&records, csv).await?;
            println!("Inserted {} grades from {}.", summary.inserted, csv.display());
            if summary.warnings > 0 {
                println!(
                    "{} transcripts could not be refreshed; run `recompute` to rebuild them.",
                    summary.warnings
                );
            }
        }
        Commands::Recompute { student } => {
            let records = record_service(&cli, false).await?;
            let report = match student.as_deref() {
                Some(student_id) => records.recompute_student(student_id).await?,
                None => records.recompute_all().await?,
            };
            println!(
                "Rebuilt {} transcripts and {} attendance summaries ({} failures).",
                report.transcripts, report.attendance_summaries, report.failures
            );
        }
        Commands::Report { student, out } => {
            let records = record_service(&cli, false).await?;
            let view = records
                .transcript(student)
                .await
                .with_context(|| format!("no transcript available for {student}"))?;
            let summaries = records.attendance_summaries(student).await?;
            let report = report::build_transcript_report(&view, &summaries);
            std::fs::write(out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Transcript written to {}.", out.display());
        }
        Commands::Serve(settings) => {
            let records = record_service(&cli, settings.in_memory).await?;
            let identity = HttpIdentityProvider::new(
                settings.auth_service_url.clone(),
                settings.auth_timeout(),
            )?;
            let app = api::build_router(api::AppState {
                records,
                identity: Arc::new(identity),
            });

            let listener = tokio::net::TcpListener::bind(settings.bind)
                .await
                .with_context(|| format!("failed to bind {}", settings.bind))?;
            info!(addr = %settings.bind, identity = %settings.auth_service_url, "academic records api listening");
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await
                .context("server error")?;
        }
    }

    Ok(())
}

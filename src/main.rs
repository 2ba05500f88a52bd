use std::{
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
};

use cdc_purge::{
    config::{self, PurgeConfig},
    db::DbPool,
    observability,
    parameters::ConfigParameterService,
    purge::{CategoryStatus, PurgeOperation, PurgeReport, PurgeService},
    retention,
};
use chrono::{DateTime, Utc};
use clap::Parser;
use tokio_util::sync::CancellationToken;

/// CLI arguments for cdc-purge
#[derive(Parser, Debug)]
#[command(version, about = "Purge engine for CDC replication tables", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to config file
    #[arg(short, long, global = true, default_value = "cdc-purge.toml")]
    config: PathBuf,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Run the scheduled purge worker until interrupted (default)
    Run,
    /// Purge data_event and data once, then exit
    Incoming {
        /// Purge everything created before this RFC 3339 timestamp instead of
        /// using the configured retention windows
        #[arg(long)]
        before: Option<DateTime<Utc>>,
    },
    /// Purge outgoing_batch and stranded data once, then exit
    Outgoing {
        /// Purge everything created before this RFC 3339 timestamp instead of
        /// using the configured retention windows
        #[arg(long)]
        before: Option<DateTime<Utc>>,
    },
    /// Apply the bundled schema and exit
    ///
    /// Intended for local development and tests. Production schemas are
    /// managed by the replication engine.
    Migrate,
    /// Show enabled compile-time features
    Features,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    match args.command {
        Some(Command::Features) => {
            run_features();
            ExitCode::SUCCESS
        }
        Some(Command::Migrate) => run_migrate(&args.config).await,
        Some(Command::Incoming { before }) => {
            run_once(&args.config, PurgeOperation::Incoming, before).await
        }
        Some(Command::Outgoing { before }) => {
            run_once(&args.config, PurgeOperation::Outgoing, before).await
        }
        Some(Command::Run) | None => run_worker(&args.config).await,
    }
}

/// Load the config file and initialize logging and metrics.
///
/// Errors are printed to stderr since tracing may not be up yet.
fn bootstrap(config_path: &Path) -> Option<PurgeConfig> {
    let config = match PurgeConfig::from_file(config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!(
                "Failed to load config from {}: {}",
                config_path.display(),
                e
            );
            return None;
        }
    };

    if let Err(e) = observability::init_tracing(&config.observability) {
        eprintln!("Failed to initialize tracing: {}", e);
        return None;
    }

    if let Err(e) = observability::metrics::init_metrics(&config.observability.metrics) {
        tracing::error!(error = %e, "Failed to initialize metrics");
        return None;
    }

    tracing::info!(config_file = %config_path.display(), "Configuration loaded");
    Some(config)
}

/// Connect to the configured database, applying the bundled schema when
/// the config asks for it.
async fn connect(config: &config::DatabaseConfig) -> Option<DbPool> {
    if config.is_none() {
        eprintln!("Error: Database is not configured. Nothing to purge.");
        return None;
    }

    let db = match DbPool::from_config(config).await {
        Ok(db) => db,
        Err(e) => {
            tracing::error!(error = %e, "Failed to connect to database");
            eprintln!("Error: Failed to connect to database: {}", e);
            return None;
        }
    };

    if config.run_migrations()
        && let Err(e) = db.run_migrations().await
    {
        tracing::error!(error = %e, "Database migrations failed");
        eprintln!("Error: Database migrations failed: {}", e);
        return None;
    }

    Some(db)
}

fn build_service(config: PurgeConfig, db: &DbPool) -> PurgeService {
    PurgeService::new(
        db.purge(),
        Arc::new(ConfigParameterService::new(config.parameters)),
        db.tables().clone(),
    )
}

async fn run_once(
    config_path: &Path,
    operation: PurgeOperation,
    before: Option<DateTime<Utc>>,
) -> ExitCode {
    let Some(config) = bootstrap(config_path) else {
        return ExitCode::FAILURE;
    };
    let Some(db) = connect(&config.database).await else {
        return ExitCode::FAILURE;
    };
    let service = build_service(config, &db);

    match service.purge(operation, before).await {
        Ok(report) => {
            print_report(&report);
            if report.is_complete() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            eprintln!("Error: purge {} failed: {}", operation, e);
            ExitCode::FAILURE
        }
    }
}

async fn run_worker(config_path: &Path) -> ExitCode {
    let Some(config) = bootstrap(config_path) else {
        return ExitCode::FAILURE;
    };
    if !config.retention.enabled {
        eprintln!("Error: the purge worker is disabled; set retention.enabled = true");
        return ExitCode::FAILURE;
    }
    let Some(db) = connect(&config.database).await else {
        return ExitCode::FAILURE;
    };

    let retention = config.retention.clone();
    let service = build_service(config, &db);
    let shutdown = CancellationToken::new();

    let worker = tokio::spawn(retention::start_purge_worker(
        service,
        retention,
        shutdown.clone(),
    ));

    shutdown_signal().await;
    shutdown.cancel();

    match worker.await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Purge worker panicked");
            ExitCode::FAILURE
        }
    }
}

async fn run_migrate(config_path: &Path) -> ExitCode {
    let Some(config) = bootstrap(config_path) else {
        return ExitCode::FAILURE;
    };

    if config.database.is_none() {
        eprintln!("Error: Database is not configured. Nothing to migrate.");
        return ExitCode::FAILURE;
    }

    match DbPool::from_config(&config.database).await {
        Ok(pool) => match pool.run_migrations().await {
            Ok(()) => {
                tracing::info!("Database migrations completed successfully");
                ExitCode::SUCCESS
            }
            Err(e) => {
                tracing::error!(error = %e, "Database migrations failed");
                eprintln!("Error: Database migrations failed: {}", e);
                ExitCode::FAILURE
            }
        },
        Err(e) => {
            tracing::error!(error = %e, "Failed to connect to database");
            eprintln!("Error: Failed to connect to database: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn print_report(report: &PurgeReport) {
    println!("purge {}", report.operation);
    for outcome in &report.outcomes {
        let status = match &outcome.status {
            CategoryStatus::Completed => format!(
                "deleted {} rows in {} batches",
                outcome.deleted, outcome.batches
            ),
            CategoryStatus::Disabled => "disabled".to_string(),
            CategoryStatus::Empty => "nothing to delete".to_string(),
            CategoryStatus::DryRun { range } => format!(
                "dry run, would scan ids {}..={}",
                range.min_id(),
                range.max_id()
            ),
            CategoryStatus::Skipped(e) => format!("skipped: {}", e),
            CategoryStatus::Failed(e) => {
                format!("failed after {} rows: {}", outcome.deleted, e)
            }
        };
        let cutoff = outcome
            .cutoff
            .map(|c| c.to_rfc3339())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<15} before {:<32} {}",
            outcome.category.as_str(),
            cutoff,
            status
        );
    }
    println!("total deleted: {}", report.total_deleted());
}

fn run_features() {
    let version = env!("CARGO_PKG_VERSION");

    let features: &[(&str, bool)] = &[
        ("database-sqlite", cfg!(feature = "database-sqlite")),
        ("database-postgres", cfg!(feature = "database-postgres")),
        ("prometheus", cfg!(feature = "prometheus")),
    ];

    println!("cdc-purge v{}", version);
    println!();
    for (name, enabled) in features {
        let mark = if *enabled { "+" } else { "-" };
        println!("  {} {}", mark, name);
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, stopping purge worker...");
}

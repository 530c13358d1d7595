mod catalog;
mod comparator;
mod compiler;
mod discovery;
mod engine;
mod evaluator;
mod executor;
mod memory;
mod scheduler;


use anyhow::Context;
use arena_common::config::Configuration;
use arena_common::records;
use arena_common::report;
use arena_common::types::RunSummary;
use scheduler::Scheduler;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true);
    if std::env::var("ARENA_LOG_FORMAT").map(|v| v == "json").unwrap_or(false) {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!("Arena Worker booting...");

    let root = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("ARENA_ROOT").ok())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let config_path = std::env::var("ARENA_CONFIG").ok().map(PathBuf::from);

    let mut config = Configuration::load(&root, config_path.as_deref())
        .map_err(|e| {
            error!("Failed to load configuration: {}", e);
            error!("Run `arena-cli init` to scaffold a competition root");
            e
        })?;

    if let Ok(value) = std::env::var("ARENA_CONCURRENCY") {
        match value.parse::<usize>() {
            Ok(n) if n > 0 => config = config.with_concurrency(n),
            _ => warn!(value = %value, "Ignoring invalid ARENA_CONCURRENCY"),
        }
    }

    config
        .ensure_directories()
        .context("Failed to create competition directories")?;
    info!("Configuration:\n{}", config);

    let submissions = match std::env::var("ARENA_TASK") {
        Ok(task) => {
            info!(task = %task, "Restricting run to one task");
            discovery::discover_for_task(&config, &task)?
        }
        Err(_) => discovery::discover(&config)?,
    };
    if submissions.is_empty() {
        warn!(dir = %config.submissions_dir.display(), "No valid submissions found");
    }

    let config = Arc::new(config);
    let scheduler = Scheduler::from_config(Arc::clone(&config));
    let started_at = chrono::Utc::now();

    // Setup graceful shutdown
    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install CTRL+C signal handler");
            std::future::pending::<()>().await;
        }
        warn!("Received shutdown signal, abandoning run...");
    };

    let records = tokio::select! {
        records = scheduler.run(submissions) => records,
        _ = shutdown => {
            info!("Worker shutdown complete");
            return Ok(());
        }
    };

    let summary = RunSummary::new(started_at, records);
    let records_path = records::store_summary(&config.reports_dir, &summary)?;
    info!(run_id = %summary.run_id, path = %records_path.display(), "Records persisted");

    let generated_at = chrono::Local::now();
    let files = report::write_reports(&config.reports_dir, &summary.records, generated_at)?;
    info!(report = %files.report.display(), "Report written");
    if let Some(leaderboard) = &files.leaderboard {
        info!(leaderboard = %leaderboard.display(), "Leaderboard written");
    }

    println!("{}", report::render_text(&summary.records, generated_at));
    Ok(())
}

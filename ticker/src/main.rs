use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::{self, Duration, MissedTickBehavior};

use tally::config::{Config, ENV_CONFIG};
use tally::models::SweepReport;
use tally::storage::sqlite::SqliteBackend;
use tally::storage::TaskStore;
use tally::sweep::{process_due_recurrences, SweepErrorPolicy};

// ── CLI ─────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "tally-ticker",
    about = "Runs the tally recurrence sweep on an interval"
)]
struct Cli {
    /// Path to TOML config file
    #[arg(short, long, env = ENV_CONFIG)]
    config: Option<PathBuf>,

    /// Run one sweep then exit (for cron)
    #[arg(long)]
    once: bool,

    /// Override the sweep interval from the config, in seconds
    #[arg(long)]
    interval: Option<u64>,
}

// ── Sweep ───────────────────────────────────────────────────────────

async fn run_once(store: &Arc<dyn TaskStore>, policy: SweepErrorPolicy) -> tally::Result<SweepReport> {
    let store = store.clone();
    let now = chrono::Utc::now();
    // sqlite calls block; keep them off the runtime threads
    let report =
        tokio::task::spawn_blocking(move || process_due_recurrences(store.as_ref(), now, policy))
            .await
            .map_err(|e| tally::Error::Storage(format!("sweep task panicked: {e}")))??;

    if report.is_empty() {
        tracing::debug!("nothing due");
    }
    for task in &report.created {
        tracing::info!(task_id = %task.id, title = %task.title, "new instance");
    }
    for failure in &report.failed {
        tracing::warn!(task_id = %failure.task_id, error = %failure.error, "sweep skipped task");
    }
    Ok(report)
}

async fn run_loop(store: Arc<dyn TaskStore>, policy: SweepErrorPolicy, every: Duration) {
    let mut ticker = time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        if let Err(e) = run_once(&store, policy).await {
            tracing::error!(error = %e, "sweep failed");
        }
    }
}

// ── Main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    tally::init_tracing();
    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            std::process::exit(1);
        }
    };

    let db_path = config.database_path();
    let conn = match tally::db::init_db(&db_path.to_string_lossy()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error opening database '{}': {}", db_path.display(), e);
            std::process::exit(1);
        }
    };
    let store: Arc<dyn TaskStore> = Arc::new(SqliteBackend::from_connection(conn));
    let policy = config.sweep.on_error;

    if cli.once {
        if let Err(e) = run_once(&store, policy).await {
            eprintln!("Sweep failed: {}", e);
            std::process::exit(1);
        }
        return;
    }

    let every = cli
        .interval
        .map(|secs| Duration::from_secs(secs.max(1)))
        .unwrap_or_else(|| config.sweep_interval());
    tracing::info!(
        database = %db_path.display(),
        interval_secs = every.as_secs(),
        "starting ticker"
    );

    tokio::select! {
        _ = run_loop(store, policy, every) => {}
        signal = tokio::signal::ctrl_c() => match signal {
            Ok(()) => tracing::info!("shutting down"),
            Err(e) => tracing::error!(error = %e, "signal handler error"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally::models::Task;

    fn store_with_bad_rule() -> Arc<dyn TaskStore> {
        let backend = SqliteBackend::from_connection(tally::db::init_memory().unwrap());
        let task: Task = serde_json::from_str(
            r#"{"id":"bad","title":"Broken","status":"active","created":"2026-03-01",
                "updated":"2026-03-01","recurrence":"FREQ=SOMETIMES","recurrence_trigger":"clock"}"#,
        )
        .unwrap();
        backend.save(&task).unwrap();
        Arc::new(backend)
    }

    #[tokio::test]
    async fn aborted_sweep_is_an_error() {
        let store = store_with_bad_rule();
        let err = run_once(&store, SweepErrorPolicy::Abort).await.unwrap_err();
        assert!(matches!(err, tally::Error::RecurrenceParse { .. }));
    }

    #[tokio::test]
    async fn skipped_failures_are_reported() {
        let store = store_with_bad_rule();
        let report = run_once(&store, SweepErrorPolicy::Skip).await.unwrap();
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].task_id, "bad");
    }
}

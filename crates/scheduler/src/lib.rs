//! Cron job scheduling engine.
//!
//! Jobs are resolved to absolute fire times by [`clock::CronClock`], queued in
//! [`queue::TriggerQueue`] and executed by the dispatch loop in
//! [`engine::SchedulerEngine`]. State changes follow [`state::JobStatus`];
//! every attempt is recorded through a [`store::JobStore`].

pub mod action;
pub mod clock;
pub mod engine;
pub mod error;
pub mod parse;
pub mod queue;
pub mod recorder;
pub mod retry;
pub mod state;
pub mod store;
pub mod store_file;
pub mod store_memory;
pub mod store_sqlite;
pub mod types;

#[cfg(feature = "metrics")]
pub mod metric_names;

pub use error::{Error, Result};

/// Current wall-clock time in epoch milliseconds.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Run database migrations for the scheduler.
///
/// Creates the `jobs` and `job_logs` tables. Call at startup before
/// [`store_sqlite::SqliteStore::with_pool`].
pub async fn run_migrations(pool: &sqlx::SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .set_ignore_missing(true)
        .run(pool)
        .await?;
    Ok(())
}

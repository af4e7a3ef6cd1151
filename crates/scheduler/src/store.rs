//! Persistence trait for job definitions and execution logs.

use async_trait::async_trait;

use crate::{
    Result,
    types::{ExecutionRecord, Job},
};

/// Source of truth for job definitions between restarts, plus the
/// append-only execution log.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert or replace `job`.
    async fn save(&self, job: &Job) -> Result<()>;
    async fn find_by_id(&self, id: &str) -> Result<Option<Job>>;
    async fn find_all(&self) -> Result<Vec<Job>>;
    async fn append_log(&self, record: &ExecutionRecord) -> Result<()>;
    /// Logs for `job_id`, newest first.
    async fn find_logs(&self, job_id: &str) -> Result<Vec<ExecutionRecord>>;
}

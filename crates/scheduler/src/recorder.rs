//! Builds execution-log entries and hands them to the store.

use std::sync::Arc;

use tracing::warn;

use crate::{
    now_ms,
    store::JobStore,
    types::{ExecutionOutcome, ExecutionRecord},
};

pub struct ExecutionRecorder {
    store: Arc<dyn JobStore>,
}

impl ExecutionRecorder {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    pub fn build(
        job_id: &str,
        job_name: &str,
        attempt: u32,
        outcome: ExecutionOutcome,
        message: impl Into<String>,
        duration_ms: u64,
    ) -> ExecutionRecord {
        ExecutionRecord {
            id: uuid::Uuid::new_v4().to_string(),
            job_id: job_id.to_string(),
            job_name: job_name.to_string(),
            timestamp_ms: now_ms(),
            attempt,
            outcome,
            message: message.into(),
            duration_ms,
        }
    }

    /// Append a record. Storage failures are logged and swallowed so that a
    /// flaky log store never stalls dispatch.
    pub async fn record(
        &self,
        job_id: &str,
        job_name: &str,
        attempt: u32,
        outcome: ExecutionOutcome,
        message: impl Into<String>,
        duration_ms: u64,
    ) -> ExecutionRecord {
        let record = Self::build(job_id, job_name, attempt, outcome, message, duration_ms);
        if let Err(e) = self.store.append_log(&record).await {
            warn!(job_id, outcome = %outcome, error = %e, "failed to record execution");
        }
        record
    }

    pub async fn started(&self, job_id: &str, job_name: &str, attempt: u32) -> ExecutionRecord {
        self.record(
            job_id,
            job_name,
            attempt,
            ExecutionOutcome::Running,
            "Started",
            0,
        )
        .await
    }

    pub async fn succeeded(
        &self,
        job_id: &str,
        job_name: &str,
        attempt: u32,
        message: impl Into<String>,
        duration_ms: u64,
    ) -> ExecutionRecord {
        self.record(
            job_id,
            job_name,
            attempt,
            ExecutionOutcome::Success,
            message,
            duration_ms,
        )
        .await
    }

    pub async fn failed(
        &self,
        job_id: &str,
        job_name: &str,
        attempt: u32,
        message: impl Into<String>,
        duration_ms: u64,
    ) -> ExecutionRecord {
        self.record(
            job_id,
            job_name,
            attempt,
            ExecutionOutcome::Failed,
            message,
            duration_ms,
        )
        .await
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, crate::store_memory::InMemoryStore};

    #[tokio::test]
    async fn test_records_reach_store_newest_first() {
        let store = Arc::new(InMemoryStore::new());
        let recorder = ExecutionRecorder::new(store.clone());

        recorder.started("j1", "job", 1).await;
        recorder.failed("j1", "job", 1, "boom", 12).await;
        recorder.succeeded("j1", "job", 2, "fine", 7).await;

        let logs = store.find_logs("j1").await.unwrap();
        assert_eq!(logs.len(), 3);
        assert_eq!(logs[0].outcome, ExecutionOutcome::Success);
        assert_eq!(logs[0].attempt, 2);
        assert_eq!(logs[1].message, "boom");
        assert_eq!(logs[2].outcome, ExecutionOutcome::Running);
    }

    #[tokio::test]
    async fn test_store_failure_is_swallowed() {
        let store = Arc::new(InMemoryStore::new());
        store.fail_writes(true);
        let recorder = ExecutionRecorder::new(store.clone());
        let rec = recorder.failed("j1", "job", 1, "boom", 1).await;
        assert_eq!(rec.outcome, ExecutionOutcome::Failed);
        store.fail_writes(false);
        assert!(store.find_logs("j1").await.unwrap().is_empty());
    }
}

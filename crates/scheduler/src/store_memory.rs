//! In-memory store for tests and ephemeral runs.

use std::{
    collections::HashMap,
    sync::{
        Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;

use crate::{
    Error, Result,
    store::JobStore,
    types::{ExecutionRecord, Job},
};

/// Store backed by `HashMap`s. Nothing survives the process.
pub struct InMemoryStore {
    jobs: Mutex<HashMap<String, Job>>,
    logs: Mutex<HashMap<String, Vec<ExecutionRecord>>>,
    fail_writes: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            logs: Mutex::new(HashMap::new()),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Make every subsequent write fail, to exercise persistence-failure paths.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::message("store unavailable"));
        }
        Ok(())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobStore for InMemoryStore {
    async fn save(&self, job: &Job) -> Result<()> {
        self.check_writable()?;
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Job>> {
        let jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        Ok(jobs.get(id).cloned())
    }

    async fn find_all(&self) -> Result<Vec<Job>> {
        let jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        let mut all: Vec<Job> = jobs.values().cloned().collect();
        all.sort_by(|a, b| a.created_at_ms.cmp(&b.created_at_ms).then_with(|| a.id.cmp(&b.id)));
        Ok(all)
    }

    async fn append_log(&self, record: &ExecutionRecord) -> Result<()> {
        self.check_writable()?;
        let mut logs = self.logs.lock().unwrap_or_else(|e| e.into_inner());
        logs.entry(record.job_id.clone())
            .or_default()
            .push(record.clone());
        Ok(())
    }

    async fn find_logs(&self, job_id: &str) -> Result<Vec<ExecutionRecord>> {
        let logs = self.logs.lock().unwrap_or_else(|e| e.into_inner());
        let mut records = logs.get(job_id).cloned().unwrap_or_default();
        records.reverse();
        Ok(records)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{state::JobStatus, types::ExecutionOutcome},
    };

    fn make_job(id: &str, created_at_ms: u64) -> Job {
        Job {
            id: id.into(),
            name: format!("job-{id}"),
            cron_expression: "0 * * * *".into(),
            description: None,
            action: "print_message".into(),
            payload: "hi".into(),
            status: JobStatus::Scheduled,
            attempt: 0,
            max_attempts: 3,
            next_fire_at_ms: None,
            last_run_at_ms: None,
            created_at_ms,
            updated_at_ms: created_at_ms,
        }
    }

    fn make_record(job_id: &str, n: u64) -> ExecutionRecord {
        ExecutionRecord {
            id: format!("r{n}"),
            job_id: job_id.into(),
            job_name: "job".into(),
            timestamp_ms: n * 1000,
            attempt: 1,
            outcome: ExecutionOutcome::Success,
            message: format!("run {n}"),
            duration_ms: 5,
        }
    }

    #[tokio::test]
    async fn test_save_find_roundtrip() {
        let store = InMemoryStore::new();
        store.save(&make_job("1", 10)).await.unwrap();
        assert_eq!(store.find_by_id("1").await.unwrap().unwrap().name, "job-1");
        assert!(store.find_by_id("2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_upserts() {
        let store = InMemoryStore::new();
        let mut job = make_job("1", 10);
        store.save(&job).await.unwrap();
        job.status = JobStatus::Paused;
        store.save(&job).await.unwrap();
        let all = store.find_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].status, JobStatus::Paused);
    }

    #[tokio::test]
    async fn test_find_all_sorted_by_creation() {
        let store = InMemoryStore::new();
        store.save(&make_job("b", 20)).await.unwrap();
        store.save(&make_job("a", 30)).await.unwrap();
        store.save(&make_job("c", 10)).await.unwrap();
        let ids: Vec<_> = store
            .find_all()
            .await
            .unwrap()
            .into_iter()
            .map(|j| j.id)
            .collect();
        assert_eq!(ids, ["c", "b", "a"]);
    }

    #[tokio::test]
    async fn test_logs_newest_first() {
        let store = InMemoryStore::new();
        for n in 0..4 {
            store.append_log(&make_record("j1", n)).await.unwrap();
        }
        let logs = store.find_logs("j1").await.unwrap();
        assert_eq!(logs.len(), 4);
        assert_eq!(logs[0].message, "run 3");
        assert_eq!(logs[3].message, "run 0");
        assert!(store.find_logs("other").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fail_writes() {
        let store = InMemoryStore::new();
        store.fail_writes(true);
        assert!(store.save(&make_job("1", 1)).await.is_err());
        assert!(store.append_log(&make_record("1", 1)).await.is_err());
        store.fail_writes(false);
        assert!(store.save(&make_job("1", 1)).await.is_ok());
    }
}

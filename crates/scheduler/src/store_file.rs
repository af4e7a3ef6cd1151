//! JSON file-backed job store with atomic writes.

use std::path::{Path, PathBuf};

use {
    async_trait::async_trait,
    tokio::{fs, io::AsyncWriteExt, sync::Mutex},
    tracing::warn,
};

use crate::{
    Result,
    store::JobStore,
    types::{ExecutionRecord, Job},
};

/// File-backed store. Jobs live in a single JSON file, logs as JSONL per job.
pub struct FileStore {
    jobs_path: PathBuf,
    logs_dir: PathBuf,
    /// Serializes read-modify-write cycles on the jobs file.
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(jobs_path: PathBuf, logs_dir: PathBuf) -> Self {
        Self {
            jobs_path,
            logs_dir,
            write_lock: Mutex::new(()),
        }
    }

    /// `<dir>/jobs.json` plus `<dir>/logs/<job_id>.jsonl`.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join("jobs.json"), dir.join("logs"))
    }

    async fn ensure_dirs(&self) -> Result<()> {
        if let Some(parent) = self.jobs_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::create_dir_all(&self.logs_dir).await?;
        Ok(())
    }

    async fn read_jobs(&self) -> Result<Vec<Job>> {
        if !fs::try_exists(&self.jobs_path).await.unwrap_or(false) {
            return Ok(Vec::new());
        }
        let data = fs::read_to_string(&self.jobs_path).await?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Atomic write: write to temp, rename over target, keep `.bak`.
    async fn atomic_write_jobs(&self, jobs: &[Job]) -> Result<()> {
        self.ensure_dirs().await?;
        let json = serde_json::to_string_pretty(jobs)?;
        let tmp = self.jobs_path.with_extension("json.tmp");

        fs::write(&tmp, json.as_bytes()).await?;

        if fs::try_exists(&self.jobs_path).await.unwrap_or(false) {
            let bak = self.jobs_path.with_extension("json.bak");
            if let Err(e) = fs::copy(&self.jobs_path, &bak).await {
                warn!(path = %bak.display(), error = %e, "failed to back up jobs file");
            }
        }

        fs::rename(&tmp, &self.jobs_path).await?;
        Ok(())
    }

    fn logs_path(&self, job_id: &str) -> PathBuf {
        self.logs_dir.join(format!("{job_id}.jsonl"))
    }
}

#[async_trait]
impl JobStore for FileStore {
    async fn save(&self, job: &Job) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut jobs = self.read_jobs().await?;
        match jobs.iter().position(|j| j.id == job.id) {
            Some(pos) => jobs[pos] = job.clone(),
            None => jobs.push(job.clone()),
        }
        self.atomic_write_jobs(&jobs).await
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Job>> {
        Ok(self.read_jobs().await?.into_iter().find(|j| j.id == id))
    }

    async fn find_all(&self) -> Result<Vec<Job>> {
        let mut jobs = self.read_jobs().await?;
        jobs.sort_by(|a, b| a.created_at_ms.cmp(&b.created_at_ms).then_with(|| a.id.cmp(&b.id)));
        Ok(jobs)
    }

    async fn append_log(&self, record: &ExecutionRecord) -> Result<()> {
        self.ensure_dirs().await?;
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.logs_path(&record.job_id))
            .await?
            .write_all(line.as_bytes())
            .await?;
        Ok(())
    }

    async fn find_logs(&self, job_id: &str) -> Result<Vec<ExecutionRecord>> {
        let path = self.logs_path(job_id);
        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(Vec::new());
        }
        let data = fs::read_to_string(&path).await?;
        let mut records: Vec<ExecutionRecord> = data
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| serde_json::from_str(l).ok())
            .collect();
        records.reverse();
        Ok(records)
    }
}

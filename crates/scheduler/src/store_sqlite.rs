//! SQLite-backed job store using sqlx.

use {
    async_trait::async_trait,
    sqlx::{Row, SqlitePool, sqlite::SqlitePoolOptions},
};

use crate::{
    Error, Result,
    store::JobStore,
    types::{ExecutionRecord, Job},
};

/// SQLite-backed persistence for jobs and their execution logs.
///
/// Jobs are stored as JSON documents next to an indexed status column;
/// logs get one row per attempt.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create a store with its own connection pool and run migrations.
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(|e| Error::persistence("failed to connect to SQLite", e))?;

        crate::run_migrations(&pool).await?;

        Ok(Self { pool })
    }

    /// Create a store using an existing pool. Call [`crate::run_migrations`]
    /// first.
    pub fn with_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn record_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<ExecutionRecord> {
    let outcome: String = row.get("outcome");
    Ok(ExecutionRecord {
        id: row.get("id"),
        job_id: row.get("job_id"),
        job_name: row.get("job_name"),
        timestamp_ms: row.get::<i64, _>("timestamp_ms") as u64,
        attempt: row.get::<i64, _>("attempt") as u32,
        outcome: outcome.parse()?,
        message: row.get("message"),
        duration_ms: row.get::<i64, _>("duration_ms") as u64,
    })
}

#[async_trait]
impl JobStore for SqliteStore {
    async fn save(&self, job: &Job) -> Result<()> {
        let data = serde_json::to_string(job)?;
        sqlx::query(
            "INSERT INTO jobs (id, status, data, created_at) VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET status = excluded.status, data = excluded.data",
        )
        .bind(&job.id)
        .bind(job.status.as_str())
        .bind(&data)
        .bind(job.created_at_ms as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Job>> {
        let row = sqlx::query("SELECT data FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let data: String = row.get("data");
                Ok(Some(serde_json::from_str(&data)?))
            },
            None => Ok(None),
        }
    }

    async fn find_all(&self) -> Result<Vec<Job>> {
        let rows = sqlx::query("SELECT data FROM jobs ORDER BY created_at, id")
            .fetch_all(&self.pool)
            .await?;

        let mut jobs = Vec::with_capacity(rows.len());
        for row in rows {
            let data: String = row.get("data");
            jobs.push(serde_json::from_str(&data)?);
        }
        Ok(jobs)
    }

    async fn append_log(&self, record: &ExecutionRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO job_logs (id, job_id, job_name, timestamp_ms, attempt, outcome, message, duration_ms)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(&record.job_id)
        .bind(&record.job_name)
        .bind(record.timestamp_ms as i64)
        .bind(i64::from(record.attempt))
        .bind(record.outcome.as_str())
        .bind(&record.message)
        .bind(record.duration_ms as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_logs(&self, job_id: &str) -> Result<Vec<ExecutionRecord>> {
        let rows = sqlx::query(
            "SELECT id, job_id, job_name, timestamp_ms, attempt, outcome, message, duration_ms
             FROM job_logs
             WHERE job_id = ?
             ORDER BY timestamp_ms DESC, rowid DESC",
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(record_from_row).collect()
    }
}

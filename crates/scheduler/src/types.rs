//! Core data types for the scheduling engine.

use serde::{Deserialize, Serialize};

use crate::state::JobStatus;

/// Default number of attempts per occurrence (initial run plus retries).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// A named, recurring unit of work.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub name: String,
    pub cron_expression: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub action: String,
    #[serde(default)]
    pub payload: String,
    #[serde(default)]
    pub status: JobStatus,
    #[serde(default)]
    pub attempt: u32,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_fire_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_at_ms: Option<u64>,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

/// Why a trigger exists.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerKind {
    /// Next cron occurrence.
    Regular,
    /// Re-attempt of a failed occurrence.
    #[serde(rename_all = "camelCase")]
    Retry { attempt: u32, failed_at_ms: u64 },
}

/// A scheduled firing of a job. Never mutated; a changed schedule produces a
/// new trigger that replaces the old one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Trigger {
    pub job_id: String,
    pub fire_at_ms: u64,
    pub kind: TriggerKind,
}

impl Trigger {
    pub fn regular(job_id: impl Into<String>, fire_at_ms: u64) -> Self {
        Self {
            job_id: job_id.into(),
            fire_at_ms,
            kind: TriggerKind::Regular,
        }
    }

    pub fn retry(job_id: impl Into<String>, fire_at_ms: u64, attempt: u32, failed_at_ms: u64) -> Self {
        Self {
            job_id: job_id.into(),
            fire_at_ms,
            kind: TriggerKind::Retry {
                attempt,
                failed_at_ms,
            },
        }
    }

    /// Attempt number this trigger starts. Regular firings always start at 1.
    pub fn attempt(&self) -> u32 {
        match self.kind {
            TriggerKind::Regular => 1,
            TriggerKind::Retry { attempt, .. } => attempt,
        }
    }

    pub fn is_retry(&self) -> bool {
        matches!(self.kind, TriggerKind::Retry { .. })
    }
}

/// Outcome recorded for one firing attempt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionOutcome {
    Running,
    Success,
    Failed,
}

impl ExecutionOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for ExecutionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ExecutionOutcome {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "RUNNING" => Ok(Self::Running),
            "SUCCESS" => Ok(Self::Success),
            "FAILED" => Ok(Self::Failed),
            other => Err(crate::Error::message(format!(
                "unknown execution outcome: {other}"
            ))),
        }
    }
}

/// Immutable audit entry for one firing attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    pub id: String,
    pub job_id: String,
    pub job_name: String,
    pub timestamp_ms: u64,
    pub attempt: u32,
    pub outcome: ExecutionOutcome,
    pub message: String,
    pub duration_ms: u64,
}

/// Input for submitting a new job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobCreate {
    pub name: String,
    pub cron_expression: String,
    pub action: String,
    #[serde(default)]
    pub payload: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
}

impl JobCreate {
    pub fn new(
        name: impl Into<String>,
        cron_expression: impl Into<String>,
        action: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            cron_expression: cron_expression.into(),
            action: action.into(),
            payload: payload.into(),
            description: None,
            max_attempts: None,
        }
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Patch for rescheduling or editing an existing job.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct JobPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cron_expression: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
}

/// Summary status of the engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStatus {
    pub running: bool,
    pub job_count: usize,
    pub paused_count: usize,
    pub failed_count: usize,
    pub pending_triggers: usize,
    pub in_flight: usize,
    pub next_fire_at_ms: Option<u64>,
}

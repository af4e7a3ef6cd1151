use thiserror::Error;

use crate::state::{JobEvent, JobStatus};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("invalid cron expression '{expression}': {reason}")]
    InvalidCronExpression { expression: String, reason: String },

    #[error("unknown timezone: {timezone}")]
    UnknownTimezone { timezone: String },

    #[error("unknown action: {action}")]
    UnknownAction { action: String },

    #[error("handler failed: {message}")]
    HandlerFailure { message: String },

    #[error("job not found: {job_id}")]
    JobNotFound { job_id: String },

    #[error("cannot apply {event:?} to a job in state {from}")]
    InvalidTransition { from: JobStatus, event: JobEvent },

    #[error("{message}")]
    Message { message: String },

    #[error("{context}: {source}")]
    Persistence {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn invalid_cron(expression: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidCronExpression {
            expression: expression.into(),
            reason: reason.to_string(),
        }
    }

    #[must_use]
    pub fn unknown_timezone(timezone: impl Into<String>) -> Self {
        Self::UnknownTimezone {
            timezone: timezone.into(),
        }
    }

    #[must_use]
    pub fn unknown_action(action: impl Into<String>) -> Self {
        Self::UnknownAction {
            action: action.into(),
        }
    }

    #[must_use]
    pub fn handler_failure(message: impl Into<String>) -> Self {
        Self::HandlerFailure {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn job_not_found(job_id: impl Into<String>) -> Self {
        Self::JobNotFound {
            job_id: job_id.into(),
        }
    }

    #[must_use]
    pub fn persistence(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Persistence {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Whether the error came from the storage layer rather than from
    /// validation or execution.
    #[must_use]
    pub fn is_persistence(&self) -> bool {
        matches!(
            self,
            Self::Persistence { .. } | Self::Io(_) | Self::Json(_) | Self::Sqlx(_) | Self::Migrate(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

//! Job lifecycle states and the transitions between them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Externally visible lifecycle state of a job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Created, not yet scheduled.
    #[default]
    Pending,
    /// Has a pending trigger (regular or retry).
    Scheduled,
    /// Handler currently executing.
    Running,
    /// Trigger suspended by an operator.
    Paused,
    /// Last occurrence exhausted its retries. The regular cadence continues.
    Failed,
    /// Terminal.
    Deleted,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Scheduled => "SCHEDULED",
            Self::Running => "RUNNING",
            Self::Paused => "PAUSED",
            Self::Failed => "FAILED",
            Self::Deleted => "DELETED",
        }
    }

    /// States from which the dispatcher may fire a trigger.
    pub fn is_fireable(self) -> bool {
        matches!(self, Self::Scheduled | Self::Failed)
    }

    /// Apply `event`, returning the resulting state or
    /// [`Error::InvalidTransition`].
    pub fn apply(self, event: JobEvent) -> Result<Self> {
        use {JobEvent as E, JobStatus as S};

        let next = match (self, event) {
            (S::Pending, E::Schedule) => S::Scheduled,
            (S::Scheduled | S::Failed, E::Fire) => S::Running,
            (S::Running, E::Succeed | E::Retry) => S::Scheduled,
            (S::Running, E::Exhaust) => S::Failed,
            (S::Scheduled | S::Failed | S::Running, E::Pause) => S::Paused,
            (S::Paused, E::Resume) => S::Scheduled,
            (from, E::Delete) if from != S::Deleted => S::Deleted,
            (from, event) => return Err(Error::InvalidTransition { from, event }),
        };
        Ok(next)
    }

    pub fn can_apply(self, event: JobEvent) -> bool {
        self.apply(event).is_ok()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "SCHEDULED" => Ok(Self::Scheduled),
            "RUNNING" => Ok(Self::Running),
            "PAUSED" => Ok(Self::Paused),
            "FAILED" => Ok(Self::Failed),
            "DELETED" => Ok(Self::Deleted),
            other => Err(Error::message(format!("unknown job status: {other}"))),
        }
    }
}

/// Something that happens to a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobEvent {
    /// First trigger computed and queued.
    Schedule,
    /// Dispatcher popped a due trigger.
    Fire,
    /// Handler returned successfully.
    Succeed,
    /// Handler failed and a retry trigger was queued.
    Retry,
    /// Handler failed with no attempts left.
    Exhaust,
    Pause,
    Resume,
    Delete,
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[rstest]
    #[case(JobStatus::Pending, JobEvent::Schedule, JobStatus::Scheduled)]
    #[case(JobStatus::Scheduled, JobEvent::Fire, JobStatus::Running)]
    #[case(JobStatus::Failed, JobEvent::Fire, JobStatus::Running)]
    #[case(JobStatus::Running, JobEvent::Succeed, JobStatus::Scheduled)]
    #[case(JobStatus::Running, JobEvent::Retry, JobStatus::Scheduled)]
    #[case(JobStatus::Running, JobEvent::Exhaust, JobStatus::Failed)]
    #[case(JobStatus::Scheduled, JobEvent::Pause, JobStatus::Paused)]
    #[case(JobStatus::Running, JobEvent::Pause, JobStatus::Paused)]
    #[case(JobStatus::Failed, JobEvent::Pause, JobStatus::Paused)]
    #[case(JobStatus::Paused, JobEvent::Resume, JobStatus::Scheduled)]
    #[case(JobStatus::Pending, JobEvent::Delete, JobStatus::Deleted)]
    #[case(JobStatus::Running, JobEvent::Delete, JobStatus::Deleted)]
    #[case(JobStatus::Paused, JobEvent::Delete, JobStatus::Deleted)]
    fn legal_transitions(#[case] from: JobStatus, #[case] event: JobEvent, #[case] to: JobStatus) {
        assert_eq!(from.apply(event).unwrap(), to);
    }

    #[rstest]
    #[case(JobStatus::Pending, JobEvent::Fire)]
    #[case(JobStatus::Pending, JobEvent::Pause)]
    #[case(JobStatus::Scheduled, JobEvent::Schedule)]
    #[case(JobStatus::Scheduled, JobEvent::Resume)]
    #[case(JobStatus::Scheduled, JobEvent::Succeed)]
    #[case(JobStatus::Running, JobEvent::Fire)]
    #[case(JobStatus::Paused, JobEvent::Pause)]
    #[case(JobStatus::Paused, JobEvent::Fire)]
    #[case(JobStatus::Failed, JobEvent::Resume)]
    #[case(JobStatus::Deleted, JobEvent::Delete)]
    #[case(JobStatus::Deleted, JobEvent::Resume)]
    fn illegal_transitions(#[case] from: JobStatus, #[case] event: JobEvent) {
        let err = from.apply(event).unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
    }

    #[test]
    fn deleted_is_terminal() {
        for event in [
            JobEvent::Schedule,
            JobEvent::Fire,
            JobEvent::Succeed,
            JobEvent::Retry,
            JobEvent::Exhaust,
            JobEvent::Pause,
            JobEvent::Resume,
            JobEvent::Delete,
        ] {
            assert!(!JobStatus::Deleted.can_apply(event), "{event:?}");
        }
    }

    #[test]
    fn status_serializes_screaming() {
        let json = serde_json::to_string(&JobStatus::Scheduled).unwrap();
        assert_eq!(json, "\"SCHEDULED\"");
        assert_eq!("paused".parse::<JobStatus>().unwrap(), JobStatus::Paused);
    }
}

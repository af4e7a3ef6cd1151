//! In-memory trigger queue ordered by fire time.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Mutex,
    time::Duration,
};

use crate::types::Trigger;

#[derive(Default)]
struct Inner {
    /// Ordered by fire time, ties broken by job id.
    by_time: BTreeMap<(u64, String), Trigger>,
    /// Job id to the fire time of its single pending trigger.
    by_job: HashMap<String, u64>,
}

impl Inner {
    fn remove(&mut self, job_id: &str) -> Option<Trigger> {
        let fire_at = self.by_job.remove(job_id)?;
        self.by_time.remove(&(fire_at, job_id.to_string()))
    }
}

/// Min-priority queue of pending triggers with at most one trigger per job.
#[derive(Default)]
pub struct TriggerQueue {
    inner: Mutex<Inner>,
}

impl TriggerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `trigger`, atomically replacing any pending trigger for the same
    /// job. Returns the displaced trigger.
    pub fn insert_or_replace(&self, trigger: Trigger) -> Option<Trigger> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let displaced = inner.remove(&trigger.job_id);
        inner
            .by_job
            .insert(trigger.job_id.clone(), trigger.fire_at_ms);
        inner
            .by_time
            .insert((trigger.fire_at_ms, trigger.job_id.clone()), trigger);
        displaced
    }

    /// Remove and return the earliest trigger if it is due at `now_ms`.
    pub fn pop_due(&self, now_ms: u64) -> Option<Trigger> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let (fire_at, _) = inner.by_time.first_key_value().map(|(k, _)| k.clone())?;
        if fire_at > now_ms {
            return None;
        }
        let (_, trigger) = inner.by_time.pop_first()?;
        inner.by_job.remove(&trigger.job_id);
        Some(trigger)
    }

    /// Time until the earliest trigger is due, zero if one is already due,
    /// `None` when the queue is empty.
    pub fn peek_delay(&self, now_ms: u64) -> Option<Duration> {
        self.next_fire_at_ms()
            .map(|at| Duration::from_millis(at.saturating_sub(now_ms)))
    }

    /// Remove the pending trigger for `job_id`, if any. Idempotent.
    pub fn remove(&self, job_id: &str) -> Option<Trigger> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.remove(job_id)
    }

    pub fn get(&self, job_id: &str) -> Option<Trigger> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let fire_at = *inner.by_job.get(job_id)?;
        inner.by_time.get(&(fire_at, job_id.to_string())).cloned()
    }

    pub fn contains(&self, job_id: &str) -> bool {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.by_job.contains_key(job_id)
    }

    pub fn next_fire_at_ms(&self) -> Option<u64> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.by_time.first_key_value().map(|((at, _), _)| *at)
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.by_time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

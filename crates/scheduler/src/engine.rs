//! The scheduler engine: dispatch loop, worker execution and job operations.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex as StdMutex,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use {
    tokio::{
        sync::{Mutex, Notify, RwLock, Semaphore},
        task::{JoinError, JoinHandle},
    },
    tokio_util::{sync::CancellationToken, task::TaskTracker},
    tracing::{debug, error, info, warn},
};

#[cfg(feature = "metrics")]
use {
    crate::metric_names,
    metrics::{counter, gauge, histogram},
};

use crate::{
    Error, Result,
    action::{ActionContext, ActionOutcome, ActionRegistry},
    clock::CronClock,
    now_ms,
    queue::TriggerQueue,
    recorder::ExecutionRecorder,
    retry::RetryPolicy,
    state::{JobEvent, JobStatus},
    store::JobStore,
    types::{ExecutionRecord, Job, JobCreate, JobPatch, SchedulerStatus, Trigger},
};

/// Message recorded for handlers cancelled at the end of a shutdown grace
/// period.
pub const INTERRUPTED_MESSAGE: &str = "interrupted by shutdown";

/// Tunables for [`SchedulerEngine`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub clock: CronClock,
    /// Maximum number of handlers executing at once.
    pub workers: usize,
    pub retry: RetryPolicy,
    /// Execution timeout for actions without their own entry in
    /// `action_timeouts`. `None` means unbounded.
    pub default_timeout: Option<Duration>,
    pub action_timeouts: HashMap<String, Duration>,
    /// Upper bound on how long the dispatch loop sleeps without a wake-up.
    pub idle_poll: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            clock: CronClock::utc(),
            workers: 4,
            retry: RetryPolicy::default(),
            default_timeout: None,
            action_timeouts: HashMap::new(),
            idle_poll: Duration::from_secs(60),
        }
    }
}

impl EngineConfig {
    pub fn timeout_for(&self, action: &str) -> Option<Duration> {
        self.action_timeouts
            .get(&action.trim().to_ascii_lowercase())
            .copied()
            .or(self.default_timeout)
    }
}

struct JobEntry {
    job: Job,
    /// Set while a worker owns the current firing.
    in_flight: bool,
}

type JobSlot = Arc<Mutex<JobEntry>>;

enum Execution {
    Finished(Result<ActionOutcome>),
    Interrupted,
}

/// Owns the trigger queue, the job table and the worker pool.
pub struct SchedulerEngine {
    config: EngineConfig,
    store: Arc<dyn JobStore>,
    registry: Arc<ActionRegistry>,
    recorder: ExecutionRecorder,
    queue: TriggerQueue,
    jobs: RwLock<HashMap<String, JobSlot>>,
    wake: Notify,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    /// Stops the dispatch loop. Replaced on every start.
    stop: StdMutex<CancellationToken>,
    /// Cancels in-flight handlers once the shutdown grace period is over.
    /// Replaced on every start.
    cancel: StdMutex<CancellationToken>,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
    running: AtomicBool,
}

impl SchedulerEngine {
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn JobStore>,
        registry: Arc<ActionRegistry>,
    ) -> Arc<Self> {
        let permits = Arc::new(Semaphore::new(config.workers.max(1)));
        Arc::new(Self {
            recorder: ExecutionRecorder::new(Arc::clone(&store)),
            config,
            store,
            registry,
            queue: TriggerQueue::new(),
            jobs: RwLock::new(HashMap::new()),
            wake: Notify::new(),
            permits,
            tracker: TaskTracker::new(),
            stop: StdMutex::new(CancellationToken::new()),
            cancel: StdMutex::new(CancellationToken::new()),
            loop_handle: Mutex::new(None),
            running: AtomicBool::new(false),
        })
    }

    pub fn registry(&self) -> &Arc<ActionRegistry> {
        &self.registry
    }

    pub fn clock(&self) -> CronClock {
        self.config.clock
    }

    /// Load persisted jobs, rebuild their triggers from now and start the
    /// dispatch loop. An engine that was shut down can be started again.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let loaded = match self.store.find_all().await {
            Ok(loaded) => loaded,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(Error::persistence("failed to load jobs", e));
            },
        };
        let now = now_ms();
        let mut restored = 0usize;
        let mut recovered = Vec::new();
        {
            let mut jobs = self.jobs.write().await;

            // Jobs kept from a previous run; an interrupted shutdown leaves
            // them without a trigger.
            for slot in jobs.values() {
                let mut entry = slot.lock().await;
                let job = &mut entry.job;
                if matches!(job.status, JobStatus::Paused | JobStatus::Deleted)
                    || self.queue.contains(&job.id)
                {
                    continue;
                }
                if job.status != JobStatus::Failed {
                    job.status = JobStatus::Scheduled;
                }
                self.enqueue_next(job, now);
                job.updated_at_ms = now;
                recovered.push(job.clone());
            }

            for mut job in loaded {
                if job.status == JobStatus::Deleted || jobs.contains_key(&job.id) {
                    continue;
                }
                let before = (job.status, job.next_fire_at_ms);
                match job.status {
                    JobStatus::Paused => job.next_fire_at_ms = None,
                    JobStatus::Failed => self.enqueue_next(&mut job, now),
                    // Pending and Running only survive a crash; both resume
                    // their regular cadence.
                    _ => {
                        job.status = JobStatus::Scheduled;
                        self.enqueue_next(&mut job, now);
                    },
                }
                if (job.status, job.next_fire_at_ms) != before {
                    job.updated_at_ms = now;
                    recovered.push(job.clone());
                }
                restored += 1;
                jobs.insert(
                    job.id.clone(),
                    Arc::new(Mutex::new(JobEntry {
                        job,
                        in_flight: false,
                    })),
                );
            }
        }
        info!(count = restored, "loaded jobs");

        for job in &recovered {
            if let Err(e) = self.store.save(job).await {
                warn!(id = %job.id, error = %e, "failed to persist recovered job");
            }
        }
        if !recovered.is_empty() {
            debug!(count = recovered.len(), "persisted recovered jobs");
        }

        let stop = CancellationToken::new();
        *lock_token(&self.stop) = stop.clone();
        *lock_token(&self.cancel) = CancellationToken::new();
        self.tracker.reopen();

        let engine = Arc::clone(self);
        let handle = tokio::spawn(async move {
            engine.dispatch_loop(stop).await;
        });
        *self.loop_handle.lock().await = Some(handle);
        Ok(())
    }

    /// Stop dispatching, wait up to `grace` for in-flight handlers, then
    /// cancel whatever is still running.
    pub async fn shutdown(&self, grace: Duration) {
        lock_token(&self.stop).cancel();
        if let Some(handle) = self.loop_handle.lock().await.take()
            && let Err(e) = handle.await
        {
            warn!(error = %e, "dispatch loop ended abnormally");
        }

        self.tracker.close();
        if tokio::time::timeout(grace, self.tracker.wait()).await.is_err() {
            warn!(
                in_flight = self.tracker.len(),
                "grace period elapsed, cancelling handlers"
            );
            lock_token(&self.cancel).cancel();
            self.tracker.wait().await;
        }
        self.running.store(false, Ordering::SeqCst);
        info!("scheduler stopped");
    }

    /// Create a job and schedule its first occurrence.
    pub async fn submit(&self, create: JobCreate) -> Result<Job> {
        let now = now_ms();
        let next = self
            .config
            .clock
            .next_fire_time(&create.cron_expression, now)?;

        let action = create.action.trim().to_ascii_lowercase();
        if !self.registry.contains(&action) {
            warn!(action = %action, "no handler registered for action");
        }

        let mut job = Job {
            id: uuid::Uuid::new_v4().to_string(),
            name: create.name,
            cron_expression: create.cron_expression.trim().to_string(),
            description: create.description,
            action,
            payload: create.payload,
            status: JobStatus::Pending,
            attempt: 0,
            max_attempts: create
                .max_attempts
                .unwrap_or(self.config.retry.max_attempts)
                .max(1),
            next_fire_at_ms: Some(next),
            last_run_at_ms: None,
            created_at_ms: now,
            updated_at_ms: now,
        };
        job.status = job.status.apply(JobEvent::Schedule)?;

        self.persist(&job).await?;

        self.jobs.write().await.insert(
            job.id.clone(),
            Arc::new(Mutex::new(JobEntry {
                job: job.clone(),
                in_flight: false,
            })),
        );
        self.queue.insert_or_replace(Trigger::regular(&job.id, next));
        self.wake.notify_one();

        #[cfg(feature = "metrics")]
        gauge!(metric_names::JOBS_SCHEDULED).increment(1.0);

        info!(id = %job.id, name = %job.name, cron = %job.cron_expression, next_fire_at_ms = next, "job scheduled");
        Ok(job)
    }

    /// Pause a job. `Ok(false)` when it does not exist or cannot be paused.
    pub async fn pause(&self, id: &str) -> Result<bool> {
        let Some(slot) = self.slot(id).await else {
            return Ok(false);
        };
        let mut entry = slot.lock().await;
        let Ok(status) = entry.job.status.apply(JobEvent::Pause) else {
            return Ok(false);
        };

        let mut updated = entry.job.clone();
        updated.status = status;
        updated.next_fire_at_ms = None;
        updated.updated_at_ms = now_ms();
        self.persist(&updated).await?;

        self.queue.remove(id);
        entry.job = updated;
        drop(entry);
        self.wake.notify_one();
        info!(id, "job paused");
        Ok(true)
    }

    /// Resume a paused job from the next occurrence after now.
    pub async fn resume(&self, id: &str) -> Result<bool> {
        let Some(slot) = self.slot(id).await else {
            return Ok(false);
        };
        let mut entry = slot.lock().await;
        let Ok(status) = entry.job.status.apply(JobEvent::Resume) else {
            return Ok(false);
        };

        let now = now_ms();
        let next = match self
            .config
            .clock
            .next_fire_time(&entry.job.cron_expression, now)
        {
            Ok(next) => next,
            Err(e) => {
                warn!(id, error = %e, "cannot resume job without a valid schedule");
                return Ok(false);
            },
        };

        let mut updated = entry.job.clone();
        updated.status = status;
        updated.next_fire_at_ms = Some(next);
        updated.updated_at_ms = now;
        self.persist(&updated).await?;

        self.queue.insert_or_replace(Trigger::regular(id, next));
        entry.job = updated;
        drop(entry);
        self.wake.notify_one();
        info!(id, next_fire_at_ms = next, "job resumed");
        Ok(true)
    }

    /// Delete a job. The record stays in the store flagged `DELETED`.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let Some(slot) = self.slot(id).await else {
            return Ok(false);
        };
        let mut entry = slot.lock().await;
        let Ok(status) = entry.job.status.apply(JobEvent::Delete) else {
            return Ok(false);
        };

        let mut updated = entry.job.clone();
        updated.status = status;
        updated.next_fire_at_ms = None;
        updated.updated_at_ms = now_ms();
        self.persist(&updated).await?;

        self.queue.remove(id);
        entry.job = updated;
        drop(entry);
        self.jobs.write().await.remove(id);
        self.wake.notify_one();

        #[cfg(feature = "metrics")]
        gauge!(metric_names::JOBS_SCHEDULED).decrement(1.0);

        info!(id, "job deleted");
        Ok(true)
    }

    /// Edit a job. A changed cron expression replaces the pending trigger;
    /// a job that is currently executing picks the new schedule up when it
    /// completes. `Ok(None)` when the job does not exist.
    pub async fn reschedule(&self, id: &str, patch: JobPatch) -> Result<Option<Job>> {
        let Some(slot) = self.slot(id).await else {
            return Ok(None);
        };
        let mut entry = slot.lock().await;
        let now = now_ms();
        let mut updated = entry.job.clone();

        let mut next = None;
        if let Some(cron) = patch.cron_expression {
            let cron = cron.trim().to_string();
            let at = self.config.clock.next_fire_time(&cron, now)?;
            if cron != updated.cron_expression {
                next = Some(at);
            }
            updated.cron_expression = cron;
        }
        if let Some(name) = patch.name {
            updated.name = name;
        }
        if let Some(action) = patch.action {
            updated.action = action.trim().to_ascii_lowercase();
            if !self.registry.contains(&updated.action) {
                warn!(id, action = %updated.action, "no handler registered for action");
            }
        }
        if let Some(payload) = patch.payload {
            updated.payload = payload;
        }
        if let Some(description) = patch.description {
            updated.description = Some(description);
        }
        if let Some(max_attempts) = patch.max_attempts {
            updated.max_attempts = max_attempts.max(1);
        }
        updated.updated_at_ms = now;

        let replace_trigger = next.filter(|_| updated.status.is_fireable() && !entry.in_flight);
        if let Some(at) = replace_trigger {
            updated.next_fire_at_ms = Some(at);
        }
        self.persist(&updated).await?;

        if let Some(at) = replace_trigger {
            self.queue.insert_or_replace(Trigger::regular(id, at));
            self.wake.notify_one();
        }
        entry.job = updated.clone();
        info!(id, cron = %updated.cron_expression, "job updated");
        Ok(Some(updated))
    }

    /// Fire a schedulable job as soon as a worker is free, as if its next
    /// regular occurrence were now.
    pub async fn run_now(&self, id: &str) -> bool {
        let Some(slot) = self.slot(id).await else {
            return false;
        };
        let entry = slot.lock().await;
        if entry.in_flight || !entry.job.status.is_fireable() {
            return false;
        }
        self.queue.insert_or_replace(Trigger::regular(id, now_ms()));
        drop(entry);
        self.wake.notify_one();
        debug!(id, "job queued for immediate run");
        true
    }

    pub async fn get_job(&self, id: &str) -> Option<Job> {
        let slot = self.slot(id).await?;
        let entry = slot.lock().await;
        Some(entry.job.clone())
    }

    /// All live jobs, oldest first.
    pub async fn list_jobs(&self) -> Vec<Job> {
        let slots: Vec<JobSlot> = self.jobs.read().await.values().cloned().collect();
        let mut jobs = Vec::with_capacity(slots.len());
        for slot in slots {
            jobs.push(slot.lock().await.job.clone());
        }
        jobs.sort_by(|a, b| {
            a.created_at_ms
                .cmp(&b.created_at_ms)
                .then_with(|| a.id.cmp(&b.id))
        });
        jobs
    }

    /// Execution history for a job, newest first. Deleted jobs keep their
    /// history.
    pub async fn get_logs(&self, id: &str) -> Result<Vec<ExecutionRecord>> {
        self.store
            .find_logs(id)
            .await
            .map_err(|e| Error::persistence("failed to read execution logs", e))
    }

    pub async fn status(&self) -> SchedulerStatus {
        let jobs = self.list_jobs().await;
        let in_flight = {
            let slots: Vec<JobSlot> = self.jobs.read().await.values().cloned().collect();
            let mut n = 0;
            for slot in slots {
                if slot.lock().await.in_flight {
                    n += 1;
                }
            }
            n
        };

        #[cfg(feature = "metrics")]
        gauge!(metric_names::JOBS_SCHEDULED).set(jobs.len() as f64);

        let stopping = lock_token(&self.stop).is_cancelled();
        SchedulerStatus {
            running: self.running.load(Ordering::SeqCst) && !stopping,
            job_count: jobs.len(),
            paused_count: jobs
                .iter()
                .filter(|j| j.status == JobStatus::Paused)
                .count(),
            failed_count: jobs
                .iter()
                .filter(|j| j.status == JobStatus::Failed)
                .count(),
            pending_triggers: self.queue.len(),
            in_flight,
            next_fire_at_ms: self.queue.next_fire_at_ms(),
        }
    }

    // ── Internal ────────────────────────────────────────────────────────

    async fn slot(&self, id: &str) -> Option<JobSlot> {
        self.jobs.read().await.get(id).cloned()
    }

    async fn persist(&self, job: &Job) -> Result<()> {
        self.store.save(job).await.map_err(|e| {
            error!(id = %job.id, error = %e, "failed to persist job");
            Error::persistence(format!("failed to persist job {}", job.id), e)
        })
    }

    /// Queue the next regular occurrence after `after_ms`. A job whose
    /// schedule yields nothing is left without a trigger.
    fn enqueue_next(&self, job: &mut Job, after_ms: u64) {
        match self
            .config
            .clock
            .next_fire_time(&job.cron_expression, after_ms)
        {
            Ok(at) => {
                self.queue.insert_or_replace(Trigger::regular(&job.id, at));
                job.next_fire_at_ms = Some(at);
            },
            Err(e) => {
                warn!(id = %job.id, error = %e, "job has no next occurrence, leaving it untriggered");
                self.queue.remove(&job.id);
                job.next_fire_at_ms = None;
            },
        }
    }

    async fn dispatch_loop(self: Arc<Self>, stop: CancellationToken) {
        info!(workers = self.config.workers, tz = self.config.clock.timezone_name(), "dispatch loop started");
        loop {
            // Hold a worker permit before popping so triggers stay in the
            // queue, and stay cancellable, while the pool is saturated.
            let permit = tokio::select! {
                permit = Arc::clone(&self.permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                () = stop.cancelled() => break,
            };

            let now = now_ms();
            if let Some(trigger) = self.queue.pop_due(now) {
                #[cfg(feature = "metrics")]
                histogram!(metric_names::DISPATCH_LATENCY_SECONDS)
                    .record(now.saturating_sub(trigger.fire_at_ms) as f64 / 1000.0);

                let engine = Arc::clone(&self);
                self.tracker.spawn(async move {
                    engine.run_trigger(trigger).await;
                    drop(permit);
                });
                continue;
            }
            drop(permit);

            let delay = self
                .queue
                .peek_delay(now)
                .map_or(self.config.idle_poll, |d| d.min(self.config.idle_poll));
            tokio::select! {
                () = tokio::time::sleep(delay) => {},
                () = self.wake.notified() => debug!("dispatch loop woken"),
                () = stop.cancelled() => break,
            }
        }
        info!("dispatch loop stopped");
    }

    async fn run_trigger(&self, trigger: Trigger) {
        let Some(slot) = self.slot(&trigger.job_id).await else {
            debug!(id = %trigger.job_id, "discarding trigger for removed job");
            return;
        };

        let attempt = trigger.attempt();
        let job = {
            let mut entry = slot.lock().await;
            if entry.in_flight {
                debug!(id = %trigger.job_id, "discarding trigger, job already executing");
                return;
            }
            let status = match entry.job.status.apply(JobEvent::Fire) {
                Ok(status) => status,
                Err(_) => {
                    debug!(id = %trigger.job_id, status = %entry.job.status, "discarding trigger for unschedulable job");
                    return;
                },
            };
            let now = now_ms();
            entry.in_flight = true;
            entry.job.status = status;
            entry.job.attempt = attempt;
            entry.job.last_run_at_ms = Some(now);
            entry.job.next_fire_at_ms = self.queue.get(&trigger.job_id).map(|t| t.fire_at_ms);
            entry.job.updated_at_ms = now;
            entry.job.clone()
        };

        info!(id = %job.id, name = %job.name, action = %job.action, attempt, "executing job");
        self.recorder.started(&job.id, &job.name, attempt).await;

        #[cfg(feature = "metrics")]
        counter!(metric_names::EXECUTIONS_TOTAL).increment(1);

        let started = Instant::now();
        let execution = self.execute(&job, attempt).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        #[cfg(feature = "metrics")]
        histogram!(metric_names::EXECUTION_DURATION_SECONDS).record(duration_ms as f64 / 1000.0);

        self.complete(&slot, attempt, execution, duration_ms).await;
    }

    /// Run the handler on its own task so panics surface as failures, bounded
    /// by the action's timeout and by shutdown cancellation.
    async fn execute(&self, job: &Job, attempt: u32) -> Execution {
        let ctx = ActionContext {
            job_id: job.id.clone(),
            job_name: job.name.clone(),
            attempt,
            payload: job.payload.clone(),
        };
        let registry = Arc::clone(&self.registry);
        let action = job.action.clone();
        let mut handle = tokio::spawn(async move { registry.dispatch(&action, &ctx).await });
        let abort = handle.abort_handle();
        let timeout = self.config.timeout_for(&job.action);
        let cancel = lock_token(&self.cancel).clone();

        let run = async move {
            match timeout {
                Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
                    Ok(joined) => flatten_join(joined),
                    Err(_) => {
                        handle.abort();
                        Err(Error::handler_failure(format!(
                            "timed out after {}ms",
                            limit.as_millis()
                        )))
                    },
                },
                None => flatten_join(handle.await),
            }
        };

        tokio::select! {
            result = run => Execution::Finished(result),
            () = cancel.cancelled() => {
                abort.abort();
                Execution::Interrupted
            },
        }
    }

    async fn complete(&self, slot: &JobSlot, attempt: u32, execution: Execution, duration_ms: u64) {
        let now = now_ms();
        let mut entry = slot.lock().await;
        entry.in_flight = false;
        let id = entry.job.id.clone();
        let name = entry.job.name.clone();
        let was_running = entry.job.status == JobStatus::Running;

        match execution {
            Execution::Interrupted => {
                warn!(id = %id, attempt, "job interrupted by shutdown");
                self.recorder
                    .failed(&id, &name, attempt, INTERRUPTED_MESSAGE, duration_ms)
                    .await;
                if was_running {
                    entry.job.status = JobStatus::Failed;
                    entry.job.next_fire_at_ms = None;
                }
            },
            Execution::Finished(Ok(outcome)) => {
                info!(id = %id, attempt, duration_ms, "job succeeded");
                self.recorder
                    .succeeded(&id, &name, attempt, outcome.message, duration_ms)
                    .await;
                if let Some(payload) = outcome.payload {
                    entry.job.payload = payload;
                }
                if was_running {
                    self.transition(&mut entry.job, JobEvent::Succeed);
                    self.enqueue_next(&mut entry.job, now);
                }
            },
            Execution::Finished(Err(e)) => {
                let message = failure_message(e);
                error!(id = %id, attempt, error = %message, "job failed");
                #[cfg(feature = "metrics")]
                counter!(metric_names::EXECUTION_ERRORS_TOTAL).increment(1);

                self.recorder
                    .failed(&id, &name, attempt, message, duration_ms)
                    .await;
                if was_running {
                    let max_attempts = entry.job.max_attempts;
                    if self.config.retry.should_retry(attempt, max_attempts) {
                        let delay = self.config.retry.backoff(attempt);
                        let at = now.saturating_add(delay.as_millis() as u64);
                        self.queue
                            .insert_or_replace(Trigger::retry(&id, at, attempt + 1, now));
                        self.transition(&mut entry.job, JobEvent::Retry);
                        entry.job.next_fire_at_ms = Some(at);
                        info!(id = %id, next_attempt = attempt + 1, delay_ms = delay.as_millis() as u64, "retry scheduled");
                        #[cfg(feature = "metrics")]
                        counter!(metric_names::RETRIES_SCHEDULED_TOTAL).increment(1);
                    } else {
                        warn!(id = %id, attempt, max_attempts, "retries exhausted");
                        self.transition(&mut entry.job, JobEvent::Exhaust);
                        self.enqueue_next(&mut entry.job, now);
                    }
                }
            },
        }

        // Paused, resumed or deleted while executing: no transition above.
        // A job left schedulable without a trigger gets its next occurrence.
        if !was_running {
            if entry.job.status.is_fireable() && !self.queue.contains(&id) {
                self.enqueue_next(&mut entry.job, now);
            }
            debug!(id = %id, status = %entry.job.status, "job changed while executing");
        }

        entry.job.updated_at_ms = now;
        if entry.job.status != JobStatus::Deleted
            && let Err(e) = self.store.save(&entry.job).await
        {
            warn!(id = %id, error = %e, "failed to persist job after execution");
        }
        drop(entry);
        self.wake.notify_one();
    }

    fn transition(&self, job: &mut Job, event: JobEvent) {
        match job.status.apply(event) {
            Ok(status) => job.status = status,
            Err(e) => warn!(id = %job.id, error = %e, "ignoring invalid transition"),
        }
    }
}

fn lock_token(token: &StdMutex<CancellationToken>) -> std::sync::MutexGuard<'_, CancellationToken> {
    token.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn flatten_join(joined: std::result::Result<Result<ActionOutcome>, JoinError>) -> Result<ActionOutcome> {
    match joined {
        Ok(result) => result,
        Err(e) if e.is_panic() => {
            let payload = e.into_panic();
            let detail = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(Error::handler_failure(format!("handler panicked: {detail}")))
        },
        Err(e) => Err(Error::handler_failure(format!("handler task failed: {e}"))),
    }
}

fn failure_message(e: Error) -> String {
    match e {
        Error::HandlerFailure { message } => message,
        other => other.to_string(),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{action::handler_fn, store_memory::InMemoryStore},
    };

    const YEARLY: &str = "0 0 0 1 1 ? 2099";

    fn make_engine(store: Arc<InMemoryStore>) -> Arc<SchedulerEngine> {
        let registry = Arc::new(ActionRegistry::new());
        registry.register(
            "print_message",
            handler_fn(|ctx| async move { Ok::<_, anyhow::Error>(ActionOutcome::ok(ctx.payload)) }),
        );
        SchedulerEngine::new(EngineConfig::default(), store, registry)
    }

    #[tokio::test]
    async fn test_submit_schedules_and_persists() {
        let store = Arc::new(InMemoryStore::new());
        let engine = make_engine(Arc::clone(&store));
        let job = engine
            .submit(JobCreate::new("hello", "0 0 * * *", "PRINT_MESSAGE", "hi"))
            .await
            .unwrap();

        assert_eq!(job.status, JobStatus::Scheduled);
        assert_eq!(job.action, "print_message");
        assert_eq!(job.max_attempts, 3);
        assert!(job.next_fire_at_ms.unwrap() > job.created_at_ms);
        assert_eq!(engine.queue.get(&job.id).unwrap().fire_at_ms, job.next_fire_at_ms.unwrap());
        assert_eq!(store.find_by_id(&job.id).await.unwrap().unwrap(), job);
    }

    #[tokio::test]
    async fn test_submit_invalid_cron_touches_nothing() {
        let store = Arc::new(InMemoryStore::new());
        let engine = make_engine(Arc::clone(&store));
        let err = engine
            .submit(JobCreate::new("bad", "invalid", "print_message", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidCronExpression { .. }));
        assert!(engine.list_jobs().await.is_empty());
        assert!(engine.queue.is_empty());
        assert!(store.find_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_submit_persistence_failure_leaves_memory_untouched() {
        let store = Arc::new(InMemoryStore::new());
        let engine = make_engine(Arc::clone(&store));
        store.fail_writes(true);
        let err = engine
            .submit(JobCreate::new("x", "0 0 * * *", "print_message", ""))
            .await
            .unwrap_err();
        assert!(err.is_persistence());
        assert!(engine.list_jobs().await.is_empty());
        assert!(engine.queue.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_action_accepted() {
        let engine = make_engine(Arc::new(InMemoryStore::new()));
        let job = engine
            .submit(JobCreate::new("x", "0 0 * * *", "teleport", ""))
            .await
            .unwrap();
        assert_eq!(job.status, JobStatus::Scheduled);
    }

    #[tokio::test]
    async fn test_pause_persistence_failure_keeps_state() {
        let store = Arc::new(InMemoryStore::new());
        let engine = make_engine(Arc::clone(&store));
        let job = engine
            .submit(JobCreate::new("x", "0 0 * * *", "print_message", ""))
            .await
            .unwrap();
        store.fail_writes(true);
        assert!(engine.pause(&job.id).await.is_err());
        assert_eq!(engine.get_job(&job.id).await.unwrap().status, JobStatus::Scheduled);
        assert!(engine.queue.contains(&job.id));
    }

    #[tokio::test]
    async fn test_pause_resume_delete_flags() {
        let engine = make_engine(Arc::new(InMemoryStore::new()));
        let job = engine
            .submit(JobCreate::new("x", "0 0 * * *", "print_message", ""))
            .await
            .unwrap();

        assert!(!engine.resume(&job.id).await.unwrap());
        assert!(engine.pause(&job.id).await.unwrap());
        assert!(!engine.pause(&job.id).await.unwrap());
        assert!(!engine.queue.contains(&job.id));
        assert!(engine.resume(&job.id).await.unwrap());
        assert!(engine.queue.contains(&job.id));
        assert!(engine.delete(&job.id).await.unwrap());
        assert!(!engine.delete(&job.id).await.unwrap());
        assert!(!engine.pause("missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_reschedule_replaces_trigger() {
        let engine = make_engine(Arc::new(InMemoryStore::new()));
        let job = engine
            .submit(JobCreate::new("x", YEARLY, "print_message", ""))
            .await
            .unwrap();
        let before = engine.queue.get(&job.id).unwrap().fire_at_ms;

        let updated = engine
            .reschedule(&job.id, JobPatch {
                cron_expression: Some("0 0 * * *".into()),
                payload: Some("new".into()),
                ..Default::default()
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.payload, "new");
        let after = engine.queue.get(&job.id).unwrap().fire_at_ms;
        assert!(after < before);
        assert_eq!(updated.next_fire_at_ms, Some(after));
        assert_eq!(engine.queue.len(), 1);
    }

    #[tokio::test]
    async fn test_reschedule_invalid_cron_keeps_job() {
        let engine = make_engine(Arc::new(InMemoryStore::new()));
        let job = engine
            .submit(JobCreate::new("x", "0 0 * * *", "print_message", ""))
            .await
            .unwrap();
        let err = engine
            .reschedule(&job.id, JobPatch {
                cron_expression: Some("nope".into()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidCronExpression { .. }));
        assert_eq!(engine.get_job(&job.id).await.unwrap(), job);
        assert!(engine.reschedule("missing", JobPatch::default()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reschedule_paused_keeps_untriggered() {
        let engine = make_engine(Arc::new(InMemoryStore::new()));
        let job = engine
            .submit(JobCreate::new("x", "0 0 * * *", "print_message", ""))
            .await
            .unwrap();
        engine.pause(&job.id).await.unwrap();
        let updated = engine
            .reschedule(&job.id, JobPatch {
                cron_expression: Some("*/5 * * * *".into()),
                ..Default::default()
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.status, JobStatus::Paused);
        assert!(!engine.queue.contains(&job.id));
    }

    #[tokio::test]
    async fn test_start_restores_jobs() {
        let store = Arc::new(InMemoryStore::new());
        let now = now_ms();
        let base = Job {
            id: String::new(),
            name: "restored".into(),
            cron_expression: "0 0 * * *".into(),
            description: None,
            action: "print_message".into(),
            payload: String::new(),
            status: JobStatus::Scheduled,
            attempt: 0,
            max_attempts: 3,
            next_fire_at_ms: None,
            last_run_at_ms: None,
            created_at_ms: now,
            updated_at_ms: now,
        };
        for (id, status, cron) in [
            ("a", JobStatus::Scheduled, "0 0 * * *"),
            ("b", JobStatus::Paused, "0 0 * * *"),
            ("c", JobStatus::Deleted, "0 0 * * *"),
            ("d", JobStatus::Running, "0 0 * * *"),
            ("e", JobStatus::Failed, "not valid"),
        ] {
            let mut job = base.clone();
            job.id = id.into();
            job.status = status;
            job.cron_expression = cron.into();
            store.save(&job).await.unwrap();
        }

        let engine = make_engine(Arc::clone(&store));
        engine.start().await.unwrap();

        let ids: Vec<_> = engine.list_jobs().await.into_iter().map(|j| j.id).collect();
        assert_eq!(ids, ["a", "b", "d", "e"]);
        assert!(engine.queue.contains("a"));
        assert!(!engine.queue.contains("b"));
        assert!(engine.queue.contains("d"));
        assert!(!engine.queue.contains("e"));
        assert_eq!(engine.get_job("d").await.unwrap().status, JobStatus::Scheduled);
        assert_eq!(engine.get_job("b").await.unwrap().status, JobStatus::Paused);
        assert!(engine.status().await.running);

        // Recovery is written back, not just applied in memory.
        let stored = store.find_by_id("d").await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Scheduled);
        assert_eq!(stored.next_fire_at_ms, engine.queue.get("d").map(|t| t.fire_at_ms));
        assert!(stored.next_fire_at_ms.is_some());
        let stored = store.find_by_id("a").await.unwrap().unwrap();
        assert!(stored.next_fire_at_ms.is_some());
        let stored = store.find_by_id("e").await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(stored.next_fire_at_ms, None);

        engine.shutdown(Duration::from_millis(100)).await;
        assert!(!engine.status().await.running);
    }

    #[test]
    fn test_timeout_lookup() {
        let mut config = EngineConfig {
            default_timeout: Some(Duration::from_secs(5)),
            ..Default::default()
        };
        config
            .action_timeouts
            .insert("call_api".into(), Duration::from_secs(1));
        assert_eq!(config.timeout_for("CALL_API"), Some(Duration::from_secs(1)));
        assert_eq!(config.timeout_for("print_message"), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_failure_message_unwraps_handler_failure() {
        assert_eq!(failure_message(Error::handler_failure("boom")), "boom");
        assert_eq!(
            failure_message(Error::unknown_action("x")),
            "unknown action: x"
        );
    }
}

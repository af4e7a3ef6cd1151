//! Metric names emitted when the `metrics` feature is enabled.

pub const EXECUTIONS_TOTAL: &str = "cadence_executions_total";
pub const EXECUTION_ERRORS_TOTAL: &str = "cadence_execution_errors_total";
pub const RETRIES_SCHEDULED_TOTAL: &str = "cadence_retries_scheduled_total";
pub const EXECUTION_DURATION_SECONDS: &str = "cadence_execution_duration_seconds";
/// Delay between a trigger's fire time and the moment it was dispatched.
pub const DISPATCH_LATENCY_SECONDS: &str = "cadence_dispatch_latency_seconds";
pub const JOBS_SCHEDULED: &str = "cadence_jobs_scheduled";

//! Configuration loading, validation and env substitution.
//!
//! Config files: `cadence.toml`, `cadence.yaml`, `cadence.yml` or
//! `cadence.json`, searched in `./` then the user config directory.
//!
//! Supports `${ENV_VAR}` substitution in all string values.

pub mod env_subst;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    loader::{config_dir, data_dir, discover_and_load, load_config, load_or_discover},
    schema::{
        ActionsConfig, CadenceConfig, RetryConfig, SchedulerConfig, StorageBackend, StorageConfig,
        TimeoutsConfig,
    },
    validate::{Diagnostic, Severity, ValidationResult},
};

//! Built-in action handlers.
//!
//! Each handler is registered under a lowercase action id. Handlers are
//! safe to run more than once for the same occurrence.

pub mod countdown;
pub mod file;
pub mod http;
pub mod message;

use std::sync::Arc;

use {
    cadence_config::ActionsConfig,
    cadence_scheduler::action::ActionRegistry,
};

pub const PRINT_MESSAGE: &str = "print_message";
pub const COUNTDOWN: &str = "countdown";
pub const CALL_API: &str = "call_api";
pub const WRITE_FILE: &str = "write_file";
pub const INSERT_LOG: &str = "insert_log";
pub const SEND_EMAIL: &str = "send_email";

/// Built-in action ids in console menu order.
pub const BUILTIN_ACTIONS: &[&str] = &[
    PRINT_MESSAGE,
    COUNTDOWN,
    CALL_API,
    WRITE_FILE,
    INSERT_LOG,
    SEND_EMAIL,
];

/// Register every built-in handler on `registry`.
pub fn register_builtin(registry: &ActionRegistry, config: &ActionsConfig) -> anyhow::Result<()> {
    registry.register(PRINT_MESSAGE, Arc::new(message::PrintMessage));
    registry.register(COUNTDOWN, Arc::new(countdown::Countdown));
    registry.register(CALL_API, Arc::new(http::CallApi::from_config(config)?));
    registry.register(WRITE_FILE, Arc::new(file::WriteFile::from_config(config)));
    registry.register(INSERT_LOG, Arc::new(message::InsertLog));
    registry.register(SEND_EMAIL, Arc::new(message::SendEmail));
    Ok(())
}

//! Action handlers and the registry that maps action ids to them.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use async_trait::async_trait;

use crate::{Error, Result};

/// What a handler sees when its job fires.
#[derive(Debug, Clone)]
pub struct ActionContext {
    pub job_id: String,
    pub job_name: String,
    pub attempt: u32,
    pub payload: String,
}

/// Result reported by a handler that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOutcome {
    /// `false` is treated the same as a returned error.
    pub ok: bool,
    pub message: String,
    /// Replacement payload for subsequent firings (e.g. a countdown tick).
    pub payload: Option<String>,
}

impl ActionOutcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
            payload: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
            payload: None,
        }
    }

    #[must_use]
    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }
}

/// A pluggable unit of work. Implementations must be safe to re-invoke:
/// retries and restarts can run the same occurrence more than once.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn execute(&self, ctx: &ActionContext) -> anyhow::Result<ActionOutcome>;
}

/// Adapter so plain async closures can be registered as handlers.
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F, Fut> ActionHandler for FnHandler<F>
where
    F: Fn(ActionContext) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<ActionOutcome>> + Send,
{
    async fn execute(&self, ctx: &ActionContext) -> anyhow::Result<ActionOutcome> {
        (self.0)(ctx.clone()).await
    }
}

/// Wrap an async closure as a shareable handler.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn ActionHandler>
where
    F: Fn(ActionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<ActionOutcome>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// Maps action ids (case-insensitive) to handlers.
#[derive(Default)]
pub struct ActionRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn ActionHandler>>>,
}

fn normalize(action: &str) -> String {
    action.trim().to_ascii_lowercase()
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `action`, replacing any previous handler.
    pub fn register(&self, action: &str, handler: Arc<dyn ActionHandler>) {
        let mut handlers = self.handlers.write().unwrap_or_else(|e| e.into_inner());
        handlers.insert(normalize(action), handler);
    }

    pub fn contains(&self, action: &str) -> bool {
        let handlers = self.handlers.read().unwrap_or_else(|e| e.into_inner());
        handlers.contains_key(&normalize(action))
    }

    pub fn get(&self, action: &str) -> Option<Arc<dyn ActionHandler>> {
        let handlers = self.handlers.read().unwrap_or_else(|e| e.into_inner());
        handlers.get(&normalize(action)).cloned()
    }

    pub fn action_ids(&self) -> Vec<String> {
        let handlers = self.handlers.read().unwrap_or_else(|e| e.into_inner());
        let mut ids: Vec<String> = handlers.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Run the handler registered for `action`.
    ///
    /// Fails with [`Error::UnknownAction`] when nothing is registered and with
    /// [`Error::HandlerFailure`] when the handler errors or reports `ok: false`.
    pub async fn dispatch(&self, action: &str, ctx: &ActionContext) -> Result<ActionOutcome> {
        let handler = self
            .get(action)
            .ok_or_else(|| Error::unknown_action(action))?;
        match handler.execute(ctx).await {
            Ok(outcome) if outcome.ok => Ok(outcome),
            Ok(outcome) => Err(Error::handler_failure(outcome.message)),
            Err(e) => Err(Error::handler_failure(format!("{e:#}"))),
        }
    }
}

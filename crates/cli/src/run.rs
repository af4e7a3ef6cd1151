//! `cadence run`: wire config, store, handlers and engine together.

use std::{net::SocketAddr, path::Path, sync::Arc};

use {
    anyhow::{Context, Result},
    cadence_config::{CadenceConfig, Severity, StorageBackend, validate},
    cadence_scheduler::{
        action::ActionRegistry,
        clock::CronClock,
        engine::{EngineConfig, SchedulerEngine},
        parse::parse_duration,
        retry::RetryPolicy,
        store::JobStore,
        store_file::FileStore,
        store_memory::InMemoryStore,
        store_sqlite::SqliteStore,
    },
    clap::Args,
    tokio::io::BufReader,
    tokio_util::sync::CancellationToken,
    tracing::{error, info, warn},
};

use crate::{api, console::Console};

#[derive(Args)]
pub struct RunArgs {
    /// How long to wait for running jobs on shutdown, e.g. `10s` or `500ms`.
    #[arg(long)]
    grace: Option<String>,
    /// Run without the interactive console until interrupted.
    #[arg(long, default_value_t = false)]
    no_console: bool,
    /// Serve the HTTP job API on this address, e.g. `127.0.0.1:8080`.
    #[arg(long, env = "CADENCE_BIND")]
    bind: Option<SocketAddr>,
}

pub async fn run(
    args: RunArgs,
    config_path: Option<&Path>,
    data_dir_override: Option<&Path>,
) -> Result<()> {
    let (config, loaded_from) = cadence_config::load_or_discover(config_path)?;
    if let Some(path) = &loaded_from {
        info!(path = %path.display(), "loaded config");
    }

    let diagnostics = validate::validate(&config);
    for d in &diagnostics {
        match d.severity {
            Severity::Error => error!(path = %d.path, "{}", d.message),
            Severity::Warning => warn!(path = %d.path, "{}", d.message),
            Severity::Info => info!(path = %d.path, "{}", d.message),
        }
    }
    if diagnostics.iter().any(|d| d.severity == Severity::Error) {
        anyhow::bail!("invalid configuration; run `cadence config check` for details");
    }

    let grace = match args.grace.as_deref() {
        Some(raw) => parse_duration(raw).context("invalid --grace")?,
        None => config.scheduler.shutdown_grace(),
    };

    let data_dir = data_dir_override.map_or_else(cadence_config::data_dir, Path::to_path_buf);
    let store = open_store(&config, &data_dir).await?;

    let registry = Arc::new(ActionRegistry::new());
    cadence_actions::register_builtin(&registry, &config.actions)?;

    let listener = match args.bind {
        Some(addr) => Some(api::bind(addr).await?),
        None => None,
    };

    let engine = SchedulerEngine::new(engine_config(&config)?, store, registry);
    engine.start().await?;

    let api_stop = CancellationToken::new();
    let api_server = listener.map(|listener| {
        tokio::spawn(api::serve(listener, Arc::clone(&engine), api_stop.clone()))
    });

    if args.no_console {
        tokio::signal::ctrl_c().await?;
        info!("interrupt received");
    } else {
        let console = Console::new(Arc::clone(&engine));
        let stdin = BufReader::new(tokio::io::stdin());
        tokio::select! {
            res = console.run(stdin, tokio::io::stdout()) => res?,
            res = tokio::signal::ctrl_c() => {
                res?;
                info!("interrupt received");
            },
        }
    }

    api_stop.cancel();
    if let Some(server) = api_server {
        match server.await {
            Ok(Err(e)) => error!(error = %e, "http api failed"),
            Err(e) => warn!(error = %e, "http api task ended abnormally"),
            Ok(Ok(())) => {},
        }
    }

    engine.shutdown(grace).await;
    Ok(())
}

fn engine_config(config: &CadenceConfig) -> Result<EngineConfig> {
    let clock = match config.scheduler.timezone.as_deref() {
        Some(name) => CronClock::from_timezone_name(name)?,
        None => CronClock::utc(),
    };
    Ok(EngineConfig {
        clock,
        workers: config.scheduler.workers,
        retry: RetryPolicy::new(
            config.retry.base_backoff(),
            config.retry.max_backoff(),
            config.retry.max_attempts,
        ),
        default_timeout: config.timeouts.default_timeout(),
        action_timeouts: config.timeouts.action_timeouts(),
        idle_poll: config.scheduler.idle_poll(),
    })
}

async fn open_store(config: &CadenceConfig, data_dir: &Path) -> Result<Arc<dyn JobStore>> {
    let path = config.storage.resolve_path(data_dir);
    let store: Arc<dyn JobStore> = match config.storage.backend {
        StorageBackend::Sqlite => {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            let url = format!("sqlite://{}?mode=rwc", path.display());
            Arc::new(
                SqliteStore::new(&url)
                    .await
                    .with_context(|| format!("failed to open {}", path.display()))?,
            )
        },
        StorageBackend::File => Arc::new(FileStore::in_dir(&path)),
        StorageBackend::Memory => Arc::new(InMemoryStore::new()),
    };
    info!(backend = %config.storage.backend, path = %path.display(), "storage ready");
    Ok(store)
}

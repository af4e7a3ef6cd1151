//! HTTP job API served next to the console by `cadence run --bind`.

use std::{net::SocketAddr, sync::Arc};

use {
    anyhow::Context,
    axum::{
        Json, Router,
        extract::{Path, State},
        http::StatusCode,
        response::{IntoResponse, Response},
        routing::{delete, get, post},
    },
    cadence_scheduler::{engine::SchedulerEngine, types::JobCreate},
    tokio::net::TcpListener,
    tokio_util::sync::CancellationToken,
    tracing::{info, warn},
};

type ApiState = Arc<SchedulerEngine>;

pub fn router(engine: Arc<SchedulerEngine>) -> Router {
    Router::new()
        .route("/jobs/schedule", post(schedule_handler))
        .route("/jobs/list", get(list_handler))
        .route("/jobs/pause/{id}", post(pause_handler))
        .route("/jobs/resume/{id}", post(resume_handler))
        .route("/jobs/delete/{id}", delete(delete_handler))
        .route("/jobs/logs/{id}", get(logs_handler))
        .with_state(engine)
}

pub async fn bind(addr: SocketAddr) -> anyhow::Result<TcpListener> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(addr = %listener.local_addr()?, "http api listening");
    Ok(listener)
}

/// Serve the API on `listener` until `shutdown` is cancelled.
pub async fn serve(
    listener: TcpListener,
    engine: Arc<SchedulerEngine>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    axum::serve(listener, router(engine))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    info!("http api stopped");
    Ok(())
}

async fn schedule_handler(State(engine): State<ApiState>, Json(create): Json<JobCreate>) -> Response {
    let name = create.name.clone();
    match engine.submit(create).await {
        Ok(_) => (StatusCode::OK, format!("Job scheduled: {name}")).into_response(),
        Err(e) if e.is_persistence() => scheduler_error(e),
        Err(e) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    }
}

async fn list_handler(State(engine): State<ApiState>) -> Response {
    Json(engine.list_jobs().await).into_response()
}

async fn pause_handler(State(engine): State<ApiState>, Path(id): Path<String>) -> Response {
    job_op_response(engine.pause(&id).await, format!("Paused job {id}"), "pause")
}

async fn resume_handler(State(engine): State<ApiState>, Path(id): Path<String>) -> Response {
    job_op_response(engine.resume(&id).await, format!("Resumed job {id}"), "resume")
}

async fn delete_handler(State(engine): State<ApiState>, Path(id): Path<String>) -> Response {
    job_op_response(engine.delete(&id).await, format!("Deleted job {id}"), "delete")
}

async fn logs_handler(State(engine): State<ApiState>, Path(id): Path<String>) -> Response {
    match engine.get_logs(&id).await {
        Ok(logs) => Json(logs).into_response(),
        Err(e) => scheduler_error(e),
    }
}

fn job_op_response(result: cadence_scheduler::Result<bool>, done: String, verb: &str) -> Response {
    match result {
        Ok(true) => (StatusCode::OK, done).into_response(),
        Ok(false) => (
            StatusCode::BAD_REQUEST,
            format!("Job not found or cannot {verb}"),
        )
            .into_response(),
        Err(e) => scheduler_error(e),
    }
}

fn scheduler_error(e: cadence_scheduler::Error) -> Response {
    warn!(error = %e, "api request failed");
    (StatusCode::INTERNAL_SERVER_ERROR, format!("Scheduler error: {e}")).into_response()
}

//! HTTP receiver for deployment events.
//!
//! `POST /webhook` queues any JSON body on the scheduler; `GET /health`
//! reports liveness and the number of queued events. Authentication is left
//! to whatever sits in front of this listener.

use crate::scheduler::Scheduler;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

/// Build the router. Exposed separately from [`serve`] for tests.
pub fn build_router(scheduler: Arc<Scheduler>) -> Router {
    Router::new()
        .route("/webhook", post(receive_event))
        .route("/health", get(health))
        .with_state(scheduler)
}

/// POST /webhook
async fn receive_event(
    State(scheduler): State<Arc<Scheduler>>,
    Json(payload): Json<Value>,
) -> (StatusCode, Json<Value>) {
    scheduler.receive(payload);
    (StatusCode::ACCEPTED, Json(json!({ "queued": true })))
}

/// GET /health
async fn health(State(scheduler): State<Arc<Scheduler>>) -> Json<Value> {
    Json(json!({ "status": "ok", "pending": scheduler.pending_len() }))
}

/// Serve the event receiver until `shutdown` resolves.
pub async fn serve(
    scheduler: Arc<Scheduler>,
    bind: &str,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("Event receiver listening on http://{}", listener.local_addr()?);

    axum::serve(listener, build_router(scheduler))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

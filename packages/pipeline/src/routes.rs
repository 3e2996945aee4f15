//! HTTP control surface for the scheduler.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::scheduler::{Scheduler, SchedulerStatus};

/// Response of the control endpoints: whether the call changed anything,
/// plus the resulting status.
#[derive(Debug, Serialize)]
pub struct ControlResponse {
    pub changed: bool,
    pub status: SchedulerStatus,
}

pub fn router(scheduler: Scheduler) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/start", post(start))
        .route("/stop", post(stop))
        .route("/run", post(run))
        .with_state(scheduler)
        .layer(TraceLayer::new_for_http())
}

async fn health() -> &'static str {
    "OK"
}

async fn status(State(scheduler): State<Scheduler>) -> Json<SchedulerStatus> {
    Json(scheduler.status())
}

async fn start(State(scheduler): State<Scheduler>) -> Json<ControlResponse> {
    let changed = scheduler.start();
    Json(ControlResponse {
        changed,
        status: scheduler.status(),
    })
}

async fn stop(State(scheduler): State<Scheduler>) -> Json<ControlResponse> {
    let changed = scheduler.stop();
    Json(ControlResponse {
        changed,
        status: scheduler.status(),
    })
}

async fn run(State(scheduler): State<Scheduler>) -> (StatusCode, Json<ControlResponse>) {
    let changed = scheduler.trigger_now();
    let code = if changed {
        StatusCode::ACCEPTED
    } else {
        StatusCode::CONFLICT
    };
    (
        code,
        Json(ControlResponse {
            changed,
            status: scheduler.status(),
        }),
    )
}

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;

/// Flipped by the leader-election loop (§5); read by `/healthz` so an
/// external probe or the rollout UI can tell which replica is active
/// without querying the `Lease` object directly.
pub type LeaderStatus = Arc<AtomicBool>;

#[derive(Serialize)]
struct HealthReport {
    leader: bool,
}

pub async fn readiness_probe() -> impl IntoResponse {
    StatusCode::NO_CONTENT
}

pub async fn liveness_probe() -> impl IntoResponse {
    StatusCode::NO_CONTENT
}

async fn healthz(State(leader_status): State<LeaderStatus>) -> impl IntoResponse {
    Json(HealthReport {
        leader: leader_status.load(Ordering::SeqCst),
    })
}

pub fn create_app() -> Router {
    Router::new()
        .route("/health/live", get(liveness_probe))
        .route("/health/ready", get(readiness_probe))
}

/// Same routes as `create_app`, plus `/healthz` reporting current
/// leadership (§6: the health server exposes leader status for operators).
pub fn create_app_with_leader_status(leader_status: LeaderStatus) -> Router {
    create_app().route("/healthz", get(healthz)).with_state(leader_status)
}

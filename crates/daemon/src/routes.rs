//! The Skill RPC surface (spec.md §6): `POST /skill/request`, `POST
//! /heartbeat`, `GET /health`. Shape follows the pack's
//! `Router::new().route(...).with_state(state)` convention.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use corvus_types::{HeartbeatAction, SkillRequest, SkillResponse};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/skill/request", post(skill_request_handler))
        .route("/heartbeat", post(heartbeat_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

async fn skill_request_handler(
    State(state): State<AppState>,
    Json(request): Json<SkillRequest>,
) -> Json<SkillResponse> {
    Json(state.skills.dispatch(request).await)
}

#[derive(Debug, Deserialize)]
struct HeartbeatRequest {
    user_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
struct HeartbeatResponse {
    actions: Vec<HeartbeatAction>,
}

async fn heartbeat_handler(
    State(state): State<AppState>,
    Json(body): Json<HeartbeatRequest>,
) -> Json<HeartbeatResponse> {
    let actions = state.skills.trigger_heartbeat(&body.user_ids).await;
    Json(HeartbeatResponse { actions })
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    skills: Vec<String>,
    uptime_secs: u64,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        skills: state.skills.names().into_iter().map(String::from).collect(),
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}

//! Thin HTTP front end over the mission store.
//!
//! Accepts mission submissions and serves mission state for polling.
//! Execution itself stays in-process behind the scheduler; the server
//! never blocks a request on a running mission.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::error::{HelmsmanError, Result};
use crate::mission::{Mission, MissionDag, MissionStore, RiskLevel, StateTransition};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<MissionStore>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/missions", post(create_mission).get(list_missions))
        .route("/missions/{id}", get(get_mission))
        .route("/missions/{id}/history", get(get_history))
        .with_state(state)
}

pub async fn serve(state: AppState, bind: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(bind = %bind, "HTTP server listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

#[derive(Debug)]
struct ApiError(HelmsmanError);

impl From<HelmsmanError> for ApiError {
    fn from(err: HelmsmanError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            HelmsmanError::MissionNotFound(_) => StatusCode::NOT_FOUND,
            HelmsmanError::CyclicDag(_) | HelmsmanError::UnknownDependency { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateMissionRequest {
    pub title: String,
    pub goal: String,
    #[serde(default)]
    pub risk_level: RiskLevel,
    /// Optional pre-planned execution graph. Validated before the mission
    /// is accepted; a cyclic graph rejects the whole submission.
    #[serde(default)]
    pub dag: Option<MissionDag>,
}

#[derive(Debug, Serialize)]
pub struct CreateMissionResponse {
    pub id: String,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct MissionSummary {
    pub id: String,
    pub title: String,
    pub status: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn create_mission(
    State(state): State<AppState>,
    Json(req): Json<CreateMissionRequest>,
) -> std::result::Result<(StatusCode, Json<CreateMissionResponse>), ApiError> {
    let id = state.store.next_id();

    let mut mission = Mission::new(&id, req.title, req.goal).with_risk_level(req.risk_level);
    if let Some(dag) = req.dag {
        dag.validate()?;
        mission = mission.with_dag(dag);
    }

    state.store.save(&mission).await?;
    info!(mission_id = %id, "Mission accepted");

    Ok((
        StatusCode::CREATED,
        Json(CreateMissionResponse {
            id,
            status: mission.status.to_string(),
        }),
    ))
}

async fn list_missions(
    State(state): State<AppState>,
) -> std::result::Result<Json<Vec<MissionSummary>>, ApiError> {
    let missions = state.store.list().await?;
    let summaries = missions
        .into_iter()
        .map(|m| MissionSummary {
            id: m.id,
            title: m.title,
            status: m.status.to_string(),
            created_at: m.created_at,
        })
        .collect();
    Ok(Json(summaries))
}

async fn get_mission(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> std::result::Result<Json<Mission>, ApiError> {
    let mission = state.store.load(&id).await?;
    Ok(Json(mission))
}

/// Transition history for polling clients; grows monotonically while the
/// mission runs, so clients can diff against their last seen length.
async fn get_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> std::result::Result<Json<Vec<StateTransition>>, ApiError> {
    let mission = state.store.load(&id).await?;
    Ok(Json(mission.history))
}

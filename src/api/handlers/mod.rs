use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::error::MissionError;
use crate::missions::MissionService;
use crate::models::*;
use crate::store::StoreMetrics;

// ============================================================
// Error Handling
// ============================================================

/// Map a mission error to a status code. Caller errors are returned as-is;
/// internal errors are logged and the client only sees a generic message.
fn api_error(e: MissionError) -> (StatusCode, String) {
    let status = match &e {
        MissionError::NotFound(_) => StatusCode::NOT_FOUND,
        MissionError::AlreadyExists(_)
        | MissionError::NotInProgress { .. }
        | MissionError::InvalidTransition { .. }
        | MissionError::MaxAttemptsExceeded { .. } => StatusCode::CONFLICT,
        MissionError::InvalidCriteria(_)
        | MissionError::InvalidInput(_)
        | MissionError::InvalidAttemptCount { .. } => StatusCode::BAD_REQUEST,
        MissionError::Persistence(_)
        | MissionError::Serialization(_)
        | MissionError::CorruptedState(_) => {
            tracing::error!("Internal error: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            );
        }
    };

    tracing::warn!("Request rejected: {}", e);
    (status, e.to_string())
}

// ============================================================
// Health
// ============================================================

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

// ============================================================
// Missions
// ============================================================

#[derive(Debug, Deserialize)]
pub struct ListMissionsQuery {
    pub state: Option<String>,
}

pub async fn list_missions(
    State(service): State<MissionService>,
    Query(query): Query<ListMissionsQuery>,
) -> Result<Json<Vec<MissionSummary>>, (StatusCode, String)> {
    let state = match query.state.as_deref() {
        Some(s) => Some(MissionState::from_str(s).ok_or((
            StatusCode::BAD_REQUEST,
            format!("Invalid state '{}'", s),
        ))?),
        None => None,
    };
    Ok(Json(service.list_missions(state)))
}

pub async fn define_mission(
    State(service): State<MissionService>,
    Json(input): Json<DefineMissionInput>,
) -> Result<(StatusCode, Json<Mission>), (StatusCode, String)> {
    service
        .define_mission(input)
        .map(|m| (StatusCode::CREATED, Json(m)))
        .map_err(api_error)
}

pub async fn get_mission_status(
    State(service): State<MissionService>,
    Path(id): Path<String>,
) -> Result<Json<MissionStatus>, (StatusCode, String)> {
    service.get_status(&id).map(Json).map_err(api_error)
}

pub async fn delete_mission(
    State(service): State<MissionService>,
    Path(id): Path<String>,
) -> Result<StatusCode, (StatusCode, String)> {
    service
        .delete_mission(&id)
        .map(|_| StatusCode::NO_CONTENT)
        .map_err(api_error)
}

pub async fn activate_mission(
    State(service): State<MissionService>,
    Path(id): Path<String>,
) -> Result<Json<Mission>, (StatusCode, String)> {
    service.activate_mission(&id).map(Json).map_err(api_error)
}

pub async fn submit_attempt(
    State(service): State<MissionService>,
    Path(id): Path<String>,
    Json(input): Json<SubmitAttemptInput>,
) -> Result<Json<SubmitOutcome>, (StatusCode, String)> {
    service.submit_attempt(&id, input).map(Json).map_err(api_error)
}

pub async fn abort_mission(
    State(service): State<MissionService>,
    Path(id): Path<String>,
    input: Option<Json<AbortMissionInput>>,
) -> Result<Json<AbortConfirmation>, (StatusCode, String)> {
    let reason = input.and_then(|Json(input)| input.reason);
    service
        .abort_mission(&id, reason)
        .map(Json)
        .map_err(api_error)
}

// ============================================================
// Checkpoints
// ============================================================

pub async fn list_checkpoints(
    State(service): State<MissionService>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Checkpoint>>, (StatusCode, String)> {
    service.list_checkpoints(&id).map(Json).map_err(api_error)
}

pub async fn save_checkpoint(
    State(service): State<MissionService>,
    Path(id): Path<String>,
    Json(input): Json<CreateCheckpointInput>,
) -> Result<(StatusCode, Json<Checkpoint>), (StatusCode, String)> {
    service
        .save_checkpoint(&id, input.data)
        .map(|c| (StatusCode::CREATED, Json(c)))
        .map_err(api_error)
}

// ============================================================
// Store
// ============================================================

pub async fn store_metrics(State(service): State<MissionService>) -> Json<StoreMetrics> {
    Json(service.store().metrics())
}

pub async fn flush_store(
    State(service): State<MissionService>,
) -> Result<Json<StoreMetrics>, (StatusCode, String)> {
    service.store().flush().await.map_err(api_error)?;
    Ok(Json(service.store().metrics()))
}

#[derive(Debug, Serialize)]
pub struct SweepResponse {
    pub removed: Vec<String>,
}

pub async fn sweep_store(State(service): State<MissionService>) -> Json<SweepResponse> {
    Json(SweepResponse {
        removed: service.sweep_expired(),
    })
}

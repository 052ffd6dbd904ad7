// HTTP handlers and shared JSON error payloads.

use crate::interface_adapters::protocol::{
    SaveScoreRequest, SaveScoreResponse, ScoreEntryDto, SnapshotDto,
};
use crate::interface_adapters::state::AppState;
use crate::use_cases::MatchError;
use crate::use_cases::leaderboard::LeaderboardError;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, serde::Serialize)]
pub struct ErrorResponse {
    // Stable machine-readable code, matching WebSocket error codes.
    pub code: String,
    pub error: String,
}

type HttpError = (StatusCode, Json<ErrorResponse>);

pub fn map_match_error(err: MatchError) -> HttpError {
    let status = match err {
        MatchError::NotFound(_) => StatusCode::NOT_FOUND,
        MatchError::AlreadyStarted | MatchError::InvalidState | MatchError::AlreadyExists => {
            StatusCode::CONFLICT
        }
        MatchError::InvalidIntent { .. } => StatusCode::BAD_REQUEST,
    };
    (
        status,
        Json(ErrorResponse {
            code: err.code().to_string(),
            error: err.to_string(),
        }),
    )
}

fn map_leaderboard_error(err: LeaderboardError) -> HttpError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            code: "storage_failure".to_string(),
            error: err.to_string(),
        }),
    )
}

// GET /api/leaderboard
pub async fn leaderboard(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ScoreEntryDto>>, HttpError> {
    let top = state
        .leaderboard()
        .top()
        .await
        .map_err(map_leaderboard_error)?;
    Ok(Json(top.into_iter().map(ScoreEntryDto::from).collect()))
}

// POST /api/scores
pub async fn save_score(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SaveScoreRequest>,
) -> Result<Json<SaveScoreResponse>, HttpError> {
    let entry = state
        .leaderboard()
        .record(
            payload.name.as_deref(),
            payload.score,
            payload.game_mode.as_deref(),
        )
        .await
        .map_err(map_leaderboard_error)?;
    info!(name = %entry.name, score = entry.score, game_mode = %entry.game_mode, "score saved");
    Ok(Json(SaveScoreResponse { success: true }))
}

// GET /matches/{match_id}
pub async fn match_snapshot(
    State(state): State<Arc<AppState>>,
    Path(match_id): Path<String>,
) -> Result<Json<SnapshotDto>, HttpError> {
    let snapshot = state
        .registry
        .snapshot(&match_id)
        .await
        .map_err(map_match_error)?;
    Ok(Json(SnapshotDto::from(snapshot.as_ref())))
}

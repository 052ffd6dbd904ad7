use crate::interface_adapters::http::{leaderboard, match_snapshot, save_score};
use crate::interface_adapters::net::ws_handler;
use crate::interface_adapters::state::AppState;
use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;

pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/api/leaderboard", get(leaderboard))
        .route("/api/scores", post(save_score))
        .route("/matches/{match_id}", get(match_snapshot))
        .with_state(state)
}

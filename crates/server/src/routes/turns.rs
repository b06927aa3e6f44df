//! `GET /api/turns/:id` — fetch a single turn with its metrics and code
//! changes (spec §6.2 "get turn").

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use sessionlens_core::types::{CodeChange, Turn, TurnMetrics};

use crate::error::StoreError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetTurnResponse {
    pub turn: Turn,
    pub metrics: TurnMetrics,
    pub code_changes: Vec<CodeChange>,
}

pub async fn get_turn(
    State(state): State<Arc<AppState>>,
    Path(turn_id): Path<String>,
) -> Result<Json<GetTurnResponse>, StoreError> {
    let (turn, metrics) = state.store.get_turn(&turn_id)?;
    let code_changes = turn.code_changes.clone();
    Ok(Json(GetTurnResponse {
        turn,
        metrics,
        code_changes,
    }))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/turns/{id}", get(get_turn))
}

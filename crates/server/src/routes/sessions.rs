//! REST read surface over the store (spec §6.2): list/get sessions, list
//! turns, session metrics, and the cross-session aggregate summary.
//! Grounded in the teacher's `routes/sessions.rs`/`routes/projects.rs`
//! handler shape (`State<Arc<AppState>>` + `Query`/`Path` extractors).

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sessionlens_core::types::{CostTotals, EfficiencyComponents, SessionMetrics, TokenTotals, TurnMetrics};

use crate::error::StoreError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListSessionsQuery {
    pub limit: Option<usize>,
    #[serde(default)]
    pub active_only: bool,
    pub project_path: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub total_turns: u32,
    pub total_tokens: u64,
    pub total_cost: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionListItem {
    pub id: String,
    pub project_name: String,
    pub branch: Option<String>,
    pub started_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub is_active: bool,
    pub summary: SessionSummary,
}

/// `GET /api/sessions`.
pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ListSessionsQuery>,
) -> Json<Vec<SessionListItem>> {
    let now = Utc::now();
    let mut sessions = if q.active_only {
        state.store.get_active_sessions(now)
    } else {
        state.store.get_all_sessions()
    };

    if let Some(substr) = &q.project_path {
        sessions.retain(|s| s.project_path.contains(substr.as_str()));
    }
    sessions.sort_by(|a, b| b.last_activity_at.cmp(&a.last_activity_at));
    if let Some(limit) = q.limit {
        sessions.truncate(limit);
    }

    let items = sessions
        .into_iter()
        .map(|s| {
            let metrics = state.store.get_session_metrics(&s.id).ok();
            let summary = match metrics {
                Some(m) => SessionSummary {
                    total_turns: s.turn_count,
                    total_tokens: m.tokens.total,
                    total_cost: m.cost.total,
                },
                None => SessionSummary {
                    total_turns: s.turn_count,
                    total_tokens: 0,
                    total_cost: 0.0,
                },
            };
            SessionListItem {
                is_active: s.is_active_at(now, state.config.active_window_secs),
                id: s.id,
                project_name: s.project_name,
                branch: s.branch,
                started_at: s.started_at,
                last_activity_at: s.last_activity_at,
                summary,
            }
        })
        .collect();

    Json(items)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetSessionResponse {
    pub session: sessionlens_core::types::Session,
    pub metrics: Option<SessionMetrics>,
    pub turn_count: u32,
}

/// `GET /api/sessions/:id`.
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<GetSessionResponse>, StoreError> {
    let session = state.store.get_session(&id)?;
    let metrics = state.store.get_session_metrics(&id).ok();
    Ok(Json(GetSessionResponse {
        turn_count: session.turn_count,
        session,
        metrics,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ListTurnsQuery {
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "default_turns_limit")]
    pub limit: usize,
}

fn default_turns_limit() -> usize {
    50
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListTurnsResponse {
    pub turns: Vec<sessionlens_core::types::Turn>,
    pub has_more: bool,
}

/// `GET /api/sessions/:id/turns`.
pub async fn list_turns(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(q): Query<ListTurnsQuery>,
) -> Json<ListTurnsResponse> {
    let (turns, has_more) = state.store.get_session_turns(&id, q.offset, q.limit.max(1));
    Json(ListTurnsResponse { turns, has_more })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetricsResponse {
    pub session_metrics: SessionMetrics,
    pub turn_metrics: Vec<TurnMetrics>,
    pub efficiency: EfficiencyComponents,
}

/// `GET /api/sessions/:id/metrics`.
pub async fn get_session_metrics(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionMetricsResponse>, StoreError> {
    let session_metrics = state.store.get_session_metrics(&id)?;
    let turn_metrics = state.store.get_session_turn_metrics(&id);
    let efficiency = session_metrics.efficiency;
    Ok(Json(SessionMetricsResponse {
        session_metrics,
        turn_metrics,
        efficiency,
    }))
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateSummary {
    pub total_sessions: usize,
    pub active_sessions: usize,
    pub total_turns: u64,
    pub total_tokens: TokenTotals,
    pub total_cost: CostTotals,
}

/// `GET /api/summary` — totals across all sessions (spec §6.2).
pub async fn aggregate_summary(State(state): State<Arc<AppState>>) -> Json<AggregateSummary> {
    let now = Utc::now();
    let sessions = state.store.get_all_sessions();
    let mut summary = AggregateSummary {
        total_sessions: sessions.len(),
        active_sessions: sessions
            .iter()
            .filter(|s| s.is_active_at(now, state.config.active_window_secs))
            .count(),
        ..Default::default()
    };
    for s in &sessions {
        summary.total_turns += s.turn_count as u64;
        if let Ok(m) = state.store.get_session_metrics(&s.id) {
            summary.total_tokens.add(&m.tokens);
            summary.total_cost.add(&m.cost);
        }
    }
    Json(summary)
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/sessions", get(list_sessions))
        .route("/sessions/{id}", get(get_session))
        .route("/sessions/{id}/turns", get(list_turns))
        .route("/sessions/{id}/metrics", get(get_session_metrics))
        .route("/summary", get(aggregate_summary))
}

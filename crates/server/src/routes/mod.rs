//! HTTP route handlers (spec §6.2/§6.3).

pub mod health;
pub mod live;
pub mod metrics;
pub mod sessions;
pub mod turns;

use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

/// Combined app router: REST API under `/api`, SSE stream at `/live`,
/// liveness at `/healthz`, Prometheus scrape at `/metrics`.
pub fn app_router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(health::router())
        .merge(metrics::router())
        .merge(live::router())
        .nest("/api", sessions::router().merge(turns::router()))
        .with_state(state)
}

// crates/server/src/main.rs
//! sessionlens server binary: watches a directory of session log files,
//! reconstructs sessions/turns/metrics incrementally, and serves the result
//! as a REST snapshot API plus a server-push SSE stream.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use sessionlens_core::watcher;
use sessionlens_server::{config::Config, routes, state::AppState, Orchestrator, PushBroadcaster, Store};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    sessionlens_server::metrics_exporter::init_metrics();

    let config = Config::parse();
    let root = config.root_dir();
    tracing::info!(root = %root.display(), bind = %config.bind, "starting sessionlens");

    let bus = Arc::new(sessionlens_server::EventBus::new(
        config.max_listeners,
        config.subscriber_queue_capacity,
    ));
    let store = Arc::new(Store::new(
        Arc::clone(&bus),
        config.active_window_secs,
        sessionlens_core::metrics::EfficiencyConfig::default(),
    ));
    let push = Arc::new(PushBroadcaster::new(
        Arc::clone(&store),
        Arc::clone(&bus),
        Duration::from_secs(config.heartbeat_secs),
        config.subscriber_queue_capacity,
    ));

    let (tx, rx) = mpsc::channel(1024);
    let _watcher = watcher::start_watcher(
        root,
        config.extension.clone(),
        Duration::from_millis(config.debounce_ms),
        tx,
    )?;

    let orchestrator = Orchestrator::new(
        Arc::clone(&store),
        config.file_cache_capacity,
        config.session_cache_capacity,
    );
    tokio::spawn(orchestrator.run(rx));

    let app_state = AppState::new(config.clone(), Arc::clone(&store), Arc::clone(&bus), push);
    let app = routes::app_router(app_state);

    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    tracing::info!(addr = %config.bind, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutting down");
        })
        .await?;

    Ok(())
}

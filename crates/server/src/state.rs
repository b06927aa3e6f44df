//! Shared application state for the Axum server, grounded in the teacher's
//! `state.rs::AppState` (same role: one struct handed to every route handler
//! via `with_state`).

use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::events::EventBus;
use crate::push::PushBroadcaster;
use crate::store::Store;

pub struct AppState {
    pub start_time: Instant,
    pub store: Arc<Store>,
    pub bus: Arc<EventBus>,
    pub push: Arc<PushBroadcaster>,
    pub config: Config,
}

impl AppState {
    pub fn new(config: Config, store: Arc<Store>, bus: Arc<EventBus>, push: Arc<PushBroadcaster>) -> Arc<Self> {
        Arc::new(Self {
            start_time: Instant::now(),
            store,
            bus,
            push,
            config,
        })
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

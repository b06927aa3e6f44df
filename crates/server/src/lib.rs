//! `sessionlens-server` — store, processing orchestrator, event bus, push
//! broadcaster and HTTP/SSE surface for the sessionlens observability
//! backend. The binary (`src/main.rs`) wires these together; this library
//! surface lets tests and the binary share the same types.

pub mod config;
pub mod error;
pub mod events;
pub mod metrics_exporter;
pub mod orchestrator;
pub mod push;
pub mod routes;
pub mod state;
pub mod store;

pub use config::Config;
pub use events::{DomainEvent, EventBus};
pub use orchestrator::Orchestrator;
pub use push::PushBroadcaster;
pub use state::AppState;
pub use store::Store;

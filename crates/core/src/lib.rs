pub mod aggregator;
pub mod decoder;
pub mod error;
pub mod metrics;
pub mod pricing;
pub mod reader;
pub mod types;
pub mod watcher;

pub use aggregator::{aggregate_turns, ToolRegistry};
pub use decoder::decode_line;
pub use error::{DecodeError, ReaderError, WatcherError};
pub use metrics::{session_metrics, turn_metrics, EfficiencyConfig};
pub use pricing::PricingTable;
pub use reader::IncrementalReader;
pub use watcher::{start_watcher, EventKind, FileEvent};

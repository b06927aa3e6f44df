//! C8 — processing orchestrator. Glues C4 (directory watcher, upstream of
//! this module) through C3 → C2 → C5 → C6 into C7, per spec §4.8.
//!
//! Runs as a single task consuming file events off one channel, one at a
//! time. Spec §5 allows either a per-sessionId lock or "a single-writer
//! goroutine serving a bounded queue" for the per-session serialisation
//! guarantee; a single consumer loop gets both the per-path and the
//! per-session ordering guarantees for free, so that's what this is.

use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::path::PathBuf;

use lru::LruCache;
use sessionlens_core::aggregator::{self, ToolRegistry};
use sessionlens_core::decoder;
use sessionlens_core::metrics::{self, EfficiencyConfig};
use sessionlens_core::pricing::PricingTable;
use sessionlens_core::reader::IncrementalReader;
use sessionlens_core::types::RawEntry;
use sessionlens_core::watcher::{EventKind, FileEvent};
use tracing::{debug, warn};

use crate::metrics_exporter;
use crate::store::{SessionUpsert, Store};

pub struct Orchestrator {
    reader: IncrementalReader,
    file_entries: LruCache<PathBuf, Vec<RawEntry>>,
    session_entries: LruCache<String, Vec<RawEntry>>,
    session_files: HashMap<String, HashSet<PathBuf>>,
    registry: ToolRegistry,
    pricing: PricingTable,
    store: std::sync::Arc<Store>,
    efficiency: EfficiencyConfig,
}

impl Orchestrator {
    pub fn new(
        store: std::sync::Arc<Store>,
        file_cache_capacity: usize,
        session_cache_capacity: usize,
    ) -> Self {
        Self {
            reader: IncrementalReader::new(),
            file_entries: LruCache::new(
                NonZeroUsize::new(file_cache_capacity.max(1)).expect("capacity > 0"),
            ),
            session_entries: LruCache::new(
                NonZeroUsize::new(session_cache_capacity.max(1)).expect("capacity > 0"),
            ),
            session_files: HashMap::new(),
            registry: ToolRegistry::default_registry(),
            pricing: PricingTable::default_table(),
            store,
            efficiency: EfficiencyConfig::default(),
        }
    }

    /// Runs forever, processing one file event at a time (spec §4.8/§5).
    pub async fn run(mut self, mut events: tokio::sync::mpsc::Receiver<FileEvent>) {
        while let Some(event) = events.recv().await {
            if let Err(e) = self.process_event(&event).await {
                warn!(path = %event.path.display(), error = %e, "failed to process file event, will retry on next event");
            }
        }
    }

    async fn process_event(&mut self, event: &FileEvent) -> Result<(), String> {
        if matches!(event.kind, EventKind::Removed) {
            self.reader.forget(&event.path);
            self.file_entries.pop(&event.path);
            debug!(path = %event.path.display(), "file removed, dropped from tracking");
            return Ok(());
        }

        let new_lines = if self.file_entries.contains(&event.path) {
            self.reader
                .read_new(&event.path)
                .await
                .map_err(|e| e.to_string())?
        } else {
            self.reader
                .read_all(&event.path)
                .await
                .map_err(|e| e.to_string())?
        };

        let mut new_entries = Vec::with_capacity(new_lines.len());
        for (i, line) in new_lines.iter().enumerate() {
            match decoder::decode_line(line, i + 1) {
                Ok(Some(entry)) => {
                    metrics_exporter::record_line_decoded();
                    new_entries.push(entry);
                }
                Ok(None) => metrics_exporter::record_line_skipped("blank_or_summary"),
                Err(e) => {
                    metrics_exporter::record_line_skipped("malformed_json");
                    warn!(path = %event.path.display(), line = i + 1, error = %e, "skipping malformed line");
                }
            }
        }

        if new_entries.is_empty() && self.file_entries.contains(&event.path) {
            return Ok(());
        }

        let session_id = new_entries
            .first()
            .map(|e| e.session_id.clone())
            .unwrap_or_else(|| event.session_id.clone());

        {
            let existing = self.file_entries.get_or_insert_mut(event.path.clone(), Vec::new);
            existing.extend(new_entries);
        }

        self.session_files
            .entry(session_id.clone())
            .or_default()
            .insert(event.path.clone());

        let mut merged: Vec<RawEntry> = Vec::new();
        for path in self.session_files.get(&session_id).into_iter().flatten() {
            if let Some(entries) = self.file_entries.peek(path) {
                merged.extend(entries.iter().cloned());
            }
        }
        merged.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.line_no.cmp(&b.line_no)));
        self.session_entries.put(session_id.clone(), merged.clone());

        let turns = aggregator::aggregate_turns(&merged, &self.registry);

        let last = merged.last();
        let project_name = last
            .map(|e| {
                std::path::Path::new(&e.cwd)
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or(&e.cwd)
                    .to_string()
            })
            .unwrap_or_default();
        let project_path = last.map(|e| e.cwd.clone()).unwrap_or_default();
        let branch = last.and_then(|e| e.git_branch.clone());
        let model = last.and_then(|e| e.model.clone());
        let last_activity_at = last.map(|e| e.timestamp).unwrap_or_else(chrono::Utc::now);

        self.store.upsert_session(SessionUpsert {
            id: session_id.clone(),
            project_path,
            project_name,
            branch,
            last_activity_at,
            model,
            turn_count: turns.len() as u32,
        });

        for turn in &turns {
            let tm = metrics::turn_metrics(turn, &self.pricing);
            self.store.upsert_turn(turn.clone(), tm);
        }

        self.store.set_current_session(session_id);
        Ok(())
    }
}

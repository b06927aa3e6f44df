//! C4 — directory watcher. Recursively watches a root directory for files
//! ending in a configured extension (default `.jsonl`) and emits debounced
//! `added|changed|removed` events (spec §4.4). Grounded in the teacher's
//! `server/src/live/watcher.rs` (`notify::recommended_watcher` + best-effort
//! channel send), generalised with the explicit debounce/path-traversal-guard
//! behaviour the teacher's version didn't need.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use notify::{EventKind as NotifyEventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::WatcherError;

/// Kind of change observed for a tracked file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Added,
    Changed,
    Removed,
}

/// A debounced, path-validated filesystem event (spec §4.4).
#[derive(Debug, Clone)]
pub struct FileEvent {
    pub kind: EventKind,
    pub path: PathBuf,
    pub session_id: String,
}

/// Extracts the session id embedded in a path's basename: a 36-character
/// UUID-shaped name, an `agent-<hex>` name, or else the basename minus
/// extension (spec §4.4).
pub fn derive_session_id(path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    if is_uuid_shaped(stem) || stem.starts_with("agent-") {
        return stem.to_string();
    }
    stem.to_string()
}

fn is_uuid_shaped(s: &str) -> bool {
    if s.len() != 36 {
        return false;
    }
    let groups: Vec<&str> = s.split('-').collect();
    let expected = [8, 4, 4, 4, 12];
    groups.len() == 5
        && groups
            .iter()
            .zip(expected)
            .all(|(g, len)| g.len() == len && g.chars().all(|c| c.is_ascii_hexdigit()))
}

struct DebounceState {
    /// Paths known to have produced at least one event, to distinguish
    /// `Added` from `Changed`.
    known: HashSet<PathBuf>,
    /// Generation counter per path; a stale debounce timer (whose captured
    /// generation no longer matches) is a silent no-op — this implements
    /// last-write-wins without needing to cancel a spawned task.
    generation: HashMap<PathBuf, u64>,
}

/// Watches `root` recursively for files matching `extension` and forwards
/// debounced events to `out`. Returns the live `notify` watcher — drop it to
/// stop watching.
pub fn start_watcher(
    root: PathBuf,
    extension: impl Into<String>,
    debounce: Duration,
    out: mpsc::Sender<FileEvent>,
) -> Result<RecommendedWatcher, WatcherError> {
    let extension = extension.into();
    if !root.exists() {
        return Err(WatcherError::RootNotFound { path: root });
    }
    let canonical_root = root
        .canonicalize()
        .unwrap_or_else(|_| root.clone());

    let debounce_state = Arc::new(Mutex::new(DebounceState {
        known: HashSet::new(),
        generation: HashMap::new(),
    }));

    let (raw_tx, mut raw_rx) = mpsc::unbounded_channel::<(NotifyEventKind, PathBuf)>();

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        let event = match res {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "watcher error");
                return;
            }
        };
        for path in event.paths {
            if path.extension().and_then(|e| e.to_str()) != Some(extension.as_str()) {
                continue;
            }
            let _ = raw_tx.send((event.kind.clone(), path));
        }
    })
    .map_err(|e| WatcherError::Notify {
        path: root.clone(),
        source: e,
    })?;

    watcher
        .watch(&root, RecursiveMode::Recursive)
        .map_err(|e| WatcherError::Notify {
            path: root.clone(),
            source: e,
        })?;

    tokio::spawn(async move {
        while let Some((kind, path)) = raw_rx.recv().await {
            let Some(canon) = resolve_within_root(&path, &canonical_root) else {
                warn!(path = %path.display(), "rejecting path outside watch root");
                continue;
            };

            if matches!(kind, NotifyEventKind::Remove(_)) {
                let mut state = debounce_state.lock().expect("debounce state poisoned");
                state.known.remove(&canon);
                // Bumping the generation makes any in-flight debounce timer
                // for this path a no-op (spec: removed evicts pending change).
                *state.generation.entry(canon.clone()).or_insert(0) += 1;
                drop(state);
                let session_id = derive_session_id(&canon);
                if out
                    .send(FileEvent {
                        kind: EventKind::Removed,
                        path: canon,
                        session_id,
                    })
                    .await
                    .is_err()
                {
                    break;
                }
                continue;
            }

            let generation = {
                let mut state = debounce_state.lock().expect("debounce state poisoned");
                let gen = state.generation.entry(canon.clone()).or_insert(0);
                *gen += 1;
                *gen
            };

            let state = Arc::clone(&debounce_state);
            let out = out.clone();
            let canon2 = canon.clone();
            tokio::spawn(async move {
                tokio::time::sleep(debounce).await;
                let is_current = {
                    let guard = state.lock().expect("debounce state poisoned");
                    guard.generation.get(&canon2).copied() == Some(generation)
                };
                if !is_current {
                    return;
                }
                let event_kind = {
                    let mut guard = state.lock().expect("debounce state poisoned");
                    if guard.known.insert(canon2.clone()) {
                        EventKind::Added
                    } else {
                        EventKind::Changed
                    }
                };
                let session_id = derive_session_id(&canon2);
                debug!(path = %canon2.display(), ?event_kind, "debounced file event");
                let _ = out
                    .send(FileEvent {
                        kind: event_kind,
                        path: canon2,
                        session_id,
                    })
                    .await;
            });
        }
    });

    info!(root = %canonical_root.display(), "directory watcher started");
    Ok(watcher)
}

/// Resolves `path` (after symlink resolution where possible) and checks it is
/// a descendant of `root` — the path-traversal guard (spec §4.4).
fn resolve_within_root(path: &Path, root: &Path) -> Option<PathBuf> {
    let resolved = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    if resolved.starts_with(root) {
        Some(resolved)
    } else {
        None
    }
}

//! C3 — incremental reader. Per-file `{offset, mtime}` state; yields only
//! lines appended since the last call (spec §4.3). Grounded in the teacher's
//! `live_parser::parse_tail` truncation-handling pattern, generalised from a
//! single in-process call into a tracked-map-of-paths service.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::warn;

use crate::error::ReaderError;

#[derive(Debug, Clone, Copy)]
struct FileState {
    offset: u64,
    mtime: SystemTime,
}

/// Tracks per-path read offsets across calls. Safe to share across workers;
/// the spec's single-writer-per-path guarantee means the map lock is only
/// ever held for the short bookkeeping sections, never across I/O.
#[derive(Debug, Default)]
pub struct IncrementalReader {
    state: Mutex<HashMap<PathBuf, FileState>>,
}

impl IncrementalReader {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(HashMap::new()),
        }
    }

    /// Returns only the lines appended since the last call for this path.
    /// Trailing partial (no final newline) content is never returned — it
    /// is picked up on the next call once the writer completes the line.
    pub async fn read_new(&self, path: &Path) -> Result<Vec<String>, ReaderError> {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(m) => m,
            Err(e) => return Err(ReaderError::io(path.to_path_buf(), e)),
        };
        let size = metadata.len();
        let mtime = metadata
            .modified()
            .unwrap_or(SystemTime::UNIX_EPOCH);

        let prior = {
            let map = self.state.lock().expect("reader state mutex poisoned");
            map.get(path).copied()
        };

        if let Some(prior) = prior {
            if size <= prior.offset && mtime == prior.mtime {
                return Ok(Vec::new());
            }
        }

        let start_offset = match prior {
            Some(prior) if size >= prior.offset => prior.offset,
            _ => 0,
        };

        let lines = match read_span(path, start_offset, size).await {
            Ok(lines) => lines,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "incremental read failed, state unchanged");
                return Err(ReaderError::io(path.to_path_buf(), e));
            }
        };

        let mut map = self.state.lock().expect("reader state mutex poisoned");
        map.insert(path.to_path_buf(), FileState { offset: size, mtime });
        Ok(lines)
    }

    /// Resets tracking for `path` and reads it from byte zero.
    pub async fn read_all(&self, path: &Path) -> Result<Vec<String>, ReaderError> {
        self.forget(path);
        self.read_new(path).await
    }

    /// Drops tracking for `path`; the next `read_new` behaves like a fresh file.
    pub fn forget(&self, path: &Path) {
        let mut map = self.state.lock().expect("reader state mutex poisoned");
        map.remove(path);
    }
}

async fn read_span(path: &Path, start: u64, end: u64) -> std::io::Result<Vec<String>> {
    if end <= start {
        return Ok(Vec::new());
    }
    let mut file = File::open(path).await?;
    file.seek(std::io::SeekFrom::Start(start)).await?;
    let mut buf = vec![0u8; (end - start) as usize];
    file.read_exact(&mut buf).await?;

    let text = String::from_utf8_lossy(&buf);
    Ok(text
        .split('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

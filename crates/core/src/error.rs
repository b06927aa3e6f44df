//! Per-component error types. None of these may propagate past the
//! processing orchestrator (spec §7): a bad line, a vanished file, or a
//! broken watch never tears down the pipeline, it gets logged and skipped.

use std::io;
use std::path::PathBuf;

/// Failure decoding a single JSONL line (spec §4.2). Never bubbles up through
/// the public API — the decoder logs and returns `None` for a bad line — but
/// it is a real type so unit tests can assert on *why* a line was skipped.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed JSON: {0}")]
    MalformedJson(#[from] serde_json::Error),
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("unrecognized entry type `{0}`")]
    UnrecognizedType(String),
}

/// Failure reading a tracked file incrementally (spec §4.3).
#[derive(Debug, thiserror::Error)]
pub enum ReaderError {
    #[error("file not found: {path}")]
    NotFound { path: PathBuf },
    #[error("permission denied: {path}")]
    PermissionDenied { path: PathBuf },
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ReaderError {
    pub fn io(path: PathBuf, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::NotFound => ReaderError::NotFound { path },
            io::ErrorKind::PermissionDenied => ReaderError::PermissionDenied { path },
            _ => ReaderError::Io { path, source },
        }
    }
}

/// Failure setting up or running the directory watcher (spec §4.4).
#[derive(Debug, thiserror::Error)]
pub enum WatcherError {
    #[error("root directory not found: {path}")]
    RootNotFound { path: PathBuf },
    #[error("failed to start filesystem watch on {path}: {source}")]
    Notify {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
}

//! Server configuration: CLI flags via `clap` with env-var fallback,
//! grounded in the teacher's `core/src/cli.rs` derive style.

use std::path::PathBuf;

use clap::Parser;

/// `sessionlens` — local observability backend for an AI coding assistant.
#[derive(Debug, Clone, Parser)]
#[command(name = "sessionlens", version, about)]
pub struct Config {
    /// Root directory to watch for session log files.
    #[arg(long, env = "SESSIONLENS_ROOT")]
    root: Option<PathBuf>,

    /// Address to bind the HTTP server to.
    #[arg(long, env = "SESSIONLENS_BIND", default_value = "127.0.0.1:4173")]
    pub bind: String,

    /// A session is `isActive` while `now - lastActivityAt` is within this
    /// many seconds (spec §3, default 5 min).
    #[arg(long, env = "SESSIONLENS_ACTIVE_WINDOW_SECS", default_value_t = 300)]
    pub active_window_secs: i64,

    /// Push-stream heartbeat interval, in seconds (spec §4.10, default 30s).
    #[arg(long, env = "SESSIONLENS_HEARTBEAT_SECS", default_value_t = 30)]
    pub heartbeat_secs: u64,

    /// Directory-watcher debounce interval, in milliseconds (spec §4.4,
    /// default 100ms).
    #[arg(long, env = "SESSIONLENS_DEBOUNCE_MS", default_value_t = 100)]
    pub debounce_ms: u64,

    /// Max event-bus listener count, to catch subscription leaks (spec §4.9).
    #[arg(long, env = "SESSIONLENS_MAX_LISTENERS", default_value_t = 100)]
    pub max_listeners: usize,

    /// Subscriber outgoing send-queue capacity (spec §5, default 256).
    #[arg(long, env = "SESSIONLENS_SUBSCRIBER_QUEUE", default_value_t = 256)]
    pub subscriber_queue_capacity: usize,

    /// File-entries LRU cache capacity (spec §4.8, default 500).
    #[arg(long, env = "SESSIONLENS_FILE_CACHE_CAP", default_value_t = 500)]
    pub file_cache_capacity: usize,

    /// Session-entries LRU cache capacity (spec §4.8, default 200).
    #[arg(long, env = "SESSIONLENS_SESSION_CACHE_CAP", default_value_t = 200)]
    pub session_cache_capacity: usize,

    /// Extension identifying a session log file (spec §4.4, default `jsonl`).
    #[arg(long, env = "SESSIONLENS_EXTENSION", default_value = "jsonl")]
    pub extension: String,
}

impl Config {
    /// Resolves the watch root: `--root`/env if set, else `~/.claude/projects`.
    pub fn root_dir(&self) -> PathBuf {
        self.root.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".claude")
                .join("projects")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn config_command_is_well_formed() {
        Config::command().debug_assert();
    }

    #[test]
    fn root_dir_falls_back_to_home_dot_claude_projects() {
        let cfg = Config::parse_from(["sessionlens"]);
        assert!(cfg.root_dir().ends_with(".claude/projects"));
    }
}

//! Domain model shared by the ingestion pipeline, the metrics engine, and the store.
//!
//! Mirrors spec §3: `RawEntry` is the decoded line; `Session`/`Turn`/`ToolUse`/
//! `CodeChange` are the reconstructed conversational structure; `TurnMetrics`/
//! `SessionMetrics` are the derived numbers.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Message role on a [`RawEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Token usage carried on an assistant entry, taken verbatim from the
/// provider's `usage` object. Values are cumulative per streaming request
/// (see spec §4.5) — deduplication happens in the turn aggregator, not here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_creation_input_tokens: u64,
    #[serde(default)]
    pub cache_read_input_tokens: u64,
}

/// One block of message content. Tagged union keyed by `type`, per spec §6.1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Thinking {
        thinking: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        #[serde(default)]
        content: ToolResultContent,
        #[serde(default)]
        is_error: Option<bool>,
    },
    /// Forward-compatible: unknown block types are preserved but ignored.
    #[serde(other)]
    Other,
}

/// `tool_result.content` is either a plain string or a list of blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolResultContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl Default for ToolResultContent {
    fn default() -> Self {
        ToolResultContent::Text(String::new())
    }
}

impl ToolResultContent {
    /// Flatten to plain text the way the turn aggregator needs it for
    /// `ToolUse::result` (spec §4.5).
    pub fn as_text(&self) -> String {
        match self {
            ToolResultContent::Text(s) => s.clone(),
            ToolResultContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// Message content is either a plain string or an ordered list of blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl Content {
    /// Concatenated text of all `text` blocks (or the string itself).
    pub fn text(&self) -> String {
        match self {
            Content::Text(s) => s.clone(),
            Content::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }

    pub fn has_text(&self) -> bool {
        !self.text().trim().is_empty()
    }

    pub fn blocks(&self) -> &[ContentBlock] {
        match self {
            Content::Text(_) => &[],
            Content::Blocks(blocks) => blocks,
        }
    }

    pub fn has_tool_result(&self) -> bool {
        self.blocks()
            .iter()
            .any(|b| matches!(b, ContentBlock::ToolResult { .. }))
    }
}

/// One decoded line of the session log (spec §3 `RawEntry`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEntry {
    pub uuid: String,
    #[serde(default)]
    pub parent_uuid: Option<String>,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub role: Role,
    pub content: Content,
    #[serde(default)]
    pub usage: Option<Usage>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub is_sidechain: bool,
    pub cwd: String,
    #[serde(default)]
    pub git_branch: Option<String>,
    /// Original line number within its source file, for error reporting and
    /// stable original-order tie-breaking (spec §3: "ties broken by original
    /// line order").
    #[serde(default)]
    pub line_no: usize,
}

/// A single tool invocation and its (eventual) result (spec §3 `ToolUse`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolUse {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub is_error: bool,
    #[serde(default)]
    pub duration_ms: u64,
}

/// The kind of filesystem mutation a [`ToolUse`] performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodeChangeType {
    Create,
    Modify,
    Delete,
}

/// A file touched by a turn (spec §3 `CodeChange`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeChange {
    pub file_path: String,
    #[serde(rename = "type")]
    pub change_type: CodeChangeType,
    pub lines_added: u64,
    pub lines_removed: u64,
    pub extension: String,
}

/// One human message plus everything until the next human message
/// (spec §3 `Turn`, GLOSSARY "cycle").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    pub id: String,
    pub session_id: String,
    pub turn_number: u32,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub user_message: String,
    pub assistant_message: String,
    pub usage: TurnTokens,
    pub tool_uses: Vec<ToolUse>,
    pub code_changes: Vec<CodeChange>,
    #[serde(default)]
    pub model: Option<String>,
    pub is_subagent: bool,
    #[serde(default)]
    pub agent_id: Option<String>,
}

impl Turn {
    pub fn turn_id(session_id: &str, turn_number: u32) -> String {
        format!("{session_id}-turn-{turn_number}")
    }
}

/// Deduplicated, summed token usage for a turn (spec §4.5).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnTokens {
    pub input: u64,
    pub output: u64,
    pub cache_creation: u64,
    pub cache_read: u64,
}

impl TurnTokens {
    pub fn total(&self) -> u64 {
        self.input + self.output + self.cache_creation + self.cache_read
    }
}

/// A single continuous interaction recorded by the assistant (spec §3 `Session`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub project_path: String,
    pub project_name: String,
    #[serde(default)]
    pub branch: Option<String>,
    pub started_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    #[serde(default)]
    pub model: Option<String>,
    pub turn_count: u32,
}

/// Window within which a session is considered active (spec §3, default 5 min).
pub const DEFAULT_ACTIVE_WINDOW_SECS: i64 = 5 * 60;

impl Session {
    /// `isActive` is derived lazily on read, never stored (spec §4.7 invariant).
    pub fn is_active_at(&self, now: DateTime<Utc>, active_window_secs: i64) -> bool {
        (now - self.last_activity_at).num_seconds() <= active_window_secs
    }
}

/// Per-turn token counts, in the four billed classes (spec §3 `TurnMetrics.tokens`).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenTotals {
    pub input: u64,
    pub output: u64,
    pub cache_creation: u64,
    pub cache_read: u64,
    pub total: u64,
}

impl TokenTotals {
    pub fn from_turn_tokens(t: TurnTokens) -> Self {
        Self {
            input: t.input,
            output: t.output,
            cache_creation: t.cache_creation,
            cache_read: t.cache_read,
            total: t.total(),
        }
    }

    pub fn add(&mut self, other: &TokenTotals) {
        self.input += other.input;
        self.output += other.output;
        self.cache_creation += other.cache_creation;
        self.cache_read += other.cache_read;
        self.total += other.total;
    }
}

/// Cost in USD, rounded to micro-cent (6 decimal places) per class (spec §4.1).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostTotals {
    pub input: f64,
    pub output: f64,
    pub cache_creation: f64,
    pub cache_read: f64,
    pub total: f64,
}

impl CostTotals {
    pub fn add(&mut self, other: &CostTotals) {
        self.input += other.input;
        self.output += other.output;
        self.cache_creation += other.cache_creation;
        self.cache_read += other.cache_read;
        self.total += other.total;
    }
}

/// Tool-name -> invocation count.
pub type ToolBreakdown = HashMap<String, u64>;

/// Aggregate counts of file mutations for a turn or session.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeMetrics {
    pub files_changed: u64,
    pub lines_added: u64,
    pub lines_removed: u64,
}

impl CodeMetrics {
    pub fn add(&mut self, other: &CodeMetrics) {
        self.files_changed += other.files_changed;
        self.lines_added += other.lines_added;
        self.lines_removed += other.lines_removed;
    }
}

/// Derived metrics for a single turn (spec §3 `TurnMetrics`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnMetrics {
    pub turn_id: String,
    pub turn_number: u32,
    pub timestamp: DateTime<Utc>,
    pub tokens: TokenTotals,
    pub cost: CostTotals,
    pub duration_ms: i64,
    pub context_usage_percent: f64,
    pub tool_count: u64,
    pub tool_breakdown: ToolBreakdown,
    pub code_metrics: CodeMetrics,
}

/// Averages across a session's turns (spec §3 `SessionMetrics.averages`).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Averages {
    pub tokens_per_turn: f64,
    pub cost_per_turn: f64,
    pub duration_ms_per_turn: f64,
    pub context_usage_percent: f64,
}

/// Peak values across a session's turns (spec §3 `SessionMetrics.peaks`).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Peaks {
    pub max_tokens_in_turn: u64,
    pub max_cost_in_turn: f64,
    pub max_duration_ms: i64,
    pub max_context_usage_percent: f64,
}

/// Bounded composite of cache/tool/context/code-output efficiency (spec §4.6).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EfficiencyComponents {
    pub cache_utilization: f64,
    pub code_output_ratio: f64,
    pub tool_success_rate: f64,
    pub context_efficiency: f64,
    pub composite_score: f64,
}

/// Session-level rollup of every turn's metrics (spec §3 `SessionMetrics`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetrics {
    pub session_id: String,
    pub tokens: TokenTotals,
    pub cost: CostTotals,
    pub duration_ms: i64,
    pub tool_count: u64,
    pub code_metrics: CodeMetrics,
    pub cost_breakdown: CostTotals,
    pub averages: Averages,
    pub peaks: Peaks,
    pub tool_breakdown: ToolBreakdown,
    pub efficiency_score: f64,
    pub cache_hit_rate: f64,
    pub efficiency: EfficiencyComponents,
    pub turn_count: u32,
}

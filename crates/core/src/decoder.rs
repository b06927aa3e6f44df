//! C2 — line decoder. Validates one JSONL line against the tolerant wire
//! schema (spec §6.1) and classifies it for the turn aggregator (spec §4.2).
//!
//! Never throws to the caller: [`decode_line`] returns `Ok(None)` for a line
//! that should be silently dropped (empty, `type="summary"`, unrecognised
//! `type`) and `Err` only so the orchestrator can log *why* a malformed line
//! was skipped — the error itself is never propagated past that log line.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::DecodeError;
use crate::types::{Content, ContentBlock, RawEntry, Role, ToolResultContent, Usage};

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum WireLine {
    User(WireBody),
    Assistant(WireBody),
    /// Catches `type="summary"` and any forward/unknown type; both are
    /// dropped silently per spec §4.2/§6.1.
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct WireBody {
    uuid: String,
    #[serde(default)]
    parent_uuid: Option<String>,
    session_id: String,
    timestamp: DateTime<Utc>,
    cwd: String,
    #[serde(default)]
    git_branch: Option<String>,
    #[serde(default)]
    request_id: Option<String>,
    #[serde(default)]
    agent_id: Option<String>,
    #[serde(default)]
    is_sidechain: bool,
    message: WireMessage,
    #[serde(default)]
    tool_use_result: Option<WireToolUseResult>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    role: Role,
    content: Content,
    #[serde(default)]
    usage: Option<Usage>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireToolUseResult {
    tool_use_id: String,
    content: String,
    #[serde(default)]
    is_error: Option<bool>,
}

/// Decodes one UTF-8 line. `line_no` is 1-based, used only for diagnostics.
///
/// Returns `Ok(None)` for lines that are valid but carry nothing useful
/// (blank, `summary`, unrecognised type). Returns `Err` for lines that fail
/// to parse or are missing a field the schema requires — callers must log
/// and skip, never propagate (spec §7).
pub fn decode_line(line: &str, line_no: usize) -> Result<Option<RawEntry>, DecodeError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let wire: WireLine = serde_json::from_str(trimmed)?;
    let (role_hint, body) = match wire {
        WireLine::User(b) => (Role::User, b),
        WireLine::Assistant(b) => (Role::Assistant, b),
        WireLine::Other => return Ok(None),
    };

    let _ = role_hint;
    let content = merge_tool_use_result(body.message.content, body.tool_use_result);

    Ok(Some(RawEntry {
        uuid: body.uuid,
        parent_uuid: body.parent_uuid,
        session_id: body.session_id,
        timestamp: body.timestamp,
        role: body.message.role,
        content,
        usage: body.message.usage,
        model: body.message.model,
        request_id: body.request_id,
        agent_id: body.agent_id,
        is_sidechain: body.is_sidechain,
        cwd: body.cwd,
        git_branch: body.git_branch,
        line_no,
    }))
}

/// The top-level `toolUseResult` convenience field (spec §6.1) is folded into
/// `content` as a synthesized `tool_result` block, so downstream
/// classification only ever has to look at content blocks.
fn merge_tool_use_result(content: Content, tool_use_result: Option<WireToolUseResult>) -> Content {
    let Some(tur) = tool_use_result else {
        return content;
    };
    let mut blocks = match content {
        Content::Text(s) if !s.is_empty() => vec![ContentBlock::Text { text: s }],
        Content::Text(_) => Vec::new(),
        Content::Blocks(blocks) => blocks,
    };
    blocks.push(ContentBlock::ToolResult {
        tool_use_id: tur.tool_use_id,
        content: ToolResultContent::Text(tur.content),
        is_error: tur.is_error,
    });
    Content::Blocks(blocks)
}

/// `role=user AND content has text AND content has no tool_result blocks`
/// (spec §4.2). A line with `type="assistant"` never satisfies this even if
/// its embedded `message.role` were somehow `user`, because the wire schema
/// ties `role` to the enclosing `type` — `decode_line` only ever produces
/// `Role::User` from a `type="user"` line.
pub fn is_human_message(entry: &RawEntry) -> bool {
    entry.role == Role::User && entry.content.has_text() && !entry.content.has_tool_result()
}

pub fn is_assistant_message(entry: &RawEntry) -> bool {
    entry.role == Role::Assistant
}

pub fn is_tool_result_only(entry: &RawEntry) -> bool {
    entry.role == Role::User && entry.content.has_tool_result()
}

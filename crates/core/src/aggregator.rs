//! C5 — turn aggregator. Pure function: an ordered stream of `RawEntry` for
//! one session becomes an ordered list of `Turn` (spec §4.5). This is the
//! single most subtlety-bearing component in the system — the streaming
//! token dedup by `requestId` (spec §9) lives here.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::decoder::{is_assistant_message, is_human_message, is_tool_result_only};
use crate::types::{CodeChange, CodeChangeType, Content, RawEntry, ToolUse, Turn, TurnTokens};

/// Maps tool name -> kind of file mutation it performs. Spec §9 leaves the
/// exact set of "file-modifying" tool names as a faithful open question;
/// this ships a default set and lets callers override it.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    kinds: HashMap<String, CodeChangeType>,
}

impl ToolRegistry {
    pub fn new(kinds: HashMap<String, CodeChangeType>) -> Self {
        Self { kinds }
    }

    pub fn default_registry() -> Self {
        let mut kinds = HashMap::new();
        kinds.insert("Write".to_string(), CodeChangeType::Create);
        kinds.insert("create".to_string(), CodeChangeType::Create);
        kinds.insert("Edit".to_string(), CodeChangeType::Modify);
        kinds.insert("MultiEdit".to_string(), CodeChangeType::Modify);
        kinds.insert("edit".to_string(), CodeChangeType::Modify);
        kinds.insert("multi-edit".to_string(), CodeChangeType::Modify);
        kinds.insert("Delete".to_string(), CodeChangeType::Delete);
        kinds.insert("delete".to_string(), CodeChangeType::Delete);
        Self { kinds }
    }

    pub fn kind_for(&self, tool_name: &str) -> Option<CodeChangeType> {
        self.kinds.get(tool_name).copied()
    }
}

struct Builder<'a> {
    turn_number: u32,
    user: &'a RawEntry,
    assistants: Vec<&'a RawEntry>,
    tool_uses: Vec<ToolUse>,
    tool_index: HashMap<String, usize>,
    ended_at: DateTime<Utc>,
    all_sidechain_or_agent: bool,
    agent_id: Option<String>,
}

impl<'a> Builder<'a> {
    fn new(turn_number: u32, user: &'a RawEntry) -> Self {
        let all_sidechain_or_agent = user.is_sidechain || user.agent_id.is_some();
        Builder {
            turn_number,
            user,
            assistants: Vec::new(),
            tool_uses: Vec::new(),
            tool_index: HashMap::new(),
            ended_at: user.timestamp,
            all_sidechain_or_agent,
            agent_id: user.agent_id.clone(),
        }
    }

    fn observe_contributor(&mut self, entry: &RawEntry) {
        if entry.timestamp > self.ended_at {
            self.ended_at = entry.timestamp;
        }
        if !(entry.is_sidechain || entry.agent_id.is_some()) {
            self.all_sidechain_or_agent = false;
        }
        if self.agent_id.is_none() {
            self.agent_id = entry.agent_id.clone();
        }
    }

    fn add_assistant(&mut self, entry: &'a RawEntry) {
        self.observe_contributor(entry);
        self.resolve_tool_use_and_results(entry);
        self.assistants.push(entry);
    }

    fn add_tool_result_only(&mut self, entry: &'a RawEntry) {
        self.observe_contributor(entry);
        self.resolve_tool_use_and_results(entry);
    }

    fn resolve_tool_use_and_results(&mut self, entry: &RawEntry) {
        for block in entry.content.blocks() {
            match block {
                crate::types::ContentBlock::ToolUse { id, name, input } => {
                    if !self.tool_index.contains_key(id) {
                        self.tool_index.insert(id.clone(), self.tool_uses.len());
                        self.tool_uses.push(ToolUse {
                            id: id.clone(),
                            name: name.clone(),
                            input: input.clone(),
                            result: None,
                            is_error: false,
                            duration_ms: 0,
                        });
                    }
                }
                crate::types::ContentBlock::ToolResult {
                    tool_use_id,
                    content,
                    is_error,
                } => {
                    if let Some(&idx) = self.tool_index.get(tool_use_id) {
                        self.tool_uses[idx].result = Some(content.as_text());
                        self.tool_uses[idx].is_error = is_error.unwrap_or(false);
                    }
                }
                _ => {}
            }
        }
    }

    fn flush(mut self, registry: &ToolRegistry) -> Turn {
        let started_at = self.user.timestamp;
        let ended_at = self.ended_at;
        let duration_ms = (ended_at - started_at).num_milliseconds();

        let user_message = self.user.content.text();
        let assistant_message = self
            .assistants
            .iter()
            .map(|e| e.content.text())
            .filter(|t| !t.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n");

        let model = self
            .assistants
            .last()
            .and_then(|e| e.model.clone())
            .or_else(|| self.user.model.clone());

        let usage = dedupe_and_sum_tokens(&self.assistants);

        assign_tool_durations(&mut self.tool_uses, &self.assistants);

        let code_changes = extract_code_changes(&self.tool_uses, registry);

        Turn {
            id: Turn::turn_id(&self.user.session_id, self.turn_number),
            session_id: self.user.session_id.clone(),
            turn_number: self.turn_number,
            started_at,
            ended_at,
            duration_ms,
            user_message,
            assistant_message,
            usage,
            tool_uses: self.tool_uses,
            code_changes,
            model,
            is_subagent: self.all_sidechain_or_agent,
            agent_id: self.agent_id,
        }
    }
}

/// Deduplicates cumulative streaming usage by `requestId` and sums the
/// retained entries' token classes (spec §4.5, §9 "single most subtle
/// correctness concern"). Entries share a request id when the provider
/// streamed one logical response as several log lines, each usage value
/// being the running total so far — only the last one per group is real.
fn dedupe_and_sum_tokens(assistants: &[&RawEntry]) -> TurnTokens {
    let mut by_request: HashMap<&str, &RawEntry> = HashMap::new();
    let mut independent: Vec<&RawEntry> = Vec::new();

    for entry in assistants {
        if entry.usage.is_none() {
            continue;
        }
        match entry.request_id.as_deref() {
            // Entries arrive pre-sorted by (timestamp, position); the last
            // insert for a given key is therefore already the latest one.
            Some(rid) => {
                by_request.insert(rid, entry);
            }
            None => independent.push(entry),
        }
    }

    let mut totals = TurnTokens::default();
    for entry in independent.into_iter().chain(by_request.into_values()) {
        if let Some(u) = entry.usage {
            totals.input += u.input_tokens;
            totals.output += u.output_tokens;
            totals.cache_creation += u.cache_creation_input_tokens;
            totals.cache_read += u.cache_read_input_tokens;
        }
    }
    totals
}

/// `(lastAssistantTs - firstAssistantTs) / toolCount`, rounded non-negative;
/// zero with fewer than two assistant entries (spec §4.5 "tool durations").
fn assign_tool_durations(tool_uses: &mut [ToolUse], assistants: &[&RawEntry]) {
    if tool_uses.is_empty() {
        return;
    }
    let duration_ms = if assistants.len() >= 2 {
        let first = assistants.first().unwrap().timestamp;
        let last = assistants.last().unwrap().timestamp;
        let span = (last - first).num_milliseconds().max(0);
        (span / tool_uses.len() as i64).max(0) as u64
    } else {
        0
    };
    for tool_use in tool_uses.iter_mut() {
        tool_use.duration_ms = duration_ms;
    }
}

fn extract_code_changes(tool_uses: &[ToolUse], registry: &ToolRegistry) -> Vec<CodeChange> {
    tool_uses
        .iter()
        .filter_map(|t| {
            let change_type = registry.kind_for(&t.name)?;
            code_change_from_tool(t, change_type)
        })
        .collect()
}

fn code_change_from_tool(tool: &ToolUse, change_type: CodeChangeType) -> Option<CodeChange> {
    let file_path = extract_string_field(&tool.input, &["file_path", "path"])?;
    let extension = std::path::Path::new(&file_path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_string();

    let (lines_added, lines_removed) = match change_type {
        CodeChangeType::Create => {
            let content = extract_string_field(&tool.input, &["content"]).unwrap_or_default();
            (count_lines(&content), 0)
        }
        CodeChangeType::Modify => {
            let new_string = extract_string_field(&tool.input, &["new_string"]).unwrap_or_default();
            let old_string = extract_string_field(&tool.input, &["old_string"]).unwrap_or_default();
            (count_lines(&new_string), count_lines(&old_string))
        }
        CodeChangeType::Delete => (0, 0),
    };

    Some(CodeChange {
        file_path,
        change_type,
        lines_added,
        lines_removed,
        extension,
    })
}

fn extract_string_field(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| value.get(k).and_then(|v| v.as_str()))
        .map(str::to_string)
}

fn count_lines(s: &str) -> u64 {
    if s.is_empty() {
        0
    } else {
        s.lines().count() as u64
    }
}

/// Turns an ordered stream of `RawEntry` for one session into an ordered
/// list of `Turn`s (spec §4.5). `entries` must already be sorted by
/// timestamp ascending, ties broken by original line order.
pub fn aggregate_turns(entries: &[RawEntry], registry: &ToolRegistry) -> Vec<Turn> {
    let mut turns = Vec::new();
    let mut turn_number = 0u32;
    let mut builder: Option<Builder> = None;

    for entry in entries {
        if is_human_message(entry) {
            if let Some(b) = builder.take() {
                turns.push(b.flush(registry));
            }
            turn_number += 1;
            builder = Some(Builder::new(turn_number, entry));
        } else if is_assistant_message(entry) {
            if let Some(b) = builder.as_mut() {
                b.add_assistant(entry);
            }
        } else if is_tool_result_only(entry) {
            if let Some(b) = builder.as_mut() {
                b.add_tool_result_only(entry);
            }
        }
        // other roles ignored silently
    }

    if let Some(b) = builder {
        turns.push(b.flush(registry));
    }

    turns
}

/// Convenience used by the orchestrator/tests: text of a `Content`, exposed
/// here so callers don't need to import `types::Content` just for this.
pub fn text_of(content: &Content) -> String {
    content.text()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContentBlock, Role, Usage};
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn user(session: &str, idx: usize, secs: i64, text: &str) -> RawEntry {
        RawEntry {
            uuid: format!("u{idx}"),
            parent_uuid: None,
            session_id: session.to_string(),
            timestamp: ts(secs),
            role: Role::User,
            content: Content::Text(text.to_string()),
            usage: None,
            model: None,
            request_id: None,
            agent_id: None,
            is_sidechain: false,
            cwd: "/p".to_string(),
            git_branch: None,
            line_no: idx,
        }
    }

    fn assistant(
        session: &str,
        idx: usize,
        secs: i64,
        text: &str,
        request_id: Option<&str>,
        usage: Option<Usage>,
    ) -> RawEntry {
        RawEntry {
            uuid: format!("a{idx}"),
            parent_uuid: None,
            session_id: session.to_string(),
            timestamp: ts(secs),
            role: Role::Assistant,
            content: Content::Blocks(vec![ContentBlock::Text {
                text: text.to_string(),
            }]),
            usage,
            model: Some("claude-3-5-sonnet".to_string()),
            request_id: request_id.map(str::to_string),
            agent_id: None,
            is_sidechain: false,
            cwd: "/p".to_string(),
            git_branch: None,
            line_no: idx,
        }
    }

    fn tool_result_only(session: &str, idx: usize, secs: i64, tool_use_id: &str) -> RawEntry {
        RawEntry {
            uuid: format!("t{idx}"),
            parent_uuid: None,
            session_id: session.to_string(),
            timestamp: ts(secs),
            role: Role::User,
            content: Content::Blocks(vec![ContentBlock::ToolResult {
                tool_use_id: tool_use_id.to_string(),
                content: crate::types::ToolResultContent::Text("ok".to_string()),
                is_error: Some(false),
            }]),
            usage: None,
            model: None,
            request_id: None,
            agent_id: None,
            is_sidechain: false,
            cwd: "/p".to_string(),
            git_branch: None,
            line_no: idx,
        }
    }

    #[test]
    fn seed_scenario_s1_single_turn_with_usage() {
        let entries = vec![
            user("s1", 0, 0, "hi"),
            assistant(
                "s1",
                1,
                1,
                "hello",
                None,
                Some(Usage {
                    input_tokens: 10,
                    output_tokens: 5,
                    cache_creation_input_tokens: 0,
                    cache_read_input_tokens: 0,
                }),
            ),
        ];
        let turns = aggregate_turns(&entries, &ToolRegistry::default_registry());
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].usage.total(), 15);
    }

    #[test]
    fn seed_scenario_s2_streaming_dedup_by_request_id() {
        let entries = vec![
            user("s1", 0, 0, "hi"),
            assistant(
                "s1",
                1,
                1,
                "partial",
                Some("R"),
                Some(Usage {
                    input_tokens: 100,
                    output_tokens: 20,
                    cache_creation_input_tokens: 0,
                    cache_read_input_tokens: 0,
                }),
            ),
            assistant(
                "s1",
                2,
                2,
                "full",
                Some("R"),
                Some(Usage {
                    input_tokens: 100,
                    output_tokens: 50,
                    cache_creation_input_tokens: 0,
                    cache_read_input_tokens: 0,
                }),
            ),
        ];
        let turns = aggregate_turns(&entries, &ToolRegistry::default_registry());
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].usage.input, 100);
        assert_eq!(turns[0].usage.output, 50);
        assert_eq!(turns[0].usage.total(), 150);
    }

    #[test]
    fn seed_scenario_s3_second_human_message_opens_turn_two() {
        let entries = vec![
            user("s1", 0, 0, "hi"),
            assistant("s1", 1, 1, "hello", None, None),
            user("s1", 2, 2, "again"),
            assistant("s1", 3, 3, "sure", None, None),
        ];
        let turns = aggregate_turns(&entries, &ToolRegistry::default_registry());
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].turn_number, 1);
        assert_eq!(turns[1].turn_number, 2);
    }

    #[test]
    fn seed_scenario_s4_tool_result_only_does_not_open_a_turn() {
        let entries = vec![
            user("s1", 0, 0, "hi"),
            assistant("s1", 1, 1, "using tools", None, None),
            tool_result_only("s1", 2, 2, "tool1"),
            tool_result_only("s1", 3, 3, "tool2"),
            tool_result_only("s1", 4, 4, "tool3"),
            user("s1", 5, 5, "thanks"),
        ];
        let turns = aggregate_turns(&entries, &ToolRegistry::default_registry());
        assert_eq!(turns.len(), 2);
    }

    #[test]
    fn tool_use_without_matching_result_leaves_result_none() {
        let mut a = assistant("s1", 1, 1, "working", None, None);
        a.content = Content::Blocks(vec![ContentBlock::ToolUse {
            id: "t1".to_string(),
            name: "Read".to_string(),
            input: serde_json::json!({"file_path": "a.rs"}),
        }]);
        let entries = vec![user("s1", 0, 0, "hi"), a];
        let turns = aggregate_turns(&entries, &ToolRegistry::default_registry());
        assert_eq!(turns[0].tool_uses.len(), 1);
        assert!(turns[0].tool_uses[0].result.is_none());
        assert!(!turns[0].tool_uses[0].is_error);
    }

    #[test]
    fn empty_entries_produce_no_turns() {
        let turns = aggregate_turns(&[], &ToolRegistry::default_registry());
        assert!(turns.is_empty());
    }

    #[test]
    fn write_tool_produces_a_create_code_change() {
        let mut a = assistant("s1", 1, 1, "writing", None, None);
        a.content = Content::Blocks(vec![ContentBlock::ToolUse {
            id: "t1".to_string(),
            name: "Write".to_string(),
            input: serde_json::json!({"file_path": "src/lib.rs", "content": "line1\nline2\n"}),
        }]);
        let entries = vec![user("s1", 0, 0, "hi"), a];
        let turns = aggregate_turns(&entries, &ToolRegistry::default_registry());
        assert_eq!(turns[0].code_changes.len(), 1);
        assert_eq!(turns[0].code_changes[0].change_type, CodeChangeType::Create);
        assert_eq!(turns[0].code_changes[0].lines_added, 2);
        assert_eq!(turns[0].code_changes[0].extension, "rs");
    }
}

//! Transcript parsing: format detection, envelope reconstruction, and
//! message-to-event expansion
//!
//! Input transcripts are heterogeneous: most are line-delimited JSON event
//! streams, some are whole-document JSON (an array of messages, or an
//! object with a `messages` field). The parser detects the format, walks
//! the records, and builds one [`ParsedSession`] plus line-accounting
//! [`ParseStats`].
//!
//! # Error Handling
//!
//! The parser is designed to recover from per-record damage:
//!
//! - **Malformed JSON lines**: recorded as one warning, line skipped,
//!   parsing continues with subsequent lines.
//! - **Envelopes without a `message`/`role`**: warning, record skipped.
//! - **Unknown envelope types**: warning, record skipped (forward
//!   compatible with future envelope kinds).
//! - **Content blocks without a `type`, or `tool_use` blocks without a
//!   `name`**: warning for the line; sibling blocks are still processed.
//!
//! Only file-level failures (unreadable file, neither format recognized)
//! are fatal, surfaced as [`Error::Parse`] for the caller to tally.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::ingest::discover::{self, ProjectSidecar};
use crate::ingest::extract::{self, ToolClassification, DEFAULT_TOOL_CLASSIFICATIONS};
use crate::types::{
    ErrorRecord, Event, EventType, ParseStats, ParsedSession, Session, SessionModes,
    SkillInvocation, SourceSystem, SubAgentInvocation, ToolCall,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

// ============================================
// Raw record types (serde deserialization)
// ============================================

/// One line of a line-delimited transcript.
///
/// Uses `#[serde(default)]` liberally: damaged or unfamiliar records
/// should degrade to warnings, not deserialization failures.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct RawEnvelope {
    #[serde(rename = "type")]
    envelope_type: Option<String>,
    timestamp: Option<String>,
    cwd: Option<String>,
    git_branch: Option<String>,
    summary: Option<String>,
    message: Option<RawMessage>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawMessage {
    role: Option<String>,
    content: Option<RawContent>,
}

/// One record of a whole-document transcript (array element).
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawWholeRecord {
    role: Option<String>,
    content: Option<RawContent>,
    timestamp: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawContent {
    Text(String),
    // Kept as raw values so one bad block fails alone, not the whole array
    Blocks(Vec<serde_json::Value>),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text {
        #[serde(default)]
        text: String,
    },
    #[serde(rename = "thinking")]
    Thinking {
        #[serde(default)]
        thinking: String,
    },
    #[serde(rename = "tool_use")]
    ToolUse {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        input: serde_json::Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        #[serde(default)]
        tool_use_id: Option<String>,
        #[serde(default)]
        content: serde_json::Value,
    },
    // Catch-all for unknown block types
    #[serde(other)]
    Unknown,
}

// ============================================
// Parser
// ============================================

/// Parser for coding-agent transcripts.
///
/// Construct once (optionally from a [`Config`]) and reuse across files.
pub struct TranscriptParser {
    classifications: Vec<ToolClassification>,
    sub_agent_tools: Vec<String>,
    chars_per_token: usize,
}

impl TranscriptParser {
    /// Create a parser with the default tool-classification table.
    pub fn new() -> Self {
        Self {
            classifications: DEFAULT_TOOL_CLASSIFICATIONS.to_vec(),
            sub_agent_tools: crate::config::IndexingConfig::default().sub_agent_tools,
            chars_per_token: 4,
        }
    }

    /// Create a parser from explicit configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            classifications: DEFAULT_TOOL_CLASSIFICATIONS.to_vec(),
            sub_agent_tools: config.indexing.sub_agent_tools.clone(),
            chars_per_token: config.indexing.chars_per_token,
        }
    }

    /// Replace the tool-classification table.
    pub fn with_classifications(mut self, table: Vec<ToolClassification>) -> Self {
        self.classifications = table;
        self
    }

    /// Parse one transcript file into a session plus parse statistics.
    ///
    /// Unreadable files and files matching neither known format are fatal
    /// for that file; everything else degrades to warnings in the stats.
    pub fn parse_file(&self, path: &Path) -> Result<(ParsedSession, ParseStats)> {
        let content = std::fs::read_to_string(path)?;
        let mtime = std::fs::metadata(path)
            .ok()
            .and_then(|m| m.modified().ok())
            .map(DateTime::<Utc>::from);
        let sidecar = discover::read_project_sidecar(path);

        self.parse_content(&content, path, mtime, sidecar)
    }

    /// Parse transcript content. Split out from [`Self::parse_file`] so
    /// tests can drive the parser without touching the filesystem.
    pub fn parse_content(
        &self,
        content: &str,
        path: &Path,
        mtime: Option<DateTime<Utc>>,
        sidecar: Option<ProjectSidecar>,
    ) -> Result<(ParsedSession, ParseStats)> {
        let session_id = discover::session_id_for_path(path);
        let mut builder = SessionBuilder::new(session_id, self);

        let lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();

        if is_line_delimited(&lines) {
            self.parse_line_delimited(&lines, &mut builder);
        } else {
            self.parse_whole_document(content, path, &mut builder)?;
        }

        Ok(builder.finish(path, mtime, sidecar))
    }

    /// Line-delimited mode: each line is a typed envelope.
    fn parse_line_delimited(&self, lines: &[&str], builder: &mut SessionBuilder) {
        for (idx, line) in lines.iter().enumerate() {
            let line_number = idx + 1;
            builder.stats.total_lines += 1;

            let envelope: RawEnvelope = match serde_json::from_str(line) {
                Ok(e) => e,
                Err(e) => {
                    builder.skip_line(format!("line {}: JSON parse error: {}", line_number, e));
                    continue;
                }
            };

            let timestamp = parse_timestamp(envelope.timestamp.as_deref());
            builder.observe_metadata(&envelope);

            match envelope.envelope_type.as_deref() {
                Some("summary") => {
                    if let Some(summary) = envelope.summary {
                        builder.summary = Some(summary);
                    }
                    builder.stats.parsed_lines += 1;
                }
                Some("file-history-snapshot") => {
                    // Workspace snapshots carry no conversational content
                    builder.stats.parsed_lines += 1;
                }
                Some("user") | Some("assistant") => {
                    let role = envelope.message.as_ref().and_then(|m| m.role.as_deref());
                    match role {
                        Some(role) => {
                            let role = role.to_string();
                            let content = envelope.message.as_ref().and_then(|m| m.content.as_ref());
                            let mut line_warnings = Vec::new();
                            builder.expand_message(&role, content, timestamp, &mut line_warnings);

                            if line_warnings.is_empty() {
                                builder.stats.parsed_lines += 1;
                            } else {
                                builder.skip_line(format!(
                                    "line {}: {}",
                                    line_number,
                                    line_warnings.join("; ")
                                ));
                            }
                        }
                        None => {
                            builder.skip_line(format!(
                                "line {}: {} envelope without message role",
                                line_number,
                                envelope.envelope_type.as_deref().unwrap_or("?")
                            ));
                        }
                    }
                }
                other => {
                    builder.skip_line(format!(
                        "line {}: unrecognized envelope type {:?}",
                        line_number,
                        other.unwrap_or("<missing>")
                    ));
                }
            }
        }
    }

    /// Whole-document mode: one JSON value holding an array of messages,
    /// either directly or under a `messages` field.
    fn parse_whole_document(
        &self,
        content: &str,
        path: &Path,
        builder: &mut SessionBuilder,
    ) -> Result<()> {
        let value: serde_json::Value =
            serde_json::from_str(content).map_err(|e| Error::Parse {
                path: path.display().to_string(),
                message: format!("neither line-delimited nor whole-document JSON: {}", e),
            })?;

        let records = match &value {
            serde_json::Value::Array(items) => items.clone(),
            serde_json::Value::Object(map) => match map.get("messages") {
                Some(serde_json::Value::Array(items)) => items.clone(),
                _ => {
                    return Err(Error::Parse {
                        path: path.display().to_string(),
                        message: "JSON document has no messages array".to_string(),
                    })
                }
            },
            _ => {
                return Err(Error::Parse {
                    path: path.display().to_string(),
                    message: "JSON document is neither an array nor an object".to_string(),
                })
            }
        };

        for (idx, raw) in records.into_iter().enumerate() {
            builder.stats.total_lines += 1;

            let record: RawWholeRecord = match serde_json::from_value(raw) {
                Ok(r) => r,
                Err(e) => {
                    builder.skip_line(format!("record {}: deserialization error: {}", idx, e));
                    continue;
                }
            };

            let role = match record.role {
                Some(r) => r,
                None => {
                    builder.skip_line(format!("record {}: message without role", idx));
                    continue;
                }
            };

            let timestamp = parse_timestamp(record.timestamp.as_deref());
            let mut line_warnings = Vec::new();
            builder.expand_message(&role, record.content.as_ref(), timestamp, &mut line_warnings);

            if line_warnings.is_empty() {
                builder.stats.parsed_lines += 1;
            } else {
                builder.skip_line(format!("record {}: {}", idx, line_warnings.join("; ")));
            }
        }

        Ok(())
    }
}

impl Default for TranscriptParser {
    fn default() -> Self {
        Self::new()
    }
}

/// At least two lines parsing as JSON objects with a `type` or `message`
/// field means a line-delimited event stream.
fn is_line_delimited(lines: &[&str]) -> bool {
    let mut typed = 0;
    for line in lines {
        if let Ok(serde_json::Value::Object(map)) = serde_json::from_str(line) {
            if map.contains_key("type") || map.contains_key("message") {
                typed += 1;
                if typed >= 2 {
                    return true;
                }
            }
        }
    }
    false
}

fn parse_timestamp(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Extract a plain-text rendering of a tool_result's `content` value,
/// which may be a string or an array of text blocks.
fn result_text(content: &serde_json::Value) -> String {
    match content {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Array(blocks) => blocks
            .iter()
            .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
            .collect::<Vec<_>>()
            .join("\n"),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

// ============================================
// Session accumulation
// ============================================

/// Accumulates events and derived facts as records are walked, then
/// assembles the final [`ParsedSession`].
struct SessionBuilder<'a> {
    parser: &'a TranscriptParser,
    session_id: String,
    seq: i64,
    events: Vec<Event>,
    tool_calls: Vec<ToolCall>,
    errors: Vec<ErrorRecord>,
    skill_invocations: Vec<SkillInvocation>,
    sub_agent_invocations: Vec<SubAgentInvocation>,
    /// tool_use_id -> index into `tool_calls`, for result correlation
    pending_calls: HashMap<String, usize>,
    summary: Option<String>,
    cwd: Option<String>,
    git_branch: Option<String>,
    first_timestamp: Option<DateTime<Utc>>,
    last_timestamp: Option<DateTime<Utc>>,
    stats: ParseStats,
}

impl<'a> SessionBuilder<'a> {
    fn new(session_id: String, parser: &'a TranscriptParser) -> Self {
        Self {
            parser,
            session_id,
            seq: 0,
            events: Vec::new(),
            tool_calls: Vec::new(),
            errors: Vec::new(),
            skill_invocations: Vec::new(),
            sub_agent_invocations: Vec::new(),
            pending_calls: HashMap::new(),
            summary: None,
            cwd: None,
            git_branch: None,
            first_timestamp: None,
            last_timestamp: None,
            stats: ParseStats::default(),
        }
    }

    fn skip_line(&mut self, warning: String) {
        self.stats.skipped_lines += 1;
        self.stats.warnings.push(warning);
    }

    /// Capture session-level metadata carried on envelopes.
    fn observe_metadata(&mut self, envelope: &RawEnvelope) {
        if self.cwd.is_none() {
            self.cwd = envelope.cwd.clone();
        }
        if self.git_branch.is_none() {
            self.git_branch = envelope.git_branch.clone();
        }
    }

    fn push_event(
        &mut self,
        event_type: EventType,
        timestamp: Option<DateTime<Utc>>,
        content: Option<String>,
    ) -> i64 {
        let seq = self.seq;
        self.seq += 1;

        if let Some(ts) = timestamp {
            if self.first_timestamp.is_none() {
                self.first_timestamp = Some(ts);
            }
            self.last_timestamp = Some(ts);
        }

        self.events.push(Event {
            session_id: self.session_id.clone(),
            seq,
            event_type,
            timestamp,
            content,
        });
        seq
    }

    /// Turn one message (string or block-array content) into events.
    ///
    /// Block-level problems are appended to `line_warnings`; sibling
    /// blocks are still processed.
    fn expand_message(
        &mut self,
        role: &str,
        content: Option<&RawContent>,
        timestamp: Option<DateTime<Utc>>,
        line_warnings: &mut Vec<String>,
    ) {
        let message_event_type = if role == "user" {
            EventType::UserMessage
        } else {
            EventType::AssistantMessage
        };

        match content {
            None => {
                self.push_event(message_event_type, timestamp, None);
            }
            Some(RawContent::Text(text)) => {
                self.push_event(message_event_type, timestamp, Some(text.clone()));
            }
            Some(RawContent::Blocks(blocks)) => {
                for (block_idx, raw_block) in blocks.iter().enumerate() {
                    match serde_json::from_value::<ContentBlock>(raw_block.clone()) {
                        Ok(block) => self.expand_block(block, block_idx, timestamp, line_warnings),
                        Err(e) => {
                            line_warnings
                                .push(format!("block {}: missing or invalid type: {}", block_idx, e));
                        }
                    }
                }
            }
        }
    }

    fn expand_block(
        &mut self,
        block: ContentBlock,
        block_idx: usize,
        timestamp: Option<DateTime<Utc>>,
        line_warnings: &mut Vec<String>,
    ) {
        match block {
            ContentBlock::Text { text } => {
                self.push_event(EventType::AssistantMessage, timestamp, Some(text));
            }
            ContentBlock::Thinking { thinking } => {
                self.push_event(EventType::Thinking, timestamp, Some(thinking));
            }
            ContentBlock::ToolUse { id, name, input } => {
                let name = match name {
                    Some(n) => n,
                    None => {
                        line_warnings
                            .push(format!("block {}: tool_use block missing name", block_idx));
                        return;
                    }
                };
                self.register_tool_use(id, name, input, timestamp);
            }
            ContentBlock::ToolResult {
                tool_use_id,
                content,
            } => {
                self.register_tool_result(tool_use_id, content, timestamp);
            }
            ContentBlock::Unknown => {
                line_warnings.push(format!("block {}: unrecognized block type", block_idx));
            }
        }
    }

    /// Emit the `tool_call` event, record the ToolCall, and derive any
    /// file/command/skill/sub-agent facts from the invocation.
    fn register_tool_use(
        &mut self,
        id: Option<String>,
        name: String,
        input: serde_json::Value,
        timestamp: Option<DateTime<Utc>>,
    ) {
        let event_seq = self.push_event(EventType::ToolCall, timestamp, Some(name.clone()));

        // Derived file/command event, by classification table
        if let Some(action) = extract::classify_tool(&self.parser.classifications, &name) {
            let derived_content = match action {
                extract::ToolAction::Execute => extract::command_parameter(&input),
                _ => extract::path_parameter(&input),
            };
            self.push_event(action.event_type(), timestamp, derived_content);
        }

        // Skill read?
        if let Some(skill) = extract::detect_skill(&self.parser.classifications, &name, &input) {
            self.skill_invocations.push(SkillInvocation {
                session_id: self.session_id.clone(),
                skill_name: skill.skill_name,
                category: skill.category,
                source_path: skill.source_path,
            });
        }

        // Sub-agent dispatch?
        if self.parser.sub_agent_tools.iter().any(|t| t == &name) {
            let (task, allowed_tools) = extract::sub_agent_parameters(&input);
            self.sub_agent_invocations.push(SubAgentInvocation {
                session_id: self.session_id.clone(),
                agent_tool: name.clone(),
                task,
                allowed_tools,
            });
        }

        let call_index = self.tool_calls.len();
        self.tool_calls.push(ToolCall {
            session_id: self.session_id.clone(),
            event_seq,
            tool_name: name,
            parameters: input,
            tool_use_id: id.clone(),
            result: None,
            success: true,
        });

        if let Some(id) = id {
            self.pending_calls.insert(id, call_index);
        }
    }

    /// Emit the `tool_result` event, correlate it back to its ToolCall,
    /// and scan the result text for error signatures.
    fn register_tool_result(
        &mut self,
        tool_use_id: Option<String>,
        content: serde_json::Value,
        timestamp: Option<DateTime<Utc>>,
    ) {
        let text = result_text(&content);
        let event_seq = self.push_event(EventType::ToolResult, timestamp, Some(text.clone()));

        let call_index = tool_use_id
            .as_deref()
            .and_then(|id| self.pending_calls.get(id).copied());

        if let Some(idx) = call_index {
            self.tool_calls[idx].result = Some(text.clone());
        }

        let matches = extract::scan_errors(&text);
        if !matches.is_empty() {
            if let Some(idx) = call_index {
                self.tool_calls[idx].success = false;
            }
            for (kind, excerpt) in matches {
                self.errors.push(ErrorRecord {
                    session_id: self.session_id.clone(),
                    event_seq,
                    tool_use_id: tool_use_id.clone(),
                    kind,
                    excerpt,
                    resolved: false,
                });
            }
        }
    }

    /// Compute derived statistics and assemble the final session.
    fn finish(
        self,
        path: &Path,
        mtime: Option<DateTime<Utc>>,
        sidecar: Option<ProjectSidecar>,
    ) -> (ParsedSession, ParseStats) {
        let sidecar = sidecar.unwrap_or_default();

        let project_path = sidecar
            .path
            .map(PathBuf::from)
            .or_else(|| self.cwd.as_ref().map(PathBuf::from))
            .or_else(|| discover::decode_project_dir(path));
        let project_name = sidecar
            .name
            .or_else(|| project_path.as_deref().and_then(discover::dir_name));
        let git_branch = sidecar.branch.or(self.git_branch);

        let plan_mode_count = extract::count_mode_marker(&self.events, "/plan");
        let compact_count = extract::count_mode_marker(&self.events, "/compact");
        let thinking_count = self
            .events
            .iter()
            .filter(|e| e.event_type == EventType::Thinking)
            .count() as i64;
        let sub_agent_count = self.sub_agent_invocations.len() as i64;

        let unresolved_errors = self.errors.iter().filter(|e| !e.resolved).count();
        let outcome = extract::infer_outcome(&self.events, unresolved_errors);

        let turn_count = self
            .events
            .iter()
            .filter(|e| e.event_type == EventType::UserMessage)
            .count() as i64;

        let started_at = self.first_timestamp.or(mtime);
        let ended_at = self.last_timestamp.or(mtime);

        let session = Session {
            id: self.session_id.clone(),
            source: SourceSystem::ClaudeCode,
            project_path,
            project_name,
            git_branch,
            git_user: sidecar.user,
            started_at,
            ended_at,
            turn_count,
            tool_call_count: self.tool_calls.len() as i64,
            error_count: self.errors.len() as i64,
            files_modified: extract::count_files_modified(&self.events),
            token_estimate: extract::estimate_tokens(&self.events, self.parser.chars_per_token),
            outcome,
            plan_mode_used: plan_mode_count > 0,
            thinking_used: thinking_count > 0,
            sub_agents_used: sub_agent_count > 0,
            primary_tools: extract::primary_tools(&self.tool_calls),
            summary: self.summary,
            file_path: path.display().to_string(),
        };

        let tool_sequences = extract::tool_sequences(&self.session_id, &self.tool_calls);

        let modes = SessionModes {
            session_id: self.session_id,
            plan_mode_count,
            compact_count,
            thinking_count,
            sub_agent_count,
        };

        let parsed = ParsedSession {
            session,
            events: self.events,
            tool_calls: self.tool_calls,
            errors: self.errors,
            skill_invocations: self.skill_invocations,
            sub_agent_invocations: self.sub_agent_invocations,
            tool_sequences,
            modes,
        };

        (parsed, self.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Outcome;

    fn parse(content: &str) -> (ParsedSession, ParseStats) {
        TranscriptParser::new()
            .parse_content(content, Path::new("/tmp/fixture.jsonl"), None, None)
            .expect("parse should succeed")
    }

    fn envelope(role: &str, text: &str) -> String {
        format!(
            r#"{{"type":"{role}","timestamp":"2026-05-01T10:00:00Z","message":{{"role":"{role}","content":"{text}"}}}}"#
        )
    }

    #[test]
    fn test_line_delimited_detection() {
        assert!(is_line_delimited(&[
            r#"{"type":"user"}"#,
            r#"{"message":{}}"#
        ]));
        assert!(!is_line_delimited(&[r#"{"type":"user"}"#]));
        assert!(!is_line_delimited(&[r#"{"role":"user"}"#, r#"{"a":1}"#]));
        assert!(!is_line_delimited(&["[1,2,3]", "not json"]));
    }

    #[test]
    fn test_parse_minimal_stream() {
        let content = format!("{}\n{}\n", envelope("user", "hello"), envelope("assistant", "hi"));
        let (parsed, stats) = parse(&content);

        assert_eq!(stats.total_lines, 2);
        assert_eq!(stats.parsed_lines, 2);
        assert_eq!(stats.skipped_lines, 0);
        assert!(stats.warnings.is_empty());

        assert_eq!(parsed.events.len(), 2);
        assert_eq!(parsed.events[0].event_type, EventType::UserMessage);
        assert_eq!(parsed.events[1].event_type, EventType::AssistantMessage);
        assert_eq!(parsed.session.turn_count, 1);
    }

    #[test]
    fn test_seq_contiguous_from_zero() {
        let content = [
            envelope("user", "one"),
            envelope("assistant", "two"),
            envelope("user", "three"),
        ]
        .join("\n");
        let (parsed, _) = parse(&content);

        for (i, event) in parsed.events.iter().enumerate() {
            assert_eq!(event.seq, i as i64);
        }
    }

    #[test]
    fn test_malformed_line_accounting() {
        let content = format!(
            "{}\nnot json at all\n{}\n{{\"type\":\"mystery\"}}\n",
            envelope("user", "hello"),
            envelope("assistant", "hi")
        );
        let (_, stats) = parse(&content);

        assert_eq!(stats.total_lines, 4);
        assert_eq!(stats.parsed_lines, 2);
        assert_eq!(stats.skipped_lines, 2);
        assert_eq!(stats.warnings.len(), 2);
        assert_eq!(stats.parsed_lines + stats.skipped_lines, stats.total_lines);
    }

    #[test]
    fn test_envelope_without_role_is_skipped() {
        let content = format!(
            "{}\n{{\"type\":\"user\",\"message\":{{}}}}\n",
            envelope("assistant", "hi")
        );
        let (parsed, stats) = parse(&content);

        assert_eq!(stats.skipped_lines, 1);
        assert_eq!(parsed.events.len(), 1);
    }

    #[test]
    fn test_summary_envelope_merges_metadata() {
        let content = format!(
            "{{\"type\":\"summary\",\"summary\":\"fixed the login bug\"}}\n{}\n{}\n",
            envelope("user", "hello"),
            envelope("assistant", "hi")
        );
        let (parsed, stats) = parse(&content);

        assert_eq!(parsed.session.summary.as_deref(), Some("fixed the login bug"));
        assert_eq!(stats.parsed_lines, 3);
        // Summary is metadata, not a message
        assert_eq!(parsed.events.len(), 2);
    }

    #[test]
    fn test_file_history_snapshot_discarded() {
        let content = format!(
            "{{\"type\":\"file-history-snapshot\",\"data\":{{}}}}\n{}\n{}\n",
            envelope("user", "hello"),
            envelope("assistant", "hi")
        );
        let (parsed, stats) = parse(&content);

        assert_eq!(stats.parsed_lines, 3);
        assert!(stats.warnings.is_empty());
        assert_eq!(parsed.events.len(), 2);
    }

    #[test]
    fn test_tool_use_and_result_correlation() {
        let content = format!(
            "{}\n{}\n{}\n",
            envelope("user", "run it"),
            r#"{"type":"assistant","message":{"role":"assistant","content":[{"type":"tool_use","id":"tu-1","name":"Bash","input":{"command":"cargo test"}}]}}"#,
            r#"{"type":"user","message":{"role":"user","content":[{"type":"tool_result","tool_use_id":"tu-1","content":"error[E0308]: mismatched types"}]}}"#,
        );
        let (parsed, stats) = parse(&content);

        assert!(stats.warnings.is_empty());
        assert_eq!(parsed.tool_calls.len(), 1);

        let call = &parsed.tool_calls[0];
        assert_eq!(call.tool_name, "Bash");
        assert!(call.result.as_deref().unwrap().contains("E0308"));
        assert!(!call.success, "error match should flip success");

        assert_eq!(parsed.errors.len(), 1);
        assert_eq!(parsed.errors[0].kind, crate::types::ErrorKind::RustCompiler);
        assert_eq!(parsed.errors[0].tool_use_id.as_deref(), Some("tu-1"));

        // tool_call event + derived command_execute + tool_result
        let types: Vec<EventType> = parsed.events.iter().map(|e| e.event_type).collect();
        assert!(types.contains(&EventType::ToolCall));
        assert!(types.contains(&EventType::CommandExecute));
        assert!(types.contains(&EventType::ToolResult));
    }

    #[test]
    fn test_successful_tool_keeps_default_success() {
        let content = format!(
            "{}\n{}\n{}\n",
            envelope("user", "read it"),
            r#"{"type":"assistant","message":{"role":"assistant","content":[{"type":"tool_use","id":"tu-2","name":"Read","input":{"file_path":"/src/main.rs"}}]}}"#,
            r#"{"type":"user","message":{"role":"user","content":[{"type":"tool_result","tool_use_id":"tu-2","content":"fn main() {}"}]}}"#,
        );
        let (parsed, _) = parse(&content);

        assert!(parsed.tool_calls[0].success);
        assert!(parsed.errors.is_empty());
    }

    #[test]
    fn test_nameless_tool_use_skipped_siblings_processed() {
        let content = format!(
            "{}\n{}\n",
            envelope("user", "go"),
            r#"{"type":"assistant","message":{"role":"assistant","content":[{"type":"tool_use","id":"tu-3","input":{}},{"type":"text","text":"still here"}]}}"#,
        );
        let (parsed, stats) = parse(&content);

        // The nameless block produced a warning and nothing else
        assert_eq!(stats.warnings.len(), 1);
        assert!(stats.warnings[0].contains("missing name"));
        assert!(parsed.tool_calls.is_empty());
        assert!(!parsed
            .events
            .iter()
            .any(|e| e.event_type == EventType::ToolCall));

        // The sibling text block still became an event
        assert!(parsed
            .events
            .iter()
            .any(|e| e.content.as_deref() == Some("still here")));
    }

    #[test]
    fn test_block_without_type_warns() {
        let content = format!(
            "{}\n{}\n",
            envelope("user", "go"),
            r#"{"type":"assistant","message":{"role":"assistant","content":[{"text":"no type field"},{"type":"text","text":"ok"}]}}"#,
        );
        let (parsed, stats) = parse(&content);

        assert_eq!(stats.skipped_lines, 1);
        assert!(parsed
            .events
            .iter()
            .any(|e| e.content.as_deref() == Some("ok")));
    }

    #[test]
    fn test_thinking_and_modes() {
        let content = format!(
            "{}\n{}\n{}\n",
            envelope("user", "let's /plan the refactor"),
            r#"{"type":"assistant","message":{"role":"assistant","content":[{"type":"thinking","thinking":"considering options"}]}}"#,
            envelope("user", "/compact please"),
        );
        let (parsed, _) = parse(&content);

        assert_eq!(parsed.modes.plan_mode_count, 1);
        assert_eq!(parsed.modes.compact_count, 1);
        assert_eq!(parsed.modes.thinking_count, 1);
        assert!(parsed.session.plan_mode_used);
        assert!(parsed.session.thinking_used);
        assert!(!parsed.session.sub_agents_used);
    }

    #[test]
    fn test_sub_agent_detection() {
        let content = format!(
            "{}\n{}\n",
            envelope("user", "delegate"),
            r#"{"type":"assistant","message":{"role":"assistant","content":[{"type":"tool_use","id":"tu-4","name":"Task","input":{"description":"explore the repo","allowed_tools":["Read"]}}]}}"#,
        );
        let (parsed, _) = parse(&content);

        assert_eq!(parsed.sub_agent_invocations.len(), 1);
        let inv = &parsed.sub_agent_invocations[0];
        assert_eq!(inv.agent_tool, "Task");
        assert_eq!(inv.task.as_deref(), Some("explore the repo"));
        assert!(parsed.session.sub_agents_used);
        assert_eq!(parsed.modes.sub_agent_count, 1);
    }

    #[test]
    fn test_skill_invocation_detection() {
        let content = format!(
            "{}\n{}\n",
            envelope("user", "use the skill"),
            r#"{"type":"assistant","message":{"role":"assistant","content":[{"type":"tool_use","id":"tu-5","name":"Read","input":{"file_path":"/home/u/skills/public/pdf-tools/SKILL.md"}}]}}"#,
        );
        let (parsed, _) = parse(&content);

        assert_eq!(parsed.skill_invocations.len(), 1);
        assert_eq!(parsed.skill_invocations[0].skill_name, "pdf-tools");
        assert_eq!(
            parsed.skill_invocations[0].category,
            crate::types::SkillCategory::Public
        );
    }

    #[test]
    fn test_outcome_success_with_commit() {
        let content = format!(
            "{}\n{}\n{}\n",
            envelope("user", "ship it"),
            r#"{"type":"assistant","message":{"role":"assistant","content":[{"type":"tool_use","id":"tu-6","name":"Bash","input":{"command":"git commit -m 'ship'"}}]}}"#,
            r#"{"type":"user","message":{"role":"user","content":[{"type":"tool_result","tool_use_id":"tu-6","content":"[main abc123] ship"}]}}"#,
        );
        let (parsed, _) = parse(&content);
        assert_eq!(parsed.session.outcome, Outcome::Success);
    }

    #[test]
    fn test_whole_document_array() {
        let content = r#"[
            {"role": "user", "content": "hello", "timestamp": "2026-05-01T10:00:00Z"},
            {"role": "assistant", "content": "hi there"}
        ]"#;
        let (parsed, stats) = parse(content);

        assert_eq!(stats.total_lines, 2);
        assert_eq!(stats.parsed_lines, 2);
        assert_eq!(parsed.events.len(), 2);
        assert_eq!(parsed.events[0].event_type, EventType::UserMessage);
    }

    #[test]
    fn test_whole_document_messages_field() {
        let content = r#"{"messages": [
            {"role": "user", "content": "hello"},
            {"role": "assistant", "content": [{"type": "text", "text": "hi"}]}
        ]}"#;
        let (parsed, stats) = parse(content);

        assert_eq!(stats.parsed_lines, 2);
        assert_eq!(parsed.events.len(), 2);
    }

    #[test]
    fn test_unrecognized_document_is_fatal() {
        let err = TranscriptParser::new()
            .parse_content("just some text", Path::new("/tmp/bad.txt"), None, None)
            .unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));

        let err = TranscriptParser::new()
            .parse_content(r#"{"no": "messages"}"#, Path::new("/tmp/bad.json"), None, None)
            .unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }

    #[test]
    fn test_session_metadata_from_envelope() {
        let content = format!(
            "{}\n{}\n",
            r#"{"type":"user","timestamp":"2026-05-01T10:00:00Z","cwd":"/home/u/dev/app","gitBranch":"main","message":{"role":"user","content":"hi"}}"#,
            envelope("assistant", "hello"),
        );
        let (parsed, _) = parse(&content);

        assert_eq!(
            parsed.session.project_path,
            Some(PathBuf::from("/home/u/dev/app"))
        );
        assert_eq!(parsed.session.project_name.as_deref(), Some("app"));
        assert_eq!(parsed.session.git_branch.as_deref(), Some("main"));
    }

    #[test]
    fn test_token_estimate_and_counts() {
        let content = format!(
            "{}\n{}\n",
            envelope("user", "12345678"),
            envelope("assistant", "1234")
        );
        let (parsed, _) = parse(&content);

        assert_eq!(parsed.session.token_estimate, 3);
        assert_eq!(parsed.session.turn_count, 1);
        assert_eq!(parsed.session.tool_call_count, 0);
    }
}

//! Core domain types for agent-insights
//!
//! These types represent one parsed coding-agent transcript: the session
//! aggregate, its ordered event timeline, and every fact derived from it
//! (tool calls, extracted errors, skill and sub-agent invocations, tool
//! sequences, mode counters).
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Session** | One transcript and its derived aggregate statistics |
//! | **Event** | One ordered, typed occurrence inside a session |
//! | **ToolCall** | A tool invocation and its eventual result/success outcome |
//! | **SkillInvocation** | A detected read of a recognized skill resource path |
//! | **SubAgentInvocation** | A detected delegation to a nested task/agent |
//! | **ToolSequence** | A bounded window of consecutive tool names |
//! | **Learning** | Retained knowledge extracted from sessions; outlives its source session |
//!
//! Sequence numbers are the sole ordering authority within a session:
//! wall-clock timestamps may collide or be absent, `seq` never does.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ============================================
// Source System
// ============================================

/// Which agent produced a transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceSystem {
    ClaudeCode,
}

impl SourceSystem {
    /// Returns the identifier used in database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceSystem::ClaudeCode => "claude_code",
        }
    }

    /// Returns the display name for this source
    pub fn display_name(&self) -> &'static str {
        match self {
            SourceSystem::ClaudeCode => "Claude Code",
        }
    }
}

impl std::fmt::Display for SourceSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SourceSystem {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "claude_code" | "ClaudeCode" => Ok(SourceSystem::ClaudeCode),
            _ => Err(format!("unknown source system: {}", s)),
        }
    }
}

// ============================================
// Outcome
// ============================================

/// Inferred result of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// A `git commit` ran and no unresolved errors remain
    Success,
    /// Some unresolved errors, but not enough to call it failed
    Partial,
    /// More than three unresolved errors
    Failure,
    /// Not enough signal to decide
    #[default]
    Unknown,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Partial => "partial",
            Outcome::Failure => "failure",
            Outcome::Unknown => "unknown",
        }
    }
}

impl std::str::FromStr for Outcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Outcome::Success),
            "partial" => Ok(Outcome::Partial),
            "failure" => Ok(Outcome::Failure),
            "unknown" => Ok(Outcome::Unknown),
            _ => Err(format!("unknown outcome: {}", s)),
        }
    }
}

// ============================================
// Session
// ============================================

/// One transcript's aggregate record.
///
/// `file_path` is unique and serves as the idempotency key for reindexing:
/// re-ingesting the same file requires deleting the prior session first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Unique identifier (derived deterministically from the file path)
    pub id: String,
    /// Which agent produced this transcript
    pub source: SourceSystem,
    /// Project root the session worked on (if known)
    pub project_path: Option<PathBuf>,
    /// Human-friendly project name
    pub project_name: Option<String>,
    /// Git branch at the time of the session (if recorded)
    pub git_branch: Option<String>,
    /// VCS user name (from the project sidecar, if present)
    pub git_user: Option<String>,
    /// When the session started
    pub started_at: Option<DateTime<Utc>>,
    /// When the session ended (last event timestamp)
    pub ended_at: Option<DateTime<Utc>>,
    /// Number of user turns
    pub turn_count: i64,
    /// Number of tool invocations
    pub tool_call_count: i64,
    /// Number of extracted errors
    pub error_count: i64,
    /// Distinct files written or created
    pub files_modified: i64,
    /// Rough token estimate (total text length / 4)
    pub token_estimate: i64,
    /// Inferred outcome
    pub outcome: Outcome,
    /// Whether plan mode was used
    pub plan_mode_used: bool,
    /// Whether extended thinking appeared
    pub thinking_used: bool,
    /// Whether sub-agents were dispatched
    pub sub_agents_used: bool,
    /// Top-3 tool names by invocation count
    pub primary_tools: Vec<String>,
    /// Session summary text (from a `summary` envelope, if present)
    pub summary: Option<String>,
    /// Source transcript path (unique, idempotency key)
    pub file_path: String,
}

// ============================================
// Event
// ============================================

/// Kind of event in the session timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    UserMessage,
    AssistantMessage,
    ToolCall,
    ToolResult,
    Thinking,
    FileRead,
    FileWrite,
    FileCreate,
    CommandExecute,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::UserMessage => "user_message",
            EventType::AssistantMessage => "assistant_message",
            EventType::ToolCall => "tool_call",
            EventType::ToolResult => "tool_result",
            EventType::Thinking => "thinking",
            EventType::FileRead => "file_read",
            EventType::FileWrite => "file_write",
            EventType::FileCreate => "file_create",
            EventType::CommandExecute => "command_execute",
        }
    }
}

impl std::str::FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user_message" => Ok(EventType::UserMessage),
            "assistant_message" => Ok(EventType::AssistantMessage),
            "tool_call" => Ok(EventType::ToolCall),
            "tool_result" => Ok(EventType::ToolResult),
            "thinking" => Ok(EventType::Thinking),
            "file_read" => Ok(EventType::FileRead),
            "file_write" => Ok(EventType::FileWrite),
            "file_create" => Ok(EventType::FileCreate),
            "command_execute" => Ok(EventType::CommandExecute),
            _ => Err(format!("unknown event type: {}", s)),
        }
    }
}

/// One timestamped, sequence-numbered occurrence within a session.
///
/// `seq` values are strictly increasing and contiguous from 0 within a
/// session; they define the total order of the timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Owning session
    pub session_id: String,
    /// Position in the timeline (contiguous from 0)
    pub seq: i64,
    /// Kind of occurrence
    pub event_type: EventType,
    /// Wall-clock timestamp, when the transcript recorded one
    pub timestamp: Option<DateTime<Utc>>,
    /// Textual content (message text, thinking text, command, file path, ...)
    pub content: Option<String>,
}

// ============================================
// Tool Calls
// ============================================

/// One tool invocation, owned by exactly one `tool_call` event.
///
/// `result` and `success` are populated later during parsing when the
/// matching `tool_result` arrives (correlated by `tool_use_id`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Owning session
    pub session_id: String,
    /// Seq of the owning `tool_call` event
    pub event_seq: i64,
    /// Tool name (e.g., "Read", "Bash")
    pub tool_name: String,
    /// Invocation parameters as recorded in the transcript
    pub parameters: serde_json::Value,
    /// Call-site identifier carried from invocation to result
    pub tool_use_id: Option<String>,
    /// Result text, once the correlated tool_result arrives
    pub result: Option<String>,
    /// False iff at least one error pattern matched the result text
    pub success: bool,
}

// ============================================
// Errors
// ============================================

/// Category of a pattern-matched error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Generic,
    Type,
    Syntax,
    Reference,
    Npm,
    RustCompiler,
    TestFailure,
    Exception,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Generic => "generic",
            ErrorKind::Type => "type",
            ErrorKind::Syntax => "syntax",
            ErrorKind::Reference => "reference",
            ErrorKind::Npm => "npm",
            ErrorKind::RustCompiler => "rust_compiler",
            ErrorKind::TestFailure => "test_failure",
            ErrorKind::Exception => "exception",
        }
    }
}

impl std::str::FromStr for ErrorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "generic" => Ok(ErrorKind::Generic),
            "type" => Ok(ErrorKind::Type),
            "syntax" => Ok(ErrorKind::Syntax),
            "reference" => Ok(ErrorKind::Reference),
            "npm" => Ok(ErrorKind::Npm),
            "rust_compiler" => Ok(ErrorKind::RustCompiler),
            "test_failure" => Ok(ErrorKind::TestFailure),
            "exception" => Ok(ErrorKind::Exception),
            _ => Err(format!("unknown error kind: {}", s)),
        }
    }
}

/// A pattern-matched error extracted from a tool result.
///
/// `resolved` is always false at ingestion; resolution is tracked by
/// higher layers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Owning session
    pub session_id: String,
    /// Seq of the `tool_result` event the error was found in
    pub event_seq: i64,
    /// Call-site id of the correlated tool call (if any)
    pub tool_use_id: Option<String>,
    /// Matched category
    pub kind: ErrorKind,
    /// Excerpt of the matching text
    pub excerpt: String,
    /// Whether the error was later resolved
    pub resolved: bool,
}

// ============================================
// Skills and Sub-agents
// ============================================

/// Where a skill lives within the skills root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillCategory {
    Public,
    User,
    Example,
}

impl SkillCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkillCategory::Public => "public",
            SkillCategory::User => "user",
            SkillCategory::Example => "example",
        }
    }
}

impl std::str::FromStr for SkillCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(SkillCategory::Public),
            "user" => Ok(SkillCategory::User),
            "example" => Ok(SkillCategory::Example),
            _ => Err(format!("unknown skill category: {}", s)),
        }
    }
}

/// A detected read of a recognized skill resource path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillInvocation {
    /// Owning session
    pub session_id: String,
    /// Skill name (directory or file stem under the skills root)
    pub skill_name: String,
    /// Category derived from the path segment after the skills root
    pub category: SkillCategory,
    /// Full path that was read
    pub source_path: String,
}

/// A detected delegation to a nested task/agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubAgentInvocation {
    /// Owning session
    pub session_id: String,
    /// The dispatching tool's name (e.g., "Task")
    pub agent_tool: String,
    /// Task description read from parameters
    pub task: Option<String>,
    /// Allowed-tool list read from parameters
    pub allowed_tools: Vec<String>,
}

// ============================================
// Tool Sequences and Modes
// ============================================

/// A bounded window (length 2..=5) of consecutive tool names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSequence {
    /// Owning session
    pub session_id: String,
    /// Arrow-joined tool names, e.g. "Read -> Edit -> Bash"
    pub sequence: String,
    /// Window length
    pub length: i64,
    /// AND of every constituent tool call's success
    pub all_succeeded: bool,
}

/// One-to-one aggregate of mode counters for a session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionModes {
    /// Owning session
    pub session_id: String,
    /// User messages containing a `/plan` marker
    pub plan_mode_count: i64,
    /// User messages containing a `/compact` marker
    pub compact_count: i64,
    /// Number of thinking events
    pub thinking_count: i64,
    /// Number of sub-agent invocations
    pub sub_agent_count: i64,
}

// ============================================
// Learnings
// ============================================

/// Retained knowledge extracted from sessions.
///
/// Learnings outlive the transcript that produced them: a forced reindex
/// clears their session link but never deletes them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Learning {
    /// Unique identifier
    pub id: String,
    /// Session the learning came from (nulled on reindex)
    pub session_id: Option<String>,
    /// The learning itself
    pub content: String,
    /// Kind of learning: "fix", "pattern", "antipattern", "convention", "preference"
    pub learning_type: String,
    /// Scope: "global", "project", "language"
    pub scope: String,
    /// Extraction confidence in [0,1]
    pub confidence: f64,
    /// Free-form tags
    pub tags: Vec<String>,
    /// Files the learning relates to
    pub related_files: Vec<String>,
    /// When the learning was recorded
    pub created_at: DateTime<Utc>,
}

impl Learning {
    /// Create a learning with a fresh ID, recorded now.
    pub fn new(content: impl Into<String>, learning_type: impl Into<String>, scope: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: None,
            content: content.into(),
            learning_type: learning_type.into(),
            scope: scope.into(),
            confidence: 0.5,
            tags: Vec::new(),
            related_files: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Attach the learning to the session it came from.
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

// ============================================
// Parse Aggregates
// ============================================

/// Everything extracted from one transcript, handed to the store as a unit.
#[derive(Debug, Clone)]
pub struct ParsedSession {
    pub session: Session,
    pub events: Vec<Event>,
    pub tool_calls: Vec<ToolCall>,
    pub errors: Vec<ErrorRecord>,
    pub skill_invocations: Vec<SkillInvocation>,
    pub sub_agent_invocations: Vec<SubAgentInvocation>,
    pub tool_sequences: Vec<ToolSequence>,
    pub modes: SessionModes,
}

/// Line accounting for one parse.
///
/// Invariant: `parsed_lines + skipped_lines == total_lines` for
/// line-delimited input, and `skipped_lines == warnings.len()`.
#[derive(Debug, Clone, Default)]
pub struct ParseStats {
    /// Non-empty lines seen (line-delimited) or records seen (whole-document)
    pub total_lines: usize,
    /// Lines/records that contributed to the session
    pub parsed_lines: usize,
    /// Lines/records rejected with a warning
    pub skipped_lines: usize,
    /// Human-readable warnings, one per skipped line/record
    pub warnings: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_outcome_round_trip() {
        for outcome in [
            Outcome::Success,
            Outcome::Partial,
            Outcome::Failure,
            Outcome::Unknown,
        ] {
            assert_eq!(Outcome::from_str(outcome.as_str()).unwrap(), outcome);
        }
    }

    #[test]
    fn test_event_type_round_trip() {
        for et in [
            EventType::UserMessage,
            EventType::AssistantMessage,
            EventType::ToolCall,
            EventType::ToolResult,
            EventType::Thinking,
            EventType::FileRead,
            EventType::FileWrite,
            EventType::FileCreate,
            EventType::CommandExecute,
        ] {
            assert_eq!(EventType::from_str(et.as_str()).unwrap(), et);
        }
    }

    #[test]
    fn test_error_kind_round_trip() {
        for kind in [
            ErrorKind::Generic,
            ErrorKind::Type,
            ErrorKind::Syntax,
            ErrorKind::Reference,
            ErrorKind::Npm,
            ErrorKind::RustCompiler,
            ErrorKind::TestFailure,
            ErrorKind::Exception,
        ] {
            assert_eq!(ErrorKind::from_str(kind.as_str()).unwrap(), kind);
        }
    }

    #[test]
    fn test_skill_category_round_trip() {
        for cat in [
            SkillCategory::Public,
            SkillCategory::User,
            SkillCategory::Example,
        ] {
            assert_eq!(SkillCategory::from_str(cat.as_str()).unwrap(), cat);
        }
    }

    #[test]
    fn test_learning_constructor() {
        let a = Learning::new("prefer thiserror for library errors", "convention", "global");
        let b = Learning::new("prefer thiserror for library errors", "convention", "global");
        assert_ne!(a.id, b.id);
        assert_eq!(a.session_id, None);

        let linked = a.with_session("sess-1");
        assert_eq!(linked.session_id.as_deref(), Some("sess-1"));
    }

    #[test]
    fn test_unknown_strings_rejected() {
        assert!(Outcome::from_str("great").is_err());
        assert!(EventType::from_str("telepathy").is_err());
        assert!(SourceSystem::from_str("cursor").is_err());
    }
}

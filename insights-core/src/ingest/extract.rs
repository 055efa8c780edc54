//! Feature extraction over reconstructed events
//!
//! Everything derived from a transcript beyond the raw timeline lives here:
//! tool classification, error-signature scanning, skill and sub-agent
//! detection, mode counters, token/file statistics, tool-call windows, and
//! the outcome decision rule.
//!
//! Classification is table-driven: [`DEFAULT_TOOL_CLASSIFICATIONS`] maps
//! tool names to file/command actions and can be swapped out wholesale, so
//! new tool names never require touching parser control flow.

use crate::types::{ErrorKind, Event, EventType, Outcome, SkillCategory, ToolCall, ToolSequence};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

/// Longest matched-text excerpt stored per error record.
const ERROR_EXCERPT_MAX: usize = 200;

/// Maximum tool-sequence window length.
const SEQUENCE_MAX_LEN: usize = 5;

// ============================================
// Tool classification
// ============================================

/// The file/command action a tool performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolAction {
    /// Reads a file (emits a `file_read` event)
    Read,
    /// Modifies an existing file (emits `file_write`)
    Write,
    /// Creates or overwrites a file (emits `file_create`)
    Create,
    /// Runs a shell command (emits `command_execute`)
    Execute,
}

impl ToolAction {
    /// The derived event type emitted for this action.
    pub fn event_type(&self) -> EventType {
        match self {
            ToolAction::Read => EventType::FileRead,
            ToolAction::Write => EventType::FileWrite,
            ToolAction::Create => EventType::FileCreate,
            ToolAction::Execute => EventType::CommandExecute,
        }
    }
}

/// One row of the tool-classification table.
#[derive(Debug, Clone, Copy)]
pub struct ToolClassification {
    /// Tool name as it appears in transcripts
    pub tool: &'static str,
    /// What the tool does to the filesystem/shell
    pub action: ToolAction,
}

/// Default classification table for Claude Code tools.
pub const DEFAULT_TOOL_CLASSIFICATIONS: &[ToolClassification] = &[
    ToolClassification {
        tool: "Read",
        action: ToolAction::Read,
    },
    ToolClassification {
        tool: "Edit",
        action: ToolAction::Write,
    },
    ToolClassification {
        tool: "MultiEdit",
        action: ToolAction::Write,
    },
    ToolClassification {
        tool: "NotebookEdit",
        action: ToolAction::Write,
    },
    ToolClassification {
        tool: "Write",
        action: ToolAction::Create,
    },
    ToolClassification {
        tool: "Bash",
        action: ToolAction::Execute,
    },
];

/// Look up a tool's action in a classification table.
pub fn classify_tool(table: &[ToolClassification], name: &str) -> Option<ToolAction> {
    table.iter().find(|c| c.tool == name).map(|c| c.action)
}

// ============================================
// Parameter access
// ============================================

/// Resolve the file-path parameter of a tool invocation.
///
/// Transcripts are inconsistent about the key name, so lookup follows a
/// fixed priority order: `path`, then `file_path`, then `filePath`. This
/// function is the single place that order is defined.
pub fn path_parameter(params: &serde_json::Value) -> Option<String> {
    for key in ["path", "file_path", "filePath"] {
        if let Some(v) = params.get(key).and_then(|v| v.as_str()) {
            return Some(v.to_string());
        }
    }
    None
}

/// Resolve the shell command of an execute-style invocation.
pub fn command_parameter(params: &serde_json::Value) -> Option<String> {
    params
        .get("command")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

// ============================================
// Error signatures
// ============================================

/// Ordered error-signature table.
///
/// Every pattern that matches a result text produces one ErrorRecord, so a
/// line matching several signatures is recorded once per signature.
static ERROR_SIGNATURES: Lazy<Vec<(ErrorKind, Regex)>> = Lazy::new(|| {
    vec![
        // \b keeps "TypeError:" et al. from also matching the generic form
        (ErrorKind::Generic, Regex::new(r"\bError:").unwrap()),
        (ErrorKind::Type, Regex::new(r"TypeError:").unwrap()),
        (ErrorKind::Syntax, Regex::new(r"SyntaxError:").unwrap()),
        (ErrorKind::Reference, Regex::new(r"ReferenceError:").unwrap()),
        (ErrorKind::Npm, Regex::new(r"npm ERR!").unwrap()),
        (
            ErrorKind::RustCompiler,
            Regex::new(r"error\[E\d+\]").unwrap(),
        ),
        (
            ErrorKind::TestFailure,
            Regex::new(r"(?im)(\btests?\s+failed\b|^fail(ed)?\b)").unwrap(),
        ),
        (ErrorKind::Exception, Regex::new(r"Exception:").unwrap()),
    ]
});

/// Scan a tool result's text against the signature table.
///
/// Returns one `(kind, excerpt)` per matching signature, in table order.
pub fn scan_errors(text: &str) -> Vec<(ErrorKind, String)> {
    let mut found = Vec::new();

    for (kind, pattern) in ERROR_SIGNATURES.iter() {
        if let Some(m) = pattern.find(text) {
            found.push((*kind, excerpt_around(text, m.start())));
        }
    }

    found
}

/// Take the line containing a match, truncated for storage.
fn excerpt_around(text: &str, match_start: usize) -> String {
    let line_start = text[..match_start].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let line_end = text[match_start..]
        .find('\n')
        .map(|i| match_start + i)
        .unwrap_or(text.len());

    let line = text[line_start..line_end].trim();
    let mut excerpt: String = line.chars().take(ERROR_EXCERPT_MAX).collect();
    if line.chars().count() > ERROR_EXCERPT_MAX {
        excerpt.push('…');
    }
    excerpt
}

// ============================================
// Skill detection
// ============================================

/// A detected skill read, before it is attached to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedSkill {
    pub skill_name: String,
    pub category: SkillCategory,
    pub source_path: String,
}

/// Detect a skill invocation: a read-style tool targeting a path under a
/// `skills` root. The category comes from the path segment following the
/// root: `/public/` reads are public skills, `/user/` reads are user
/// skills, anything else is an example.
pub fn detect_skill(
    table: &[ToolClassification],
    tool_name: &str,
    params: &serde_json::Value,
) -> Option<DetectedSkill> {
    if classify_tool(table, tool_name) != Some(ToolAction::Read) {
        return None;
    }

    let path = path_parameter(params)?;
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let skills_idx = segments.iter().position(|s| *s == "skills")?;

    let category = match segments.get(skills_idx + 1) {
        Some(&"public") => SkillCategory::Public,
        Some(&"user") => SkillCategory::User,
        _ => SkillCategory::Example,
    };

    // Skill name is the directory (or file stem) after the category segment,
    // falling back to whatever follows the skills root
    let name_idx = match category {
        SkillCategory::Example => skills_idx + 1,
        _ => skills_idx + 2,
    };
    let raw_name = segments.get(name_idx)?;
    let skill_name = raw_name
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(raw_name)
        .to_string();

    Some(DetectedSkill {
        skill_name,
        category,
        source_path: path,
    })
}

// ============================================
// Sub-agent detection
// ============================================

/// Read task description and allowed-tool list from a dispatch tool's
/// parameters. Both are optional in the wild.
pub fn sub_agent_parameters(params: &serde_json::Value) -> (Option<String>, Vec<String>) {
    let task = params
        .get("description")
        .or_else(|| params.get("prompt"))
        .or_else(|| params.get("task"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    let allowed_tools = params
        .get("allowed_tools")
        .or_else(|| params.get("allowedTools"))
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default();

    (task, allowed_tools)
}

// ============================================
// Derived statistics
// ============================================

/// Count user messages containing a case-insensitive marker (`/plan`,
/// `/compact`).
pub fn count_mode_marker(events: &[Event], marker: &str) -> i64 {
    let marker = marker.to_lowercase();
    events
        .iter()
        .filter(|e| e.event_type == EventType::UserMessage)
        .filter(|e| {
            e.content
                .as_deref()
                .map(|c| c.to_lowercase().contains(&marker))
                .unwrap_or(false)
        })
        .count() as i64
}

/// Token count estimated as total extracted text length over a fixed
/// divisor (default 4 chars per token).
pub fn estimate_tokens(events: &[Event], chars_per_token: usize) -> i64 {
    let total_chars: usize = events
        .iter()
        .filter_map(|e| e.content.as_deref())
        .map(|c| c.len())
        .sum();
    (total_chars / chars_per_token.max(1)) as i64
}

/// Distinct write/create target paths.
pub fn count_files_modified(events: &[Event]) -> i64 {
    let targets: HashSet<&str> = events
        .iter()
        .filter(|e| matches!(e.event_type, EventType::FileWrite | EventType::FileCreate))
        .filter_map(|e| e.content.as_deref())
        .collect();
    targets.len() as i64
}

/// Top-3 tool names by invocation count; ties keep first-encounter order.
pub fn primary_tools(tool_calls: &[ToolCall]) -> Vec<String> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for call in tool_calls {
        match counts.iter_mut().find(|(name, _)| *name == call.tool_name) {
            Some((_, n)) => *n += 1,
            None => counts.push((call.tool_name.clone(), 1)),
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts.into_iter().take(3).map(|(name, _)| name).collect()
}

/// Extract every window of 2..=5 consecutive tool calls, tagged with the
/// AND of constituent successes.
pub fn tool_sequences(session_id: &str, tool_calls: &[ToolCall]) -> Vec<ToolSequence> {
    let mut sequences = Vec::new();

    for start in 0..tool_calls.len() {
        for len in 2..=SEQUENCE_MAX_LEN {
            let end = start + len;
            if end > tool_calls.len() {
                break;
            }
            let window = &tool_calls[start..end];
            sequences.push(ToolSequence {
                session_id: session_id.to_string(),
                sequence: window
                    .iter()
                    .map(|c| c.tool_name.as_str())
                    .collect::<Vec<_>>()
                    .join(" -> "),
                length: len as i64,
                all_succeeded: window.iter().all(|c| c.success),
            });
        }
    }

    sequences
}

/// Infer the session outcome. Order matters:
///
/// 1. A `git commit` ran and no unresolved errors remain → success
/// 2. More than 3 unresolved errors → failure
/// 3. Any unresolved errors → partial
/// 4. Otherwise → unknown
pub fn infer_outcome(events: &[Event], unresolved_errors: usize) -> Outcome {
    let committed = events
        .iter()
        .filter(|e| e.event_type == EventType::CommandExecute)
        .filter_map(|e| e.content.as_deref())
        .any(|c| c.to_lowercase().contains("git commit"));

    if committed && unresolved_errors == 0 {
        Outcome::Success
    } else if unresolved_errors > 3 {
        Outcome::Failure
    } else if unresolved_errors > 0 {
        Outcome::Partial
    } else {
        Outcome::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(event_type: EventType, content: &str) -> Event {
        Event {
            session_id: "s".to_string(),
            seq: 0,
            event_type,
            timestamp: None,
            content: Some(content.to_string()),
        }
    }

    fn tool_call(name: &str, success: bool) -> ToolCall {
        ToolCall {
            session_id: "s".to_string(),
            event_seq: 0,
            tool_name: name.to_string(),
            parameters: json!({}),
            tool_use_id: None,
            result: None,
            success,
        }
    }

    #[test]
    fn test_classify_known_tools() {
        let table = DEFAULT_TOOL_CLASSIFICATIONS;
        assert_eq!(classify_tool(table, "Read"), Some(ToolAction::Read));
        assert_eq!(classify_tool(table, "Edit"), Some(ToolAction::Write));
        assert_eq!(classify_tool(table, "Write"), Some(ToolAction::Create));
        assert_eq!(classify_tool(table, "Bash"), Some(ToolAction::Execute));
        assert_eq!(classify_tool(table, "WebSearch"), None);
    }

    #[test]
    fn test_path_parameter_priority() {
        // "path" wins over both alternates
        let params = json!({"filePath": "c", "file_path": "b", "path": "a"});
        assert_eq!(path_parameter(&params), Some("a".to_string()));

        let params = json!({"filePath": "c", "file_path": "b"});
        assert_eq!(path_parameter(&params), Some("b".to_string()));

        let params = json!({"filePath": "c"});
        assert_eq!(path_parameter(&params), Some("c".to_string()));

        assert_eq!(path_parameter(&json!({})), None);
    }

    #[test]
    fn test_scan_errors_categories() {
        let hits = scan_errors("TypeError: x is not a function");
        let kinds: Vec<ErrorKind> = hits.iter().map(|(k, _)| *k).collect();
        assert_eq!(kinds, vec![ErrorKind::Type]);

        let hits = scan_errors("npm ERR! missing script: build");
        assert_eq!(hits[0].0, ErrorKind::Npm);

        let hits = scan_errors("error[E0308]: mismatched types");
        assert_eq!(hits[0].0, ErrorKind::RustCompiler);

        let hits = scan_errors("2 tests failed");
        assert_eq!(hits[0].0, ErrorKind::TestFailure);
    }

    #[test]
    fn test_scan_errors_generic_does_not_match_typed() {
        // "TypeError:" must not also match the generic "Error:" signature
        let hits = scan_errors("TypeError: boom");
        assert!(!hits.iter().any(|(k, _)| *k == ErrorKind::Generic));

        let hits = scan_errors("Error: boom");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, ErrorKind::Generic);
    }

    #[test]
    fn test_scan_errors_multiple_signatures() {
        // One record per matching signature, in table order
        let hits = scan_errors("Error: outer\nException: inner");
        let kinds: Vec<ErrorKind> = hits.iter().map(|(k, _)| *k).collect();
        assert_eq!(kinds, vec![ErrorKind::Generic, ErrorKind::Exception]);
    }

    #[test]
    fn test_scan_errors_clean_text() {
        assert!(scan_errors("All 42 tests passed").is_empty());
    }

    #[test]
    fn test_excerpt_is_single_line() {
        let hits = scan_errors("line one\nError: the bad line\nline three");
        assert_eq!(hits[0].1, "Error: the bad line");
    }

    #[test]
    fn test_detect_skill_categories() {
        let table = DEFAULT_TOOL_CLASSIFICATIONS;

        let skill = detect_skill(
            table,
            "Read",
            &json!({"file_path": "/home/u/skills/public/commit-helper/SKILL.md"}),
        )
        .unwrap();
        assert_eq!(skill.category, SkillCategory::Public);
        assert_eq!(skill.skill_name, "commit-helper");

        let skill = detect_skill(
            table,
            "Read",
            &json!({"file_path": "/home/u/skills/user/my-notes.md"}),
        )
        .unwrap();
        assert_eq!(skill.category, SkillCategory::User);
        assert_eq!(skill.skill_name, "my-notes");

        let skill = detect_skill(table, "Read", &json!({"path": "/opt/skills/demo.md"})).unwrap();
        assert_eq!(skill.category, SkillCategory::Example);
        assert_eq!(skill.skill_name, "demo");
    }

    #[test]
    fn test_detect_skill_requires_read_tool() {
        let table = DEFAULT_TOOL_CLASSIFICATIONS;
        assert!(detect_skill(
            table,
            "Bash",
            &json!({"path": "/home/u/skills/public/x/SKILL.md"})
        )
        .is_none());
        assert!(detect_skill(table, "Read", &json!({"file_path": "/src/main.rs"})).is_none());
    }

    #[test]
    fn test_sub_agent_parameters() {
        let (task, tools) = sub_agent_parameters(&json!({
            "description": "explore the repo",
            "allowed_tools": ["Read", "Grep"],
        }));
        assert_eq!(task.as_deref(), Some("explore the repo"));
        assert_eq!(tools, vec!["Read".to_string(), "Grep".to_string()]);

        let (task, tools) = sub_agent_parameters(&json!({"prompt": "do a thing"}));
        assert_eq!(task.as_deref(), Some("do a thing"));
        assert!(tools.is_empty());
    }

    #[test]
    fn test_count_mode_marker() {
        let events = vec![
            event(EventType::UserMessage, "please /PLAN this out"),
            event(EventType::UserMessage, "now /compact"),
            event(EventType::AssistantMessage, "/plan"), // not a user message
        ];
        assert_eq!(count_mode_marker(&events, "/plan"), 1);
        assert_eq!(count_mode_marker(&events, "/compact"), 1);
    }

    #[test]
    fn test_estimate_tokens() {
        let events = vec![
            event(EventType::UserMessage, "12345678"),
            event(EventType::AssistantMessage, "1234"),
        ];
        assert_eq!(estimate_tokens(&events, 4), 3);
    }

    #[test]
    fn test_count_files_modified_distinct() {
        let events = vec![
            event(EventType::FileWrite, "/a.rs"),
            event(EventType::FileWrite, "/a.rs"),
            event(EventType::FileCreate, "/b.rs"),
            event(EventType::FileRead, "/c.rs"),
        ];
        assert_eq!(count_files_modified(&events), 2);
    }

    #[test]
    fn test_primary_tools_top_three() {
        let calls = vec![
            tool_call("Read", true),
            tool_call("Read", true),
            tool_call("Read", true),
            tool_call("Edit", true),
            tool_call("Edit", true),
            tool_call("Bash", true),
            tool_call("Grep", true),
        ];
        assert_eq!(
            primary_tools(&calls),
            vec!["Read".to_string(), "Edit".to_string(), "Bash".to_string()]
        );
    }

    #[test]
    fn test_tool_sequences_windows() {
        let calls = vec![
            tool_call("Read", true),
            tool_call("Edit", true),
            tool_call("Bash", false),
        ];
        let seqs = tool_sequences("s", &calls);

        // Windows: [Read,Edit], [Read,Edit,Bash], [Edit,Bash]
        assert_eq!(seqs.len(), 3);
        assert_eq!(seqs[0].sequence, "Read -> Edit");
        assert!(seqs[0].all_succeeded);
        assert_eq!(seqs[1].sequence, "Read -> Edit -> Bash");
        assert!(!seqs[1].all_succeeded);
        assert_eq!(seqs[2].sequence, "Edit -> Bash");
        assert!(!seqs[2].all_succeeded);
    }

    #[test]
    fn test_tool_sequences_cap_at_five() {
        let calls: Vec<ToolCall> = (0..8).map(|_| tool_call("Read", true)).collect();
        let seqs = tool_sequences("s", &calls);
        assert!(seqs.iter().all(|s| s.length <= 5 && s.length >= 2));
    }

    #[test]
    fn test_infer_outcome_decision_table() {
        let commit = vec![event(EventType::CommandExecute, "git commit -m 'done'")];
        let no_commit = vec![event(EventType::CommandExecute, "cargo build")];

        assert_eq!(infer_outcome(&commit, 0), Outcome::Success);
        assert_eq!(infer_outcome(&no_commit, 4), Outcome::Failure);
        assert_eq!(infer_outcome(&no_commit, 2), Outcome::Partial);
        assert_eq!(infer_outcome(&no_commit, 0), Outcome::Unknown);

        // Commit with errors is not a success
        assert_eq!(infer_outcome(&commit, 2), Outcome::Partial);
        assert_eq!(infer_outcome(&commit, 5), Outcome::Failure);
    }

    #[test]
    fn test_infer_outcome_commit_case_insensitive() {
        let events = vec![event(EventType::CommandExecute, "GIT COMMIT --amend")];
        assert_eq!(infer_outcome(&events, 0), Outcome::Success);
    }
}

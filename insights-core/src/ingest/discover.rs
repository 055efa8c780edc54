//! Transcript file discovery
//!
//! Transcripts are discovered with glob patterns over a source root, one
//! pattern per known storage layout. For Claude Code that layout is
//! `projects/<encoded-path>/<session>.jsonl` under `~/.claude`.
//!
//! A project may place an optional `project.json` sidecar next to its
//! transcripts; when present it supplies project metadata the transcript
//! itself lacks.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::types::SourceSystem;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Glob patterns (relative to the source root) for each known layout.
const SOURCE_PATTERNS: &[&str] = &["projects/*/*.jsonl"];

/// Reference to one discovered transcript file.
#[derive(Debug, Clone)]
pub struct SessionFileRef {
    /// Absolute path to the transcript
    pub path: PathBuf,
    /// Which agent's layout it was found under
    pub source: SourceSystem,
}

/// Project metadata sidecar (`project.json`), optionally present alongside
/// a project's transcripts.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ProjectSidecar {
    /// Project root path
    pub path: Option<String>,
    /// Human-friendly project name
    pub name: Option<String>,
    /// Git branch
    pub branch: Option<String>,
    /// VCS user name
    pub user: Option<String>,
}

/// Discover all transcript files for the configured sources.
///
/// Returns absolute paths. A missing source root yields an empty list,
/// not an error.
pub fn discover(config: &Config) -> Result<Vec<SessionFileRef>> {
    let root = config.claude_code_root();
    if !root.exists() {
        tracing::debug!(root = %root.display(), "Source root not present, skipping");
        return Ok(vec![]);
    }

    let mut files = Vec::new();

    for pattern in SOURCE_PATTERNS {
        let full_pattern = root.join(pattern);
        let pattern_str = full_pattern.to_string_lossy();

        let entries = glob::glob(&pattern_str).map_err(|e| Error::Parse {
            path: root.display().to_string(),
            message: format!("Invalid glob pattern: {}", e),
        })?;

        for entry in entries.flatten() {
            files.push(SessionFileRef {
                path: entry,
                source: SourceSystem::ClaudeCode,
            });
        }
    }

    tracing::info!(count = files.len(), root = %root.display(), "Discovered transcript files");
    Ok(files)
}

/// Read the `project.json` sidecar from a transcript's directory, if present.
///
/// Sidecar read failures are logged and treated as absence; the sidecar is
/// advisory metadata, never required.
pub fn read_project_sidecar(transcript_path: &Path) -> Option<ProjectSidecar> {
    let sidecar_path = transcript_path.parent()?.join("project.json");
    if !sidecar_path.exists() {
        return None;
    }

    let content = match std::fs::read_to_string(&sidecar_path) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(path = %sidecar_path.display(), error = %e, "Failed to read project sidecar");
            return None;
        }
    };

    match serde_json::from_str(&content) {
        Ok(sidecar) => Some(sidecar),
        Err(e) => {
            tracing::warn!(path = %sidecar_path.display(), error = %e, "Malformed project sidecar");
            None
        }
    }
}

/// Deterministic session ID derived from the transcript path.
///
/// Stable across reindexing: the same file always maps to the same id.
pub fn session_id_for_path(path: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.to_string_lossy().as_bytes());
    let hash = hasher.finalize();
    format!("{:x}", hash)[..16].to_string()
}

/// Decode the project path encoded into a Claude Code project directory
/// name (`-home-user-dev-myproject` → `/home/user/dev/myproject`).
pub fn decode_project_dir(transcript_path: &Path) -> Option<PathBuf> {
    let folder_name = transcript_path.parent()?.file_name()?.to_str()?;
    if !folder_name.starts_with('-') {
        return None;
    }
    let decoded = folder_name.replacen('-', "/", 1).replace('-', "/");
    Some(PathBuf::from(decoded))
}

/// Directory name of a path, for use as a project name.
pub fn dir_name(path: &Path) -> Option<String> {
    path.file_name()
        .and_then(|s| s.to_str())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_is_stable() {
        let a = session_id_for_path(Path::new("/tmp/x.jsonl"));
        let b = session_id_for_path(Path::new("/tmp/x.jsonl"));
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);

        let c = session_id_for_path(Path::new("/tmp/y.jsonl"));
        assert_ne!(a, c);
    }

    #[test]
    fn test_decode_project_dir() {
        let path = Path::new("/home/u/.claude/projects/-home-u-dev-myproject/abc.jsonl");
        assert_eq!(
            decode_project_dir(path),
            Some(PathBuf::from("/home/u/dev/myproject"))
        );

        let path = Path::new("/home/u/.claude/projects/plain/abc.jsonl");
        assert_eq!(decode_project_dir(path), None);
    }

    #[test]
    fn test_discover_missing_root() {
        let mut config = Config::default();
        config.sources.claude_code_path = Some(PathBuf::from("/nonexistent/nowhere"));
        let files = discover(&config).unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn test_discover_finds_jsonl() {
        let tmp = tempfile::TempDir::new().unwrap();
        let project_dir = tmp.path().join("projects/-home-u-dev-app");
        std::fs::create_dir_all(&project_dir).unwrap();
        std::fs::write(project_dir.join("session-1.jsonl"), "{}\n").unwrap();
        std::fs::write(project_dir.join("notes.txt"), "ignored").unwrap();

        let mut config = Config::default();
        config.sources.claude_code_path = Some(tmp.path().to_path_buf());

        let files = discover(&config).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].path.ends_with("session-1.jsonl"));
        assert_eq!(files[0].source, SourceSystem::ClaudeCode);
    }

    #[test]
    fn test_read_project_sidecar() {
        let tmp = tempfile::TempDir::new().unwrap();
        let transcript = tmp.path().join("abc.jsonl");
        std::fs::write(&transcript, "").unwrap();
        std::fs::write(
            tmp.path().join("project.json"),
            r#"{"path": "/home/u/dev/app", "name": "app", "branch": "main", "user": "u"}"#,
        )
        .unwrap();

        let sidecar = read_project_sidecar(&transcript).unwrap();
        assert_eq!(sidecar.name.as_deref(), Some("app"));
        assert_eq!(sidecar.branch.as_deref(), Some("main"));
        assert_eq!(sidecar.user.as_deref(), Some("u"));
    }

    #[test]
    fn test_malformed_sidecar_treated_as_absent() {
        let tmp = tempfile::TempDir::new().unwrap();
        let transcript = tmp.path().join("abc.jsonl");
        std::fs::write(&transcript, "").unwrap();
        std::fs::write(tmp.path().join("project.json"), "not json at all").unwrap();

        assert!(read_project_sidecar(&transcript).is_none());
    }
}

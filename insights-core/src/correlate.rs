//! Session-to-commit correlation scoring.
//!
//! Given a session's end time and the files it touched, and a commit's
//! time and changed files, [`score`] produces a confidence in [0, 1]:
//!
//! - 40% time proximity: full credit at zero distance, decaying linearly
//!   to nothing at two hours.
//! - 60% file overlap: the fraction of the commit's files that match a
//!   session file, where "match" is substring containment in either
//!   direction (transcripts often record absolute paths while commits
//!   record repo-relative ones).
//!
//! Scoring never fails: unparseable timestamps yield confidence 0.

use chrono::{DateTime, Utc};

/// Minimum score a commit must exceed to be accepted as a match.
pub const MATCH_THRESHOLD: f64 = 0.3;

/// Time proximity decays to zero over this many hours.
const TIME_DECAY_HOURS: f64 = 2.0;

const TIME_WEIGHT: f64 = 0.4;
const FILE_WEIGHT: f64 = 0.6;

/// A commit as seen by the correlator.
#[derive(Debug, Clone)]
pub struct CommitInfo {
    /// Commit hash
    pub hash: String,
    /// Commit time, RFC 3339
    pub timestamp: String,
    /// First line of the commit message
    pub message: String,
    /// Files changed by the commit
    pub files: Vec<String>,
}

/// Scored correlation between a session and one commit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Correlation {
    /// Combined confidence in [0, 1]
    pub confidence: f64,
    /// Commit files that matched a session file
    pub common_files: Vec<String>,
}

/// Best accepted match for a session among candidate commits.
#[derive(Debug, Clone)]
pub struct CommitMatch {
    /// Hash of the winning commit
    pub commit_hash: String,
    /// Its correlation score
    pub correlation: Correlation,
}

/// Score how likely a commit belongs to a session.
///
/// Timestamps are RFC 3339 strings as they appear in transcripts and
/// `git log` output; if either fails to parse, the result is a zero
/// correlation rather than an error.
pub fn score(
    session_end: &str,
    commit_time: &str,
    session_files: &[String],
    commit_files: &[String],
) -> Correlation {
    let (session_ts, commit_ts) = match (parse_ts(session_end), parse_ts(commit_time)) {
        (Some(s), Some(c)) => (s, c),
        _ => return Correlation::default(),
    };

    let hours = (commit_ts - session_ts).num_seconds().abs() as f64 / 3600.0;
    let time_score = (1.0 - hours / TIME_DECAY_HOURS).max(0.0);

    let common_files: Vec<String> = commit_files
        .iter()
        .filter(|cf| session_files.iter().any(|sf| files_overlap(sf, cf)))
        .cloned()
        .collect();

    let file_score = if commit_files.is_empty() {
        0.0
    } else {
        common_files.len() as f64 / commit_files.len() as f64
    };

    Correlation {
        confidence: TIME_WEIGHT * time_score + FILE_WEIGHT * file_score,
        common_files,
    }
}

/// Pick the commit that best explains a session.
///
/// Only commits scoring strictly above [`MATCH_THRESHOLD`] are eligible;
/// among those, the strictly highest score wins, with ties resolved in
/// favor of the first candidate encountered. Returns `None` when no
/// commit clears the threshold.
pub fn best_match(
    session_end: &str,
    session_files: &[String],
    candidates: &[CommitInfo],
) -> Option<CommitMatch> {
    let mut best: Option<CommitMatch> = None;

    for commit in candidates {
        let correlation = score(session_end, &commit.timestamp, session_files, &commit.files);
        if correlation.confidence <= MATCH_THRESHOLD {
            continue;
        }
        let better = match &best {
            Some(current) => correlation.confidence > current.correlation.confidence,
            None => true,
        };
        if better {
            best = Some(CommitMatch {
                commit_hash: commit.hash.clone(),
                correlation,
            });
        }
    }

    best
}

/// Two paths refer to the same file when either is a substring of the
/// other. Covers absolute-vs-relative recordings of the same path.
fn files_overlap(a: &str, b: &str) -> bool {
    !a.is_empty() && !b.is_empty() && (a.contains(b) || b.contains(a))
}

fn parse_ts(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

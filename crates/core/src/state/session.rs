//! # Session Records
//!
//! The persisted record of one pipeline run and the read-side views built
//! from it.

use crate::orchestrator::pipeline::{SessionStatus, Stage};
use crate::skills::plagiarism_skill::PlagiarismReport;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Severity of a session log line
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "warn" => Self::Warn,
            "error" => Self::Error,
            _ => Self::Info,
        }
    }
}

/// One timestamped line of a session's progress log
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogEntry {
    /// 1-based position within the session log
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

/// Persisted output of one stage
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageOutput {
    pub text: String,
    /// Stage-specific remarks (the Editor's edit summary, for example)
    #[serde(default)]
    pub notes: Vec<String>,
    pub duration_ms: u64,
    /// Attempts used, including the successful one
    pub attempts: u32,
    /// Whether the text came from the offline generator
    #[serde(default)]
    pub fallback: bool,
    pub completed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plagiarism: Option<PlagiarismReport>,
}

/// Failure cause of a FAILED session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionError {
    /// Stage name, or `pipeline` for failures outside any stage
    pub stage: String,
    pub message: String,
}

/// Timing and size figures for a completed run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct RunMetrics {
    /// Sum of stage durations
    pub total_ms: u64,
    pub findings: usize,
    pub draft_chars: usize,
    pub edited_chars: usize,
    /// Stages whose text came from the offline generator
    #[serde(default)]
    pub fallback_stages: Vec<Stage>,
}

/// The final artifact of a COMPLETED session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaperReport {
    pub title: String,
    pub research: String,
    pub draft: String,
    pub edited: String,
    pub edit_summary: Vec<String>,
    pub plagiarism: PlagiarismReport,
    pub metrics: RunMetrics,
}

/// Full record of one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub session_id: String,
    pub title: String,
    pub status: SessionStatus,
    pub log: Vec<LogEntry>,
    pub stage_outputs: BTreeMap<Stage, StageOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<PaperReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<SessionError>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn output(&self, stage: Stage) -> Option<&StageOutput> {
        self.stage_outputs.get(&stage)
    }

    /// Stage names present in `stage_outputs`, in canonical order
    pub fn completed_stages(&self) -> Vec<Stage> {
        self.stage_outputs.keys().copied().collect()
    }

    /// Last `n` log entries
    pub fn log_tail(&self, n: usize) -> &[LogEntry] {
        let start = self.log.len().saturating_sub(n);
        &self.log[start..]
    }
}

/// Short listing entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionSummary {
    pub session_id: String,
    pub title: String,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result or error of a session as seen by a polling caller
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Outcome {
    InProgress { completed_stages: Vec<Stage> },
    Completed { result: PaperReport },
    Failed { error: SessionError },
}

/// What `get_status` returns
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusView {
    pub session_id: String,
    pub title: String,
    pub status: SessionStatus,
    pub log_tail: Vec<LogEntry>,
    pub outcome: Outcome,
}

impl StatusView {
    pub fn from_session(session: &Session, tail: usize) -> Self {
        let outcome = match (&session.status, &session.result, &session.error) {
            (SessionStatus::Completed, Some(result), _) => Outcome::Completed {
                result: result.clone(),
            },
            (SessionStatus::Failed, _, Some(error)) => Outcome::Failed {
                error: error.clone(),
            },
            _ => Outcome::InProgress {
                completed_stages: session.completed_stages(),
            },
        };
        Self {
            session_id: session.session_id.clone(),
            title: session.title.clone(),
            status: session.status,
            log_tail: session.log_tail(tail).to_vec(),
            outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(text: &str) -> StageOutput {
        StageOutput {
            text: text.to_string(),
            notes: Vec::new(),
            duration_ms: 3,
            attempts: 1,
            fallback: false,
            completed_at: Utc::now(),
            plagiarism: None,
        }
    }

    fn session() -> Session {
        let now = Utc::now();
        Session {
            session_id: "s-1".to_string(),
            title: "Title".to_string(),
            status: SessionStatus::StageWriter,
            log: (1..=5)
                .map(|seq| LogEntry {
                    seq,
                    timestamp: now,
                    level: LogLevel::Info,
                    message: format!("line {seq}"),
                })
                .collect(),
            stage_outputs: BTreeMap::new(),
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_stage_outputs_serialize_in_canonical_order() {
        let mut session = session();
        session.stage_outputs.insert(Stage::Writer, output("draft"));
        session.stage_outputs.insert(Stage::Research, output("- finding"));

        let json = serde_json::to_string(&session).unwrap();
        let research = json.find("\"research\"").unwrap();
        let writer = json.find("\"writer\"").unwrap();
        assert!(research < writer);
        assert!(!json.contains("\"result\""));
        assert_eq!(session.completed_stages(), vec![Stage::Research, Stage::Writer]);
    }

    #[test]
    fn test_log_tail() {
        let session = session();
        let tail = session.log_tail(2);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[1].message, "line 5");
        assert_eq!(session.log_tail(50).len(), 5);
    }

    #[test]
    fn test_status_view_in_progress() {
        let mut session = session();
        session.stage_outputs.insert(Stage::Research, output("- finding"));
        let view = StatusView::from_session(&session, 3);
        assert_eq!(view.log_tail.len(), 3);
        assert_eq!(
            view.outcome,
            Outcome::InProgress {
                completed_stages: vec![Stage::Research]
            }
        );
    }

    #[test]
    fn test_status_view_failed() {
        let mut session = session();
        session.status = SessionStatus::Failed;
        session.error = Some(SessionError {
            stage: "writer".to_string(),
            message: "boom".to_string(),
        });
        let view = StatusView::from_session(&session, 10);
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["outcome"]["state"], "failed");
        assert_eq!(json["outcome"]["error"]["stage"], "writer");
    }
}

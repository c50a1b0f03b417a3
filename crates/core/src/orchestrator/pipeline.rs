//! # Pipeline Stages
//!
//! Defines the stages of the paper pipeline and the session state machine.
//!
//! ```text
//! PENDING → RUNNING → STAGE_RESEARCH → STAGE_WRITER → STAGE_EDITOR → STAGE_PLAGIARISM → COMPLETED
//!    └──────────┴──────────────┴───────────────┴──────────────┴───────────────┴──────→ FAILED
//! ```
//!
//! A `STAGE_*` status means that stage's output has been persisted.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stage of the pipeline, in canonical order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Bullet findings for the title
    Research,
    /// Full draft with research appendix
    Writer,
    /// Section-preserving revision
    Editor,
    /// Similarity screening against the research text
    Plagiarism,
}

impl Stage {
    /// Canonical execution order
    pub const ALL: [Stage; 4] = [Stage::Research, Stage::Writer, Stage::Editor, Stage::Plagiarism];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Research => "research",
            Self::Writer => "writer",
            Self::Editor => "editor",
            Self::Plagiarism => "plagiarism",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "research" => Some(Self::Research),
            "writer" => Some(Self::Writer),
            "editor" => Some(Self::Editor),
            "plagiarism" => Some(Self::Plagiarism),
            _ => None,
        }
    }

    /// Position in the canonical order
    pub fn index(&self) -> usize {
        match self {
            Self::Research => 0,
            Self::Writer => 1,
            Self::Editor => 2,
            Self::Plagiarism => 3,
        }
    }

    /// The stage that follows this one
    pub fn next(&self) -> Option<Stage> {
        Self::ALL.get(self.index() + 1).copied()
    }

    /// Status recorded once this stage's output is persisted
    pub fn completed_status(&self) -> SessionStatus {
        match self {
            Self::Research => SessionStatus::StageResearch,
            Self::Writer => SessionStatus::StageWriter,
            Self::Editor => SessionStatus::StageEditor,
            Self::Plagiarism => SessionStatus::StagePlagiarism,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    #[default]
    Pending,
    Running,
    StageResearch,
    StageWriter,
    StageEditor,
    StagePlagiarism,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::StageResearch => "STAGE_RESEARCH",
            Self::StageWriter => "STAGE_WRITER",
            Self::StageEditor => "STAGE_EDITOR",
            Self::StagePlagiarism => "STAGE_PLAGIARISM",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "RUNNING" => Some(Self::Running),
            "STAGE_RESEARCH" => Some(Self::StageResearch),
            "STAGE_WRITER" => Some(Self::StageWriter),
            "STAGE_EDITOR" => Some(Self::StageEditor),
            "STAGE_PLAGIARISM" => Some(Self::StagePlagiarism),
            "COMPLETED" => Some(Self::Completed),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Check if the session can no longer change
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Number of stages whose output is persisted
    pub fn completed_stages(&self) -> usize {
        match self {
            Self::Pending | Self::Running | Self::Failed => 0,
            Self::StageResearch => 1,
            Self::StageWriter => 2,
            Self::StageEditor => 3,
            Self::StagePlagiarism | Self::Completed => 4,
        }
    }

    /// The stage expected to run next, if the session is between stages
    pub fn next_stage(&self) -> Option<Stage> {
        match self {
            Self::Running => Some(Stage::Research),
            Self::StageResearch => Some(Stage::Writer),
            Self::StageWriter => Some(Stage::Editor),
            Self::StageEditor => Some(Stage::Plagiarism),
            Self::Pending | Self::StagePlagiarism | Self::Completed | Self::Failed => None,
        }
    }

    /// Whether every stage has been persisted and completion is the only step left
    pub fn ready_to_complete(&self) -> bool {
        *self == Self::StagePlagiarism
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order() {
        let mut stage = Stage::Research;
        let mut seen = vec![stage];
        while let Some(next) = stage.next() {
            seen.push(next);
            stage = next;
        }
        assert_eq!(seen, Stage::ALL.to_vec());
    }

    #[test]
    fn test_status_walks_the_stages() {
        let mut status = SessionStatus::Running;
        for stage in Stage::ALL {
            assert_eq!(status.next_stage(), Some(stage));
            status = stage.completed_status();
            assert_eq!(status.completed_stages(), stage.index() + 1);
        }
        assert!(status.ready_to_complete());
        assert_eq!(status.next_stage(), None);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(SessionStatus::Completed.is_terminal());
        assert!(SessionStatus::Failed.is_terminal());
        assert!(!SessionStatus::StageEditor.is_terminal());
        assert_eq!(SessionStatus::Pending.next_stage(), None);
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&SessionStatus::StagePlagiarism).unwrap();
        assert_eq!(json, "\"STAGE_PLAGIARISM\"");
        for status in [SessionStatus::Pending, SessionStatus::Running, SessionStatus::Failed] {
            assert_eq!(SessionStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(Stage::parse("editor"), Some(Stage::Editor));
        assert_eq!(serde_json::to_string(&Stage::Writer).unwrap(), "\"writer\"");
    }
}

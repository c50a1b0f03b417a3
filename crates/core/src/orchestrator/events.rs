//! # Pipeline Events
//!
//! Progress notifications broadcast by the orchestrator. Receivers that lag
//! lose events; the session log in the store stays authoritative.

use super::pipeline::Stage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of pipeline event
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PipelineEventKind {
    /// Session picked up by a worker
    SessionStarted,
    /// Stage attempt began
    StageStarted,
    /// Stage attempt failed transiently, another attempt follows
    StageRetrying,
    /// Stage output persisted
    StageCompleted,
    SessionCompleted,
    SessionFailed,
    /// Cancellation acknowledged (the session is FAILED with "cancelled")
    SessionCancelled,
}

impl PipelineEventKind {
    /// Whether no further events follow for the session
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::SessionCompleted | Self::SessionFailed | Self::SessionCancelled
        )
    }
}

/// An event in the pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineEvent {
    /// Unique event ID
    pub id: String,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub kind: PipelineEventKind,
    /// Stage the event refers to, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    /// Associated data (JSON)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl PipelineEvent {
    /// Create a new event
    pub fn new(kind: PipelineEventKind, session_id: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            timestamp: Utc::now(),
            kind,
            stage: None,
            data: None,
        }
    }

    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stage = Some(stage);
        self
    }

    /// Add data to the event
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

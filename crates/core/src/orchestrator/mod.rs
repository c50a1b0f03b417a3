//! # Orchestrator
//!
//! Session state machine, progress events and the coordinator that runs
//! sessions through the stage agents.

pub mod coordinator;
pub mod events;
pub mod pipeline;

pub use coordinator::{Orchestrator, PipelineError, PIPELINE_STAGE};
pub use events::{PipelineEvent, PipelineEventKind};
pub use pipeline::{SessionStatus, Stage};

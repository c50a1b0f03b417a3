//! # Paperflow Skills
//!
//! The stage agents of the paper pipeline.
//!
//! ## Architecture
//!
//! ```text
//! Orchestrator
//!   └── StageAgent (one per stage, run in canonical order)
//!         └── TextGenerationClient (live or offline)
//! ```
//!
//! ## Stages
//!
//! - `ResearcherSkill` - Bullet findings for a title
//! - `WriterSkill` - IMRaD draft with the findings as an appendix
//! - `EditorSkill` - Section-preserving polish and clean-ups
//! - `PlagiarismSkill` - Similarity screening of the edited draft (local only)

pub mod prompts;

pub mod editor_skill;
pub mod plagiarism_skill;
pub mod researcher_skill;
pub mod writer_skill;

pub use editor_skill::EditorSkill;
pub use plagiarism_skill::{PlagiarismReport, PlagiarismSkill};
pub use researcher_skill::ResearcherSkill;
pub use writer_skill::WriterSkill;

use crate::generation::{GenerationError, TextGenerationClient};
use crate::models::PipelineConfig;
use crate::orchestrator::pipeline::Stage;
use crate::state::session::StageOutput;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

/// What a stage agent sees: the title and every output persisted so far
#[derive(Debug, Clone, Copy)]
pub struct StageContext<'a> {
    pub session_id: &'a str,
    pub title: &'a str,
    pub outputs: &'a BTreeMap<Stage, StageOutput>,
}

impl<'a> StageContext<'a> {
    pub fn new(
        session_id: &'a str,
        title: &'a str,
        outputs: &'a BTreeMap<Stage, StageOutput>,
    ) -> Self {
        Self {
            session_id,
            title,
            outputs,
        }
    }

    /// Text of an earlier stage; empty if that stage has not run
    pub fn text(&self, stage: Stage) -> &'a str {
        debug_assert!(
            self.outputs.contains_key(&stage),
            "{} output requested before it was persisted",
            stage
        );
        self.outputs
            .get(&stage)
            .map(|o| o.text.as_str())
            .unwrap_or_default()
    }
}

/// What a stage agent returns; the orchestrator adds timing and attempts
#[derive(Debug, Clone, PartialEq)]
pub struct StageArtifact {
    pub text: String,
    pub notes: Vec<String>,
    pub fallback: bool,
    pub plagiarism: Option<PlagiarismReport>,
}

impl StageArtifact {
    pub fn new(text: impl Into<String>, fallback: bool) -> Self {
        Self {
            text: text.into(),
            notes: Vec::new(),
            fallback,
            plagiarism: None,
        }
    }

    pub fn with_notes(mut self, notes: Vec<String>) -> Self {
        self.notes = notes;
        self
    }

    pub fn with_plagiarism(mut self, report: PlagiarismReport) -> Self {
        self.plagiarism = Some(report);
        self
    }
}

/// One step of the pipeline
#[async_trait]
pub trait StageAgent: Send + Sync {
    fn stage(&self) -> Stage;

    /// Produce this stage's artifact.
    ///
    /// Only transient generation failures are returned; the orchestrator
    /// retries the whole stage on them.
    async fn run(
        &self,
        ctx: StageContext<'_>,
        client: &TextGenerationClient,
    ) -> Result<StageArtifact, GenerationError>;
}

/// The four agents in canonical order
pub fn default_agents(config: &PipelineConfig, max_tokens: u32) -> Vec<Arc<dyn StageAgent>> {
    vec![
        Arc::new(ResearcherSkill::new(config.max_findings, max_tokens)),
        Arc::new(WriterSkill::new(max_tokens)),
        Arc::new(EditorSkill::new(max_tokens)),
        Arc::new(PlagiarismSkill::new(config.similarity_max_chars)),
    ]
}

/// Shorten to at most `max_chars` characters, marking the cut with `…`
pub(crate) fn clip(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    out = out.trim_end().to_string();
    out.push('…');
    out
}

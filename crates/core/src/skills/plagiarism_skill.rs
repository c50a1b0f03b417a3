//! # Plagiarism Skill
//!
//! Screens the edited draft against the research notes it was written from.
//! Purely local: the generation client is never called.

use super::{StageAgent, StageArtifact, StageContext};
use crate::generation::{GenerationError, TextGenerationClient};
use crate::orchestrator::pipeline::Stage;
use crate::tools::sections::Draft;
use crate::tools::similarity::{SimilarityLevel, SimilarityScorer};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Attached to every report
pub const DISCLAIMER: &str = "heuristic screening signal, not a legal plagiarism determination";

/// Similarity estimate for an edited draft
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlagiarismReport {
    /// Highest similarity against any reference
    pub score: f64,
    /// Mean similarity across references
    pub mean_score: f64,
    /// Appendix vs. research notes; close to 1.0 when the appendix is intact
    pub baseline: f64,
    pub level: SimilarityLevel,
    /// Number of reference texts compared
    pub references: usize,
    pub rationale: String,
    pub disclaimer: String,
}

impl PlagiarismReport {
    /// One-line human summary
    pub fn summary(&self) -> String {
        format!(
            "similarity {:.3} ({}), mean {:.3} over {} reference{}",
            self.score,
            self.level,
            self.mean_score,
            self.references,
            if self.references == 1 { "" } else { "s" }
        )
    }
}

/// Plagiarism estimator stage
#[derive(Debug, Clone, Default)]
pub struct PlagiarismSkill {
    scorer: SimilarityScorer,
}

impl PlagiarismSkill {
    pub fn new(max_chars: usize) -> Self {
        Self {
            scorer: SimilarityScorer::new(max_chars),
        }
    }

    /// Compare the draft body with each finding and with the whole notes text
    pub fn estimate(&self, edited: &str, research: &str) -> PlagiarismReport {
        let draft = Draft::parse(edited);
        let body = draft.body_without_appendix();

        let mut references: Vec<&str> = research
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();
        if references.len() != 1 && !research.trim().is_empty() {
            references.push(research.trim());
        }

        let summary = self.scorer.summarize(&body, references.iter().copied());
        let baseline = draft
            .appendix()
            .map(|appendix| self.scorer.score(&appendix.body, research))
            .unwrap_or(0.0);
        let level = SimilarityLevel::classify(summary.max);

        PlagiarismReport {
            score: summary.max,
            mean_score: summary.mean,
            baseline,
            level,
            references: summary.references,
            rationale: rationale(level, summary.references, baseline),
            disclaimer: DISCLAIMER.to_string(),
        }
    }
}

#[async_trait]
impl StageAgent for PlagiarismSkill {
    fn stage(&self) -> Stage {
        Stage::Plagiarism
    }

    async fn run(
        &self,
        ctx: StageContext<'_>,
        _client: &TextGenerationClient,
    ) -> Result<StageArtifact, GenerationError> {
        let skill = self.clone();
        let edited = ctx.text(Stage::Editor).to_string();
        let research = ctx.text(Stage::Research).to_string();

        // The alignment is CPU-bound; keep it off the async workers
        let report = tokio::task::spawn_blocking(move || skill.estimate(&edited, &research))
            .await
            .map_err(|e| GenerationError::Aborted(e.to_string()))?;
        let text = report.summary();
        Ok(StageArtifact::new(text, false)
            .with_notes(vec![report.rationale.clone()])
            .with_plagiarism(report))
    }
}

fn rationale(level: SimilarityLevel, references: usize, baseline: f64) -> String {
    if references == 0 {
        return "No research notes to compare against.".to_string();
    }
    let verdict = match level {
        SimilarityLevel::Low => "The draft body shares little sequence structure with the research notes.",
        SimilarityLevel::Medium => {
            "The draft body reuses a noticeable share of the research notes; review paraphrasing."
        }
        SimilarityLevel::High => {
            "The draft body closely follows the research notes; rewrite or quote with attribution."
        }
    };
    if baseline < 0.99 {
        format!("{} The research appendix differs from the notes (baseline {:.3}).", verdict, baseline)
    } else {
        verdict.to_string()
    }
}

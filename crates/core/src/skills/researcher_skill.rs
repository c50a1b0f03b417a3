//! # Researcher Skill
//!
//! Turns a title into a bounded list of `- ` findings. Whatever the backend
//! returns is normalized into bullets, so downstream stages can rely on the
//! shape even for prose answers or the offline placeholder.

use super::{clip, prompts, StageAgent, StageArtifact, StageContext};
use crate::generation::{GenerationError, TextGenerationClient, FALLBACK_MARKER};
use crate::orchestrator::pipeline::Stage;
use async_trait::async_trait;

/// Upper bound on the length of one finding, bullet marker included
pub const MAX_FINDING_CHARS: usize = 240;

/// Researcher skill for collecting findings
#[derive(Debug, Clone)]
pub struct ResearcherSkill {
    max_findings: usize,
    max_tokens: u32,
}

impl ResearcherSkill {
    pub fn new(max_findings: usize, max_tokens: u32) -> Self {
        Self {
            max_findings: max_findings.max(1),
            max_tokens,
        }
    }

    pub fn prompt(&self, title: &str) -> String {
        prompts::render(
            prompts::RESEARCHER,
            &[
                ("title", title),
                ("max_findings", &self.max_findings.to_string()),
            ],
        )
    }
}

#[async_trait]
impl StageAgent for ResearcherSkill {
    fn stage(&self) -> Stage {
        Stage::Research
    }

    async fn run(
        &self,
        ctx: StageContext<'_>,
        client: &TextGenerationClient,
    ) -> Result<StageArtifact, GenerationError> {
        let generation = client
            .generate(&self.prompt(ctx.title), self.max_tokens)
            .await?;

        let findings = extract_findings(&generation.text, ctx.title, self.max_findings);
        tracing::debug!(
            session = ctx.session_id,
            "Researcher produced {} findings",
            findings.len()
        );

        let note = format!("{} findings", findings.len());
        Ok(StageArtifact::new(findings.join("\n"), generation.fallback).with_notes(vec![note]))
    }
}

/// Normalize generated text into at most `max_findings` bullets.
///
/// At least one bullet mentions the title; a scope bullet is put first when
/// none of the generated ones does.
pub fn extract_findings(text: &str, title: &str, max_findings: usize) -> Vec<String> {
    let mut findings: Vec<String> = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with(FALLBACK_MARKER) || line.starts_with('#') {
            continue;
        }
        let content = strip_list_marker(line).trim();
        if content.is_empty() {
            continue;
        }
        let bullet = format!("- {}", clip(content, MAX_FINDING_CHARS - 2));
        if !findings.contains(&bullet) {
            findings.push(bullet);
        }
    }

    let title_key = title.trim().to_lowercase();
    if !findings
        .iter()
        .any(|f| f.to_lowercase().contains(&title_key))
    {
        findings.insert(
            0,
            format!("- {}", clip(&format!("Topic under study: {}", title.trim()), MAX_FINDING_CHARS - 2)),
        );
    }

    findings.truncate(max_findings.max(1));
    findings
}

/// Drop `- `, `* `, `• ` and `1. ` / `1) ` list markers
fn strip_list_marker(line: &str) -> &str {
    for marker in ["- ", "* ", "• ", "+ "] {
        if let Some(rest) = line.strip_prefix(marker) {
            return rest;
        }
    }
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(rest) = rest.strip_prefix(". ").or_else(|| rest.strip_prefix(") ")) {
            return rest;
        }
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    const TITLE: &str = "Graph Neural Networks for Drug Discovery";

    #[test]
    fn test_prose_becomes_bullets() {
        let text = "Graph neural networks for drug discovery model molecules as graphs.\n\n1. Message passing is the dominant design.\n* Benchmarks include MoleculeNet.";
        let findings = extract_findings(text, TITLE, 8);
        assert_eq!(findings.len(), 3);
        assert!(findings.iter().all(|f| f.starts_with("- ")));
        assert_eq!(findings[1], "- Message passing is the dominant design.");
    }

    #[test]
    fn test_scope_bullet_added_when_title_missing() {
        let findings = extract_findings("- Unrelated point", TITLE, 8);
        assert_eq!(findings[0], format!("- Topic under study: {}", TITLE));
        assert_eq!(findings.len(), 2);
    }

    #[test]
    fn test_findings_are_bounded() {
        let long = "x".repeat(1000);
        let text: String = (0..20).map(|i| format!("- point {i} {long}\n")).collect();
        let findings = extract_findings(&text, TITLE, 5);
        assert_eq!(findings.len(), 5);
        assert!(findings
            .iter()
            .all(|f| f.chars().count() <= MAX_FINDING_CHARS));
        assert!(findings[0].contains(TITLE));
    }

    #[test]
    fn test_fallback_marker_and_headings_are_skipped() {
        let text = format!("{} placeholder\n## Notes\n- a finding", FALLBACK_MARKER);
        let findings = extract_findings(&text, "A", 8);
        assert!(findings.iter().all(|f| !f.contains(FALLBACK_MARKER)));
        assert!(findings.iter().all(|f| !f.contains("Notes")));
    }

    #[test]
    fn test_offline_run_mentions_title() {
        let skill = ResearcherSkill::new(8, 512);
        let outputs = BTreeMap::new();
        let ctx = StageContext::new("s-1", TITLE, &outputs);
        let client = TextGenerationClient::offline();

        let artifact = tokio_test::block_on(skill.run(ctx, &client)).unwrap();
        assert!(artifact.fallback);
        assert!(artifact.text.lines().all(|l| l.starts_with("- ")));
        assert!(artifact
            .text
            .lines()
            .any(|l| l.to_lowercase().contains(&TITLE.to_lowercase())));
    }
}

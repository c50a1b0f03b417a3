//! # Editor Skill
//!
//! Section-preserving revision of the draft. Headings, their order and the
//! research appendix are never touched; only section bodies change.

use super::{prompts, StageAgent, StageArtifact, StageContext};
use crate::generation::{GenerationError, TextGenerationClient};
use crate::orchestrator::pipeline::Stage;
use crate::tools::sections::Draft;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

static TRAILING_WS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)[ \t]+$").expect("static pattern"));
static BLANK_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("static pattern"));
static DOUBLE_SPACES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\S) {2,}").expect("static pattern"));
static SPACE_BEFORE_PUNCT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\S) +([,.;:!?])").expect("static pattern"));

/// Editor skill for polishing drafts
#[derive(Debug, Clone)]
pub struct EditorSkill {
    max_tokens: u32,
}

impl EditorSkill {
    pub fn new(max_tokens: u32) -> Self {
        Self { max_tokens }
    }

    /// Ask the client for a revised body; `None` unless the revision is usable
    async fn polish(
        &self,
        client: &TextGenerationClient,
        title: &str,
        heading: &str,
        body: &str,
    ) -> Result<Option<String>, GenerationError> {
        if !client.is_live() || body.trim().is_empty() {
            return Ok(None);
        }
        let prompt = prompts::render(
            prompts::EDITOR,
            &[("title", title), ("heading", heading), ("body", body)],
        );
        let generation = client.generate(&prompt, self.max_tokens).await?;
        let revised = generation.text.trim();

        let acceptable = !generation.fallback
            && !revised.is_empty()
            && !revised.lines().any(|l| l.trim_start().starts_with('#'));
        Ok(acceptable.then(|| revised.to_string()))
    }
}

#[async_trait]
impl StageAgent for EditorSkill {
    fn stage(&self) -> Stage {
        Stage::Editor
    }

    async fn run(
        &self,
        ctx: StageContext<'_>,
        client: &TextGenerationClient,
    ) -> Result<StageArtifact, GenerationError> {
        let mut draft = Draft::parse(ctx.text(Stage::Writer));
        let mut polished = Vec::new();
        let mut cleaned = Vec::new();

        draft.preamble = cleanup(&draft.preamble);

        for section in draft.sections.iter_mut().filter(|s| !s.is_appendix()) {
            let mut body = section.body.clone();
            if let Some(revised) = self
                .polish(client, ctx.title, &section.heading, &body)
                .await?
            {
                if revised != body {
                    polished.push(section.heading.clone());
                    body = revised;
                }
            }

            let tidy = cleanup(&body);
            if opens_section(&tidy) {
                section.body = body;
                continue;
            }
            if tidy != body {
                cleaned.push(section.heading.clone());
            }
            section.body = tidy;
        }

        let summary = edit_summary(&polished, &cleaned, draft.sections.len());
        tracing::debug!(session = ctx.session_id, "Editor: {}", summary.join("; "));

        Ok(StageArtifact::new(draft.render(), !client.is_live()).with_notes(summary))
    }
}

/// Deterministic whitespace and punctuation clean-ups.
///
/// Leading indentation is kept: an indented `## ` line is body text and must
/// not turn into a heading.
pub fn cleanup(text: &str) -> String {
    let text = TRAILING_WS.replace_all(text, "");
    let text = DOUBLE_SPACES.replace_all(&text, "$1 ");
    let text = SPACE_BEFORE_PUNCT.replace_all(&text, "$1$2");
    let text = BLANK_RUNS.replace_all(&text, "\n\n");
    text.trim_matches('\n').to_string()
}

fn opens_section(body: &str) -> bool {
    body.lines().any(|line| line.starts_with("## "))
}

fn edit_summary(polished: &[String], cleaned: &[String], total: usize) -> Vec<String> {
    let mut summary = Vec::new();
    if !polished.is_empty() {
        summary.push(format!(
            "Polished {} of {} sections: {}",
            polished.len(),
            total,
            polished.join(", ")
        ));
    }
    if !cleaned.is_empty() {
        summary.push(format!("Cleaned whitespace and punctuation in: {}", cleaned.join(", ")));
    }
    if summary.is_empty() {
        summary.push("No changes required".to_string());
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::TextGenerator;
    use crate::state::session::StageOutput;
    use chrono::Utc;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::time::Duration;

    const DRAFT: &str = "# Soil Carbon\n\n## Abstract\nCover crops  help .   \n\n\n\nMore text\n\n## Methods\nField trials.\n\n## Appendix: Research Notes\n- keep  this   exactly ,\n";

    struct Echo(&'static str);

    #[async_trait]
    impl TextGenerator for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn generate(&self, _prompt: &str, _max_tokens: u32) -> Result<String, GenerationError> {
            Ok(self.0.to_string())
        }
    }

    fn outputs(draft: &str) -> BTreeMap<Stage, StageOutput> {
        let mut outputs = BTreeMap::new();
        outputs.insert(
            Stage::Writer,
            StageOutput {
                text: draft.to_string(),
                notes: Vec::new(),
                duration_ms: 1,
                attempts: 1,
                fallback: false,
                completed_at: Utc::now(),
                plagiarism: None,
            },
        );
        outputs
    }

    #[test]
    fn test_cleanup_rules() {
        assert_eq!(cleanup("a  b .\t\n\n\n\nc , d"), "a b.\n\nc, d");
        assert_eq!(cleanup("\n\n  - indented item  \n\n"), "  - indented item");
    }

    #[tokio::test]
    async fn test_indented_heading_stays_in_body() {
        let draft = "# T\n\n## Abstract\n ## Sneaky\nbody text\n\n## Appendix: Research Notes\n- a\n";
        let outputs = outputs(draft);
        let ctx = StageContext::new("s-1", "T", &outputs);
        let artifact = EditorSkill::new(256)
            .run(ctx, &TextGenerationClient::offline())
            .await
            .unwrap();

        let after = Draft::parse(&artifact.text);
        assert_eq!(after.headings(), Draft::parse(draft).headings());
        assert_eq!(after.sections[0].body, " ## Sneaky\nbody text");
    }

    #[tokio::test]
    async fn test_offline_edit_keeps_structure_and_appendix() {
        let outputs = outputs(DRAFT);
        let ctx = StageContext::new("s-1", "Soil Carbon", &outputs);
        let artifact = EditorSkill::new(256)
            .run(ctx, &TextGenerationClient::offline())
            .await
            .unwrap();

        let before = Draft::parse(DRAFT);
        let after = Draft::parse(&artifact.text);
        assert_eq!(before.headings(), after.headings());
        assert_eq!(before.appendix(), after.appendix());
        assert_eq!(after.sections[0].body, "Cover crops help.\n\nMore text");
        assert!(artifact.notes[0].contains("Abstract"));
    }

    #[tokio::test]
    async fn test_live_revision_is_applied() {
        let client =
            TextGenerationClient::new(Arc::new(Echo("Revised body.")), Duration::from_secs(1));
        let outputs = outputs(DRAFT);
        let ctx = StageContext::new("s-1", "Soil Carbon", &outputs);
        let artifact = EditorSkill::new(256).run(ctx, &client).await.unwrap();

        let after = Draft::parse(&artifact.text);
        assert_eq!(after.sections[0].body, "Revised body.");
        assert_eq!(after.sections[1].body, "Revised body.");
        assert_eq!(after.appendix(), Draft::parse(DRAFT).appendix());
        assert!(artifact.notes[0].starts_with("Polished 2 of 3 sections"));
        assert!(!artifact.fallback);
    }

    #[tokio::test]
    async fn test_revision_with_headings_is_rejected() {
        let client = TextGenerationClient::new(
            Arc::new(Echo("## New Heading\nsneaky")),
            Duration::from_secs(1),
        );
        let outputs = outputs(DRAFT);
        let ctx = StageContext::new("s-1", "Soil Carbon", &outputs);
        let artifact = EditorSkill::new(256).run(ctx, &client).await.unwrap();

        let after = Draft::parse(&artifact.text);
        assert_eq!(after.headings(), Draft::parse(DRAFT).headings());
        assert_eq!(after.sections[1].body, "Field trials.");
    }
}

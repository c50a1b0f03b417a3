//! # Writer Skill
//!
//! Drafts the paper from the research findings. The generated body is kept
//! when it already has `## ` sections; otherwise the IMRaD template is filled
//! from the generated prose and the findings. The findings always close the
//! draft, verbatim, under the research-notes appendix.

use super::{clip, prompts, StageAgent, StageArtifact, StageContext};
use crate::generation::{GenerationError, TextGenerationClient, FALLBACK_MARKER};
use crate::orchestrator::pipeline::Stage;
use crate::tools::sections::{Draft, Section, APPENDIX_HEADING};
use async_trait::async_trait;

/// Section headings of the IMRaD template, in order
pub const IMRAD_HEADINGS: [&str; 7] = [
    "Abstract",
    "Introduction",
    "Methods",
    "Results",
    "Discussion",
    "Conclusion",
    "References",
];

/// Writer skill for drafting the paper
#[derive(Debug, Clone)]
pub struct WriterSkill {
    max_tokens: u32,
}

impl WriterSkill {
    pub fn new(max_tokens: u32) -> Self {
        Self { max_tokens }
    }
}

#[async_trait]
impl StageAgent for WriterSkill {
    fn stage(&self) -> Stage {
        Stage::Writer
    }

    async fn run(
        &self,
        ctx: StageContext<'_>,
        client: &TextGenerationClient,
    ) -> Result<StageArtifact, GenerationError> {
        let research = ctx.text(Stage::Research);
        let prompt = prompts::render(
            prompts::WRITER,
            &[("title", ctx.title), ("research", research)],
        );
        let generation = client.generate(&prompt, self.max_tokens).await?;

        // Placeholder text is not prose worth keeping; the template covers it.
        let body = if generation.fallback {
            ""
        } else {
            generation.text.as_str()
        };
        let (draft, templated) = compose_draft(ctx.title, research, body);
        let mut notes = vec![format!("{} sections", draft.sections.len())];
        if templated {
            notes.push("IMRaD template filled from research notes".to_string());
        }

        Ok(StageArtifact::new(draft.render(), generation.fallback).with_notes(notes))
    }
}

/// Build the draft; the flag tells whether the template was used
pub fn compose_draft(title: &str, research: &str, generated: &str) -> (Draft, bool) {
    let parsed = Draft::parse(generated);
    let preamble = strip_placeholder(&parsed.preamble);

    let mut sections: Vec<Section> = parsed
        .sections
        .into_iter()
        .filter(|s| !s.is_appendix())
        .collect();

    let templated = sections.is_empty();
    let preamble = if templated {
        sections = imrad_sections(title, research, &preamble);
        String::new()
    } else {
        preamble
    };

    sections.push(Section::new(APPENDIX_HEADING, research.trim()));

    let draft = Draft {
        title: Some(title.trim().to_string()),
        preamble,
        sections,
    };
    (draft, templated)
}

fn imrad_sections(title: &str, research: &str, prose: &str) -> Vec<Section> {
    let findings: Vec<&str> = research
        .lines()
        .map(|l| l.trim().trim_start_matches("- ").trim())
        .filter(|l| !l.is_empty())
        .collect();
    let summary = findings.join(" ");

    let abstract_text = if !prose.is_empty() {
        clip(prose, 800)
    } else if !summary.is_empty() {
        format!("This paper discusses {}. {}", title, clip(&summary, 800))
    } else {
        format!("This paper discusses {}.", title)
    };

    let bodies = [
        abstract_text,
        format!(
            "This paper addresses {}. Context and related work: {}",
            title,
            clip(&summary, 1500)
        ),
        "A structured review of the literature, followed by a synthesis of the collected research notes.".to_string(),
        format!(
            "The review consolidates {} research finding{} into a single narrative.",
            findings.len(),
            if findings.len() == 1 { "" } else { "s" }
        ),
        "Interpretation of the findings, their limitations and the threats to validity.".to_string(),
        format!("Summary of the contribution and directions for future work on {}.", title),
        "See the research notes in the appendix.".to_string(),
    ];

    IMRAD_HEADINGS
        .iter()
        .zip(bodies)
        .map(|(heading, body)| Section::new(*heading, body))
        .collect()
}

/// Drop offline-placeholder marker lines from generated prose
fn strip_placeholder(text: &str) -> String {
    text.lines()
        .filter(|l| !l.trim_start().starts_with(FALLBACK_MARKER))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::session::StageOutput;
    use chrono::Utc;
    use std::collections::BTreeMap;

    const RESEARCH: &str = "- Topic under study: Soil Carbon\n- Cover crops raise soil carbon.";

    #[test]
    fn test_template_used_without_headings() {
        let (draft, templated) = compose_draft("Soil Carbon", RESEARCH, "Some prose only.");
        assert!(templated);
        let headings = draft.headings();
        assert_eq!(&headings[..7], &IMRAD_HEADINGS[..]);
        assert_eq!(headings[7], APPENDIX_HEADING);
        assert_eq!(draft.sections[0].body, "Some prose only.");
    }

    #[test]
    fn test_generated_sections_are_kept() {
        let generated = "## Abstract\nA.\n\n## Findings\nB.\n\n## Appendix: Research Notes\nmade up";
        let (draft, templated) = compose_draft("Soil Carbon", RESEARCH, generated);
        assert!(!templated);
        assert_eq!(draft.headings(), vec!["Abstract", "Findings", APPENDIX_HEADING]);
        assert_eq!(draft.appendix().unwrap().body, RESEARCH);
    }

    #[test]
    fn test_appendix_is_verbatim_after_render() {
        let (draft, _) = compose_draft("Soil Carbon", RESEARCH, "");
        let rendered = draft.render();
        assert!(rendered.starts_with("# Soil Carbon\n"));
        let reparsed = Draft::parse(&rendered);
        assert_eq!(reparsed.appendix().unwrap().body, RESEARCH);
    }

    #[tokio::test]
    async fn test_offline_run_builds_imrad_draft() {
        let mut outputs = BTreeMap::new();
        outputs.insert(
            Stage::Research,
            StageOutput {
                text: RESEARCH.to_string(),
                notes: Vec::new(),
                duration_ms: 1,
                attempts: 1,
                fallback: true,
                completed_at: Utc::now(),
                plagiarism: None,
            },
        );
        let ctx = StageContext::new("s-1", "Soil Carbon", &outputs);

        let artifact = WriterSkill::new(512)
            .run(ctx, &TextGenerationClient::offline())
            .await
            .unwrap();
        assert!(artifact.fallback);
        assert!(!artifact.text.contains(FALLBACK_MARKER));
        assert_eq!(Draft::parse(&artifact.text).sections.len(), 8);
    }
}

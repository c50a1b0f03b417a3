//! # Offline Generator
//!
//! Deterministic placeholder text used when no generation backend is
//! reachable. The output is a pure function of the prompt and the token
//! budget: no clock, no randomness, no network.

use super::{GenerationError, TextGenerator};
use async_trait::async_trait;

/// Leading marker on every placeholder text
pub const FALLBACK_MARKER: &str = "[offline fallback]";

/// Rough characters-per-token ratio used to honor `max_tokens`
const CHARS_PER_TOKEN: usize = 4;

/// Backend that always answers with the fallback text
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineGenerator;

#[async_trait]
impl TextGenerator for OfflineGenerator {
    fn name(&self) -> &str {
        "offline"
    }

    async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String, GenerationError> {
        Ok(fallback_text(prompt, max_tokens))
    }
}

/// Build the placeholder for a prompt
pub fn fallback_text(prompt: &str, max_tokens: u32) -> String {
    let topic = topic_of(prompt);
    let mut lines = vec![
        format!(
            "{} No generation backend was reachable; placeholder text (prompt {:08x}).",
            FALLBACK_MARKER,
            fingerprint(prompt)
        ),
        format!("- Topic under study: {}", topic),
        format!("- Open question: which problem does {} address, and for whom?", topic),
        format!("- Prior work: established approaches related to {} and their limits.", topic),
        format!("- Method: a reproducible procedure for investigating {}.", topic),
        format!("- Evaluation: measures that would show progress on {}.", topic),
    ];

    let budget = (max_tokens as usize).saturating_mul(CHARS_PER_TOKEN).max(FALLBACK_MARKER.len());
    let mut used = 0;
    lines.retain(|line| {
        used += line.len() + 1;
        used <= budget
    });
    if lines.is_empty() {
        return FALLBACK_MARKER.to_string();
    }
    lines.join("\n")
}

/// First non-empty prompt line, with a leading `Label:` stripped
fn topic_of(prompt: &str) -> String {
    let first = prompt
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("the requested topic");
    let topic = match first.split_once(':') {
        Some((label, rest)) if !rest.trim().is_empty() && label.split_whitespace().count() <= 3 => {
            rest.trim()
        }
        _ => first,
    };
    topic.chars().take(160).collect()
}

/// FNV-1a, stable across builds
fn fingerprint(text: &str) -> u32 {
    text.bytes().fold(0x811c_9dc5u32, |hash, byte| {
        (hash ^ u32::from(byte)).wrapping_mul(0x0100_0193)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_echoes_topic() {
        let text = fallback_text("Title: Graph Neural Networks\nMore context", 256);
        assert!(text.starts_with(FALLBACK_MARKER));
        assert!(text.contains("- Topic under study: Graph Neural Networks"));
    }

    #[test]
    fn test_fallback_is_prompt_dependent() {
        assert_ne!(fallback_text("Title: A", 256), fallback_text("Title: B", 256));
        assert_eq!(fallback_text("Title: A", 256), fallback_text("Title: A", 256));
    }

    #[test]
    fn test_fallback_respects_budget() {
        let short = fallback_text("Title: Ocean Acoustics", 40);
        let long = fallback_text("Title: Ocean Acoustics", 1024);
        assert!(short.len() <= 40 * CHARS_PER_TOKEN);
        assert!(short.len() < long.len());
        assert!(short.starts_with(FALLBACK_MARKER));
    }

    #[test]
    fn test_topic_strips_short_labels_only() {
        assert_eq!(topic_of("Deep Learning: A Survey of Everything Ever"), "A Survey of Everything Ever");
        assert_eq!(topic_of("\n\nRefine this section of a paper titled: X"), "Refine this section of a paper titled: X");
    }
}

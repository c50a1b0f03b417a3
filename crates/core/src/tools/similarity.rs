//! # Similarity Scorer
//!
//! Local, deterministic similarity ratio between two texts:
//! `2 * LCS(a, b) / (|a| + |b|)` over the characters of the normalized
//! (lower-cased, whitespace-collapsed) strings.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Default number of normalized characters compared per text
pub const DEFAULT_MAX_CHARS: usize = 12_000;

/// Human-readable band for a similarity ratio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SimilarityLevel {
    /// Below 0.3
    Low,
    /// 0.3 to 0.6 inclusive
    Medium,
    /// Above 0.6
    High,
}

impl SimilarityLevel {
    pub fn classify(score: f64) -> Self {
        if score < 0.3 {
            Self::Low
        } else if score <= 0.6 {
            Self::Medium
        } else {
            Self::High
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        }
    }
}

impl fmt::Display for SimilarityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Max and mean similarity of one text against several references
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchSummary {
    pub max: f64,
    pub mean: f64,
    pub references: usize,
}

/// Sequence-alignment similarity over normalized text
#[derive(Debug, Clone, Copy)]
pub struct SimilarityScorer {
    max_chars: usize,
}

impl Default for SimilarityScorer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CHARS)
    }
}

impl SimilarityScorer {
    pub fn new(max_chars: usize) -> Self {
        Self {
            max_chars: max_chars.max(1),
        }
    }

    /// Lower-case and collapse whitespace runs to single spaces
    pub fn normalize(text: &str) -> String {
        text.split_whitespace()
            .map(str::to_lowercase)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Similarity ratio in `[0, 1]`; symmetric in its arguments
    pub fn score(&self, a: &str, b: &str) -> f64 {
        let a = self.prepare(a);
        let b = self.prepare(b);

        if a == b {
            return 1.0;
        }
        let total = a.len() + b.len();
        let common = lcs_len(&a, &b);
        ((2 * common) as f64 / total as f64).clamp(0.0, 1.0)
    }

    /// Score `text` against every reference
    pub fn summarize<'a>(&self, text: &str, references: impl IntoIterator<Item = &'a str>) -> MatchSummary {
        let scores: Vec<f64> = references
            .into_iter()
            .map(|reference| self.score(text, reference))
            .collect();
        if scores.is_empty() {
            return MatchSummary {
                max: 0.0,
                mean: 0.0,
                references: 0,
            };
        }
        MatchSummary {
            max: scores.iter().copied().fold(0.0, f64::max),
            mean: scores.iter().sum::<f64>() / scores.len() as f64,
            references: scores.len(),
        }
    }

    fn prepare(&self, text: &str) -> Vec<char> {
        Self::normalize(text).chars().take(self.max_chars).collect()
    }
}

/// Length of the longest common subsequence, two rolling rows
fn lcs_len(a: &[char], b: &[char]) -> usize {
    let (outer, inner) = if a.len() >= b.len() { (a, b) } else { (b, a) };
    if inner.is_empty() {
        return 0;
    }

    let mut prev = vec![0u32; inner.len() + 1];
    let mut curr = vec![0u32; inner.len() + 1];
    for &x in outer {
        for (j, &y) in inner.iter().enumerate() {
            curr[j + 1] = if x == y {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[inner.len()] as usize
}

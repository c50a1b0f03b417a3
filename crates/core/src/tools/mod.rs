//! # Tools
//!
//! Local, side-effect-free helpers used by the stage agents.
//!
//! - `similarity` - LCS-based similarity ratio for plagiarism screening
//! - `sections` - Markdown section splitting shared by Writer and Editor

pub mod sections;
pub mod similarity;

pub use sections::{Draft, Section};
pub use similarity::{MatchSummary, SimilarityLevel, SimilarityScorer};

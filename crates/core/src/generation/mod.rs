//! # Text Generation
//!
//! The one capability every stage agent consumes: `generate(prompt, max_tokens)`.
//!
//! ## Architecture
//!
//! ```text
//! StageAgent
//!   └── TextGenerationClient (timeout + fallback policy)
//!         ├── providers::{GeminiBackend, OpenAiBackend, AnthropicBackend}   (live)
//!         └── offline::OfflineGenerator                                  (deterministic)
//! ```
//!
//! Permanent backend failures are absorbed into the offline fallback text.
//! Transient failures (network, timeout, rate limit, 5xx) are returned to the
//! caller so the orchestrator can retry them a bounded number of times.

pub mod offline;
pub mod providers;

use crate::models::GenerationConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use offline::{fallback_text, OfflineGenerator, FALLBACK_MARKER};

/// Failure of a single generation call
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerationError {
    #[error("transient generation failure: {0}")]
    Transient(String),
    #[error("generation timed out after {0:?}")]
    Timeout(Duration),
    #[error("generation backend rejected the credential: {0}")]
    Unauthorized(String),
    #[error("generation backend rejected the request: {0}")]
    Rejected(String),
    #[error("malformed generation response: {0}")]
    Malformed(String),
    #[error("stage task aborted: {0}")]
    Aborted(String),
}

impl GenerationError {
    /// Whether a retry could plausibly succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Timeout(_))
    }

    /// Classify a non-success HTTP status
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let detail = format!("HTTP {}: {}", status.as_u16(), truncate(body, 200));
        match status.as_u16() {
            401 | 403 => Self::Unauthorized(detail),
            408 | 429 => Self::Transient(detail),
            s if s >= 500 => Self::Transient(detail),
            _ => Self::Rejected(detail),
        }
    }
}

impl From<reqwest::Error> for GenerationError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Malformed(err.to_string())
        } else if let Some(status) = err.status() {
            Self::from_status(status, "")
        } else {
            Self::Transient(err.to_string())
        }
    }
}

/// A backend able to turn a prompt into text
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String, GenerationError>;
}

/// Text returned by the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Generation {
    pub text: String,
    /// True when the text came from the offline placeholder generator
    pub fallback: bool,
}

/// Timeout-bounded client over a live or offline backend
#[derive(Clone)]
pub struct TextGenerationClient {
    backend: Arc<dyn TextGenerator>,
    live: bool,
    timeout: Duration,
}

impl fmt::Debug for TextGenerationClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextGenerationClient")
            .field("backend", &self.backend.name())
            .field("live", &self.live)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl TextGenerationClient {
    /// Wrap a live backend
    pub fn new(backend: Arc<dyn TextGenerator>, timeout: Duration) -> Self {
        Self {
            backend,
            live: true,
            timeout,
        }
    }

    /// Client that only ever produces fallback text
    pub fn offline() -> Self {
        Self {
            backend: Arc::new(OfflineGenerator),
            live: false,
            timeout: Duration::from_secs(1),
        }
    }

    /// Select the backend from configuration; no credential means offline
    pub fn from_config(config: &GenerationConfig) -> Self {
        if !config.is_live() {
            tracing::info!(
                "No credential for {}; using the offline generator",
                config.provider.display_name()
            );
            return Self::offline();
        }
        match providers::create_backend(config) {
            Ok(backend) => Self::new(backend, config.timeout()),
            Err(e) => {
                tracing::warn!("Failed to build {} backend: {}", config.provider.display_name(), e);
                Self::offline()
            }
        }
    }

    /// Offline twin of this client, used when retries are exhausted under the fallback policy
    pub fn as_offline(&self) -> Self {
        Self {
            timeout: self.timeout,
            ..Self::offline()
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Generate text for a prompt.
    ///
    /// Returns `Err` only for transient failures; everything else degrades to
    /// the deterministic fallback text.
    pub async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<Generation, GenerationError> {
        let max_tokens = max_tokens.max(1);
        if !self.live {
            return Ok(self.fallback(prompt, max_tokens));
        }

        match tokio::time::timeout(self.timeout, self.backend.generate(prompt, max_tokens)).await {
            Ok(Ok(text)) if !text.trim().is_empty() => Ok(Generation {
                text,
                fallback: false,
            }),
            Ok(Ok(_)) => {
                tracing::warn!("{} returned empty text; using fallback", self.backend.name());
                Ok(self.fallback(prompt, max_tokens))
            }
            Ok(Err(e)) if e.is_transient() => Err(e),
            Ok(Err(e)) => {
                tracing::warn!("{} failed permanently ({}); using fallback", self.backend.name(), e);
                Ok(self.fallback(prompt, max_tokens))
            }
            Err(_) => Err(GenerationError::Timeout(self.timeout)),
        }
    }

    /// The deterministic placeholder for a prompt
    pub fn fallback(&self, prompt: &str, max_tokens: u32) -> Generation {
        Generation {
            text: fallback_text(prompt, max_tokens),
            fallback: true,
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let mut out: String = text.chars().take(max_chars).collect();
        out.push('…');
        out
    }
}

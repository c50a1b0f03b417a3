//! # Paperflow Models
//!
//! Centralized configuration types for the Paperflow system: which generation
//! backend to talk to, how the pipeline retries, and where sessions live.
//!
//! Credentials are never serialized. They are read from the environment:
//! - Gemini - `GEMINI_API_KEY` or `GOOGLE_API_KEY`
//! - OpenAI - `OPENAI_API_KEY`
//! - Anthropic - `ANTHROPIC_API_KEY`
//!
//! When no credential is available the offline generator is selected, so a
//! pipeline run always completes.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Supported generation providers
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    Gemini,
    #[serde(rename = "openai")]
    OpenAI,
    Anthropic,
    /// Deterministic local generator, no network
    Offline,
}

impl LlmProvider {
    /// Get all available providers
    pub fn all() -> Vec<LlmProvider> {
        vec![
            LlmProvider::Gemini,
            LlmProvider::OpenAI,
            LlmProvider::Anthropic,
            LlmProvider::Offline,
        ]
    }

    /// Display name for the CLI
    pub fn display_name(&self) -> &'static str {
        match self {
            LlmProvider::Gemini => "Gemini",
            LlmProvider::OpenAI => "OpenAI",
            LlmProvider::Anthropic => "Anthropic",
            LlmProvider::Offline => "Offline",
        }
    }

    /// Whether this provider supports custom base URL
    pub fn supports_base_url(&self) -> bool {
        matches!(self, LlmProvider::OpenAI)
    }

    /// Model used when none is configured
    pub fn default_model(&self) -> &'static str {
        match self {
            LlmProvider::Gemini => "gemini-2.0-flash",
            LlmProvider::OpenAI => "gpt-4o-mini",
            LlmProvider::Anthropic => "claude-3-5-haiku-latest",
            LlmProvider::Offline => "offline",
        }
    }

    /// Environment variables holding the credential, in lookup order
    pub fn credential_vars(&self) -> &'static [&'static str] {
        match self {
            LlmProvider::Gemini => &["GEMINI_API_KEY", "GOOGLE_API_KEY"],
            LlmProvider::OpenAI => &["OPENAI_API_KEY"],
            LlmProvider::Anthropic => &["ANTHROPIC_API_KEY"],
            LlmProvider::Offline => &[],
        }
    }

    /// First non-empty credential found in the environment
    pub fn credential_from_env(&self) -> Option<String> {
        self.credential_vars()
            .iter()
            .filter_map(|var| std::env::var(var).ok())
            .map(|value| value.trim().to_string())
            .find(|value| !value.is_empty())
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" | "google" => Some(Self::Gemini),
            "openai" => Some(Self::OpenAI),
            "anthropic" | "claude" => Some(Self::Anthropic),
            "offline" | "none" => Some(Self::Offline),
            _ => None,
        }
    }
}

/// Configuration for the text generation backend
///
/// ## Example
/// ```rust,ignore
/// use paperflow_core::models::{GenerationConfig, LlmProvider};
///
/// // Whatever the environment provides (offline when no key is set)
/// let config = GenerationConfig::from_env();
///
/// // Specific provider and model
/// let config = GenerationConfig::with_provider(LlmProvider::OpenAI, "gpt-4o");
/// ```
#[derive(Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Provider to use
    #[serde(default)]
    pub provider: LlmProvider,
    /// Model name (e.g., "gemini-2.0-flash", "gpt-4o"); empty means the provider default
    #[serde(default)]
    pub model: String,
    /// Optional base URL override for OpenAI-compatible APIs
    #[serde(default)]
    pub base_url: Option<String>,
    /// API credential, loaded from the environment only
    #[serde(skip)]
    pub api_key: Option<String>,
    /// Upper bound for a single backend call
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Token budget passed to the backend when a stage doesn't ask for less
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_timeout_secs() -> u64 {
    8
}

fn default_max_tokens() -> u32 {
    1024
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self::with_provider(LlmProvider::default(), LlmProvider::default().default_model())
    }
}

impl fmt::Debug for GenerationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout_secs", &self.timeout_secs)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl GenerationConfig {
    /// Create config for a specific provider
    pub fn with_provider(provider: LlmProvider, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            base_url: None,
            api_key: None,
            timeout_secs: default_timeout_secs(),
            max_tokens: default_max_tokens(),
        }
    }

    /// Config that never leaves the machine
    pub fn offline() -> Self {
        Self::with_provider(LlmProvider::Offline, LlmProvider::Offline.default_model())
    }

    /// Build a config from the environment.
    ///
    /// `PAPERFLOW_PROVIDER` pins the provider; otherwise the first provider
    /// with a credential wins. `PAPERFLOW_MODEL` and `PAPERFLOW_BASE_URL`
    /// override the model and endpoint.
    pub fn from_env() -> Self {
        let provider = std::env::var("PAPERFLOW_PROVIDER")
            .ok()
            .and_then(|p| LlmProvider::parse(&p))
            .or_else(|| {
                [LlmProvider::Gemini, LlmProvider::OpenAI, LlmProvider::Anthropic]
                    .into_iter()
                    .find(|p| p.credential_from_env().is_some())
            })
            .unwrap_or(LlmProvider::Offline);

        let model = std::env::var("PAPERFLOW_MODEL")
            .ok()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| provider.default_model().to_string());

        let mut config = Self::with_provider(provider, model);
        if provider.supports_base_url() {
            config.base_url = std::env::var("PAPERFLOW_BASE_URL")
                .ok()
                .filter(|u| !u.trim().is_empty());
        }
        config.load_credential();
        config
    }

    /// Set base URL (for OpenAI-compatible endpoints)
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the credential explicitly
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Fill in the credential from the environment if none is set
    pub fn load_credential(&mut self) {
        if self.api_key.is_none() {
            self.api_key = self.provider.credential_from_env();
        }
    }

    /// Whether calls go to a remote backend
    pub fn is_live(&self) -> bool {
        self.provider != LlmProvider::Offline
            && self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// What to do when a stage runs out of retries
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustionPolicy {
    /// Fail the whole session at the exhausted stage
    #[default]
    Fail,
    /// Run the stage once more against the offline generator
    Fallback,
}

/// Configuration for the pipeline orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Retries per stage after the first attempt
    pub max_retries: u32,
    /// Fixed delay between attempts
    pub retry_backoff_ms: u64,
    pub on_exhausted: ExhaustionPolicy,
    /// Sessions allowed to run at the same time
    pub max_concurrent_sessions: usize,
    /// Upper bound on research bullets
    pub max_findings: usize,
    /// Log lines included in a status view
    pub log_tail: usize,
    /// Normalized characters compared per text by the similarity scorer
    pub similarity_max_chars: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_retries: 1,
            retry_backoff_ms: 500,
            on_exhausted: ExhaustionPolicy::Fail,
            max_concurrent_sessions: 4,
            max_findings: 8,
            log_tail: 20,
            similarity_max_chars: 12_000,
        }
    }
}

impl PipelineConfig {
    /// Total attempts per stage
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Top-level configuration, loadable from a JSON file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaperflowConfig {
    pub generation: GenerationConfig,
    pub pipeline: PipelineConfig,
    /// SQLite file holding all sessions
    pub database_path: PathBuf,
}

impl Default for PaperflowConfig {
    fn default() -> Self {
        Self {
            generation: GenerationConfig::from_env(),
            pipeline: PipelineConfig::default(),
            database_path: default_database_path(),
        }
    }
}

impl PaperflowConfig {
    /// Load configuration from a JSON file; credentials still come from the environment
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let mut config: PaperflowConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        if config.generation.model.trim().is_empty() {
            config.generation.model = config.generation.provider.default_model().to_string();
        }
        config.generation.load_credential();
        Ok(config)
    }
}

/// Default database location (`.paperflow/paperflow.db`), overridable with `PAPERFLOW_DB`
pub fn default_database_path() -> PathBuf {
    if let Ok(path) = std::env::var("PAPERFLOW_DB") {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }
    PathBuf::from(".paperflow").join("paperflow.db")
}

//! # Live Providers
//!
//! HTTP backends for the hosted generation APIs. Each backend sends a single
//! user message and returns the concatenated text parts of the first answer.

use super::{GenerationError, TextGenerator};
use crate::models::{GenerationConfig, LlmProvider};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Create the live backend for a configuration
pub fn create_backend(config: &GenerationConfig) -> Result<Arc<dyn TextGenerator>> {
    let api_key = config
        .api_key
        .clone()
        .filter(|k| !k.is_empty())
        .with_context(|| format!("No API key for {}", config.provider.display_name()))?;

    // The client timeout sits just above the per-call bound enforced by the caller.
    let client = Client::builder()
        .timeout(config.timeout() + std::time::Duration::from_secs(1))
        .build()
        .context("Failed to build HTTP client")?;

    let backend: Arc<dyn TextGenerator> = match config.provider {
        LlmProvider::Gemini => Arc::new(GeminiBackend {
            client,
            api_key,
            model: config.model.clone(),
        }),
        LlmProvider::OpenAI => Arc::new(OpenAiBackend {
            client,
            api_key,
            model: config.model.clone(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
        }),
        LlmProvider::Anthropic => Arc::new(AnthropicBackend {
            client,
            api_key,
            model: config.model.clone(),
        }),
        LlmProvider::Offline => anyhow::bail!("The offline provider has no live backend"),
    };
    Ok(backend)
}

async fn read_json<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
) -> Result<T, GenerationError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(GenerationError::from_status(status, &body));
    }
    response
        .json::<T>()
        .await
        .map_err(|e| GenerationError::Malformed(e.to_string()))
}

// === Gemini ===

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: GeminiResContent,
}

#[derive(Deserialize)]
struct GeminiResContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

pub struct GeminiBackend {
    client: Client,
    api_key: String,
    model: String,
}

#[async_trait]
impl TextGenerator for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String, GenerationError> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            GEMINI_BASE_URL,
            urlencoding::encode(&self.model),
            urlencoding::encode(&self.api_key)
        );
        let request = GeminiRequest {
            contents: vec![GeminiContent {
                role: "user".to_string(),
                parts: vec![GeminiPart {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GeminiGenerationConfig {
                max_output_tokens: max_tokens,
            },
        };

        let response = self.client.post(&url).json(&request).send().await?;
        let body: GeminiResponse = read_json(response).await?;
        let candidate = body
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| GenerationError::Malformed("no candidates".to_string()))?;

        Ok(candidate
            .content
            .parts
            .into_iter()
            .map(|p| p.text)
            .collect::<Vec<_>>()
            .join(""))
    }
}

// === OpenAI (and compatible endpoints) ===

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAiBackend {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

#[async_trait]
impl TextGenerator for OpenAiBackend {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String, GenerationError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;
        let body: ChatResponse = read_json(response).await?;

        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| GenerationError::Malformed("no choices".to_string()))
    }
}

// === Anthropic ===

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<MessagesBlock>,
}

#[derive(Deserialize)]
struct MessagesBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

pub struct AnthropicBackend {
    client: Client,
    api_key: String,
    model: String,
}

#[async_trait]
impl TextGenerator for AnthropicBackend {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String, GenerationError> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(format!("{}/messages", ANTHROPIC_BASE_URL))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await?;
        let body: MessagesResponse = read_json(response).await?;

        let text = body
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");
        if text.is_empty() {
            return Err(GenerationError::Malformed("no text blocks".to_string()));
        }
        Ok(text)
    }
}

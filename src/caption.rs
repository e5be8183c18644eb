//! Meme caption generation
//!
//! Captions are best-effort enrichment: [`AnthropicCaptions`] asks the
//! Messages API for a caption and silently falls back to the static table
//! on any failure, so callers always get text back.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::expression::Expression;

/// Why a remote caption could not be used. Never leaves this module.
#[derive(Debug, Error)]
pub enum CaptionServiceError {
    #[error("no API key configured")]
    NotConfigured,

    #[error("caption request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("caption service returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid caption response: {0}")]
    Malformed(String),
}

/// Produces caption text for an expression
#[async_trait]
pub trait CaptionProvider: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Caption for `expression`. Never fails.
    async fn caption(&self, expression: Expression) -> String;
}

/// Static captions only
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackCaptions;

#[async_trait]
impl CaptionProvider for FallbackCaptions {
    fn name(&self) -> &'static str {
        "fallback"
    }

    async fn caption(&self, expression: Expression) -> String {
        expression.fallback_caption().to_string()
    }
}

/// Caption service settings (`[caption]` in the config file)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptionConfig {
    /// API key. Falls back to `ANTHROPIC_API_KEY` when unset.
    pub api_key: Option<String>,
    /// Messages API endpoint
    pub endpoint: String,
    /// Model identifier
    pub model: String,
    /// Response token budget
    pub max_tokens: u32,
    /// `anthropic-version` header
    pub api_version: String,
    /// Word budget stated in the prompt
    pub max_words: u32,
    /// Whole-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for CaptionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: "https://api.anthropic.com/v1/messages".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            max_tokens: 1000,
            api_version: "2023-06-01".to_string(),
            max_words: 10,
            timeout_secs: 30,
        }
    }
}

impl CaptionConfig {
    /// Set the API key
    #[must_use]
    pub fn with_api_key(mut self, key: &str) -> Self {
        self.api_key = Some(key.to_string());
        self
    }

    /// Set the endpoint
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }

    /// API key if one is set and non-blank
    #[must_use]
    pub fn usable_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    /// Prompt sent for `expression`
    #[must_use]
    pub fn prompt(&self, expression: Expression) -> String {
        format!(
            "Generate a hilarious, short Instagram-style cat meme caption (max {} words) \
             for a cat that looks {expression}. Make it funny, relatable, and meme-worthy. \
             Only respond with the caption text, nothing else.",
            self.max_words
        )
    }
}

/// Remote captions from the Anthropic Messages API, with local fallback
pub struct AnthropicCaptions {
    config: CaptionConfig,
    client: reqwest::Client,
}

impl AnthropicCaptions {
    pub fn new(config: CaptionConfig) -> Result<Self, CaptionServiceError> {
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    #[must_use]
    pub fn config(&self) -> &CaptionConfig {
        &self.config
    }

    /// One request, no fallback
    async fn request_caption(&self, expression: Expression) -> Result<String, CaptionServiceError> {
        let api_key = self
            .config
            .usable_key()
            .ok_or(CaptionServiceError::NotConfigured)?;

        let request_body = serde_json::json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "messages": [{
                "role": "user",
                "content": self.config.prompt(expression),
            }]
        });

        let response = self
            .client
            .post(&self.config.endpoint)
            .header("x-api-key", api_key)
            .header("anthropic-version", &self.config.api_version)
            .header("content-type", "application/json")
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CaptionServiceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let api_response: serde_json::Value = response
            .json()
            .await
            .map_err(|e| CaptionServiceError::Malformed(e.to_string()))?;

        extract_caption(&api_response)
    }
}

#[async_trait]
impl CaptionProvider for AnthropicCaptions {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    #[instrument(skip(self), fields(model = %self.config.model))]
    async fn caption(&self, expression: Expression) -> String {
        match self.request_caption(expression).await {
            Ok(caption) => {
                info!(%caption, "Generated caption");
                caption
            }
            Err(CaptionServiceError::NotConfigured) => {
                debug!("No API key found, using default caption");
                expression.fallback_caption().to_string()
            }
            Err(e) => {
                warn!("Error generating caption, using default: {e}");
                expression.fallback_caption().to_string()
            }
        }
    }
}

/// Pull the caption out of a Messages API response body
fn extract_caption(response: &serde_json::Value) -> Result<String, CaptionServiceError> {
    let text = response["content"][0]["text"]
        .as_str()
        .ok_or_else(|| CaptionServiceError::Malformed("missing content[0].text".to_string()))?
        .trim();

    if text.is_empty() {
        return Err(CaptionServiceError::Malformed("empty caption".to_string()));
    }

    Ok(text.to_string())
}

//! LLM completion client (Anthropic Messages API).
//!
//! The [`CompletionProvider`] trait is the seam the chat service and the
//! categorizer talk to; tests substitute a canned implementation.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::config::LlmConfig;
use crate::retry::post_json;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// A single-turn text completion.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    fn model(&self) -> &str;

    async fn complete(&self, system: &str, user: &str, max_tokens: u32) -> Result<String>;
}

pub struct AnthropicClient {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    max_retries: u32,
}

impl AnthropicClient {
    pub fn new(config: &LlmConfig, model: &str, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            url: format!("{}/v1/messages", config.url.trim_end_matches('/')),
            api_key,
            model: model.to_string(),
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl CompletionProvider for AnthropicClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, system: &str, user: &str, max_tokens: u32) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": max_tokens,
            "system": system,
            "messages": [{"role": "user", "content": user}],
        });
        let json = post_json("Anthropic", self.max_retries, || {
            self.client
                .post(&self.url)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&body)
        })
        .await?;
        parse_messages_response(&json)
    }
}

/// Concatenate the `text` blocks of a Messages API reply.
fn parse_messages_response(json: &serde_json::Value) -> Result<String> {
    let blocks = json
        .get("content")
        .and_then(|c| c.as_array())
        .context("Invalid Anthropic response: missing content array")?;

    let text: String = blocks
        .iter()
        .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
        .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
        .collect();

    if text.trim().is_empty() {
        bail!("Anthropic response contained no text");
    }
    Ok(text.trim().to_string())
}

/// The chat and categorization clients, when an LLM is configured.
#[derive(Clone)]
pub struct LlmClients {
    pub chat: Arc<dyn CompletionProvider>,
    pub categorize: Arc<dyn CompletionProvider>,
}

/// Build the configured LLM clients.
///
/// Returns `None` when the provider is `disabled`, or when it is enabled but
/// `ANTHROPIC_API_KEY` is unset; the latter is logged.
pub fn create_llm(config: &LlmConfig) -> Result<Option<LlmClients>> {
    match config.provider.as_str() {
        "disabled" => Ok(None),
        "anthropic" => {
            let Ok(api_key) = std::env::var("ANTHROPIC_API_KEY") else {
                warn!("llm.provider is anthropic but ANTHROPIC_API_KEY is not set; chat disabled");
                return Ok(None);
            };
            Ok(Some(LlmClients {
                chat: Arc::new(AnthropicClient::new(config, &config.chat_model, api_key.clone())?),
                categorize: Arc::new(AnthropicClient::new(
                    config,
                    &config.categorize_model,
                    api_key,
                )?),
            }))
        }
        other => bail!("Unknown llm provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_messages_response() {
        let body = json!({
            "content": [
                {"type": "text", "text": "Hello "},
                {"type": "tool_use", "id": "x"},
                {"type": "text", "text": "world\n"}
            ]
        });
        assert_eq!(parse_messages_response(&body).unwrap(), "Hello world");
    }

    #[test]
    fn test_parse_messages_response_rejects_empty() {
        assert!(parse_messages_response(&json!({"content": []})).is_err());
        assert!(parse_messages_response(&json!({"type": "error"})).is_err());
    }

    #[test]
    fn test_disabled_llm_is_none() {
        assert!(create_llm(&LlmConfig::default()).unwrap().is_none());
    }

    #[test]
    fn test_client_builds_messages_url() {
        let config = LlmConfig {
            url: "https://example.test/".to_string(),
            ..Default::default()
        };
        let client = AnthropicClient::new(&config, "m", "k".to_string()).unwrap();
        assert_eq!(client.url, "https://example.test/v1/messages");
        assert_eq!(client.model(), "m");
    }
}

//! Outbound JSON POST with retry and exponential backoff.
//!
//! Shared by the embedding providers and the LLM client:
//! - HTTP 429 and 5xx are retried
//! - other 4xx fail immediately
//! - network errors are retried
//! - backoff is 1s, 2s, 4s, ... capped at 32s

use anyhow::{bail, Result};
use reqwest::RequestBuilder;
use std::time::Duration;
use tracing::warn;

/// Backoff before retry number `attempt` (1-based).
pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1 << (attempt.saturating_sub(1)).min(5))
}

/// Send the request built by `build` up to `max_retries + 1` times and
/// return the parsed JSON body of the first successful response.
///
/// `label` names the remote service in error messages.
pub async fn post_json<F>(label: &str, max_retries: u32, build: F) -> Result<serde_json::Value>
where
    F: Fn() -> RequestBuilder,
{
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = backoff_delay(attempt);
            warn!(service = label, attempt, ?delay, "retrying request");
            tokio::time::sleep(delay).await;
        }

        match build().send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return Ok(response.json().await?);
                }

                let body_text = response.text().await.unwrap_or_default();
                if status.as_u16() == 429 || status.is_server_error() {
                    last_err = Some(anyhow::anyhow!("{} API error {}: {}", label, status, body_text));
                    continue;
                }

                bail!("{} API error {}: {}", label, status, body_text);
            }
            Err(e) => {
                last_err = Some(anyhow::anyhow!("{} connection error: {}", label, e));
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("{} request failed after retries", label)))
}

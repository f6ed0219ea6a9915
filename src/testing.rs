//! Deterministic stand-ins for the network-backed providers.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Mutex;

use devkb_core::embedding::EmbeddingProvider;

use crate::llm::CompletionProvider;

/// Embeds text as a byte histogram folded into `dims` buckets.
pub struct FakeEmbedder {
    dims: usize,
    fail: bool,
}

impl FakeEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims, fail: false }
    }

    pub fn failing(dims: usize) -> Self {
        Self { dims, fail: true }
    }

    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];
        for b in text.to_lowercase().bytes().filter(|b| b.is_ascii_alphanumeric()) {
            v[b as usize % self.dims] += 1.0;
        }
        v[0] += 0.01;
        v
    }
}

#[async_trait]
impl EmbeddingProvider for FakeEmbedder {
    fn model_name(&self) -> &str {
        "fake"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if self.fail {
            anyhow::bail!("fake embedder is down");
        }
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }
}

/// Replies with a fixed string and records every prompt it receives.
pub struct FakeLlm {
    reply: String,
    pub prompts: Mutex<Vec<(String, String)>>,
}

impl FakeLlm {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn last_prompt(&self) -> Option<(String, String)> {
        self.prompts.lock().ok()?.last().cloned()
    }
}

#[async_trait]
impl CompletionProvider for FakeLlm {
    fn model(&self) -> &str {
        "fake-llm"
    }

    async fn complete(&self, system: &str, user: &str, _max_tokens: u32) -> Result<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push((system.to_string(), user.to_string()));
        }
        Ok(self.reply.clone())
    }
}

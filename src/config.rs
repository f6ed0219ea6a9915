//! TOML configuration.
//!
//! Every section has defaults, so an empty file is a valid configuration.
//! API keys are never read from the file: `OPENAI_API_KEY` and
//! `ANTHROPIC_API_KEY` come from the environment.
//!
//! ```toml
//! [db]
//! path = "./data/devkb.sqlite"
//!
//! [server]
//! bind = "127.0.0.1:8000"
//!
//! [chunking]
//! max_chunk_size = 1000
//! chunk_overlap = 200
//!
//! [search]
//! vector_weight = 0.7
//! keyword_weight = 0.3
//! normalization = "unit"
//!
//! [embedding]
//! provider = "openai"
//! model = "text-embedding-3-small"
//! dims = 1536
//!
//! [llm]
//! provider = "anthropic"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use devkb_core::chunk::{ChunkSettings, SUPPORTED_EXTENSIONS};
use devkb_core::search::SearchConfig;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub chunking: ChunkSettings,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/devkb.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Upper bound on a whole HTTP request, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_request_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    /// `disabled` or `anthropic`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_llm_url")]
    pub url: String,
    /// Model used for chat and code explanation.
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    /// Model used for categorization.
    #[serde(default = "default_categorize_model")]
    pub categorize_model: String,
    #[serde(default = "default_llm_max_tokens")]
    pub max_tokens: u32,
    /// Characters of search context included in a chat prompt.
    #[serde(default = "default_context_chars")]
    pub context_chars: usize,
    #[serde(default = "default_llm_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            url: default_llm_url(),
            chat_model: default_chat_model(),
            categorize_model: default_categorize_model(),
            max_tokens: default_llm_max_tokens(),
            context_chars: default_context_chars(),
            max_retries: default_llm_max_retries(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

fn default_llm_url() -> String {
    "https://api.anthropic.com".to_string()
}
fn default_chat_model() -> String {
    "claude-3-sonnet-20240229".to_string()
}
fn default_categorize_model() -> String {
    "claude-3-haiku-20240307".to_string()
}
fn default_llm_max_tokens() -> u32 {
    2000
}
fn default_context_chars() -> usize {
    8000
}
fn default_llm_max_retries() -> u32 {
    3
}
fn default_llm_timeout_secs() -> u64 {
    60
}

impl LlmConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexingConfig {
    /// Extensions (without the dot) picked up by `index_directory`.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    /// Files larger than this are reported as errors instead of indexed.
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            max_file_bytes: default_max_file_bytes(),
            follow_symlinks: false,
        }
    }
}

fn default_extensions() -> Vec<String> {
    SUPPORTED_EXTENSIONS.iter().map(|e| e.to_string()).collect()
}

fn default_max_file_bytes() -> u64 {
    2 * 1024 * 1024
}

impl Config {
    /// All-defaults configuration, used by tests and when no file exists.
    pub fn minimal() -> Self {
        Self::default()
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.chunking.max_chunk_size == 0 {
        anyhow::bail!("chunking.max_chunk_size must be > 0");
    }

    config.search.validate()?;

    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() && config.embedding.provider != "local" {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.batch_size == 0 {
            anyhow::bail!("embedding.batch_size must be > 0");
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" | "local" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
            other
        ),
    }

    match config.llm.provider.as_str() {
        "disabled" | "anthropic" => {}
        other => anyhow::bail!(
            "Unknown llm provider: '{}'. Must be disabled or anthropic.",
            other
        ),
    }

    if config.indexing.extensions.is_empty() {
        anyhow::bail!("indexing.extensions must not be empty");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_src)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = parse("").unwrap();
        assert_eq!(config.db.path, PathBuf::from("./data/devkb.sqlite"));
        assert_eq!(config.chunking.max_chunk_size, 1000);
        assert_eq!(config.chunking.chunk_overlap, 200);
        assert_eq!(config.search.default_limit, 10);
        assert!(!config.embedding.is_enabled());
        assert!(!config.llm.is_enabled());
        assert!(config.indexing.extensions.contains(&"md".to_string()));
    }

    #[test]
    fn test_search_section_overrides() {
        let config = parse(
            r#"
            [search]
            vector_weight = 0.5
            keyword_weight = 0.5
            normalization = "min_max"
            vector_timeout_ms = 250
            "#,
        )
        .unwrap();
        assert_eq!(config.search.vector_weight, 0.5);
        assert_eq!(
            config.search.normalization,
            devkb_core::search::Normalization::MinMax
        );
        assert_eq!(config.search.vector_timeout_ms, 250);
        assert_eq!(config.search.keyword_timeout_ms, 2000);
    }

    #[test]
    fn test_enabled_embedding_requires_dims() {
        let err = parse("[embedding]\nprovider = \"openai\"\nmodel = \"m\"\n").unwrap_err();
        assert!(err.to_string().contains("embedding.dims"));
    }

    #[test]
    fn test_unknown_providers_rejected() {
        assert!(parse("[embedding]\nprovider = \"magic\"\n").is_err());
        assert!(parse("[llm]\nprovider = \"magic\"\n").is_err());
    }

    #[test]
    fn test_invalid_search_weight_rejected() {
        assert!(parse("[search]\nvector_weight = 2.0\n").is_err());
    }

    #[test]
    fn test_load_config_reports_path() {
        let err = load_config(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here.toml"));
    }
}

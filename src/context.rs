//! Wiring: one place that turns a [`Config`] into ready-to-use services.

use anyhow::Result;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::info;

use devkb_core::embedding::EmbeddingProvider;
use devkb_core::search::HybridSearcher;

use crate::chat::ChatService;
use crate::config::Config;
use crate::db;
use crate::documents::DocumentService;
use crate::embedding::create_provider;
use crate::llm::{create_llm, LlmClients};
use crate::migrate::ensure_schema;
use crate::sqlite_store::SqliteStore;

/// Shared services, cheap to clone.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub store: Arc<SqliteStore>,
    pub searcher: HybridSearcher,
    pub documents: Arc<DocumentService>,
    pub chat: Arc<ChatService>,
}

impl AppContext {
    /// Connect to the database, create the schema if needed, and build the
    /// configured embedding and LLM providers.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        ensure_schema(&pool).await?;
        let embedder = create_provider(&config.embedding)?;
        let llm = create_llm(&config.llm)?;
        info!(
            embedding = %config.embedding.provider,
            llm = llm.is_some(),
            "services ready"
        );
        Ok(Self::from_parts(config.clone(), pool, embedder, llm))
    }

    pub fn from_parts(
        config: Config,
        pool: SqlitePool,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
        llm: Option<LlmClients>,
    ) -> Self {
        let store = match &embedder {
            Some(e) => SqliteStore::new(pool).with_vector_model(e.model_name()),
            None => SqliteStore::new(pool),
        };
        let store = Arc::new(store);
        let searcher = HybridSearcher::new(
            store.clone(),
            store.clone(),
            embedder.clone(),
            config.search.clone(),
        );
        let documents = Arc::new(DocumentService::new(
            store.clone(),
            embedder,
            llm.as_ref().map(|l| l.categorize.clone()),
            config.chunking.clone(),
            config.indexing.clone(),
            config.embedding.batch_size,
        ));
        let chat = Arc::new(ChatService::new(
            searcher.clone(),
            store.clone(),
            llm.map(|l| l.chat),
            config.llm.max_tokens,
            config.llm.context_chars,
        ));

        Self {
            config: Arc::new(config),
            store,
            searcher,
            documents,
            chat,
        }
    }

    pub async fn close(&self) {
        self.store.pool().close().await;
    }
}

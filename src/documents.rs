//! Document lifecycle: create, update, delete, refresh, list, directory
//! indexing and embedding backfill.
//!
//! Creating a document runs the full pipeline:
//!
//! ```text
//! content ─▶ hash (dedupe by path) ─▶ type/language/title ─▶ categorize
//!        ─▶ persist ─▶ chunk ─▶ persist snippets ─▶ embed snippets
//! ```
//!
//! Embedding is best-effort. A provider failure is logged and the snippets
//! stay pending for `devkb embed pending`; the document is still stored and
//! keyword-searchable.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use devkb_core::categorize::{
    categorize_fallback, categorize_prompt, is_known_category, parse_llm_categorization,
    Categorization, CATEGORIZE_SYSTEM_PROMPT,
};
use devkb_core::chunk::{chunk_content, content_hash, detect_content_type, extract_title, ChunkSettings};
use devkb_core::embedding::EmbeddingProvider;
use devkb_core::models::{ContentType, Document, Snippet};
use devkb_core::store::{DocumentStore, VectorIndex};

use crate::config::IndexingConfig;
use crate::llm::CompletionProvider;
use crate::sqlite_store::{DocumentFilter, SqliteStore};

const CATEGORIZE_MAX_TOKENS: u32 = 500;
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("document {0} not found")]
    NotFound(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Unavailable(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<sqlx::Error> for DocumentError {
    fn from(e: sqlx::Error) -> Self {
        DocumentError::Other(e.into())
    }
}

pub type DocResult<T> = std::result::Result<T, DocumentError>;

/// Input for [`DocumentService::create_document`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewDocument {
    pub file_path: String,
    pub content: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content_type: Option<ContentType>,
    #[serde(default)]
    pub language: Option<String>,
}

/// Metadata patch for [`DocumentService::update_document`]. Absent fields
/// are left alone.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DocumentUpdate {
    pub title: Option<String>,
    pub summary: Option<String>,
    pub tags: Option<Vec<String>>,
    pub category: Option<String>,
}

impl DocumentUpdate {
    fn is_empty(&self) -> bool {
        self.title.is_none() && self.summary.is_none() && self.tags.is_none() && self.category.is_none()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentWithSnippets {
    #[serde(flatten)]
    pub document: Document,
    pub snippets: Vec<Snippet>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentPage {
    pub items: Vec<Document>,
    pub total: i64,
    pub page: u32,
    pub page_size: u32,
    pub pages: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexFailure {
    pub file: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexReport {
    pub indexed: usize,
    pub total: usize,
    pub errors: Vec<IndexFailure>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EmbedReport {
    pub total: usize,
    pub embedded: usize,
    pub failed: usize,
}

pub struct DocumentService {
    store: Arc<SqliteStore>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    categorizer: Option<Arc<dyn CompletionProvider>>,
    chunking: ChunkSettings,
    indexing: IndexingConfig,
    batch_size: usize,
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

impl DocumentService {
    pub fn new(
        store: Arc<SqliteStore>,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
        categorizer: Option<Arc<dyn CompletionProvider>>,
        chunking: ChunkSettings,
        indexing: IndexingConfig,
        batch_size: usize,
    ) -> Self {
        Self {
            store,
            embedder,
            categorizer,
            chunking,
            indexing,
            batch_size: batch_size.max(1),
        }
    }

    pub fn store(&self) -> &Arc<SqliteStore> {
        &self.store
    }

    pub async fn create_document(&self, input: NewDocument) -> DocResult<DocumentWithSnippets> {
        let file_path = input.file_path.trim();
        if file_path.is_empty() {
            return Err(DocumentError::Validation("file_path must not be empty".to_string()));
        }
        let hash = content_hash(&input.content);

        if let Some(existing) = self.store.get_document_by_path(file_path).await? {
            if existing.content_hash == hash {
                debug!(file_path, id = %existing.id, "content unchanged");
                return self.get_document(&existing.id).await;
            }
            info!(file_path, id = %existing.id, "content changed, re-creating document");
            self.store.delete_document(&existing.id).await?;
        }

        let (detected_type, detected_language) = detect_content_type(file_path, &input.content);
        let content_type = input.content_type.unwrap_or(detected_type);
        let title = input
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| extract_title(file_path, &input.content));

        let categorization = self.categorize(&input.content).await;
        let language = input
            .language
            .or(detected_language)
            .or_else(|| categorization.language.clone());

        let ts = now();
        let doc = Document {
            id: uuid::Uuid::new_v4().to_string(),
            file_path: file_path.to_string(),
            content: input.content,
            content_hash: hash,
            title: Some(title),
            content_type,
            language,
            summary: Some(categorization.summary).filter(|s| !s.is_empty()),
            tags: categorization.tags.into_iter().collect(),
            category: Some(categorization.category),
            created_at: ts,
            updated_at: ts,
        };
        self.store.insert_document(&doc).await?;

        let snippets = self.chunk_and_embed(&doc).await?;
        info!(
            id = %doc.id,
            file_path = %doc.file_path,
            snippets = snippets.len(),
            "document created"
        );
        Ok(DocumentWithSnippets {
            document: doc,
            snippets,
        })
    }

    pub async fn get_document(&self, id: &str) -> DocResult<DocumentWithSnippets> {
        let document = self
            .store
            .get_document(id)
            .await?
            .ok_or_else(|| DocumentError::NotFound(id.to_string()))?;
        let snippets = self.store.get_snippets(id).await?;
        Ok(DocumentWithSnippets { document, snippets })
    }

    pub async fn update_document(
        &self,
        id: &str,
        update: DocumentUpdate,
    ) -> DocResult<DocumentWithSnippets> {
        let mut current = self.get_document(id).await?;
        if update.is_empty() {
            return Ok(current);
        }

        let doc = &mut current.document;
        if let Some(category) = update.category {
            let category = category.trim().to_lowercase();
            if !is_known_category(&category) {
                return Err(DocumentError::Validation(format!(
                    "unknown category '{}'",
                    category
                )));
            }
            doc.category = Some(category);
        }
        if let Some(title) = update.title {
            doc.title = Some(title);
        }
        if let Some(summary) = update.summary {
            doc.summary = Some(summary);
        }
        if let Some(tags) = update.tags {
            doc.tags = normalize_tags(tags);
        }
        doc.updated_at = now();

        self.store.update_metadata(doc).await?;
        Ok(current)
    }

    pub async fn delete_document(&self, id: &str) -> DocResult<()> {
        if self.store.delete_document(id).await? {
            info!(id, "document deleted");
            Ok(())
        } else {
            Err(DocumentError::NotFound(id.to_string()))
        }
    }

    /// Re-chunk and re-embed a document from its stored content.
    pub async fn refresh_document(&self, id: &str) -> DocResult<DocumentWithSnippets> {
        let mut document = self
            .store
            .get_document(id)
            .await?
            .ok_or_else(|| DocumentError::NotFound(id.to_string()))?;
        let snippets = self.chunk_and_embed(&document).await?;
        document.updated_at = now();
        self.store.update_metadata(&document).await?;
        Ok(DocumentWithSnippets { document, snippets })
    }

    pub async fn list_documents(
        &self,
        filter: &DocumentFilter,
        page: u32,
        page_size: u32,
    ) -> DocResult<DocumentPage> {
        if page == 0 {
            return Err(DocumentError::Validation("page must be >= 1".to_string()));
        }
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(DocumentError::Validation(format!(
                "page_size must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }
        let (items, total) = self.store.list_documents(filter, page, page_size).await?;
        let per_page = i64::from(page_size);
        Ok(DocumentPage {
            items,
            total,
            page,
            page_size,
            pages: (total + per_page - 1) / per_page,
        })
    }

    pub async fn list_tags(&self) -> DocResult<Vec<String>> {
        Ok(self.store.list_tags().await?)
    }

    pub async fn list_categories(&self) -> DocResult<Vec<String>> {
        Ok(self.store.list_categories().await?)
    }

    /// Index every matching file under `dir`.
    ///
    /// `extensions` overrides the configured list; entries may carry a
    /// leading dot. Blank files are counted in `total` but not indexed.
    pub async fn index_directory(
        &self,
        dir: &Path,
        recursive: bool,
        extensions: Option<&[String]>,
    ) -> DocResult<IndexReport> {
        if !dir.is_dir() {
            return Err(DocumentError::Validation(format!(
                "Directory not found: {}",
                dir.display()
            )));
        }

        let wanted: BTreeSet<String> = extensions
            .unwrap_or(&self.indexing.extensions)
            .iter()
            .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
            .collect();

        let mut walker = WalkDir::new(dir).follow_links(self.indexing.follow_symlinks);
        if !recursive {
            walker = walker.max_depth(1);
        }

        let mut report = IndexReport::default();
        for entry in walker.sort_by_file_name() {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!(error = %e, "skipping unreadable directory entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let ext = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_ascii_lowercase())
                .unwrap_or_default();
            if !wanted.contains(&ext) {
                continue;
            }

            report.total += 1;
            match self.index_file(path).await {
                Ok(true) => report.indexed += 1,
                Ok(false) => debug!(path = %path.display(), "skipping blank file"),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to index file");
                    report.errors.push(IndexFailure {
                        file: path.display().to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            dir = %dir.display(),
            indexed = report.indexed,
            total = report.total,
            errors = report.errors.len(),
            "directory indexed"
        );
        Ok(report)
    }

    /// Returns `Ok(false)` for blank files.
    async fn index_file(&self, path: &Path) -> DocResult<bool> {
        let size = std::fs::metadata(path)
            .with_context(|| format!("Failed to stat {}", path.display()))?
            .len();
        if size > self.indexing.max_file_bytes {
            return Err(DocumentError::Validation(format!(
                "file is {} bytes, limit is {}",
                size, self.indexing.max_file_bytes
            )));
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        if content.trim().is_empty() {
            return Ok(false);
        }
        self.create_document(NewDocument {
            file_path: path.display().to_string(),
            content,
            ..Default::default()
        })
        .await?;
        Ok(true)
    }

    /// Embed snippets with no vector or a stale one.
    pub async fn embed_pending(&self, limit: Option<usize>) -> DocResult<EmbedReport> {
        let embedder = self.require_embedder()?;
        self.check_index_dims(embedder.as_ref()).await?;

        let pending = self
            .store
            .pending_snippets(embedder.model_name(), limit)
            .await?;
        let mut report = EmbedReport {
            total: pending.len(),
            ..Default::default()
        };

        for batch in pending.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|p| p.text.clone()).collect();
            match embedder.embed_batch(&texts).await {
                Ok(vectors) => {
                    for (item, vector) in batch.iter().zip(vectors.iter()) {
                        self.store
                            .upsert_vector(
                                &item.snippet_id,
                                &item.document_id,
                                embedder.model_name(),
                                &item.hash,
                                vector,
                            )
                            .await?;
                        report.embedded += 1;
                    }
                }
                Err(e) => {
                    warn!(error = %e, batch = batch.len(), "embedding batch failed");
                    report.failed += batch.len();
                }
            }
        }

        info!(
            total = report.total,
            embedded = report.embedded,
            failed = report.failed,
            "embed pending finished"
        );
        Ok(report)
    }

    /// Drop every vector and embed all snippets again.
    pub async fn rebuild_embeddings(&self) -> DocResult<EmbedReport> {
        self.require_embedder()?;
        let cleared = self.store.clear_vectors().await?;
        info!(cleared, "cleared existing embeddings");
        self.embed_pending(None).await
    }

    pub async fn clear_embeddings(&self) -> DocResult<u64> {
        let cleared = self.store.clear_vectors().await?;
        info!(cleared, "cleared embeddings");
        Ok(cleared)
    }

    fn require_embedder(&self) -> DocResult<&Arc<dyn EmbeddingProvider>> {
        self.embedder.as_ref().ok_or_else(|| {
            DocumentError::Unavailable(
                "Embedding provider is disabled. Set [embedding] provider in config.".to_string(),
            )
        })
    }

    async fn check_index_dims(&self, embedder: &dyn EmbeddingProvider) -> DocResult<()> {
        match self.store.dims().await? {
            Some(dims) if dims != embedder.dims() => Err(DocumentError::Validation(format!(
                "index holds {}-dimensional vectors but the provider produces {}; run `devkb embed rebuild`",
                dims,
                embedder.dims()
            ))),
            _ => Ok(()),
        }
    }

    async fn categorize(&self, content: &str) -> Categorization {
        let Some(llm) = &self.categorizer else {
            return categorize_fallback(content);
        };
        let reply = llm
            .complete(
                CATEGORIZE_SYSTEM_PROMPT,
                &categorize_prompt(content),
                CATEGORIZE_MAX_TOKENS,
            )
            .await;
        match reply.and_then(|r| parse_llm_categorization(&r)) {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "LLM categorization failed, using rule-based fallback");
                categorize_fallback(content)
            }
        }
    }

    async fn chunk_and_embed(&self, doc: &Document) -> DocResult<Vec<Snippet>> {
        let snippets = chunk_content(
            &doc.id,
            &doc.content,
            doc.content_type,
            doc.language.as_deref(),
            &self.chunking,
        );
        self.store.replace_snippets(&doc.id, &snippets).await?;

        if let Some(embedder) = &self.embedder {
            if let Err(e) = self.embed_snippets(embedder.as_ref(), &snippets).await {
                warn!(
                    id = %doc.id,
                    error = %e,
                    "embedding failed; snippets left pending"
                );
            }
        }
        Ok(snippets)
    }

    async fn embed_snippets(
        &self,
        embedder: &dyn EmbeddingProvider,
        snippets: &[Snippet],
    ) -> DocResult<()> {
        self.check_index_dims(embedder).await?;
        for batch in snippets.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|s| s.text.clone()).collect();
            let vectors = embedder.embed_batch(&texts).await?;
            for (snippet, vector) in batch.iter().zip(vectors.iter()) {
                self.store
                    .upsert_vector(
                        &snippet.id,
                        &snippet.document_id,
                        embedder.model_name(),
                        &snippet.hash,
                        vector,
                    )
                    .await?;
            }
        }
        Ok(())
    }
}

fn normalize_tags(tags: Vec<String>) -> BTreeSet<String> {
    tags.into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::ensure_schema;
    use crate::testing::{FakeEmbedder, FakeLlm};
    use sqlx::sqlite::SqlitePoolOptions;

    async fn store() -> Arc<SqliteStore> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        ensure_schema(&pool).await.unwrap();
        Arc::new(SqliteStore::new(pool))
    }

    fn service(
        store: Arc<SqliteStore>,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
        llm: Option<Arc<dyn CompletionProvider>>,
    ) -> DocumentService {
        DocumentService::new(
            store,
            embedder,
            llm,
            ChunkSettings::default(),
            IndexingConfig::default(),
            8,
        )
    }

    fn new_doc(path: &str, content: &str) -> NewDocument {
        NewDocument {
            file_path: path.to_string(),
            content: content.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_detects_metadata_and_chunks() {
        let svc = service(store().await, None, None);
        let created = svc
            .create_document(new_doc(
                "/kb/notes/deploy_guide.md",
                "# Deploying\n\nRun docker compose up.\n",
            ))
            .await
            .unwrap();

        let doc = &created.document;
        assert_eq!(doc.title.as_deref(), Some("Deploying"));
        assert_eq!(doc.content_type, ContentType::Markdown);
        assert_eq!(doc.language.as_deref(), Some("markdown"));
        assert_eq!(doc.category.as_deref(), Some("deployment"));
        assert!(!created.snippets.is_empty());
    }

    #[tokio::test]
    async fn test_create_same_content_is_idempotent() {
        let svc = service(store().await, None, None);
        let first = svc.create_document(new_doc("/a.txt", "hello")).await.unwrap();
        let second = svc.create_document(new_doc("/a.txt", "hello")).await.unwrap();
        assert_eq!(first.document.id, second.document.id);

        let third = svc.create_document(new_doc("/a.txt", "changed")).await.unwrap();
        assert_ne!(first.document.id, third.document.id);
        assert!(matches!(
            svc.get_document(&first.document.id).await,
            Err(DocumentError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_create_embeds_snippets() {
        let store = store().await;
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(FakeEmbedder::new(4));
        let svc = service(store.clone(), Some(embedder), None);
        svc.create_document(new_doc("/a.txt", "some text")).await.unwrap();

        assert_eq!(store.dims().await.unwrap(), Some(4));
        assert!(store.pending_snippets("fake", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_embedding_failure_keeps_document() {
        let store = store().await;
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(FakeEmbedder::failing(4));
        let svc = service(store.clone(), Some(embedder), None);
        let created = svc.create_document(new_doc("/a.txt", "some text")).await.unwrap();

        assert!(svc.get_document(&created.document.id).await.is_ok());
        assert_eq!(store.pending_snippets("fake", None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_llm_categorization_and_fallback() {
        let llm: Arc<dyn CompletionProvider> = Arc::new(FakeLlm::new(
            r#"{"category": "api", "tags": ["rest"], "summary": "Routes."}"#,
        ));
        let svc = service(store().await, None, Some(llm));
        let doc = svc.create_document(new_doc("/r.txt", "zzz")).await.unwrap().document;
        assert_eq!(doc.category.as_deref(), Some("api"));
        assert_eq!(doc.summary.as_deref(), Some("Routes."));
        assert!(doc.tags.contains("rest"));

        let llm: Arc<dyn CompletionProvider> = Arc::new(FakeLlm::new("no json"));
        let svc = service(store().await, None, Some(llm));
        let doc = svc
            .create_document(new_doc("/t.txt", "pytest fixtures"))
            .await
            .unwrap()
            .document;
        assert_eq!(doc.category.as_deref(), Some("testing"));
    }

    #[tokio::test]
    async fn test_update_metadata() {
        let svc = service(store().await, None, None);
        let id = svc
            .create_document(new_doc("/a.txt", "hello"))
            .await
            .unwrap()
            .document
            .id;

        let unchanged = svc.update_document(&id, DocumentUpdate::default()).await.unwrap();
        assert_eq!(unchanged.document.title.as_deref(), Some("A"));

        let updated = svc
            .update_document(
                &id,
                DocumentUpdate {
                    title: Some("Greeting".to_string()),
                    tags: Some(vec![" b ".to_string(), "a".to_string(), "".to_string()]),
                    category: Some("Documentation".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.document.title.as_deref(), Some("Greeting"));
        assert_eq!(updated.document.tags.iter().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(updated.document.category.as_deref(), Some("documentation"));

        let err = svc
            .update_document(
                &id,
                DocumentUpdate {
                    category: Some("nonsense".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DocumentError::Validation(_)));
    }

    #[tokio::test]
    async fn test_delete_and_missing() {
        let svc = service(store().await, None, None);
        let id = svc
            .create_document(new_doc("/a.txt", "hello"))
            .await
            .unwrap()
            .document
            .id;
        svc.delete_document(&id).await.unwrap();
        assert!(matches!(
            svc.delete_document(&id).await,
            Err(DocumentError::NotFound(_))
        ));
        assert!(matches!(
            svc.refresh_document(&id).await,
            Err(DocumentError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_pagination_bounds() {
        let svc = service(store().await, None, None);
        for i in 0..3 {
            svc.create_document(new_doc(&format!("/f{i}.txt"), &format!("body {i}")))
                .await
                .unwrap();
        }
        let page = svc
            .list_documents(&DocumentFilter::default(), 1, 2)
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.pages, 2);
        assert_eq!(page.items.len(), 2);

        assert!(svc.list_documents(&DocumentFilter::default(), 1, 0).await.is_err());
        assert!(svc.list_documents(&DocumentFilter::default(), 1, 101).await.is_err());
        assert!(svc.list_documents(&DocumentFilter::default(), 0, 10).await.is_err());
    }

    #[tokio::test]
    async fn test_index_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.md"), "# A\n\nalpha").unwrap();
        std::fs::write(dir.path().join("blank.txt"), "   \n").unwrap();
        std::fs::write(dir.path().join("skip.bin"), "binary").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/b.py"), "def b():\n    pass\n").unwrap();

        let svc = service(store().await, None, None);
        let report = svc.index_directory(dir.path(), true, None).await.unwrap();
        assert_eq!(report.total, 3);
        assert_eq!(report.indexed, 2);
        assert!(report.errors.is_empty());

        let shallow = svc
            .index_directory(dir.path(), false, Some(&[".py".to_string()]))
            .await
            .unwrap();
        assert_eq!(shallow.total, 0);

        let missing = svc
            .index_directory(&dir.path().join("nope"), true, None)
            .await;
        assert!(matches!(missing, Err(DocumentError::Validation(_))));
    }

    #[tokio::test]
    async fn test_embed_pending_and_rebuild() {
        let store = store().await;
        let svc = service(store.clone(), None, None);
        svc.create_document(new_doc("/a.txt", "one")).await.unwrap();
        svc.create_document(new_doc("/b.txt", "two")).await.unwrap();
        assert!(matches!(
            svc.embed_pending(None).await,
            Err(DocumentError::Unavailable(_))
        ));

        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(FakeEmbedder::new(3));
        let svc = service(store.clone(), Some(embedder), None);
        let report = svc.embed_pending(None).await.unwrap();
        assert_eq!(report.total, 2);
        assert_eq!(report.embedded, 2);

        let report = svc.embed_pending(None).await.unwrap();
        assert_eq!(report.total, 0);

        let report = svc.rebuild_embeddings().await.unwrap();
        assert_eq!(report.embedded, 2);

        let wider: Arc<dyn EmbeddingProvider> = Arc::new(FakeEmbedder::new(5));
        let svc = service(store.clone(), Some(wider), None);
        assert!(matches!(
            svc.embed_pending(None).await,
            Err(DocumentError::Validation(_))
        ));
        assert_eq!(svc.rebuild_embeddings().await.unwrap().embedded, 2);
        assert_eq!(store.dims().await.unwrap(), Some(5));
    }
}

//! Hybrid search orchestrator.
//!
//! [`HybridSearcher`] runs a vector retrieval and a keyword retrieval
//! concurrently, normalizes both onto `[0, 1]`, fuses them per document and
//! returns hydrated, ranked results. It owns no mutable state; everything it
//! needs comes from the [`SearchConfig`] passed at construction and from the
//! backends at call time.
//!
//! # Fusion Algorithm
//!
//! 1. Embed the query and fetch `k` nearest neighbours; fetch `k` keyword
//!    matches. Both run under independent timeouts.
//! 2. Convert vector distances to similarity (`1 - distance`) and normalize
//!    each backend's scores ([`Normalization`]).
//! 3. Merge: documents in both lists score
//!    `vector_weight × v + keyword_weight × k` and are tagged `both`;
//!    single-list documents keep their normalized score and tag.
//! 4. Hydrate from the document store (missing documents are skipped).
//! 5. Sort by score (desc), updated_at (desc), id (asc).
//! 6. Apply the document filters (category, content type, language, tags),
//!    then offset and limit.
//!
//! `min_similarity` drops vector hits below that raw similarity before
//! normalization; keyword hits are unaffected.
//!
//! A failing or slow backend degrades the response instead of failing it.
//! Only when neither backend can answer does the search return an error.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::embedding::EmbeddingProvider;
use crate::error::SearchError;
use crate::models::{DocumentSummary, SearchQuery, SearchResponse, SearchResultItem, SearchSource};
use crate::store::{query_terms, DocumentStore, KeywordHit, NeighborHit, VectorIndex};

const SNIPPET_CHARS: usize = 240;
const MAX_HIGHLIGHTS: usize = 3;
const HIGHLIGHT_CHARS: usize = 200;

/// How raw backend scores are mapped onto `[0, 1]` before fusion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    /// Both backends already report on `[0, 1]` (similarity and term
    /// fraction); scores are only clamped.
    #[default]
    Unit,
    /// Min-max within each backend's result set. All-equal sets map to `1.0`.
    MinMax,
}

/// Tuning knobs for [`HybridSearcher`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_vector_weight")]
    pub vector_weight: f64,
    #[serde(default = "default_keyword_weight")]
    pub keyword_weight: f64,
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,
    /// Minimum number of candidates requested from each backend.
    #[serde(default = "default_candidate_k")]
    pub candidate_k: usize,
    #[serde(default = "default_vector_timeout_ms")]
    pub vector_timeout_ms: u64,
    #[serde(default = "default_keyword_timeout_ms")]
    pub keyword_timeout_ms: u64,
    #[serde(default)]
    pub normalization: Normalization,
}

fn default_vector_weight() -> f64 {
    0.7
}

fn default_keyword_weight() -> f64 {
    0.3
}

fn default_limit() -> usize {
    10
}

fn default_max_limit() -> usize {
    100
}

fn default_candidate_k() -> usize {
    50
}

fn default_vector_timeout_ms() -> u64 {
    5000
}

fn default_keyword_timeout_ms() -> u64 {
    2000
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            vector_weight: default_vector_weight(),
            keyword_weight: default_keyword_weight(),
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            candidate_k: default_candidate_k(),
            vector_timeout_ms: default_vector_timeout_ms(),
            keyword_timeout_ms: default_keyword_timeout_ms(),
            normalization: Normalization::default(),
        }
    }
}

impl SearchConfig {
    /// Reject values that would make every search fail or misbehave.
    pub fn validate(&self) -> anyhow::Result<()> {
        for (name, w) in [
            ("vector_weight", self.vector_weight),
            ("keyword_weight", self.keyword_weight),
        ] {
            if !(0.0..=1.0).contains(&w) {
                anyhow::bail!("search.{} must be in [0.0, 1.0], got {}", name, w);
            }
        }
        if self.max_limit == 0 {
            anyhow::bail!("search.max_limit must be > 0");
        }
        if self.default_limit == 0 || self.default_limit > self.max_limit {
            anyhow::bail!(
                "search.default_limit must be in 1..={}, got {}",
                self.max_limit,
                self.default_limit
            );
        }
        if self.candidate_k == 0 {
            anyhow::bail!("search.candidate_k must be > 0");
        }
        if self.vector_timeout_ms == 0 || self.keyword_timeout_ms == 0 {
            anyhow::bail!("search timeouts must be > 0");
        }
        Ok(())
    }
}

/// Per-document fusion state before hydration.
#[derive(Debug, Default)]
struct Fused {
    vector: Option<f64>,
    keyword: Option<f64>,
    snippet: Option<String>,
}

/// Which retrievals a search call runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Hybrid,
    KeywordOnly,
}

/// Combines vector and keyword retrieval into one ranked result list.
#[derive(Clone)]
pub struct HybridSearcher {
    store: Arc<dyn DocumentStore>,
    index: Arc<dyn VectorIndex>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    config: SearchConfig,
}

impl HybridSearcher {
    /// `embedder = None` leaves vector retrieval permanently unavailable, so
    /// every hybrid search is answered keyword-only and marked degraded.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        index: Arc<dyn VectorIndex>,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
        config: SearchConfig,
    ) -> Self {
        Self {
            store,
            index,
            embedder,
            config,
        }
    }

    /// Run a hybrid search.
    pub async fn search(&self, query: &SearchQuery) -> Result<SearchResponse, SearchError> {
        self.run(query, Mode::Hybrid).await
    }

    /// Run the keyword retrieval alone. A keyword failure is returned as
    /// [`SearchError::BackendUnavailable`].
    pub async fn search_keyword(&self, query: &SearchQuery) -> Result<SearchResponse, SearchError> {
        self.run(query, Mode::KeywordOnly).await
    }

    async fn run(&self, query: &SearchQuery, mode: Mode) -> Result<SearchResponse, SearchError> {
        let text = query.text.trim();
        if text.is_empty() {
            return Err(SearchError::Validation(
                "query text must not be empty".to_string(),
            ));
        }
        let limit = self.resolve_limit(query.limit)?;
        let min_similarity = validate_min_similarity(query.min_similarity)?;
        let offset = query.offset.unwrap_or(0);
        let k = offset
            .saturating_add(limit)
            .saturating_mul(2)
            .max(self.config.candidate_k);

        let mut warnings = Vec::new();
        let (vector, keyword) = match mode {
            Mode::Hybrid => {
                let (v, kw) = tokio::join!(self.vector_retrieval(text, k), self.keyword_retrieval(text, k));
                (Some(v), kw)
            }
            Mode::KeywordOnly => (None, self.keyword_retrieval(text, k).await),
        };

        let vector_hits = match vector {
            None => None,
            Some(Ok(mut hits)) => {
                if let Some(min) = min_similarity {
                    hits.retain(|h| 1.0 - h.distance >= min);
                }
                Some(hits)
            }
            Some(Err(SearchError::BackendUnavailable { backend, reason })) => {
                warn!(backend, %reason, "retrieval backend unavailable, degrading");
                warnings.push(format!("{} backend unavailable: {}", backend, reason));
                None
            }
            Some(Err(e)) => return Err(e),
        };
        let keyword_hits = match keyword {
            Ok(hits) => Some(hits),
            Err(SearchError::BackendUnavailable { backend, reason }) => {
                if mode == Mode::KeywordOnly {
                    return Err(SearchError::BackendUnavailable { backend, reason });
                }
                warn!(backend, %reason, "retrieval backend unavailable, degrading");
                warnings.push(format!("{} backend unavailable: {}", backend, reason));
                None
            }
            Err(e) => return Err(e),
        };

        if mode == Mode::Hybrid && vector_hits.is_none() && keyword_hits.is_none() {
            return Err(SearchError::Configuration(format!(
                "no retrieval backend available ({})",
                warnings.join("; ")
            )));
        }

        let fused = self.fuse(
            vector_hits.as_deref().unwrap_or_default(),
            keyword_hits.as_deref().unwrap_or_default(),
        );
        let terms = query_terms(text);

        let mut items = Vec::with_capacity(fused.len());
        for (doc_id, f) in fused {
            let doc = match self.store.get_document(&doc_id).await {
                Ok(Some(doc)) => doc,
                Ok(None) => {
                    debug!(document_id = %doc_id, "search hit no longer in store, skipping");
                    continue;
                }
                Err(e) => return Err(SearchError::Store(e)),
            };
            if !query.matches(&doc) {
                continue;
            }

            let (score, source) = match (f.vector, f.keyword) {
                (Some(v), Some(kw)) => (
                    self.config.vector_weight * v + self.config.keyword_weight * kw,
                    SearchSource::Both,
                ),
                (Some(v), None) => (v, SearchSource::Vector),
                (None, Some(kw)) => (kw, SearchSource::Keyword),
                (None, None) => continue,
            };
            let snippet = f
                .snippet
                .unwrap_or_else(|| doc.content.chars().take(SNIPPET_CHARS).collect());

            items.push(SearchResultItem {
                score,
                source,
                vector_score: f.vector,
                keyword_score: f.keyword,
                snippet,
                highlights: extract_highlights(&doc.content, &terms),
                document: DocumentSummary::from(&doc),
            });
        }

        items.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then(b.document.updated_at.cmp(&a.document.updated_at))
                .then(a.document.id.cmp(&b.document.id))
        });

        let total_matches = items.len();
        let items: Vec<SearchResultItem> = items.into_iter().skip(offset).take(limit).collect();
        debug!(
            query = text,
            total_matches,
            returned = items.len(),
            degraded = !warnings.is_empty(),
            "search complete"
        );

        Ok(SearchResponse {
            query: text.to_string(),
            items,
            total_matches,
            degraded: !warnings.is_empty(),
            warnings,
        })
    }

    fn resolve_limit(&self, limit: Option<i64>) -> Result<usize, SearchError> {
        match limit {
            Some(n) if n > self.config.max_limit as i64 => Err(SearchError::Validation(format!(
                "limit must be at most {}, got {}",
                self.config.max_limit, n
            ))),
            Some(n) if n > 0 => Ok(n as usize),
            _ => Ok(self.config.default_limit),
        }
    }

    async fn vector_retrieval(&self, text: &str, k: usize) -> Result<Vec<NeighborHit>, SearchError> {
        let timeout = Duration::from_millis(self.config.vector_timeout_ms);
        with_timeout("vector", timeout, async {
            let embedder = self.embedder.as_ref().ok_or_else(|| SearchError::BackendUnavailable {
                backend: "vector",
                reason: "no embedding provider configured".to_string(),
            })?;
            let index_dims = self.index.dims().await.map_err(unavailable("vector"))?;
            let Some(index_dims) = index_dims else {
                return Ok(Vec::new());
            };
            let query_vec = embedder.embed(text).await.map_err(unavailable("vector"))?;
            if query_vec.len() != index_dims {
                return Err(SearchError::Configuration(format!(
                    "embedding model '{}' produced {} dims but the vector index holds {} dims; rebuild embeddings",
                    embedder.model_name(),
                    query_vec.len(),
                    index_dims
                )));
            }
            self.index
                .nearest_neighbors(&query_vec, k)
                .await
                .map_err(unavailable("vector"))
        })
        .await
    }

    async fn keyword_retrieval(&self, text: &str, k: usize) -> Result<Vec<KeywordHit>, SearchError> {
        let timeout = Duration::from_millis(self.config.keyword_timeout_ms);
        with_timeout("keyword", timeout, async {
            self.store
                .keyword_match(text, k)
                .await
                .map_err(unavailable("keyword"))
        })
        .await
    }

    fn fuse(&self, vector: &[NeighborHit], keyword: &[KeywordHit]) -> HashMap<String, Fused> {
        let similarities: Vec<f64> = vector.iter().map(|h| 1.0 - h.distance).collect();
        let keyword_scores: Vec<f64> = keyword.iter().map(|h| h.score).collect();
        let norm_v = normalize_scores(&similarities, self.config.normalization);
        let norm_k = normalize_scores(&keyword_scores, self.config.normalization);

        let mut fused: HashMap<String, Fused> = HashMap::new();
        for (hit, score) in vector.iter().zip(norm_v) {
            let entry = fused.entry(hit.document_id.clone()).or_default();
            if entry.vector.map_or(true, |s| score > s) {
                entry.vector = Some(score);
                if hit.snippet.is_some() {
                    entry.snippet = hit.snippet.clone();
                }
            }
        }
        for (hit, score) in keyword.iter().zip(norm_k) {
            let entry = fused.entry(hit.document_id.clone()).or_default();
            if entry.keyword.map_or(true, |s| score > s) {
                entry.keyword = Some(score);
            }
            if entry.snippet.is_none() {
                entry.snippet = hit.snippet.clone();
            }
        }
        fused
    }
}

fn validate_min_similarity(min: Option<f64>) -> Result<Option<f64>, SearchError> {
    match min {
        Some(m) if !(0.0..=1.0).contains(&m) => Err(SearchError::Validation(format!(
            "min_similarity must be in [0.0, 1.0], got {}",
            m
        ))),
        other => Ok(other),
    }
}

fn unavailable(backend: &'static str) -> impl Fn(anyhow::Error) -> SearchError {
    move |e| SearchError::BackendUnavailable {
        backend,
        reason: format!("{:#}", e),
    }
}

async fn with_timeout<T>(
    backend: &'static str,
    timeout: Duration,
    fut: impl Future<Output = Result<T, SearchError>>,
) -> Result<T, SearchError> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(SearchError::BackendUnavailable {
            backend,
            reason: format!("timed out after {} ms", timeout.as_millis()),
        }),
    }
}

/// Map raw scores onto `[0.0, 1.0]`, preserving input order.
pub fn normalize_scores(raw: &[f64], normalization: Normalization) -> Vec<f64> {
    match normalization {
        Normalization::Unit => raw.iter().map(|s| s.clamp(0.0, 1.0)).collect(),
        Normalization::MinMax => {
            if raw.is_empty() {
                return Vec::new();
            }
            let s_min = raw.iter().copied().fold(f64::INFINITY, f64::min);
            let s_max = raw.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            raw.iter()
                .map(|s| {
                    if (s_max - s_min).abs() < f64::EPSILON {
                        1.0
                    } else {
                        (s - s_min) / (s_max - s_min)
                    }
                })
                .collect()
        }
    }
}

/// Up to three sentences of `content` that mention a query term.
pub fn extract_highlights(content: &str, terms: &[String]) -> Vec<String> {
    if terms.is_empty() {
        return Vec::new();
    }
    content
        .split(['.', '!', '?', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter(|s| {
            let lower = s.to_lowercase();
            terms.iter().any(|t| lower.contains(t.as_str()))
        })
        .take(MAX_HIGHLIGHTS)
        .map(|s| {
            if s.chars().count() > HIGHLIGHT_CHARS {
                let cut: String = s.chars().take(HIGHLIGHT_CHARS).collect();
                format!("{}...", cut)
            } else {
                s.to_string()
            }
        })
        .collect()
}

//! Storage abstraction consumed by the search orchestrator.
//!
//! The orchestrator only reads: it asks a [`DocumentStore`] for keyword
//! matches and document hydration, and a [`VectorIndex`] for nearest
//! neighbours. Writes happen through the concrete store types owned by the
//! application (SQLite) or by tests ([`memory::InMemoryStore`]).
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::Document;

/// A document returned by the vector index, nearest first.
#[derive(Debug, Clone, PartialEq)]
pub struct NeighborHit {
    pub document_id: String,
    /// Cosine distance in `[0.0, 2.0]`; `0.0` is identical.
    pub distance: f64,
    /// Text of the snippet that matched best, if the index keeps it.
    pub snippet: Option<String>,
}

/// A document returned by keyword matching, best match first.
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordHit {
    pub document_id: String,
    /// Fraction of query terms found in the title or content, in `[0.0, 1.0]`.
    pub score: f64,
    pub snippet: Option<String>,
}

/// Read access to documents.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`get_document`](DocumentStore::get_document) | Hydrate a document by ID |
/// | [`keyword_match`](DocumentStore::keyword_match) | Substring/token matching over title and content |
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Returns `None` when the document does not exist (e.g. it was deleted
    /// after a backend returned its ID).
    async fn get_document(&self, id: &str) -> Result<Option<Document>>;

    /// Case-insensitive token matching against title and content.
    ///
    /// Results are ordered by score descending, then `updated_at`
    /// descending, and hold at most `limit` entries.
    async fn keyword_match(&self, text: &str, limit: usize) -> Result<Vec<KeywordHit>>;
}

/// Nearest-neighbour lookup over stored embeddings.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Dimensionality of the stored vectors, or `None` while the index is empty.
    async fn dims(&self) -> Result<Option<usize>>;

    /// At most `k` documents ordered by ascending cosine distance. A document
    /// with several embedded snippets is reported once, at its best distance.
    async fn nearest_neighbors(&self, vector: &[f32], k: usize) -> Result<Vec<NeighborHit>>;
}

/// Split a query into lowercase terms, dropping duplicates but keeping order.
pub fn query_terms(text: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for term in text.split_whitespace().map(|t| t.to_lowercase()) {
        if !terms.contains(&term) {
            terms.push(term);
        }
    }
    terms
}

/// Fraction of `terms` that occur in `haystack_lower`.
///
/// `haystack_lower` must already be lowercased.
pub fn term_match_score(terms: &[String], haystack_lower: &str) -> f64 {
    if terms.is_empty() {
        return 0.0;
    }
    let matched = terms
        .iter()
        .filter(|t| haystack_lower.contains(t.as_str()))
        .count();
    matched as f64 / terms.len() as f64
}

/// Short excerpt around the first occurrence of any term, on char boundaries.
pub fn excerpt(text: &str, terms: &[String], max_chars: usize) -> String {
    let lower = text.to_lowercase();
    let start_byte = terms
        .iter()
        .filter_map(|t| lower.find(t.as_str()))
        .min()
        .unwrap_or(0);
    // Lowercasing can change byte offsets for some scripts; map via chars.
    let start_char = lower[..start_byte.min(lower.len())].chars().count();
    let begin = start_char.saturating_sub(max_chars / 4);
    text.chars().skip(begin).take(max_chars).collect()
}

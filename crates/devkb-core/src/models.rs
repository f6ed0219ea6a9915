//! Core data models shared by the store, the search orchestrator and the
//! application layer.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Coarse classification of a document's content, used to pick a chunker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Code,
    Markdown,
    Plain,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Code => "code",
            ContentType::Markdown => "markdown",
            ContentType::Plain => "plain",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "code" => Ok(ContentType::Code),
            "markdown" => Ok(ContentType::Markdown),
            "plain" => Ok(ContentType::Plain),
            other => anyhow::bail!(
                "invalid content type '{}': expected code, markdown, or plain",
                other
            ),
        }
    }
}

/// A stored document.
///
/// Timestamps are Unix seconds. `tags` is kept ordered so serialized output
/// is stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub file_path: String,
    pub content: String,
    pub content_hash: String,
    pub title: Option<String>,
    pub content_type: ContentType,
    pub language: Option<String>,
    pub summary: Option<String>,
    pub tags: BTreeSet<String>,
    pub category: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A chunk of a document's content, the unit that gets embedded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snippet {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub text: String,
    pub start_line: Option<i64>,
    pub end_line: Option<i64>,
    pub language: Option<String>,
    pub intent: Option<String>,
    /// SHA-256 of `text`, used to detect stale embeddings.
    pub hash: String,
}

/// Which retrieval backend(s) produced a search result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchSource {
    Vector,
    Keyword,
    Both,
}

impl fmt::Display for SearchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchSource::Vector => f.write_str("vector"),
            SearchSource::Keyword => f.write_str("keyword"),
            SearchSource::Both => f.write_str("both"),
        }
    }
}

/// Input to [`HybridSearcher::search`](crate::search::HybridSearcher::search).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchQuery {
    pub text: String,
    /// Missing or non-positive values fall back to the configured default.
    #[serde(default)]
    pub limit: Option<i64>,
    /// Number of fused results to skip before applying `limit`.
    #[serde(default)]
    pub offset: Option<usize>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub content_type: Option<ContentType>,
    #[serde(default)]
    pub language: Option<String>,
    /// Keep documents carrying at least one of these tags.
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    /// Drop vector hits whose similarity is below this, in `[0.0, 1.0]`.
    #[serde(default)]
    pub min_similarity: Option<f64>,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = Some(content_type);
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_min_similarity(mut self, min: f64) -> Self {
        self.min_similarity = Some(min);
        self
    }

    /// Whether `doc` passes the category, content type, language and tag
    /// filters. Unset filters match everything.
    pub fn matches(&self, doc: &Document) -> bool {
        if let Some(cat) = self.category.as_deref() {
            if doc.category.as_deref() != Some(cat) {
                return false;
            }
        }
        if let Some(ct) = self.content_type {
            if doc.content_type != ct {
                return false;
            }
        }
        if let Some(lang) = self.language.as_deref() {
            if doc.language.as_deref() != Some(lang) {
                return false;
            }
        }
        match self.tags.as_deref() {
            Some(wanted) if !wanted.is_empty() => wanted.iter().any(|t| doc.tags.contains(t)),
            _ => true,
        }
    }
}

/// Document fields carried on a search result. The full content is left out.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentSummary {
    pub id: String,
    pub file_path: String,
    pub title: Option<String>,
    pub content_type: ContentType,
    pub language: Option<String>,
    pub category: Option<String>,
    pub tags: BTreeSet<String>,
    pub summary: Option<String>,
    pub updated_at: i64,
}

impl From<&Document> for DocumentSummary {
    fn from(doc: &Document) -> Self {
        Self {
            id: doc.id.clone(),
            file_path: doc.file_path.clone(),
            title: doc.title.clone(),
            content_type: doc.content_type,
            language: doc.language.clone(),
            category: doc.category.clone(),
            tags: doc.tags.clone(),
            summary: doc.summary.clone(),
            updated_at: doc.updated_at,
        }
    }
}

/// A single ranked search result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResultItem {
    pub document: DocumentSummary,
    /// Combined relevance score in `[0.0, 1.0]`.
    pub score: f64,
    pub source: SearchSource,
    /// Normalized vector score, if the vector backend returned this document.
    pub vector_score: Option<f64>,
    /// Normalized keyword score, if the keyword backend returned this document.
    pub keyword_score: Option<f64>,
    /// Best-matching excerpt from the document.
    pub snippet: String,
    pub highlights: Vec<String>,
}

/// The outcome of one search call.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub items: Vec<SearchResultItem>,
    /// Fused matches after filtering, before offset/limit were applied.
    pub total_matches: usize,
    /// True when one of the retrieval backends was unavailable.
    pub degraded: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

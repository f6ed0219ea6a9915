//! Error taxonomy for the search orchestrator.

use thiserror::Error;

/// Errors surfaced by [`HybridSearcher::search`](crate::search::HybridSearcher::search).
///
/// A backend that times out or fails is not an error on its own: the
/// orchestrator degrades to the remaining backend. Only when no backend can
/// answer, or the vector setup is inconsistent, does a search fail.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Malformed query input, rejected before any backend call.
    #[error("invalid query: {0}")]
    Validation(String),

    /// A retrieval backend errored or timed out.
    #[error("{backend} backend unavailable: {reason}")]
    BackendUnavailable {
        backend: &'static str,
        reason: String,
    },

    /// The backends cannot serve this query as configured.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Hydrating a result from the document store failed unexpectedly.
    #[error("document store error: {0}")]
    Store(#[source] anyhow::Error),
}

impl SearchError {
    pub fn code(&self) -> &'static str {
        match self {
            SearchError::Validation(_) => "bad_request",
            SearchError::BackendUnavailable { .. } => "unavailable",
            SearchError::Configuration(_) => "config_error",
            SearchError::Store(_) => "internal",
        }
    }
}

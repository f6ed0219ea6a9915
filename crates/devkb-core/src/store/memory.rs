//! In-memory [`DocumentStore`] + [`VectorIndex`] for tests and embedding
//! DevKB in other programs.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock`. Vector search is
//! brute-force cosine distance over every stored snippet vector.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::embedding::cosine_distance;
use crate::models::{Document, Snippet};

use super::{
    excerpt, query_terms, term_match_score, DocumentStore, KeywordHit, NeighborHit, VectorIndex,
};

struct StoredVector {
    snippet_id: String,
    document_id: String,
    vector: Vec<f32>,
}

/// In-memory store.
#[derive(Default)]
pub struct InMemoryStore {
    docs: RwLock<HashMap<String, Document>>,
    snippets: RwLock<Vec<Snippet>>,
    vectors: RwLock<Vec<StoredVector>>,
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a document by ID.
    pub fn upsert_document(&self, doc: Document) -> Result<()> {
        write(&self.docs)?.insert(doc.id.clone(), doc);
        Ok(())
    }

    /// Remove a document together with its snippets and vectors.
    pub fn remove_document(&self, id: &str) -> Result<bool> {
        let removed = write(&self.docs)?.remove(id).is_some();
        write(&self.snippets)?.retain(|s| s.document_id != id);
        write(&self.vectors)?.retain(|v| v.document_id != id);
        Ok(removed)
    }

    /// Replace all snippets of a document. Existing vectors for the document
    /// are dropped; new ones are stored when `vectors` is given.
    pub fn replace_snippets(
        &self,
        doc_id: &str,
        snippets: &[Snippet],
        vectors: Option<&[Vec<f32>]>,
    ) -> Result<()> {
        {
            let mut stored = write(&self.snippets)?;
            stored.retain(|s| s.document_id != doc_id);
            stored.extend(snippets.iter().cloned());
        }
        let mut stored_vecs = write(&self.vectors)?;
        stored_vecs.retain(|v| v.document_id != doc_id);
        if let Some(vecs) = vectors {
            for (s, v) in snippets.iter().zip(vecs.iter()) {
                stored_vecs.push(StoredVector {
                    snippet_id: s.id.clone(),
                    document_id: doc_id.to_string(),
                    vector: v.clone(),
                });
            }
        }
        Ok(())
    }

    /// Store a single document-level vector, replacing any the document had.
    ///
    /// Convenience for callers that embed whole documents rather than snippets.
    pub fn set_document_vector(&self, doc_id: &str, vector: Vec<f32>) -> Result<()> {
        let mut stored_vecs = write(&self.vectors)?;
        stored_vecs.retain(|v| v.document_id != doc_id);
        stored_vecs.push(StoredVector {
            snippet_id: format!("{}#doc", doc_id),
            document_id: doc_id.to_string(),
            vector,
        });
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        Ok(read(&self.docs)?.get(id).cloned())
    }

    async fn keyword_match(&self, text: &str, limit: usize) -> Result<Vec<KeywordHit>> {
        let terms = query_terms(text);
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let docs = read(&self.docs)?;
        let mut scored: Vec<(KeywordHit, i64)> = docs
            .values()
            .filter_map(|doc| {
                let haystack = format!(
                    "{}\n{}",
                    doc.title.as_deref().unwrap_or_default(),
                    doc.content
                )
                .to_lowercase();
                let score = term_match_score(&terms, &haystack);
                (score > 0.0).then(|| {
                    (
                        KeywordHit {
                            document_id: doc.id.clone(),
                            score,
                            snippet: Some(excerpt(&doc.content, &terms, 240)),
                        },
                        doc.updated_at,
                    )
                })
            })
            .collect();
        scored.sort_by(|(a, a_ts), (b, b_ts)| {
            b.score
                .total_cmp(&a.score)
                .then(b_ts.cmp(a_ts))
                .then(a.document_id.cmp(&b.document_id))
        });
        scored.truncate(limit);
        Ok(scored.into_iter().map(|(hit, _)| hit).collect())
    }
}

#[async_trait]
impl VectorIndex for InMemoryStore {
    async fn dims(&self) -> Result<Option<usize>> {
        Ok(read(&self.vectors)?.first().map(|v| v.vector.len()))
    }

    async fn nearest_neighbors(&self, vector: &[f32], k: usize) -> Result<Vec<NeighborHit>> {
        let vecs = read(&self.vectors)?;
        let snippets = read(&self.snippets)?;

        let mut best: HashMap<&str, (f64, &str)> = HashMap::new();
        for sv in vecs.iter() {
            let distance = cosine_distance(vector, &sv.vector) as f64;
            let entry = best
                .entry(sv.document_id.as_str())
                .or_insert((distance, sv.snippet_id.as_str()));
            if distance < entry.0 {
                *entry = (distance, sv.snippet_id.as_str());
            }
        }

        let mut hits: Vec<NeighborHit> = best
            .into_iter()
            .map(|(doc_id, (distance, snippet_id))| NeighborHit {
                document_id: doc_id.to_string(),
                distance,
                snippet: snippets
                    .iter()
                    .find(|s| s.id == snippet_id)
                    .map(|s| s.text.chars().take(240).collect()),
            })
            .collect();
        hits.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then(a.document_id.cmp(&b.document_id))
        });
        hits.truncate(k);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContentType;
    use std::collections::BTreeSet;

    fn doc(id: &str, content: &str, updated_at: i64) -> Document {
        Document {
            id: id.to_string(),
            file_path: format!("/notes/{}.txt", id),
            content: content.to_string(),
            content_hash: String::new(),
            title: None,
            content_type: ContentType::Plain,
            language: None,
            summary: None,
            tags: BTreeSet::new(),
            category: None,
            created_at: updated_at,
            updated_at,
        }
    }

    fn snippet(id: &str, doc_id: &str, text: &str) -> Snippet {
        Snippet {
            id: id.to_string(),
            document_id: doc_id.to_string(),
            chunk_index: 0,
            text: text.to_string(),
            start_line: Some(1),
            end_line: Some(1),
            language: None,
            intent: None,
            hash: String::new(),
        }
    }

    #[tokio::test]
    async fn test_keyword_match_orders_by_score() {
        let store = InMemoryStore::new();
        store.upsert_document(doc("d1", "print hello world", 10)).unwrap();
        store.upsert_document(doc("d2", "print goodbye world", 5)).unwrap();
        store.upsert_document(doc("d3", "unrelated", 7)).unwrap();

        let hits = store.keyword_match("hello world", 10).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].document_id, "d1");
        assert!((hits[0].score - 1.0).abs() < 1e-9);
        assert_eq!(hits[1].document_id, "d2");
        assert!((hits[1].score - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_keyword_match_searches_title() {
        let store = InMemoryStore::new();
        let mut d = doc("d1", "body text", 1);
        d.title = Some("Deployment Guide".to_string());
        store.upsert_document(d).unwrap();
        let hits = store.keyword_match("deployment", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn test_nearest_neighbors_reports_best_snippet_per_doc() {
        let store = InMemoryStore::new();
        store.upsert_document(doc("d1", "a", 1)).unwrap();
        store.upsert_document(doc("d2", "b", 1)).unwrap();
        store
            .replace_snippets(
                "d1",
                &[snippet("s1", "d1", "far"), snippet("s2", "d1", "near")],
                Some(&[vec![0.0, 1.0], vec![1.0, 0.0]]),
            )
            .unwrap();
        store
            .replace_snippets("d2", &[snippet("s3", "d2", "mid")], Some(&[vec![1.0, 1.0]]))
            .unwrap();

        assert_eq!(store.dims().await.unwrap(), Some(2));
        let hits = store.nearest_neighbors(&[1.0, 0.0], 10).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].document_id, "d1");
        assert!(hits[0].distance.abs() < 1e-6);
        assert_eq!(hits[0].snippet.as_deref(), Some("near"));
        assert_eq!(hits[1].document_id, "d2");
    }

    #[tokio::test]
    async fn test_remove_document_drops_vectors() {
        let store = InMemoryStore::new();
        store.upsert_document(doc("d1", "a", 1)).unwrap();
        store.set_document_vector("d1", vec![1.0, 0.0]).unwrap();
        assert!(store.remove_document("d1").unwrap());
        assert_eq!(store.dims().await.unwrap(), None);
        assert!(store.get_document("d1").await.unwrap().is_none());
    }
}

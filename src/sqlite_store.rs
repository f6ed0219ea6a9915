//! SQLite-backed [`DocumentStore`] and [`VectorIndex`].
//!
//! Besides the two read traits the search orchestrator consumes, this type
//! carries the write and listing queries used by the document service, the
//! chat service and `devkb stats`.
//!
//! Vectors live in `snippet_vectors` as little-endian `f32` BLOBs, one row per
//! snippet. Nearest-neighbour search loads them and ranks by cosine distance
//! in process, reporting each document once at its best snippet.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::{BTreeSet, HashMap};

use devkb_core::embedding::{blob_to_vec, cosine_distance, vec_to_blob};
use devkb_core::models::{ContentType, Document, Snippet};
use devkb_core::store::{excerpt, query_terms, DocumentStore, KeywordHit, NeighborHit, VectorIndex};

const SNIPPET_CHARS: usize = 240;

/// Optional filters for [`SqliteStore::list_documents`].
#[derive(Debug, Clone, Default)]
pub struct DocumentFilter {
    pub content_type: Option<ContentType>,
    pub language: Option<String>,
    pub category: Option<String>,
}

/// A snippet still waiting for (or holding a stale) embedding.
#[derive(Debug, Clone)]
pub struct PendingSnippet {
    pub snippet_id: String,
    pub document_id: String,
    pub text: String,
    pub hash: String,
}

pub struct SqliteStore {
    pool: SqlitePool,
    /// When set, the vector index only sees vectors produced by this model.
    vector_model: Option<String>,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            vector_model: None,
        }
    }

    /// Restrict [`VectorIndex`] reads to vectors from `model`. Vectors left
    /// over from another model stay pending until re-embedded.
    pub fn with_vector_model(mut self, model: impl Into<String>) -> Self {
        self.vector_model = Some(model.into());
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn insert_document(&self, doc: &Document) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO documents (id, file_path, content, content_hash, title, content_type,
                                   language, summary, tags, category, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.file_path)
        .bind(&doc.content)
        .bind(&doc.content_hash)
        .bind(&doc.title)
        .bind(doc.content_type.as_str())
        .bind(&doc.language)
        .bind(&doc.summary)
        .bind(serde_json::to_string(&doc.tags)?)
        .bind(&doc.category)
        .bind(doc.created_at)
        .bind(doc.updated_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to insert document {}", doc.file_path))?;
        Ok(())
    }

    pub async fn get_document_by_path(&self, file_path: &str) -> Result<Option<Document>> {
        let row = sqlx::query("SELECT * FROM documents WHERE file_path = ?")
            .bind(file_path)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_document).transpose()
    }

    /// Overwrite the metadata fields of a document and bump `updated_at`.
    pub async fn update_metadata(&self, doc: &Document) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE documents
            SET title = ?, summary = ?, tags = ?, category = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&doc.title)
        .bind(&doc.summary)
        .bind(serde_json::to_string(&doc.tags)?)
        .bind(&doc.category)
        .bind(doc.updated_at)
        .bind(&doc.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Delete a document with its snippets and vectors. Returns whether a
    /// document row was removed.
    pub async fn delete_document(&self, id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM snippet_vectors WHERE document_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM snippets WHERE document_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    /// Replace every snippet of a document. Old vectors go with them.
    pub async fn replace_snippets(&self, doc_id: &str, snippets: &[Snippet]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM snippet_vectors WHERE document_id = ?")
            .bind(doc_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM snippets WHERE document_id = ?")
            .bind(doc_id)
            .execute(&mut *tx)
            .await?;

        for s in snippets {
            sqlx::query(
                r#"
                INSERT INTO snippets (id, document_id, chunk_index, text, start_line, end_line,
                                      language, intent, hash)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&s.id)
            .bind(doc_id)
            .bind(s.chunk_index)
            .bind(&s.text)
            .bind(s.start_line)
            .bind(s.end_line)
            .bind(&s.language)
            .bind(&s.intent)
            .bind(&s.hash)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn get_snippets(&self, doc_id: &str) -> Result<Vec<Snippet>> {
        let rows = sqlx::query(
            "SELECT * FROM snippets WHERE document_id = ? ORDER BY chunk_index ASC",
        )
        .bind(doc_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| Snippet {
                id: row.get("id"),
                document_id: row.get("document_id"),
                chunk_index: row.get("chunk_index"),
                text: row.get("text"),
                start_line: row.get("start_line"),
                end_line: row.get("end_line"),
                language: row.get("language"),
                intent: row.get("intent"),
                hash: row.get("hash"),
            })
            .collect())
    }

    pub async fn upsert_vector(
        &self,
        snippet_id: &str,
        doc_id: &str,
        model: &str,
        hash: &str,
        vector: &[f32],
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO snippet_vectors (snippet_id, document_id, model, dims, hash, embedding, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(snippet_id) DO UPDATE SET
                document_id = excluded.document_id,
                model = excluded.model,
                dims = excluded.dims,
                hash = excluded.hash,
                embedding = excluded.embedding,
                created_at = excluded.created_at
            "#,
        )
        .bind(snippet_id)
        .bind(doc_id)
        .bind(model)
        .bind(vector.len() as i64)
        .bind(hash)
        .bind(vec_to_blob(vector))
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Snippets with no vector, or whose vector was computed from different
    /// text or by a different model.
    pub async fn pending_snippets(
        &self,
        model: &str,
        limit: Option<usize>,
    ) -> Result<Vec<PendingSnippet>> {
        let rows = sqlx::query(
            r#"
            SELECT s.id, s.document_id, s.text, s.hash
            FROM snippets s
            LEFT JOIN snippet_vectors v ON v.snippet_id = s.id
            WHERE v.snippet_id IS NULL OR v.hash != s.hash OR v.model != ?
            ORDER BY s.document_id, s.chunk_index
            LIMIT ?
            "#,
        )
        .bind(model)
        .bind(limit.map(|l| l as i64).unwrap_or(-1))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| PendingSnippet {
                snippet_id: row.get("id"),
                document_id: row.get("document_id"),
                text: row.get("text"),
                hash: row.get("hash"),
            })
            .collect())
    }

    /// Drop every stored vector. Documents and snippets are kept.
    pub async fn clear_vectors(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM snippet_vectors")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// A page of documents, newest first, plus the total matching count.
    pub async fn list_documents(
        &self,
        filter: &DocumentFilter,
        page: u32,
        page_size: u32,
    ) -> Result<(Vec<Document>, i64)> {
        let where_sql = "WHERE (?1 IS NULL OR content_type = ?1) \
                         AND (?2 IS NULL OR language = ?2) \
                         AND (?3 IS NULL OR category = ?3)";
        let content_type = filter.content_type.map(|c| c.as_str());

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM documents {}",
            where_sql
        ))
        .bind(content_type)
        .bind(&filter.language)
        .bind(&filter.category)
        .fetch_one(&self.pool)
        .await?;

        let offset = i64::from(page.saturating_sub(1)) * i64::from(page_size);
        let rows = sqlx::query(&format!(
            "SELECT * FROM documents {} ORDER BY updated_at DESC, id ASC LIMIT ?4 OFFSET ?5",
            where_sql
        ))
        .bind(content_type)
        .bind(&filter.language)
        .bind(&filter.category)
        .bind(i64::from(page_size))
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let docs = rows.iter().map(row_to_document).collect::<Result<Vec<_>>>()?;
        Ok((docs, total))
    }

    pub async fn list_tags(&self) -> Result<Vec<String>> {
        let rows: Vec<String> = sqlx::query_scalar("SELECT tags FROM documents")
            .fetch_all(&self.pool)
            .await?;
        let mut tags = BTreeSet::new();
        for raw in rows {
            tags.extend(parse_tags(&raw));
        }
        Ok(tags.into_iter().collect())
    }

    pub async fn list_categories(&self) -> Result<Vec<String>> {
        let cats: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT category FROM documents WHERE category IS NOT NULL ORDER BY category",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(cats)
    }

    /// Record one question/answer exchange of a conversation.
    pub async fn insert_conversation(
        &self,
        conversation_id: &str,
        query: &str,
        response: &str,
        document_id: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO conversations (id, conversation_id, document_id, query, response, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(conversation_id)
        .bind(document_id)
        .bind(query)
        .bind(response)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// The most recent `limit` exchanges of a conversation, oldest first.
    pub async fn conversation_history(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<(String, String)>> {
        let rows = sqlx::query(
            r#"
            SELECT query, response FROM (
                SELECT query, response, created_at, rowid AS seq
                FROM conversations
                WHERE conversation_id = ?
                ORDER BY created_at DESC, seq DESC
                LIMIT ?
            )
            ORDER BY created_at ASC, seq ASC
            "#,
        )
        .bind(conversation_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| (row.get("query"), row.get("response")))
            .collect())
    }
}

fn parse_tags(raw: &str) -> BTreeSet<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

fn row_to_document(row: &SqliteRow) -> Result<Document> {
    let content_type: String = row.get("content_type");
    let tags: String = row.get("tags");
    Ok(Document {
        id: row.get("id"),
        file_path: row.get("file_path"),
        content: row.get("content"),
        content_hash: row.get("content_hash"),
        title: row.get("title"),
        content_type: content_type.parse()?,
        language: row.get("language"),
        summary: row.get("summary"),
        tags: parse_tags(&tags),
        category: row.get("category"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query("SELECT * FROM documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_document).transpose()
    }

    async fn keyword_match(&self, text: &str, limit: usize) -> Result<Vec<KeywordHit>> {
        let terms = query_terms(text);
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        // One instr() test per term over lowercased title + content.
        let matched = terms
            .iter()
            .map(|_| "(instr(haystack, ?) > 0)")
            .collect::<Vec<_>>()
            .join(" + ");
        let sql = format!(
            r#"
            SELECT id, content, updated_at, CAST(({matched}) AS REAL) / ? AS score
            FROM (
                SELECT id, content, updated_at,
                       lower(COALESCE(title, '') || char(10) || content) AS haystack
                FROM documents
            )
            WHERE score > 0
            ORDER BY score DESC, updated_at DESC, id ASC
            LIMIT ?
            "#
        );

        let mut query = sqlx::query(&sql);
        for term in &terms {
            query = query.bind(term);
        }
        let rows = query
            .bind(terms.len() as f64)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let content: String = row.get("content");
                KeywordHit {
                    document_id: row.get("id"),
                    score: row.get("score"),
                    snippet: Some(excerpt(&content, &terms, SNIPPET_CHARS)),
                }
            })
            .collect())
    }
}

#[async_trait]
impl VectorIndex for SqliteStore {
    async fn dims(&self) -> Result<Option<usize>> {
        let dims: Option<i64> = sqlx::query_scalar(
            "SELECT dims FROM snippet_vectors WHERE (?1 IS NULL OR model = ?1) LIMIT 1",
        )
        .bind(&self.vector_model)
        .fetch_optional(&self.pool)
        .await?;
        Ok(dims.map(|d| d as usize))
    }

    async fn nearest_neighbors(&self, vector: &[f32], k: usize) -> Result<Vec<NeighborHit>> {
        let rows = sqlx::query(
            r#"
            SELECT v.document_id, v.embedding, substr(s.text, 1, 240) AS snippet
            FROM snippet_vectors v
            JOIN snippets s ON s.id = v.snippet_id
            WHERE (?1 IS NULL OR v.model = ?1)
            "#,
        )
        .bind(&self.vector_model)
        .fetch_all(&self.pool)
        .await?;

        let mut best: HashMap<String, NeighborHit> = HashMap::new();
        for row in &rows {
            let blob: Vec<u8> = row.get("embedding");
            let distance = cosine_distance(vector, &blob_to_vec(&blob)) as f64;
            let document_id: String = row.get("document_id");
            match best.get(&document_id) {
                Some(hit) if hit.distance <= distance => {}
                _ => {
                    best.insert(
                        document_id.clone(),
                        NeighborHit {
                            document_id,
                            distance,
                            snippet: row.get("snippet"),
                        },
                    );
                }
            }
        }

        let mut hits: Vec<NeighborHit> = best.into_values().collect();
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
    use crate::migrate::ensure_schema;
    use devkb_core::chunk::content_hash;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_store() -> SqliteStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        ensure_schema(&pool).await.unwrap();
        SqliteStore::new(pool)
    }

    fn doc(id: &str, path: &str, content: &str, updated_at: i64) -> Document {
        Document {
            id: id.to_string(),
            file_path: path.to_string(),
            content: content.to_string(),
            content_hash: content_hash(content),
            title: None,
            content_type: ContentType::Plain,
            language: None,
            summary: None,
            tags: ["rust".to_string()].into_iter().collect(),
            category: Some("utilities".to_string()),
            created_at: updated_at,
            updated_at,
        }
    }

    fn snippet(id: &str, doc_id: &str, idx: i64, text: &str) -> Snippet {
        Snippet {
            id: id.to_string(),
            document_id: doc_id.to_string(),
            chunk_index: idx,
            text: text.to_string(),
            start_line: Some(1),
            end_line: Some(1),
            language: None,
            intent: Some("text".to_string()),
            hash: content_hash(text),
        }
    }

    #[tokio::test]
    async fn test_document_roundtrip_and_lookup_by_path() {
        let store = memory_store().await;
        let d = doc("d1", "/kb/a.txt", "alpha", 1);
        store.insert_document(&d).await.unwrap();

        assert_eq!(store.get_document("d1").await.unwrap(), Some(d.clone()));
        assert_eq!(store.get_document_by_path("/kb/a.txt").await.unwrap(), Some(d));
        assert!(store.get_document("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_keyword_match_scores_term_fraction() {
        let store = memory_store().await;
        store
            .insert_document(&doc("d1", "/a", "print hello world", 10))
            .await
            .unwrap();
        store
            .insert_document(&doc("d2", "/b", "print goodbye World", 5))
            .await
            .unwrap();

        let hits = store.keyword_match("Hello world", 10).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].document_id, "d1");
        assert!((hits[0].score - 1.0).abs() < 1e-9);
        assert!((hits[1].score - 0.5).abs() < 1e-9);
        assert!(hits[0].snippet.as_deref().unwrap().contains("hello"));
    }

    #[tokio::test]
    async fn test_vectors_aggregate_per_document() {
        let store = memory_store().await;
        store.insert_document(&doc("d1", "/a", "a", 1)).await.unwrap();
        store
            .replace_snippets("d1", &[snippet("s1", "d1", 0, "far"), snippet("s2", "d1", 1, "near")])
            .await
            .unwrap();
        store.upsert_vector("s1", "d1", "m", "h", &[0.0, 1.0]).await.unwrap();
        store.upsert_vector("s2", "d1", "m", "h", &[1.0, 0.0]).await.unwrap();

        assert_eq!(store.dims().await.unwrap(), Some(2));
        let hits = store.nearest_neighbors(&[1.0, 0.0], 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].snippet.as_deref(), Some("near"));
        assert!(hits[0].distance.abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_vector_index_ignores_other_models() {
        let store = memory_store().await.with_vector_model("new-model");
        store.insert_document(&doc("d1", "/a", "a", 1)).await.unwrap();
        store.insert_document(&doc("d2", "/b", "b", 1)).await.unwrap();
        store
            .replace_snippets("d1", &[snippet("s1", "d1", 0, "old")])
            .await
            .unwrap();
        store
            .replace_snippets("d2", &[snippet("s2", "d2", 0, "new")])
            .await
            .unwrap();

        store.upsert_vector("s1", "d1", "old-model", "h", &[1.0, 0.0]).await.unwrap();
        assert_eq!(store.dims().await.unwrap(), None);
        assert!(store.nearest_neighbors(&[1.0, 0.0], 5).await.unwrap().is_empty());

        store.upsert_vector("s2", "d2", "new-model", "h", &[0.0, 1.0]).await.unwrap();
        assert_eq!(store.dims().await.unwrap(), Some(2));
        let hits = store.nearest_neighbors(&[1.0, 0.0], 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document_id, "d2");
    }

    #[tokio::test]
    async fn test_pending_snippets_and_replace_invalidates_vectors() {
        let store = memory_store().await;
        store.insert_document(&doc("d1", "/a", "a", 1)).await.unwrap();
        let s = snippet("s1", "d1", 0, "text");
        store.replace_snippets("d1", &[s.clone()]).await.unwrap();
        assert_eq!(store.pending_snippets("m", None).await.unwrap().len(), 1);

        store.upsert_vector("s1", "d1", "m", &s.hash, &[1.0]).await.unwrap();
        assert!(store.pending_snippets("m", None).await.unwrap().is_empty());
        assert_eq!(store.pending_snippets("other-model", None).await.unwrap().len(), 1);

        store
            .replace_snippets("d1", &[snippet("s2", "d1", 0, "new text")])
            .await
            .unwrap();
        assert_eq!(store.dims().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete_document_cascades() {
        let store = memory_store().await;
        store.insert_document(&doc("d1", "/a", "a", 1)).await.unwrap();
        store.replace_snippets("d1", &[snippet("s1", "d1", 0, "t")]).await.unwrap();
        store.upsert_vector("s1", "d1", "m", "h", &[1.0]).await.unwrap();

        assert!(store.delete_document("d1").await.unwrap());
        assert!(!store.delete_document("d1").await.unwrap());
        assert!(store.get_snippets("d1").await.unwrap().is_empty());
        assert_eq!(store.dims().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_list_documents_filters_and_pages() {
        let store = memory_store().await;
        for i in 0..5 {
            let mut d = doc(&format!("d{i}"), &format!("/f{i}"), "x", i);
            if i % 2 == 0 {
                d.category = Some("api".to_string());
            }
            store.insert_document(&d).await.unwrap();
        }

        let (page, total) = store
            .list_documents(&DocumentFilter::default(), 1, 2)
            .await
            .unwrap();
        assert_eq!(total, 5);
        assert_eq!(page.iter().map(|d| d.id.as_str()).collect::<Vec<_>>(), vec!["d4", "d3"]);

        let filter = DocumentFilter {
            category: Some("api".to_string()),
            ..Default::default()
        };
        let (page, total) = store.list_documents(&filter, 2, 2).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, "d0");

        assert_eq!(store.list_categories().await.unwrap(), vec!["api", "utilities"]);
        assert_eq!(store.list_tags().await.unwrap(), vec!["rust"]);
    }

    #[tokio::test]
    async fn test_conversation_history_is_ordered_and_bounded() {
        let store = memory_store().await;
        for i in 0..4 {
            store
                .insert_conversation("c1", &format!("q{i}"), &format!("a{i}"), None)
                .await
                .unwrap();
        }
        store.insert_conversation("c2", "other", "x", None).await.unwrap();

        let history = store.conversation_history("c1", 2).await.unwrap();
        assert_eq!(
            history,
            vec![
                ("q2".to_string(), "a2".to_string()),
                ("q3".to_string(), "a3".to_string())
            ]
        );
        assert!(store.conversation_history("none", 5).await.unwrap().is_empty());
    }
}

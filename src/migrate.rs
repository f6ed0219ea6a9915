//! Idempotent schema creation. Every statement is `CREATE ... IF NOT EXISTS`,
//! so running it against an existing database is a no-op.

use anyhow::Result;
use sqlx::SqlitePool;
use tracing::info;

use crate::config::Config;
use crate::db;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS documents (
        id TEXT PRIMARY KEY,
        file_path TEXT NOT NULL UNIQUE,
        content TEXT NOT NULL,
        content_hash TEXT NOT NULL,
        title TEXT,
        content_type TEXT NOT NULL DEFAULT 'plain',
        language TEXT,
        summary TEXT,
        tags TEXT NOT NULL DEFAULT '[]',
        category TEXT,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS snippets (
        id TEXT PRIMARY KEY,
        document_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
        chunk_index INTEGER NOT NULL,
        text TEXT NOT NULL,
        start_line INTEGER,
        end_line INTEGER,
        language TEXT,
        intent TEXT,
        hash TEXT NOT NULL,
        UNIQUE(document_id, chunk_index)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS snippet_vectors (
        snippet_id TEXT PRIMARY KEY REFERENCES snippets(id) ON DELETE CASCADE,
        document_id TEXT NOT NULL,
        model TEXT NOT NULL,
        dims INTEGER NOT NULL,
        hash TEXT NOT NULL,
        embedding BLOB NOT NULL,
        created_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS conversations (
        id TEXT PRIMARY KEY,
        conversation_id TEXT NOT NULL,
        document_id TEXT REFERENCES documents(id) ON DELETE SET NULL,
        query TEXT NOT NULL,
        response TEXT NOT NULL,
        created_at INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_snippets_document_id ON snippets(document_id)",
    "CREATE INDEX IF NOT EXISTS idx_snippet_vectors_document_id ON snippet_vectors(document_id)",
    "CREATE INDEX IF NOT EXISTS idx_documents_updated_at ON documents(updated_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_documents_category ON documents(category)",
    "CREATE INDEX IF NOT EXISTS idx_conversations_conversation_id ON conversations(conversation_id, created_at)",
];

/// Create all tables and indexes on an open pool.
pub async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
    for stmt in SCHEMA {
        sqlx::query(stmt).execute(pool).await?;
    }
    Ok(())
}

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    ensure_schema(&pool).await?;
    pool.close().await;
    info!(path = %config.db.path.display(), "schema ready");
    Ok(())
}

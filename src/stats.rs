//! Knowledge-base statistics.
//!
//! [`collect_stats`] and [`embedding_stats`] back the `/admin/stats` and
//! `/admin/embeddings/stats` routes; [`run_stats`] prints the same numbers
//! for `devkb stats`.

use anyhow::Result;
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use std::collections::{BTreeMap, BTreeSet};

use crate::config::Config;
use crate::db;

#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub total_documents: i64,
    pub total_snippets: i64,
    pub total_conversations: i64,
    pub total_embeddings: i64,
    pub categories: BTreeMap<String, i64>,
    pub languages: BTreeMap<String, i64>,
    pub tags: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbeddingStats {
    /// Configured provider, `disabled` when embeddings are off.
    pub provider: String,
    /// Models that produced the stored vectors.
    pub models: Vec<String>,
    pub dims: Option<i64>,
    pub embedded_snippets: i64,
    pub total_snippets: i64,
    pub embedded_documents: i64,
}

async fn count(pool: &SqlitePool, sql: &str) -> Result<i64> {
    Ok(sqlx::query_scalar(sql).fetch_one(pool).await?)
}

async fn grouped(pool: &SqlitePool, column: &str) -> Result<BTreeMap<String, i64>> {
    let rows = sqlx::query(&format!(
        "SELECT {col} AS name, COUNT(*) AS n FROM documents WHERE {col} IS NOT NULL GROUP BY {col}",
        col = column
    ))
    .fetch_all(pool)
    .await?;
    Ok(rows
        .iter()
        .map(|row| (row.get("name"), row.get("n")))
        .collect())
}

pub async fn collect_stats(pool: &SqlitePool) -> Result<Stats> {
    let mut tags = BTreeMap::new();
    let tag_rows: Vec<String> = sqlx::query_scalar("SELECT tags FROM documents")
        .fetch_all(pool)
        .await?;
    for raw in tag_rows {
        let set: BTreeSet<String> = serde_json::from_str(&raw).unwrap_or_default();
        for tag in set {
            *tags.entry(tag).or_insert(0) += 1;
        }
    }

    Ok(Stats {
        total_documents: count(pool, "SELECT COUNT(*) FROM documents").await?,
        total_snippets: count(pool, "SELECT COUNT(*) FROM snippets").await?,
        total_conversations: count(pool, "SELECT COUNT(*) FROM conversations").await?,
        total_embeddings: count(pool, "SELECT COUNT(*) FROM snippet_vectors").await?,
        categories: grouped(pool, "category").await?,
        languages: grouped(pool, "language").await?,
        tags,
    })
}

pub async fn embedding_stats(pool: &SqlitePool, provider: &str) -> Result<EmbeddingStats> {
    let models: Vec<String> =
        sqlx::query_scalar("SELECT DISTINCT model FROM snippet_vectors ORDER BY model")
            .fetch_all(pool)
            .await?;
    let dims: Option<i64> = sqlx::query_scalar("SELECT dims FROM snippet_vectors LIMIT 1")
        .fetch_optional(pool)
        .await?;

    Ok(EmbeddingStats {
        provider: provider.to_string(),
        models,
        dims,
        embedded_snippets: count(pool, "SELECT COUNT(*) FROM snippet_vectors").await?,
        total_snippets: count(pool, "SELECT COUNT(*) FROM snippets").await?,
        embedded_documents: count(
            pool,
            "SELECT COUNT(DISTINCT document_id) FROM snippet_vectors",
        )
        .await?,
    })
}

/// Print a summary of the database.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let stats = collect_stats(&pool).await?;
    let emb = embedding_stats(&pool, &config.embedding.provider).await?;
    pool.close().await;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("DevKB — Database Stats");
    println!("======================");
    println!();
    println!("  Database:      {}", config.db.path.display());
    println!("  Size:          {}", format_bytes(db_size));
    println!();
    println!("  Documents:     {}", stats.total_documents);
    println!("  Snippets:      {}", stats.total_snippets);
    println!("  Conversations: {}", stats.total_conversations);
    println!(
        "  Embedded:      {} / {} ({}%)",
        emb.embedded_snippets,
        emb.total_snippets,
        percent(emb.embedded_snippets, emb.total_snippets)
    );
    println!(
        "  Embeddings:    {} {}",
        emb.provider,
        match (emb.models.first(), emb.dims) {
            (Some(model), Some(dims)) => format!("({}, {} dims)", model, dims),
            _ => String::new(),
        }
    );

    print_counts("By category", &stats.categories);
    print_counts("By language", &stats.languages);
    print_counts("By tag", &stats.tags);
    println!();
    Ok(())
}

fn print_counts(heading: &str, counts: &BTreeMap<String, i64>) {
    if counts.is_empty() {
        return;
    }
    let mut rows: Vec<_> = counts.iter().collect();
    rows.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));

    println!();
    println!("  {}:", heading);
    for (name, n) in rows {
        println!("    {:<24} {:>6}", name, n);
    }
}

fn percent(part: i64, total: i64) -> i64 {
    if total > 0 {
        part * 100 / total
    } else {
        0
    }
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

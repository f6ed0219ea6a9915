//! `devkb search`: run the hybrid search orchestrator and print results.

use anyhow::Result;

use devkb_core::models::{SearchQuery, SearchResponse};

use crate::config::Config;
use crate::context::AppContext;

pub async fn run_search(
    config: &Config,
    query: &str,
    limit: Option<i64>,
    category: Option<String>,
    keyword_only: bool,
) -> Result<()> {
    let ctx = AppContext::open(config).await?;

    let mut q = SearchQuery::new(query);
    q.limit = limit;
    q.category = category;

    let response = if keyword_only {
        ctx.searcher.search_keyword(&q).await
    } else {
        ctx.searcher.search(&q).await
    };
    ctx.close().await;

    print_response(&response?);
    Ok(())
}

fn print_response(response: &SearchResponse) {
    for warning in &response.warnings {
        eprintln!("Warning: {}", warning);
    }

    if response.items.is_empty() {
        println!("No results.");
        return;
    }

    for (i, item) in response.items.iter().enumerate() {
        let doc = &item.document;
        let title = doc.title.as_deref().unwrap_or("(untitled)");
        let date = chrono::DateTime::from_timestamp(doc.updated_at, 0)
            .map(|dt| dt.format("%Y-%m-%d").to_string())
            .unwrap_or_default();

        println!("{}. [{:.2}] {} / {}", i + 1, item.score, item.source, title);
        println!("    file: {}", doc.file_path);
        if let Some(category) = &doc.category {
            println!("    category: {}", category);
        }
        println!("    updated: {}", date);
        println!("    excerpt: \"{}\"", item.snippet.replace('\n', " ").trim());
        println!("    id: {}", doc.id);
        println!();
    }

    if response.degraded {
        println!("(degraded: results from a single backend)");
    }
}

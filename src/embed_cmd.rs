//! `devkb embed pending|rebuild`.

use anyhow::Result;

use crate::config::Config;
use crate::context::AppContext;
use crate::documents::EmbedReport;

/// Embed snippets that have no vector yet or whose text changed.
pub async fn run_embed_pending(config: &Config, limit: Option<usize>) -> Result<()> {
    let ctx = AppContext::open(config).await?;
    let result = ctx.documents.embed_pending(limit).await;
    ctx.close().await;
    let report = result?;

    println!("embed pending");
    if report.total == 0 {
        println!("  all snippets up to date");
    } else {
        print_report(&report);
    }
    Ok(())
}

/// Drop every vector and embed all snippets again.
pub async fn run_embed_rebuild(config: &Config) -> Result<()> {
    let ctx = AppContext::open(config).await?;
    let result = ctx.documents.rebuild_embeddings().await;
    ctx.close().await;
    let report = result?;

    println!("embed rebuild");
    print_report(&report);
    Ok(())
}

fn print_report(report: &EmbedReport) {
    println!("  total: {}", report.total);
    println!("  embedded: {}", report.embedded);
    println!("  failed: {}", report.failed);
}

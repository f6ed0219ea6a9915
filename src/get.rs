//! `devkb get` and `devkb delete`.

use anyhow::Result;

use crate::config::Config;
use crate::context::AppContext;
use crate::documents::DocumentWithSnippets;

/// Print a document with its metadata and snippets.
pub async fn run_get(config: &Config, id: &str) -> Result<()> {
    let ctx = AppContext::open(config).await?;
    let result = ctx.documents.get_document(id).await;
    ctx.close().await;
    print_document(&result?);
    Ok(())
}

pub async fn run_delete(config: &Config, id: &str) -> Result<()> {
    let ctx = AppContext::open(config).await?;
    let result = ctx.documents.delete_document(id).await;
    ctx.close().await;
    result?;
    println!("Deleted document {}", id);
    Ok(())
}

fn print_document(d: &DocumentWithSnippets) {
    let doc = &d.document;
    let tags: Vec<&str> = doc.tags.iter().map(String::as_str).collect();

    println!("--- Document ---");
    println!("id:           {}", doc.id);
    println!("file_path:    {}", doc.file_path);
    println!("title:        {}", doc.title.as_deref().unwrap_or("(untitled)"));
    println!("content_type: {}", doc.content_type);
    println!("language:     {}", doc.language.as_deref().unwrap_or("-"));
    println!("category:     {}", doc.category.as_deref().unwrap_or("-"));
    println!("tags:         {}", tags.join(", "));
    println!("summary:      {}", doc.summary.as_deref().unwrap_or("-"));
    println!("created_at:   {}", doc.created_at);
    println!("updated_at:   {}", doc.updated_at);
    println!();

    println!("--- Snippets ({}) ---", d.snippets.len());
    for s in &d.snippets {
        match (s.start_line, s.end_line) {
            (Some(start), Some(end)) => println!(
                "[snippet {}] lines {}-{} ({})",
                s.chunk_index,
                start,
                end,
                s.intent.as_deref().unwrap_or("-")
            ),
            _ => println!("[snippet {}]", s.chunk_index),
        }
        println!("{}", s.text);
        println!();
    }
}

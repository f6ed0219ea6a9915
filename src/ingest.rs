//! `devkb add` and `devkb index`: push files through the document pipeline.

use anyhow::{Context, Result};
use std::path::Path;

use crate::config::Config;
use crate::context::AppContext;
use crate::documents::NewDocument;

/// Add a single file, storing it under its canonical path.
pub async fn run_add(config: &Config, file: &Path, title: Option<String>) -> Result<()> {
    let path = file
        .canonicalize()
        .with_context(|| format!("File not found: {}", file.display()))?;
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let ctx = AppContext::open(config).await?;
    let result = ctx
        .documents
        .create_document(NewDocument {
            file_path: path.display().to_string(),
            content,
            title,
            ..Default::default()
        })
        .await;
    ctx.close().await;
    let created = result?;

    println!("add");
    println!("  id: {}", created.document.id);
    println!("  file: {}", created.document.file_path);
    println!(
        "  category: {}",
        created.document.category.as_deref().unwrap_or("-")
    );
    println!("  snippets: {}", created.snippets.len());
    Ok(())
}

pub async fn run_index(
    config: &Config,
    dir: &Path,
    recursive: bool,
    extensions: Vec<String>,
) -> Result<()> {
    let ctx = AppContext::open(config).await?;
    let exts = (!extensions.is_empty()).then_some(extensions);
    let result = ctx
        .documents
        .index_directory(dir, recursive, exts.as_deref())
        .await;
    ctx.close().await;
    let report = result?;

    println!("index {}", dir.display());
    println!("  files matched: {}", report.total);
    println!("  indexed: {}", report.indexed);
    println!("  errors: {}", report.errors.len());
    for e in &report.errors {
        println!("    {}: {}", e.file, e.error);
    }
    Ok(())
}

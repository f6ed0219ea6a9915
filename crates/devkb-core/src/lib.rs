//! # DevKB Core
//!
//! Storage-agnostic logic for DevKB: data models, chunking, rule-based
//! categorization, the store and vector index traits, the embedding trait
//! and the hybrid search orchestrator.
//!
//! This crate has no sqlx, HTTP or filesystem dependencies. The `devkb`
//! application crate supplies SQLite-backed stores and network embedding
//! providers; tests use [`store::memory::InMemoryStore`].

pub mod categorize;
pub mod chunk;
pub mod embedding;
pub mod error;
pub mod models;
pub mod search;
pub mod store;

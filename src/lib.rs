//! # DevKB
//!
//! A local developer knowledge base: store code, notes and docs, embed them,
//! and query them with hybrid (semantic + keyword) search and LLM chat.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────────┐   ┌─────────────────────┐
//! │   CLI    │──▶│ DocumentService  │──▶│ SQLite (sqlx)       │
//! │ (devkb)  │   │ ChatService      │   │ documents, snippets │
//! └──────────┘   │ HybridSearcher   │   │ snippet_vectors     │
//! ┌──────────┐   │  (devkb-core)    │   └─────────────────────┘
//! │   HTTP   │──▶│                  │──▶ embedding providers
//! │  (axum)  │   └──────────────────┘──▶ Anthropic Messages API
//! └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! devkb init                         # create database
//! devkb index ./docs                 # index a directory
//! devkb embed pending                # backfill embeddings
//! devkb search "retry with backoff"
//! devkb serve                        # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |
//! | [`sqlite_store`] | SQLite document store and vector index |
//! | [`embedding`] | OpenAI, Ollama and local embedding providers |
//! | [`llm`] | Anthropic completion client |
//! | [`documents`] | Document lifecycle and directory indexing |
//! | [`chat`] | Knowledge-base chat and code explanation |
//! | [`stats`] | Statistics |
//! | [`context`] | Service wiring |
//! | [`server`] | HTTP API |

pub mod chat;
pub mod config;
pub mod context;
pub mod db;
pub mod documents;
pub mod embed_cmd;
pub mod embedding;
pub mod get;
pub mod ingest;
pub mod llm;
pub mod migrate;
pub mod retry;
pub mod search;
pub mod server;
pub mod sqlite_store;
pub mod stats;

#[cfg(test)]
mod testing;

//! Knowledge-base chat and code explanation.
//!
//! A chat turn searches the knowledge base for the question, packs the best
//! snippets into a bounded context block, asks the LLM, and stores the
//! exchange under a conversation id.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use devkb_core::error::SearchError;
use devkb_core::models::{SearchQuery, SearchResultItem};
use devkb_core::search::HybridSearcher;

use crate::llm::CompletionProvider;
use crate::sqlite_store::SqliteStore;

pub const DEFAULT_CONTEXT_LIMIT: i64 = 5;
pub const MAX_CONTEXT_LIMIT: i64 = 20;
const HISTORY_TURNS: usize = 5;
const EXPLAIN_MAX_TOKENS: u32 = 1500;

const CHAT_SYSTEM_PROMPT: &str = "You are DevKB Assistant, an AI-powered developer knowledge base assistant.
Your role is to help developers find and understand information from their codebase and documentation.

When answering questions:
1. Use the provided context from the knowledge base
2. Cite specific files and code snippets when possible
3. If you're unsure about something, say so
4. Keep your answers focused and practical";

const EXPLAIN_SYSTEM_PROMPT: &str = "You are a code explanation assistant. Explain the given code clearly and concisely.
Focus on:
- What the code does
- Key components and their purpose
- Any important patterns or techniques used";

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("{0}")]
    Validation(String),
    #[error("LLM is not configured; set [llm] provider and ANTHROPIC_API_KEY")]
    Unavailable,
    #[error(transparent)]
    Search(#[from] SearchError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub context_limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub message: String,
    pub conversation_id: String,
    pub sources: Vec<SearchResultItem>,
    pub degraded: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExplainRequest {
    pub code: String,
    #[serde(default)]
    pub language: Option<String>,
}

pub struct ChatService {
    searcher: HybridSearcher,
    store: Arc<SqliteStore>,
    llm: Option<Arc<dyn CompletionProvider>>,
    max_tokens: u32,
    context_chars: usize,
}

impl ChatService {
    pub fn new(
        searcher: HybridSearcher,
        store: Arc<SqliteStore>,
        llm: Option<Arc<dyn CompletionProvider>>,
        max_tokens: u32,
        context_chars: usize,
    ) -> Self {
        Self {
            searcher,
            store,
            llm,
            max_tokens,
            context_chars,
        }
    }

    pub fn is_available(&self) -> bool {
        self.llm.is_some()
    }

    pub async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ChatError> {
        let llm = self.llm.as_ref().ok_or(ChatError::Unavailable)?;
        let message = request.message.trim();
        if message.is_empty() {
            return Err(ChatError::Validation("message must not be empty".to_string()));
        }
        let context_limit = request.context_limit.unwrap_or(DEFAULT_CONTEXT_LIMIT);
        if !(1..=MAX_CONTEXT_LIMIT).contains(&context_limit) {
            return Err(ChatError::Validation(format!(
                "context_limit must be between 1 and {}",
                MAX_CONTEXT_LIMIT
            )));
        }

        let results = self
            .searcher
            .search(&SearchQuery::new(message).with_limit(context_limit))
            .await?;

        let conversation_id = request
            .conversation_id
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let history = self
            .store
            .conversation_history(&conversation_id, HISTORY_TURNS)
            .await?;

        let context = build_context(&results.items, self.context_chars);
        let user_message = build_user_message(&history, &context, message);
        let reply = llm
            .complete(CHAT_SYSTEM_PROMPT, &user_message, self.max_tokens)
            .await?;

        let top_document = results.items.first().map(|i| i.document.id.as_str());
        self.store
            .insert_conversation(&conversation_id, message, &reply, top_document)
            .await?;

        info!(
            conversation_id = %conversation_id,
            sources = results.items.len(),
            degraded = results.degraded,
            "chat answered"
        );
        Ok(ChatResponse {
            message: reply,
            conversation_id,
            sources: results.items,
            degraded: results.degraded,
        })
    }

    pub async fn explain_code(&self, request: ExplainRequest) -> Result<String, ChatError> {
        let llm = self.llm.as_ref().ok_or(ChatError::Unavailable)?;
        if request.code.trim().is_empty() {
            return Err(ChatError::Validation("code must not be empty".to_string()));
        }
        let language = request.language.as_deref().unwrap_or("");
        let hint = if language.is_empty() {
            String::new()
        } else {
            format!(" (in {})", language)
        };
        let user_message = format!(
            "Explain this code{}:\n\n```{}\n{}\n```",
            hint, language, request.code
        );
        Ok(llm
            .complete(EXPLAIN_SYSTEM_PROMPT, &user_message, EXPLAIN_MAX_TOKENS)
            .await?)
    }
}

/// One block per source, stopping before the block that would exceed
/// `max_chars`.
fn build_context(items: &[SearchResultItem], max_chars: usize) -> String {
    let mut parts = Vec::new();
    let mut total = 0;

    for item in items {
        let doc = &item.document;
        let part = format!(
            "---\nFile: {}\nTitle: {}\nCategory: {}\n---\n\n{}\n",
            doc.file_path,
            doc.title.as_deref().unwrap_or("Untitled"),
            doc.category.as_deref().unwrap_or("N/A"),
            item.snippet
        );
        let len = part.chars().count();
        if total + len > max_chars {
            break;
        }
        total += len;
        parts.push(part);
    }

    parts.join("\n\n")
}

fn build_user_message(history: &[(String, String)], context: &str, question: &str) -> String {
    let mut out = String::new();
    if !history.is_empty() {
        out.push_str("Previous conversation:\n");
        for (q, a) in history {
            out.push_str(&format!("User: {}\nAssistant: {}\n\n", q, a));
        }
        out.push_str("---\n\n");
    }
    out.push_str(&format!(
        "Context from knowledge base:\n{}\n\n---\n\nQuestion: {}",
        context, question
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::ensure_schema;
    use crate::testing::FakeLlm;
    use devkb_core::models::{ContentType, DocumentSummary, SearchSource};
    use devkb_core::search::SearchConfig;
    use sqlx::sqlite::SqlitePoolOptions;
    use std::collections::BTreeSet;

    async fn store() -> Arc<SqliteStore> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        ensure_schema(&pool).await.unwrap();
        Arc::new(SqliteStore::new(pool))
    }

    fn service(store: Arc<SqliteStore>, llm: Option<Arc<FakeLlm>>) -> ChatService {
        let searcher = HybridSearcher::new(
            store.clone(),
            store.clone(),
            None,
            SearchConfig::default(),
        );
        ChatService::new(
            searcher,
            store,
            llm.map(|l| l as Arc<dyn CompletionProvider>),
            2000,
            8000,
        )
    }

    fn item(path: &str, snippet: &str) -> SearchResultItem {
        SearchResultItem {
            document: DocumentSummary {
                id: path.to_string(),
                file_path: path.to_string(),
                title: None,
                content_type: ContentType::Plain,
                language: None,
                category: Some("api".to_string()),
                tags: BTreeSet::new(),
                summary: None,
                updated_at: 0,
            },
            score: 1.0,
            source: SearchSource::Keyword,
            vector_score: None,
            keyword_score: Some(1.0),
            snippet: snippet.to_string(),
            highlights: Vec::new(),
        }
    }

    #[test]
    fn test_context_blocks_and_budget() {
        let items = vec![item("/a.py", "alpha"), item("/b.py", &"b".repeat(200))];
        let ctx = build_context(&items, 8000);
        assert!(ctx.starts_with("---\nFile: /a.py\nTitle: Untitled\nCategory: api\n---\n\nalpha\n"));
        assert!(ctx.contains("File: /b.py"));

        let tight = build_context(&items, 100);
        assert!(tight.contains("File: /a.py"));
        assert!(!tight.contains("File: /b.py"));
    }

    #[tokio::test]
    async fn test_chat_without_llm_is_unavailable() {
        let svc = service(store().await, None);
        let err = svc
            .chat(ChatRequest {
                message: "hi".to_string(),
                conversation_id: None,
                context_limit: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Unavailable));
    }

    #[tokio::test]
    async fn test_chat_validates_context_limit() {
        let svc = service(store().await, Some(Arc::new(FakeLlm::new("ok"))));
        let err = svc
            .chat(ChatRequest {
                message: "hi".to_string(),
                conversation_id: None,
                context_limit: Some(21),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Validation(_)));
    }

    #[tokio::test]
    async fn test_chat_stores_conversation_and_carries_history() {
        let store = store().await;
        let llm = Arc::new(FakeLlm::new("Use the retry helper."));
        let svc = service(store.clone(), Some(llm.clone()));

        let first = svc
            .chat(ChatRequest {
                message: "how do retries work".to_string(),
                conversation_id: None,
                context_limit: Some(3),
            })
            .await
            .unwrap();
        assert_eq!(first.message, "Use the retry helper.");
        assert!(first.degraded);
        assert!(first.sources.is_empty());

        svc.chat(ChatRequest {
            message: "and backoff?".to_string(),
            conversation_id: Some(first.conversation_id.clone()),
            context_limit: None,
        })
        .await
        .unwrap();

        let (system, user) = llm.last_prompt().unwrap();
        assert!(system.starts_with("You are DevKB Assistant"));
        assert!(user.contains("User: how do retries work"));
        assert!(user.ends_with("Question: and backoff?"));
        assert_eq!(
            store
                .conversation_history(&first.conversation_id, 10)
                .await
                .unwrap()
                .len(),
            2
        );
    }

    #[tokio::test]
    async fn test_explain_code_prompt() {
        let llm = Arc::new(FakeLlm::new("It adds."));
        let svc = service(store().await, Some(llm.clone()));
        let out = svc
            .explain_code(ExplainRequest {
                code: "fn add(a: i32, b: i32) -> i32 { a + b }".to_string(),
                language: Some("rust".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(out, "It adds.");
        let (_, user) = llm.last_prompt().unwrap();
        assert!(user.starts_with("Explain this code (in rust):\n\n```rust\n"));
    }
}

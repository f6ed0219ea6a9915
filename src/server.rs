//! HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Service info |
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/documents` | Create a document (201) |
//! | `GET`  | `/documents` | List documents (`page`, `page_size`, filters) |
//! | `GET` `PATCH` `DELETE` | `/documents/{id}` | Read, update metadata, delete (204) |
//! | `POST` | `/documents/{id}/refresh` | Re-chunk and re-embed |
//! | `GET`  | `/documents/tags/list` | All tags |
//! | `GET`  | `/documents/categories/list` | All categories in use |
//! | `POST` | `/search` | Hybrid search |
//! | `GET`  | `/search/keyword` | Keyword-only search (`q`, `limit`, `offset`, `category`, `content_type`, `language`, `tags`) |
//! | `POST` | `/chat` | Chat over the knowledge base |
//! | `POST` | `/chat/explain` | Explain a code fragment |
//! | `POST` | `/admin/index/directory` | Index a directory |
//! | `GET`  | `/admin/stats` | Database statistics |
//! | `GET`  | `/admin/embeddings/stats` | Embedding statistics |
//! | `POST` | `/admin/embeddings/clear` | Drop all vectors, keep documents |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "invalid query: query text must not be empty" } }
//! ```
//!
//! Codes: `bad_request` (400), `not_found` (404), `timeout` (408),
//! `unavailable` (503), `config_error` (500), `internal` (500).

use axum::{
    extract::{Path, Query, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use devkb_core::error::SearchError;
use devkb_core::models::{ContentType, SearchQuery, SearchResponse};

use crate::chat::{ChatError, ChatRequest, ChatResponse, ExplainRequest};
use crate::config::Config;
use crate::context::AppContext;
use crate::documents::{
    DocumentError, DocumentPage, DocumentUpdate, DocumentWithSnippets, IndexReport, NewDocument,
};
use crate::sqlite_store::DocumentFilter;
use crate::stats::{collect_stats, embedding_stats, EmbeddingStats, Stats};

const DEFAULT_PAGE_SIZE: u32 = 20;

/// Start the server on `[server].bind` and run until the process exits.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let ctx = AppContext::open(config).await?;
    let bind_addr = config.server.bind.clone();

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "DevKB server listening");
    println!("DevKB server listening on http://{}", bind_addr);

    axum::serve(listener, router(ctx)).await?;
    Ok(())
}

/// Build the application router over shared services.
pub fn router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let request_timeout = Duration::from_secs(ctx.config.server.request_timeout_secs);

    Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .route("/documents", post(handle_create).get(handle_list))
        .route("/documents/tags/list", get(handle_tags))
        .route("/documents/categories/list", get(handle_categories))
        .route(
            "/documents/{id}",
            get(handle_get).patch(handle_update).delete(handle_delete),
        )
        .route("/documents/{id}/refresh", post(handle_refresh))
        .route("/search", post(handle_search))
        .route("/search/keyword", get(handle_keyword_search))
        .route("/chat", post(handle_chat))
        .route("/chat/explain", post(handle_explain))
        .route("/admin/index/directory", post(handle_index_directory))
        .route("/admin/stats", get(handle_stats))
        .route("/admin/embeddings/stats", get(handle_embedding_stats))
        .route("/admin/embeddings/clear", post(handle_clear_embeddings))
        .layer(middleware::from_fn_with_state(request_timeout, enforce_timeout))
        .layer(cors)
        .with_state(ctx)
}

/// Abandon handlers that run past the configured request timeout. Dropping
/// the handler future cancels any in-flight search.
async fn enforce_timeout(
    State(limit): State<Duration>,
    request: Request,
    next: Next,
) -> Response {
    match tokio::time::timeout(limit, next.run(request)).await {
        Ok(response) => response,
        Err(_) => AppError::new(
            StatusCode::REQUEST_TIMEOUT,
            "timeout",
            format!("request exceeded {}s", limit.as_secs()),
        )
        .into_response(),
    }
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }

    fn internal(err: impl std::fmt::Display) -> Self {
        error!(error = %err, "internal error");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<SearchError> for AppError {
    fn from(e: SearchError) -> Self {
        let status = match &e {
            SearchError::Validation(_) => StatusCode::BAD_REQUEST,
            SearchError::BackendUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            SearchError::Configuration(_) | SearchError::Store(_) => {
                error!(error = %e, "search failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, e.code(), e.to_string())
    }
}

impl From<DocumentError> for AppError {
    fn from(e: DocumentError) -> Self {
        match e {
            DocumentError::NotFound(_) => Self::new(StatusCode::NOT_FOUND, "not_found", e.to_string()),
            DocumentError::Validation(msg) => Self::bad_request(msg),
            DocumentError::Unavailable(msg) => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, "unavailable", msg)
            }
            DocumentError::Other(err) => Self::internal(format!("{:#}", err)),
        }
    }
}

impl From<ChatError> for AppError {
    fn from(e: ChatError) -> Self {
        match e {
            ChatError::Validation(msg) => Self::bad_request(msg),
            ChatError::Unavailable => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, "unavailable", e.to_string())
            }
            ChatError::Search(err) => err.into(),
            ChatError::Other(err) => Self::internal(format!("{:#}", err)),
        }
    }
}

type ApiResult<T> = Result<Json<T>, AppError>;

// ============ Service ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn handle_root(State(ctx): State<AppContext>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": "DevKB",
        "version": env!("CARGO_PKG_VERSION"),
        "embeddings": ctx.config.embedding.provider,
        "chat": ctx.chat.is_available(),
    }))
}

// ============ Documents ============

async fn handle_create(
    State(ctx): State<AppContext>,
    Json(input): Json<NewDocument>,
) -> Result<(StatusCode, Json<DocumentWithSnippets>), AppError> {
    let created = ctx.documents.create_document(input).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[derive(Deserialize)]
struct ListParams {
    page: Option<u32>,
    page_size: Option<u32>,
    content_type: Option<String>,
    language: Option<String>,
    category: Option<String>,
}

async fn handle_list(
    State(ctx): State<AppContext>,
    Query(params): Query<ListParams>,
) -> ApiResult<DocumentPage> {
    let content_type = parse_content_type(params.content_type)?;
    let filter = DocumentFilter {
        content_type,
        language: params.language,
        category: params.category,
    };
    let page = ctx
        .documents
        .list_documents(
            &filter,
            params.page.unwrap_or(1),
            params.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
        )
        .await?;
    Ok(Json(page))
}

async fn handle_get(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> ApiResult<DocumentWithSnippets> {
    Ok(Json(ctx.documents.get_document(&id).await?))
}

async fn handle_update(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    Json(update): Json<DocumentUpdate>,
) -> ApiResult<DocumentWithSnippets> {
    Ok(Json(ctx.documents.update_document(&id, update).await?))
}

async fn handle_delete(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    ctx.documents.delete_document(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn handle_refresh(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> ApiResult<DocumentWithSnippets> {
    Ok(Json(ctx.documents.refresh_document(&id).await?))
}

async fn handle_tags(State(ctx): State<AppContext>) -> ApiResult<serde_json::Value> {
    let tags = ctx.documents.list_tags().await?;
    Ok(Json(serde_json::json!({ "tags": tags })))
}

async fn handle_categories(State(ctx): State<AppContext>) -> ApiResult<serde_json::Value> {
    let categories = ctx.documents.list_categories().await?;
    Ok(Json(serde_json::json!({ "categories": categories })))
}

// ============ Search ============

async fn handle_search(
    State(ctx): State<AppContext>,
    Json(query): Json<SearchQuery>,
) -> ApiResult<SearchResponse> {
    Ok(Json(ctx.searcher.search(&query).await?))
}

#[derive(Deserialize)]
struct KeywordParams {
    q: String,
    limit: Option<i64>,
    offset: Option<usize>,
    category: Option<String>,
    content_type: Option<String>,
    language: Option<String>,
    /// Comma-separated.
    tags: Option<String>,
}

fn parse_content_type(raw: Option<String>) -> Result<Option<ContentType>, AppError> {
    raw.map(|c| c.parse::<ContentType>())
        .transpose()
        .map_err(|e| AppError::bad_request(e.to_string()))
}

async fn handle_keyword_search(
    State(ctx): State<AppContext>,
    Query(params): Query<KeywordParams>,
) -> ApiResult<SearchResponse> {
    let tags = params.tags.map(|raw| {
        raw.split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    });
    let query = SearchQuery {
        text: params.q,
        limit: params.limit,
        offset: params.offset,
        category: params.category,
        content_type: parse_content_type(params.content_type)?,
        language: params.language,
        tags,
        min_similarity: None,
    };
    Ok(Json(ctx.searcher.search_keyword(&query).await?))
}

// ============ Chat ============

async fn handle_chat(
    State(ctx): State<AppContext>,
    Json(request): Json<ChatRequest>,
) -> ApiResult<ChatResponse> {
    Ok(Json(ctx.chat.chat(request).await?))
}

async fn handle_explain(
    State(ctx): State<AppContext>,
    Json(request): Json<ExplainRequest>,
) -> ApiResult<serde_json::Value> {
    let explanation = ctx.chat.explain_code(request).await?;
    Ok(Json(serde_json::json!({ "explanation": explanation })))
}

// ============ Admin ============

#[derive(Deserialize)]
struct IndexDirectoryRequest {
    path: String,
    #[serde(default = "default_recursive")]
    recursive: bool,
    #[serde(default)]
    file_extensions: Option<Vec<String>>,
}

fn default_recursive() -> bool {
    true
}

async fn handle_index_directory(
    State(ctx): State<AppContext>,
    Json(request): Json<IndexDirectoryRequest>,
) -> ApiResult<IndexReport> {
    let report = ctx
        .documents
        .index_directory(
            std::path::Path::new(&request.path),
            request.recursive,
            request.file_extensions.as_deref(),
        )
        .await?;
    Ok(Json(report))
}

async fn handle_stats(State(ctx): State<AppContext>) -> ApiResult<Stats> {
    let stats = collect_stats(ctx.store.pool())
        .await
        .map_err(|e| AppError::internal(format!("{:#}", e)))?;
    Ok(Json(stats))
}

async fn handle_embedding_stats(State(ctx): State<AppContext>) -> ApiResult<EmbeddingStats> {
    let stats = embedding_stats(ctx.store.pool(), &ctx.config.embedding.provider)
        .await
        .map_err(|e| AppError::internal(format!("{:#}", e)))?;
    Ok(Json(stats))
}

async fn handle_clear_embeddings(State(ctx): State<AppContext>) -> ApiResult<serde_json::Value> {
    let cleared = ctx.documents.clear_embeddings().await?;
    Ok(Json(serde_json::json!({ "cleared": cleared })))
}

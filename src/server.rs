//! JSON HTTP server.
//!
//! Exposes the pipeline and the post store to browser front-ends and other
//! services.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/generate` | Run the pipeline for a prompt and category |
//! | `POST` | `/process` | Assemble a Top10 draft with a given product list |
//! | `POST` | `/products/search` | Fetch and score products for a prompt |
//! | `GET`  | `/posts` | List saved posts |
//! | `POST` | `/posts` | Save a post |
//!
//! # Error Contract
//!
//! All error responses share one shape:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "prompt must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `forbidden` (403), `not_found` (404),
//! `conflict` (409), `unprocessable` (422), `internal` (500),
//! `upstream` (502).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! clients.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::config::Config;
use crate::error::{GenerateError, PersistError};
use crate::llm::create_provider;
use crate::models::{BlogPost, Category, ProductRecord, SearchParams};
use crate::pipeline::{
    assemble_top10, validate_request, AssemblyReport, GenerateRequest, GeneratedPost, Pipeline,
};
use crate::posts::{list_posts, save_post, NewPost};
use crate::product_fetch::{fetch_products, HttpProductSource};
use crate::search_params::extract_search_params;
use crate::specs::score_product;
use crate::traits::{CompletionProvider, ProductSource};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    /// `None` when `products.endpoint` is not configured.
    products: Option<Arc<dyn ProductSource>>,
    /// `None` when `llm.provider = "disabled"`.
    llm: Option<Arc<dyn CompletionProvider>>,
}

impl AppState {
    pub fn new(
        config: Config,
        products: Option<Arc<dyn ProductSource>>,
        llm: Option<Arc<dyn CompletionProvider>>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            products,
            llm,
        }
    }

    /// State with the configured HTTP product source and completion provider.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let products: Option<Arc<dyn ProductSource>> = match config.products.endpoint {
            Some(_) => Some(Arc::new(HttpProductSource::new(&config.products)?)),
            None => None,
        };
        let llm: Option<Arc<dyn CompletionProvider>> =
            create_provider(&config.llm)?.map(Arc::from);
        Ok(Self::new(config.clone(), products, llm))
    }

    fn product_source(&self) -> Result<&dyn ProductSource, AppError> {
        self.products
            .as_deref()
            .ok_or_else(|| bad_request("products.endpoint is not configured"))
    }
}

/// Build the router for a state. The caller binds and serves it.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/generate", post(handle_generate))
        .route("/process", post(handle_process))
        .route("/products/search", post(handle_product_search))
        .route("/posts", get(handle_list_posts).post(handle_save_post))
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind`.
///
/// Runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let state = AppState::from_config(config)?;
    let bind_addr = config.server.bind.clone();

    let listener = TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "server listening");
    println!("Laptop Press server listening on http://{}", bind_addr);

    axum::serve(listener, router(state)).await?;
    Ok(())
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

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(code = self.code, message = %self.message, "request failed");
        }
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn app_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> AppError {
    AppError {
        status,
        code,
        message: message.into(),
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    app_error(StatusCode::BAD_REQUEST, "bad_request", message)
}

impl From<GenerateError> for AppError {
    fn from(err: GenerateError) -> Self {
        let message = err.to_string();
        match err {
            GenerateError::InvalidInput(_) | GenerateError::Disabled => bad_request(message),
            GenerateError::ProductNotFound(_) => {
                app_error(StatusCode::NOT_FOUND, "not_found", message)
            }
            GenerateError::NoProducts(_)
            | GenerateError::EmptyContent(_)
            | GenerateError::UnresolvedPlaceholders(_) => {
                app_error(StatusCode::UNPROCESSABLE_ENTITY, "unprocessable", message)
            }
            GenerateError::Upstream(_) | GenerateError::Parse(_) => {
                app_error(StatusCode::BAD_GATEWAY, "upstream", message)
            }
        }
    }
}

impl From<PersistError> for AppError {
    fn from(err: PersistError) -> Self {
        let message = err.to_string();
        match err {
            PersistError::Conflict { .. } => app_error(StatusCode::CONFLICT, "conflict", message),
            PersistError::NotFound(_) => app_error(StatusCode::NOT_FOUND, "not_found", message),
            PersistError::Permission(_) => app_error(StatusCode::FORBIDDEN, "forbidden", message),
            PersistError::Database(_) => {
                app_error(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
            }
        }
    }
}

// ============ GET /health ============

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

// ============ POST /generate ============

#[derive(Deserialize)]
struct GenerateBody {
    #[serde(flatten)]
    request: GenerateRequest,
    #[serde(default)]
    save: bool,
}

#[derive(Serialize)]
struct GenerateResponse {
    #[serde(flatten)]
    post: GeneratedPost,
    #[serde(skip_serializing_if = "Option::is_none")]
    saved: Option<BlogPost>,
}

/// Handler for `POST /generate`.
///
/// With `"save": true` the result is also stored as an unpublished post.
async fn handle_generate(
    State(state): State<AppState>,
    Json(body): Json<GenerateBody>,
) -> Result<Json<GenerateResponse>, AppError> {
    validate_request(&body.request)?;
    let products = state.product_source()?;
    let pipeline = Pipeline::new(&state.config, products, state.llm.as_deref());
    let post = pipeline.generate_blog_post(&body.request).await?;

    let saved = if body.save {
        Some(save_post(&state.config, &NewPost::from_generated(&post)).await?)
    } else {
        None
    };
    Ok(Json(GenerateResponse { post, saved }))
}

// ============ POST /process ============

#[derive(Deserialize)]
struct ProcessBody {
    content: String,
    #[serde(default)]
    products: Vec<ProductRecord>,
}

#[derive(Serialize)]
struct ProcessResponse {
    html: String,
    report: AssemblyReport,
}

/// Handler for `POST /process`: Top10 assembly without any network call.
async fn handle_process(
    State(state): State<AppState>,
    Json(body): Json<ProcessBody>,
) -> Result<Json<ProcessResponse>, AppError> {
    let (html, report) = assemble_top10(&body.content, &body.products, &state.config)?;
    Ok(Json(ProcessResponse { html, report }))
}

// ============ POST /products/search ============

#[derive(Deserialize)]
struct SearchBody {
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    params: Option<SearchParams>,
}

#[derive(Serialize)]
struct ScoredProduct {
    #[serde(flatten)]
    product: ProductRecord,
    score: f64,
}

#[derive(Serialize)]
struct SearchResponse {
    params: SearchParams,
    products: Vec<ScoredProduct>,
}

/// Handler for `POST /products/search`.
///
/// Takes either a free-text `prompt` or explicit `params`.
async fn handle_product_search(
    State(state): State<AppState>,
    Json(body): Json<SearchBody>,
) -> Result<Json<SearchResponse>, AppError> {
    let params = match (body.params, body.prompt) {
        (Some(params), _) => params,
        (None, Some(prompt)) if !prompt.trim().is_empty() => extract_search_params(&prompt),
        _ => return Err(bad_request("prompt or params must be provided")),
    };

    let source = state.product_source()?;
    let products = fetch_products(source, &params, state.config.products.limit)
        .await
        .into_iter()
        .map(|product| ScoredProduct {
            score: score_product(&product),
            product,
        })
        .collect();

    Ok(Json(SearchResponse { params, products }))
}

// ============ /posts ============

#[derive(Deserialize)]
struct ListQuery {
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    published: Option<bool>,
}

#[derive(Serialize)]
struct PostListResponse {
    posts: Vec<BlogPost>,
}

async fn handle_list_posts(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<PostListResponse>, AppError> {
    let category = match query.category.as_deref().filter(|c| !c.trim().is_empty()) {
        Some(c) => Some(
            c.parse::<Category>()
                .map_err(|e| bad_request(e.to_string()))?,
        ),
        None => None,
    };
    let posts = list_posts(&state.config, category, query.published.unwrap_or(false)).await?;
    Ok(Json(PostListResponse { posts }))
}

async fn handle_save_post(
    State(state): State<AppState>,
    Json(post): Json<NewPost>,
) -> Result<(StatusCode, Json<BlogPost>), AppError> {
    if post.title.trim().is_empty() || post.content.trim().is_empty() {
        return Err(bad_request("title and content must not be empty"));
    }
    let saved = save_post(&state.config, &post).await?;
    Ok((StatusCode::CREATED, Json(saved)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NormalizeError;

    #[test]
    fn generate_errors_map_to_status_codes() {
        let cases = [
            (GenerateError::InvalidInput("x".into()), 400, "bad_request"),
            (GenerateError::Disabled, 400, "bad_request"),
            (GenerateError::ProductNotFound("B0".into()), 404, "not_found"),
            (GenerateError::NoProducts("q".into()), 422, "unprocessable"),
            (GenerateError::EmptyContent(NormalizeError::Empty), 422, "unprocessable"),
            (GenerateError::Upstream("503".into()), 502, "upstream"),
            (GenerateError::Parse("junk".into()), 502, "upstream"),
        ];
        for (err, status, code) in cases {
            let e = AppError::from(err);
            assert_eq!(e.status.as_u16(), status);
            assert_eq!(e.code, code);
        }
    }

    #[test]
    fn persist_errors_map_to_status_codes() {
        let conflict = AppError::from(PersistError::Conflict {
            slug: "s".into(),
            category: "Top10".into(),
        });
        assert_eq!(conflict.status, StatusCode::CONFLICT);
        let forbidden = AppError::from(PersistError::Permission("readonly".into()));
        assert_eq!(forbidden.code, "forbidden");
        let internal = AppError::from(PersistError::Database("io".into()));
        assert_eq!(internal.status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}

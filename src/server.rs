//! HTTP API for question answering.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/ask` | Retrieve sources and (optionally) generate an answer |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! `POST /ask` accepts `{ "question": "...", "k": 5, "sources_only": false }`
//! and responds with the deduplicated source list, the generated answer when
//! a model is configured, and the advisory `stale`/`degraded` flags.
//! Staleness is re-checked per request so a rebuilt index is picked up by
//! the next call without a restart.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "question must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `model_disabled` (400), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! clients.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};

use crate::answer::{create_generator, AnswerGenerator};
use crate::config::Settings;
use crate::embedding::{create_embedder, Embedder};
use crate::manifest::current_staleness;
use crate::models::RankedSource;
use crate::query::{clean_query, process_query};
use crate::retrieve::retrieve;
use crate::sources::load_sources;
use crate::store::{open_store, VectorStore};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    settings: Arc<Settings>,
    sources_path: PathBuf,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    generator: Arc<dyn AnswerGenerator>,
}

/// Start the HTTP server on the address configured under `[server].bind`.
/// Runs until the process is terminated.
pub async fn run_server(settings: &Settings, sources_path: &std::path::Path) -> anyhow::Result<()> {
    let state = AppState {
        settings: Arc::new(settings.clone()),
        sources_path: sources_path.to_path_buf(),
        embedder: Arc::from(create_embedder(&settings.embedding)?),
        store: Arc::from(open_store(settings).await?),
        generator: Arc::from(create_generator(&settings.model)?),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/ask", post(handle_ask))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    let bind_addr = &settings.server.bind;
    info!(bind = %bind_addr, "server listening");
    println!("Server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app).await?;
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

/// Internal error type that converts into an HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

fn classify_error(err: anyhow::Error) -> AppError {
    // Alternate format renders the whole cause chain
    let msg = format!("{:#}", err);
    if msg.contains("disabled") {
        let mut e = bad_request(msg);
        e.code = "model_disabled".to_string();
        e
    } else {
        internal(msg)
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

// ============ POST /ask ============

#[derive(Deserialize)]
struct AskRequest {
    question: String,
    k: Option<usize>,
    #[serde(default)]
    sources_only: bool,
}

#[derive(Serialize)]
struct AskResponse {
    answer: Option<String>,
    sources: Vec<RankedSource>,
    /// Advisory: the index may not reflect the current source list.
    stale: bool,
    stale_reason: Option<String>,
    /// Advisory: fewer distinct sources than requested after deduplication.
    degraded: bool,
}

/// Per-request staleness check. A failure here is logged and reported as
/// "not stale" rather than failing the request: staleness is advisory.
fn staleness_note(settings: &Settings, sources_path: &std::path::Path) -> Option<String> {
    let sources = match load_sources(sources_path) {
        Ok(sources) => sources,
        Err(e) => {
            warn!(error = %e, "failed to load source list; skipping staleness check");
            return None;
        }
    };
    match current_staleness(settings, &sources, sources_path) {
        Ok(reason) => reason.map(|r| r.to_string()),
        Err(e) => {
            warn!(error = %e, "staleness check failed; reporting not stale");
            None
        }
    }
}

async fn handle_ask(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Result<Json<AskResponse>, AppError> {
    if clean_query(&request.question).is_empty() {
        return Err(bad_request("question must not be empty"));
    }

    let k = match request.k {
        Some(0) => return Err(bad_request("k must be >= 1")),
        Some(k) => k,
        None => state.settings.retrieval.k,
    };

    let expand = state.settings.query.expand && state.settings.model.is_enabled();
    let processed = process_query(&*state.generator, &request.question, expand).await;
    debug!(kind = ?processed.kind, keywords = ?processed.keywords, "query processed");

    let stale_reason = staleness_note(&state.settings, &state.sources_path);

    let retrieval = retrieve(&*state.embedder, &*state.store, &processed.expanded, k)
        .await
        .map_err(|e| classify_error(e.into()))?;

    let answer = if !request.sources_only && state.settings.model.is_enabled() {
        Some(
            state
                .generator
                .generate(&processed.cleaned, &retrieval.hits)
                .await
                .map_err(classify_error)?,
        )
    } else {
        None
    };

    Ok(Json(AskResponse {
        answer,
        stale: stale_reason.is_some(),
        stale_reason,
        degraded: retrieval.is_degraded(),
        sources: retrieval.sources,
    }))
}

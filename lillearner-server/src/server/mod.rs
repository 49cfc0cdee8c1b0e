mod calendar;
mod config;
mod handlers;
pub mod llm;
mod progress;

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue};
use axum::middleware;
use axum::response::Response as AxumResponse;
use axum::{
    Router,
    http::{Method, StatusCode, header},
    routing::{get, post},
};
use chrono_tz::Tz;
pub use config::{AppConfig, ConfigError, DEFAULT_CONFIG_PATH, DEFAULT_PORT, LlmConfig};
use lillearner_shared::api::{API_V1_PREFIX, ErrorBody};
use lillearner_shared::catalog::Catalog;
use llm::LlmClient;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Span, info_span, warn};
use uuid::Uuid;

use crate::storage::{Store, StorageError};

type ChildLockMap = Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Store,
    pub catalog: Arc<Catalog>,
    pub tz: Tz,
    llm: Option<LlmClient>,
    // Serializes write flows per child
    child_locks: ChildLockMap,
    shutdown: CancellationToken,
}

impl AppState {
    /// Resolves the timezone and catalog from `config`. The LLM client is
    /// built when `config.llm` is set and its API key is present.
    pub fn new(config: AppConfig, store: Store) -> Result<Self, ConfigError> {
        let tz = config.tz()?;
        let catalog = config.resolve_catalog()?;
        let llm = match &config.llm {
            Some(cfg) => match LlmClient::from_config(cfg) {
                Ok(client) => Some(client),
                Err(e) => {
                    warn!(error = %e, "llm: voice parsing disabled");
                    None
                }
            },
            None => None,
        };
        Ok(Self {
            config: Arc::new(config),
            store,
            catalog: Arc::new(catalog),
            tz,
            llm,
            child_locks: Default::default(),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn with_llm_client(mut self, client: LlmClient) -> Self {
        self.llm = Some(client);
        self
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    async fn child_mutex(&self, child_id: &str) -> Arc<Mutex<()>> {
        let mut map = self.child_locks.lock().await;
        map.entry(child_id.to_string())
            .or_insert_with(Default::default)
            .clone()
    }

    /// Held for the whole of a write flow on one child.
    async fn lock_child(&self, child_id: &str) -> OwnedMutexGuard<()> {
        self.child_mutex(child_id).await.lock_owned().await
    }

    async fn forget_child(&self, child_id: &str) {
        self.child_locks.lock().await.remove(child_id);
    }
}

#[derive(Clone, Debug)]
struct ReqId(pub String);

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/catalog/categories", get(handlers::catalog_categories))
        .route("/catalog/achievements", get(handlers::catalog_achievements))
        .route(
            "/children",
            get(handlers::list_children).post(handlers::create_child),
        )
        .route(
            "/children/{id}",
            get(handlers::get_child).delete(handlers::delete_child),
        )
        .route(
            "/children/{id}/entries",
            get(handlers::list_entries).post(handlers::create_entry),
        )
        .route(
            "/children/{id}/milestones",
            get(handlers::list_milestones).post(handlers::toggle_milestone),
        )
        .route("/children/{id}/level", get(handlers::child_level))
        .route("/children/{id}/streak", get(handlers::child_streak))
        .route("/children/{id}/today", get(handlers::child_today))
        .route("/children/{id}/stats", get(handlers::child_stats))
        .route(
            "/children/{id}/skills/progress",
            get(handlers::skill_progress),
        )
        .route(
            "/children/{id}/books",
            get(handlers::list_books).post(handlers::add_book),
        )
        .route(
            "/children/{id}/books/{book_id}/finish",
            post(handlers::finish_book),
        )
        .route(
            "/children/{id}/achievements",
            get(handlers::list_achievements),
        )
        .route(
            "/children/{id}/achievements/check",
            post(handlers::check_achievements),
        )
        .route(
            "/children/{id}/reports",
            get(handlers::list_reports).post(handlers::generate_report),
        )
        .route("/reports/{id}", get(handlers::get_report))
        .route("/entries/bulk", post(handlers::bulk_entries))
        .route(
            "/categories",
            get(handlers::list_categories).post(handlers::create_category),
        )
        .route("/voice/parse", post(handlers::voice_parse));

    // Trace with request context (method, path, request_id)
    let trace = TraceLayer::new_for_http().make_span_with(|req: &axum::http::Request<_>| {
        let request_id = req
            .extensions()
            .get::<ReqId>()
            .map(|r| r.0.clone())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        info_span!(
            "request",
            method = %req.method(),
            path = %req.uri().path(),
            request_id = %request_id,
            child_id = tracing::field::Empty
        )
    });

    let app = Router::new()
        .route("/healthz", get(health))
        .nest(API_V1_PREFIX, api)
        .with_state(state.clone())
        .layer(trace)
        .layer(middleware::from_fn(add_no_store_headers))
        .layer(middleware::from_fn(add_request_id));

    // Optionally add CORS for dev if configured
    if let Some(origin) = &state.config.dev_cors_origin {
        let hv = header::HeaderValue::from_str(origin)
            .unwrap_or(header::HeaderValue::from_static("http://localhost:5173"));
        let cors = CorsLayer::new()
            .allow_origin(hv)
            .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE]);
        app.layer(cors)
    } else {
        app
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn add_request_id(
    mut req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Result<AxumResponse, AppError> {
    let hdr = HeaderName::from_static("x-request-id");
    // Use provided x-request-id if present, else generate
    let rid = req
        .headers()
        .get(&hdr)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    req.extensions_mut().insert(ReqId(rid.clone()));
    let mut resp = next.run(req).await;
    if let Ok(hv) = HeaderValue::from_str(&rid) {
        resp.headers_mut().insert(hdr, hv);
    }
    Ok(resp)
}

async fn add_no_store_headers(
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Result<AxumResponse, AppError> {
    let mut resp = next.run(req).await;
    let headers = resp.headers_mut();
    headers.insert(
        HeaderName::from_static("x-content-type-options"),
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-store, no-cache, must-revalidate, private"),
    );
    Ok(resp)
}

/// Tags the current request span with the child being acted on.
fn record_child(child_id: &str) {
    Span::current().record("child_id", tracing::field::display(child_id));
}

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    BadGateway(String),
    Unavailable(String),
    Internal(String),
}

impl AppError {
    fn bad_request<T: Into<String>>(msg: T) -> Self {
        Self::BadRequest(msg.into())
    }
    fn not_found<T: Into<String>>(msg: T) -> Self {
        Self::NotFound(msg.into())
    }
    fn internal<E: std::fmt::Display>(e: E) -> Self {
        Self::Internal(e.to_string())
    }
}

impl From<StorageError> for AppError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::InvalidInput(m) => AppError::BadRequest(m),
            StorageError::Conflict(m) => AppError::Conflict(m),
            other => AppError::internal(other),
        }
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, msg, kind, detail) = match self {
            AppError::BadRequest(m) => (StatusCode::BAD_REQUEST, m, "bad_request", None),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, m, "not_found", None),
            AppError::Conflict(m) => (StatusCode::CONFLICT, m, "conflict", None),
            AppError::BadGateway(m) => (
                StatusCode::BAD_GATEWAY,
                "language model request failed".into(),
                "bad_gateway",
                Some(m),
            ),
            AppError::Unavailable(m) => (StatusCode::SERVICE_UNAVAILABLE, m, "unavailable", None),
            // Do not leak internal error details to clients, but log them
            AppError::Internal(m) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error".into(),
                "internal",
                Some(m),
            ),
        };
        if let Some(detail) = detail {
            tracing::error!(status = %status, kind = kind, message = %msg, detail = %detail, "request failed");
        } else {
            tracing::warn!(status = %status, kind = kind, message = %msg, "request failed");
        }
        let body = axum::Json(ErrorBody { error: msg });
        (status, body).into_response()
    }
}

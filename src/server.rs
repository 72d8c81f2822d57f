//! HTTP front end.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/initialize` | Clone, chunk and index a repository |
//! | `POST` | `/chat` | Ask a question about the active repository |
//! | `GET`  | `/status` | Whether a repository is initialized |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! Failures return `{ "detail": "<message>" }`. `/chat` uses 400 when no
//! repository is initialized or the question is blank; every other service
//! failure is a 500. A body that is not the expected JSON keeps axum's
//! rejection status (400, 415 or 422) with the rejection text as `detail`.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so a browser front end
//! served from another origin can call the API.

use axum::{
    extract::{rejection::JsonRejection, FromRequest, Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::error::ServiceError;
use crate::service::ChatService;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    service: Arc<ChatService>,
}

/// Starts the HTTP server on `[server].bind` and runs until the process
/// is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let service = Arc::new(ChatService::from_config(config.clone())?);
    let app = build_router(service);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("repo-chat listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Builds the application router over `service`.
pub fn build_router(service: Arc<ChatService>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/initialize", post(handle_initialize))
        .route("/chat", post(handle_chat))
        .route("/status", get(handle_status))
        .route("/health", get(handle_health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { service })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    detail: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { detail: self.detail })).into_response()
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        let status = if err.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        AppError {
            status,
            detail: err.to_string(),
        }
    }
}

/// `Json` extractor whose rejections use the `{"detail"}` error body.
struct ApiJson<T>(T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(AppError {
                status: rejection.status(),
                detail: rejection.body_text(),
            }),
        }
    }
}

// ============ POST /initialize ============

#[derive(Deserialize)]
struct InitializeRequest {
    repo_url: String,
}

#[derive(Serialize)]
struct InitializeResponse {
    status: String,
    message: String,
}

/// Handler for `POST /initialize`.
///
/// Every service failure, including a malformed URL or a missing API key,
/// is reported as a 500.
async fn handle_initialize(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<InitializeRequest>,
) -> Result<Json<InitializeResponse>, AppError> {
    let outcome = state
        .service
        .initialize(&req.repo_url)
        .await
        .map_err(|e| AppError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: e.to_string(),
        })?;

    Ok(Json(InitializeResponse {
        status: "success".to_string(),
        message: outcome.message(),
    }))
}

// ============ POST /chat ============

#[derive(Deserialize)]
struct ChatRequest {
    question: String,
}

#[derive(Serialize)]
struct ChatResponse {
    answer: String,
}

async fn handle_chat(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let answer = state.service.chat(&req.question).await?;
    Ok(Json(ChatResponse { answer }))
}

// ============ GET /status ============

#[derive(Serialize)]
struct StatusResponse {
    initialized: bool,
}

async fn handle_status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        initialized: state.service.status().await,
    })
}

// ============ GET /health ============

/// JSON response body for `GET /health`.
#[derive(Serialize)]
struct HealthResponse {
    /// Always `"ok"` when the server is running.
    status: String,
    /// The crate version from `Cargo.toml`.
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

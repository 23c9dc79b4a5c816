//! HTTP server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/ask` | Answer a query within a session |
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/tools/list` | List the tools offered to the model |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `service_unavailable` (503),
//! `internal` (500). Any other failure while answering degrades to the
//! fallback answer with status 200.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser front ends can
//! call the API directly.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::chat::{process_chat, ChatRequest, ChatResponse};
use crate::config::Config;
use crate::context::AppContext;
use crate::error::ServiceError;
use crate::tools::ToolSchema;

/// Load everything and serve on `[server].bind` until the process exits.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let ctx = Arc::new(AppContext::from_config(config).await?);
    let bind_addr = config.server.bind.clone();

    println!("Registered {} tools:", ctx.orchestrator.registry().tools().len());
    for t in ctx.orchestrator.registry().tools() {
        println!("  {}: {}", t.name(), t.description());
    }

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    println!("askdocs listening on {}", bind_addr);
    axum::serve(listener, router(ctx)).await?;
    Ok(())
}

/// All routes, with CORS, over a shared [`AppContext`].
pub fn router(ctx: Arc<AppContext>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ask", post(handle_ask))
        .route("/health", get(handle_health))
        .route("/tools/list", get(handle_list_tools))
        .layer(cors)
        .with_state(ctx)
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

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
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

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::ServiceUnavailable(_) | ServiceError::Transient(_) => AppError {
                status: StatusCode::SERVICE_UNAVAILABLE,
                code: "service_unavailable",
                message: err.to_string(),
            },
            other => AppError {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                code: "internal",
                message: other.to_string(),
            },
        }
    }
}

// ============ POST /ask ============

async fn handle_ask(
    State(ctx): State<Arc<AppContext>>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let query = req.query.trim();
    if query.is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    let response = process_chat(&ctx.orchestrator, query, req.session_id).await?;
    Ok(Json(response))
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

// ============ GET /tools/list ============

#[derive(Serialize)]
struct ToolListResponse {
    tools: Vec<ToolSchema>,
}

async fn handle_list_tools(State(ctx): State<Arc<AppContext>>) -> Json<ToolListResponse> {
    Json(ToolListResponse {
        tools: ctx.orchestrator.registry().schemas(),
    })
}

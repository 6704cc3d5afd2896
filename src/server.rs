//! MCP server transports.
//!
//! Two ways to serve the [`ToolRegistry`]:
//!
//! - [`run_stdio`]: MCP over stdin/stdout, for clients that spawn the
//!   server as a subprocess.
//! - [`run_http`]: an axum server carrying both the MCP Streamable HTTP
//!   endpoint and a plain JSON API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `*`    | `/mcp` | MCP Streamable HTTP |
//! | `GET`  | `/tools/list` | List all registered tools with schemas |
//! | `POST` | `/tools/{name}` | Call a tool by name |
//! | `GET`  | `/health` | Health check with schema state |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "missing required parameter: id" } }
//! ```
//!
//! Error codes: `bad_request` (400), `auth_failed` (401), `not_found` (404),
//! `timeout` (408), `unsupported_schema` (422), `rate_limited` (429),
//! `upstream_error` (502), `tool_error` (500).
//!
//! # Client configuration
//!
//! ```json
//! {
//!   "mcpServers": {
//!     "cms": {
//!       "command": "cms-mcp",
//!       "args": ["--config", "/path/to/cms-mcp.toml", "serve", "stdio"]
//!     }
//!   }
//! }
//! ```

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use rmcp::transport::streamable_http_server::{
    session::local::LocalSessionManager, StreamableHttpService,
};
use rmcp::ServiceExt;
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::client::GraphError;
use crate::introspector::InitState;
use crate::mcp::McpBridge;
use crate::query_builder::SchemaError;
use crate::services::CmsServices;
use crate::tools::{validate_params, ToolContext, ToolInfo, ToolRegistry};

/// Shared state for the JSON API handlers.
#[derive(Clone)]
struct AppState {
    services: Arc<CmsServices>,
    tools: Arc<ToolRegistry>,
}

/// Serve MCP over stdin/stdout until the client disconnects.
///
/// Logs go to stderr; stdout carries only protocol frames.
pub async fn run_stdio(services: Arc<CmsServices>) -> anyhow::Result<()> {
    let bridge = McpBridge::new(services, Arc::new(ToolRegistry::with_builtins()));
    info!("MCP server listening on stdio");
    let server = bridge.serve(rmcp::transport::stdio()).await?;
    server.waiting().await?;
    Ok(())
}

/// Serve MCP (`/mcp`) and the JSON API on `[server].bind`.
pub async fn run_http(services: Arc<CmsServices>) -> anyhow::Result<()> {
    let bind_addr = services.config().server.bind.clone();
    let app = router(services, Arc::new(ToolRegistry::with_builtins()));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "MCP server listening on http://{}/mcp", bind_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;
    Ok(())
}

/// The HTTP application: MCP endpoint, JSON API and CORS.
pub fn router(services: Arc<CmsServices>, tools: Arc<ToolRegistry>) -> Router {
    let bridge = McpBridge::new(services.clone(), tools.clone());
    let mcp_service = StreamableHttpService::new(
        move || Ok(bridge.clone()),
        LocalSessionManager::default().into(),
        Default::default(),
    );

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/tools/list", get(handle_list_tools))
        .route("/tools/{name}", post(handle_tool_call))
        .route("/health", get(handle_health))
        .with_state(AppState { services, tools })
        .nest_service("/mcp", mcp_service)
        .layer(cors)
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

impl AppError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
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

fn bad_request(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::BAD_REQUEST, "bad_request", message)
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::NOT_FOUND, "not_found", message)
}

/// Map a tool failure to an HTTP status.
///
/// Typed upstream and schema errors are matched first; anything else is
/// classified by message.
fn classify_tool_error(tool_name: &str, err: anyhow::Error) -> AppError {
    let msg = format!("{}: {:#}", tool_name, err);

    if let Some(graph) = err.downcast_ref::<GraphError>() {
        let (status, code) = match graph {
            GraphError::Auth { .. } => (StatusCode::UNAUTHORIZED, "auth_failed"),
            GraphError::RateLimited(_) => (StatusCode::TOO_MANY_REQUESTS, "rate_limited"),
            GraphError::Timeout => (StatusCode::REQUEST_TIMEOUT, "timeout"),
            _ => (StatusCode::BAD_GATEWAY, "upstream_error"),
        };
        return AppError::new(status, code, msg);
    }
    if err.downcast_ref::<SchemaError>().is_some() {
        return AppError::new(StatusCode::UNPROCESSABLE_ENTITY, "unsupported_schema", msg);
    }

    let lower = msg.to_lowercase();
    if lower.contains("not found") || lower.contains("unknown fragment") {
        not_found(msg)
    } else if lower.contains("must not be empty")
        || lower.contains("is required")
        || lower.contains("invalid")
        || lower.contains("unknown")
    {
        bad_request(msg)
    } else if lower.contains("timed out") {
        AppError::new(StatusCode::REQUEST_TIMEOUT, "timeout", msg)
    } else {
        AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "tool_error", msg)
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    endpoint: String,
    schema: InitState,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        endpoint: state.services.client().endpoint().to_string(),
        schema: state.services.introspector().state(),
    })
}

// ============ GET /tools/list ============

#[derive(Serialize)]
struct ToolListResponse {
    tools: Vec<ToolInfo>,
}

async fn handle_list_tools(State(state): State<AppState>) -> Json<ToolListResponse> {
    let tools = state
        .tools
        .tools()
        .iter()
        .map(|t| ToolInfo::of(t.as_ref()))
        .collect();
    Json(ToolListResponse { tools })
}

// ============ POST /tools/{name} ============

/// Look up, validate and run a tool. The result is wrapped as
/// `{ "result": ... }`.
async fn handle_tool_call(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(params): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, AppError> {
    let tool = state
        .tools
        .find(&name)
        .ok_or_else(|| not_found(format!("no tool registered with name: {}", name)))?;

    let validated_params = validate_params(&tool.parameters_schema(), &params)
        .map_err(|e| bad_request(e.to_string()))?;

    let ctx = ToolContext::new(state.services.clone());
    let result = tool.execute(validated_params, &ctx).await.map_err(|e| {
        warn!(tool = %name, error = %e, "Tool call failed");
        classify_tool_error(&name, e)
    })?;

    Ok(Json(serde_json::json!({ "result": result })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_typed_errors() {
        let err = classify_tool_error("search_content", GraphError::Timeout.into());
        assert_eq!(err.status, StatusCode::REQUEST_TIMEOUT);

        let err = classify_tool_error(
            "search_content",
            GraphError::RateLimited("slow down".into()).into(),
        );
        assert_eq!(err.code, "rate_limited");

        let err = classify_tool_error(
            "search_content",
            SchemaError::NoContentRoot {
                query_type: "Query".into(),
            }
            .into(),
        );
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_classify_by_message() {
        let err = classify_tool_error("get_fragment", anyhow::anyhow!("unknown fragment 'X'"));
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        let err = classify_tool_error("map_fields", anyhow::anyhow!("hint must not be empty"));
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        let err = classify_tool_error("search_content", anyhow::anyhow!("boom"));
        assert_eq!(err.code, "tool_error");
    }
}

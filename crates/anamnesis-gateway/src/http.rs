use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde_json::{json, Value};

use anamnesis_core::ApiError;

use crate::state::AppState;
use crate::tools::{registry, ToolDef};

/// Wraps `ApiError` so its `ErrorKind` maps to the matching HTTP status, per
/// the closed error taxonomy — the same mapping the stdio transport applies
/// to build its JSON-RPC error envelope.
struct ApiErrorResponse(ApiError);

impl IntoResponse for ApiErrorResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.kind.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(json!({ "error": { "kind": self.0.kind, "message": self.0.message } }));
        (status, body).into_response()
    }
}

async fn dispatch_tool(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, ApiErrorResponse> {
    let tool = registry()
        .into_iter()
        .find(|t| t.name == name)
        .ok_or_else(|| ApiErrorResponse(ApiError::not_found(format!("unknown tool: {name}"))))?;
    let args: Value = if body.is_empty() {
        json!({})
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiErrorResponse(ApiError::input_shape(format!("invalid request body: {e}"))))?
    };
    (tool.handler)(state, args)
        .await
        .map(Json)
        .map_err(ApiErrorResponse)
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let health = state.health.check().await;
    Json(serde_json::to_value(health).unwrap())
}

async fn list_tools_handler() -> Json<Value> {
    let defs: Vec<Value> = registry()
        .into_iter()
        .map(|t: ToolDef| json!({ "name": t.name, "description": t.description, "input_schema": t.input_schema }))
        .collect();
    Json(json!({ "tools": defs }))
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/tools", get(list_tools_handler))
        .route("/tools/{name}", post(dispatch_tool))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

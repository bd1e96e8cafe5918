use axum::{
    body::Bytes,
    extract::{Request, State},
    http::{header, HeaderName, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::assistant::AssistantAgent;
use crate::config::Config;
use crate::models::ConversationMessage;

const ALLOWED_HEADERS: &str = "authorization, x-client-info, apikey, content-type";

#[derive(Clone)]
pub struct AppState {
    agent: Arc<AssistantAgent>,
    status: Arc<StatusInfo>,
}

/// Non-secret configuration summary served on `/status`.
#[derive(Debug, Clone)]
pub struct StatusInfo {
    pub model: String,
    pub data_store: String,
    pub auth: String,
}

impl StatusInfo {
    pub fn from_config(config: &Config) -> Self {
        Self {
            model: config.ai_model.model.clone(),
            data_store: format!("{:?}", config.data_store.provider).to_lowercase(),
            auth: format!("{:?}", config.auth.provider).to_lowercase(),
        }
    }
}

impl AppState {
    pub fn new(agent: AssistantAgent, status: StatusInfo) -> Self {
        Self {
            agent: Arc::new(agent),
            status: Arc::new(status),
        }
    }
}

/// Body of a turn request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnRequest {
    #[serde(default)]
    pub messages: Vec<ConversationMessage>,
    #[serde(default)]
    pub auth_token: String,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", post(assistant_handler))
        .route("/ai-assistant", post(assistant_handler))
        .route("/status", get(status_handler))
        .layer(build_cors())
        .layer(middleware::from_fn(cors_headers))
        .with_state(state)
}

/// Answers every OPTIONS request itself, with or without preflight headers.
fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            HeaderName::from_static("x-client-info"),
            HeaderName::from_static("apikey"),
            header::CONTENT_TYPE,
        ])
}

/// Stamp the CORS headers on every response, errors and bare OPTIONS included.
async fn cors_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers
        .entry(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        .or_insert(HeaderValue::from_static("*"));
    headers
        .entry(header::ACCESS_CONTROL_ALLOW_HEADERS)
        .or_insert(HeaderValue::from_static(ALLOWED_HEADERS));
    response
}

/// Handler for one assistant turn
async fn assistant_handler(State(state): State<AppState>, body: Bytes) -> Response {
    let request: TurnRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            log::error!("Error in ai-assistant handler: invalid request body: {}", e);
            return error_response(format!("Invalid request body: {}", e));
        }
    };

    match state
        .agent
        .handle_turn(request.messages, &request.auth_token)
        .await
    {
        Ok(message) => (StatusCode::OK, Json(serde_json::json!({ "message": message }))).into_response(),
        Err(e) => {
            log::error!("Error in ai-assistant handler: {}", e);
            error_response(e.to_string())
        }
    }
}

/// Handler for service status
async fn status_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "model": state.status.model,
        "data_store": state.status.data_store,
        "auth": state.status.auth,
    }))
}

fn error_response(message: String) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "error": message })),
    )
        .into_response()
}

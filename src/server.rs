use crate::config::ProxyConfig;
use crate::error::GatewayError;
use crate::logging::{RequestLogger, SharedLogger};
use crate::proxy::{self, ProxyResult};
use crate::translate::openai_types::{ChatCompletionRequest, ChatErrorResponse};

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub const SERVICE_NAME: &str = "reasoning-proxy";

#[derive(Clone)]
pub struct AppState {
    pub config: ProxyConfig,
    pub client: reqwest::Client,
    pub logger: SharedLogger,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/v1/chat/completions", post(handle_chat_completions))
        .route("/v1/models", get(handle_models))
        .route("/health", get(handle_health))
        .fallback(handle_not_found)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn handle_chat_completions(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let logger = state.logger.for_request();

    let req: ChatCompletionRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            logger.error("server", format!("Failed to parse request: {e}"));
            return error_response(&GatewayError::invalid_request(format!(
                "Invalid request body: {e}"
            )));
        }
    };

    let is_streaming = req.stream.unwrap_or(false);

    logger.info(
        "server",
        format!(
            "Request: model={} streaming={} messages={}",
            req.model,
            is_streaming,
            req.messages.len()
        ),
    );

    if is_streaming {
        handle_streaming(&state, &req, &logger).await
    } else {
        handle_non_streaming(&state, &req, &logger).await
    }
}

async fn handle_non_streaming(
    state: &AppState,
    req: &ChatCompletionRequest,
    logger: &RequestLogger,
) -> Response {
    match proxy::proxy_non_streaming(req, &state.config, &state.client, logger).await {
        Ok(ProxyResult::Success(resp)) => Json(resp).into_response(),
        Ok(ProxyResult::Error(err, status)) => upstream_error_response(err, status),
        Err(e) => {
            logger.error("server", format!("Proxy error: {e}"));
            error_response(&e)
        }
    }
}

async fn handle_streaming(
    state: &AppState,
    req: &ChatCompletionRequest,
    logger: &RequestLogger,
) -> Response {
    let stream = match proxy::proxy_streaming(req, &state.config, &state.client, logger).await {
        Ok(ProxyResult::Success(stream)) => stream,
        Ok(ProxyResult::Error(err, status)) => return upstream_error_response(err, status),
        Err(e) => {
            logger.error("server", format!("Streaming setup error: {e}"));
            return error_response(&e);
        }
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(stream))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

async fn handle_health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "show_reasoning": state.config.reasoning.show_reasoning,
        "thinking_mode": state.config.reasoning.thinking_mode,
    }))
}

async fn handle_models(State(state): State<Arc<AppState>>) -> Response {
    Json(state.config.models.list(SERVICE_NAME)).into_response()
}

async fn handle_not_found(uri: Uri) -> Response {
    let err = ChatErrorResponse::invalid_request(
        format!("Endpoint {} not found", uri.path()),
        StatusCode::NOT_FOUND.as_u16(),
    );
    (StatusCode::NOT_FOUND, Json(err)).into_response()
}

fn upstream_error_response(err: ChatErrorResponse, status: u16) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
    (status, Json(err)).into_response()
}

fn error_response(e: &GatewayError) -> Response {
    let status = e.status();
    let err = ChatErrorResponse::new(e.error_type(), e.to_string(), status.as_u16());
    (status, Json(err)).into_response()
}

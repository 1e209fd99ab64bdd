use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use bytes::Bytes;
use reasoning_proxy::config::{ProxyConfig, ReasoningConfig};
use reasoning_proxy::models::ModelMap;
use reasoning_proxy::{build_router, AppState, SharedLogger};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

const API_KEY_ENV: &str = "REASONING_PROXY_TEST_KEY";
const API_KEY: &str = "test-secret";

const UPSTREAM_SSE: &str = concat!(
    "data: {\"id\":\"c1\",\"object\":\"chat.completion.chunk\",\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"\"},\"finish_reason\":null}]}\n\n",
    "data: {\"id\":\"c1\",\"object\":\"chat.completion.chunk\",\"choices\":[{\"index\":0,\"delta\":{\"reasoning_content\":\"Two plus two\"},\"finish_reason\":null}]}\n\n",
    "data: {\"id\":\"c1\",\"object\":\"chat.completion.chunk\",\"choices\":[{\"index\":0,\"delta\":{\"reasoning_content\":\" is four.\"},\"finish_reason\":null}]}\n\n",
    ": keep-alive\n\n",
    "data: {\"id\":\"c1\",\"object\":\"chat.completion.chunk\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"4\"},\"finish_reason\":null}]}\n\n",
    "data: {broken\n\n",
    "data: {\"id\":\"c1\",\"object\":\"chat.completion.chunk\",\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
    "data: [DONE]\n\n",
);

type Seen = Arc<Mutex<Vec<Value>>>;

// ────────────────────────────────────────────────────────────────
// Mock upstream
// ────────────────────────────────────────────────────────────────

async fn mock_chat_completions(
    State(seen): State<Seen>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    seen.lock().unwrap().push(body.clone());

    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        == Some(format!("Bearer {API_KEY}").as_str());
    if !authorized {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": {"message": "bad key", "type": "authentication_error"}})),
        )
            .into_response();
    }

    if body["model"] == "missing/model" {
        return (StatusCode::NOT_FOUND, Json(json!({"detail": "Model not found"}))).into_response();
    }

    if body["stream"] == true {
        // deliberately awkward chunk boundaries
        let chunks: Vec<Result<Bytes, std::io::Error>> = UPSTREAM_SSE
            .as_bytes()
            .chunks(7)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        return Response::builder()
            .header("content-type", "text/event-stream")
            .body(Body::from_stream(futures::stream::iter(chunks)))
            .unwrap();
    }

    Json(json!({
        "id": "chatcmpl-upstream",
        "object": "chat.completion",
        "created": 1_700_000_000,
        "model": body["model"],
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": "4", "reasoning_content": "2+2"},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 7, "completion_tokens": 3, "total_tokens": 10}
    }))
    .into_response()
}

async fn spawn_mock_upstream() -> (SocketAddr, Seen) {
    let seen: Seen = Arc::default();
    let app = Router::new()
        .route("/v1/chat/completions", post(mock_chat_completions))
        .with_state(seen.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, seen)
}

// ────────────────────────────────────────────────────────────────
// Gateway under test
// ────────────────────────────────────────────────────────────────

struct Harness {
    gateway: SocketAddr,
    seen: Seen,
    client: reqwest::Client,
    _logs: TempDir,
}

async fn spawn_gateway(reasoning: ReasoningConfig) -> Harness {
    std::env::set_var(API_KEY_ENV, API_KEY);

    let (upstream, seen) = spawn_mock_upstream().await;

    let mut config = ProxyConfig::default();
    config.port = 0;
    config.upstream.base_url = format!("http://{upstream}/v1");
    config.upstream.api_key_env = API_KEY_ENV.to_string();
    config.reasoning = reasoning;
    config.models = ModelMap {
        map: HashMap::from([("gpt-4o".to_string(), "deepseek-ai/deepseek-r1".to_string())]),
        fallback: None,
    };

    let logs = tempfile::tempdir().unwrap();
    let logger = SharedLogger::new(logs.path().join("gateway.log")).unwrap();
    let client = reqwest::Client::new();

    let state = Arc::new(AppState {
        config,
        client: client.clone(),
        logger,
    });

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let gateway = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Harness {
        gateway,
        seen,
        client,
        _logs: logs,
    }
}

impl Harness {
    async fn post(&self, body: Value) -> reqwest::Response {
        self.client
            .post(format!("http://{}/v1/chat/completions", self.gateway))
            .json(&body)
            .send()
            .await
            .unwrap()
    }
}

/// Split an SSE body into its `data:` payloads.
fn payloads(body: &str) -> Vec<String> {
    body.split("\n\n")
        .filter(|f| !f.is_empty())
        .map(|f| {
            f.strip_prefix("data: ")
                .unwrap_or_else(|| panic!("frame without data prefix: {f:?}"))
                .to_string()
        })
        .collect()
}

fn delta_content(payload: &str) -> Option<String> {
    let value: Value = serde_json::from_str(payload).unwrap();
    value["choices"][0]["delta"]["content"].as_str().map(String::from)
}

fn thinking_on() -> ReasoningConfig {
    ReasoningConfig {
        show_reasoning: true,
        thinking_mode: true,
    }
}

// ────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_health_and_models() {
    let h = spawn_gateway(ReasoningConfig::default()).await;

    let health: Value = h
        .client
        .get(format!("http://{}/health", h.gateway))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["show_reasoning"], true);

    let models: Value = h
        .client
        .get(format!("http://{}/v1/models", h.gateway))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(models["object"], "list");
    assert_eq!(models["data"][0]["id"], "gpt-4o");
}

#[tokio::test]
async fn test_unknown_endpoint_is_openai_404() {
    let h = spawn_gateway(ReasoningConfig::default()).await;
    let resp = h
        .client
        .get(format!("http://{}/v1/embeddings", h.gateway))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["message"], "Endpoint /v1/embeddings not found");
    assert_eq!(body["error"]["type"], "invalid_request_error");
    assert_eq!(body["error"]["code"], 404);
}

#[tokio::test]
async fn test_invalid_body_is_400() {
    let h = spawn_gateway(ReasoningConfig::default()).await;
    let resp = h
        .client
        .post(format!("http://{}/v1/chat/completions", h.gateway))
        .header("content-type", "application/json")
        .body("{\"messages\": ")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["type"], "invalid_request_error");
}

#[tokio::test]
async fn test_streaming_reasoning_is_merged() {
    let h = spawn_gateway(thinking_on()).await;

    let resp = h
        .post(json!({
            "model": "gpt-4o",
            "messages": [{"role": "user", "content": "What is 2+2?"}],
            "stream": true
        }))
        .await;
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["content-type"], "text/event-stream");

    let body = resp.text().await.unwrap();
    assert!(!body.contains("reasoning_content"));

    let frames = payloads(&body);
    assert_eq!(frames.len(), 6, "frames: {frames:?}");
    assert_eq!(delta_content(&frames[0]).as_deref(), Some(""));
    assert_eq!(delta_content(&frames[1]).as_deref(), Some("<think>\nTwo plus two"));
    assert_eq!(delta_content(&frames[2]).as_deref(), Some(" is four."));
    assert_eq!(delta_content(&frames[3]).as_deref(), Some("</think>\n\n4"));
    assert_eq!(delta_content(&frames[4]), None);
    assert_eq!(frames[5], "[DONE]");

    let sent = h.seen.lock().unwrap().last().cloned().unwrap();
    assert_eq!(sent["model"], "deepseek-ai/deepseek-r1");
    assert_eq!(sent["stream"], true);
    assert_eq!(sent["max_tokens"], 9024);
    assert_eq!(sent["chat_template_kwargs"]["thinking"], true);
}

#[tokio::test]
async fn test_streaming_with_hidden_reasoning() {
    let h = spawn_gateway(ReasoningConfig {
        show_reasoning: false,
        thinking_mode: false,
    })
    .await;

    let body = h
        .post(json!({
            "model": "gpt-4o",
            "messages": [{"role": "user", "content": "What is 2+2?"}],
            "stream": true
        }))
        .await
        .text()
        .await
        .unwrap();

    let contents: Vec<Option<String>> = payloads(&body)
        .iter()
        .filter(|p| p.as_str() != "[DONE]")
        .map(|p| delta_content(p))
        .collect();
    assert_eq!(contents, vec![Some(String::new()), Some("4".to_string()), None]);
    assert!(body.ends_with("data: [DONE]\n\n"));

    let sent = h.seen.lock().unwrap().last().cloned().unwrap();
    assert!(sent.get("chat_template_kwargs").is_none());
}

#[tokio::test]
async fn test_non_streaming_reshaped() {
    let h = spawn_gateway(ReasoningConfig::default()).await;

    let resp = h
        .post(json!({
            "model": "gpt-4o",
            "messages": [{"role": "user", "content": "What is 2+2?"}],
            "temperature": 0.2
        }))
        .await;
    assert_eq!(resp.status(), 200);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["object"], "chat.completion");
    assert_eq!(body["model"], "gpt-4o");
    assert_eq!(
        body["choices"][0]["message"]["content"],
        "<think>\n2+2\n</think>\n\n4"
    );
    assert!(body["choices"][0]["message"].get("reasoning_content").is_none());
    assert_eq!(body["usage"]["total_tokens"], 10);

    let sent = h.seen.lock().unwrap().last().cloned().unwrap();
    assert_eq!(sent["stream"], false);
    assert_eq!(sent["temperature"], 0.2);
}

#[tokio::test]
async fn test_upstream_error_status_relayed() {
    let h = spawn_gateway(ReasoningConfig::default()).await;

    for stream in [false, true] {
        let resp = h
            .post(json!({
                "model": "missing/model",
                "messages": [{"role": "user", "content": "hi"}],
                "stream": stream
            }))
            .await;
        assert_eq!(resp.status(), 404);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["error"]["message"], "Model not found");
        assert_eq!(body["error"]["code"], 404);
    }
}

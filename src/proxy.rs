use crate::config::{ProxyConfig, ReasoningConfig};
use crate::error::{GatewayError, Result};
use crate::logging::{LogLevel, RequestLogger};
use crate::translate::openai_types::{
    ChatCompletionRequest, ChatCompletionResponse, ChatErrorResponse, UpstreamRequest,
};
use crate::translate::request::remap_request;
use crate::translate::response::{reshape_response, truncate, upstream_error_body};
use crate::translate::streaming::StreamTranscoder;

use bytes::Bytes;
use futures::stream::Stream;
use futures::StreamExt;
use std::fmt::Display;
use std::pin::Pin;

/// Outcome of proxying a request: the translated success value, or an
/// OpenAI-style error body with the upstream status.
pub enum ProxyResult<T> {
    Success(T),
    Error(ChatErrorResponse, u16),
}

/// A rewritten SSE byte stream, ready to be used as a response body.
pub type SseStream = Pin<Box<dyn Stream<Item = std::result::Result<Bytes, std::io::Error>> + Send>>;

async fn send_upstream(
    upstream_req: &UpstreamRequest,
    config: &ProxyConfig,
    client: &reqwest::Client,
) -> Result<reqwest::Response> {
    let api_key = config.resolve_api_key()?;
    let url = config.chat_completions_url();

    client
        .post(&url)
        .header("Authorization", format!("Bearer {api_key}"))
        .header("Content-Type", "application/json")
        .json(upstream_req)
        .send()
        .await
        .map_err(|e| GatewayError::upstream(format!("Request to {url} failed: {e}")))
}

/// Forward a non-streaming request and reshape the whole response.
pub async fn proxy_non_streaming(
    req: &ChatCompletionRequest,
    config: &ProxyConfig,
    client: &reqwest::Client,
    logger: &RequestLogger,
) -> Result<ProxyResult<ChatCompletionResponse>> {
    let mut upstream_req = remap_request(req, &config.models, &config.defaults, &config.reasoning);
    upstream_req.stream = false;

    logger.info(
        "proxy",
        format!("POST {} model={}", config.chat_completions_url(), upstream_req.model),
    );

    let response = send_upstream(&upstream_req, config, client).await?;
    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .map_err(|e| GatewayError::upstream(format!("Failed to read response body: {e}")))?;

    logger.debug(
        "proxy",
        format!("Response status={} body_len={}", status, body.len()),
    );

    if status >= 400 {
        let err = upstream_error_body(status, &body);
        logger.warn("proxy", format!("Upstream error {}: {}", status, err.error.message));
        return Ok(ProxyResult::Error(err, status));
    }

    let upstream_resp: ChatCompletionResponse = serde_json::from_str(&body).map_err(|e| {
        GatewayError::translation(format!(
            "Failed to parse upstream response: {}. Body: {}",
            e,
            truncate(&body, 300)
        ))
    })?;

    let resp = reshape_response(&upstream_resp, &req.model, &config.reasoning);

    logger.info(
        "proxy",
        format!(
            "Completed: in={} out={} tokens",
            resp.usage.prompt_tokens, resp.usage.completion_tokens
        ),
    );

    Ok(ProxyResult::Success(resp))
}

/// Forward a streaming request, returning the rewritten SSE byte stream.
///
/// Upstream failures before the first byte come back as `ProxyResult::Error`
/// so the client gets a proper status code instead of an empty stream.
pub async fn proxy_streaming(
    req: &ChatCompletionRequest,
    config: &ProxyConfig,
    client: &reqwest::Client,
    logger: &RequestLogger,
) -> Result<ProxyResult<SseStream>> {
    let mut upstream_req = remap_request(req, &config.models, &config.defaults, &config.reasoning);
    upstream_req.stream = true;

    logger.info(
        "proxy",
        format!(
            "POST {} model={} (streaming)",
            config.chat_completions_url(),
            upstream_req.model
        ),
    );

    let response = send_upstream(&upstream_req, config, client).await?;
    let status = response.status().as_u16();

    if status >= 400 {
        let body = response.text().await.unwrap_or_default();
        let err = upstream_error_body(status, &body);
        logger.warn(
            "proxy",
            format!("Streaming error status={}: {}", status, err.error.message),
        );
        return Ok(ProxyResult::Error(err, status));
    }

    let stream = transcode_stream(response.bytes_stream(), config.reasoning, logger.clone());
    Ok(ProxyResult::Success(Box::pin(stream)))
}

/// Drive a [`StreamTranscoder`] from an upstream byte stream.
///
/// Each rewritten frame is yielded as soon as it is complete. An upstream error
/// ends the output without a synthetic `[DONE]`. Dropping the returned stream
/// (client went away) stops all further work.
pub fn transcode_stream<S, E>(
    byte_stream: S,
    reasoning: ReasoningConfig,
    logger: RequestLogger,
) -> impl Stream<Item = std::result::Result<Bytes, std::io::Error>> + Send + 'static
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    async_stream::stream! {
        let mut transcoder = StreamTranscoder::new(reasoning);
        let mut upstream_failed = false;

        tokio::pin!(byte_stream);

        while let Some(chunk_result) = byte_stream.next().await {
            let chunk = match chunk_result {
                Ok(c) => c,
                Err(e) => {
                    logger.error("stream", format!("Upstream stream error: {e}"));
                    upstream_failed = true;
                    break;
                }
            };

            for frame in transcoder.feed(&chunk) {
                yield Ok(frame);
            }
        }

        let (frames, stats) = transcoder.finish();
        for frame in frames {
            yield Ok(frame);
        }

        let level = if upstream_failed { LogLevel::Warn } else { LogLevel::Info };
        logger.log_with_context(
            level,
            "stream",
            if upstream_failed { "Stream ended early" } else { "Stream completed" },
            serde_json::json!({
                "forwarded": stats.forwarded,
                "suppressed": stats.suppressed,
                "malformed": stats.malformed,
                "reasoning_left_open": stats.left_open,
            }),
        );
    }
}

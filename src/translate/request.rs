//! Remap a client chat-completion request into the request the backend expects.
//!
//! The client speaks plain OpenAI; the backend wants its own model names,
//! always-present sampling values, and (optionally) a chat-template flag that
//! switches on its thinking mode.

use serde_json::json;

use super::openai_types::{ChatCompletionRequest, UpstreamRequest};
use crate::config::{ReasoningConfig, RequestDefaults};
use crate::models::ModelMap;

/// Translate a client request into the backend request.
/// Pure function: everything it needs is passed in.
pub fn remap_request(
    req: &ChatCompletionRequest,
    models: &ModelMap,
    defaults: &RequestDefaults,
    reasoning: &ReasoningConfig,
) -> UpstreamRequest {
    let mut extra = req.extra.clone();

    let chat_template_kwargs = if reasoning.thinking_mode {
        // merge into whatever the client already asked for
        let mut kwargs = match extra.remove("chat_template_kwargs") {
            Some(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        };
        kwargs.insert("thinking".to_string(), json!(true));
        Some(serde_json::Value::Object(kwargs))
    } else {
        extra.remove("chat_template_kwargs")
    };

    UpstreamRequest {
        model: models.resolve(&req.model),
        messages: req.messages.clone(),
        temperature: req.temperature.unwrap_or(defaults.temperature),
        max_tokens: req.max_tokens.unwrap_or(defaults.max_tokens),
        stream: req.stream.unwrap_or(false),
        chat_template_kwargs,
        extra,
    }
}

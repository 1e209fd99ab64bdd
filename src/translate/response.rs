use super::openai_types::{ChatCompletionResponse, ChatErrorResponse, Choice, ChoiceMessage};
use super::reasoning::THINK_OPEN;
use crate::config::ReasoningConfig;

/// Reshape a whole (non-streamed) backend response for the client.
/// Pure function: `requested_model` is the name the client originally asked for.
pub fn reshape_response(
    resp: &ChatCompletionResponse,
    requested_model: &str,
    reasoning: &ReasoningConfig,
) -> ChatCompletionResponse {
    let choices = resp
        .choices
        .iter()
        .map(|choice| Choice {
            message: ChoiceMessage {
                content: Some(merged_content(&choice.message, reasoning)),
                reasoning_content: None,
                ..choice.message.clone()
            },
            ..choice.clone()
        })
        .collect();

    let id = if resp.id.is_empty() {
        format!("chatcmpl-{}", uuid::Uuid::new_v4().simple())
    } else {
        resp.id.clone()
    };

    let created = if resp.created == 0 {
        chrono::Utc::now().timestamp()
    } else {
        resp.created
    };

    ChatCompletionResponse {
        id,
        object: "chat.completion".to_string(),
        created,
        model: requested_model.to_string(),
        choices,
        usage: resp.usage.clone(),
        extra: resp.extra.clone(),
    }
}

fn merged_content(message: &ChoiceMessage, reasoning: &ReasoningConfig) -> String {
    let content = message.content.as_deref().unwrap_or_default();
    match message.reasoning_content.as_deref() {
        Some(thoughts) if reasoning.show_reasoning && !thoughts.is_empty() => {
            format!("{THINK_OPEN}{thoughts}\n</think>\n\n{content}")
        }
        _ => content.to_string(),
    }
}

/// Turn a failed backend response into the error body sent to the client.
///
/// OpenAI-shaped errors keep their message and type. Other shapes
/// (`{"detail": ..}`, `{"message": ..}`, plain text) are wrapped.
pub fn upstream_error_body(status: u16, body: &str) -> ChatErrorResponse {
    if let Ok(mut err) = serde_json::from_str::<ChatErrorResponse>(body) {
        if err.error.error_type.is_empty() {
            err.error.error_type = error_type_for_status(status).to_string();
        }
        if err.error.code.is_none() {
            err.error.code = Some(status.into());
        }
        return err;
    }

    let detail = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            ["detail", "message", "error"]
                .iter()
                .find_map(|key| v.get(*key).and_then(|d| d.as_str()).map(String::from))
        });

    let message = detail.unwrap_or_else(|| {
        format!("Upstream returned status {}: {}", status, truncate(body, 500))
    });

    ChatErrorResponse::new(error_type_for_status(status), message, status)
}

fn error_type_for_status(status: u16) -> &'static str {
    match status {
        400..=404 | 422 => "invalid_request_error",
        429 => "rate_limit_error",
        _ => "api_error",
    }
}

/// Cut `s` to at most `max` bytes without splitting a character.
pub fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_response(content: Option<&str>, reasoning: Option<&str>) -> ChatCompletionResponse {
        serde_json::from_value(json!({
            "id": "chatcmpl-abc123",
            "object": "chat.completion",
            "created": 1_700_000_000,
            "model": "deepseek-ai/deepseek-r1",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": content,
                    "reasoning_content": reasoning
                },
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 20, "total_tokens": 30}
        }))
        .unwrap()
    }

    #[test]
    fn test_reasoning_wrapped_in_think_block() {
        let resp = make_response(Some("42"), Some("add the numbers"));
        let out = reshape_response(&resp, "gpt-4o", &ReasoningConfig::default());

        assert_eq!(out.model, "gpt-4o");
        assert_eq!(out.id, "chatcmpl-abc123");
        assert_eq!(out.created, 1_700_000_000);
        assert_eq!(
            out.choices[0].message.content.as_deref(),
            Some("<think>\nadd the numbers\n</think>\n\n42")
        );
        assert!(out.choices[0].message.reasoning_content.is_none());
        assert_eq!(out.choices[0].finish_reason.as_deref(), Some("stop"));
        assert_eq!(out.usage.total_tokens, 30);

        let body = serde_json::to_value(&out).unwrap();
        assert!(body["choices"][0]["message"].get("reasoning_content").is_none());
    }

    #[test]
    fn test_hidden_reasoning_dropped() {
        let resp = make_response(Some("42"), Some("secret"));
        let reasoning = ReasoningConfig {
            show_reasoning: false,
            thinking_mode: false,
        };
        let out = reshape_response(&resp, "gpt-4o", &reasoning);
        assert_eq!(out.choices[0].message.content.as_deref(), Some("42"));
    }

    #[test]
    fn test_missing_content_becomes_empty_string() {
        let resp = make_response(None, None);
        let out = reshape_response(&resp, "gpt-4o", &ReasoningConfig::default());
        assert_eq!(out.choices[0].message.content.as_deref(), Some(""));
    }

    #[test]
    fn test_missing_id_and_created_are_generated() {
        let mut resp = make_response(Some("hi"), None);
        resp.id.clear();
        resp.created = 0;
        let out = reshape_response(&resp, "gpt-4o", &ReasoningConfig::default());
        assert!(out.id.starts_with("chatcmpl-"));
        assert!(out.created > 0);
    }

    #[test]
    fn test_openai_error_kept() {
        let body = r#"{"error":{"message":"model not found","type":"invalid_request_error"}}"#;
        let err = upstream_error_body(404, body);
        assert_eq!(err.error.message, "model not found");
        assert_eq!(err.error.error_type, "invalid_request_error");
        assert_eq!(err.error.code, Some(json!(404)));
    }

    #[test]
    fn test_detail_error_wrapped() {
        let err = upstream_error_body(429, r#"{"detail":"Too many requests"}"#);
        assert_eq!(err.error.message, "Too many requests");
        assert_eq!(err.error.error_type, "rate_limit_error");
    }

    #[test]
    fn test_plain_text_error_truncated() {
        let body = "x".repeat(2000);
        let err = upstream_error_body(503, &body);
        assert!(err.error.message.starts_with("Upstream returned status 503: "));
        assert!(err.error.message.len() < 600);
        assert_eq!(err.error.error_type, "api_error");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "h");
        assert_eq!(truncate("short", 50), "short");
    }
}

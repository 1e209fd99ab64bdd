//! Fold the `reasoning_content` channel of streamed deltas into `content`.
//!
//! Clients that only read `content` still see the model's reasoning, wrapped
//! in `<think>` markers:
//!
//! | state  | reasoning in delta | emitted content                  | next   |
//! |--------|--------------------|----------------------------------|--------|
//! | Closed | yes                | `"<think>\n" + reasoning`        | Open   |
//! | Open   | yes                | `reasoning`                      | Open   |
//! | Open   | no                 | `"</think>\n\n" + content`       | Closed |
//! | Closed | no                 | `content`                        | Closed |
//!
//! A delta carrying both channels is handled reasoning first, then content.

use serde_json::{Map, Value};

use super::openai_types::ChatCompletionChunk;
use crate::config::ReasoningConfig;

pub const THINK_OPEN: &str = "<think>\n";
pub const THINK_CLOSE: &str = "</think>\n\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReasoningState {
    #[default]
    Closed,
    Open,
}

/// Result of rewriting one event.
#[derive(Debug, Clone, PartialEq)]
pub enum Rewrite {
    /// Forward this (new) event downstream.
    Forward(ChatCompletionChunk),
    /// Nothing visible changed; the event is a no-op for a `content` reader.
    Suppress,
}

/// Per-stream merge state. Create one per response stream.
#[derive(Debug, Clone)]
pub struct ReasoningMerger {
    show_reasoning: bool,
    state: ReasoningState,
}

impl ReasoningMerger {
    #[must_use]
    pub fn new(config: ReasoningConfig) -> Self {
        Self {
            show_reasoning: config.show_reasoning,
            state: ReasoningState::Closed,
        }
    }

    #[must_use]
    pub fn state(&self) -> ReasoningState {
        self.state
    }

    /// Rewrite one decoded event.
    ///
    /// The event is suppressed only when every rewritten delta has empty
    /// content, no marker was emitted, and nothing else rides on the event
    /// (role, tool calls, finish reason, usage). Events without a non-empty
    /// `choices` array pass through untouched, as do choices and deltas that
    /// are not objects.
    pub fn rewrite(&mut self, chunk: &ChatCompletionChunk) -> Rewrite {
        let Some(choices) = chunk.choices().filter(|c| !c.is_empty()) else {
            return Rewrite::Forward(chunk.clone());
        };

        let mut transitioned = false;
        let mut visible = chunk.has_usage();
        let mut rewritten = Vec::with_capacity(choices.len());

        for choice in choices {
            let Some(fields) = choice.as_object() else {
                visible = true;
                rewritten.push(choice.clone());
                continue;
            };
            visible |= fields.get("finish_reason").is_some_and(|r| !r.is_null());

            let mut out = Map::with_capacity(fields.len());
            for (key, value) in fields {
                let value = match (key.as_str(), value) {
                    ("delta", Value::Object(delta)) => {
                        let (delta, moved) = self.rewrite_delta(delta);
                        transitioned |= moved;
                        visible |= carries_signal(&delta);
                        Value::Object(delta)
                    }
                    ("delta", other) => {
                        visible |= !other.is_null();
                        other.clone()
                    }
                    _ => value.clone(),
                };
                out.insert(key.clone(), value);
            }
            rewritten.push(Value::Object(out));
        }

        if !visible && !transitioned {
            return Rewrite::Suppress;
        }

        let mut event = chunk.0.clone();
        if let Some(slot) = event.get_mut("choices") {
            *slot = Value::Array(rewritten);
        }
        Rewrite::Forward(ChatCompletionChunk(event))
    }

    /// Returns the new delta and whether a marker was emitted.
    ///
    /// Keys keep their order. `content` is written only when there is text to
    /// put in it; the rewritten text takes the slot of `content`, or of
    /// `reasoning_content` when the delta had no `content` key.
    fn rewrite_delta(&mut self, delta: &Map<String, Value>) -> (Map<String, Value>, bool) {
        // structured content (e.g. an array of parts) cannot take a marker
        if delta
            .get("content")
            .is_some_and(|c| !c.is_null() && !c.is_string())
        {
            return (delta.clone(), false);
        }

        let reasoning = delta
            .get("reasoning_content")
            .and_then(Value::as_str)
            .filter(|r| !r.is_empty() && self.show_reasoning);
        let content = delta
            .get("content")
            .and_then(Value::as_str)
            .filter(|c| !c.is_empty());

        let mut text = String::new();
        let mut transitioned = false;

        if let Some(reasoning) = reasoning {
            if self.state == ReasoningState::Closed {
                text.push_str(THINK_OPEN);
                self.state = ReasoningState::Open;
                transitioned = true;
            }
            text.push_str(reasoning);
        }

        if self.state == ReasoningState::Open && (reasoning.is_none() || content.is_some()) {
            text.push_str(THINK_CLOSE);
            self.state = ReasoningState::Closed;
            transitioned = true;
        }

        if let Some(content) = content {
            text.push_str(content);
        }

        let has_content_key = delta.contains_key("content");
        let mut text = Some(text).filter(|t| !t.is_empty());
        let mut out = Map::with_capacity(delta.len());

        for (key, value) in delta {
            match key.as_str() {
                "reasoning_content" if value.is_string() || value.is_null() => {
                    if !has_content_key {
                        if let Some(text) = text.take() {
                            out.insert("content".to_string(), Value::String(text));
                        }
                    }
                }
                "content" => {
                    let value = text.take().map_or_else(|| value.clone(), Value::String);
                    out.insert(key.clone(), value);
                }
                _ => {
                    out.insert(key.clone(), value.clone());
                }
            }
        }
        if let Some(text) = text {
            out.insert("content".to_string(), Value::String(text));
        }

        (out, transitioned)
    }
}

/// Whether a rewritten delta still says anything: non-empty content, a role,
/// tool calls, or any other non-null field.
fn carries_signal(delta: &Map<String, Value>) -> bool {
    delta.iter().any(|(key, value)| match (key.as_str(), value) {
        ("content", Value::String(text)) => !text.is_empty(),
        _ => !value.is_null(),
    })
}

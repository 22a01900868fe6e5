//! Translates canonical requests/responses to and from each upstream wire
//! dialect.
//!
//! Five dialects share a typed canonical intermediate
//! (`CanonicalRequest`/`CanonicalStreamEvent`); untyped JSON only appears at
//! the adapter boundary, where `RequestAdapter`/`ResponseAdapter` convert it
//! to and from the canonical shape.

mod anthropic;
mod azure;
mod gemini;
mod openai;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProxyError;
use crate::profile::ApiFormat;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmParamsJson(pub Value);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalRequest {
    pub model: String,
    pub messages: Vec<CanonicalMessage>,
    #[serde(default)]
    pub stream: bool,
    /// Already-merged sampling params as a JSON object (profile + request +
    /// proxy defaults resolved by the Handler before adaptation).
    #[serde(default)]
    pub sampling: Value,
    /// The reasoning fragment is injected by `ReasoningBuilder` after
    /// adaptation, not carried here - the canonical request only says
    /// whether reasoning was requested at all, which dialects use to
    /// decide default behavior when no profile applies.
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    Delta,
    Done,
    Error,
}

/// A normalized view of one upstream SSE/NDJSON event, OpenAI
/// chat-completion-chunk shaped.
#[derive(Debug, Clone, Default)]
pub struct CanonicalStreamEvent {
    pub kind: Option<EventKindOpt>,
    pub content: Option<String>,
    pub reasoning_content: Option<String>,
    pub model: Option<String>,
    pub finish_reason: Option<String>,
    pub done: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EventKindOpt {
    Delta,
    Error,
}

impl CanonicalStreamEvent {
    pub fn delta(content: impl Into<String>) -> Self {
        Self {
            kind: Some(EventKindOpt::Delta),
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn reasoning(content: impl Into<String>) -> Self {
        Self {
            kind: Some(EventKindOpt::Delta),
            reasoning_content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn done() -> Self {
        Self {
            done: true,
            ..Default::default()
        }
    }

    /// Render as an OpenAI-compatible chat-completion-chunk JSON frame.
    pub fn to_sse_data(&self, completion_model: &str) -> Value {
        serde_json::json!({
            "choices": [{
                "delta": {
                    "content": self.content,
                    "reasoning_content": self.reasoning_content,
                },
                "index": 0,
                "finish_reason": self.finish_reason,
            }],
            "model": self.model.clone().unwrap_or_else(|| completion_model.to_string()),
        })
    }
}

/// One upstream request body plus the URL path/query and header overrides
/// needed to send it.
pub struct DialectRequest {
    pub path: String,
    pub body: Value,
}

pub trait RequestAdapter: Send + Sync {
    fn to_dialect(&self, canonical: &CanonicalRequest, model_for_path: &str) -> Result<DialectRequest, ProxyError>;
}

/// Adapts one already-parsed upstream streaming event (a single `data: `
/// payload, or one NDJSON line for Gemini) into zero or more canonical
/// events. Returning an empty vec means "this line carried no
/// client-visible content" (e.g. a ping comment).
pub trait ResponseAdapter: Send + Sync {
    fn parse_stream_event(&self, raw: &str) -> Result<Vec<CanonicalStreamEvent>, ProxyError>;

    /// Translate a full (non-streaming) upstream JSON body into one
    /// canonical delta plus an optional finish reason.
    fn parse_buffered(&self, body: &Value) -> Result<CanonicalStreamEvent, ProxyError>;
}

pub fn request_adapter(format: ApiFormat) -> Box<dyn RequestAdapter> {
    match format {
        ApiFormat::Openai => Box::new(openai::OpenaiRequestAdapter),
        ApiFormat::OpenaiResponse => Box::new(openai::OpenaiResponseRequestAdapter),
        ApiFormat::Anthropic => Box::new(anthropic::AnthropicRequestAdapter),
        ApiFormat::Gemini => Box::new(gemini::GeminiRequestAdapter),
        ApiFormat::AzureOpenai => Box::new(azure::AzureRequestAdapter),
    }
}

pub fn response_adapter(format: ApiFormat) -> Box<dyn ResponseAdapter> {
    match format {
        ApiFormat::Openai | ApiFormat::AzureOpenai => Box::new(openai::OpenaiResponseAdapter),
        ApiFormat::OpenaiResponse => Box::new(openai::OpenaiResponsesResponseAdapter),
        ApiFormat::Anthropic => Box::new(anthropic::AnthropicResponseAdapter),
        ApiFormat::Gemini => Box::new(gemini::GeminiResponseAdapter),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_stream_event_renders_openai_chunk_shape() {
        let ev = CanonicalStreamEvent::delta("hello");
        let v = ev.to_sse_data("gpt-4");
        assert_eq!(v["choices"][0]["delta"]["content"], "hello");
        assert_eq!(v["model"], "gpt-4");
    }
}

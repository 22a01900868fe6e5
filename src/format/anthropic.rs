//! Anthropic Messages dialect.
//!
//! Grounded in `openai/reverse_request.rs` (Anthropic request shape) and
//! `openai/response.rs`'s SSE event dispatch (`content_block_delta`,
//! `message_delta`, `message_stop`), generalized from "translate into
//! OpenAI" to "translate into the canonical shape" (the same target every
//! other dialect adapter produces).

use serde_json::Value;

use crate::error::ProxyError;
use crate::profile::ApiFormat;

use super::{CanonicalRequest, CanonicalStreamEvent, DialectRequest, RequestAdapter, ResponseAdapter, Role};

const DEFAULT_MAX_TOKENS: u64 = 4096;

pub struct AnthropicRequestAdapter;

impl RequestAdapter for AnthropicRequestAdapter {
    fn to_dialect(&self, canonical: &CanonicalRequest, _model_for_path: &str) -> Result<DialectRequest, ProxyError> {
        let mut system = String::new();
        let mut messages = Vec::new();
        let mut system_taken = false;
        for msg in &canonical.messages {
            if msg.role == Role::System && !system_taken {
                system = msg.content.clone();
                system_taken = true;
                continue;
            }
            messages.push(serde_json::json!({
                "role": match msg.role {
                    Role::Assistant => "assistant",
                    _ => "user",
                },
                "content": [{ "type": "text", "text": msg.content }],
            }));
        }

        let max_tokens = canonical
            .sampling
            .get("max_tokens")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_MAX_TOKENS);

        let mut body = serde_json::json!({
            "model": canonical.model,
            "messages": messages,
            "max_tokens": max_tokens,
            "stream": canonical.stream,
        });
        if !system.is_empty() {
            body["system"] = Value::String(system);
        }

        if let Value::Object(sampling) = &canonical.sampling {
            let mut rest = sampling.clone();
            rest.remove("max_tokens");
            if let Some(stop) = rest.remove("stop") {
                rest.insert("stop_sequences".to_string(), stop);
            }
            crate::reasoning::merge_fragment(&mut body, &Value::Object(rest));
        }

        Ok(DialectRequest {
            path: ApiFormat::Anthropic.default_path(&canonical.model),
            body,
        })
    }
}

pub struct AnthropicResponseAdapter;

impl ResponseAdapter for AnthropicResponseAdapter {
    fn parse_stream_event(&self, raw: &str) -> Result<Vec<CanonicalStreamEvent>, ProxyError> {
        let v: Value = serde_json::from_str(raw)
            .map_err(|e| ProxyError::Internal(format!("malformed upstream event: {e}")))?;
        match v.get("type").and_then(|t| t.as_str()) {
            Some("content_block_delta") => {
                let delta = &v["delta"];
                if let Some(text) = delta.get("text").and_then(|t| t.as_str()) {
                    return Ok(vec![CanonicalStreamEvent::delta(text)]);
                }
                if let Some(thinking) = delta.get("thinking").and_then(|t| t.as_str()) {
                    return Ok(vec![CanonicalStreamEvent::reasoning(thinking)]);
                }
                Ok(vec![])
            }
            Some("message_delta") => {
                let finish = v["delta"]["stop_reason"].as_str().map(convert_stop_reason);
                Ok(vec![CanonicalStreamEvent {
                    kind: Some(super::EventKindOpt::Delta),
                    finish_reason: finish,
                    ..Default::default()
                }])
            }
            Some("message_stop") => Ok(vec![CanonicalStreamEvent::done()]),
            _ => Ok(vec![]),
        }
    }

    fn parse_buffered(&self, body: &Value) -> Result<CanonicalStreamEvent, ProxyError> {
        let content = body["content"]
            .as_array()
            .map(|blocks| {
                blocks
                    .iter()
                    .filter(|b| b["type"] == "text")
                    .filter_map(|b| b["text"].as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();
        let reasoning = body["content"]
            .as_array()
            .map(|blocks| {
                blocks
                    .iter()
                    .filter(|b| b["type"] == "thinking")
                    .filter_map(|b| b["thinking"].as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();
        Ok(CanonicalStreamEvent {
            kind: Some(super::EventKindOpt::Delta),
            content: Some(content),
            reasoning_content: if reasoning.is_empty() { None } else { Some(reasoning) },
            model: body.get("model").and_then(|m| m.as_str()).map(|s| s.to_string()),
            finish_reason: body["stop_reason"].as_str().map(convert_stop_reason),
            done: true,
        })
    }
}

fn convert_stop_reason(reason: &str) -> String {
    match reason {
        "end_turn" => "stop",
        "max_tokens" => "length",
        "tool_use" => "tool_calls",
        other => other,
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::CanonicalMessage;

    #[test]
    fn system_message_hoisted_to_top_level() {
        let req = CanonicalRequest {
            model: "claude-sonnet".to_string(),
            messages: vec![
                CanonicalMessage { role: Role::System, content: "be terse".to_string() },
                CanonicalMessage { role: Role::User, content: "hi".to_string() },
            ],
            stream: false,
            sampling: Value::Null,
        };
        let dialect = AnthropicRequestAdapter.to_dialect(&req, "claude-sonnet").unwrap();
        assert_eq!(dialect.body["system"], "be terse");
        assert_eq!(dialect.body["messages"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn max_tokens_defaults_when_absent() {
        let req = CanonicalRequest {
            model: "claude-sonnet".to_string(),
            messages: vec![CanonicalMessage { role: Role::User, content: "hi".to_string() }],
            stream: false,
            sampling: serde_json::json!({}),
        };
        let dialect = AnthropicRequestAdapter.to_dialect(&req, "claude-sonnet").unwrap();
        assert_eq!(dialect.body["max_tokens"], 4096);
    }

    #[test]
    fn stop_maps_to_stop_sequences() {
        let req = CanonicalRequest {
            model: "claude-sonnet".to_string(),
            messages: vec![CanonicalMessage { role: Role::User, content: "hi".to_string() }],
            stream: false,
            sampling: serde_json::json!({ "stop": ["STOP"] }),
        };
        let dialect = AnthropicRequestAdapter.to_dialect(&req, "claude-sonnet").unwrap();
        assert_eq!(dialect.body["stop_sequences"][0], "STOP");
    }

    #[test]
    fn scenario_e_text_deltas_map_to_canonical_content() {
        let events =
            AnthropicResponseAdapter.parse_stream_event(r#"{"type":"content_block_delta","delta":{"text":"Hel"}}"#).unwrap();
        assert_eq!(events[0].content.as_deref(), Some("Hel"));
    }

    #[test]
    fn scenario_f_thinking_delta_maps_to_reasoning_content() {
        let events = AnthropicResponseAdapter
            .parse_stream_event(r#"{"type":"content_block_delta","delta":{"thinking":"I think"}}"#)
            .unwrap();
        assert_eq!(events[0].reasoning_content.as_deref(), Some("I think"));
    }

    #[test]
    fn message_stop_is_terminal() {
        let events = AnthropicResponseAdapter.parse_stream_event(r#"{"type":"message_stop"}"#).unwrap();
        assert!(events[0].done);
    }
}

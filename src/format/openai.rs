//! OpenAI Chat Completions and OpenAI Responses dialects.
//!
//! The canonical wire shape (`CanonicalStreamEvent::to_sse_data`) already
//! *is* the OpenAI chat-completion-chunk shape, so `OpenaiRequestAdapter`/
//! `OpenaiResponseAdapter` are close to identity - grounded directly in
//! `translation/mod.rs`'s passthrough-if-same-format short circuit, made
//! explicit here as a real (if thin) adapter rather than a bypass.

use serde_json::Value;

use crate::error::ProxyError;
use crate::profile::ApiFormat;

use super::{CanonicalRequest, CanonicalStreamEvent, DialectRequest, RequestAdapter, ResponseAdapter};

pub struct OpenaiRequestAdapter;

impl RequestAdapter for OpenaiRequestAdapter {
    fn to_dialect(&self, canonical: &CanonicalRequest, _model_for_path: &str) -> Result<DialectRequest, ProxyError> {
        let messages: Vec<Value> = canonical
            .messages
            .iter()
            .map(|m| serde_json::json!({ "role": role_str(m.role), "content": m.content }))
            .collect();

        let mut body = serde_json::json!({
            "model": canonical.model,
            "messages": messages,
            "stream": canonical.stream,
        });
        merge_sampling(&mut body, &canonical.sampling);

        Ok(DialectRequest {
            path: ApiFormat::Openai.default_path(&canonical.model),
            body,
        })
    }
}

pub struct OpenaiResponseRequestAdapter;

impl RequestAdapter for OpenaiResponseRequestAdapter {
    fn to_dialect(&self, canonical: &CanonicalRequest, _model_for_path: &str) -> Result<DialectRequest, ProxyError> {
        let input: Vec<Value> = canonical
            .messages
            .iter()
            .map(|m| {
                serde_json::json!({
                    "role": role_str(m.role),
                    "content": [{ "type": "input_text", "text": m.content }],
                })
            })
            .collect();

        let mut body = serde_json::json!({
            "model": canonical.model,
            "input": input,
            "stream": canonical.stream,
        });
        if let Some(max_tokens) = canonical.sampling.get("max_tokens") {
            body["max_output_tokens"] = max_tokens.clone();
        }
        merge_sampling_except_max_tokens(&mut body, &canonical.sampling);

        Ok(DialectRequest {
            path: ApiFormat::OpenaiResponse.default_path(&canonical.model),
            body,
        })
    }
}

pub struct OpenaiResponseAdapter;

impl ResponseAdapter for OpenaiResponseAdapter {
    fn parse_stream_event(&self, raw: &str) -> Result<Vec<CanonicalStreamEvent>, ProxyError> {
        if raw.trim() == "[DONE]" {
            return Ok(vec![CanonicalStreamEvent::done()]);
        }
        let v: Value = serde_json::from_str(raw)
            .map_err(|e| ProxyError::Internal(format!("malformed upstream chunk: {e}")))?;
        let delta = &v["choices"][0]["delta"];
        let model = v.get("model").and_then(|m| m.as_str()).map(|s| s.to_string());
        let finish_reason = v["choices"][0]["finish_reason"].as_str().map(|s| s.to_string());
        let mut events = Vec::new();
        let content = delta.get("content").and_then(|c| c.as_str());
        if let Some(content) = content {
            events.push(CanonicalStreamEvent {
                kind: Some(super::EventKindOpt::Delta),
                content: Some(content.to_string()),
                model: model.clone(),
                finish_reason: finish_reason.clone(),
                ..Default::default()
            });
        }
        if let Some(reasoning) = delta.get("reasoning_content").and_then(|c| c.as_str()) {
            events.push(CanonicalStreamEvent::reasoning(reasoning));
        }
        // A terminal chunk carries `finish_reason` with no `delta.content` -
        // still needs to reach the client so the stop reason isn't dropped.
        if content.is_none() && finish_reason.is_some() {
            events.push(CanonicalStreamEvent {
                kind: Some(super::EventKindOpt::Delta),
                model,
                finish_reason,
                ..Default::default()
            });
        }
        Ok(events)
    }

    fn parse_buffered(&self, body: &Value) -> Result<CanonicalStreamEvent, ProxyError> {
        let message = &body["choices"][0]["message"];
        Ok(CanonicalStreamEvent {
            kind: Some(super::EventKindOpt::Delta),
            content: message.get("content").and_then(|c| c.as_str()).map(|s| s.to_string()),
            reasoning_content: message
                .get("reasoning_content")
                .and_then(|c| c.as_str())
                .map(|s| s.to_string()),
            model: body.get("model").and_then(|m| m.as_str()).map(|s| s.to_string()),
            finish_reason: body["choices"][0]["finish_reason"].as_str().map(|s| s.to_string()),
            done: true,
        })
    }
}

pub struct OpenaiResponsesResponseAdapter;

impl ResponseAdapter for OpenaiResponsesResponseAdapter {
    fn parse_stream_event(&self, raw: &str) -> Result<Vec<CanonicalStreamEvent>, ProxyError> {
        let v: Value = serde_json::from_str(raw)
            .map_err(|e| ProxyError::Internal(format!("malformed upstream event: {e}")))?;
        match v.get("type").and_then(|t| t.as_str()) {
            Some("response.output_text.delta") => {
                let content = v.get("delta").and_then(|d| d.as_str()).unwrap_or_default();
                Ok(vec![CanonicalStreamEvent::delta(content)])
            }
            Some("response.reasoning_text.delta") => {
                let content = v.get("delta").and_then(|d| d.as_str()).unwrap_or_default();
                Ok(vec![CanonicalStreamEvent::reasoning(content)])
            }
            Some("response.completed") => Ok(vec![CanonicalStreamEvent::done()]),
            _ => Ok(vec![]),
        }
    }

    fn parse_buffered(&self, body: &Value) -> Result<CanonicalStreamEvent, ProxyError> {
        let text = body["output"]
            .as_array()
            .and_then(|items| items.iter().find(|i| i["type"] == "message"))
            .and_then(|m| m["content"].as_array())
            .and_then(|blocks| blocks.iter().find(|b| b["type"] == "output_text"))
            .and_then(|b| b["text"].as_str())
            .unwrap_or_default();
        Ok(CanonicalStreamEvent {
            kind: Some(super::EventKindOpt::Delta),
            content: Some(text.to_string()),
            model: body.get("model").and_then(|m| m.as_str()).map(|s| s.to_string()),
            done: true,
            ..Default::default()
        })
    }
}

fn role_str(role: super::Role) -> &'static str {
    match role {
        super::Role::System => "system",
        super::Role::User => "user",
        super::Role::Assistant => "assistant",
        super::Role::Tool => "tool",
    }
}

fn merge_sampling(body: &mut Value, sampling: &Value) {
    crate::reasoning::merge_fragment(body, sampling);
}

fn merge_sampling_except_max_tokens(body: &mut Value, sampling: &Value) {
    if let Value::Object(map) = sampling {
        let mut filtered = map.clone();
        filtered.remove("max_tokens");
        crate::reasoning::merge_fragment(body, &Value::Object(filtered));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{CanonicalMessage, Role};

    #[test]
    fn request_adapter_passes_messages_through() {
        let req = CanonicalRequest {
            model: "gpt-4".to_string(),
            messages: vec![CanonicalMessage { role: Role::User, content: "hi".to_string() }],
            stream: true,
            sampling: serde_json::json!({ "temperature": 0.5 }),
        };
        let dialect = OpenaiRequestAdapter.to_dialect(&req, "gpt-4").unwrap();
        assert_eq!(dialect.body["messages"][0]["content"], "hi");
        assert_eq!(dialect.body["temperature"], 0.5);
        assert_eq!(dialect.path, "/v1/chat/completions");
    }

    #[test]
    fn response_adapter_done_sentinel() {
        let events = OpenaiResponseAdapter.parse_stream_event("[DONE]").unwrap();
        assert!(events[0].done);
    }

    #[test]
    fn response_adapter_extracts_content_delta() {
        let raw = r#"{"choices":[{"delta":{"content":"Hel"},"finish_reason":null}],"model":"gpt-4"}"#;
        let events = OpenaiResponseAdapter.parse_stream_event(raw).unwrap();
        assert_eq!(events[0].content.as_deref(), Some("Hel"));
    }

    #[test]
    fn response_adapter_forwards_finish_reason_on_empty_final_delta() {
        let raw = r#"{"choices":[{"delta":{},"finish_reason":"stop"}],"model":"gpt-4"}"#;
        let events = OpenaiResponseAdapter.parse_stream_event(raw).unwrap();
        assert_eq!(events.len(), 1);
        assert!(events[0].content.is_none());
        assert_eq!(events[0].finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn responses_request_adapter_maps_max_tokens() {
        let req = CanonicalRequest {
            model: "gpt-5".to_string(),
            messages: vec![CanonicalMessage { role: Role::User, content: "hi".to_string() }],
            stream: false,
            sampling: serde_json::json!({ "max_tokens": 100 }),
        };
        let dialect = OpenaiResponseRequestAdapter.to_dialect(&req, "gpt-5").unwrap();
        assert_eq!(dialect.body["max_output_tokens"], 100);
        assert!(dialect.body.get("max_tokens").is_none());
        assert_eq!(dialect.body["input"][0]["content"][0]["type"], "input_text");
    }
}

//! Google Gemini dialect.
//!
//! Gemini's streaming responses are newline-delimited JSON rather than
//! `data: ` framed SSE, and it has no native `[DONE]` sentinel - the
//! adapter synthesizes one from the final chunk's `finishReason`.

use serde_json::Value;

use crate::error::ProxyError;

use super::{CanonicalRequest, CanonicalStreamEvent, DialectRequest, RequestAdapter, ResponseAdapter, Role};

pub struct GeminiRequestAdapter;

impl RequestAdapter for GeminiRequestAdapter {
    fn to_dialect(&self, canonical: &CanonicalRequest, model_for_path: &str) -> Result<DialectRequest, ProxyError> {
        let mut system_parts = Vec::new();
        let mut contents = Vec::new();
        for msg in &canonical.messages {
            match msg.role {
                Role::System => system_parts.push(msg.content.clone()),
                Role::Assistant => contents.push(serde_json::json!({
                    "role": "model",
                    "parts": [{ "text": msg.content }],
                })),
                _ => contents.push(serde_json::json!({
                    "role": "user",
                    "parts": [{ "text": msg.content }],
                })),
            }
        }

        let mut body = serde_json::json!({ "contents": contents });
        if !system_parts.is_empty() {
            body["systemInstruction"] = serde_json::json!({
                "parts": [{ "text": system_parts.join("\n") }],
            });
        }
        if canonical.sampling.is_object() {
            body["generationConfig"] = canonical.sampling.clone();
        }

        let method = if canonical.stream {
            "streamGenerateContent"
        } else {
            "generateContent"
        };

        Ok(DialectRequest {
            path: format!("/v1beta/models/{model_for_path}:{method}"),
            body,
        })
    }
}

pub struct GeminiResponseAdapter;

impl ResponseAdapter for GeminiResponseAdapter {
    fn parse_stream_event(&self, raw: &str) -> Result<Vec<CanonicalStreamEvent>, ProxyError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed == "[" || trimmed == "]" || trimmed == "," {
            return Ok(vec![]);
        }
        let trimmed = trimmed.trim_start_matches(',').trim();
        let v: Value = serde_json::from_str(trimmed)
            .map_err(|e| ProxyError::Internal(format!("malformed gemini chunk: {e}")))?;

        let mut events = Vec::new();
        if let Some(parts) = v["candidates"][0]["content"]["parts"].as_array() {
            for part in parts {
                if let Some(text) = part.get("text").and_then(|t| t.as_str()) {
                    events.push(CanonicalStreamEvent::delta(text));
                }
            }
        }
        if let Some(finish) = v["candidates"][0]["finishReason"].as_str() {
            events.push(CanonicalStreamEvent {
                kind: Some(super::EventKindOpt::Delta),
                finish_reason: Some(finish.to_lowercase()),
                ..Default::default()
            });
            events.push(CanonicalStreamEvent::done());
        }
        Ok(events)
    }

    fn parse_buffered(&self, body: &Value) -> Result<CanonicalStreamEvent, ProxyError> {
        let text = body["candidates"][0]["content"]["parts"]
            .as_array()
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|p| p["text"].as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();
        Ok(CanonicalStreamEvent {
            kind: Some(super::EventKindOpt::Delta),
            content: Some(text),
            finish_reason: body["candidates"][0]["finishReason"]
                .as_str()
                .map(|s| s.to_lowercase()),
            done: true,
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::CanonicalMessage;

    #[test]
    fn system_messages_become_system_instruction() {
        let req = CanonicalRequest {
            model: "gemini-1.5-pro".to_string(),
            messages: vec![
                CanonicalMessage { role: Role::System, content: "be terse".to_string() },
                CanonicalMessage { role: Role::User, content: "hi".to_string() },
            ],
            stream: true,
            sampling: Value::Null,
        };
        let dialect = GeminiRequestAdapter.to_dialect(&req, "gemini-1.5-pro").unwrap();
        assert_eq!(dialect.body["systemInstruction"]["parts"][0]["text"], "be terse");
        assert!(dialect.path.ends_with(":streamGenerateContent"));
    }

    #[test]
    fn assistant_role_maps_to_model() {
        let req = CanonicalRequest {
            model: "gemini-1.5-pro".to_string(),
            messages: vec![CanonicalMessage { role: Role::Assistant, content: "ok".to_string() }],
            stream: false,
            sampling: Value::Null,
        };
        let dialect = GeminiRequestAdapter.to_dialect(&req, "gemini-1.5-pro").unwrap();
        assert_eq!(dialect.body["contents"][0]["role"], "model");
        assert!(dialect.path.ends_with(":generateContent"));
    }

    #[test]
    fn ndjson_chunk_produces_canonical_delta_and_synthesizes_done() {
        let raw = r#"{"candidates":[{"content":{"parts":[{"text":"hi"}]},"finishReason":"STOP"}]}"#;
        let events = GeminiResponseAdapter.parse_stream_event(raw).unwrap();
        assert_eq!(events[0].content.as_deref(), Some("hi"));
        assert!(events.last().unwrap().done);
    }
}

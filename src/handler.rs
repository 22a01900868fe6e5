//! Per-request orchestration: auth, profile resolve, adapt-in,
//! reasoning-inject, upstream call, adapt-out, filter, publish. The shared
//! reqwest client (`http1_only`, `pool_max_idle_per_host`, a blanket
//! timeout) is built once in `server.rs` and handed to every request
//! through `AppState`.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use tokio_stream::wrappers::ReceiverStream;

use crate::config::ConfigStore;
use crate::error::ProxyError;
use crate::format::{self, CanonicalMessage, CanonicalRequest, CanonicalStreamEvent, Role};
use crate::profile::{ApiFormat, Profile, Upstream};
use crate::reasoning;
use crate::sse;
use crate::stream_filter::StreamFilter;
use crate::thinking_bus::{ThinkingBus, ThinkingFragment};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ConfigStore>,
    pub thinking_bus: Arc<ThinkingBus>,
    pub http: reqwest::Client,
    pub upstream_timeout: Duration,
}

/// Authorization check: bearer token against the configured proxy key.
fn check_auth(state: &AppState, headers: &HeaderMap) -> Result<(), ProxyError> {
    let settings = state.config.proxy_settings();
    let Some(expected) = settings.api_key else {
        return Ok(());
    };
    let provided = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    if provided == Some(expected.as_str()) {
        Ok(())
    } else {
        Err(ProxyError::Unauthorized)
    }
}

/// Header-driven overrides (`X-Upstream-Base-URL`, `X-API-Format`), validated
/// identically to the config API: this reuses `Upstream`'s own shape and
/// `url::Url::parse`, same as `Profile::validate`.
fn apply_header_overrides(mut upstream: Upstream, headers: &HeaderMap) -> Result<Upstream, ProxyError> {
    if let Some(base_url) = headers.get("x-upstream-base-url").and_then(|v| v.to_str().ok()) {
        url::Url::parse(base_url)
            .map_err(|e| ProxyError::BadRequest(format!("invalid X-Upstream-Base-URL: {e}")))?;
        upstream.base_url = base_url.to_string();
    }
    if let Some(format_header) = headers.get("x-api-format").and_then(|v| v.to_str().ok()) {
        upstream.api_format = parse_api_format(format_header)
            .ok_or_else(|| ProxyError::BadRequest(format!("unknown X-API-Format: {format_header}")))?;
    }
    Ok(upstream)
}

fn parse_api_format(raw: &str) -> Option<ApiFormat> {
    match raw {
        "openai" => Some(ApiFormat::Openai),
        "openai-response" => Some(ApiFormat::OpenaiResponse),
        "anthropic" => Some(ApiFormat::Anthropic),
        "gemini" => Some(ApiFormat::Gemini),
        "azure-openai" => Some(ApiFormat::AzureOpenai),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct IncomingRequest {
    model: String,
    messages: Vec<IncomingMessage>,
    #[serde(default)]
    stream: bool,
    #[serde(flatten)]
    sampling: serde_json::Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct IncomingMessage {
    role: String,
    content: String,
}

fn parse_role(role: &str) -> Role {
    match role {
        "system" => Role::System,
        "assistant" => Role::Assistant,
        "tool" => Role::Tool,
        _ => Role::User,
    }
}

const SAMPLING_ONLY_KEYS: &[&str] = &[
    "temperature",
    "top_p",
    "top_k",
    "max_tokens",
    "presence_penalty",
    "frequency_penalty",
    "seed",
    "stop",
];

/// Merge request-level sampling (highest priority) over the profile's
/// `llm_params` (lower priority): request wins, then profile, then proxy
/// defaults. Only the recognized sampling keys participate; other fields in
/// the request body are dropped rather than silently forwarded, since only
/// a closed set of sampling options is recognized.
fn merged_sampling(profile: &Profile, request_sampling: &serde_json::Map<String, Value>) -> Value {
    let mut merged = serde_json::to_value(&profile.llm_params).unwrap_or(Value::Object(Default::default()));
    if let Value::Object(ref mut map) = merged {
        map.retain(|_, v| !v.is_null());
    }
    let mut overrides = serde_json::Map::new();
    for key in SAMPLING_ONLY_KEYS {
        if let Some(v) = request_sampling.get(*key) {
            if !v.is_null() {
                overrides.insert((*key).to_string(), v.clone());
            }
        }
    }
    reasoning::merge_fragment(&mut merged, &Value::Object(overrides));
    merged
}

pub async fn chat_completions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(raw_body): Json<Value>,
) -> Result<Response, ProxyError> {
    check_auth(&state, &headers)?;

    let incoming: IncomingRequest = serde_json::from_value(raw_body)
        .map_err(|e| ProxyError::BadRequest(format!("malformed request body: {e}")))?;

    let snapshot = state.config.profiles().snapshot();
    let profile = snapshot
        .resolve(&incoming.model)
        .cloned()
        .ok_or_else(|| ProxyError::NoProfileMatch(incoming.model.clone()))?;

    let upstream = apply_header_overrides(profile.upstream.clone(), &headers)?;

    let canonical = CanonicalRequest {
        model: incoming.model.clone(),
        messages: incoming
            .messages
            .into_iter()
            .map(|m| CanonicalMessage { role: parse_role(&m.role), content: m.content })
            .collect(),
        stream: incoming.stream,
        sampling: merged_sampling(&profile, &incoming.sampling),
    };

    let request_adapter = format::request_adapter(upstream.api_format);
    let mut dialect_request = request_adapter.to_dialect(&canonical, &incoming.model)?;
    let reasoning_fragment = reasoning::build_fragment(&profile.reasoning);
    reasoning::merge_fragment(&mut dialect_request.body, &reasoning_fragment);

    let url = build_upstream_url(&upstream, &dialect_request.path);
    let mut builder = state
        .http
        .post(&url)
        .timeout(state.upstream_timeout)
        .json(&dialect_request.body);
    if let Some((name, value)) = upstream.auth_header() {
        builder = builder.header(name, value);
    }

    let upstream_response = builder.send().await.map_err(|e| {
        if e.is_timeout() {
            ProxyError::UpstreamTimeout
        } else {
            ProxyError::UpstreamConnection(e.to_string())
        }
    })?;

    let status = upstream_response.status();
    if !status.is_success() {
        let body: Value = upstream_response
            .json()
            .await
            .unwrap_or_else(|_| serde_json::json!({"error": {"type": "upstream_error", "message": "non-JSON upstream error body"}}));
        return Err(ProxyError::UpstreamError { status, body });
    }

    let filter_thinking = profile.reasoning.filter_thinking_tags;
    let api_format = upstream.api_format;
    let response_adapter = format::response_adapter(api_format);
    let model_name = incoming.model.clone();

    if canonical.stream {
        Ok(stream_response(state, upstream_response, response_adapter, api_format, model_name, filter_thinking))
    } else {
        buffered_response(state, upstream_response, response_adapter, model_name, filter_thinking).await
    }
}

fn build_upstream_url(upstream: &Upstream, path: &str) -> String {
    let mut url = format!("{}{}", upstream.base_url.trim_end_matches('/'), path);
    if upstream.api_format == ApiFormat::Gemini {
        if let Some(key) = &upstream.api_key {
            let sep = if url.contains('?') { '&' } else { '?' };
            url.push(sep);
            url.push_str("key=");
            url.push_str(key);
        }
    }
    url
}

async fn buffered_response(
    state: AppState,
    upstream_response: reqwest::Response,
    response_adapter: Box<dyn format::ResponseAdapter>,
    model_name: String,
    filter_thinking: bool,
) -> Result<Response, ProxyError> {
    let body: Value = upstream_response
        .json()
        .await
        .map_err(|e| ProxyError::Internal(format!("failed to decode upstream body: {e}")))?;
    let event = response_adapter.parse_buffered(&body)?;

    let mut content = event.content.unwrap_or_default();
    let mut reasoning_content = event.reasoning_content;

    if filter_thinking {
        let filtered = crate::stream_filter::filter_once(&content);
        content = filtered.clean;
        if !filtered.thinking.is_empty() {
            reasoning_content = Some(match reasoning_content {
                Some(existing) => format!("{existing}{}", filtered.thinking),
                None => filtered.thinking.clone(),
            });
            state.thinking_bus.publish(ThinkingFragment {
                content: filtered.thinking,
                model: Some(model_name.clone()),
                timestamp: chrono::Utc::now(),
            });
        }
    } else if let Some(ref reasoning) = reasoning_content {
        state.thinking_bus.publish(ThinkingFragment {
            content: reasoning.clone(),
            model: Some(model_name.clone()),
            timestamp: chrono::Utc::now(),
        });
    }

    let response_model = event.model.unwrap_or(model_name);
    let out = serde_json::json!({
        "choices": [{
            "message": { "role": "assistant", "content": content, "reasoning_content": reasoning_content },
            "index": 0,
            "finish_reason": event.finish_reason,
        }],
        "model": response_model,
    });
    Ok(Json(out).into_response())
}

fn stream_response(
    state: AppState,
    upstream_response: reqwest::Response,
    response_adapter: Box<dyn format::ResponseAdapter>,
    api_format: ApiFormat,
    model_name: String,
    filter_thinking: bool,
) -> Response {
    let (tx, rx) = tokio::sync::mpsc::channel::<String>(64);

    // Gemini has no `data:` framing - each line (once the enclosing JSON
    // array's brackets/commas are stripped) is the payload itself. Every
    // other dialect is real SSE, so `sse::data_payload` does the stripping.
    let is_gemini = api_format == ApiFormat::Gemini;
    let extract_payload = move |line: &str| -> Option<String> {
        if is_gemini {
            let trimmed = line.trim();
            if trimmed.is_empty() { None } else { Some(trimmed.to_string()) }
        } else {
            sse::data_payload(line).map(str::to_string)
        }
    };

    tokio::spawn(async move {
        let mut byte_stream = upstream_response.bytes_stream();
        let mut splitter = sse::LineSplitter::new();
        let mut filter = StreamFilter::new();
        let mut finished = false;

        'read: while let Some(chunk) = byte_stream.next().await {
            let Ok(bytes) = chunk else {
                // Upstream connection dropped mid-stream: once an SSE body has
                // begun, an error is delivered as a final data frame rather than
                // an HTTP status change.
                let err = ProxyError::UpstreamConnection("upstream stream closed unexpectedly".to_string());
                let _ = tx.send(sse::encode_data(&err.to_json())).await;
                let _ = tx.send(sse::encode_done().to_string()).await;
                return;
            };
            let text = String::from_utf8_lossy(&bytes).into_owned();
            for line in splitter.feed(&text) {
                let Some(payload) = extract_payload(&line) else { continue };
                // `parse_stream_event` already yields a terminal `done`
                // event for `[DONE]`/`message_stop`/a Gemini chunk carrying
                // `finishReason` - `forward_events`'s return value is the
                // single source of truth for "stop reading", so any content
                // sharing that same line (Gemini's last chunk often does)
                // is still forwarded before the loop ends.
                let events = match response_adapter.parse_stream_event(&payload) {
                    Ok(events) => events,
                    Err(_) => continue,
                };
                let outcome = forward_events(&tx, &state, &mut filter, &model_name, filter_thinking, events).await;
                if outcome.disconnected {
                    // Client hung up: drop `byte_stream` on scope exit, which
                    // closes the upstream connection immediately rather than
                    // draining it for nobody.
                    return;
                }
                if outcome.done {
                    finished = true;
                    break 'read;
                }
            }
        }

        if !finished {
            if let Some(tail) = splitter.finish() {
                if let Some(payload) = extract_payload(&tail) {
                    if let Ok(events) = response_adapter.parse_stream_event(&payload) {
                        let outcome = forward_events(&tx, &state, &mut filter, &model_name, filter_thinking, events).await;
                        if outcome.disconnected {
                            return;
                        }
                    }
                }
            }
        }

        let tail = filter.finish();
        if !tail.clean.is_empty() {
            let ev = CanonicalStreamEvent::delta(tail.clean);
            if tx.send(sse::encode_data(&ev.to_sse_data(&model_name))).await.is_err() {
                return;
            }
        }
        if !tail.thinking.is_empty() {
            state.thinking_bus.publish(ThinkingFragment {
                content: tail.thinking,
                model: Some(model_name.clone()),
                timestamp: chrono::Utc::now(),
            });
        }

        let _ = tx.send(sse::encode_done().to_string()).await;
    });

    let stream = ReceiverStream::new(rx).map(|s| Ok::<_, Infallible>(s.into_bytes()));
    Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "text/event-stream")
        .header("cache-control", "no-cache")
        .body(Body::from_stream(stream))
        .expect("static SSE response headers are always valid")
}

/// Outcome of pushing one batch of canonical events to the client.
#[derive(Debug, Default, Clone, Copy)]
struct ForwardOutcome {
    /// A terminal event (`[DONE]`/`message_stop`/Gemini `finishReason`) was
    /// seen in this batch.
    done: bool,
    /// The client's receiver is gone - the caller should stop reading from
    /// upstream immediately rather than keep draining it for nobody.
    disconnected: bool,
}

/// Push a batch of canonical events out to the client (content only) and to
/// the ThinkingBus (reasoning only), running content through `filter` first
/// when the profile asks for `<think>` stripping.
async fn forward_events(
    tx: &tokio::sync::mpsc::Sender<String>,
    state: &AppState,
    filter: &mut StreamFilter,
    model_name: &str,
    filter_thinking: bool,
    events: Vec<CanonicalStreamEvent>,
) -> ForwardOutcome {
    let mut outcome = ForwardOutcome::default();
    for event in events {
        if outcome.disconnected {
            break;
        }
        if event.done {
            outcome.done = true;
            continue;
        }
        if let Some(reasoning) = &event.reasoning_content {
            state.thinking_bus.publish(ThinkingFragment {
                content: reasoning.clone(),
                model: Some(model_name.to_string()),
                timestamp: chrono::Utc::now(),
            });
        }
        if let Some(content) = &event.content {
            if filter_thinking {
                let out = filter.feed(content);
                if !out.clean.is_empty() {
                    let mut forwarded = event.clone();
                    forwarded.content = Some(out.clean);
                    forwarded.reasoning_content = None;
                    if tx.send(sse::encode_data(&forwarded.to_sse_data(model_name))).await.is_err() {
                        outcome.disconnected = true;
                    }
                }
                if !out.thinking.is_empty() {
                    state.thinking_bus.publish(ThinkingFragment {
                        content: out.thinking,
                        model: Some(model_name.to_string()),
                        timestamp: chrono::Utc::now(),
                    });
                }
            } else {
                let mut forwarded = event.clone();
                forwarded.reasoning_content = None;
                if tx.send(sse::encode_data(&forwarded.to_sse_data(model_name))).await.is_err() {
                    outcome.disconnected = true;
                }
            }
        } else if event.finish_reason.is_some() {
            let mut forwarded = event.clone();
            forwarded.content = None;
            forwarded.reasoning_content = None;
            if tx.send(sse::encode_data(&forwarded.to_sse_data(model_name))).await.is_err() {
                outcome.disconnected = true;
            }
        }
    }
    outcome
}

/// `GET /v1/models` - pass-through model list from the resolved or default
/// profile's upstream, reshaped into OpenAI's `{data:[{id,object:"model"}]}`.
pub async fn list_models(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, ProxyError> {
    check_auth(&state, &headers)?;
    let snapshot = state.config.profiles().snapshot();
    let profile = snapshot
        .default_profile()
        .cloned()
        .ok_or_else(|| ProxyError::NoProfileMatch("(no model specified)".to_string()))?;

    let (path, query_key) = match profile.upstream.api_format {
        ApiFormat::Gemini => ("/v1beta/models".to_string(), true),
        ApiFormat::AzureOpenai => ("/openai/models?api-version=2024-06-01".to_string(), false),
        _ => ("/v1/models".to_string(), false),
    };
    let mut url = format!("{}{}", profile.upstream.base_url.trim_end_matches('/'), path);
    if query_key {
        if let Some(key) = &profile.upstream.api_key {
            let sep = if url.contains('?') { '&' } else { '?' };
            url.push(sep);
            url.push_str("key=");
            url.push_str(key);
        }
    }

    let mut builder = state.http.get(&url);
    if let Some((name, value)) = profile.upstream.auth_header() {
        builder = builder.header(name, value);
    }
    let response = builder
        .send()
        .await
        .map_err(|e| ProxyError::UpstreamConnection(e.to_string()))?;
    let status = response.status();
    let body: Value = response
        .json()
        .await
        .unwrap_or_else(|_| serde_json::json!({}));
    if !status.is_success() {
        return Err(ProxyError::UpstreamError { status, body });
    }

    let ids: Vec<String> = match profile.upstream.api_format {
        ApiFormat::Gemini => body["models"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|m| m["name"].as_str())
                    .map(|s| s.trim_start_matches("models/").to_string())
                    .collect()
            })
            .unwrap_or_default(),
        _ => body["data"]
            .as_array()
            .map(|items| items.iter().filter_map(|m| m["id"].as_str().map(str::to_string)).collect())
            .unwrap_or_default(),
    };

    let data: Vec<Value> = ids.into_iter().map(|id| serde_json::json!({ "id": id, "object": "model" })).collect();
    Ok(Json(serde_json::json!({ "data": data })).into_response())
}

/// `GET /health`.
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let snapshot = state.config.profiles().snapshot();
    let upstream = snapshot.default_profile().map(|p| p.upstream.base_url.clone());
    Json(serde_json::json!({ "status": "ok", "upstream": upstream }))
}

#[derive(Debug, Deserialize)]
pub struct ThinkingStreamQuery {}

/// `GET /v1/thinking/stream` - SSE of filtered thinking fragments.
pub async fn thinking_stream(State(state): State<AppState>, _q: Query<ThinkingStreamQuery>) -> Response {
    let mut subscription = state.thinking_bus.subscribe();
    let (tx, rx) = tokio::sync::mpsc::channel::<String>(64);

    tokio::spawn(async move {
        loop {
            tokio::select! {
                fragment = subscription.recv() => {
                    match fragment {
                        Some(fragment) => {
                            let payload = serde_json::json!({
                                "type": "thinking",
                                "content": fragment.content,
                                "model": fragment.model,
                            });
                            if tx.send(sse::encode_data(&payload)).await.is_err() {
                                break;
                            }
                        }
                        None => {
                            let _ = tx.send(sse::encode_data(&serde_json::json!({ "type": "done" }))).await;
                            break;
                        }
                    }
                }
                _ = tokio::time::sleep(Duration::from_secs(15)) => {
                    if tx.send(sse::encode_keepalive().to_string()).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let stream = ReceiverStream::new(rx).map(|s| Ok::<_, Infallible>(s.into_bytes()));
    Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "text/event-stream")
        .header("cache-control", "no-cache")
        .body(Body::from_stream(stream))
        .expect("static SSE response headers are always valid")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::LlmParams;

    fn profile_with_params(llm_params: LlmParams) -> Profile {
        Profile {
            id: "p1".into(),
            name: "p1".into(),
            model_patterns: vec!["*".into()],
            match_type: crate::profile::MatchType::Wildcard,
            priority: 0,
            enabled: true,
            upstream: Upstream {
                base_url: "https://example.com".into(),
                api_key: None,
                api_format: ApiFormat::Openai,
            },
            llm_params,
            reasoning: crate::reasoning::ReasoningSpec {
                enabled: false,
                kind: crate::reasoning::ReasoningType::Openai,
                effort: crate::reasoning::Effort::Minimal,
                budget_tokens: None,
                custom_params: None,
                filter_thinking_tags: true,
            },
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn request_sampling_overrides_profile_defaults() {
        let mut params = LlmParams::default();
        params.temperature = Some(0.2);
        let profile = profile_with_params(params);
        let mut request_sampling = serde_json::Map::new();
        request_sampling.insert("temperature".to_string(), serde_json::json!(0.9));
        let merged = merged_sampling(&profile, &request_sampling);
        assert_eq!(merged["temperature"], 0.9);
    }

    #[test]
    fn profile_default_used_when_request_omits_field() {
        let mut params = LlmParams::default();
        params.top_p = Some(0.5);
        let profile = profile_with_params(params);
        let merged = merged_sampling(&profile, &serde_json::Map::new());
        assert_eq!(merged["top_p"], 0.5);
    }

    #[test]
    fn build_upstream_url_appends_gemini_key() {
        let upstream = Upstream {
            base_url: "https://generativelanguage.googleapis.com".into(),
            api_key: Some("abc".into()),
            api_format: ApiFormat::Gemini,
        };
        let url = build_upstream_url(&upstream, "/v1beta/models/gemini-1.5-pro:streamGenerateContent");
        assert!(url.ends_with("?key=abc"));
    }
}

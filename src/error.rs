// Error taxonomy for the proxy and config REST surface.
//
// Mirrors the source's error-kind list: client errors map to a fixed HTTP
// status with a `{error:{type, message}}` body; upstream errors relay the
// upstream's own status and body verbatim; internal errors are opaque.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("no profile matches model '{0}' and no default profile is configured")]
    NoProfileMatch(String),

    #[error("upstream returned {status}")]
    UpstreamError {
        status: StatusCode,
        body: serde_json::Value,
    },

    #[error("upstream timed out")]
    UpstreamTimeout,

    #[error("could not connect to upstream: {0}")]
    UpstreamConnection(String),

    /// Client disconnected mid-stream. Never logged as a failure, never
    /// surfaced to anyone - the handler simply stops producing bytes.
    #[error("stream interrupted")]
    StreamInterrupted,

    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    #[serde(rename = "type")]
    kind: &'static str,
    message: String,
}

impl ProxyError {
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyError::BadRequest(_) => "bad_request",
            ProxyError::Unauthorized => "unauthorized",
            ProxyError::NoProfileMatch(_) => "no_profile_match",
            ProxyError::UpstreamError { .. } => "upstream_error",
            ProxyError::UpstreamTimeout => "upstream_timeout",
            ProxyError::UpstreamConnection(_) => "upstream_connection",
            ProxyError::StreamInterrupted => "stream_interrupted",
            ProxyError::ConfigInvalid(_) => "config_invalid",
            ProxyError::Internal(_) => "internal",
        }
    }

    /// Render as the canonical `{"error": {...}}` JSON value, used both for
    /// HTTP error bodies and for the final SSE error frame sent once an SSE
    /// body has already begun (errors never change the HTTP status after
    /// headers are flushed).
    pub fn to_json(&self) -> serde_json::Value {
        if let ProxyError::UpstreamError { body, .. } = self {
            return body.clone();
        }
        serde_json::json!({
            "error": {
                "type": self.kind(),
                "message": self.to_string(),
            }
        })
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        match &self {
            ProxyError::BadRequest(msg) => {
                tracing::warn!("bad request: {msg}");
                (StatusCode::BAD_REQUEST, Json(self.to_json())).into_response()
            }
            ProxyError::Unauthorized => {
                (StatusCode::UNAUTHORIZED, Json(self.to_json())).into_response()
            }
            ProxyError::NoProfileMatch(model) => {
                tracing::warn!("no profile matches model '{model}'");
                (StatusCode::NOT_FOUND, Json(self.to_json())).into_response()
            }
            ProxyError::ConfigInvalid(msg) => {
                tracing::warn!("invalid configuration: {msg}");
                (StatusCode::UNPROCESSABLE_ENTITY, Json(self.to_json())).into_response()
            }
            ProxyError::UpstreamError { status, body } => {
                tracing::debug!("relaying upstream error status={status}");
                (*status, Json(body.clone())).into_response()
            }
            ProxyError::UpstreamTimeout | ProxyError::UpstreamConnection(_) => {
                tracing::warn!("upstream unreachable: {self}");
                (StatusCode::BAD_GATEWAY, Json(self.to_json())).into_response()
            }
            ProxyError::StreamInterrupted => {
                // Not a failure: the client hung up. No body to send.
                StatusCode::OK.into_response()
            }
            ProxyError::Internal(msg) => {
                tracing::error!("internal error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(serde_json::json!({
                        "error": { "type": "internal", "message": "internal error" }
                    })),
                )
                    .into_response()
            }
        }
    }
}

/// REST-surface error for ConfigService handlers (profiles/settings CRUD).
/// Distinct from `ProxyError` in name only - same shape, same body format -
/// kept separate so a REST handler's error set stays obviously smaller than
/// the full request-pipeline error set.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if matches!(self, ApiError::Internal(_)) {
            tracing::error!("config api error: {self}");
        }
        let body = ErrorBody {
            error: ErrorDetail {
                kind: match &self {
                    ApiError::BadRequest(_) => "bad_request",
                    ApiError::NotFound(_) => "not_found",
                    ApiError::Conflict(_) => "conflict",
                    ApiError::Internal(_) => "internal",
                },
                message: self.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}

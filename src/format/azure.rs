//! Azure OpenAI dialect.
//!
//! Wire shape is identical to plain OpenAI Chat Completions - only the URL
//! path and credential header differ: a deployment-scoped path with an
//! `api-version` query param, `api-key` header instead of `Authorization`.
//! The response side reuses `OpenaiResponseAdapter` verbatim via
//! `format::response_adapter`'s dispatch; this module only needs its own
//! request adapter for the path rewrite.

use serde_json::Value;

use crate::error::ProxyError;
use crate::profile::ApiFormat;

use super::{CanonicalRequest, DialectRequest, RequestAdapter};

pub struct AzureRequestAdapter;

impl RequestAdapter for AzureRequestAdapter {
    fn to_dialect(&self, canonical: &CanonicalRequest, model_for_path: &str) -> Result<DialectRequest, ProxyError> {
        let messages: Vec<Value> = canonical
            .messages
            .iter()
            .map(|m| serde_json::json!({ "role": role_str(m.role), "content": m.content }))
            .collect();

        let mut body = serde_json::json!({
            "messages": messages,
            "stream": canonical.stream,
        });
        crate::reasoning::merge_fragment(&mut body, &canonical.sampling);

        Ok(DialectRequest {
            path: ApiFormat::AzureOpenai.default_path(model_for_path),
            body,
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{CanonicalMessage, Role};

    #[test]
    fn deployment_path_carries_model_and_api_version() {
        let req = CanonicalRequest {
            model: "gpt-4o".to_string(),
            messages: vec![CanonicalMessage { role: Role::User, content: "hi".to_string() }],
            stream: true,
            sampling: serde_json::json!({}),
        };
        let dialect = AzureRequestAdapter.to_dialect(&req, "gpt-4o").unwrap();
        assert_eq!(dialect.path, "/openai/deployments/gpt-4o/chat/completions?api-version=2024-06-01");
        // Azure's request body has no top-level "model" field - the
        // deployment is already named in the path.
        assert!(dialect.body.get("model").is_none());
    }
}

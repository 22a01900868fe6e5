//! The `/v1/config/*` REST surface for managing profiles and proxy
//! settings at runtime: one `Json<T>` in, `Result<Json<T>, ApiError>` out
//! handler per route.

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{ConfigDocument, ProxySettings};
use crate::error::ApiError;
use crate::handler::AppState;
use crate::profile::{new_profile_id, Profile};
use crate::reasoning::{supported_efforts, Effort, ReasoningType};

/// `GET /v1/config/profiles`.
pub async fn list_profiles(State(state): State<AppState>) -> Json<Vec<Profile>> {
    Json(state.config.profiles().snapshot().all().to_vec())
}

/// Client-supplied profile fields; `id`/`created_at`/`updated_at` are
/// server-assigned so a POST body never has to carry them.
#[derive(Debug, Deserialize)]
pub struct ProfileInput {
    pub name: String,
    pub model_patterns: Vec<String>,
    pub match_type: crate::profile::MatchType,
    #[serde(default)]
    pub priority: i64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub upstream: crate::profile::Upstream,
    #[serde(default)]
    pub llm_params: crate::profile::LlmParams,
    pub reasoning: crate::reasoning::ReasoningSpec,
}

fn default_enabled() -> bool {
    true
}

impl ProfileInput {
    fn into_profile(self, id: String, created_at: chrono::DateTime<Utc>) -> Profile {
        Profile {
            id,
            name: self.name,
            model_patterns: self.model_patterns,
            match_type: self.match_type,
            priority: self.priority,
            enabled: self.enabled,
            upstream: self.upstream,
            llm_params: self.llm_params,
            reasoning: self.reasoning,
            created_at,
            updated_at: created_at,
        }
    }
}

/// `POST /v1/config/profiles`.
pub async fn create_profile(
    State(state): State<AppState>,
    Json(input): Json<ProfileInput>,
) -> Result<Json<Profile>, ApiError> {
    let now = Utc::now();
    let profile = input.into_profile(new_profile_id(), now);
    state
        .config
        .profiles()
        .create(profile.clone())
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    state.config.persist().map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(profile))
}

/// `GET /v1/config/profiles/{id}`.
pub async fn get_profile(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Profile>, ApiError> {
    state
        .config
        .profiles()
        .snapshot()
        .get(&id)
        .cloned()
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no profile with id '{id}'")))
}

/// `PUT /v1/config/profiles/{id}`.
pub async fn update_profile(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<ProfileInput>,
) -> Result<Json<Profile>, ApiError> {
    let existing = state
        .config
        .profiles()
        .snapshot()
        .get(&id)
        .cloned()
        .ok_or_else(|| ApiError::NotFound(format!("no profile with id '{id}'")))?;
    let profile = input.into_profile(id.clone(), existing.created_at);
    state
        .config
        .profiles()
        .update(&id, profile.clone())
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    state.config.persist().map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(profile))
}

/// `DELETE /v1/config/profiles/{id}`.
pub async fn delete_profile(State(state): State<AppState>, Path(id): Path<String>) -> Result<(), ApiError> {
    state
        .config
        .profiles()
        .delete(&id)
        .map_err(|e| ApiError::NotFound(e.to_string()))?;
    state.config.persist().map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct TestProfileRequest {
    pub model: String,
}

#[derive(Debug, Serialize)]
pub struct TestProfileResponse {
    pub matched: Option<Profile>,
    pub all_matches: Vec<Profile>,
}

/// `POST /v1/config/profiles/test` - dry-run resolution, reports every
/// candidate in priority order so a user can see why a particular profile
/// won.
pub async fn test_profile(
    State(state): State<AppState>,
    Json(req): Json<TestProfileRequest>,
) -> Json<TestProfileResponse> {
    let snapshot = state.config.profiles().snapshot();
    let all_matches: Vec<Profile> = snapshot.resolve_all(&req.model).into_iter().cloned().collect();
    let matched = all_matches.first().cloned().or_else(|| snapshot.default_profile().cloned());
    Json(TestProfileResponse { matched, all_matches })
}

#[derive(Debug, Deserialize)]
pub struct SetDefaultProfileRequest {
    pub id: String,
}

/// `PUT /v1/config/default-profile`.
pub async fn set_default_profile(
    State(state): State<AppState>,
    Json(req): Json<SetDefaultProfileRequest>,
) -> Result<(), ApiError> {
    state
        .config
        .profiles()
        .set_default(&req.id)
        .map_err(|e| ApiError::NotFound(e.to_string()))?;
    state.config.persist().map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(())
}

/// `GET /v1/config/proxy`.
pub async fn get_proxy_settings(State(state): State<AppState>) -> Json<ProxySettings> {
    Json(state.config.proxy_settings())
}

#[derive(Debug, Serialize)]
pub struct SetProxySettingsResponse {
    pub success: bool,
    pub restart_required: bool,
}

/// `PUT /v1/config/proxy` - a port change is accepted and persisted, but
/// takes effect only after the process restarts.
pub async fn set_proxy_settings(
    State(state): State<AppState>,
    Json(settings): Json<ProxySettings>,
) -> Result<Json<SetProxySettingsResponse>, ApiError> {
    let restart_required = state
        .config
        .set_proxy_settings(settings)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    Ok(Json(SetProxySettingsResponse { success: true, restart_required }))
}

#[derive(Debug, Serialize)]
pub struct ReasoningTypeEntry {
    #[serde(rename = "type")]
    kind: ReasoningType,
    supported_efforts: &'static [Effort],
}

/// `GET /v1/config/reasoning/types` - the per-dialect effort catalog, used
/// by a config UI to only offer legal combinations.
pub async fn reasoning_types() -> Json<Vec<ReasoningTypeEntry>> {
    let kinds = [
        ReasoningType::Deepseek,
        ReasoningType::Openai,
        ReasoningType::Anthropic,
        ReasoningType::Gemini,
        ReasoningType::Qwen,
        ReasoningType::Openrouter,
        ReasoningType::Custom,
    ];
    Json(
        kinds
            .into_iter()
            .map(|kind| ReasoningTypeEntry { kind, supported_efforts: supported_efforts(kind) })
            .collect(),
    )
}

/// `GET /v1/config/export`.
pub async fn export_config(State(state): State<AppState>) -> Json<ConfigDocument> {
    Json(state.config.export())
}

#[derive(Debug, Deserialize)]
pub struct ImportQuery {
    #[serde(default)]
    pub merge: bool,
}

/// `POST /v1/config/import?merge=true|false`.
pub async fn import_config(
    State(state): State<AppState>,
    Query(query): Query<ImportQuery>,
    Json(document): Json<ConfigDocument>,
) -> Result<Json<Value>, ApiError> {
    state
        .config
        .import(document, query.merge)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    Ok(Json(serde_json::json!({ "success": true })))
}

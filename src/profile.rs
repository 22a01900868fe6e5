//! Profiles: routing records binding model-name patterns to an upstream
//! endpoint, credentials, dialect, and reasoning configuration, plus the
//! store that resolves a client model name to one of them.
//!
//! A single-level model with ordered patterns, a match type, and
//! priority-based tie-breaking - every request carries its own model name
//! and is routed on that alone, with no separate "client" identity.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ProxyError;
use crate::reasoning::ReasoningSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Exact,
    Wildcard,
    Regex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApiFormat {
    Openai,
    OpenaiResponse,
    Anthropic,
    Gemini,
    AzureOpenai,
}

impl ApiFormat {
    pub fn default_path(&self, model: &str) -> String {
        match self {
            ApiFormat::Openai | ApiFormat::OpenaiResponse => "/v1/chat/completions".to_string(),
            ApiFormat::Anthropic => "/v1/messages".to_string(),
            ApiFormat::Gemini => format!("/v1beta/models/{model}:streamGenerateContent"),
            ApiFormat::AzureOpenai => {
                format!("/openai/deployments/{model}/chat/completions?api-version=2024-06-01")
            }
        }
    }
}

/// Recognized sampling options, each optional, merged request > profile >
/// proxy defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmParams {
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub top_k: Option<i64>,
    pub max_tokens: Option<u64>,
    pub presence_penalty: Option<f64>,
    pub frequency_penalty: Option<f64>,
    pub seed: Option<i64>,
    pub stop: Option<Vec<String>>,
}

impl LlmParams {
    /// Merge `self` (lower priority) under `override_params` (higher
    /// priority): any field set on the override wins.
    pub fn merged_with(&self, override_params: &LlmParams) -> LlmParams {
        LlmParams {
            temperature: override_params.temperature.or(self.temperature),
            top_p: override_params.top_p.or(self.top_p),
            top_k: override_params.top_k.or(self.top_k),
            max_tokens: override_params.max_tokens.or(self.max_tokens),
            presence_penalty: override_params.presence_penalty.or(self.presence_penalty),
            frequency_penalty: override_params.frequency_penalty.or(self.frequency_penalty),
            seed: override_params.seed.or(self.seed),
            stop: override_params.stop.clone().or_else(|| self.stop.clone()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Upstream {
    pub base_url: String,
    pub api_key: Option<String>,
    pub api_format: ApiFormat,
}

impl Upstream {
    /// Header name/value pair carrying the credential. The mapping is fixed
    /// by dialect rather than configurable: header choice follows
    /// `api_format` directly.
    pub fn auth_header(&self) -> Option<(&'static str, String)> {
        let key = self.api_key.as_ref()?;
        match self.api_format {
            ApiFormat::Openai | ApiFormat::OpenaiResponse => {
                Some(("authorization", format!("Bearer {key}")))
            }
            ApiFormat::Anthropic => Some(("x-api-key", key.clone())),
            ApiFormat::Gemini => None, // carried as a `?key=` query param instead
            ApiFormat::AzureOpenai => Some(("api-key", key.clone())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub name: String,
    pub model_patterns: Vec<String>,
    pub match_type: MatchType,
    pub priority: i64,
    pub enabled: bool,
    pub upstream: Upstream,
    #[serde(default)]
    pub llm_params: LlmParams,
    pub reasoning: ReasoningSpec,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    /// Validate invariants before a write is committed.
    pub fn validate(&self) -> Result<(), ProxyError> {
        if self.enabled && self.model_patterns.iter().all(|p| p.is_empty()) {
            return Err(ProxyError::ConfigInvalid(
                "enabled profile must have at least one non-empty model pattern".into(),
            ));
        }
        if self.match_type == MatchType::Regex {
            for pattern in &self.model_patterns {
                compile_regex(pattern).map_err(|e| {
                    ProxyError::ConfigInvalid(format!("invalid regex '{pattern}': {e}"))
                })?;
            }
        }
        if !crate::reasoning::effort_is_supported(self.reasoning.kind, self.reasoning.effort) {
            return Err(ProxyError::ConfigInvalid(format!(
                "effort {:?} is not supported for reasoning type {:?}",
                self.reasoning.effort, self.reasoning.kind
            )));
        }
        if let Some(budget) = self.reasoning.budget_tokens {
            // budget_tokens is u64, so the only invariant left to check is
            // presence; negative values can't be represented.
            let _ = budget;
        }
        url::Url::parse(&self.upstream.base_url)
            .map_err(|e| ProxyError::ConfigInvalid(format!("invalid base_url: {e}")))?;
        Ok(())
    }

    fn matches(&self, model: &str) -> bool {
        if !self.enabled {
            return false;
        }
        self.model_patterns.iter().any(|pattern| match self.match_type {
            MatchType::Exact => pattern == model,
            MatchType::Wildcard => wildcard_match(pattern, model),
            MatchType::Regex => compile_regex(pattern)
                .map(|re| re.is_match(model))
                .unwrap_or(false),
        })
    }
}

fn compile_regex(pattern: &str) -> Result<Regex, regex::Error> {
    // Anchored full-string match (implicit `^`/`$`), case-sensitive.
    Regex::new(&format!("^(?:{pattern})$"))
}

/// Full-string glob match supporting `*` (any run of chars) and `?` (any
/// single char). No path semantics - this is a model-name matcher, not a
/// filesystem glob.
fn wildcard_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    wildcard_match_rec(&pattern, &text)
}

fn wildcard_match_rec(pattern: &[char], text: &[char]) -> bool {
    match pattern.first() {
        None => text.is_empty(),
        Some('*') => {
            wildcard_match_rec(&pattern[1..], text)
                || (!text.is_empty() && wildcard_match_rec(pattern, &text[1..]))
        }
        Some('?') => !text.is_empty() && wildcard_match_rec(&pattern[1..], &text[1..]),
        Some(c) => text.first() == Some(c) && wildcard_match_rec(&pattern[1..], &text[1..]),
    }
}

/// An immutable, request-scoped view of the profile set plus the default
/// profile id. Every request captures one of these at routing time and
/// uses it for its whole lifetime, so a concurrent config mutation never
/// changes the behavior of an in-flight request.
#[derive(Debug, Clone, Default)]
pub struct ProfileSnapshot {
    profiles: Arc<Vec<Profile>>,
    default_profile_id: Option<String>,
}

impl ProfileSnapshot {
    /// Resolution algorithm: highest priority wins, ties broken by
    /// earliest `created_at` then by `id`.
    pub fn resolve(&self, model: &str) -> Option<&Profile> {
        let mut matches: Vec<&Profile> = self.profiles.iter().filter(|p| p.matches(model)).collect();
        if matches.is_empty() {
            return self.default_profile();
        }
        matches.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });
        matches.into_iter().next()
    }

    /// Resolution-without-fallback, used by the `/v1/config/profiles/test`
    /// dry-run endpoint which reports all matches, not just the winner.
    pub fn resolve_all(&self, model: &str) -> Vec<&Profile> {
        let mut matches: Vec<&Profile> = self.profiles.iter().filter(|p| p.matches(model)).collect();
        matches.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });
        matches
    }

    pub fn default_profile(&self) -> Option<&Profile> {
        let id = self.default_profile_id.as_ref()?;
        self.profiles.iter().find(|p| &p.id == id)
    }

    pub fn get(&self, id: &str) -> Option<&Profile> {
        self.profiles.iter().find(|p| p.id == id)
    }

    pub fn all(&self) -> &[Profile] {
        &self.profiles
    }
}

/// Owns the mutable profile set and default-profile id. All mutating
/// operations are serialized behind a single write lock; readers take a
/// cheap `ProfileSnapshot` clone (an `Arc` bump) that is stable for the
/// rest of their request.
#[derive(Debug, Default)]
pub struct ProfileStore {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default, Clone)]
struct Inner {
    profiles: Vec<Profile>,
    default_profile_id: Option<String>,
}

impl ProfileStore {
    pub fn new(profiles: Vec<Profile>, default_profile_id: Option<String>) -> Self {
        Self {
            inner: RwLock::new(Inner {
                profiles,
                default_profile_id,
            }),
        }
    }

    pub fn snapshot(&self) -> ProfileSnapshot {
        let inner = self.inner.read().expect("profile store lock poisoned");
        ProfileSnapshot {
            profiles: Arc::new(inner.profiles.clone()),
            default_profile_id: inner.default_profile_id.clone(),
        }
    }

    pub fn create(&self, profile: Profile) -> Result<(), ProxyError> {
        profile.validate()?;
        let mut inner = self.inner.write().expect("profile store lock poisoned");
        if inner.profiles.iter().any(|p| p.id == profile.id) {
            return Err(ProxyError::ConfigInvalid(format!(
                "profile id '{}' already exists",
                profile.id
            )));
        }
        inner.profiles.push(profile);
        Ok(())
    }

    pub fn update(&self, id: &str, mut profile: Profile) -> Result<(), ProxyError> {
        profile.validate()?;
        let mut inner = self.inner.write().expect("profile store lock poisoned");
        let slot = inner
            .profiles
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| ProxyError::ConfigInvalid(format!("no profile with id '{id}'")))?;
        profile.id = id.to_string();
        profile.created_at = slot.created_at;
        profile.updated_at = Utc::now();
        *slot = profile;
        Ok(())
    }

    pub fn delete(&self, id: &str) -> Result<(), ProxyError> {
        let mut inner = self.inner.write().expect("profile store lock poisoned");
        let before = inner.profiles.len();
        inner.profiles.retain(|p| p.id != id);
        if inner.profiles.len() == before {
            return Err(ProxyError::ConfigInvalid(format!("no profile with id '{id}'")));
        }
        if inner.default_profile_id.as_deref() == Some(id) {
            inner.default_profile_id = None;
        }
        Ok(())
    }

    pub fn set_default(&self, id: &str) -> Result<(), ProxyError> {
        let mut inner = self.inner.write().expect("profile store lock poisoned");
        if !inner.profiles.iter().any(|p| p.id == id) {
            return Err(ProxyError::ConfigInvalid(format!("no profile with id '{id}'")));
        }
        inner.default_profile_id = Some(id.to_string());
        Ok(())
    }

    pub fn replace_all(&self, profiles: Vec<Profile>, default_profile_id: Option<String>) {
        let mut inner = self.inner.write().expect("profile store lock poisoned");
        inner.profiles = profiles;
        inner.default_profile_id = default_profile_id;
    }

    pub fn merge_all(&self, profiles: Vec<Profile>, default_profile_id: Option<String>) {
        let mut inner = self.inner.write().expect("profile store lock poisoned");
        for incoming in profiles {
            if let Some(slot) = inner.profiles.iter_mut().find(|p| p.id == incoming.id) {
                *slot = incoming;
            } else {
                inner.profiles.push(incoming);
            }
        }
        if default_profile_id.is_some() {
            inner.default_profile_id = default_profile_id;
        }
    }
}

/// Name/model-pattern helper used to build test profiles elsewhere in the
/// crate (and exercised directly below).
pub fn new_profile_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reasoning::{Effort, ReasoningType};

    fn profile(id: &str, patterns: &[&str], match_type: MatchType, priority: i64) -> Profile {
        Profile {
            id: id.to_string(),
            name: id.to_string(),
            model_patterns: patterns.iter().map(|s| s.to_string()).collect(),
            match_type,
            priority,
            enabled: true,
            upstream: Upstream {
                base_url: "https://example.com".to_string(),
                api_key: None,
                api_format: ApiFormat::Anthropic,
            },
            llm_params: LlmParams::default(),
            reasoning: ReasoningSpec {
                enabled: false,
                kind: ReasoningType::Anthropic,
                effort: Effort::None,
                budget_tokens: None,
                custom_params: None,
                filter_thinking_tags: true,
            },
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn scenario_d_priority_wins_over_specificity() {
        let p1 = profile("p1", &["gpt-*"], MatchType::Wildcard, 10);
        let p2 = profile("p2", &["gpt-4"], MatchType::Exact, 5);
        let store = ProfileStore::new(vec![p2, p1], None);
        let snap = store.snapshot();
        let resolved = snap.resolve("gpt-4").unwrap();
        assert_eq!(resolved.id, "p1");
    }

    #[test]
    fn falls_back_to_default_profile_when_no_match() {
        let p1 = profile("p1", &["gpt-4"], MatchType::Exact, 1);
        let store = ProfileStore::new(vec![p1], Some("p1".to_string()));
        let snap = store.snapshot();
        assert_eq!(snap.resolve("claude-sonnet").unwrap().id, "p1");
    }

    #[test]
    fn no_match_and_no_default_returns_none() {
        let p1 = profile("p1", &["gpt-4"], MatchType::Exact, 1);
        let store = ProfileStore::new(vec![p1], None);
        let snap = store.snapshot();
        assert!(snap.resolve("claude-sonnet").is_none());
    }

    #[test]
    fn disabled_profiles_are_excluded() {
        let mut p1 = profile("p1", &["gpt-4"], MatchType::Exact, 1);
        p1.enabled = false;
        let store = ProfileStore::new(vec![p1], None);
        let snap = store.snapshot();
        assert!(snap.resolve("gpt-4").is_none());
    }

    #[test]
    fn wildcard_match_supports_star_and_question_mark() {
        assert!(wildcard_match("gpt-*", "gpt-4-turbo"));
        assert!(wildcard_match("gpt-?", "gpt-4"));
        assert!(!wildcard_match("gpt-?", "gpt-44"));
        assert!(wildcard_match("*", "anything"));
    }

    #[test]
    fn regex_match_is_anchored() {
        let p1 = profile("p1", &["gpt-4.*"], MatchType::Regex, 1);
        let store = ProfileStore::new(vec![p1], None);
        let snap = store.snapshot();
        assert!(snap.resolve("gpt-4-turbo").is_some());
        assert!(snap.resolve("not-gpt-4-turbo").is_none());
    }

    #[test]
    fn tie_break_by_created_at_then_id() {
        let mut a = profile("zzz", &["x"], MatchType::Exact, 1);
        let mut b = profile("aaa", &["x"], MatchType::Exact, 1);
        a.created_at = Utc::now();
        b.created_at = a.created_at; // exact tie on priority and created_at
        let store = ProfileStore::new(vec![a, b], None);
        let snap = store.snapshot();
        // lexicographically "aaa" < "zzz"
        assert_eq!(snap.resolve("x").unwrap().id, "aaa");
    }

    #[test]
    fn create_rejects_duplicate_id() {
        let store = ProfileStore::new(vec![profile("p1", &["x"], MatchType::Exact, 1)], None);
        let err = store.create(profile("p1", &["y"], MatchType::Exact, 1));
        assert!(err.is_err());
    }

    #[test]
    fn validate_rejects_uncompilable_regex() {
        let p = profile("p1", &["(unterminated"], MatchType::Regex, 1);
        assert!(p.validate().is_err());
    }

    #[test]
    fn validate_rejects_unsupported_effort_for_type() {
        let mut p = profile("p1", &["x"], MatchType::Exact, 1);
        p.reasoning.kind = ReasoningType::Openai;
        p.reasoning.effort = Effort::None; // not supported by openai
        assert!(p.validate().is_err());
    }
}

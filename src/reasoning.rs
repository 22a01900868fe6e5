//! Maps a profile's reasoning configuration to a dialect-specific JSON
//! fragment merged into the outbound upstream body.
//!
//! A pure function per dialect rather than a registry of trait objects,
//! since the dialect set is closed and known at compile time.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningType {
    Deepseek,
    Openai,
    Anthropic,
    Gemini,
    Qwen,
    Openrouter,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Effort {
    None,
    Minimal,
    Low,
    Medium,
    High,
    Auto,
}

/// Supported efforts per dialect, used both to validate profile writes
/// (effort must be legal for the given type) and to serve
/// `GET /v1/config/reasoning/types`.
pub fn supported_efforts(kind: ReasoningType) -> &'static [Effort] {
    use Effort::*;
    match kind {
        ReasoningType::Deepseek => &[None, Auto],
        ReasoningType::Openai => &[Minimal, Low, Medium, High],
        ReasoningType::Anthropic => &[None, Low, Medium, High],
        ReasoningType::Gemini => &[None, Low, Medium, High, Auto],
        ReasoningType::Qwen => &[None, Low, Medium, High],
        ReasoningType::Openrouter => &[None, Low, Medium, High],
        ReasoningType::Custom => &[None, Minimal, Low, Medium, High, Auto],
    }
}

pub fn effort_is_supported(kind: ReasoningType, effort: Effort) -> bool {
    supported_efforts(kind).contains(&effort)
}

/// Default token budget for an effort level when `budget_tokens` is absent.
/// `Auto` has no fixed default - callers fall back to the dialect's own
/// default by omitting the budget field entirely.
fn default_budget(effort: Effort) -> Option<u64> {
    match effort {
        Effort::Minimal => Some(1024),
        Effort::Low => Some(4096),
        Effort::Medium => Some(16384),
        Effort::High => Some(32768),
        Effort::None | Effort::Auto => None,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningSpec {
    pub enabled: bool,
    #[serde(rename = "type")]
    pub kind: ReasoningType,
    pub effort: Effort,
    pub budget_tokens: Option<u64>,
    #[serde(default)]
    pub custom_params: Option<Value>,
    #[serde(default = "default_true")]
    pub filter_thinking_tags: bool,
}

fn default_true() -> bool {
    true
}

impl ReasoningSpec {
    fn effective_budget(&self) -> Option<u64> {
        self.budget_tokens.or_else(|| default_budget(self.effort))
    }
}

/// Produce the JSON fragment to merge into the outbound body for this
/// profile's reasoning configuration. Returns an empty object when the
/// dialect has no off-switch and reasoning is disabled (e.g. `openai` with
/// `effort=none` just omits the field entirely).
pub fn build_fragment(spec: &ReasoningSpec) -> Value {
    if !spec.enabled || spec.effort == Effort::None {
        return off_fragment(spec.kind);
    }
    on_fragment(spec)
}

fn off_fragment(kind: ReasoningType) -> Value {
    match kind {
        ReasoningType::Deepseek => serde_json::json!({ "thinking": { "type": "disabled" } }),
        ReasoningType::Openai => Value::Object(Map::new()),
        ReasoningType::Anthropic => serde_json::json!({ "thinking": { "type": "disabled" } }),
        ReasoningType::Gemini => {
            serde_json::json!({ "thinkingConfig": { "thinkingBudget": 0 } })
        }
        ReasoningType::Qwen => serde_json::json!({ "enable_thinking": false }),
        ReasoningType::Openrouter => serde_json::json!({ "reasoning": { "enabled": false } }),
        ReasoningType::Custom => Value::Object(Map::new()),
    }
}

fn on_fragment(spec: &ReasoningSpec) -> Value {
    let budget = spec.effective_budget();
    match spec.kind {
        ReasoningType::Deepseek => serde_json::json!({ "thinking": { "type": "enabled" } }),
        ReasoningType::Openai => {
            // minimal -> low, auto -> medium.
            let level = match spec.effort {
                Effort::Minimal => "low",
                Effort::Auto => "medium",
                Effort::Low => "low",
                Effort::Medium => "medium",
                Effort::High => "high",
                Effort::None => unreachable!("handled by off_fragment"),
            };
            serde_json::json!({ "reasoning_effort": level })
        }
        ReasoningType::Anthropic => {
            let mut obj = serde_json::json!({ "type": "enabled" });
            if let Some(b) = budget {
                obj["budget_tokens"] = Value::from(b);
            }
            serde_json::json!({ "thinking": obj })
        }
        ReasoningType::Gemini => {
            let thinking_budget = if spec.effort == Effort::Auto {
                -1
            } else {
                budget.map(|b| b as i64).unwrap_or(-1)
            };
            serde_json::json!({
                "thinkingConfig": { "thinkingBudget": thinking_budget, "includeThoughts": true }
            })
        }
        ReasoningType::Qwen => serde_json::json!({ "enable_thinking": true }),
        ReasoningType::Openrouter => {
            let mut obj = serde_json::json!({ "enabled": true });
            if let Some(b) = budget {
                obj["max_tokens"] = Value::from(b);
            }
            serde_json::json!({ "reasoning": obj })
        }
        ReasoningType::Custom => spec.custom_params.clone().unwrap_or(Value::Object(Map::new())),
    }
}

/// Shallow-merge `fragment` into `body`, except that merging into a key
/// whose existing value is itself an object recursively deep-merges.
pub fn merge_fragment(body: &mut Value, fragment: &Value) {
    let (Value::Object(body_map), Value::Object(frag_map)) = (body, fragment) else {
        return;
    };
    for (key, value) in frag_map {
        match body_map.get_mut(key) {
            Some(existing @ Value::Object(_)) if value.is_object() => {
                merge_fragment(existing, value);
            }
            _ => {
                body_map.insert(key.clone(), value.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(kind: ReasoningType, enabled: bool, effort: Effort) -> ReasoningSpec {
        ReasoningSpec {
            enabled,
            kind,
            effort,
            budget_tokens: None,
            custom_params: None,
            filter_thinking_tags: true,
        }
    }

    #[test]
    fn disabled_reasoning_produces_off_switch_for_dialects_that_have_one() {
        let f = build_fragment(&spec(ReasoningType::Anthropic, false, Effort::Medium));
        assert_eq!(f, serde_json::json!({ "thinking": { "type": "disabled" } }));

        let f = build_fragment(&spec(ReasoningType::Gemini, false, Effort::Medium));
        assert_eq!(f["thinkingConfig"]["thinkingBudget"], 0);
    }

    #[test]
    fn openai_has_no_off_switch() {
        let f = build_fragment(&spec(ReasoningType::Openai, false, Effort::Medium));
        assert_eq!(f, Value::Object(Map::new()));
    }

    #[test]
    fn anthropic_effort_maps_to_budget() {
        let f = build_fragment(&spec(ReasoningType::Anthropic, true, Effort::Low));
        assert_eq!(f["thinking"]["budget_tokens"], 4096);
        let f = build_fragment(&spec(ReasoningType::Anthropic, true, Effort::High));
        assert_eq!(f["thinking"]["budget_tokens"], 32768);
    }

    #[test]
    fn openai_minimal_downgrades_to_low_and_auto_to_medium() {
        let f = build_fragment(&spec(ReasoningType::Openai, true, Effort::Minimal));
        assert_eq!(f["reasoning_effort"], "low");
        let f = build_fragment(&spec(ReasoningType::Openai, true, Effort::Auto));
        assert_eq!(f["reasoning_effort"], "medium");
    }

    #[test]
    fn gemini_auto_uses_sentinel_budget() {
        let f = build_fragment(&spec(ReasoningType::Gemini, true, Effort::Auto));
        assert_eq!(f["thinkingConfig"]["thinkingBudget"], -1);
    }

    #[test]
    fn explicit_budget_tokens_overrides_effort_default() {
        let mut s = spec(ReasoningType::Anthropic, true, Effort::Low);
        s.budget_tokens = Some(9999);
        let f = build_fragment(&s);
        assert_eq!(f["thinking"]["budget_tokens"], 9999);
    }

    #[test]
    fn custom_type_deep_merges_custom_params() {
        let mut s = spec(ReasoningType::Custom, true, Effort::Medium);
        s.custom_params = Some(serde_json::json!({ "foo": { "bar": 1 } }));
        let f = build_fragment(&s);
        assert_eq!(f["foo"]["bar"], 1);
    }

    #[test]
    fn merge_fragment_shallow_replaces_non_object_keys() {
        let mut body = serde_json::json!({ "model": "x", "stream": true });
        let frag = serde_json::json!({ "stream": false, "extra": 1 });
        merge_fragment(&mut body, &frag);
        assert_eq!(body["stream"], false);
        assert_eq!(body["extra"], 1);
        assert_eq!(body["model"], "x");
    }

    #[test]
    fn merge_fragment_deep_merges_nested_objects() {
        let mut body = serde_json::json!({ "thinking": { "type": "disabled" } });
        let frag = serde_json::json!({ "thinking": { "budget_tokens": 100 } });
        merge_fragment(&mut body, &frag);
        assert_eq!(body["thinking"]["type"], "disabled");
        assert_eq!(body["thinking"]["budget_tokens"], 100);
    }

    #[test]
    fn effort_support_table_rejects_unlisted_pairs() {
        assert!(effort_is_supported(ReasoningType::Deepseek, Effort::Auto));
        assert!(!effort_is_supported(ReasoningType::Deepseek, Effort::Low));
        assert!(effort_is_supported(ReasoningType::Openai, Effort::Minimal));
        assert!(!effort_is_supported(ReasoningType::Openai, Effort::None));
    }
}

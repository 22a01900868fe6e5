//! Application bootstrap config plus the persisted configuration document
//! (profiles, proxy settings, default profile).
//!
//! Two layers:
//!
//! - [`AppConfig`]: ambient process bootstrap - where the persisted
//!   document lives, the log level/directory/rotation, the request
//!   timeout. Loaded from a TOML file at a platform config directory,
//!   overridable by environment variables, falling back to built-in
//!   defaults.
//! - [`ConfigDocument`] / [`ConfigStore`]: the actual routing data, a
//!   single JSON document with top-level keys `{proxy, profiles,
//!   default_profile, version}`, written atomically (write-temp + rename)
//!   since it's mutated concurrently by the REST API.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ProxyError;
use crate::profile::{Profile, ProfileStore};

/// Current persisted-document schema version. Bumped if the on-disk shape
/// ever changes incompatibly; `import` rejects a document from a newer
/// version than this binary understands.
pub const DOCUMENT_VERSION: u32 = 1;

/// `{ port: 1..65535, api_key?: string }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxySettings {
    pub port: u16,
    pub api_key: Option<String>,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self { port: 8080, api_key: None }
    }
}

impl ProxySettings {
    pub fn validate(&self) -> Result<(), ProxyError> {
        if self.port == 0 {
            return Err(ProxyError::ConfigInvalid("port must be between 1 and 65535".into()));
        }
        Ok(())
    }
}

/// The full persisted document shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigDocument {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub proxy: ProxySettings,
    #[serde(default)]
    pub profiles: Vec<Profile>,
    #[serde(default)]
    pub default_profile: Option<String>,
}

fn default_version() -> u32 {
    DOCUMENT_VERSION
}

impl Default for ConfigDocument {
    fn default() -> Self {
        Self {
            version: DOCUMENT_VERSION,
            proxy: ProxySettings::default(),
            profiles: Vec::new(),
            default_profile: None,
        }
    }
}

/// Owns the mutable `ConfigDocument` and persists it to `path` on every
/// write. `ProfileStore` handles the profile half; this struct adds the
/// proxy-settings half and the load/save/export/import surface.
pub struct ConfigStore {
    path: PathBuf,
    profiles: ProfileStore,
    proxy: std::sync::RwLock<ProxySettings>,
}

impl ConfigStore {
    /// Load the document at `path`, or start from defaults if the file
    /// doesn't exist yet (first run).
    pub fn load(path: PathBuf) -> anyhow::Result<Self> {
        let document = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .map_err(|e| anyhow::anyhow!("failed to read config document {}: {e}", path.display()))?;
            serde_json::from_str(&raw)
                .map_err(|e| anyhow::anyhow!("failed to parse config document {}: {e}", path.display()))?
        } else {
            ConfigDocument::default()
        };

        Ok(Self {
            path,
            profiles: ProfileStore::new(document.profiles, document.default_profile),
            proxy: std::sync::RwLock::new(document.proxy),
        })
    }

    pub fn profiles(&self) -> &ProfileStore {
        &self.profiles
    }

    pub fn proxy_settings(&self) -> ProxySettings {
        self.proxy.read().expect("proxy settings lock poisoned").clone()
    }

    /// Apply a new `ProxySettings`, returning whether the port changed
    /// (a port change is persisted but only takes effect on restart).
    pub fn set_proxy_settings(&self, new: ProxySettings) -> Result<bool, ProxyError> {
        new.validate()?;
        let mut guard = self.proxy.write().expect("proxy settings lock poisoned");
        let restart_required = guard.port != new.port;
        *guard = new;
        drop(guard);
        self.persist().map_err(|e| ProxyError::Internal(e.to_string()))?;
        Ok(restart_required)
    }

    fn document(&self) -> ConfigDocument {
        ConfigDocument {
            version: DOCUMENT_VERSION,
            proxy: self.proxy_settings(),
            profiles: self.profiles.snapshot().all().to_vec(),
            default_profile: self.profiles.snapshot().default_profile().map(|p| p.id.clone()),
        }
    }

    /// Write the current document atomically: write to a sibling temp file,
    /// then rename over the target, so a crash mid-write never corrupts it.
    pub fn persist(&self) -> anyhow::Result<()> {
        let document = self.document();
        let json = serde_json::to_string_pretty(&document)?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp_path = tmp_path_for(&self.path);
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    pub fn export(&self) -> ConfigDocument {
        self.document()
    }

    pub fn import(&self, document: ConfigDocument, merge: bool) -> Result<(), ProxyError> {
        if document.version > DOCUMENT_VERSION {
            return Err(ProxyError::ConfigInvalid(format!(
                "config document version {} is newer than supported version {DOCUMENT_VERSION}",
                document.version
            )));
        }
        for profile in &document.profiles {
            profile.validate()?;
        }
        if merge {
            self.profiles.merge_all(document.profiles, document.default_profile);
        } else {
            self.profiles.replace_all(document.profiles, document.default_profile.clone());
            *self.proxy.write().expect("proxy settings lock poisoned") = document.proxy;
        }
        self.persist().map_err(|e| ProxyError::Internal(e.to_string()))?;
        Ok(())
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

/// Log file rotation cadence for the `[logging]` section, grounded in the
/// `[logging]` config section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    Hourly,
    Daily,
    Never,
}

impl Default for LogRotation {
    fn default() -> Self {
        LogRotation::Daily
    }
}

/// Ambient process bootstrap config, loaded env > file > default the same
/// precedence: environment variables, then the bootstrap file, then
/// built-in defaults.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Where the persisted `{proxy, profiles, default_profile, version}`
    /// JSON document lives.
    pub config_doc_path: PathBuf,
    /// Loopback host to bind. The port itself lives in `ProxySettings`
    /// since it's part of the mutable routing document, not the bootstrap file.
    pub bind_host: String,
    pub log_level: String,
    pub log_dir: PathBuf,
    pub log_rotation: LogRotation,
    /// Overall per-request timeout before an idle upstream is aborted
    /// (default 10 minutes).
    pub upstream_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Default)]
struct FileAppConfig {
    config_doc_path: Option<String>,
    bind_host: Option<String>,
    log_level: Option<String>,
    log_dir: Option<String>,
    log_rotation: Option<LogRotation>,
    upstream_timeout_secs: Option<u64>,
}

impl AppConfig {
    /// `~/.config/reasoning-proxy/config.toml` - ambient bootstrap
    /// settings only, distinct from the JSON routing document it points at.
    pub fn bootstrap_file_path() -> Option<PathBuf> {
        dirs::home_dir().map(|p| p.join(".config").join("reasoning-proxy").join("config.toml"))
    }

    fn load_file() -> FileAppConfig {
        let Some(path) = Self::bootstrap_file_path() else {
            return FileAppConfig::default();
        };
        match std::fs::read_to_string(&path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                eprintln!("warning: failed to parse {}: {e}", path.display());
                FileAppConfig::default()
            }),
            Err(_) => FileAppConfig::default(),
        }
    }

    pub fn from_env() -> Self {
        let file = Self::load_file();

        let config_doc_path = std::env::var("REASONING_PROXY_CONFIG")
            .ok()
            .or(file.config_doc_path)
            .map(PathBuf::from)
            .unwrap_or_else(default_doc_path);

        let bind_host = std::env::var("REASONING_PROXY_BIND_HOST")
            .ok()
            .or(file.bind_host)
            .unwrap_or_else(|| "127.0.0.1".to_string());

        let log_level = std::env::var("REASONING_PROXY_LOG_LEVEL")
            .ok()
            .or(file.log_level)
            .unwrap_or_else(|| "info".to_string());

        let log_dir = std::env::var("REASONING_PROXY_LOG_DIR")
            .ok()
            .or(file.log_dir)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./logs"));

        let log_rotation = file.log_rotation.unwrap_or_default();

        let upstream_timeout_secs = std::env::var("REASONING_PROXY_UPSTREAM_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .or(file.upstream_timeout_secs)
            .unwrap_or(600);

        Self {
            config_doc_path,
            bind_host,
            log_level,
            log_dir,
            log_rotation,
            upstream_timeout_secs,
        }
    }

    pub fn to_toml(&self) -> String {
        format!(
            r#"# reasoning-proxy bootstrap configuration
# (routing profiles and proxy settings live in the JSON document at
# config_doc_path, managed through the /v1/config/* REST surface.)

config_doc_path = "{doc}"
bind_host = "{host}"
log_level = "{level}"
log_dir = "{log_dir}"
log_rotation = "{rotation}"
upstream_timeout_secs = {timeout}
"#,
            doc = self.config_doc_path.display(),
            host = self.bind_host,
            level = self.log_level,
            log_dir = self.log_dir.display(),
            rotation = match self.log_rotation {
                LogRotation::Hourly => "hourly",
                LogRotation::Daily => "daily",
                LogRotation::Never => "never",
            },
            timeout = self.upstream_timeout_secs,
        )
    }

    /// Write a starter bootstrap file if one doesn't exist yet. Helps a
    /// new user discover what can be configured.
    pub fn ensure_bootstrap_file_exists() {
        let Some(path) = Self::bootstrap_file_path() else { return };
        if path.exists() {
            return;
        }
        if let Some(parent) = path.parent() {
            if std::fs::create_dir_all(parent).is_err() {
                return;
            }
        }
        let _ = std::fs::write(&path, Self::default().to_toml());
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            config_doc_path: default_doc_path(),
            bind_host: "127.0.0.1".to_string(),
            log_level: "info".to_string(),
            log_dir: PathBuf::from("./logs"),
            log_rotation: LogRotation::default(),
            upstream_timeout_secs: 600,
        }
    }
}

fn default_doc_path() -> PathBuf {
    dirs::home_dir()
        .map(|p| p.join(".config").join("reasoning-proxy").join("proxy_config.json"))
        .unwrap_or_else(|| PathBuf::from("./proxy_config.json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{ApiFormat, LlmParams, MatchType, Upstream};
    use crate::reasoning::{Effort, ReasoningSpec, ReasoningType};

    fn test_profile(id: &str) -> Profile {
        Profile {
            id: id.to_string(),
            name: id.to_string(),
            model_patterns: vec!["gpt-4".to_string()],
            match_type: MatchType::Exact,
            priority: 0,
            enabled: true,
            upstream: Upstream {
                base_url: "https://api.openai.com".to_string(),
                api_key: Some("sk-test".to_string()),
                api_format: ApiFormat::Openai,
            },
            llm_params: LlmParams::default(),
            reasoning: ReasoningSpec {
                enabled: false,
                kind: ReasoningType::Openai,
                effort: Effort::Minimal,
                budget_tokens: None,
                custom_params: None,
                filter_thinking_tags: true,
            },
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn round_trips_through_json_document() {
        let dir = std::env::temp_dir().join(format!("reasoning-proxy-test-{}", uuid::Uuid::new_v4()));
        let path = dir.join("proxy_config.json");
        let store = ConfigStore::load(path.clone()).unwrap();
        store.profiles().create(test_profile("p1")).unwrap();
        store.profiles().set_default("p1").unwrap();
        store.persist().unwrap();

        let reloaded = ConfigStore::load(path).unwrap();
        let snap = reloaded.profiles().snapshot();
        assert_eq!(snap.all().len(), 1);
        assert_eq!(snap.default_profile().unwrap().id, "p1");

        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn set_proxy_settings_reports_restart_required_only_on_port_change() {
        let dir = std::env::temp_dir().join(format!("reasoning-proxy-test-{}", uuid::Uuid::new_v4()));
        let path = dir.join("proxy_config.json");
        let store = ConfigStore::load(path).unwrap();
        let initial_port = store.proxy_settings().port;

        let restart = store
            .set_proxy_settings(ProxySettings { port: initial_port, api_key: Some("x".into()) })
            .unwrap();
        assert!(!restart);

        let restart = store
            .set_proxy_settings(ProxySettings { port: initial_port + 1, api_key: Some("x".into()) })
            .unwrap();
        assert!(restart);

        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn import_rejects_future_document_version() {
        let dir = std::env::temp_dir().join(format!("reasoning-proxy-test-{}", uuid::Uuid::new_v4()));
        let path = dir.join("proxy_config.json");
        let store = ConfigStore::load(path).unwrap();
        let mut doc = store.export();
        doc.version = DOCUMENT_VERSION + 1;
        assert!(store.import(doc, false).is_err());
        std::fs::remove_dir_all(dir).ok();
    }
}

use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ToggleError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_bool(profile: &str, key: &str, default: bool) -> bool {
    match profiled_env_opt(profile, key).as_deref() {
        Some("1") | Some("true") | Some("yes") | Some("on") => true,
        Some("0") | Some("false") | Some("no") | Some("off") => false,
        _ => default,
    }
}

/// Metrics interval: a number of seconds, or `0`/`off` to disable reporting.
fn profiled_env_metrics_interval(profile: &str) -> Option<u64> {
    match profiled_env_opt(profile, "TOGGLEBOX_METRICS_INTERVAL_SECS").as_deref() {
        None => Some(default_metrics_interval_secs()),
        Some("off") | Some("none") | Some("disabled") => None,
        Some(raw) => match raw.parse::<u64>() {
            Ok(0) => None,
            Ok(secs) => Some(secs),
            Err(_) => Some(default_metrics_interval_secs()),
        },
    }
}

fn default_app_name() -> String {
    "togglebox-app".to_string()
}

fn default_instance_tag() -> String {
    format!("generated-{}", uuid::Uuid::new_v4())
}

fn default_api_url() -> String {
    "http://localhost:4242/api/".to_string()
}

fn default_fetch_interval_secs() -> u64 {
    30
}

fn default_metrics_interval_secs() -> u64 {
    60
}

fn default_http_timeout_secs() -> u64 {
    10
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(env::temp_dir)
        .join("togglebox")
}

fn default_true() -> bool {
    true
}

// ── Client settings ───────────────────────────────────────────

/// Everything a client instance needs that can be expressed as plain data.
///
/// Injected collaborators (remote client doubles, custom strategies, context
/// providers) are not part of the settings; they go through the client
/// builder instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSettings {
    /// Active profile name (empty = default).
    #[serde(default)]
    pub profile: String,
    #[serde(default = "default_app_name")]
    pub app_name: String,
    #[serde(default = "default_instance_tag")]
    pub instance_tag: String,
    /// Base URL of the toggle service API (e.g. `http://host:4242/api/`).
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Sent as the `Authorization` header when present.
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default)]
    pub custom_headers: HashMap<String, String>,
    #[serde(default = "default_fetch_interval_secs")]
    pub fetch_interval_secs: u64,
    /// `None` or `0` disables client registration and metrics reporting.
    #[serde(default = "default_metrics_interval")]
    pub metrics_interval_secs: Option<u64>,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    /// Fetch toggles once, before the background poller starts.
    #[serde(default = "default_true")]
    pub load_toggles_immediately: bool,
}

fn default_metrics_interval() -> Option<u64> {
    Some(default_metrics_interval_secs())
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            profile: String::new(),
            app_name: default_app_name(),
            instance_tag: default_instance_tag(),
            api_url: default_api_url(),
            api_token: None,
            custom_headers: HashMap::new(),
            fetch_interval_secs: default_fetch_interval_secs(),
            metrics_interval_secs: default_metrics_interval(),
            http_timeout_secs: default_http_timeout_secs(),
            cache_dir: default_cache_dir(),
            load_toggles_immediately: true,
        }
    }
}

impl ClientSettings {
    /// Build settings from environment variables (call `load_dotenv()` first).
    /// Profile is read from `TOGGLEBOX_PROFILE`. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("TOGGLEBOX_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build settings for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        let app_name = profiled_env_or(p, "TOGGLEBOX_APP_NAME", &default_app_name());
        let instance_tag = profiled_env_opt(p, "TOGGLEBOX_INSTANCE_TAG")
            .unwrap_or_else(default_instance_tag);
        let cache_dir = profiled_env_opt(p, "TOGGLEBOX_CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(default_cache_dir);

        Self {
            profile: p.to_string(),
            app_name,
            instance_tag,
            api_url: profiled_env_or(p, "TOGGLEBOX_API_URL", &default_api_url()),
            api_token: profiled_env_opt(p, "TOGGLEBOX_API_TOKEN"),
            custom_headers: HashMap::new(),
            fetch_interval_secs: profiled_env_u64(
                p,
                "TOGGLEBOX_FETCH_INTERVAL_SECS",
                default_fetch_interval_secs(),
            ),
            metrics_interval_secs: profiled_env_metrics_interval(p),
            http_timeout_secs: profiled_env_u64(
                p,
                "TOGGLEBOX_HTTP_TIMEOUT_SECS",
                default_http_timeout_secs(),
            ),
            cache_dir,
            load_toggles_immediately: profiled_env_bool(p, "TOGGLEBOX_LOAD_IMMEDIATELY", true),
        }
    }

    /// Load settings from a TOML file. Missing keys take their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ToggleError> {
        let raw = std::fs::read_to_string(path)?;
        let settings: Self = toml::from_str(&raw)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings the client cannot run with.
    pub fn validate(&self) -> Result<(), ToggleError> {
        if self.app_name.trim().is_empty() {
            return Err(ToggleError::Config("app_name must not be empty".into()));
        }
        if self.fetch_interval_secs == 0 {
            return Err(ToggleError::Config(
                "fetch_interval_secs must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    pub fn fetch_toggles_interval(&self) -> Duration {
        Duration::from_secs(self.fetch_interval_secs)
    }

    /// `None` when metrics are disabled (unset or zero seconds).
    pub fn send_metrics_interval(&self) -> Option<Duration> {
        self.metrics_interval_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn is_metrics_disabled(&self) -> bool {
        self.send_metrics_interval().is_none()
    }

    /// Backup file holding the last fetched toggle set.
    pub fn toggle_backup_path(&self) -> PathBuf {
        self.cache_dir.join(format!("{}.toggles.json", file_stem(&self.app_name)))
    }

    /// Backup file holding the change token of the last fetched toggle set.
    pub fn etag_backup_path(&self) -> PathBuf {
        self.cache_dir.join(format!("{}.toggles.etag", file_stem(&self.app_name)))
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() {
            "default"
        } else {
            &self.profile
        }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Settings loaded (profile: {}):", self.profile_label());
        tracing::info!("  app:       name={}, instance={}", self.app_name, self.instance_tag);
        tracing::info!(
            "  api:       url={}, token={}",
            self.api_url,
            if self.api_token.is_some() { "(set)" } else { "(none)" }
        );
        tracing::info!(
            "  intervals: fetch={}s, metrics={}",
            self.fetch_interval_secs,
            self.metrics_interval_secs
                .map(|s| format!("{}s", s))
                .unwrap_or_else(|| "disabled".to_string())
        );
        tracing::info!("  cache:     dir={}", self.cache_dir.display());
    }
}

/// App names end up in file names; keep them portable.
fn file_stem(app_name: &str) -> String {
    app_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

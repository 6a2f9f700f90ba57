use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::{AgentError, AgentResult};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    8000
}

fn default_log_level() -> String {
    "info".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub active_provider: String,
    pub providers: HashMap<String, ProviderEntry>,
    /// Role-to-model mapping. If a role is absent, falls back to active_provider defaults.
    #[serde(default)]
    pub roles: RolesConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        let mut providers = HashMap::new();
        providers.insert(
            "openrouter".to_string(),
            ProviderEntry {
                display_name: "OpenRouter".into(),
                api_base: "https://openrouter.ai/api/v1/chat/completions".into(),
                model: "anthropic/claude-3-5-sonnet".into(),
                temperature: default_temperature(),
                max_tokens: default_max_tokens(),
                api_key: None,
            },
        );
        Self {
            active_provider: "openrouter".into(),
            providers,
            roles: RolesConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    pub display_name: String,
    /// Full chat-completions endpoint URL.
    pub api_base: String,
    /// Default model for this provider (used as fallback when no role config exists).
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Optional API key stored in config.toml (falls back to env var MACAGENT_<ID>_API_KEY).
    #[serde(default)]
    pub api_key: Option<String>,
}

/// Maps model roles to specific provider+model combinations.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RolesConfig {
    /// Screen analysis and action recommendation.
    pub vision: Option<RoleEntry>,
    /// Yes/no screen classification (payment detection).
    pub classifier: Option<RoleEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleEntry {
    /// Must match a key under [llm.providers.*].
    pub provider: String,
    /// Model name sent to the API.
    pub model: String,
    /// Overrides the provider-level temperature for this role.
    pub temperature: Option<f64>,
    /// Overrides the provider-level completion budget for this role.
    pub max_tokens: Option<u32>,
}

fn default_temperature() -> f64 {
    0.3
}

fn default_max_tokens() -> u32 {
    2000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Moving the pointer into a screen corner aborts physical input.
    #[serde(default = "default_true")]
    pub failsafe: bool,
    /// Distance from a corner, in pixels, that still counts as "in the corner".
    #[serde(default)]
    pub corner_margin_px: u32,
    /// Pause after every physical primitive.
    #[serde(default = "default_action_pause_ms")]
    pub action_pause_ms: u64,
    /// Delay between the focusing click and typing.
    #[serde(default = "default_focus_settle_ms")]
    pub focus_settle_ms: u64,
    /// Delay between the focusing click and scrolling.
    #[serde(default = "default_scroll_settle_ms")]
    pub scroll_settle_ms: u64,
    #[serde(default = "default_keystroke_interval_ms")]
    pub keystroke_interval_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            failsafe: true,
            corner_margin_px: 0,
            action_pause_ms: default_action_pause_ms(),
            focus_settle_ms: default_focus_settle_ms(),
            scroll_settle_ms: default_scroll_settle_ms(),
            keystroke_interval_ms: default_keystroke_interval_ms(),
        }
    }
}

impl ExecutorConfig {
    /// No pauses at all; failsafe left on. Used by tests and dry runs.
    pub fn immediate() -> Self {
        Self {
            action_pause_ms: 0,
            focus_settle_ms: 0,
            scroll_settle_ms: 0,
            keystroke_interval_ms: 0,
            ..Self::default()
        }
    }
}

fn default_action_pause_ms() -> u64 {
    500
}

fn default_focus_settle_ms() -> u64 {
    200
}

fn default_scroll_settle_ms() -> u64 {
    100
}

fn default_keystroke_interval_ms() -> u64 {
    50
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Explicit retries allowed per action. 0 disables retry.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Reject cancelling an already-cancelled session instead of refreshing its end time.
    #[serde(default)]
    pub strict_cancel: bool,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            strict_cancel: false,
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    /// SQLite file. Defaults to the platform data directory.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl StoreConfig {
    /// `<data_local_dir>/macagent/macagent.db`, falling back to the working directory.
    pub fn resolved_path(&self) -> PathBuf {
        if let Some(path) = &self.path {
            return path.clone();
        }
        dirs::data_local_dir()
            .map(|d| d.join("macagent"))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("macagent.db")
    }
}

fn default_true() -> bool {
    true
}

fn resolve_config_path() -> AgentResult<PathBuf> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join("config.toml");
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Ok(candidate);
            }
        }
    }

    let cwd = std::env::current_dir()?;
    let candidate = cwd.join("config.toml");
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Ok(candidate);
    }

    Err(AgentError::Config(
        "config.toml not found next to executable or in working directory".into(),
    ))
}

pub fn parse_config(content: &str) -> AgentResult<AppConfig> {
    Ok(toml::from_str(content)?)
}

pub fn load_config() -> AgentResult<AppConfig> {
    let path = resolve_config_path()?;
    let content = std::fs::read_to_string(&path)?;
    parse_config(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let cfg = parse_config("").unwrap();
        assert_eq!(cfg.server.port, 8000);
        assert!(cfg.executor.failsafe);
        assert_eq!(cfg.lifecycle.max_retries, 3);
        assert_eq!(cfg.store.backend, StoreBackend::Memory);
        assert_eq!(cfg.llm.active_provider, "openrouter");
    }

    #[test]
    fn sections_override_defaults() {
        let cfg = parse_config(
            r#"
            [executor]
            failsafe = false
            keystroke_interval_ms = 10

            [lifecycle]
            max_retries = 1
            strict_cancel = true

            [store]
            backend = "sqlite"
            path = "/tmp/agent.db"

            [llm]
            active_provider = "local"

            [llm.providers.local]
            display_name = "Local"
            api_base = "http://localhost:1234/v1/chat/completions"
            model = "llava"

            [llm.roles.classifier]
            provider = "local"
            model = "llava-small"
            temperature = 0.0
            "#,
        )
        .unwrap();

        assert!(!cfg.executor.failsafe);
        assert_eq!(cfg.executor.keystroke_interval_ms, 10);
        assert_eq!(cfg.executor.action_pause_ms, 500);
        assert_eq!(cfg.lifecycle.max_retries, 1);
        assert!(cfg.lifecycle.strict_cancel);
        assert_eq!(cfg.store.backend, StoreBackend::Sqlite);
        assert_eq!(cfg.store.resolved_path(), PathBuf::from("/tmp/agent.db"));
        let local = &cfg.llm.providers["local"];
        assert_eq!(local.max_tokens, 2000);
        assert_eq!(cfg.llm.roles.classifier.as_ref().unwrap().model, "llava-small");
    }
}

//! Application configuration for riskclause.
//!
//! User config lives at `~/.riskclause/riskclause.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Result, RiskClauseError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "riskclause.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".riskclause";

// ---------------------------------------------------------------------------
// Config structs (matching riskclause.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Completion service settings.
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Rate-limit back-off and request pacing.
    #[serde(default)]
    pub retry: RetryConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Root under which per-run working directories are created.
    #[serde(default = "default_work_root")]
    pub work_root: String,

    /// Scored reference table used to build the risk model.
    #[serde(default = "default_risk_table")]
    pub risk_table: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            work_root: default_work_root(),
            risk_table: default_risk_table(),
        }
    }
}

fn default_work_root() -> String {
    "var/runs".into()
}
fn default_risk_table() -> String {
    "weights.xlsx".into()
}

/// `[provider]` section: an OpenAI-compatible chat-completions endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Base URL; `/chat/completions` is appended.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model used for clause classification.
    #[serde(default = "default_model")]
    pub model: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            base_url: default_base_url(),
            model: default_model(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_api_key_env() -> String {
    "GROQ_API_KEY".into()
}
fn default_base_url() -> String {
    "https://api.groq.com/openai/v1".into()
}
fn default_model() -> String {
    "llama3-70b-8192".into()
}
fn default_timeout_secs() -> u64 {
    120
}

/// `[retry]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// First delay after a rate-limit response.
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,

    /// Ceiling for the doubling delay.
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Attempt budget per page under rate limiting. Absent means unbounded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,

    /// Pause between consecutive classification requests.
    #[serde(default = "default_page_interval")]
    pub page_interval_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
            max_attempts: None,
            page_interval_ms: default_page_interval(),
        }
    }
}

fn default_base_delay() -> u64 {
    20_000
}
fn default_max_delay() -> u64 {
    320_000
}
fn default_page_interval() -> u64 {
    1_000
}

// ---------------------------------------------------------------------------
// Runtime config (merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Back-off policy applied to rate-limited classification requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Total attempts allowed per page; `None` retries until success.
    pub max_attempts: Option<u32>,
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms.max(config.base_delay_ms)),
            max_attempts: config.max_attempts,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

/// Runtime classifier configuration.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Model identifier sent with every request.
    pub model: String,
    /// Rate-limit back-off.
    pub retry: RetryPolicy,
    /// Pause between consecutive classification requests.
    pub page_interval: Duration,
}

impl From<&AppConfig> for ClassifierConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            model: config.provider.model.clone(),
            retry: RetryPolicy::from(&config.retry),
            page_interval: Duration::from_millis(config.retry.page_interval_ms),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.riskclause/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| RiskClauseError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.riskclause/riskclause.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| RiskClauseError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        RiskClauseError::config(format!("failed to parse {}: {e}", path.display()))
    })?;

    validate_config(&config)?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| RiskClauseError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| RiskClauseError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| RiskClauseError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Reject configurations that cannot drive a run.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    Url::parse(&config.provider.base_url).map_err(|e| {
        RiskClauseError::config(format!(
            "provider.base_url '{}' is not a valid URL: {e}",
            config.provider.base_url
        ))
    })?;

    if config.provider.model.trim().is_empty() {
        return Err(RiskClauseError::config("provider.model must not be empty"));
    }

    if config.retry.max_attempts == Some(0) {
        return Err(RiskClauseError::config(
            "retry.max_attempts must be at least 1 (omit it for unbounded retries)",
        ));
    }

    Ok(())
}

/// Read the provider API key from the configured env var.
pub fn api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.provider.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(RiskClauseError::config(format!(
            "completion service API key not found. Set the {var_name} environment variable."
        ))),
    }
}

/// Check that the provider API key env var is set and non-empty.
pub fn validate_api_key(config: &AppConfig) -> Result<()> {
    api_key(config).map(|_| ())
}

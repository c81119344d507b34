//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/sheetdrive/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/sheetdrive/` (~/.config/sheetdrive/)
//! - State/Logs: `$XDG_STATE_HOME/sheetdrive/` (~/.local/state/sheetdrive/)

use crate::error::{Error, Result};
use crate::retry::RetryPolicy;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Spreadsheet service settings
    #[serde(default)]
    pub sheets: SheetsConfig,

    /// Credential sources
    #[serde(default)]
    pub auth: AuthConfig,

    /// Retry policy for remote calls
    #[serde(default)]
    pub retry: RetryConfig,

    /// File store layout
    #[serde(default)]
    pub store: StoreConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Spreadsheet service configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SheetsConfig {
    /// Target spreadsheet (can also be passed on the command line)
    pub spreadsheet_id: Option<String>,

    /// REST endpoint root
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// HTTP request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for SheetsConfig {
    fn default() -> Self {
        Self {
            spreadsheet_id: None,
            endpoint: default_endpoint(),
            timeout_secs: default_timeout(),
        }
    }
}

fn default_endpoint() -> String {
    "https://sheets.googleapis.com/v4".to_string()
}

fn default_timeout() -> u64 {
    30
}

/// Where to look for the service-account credential
#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    /// Environment variable holding a base64-encoded credential JSON
    #[serde(default = "default_credentials_env")]
    pub credentials_env: String,

    /// Path to a credential JSON file
    pub credentials_path: Option<PathBuf>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            credentials_env: default_credentials_env(),
            credentials_path: None,
        }
    }
}

fn default_credentials_env() -> String {
    "SHEETDRIVE_CREDENTIALS_B64".to_string()
}

/// Retry configuration, converted into a [`RetryPolicy`]
#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    /// Max retry attempts for transient failures
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base backoff delay in milliseconds
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Backoff cap in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Transport error codes treated as transient
    #[serde(default = "default_retryable_codes")]
    pub retryable_codes: Vec<String>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            retryable_codes: default_retryable_codes(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            retryable_codes: self.retryable_codes.clone(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30000
}

pub(crate) fn default_retryable_codes() -> Vec<String> {
    ["ECONNRESET", "ETIMEDOUT", "ECONNREFUSED", "ENOTFOUND", "EAI_AGAIN", "EPIPE"]
        .iter()
        .map(|code| code.to_string())
        .collect()
}

/// Layout of the file store inside the spreadsheet
#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Tab holding the file store
    #[serde(default = "default_store_sheet")]
    pub sheet: String,

    /// Tab of the two-cell layout that predates the file store
    #[serde(default = "default_legacy_sheet")]
    pub legacy_sheet: String,

    /// Name of the plan file
    #[serde(default = "default_plan_file")]
    pub plan_file: String,

    /// Name of the identity document
    #[serde(default = "default_identity_file")]
    pub identity_file: String,

    /// Extra names that may not be deleted (the plan file always is)
    #[serde(default)]
    pub protected: Vec<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sheet: default_store_sheet(),
            legacy_sheet: default_legacy_sheet(),
            plan_file: default_plan_file(),
            identity_file: default_identity_file(),
            protected: vec![],
        }
    }
}

impl StoreConfig {
    pub fn is_protected(&self, name: &str) -> bool {
        name == self.plan_file || self.protected.iter().any(|p| p == name)
    }
}

fn default_store_sheet() -> String {
    "AGENTFS".to_string()
}

fn default_legacy_sheet() -> String {
    "AGENT_BASE".to_string()
}

fn default_plan_file() -> String {
    "plan.md".to_string()
}

fn default_identity_file() -> String {
    "agent.md".to_string()
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(Error::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(Error::Config(
                "retry.base_delay_ms must not exceed retry.max_delay_ms".to_string(),
            ));
        }
        if self.store.sheet.trim().is_empty() || self.store.legacy_sheet.trim().is_empty() {
            return Err(Error::Config("store sheet names must not be empty".to_string()));
        }
        if self.store.sheet == self.store.legacy_sheet {
            return Err(Error::Config(
                "store.sheet and store.legacy_sheet must differ".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/sheetdrive/config.toml` (~/.config/sheetdrive/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("sheetdrive").join("config.toml")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/sheetdrive/` (~/.local/state/sheetdrive/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("sheetdrive")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.sheets.spreadsheet_id.is_none());
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.base_delay_ms, 1000);
        assert_eq!(config.retry.max_delay_ms, 30000);
        assert_eq!(config.store.sheet, "AGENTFS");
        assert_eq!(config.auth.credentials_env, "SHEETDRIVE_CREDENTIALS_B64");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[sheets]
spreadsheet_id = "1AbC"

[retry]
max_attempts = 5
base_delay_ms = 200

[store]
sheet = "FILES"
protected = ["agent.md"]

[logging]
level = "debug"
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(config.sheets.spreadsheet_id.as_deref(), Some("1AbC"));
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.max_delay_ms, 30000);
        assert_eq!(config.store.sheet, "FILES");
        assert!(config.store.is_protected("agent.md"));
        assert!(config.store.is_protected("plan.md"));
        assert!(!config.store.is_protected("notes.md"));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_retry_policy_from_config() {
        let policy = RetryConfig::default().policy();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay, Duration::from_millis(1000));
        assert_eq!(policy.max_delay, Duration::from_millis(30000));
        assert!(policy.retryable_codes.iter().any(|c| c == "ETIMEDOUT"));
    }

    #[test]
    fn test_validation() {
        let mut config = Config::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.retry.base_delay_ms = 60_000;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.store.legacy_sheet = config.store.sheet.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[retry]\nmax_attempts = 0\n").unwrap();
        assert!(matches!(Config::load_from(&path), Err(Error::Config(_))));

        std::fs::write(&path, "[auth]\ncredentials_env = \"MY_CREDS\"\n").unwrap();
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.auth.credentials_env, "MY_CREDS");
    }
}

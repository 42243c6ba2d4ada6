use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::{HOVER_DEBOUNCE_MS, RECENT_MESSAGES_LIMIT};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub summarizer: SummarizerConfig,
    #[serde(default)]
    pub gmail: GmailConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub hover: HoverConfig,
}

/// Local summarization service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizerConfig {
    #[serde(default = "default_summarizer_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_summarizer_model")]
    pub model: String,
    /// Upper bound on generated tokens (`num_predict`)
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    /// Context window hint (`num_ctx`)
    #[serde(default = "default_context_window")]
    pub context_window: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            endpoint: default_summarizer_endpoint(),
            model: default_summarizer_model(),
            max_output_tokens: default_max_output_tokens(),
            context_window: default_context_window(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl SummarizerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Remote message store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GmailConfig {
    #[serde(default = "default_gmail_api_base")]
    pub api_base: String,
    /// How many recent messages to list before fetching the first
    #[serde(default = "default_recent_limit")]
    pub recent_limit: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GmailConfig {
    fn default() -> Self {
        Self {
            api_base: default_gmail_api_base(),
            recent_limit: default_recent_limit(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// OAuth2 desktop client id; `HOVERMAIL_OAUTH_CLIENT_ID` overrides it
    #[serde(default)]
    pub client_id: Option<String>,
    /// Key the refresh token is stored under
    #[serde(default = "default_account")]
    pub account: String,
    /// Open a browser for consent when no stored token works
    #[serde(default = "default_true")]
    pub interactive: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            account: default_account(),
            interactive: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoverConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for HoverConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl HoverConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

fn default_summarizer_endpoint() -> String {
    "http://localhost:11434/api/generate".to_string()
}

fn default_summarizer_model() -> String {
    "llama3.2".to_string()
}

fn default_max_output_tokens() -> u32 {
    100
}

fn default_context_window() -> u32 {
    2048
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_gmail_api_base() -> String {
    "https://gmail.googleapis.com/gmail/v1".to_string()
}

fn default_recent_limit() -> u32 {
    RECENT_MESSAGES_LIMIT
}

fn default_account() -> String {
    "default".to_string()
}

fn default_true() -> bool {
    true
}

fn default_debounce_ms() -> u64 {
    HOVER_DEBOUNCE_MS
}

impl Config {
    pub fn config_dir() -> Result<PathBuf> {
        let dir = dirs::config_dir()
            .context("Could not find config directory")?
            .join("hovermail");
        Ok(dir)
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load the config file, or defaults when there is none
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Effective client id: environment first, then the config file
    pub fn client_id(&self) -> Option<String> {
        crate::oauth2::client_id_from_env()
            .or_else(|| self.auth.client_id.clone())
            .filter(|id| !id.is_empty())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.summarizer.endpoint, "http://localhost:11434/api/generate");
        assert_eq!(config.summarizer.max_output_tokens, 100);
        assert_eq!(config.gmail.recent_limit, 10);
        assert_eq!(config.hover.debounce(), Duration::from_millis(300));
        assert!(config.auth.interactive);
        assert_eq!(config.auth.client_id, None);
    }

    #[test]
    fn test_partial_sections() {
        let toml = r#"
            [summarizer]
            model = "mistral"
            context_window = 4096

            [auth]
            client_id = "123.apps.googleusercontent.com"
            interactive = false

            [hover]
            debounce_ms = 150
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.summarizer.model, "mistral");
        assert_eq!(config.summarizer.context_window, 4096);
        assert_eq!(config.summarizer.timeout(), Duration::from_secs(30));
        assert_eq!(
            config.auth.client_id.as_deref(),
            Some("123.apps.googleusercontent.com")
        );
        assert!(!config.auth.interactive);
        assert_eq!(config.auth.account, "default");
        assert_eq!(config.hover.debounce_ms, 150);
        assert_eq!(config.gmail.api_base, "https://gmail.googleapis.com/gmail/v1");
    }

    #[test]
    fn test_missing_file_is_default() {
        let path = std::env::temp_dir().join(format!("hovermail_missing_{}.toml", std::process::id()));
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.gmail.recent_limit, RECENT_MESSAGES_LIMIT);
    }

    #[test]
    fn test_invalid_file_is_error() {
        let path = std::env::temp_dir().join(format!("hovermail_invalid_{}.toml", std::process::id()));
        fs::write(&path, "[hover]\ndebounce_ms = \"soon\"\n").unwrap();
        assert!(Config::load_from(&path).is_err());
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_serialized_config_parses_back() {
        let text = Config::default().to_toml().unwrap();
        let config: Config = toml::from_str(&text).unwrap();
        assert_eq!(config.summarizer.model, "llama3.2");
    }
}

//! Configuration management for Parley.
//!
//! Parley reads a single configuration file at `~/.parley/config.json` once at
//! startup. The resulting [`Config`] is immutable for the lifetime of the process
//! and is handed to each component explicitly.
//!
//! # Configuration Priority
//!
//! 1. Environment variables (see below)
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `PARLEY_CONFIG` → path of the config file itself
//! - `OPENAI_API_KEY` → chat.api_key
//! - `PARLEY_LOG_LEVEL` → observability.log_level
//! - `PARLEY_IRC_SERVER` → irc.server
//! - `PARLEY_IRC_PORT` → irc.port
//! - `PARLEY_IRC_NICKNAME` → irc.nickname

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Error;

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".parley"),
        |dirs| dirs.home_dir().join(".parley"),
    )
}

/// Get the configuration file path, honoring `PARLEY_CONFIG`.
pub fn config_path() -> PathBuf {
    std::env::var("PARLEY_CONFIG")
        .map(|p| expand_path(&p))
        .unwrap_or_else(|_| config_dir().join("config.json"))
}

/// Expand `~` and environment variables in a configured path.
pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::full(path).map_or_else(|_| path.to_string(), |p| p.into_owned()))
}

// ============================================================================
// IRC
// ============================================================================

/// IRC connection and identity settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrcConfig {
    /// Server hostname
    #[serde(default = "default_irc_server")]
    pub server: String,

    /// Server port
    #[serde(default = "default_irc_port")]
    pub port: u16,

    /// Connect over TLS
    #[serde(default, alias = "ssl")]
    pub tls: bool,

    /// Nickname, also the bot's own identity for private messages
    #[serde(default = "default_nickname")]
    pub nickname: String,

    /// Username sent with `USER`
    #[serde(default = "default_ident")]
    pub ident: String,

    /// Real name sent with `USER`
    #[serde(default = "default_realname")]
    pub realname: String,

    /// Channels joined after registration
    #[serde(default)]
    pub channels: Vec<String>,

    /// Substrings that make the bot answer a message
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,

    /// Optional server password sent with `PASS`
    #[serde(default)]
    pub server_password: Option<String>,

    /// Upper bound for a single connect attempt
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for IrcConfig {
    fn default() -> Self {
        Self {
            server: default_irc_server(),
            port: default_irc_port(),
            tls: false,
            nickname: default_nickname(),
            ident: default_ident(),
            realname: default_realname(),
            channels: Vec::new(),
            keywords: default_keywords(),
            server_password: None,
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl IrcConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

// ============================================================================
// Chat completion
// ============================================================================

/// Generation parameters for the chat-completion backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionConfig {
    /// API base URL (OpenAI-compatible)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API key, usually supplied through `OPENAI_API_KEY`
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    /// System prompt placed before the conversation history
    #[serde(default = "default_context")]
    pub context: String,

    #[serde(default = "default_temperature")]
    pub temperature: f64,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_top_p")]
    pub top_p: f64,

    #[serde(default)]
    pub frequency_penalty: f64,

    #[serde(default)]
    pub presence_penalty: f64,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ChatCompletionConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            model: default_model(),
            context: default_context(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            top_p: default_top_p(),
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl ChatCompletionConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

// ============================================================================
// Memory
// ============================================================================

/// Conversation history persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// History file path (`~` is expanded)
    #[serde(default = "default_memory_path")]
    pub path: String,

    /// Number of recent turns included in each prompt
    #[serde(default = "default_recall_depth")]
    pub recall_depth: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            path: default_memory_path(),
            recall_depth: default_recall_depth(),
        }
    }
}

impl MemoryConfig {
    /// Resolved history file path.
    pub fn resolved_path(&self) -> PathBuf {
        expand_path(&self.path)
    }
}

// ============================================================================
// Reconnect
// ============================================================================

/// Delay between connection attempts. Retries never stop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default = "default_reconnect_delay")]
    pub delay_secs: u64,

    /// Random extra delay added to each attempt, 0 disables jitter
    #[serde(default)]
    pub jitter_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            delay_secs: default_reconnect_delay(),
            jitter_ms: 0,
        }
    }
}

// ============================================================================
// Observability
// ============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format: "pretty" or "json"
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

// ============================================================================
// Root
// ============================================================================

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub irc: IrcConfig,

    #[serde(default, alias = "chatcompletion")]
    pub chat: ChatCompletionConfig,

    #[serde(default)]
    pub memory: MemoryConfig,

    #[serde(default)]
    pub reconnect: ReconnectConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with environment variable overrides applied.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            self.chat.api_key = Some(key);
        }

        if let Ok(level) = std::env::var("PARLEY_LOG_LEVEL") {
            self.observability.log_level = level;
        }

        if let Ok(server) = std::env::var("PARLEY_IRC_SERVER") {
            self.irc.server = server;
        }
        if let Ok(port) = std::env::var("PARLEY_IRC_PORT") {
            if let Ok(p) = port.parse() {
                self.irc.port = p;
            }
        }
        if let Ok(nick) = std::env::var("PARLEY_IRC_NICKNAME") {
            self.irc.nickname = nick;
        }
    }

    /// Reject configurations the session cannot run with.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.irc.server.trim().is_empty() {
            return Err(Error::Config("irc.server must not be empty".into()));
        }
        if self.irc.nickname.trim().is_empty() {
            return Err(Error::Config("irc.nickname must not be empty".into()));
        }
        if self.irc.channels.iter().all(|c| c.trim().is_empty()) {
            return Err(Error::Config("irc.channels must list at least one channel".into()));
        }
        if self.irc.keywords.iter().all(|k| k.trim().is_empty()) {
            return Err(Error::Config("irc.keywords must list at least one keyword".into()));
        }
        if self.memory.recall_depth == 0 {
            return Err(Error::Config("memory.recall_depth must be greater than 0".into()));
        }
        Ok(())
    }
}

fn default_irc_server() -> String {
    "irc.libera.chat".into()
}
fn default_irc_port() -> u16 {
    6667
}
fn default_nickname() -> String {
    "parley".into()
}
fn default_ident() -> String {
    "parley".into()
}
fn default_realname() -> String {
    "Parley assistant".into()
}
fn default_keywords() -> Vec<String> {
    ["bot", "gpt", "ai", "assistant"]
        .iter()
        .map(|k| (*k).to_string())
        .collect()
}
fn default_connect_timeout() -> u64 {
    30
}
fn default_base_url() -> String {
    "https://api.openai.com".into()
}
fn default_model() -> String {
    "gpt-3.5-turbo".into()
}
fn default_context() -> String {
    "You are a helpful assistant in an IRC channel. Keep answers short.".into()
}
fn default_temperature() -> f64 {
    0.7
}
fn default_max_tokens() -> u32 {
    256
}
fn default_top_p() -> f64 {
    1.0
}
fn default_request_timeout() -> u64 {
    30
}
fn default_memory_path() -> String {
    "~/.parley/chat_memory.json".into()
}
fn default_recall_depth() -> usize {
    10
}
fn default_reconnect_delay() -> u64 {
    5
}
fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "pretty".into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.irc.channels = vec!["#parley".into()];
        config
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::default();
        assert_eq!(config.irc.port, 6667);
        assert!(!config.irc.tls);
        assert_eq!(config.irc.keywords, vec!["bot", "gpt", "ai", "assistant"]);
        assert_eq!(config.memory.recall_depth, 10);
        assert_eq!(config.reconnect.delay_secs, 5);
        assert_eq!(config.reconnect.jitter_ms, 0);
        assert_eq!(config.chat.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_config_partial_json() {
        let json = r##"{
            "irc": {
                "server": "irc.example.net",
                "port": 6697,
                "ssl": true,
                "nickname": "helper",
                "channels": ["#a", "#b"]
            },
            "chatcompletion": {
                "model": "gpt-4o-mini",
                "max_tokens": 500
            }
        }"##;
        let config: Config = serde_json::from_str(json).unwrap();

        assert_eq!(config.irc.server, "irc.example.net");
        assert!(config.irc.tls);
        assert_eq!(config.irc.channels, vec!["#a", "#b"]);
        assert_eq!(config.irc.ident, "parley");
        assert_eq!(config.chat.model, "gpt-4o-mini");
        assert_eq!(config.chat.max_tokens, 500);
        assert!((config.chat.temperature - 0.7).abs() < f64::EPSILON);
        assert_eq!(config.memory.recall_depth, 10);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r##"{"irc": {"channels": ["#x"]}, "memory": {"recall_depth": 4}}"##,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.irc.channels, vec!["#x"]);
        assert_eq!(config.memory.recall_depth, 4);
    }

    #[test]
    fn test_load_from_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config"));
    }

    #[test]
    fn test_validate_accepts_complete_config() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_missing_channels() {
        let config = Config::default();
        let err = config.validate().unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("irc.channels"));
    }

    #[test]
    fn test_validate_rejects_zero_recall_depth() {
        let mut config = valid_config();
        config.memory.recall_depth = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_keywords() {
        let mut config = valid_config();
        config.irc.keywords = vec![" ".into()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_expand_path_without_tilde() {
        assert_eq!(expand_path("/tmp/memory.json"), PathBuf::from("/tmp/memory.json"));
    }
}

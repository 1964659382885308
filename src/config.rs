//! Configuration management for mudgate.
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file (JSON)
//! 4. Default values
//!
//! The derivation secret is deliberately kept out of the config file:
//! it only arrives through `MUDGATE_SECRET` or `--secret`, and loading
//! fails without it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cli::Args;
use crate::gateway::GatewayOptions;
use crate::output::FormatOptions;
use crate::session::{QuiescenceTuning, SessionConfig};

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Game server connection.
    pub remote: RemoteSection,
    /// Chat-side behavior.
    pub chat: ChatSection,
    /// Outbound fragmentation.
    pub output: OutputSection,
    /// Session lifecycle.
    pub session: SessionSection,
    /// Account provisioning.
    pub account: AccountSection,
    /// Credential store location.
    pub store: StoreSection,
    /// Logging configuration.
    pub logging: LoggingSection,
    /// Password-derivation secret. Never read from or written to the
    /// config file.
    #[serde(skip)]
    pub secret: Option<String>,
}

/// Game server connection section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteSection {
    /// Game server host name or address.
    pub host: String,
    /// Game server port.
    pub port: u16,
}

impl Default for RemoteSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4000,
        }
    }
}

/// Chat-side behavior section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatSection {
    /// Only react to direct messages.
    pub dm_only: bool,
    /// Warn identities playing in public channels (when allowed).
    pub warn_public_play: bool,
}

impl Default for ChatSection {
    fn default() -> Self {
        Self {
            dm_only: true,
            warn_public_play: true,
        }
    }
}

/// Outbound fragmentation section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSection {
    /// Fragment size budget in bytes, wrapping included.
    pub fragment_size: usize,
    /// Fragment cap per response, truncation notice included.
    pub max_fragments: usize,
    /// Delay between successive outbound fragments, in milliseconds.
    pub pacing_ms: u64,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            fragment_size: 1800,
            max_fragments: 8,
            pacing_ms: 250,
        }
    }
}

/// Session lifecycle section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    /// Idle seconds before the sweep may evict a session.
    pub idle_timeout_secs: u64,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 3600,
        }
    }
}

/// Account provisioning section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountSection {
    /// Create missing game accounts on first login.
    pub auto_create: bool,
    /// Prefix for provisioned account names.
    pub prefix: String,
    /// Rename command template with a `{name}` placeholder, run once
    /// after creation. Disabled when absent.
    pub rename_template: Option<String>,
}

impl Default for AccountSection {
    fn default() -> Self {
        Self {
            auto_create: true,
            prefix: "chat_".to_string(),
            rename_template: None,
        }
    }
}

/// Credential store section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    /// Path of the JSON credential file.
    pub path: PathBuf,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/users.json"),
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level (error, warn, info, debug, trace).
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        serde_json::from_str(&content).map_err(ConfigError::Json)
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) {
        if let Ok(host) = std::env::var("MUDGATE_HOST") {
            self.remote.host = host;
        }
        if let Ok(port) = std::env::var("MUDGATE_PORT") {
            if let Ok(port) = port.parse() {
                self.remote.port = port;
            }
        }

        if let Ok(secret) = std::env::var("MUDGATE_SECRET") {
            if !secret.is_empty() {
                self.secret = Some(secret);
            }
        }

        if let Some(dm_only) = env_bool("MUDGATE_DM_ONLY") {
            self.chat.dm_only = dm_only;
        }
        if let Some(warn) = env_bool("MUDGATE_WARN_PUBLIC_PLAY") {
            self.chat.warn_public_play = warn;
        }

        if let Ok(size) = std::env::var("MUDGATE_FRAGMENT_SIZE") {
            if let Ok(size) = size.parse() {
                self.output.fragment_size = size;
            }
        }
        if let Ok(count) = std::env::var("MUDGATE_MAX_FRAGMENTS") {
            if let Ok(count) = count.parse() {
                self.output.max_fragments = count;
            }
        }

        if let Ok(secs) = std::env::var("MUDGATE_IDLE_TIMEOUT_SECS") {
            if let Ok(secs) = secs.parse() {
                self.session.idle_timeout_secs = secs;
            }
        }

        if let Some(auto_create) = env_bool("MUDGATE_AUTO_CREATE") {
            self.account.auto_create = auto_create;
        }
        if let Ok(prefix) = std::env::var("MUDGATE_ACCOUNT_PREFIX") {
            self.account.prefix = prefix;
        }
        if let Ok(template) = std::env::var("MUDGATE_RENAME_TEMPLATE") {
            if !template.is_empty() {
                self.account.rename_template = Some(template);
            }
        }

        if let Ok(path) = std::env::var("MUDGATE_STORE_PATH") {
            self.store.path = PathBuf::from(path);
        }

        if let Ok(level) = std::env::var("MUDGATE_LOG_LEVEL") {
            self.logging.level = level;
        } else if let Ok(level) = std::env::var("RUST_LOG") {
            self.logging.level = level;
        }
    }

    /// Apply CLI argument overrides.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(ref host) = args.host {
            self.remote.host = host.clone();
        }
        if let Some(port) = args.port {
            self.remote.port = port;
        }
        if let Some(ref secret) = args.secret {
            self.secret = Some(secret.clone());
        }
        if args.all_channels {
            self.chat.dm_only = false;
        }
        if args.no_auto_create {
            self.account.auto_create = false;
        }
        if let Some(ref path) = args.store_path {
            self.store.path = path.clone();
        }
        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Load configuration with full priority chain.
    ///
    /// Priority: CLI args > env vars > config file > defaults.
    /// Fails when no derivation secret was provided anywhere.
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        let mut config = match args.config {
            Some(ref path) => Config::from_file(path)?,
            None => Config::default(),
        };

        config.apply_env();
        config.apply_args(args);

        match config.secret.as_deref() {
            Some(secret) if !secret.is_empty() => {}
            _ => return Err(ConfigError::MissingSecret),
        }

        Ok(config)
    }

    /// Connection settings for sessions the registry creates.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            host: self.remote.host.clone(),
            port: self.remote.port,
            idle_timeout: Duration::from_secs(self.session.idle_timeout_secs),
            tuning: QuiescenceTuning::default(),
        }
    }

    /// Dispatcher options. Fails when the secret is absent (i.e. the
    /// config did not come from [`Config::load`]).
    pub fn gateway_options(&self) -> Result<GatewayOptions, ConfigError> {
        let secret = match self.secret {
            Some(ref secret) if !secret.is_empty() => secret.clone(),
            _ => return Err(ConfigError::MissingSecret),
        };
        Ok(GatewayOptions {
            secret,
            account_prefix: self.account.prefix.clone(),
            auto_create: self.account.auto_create,
            dm_only: self.chat.dm_only,
            warn_public_play: self.chat.warn_public_play,
            rename_template: self.account.rename_template.clone(),
            format: FormatOptions {
                fragment_size: self.output.fragment_size,
                max_fragments: self.output.max_fragments,
            },
            pacing: Duration::from_millis(self.output.pacing_ms),
        })
    }

    /// Get the log level filter string.
    pub fn log_filter(&self) -> &str {
        &self.logging.level
    }
}

fn env_bool(name: &str) -> Option<bool> {
    let value = std::env::var(name).ok()?;
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    Io(std::io::Error),
    /// JSON parsing error.
    Json(serde_json::Error),
    /// No derivation secret provided.
    MissingSecret,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "failed to read config file: {}", e),
            Self::Json(e) => write!(f, "failed to parse config file: {}", e),
            Self::MissingSecret => {
                write!(f, "no secret configured: set MUDGATE_SECRET or pass --secret")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

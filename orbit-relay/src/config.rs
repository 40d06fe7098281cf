//! Configuration loading for orbit-relay.
//!
//! Configuration is loaded from a TOML file (default: `relay.toml`). Every
//! section and field has a default, so an empty file is a valid config.

use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::path::PathBuf;

/// Root configuration for orbit-relay.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Connection limits.
    pub limits: LimitsConfig,
    /// Identity resolution.
    pub auth: AuthConfig,
    /// Plan tiers and account assignments.
    pub plans: PlansConfig,
    /// HTTP endpoints configuration.
    pub http: HttpConfig,
    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address for the HTTP/WebSocket listener (default: 0.0.0.0:8080).
    pub bind_address: String,
    /// Path of the transfer WebSocket endpoint (default: /transfer).
    pub transfer_path: String,
}

/// Connection limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Largest accepted WebSocket message in bytes (default: 512MB).
    pub max_message_size: usize,
    /// Frames buffered per connection before writers are back-pressured (default: 64).
    pub outbound_queue_depth: usize,
    /// Display names are truncated to this many characters (default: 256).
    pub max_display_name_len: usize,
    /// Longest wait on a peer's full queue before the write counts as failed (default: 1000ms).
    pub peer_write_timeout_ms: u64,
}

/// Identity resolution configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Request header carrying the authenticated account (default: x-orbit-account).
    ///
    /// Set by the identity layer in front of the relay.
    pub account_header: String,
    /// Account assigned to connections without the header (default: none).
    pub anonymous_account: Option<String>,
}

/// Plan configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlansConfig {
    /// Plan applied to accounts without an explicit assignment (default: scout).
    pub default_plan: String,
    /// Plan name → tier definition, merged over the built-in scout and titan tiers.
    #[serde(deserialize_with = "merge_tiers")]
    pub tiers: HashMap<String, TierConfig>,
    /// Account → plan name.
    pub accounts: HashMap<String, String>,
}

/// A single plan tier.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TierConfig {
    /// Relay bandwidth ceiling; absent or zero means unlimited.
    pub bytes_per_second: Option<u32>,
}

/// HTTP endpoints configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Enable metrics endpoint (default: true).
    pub metrics_enabled: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset (default: info).
    pub level: String,
}

// Default value functions
fn default_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_transfer_path() -> String {
    "/transfer".to_string()
}

fn default_max_message_size() -> usize {
    512 * 1024 * 1024 // 512MB
}

fn default_outbound_queue_depth() -> usize {
    64
}

fn default_max_display_name_len() -> usize {
    256
}

fn default_account_header() -> String {
    "x-orbit-account".to_string()
}

fn default_plan() -> String {
    "scout".to_string()
}

fn default_peer_write_timeout_ms() -> u64 {
    1000
}

fn default_tiers() -> HashMap<String, TierConfig> {
    HashMap::from([
        (
            "scout".to_string(),
            TierConfig {
                bytes_per_second: Some(500_000),
            },
        ),
        (
            "titan".to_string(),
            TierConfig {
                bytes_per_second: None,
            },
        ),
    ])
}

/// Configured tiers override built-in ones of the same (case-insensitive) name.
fn merge_tiers<'de, D>(deserializer: D) -> Result<HashMap<String, TierConfig>, D::Error>
where
    D: Deserializer<'de>,
{
    let configured = HashMap::<String, TierConfig>::deserialize(deserializer)?;
    let mut tiers = default_tiers();
    tiers.extend(
        configured
            .into_iter()
            .map(|(name, tier)| (name.to_ascii_lowercase(), tier)),
    );
    Ok(tiers)
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            transfer_path: default_transfer_path(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_message_size: default_max_message_size(),
            outbound_queue_depth: default_outbound_queue_depth(),
            max_display_name_len: default_max_display_name_len(),
            peer_write_timeout_ms: default_peer_write_timeout_ms(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            account_header: default_account_header(),
            anonymous_account: None,
        }
    }
}

impl Default for PlansConfig {
    fn default() -> Self {
        Self {
            default_plan: default_plan(),
            tiers: default_tiers(),
            accounts: HashMap::new(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl LimitsConfig {
    /// Peer write timeout as a duration.
    pub fn peer_write_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.peer_write_timeout_ms)
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}

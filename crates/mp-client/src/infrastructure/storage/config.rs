//! TOML-based configuration for the client application.
//!
//! Looked up in the platform-appropriate config file unless a path is given:
//! - Windows:  `%APPDATA%\MultiplayerSync\client.toml`
//! - Linux:    `~/.config/multiplayer-sync/client.toml`
//! - macOS:    `~/Library/Application Support/MultiplayerSync/client.toml`
//!
//! Example:
//!
//! ```toml
//! [network]
//! endpoint = "127.0.0.1:8081"
//! max_reconnect_attempts = 20
//!
//! [player]
//! name = "Bob"
//! ```
//!
//! Every field has a `#[serde(default = "...")]`, so a missing file, a
//! missing section, or a missing key all fall back to the defaults.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use mp_core::CodecConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::infrastructure::network::ClientSettings;

pub const CONFIG_FILE_NAME: &str = "client.toml";

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkConfig {
    /// Fixed endpoint used for the first connect and every reconnect.
    #[serde(default = "default_endpoint")]
    pub endpoint: SocketAddr,
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    /// Inbound messages drained per tick.
    #[serde(default = "default_receive_batch_size")]
    pub receive_batch_size: usize,
    /// Frame size limit in bytes, header included.
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerConfig {
    /// Identity announced in the handshake when joining as a peer.
    #[serde(default = "default_player_name")]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_endpoint() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8081))
}
fn default_max_reconnect_attempts() -> u32 {
    mp_core::reconnect::DEFAULT_MAX_ATTEMPTS
}
fn default_receive_batch_size() -> usize {
    20
}
fn default_max_frame_size() -> usize {
    mp_core::protocol::DEFAULT_MAX_FRAME_SIZE
}
fn default_connect_timeout_ms() -> u64 {
    500
}
fn default_player_name() -> String {
    mp_core::protocol::handshake::DEFAULT_PEER_IDENTITY.to_string()
}
fn default_tick_interval_ms() -> u64 {
    16
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            receive_batch_size: default_receive_batch_size(),
            max_frame_size: default_max_frame_size(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            name: default_player_name(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            log_level: default_log_level(),
        }
    }
}

impl ClientConfig {
    /// Settings for the transport client built from this config.
    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            local_endpoint: self.network.endpoint,
            peer_name: self.player.name.clone(),
            max_reconnect_attempts: self.network.max_reconnect_attempts,
            receive_batch_size: self.network.receive_batch_size,
            codec: CodecConfig::with_max_frame_size(self.network.max_frame_size),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.network.connect_timeout_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.session.tick_interval_ms.max(1))
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Resolves the full path to the default config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    platform_config_dir()
        .map(|dir| dir.join(CONFIG_FILE_NAME))
        .ok_or(ConfigError::NoPlatformConfigDir)
}

/// Loads the config from `path`, or from the platform default when `None`.
/// A missing file yields `ClientConfig::default()`.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: Option<&Path>) -> Result<ClientConfig, ConfigError> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => config_file_path()?,
    };

    match std::fs::read_to_string(&path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ClientConfig::default()),
        Err(e) => Err(ConfigError::Io { path, source: e }),
    }
}

/// Writes `config` to `path` as pretty TOML, creating parent directories.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(config: &ClientConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("MultiplayerSync"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("multiplayer-sync"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("MultiplayerSync")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

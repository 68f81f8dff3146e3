//! TOML-based configuration for the server application.
//!
//! Looked up in the platform-appropriate config file unless a path is given:
//! - Windows:  `%APPDATA%\MultiplayerSync\server.toml`
//! - Linux:    `~/.config/multiplayer-sync/server.toml`
//! - macOS:    `~/Library/Application Support/MultiplayerSync/server.toml`
//!
//! Example:
//!
//! ```toml
//! [network]
//! bind_address = "0.0.0.0"
//! port = 8081
//!
//! [server]
//! log_level = "debug"
//! ```

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use mp_core::CodecConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::infrastructure::network::ServerSettings;

pub const CONFIG_FILE_NAME: &str = "server.toml";

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
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
pub struct ServerConfig {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub server: ServerSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkConfig {
    /// Interface to listen on.  `0.0.0.0` accepts peers from other machines.
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_receive_batch_size")]
    pub receive_batch_size: usize,
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSection {
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_bind_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}
fn default_port() -> u16 {
    8081
}
fn default_receive_batch_size() -> usize {
    20
}
fn default_max_frame_size() -> usize {
    mp_core::protocol::DEFAULT_MAX_FRAME_SIZE
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
            bind_address: default_bind_address(),
            port: default_port(),
            receive_batch_size: default_receive_batch_size(),
            max_frame_size: default_max_frame_size(),
        }
    }
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            log_level: default_log_level(),
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.network.bind_address, self.network.port)
    }

    pub fn server_settings(&self) -> ServerSettings {
        ServerSettings {
            bind_addr: self.bind_addr(),
            receive_batch_size: self.network.receive_batch_size,
            codec: CodecConfig::with_max_frame_size(self.network.max_frame_size),
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.server.tick_interval_ms.max(1))
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    platform_config_dir()
        .map(|dir| dir.join(CONFIG_FILE_NAME))
        .ok_or(ConfigError::NoPlatformConfigDir)
}

/// Loads the config from `path`, or from the platform default when `None`.
/// A missing file yields `ServerConfig::default()`.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: Option<&Path>) -> Result<ServerConfig, ConfigError> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => config_file_path()?,
    };

    match std::fs::read_to_string(&path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ServerConfig::default()),
        Err(e) => Err(ConfigError::Io { path, source: e }),
    }
}

/// Writes `config` to `path` as pretty TOML, creating parent directories.
pub fn save_config(config: &ServerConfig, path: &Path) -> Result<(), ConfigError> {
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

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("mp-server-test-{}", uuid::Uuid::new_v4()))
            .join(CONFIG_FILE_NAME)
    }

    #[test]
    fn test_default_bind_addr_is_localhost_8081() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.bind_addr(), "127.0.0.1:8081".parse().unwrap());
        assert_eq!(cfg.server.tick_interval_ms, 16);
    }

    #[test]
    fn test_partial_toml_overrides_only_given_keys() {
        let cfg: ServerConfig = toml::from_str(
            r#"
            [network]
            port = 9100
            "#,
        )
        .unwrap();

        assert_eq!(cfg.network.port, 9100);
        assert_eq!(cfg.network.bind_address, default_bind_address());
        assert_eq!(cfg.server, ServerSection::default());
    }

    #[test]
    fn test_server_settings_follow_config() {
        let mut cfg = ServerConfig::default();
        cfg.network.bind_address = "0.0.0.0".parse().unwrap();
        cfg.network.max_frame_size = 600;

        let settings = cfg.server_settings();

        assert_eq!(settings.bind_addr, "0.0.0.0:8081".parse().unwrap());
        assert_eq!(settings.codec.max_frame_size, 600);
    }

    #[test]
    fn test_save_then_load_round_trips() {
        // Arrange
        let path = temp_path();
        let mut cfg = ServerConfig::default();
        cfg.server.log_level = "debug".into();

        // Act
        save_config(&cfg, &path).unwrap();
        let restored = load_config(Some(&path)).unwrap();

        // Assert
        assert_eq!(restored, cfg);
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        assert_eq!(load_config(Some(&temp_path())).unwrap(), ServerConfig::default());
    }
}

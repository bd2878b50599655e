//! INI configuration file.
//!
//! Loaded from `<config dir>/assetstream/config.ini`. Every key is optional;
//! a missing file yields the defaults.
//!
//! ```ini
//! [asset_system]
//! udp_timeout = 120
//! http_timeout = 120
//! rpc_timeout = 60
//! texture_cap_url = https://caps.example.com/texture
//! max_http_transfers = 64
//!
//! [cache]
//! directory = /var/cache/assetstream
//! memory_size = 512MB
//! disk_max_size = 4GB
//!
//! [logging]
//! level = info
//! file = /var/log/assetstream.log
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::{Ini, Properties};
use thiserror::Error;

use crate::cache::CacheSettings;

/// Directory name under the platform config and cache directories.
pub const APP_DIR: &str = "assetstream";

/// Config file name.
pub const CONFIG_FILE_NAME: &str = "config.ini";

const DEFAULT_UDP_TIMEOUT_SECS: u64 = 120;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 120;
const DEFAULT_RPC_TIMEOUT_SECS: u64 = 60;
const DEFAULT_MAX_HTTP_TRANSFERS: usize = 64;
const DEFAULT_LOG_LEVEL: &str = "info";

/// Errors loading the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(String),

    #[error("Invalid value '{value}' for {section}.{key}: {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },
}

/// `[asset_system]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetSystemSettings {
    /// Idle timeout for datagram transfers.
    pub udp_timeout: Duration,
    /// Idle timeout for HTTP transfers.
    pub http_timeout: Duration,
    /// Reply timeout for XML-RPC requests.
    pub rpc_timeout: Duration,
    /// Capability URL for UUID texture and mesh fetches over HTTP.
    pub texture_cap_url: Option<String>,
    /// Simultaneously open HTTP sessions.
    pub max_http_transfers: usize,
}

impl Default for AssetSystemSettings {
    fn default() -> Self {
        Self {
            udp_timeout: Duration::from_secs(DEFAULT_UDP_TIMEOUT_SECS),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            rpc_timeout: Duration::from_secs(DEFAULT_RPC_TIMEOUT_SECS),
            texture_cap_url: None,
            max_http_transfers: DEFAULT_MAX_HTTP_TRANSFERS,
        }
    }
}

/// `[cache]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    pub directory: PathBuf,
    /// Memory tier bound in bytes, 0 for unbounded.
    pub memory_size: u64,
    /// Disk tier cap in bytes, 0 for uncapped.
    pub disk_max_size: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            directory: default_cache_dir(),
            memory_size: 0,
            disk_max_size: 0,
        }
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    /// Filter directive, e.g. `info` or `assetstream=debug`.
    pub level: String,
    /// Log file; console only when unset.
    pub file: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            file: None,
        }
    }
}

/// Parsed configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigFile {
    pub asset_system: AssetSystemSettings,
    pub cache: CacheConfig,
    pub logging: LoggingSettings,
}

impl ConfigFile {
    /// Default location of the config file.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE_NAME))
    }

    /// Load from the default location, falling back to defaults.
    pub fn load() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load from an explicit path. The file must exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        text.parse()
    }

    /// Cache settings derived from the `[cache]` section.
    pub fn cache_settings(&self) -> CacheSettings {
        let mut settings = CacheSettings::new(self.cache.directory.clone());
        settings.memory_size = self.cache.memory_size;
        settings.disk_max_size = self.cache.disk_max_size;
        settings
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut config = ConfigFile::default();

        if let Some(section) = ini.section(Some("asset_system")) {
            let settings = &mut config.asset_system;
            if let Some(secs) = parse_number::<u64>(section, "asset_system", "udp_timeout")? {
                settings.udp_timeout = Duration::from_secs(secs);
            }
            if let Some(secs) = parse_number::<u64>(section, "asset_system", "http_timeout")? {
                settings.http_timeout = Duration::from_secs(secs);
            }
            if let Some(secs) = parse_number::<u64>(section, "asset_system", "rpc_timeout")? {
                settings.rpc_timeout = Duration::from_secs(secs);
            }
            if let Some(max) = parse_number::<usize>(section, "asset_system", "max_http_transfers")? {
                settings.max_http_transfers = max;
            }
            settings.texture_cap_url = section
                .get("texture_cap_url")
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string);
        }

        if let Some(section) = ini.section(Some("cache")) {
            if let Some(dir) = section.get("directory").map(str::trim).filter(|v| !v.is_empty()) {
                config.cache.directory = expand_tilde(dir);
            }
            if let Some(size) = parse_size_key(section, "cache", "memory_size")? {
                config.cache.memory_size = size;
            }
            if let Some(size) = parse_size_key(section, "cache", "disk_max_size")? {
                config.cache.disk_max_size = size;
            }
        }

        if let Some(section) = ini.section(Some("logging")) {
            if let Some(level) = section.get("level").map(str::trim).filter(|v| !v.is_empty()) {
                config.logging.level = level.to_string();
            }
            config.logging.file = section
                .get("file")
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(expand_tilde);
        }

        Ok(config)
    }
}

impl FromStr for ConfigFile {
    type Err = ConfigError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let ini = Ini::load_from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Self::from_ini(&ini)
    }
}

fn invalid(section: &str, key: &str, value: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

fn parse_number<T>(props: &Properties, section: &str, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match props.get(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| invalid(section, key, raw, e.to_string())),
    }
}

fn parse_size_key(props: &Properties, section: &str, key: &str) -> Result<Option<u64>, ConfigError> {
    match props.get(key) {
        None => Ok(None),
        Some(raw) => parse_size(raw)
            .map(Some)
            .ok_or_else(|| invalid(section, key, raw, "expected a size such as 512MB")),
    }
}

/// Parse a byte size with an optional `K`, `M` or `G` suffix (binary units).
pub fn parse_size(raw: &str) -> Option<u64> {
    let value = raw.trim().to_ascii_uppercase();
    let value = value.strip_suffix('B').unwrap_or(&value);
    let (digits, multiplier) = match value.char_indices().last() {
        Some((i, 'K')) => (&value[..i], 1u64 << 10),
        Some((i, 'M')) => (&value[..i], 1 << 20),
        Some((i, 'G')) => (&value[..i], 1 << 30),
        _ => (value, 1),
    };
    digits.trim().parse::<u64>().ok()?.checked_mul(multiplier)
}

/// Human-readable byte size, e.g. `1.5 MB`.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .map(|dir| dir.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from(".assetstream-cache"))
}

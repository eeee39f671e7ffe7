//! Configuration management with environment variable support.
//!
//! Centralized configuration for ui-sync, supporting:
//! - Environment variables for all configurable values
//! - Defaults matching a local Appium server driving the stock Android emulator
//! - Loading flow files from disk
//!
//! # Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `UI_SYNC_SERVER_URL` | WebDriver / Appium server URL | `http://127.0.0.1:4723` |
//! | `UI_SYNC_PLATFORM` | `android` or `web` | `android` |
//! | `ANDROID_DEVICE_NAME` | Device name capability | `Android Emulator` |
//! | `ANDROID_UDID` | Device udid capability | `emulator-5554` |
//! | `UI_SYNC_APP_PACKAGE` | App terminated on session release | `com.android.settings` |
//! | `UI_SYNC_NEW_COMMAND_TIMEOUT` | Appium idle timeout in seconds | `300` |
//! | `UI_SYNC_TIMEOUT` | Page-object wait timeout in seconds | `20` |
//! | `UI_SYNC_POLL_INTERVAL` | Poll interval in milliseconds | `500` |
//! | `UI_SYNC_ARTIFACTS_DIR` | Directory for failure artifacts | `artifacts` |
//! | `UI_SYNC_TEXT_LIMIT` | Visible texts printed per dump | `60` |
//! | `UI_SYNC_HTTP_TIMEOUT` | Transport timeout in seconds | `60` |
//!
//! # Example
//!
//! ```bash
//! # Point at a remote Appium grid and a physical device
//! export UI_SYNC_SERVER_URL="http://10.0.0.5:4723"
//! export ANDROID_UDID="R58M123ABC"
//!
//! # Drive Chrome instead
//! export UI_SYNC_PLATFORM=web
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

// ============================================================================
// Default Values
// ============================================================================

/// Default WebDriver / Appium server
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:4723";

pub const DEFAULT_PLATFORM: Platform = Platform::Android;

pub const DEFAULT_DEVICE_NAME: &str = "Android Emulator";

pub const DEFAULT_UDID: &str = "emulator-5554";

/// Package force-stopped when a session is released
pub const DEFAULT_APP_PACKAGE: &str = "com.android.settings";

/// Appium `newCommandTimeout` (seconds)
pub const DEFAULT_NEW_COMMAND_TIMEOUT: u64 = 300;

/// Page-object wait timeout (seconds)
pub const DEFAULT_WAIT_TIMEOUT_SECS: u64 = 20;

/// Poll interval (milliseconds)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

pub const DEFAULT_ARTIFACTS_DIR: &str = "artifacts";

/// Maximum visible texts printed in a diagnostics dump
pub const DEFAULT_TEXT_LIMIT: usize = 60;

/// HTTP request timeout towards the server (seconds)
pub const DEFAULT_HTTP_TIMEOUT: u64 = 60;

// ============================================================================
// Environment Variable Names
// ============================================================================

pub const ENV_SERVER_URL: &str = "UI_SYNC_SERVER_URL";

pub const ENV_PLATFORM: &str = "UI_SYNC_PLATFORM";

pub const ENV_DEVICE_NAME: &str = "ANDROID_DEVICE_NAME";

pub const ENV_UDID: &str = "ANDROID_UDID";

pub const ENV_APP_PACKAGE: &str = "UI_SYNC_APP_PACKAGE";

pub const ENV_NEW_COMMAND_TIMEOUT: &str = "UI_SYNC_NEW_COMMAND_TIMEOUT";

pub const ENV_WAIT_TIMEOUT: &str = "UI_SYNC_TIMEOUT";

pub const ENV_POLL_INTERVAL: &str = "UI_SYNC_POLL_INTERVAL";

pub const ENV_ARTIFACTS_DIR: &str = "UI_SYNC_ARTIFACTS_DIR";

pub const ENV_TEXT_LIMIT: &str = "UI_SYNC_TEXT_LIMIT";

pub const ENV_HTTP_TIMEOUT: &str = "UI_SYNC_HTTP_TIMEOUT";

// ============================================================================
// Legacy Environment Variable Support
// ============================================================================

/// Server URL variable used by older test setups
pub const ENV_SERVER_URL_LEGACY: &str = "APPIUM_SERVER_URL";

// ============================================================================
// Errors
// ============================================================================

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown platform {0:?} (expected \"android\" or \"web\")")]
    InvalidPlatform(String),

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid flow file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

// ============================================================================
// Configuration
// ============================================================================

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Get the global configuration (initialized from environment on first access)
pub fn get() -> &'static Config {
    CONFIG.get_or_init(Config::from_env)
}

/// Remote platform a session drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Android,
    Web,
}

impl FromStr for Platform {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "android" => Ok(Platform::Android),
            "web" | "chrome" => Ok(Platform::Web),
            other => Err(ConfigError::InvalidPlatform(other.to_string())),
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Platform::Android => write!(f, "android"),
            Platform::Web => write!(f, "web"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerSettings,
    pub device: DeviceSettings,
    pub sync: SyncSettings,
    pub artifacts: ArtifactSettings,
}

/// Remote server settings
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub url: String,
    pub platform: Platform,
    /// Per-request transport timeout (seconds)
    pub http_timeout: u64,
}

/// Capabilities of the device under test
#[derive(Debug, Clone)]
pub struct DeviceSettings {
    pub device_name: String,
    pub udid: String,
    /// Package terminated on session release
    pub app_package: String,
    pub new_command_timeout: u64,
}

/// Wait defaults for page objects
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub timeout_secs: u64,
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone)]
pub struct ArtifactSettings {
    pub dir: String,
    /// Visible texts printed per dump
    pub text_limit: usize,
}

impl Config {
    /// Create configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        Self {
            server: ServerSettings::from_env(),
            device: DeviceSettings::from_env(),
            sync: SyncSettings::from_env(),
            artifacts: ArtifactSettings::from_env(),
        }
    }

    /// Create configuration with all defaults (ignoring environment)
    pub fn defaults() -> Self {
        Self {
            server: ServerSettings::defaults(),
            device: DeviceSettings::defaults(),
            sync: SyncSettings::defaults(),
            artifacts: ArtifactSettings::defaults(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

impl ServerSettings {
    pub fn from_env() -> Self {
        Self {
            url: env::var(ENV_SERVER_URL)
                .or_else(|_| env::var(ENV_SERVER_URL_LEGACY))
                .unwrap_or_else(|_| DEFAULT_SERVER_URL.to_string()),
            // An unrecognised platform falls back to the default rather than
            // aborting startup; the CLI flag validates strictly.
            platform: env::var(ENV_PLATFORM)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_PLATFORM),
            http_timeout: env_parse(ENV_HTTP_TIMEOUT).unwrap_or(DEFAULT_HTTP_TIMEOUT),
        }
    }

    pub fn defaults() -> Self {
        Self {
            url: DEFAULT_SERVER_URL.to_string(),
            platform: DEFAULT_PLATFORM,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}

impl DeviceSettings {
    pub fn from_env() -> Self {
        Self {
            device_name: env::var(ENV_DEVICE_NAME)
                .unwrap_or_else(|_| DEFAULT_DEVICE_NAME.to_string()),
            udid: env::var(ENV_UDID).unwrap_or_else(|_| DEFAULT_UDID.to_string()),
            app_package: env::var(ENV_APP_PACKAGE)
                .unwrap_or_else(|_| DEFAULT_APP_PACKAGE.to_string()),
            new_command_timeout: env_parse(ENV_NEW_COMMAND_TIMEOUT)
                .unwrap_or(DEFAULT_NEW_COMMAND_TIMEOUT),
        }
    }

    pub fn defaults() -> Self {
        Self {
            device_name: DEFAULT_DEVICE_NAME.to_string(),
            udid: DEFAULT_UDID.to_string(),
            app_package: DEFAULT_APP_PACKAGE.to_string(),
            new_command_timeout: DEFAULT_NEW_COMMAND_TIMEOUT,
        }
    }
}

impl SyncSettings {
    pub fn from_env() -> Self {
        Self {
            timeout_secs: env_parse(ENV_WAIT_TIMEOUT).unwrap_or(DEFAULT_WAIT_TIMEOUT_SECS),
            poll_interval_ms: env_parse(ENV_POLL_INTERVAL).unwrap_or(DEFAULT_POLL_INTERVAL_MS),
        }
    }

    pub fn defaults() -> Self {
        Self {
            timeout_secs: DEFAULT_WAIT_TIMEOUT_SECS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl ArtifactSettings {
    pub fn from_env() -> Self {
        Self {
            dir: env::var(ENV_ARTIFACTS_DIR).unwrap_or_else(|_| DEFAULT_ARTIFACTS_DIR.to_string()),
            text_limit: env_parse(ENV_TEXT_LIMIT).unwrap_or(DEFAULT_TEXT_LIMIT),
        }
    }

    pub fn defaults() -> Self {
        Self {
            dir: DEFAULT_ARTIFACTS_DIR.to_string(),
            text_limit: DEFAULT_TEXT_LIMIT,
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

/// Read and deserialize a JSON file
pub fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> ConfigResult<T> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Get the artifacts directory (convenience function)
pub fn artifacts_dir() -> String {
    get().artifacts.dir.clone()
}

/// Get the visible-text dump limit (convenience function)
pub fn text_limit() -> usize {
    get().artifacts.text_limit
}

/// Get the package terminated on release (convenience function)
pub fn app_package() -> String {
    get().device.app_package.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_config_defaults() {
        let config = Config::defaults();
        assert_eq!(config.server.url, DEFAULT_SERVER_URL);
        assert_eq!(config.server.platform, Platform::Android);
        assert_eq!(config.device.udid, "emulator-5554");
        assert_eq!(config.sync.timeout_secs, 20);
        assert_eq!(config.sync.poll_interval_ms, 500);
        assert_eq!(config.artifacts.text_limit, 60);
    }

    #[test]
    fn test_platform_parse() {
        assert_eq!("android".parse::<Platform>().unwrap(), Platform::Android);
        assert_eq!(" Web ".parse::<Platform>().unwrap(), Platform::Web);
        assert!(matches!(
            "ios".parse::<Platform>(),
            Err(ConfigError::InvalidPlatform(p)) if p == "ios"
        ));
    }

    #[test]
    fn test_load_json_errors_carry_path() {
        let missing = Path::new("/nonexistent/flow.json");
        let err = load_json::<serde_json::Value>(missing).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/flow.json"));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        assert!(matches!(
            load_json::<serde_json::Value>(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }
}

//! TOML-based configuration for the virtual display daemon.
//!
//! The file lives at `$XDG_CONFIG_HOME/vdisplay/config.toml`, falling back to
//! `~/.config/vdisplay/config.toml`.  Every field has a default, so a missing
//! file, an empty file, or a file written by an older version all load.
//!
//! ```toml
//! [driver]
//! library_paths = ["libevdi.so.1", "/opt/evdi/lib/libevdi.so"]
//! max_device_slots = 16
//!
//! [monitor]
//! interval_ms = 5000
//!
//! [logging]
//! log_level = "debug"
//!
//! [display]
//! width = 2560
//! height = 1440
//! refresh_milli_hz = 144000
//! ```
//!
//! # Serde default values
//!
//! Fields annotated with `#[serde(default = "some_fn")]` use the return value
//! of `some_fn()` when the field is absent from the TOML file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::manage_displays::{
    ManagerSettings, DEFAULT_MAX_DEVICE_SLOTS, DEFAULT_MONITOR_INTERVAL,
};
use crate::infrastructure::device_node::DEFAULT_CARD_PREFIX;
use crate::infrastructure::driver::DEFAULT_LIBRARY_CANDIDATES;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config directory could not be determined.
    #[error("could not determine config directory (neither XDG_CONFIG_HOME nor HOME is set)")]
    NoConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub driver: DriverConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub display: DisplayDefaults,
}

/// Where to find the EVDI library, kernel module, and device nodes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DriverConfig {
    /// Library names or paths tried in order.
    #[serde(default = "default_library_paths")]
    pub library_paths: Vec<String>,
    /// Slots `0..max_device_slots` are scanned for a free device.
    #[serde(default = "default_max_device_slots")]
    pub max_device_slots: u32,
    /// Prefix of the DRM card node; the slot number is appended.
    #[serde(default = "default_device_node_prefix")]
    pub device_node_prefix: String,
    /// Kernel module name looked up in `proc_modules_path`.
    #[serde(default = "default_kernel_module")]
    pub kernel_module: String,
    #[serde(default = "default_proc_modules_path")]
    pub proc_modules_path: PathBuf,
    /// Directory whose existence means the module is loaded.
    #[serde(default = "default_sysfs_module_path")]
    pub sysfs_module_path: PathBuf,
}

/// Health monitor settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonitorConfig {
    /// Poll interval in milliseconds.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Display mode used by `vdisplayd` when none is given on the command line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DisplayDefaults {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_refresh_milli_hz")]
    pub refresh_milli_hz: u32,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_library_paths() -> Vec<String> {
    DEFAULT_LIBRARY_CANDIDATES
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_max_device_slots() -> u32 {
    DEFAULT_MAX_DEVICE_SLOTS
}
fn default_device_node_prefix() -> String {
    DEFAULT_CARD_PREFIX.to_string()
}
fn default_kernel_module() -> String {
    "evdi".to_string()
}
fn default_proc_modules_path() -> PathBuf {
    PathBuf::from("/proc/modules")
}
fn default_sysfs_module_path() -> PathBuf {
    PathBuf::from("/sys/module/evdi")
}
fn default_interval_ms() -> u64 {
    DEFAULT_MONITOR_INTERVAL.as_millis() as u64
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_width() -> u32 {
    1920
}
fn default_height() -> u32 {
    1080
}
fn default_refresh_milli_hz() -> u32 {
    60_000
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            library_paths: default_library_paths(),
            max_device_slots: default_max_device_slots(),
            device_node_prefix: default_device_node_prefix(),
            kernel_module: default_kernel_module(),
            proc_modules_path: default_proc_modules_path(),
            sysfs_module_path: default_sysfs_module_path(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for DisplayDefaults {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            refresh_milli_hz: default_refresh_milli_hz(),
        }
    }
}

impl AppConfig {
    /// Manager tunables derived from this config.  A zero interval is raised
    /// to one millisecond.
    pub fn manager_settings(&self) -> ManagerSettings {
        ManagerSettings {
            max_device_slots: self.driver.max_device_slots,
            monitor_interval: Duration::from_millis(self.monitor.interval_ms.max(1)),
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Returns `$XDG_CONFIG_HOME/vdisplay` or `~/.config/vdisplay`.
///
/// # Errors
///
/// Returns [`ConfigError::NoConfigDir`] when neither variable is set.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))
        .ok_or(ConfigError::NoConfigDir)?;
    Ok(base.join("vdisplay"))
}

/// Resolves the full path to the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads the config from the default location.
///
/// # Errors
///
/// See [`load_config_from`].
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads `AppConfig` from `path`, returning `AppConfig::default()` if the file
/// does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Persists `config` to the default location.
///
/// # Errors
///
/// See [`save_config_to`].
pub fn save_config(config: &AppConfig) -> Result<(), ConfigError> {
    save_config_to(config, &config_file_path()?)
}

/// Writes `config` to `path`, creating parent directories.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config_to(config: &AppConfig, path: &Path) -> Result<(), ConfigError> {
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

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_path() -> (PathBuf, PathBuf) {
        let dir = std::env::temp_dir().join(format!("vdisplay_cfg_{}", Uuid::new_v4()));
        let path = dir.join("nested").join("config.toml");
        (dir, path)
    }

    // ── Defaults ──────────────────────────────────────────────────────────────

    #[test]
    fn test_default_driver_config_scans_sixteen_slots() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.driver.max_device_slots, 16);
        assert_eq!(cfg.driver.device_node_prefix, "/dev/dri/card");
        assert_eq!(cfg.driver.library_paths[0], "libevdi.so.1");
    }

    #[test]
    fn test_default_monitor_interval_is_five_seconds() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.monitor.interval_ms, 5000);
        assert_eq!(cfg.manager_settings().monitor_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_default_log_level_is_info() {
        assert_eq!(LoggingConfig::default().log_level, "info");
    }

    #[test]
    fn test_zero_interval_is_raised_to_one_millisecond() {
        let mut cfg = AppConfig::default();
        cfg.monitor.interval_ms = 0;
        assert_eq!(cfg.manager_settings().monitor_interval, Duration::from_millis(1));
    }

    // ── TOML parsing ──────────────────────────────────────────────────────────

    #[test]
    fn test_empty_toml_uses_all_defaults() {
        let cfg: AppConfig = toml::from_str("").expect("deserialize empty");
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn test_partial_driver_section_keeps_other_defaults() {
        // Arrange
        let toml_str = r#"
[driver]
max_device_slots = 4
library_paths = ["/opt/evdi/libevdi.so"]
"#;

        // Act
        let cfg: AppConfig = toml::from_str(toml_str).expect("deserialize partial");

        // Assert
        assert_eq!(cfg.driver.max_device_slots, 4);
        assert_eq!(cfg.driver.library_paths, vec!["/opt/evdi/libevdi.so"]);
        assert_eq!(cfg.driver.kernel_module, "evdi");
        assert_eq!(cfg.display.refresh_milli_hz, 60_000);
    }

    #[test]
    fn test_invalid_toml_returns_parse_error() {
        let (dir, path) = temp_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "[[[ not valid toml").unwrap();

        let result = load_config_from(&path);

        assert!(matches!(result, Err(ConfigError::Parse(_))));
        std::fs::remove_dir_all(&dir).ok();
    }

    // ── load / save ───────────────────────────────────────────────────────────

    #[test]
    fn test_load_config_from_missing_file_returns_default() {
        let path = PathBuf::from("/nonexistent/path/that/cannot/exist/config.toml");
        let cfg = load_config_from(&path).expect("missing file is not an error");
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn test_save_then_load_preserves_changes() {
        // Arrange
        let (dir, path) = temp_path();
        let mut cfg = AppConfig::default();
        cfg.display.width = 2560;
        cfg.display.height = 1440;
        cfg.logging.log_level = "debug".to_string();

        // Act
        save_config_to(&cfg, &path).expect("save");
        let loaded = load_config_from(&path).expect("load");

        // Assert
        assert_eq!(loaded, cfg);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_config_file_path_ends_with_config_toml() {
        if let Ok(path) = config_file_path() {
            assert!(path.ends_with("vdisplay/config.toml"), "got {path:?}");
        }
        // NoConfigDir in a stripped environment is also acceptable.
    }
}

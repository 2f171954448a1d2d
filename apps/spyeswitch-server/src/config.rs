//! Server configuration.
//!
//! Supports loading from YAML files with environment variable overrides.
//! These are process-level settings; the switching rules themselves live in
//! the settings file named by `settings_file`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use spyeswitch_core::sensor::sysfs::DEFAULT_GPIO_ROOT;
use spyeswitch_core::RuntimeConfig;

/// Server configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Path of the nine-line settings file.
    /// Override: `SPYESWITCH_SETTINGS_FILE`
    pub settings_file: PathBuf,

    /// Sysfs GPIO number the motion sensor is wired to. On older kernels this
    /// is the BCM pin; Raspberry Pi kernels 6.6 and later add the chip base,
    /// so BCM 14 becomes 526 there (see `/sys/class/gpio/gpiochip*/base`).
    /// Override: `SPYESWITCH_GPIO_LINE`
    pub gpio_line: u32,

    /// Root of the sysfs GPIO interface.
    pub gpio_root: PathBuf,

    /// How often the GPIO line is sampled, in milliseconds.
    pub gpio_poll_interval_ms: u64,

    /// Treat a low line as motion.
    pub sensor_active_low: bool,

    /// Minimum time a sensor change must hold, in milliseconds. Unset or 0 disables it.
    pub sensor_settle_ms: Option<u64>,

    /// Quiet window that ends a player response, in milliseconds (250-500).
    /// Override: `SPYESWITCH_DRAIN_QUIET_MS`
    pub drain_quiet_ms: u64,

    /// Evaluate the sensor's level once at startup.
    pub sync_on_start: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            settings_file: PathBuf::from("spyeconfig.txt"),
            gpio_line: 14,
            gpio_root: PathBuf::from(DEFAULT_GPIO_ROOT),
            gpio_poll_interval_ms: 100,
            sensor_active_low: false,
            sensor_settle_ms: None,
            drain_quiet_ms: 500,
            sync_on_start: true,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("SPYESWITCH_GPIO_LINE") {
            if let Ok(line) = val.parse() {
                self.gpio_line = line;
            }
        }

        if let Ok(val) = std::env::var("SPYESWITCH_DRAIN_QUIET_MS") {
            if let Ok(ms) = val.parse() {
                self.drain_quiet_ms = ms;
            }
        }

        // Note: SPYESWITCH_SETTINGS_FILE is handled by clap via #[arg(env = ...)] in main.rs
    }

    /// Returns the GPIO poll interval.
    pub fn gpio_poll_interval(&self) -> Duration {
        Duration::from_millis(self.gpio_poll_interval_ms.max(1))
    }

    /// Converts to spyeswitch-core's runtime tuning.
    pub fn to_runtime_config(&self) -> RuntimeConfig {
        let runtime = RuntimeConfig {
            drain_quiet: Duration::from_millis(self.drain_quiet_ms),
            sensor_settle: self
                .sensor_settle_ms
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis),
            sensor_active_low: self.sensor_active_low,
            sync_on_start: self.sync_on_start,
            ..RuntimeConfig::default()
        };
        RuntimeConfig {
            drain_quiet: runtime.clamped_drain_quiet(),
            ..runtime
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_path_uses_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.settings_file, PathBuf::from("spyeconfig.txt"));
        assert_eq!(config.gpio_line, 14);
        assert_eq!(config.gpio_poll_interval(), Duration::from_millis(100));
        assert!(config.to_runtime_config().sensor_settle.is_none());
    }

    #[test]
    fn partial_yaml_keeps_remaining_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "settings_file: /etc/spyeswitch/spyeconfig.txt").unwrap();
        writeln!(file, "sensor_active_low: true").unwrap();
        writeln!(file, "sensor_settle_ms: 150").unwrap();

        let config = ServerConfig::load(Some(file.path())).unwrap();

        assert_eq!(
            config.settings_file,
            PathBuf::from("/etc/spyeswitch/spyeconfig.txt")
        );
        assert!(config.sensor_active_low);
        assert!(config.sync_on_start);
        let runtime = config.to_runtime_config();
        assert_eq!(runtime.sensor_settle, Some(Duration::from_millis(150)));
        assert!(runtime.sensor_active_low);
    }

    #[test]
    fn drain_quiet_is_clamped_into_range() {
        let config = ServerConfig {
            drain_quiet_ms: 5_000,
            ..ServerConfig::default()
        };
        assert_eq!(
            config.to_runtime_config().drain_quiet,
            Duration::from_millis(500)
        );

        let config = ServerConfig {
            drain_quiet_ms: 10,
            ..ServerConfig::default()
        };
        assert_eq!(
            config.to_runtime_config().drain_quiet,
            Duration::from_millis(250)
        );
    }

    #[test]
    fn unreadable_yaml_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "gpio_line: [not, a, number]").unwrap();

        assert!(ServerConfig::load(Some(file.path())).is_err());
    }
}

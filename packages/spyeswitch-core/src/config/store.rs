//! Settings persistence.
//!
//! The settings file holds nine lines in a fixed order:
//!
//! ```text
//! 192.168.1.110                                  player address
//! c:/users/public/documents/spyeworks/content/   content filepath
//! active                                         active list
//! idle                                           idle list
//! T                                              sensor enabled
//! T                                              active list enabled
//! 0                                              active delay (seconds)
//! T                                              idle list enabled
//! 0                                              idle delay (seconds)
//! ```
//!
//! Flags are the single letters `T` and `F`. The port is fixed and not stored.

use std::path::{Path, PathBuf};

use super::{
    parse_address, parse_delay, validate_filepath, validate_list_name, Config, ConfigError,
    ConfigResult,
};
use crate::utils::{format_flag, parse_flag};

/// Loads and saves [`Config`] snapshots.
pub trait ConfigStore: Send + Sync {
    /// Loads the stored configuration.
    ///
    /// A missing or unreadable store yields the defaults, which are then
    /// persisted.
    fn load(&self) -> ConfigResult<Config>;

    /// Persists `config`.
    fn save(&self, config: &Config) -> ConfigResult<()>;
}

/// [`ConfigStore`] backed by the nine-line settings file.
#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    /// Creates a store for the file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the settings file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> ConfigError {
        ConfigError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> ConfigResult<Config> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => Ok(parse_settings(&contents)),
            Err(e) => {
                log::info!(
                    "[Config] Settings file {} unavailable ({}), writing defaults",
                    self.path.display(),
                    e
                );
                let config = Config::default();
                self.save(&config)?;
                Ok(config)
            }
        }
    }

    /// Writes a temp file next to the target and renames it into place.
    fn save(&self, config: &Config) -> ConfigResult<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| self.io_error(e))?;
        }

        let mut temp_path = self.path.clone().into_os_string();
        temp_path.push(".tmp");

        std::fs::write(&temp_path, render_settings(config)).map_err(|e| self.io_error(e))?;
        std::fs::rename(&temp_path, &self.path).map_err(|e| self.io_error(e))?;

        log::debug!("[Config] Saved settings to {}", self.path.display());
        Ok(())
    }
}

/// Renders the nine-line settings format.
pub fn render_settings(config: &Config) -> String {
    [
        config.player_address.to_string(),
        config.content_filepath.clone(),
        config.active_list.clone(),
        config.idle_list.clone(),
        format_flag(config.sensor_enabled).to_string(),
        format_flag(config.active_list_enabled).to_string(),
        config.active_delay_secs.to_string(),
        format_flag(config.idle_list_enabled).to_string(),
        config.idle_delay_secs.to_string(),
    ]
    .iter()
    .map(|line| format!("{line}\n"))
    .collect()
}

/// Parses the nine-line settings format.
///
/// A missing or malformed line falls back to that field's default and is
/// logged; the remaining fields are still read.
pub fn parse_settings(contents: &str) -> Config {
    let defaults = Config::default();
    let lines: Vec<&str> = contents.lines().collect();
    let line = |index: usize| lines.get(index).copied();

    Config {
        player_address: field(
            line(0),
            "player address",
            defaults.player_address,
            parse_address,
        ),
        player_port: defaults.player_port,
        content_filepath: field(line(1), "content filepath", defaults.content_filepath, |v| {
            validate_filepath(v).map(|()| v.to_string())
        }),
        active_list: field(line(2), "active list", defaults.active_list, |v| {
            validate_list_name(v).map(|()| v.to_string())
        }),
        idle_list: field(line(3), "idle list", defaults.idle_list, |v| {
            validate_list_name(v).map(|()| v.to_string())
        }),
        sensor_enabled: field(line(4), "sensor enabled", defaults.sensor_enabled, flag),
        active_list_enabled: field(
            line(5),
            "active list enabled",
            defaults.active_list_enabled,
            flag,
        ),
        active_delay_secs: field(
            line(6),
            "active delay",
            defaults.active_delay_secs,
            parse_delay,
        ),
        idle_list_enabled: field(
            line(7),
            "idle list enabled",
            defaults.idle_list_enabled,
            flag,
        ),
        idle_delay_secs: field(line(8), "idle delay", defaults.idle_delay_secs, parse_delay),
    }
}

fn flag(value: &str) -> Result<bool, String> {
    parse_flag(value).ok_or_else(|| format!("expected T or F, got {value:?}"))
}

fn field<T, E, F>(raw: Option<&str>, name: &str, default: T, parse: F) -> T
where
    E: std::fmt::Display,
    F: FnOnce(&str) -> Result<T, E>,
{
    let Some(raw) = raw else {
        log::warn!("[Config] Settings file has no {} line, using default", name);
        return default;
    };
    match parse(raw) {
        Ok(value) => value,
        Err(e) => {
            log::warn!("[Config] Bad {} in settings file ({}), using default", name, e);
            default
        }
    }
}

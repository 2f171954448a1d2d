//! Switcher configuration.
//!
//! # Module Structure
//!
//! - `store` - [`ConfigStore`] trait and the flat-file [`FileConfigStore`]
//!
//! [`Config`] is the user-editable snapshot the controller evaluates rules
//! against. [`RuntimeConfig`] carries the tuning knobs the host process sets
//! once at startup.

pub mod store;

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::protocol_constants::{
    DEFAULT_DRAIN_QUIET, EVENT_CHANNEL_CAPACITY, MAX_DRAIN_QUIET, MIN_DRAIN_QUIET, PLAYER_PORT,
};

pub use store::{ConfigStore, FileConfigStore};

// ─────────────────────────────────────────────────────────────────────────────
// Error Types
// ─────────────────────────────────────────────────────────────────────────────

/// Errors from validating or persisting configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Player address is not an IP address.
    #[error("Invalid player address: {0:?}")]
    InvalidAddress(String),

    /// Content path is not a lowercase drive path ending in `/`.
    #[error("Invalid content filepath: {0:?}")]
    InvalidFilepath(String),

    /// List name contains characters other than letters, digits, space, `_` or `-`.
    #[error("Invalid list name: {0:?}")]
    InvalidListName(String),

    /// Delay is not a non-negative whole number of seconds.
    #[error("Invalid delay: {0:?}")]
    InvalidDelay(String),

    /// Reading or writing the settings file failed.
    #[error("Settings file {path}: {source}")]
    Io {
        /// Settings file path.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// Convenient Result alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

// ─────────────────────────────────────────────────────────────────────────────
// Defaults
// ─────────────────────────────────────────────────────────────────────────────

/// Player address used until one is configured.
pub const DEFAULT_PLAYER_ADDRESS: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 110));

/// Default Spyeworks content directory.
pub const DEFAULT_CONTENT_FILEPATH: &str = "c:/users/public/documents/spyeworks/content/";

/// Default active list name.
pub const DEFAULT_ACTIVE_LIST: &str = "active";

/// Default idle list name.
pub const DEFAULT_IDLE_LIST: &str = "idle";

// ─────────────────────────────────────────────────────────────────────────────
// Config
// ─────────────────────────────────────────────────────────────────────────────

/// Immutable configuration snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub player_address: IpAddr,
    /// Fixed by the protocol; not persisted.
    pub player_port: u16,
    pub content_filepath: String,
    pub active_list: String,
    pub idle_list: String,
    pub sensor_enabled: bool,
    pub active_list_enabled: bool,
    pub active_delay_secs: u32,
    pub idle_list_enabled: bool,
    pub idle_delay_secs: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            player_address: DEFAULT_PLAYER_ADDRESS,
            player_port: PLAYER_PORT,
            content_filepath: DEFAULT_CONTENT_FILEPATH.to_string(),
            active_list: DEFAULT_ACTIVE_LIST.to_string(),
            idle_list: DEFAULT_IDLE_LIST.to_string(),
            sensor_enabled: true,
            active_list_enabled: true,
            active_delay_secs: 0,
            idle_list_enabled: true,
            idle_delay_secs: 0,
        }
    }
}

impl Config {
    /// Checks every field.
    ///
    /// # Errors
    ///
    /// Returns the first field that fails validation.
    pub fn validate(&self) -> ConfigResult<()> {
        validate_filepath(&self.content_filepath)?;
        validate_list_name(&self.active_list)?;
        validate_list_name(&self.idle_list)?;
        Ok(())
    }

    /// Returns the active delay as a [`Duration`].
    #[must_use]
    pub fn active_delay(&self) -> Duration {
        Duration::from_secs(u64::from(self.active_delay_secs))
    }

    /// Returns the idle delay as a [`Duration`].
    #[must_use]
    pub fn idle_delay(&self) -> Duration {
        Duration::from_secs(u64::from(self.idle_delay_secs))
    }

    /// Returns true if any setting the player session uses differs.
    #[must_use]
    pub fn player_settings_differ(&self, other: &Config) -> bool {
        self.player_address != other.player_address
            || self.player_port != other.player_port
            || self.content_filepath != other.content_filepath
            || self.active_list != other.active_list
            || self.idle_list != other.idle_list
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Field Validation
// ─────────────────────────────────────────────────────────────────────────────

/// Parses a player address.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidAddress`] if `value` is not an IP address.
pub fn parse_address(value: &str) -> ConfigResult<IpAddr> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidAddress(value.to_string()))
}

/// Checks a list name: letters, digits, space, `_` and `-` only.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidListName`] on any other character.
pub fn validate_list_name(value: &str) -> ConfigResult<()> {
    let valid = value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '_' | '-'));
    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidListName(value.to_string()))
    }
}

/// Checks a content path: a lowercase drive letter, `:/`, then letters,
/// digits, `/`, `_`, space or `-`, ending in `/`.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidFilepath`] if the path does not match.
pub fn validate_filepath(value: &str) -> ConfigResult<()> {
    let invalid = || ConfigError::InvalidFilepath(value.to_string());

    let mut chars = value.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() => {}
        _ => return Err(invalid()),
    }
    let rest = chars.as_str().strip_prefix(":/").ok_or_else(invalid)?;
    if !value.ends_with('/') {
        return Err(invalid());
    }
    let body_ok = rest
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '_' | ' ' | '-'));
    if body_ok {
        Ok(())
    } else {
        Err(invalid())
    }
}

/// Parses a delay in whole seconds.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidDelay`] for anything but a non-negative integer.
pub fn parse_delay(value: &str) -> ConfigResult<u32> {
    let trimmed = value.trim();
    if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_digit()) {
        return Err(ConfigError::InvalidDelay(value.to_string()));
    }
    trimmed
        .parse()
        .map_err(|_| ConfigError::InvalidDelay(value.to_string()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Runtime Config
// ─────────────────────────────────────────────────────────────────────────────

/// Process-level tuning set by the host at startup.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Silence that ends a response drain. Clamped to 250-500 ms.
    pub drain_quiet: Duration,
    /// Minimum time a sensor change must hold before it is published.
    pub sensor_settle: Option<Duration>,
    /// Treat a low sensor line as motion.
    pub sensor_active_low: bool,
    /// Publish the sensor's level once at startup.
    pub sync_on_start: bool,
    /// Capacity of the event broadcast channel.
    pub event_channel_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            drain_quiet: DEFAULT_DRAIN_QUIET,
            sensor_settle: None,
            sensor_active_low: false,
            sync_on_start: true,
            event_channel_capacity: EVENT_CHANNEL_CAPACITY,
        }
    }
}

impl RuntimeConfig {
    /// Returns the drain quiet window limited to the supported range.
    #[must_use]
    pub fn clamped_drain_quiet(&self) -> Duration {
        self.drain_quiet.clamp(MIN_DRAIN_QUIET, MAX_DRAIN_QUIET)
    }
}

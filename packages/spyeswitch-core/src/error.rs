//! Centralized error types for the switcher core library.
//!
//! Each concern defines its own `thiserror` enum next to the code that
//! produces it; this module aggregates them into [`SwitchError`] and gives
//! every error a machine-readable code for logs.

use thiserror::Error;

use crate::config::ConfigError;
use crate::player::PlayerError;
use crate::sensor::SensorError;

/// Trait for error types that provide machine-readable error codes.
pub trait ErrorCode {
    /// Returns a machine-readable error code.
    fn code(&self) -> &'static str;
}

impl ErrorCode for PlayerError {
    fn code(&self) -> &'static str {
        match self {
            Self::ConnectionFailed(_) => "connection_failed",
            Self::LoginRejected(_) => "login_rejected",
            Self::ParseAnomaly(_) => "parse_anomaly",
        }
    }
}

impl ErrorCode for ConfigError {
    fn code(&self) -> &'static str {
        match self {
            Self::InvalidAddress(_) => "invalid_address",
            Self::InvalidFilepath(_) => "invalid_filepath",
            Self::InvalidListName(_) => "invalid_list_name",
            Self::InvalidDelay(_) => "invalid_delay",
            Self::Io { .. } => "settings_io_failed",
        }
    }
}

impl ErrorCode for SensorError {
    fn code(&self) -> &'static str {
        match self {
            Self::Io { .. } => "gpio_io_failed",
            Self::InvalidLevel(_) => "gpio_invalid_level",
            Self::AlreadySubscribed => "sensor_already_subscribed",
        }
    }
}

/// Application-wide error type.
#[derive(Debug, Error)]
pub enum SwitchError {
    /// Talking to the player failed.
    #[error(transparent)]
    Player(#[from] PlayerError),

    /// Configuration was invalid or could not be persisted.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The sensor could not be read.
    #[error(transparent)]
    Sensor(#[from] SensorError),

    /// A background service is gone.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ErrorCode for SwitchError {
    fn code(&self) -> &'static str {
        match self {
            Self::Player(e) => e.code(),
            Self::Config(e) => e.code(),
            Self::Sensor(e) => e.code(),
            Self::Internal(_) => "internal_error",
        }
    }
}

/// Convenient Result alias for application-wide operations.
pub type SwitchResult<T> = Result<T, SwitchError>;

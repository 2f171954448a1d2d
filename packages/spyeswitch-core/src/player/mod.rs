//! Spyeworks player control.
//!
//! # Module Structure
//!
//! - `protocol` - Command encoding and fixed-offset response parsing
//! - `traits` - [`PlayerTransport`] abstraction for testability
//! - `client` - [`PlayerClient`], one TCP connection per command
//! - `session` - [`PlayerSession`], connectivity and playlist state on top of a transport

pub mod client;
pub mod protocol;
pub mod session;
pub mod traits;

use serde::Serialize;
use thiserror::Error;

pub use client::PlayerClient;
pub use protocol::PlayerCommand;
pub use session::{PlayerSession, PlayerSettings};
pub use traits::PlayerTransport;

// ─────────────────────────────────────────────────────────────────────────────
// Error Types
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that can occur while talking to a Spyeworks player.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlayerError {
    /// TCP connect failed or timed out, or the socket broke mid-exchange.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The player is reachable but refused the `LOGIN` handshake.
    #[error("Login rejected: {0:?}")]
    LoginRejected(String),

    /// The player answered but nothing usable could be parsed.
    #[error("Unexpected response: {0}")]
    ParseAnomaly(String),
}

/// Convenient Result alias for player operations.
pub type PlayerResult<T> = Result<T, PlayerError>;

// ─────────────────────────────────────────────────────────────────────────────
// Domain Types
// ─────────────────────────────────────────────────────────────────────────────

/// Last observed reachability of the player.
///
/// This is the outcome of the most recent handshake, not a live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PlayerConnectivity {
    /// No handshake attempted yet.
    #[default]
    Offline,
    /// Last handshake was accepted.
    Online,
    /// Last attempt could not reach the player.
    ConnectionError,
    /// Last attempt reached the player but the handshake was refused.
    LoginError,
}

impl PlayerConnectivity {
    /// Maps the outcome of a player exchange to the connectivity it implies.
    ///
    /// A parse anomaly still means the handshake succeeded.
    #[must_use]
    pub fn from_outcome<T>(outcome: &PlayerResult<T>) -> Self {
        match outcome {
            Ok(_) | Err(PlayerError::ParseAnomaly(_)) => Self::Online,
            Err(PlayerError::ConnectionFailed(_)) => Self::ConnectionError,
            Err(PlayerError::LoginRejected(_)) => Self::LoginError,
        }
    }
}

impl std::fmt::Display for PlayerConnectivity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Offline => "Offline",
            Self::Online => "Online",
            Self::ConnectionError => "Connection Error",
            Self::LoginError => "Login Error",
        };
        f.write_str(label)
    }
}

/// Which configured list the session last switched the player to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PlayingRole {
    /// The active (presence) list.
    Active,
    /// The idle (no presence) list.
    Idle,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connectivity_follows_outcome() {
        let ok: PlayerResult<()> = Ok(());
        assert_eq!(PlayerConnectivity::from_outcome(&ok), PlayerConnectivity::Online);

        let anomaly: PlayerResult<()> = Err(PlayerError::ParseAnomaly("empty".into()));
        assert_eq!(
            PlayerConnectivity::from_outcome(&anomaly),
            PlayerConnectivity::Online
        );

        let refused: PlayerResult<()> = Err(PlayerError::ConnectionFailed("refused".into()));
        assert_eq!(
            PlayerConnectivity::from_outcome(&refused),
            PlayerConnectivity::ConnectionError
        );

        let rejected: PlayerResult<()> = Err(PlayerError::LoginRejected("ERR".into()));
        assert_eq!(
            PlayerConnectivity::from_outcome(&rejected),
            PlayerConnectivity::LoginError
        );
    }

    #[test]
    fn connectivity_displays_status_labels() {
        assert_eq!(PlayerConnectivity::default().to_string(), "Offline");
        assert_eq!(
            PlayerConnectivity::ConnectionError.to_string(),
            "Connection Error"
        );
    }
}

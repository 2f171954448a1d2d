//! Trait abstraction for the player transport.
//!
//! `PlayerSession` depends on this trait rather than on [`PlayerClient`] so
//! tests can substitute a scripted transport.
//!
//! [`PlayerClient`]: super::PlayerClient

use async_trait::async_trait;

use super::PlayerResult;

/// Sends one command to a player over a fresh connection.
#[async_trait]
pub trait PlayerTransport: Send + Sync {
    /// Connects, performs the `LOGIN` handshake, sends `command` and
    /// optionally drains the response.
    ///
    /// # Arguments
    /// * `address` - Player IP address or hostname
    /// * `port` - Control port (8900 on real players)
    /// * `command` - Wire command including its CRLF; empty sends nothing after login
    /// * `read_response` - Whether to drain and return the reply lines
    ///
    /// # Returns
    /// `Some(lines)` when `read_response` is set, `None` otherwise.
    async fn send_command(
        &self,
        address: &str,
        port: u16,
        command: &str,
        read_response: bool,
    ) -> PlayerResult<Option<Vec<String>>>;
}

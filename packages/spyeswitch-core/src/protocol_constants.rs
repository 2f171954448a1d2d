//! Fixed protocol constants that should NOT be changed.
//!
//! These values are defined by the Spyeworks player's control protocol and
//! changing them would break compatibility with the device.

use std::time::Duration;

// ─────────────────────────────────────────────────────────────────────────────
// Spyeworks Control Protocol
// ─────────────────────────────────────────────────────────────────────────────

/// TCP port the player listens on for control connections.
pub const PLAYER_PORT: u16 = 8900;

/// Handshake token sent immediately after connecting.
pub const LOGIN_TOKEN: &str = "LOGIN\r\n";

/// Prefix the player's handshake reply must start with to be accepted.
pub const LOGIN_OK_PREFIX: &str = "OK";

/// Line terminator used in both directions.
pub const LINE_TERMINATOR: &str = "\r\n";

/// Command: report the currently playing list.
pub const CMD_CURRENT_LIST: &str = "SCP";

/// Command: report every list stored on the player.
pub const CMD_ALL_LISTS: &str = "DML";

/// Command prefix: switch to (and play) a list.
pub const CMD_SET_LIST: &str = "SPL";

/// File extension the player stores lists under.
pub const LIST_EXTENSION: &str = ".dml";

/// Characters trimmed from the end of each `SCP` response line.
///
/// Undocumented by the vendor. Preserved exactly as observed.
pub const CURRENT_LIST_SUFFIX_LEN: usize = 4;

/// Characters trimmed from the end of each `DML` response line.
///
/// Undocumented by the vendor. Preserved exactly as observed.
pub const ALL_LISTS_SUFFIX_LEN: usize = 12;

// ─────────────────────────────────────────────────────────────────────────────
// Socket Timing
// ─────────────────────────────────────────────────────────────────────────────

/// Timeout for establishing the TCP connection and for the handshake reply.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum bytes read for the handshake reply.
pub const LOGIN_REPLY_MAX_BYTES: usize = 1024;

/// Read chunk size used while draining a command response.
pub const DRAIN_CHUNK_BYTES: usize = 8192;

/// Default quiet window for the timed drain.
///
/// The player never signals the end of a response; silence for this long
/// after data has arrived ends the read. Total drain time is capped at twice
/// this value.
pub const DEFAULT_DRAIN_QUIET: Duration = Duration::from_millis(500);

/// Lower bound accepted for the drain quiet window.
pub const MIN_DRAIN_QUIET: Duration = Duration::from_millis(250);

/// Upper bound accepted for the drain quiet window.
pub const MAX_DRAIN_QUIET: Duration = Duration::from_millis(500);

// ─────────────────────────────────────────────────────────────────────────────
// Internal Channels
// ─────────────────────────────────────────────────────────────────────────────

/// Capacity of the event broadcast channel for status observers.
pub const EVENT_CHANNEL_CAPACITY: usize = 100;

/// Capacity of the sensor state broadcast channel.
pub const SENSOR_CHANNEL_CAPACITY: usize = 32;

/// Capacity of the raw level channel between a level source and the watcher.
pub const LEVEL_CHANNEL_CAPACITY: usize = 64;

/// How long shutdown waits for background tasks, covering one in-flight
/// player command (connect timeout plus a capped drain).
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(7);

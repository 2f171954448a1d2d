//! Event system for observers of the switcher.
//!
//! This module provides:
//! - [`EventEmitter`] trait for domain services to emit events
//! - [`BroadcastEventBridge`] for fan-out to in-process subscribers
//! - Event types for each domain (player, sensor, controller)

mod bridge;
mod emitter;

pub use bridge::BroadcastEventBridge;
pub use emitter::{EventEmitter, LoggingEventEmitter, NoopEventEmitter};

use serde::Serialize;

use crate::player::PlayerConnectivity;
use crate::sensor::SensorState;
use crate::services::TimerKind;

/// Events broadcast to subscribers.
///
/// Each category has its own inner event type with specific variants.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "category", rename_all = "camelCase")]
pub enum BroadcastEvent {
    /// Events from the player session.
    Player(PlayerEvent),

    /// Events from the sensor watcher.
    Sensor(SensorEvent),

    /// Events from the controller's timers.
    Controller(ControllerEvent),
}

/// Events describing what the session learned about the player.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PlayerEvent {
    /// A command completed and connectivity was updated.
    ///
    /// Emitted after every attempt, including repeats of the same value.
    ConnectivityChanged {
        /// Connectivity implied by the attempt.
        connectivity: PlayerConnectivity,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// The list believed to be playing changed.
    CurrentListChanged {
        /// List name without path or extension.
        list: String,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// The player reported its stored lists.
    AllListsChanged {
        /// List names without path or extension.
        lists: Vec<String>,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
}

/// Events from the sensor watcher.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SensorEvent {
    /// The published sensor state changed.
    StateChanged {
        /// New state.
        state: SensorState,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
}

/// Events describing controller timer activity.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ControllerEvent {
    /// A delay timer was armed or restarted.
    TimerArmed {
        /// Which timer.
        timer: TimerKind,
        /// Delay in seconds.
        #[serde(rename = "delaySecs")]
        delay_secs: u32,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// A pending timer was cancelled before firing.
    TimerCancelled {
        /// Which timer.
        timer: TimerKind,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// A timer fired and its action ran.
    TimerFired {
        /// Which timer.
        timer: TimerKind,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
}

impl From<PlayerEvent> for BroadcastEvent {
    fn from(event: PlayerEvent) -> Self {
        BroadcastEvent::Player(event)
    }
}

impl From<SensorEvent> for BroadcastEvent {
    fn from(event: SensorEvent) -> Self {
        BroadcastEvent::Sensor(event)
    }
}

impl From<ControllerEvent> for BroadcastEvent {
    fn from(event: ControllerEvent) -> Self {
        BroadcastEvent::Controller(event)
    }
}

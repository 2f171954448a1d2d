//! Spyeswitch Core - motion sensor driven playlist switching.
//!
//! This crate watches a motion sensor and switches a Spyeworks digital
//! signage player between an "active" playlist (someone is present) and an
//! "idle" playlist (nobody is present), with configurable delays on each
//! transition.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`player`]: Spyeworks control protocol client and session state
//! - [`sensor`]: Level sources and the sensor state watcher
//! - [`timer`]: Cancellable one-shot delay timer
//! - [`services`]: Controller state machine and the serial player queue
//! - [`config`]: Configuration snapshot, validation and persistence
//! - [`events`]: Event system for status observers
//! - [`runtime`]: Task spawning abstraction
//! - [`error`]: Centralized error types
//!
//! # Abstraction Traits
//!
//! - [`PlayerTransport`](player::PlayerTransport): Sending commands to a player
//! - [`LevelSource`](sensor::LevelSource): Reading a GPIO-style input line
//! - [`ConfigStore`](config::ConfigStore): Loading and saving settings
//! - [`EventEmitter`](events::EventEmitter): Emitting domain events
//! - [`TaskSpawner`](runtime::TaskSpawner): Spawning background tasks

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod events;
pub mod player;
pub mod protocol_constants;
pub mod runtime;
pub mod sensor;
pub mod services;
pub mod timer;
pub mod utils;

// Re-export commonly used types at the crate root
pub use config::{Config, ConfigError, ConfigStore, FileConfigStore, RuntimeConfig};
pub use error::{ErrorCode, SwitchError, SwitchResult};
pub use events::{
    BroadcastEvent, BroadcastEventBridge, ControllerEvent, EventEmitter, LoggingEventEmitter,
    NoopEventEmitter, PlayerEvent, SensorEvent,
};
pub use player::{
    PlayerClient, PlayerConnectivity, PlayerError, PlayerSession, PlayerSettings,
    PlayerTransport, PlayingRole,
};
pub use runtime::{TaskSpawner, TokioSpawner};
pub use sensor::{
    ChannelLevelSource, LevelSender, LevelSource, SensorError, SensorSettings, SensorState,
    SensorWatcher, SysfsLevelSource,
};
pub use services::{
    Controller, ControllerHandle, ControllerStatus, PlayerJob, PlayerQueue, TimerKind,
};
pub use timer::{DelayTimer, TimerToken};
pub use utils::now_millis;

// Re-export bootstrap types
pub use bootstrap::{bootstrap_services, bootstrap_services_with_transport, BootstrappedServices};

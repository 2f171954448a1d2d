//! Long-running services.
//!
//! - `controller` - [`Controller`] actor applying the switching rules
//! - `player_worker` - serial queue running player commands off the event path

pub mod controller;
pub mod player_worker;

pub use controller::{Controller, ControllerHandle, ControllerStatus, TimerKind};
pub use player_worker::{spawn_player_worker, PlayerJob, PlayerQueue};

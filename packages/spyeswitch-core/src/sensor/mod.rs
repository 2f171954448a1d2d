//! Motion sensor input.
//!
//! # Module Structure
//!
//! - `sysfs` - [`SysfsLevelSource`], Linux GPIO lines read through `/sys/class/gpio`
//!
//! A [`LevelSource`] delivers raw electrical levels on every edge. The
//! [`SensorWatcher`] maps them to [`SensorState`] and publishes a state only
//! when it differs from the last one published.

pub mod sysfs;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use crate::events::{EventEmitter, SensorEvent};
use crate::protocol_constants::{LEVEL_CHANNEL_CAPACITY, SENSOR_CHANNEL_CAPACITY};
use crate::runtime::{TaskSpawner, TokioSpawner};
use crate::utils::now_millis;

pub use sysfs::SysfsLevelSource;

// ─────────────────────────────────────────────────────────────────────────────
// Error Types
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that can occur while reading the sensor.
#[derive(Debug, Error)]
pub enum SensorError {
    /// Reading or writing a GPIO control file failed.
    #[error("GPIO I/O on {path}: {source}")]
    Io {
        /// File that was accessed.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The line value file held something other than `0` or `1`.
    #[error("Unexpected GPIO value: {0:?}")]
    InvalidLevel(String),

    /// The level stream can only be taken once.
    #[error("Level source already subscribed")]
    AlreadySubscribed,
}

/// Convenient Result alias for sensor operations.
pub type SensorResult<T> = Result<T, SensorError>;

// ─────────────────────────────────────────────────────────────────────────────
// Domain Types
// ─────────────────────────────────────────────────────────────────────────────

/// Presence as reported by the motion sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SensorState {
    /// Motion detected.
    On,
    /// No motion.
    #[default]
    Off,
}

impl SensorState {
    /// Maps an electrical level to a state.
    ///
    /// High means `On` unless the line is wired active-low.
    #[must_use]
    pub fn from_level(level: bool, active_low: bool) -> Self {
        if level != active_low {
            Self::On
        } else {
            Self::Off
        }
    }
}

impl std::fmt::Display for SensorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::On => f.write_str("On"),
            Self::Off => f.write_str("Off"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Level Sources
// ─────────────────────────────────────────────────────────────────────────────

/// Source of raw boolean levels for one input line.
#[async_trait]
pub trait LevelSource: Send + Sync {
    /// Reads the current level of the line.
    async fn read_level(&self) -> SensorResult<bool>;

    /// Starts delivering the new level on every rising and falling edge.
    ///
    /// Delivery stops when `cancel` fires or the source goes away.
    async fn subscribe(&self, cancel: CancellationToken) -> SensorResult<mpsc::Receiver<bool>>;

    /// Waits for background work started by `subscribe` to finish after
    /// cancellation.
    async fn stopped(&self) {}
}

/// In-process level source driven through a [`LevelSender`].
///
/// Used by tests and by the server's stdin simulator.
pub struct ChannelLevelSource {
    level: Arc<AtomicBool>,
    rx: Mutex<Option<mpsc::Receiver<bool>>>,
}

/// Sending half of a [`ChannelLevelSource`].
#[derive(Clone)]
pub struct LevelSender {
    level: Arc<AtomicBool>,
    tx: mpsc::Sender<bool>,
}

impl ChannelLevelSource {
    /// Creates a source whose line starts at `initial`.
    pub fn new(initial: bool) -> (Self, LevelSender) {
        let level = Arc::new(AtomicBool::new(initial));
        let (tx, rx) = mpsc::channel(LEVEL_CHANNEL_CAPACITY);
        let source = Self {
            level: Arc::clone(&level),
            rx: Mutex::new(Some(rx)),
        };
        (source, LevelSender { level, tx })
    }
}

impl LevelSender {
    /// Drives the line to `level`. Setting the level it already has is not
    /// an edge and delivers nothing.
    ///
    /// Returns `false` once the watcher has gone away.
    pub async fn set(&self, level: bool) -> bool {
        if self.level.swap(level, Ordering::SeqCst) == level {
            return true;
        }
        self.tx.send(level).await.is_ok()
    }

    /// Delivers `level` even if it matches the current level, like a glitch
    /// on a real line.
    #[cfg(test)]
    pub(crate) async fn pulse(&self, level: bool) -> bool {
        self.level.store(level, Ordering::SeqCst);
        self.tx.send(level).await.is_ok()
    }
}

#[async_trait]
impl LevelSource for ChannelLevelSource {
    async fn read_level(&self) -> SensorResult<bool> {
        Ok(self.level.load(Ordering::SeqCst))
    }

    async fn subscribe(&self, _cancel: CancellationToken) -> SensorResult<mpsc::Receiver<bool>> {
        self.rx.lock().take().ok_or(SensorError::AlreadySubscribed)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Watcher
// ─────────────────────────────────────────────────────────────────────────────

/// How raw levels are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorSettings {
    /// Treat a low line as motion.
    pub active_low: bool,
    /// A change must hold this long before it is published.
    pub settle: Option<Duration>,
    /// Read the line once on start and publish it unconditionally.
    pub sync_on_start: bool,
}

impl Default for SensorSettings {
    fn default() -> Self {
        Self {
            active_low: false,
            settle: None,
            sync_on_start: true,
        }
    }
}

/// Turns raw levels into published [`SensorState`] changes.
pub struct SensorWatcher {
    source: Arc<dyn LevelSource>,
    settings: SensorSettings,
    tx: broadcast::Sender<SensorState>,
    published: RwLock<SensorState>,
    emitter: Arc<dyn EventEmitter>,
}

impl SensorWatcher {
    /// Creates a watcher. The published state starts as [`SensorState::Off`].
    pub fn new(
        source: Arc<dyn LevelSource>,
        settings: SensorSettings,
        emitter: Arc<dyn EventEmitter>,
    ) -> Self {
        let (tx, _) = broadcast::channel(SENSOR_CHANNEL_CAPACITY);
        Self {
            source,
            settings,
            tx,
            published: RwLock::new(SensorState::Off),
            emitter,
        }
    }

    /// Subscribes to published state changes.
    pub fn subscribe(&self) -> broadcast::Receiver<SensorState> {
        self.tx.subscribe()
    }

    /// Returns the last published state.
    pub fn state(&self) -> SensorState {
        *self.published.read()
    }

    /// Subscribes to the level source and spawns the watch loop.
    ///
    /// # Errors
    ///
    /// Returns an error if the level source cannot be subscribed.
    pub async fn start(
        self: &Arc<Self>,
        spawner: &TokioSpawner,
        cancel: CancellationToken,
    ) -> SensorResult<JoinHandle<()>> {
        let levels = self.source.subscribe(cancel.child_token()).await?;
        let watcher = Arc::clone(self);
        Ok(spawner.spawn(async move { watcher.run(levels, cancel).await }))
    }

    async fn run(&self, mut levels: mpsc::Receiver<bool>, cancel: CancellationToken) {
        if self.settings.sync_on_start {
            match self.source.read_level().await {
                Ok(level) => {
                    let state = SensorState::from_level(level, self.settings.active_low);
                    log::info!("[Sensor] Initial state is {}", state);
                    self.publish(state);
                }
                Err(e) => log::warn!("[Sensor] Could not read initial level: {}", e),
            }
        }

        // State waiting out the settle interval, with its deadline.
        let mut candidate: Option<(SensorState, Instant)> = None;

        loop {
            let settle_deadline = candidate.map(|(_, at)| at).unwrap_or_else(Instant::now);

            tokio::select! {
                _ = cancel.cancelled() => {
                    log::debug!("[Sensor] Watcher stopped");
                    break;
                }
                level = levels.recv() => {
                    let Some(level) = level else {
                        log::warn!("[Sensor] Level source closed");
                        break;
                    };
                    let state = SensorState::from_level(level, self.settings.active_low);
                    log::trace!("[Sensor] Raw level {} -> {}", level, state);

                    if state == self.state() {
                        if candidate.take().is_some() {
                            log::debug!("[Sensor] Glitch back to {} ignored", state);
                        }
                        continue;
                    }

                    match self.settings.settle {
                        Some(settle) if !settle.is_zero() => {
                            if candidate.map(|(s, _)| s) != Some(state) {
                                candidate = Some((state, Instant::now() + settle));
                            }
                        }
                        _ => self.publish(state),
                    }
                }
                _ = sleep_until(settle_deadline), if candidate.is_some() => {
                    if let Some((state, _)) = candidate.take() {
                        self.publish(state);
                    }
                }
            }
        }

        self.source.stopped().await;
    }

    fn publish(&self, state: SensorState) {
        *self.published.write() = state;
        log::info!("[Sensor] Motion sensor {}", state);

        if let Err(e) = self.tx.send(state) {
            log::trace!("[Sensor] No state subscribers: {}", e);
        }
        self.emitter.emit_sensor(SensorEvent::StateChanged {
            state,
            timestamp: now_millis(),
        });
    }
}

//! GPIO input through the Linux sysfs interface.
//!
//! The line is exported and set to `in`, then its `value` file is polled.
//! Pull-down bias is not settable through sysfs and must come from the board
//! configuration (device tree overlay or `config.txt` on a Raspberry Pi).

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::{LevelSource, SensorError, SensorResult};
use crate::protocol_constants::LEVEL_CHANNEL_CAPACITY;
use crate::runtime::{TaskSpawner, TokioSpawner};

/// Default sysfs GPIO root.
pub const DEFAULT_GPIO_ROOT: &str = "/sys/class/gpio";

/// Polled sysfs GPIO input line.
///
/// `line` is the sysfs number, which on newer kernels is the chip base plus
/// the pin offset (BCM 14 is 526 on a Raspberry Pi running 6.6 or later).
#[derive(Debug)]
pub struct SysfsLevelSource {
    root: PathBuf,
    line: u32,
    poll_interval: Duration,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl SysfsLevelSource {
    /// Creates a source for `line` under `root`.
    pub fn new(root: impl Into<PathBuf>, line: u32, poll_interval: Duration) -> Self {
        Self {
            root: root.into(),
            line,
            poll_interval,
            poller: Mutex::new(None),
        }
    }

    fn line_dir(&self) -> PathBuf {
        self.root.join(format!("gpio{}", self.line))
    }

    fn value_path(&self) -> PathBuf {
        self.line_dir().join("value")
    }

    /// Exports the line if needed and configures it as an input.
    ///
    /// # Errors
    ///
    /// Returns [`SensorError::Io`] if a control file cannot be written.
    pub async fn export(&self) -> SensorResult<()> {
        if !tokio::fs::try_exists(self.line_dir()).await.unwrap_or(false) {
            write_control(&self.root.join("export"), &self.line.to_string()).await?;
            log::info!("[Sensor] Exported GPIO line {}", self.line);
        }
        write_control(&self.line_dir().join("direction"), "in").await
    }
}

async fn write_control(path: &Path, value: &str) -> SensorResult<()> {
    tokio::fs::write(path, value)
        .await
        .map_err(|source| SensorError::Io {
            path: path.display().to_string(),
            source,
        })
}

async fn read_value(path: &Path) -> SensorResult<bool> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| SensorError::Io {
            path: path.display().to_string(),
            source,
        })?;
    match raw.trim() {
        "1" => Ok(true),
        "0" => Ok(false),
        other => Err(SensorError::InvalidLevel(other.to_string())),
    }
}

#[async_trait]
impl LevelSource for SysfsLevelSource {
    async fn read_level(&self) -> SensorResult<bool> {
        read_value(&self.value_path()).await
    }

    async fn subscribe(&self, cancel: CancellationToken) -> SensorResult<mpsc::Receiver<bool>> {
        self.export().await?;
        let mut last = self.read_level().await?;

        let (tx, rx) = mpsc::channel(LEVEL_CHANNEL_CAPACITY);
        let path = self.value_path();
        let line = self.line;
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        log::info!(
            "[Sensor] Polling GPIO line {} every {:?}",
            line,
            self.poll_interval
        );

        let task = TokioSpawner::current().spawn(async move {
            let mut failing = false;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tx.closed() => break,
                    _ = ticker.tick() => {}
                }

                match read_value(&path).await {
                    Ok(level) => {
                        if failing {
                            log::info!("[Sensor] GPIO line {} readable again", line);
                            failing = false;
                        }
                        if level != last {
                            last = level;
                            if tx.send(level).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(e) if !failing => {
                        log::warn!("[Sensor] GPIO line {} read failed: {}", line, e);
                        failing = true;
                    }
                    Err(_) => {}
                }
            }
            log::debug!("[Sensor] Stopped polling GPIO line {}", line);
        });
        if let Some(previous) = self.poller.lock().replace(task) {
            previous.abort();
        }

        Ok(rx)
    }

    async fn stopped(&self) {
        let task = self.poller.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                if e.is_panic() {
                    log::error!("[Sensor] GPIO poller panicked: {}", e);
                }
            }
        }
    }
}

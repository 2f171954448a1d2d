//! Sensor-to-player state machine.
//!
//! The controller is an actor: one task owns the configuration snapshot, the
//! last sensor state, both delay timers and the deferred-idle flag, and
//! processes a single FIFO mailbox of sensor notifications, timer fires,
//! reconfigurations and status queries. Nothing else touches that state, so
//! a sensor event and a timer fire can never interleave inside one decision.
//!
//! Player commands are handed to the [`PlayerQueue`] and never awaited here;
//! decisions run the same way whether or not the player is reachable.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::player_worker::{PlayerJob, PlayerQueue};
use crate::config::Config;
use crate::error::{SwitchError, SwitchResult};
use crate::events::{ControllerEvent, EventEmitter};
use crate::player::PlayerSettings;
use crate::runtime::{TaskSpawner, TokioSpawner};
use crate::sensor::SensorState;
use crate::timer::{DelayTimer, TimerToken};
use crate::utils::now_millis;

/// The controller's two delay timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TimerKind {
    /// Runs after the active list starts; holds back the idle list.
    Active,
    /// Switches to the idle list when it fires.
    Idle,
}

impl std::fmt::Display for TimerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => f.write_str("active"),
            Self::Idle => f.write_str("idle"),
        }
    }
}

/// Snapshot of the controller's state.
#[derive(Debug, Clone)]
pub struct ControllerStatus {
    pub sensor_state: SensorState,
    pub active_timer_armed: bool,
    pub idle_timer_armed: bool,
    pub pending_idle_after_active: bool,
    pub active_deadline: Option<Instant>,
    pub idle_deadline: Option<Instant>,
    pub config: Config,
}

enum ControllerMessage {
    Sensor(SensorState),
    TimerFired {
        timer: TimerKind,
        token: TimerToken,
    },
    Reconfigure(Config),
    Status(oneshot::Sender<ControllerStatus>),
}

/// Cloneable handle for talking to a running controller.
#[derive(Clone)]
pub struct ControllerHandle {
    tx: mpsc::UnboundedSender<ControllerMessage>,
}

impl ControllerHandle {
    fn send(&self, message: ControllerMessage) -> SwitchResult<()> {
        self.tx
            .send(message)
            .map_err(|_| SwitchError::Internal("controller stopped".into()))
    }

    /// Delivers a sensor state notification.
    ///
    /// # Errors
    ///
    /// Returns [`SwitchError::Internal`] if the controller has stopped.
    pub fn notify_sensor(&self, state: SensorState) -> SwitchResult<()> {
        self.send(ControllerMessage::Sensor(state))
    }

    /// Replaces the configuration snapshot.
    ///
    /// Timers belonging to features the new snapshot disables are cancelled
    /// before the next message is processed.
    ///
    /// # Errors
    ///
    /// Returns a config error if `config` fails validation, or
    /// [`SwitchError::Internal`] if the controller has stopped.
    pub fn reconfigure(&self, config: Config) -> SwitchResult<()> {
        config.validate()?;
        self.send(ControllerMessage::Reconfigure(config))
    }

    /// Returns a snapshot taken after every previously sent message was handled.
    ///
    /// # Errors
    ///
    /// Returns [`SwitchError::Internal`] if the controller has stopped.
    pub async fn status(&self) -> SwitchResult<ControllerStatus> {
        let (reply, rx) = oneshot::channel();
        self.send(ControllerMessage::Status(reply))?;
        rx.await
            .map_err(|_| SwitchError::Internal("controller stopped".into()))
    }

    /// Forwards published sensor states into the mailbox until cancelled.
    pub fn follow_sensor(
        &self,
        mut states: broadcast::Receiver<SensorState>,
        spawner: &TokioSpawner,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let handle = self.clone();
        spawner.spawn(async move {
            loop {
                let state = tokio::select! {
                    _ = cancel.cancelled() => break,
                    state = states.recv() => state,
                };
                match state {
                    Ok(state) => {
                        if handle.notify_sensor(state).is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        log::warn!("[Controller] Missed {} sensor update(s)", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

/// Owner of all switching state. Runs inside its own task.
pub struct Controller {
    config: Config,
    sensor_state: SensorState,
    active_timer: DelayTimer,
    idle_timer: DelayTimer,
    pending_idle_after_active: bool,
    player: PlayerQueue,
    mailbox: mpsc::WeakUnboundedSender<ControllerMessage>,
    emitter: Arc<dyn EventEmitter>,
}

impl Controller {
    /// Spawns the controller task.
    ///
    /// The sensor state starts as [`SensorState::Off`] and no timer is armed.
    pub fn spawn(
        config: Config,
        player: PlayerQueue,
        emitter: Arc<dyn EventEmitter>,
        spawner: &TokioSpawner,
        cancel: CancellationToken,
    ) -> (ControllerHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let controller = Self {
            config,
            sensor_state: SensorState::Off,
            active_timer: DelayTimer::new("active", spawner.clone()),
            idle_timer: DelayTimer::new("idle", spawner.clone()),
            pending_idle_after_active: false,
            player,
            mailbox: tx.downgrade(),
            emitter,
        };
        let task = spawner.spawn(controller.run(rx, cancel));
        (ControllerHandle { tx }, task)
    }

    async fn run(
        mut self,
        mut rx: mpsc::UnboundedReceiver<ControllerMessage>,
        cancel: CancellationToken,
    ) {
        log::info!(
            "[Controller] Started (sensor {}, active list {}, idle list {})",
            enabled(self.config.sensor_enabled),
            enabled(self.config.active_list_enabled),
            enabled(self.config.idle_list_enabled)
        );

        loop {
            let message = tokio::select! {
                _ = cancel.cancelled() => break,
                message = rx.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };

            match message {
                ControllerMessage::Sensor(state) => self.on_sensor(state),
                ControllerMessage::TimerFired { timer, token } => self.on_timer_fired(timer, token),
                ControllerMessage::Reconfigure(config) => self.on_reconfigure(config),
                ControllerMessage::Status(reply) => {
                    let _ = reply.send(self.status());
                }
            }
        }

        self.active_timer.cancel();
        self.idle_timer.cancel();
        log::info!("[Controller] Stopped");
    }

    fn status(&self) -> ControllerStatus {
        ControllerStatus {
            sensor_state: self.sensor_state,
            active_timer_armed: self.active_timer.is_armed(),
            idle_timer_armed: self.idle_timer.is_armed(),
            pending_idle_after_active: self.pending_idle_after_active,
            active_deadline: self.active_timer.deadline(),
            idle_deadline: self.idle_timer.deadline(),
            config: self.config.clone(),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Sensor Rules
    // ─────────────────────────────────────────────────────────────────────────

    fn on_sensor(&mut self, state: SensorState) {
        self.sensor_state = state;

        if !self.config.sensor_enabled {
            log::debug!("[Controller] Sensor {} ignored, sensor disabled", state);
            return;
        }

        match state {
            SensorState::On => self.on_presence(),
            SensorState::Off => self.on_absence(),
        }
    }

    fn on_presence(&mut self) {
        self.cancel_timer(TimerKind::Idle);

        if self.config.active_list_enabled && self.active_timer.is_armed() {
            log::debug!("[Controller] Presence continues, restarting active timer");
        } else {
            log::info!("[Controller] Presence detected, playing active list");
            self.player.submit(PlayerJob::PlayActive);
        }
        self.arm_timer(TimerKind::Active);
    }

    fn on_absence(&mut self) {
        if !self.config.idle_list_enabled {
            log::debug!("[Controller] Absence ignored, idle list disabled");
            return;
        }

        self.cancel_timer(TimerKind::Idle);

        if self.active_timer.is_armed() && self.config.active_list_enabled {
            log::debug!("[Controller] Absence during active timer, idle deferred");
            self.pending_idle_after_active = true;
        } else {
            self.arm_timer(TimerKind::Idle);
        }
    }

    fn on_timer_fired(&mut self, timer: TimerKind, token: TimerToken) {
        let claimed = match timer {
            TimerKind::Active => self.active_timer.claim(token),
            TimerKind::Idle => self.idle_timer.claim(token),
        };
        if !claimed {
            log::trace!("[Controller] Stale {} timer fire ignored", timer);
            return;
        }

        log::debug!("[Controller] {} timer fired", timer);
        self.emitter.emit_controller(ControllerEvent::TimerFired {
            timer,
            timestamp: now_millis(),
        });

        match timer {
            TimerKind::Active => {
                let pending = std::mem::take(&mut self.pending_idle_after_active);
                if pending
                    && self.sensor_state == SensorState::Off
                    && self.config.idle_list_enabled
                {
                    self.arm_timer(TimerKind::Idle);
                }
            }
            TimerKind::Idle => {
                log::info!("[Controller] Idle delay elapsed, playing idle list");
                self.player.submit(PlayerJob::PlayIdle);
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reconfiguration
    // ─────────────────────────────────────────────────────────────────────────

    fn on_reconfigure(&mut self, config: Config) {
        let previous = std::mem::replace(&mut self.config, config);

        if previous.player_settings_differ(&self.config) {
            self.player
                .submit(PlayerJob::UpdateSettings(PlayerSettings::from(&self.config)));
        }

        if !self.config.sensor_enabled {
            if previous.sensor_enabled {
                log::info!("[Controller] Sensor disabled");
            }
            self.cancel_timer(TimerKind::Active);
            self.cancel_timer(TimerKind::Idle);
            self.pending_idle_after_active = false;
            return;
        }

        if !self.config.active_list_enabled {
            let pending = std::mem::take(&mut self.pending_idle_after_active);
            self.cancel_timer(TimerKind::Active);
            // The deferred idle no longer has an active timer to wait for.
            if pending
                && self.sensor_state == SensorState::Off
                && self.config.idle_list_enabled
            {
                self.arm_timer(TimerKind::Idle);
            }
        }

        if !self.config.idle_list_enabled {
            self.cancel_timer(TimerKind::Idle);
            self.pending_idle_after_active = false;
        }

        log::info!(
            "[Controller] Reconfigured (sensor {}, active list {} {}s, idle list {} {}s)",
            enabled(self.config.sensor_enabled),
            enabled(self.config.active_list_enabled),
            self.config.active_delay_secs,
            enabled(self.config.idle_list_enabled),
            self.config.idle_delay_secs
        );
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Timers
    // ─────────────────────────────────────────────────────────────────────────

    fn arm_timer(&mut self, timer: TimerKind) {
        let (delay_secs, delay): (u32, Duration) = match timer {
            TimerKind::Active => (self.config.active_delay_secs, self.config.active_delay()),
            TimerKind::Idle => (self.config.idle_delay_secs, self.config.idle_delay()),
        };

        let mailbox = self.mailbox.clone();
        let action = move |token| {
            if let Some(tx) = mailbox.upgrade() {
                let _ = tx.send(ControllerMessage::TimerFired { timer, token });
            }
        };

        match timer {
            TimerKind::Active => self.active_timer.arm(delay, action),
            TimerKind::Idle => self.idle_timer.arm(delay, action),
        };

        self.emitter.emit_controller(ControllerEvent::TimerArmed {
            timer,
            delay_secs,
            timestamp: now_millis(),
        });
    }

    fn cancel_timer(&mut self, timer: TimerKind) {
        let cancelled = match timer {
            TimerKind::Active => self.active_timer.cancel(),
            TimerKind::Idle => self.idle_timer.cancel(),
        };
        if cancelled {
            log::debug!("[Controller] {} timer cancelled", timer);
            self.emitter.emit_controller(ControllerEvent::TimerCancelled {
                timer,
                timestamp: now_millis(),
            });
        }
    }
}

fn enabled(flag: bool) -> &'static str {
    if flag {
        "on"
    } else {
        "off"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NoopEventEmitter;
    use tokio::sync::mpsc::error::TryRecvError;
    use tokio::time::sleep;

    struct Harness {
        handle: ControllerHandle,
        jobs: mpsc::UnboundedReceiver<PlayerJob>,
        _cancel: CancellationToken,
    }

    impl Harness {
        fn start(config: Config) -> Self {
            let (queue, jobs) = PlayerQueue::channel();
            let cancel = CancellationToken::new();
            let (handle, _task) = Controller::spawn(
                config,
                queue,
                Arc::new(NoopEventEmitter),
                &TokioSpawner::current(),
                cancel.clone(),
            );
            Self {
                handle,
                jobs,
                _cancel: cancel,
            }
        }

        async fn sensor(&self, state: SensorState) -> ControllerStatus {
            self.handle.notify_sensor(state).unwrap();
            self.status().await
        }

        async fn status(&self) -> ControllerStatus {
            self.handle.status().await.unwrap()
        }

        /// Lets simulated time pass, then waits for queued fires to be handled.
        async fn wait(&self, secs: u64) -> ControllerStatus {
            sleep(Duration::from_secs(secs)).await;
            self.status().await
        }

        fn drain_jobs(&mut self) -> Vec<PlayerJob> {
            let mut jobs = Vec::new();
            loop {
                match self.jobs.try_recv() {
                    Ok(job) => jobs.push(job),
                    Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
                }
            }
            jobs
        }
    }

    fn config(active_delay_secs: u32, idle_delay_secs: u32) -> Config {
        Config {
            active_delay_secs,
            idle_delay_secs,
            ..Config::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_sensor_never_arms_or_plays() {
        let mut h = Harness::start(Config {
            sensor_enabled: false,
            ..config(10, 5)
        });

        for state in [SensorState::On, SensorState::Off, SensorState::On, SensorState::Off] {
            let status = h.sensor(state).await;
            assert!(!status.active_timer_armed && !status.idle_timer_armed);
        }
        let status = h.wait(60).await;

        assert!(!status.active_timer_armed && !status.idle_timer_armed);
        assert_eq!(status.sensor_state, SensorState::Off, "state is still recorded");
        assert!(h.drain_jobs().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn presence_plays_active_once_and_arms_timer() {
        let mut h = Harness::start(config(10, 5));
        let before = Instant::now();

        let status = h.sensor(SensorState::On).await;

        assert_eq!(h.drain_jobs(), vec![PlayerJob::PlayActive]);
        assert!(status.active_timer_armed);
        assert_eq!(
            status.active_deadline.unwrap() - before,
            Duration::from_secs(10)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_presence_restarts_active_timer_without_replaying() {
        let mut h = Harness::start(config(10, 5));

        let first = h.sensor(SensorState::On).await.active_deadline.unwrap();
        sleep(Duration::from_secs(4)).await;
        let second = h.sensor(SensorState::On).await.active_deadline.unwrap();

        assert_eq!(second - first, Duration::from_secs(4));
        assert_eq!(h.drain_jobs(), vec![PlayerJob::PlayActive]);

        // The first deadline passes without the timer firing.
        let status = h.wait(8).await;
        assert!(status.active_timer_armed);
        let status = h.wait(3).await;
        assert!(!status.active_timer_armed);
    }

    #[tokio::test(start_paused = true)]
    async fn absence_arms_idle_timer_that_plays_idle_once() {
        let mut h = Harness::start(config(10, 5));

        let status = h.sensor(SensorState::Off).await;
        assert!(status.idle_timer_armed);
        assert!(!status.active_timer_armed);
        assert!(h.drain_jobs().is_empty());

        let status = h.wait(6).await;
        assert!(!status.idle_timer_armed);
        assert_eq!(h.drain_jobs(), vec![PlayerJob::PlayIdle]);

        h.wait(60).await;
        assert!(h.drain_jobs().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn idle_waits_for_active_timer() {
        let mut h = Harness::start(config(10, 5));

        h.sensor(SensorState::On).await;
        sleep(Duration::from_secs(2)).await;
        let status = h.sensor(SensorState::Off).await;
        assert!(status.pending_idle_after_active);
        assert!(!status.idle_timer_armed, "idle must not arm before active fires");

        let status = h.wait(7).await;
        assert!(!status.idle_timer_armed);

        let status = h.wait(2).await;
        assert!(!status.active_timer_armed);
        assert!(status.idle_timer_armed);
        assert!(!status.pending_idle_after_active);
        assert_eq!(h.drain_jobs(), vec![PlayerJob::PlayActive]);

        h.wait(6).await;
        assert_eq!(h.drain_jobs(), vec![PlayerJob::PlayIdle]);
    }

    #[tokio::test(start_paused = true)]
    async fn returning_presence_clears_deferred_idle() {
        let mut h = Harness::start(config(10, 5));

        h.sensor(SensorState::On).await;
        sleep(Duration::from_secs(1)).await;
        h.sensor(SensorState::Off).await;
        sleep(Duration::from_secs(1)).await;
        let status = h.sensor(SensorState::On).await;
        assert!(status.pending_idle_after_active);

        let status = h.wait(15).await;
        assert!(!status.pending_idle_after_active);
        assert!(!status.idle_timer_armed);
        assert!(!status.active_timer_armed);

        h.wait(60).await;
        assert_eq!(h.drain_jobs(), vec![PlayerJob::PlayActive]);
    }

    #[tokio::test(start_paused = true)]
    async fn presence_cancels_pending_idle() {
        let mut h = Harness::start(config(10, 5));

        h.sensor(SensorState::Off).await;
        sleep(Duration::from_secs(3)).await;
        let status = h.sensor(SensorState::On).await;
        assert!(!status.idle_timer_armed);

        h.wait(60).await;
        assert_eq!(h.drain_jobs(), vec![PlayerJob::PlayActive]);
    }

    #[tokio::test(start_paused = true)]
    async fn absence_with_idle_list_disabled_does_nothing() {
        let mut h = Harness::start(Config {
            idle_list_enabled: false,
            ..config(10, 5)
        });

        let status = h.sensor(SensorState::Off).await;

        assert!(!status.idle_timer_armed);
        assert!(h.drain_jobs().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn presence_plays_active_even_with_active_list_disabled() {
        let mut h = Harness::start(Config {
            active_list_enabled: false,
            ..config(10, 5)
        });

        h.sensor(SensorState::On).await;
        h.sensor(SensorState::On).await;

        assert_eq!(
            h.drain_jobs(),
            vec![PlayerJob::PlayActive, PlayerJob::PlayActive],
            "without the toggle a lingering presence replays the list"
        );

        // Absence does not wait on the active timer.
        let status = h.sensor(SensorState::Off).await;
        assert!(status.idle_timer_armed);
        assert!(!status.pending_idle_after_active);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_delays_still_order_active_before_idle() {
        let mut h = Harness::start(config(0, 0));

        h.sensor(SensorState::On).await;
        h.sensor(SensorState::Off).await;
        h.wait(1).await;

        assert_eq!(h.drain_jobs(), vec![PlayerJob::PlayActive, PlayerJob::PlayIdle]);
    }

    #[tokio::test(start_paused = true)]
    async fn disabling_sensor_cancels_timers_immediately() {
        let mut h = Harness::start(config(10, 5));
        h.sensor(SensorState::On).await;
        h.sensor(SensorState::Off).await;

        h.handle
            .reconfigure(Config {
                sensor_enabled: false,
                ..config(10, 5)
            })
            .unwrap();
        let status = h.status().await;

        assert!(!status.active_timer_armed && !status.idle_timer_armed);
        assert!(!status.pending_idle_after_active);
        h.wait(60).await;
        assert_eq!(h.drain_jobs(), vec![PlayerJob::PlayActive]);
    }

    #[tokio::test(start_paused = true)]
    async fn disabling_active_list_releases_deferred_idle() {
        let mut h = Harness::start(config(10, 5));
        h.sensor(SensorState::On).await;
        h.sensor(SensorState::Off).await;

        h.handle
            .reconfigure(Config {
                active_list_enabled: false,
                ..config(10, 5)
            })
            .unwrap();
        let status = h.status().await;

        assert!(!status.active_timer_armed);
        assert!(status.idle_timer_armed);
        assert!(!status.pending_idle_after_active);

        h.wait(6).await;
        assert_eq!(
            h.drain_jobs(),
            vec![PlayerJob::PlayActive, PlayerJob::PlayIdle]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn disabling_idle_list_cancels_idle_timer() {
        let mut h = Harness::start(config(10, 5));
        h.sensor(SensorState::Off).await;

        h.handle
            .reconfigure(Config {
                idle_list_enabled: false,
                ..config(10, 5)
            })
            .unwrap();
        let status = h.status().await;

        assert!(!status.idle_timer_armed);
        h.wait(60).await;
        assert!(h.drain_jobs().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn renamed_list_is_forwarded_to_player() {
        let mut h = Harness::start(config(10, 5));
        let renamed = Config {
            idle_list: "lobby".into(),
            ..config(10, 5)
        };

        h.handle.reconfigure(renamed.clone()).unwrap();
        let status = h.status().await;

        assert_eq!(status.config, renamed);
        assert_eq!(
            h.drain_jobs(),
            vec![PlayerJob::UpdateSettings(PlayerSettings::from(&renamed))]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn toggles_alone_do_not_touch_player_settings() {
        let mut h = Harness::start(config(10, 5));

        h.handle.reconfigure(config(30, 30)).unwrap();
        h.status().await;

        assert!(h.drain_jobs().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_config_is_rejected_by_handle() {
        let h = Harness::start(config(10, 5));
        let bad = Config {
            active_list: "../etc".into(),
            ..config(10, 5)
        };

        assert!(matches!(
            h.handle.reconfigure(bad),
            Err(SwitchError::Config(_))
        ));
        assert_eq!(h.status().await.config.active_list, "active");
    }

    #[tokio::test(start_paused = true)]
    async fn handle_reports_stopped_controller() {
        let h = Harness::start(config(10, 5));
        h._cancel.cancel();
        sleep(Duration::from_millis(1)).await;

        assert!(matches!(
            h.handle.notify_sensor(SensorState::On),
            Err(SwitchError::Internal(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn forwarder_delivers_broadcast_states() {
        let mut h = Harness::start(config(10, 5));
        let (tx, rx) = broadcast::channel(8);
        let _forwarder =
            h.handle
                .follow_sensor(rx, &TokioSpawner::current(), CancellationToken::new());

        tx.send(SensorState::On).unwrap();
        sleep(Duration::from_millis(1)).await;

        assert_eq!(h.status().await.sensor_state, SensorState::On);
        assert_eq!(h.drain_jobs(), vec![PlayerJob::PlayActive]);
    }
}

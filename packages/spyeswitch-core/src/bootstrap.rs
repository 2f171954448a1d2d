//! Application bootstrap and dependency wiring.
//!
//! This module contains the composition root - the single place where all
//! services are instantiated and wired together.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, RuntimeConfig};
use crate::error::SwitchResult;
use crate::events::{BroadcastEventBridge, EventEmitter};
use crate::player::{PlayerClient, PlayerSession, PlayerSettings, PlayerTransport};
use crate::protocol_constants::SHUTDOWN_GRACE;
use crate::runtime::TokioSpawner;
use crate::sensor::{LevelSource, SensorSettings, SensorWatcher};
use crate::services::{spawn_player_worker, Controller, ControllerHandle, PlayerQueue};

/// Container for all bootstrapped services.
#[derive(Clone)]
pub struct BootstrappedServices {
    /// Player state: connectivity and playlists.
    pub session: Arc<PlayerSession>,
    /// Queue of player commands, run one at a time.
    pub player: PlayerQueue,
    /// Handle to the switching state machine.
    pub controller: ControllerHandle,
    /// Motion sensor watcher.
    pub sensor: Arc<SensorWatcher>,
    /// Event bridge for status observers.
    pub event_bridge: Arc<BroadcastEventBridge>,
    /// Task spawner for background operations.
    pub spawner: TokioSpawner,
    /// Cancellation token for graceful shutdown.
    pub cancel_token: CancellationToken,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl BootstrappedServices {
    /// Initiates graceful shutdown of all services.
    ///
    /// A player command already in flight is allowed to finish.
    pub async fn shutdown(&self) {
        log::info!("[Bootstrap] Beginning graceful shutdown...");

        self.cancel_token.cancel();

        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        let count = tasks.len();
        let all = join_tasks(tasks);
        if tokio::time::timeout(SHUTDOWN_GRACE, all).await.is_err() {
            log::warn!(
                "[Bootstrap] Background tasks still running after {:?}",
                SHUTDOWN_GRACE
            );
        } else {
            log::debug!("[Bootstrap] {} background task(s) stopped", count);
        }

        log::info!("[Bootstrap] Shutdown complete");
    }
}

async fn join_tasks(tasks: Vec<JoinHandle<()>>) {
    for task in tasks {
        if let Err(e) = task.await {
            if e.is_panic() {
                log::error!("[Bootstrap] Background task panicked: {}", e);
            }
        }
    }
}

/// Bootstraps all services against a real player.
///
/// # Errors
///
/// Returns an error if `config` is invalid or the sensor cannot be subscribed.
pub async fn bootstrap_services(
    config: Config,
    runtime: &RuntimeConfig,
    level_source: Arc<dyn LevelSource>,
) -> SwitchResult<BootstrappedServices> {
    let transport = Arc::new(PlayerClient::new(runtime.clamped_drain_quiet()));
    bootstrap_services_with_transport(config, runtime, level_source, transport).await
}

/// Bootstraps all services with a caller-supplied player transport.
///
/// The wiring order matters:
///
/// 1. Shared infrastructure (spawner, event bridge, cancellation token)
/// 2. Player session and its worker queue
/// 3. Controller (depends on the queue)
/// 4. Sensor watcher, with the controller subscribed before the watcher
///    starts so the startup reading is not lost
///
/// # Errors
///
/// Returns an error if `config` is invalid or the sensor cannot be subscribed.
pub async fn bootstrap_services_with_transport(
    config: Config,
    runtime: &RuntimeConfig,
    level_source: Arc<dyn LevelSource>,
    transport: Arc<dyn PlayerTransport>,
) -> SwitchResult<BootstrappedServices> {
    config.validate()?;

    let spawner = TokioSpawner::current();
    let cancel_token = CancellationToken::new();
    let event_bridge = Arc::new(BroadcastEventBridge::new(runtime.event_channel_capacity));
    let emitter = Arc::clone(&event_bridge) as Arc<dyn EventEmitter>;
    let mut tasks = Vec::new();

    let session = Arc::new(PlayerSession::new(
        transport,
        PlayerSettings::from(&config),
        Arc::clone(&emitter),
    ));
    let (player, worker_task) =
        spawn_player_worker(Arc::clone(&session), &spawner, cancel_token.clone());
    tasks.push(worker_task);

    let (controller, controller_task) = Controller::spawn(
        config,
        player.clone(),
        Arc::clone(&emitter),
        &spawner,
        cancel_token.clone(),
    );
    tasks.push(controller_task);

    let sensor = Arc::new(SensorWatcher::new(
        level_source,
        SensorSettings {
            active_low: runtime.sensor_active_low,
            settle: runtime.sensor_settle,
            sync_on_start: runtime.sync_on_start,
        },
        Arc::clone(&emitter),
    ));
    tasks.push(controller.follow_sensor(sensor.subscribe(), &spawner, cancel_token.clone()));
    match sensor.start(&spawner, cancel_token.clone()).await {
        Ok(task) => tasks.push(task),
        Err(e) => {
            log::error!("[Bootstrap] Sensor failed to start: {}", e);
            cancel_token.cancel();
            return Err(e.into());
        }
    }

    log::info!("[Bootstrap] Services started");

    Ok(BootstrappedServices {
        session,
        player,
        controller,
        sensor,
        event_bridge,
        spawner,
        cancel_token,
        tasks: Arc::new(Mutex::new(tasks)),
    })
}

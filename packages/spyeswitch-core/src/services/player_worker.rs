//! Serial player command queue.
//!
//! The controller never waits on the network. It submits [`PlayerJob`]s to a
//! [`PlayerQueue`] and a single worker task runs them in order against the
//! [`PlayerSession`], so at most one player command is in flight. A job that
//! is already running is never interrupted; cancellation only stops the
//! worker from picking up the next one.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::player::{PlayerSession, PlayerSettings};
use crate::runtime::{TaskSpawner, TokioSpawner};

/// Work for the player worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerJob {
    /// Switch to the active list.
    PlayActive,
    /// Switch to the idle list.
    PlayIdle,
    /// Query the currently playing list.
    RefreshCurrentList,
    /// Query every stored list.
    RefreshAllLists,
    /// Use new connection or list settings for later jobs.
    UpdateSettings(PlayerSettings),
}

/// Sending side of the player queue.
#[derive(Debug, Clone)]
pub struct PlayerQueue {
    tx: mpsc::UnboundedSender<PlayerJob>,
}

impl PlayerQueue {
    /// Creates a queue and the receiver a worker drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<PlayerJob>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queues a job. Returns `false` if the worker has stopped.
    pub fn submit(&self, job: PlayerJob) -> bool {
        match self.tx.send(job) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("[PlayerWorker] Worker stopped, dropping {:?}", e.0);
                false
            }
        }
    }
}

/// Spawns the worker and returns its queue.
pub fn spawn_player_worker(
    session: Arc<PlayerSession>,
    spawner: &TokioSpawner,
    cancel: CancellationToken,
) -> (PlayerQueue, JoinHandle<()>) {
    let (queue, rx) = PlayerQueue::channel();
    let handle = spawner.spawn(run(session, rx, cancel));
    (queue, handle)
}

async fn run(
    session: Arc<PlayerSession>,
    mut rx: mpsc::UnboundedReceiver<PlayerJob>,
    cancel: CancellationToken,
) {
    loop {
        let job = tokio::select! {
            _ = cancel.cancelled() => break,
            job = rx.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };

        log::debug!("[PlayerWorker] Running {:?}", job);
        let connectivity = match job {
            PlayerJob::PlayActive => session.play_active().await,
            PlayerJob::PlayIdle => session.play_idle().await,
            PlayerJob::RefreshCurrentList => session.refresh_current_list().await,
            PlayerJob::RefreshAllLists => session.refresh_all_lists().await,
            PlayerJob::UpdateSettings(settings) => {
                session.update_settings(settings);
                continue;
            }
        };
        log::debug!("[PlayerWorker] Player is {}", connectivity);
    }

    log::debug!("[PlayerWorker] Stopped");
}

//! Cancellable, restartable one-shot delay timer.
//!
//! A [`DelayTimer`] owns at most one pending schedule. Arming spawns a sleep
//! task that runs the action once the deadline passes; re-arming or
//! cancelling aborts that task first, so two schedules from the same timer
//! are never pending together.
//!
//! The action usually just posts a message back to the owner. The schedule
//! stays armed until the owner [claims](DelayTimer::claim) the fire with the
//! token it was handed, which lets an owner that processes messages in order
//! discard fires that raced with a cancel or re-arm.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

use crate::runtime::{TaskSpawner, TokioSpawner};

/// Identifies one schedule of a [`DelayTimer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken(u64);

struct Pending {
    token: TimerToken,
    deadline: Instant,
    task: JoinHandle<()>,
}

/// One-shot timer with at most one pending schedule.
pub struct DelayTimer {
    name: &'static str,
    spawner: TokioSpawner,
    generation: u64,
    pending: Option<Pending>,
}

impl DelayTimer {
    /// Creates an idle timer. `name` only appears in logs.
    pub fn new(name: &'static str, spawner: TokioSpawner) -> Self {
        Self {
            name,
            spawner,
            generation: 0,
            pending: None,
        }
    }

    /// Schedules `action` to run once after `duration`, replacing any
    /// pending schedule.
    pub fn arm<F>(&mut self, duration: Duration, action: F) -> TimerToken
    where
        F: FnOnce(TimerToken) + Send + 'static,
    {
        if self.cancel() {
            log::debug!("[Timer] {} restarted", self.name);
        }

        self.generation += 1;
        let token = TimerToken(self.generation);
        let deadline = Instant::now() + duration;

        let task = self.spawner.spawn(async move {
            sleep_until(deadline).await;
            action(token);
        });

        log::debug!("[Timer] {} armed for {:?}", self.name, duration);
        self.pending = Some(Pending {
            token,
            deadline,
            task,
        });
        token
    }

    /// Cancels the pending schedule, if any.
    ///
    /// Returns `true` if a schedule was pending. Calling this on an idle or
    /// already-fired timer does nothing.
    pub fn cancel(&mut self) -> bool {
        match self.pending.take() {
            Some(pending) => {
                pending.task.abort();
                true
            }
            None => false,
        }
    }

    /// Returns true while a schedule is pending and unclaimed.
    pub fn is_armed(&self) -> bool {
        self.pending.is_some()
    }

    /// Accepts a fire for `token`.
    ///
    /// Returns `true` and disarms the timer if `token` belongs to the pending
    /// schedule. Tokens from cancelled or replaced schedules return `false`.
    pub fn claim(&mut self, token: TimerToken) -> bool {
        match &self.pending {
            Some(pending) if pending.token == token => {
                self.pending = None;
                true
            }
            _ => false,
        }
    }

    /// Returns the deadline of the pending schedule.
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|p| p.deadline)
    }
}

impl Drop for DelayTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

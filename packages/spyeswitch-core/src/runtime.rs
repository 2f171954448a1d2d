//! Task spawning abstraction.
//!
//! Core services spawn their background work through [`TaskSpawner`] so the
//! host decides which runtime handle the tasks land on.

use std::future::Future;

use tokio::task::JoinHandle;

/// Abstraction for spawning background tasks.
///
/// The returned handle lets owners abort work that has not completed yet
/// (the delay timer relies on this). Dropping the handle detaches the task.
pub trait TaskSpawner: Send + Sync {
    /// Spawns a future as a background task.
    fn spawn<F>(&self, future: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static;
}

/// Tokio-based spawner.
#[derive(Clone)]
pub struct TokioSpawner {
    handle: tokio::runtime::Handle,
}

impl TokioSpawner {
    /// Creates a new `TokioSpawner` with the given runtime handle.
    #[must_use]
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Creates a new `TokioSpawner` using the current runtime's handle.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime context.
    #[must_use]
    pub fn current() -> Self {
        Self {
            handle: tokio::runtime::Handle::current(),
        }
    }
}

impl TaskSpawner for TokioSpawner {
    fn spawn<F>(&self, future: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.handle.spawn(future)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn tokio_spawner_executes_task() {
        let spawner = TokioSpawner::current();
        let executed = Arc::new(AtomicBool::new(false));
        let executed_clone = executed.clone();

        spawner
            .spawn(async move {
                executed_clone.store(true, Ordering::SeqCst);
            })
            .await
            .unwrap();

        assert!(executed.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn aborted_task_never_runs() {
        let spawner = TokioSpawner::current();
        let executed = Arc::new(AtomicBool::new(false));
        let executed_clone = executed.clone();

        let handle = spawner.spawn(async move {
            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            executed_clone.store(true, Ordering::SeqCst);
        });
        handle.abort();
        tokio::time::sleep(std::time::Duration::from_secs(2)).await;

        assert!(!executed.load(Ordering::SeqCst));
        assert!(handle.await.unwrap_err().is_cancelled());
    }
}

//! Tracked fire-and-forget work.
//!
//! Store writes and revalidation fetches outlive the request that started
//! them, so they run as detached tasks instead of inside the caller's
//! future. Dropping the caller, or a `settle` in progress, never aborts them.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::task::JoinHandle;

#[derive(Clone, Default)]
pub(crate) struct Background {
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl Background {
    fn lock(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Spawn a task on the current runtime.
    pub(crate) fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(task);
        let mut tasks = self.lock();
        // reap finished tasks so the list does not grow with traffic
        tasks.retain(|t| !t.is_finished());
        tasks.push(handle);
    }

    /// Number of tasks still running.
    pub(crate) fn pending(&self) -> usize {
        self.lock().iter().filter(|t| !t.is_finished()).count()
    }

    /// Wait until every task spawned so far has finished.
    pub(crate) async fn settle(&self) {
        loop {
            let drained = std::mem::take(&mut *self.lock());
            if drained.is_empty() {
                return;
            }
            for handle in drained {
                if let Err(e) = handle.await
                    && e.is_panic()
                {
                    tracing::error!(error = %e, "background task panicked");
                }
            }
        }
    }
}

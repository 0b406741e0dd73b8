//! Fire-and-forget execution of background work that the caller never awaits.

use std::{future::Future, sync::Mutex};

use anyhow::Result;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// What happens to the error of a detached task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    Ignore,
    Log,
}

/// Tracks detached tasks so that shutdown and tests can wait for them.
#[derive(Default)]
pub struct DetachedTasks {
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl DetachedTasks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<F>(&self, name: &'static str, policy: FailurePolicy, task: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            match task.await {
                Ok(()) => debug!(task = name, "detached task finished"),
                Err(err) => match policy {
                    FailurePolicy::Ignore => {}
                    FailurePolicy::Log => warn!(task = name, "detached task failed: {err:#}"),
                },
            }
        });

        let mut handles = self.lock_handles();
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }

    pub fn in_flight(&self) -> usize {
        self.lock_handles().iter().filter(|h| !h.is_finished()).count()
    }

    /// Waits for every task spawned so far.
    pub async fn wait_idle(&self) {
        let handles = std::mem::take(&mut *self.lock_handles());
        for handle in handles {
            let _ = handle.await;
        }
    }

    fn lock_handles(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.handles
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for DetachedTasks {
    fn drop(&mut self) {
        let pending = self.in_flight();
        if pending > 0 {
            debug!(pending, "dropping detached task tracker; tasks keep running");
        }
    }
}

#[cfg(test)]
#[path = "tests/tasks_tests.rs"]
mod tests;

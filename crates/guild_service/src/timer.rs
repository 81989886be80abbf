//! Abortable timers for delayed and periodic work.
//!
//! Every delayed action in the guild system (confirmation expiry,
//! teleport warm-up, battle countdowns) is owned by the entity it
//! serves through one of these handles. Aborting the handle is the one
//! way to stop the timer; callbacks still re-validate their entity on
//! fire, so an aborted-too-late timer is harmless.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;

/// Handle to a spawned timer task.
#[derive(Debug)]
pub struct TimerHandle {
    task: JoinHandle<()>,
}

impl TimerHandle {
    /// Runs `action` once after `delay`.
    pub fn run_after<F>(delay: Duration, action: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            action.await;
        });
        Self { task }
    }

    /// Wraps an already-running task, e.g. a periodic announcer loop.
    pub fn wrap<F>(future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self {
            task: tokio::spawn(future),
        }
    }

    /// Stops the timer. Safe to call after it fired.
    pub fn abort(&self) {
        self.task.abort();
    }

    /// Whether the timer already ran (or was aborted) to completion.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test(flavor = "multi_thread")]
    async fn fires_after_the_delay() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        let _timer = TimerHandle::run_after(Duration::from_millis(20), async move {
            flag.store(true, Ordering::SeqCst);
        });

        assert!(!fired.load(Ordering::SeqCst));
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(fired.load(Ordering::SeqCst));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn abort_prevents_the_action() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        let timer = TimerHandle::run_after(Duration::from_millis(30), async move {
            flag.store(true, Ordering::SeqCst);
        });

        timer.abort();
        tokio::time::sleep(Duration::from_millis(90)).await;
        assert!(!fired.load(Ordering::SeqCst));
    }
}

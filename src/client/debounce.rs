//! # Debounce Timer
//!
//! A cancellable one-shot timer owned by the replica manager. Scheduling
//! while the timer is already armed keeps the existing deadline, so a burst
//! of edits is flushed once, one window after the first edit. `restart`
//! pushes the deadline out instead.
//!
//! Built on `tokio::time::sleep`, so tests can drive it deterministically
//! with paused time.

use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Debug, Default)]
struct Slot {
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

/// Cancellable delayed task
#[derive(Debug, Default)]
pub struct DebounceTimer {
    slot: Arc<Mutex<Slot>>,
}

impl DebounceTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` after `delay` unless the timer is already armed
    ///
    /// Returns `false` when an earlier deadline was kept.
    pub fn schedule<F>(&self, delay: Duration, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.arm(delay, task, false)
    }

    /// Run `task` after `delay`, replacing any armed task
    pub fn restart<F>(&self, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.arm(delay, task, true);
    }

    /// Disarm the timer; returns whether a task was pending
    pub fn cancel(&self) -> bool {
        let mut slot = self.slot.lock();
        slot.generation += 1;
        match slot.handle.take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Whether a task is armed and has not started running yet
    pub fn is_pending(&self) -> bool {
        self.slot.lock().handle.is_some()
    }

    fn arm<F>(&self, delay: Duration, task: F, replace: bool) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut slot = self.slot.lock();
        if slot.handle.is_some() && !replace {
            return false;
        }
        if let Some(handle) = slot.handle.take() {
            handle.abort();
        }

        slot.generation += 1;
        let generation = slot.generation;
        let shared = Arc::clone(&self.slot);
        slot.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                // Disarm before running so the task may schedule again
                let mut slot = shared.lock();
                if slot.generation != generation {
                    return;
                }
                slot.handle = None;
            }
            task.await;
        }));
        true
    }
}

impl Drop for DebounceTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

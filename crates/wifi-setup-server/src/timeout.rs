//! Single-slot cancelable timer.
//!
//! Every `arm` or `cancel` bumps a generation counter. A timer task checks
//! the generation under the slot lock before running its action, so an
//! expiry racing with a cancel or re-arm is dropped rather than acted on.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::trace;

#[derive(Default)]
struct Slot {
    generation: u64,
    task: Option<JoinHandle<()>>,
}

/// Schedules at most one pending delayed action.
///
/// Must be used from within a tokio runtime.
pub struct TimeoutScheduler {
    slot: Arc<Mutex<Slot>>,
}

impl TimeoutScheduler {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(Slot::default())),
        }
    }

    /// Run `action` after `after`, replacing any pending action.
    ///
    /// The action runs while the slot is locked and must not call back
    /// into this scheduler.
    pub fn arm<F>(&self, after: Duration, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut slot = lock(&self.slot);
        slot.generation = slot.generation.wrapping_add(1);
        if let Some(task) = slot.task.take() {
            task.abort();
        }

        let generation = slot.generation;
        let shared = Arc::clone(&self.slot);
        slot.task = Some(tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let mut slot = lock(&shared);
            if slot.generation != generation {
                trace!("Dropping stale timer (generation {})", generation);
                return;
            }
            slot.task = None;
            action();
        }));
        trace!("Timer armed for {:?} (generation {})", after, generation);
    }

    /// Cancel the pending action, if any. A no-op when nothing is armed.
    pub fn cancel(&self) {
        let mut slot = lock(&self.slot);
        slot.generation = slot.generation.wrapping_add(1);
        if let Some(task) = slot.task.take() {
            task.abort();
        }
    }

    /// Whether an action is armed and has not yet run.
    pub fn is_pending(&self) -> bool {
        lock(&self.slot).task.is_some()
    }
}

impl Default for TimeoutScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TimeoutScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}

fn lock(slot: &Mutex<Slot>) -> MutexGuard<'_, Slot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, impl FnOnce() + Send + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        (count, move || {
            c.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_delay() {
        let scheduler = TimeoutScheduler::new();
        let (count, action) = counter();

        scheduler.arm(Duration::from_secs(10), action);
        assert!(scheduler.is_pending());

        tokio::time::sleep(Duration::from_secs(9)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_firing() {
        let scheduler = TimeoutScheduler::new();
        let (count, action) = counter();

        scheduler.arm(Duration::from_secs(5), action);
        scheduler.cancel();
        assert!(!scheduler.is_pending());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_replaces_pending_action() {
        let scheduler = TimeoutScheduler::new();
        let (first, first_action) = counter();
        let (second, second_action) = counter();

        scheduler.arm(Duration::from_secs(5), first_action);
        scheduler.arm(Duration::from_secs(8), second_action);

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_without_pending_is_noop() {
        let scheduler = TimeoutScheduler::new();
        scheduler.cancel();
        scheduler.cancel();
        assert!(!scheduler.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels() {
        let (count, action) = counter();
        {
            let scheduler = TimeoutScheduler::new();
            scheduler.arm(Duration::from_secs(1), action);
        }
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}

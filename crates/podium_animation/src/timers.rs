//! Cancellable timers
//!
//! Every delay and deferred callback created by a sequence goes through a
//! [`TimerSet`]. Cancelling the set wakes all in-flight delays with
//! [`Cancelled`], aborts every deferred callback that has not fired yet, and
//! leaves nothing pending. A cancelled set stays cancelled; a new run needs a
//! new set.

use slotmap::{new_key_type, SlotMap};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::task::AbortHandle;

/// A delay was interrupted because its timer set was cancelled
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("timer set cancelled")]
pub struct Cancelled;

// ============================================================================
// Cancel Token
// ============================================================================

#[derive(Default)]
struct TokenInner {
    cancelled: AtomicBool,
    notify: Notify,
}

/// One-way cancellation flag that async code can wait on
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<TokenInner>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the token and wake every waiter; idempotent
    pub fn cancel(&self) {
        if !self.inner.cancelled.swap(true, Ordering::SeqCst) {
            self.inner.notify.notify_waiters();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolve once the token is cancelled
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            // Register before checking the flag so a concurrent cancel() is not missed
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

// ============================================================================
// Timer Set
// ============================================================================

new_key_type! {
    /// Handle to a pending timer
    pub struct TimerId;
}

enum TimerEntry {
    Delay,
    Deferred(AbortHandle),
}

/// Registry of every pending delay and deferred callback of one run
///
/// Cloning yields another handle to the same set.
#[derive(Clone, Default)]
pub struct TimerSet {
    token: CancelToken,
    entries: Arc<Mutex<SlotMap<TimerId, TimerEntry>>>,
}

impl TimerSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SlotMap<TimerId, TimerEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The token cancelled by [`cancel_all`](Self::cancel_all)
    pub fn token(&self) -> &CancelToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Number of delays and deferred callbacks still outstanding
    pub fn pending(&self) -> usize {
        self.lock().len()
    }

    /// Wait for `duration` unless the set is cancelled first
    pub async fn delay(&self, duration: Duration) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            return Err(Cancelled);
        }
        let id = self.lock().insert(TimerEntry::Delay);
        let _entry = EntryGuard { set: self, id };

        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(Cancelled),
            _ = tokio::time::sleep(duration) => {
                if self.is_cancelled() {
                    Err(Cancelled)
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Run `future` to completion unless the set is cancelled first
    pub async fn guard<F: Future>(&self, future: F) -> Result<F::Output, Cancelled> {
        if self.is_cancelled() {
            return Err(Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(Cancelled),
            output = future => Ok(output),
        }
    }

    /// Run `callback` after `duration` on the current tokio runtime
    ///
    /// Returns `None` when the set is already cancelled or no runtime is
    /// available; the callback is then dropped without running.
    pub fn schedule<F>(&self, duration: Duration, callback: F) -> Option<TimerId>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_cancelled() {
            return None;
        }
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                tracing::debug!("TimerSet: no tokio runtime, deferred callback dropped");
                return None;
            }
        };

        let set = self.clone();
        let id = self.lock().insert_with_key(move |id| {
            let task = runtime.spawn(async move {
                tokio::time::sleep(duration).await;
                if set.finish(id) {
                    callback();
                }
            });
            TimerEntry::Deferred(task.abort_handle())
        });
        Some(id)
    }

    /// Cancel one deferred callback; returns whether it was still pending
    pub fn cancel(&self, id: TimerId) -> bool {
        let mut entries = self.lock();
        if !matches!(entries.get(id), Some(TimerEntry::Deferred(_))) {
            return false;
        }
        if let Some(TimerEntry::Deferred(task)) = entries.remove(id) {
            task.abort();
        }
        true
    }

    /// Cancel everything: wake delays, abort deferred callbacks
    ///
    /// Returns how many timers were outstanding.
    pub fn cancel_all(&self) -> usize {
        self.token.cancel();
        let drained: Vec<TimerEntry> = self.lock().drain().map(|(_, entry)| entry).collect();
        for entry in &drained {
            if let TimerEntry::Deferred(task) = entry {
                task.abort();
            }
        }
        if !drained.is_empty() {
            tracing::debug!("TimerSet: cancelled {} pending timers", drained.len());
        }
        drained.len()
    }

    fn finish(&self, id: TimerId) -> bool {
        self.lock().remove(id).is_some() && !self.is_cancelled()
    }
}

impl std::fmt::Debug for TimerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerSet")
            .field("pending", &self.pending())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

struct EntryGuard<'a> {
    set: &'a TimerSet,
    id: TimerId,
}

impl Drop for EntryGuard<'_> {
    fn drop(&mut self) {
        self.set.lock().remove(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::time::Instant;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_elapses() {
        let timers = TimerSet::new();
        let start = Instant::now();
        assert_eq!(timers.delay(ms(300)).await, Ok(()));
        assert_eq!(start.elapsed(), ms(300));
        assert_eq!(timers.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all_wakes_delay() {
        let timers = TimerSet::new();
        let waiter = {
            let timers = timers.clone();
            tokio::spawn(async move { timers.delay(ms(500)).await })
        };
        tokio::task::yield_now().await;
        assert_eq!(timers.pending(), 1);

        assert_eq!(timers.cancel_all(), 1);
        assert_eq!(timers.pending(), 0);
        assert_eq!(waiter.await.unwrap(), Err(Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_after_cancel_fails_immediately() {
        let timers = TimerSet::new();
        timers.cancel_all();
        let start = Instant::now();
        assert_eq!(timers.delay(ms(500)).await, Err(Cancelled));
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert!(timers.schedule(ms(10), || {}).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deferred_callback_runs_once() {
        let timers = TimerSet::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        timers.schedule(ms(1_000), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(timers.pending(), 1);

        tokio::time::sleep(ms(999)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(ms(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(timers.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all_prevents_deferred_callbacks() {
        let timers = TimerSet::new();
        let fired = Arc::new(AtomicUsize::new(0));
        for delay in [100, 200, 300] {
            let counter = Arc::clone(&fired);
            timers.schedule(ms(delay), move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        tokio::time::sleep(ms(150)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        assert_eq!(timers.cancel_all(), 2);
        tokio::time::sleep(ms(1_000)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(timers.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_single_deferred() {
        let timers = TimerSet::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let id = timers
            .schedule(ms(100), move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        assert!(timers.cancel(id));
        assert!(!timers.cancel(id));
        tokio::time::sleep(ms(200)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(!timers.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_guard_aborts_pending_future() {
        let timers = TimerSet::new();
        let guarded = {
            let timers = timers.clone();
            tokio::spawn(async move { timers.guard(std::future::pending::<()>()).await })
        };
        tokio::task::yield_now().await;
        timers.cancel_all();
        assert_eq!(guarded.await.unwrap(), Err(Cancelled));
    }

    #[test]
    fn test_schedule_without_runtime() {
        let timers = TimerSet::new();
        assert!(timers.schedule(ms(10), || {}).is_none());
        assert_eq!(timers.pending(), 0);
    }
}

//! Cancellable one-shot timers for Skulk.
//!
//! A room never sleeps on its own. Instead it asks [`Timers`] to deliver a
//! payload after a delay and keeps the returned [`TimerHandle`]. Expirations
//! come back through [`Timers::expired`] as ordinary messages, so the owning
//! actor processes them in the same loop as client commands.
//!
//! # Cancellation
//!
//! Cancelling (or dropping) a handle aborts the sleeping task. A task that
//! already woke up may have queued its [`Expired`] message before the abort
//! landed, so the owner must still compare [`Expired::id`] against the handle
//! it currently holds and discard mismatches:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(cmd) = cmd_rx.recv() => { /* handle commands */ }
//!         fired = timers.expired() => {
//!             if room.timer.as_ref().map(TimerHandle::id) == Some(fired.id) {
//!                 room.timer = None;
//!                 advance(room, fired.payload);
//!             }
//!         }
//!     }
//! }
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::trace;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Identifies one scheduled timer. Never reused by the same [`Timers`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

impl TimerId {
    /// Returns the underlying sequence number.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer-{}", self.0)
    }
}

/// A timer that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expired<T> {
    pub id: TimerId,
    pub payload: T,
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Owning handle to a pending timer.
///
/// Dropping the handle cancels the timer, so replacing a room's
/// `Option<TimerHandle>` can never leave two timers pending.
pub struct TimerHandle {
    id: TimerId,
    deadline: Instant,
    settled: Arc<AtomicBool>,
    pending: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl TimerHandle {
    pub fn id(&self) -> TimerId {
        self.id
    }

    /// Returns `true` until the timer fires or is cancelled.
    pub fn is_pending(&self) -> bool {
        !self.settled.load(Ordering::Acquire)
    }

    /// Cancels the timer. Equivalent to dropping the handle.
    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.task.abort();
        if settle(&self.settled, &self.pending) {
            trace!(id = %self.id, "timer cancelled");
        }
    }
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHandle")
            .field("id", &self.id)
            .field("deadline", &self.deadline)
            .field("pending", &self.is_pending())
            .finish()
    }
}

/// Flips a timer to settled exactly once; returns `true` for the caller
/// that won.
fn settle(settled: &AtomicBool, pending: &AtomicUsize) -> bool {
    if settled
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_ok()
    {
        pending.fetch_sub(1, Ordering::AcqRel);
        true
    } else {
        false
    }
}

// ---------------------------------------------------------------------------
// Timers
// ---------------------------------------------------------------------------

/// Schedules one-shot timers and collects their expirations.
///
/// One `Timers` per actor. The payload type says what the actor should do
/// when the timer fires.
pub struct Timers<T> {
    tx: mpsc::UnboundedSender<Expired<T>>,
    rx: mpsc::UnboundedReceiver<Expired<T>>,
    next_id: u64,
    pending: Arc<AtomicUsize>,
}

impl<T: Send + 'static> Timers<T> {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx,
            next_id: 1,
            pending: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Delivers `payload` through [`expired`](Self::expired) after `delay`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn schedule(&mut self, delay: Duration, payload: T) -> TimerHandle {
        let id = TimerId(self.next_id);
        self.next_id += 1;

        let deadline = Instant::now() + delay;
        let settled = Arc::new(AtomicBool::new(false));
        self.pending.fetch_add(1, Ordering::AcqRel);

        let tx = self.tx.clone();
        let task_settled = Arc::clone(&settled);
        let task_pending = Arc::clone(&self.pending);
        let task = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if settle(&task_settled, &task_pending) {
                trace!(%id, "timer fired");
                let _ = tx.send(Expired { id, payload });
            }
        });

        trace!(%id, delay_ms = delay.as_millis() as u64, "timer scheduled");
        TimerHandle {
            id,
            deadline,
            settled,
            pending: Arc::clone(&self.pending),
            task,
        }
    }

    /// Waits for the next expiration.
    ///
    /// Pends forever while nothing is scheduled, which makes it safe to use
    /// as a `tokio::select!` branch.
    pub async fn expired(&mut self) -> Expired<T> {
        match self.rx.recv().await {
            Some(expired) => expired,
            // We hold a sender, so the channel can't close.
            None => std::future::pending().await,
        }
    }

    /// Number of timers scheduled and neither fired nor cancelled.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }
}

impl<T: Send + 'static> Default for Timers<T> {
    fn default() -> Self {
        Self::new()
    }
}

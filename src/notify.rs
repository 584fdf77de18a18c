//! Cross-thread wakeups for a connection.
//!
//! A [`Notifier`] is the one handle in this crate that may leave the event
//! loop thread. Background work (a database call on a worker thread, a
//! callback from a client library) calls [`Notifier::notify`] when it is done;
//! the event loop then invokes the handler's `on_notify` for that connection.
//!
//! Delivery is at-least-once and coalescing: triggers that arrive before the
//! loop drains the first one collapse into a single `on_notify`. Code waiting
//! on several operations counts them with a [`CompletionGroup`].
//!
//! # Example
//!
//! ```ignore
//! fn on_params(&mut self, ctx: &mut RequestContext<'_>, _params: Params<'_>) {
//!     let notifier = ctx.notifier();
//!     std::thread::spawn(move || {
//!         run_slow_query();
//!         notifier.notify();
//!     });
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;

use crate::connection::ConnId;

/// Sending half of the loop's notification channel.
pub type NotifySender = mpsc::UnboundedSender<ConnId>;

/// Receiving half of the loop's notification channel.
pub type NotifyReceiver = mpsc::UnboundedReceiver<ConnId>;

/// Create the channel that carries wakeups into the event loop.
pub fn notify_channel() -> (NotifySender, NotifyReceiver) {
    mpsc::unbounded_channel()
}

/// Thread-safe wakeup handle for one connection binding.
///
/// The pending flag belongs to a single binding of a slot, so a notifier kept
/// past the end of its request cannot swallow wakeups meant for the next
/// request on the same slot; the loop drops its stale wakeup by generation.
#[derive(Debug, Clone)]
pub struct Notifier {
    conn: ConnId,
    pending: Arc<AtomicBool>,
    tx: NotifySender,
}

impl Notifier {
    pub(crate) fn new(conn: ConnId, pending: Arc<AtomicBool>, tx: NotifySender) -> Self {
        Self { conn, pending, tx }
    }

    /// Wake the event loop for this connection.
    ///
    /// Returns `true` if a new wakeup was queued, `false` if one was already
    /// pending or the loop has shut down.
    pub fn notify(&self) -> bool {
        if self.pending.swap(true, Ordering::AcqRel) {
            return false;
        }
        if self.tx.send(self.conn).is_err() {
            self.pending.store(false, Ordering::Release);
            return false;
        }
        true
    }

    /// Connection this notifier wakes.
    #[inline]
    pub fn conn(&self) -> ConnId {
        self.conn
    }

    /// True while a wakeup is queued and not yet delivered.
    #[inline]
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }
}

/// Counts outstanding background operations for one request and notifies
/// the connection when the last one completes.
#[derive(Debug)]
pub struct CompletionGroup {
    remaining: Mutex<usize>,
    notifier: Notifier,
}

impl CompletionGroup {
    /// Track `count` operations.
    pub fn new(notifier: Notifier, count: usize) -> Arc<Self> {
        Arc::new(Self {
            remaining: Mutex::new(count),
            notifier,
        })
    }

    /// Mark one operation complete.
    ///
    /// Returns `true` for the call that brought the count to zero; that call
    /// also triggers the notifier. Extra calls past zero are ignored.
    pub fn complete_one(&self) -> bool {
        let mut remaining = self
            .remaining
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if *remaining == 0 {
            return false;
        }
        *remaining -= 1;
        if *remaining > 0 {
            return false;
        }
        drop(remaining);
        self.notifier.notify();
        true
    }

    /// Operations still outstanding.
    pub fn remaining(&self) -> usize {
        *self
            .remaining
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notifier() -> (Notifier, NotifyReceiver) {
        let (tx, rx) = notify_channel();
        let conn = ConnId::new(3, 1);
        (Notifier::new(conn, Arc::new(AtomicBool::new(false)), tx), rx)
    }

    #[test]
    fn test_repeated_triggers_coalesce() {
        let (notifier, mut rx) = notifier();

        assert!(notifier.notify());
        assert!(!notifier.notify());
        assert!(!notifier.clone().notify());

        assert_eq!(rx.try_recv().unwrap(), ConnId::new(3, 1));
        assert!(rx.try_recv().is_err());
        assert!(notifier.is_pending());
    }

    #[test]
    fn test_trigger_after_drain_is_delivered() {
        let (notifier, mut rx) = notifier();
        notifier.notify();
        rx.try_recv().unwrap();

        // The loop clears the flag before invoking the handler.
        notifier.pending.store(false, Ordering::Release);

        assert!(notifier.notify());
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_notify_after_loop_shutdown() {
        let (notifier, rx) = notifier();
        drop(rx);
        assert!(!notifier.notify());
        assert!(!notifier.is_pending());
    }

    #[test]
    fn test_notify_from_other_threads() {
        let (notifier, mut rx) = notifier();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let n = notifier.clone();
                std::thread::spawn(move || {
                    n.notify();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_completion_group_notifies_at_zero() {
        let (notifier, mut rx) = notifier();
        let group = CompletionGroup::new(notifier, 3);

        assert!(!group.complete_one());
        assert!(!group.complete_one());
        assert!(rx.try_recv().is_err());

        assert!(group.complete_one());
        assert_eq!(group.remaining(), 0);
        assert!(rx.try_recv().is_ok());

        assert!(!group.complete_one());
    }

    #[test]
    fn test_completion_group_across_threads() {
        let (notifier, mut rx) = notifier();
        let group = CompletionGroup::new(notifier, 16);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let g = group.clone();
                std::thread::spawn(move || g.complete_one())
            })
            .collect();
        let finishers = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|last| *last)
            .count();

        assert_eq!(finishers, 1);
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }
}

//! Actor mailbox and envelope types
//!
//! TigerStyle: Unbounded FIFO with explicit counters, non-blocking polls.
//!
//! Every mailbox operation is a short critical section over a plain mutex;
//! nothing on a dispatch path suspends here. The queue exposes a head poll
//! for the single consumer holding the actor's dispatch lock, and a tail
//! poll used only for work donation.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;
use uuid::Uuid;

use selkie_core::clock::TimeProvider;
use selkie_core::error::Error;
use selkie_core::reply::ReplyValue;

/// Statistics reported by a pool in response to a `Stat` probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Current number of delegates
    pub delegates: usize,
    /// Outcome of the most recent capacity adjustment
    pub last_capacity_delta: i64,
    /// Size of the most recent selection set
    pub last_selection_count: usize,
}

/// Guard tying an outstanding reply slot to its holder's pending counter
///
/// The counter is incremented on creation and decremented exactly once when
/// the guard drops, whether the slot was completed or abandoned.
struct PendingGuard {
    counter: Arc<AtomicUsize>,
}

impl PendingGuard {
    fn acquire(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self { counter }
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Single-assignment completion slot for an ask
///
/// Exactly one of `complete_value` / `complete_error` consumes the slot.
/// Dropping an uncompleted slot surfaces as `ReplyDropped` on the caller's
/// future.
pub struct ReplySlot<R> {
    tx: oneshot::Sender<ReplyValue<R>>,
    _pending: PendingGuard,
}

impl<R> ReplySlot<R> {
    pub(crate) fn new(tx: oneshot::Sender<ReplyValue<R>>, counter: Arc<AtomicUsize>) -> Self {
        Self {
            tx,
            _pending: PendingGuard::acquire(counter),
        }
    }

    /// Complete with a value (`None` = the responder produced no value)
    pub fn complete_value(self, value: Option<R>) {
        let _ = self.tx.send(Ok(value));
    }

    /// Complete with an error
    pub fn complete_error(self, error: Error) {
        let _ = self.tx.send(Err(error));
    }

    /// Re-attribute the outstanding reply to a different holder
    ///
    /// Used when a donated envelope moves between mailboxes.
    pub(crate) fn rebind(&mut self, counter: Arc<AtomicUsize>) {
        self._pending = PendingGuard::acquire(counter);
    }
}

impl<R> std::fmt::Debug for ReplySlot<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ReplySlot")
    }
}

/// Mailbox payload variants
pub enum Payload<M, R> {
    /// A user message, optionally carrying a reply slot
    User {
        msg: M,
        reply: Option<ReplySlot<R>>,
    },
    /// Pool statistics probe with its own typed reply channel
    Stat { reply_tx: oneshot::Sender<PoolStats> },
    /// Link notification: a linked actor exhausted its restart budget
    Terminated { actor: Uuid },
}

impl<M, R> Payload<M, R> {
    /// Short payload kind label for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::User { .. } => "user",
            Payload::Stat { .. } => "stat",
            Payload::Terminated { .. } => "terminated",
        }
    }
}

/// A message in the mailbox
pub struct Envelope<M, R> {
    /// The payload
    pub payload: Payload<M, R>,
    /// When the message was enqueued (monotonic timestamp in ms)
    pub enqueued_at_ms: u64,
}

impl<M, R> Envelope<M, R> {
    /// Create a new envelope stamped with the given clock
    pub fn new(payload: Payload<M, R>, time: &dyn TimeProvider) -> Self {
        Self {
            payload,
            enqueued_at_ms: time.monotonic_ms(),
        }
    }

    /// Get the time this message has been waiting in milliseconds
    pub fn wait_time_ms(&self, time: &dyn TimeProvider) -> u64 {
        time.monotonic_ms().saturating_sub(self.enqueued_at_ms)
    }
}

/// Unbounded mailbox for actor messages
///
/// # TigerStyle
/// - FIFO ordering between push and head poll
/// - Tail poll reserved for donation (never counts as processed)
/// - Producers are never blocked; there is no capacity limit
pub struct Mailbox<M, R> {
    queue: Mutex<VecDeque<Envelope<M, R>>>,
    /// Total messages enqueued (for diagnostics)
    enqueued_count: AtomicU64,
    /// Total messages head-polled for processing (for diagnostics)
    processed_count: AtomicU64,
}

impl<M, R> Mailbox<M, R> {
    /// Create a new empty mailbox
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            enqueued_count: AtomicU64::new(0),
            processed_count: AtomicU64::new(0),
        }
    }

    fn queue(&self) -> std::sync::MutexGuard<'_, VecDeque<Envelope<M, R>>> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Enqueue a message at the tail
    pub fn push(&self, envelope: Envelope<M, R>) {
        self.queue().push_back(envelope);
        self.enqueued_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Poll the head of the queue (single consumer)
    pub fn poll_head(&self) -> Option<Envelope<M, R>> {
        let envelope = self.queue().pop_front();
        if envelope.is_some() {
            self.processed_count.fetch_add(1, Ordering::Relaxed);
        }
        envelope
    }

    /// Poll the tail of the queue (used only for donation)
    pub fn poll_tail(&self) -> Option<Envelope<M, R>> {
        self.queue().pop_back()
    }

    /// Check if the mailbox is empty
    pub fn is_empty(&self) -> bool {
        self.queue().is_empty()
    }

    /// Get the number of pending messages
    pub fn len(&self) -> usize {
        self.queue().len()
    }

    /// Get total messages enqueued
    pub fn enqueued_count(&self) -> u64 {
        self.enqueued_count.load(Ordering::Relaxed)
    }

    /// Get total messages head-polled for processing
    pub fn processed_count(&self) -> u64 {
        self.processed_count.load(Ordering::Relaxed)
    }
}

impl<M, R> Default for Mailbox<M, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M, R> std::fmt::Debug for Mailbox<M, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mailbox")
            .field("len", &self.len())
            .field("enqueued", &self.enqueued_count())
            .field("processed", &self.processed_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use selkie_core::clock::WallClock;

    fn user_envelope(n: u32) -> Envelope<u32, u32> {
        Envelope::new(
            Payload::User {
                msg: n,
                reply: None,
            },
            &WallClock::new(),
        )
    }

    fn msg_of(envelope: Envelope<u32, u32>) -> u32 {
        match envelope.payload {
            Payload::User { msg, .. } => msg,
            _ => panic!("expected user payload"),
        }
    }

    #[test]
    fn test_mailbox_fifo_head_poll() {
        let mailbox = Mailbox::new();
        for n in 0..5 {
            mailbox.push(user_envelope(n));
        }

        for n in 0..5 {
            assert_eq!(msg_of(mailbox.poll_head().unwrap()), n);
        }
        assert!(mailbox.poll_head().is_none());
        assert!(mailbox.is_empty());
    }

    #[test]
    fn test_mailbox_tail_poll_reverses() {
        let mailbox = Mailbox::new();
        for n in 0..3 {
            mailbox.push(user_envelope(n));
        }

        assert_eq!(msg_of(mailbox.poll_tail().unwrap()), 2);
        assert_eq!(msg_of(mailbox.poll_tail().unwrap()), 1);
        // Head and tail polls interleave over the same queue
        assert_eq!(msg_of(mailbox.poll_head().unwrap()), 0);
        assert!(mailbox.poll_tail().is_none());
    }

    #[test]
    fn test_mailbox_counters() {
        let mailbox = Mailbox::new();
        mailbox.push(user_envelope(1));
        mailbox.push(user_envelope(2));
        assert_eq!(mailbox.enqueued_count(), 2);
        assert_eq!(mailbox.processed_count(), 0);

        mailbox.poll_head();
        assert_eq!(mailbox.processed_count(), 1);

        // Donation does not count as processed
        mailbox.poll_tail();
        assert_eq!(mailbox.processed_count(), 1);
    }

    #[test]
    fn test_reply_slot_pending_counter() {
        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, _rx) = oneshot::channel::<ReplyValue<u32>>();

        let slot = ReplySlot::new(tx, counter.clone());
        assert_eq!(counter.load(Ordering::Relaxed), 1);

        slot.complete_value(Some(7));
        assert_eq!(counter.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_reply_slot_rebind_moves_attribution() {
        let owner = Arc::new(AtomicUsize::new(0));
        let thief = Arc::new(AtomicUsize::new(0));
        let (tx, _rx) = oneshot::channel::<ReplyValue<u32>>();

        let mut slot = ReplySlot::new(tx, owner.clone());
        assert_eq!(owner.load(Ordering::Relaxed), 1);

        slot.rebind(thief.clone());
        assert_eq!(owner.load(Ordering::Relaxed), 0);
        assert_eq!(thief.load(Ordering::Relaxed), 1);

        drop(slot);
        assert_eq!(thief.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_envelope_wait_time() {
        let clock = WallClock::new();
        let envelope = user_envelope(1);
        assert!(envelope.wait_time_ms(&clock) < 1000);
    }

    #[test]
    fn test_payload_kind_labels() {
        assert_eq!(user_envelope(1).payload.kind(), "user");
        let (tx, _rx) = oneshot::channel();
        let stat: Payload<u32, u32> = Payload::Stat { reply_tx: tx };
        assert_eq!(stat.kind(), "stat");
    }
}

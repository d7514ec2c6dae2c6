//! Actor cells and references
//!
//! TigerStyle: One dispatch lock per actor, try-acquired only; identity by
//! uuid; explicit lifecycle.
//!
//! An `ActorCell` bundles everything the dispatcher needs from an actor: the
//! mailbox, the non-reentrant dispatch lock guarding the boxed behavior, the
//! concrete type token for pool homogeneity checks, the pending-reply
//! counter, and the link to a parent consuming terminal-failure
//! notifications. `ActorRef` is the cloneable handle over a cell.

use std::any::TypeId;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use tokio::sync::oneshot;
use tracing::{debug, error};
use uuid::Uuid;

use selkie_core::clock::{TimeProvider, WallClock};
use selkie_core::constants::{ACTOR_NAME_LENGTH_BYTES_MAX, ACTOR_RESTARTS_COUNT_MAX};
use selkie_core::error::{Error, Result};
use selkie_core::reply::ReplyFuture;

use crate::dispatcher::DispatcherCore;
use crate::mailbox::{Envelope, Mailbox, Payload, PoolStats, ReplySlot};

/// Actor behavior
///
/// Execution is single-threaded per actor: the dispatcher guarantees at most
/// one invocation of any method below at a time, enforced by the cell's
/// dispatch lock.
#[async_trait]
pub trait Actor: Send + 'static {
    /// Message type this actor consumes
    type Msg: Send + 'static;
    /// Reply type for asks
    type Reply: Send + 'static;

    /// Handle one message
    ///
    /// Returning `Ok(Some(reply))` completes a pending reply slot with the
    /// value; `Ok(None)` completes it with no value. An actor that forwards
    /// the reply elsewhere takes the slot out of the context first.
    async fn receive(
        &mut self,
        ctx: &mut ActorContext<Self::Msg, Self::Reply>,
        msg: Self::Msg,
    ) -> Result<Option<Self::Reply>>;

    /// A linked child exhausted its restart budget
    async fn on_peer_terminated(
        &mut self,
        _ctx: &mut ActorContext<Self::Msg, Self::Reply>,
        _peer: Uuid,
    ) -> Result<()> {
        Ok(())
    }

    /// Answer a `Stat` probe; non-pool actors ignore it
    fn pool_stats(&self) -> Option<PoolStats> {
        None
    }
}

/// Context provided to an actor during an invocation
pub struct ActorContext<M, R> {
    /// Reference to the actor currently processing
    pub myself: ActorRef<M, R>,
    reply: Option<ReplySlot<R>>,
}

impl<M, R> ActorContext<M, R> {
    pub(crate) fn new(myself: ActorRef<M, R>, reply: Option<ReplySlot<R>>) -> Self {
        Self { myself, reply }
    }

    /// Whether the current message expects a reply
    pub fn has_reply(&self) -> bool {
        self.reply.is_some()
    }

    /// Take ownership of the reply slot
    ///
    /// After this the dispatcher no longer auto-completes the slot from the
    /// receive return value; the taker must complete it.
    pub fn take_reply(&mut self) -> Option<ReplySlot<R>> {
        self.reply.take()
    }
}

pub(crate) struct ActorCell<M, R> {
    pub(crate) uuid: Uuid,
    pub(crate) name: String,
    pub(crate) actor_type: TypeId,
    pub(crate) actor_type_name: &'static str,
    pub(crate) mailbox: Mailbox<M, R>,
    /// The dispatch lock: non-reentrant, only ever try-acquired. Holding it
    /// is the "currently processing" state.
    pub(crate) handler: tokio::sync::Mutex<Box<dyn Actor<Msg = M, Reply = R>>>,
    /// Outstanding un-resolved reply slots held by this actor
    pub(crate) pending_replies: Arc<AtomicUsize>,
    failures: AtomicU32,
    stopped: AtomicBool,
    parent: Mutex<Option<ActorRef<M, R>>>,
    scheduler: Mutex<Weak<DispatcherCore<M, R>>>,
    pub(crate) clock: Arc<dyn TimeProvider>,
}

/// Cloneable handle to an actor
///
/// Equality and hashing are by uuid.
pub struct ActorRef<M, R> {
    cell: Arc<ActorCell<M, R>>,
}

impl<M, R> Clone for ActorRef<M, R> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<M, R> PartialEq for ActorRef<M, R> {
    fn eq(&self, other: &Self) -> bool {
        self.cell.uuid == other.cell.uuid
    }
}

impl<M, R> Eq for ActorRef<M, R> {}

impl<M, R> std::hash::Hash for ActorRef<M, R> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.cell.uuid.hash(state);
    }
}

impl<M, R> std::fmt::Debug for ActorRef<M, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorRef")
            .field("name", &self.cell.name)
            .field("uuid", &self.cell.uuid)
            .finish()
    }
}

impl<M, R> ActorRef<M, R>
where
    M: Send + 'static,
    R: Send + 'static,
{
    /// Spawn a new actor
    pub fn spawn<A>(name: impl Into<String>, actor: A) -> Self
    where
        A: Actor<Msg = M, Reply = R>,
    {
        let name = name.into();
        debug_assert!(!name.is_empty(), "actor name must not be empty");
        debug_assert!(
            name.len() <= ACTOR_NAME_LENGTH_BYTES_MAX,
            "actor name exceeds ACTOR_NAME_LENGTH_BYTES_MAX"
        );

        Self {
            cell: Arc::new(ActorCell {
                uuid: Uuid::new_v4(),
                name,
                actor_type: TypeId::of::<A>(),
                actor_type_name: std::any::type_name::<A>(),
                mailbox: Mailbox::new(),
                handler: tokio::sync::Mutex::new(Box::new(actor)),
                pending_replies: Arc::new(AtomicUsize::new(0)),
                failures: AtomicU32::new(0),
                stopped: AtomicBool::new(false),
                parent: Mutex::new(None),
                scheduler: Mutex::new(Weak::new()),
                clock: Arc::new(WallClock::new()),
            }),
        }
    }

    /// Stable identity
    pub fn uuid(&self) -> Uuid {
        self.cell.uuid
    }

    /// Actor name (for logs)
    pub fn name(&self) -> &str {
        &self.cell.name
    }

    /// Number of messages waiting in the mailbox
    pub fn mailbox_len(&self) -> usize {
        self.cell.mailbox.len()
    }

    /// Whether the mailbox is empty
    pub fn mailbox_is_empty(&self) -> bool {
        self.cell.mailbox.is_empty()
    }

    /// Whether the actor currently holds an un-resolved reply slot
    pub fn has_pending_reply(&self) -> bool {
        self.cell.pending_replies.load(Ordering::Relaxed) > 0
    }

    /// Whether the actor has been stopped
    pub fn is_stopped(&self) -> bool {
        self.cell.stopped.load(Ordering::Relaxed)
    }

    /// Stop the actor
    ///
    /// Subsequent sends are rejected; messages still queued are failed on the
    /// next drain.
    pub fn stop(&self) {
        self.cell.stopped.store(true, Ordering::Relaxed);
        debug!(actor = %self.cell.name, "actor stopped");
    }

    /// Link this actor to a parent that receives terminal-failure
    /// notifications
    pub fn start_linked_to(&self, parent: &ActorRef<M, R>) {
        let mut slot = self.cell.parent.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(parent.clone());
    }

    /// Enqueue a message at the mailbox tail
    ///
    /// # Errors
    /// `ActorStopped` if the actor was stopped; `DispatcherNotStarted` if the
    /// actor is registered with an inactive dispatcher.
    pub fn send(&self, msg: M) -> Result<()> {
        if self.is_stopped() {
            return Err(Error::actor_stopped(&self.cell.name));
        }
        let envelope = Envelope::new(Payload::User { msg, reply: None }, self.cell.clock.as_ref());
        self.deliver(envelope)
    }

    /// Enqueue a message with a reply slot
    ///
    /// The returned future completes when the responder (or a thief that the
    /// message was donated to) finishes the message.
    pub fn ask(&self, msg: M) -> Result<ReplyFuture<R>> {
        if self.is_stopped() {
            return Err(Error::actor_stopped(&self.cell.name));
        }
        let (tx, rx) = oneshot::channel();
        let slot = ReplySlot::new(tx, self.cell.pending_replies.clone());
        let envelope = Envelope::new(
            Payload::User {
                msg,
                reply: Some(slot),
            },
            self.cell.clock.as_ref(),
        );
        self.deliver(envelope)?;
        Ok(ReplyFuture::new(rx, self.cell.name.clone()))
    }

    /// Probe a pool actor for statistics
    pub async fn stats(&self) -> Result<PoolStats> {
        if self.is_stopped() {
            return Err(Error::actor_stopped(&self.cell.name));
        }
        let (tx, rx) = oneshot::channel();
        let envelope = Envelope::new(Payload::Stat { reply_tx: tx }, self.cell.clock.as_ref());
        self.deliver(envelope)?;
        rx.await
            .map_err(|_| Error::reply_dropped(&self.cell.name))
    }

    /// Deliver a terminal-failure notification for `peer` to this actor
    ///
    /// This is the supervision surface: the runtime calls it when a linked
    /// child exhausts its restart budget, and external supervisors may call
    /// it directly.
    pub fn notify_peer_terminated(&self, peer: Uuid) -> Result<()> {
        if self.is_stopped() {
            return Err(Error::actor_stopped(&self.cell.name));
        }
        let envelope = Envelope::new(Payload::Terminated { actor: peer }, self.cell.clock.as_ref());
        self.deliver(envelope)
    }

    fn deliver(&self, envelope: Envelope<M, R>) -> Result<()> {
        let scheduler = {
            let slot = self
                .cell
                .scheduler
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            slot.upgrade()
        };
        match scheduler {
            Some(core) => core.dispatch(self, envelope),
            // Not registered anywhere: messages wait in the mailbox until a
            // dispatcher drives this actor.
            None => {
                self.cell.mailbox.push(envelope);
                Ok(())
            }
        }
    }

    pub(crate) fn cell(&self) -> &ActorCell<M, R> {
        &self.cell
    }

    pub(crate) fn actor_type(&self) -> TypeId {
        self.cell.actor_type
    }

    pub(crate) fn type_name(&self) -> &'static str {
        self.cell.actor_type_name
    }

    pub(crate) fn pending_counter(&self) -> Arc<AtomicUsize> {
        self.cell.pending_replies.clone()
    }

    pub(crate) fn attach(&self, core: Weak<DispatcherCore<M, R>>) {
        let mut slot = self
            .cell
            .scheduler
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        *slot = core;
    }

    pub(crate) fn detach(&self) {
        self.attach(Weak::new());
    }

    /// Record a receive failure with no reply slot attached
    ///
    /// Once the restart budget is exhausted the actor is stopped and the
    /// linked parent is notified exactly once.
    pub(crate) fn record_receive_failure(&self, error: &Error) {
        let failures = self.cell.failures.fetch_add(1, Ordering::Relaxed) + 1;
        error!(
            actor = %self.cell.name,
            %error,
            failures,
            "receive failed with no reply slot"
        );
        if failures == ACTOR_RESTARTS_COUNT_MAX + 1 {
            error!(
                actor = %self.cell.name,
                budget = ACTOR_RESTARTS_COUNT_MAX,
                "restart budget exhausted"
            );
            self.stop();
            let parent = {
                let slot = self.cell.parent.lock().unwrap_or_else(|e| e.into_inner());
                slot.clone()
            };
            if let Some(parent) = parent {
                let _ = parent.notify_peer_terminated(self.cell.uuid);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl Actor for Echo {
        type Msg = String;
        type Reply = String;

        async fn receive(
            &mut self,
            _ctx: &mut ActorContext<String, String>,
            msg: String,
        ) -> Result<Option<String>> {
            Ok(Some(msg))
        }
    }

    #[tokio::test]
    async fn test_spawn_assigns_identity() {
        let a: ActorRef<String, String> = ActorRef::spawn("echo-1", Echo);
        let b: ActorRef<String, String> = ActorRef::spawn("echo-2", Echo);

        assert_ne!(a.uuid(), b.uuid());
        assert_eq!(a.name(), "echo-1");
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_send_unregistered_enqueues_only() {
        let a: ActorRef<String, String> = ActorRef::spawn("echo", Echo);

        a.send("hello".to_string()).unwrap();
        a.send("world".to_string()).unwrap();

        assert_eq!(a.mailbox_len(), 2);
        assert!(!a.mailbox_is_empty());
    }

    #[tokio::test]
    async fn test_send_to_stopped_actor_rejected() {
        let a: ActorRef<String, String> = ActorRef::spawn("echo", Echo);
        a.stop();

        let err = a.send("hello".to_string()).unwrap_err();
        assert!(matches!(err, Error::ActorStopped { .. }));
        assert!(a.ask("hello".to_string()).is_err());
    }

    #[tokio::test]
    async fn test_ask_tracks_pending_reply() {
        let a: ActorRef<String, String> = ActorRef::spawn("echo", Echo);
        assert!(!a.has_pending_reply());

        let future = a.ask("hello".to_string()).unwrap();
        assert!(a.has_pending_reply());

        // No dispatcher drives this actor; the future is abandoned and the
        // slot drops with the envelope.
        drop(future);
        assert_eq!(a.mailbox_len(), 1);
    }

    #[tokio::test]
    async fn test_restart_budget_notifies_parent() {
        let parent: ActorRef<String, String> = ActorRef::spawn("parent", Echo);
        let child: ActorRef<String, String> = ActorRef::spawn("child", Echo);
        child.start_linked_to(&parent);

        for _ in 0..ACTOR_RESTARTS_COUNT_MAX + 1 {
            child.record_receive_failure(&Error::internal("boom"));
        }

        assert!(child.is_stopped());
        assert_eq!(parent.mailbox_len(), 1);
        match parent.cell().mailbox.poll_head().unwrap().payload {
            Payload::Terminated { actor } => assert_eq!(actor, child.uuid()),
            other => panic!("expected terminated notification, got {}", other.kind()),
        }

        // Crossing the budget again must not notify twice
        child.cell().stopped.store(false, Ordering::Relaxed);
        child.record_receive_failure(&Error::internal("boom"));
        assert_eq!(parent.mailbox_len(), 0);
    }
}

//! Work-stealing message dispatcher
//!
//! TigerStyle: Try-only locks, non-blocking mailbox polls, explicit lifecycle.
//!
//! One `dispatch` schedules exactly one job on the worker pool. The job
//! drains the receiver's mailbox under the receiver's dispatch lock; if the
//! receiver is already being drained by another worker, the job instead picks
//! an idle peer and tail-donates the receiver's queued messages to it. A
//! worker holds at most one dispatch lock at a time and only ever
//! try-acquires, so the dispatcher cannot deadlock.

use std::any::TypeId;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, RwLock};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument};

use selkie_core::constants::{
    DISPATCHER_NAME_LENGTH_BYTES_MAX, DISPATCH_WORKERS_COUNT_DEFAULT, DISPATCH_WORKERS_COUNT_MAX,
};
use selkie_core::error::{Error, Result};

use crate::actor::{Actor, ActorContext, ActorRef};
use crate::mailbox::{Envelope, Payload};

/// Configuration for a work-stealing dispatcher
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Dispatcher name (for worker logs)
    #[serde(default = "default_name")]
    pub name: String,
    /// Number of dispatch workers
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_name() -> String {
    "selkie".to_string()
}

fn default_workers() -> usize {
    DISPATCH_WORKERS_COUNT_DEFAULT
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            workers: default_workers(),
        }
    }
}

impl DispatcherConfig {
    /// Create a configuration with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set the worker count
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() || self.name.len() > DISPATCHER_NAME_LENGTH_BYTES_MAX {
            return Err(Error::InvalidConfiguration {
                field: "name".into(),
                reason: format!(
                    "must be 1..={} bytes",
                    DISPATCHER_NAME_LENGTH_BYTES_MAX
                ),
            });
        }
        if self.workers == 0 || self.workers > DISPATCH_WORKERS_COUNT_MAX {
            return Err(Error::InvalidConfiguration {
                field: "workers".into(),
                reason: format!("must be 1..={}", DISPATCH_WORKERS_COUNT_MAX),
            });
        }
        Ok(())
    }
}

/// One scheduled unit of work: drive this receiver
struct Job<M, R> {
    receiver: ActorRef<M, R>,
}

pub(crate) struct DispatcherCore<M, R> {
    pub(crate) name: String,
    active: AtomicBool,
    members: RwLock<Vec<ActorRef<M, R>>>,
    /// Concrete actor type pinned on first registration
    member_type: OnceLock<(TypeId, &'static str)>,
    /// Round-robin hint for victim selection; racy by design
    last_thief_index: AtomicUsize,
    job_tx: mpsc::UnboundedSender<Job<M, R>>,
}

impl<M, R> DispatcherCore<M, R>
where
    M: Send + 'static,
    R: Send + 'static,
{
    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }

    fn members_snapshot(&self) -> Vec<ActorRef<M, R>> {
        self.members
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn member_count(&self) -> usize {
        self.members.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Add a pool member, pinning the member type on first registration
    fn register(self: Arc<Self>, actor: &ActorRef<M, R>) -> Result<()> {
        let offered = (actor.actor_type(), actor.type_name());
        let pinned = *self.member_type.get_or_init(|| offered);
        if pinned.0 != offered.0 {
            return Err(Error::HeterogeneousPoolMember {
                pinned: pinned.1.to_string(),
                offered: offered.1.to_string(),
            });
        }

        let mut members = self.members.write().unwrap_or_else(|e| e.into_inner());
        if members.iter().any(|m| m.uuid() == actor.uuid()) {
            return Err(Error::DuplicatePoolMember {
                actor: actor.name().to_string(),
            });
        }
        actor.attach(Arc::downgrade(&self));
        members.push(actor.clone());
        debug!(
            dispatcher = %self.name,
            actor = %actor.name(),
            members = members.len(),
            "pool member registered"
        );
        Ok(())
    }

    fn unregister(&self, actor: &ActorRef<M, R>) {
        let mut members = self.members.write().unwrap_or_else(|e| e.into_inner());
        members.retain(|m| m.uuid() != actor.uuid());
        actor.detach();
        debug!(
            dispatcher = %self.name,
            actor = %actor.name(),
            members = members.len(),
            "pool member unregistered"
        );
    }

    /// Enqueue an envelope on the receiver's mailbox and schedule a job
    pub(crate) fn dispatch(
        &self,
        receiver: &ActorRef<M, R>,
        envelope: Envelope<M, R>,
    ) -> Result<()> {
        if !self.is_active() {
            return Err(Error::dispatcher_not_started(&self.name));
        }
        receiver.cell().mailbox.push(envelope);
        self.job_tx
            .send(Job {
                receiver: receiver.clone(),
            })
            .map_err(|_| Error::dispatcher_not_started(&self.name))
    }

    async fn run_job(&self, receiver: &ActorRef<M, R>) {
        if !self.try_process_mailbox(receiver).await {
            if let Some(thief) = self.find_thief(receiver) {
                self.try_donate_and_process(receiver, &thief).await;
            }
        }
    }

    /// Drain the receiver's mailbox if no other worker is doing so
    ///
    /// The loop re-runs while this worker drained at least once and the
    /// mailbox is non-empty again: a producer may enqueue between the final
    /// empty poll and the lock release, and without the retry that message
    /// would sit until the next dispatch.
    async fn try_process_mailbox(&self, actor: &ActorRef<M, R>) -> bool {
        let mut drained = false;
        loop {
            match actor.cell().handler.try_lock() {
                Ok(mut handler) => {
                    self.drain(actor, &mut **handler).await;
                    drained = true;
                }
                Err(_) => {
                    if !drained {
                        return false;
                    }
                    // The current lock holder will observe the late enqueue;
                    // yield before rechecking.
                    tokio::task::yield_now().await;
                }
            }
            if !(drained && !actor.mailbox_is_empty()) {
                break;
            }
        }
        drained
    }

    /// Pick an idle peer to donate to
    ///
    /// Scans the member snapshot starting at the round-robin hint; returns
    /// the first non-stopped peer with an empty mailbox. The hint is only
    /// advanced on a hit.
    fn find_thief(&self, receiver: &ActorRef<M, R>) -> Option<ActorRef<M, R>> {
        let members = self.members_snapshot();
        if members.is_empty() {
            return None;
        }
        let len = members.len();
        let start = self.last_thief_index.load(Ordering::Relaxed) % len;
        for offset in 0..len {
            let index = (start + offset) % len;
            let candidate = &members[index];
            if candidate.uuid() != receiver.uuid()
                && !candidate.is_stopped()
                && candidate.mailbox_is_empty()
            {
                self.last_thief_index
                    .store((index + 1) % len, Ordering::Relaxed);
                return Some(candidate.clone());
            }
        }
        None
    }

    /// Tail-donate the receiver's queued messages to the thief and drain it
    ///
    /// Envelopes move intact, reply slots included, so donated asks still
    /// complete. Returns silently when the thief's lock is contended.
    async fn try_donate_and_process(&self, receiver: &ActorRef<M, R>, thief: &ActorRef<M, R>) {
        let Ok(mut handler) = thief.cell().handler.try_lock() else {
            return;
        };
        let mut donated: u64 = 0;
        loop {
            let Some(mut envelope) = receiver.cell().mailbox.poll_tail() else {
                break;
            };
            if let Payload::User {
                reply: Some(slot), ..
            } = &mut envelope.payload
            {
                slot.rebind(thief.pending_counter());
            }
            thief.cell().mailbox.push(envelope);
            donated += 1;
            self.drain(thief, &mut **handler).await;
        }
        if donated > 0 {
            debug!(
                dispatcher = %self.name,
                owner = %receiver.name(),
                thief = %thief.name(),
                donated,
                "donated queued messages to idle peer"
            );
        }
    }

    /// Head-poll loop under the actor's dispatch lock
    ///
    /// User receive failures never abort the drain: with a reply slot they
    /// complete it with the error; without one they count against the cell's
    /// restart budget.
    async fn drain(&self, actor: &ActorRef<M, R>, handler: &mut dyn Actor<Msg = M, Reply = R>) {
        while let Some(envelope) = actor.cell().mailbox.poll_head() {
            if actor.is_stopped() {
                self.reject(actor, envelope);
                continue;
            }
            match envelope.payload {
                Payload::User { msg, reply } => {
                    let mut ctx = ActorContext::new(actor.clone(), reply);
                    match handler.receive(&mut ctx, msg).await {
                        Ok(value) => {
                            if let Some(slot) = ctx.take_reply() {
                                slot.complete_value(value);
                            }
                        }
                        Err(err) => match ctx.take_reply() {
                            Some(slot) => {
                                debug!(
                                    actor = %actor.name(),
                                    error = %err,
                                    "receive failed, completing reply with error"
                                );
                                slot.complete_error(err);
                            }
                            None => actor.record_receive_failure(&err),
                        },
                    }
                }
                Payload::Stat { reply_tx } => match handler.pool_stats() {
                    Some(stats) => {
                        let _ = reply_tx.send(stats);
                    }
                    None => drop(reply_tx),
                },
                Payload::Terminated { actor: peer } => {
                    let mut ctx = ActorContext::new(actor.clone(), None);
                    if let Err(err) = handler.on_peer_terminated(&mut ctx, peer).await {
                        error!(
                            actor = %actor.name(),
                            error = %err,
                            "terminated notification handler failed"
                        );
                    }
                }
            }
        }
    }

    fn reject(&self, actor: &ActorRef<M, R>, envelope: Envelope<M, R>) {
        let waited_ms = envelope.wait_time_ms(actor.cell().clock.as_ref());
        match envelope.payload {
            Payload::User {
                reply: Some(slot), ..
            } => slot.complete_error(Error::actor_stopped(actor.name())),
            Payload::User { .. } => {
                debug!(
                    actor = %actor.name(),
                    waited_ms,
                    "dropping queued message for stopped actor"
                );
            }
            Payload::Stat { reply_tx } => drop(reply_tx),
            Payload::Terminated { .. } => {}
        }
    }
}

/// Work-stealing dispatcher over a pool of homogeneous actors
///
/// # Lifecycle
/// `new` builds the job queue; `start` spawns the workers and flips the
/// dispatcher active; `shutdown` aborts the workers (cancelling queued jobs),
/// flips it inactive, and clears all member references. Each transition
/// happens at most once.
pub struct WorkStealingDispatcher<M, R> {
    config: DispatcherConfig,
    core: Arc<DispatcherCore<M, R>>,
    job_rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Job<M, R>>>>,
    workers: Vec<JoinHandle<()>>,
    built: bool,
}

impl<M, R> WorkStealingDispatcher<M, R>
where
    M: Send + 'static,
    R: Send + 'static,
{
    /// Create a new dispatcher
    ///
    /// # Errors
    /// `InvalidConfiguration` if the config fails validation.
    pub fn new(config: DispatcherConfig) -> Result<Self> {
        config.validate()?;
        let (job_tx, job_rx) = mpsc::unbounded_channel();
        let core = Arc::new(DispatcherCore {
            name: config.name.clone(),
            active: AtomicBool::new(false),
            members: RwLock::new(Vec::new()),
            member_type: OnceLock::new(),
            last_thief_index: AtomicUsize::new(0),
            job_tx,
        });
        Ok(Self {
            config,
            core,
            job_rx: Arc::new(tokio::sync::Mutex::new(job_rx)),
            workers: Vec::new(),
            built: false,
        })
    }

    /// Get a cloneable handle to this dispatcher
    pub fn handle(&self) -> DispatcherHandle<M, R> {
        DispatcherHandle {
            core: self.core.clone(),
        }
    }

    /// Dispatcher name
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Whether the dispatcher accepts dispatches
    pub fn is_active(&self) -> bool {
        self.core.is_active()
    }

    /// Number of registered pool members
    pub fn member_count(&self) -> usize {
        self.core.member_count()
    }

    /// Snapshot of the registered pool members
    pub fn members(&self) -> Vec<ActorRef<M, R>> {
        self.core.members_snapshot()
    }

    /// Add a pool member
    ///
    /// # Errors
    /// `HeterogeneousPoolMember` if the actor's concrete type differs from
    /// the pinned member type; `DuplicatePoolMember` on uuid collision.
    pub fn register(&self, actor: &ActorRef<M, R>) -> Result<()> {
        self.core.clone().register(actor)
    }

    /// Remove a pool member
    pub fn unregister(&self, actor: &ActorRef<M, R>) {
        self.core.unregister(actor);
    }

    /// Enqueue an envelope for a member and schedule a drain
    ///
    /// # Errors
    /// `DispatcherNotStarted` while inactive.
    pub fn dispatch(&self, receiver: &ActorRef<M, R>, envelope: Envelope<M, R>) -> Result<()> {
        self.core.dispatch(receiver, envelope)
    }

    /// Spawn the worker pool and flip the dispatcher active
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// `ExecutorAlreadyBuilt` if the workers were already spawned (including
    /// after a shutdown; dispatchers do not restart).
    #[instrument(skip(self), fields(dispatcher = %self.config.name), level = "info")]
    pub fn start(&mut self) -> Result<()> {
        if self.built {
            return Err(Error::ExecutorAlreadyBuilt {
                name: self.config.name.clone(),
            });
        }
        self.built = true;

        for worker in 0..self.config.workers {
            let core = self.core.clone();
            let job_rx = self.job_rx.clone();
            self.workers.push(tokio::spawn(async move {
                debug!(dispatcher = %core.name, worker, "dispatch worker started");
                loop {
                    let job = {
                        let mut rx = job_rx.lock().await;
                        rx.recv().await
                    };
                    let Some(job) = job else { break };
                    if !core.is_active() {
                        continue;
                    }
                    core.run_job(&job.receiver).await;
                }
                debug!(dispatcher = %core.name, worker, "dispatch worker stopped");
            }));
        }

        self.core.set_active(true);
        info!(
            dispatcher = %self.config.name,
            workers = self.config.workers,
            "dispatcher started"
        );
        Ok(())
    }

    /// Stop the worker pool, cancel queued jobs, and clear member references
    ///
    /// Messages still queued in member mailboxes are not drained.
    #[instrument(skip(self), fields(dispatcher = %self.config.name), level = "info")]
    pub fn shutdown(&mut self) {
        self.core.set_active(false);
        for worker in self.workers.drain(..) {
            worker.abort();
        }
        // Members stay attached to the (now inactive) core so later sends
        // surface DispatcherNotStarted instead of queueing silently.
        let members = {
            let mut members = self
                .core
                .members
                .write()
                .unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *members)
        };
        info!(
            dispatcher = %self.config.name,
            members = members.len(),
            "dispatcher shut down"
        );
    }
}

impl<M, R> Drop for WorkStealingDispatcher<M, R> {
    fn drop(&mut self) {
        for worker in self.workers.drain(..) {
            worker.abort();
        }
    }
}

/// Cloneable handle to a running dispatcher
///
/// Used by pool routers to register and unregister delegates.
pub struct DispatcherHandle<M, R> {
    core: Arc<DispatcherCore<M, R>>,
}

impl<M, R> Clone for DispatcherHandle<M, R> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
        }
    }
}

impl<M, R> DispatcherHandle<M, R>
where
    M: Send + 'static,
    R: Send + 'static,
{
    /// Dispatcher name
    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// Whether the dispatcher accepts dispatches
    pub fn is_active(&self) -> bool {
        self.core.is_active()
    }

    /// Number of registered pool members
    pub fn member_count(&self) -> usize {
        self.core.member_count()
    }

    /// Snapshot of the registered pool members
    pub fn members(&self) -> Vec<ActorRef<M, R>> {
        self.core.members_snapshot()
    }

    /// Add a pool member
    pub fn register(&self, actor: &ActorRef<M, R>) -> Result<()> {
        self.core.clone().register(actor)
    }

    /// Remove a pool member
    pub fn unregister(&self, actor: &ActorRef<M, R>) {
        self.core.unregister(actor);
    }

    /// Enqueue an envelope for a member and schedule a drain
    pub fn dispatch(&self, receiver: &ActorRef<M, R>, envelope: Envelope<M, R>) -> Result<()> {
        self.core.dispatch(receiver, envelope)
    }
}

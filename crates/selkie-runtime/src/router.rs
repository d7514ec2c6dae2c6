//! Pool router
//!
//! TigerStyle: Serialized state transitions, detached reply forwarding.
//!
//! The router is an ordinary actor: its delegate set is only ever touched
//! from its own receive, which the host dispatcher serializes through the
//! router's dispatch lock. Per user message it adjusts capacity, selects
//! recipients, and forwards. Ask replies are chained to the original caller
//! from detached tasks so the router never blocks on a delegate.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{debug, error};
use uuid::Uuid;

use selkie_core::error::{Error, Result};

use crate::actor::{Actor, ActorContext, ActorRef};
use crate::capacity::CapacityStrategy;
use crate::dispatcher::DispatcherHandle;
use crate::mailbox::PoolStats;
use crate::selector::Selector;

/// Factory producing new delegates for a pool
pub trait DelegateFactory<M, R>: Send + 'static {
    /// Create one delegate
    fn instance(&self) -> Result<ActorRef<M, R>>;
}

impl<M, R, F> DelegateFactory<M, R> for F
where
    F: Fn() -> Result<ActorRef<M, R>> + Send + 'static,
{
    fn instance(&self) -> Result<ActorRef<M, R>> {
        self()
    }
}

/// Composition of the router's three extension points
pub struct RouterConfig<M, R> {
    factory: Box<dyn DelegateFactory<M, R>>,
    selector: Box<dyn Selector<M, R>>,
    capacity: Box<dyn CapacityStrategy<M, R>>,
}

impl<M, R> RouterConfig<M, R> {
    /// Bundle a delegate factory, a selector, and a capacity strategy
    pub fn new(
        factory: impl DelegateFactory<M, R>,
        selector: impl Selector<M, R>,
        capacity: impl CapacityStrategy<M, R>,
    ) -> Self {
        Self {
            factory: Box::new(factory),
            selector: Box::new(selector),
            capacity: Box::new(capacity),
        }
    }
}

/// Actor routing messages over a dynamic set of delegate actors
///
/// Delegates are spawned through the configured factory, linked to the
/// router, and registered with the delegate dispatcher. A delegate that
/// exhausts its restart budget is removed from the set without replacement;
/// the capacity step of the next user message refills the pool.
pub struct PoolRouter<M, R> {
    dispatcher: DispatcherHandle<M, R>,
    factory: Box<dyn DelegateFactory<M, R>>,
    selector: Box<dyn Selector<M, R>>,
    capacity: Box<dyn CapacityStrategy<M, R>>,
    delegates: Vec<ActorRef<M, R>>,
    last_capacity_delta: i64,
    last_selection_count: usize,
}

impl<M, R> PoolRouter<M, R>
where
    M: Send + 'static,
    R: Send + 'static,
{
    /// Create a router managing delegates on the given dispatcher
    pub fn new(dispatcher: DispatcherHandle<M, R>, config: RouterConfig<M, R>) -> Self {
        Self {
            dispatcher,
            factory: config.factory,
            selector: config.selector,
            capacity: config.capacity,
            delegates: Vec::new(),
            last_capacity_delta: 0,
            last_selection_count: 0,
        }
    }

    /// Current number of delegates
    pub fn delegate_count(&self) -> usize {
        self.delegates.len()
    }

    fn resize(&mut self, myself: &ActorRef<M, R>) -> Result<()> {
        let delta = self.capacity.capacity(&self.delegates);
        if delta > 0 {
            for _ in 0..delta {
                let delegate = self.factory.instance()?;
                delegate.start_linked_to(myself);
                self.dispatcher.register(&delegate)?;
                self.delegates.push(delegate);
            }
            debug!(
                router = %myself.name(),
                delta,
                delegates = self.delegates.len(),
                "pool capacity increased"
            );
        } else if delta < 0 {
            let cut = delta.unsigned_abs() as usize;
            let keep = self.delegates.len().saturating_sub(cut);
            for delegate in self.delegates.split_off(keep) {
                self.dispatcher.unregister(&delegate);
                delegate.stop();
            }
            debug!(
                router = %myself.name(),
                delta,
                delegates = self.delegates.len(),
                "pool capacity decreased"
            );
        }
        self.last_capacity_delta = delta;
        Ok(())
    }
}

#[async_trait]
impl<M, R> Actor for PoolRouter<M, R>
where
    M: Clone + Send + 'static,
    R: Send + 'static,
{
    type Msg = M;
    type Reply = R;

    async fn receive(
        &mut self,
        ctx: &mut ActorContext<M, R>,
        msg: M,
    ) -> Result<Option<R>> {
        // The slot leaves the context before resize: a factory or startup
        // error is the router's own failure (it counts against the router's
        // restart budget), and the caller's future sees the dropped slot.
        let reply = ctx.take_reply();
        if let Err(err) = self.resize(&ctx.myself) {
            drop(reply);
            return Err(err);
        }

        let recipients = self.selector.select(&self.delegates);
        self.last_selection_count = recipients.len();

        match reply {
            None => {
                for delegate in &recipients {
                    if let Err(err) = delegate.send(msg.clone()) {
                        error!(
                            delegate = %delegate.name(),
                            error = %err,
                            "failed to forward message"
                        );
                    }
                }
            }
            Some(slot) => {
                // First completed delegate wins the slot; the rest are
                // discarded.
                let slot = Arc::new(Mutex::new(Some(slot)));
                for delegate in &recipients {
                    match delegate.ask(msg.clone()) {
                        Ok(future) => {
                            let slot = slot.clone();
                            let delegate_name = delegate.name().to_string();
                            tokio::spawn(async move {
                                let outcome = future.recv().await;
                                let taken = slot
                                    .lock()
                                    .unwrap_or_else(|e| e.into_inner())
                                    .take();
                                if let Some(slot) = taken {
                                    match outcome {
                                        Ok(value) => slot.complete_value(value),
                                        Err(err) => slot.complete_error(
                                            Error::delegate_invocation_failed(
                                                delegate_name,
                                                err.to_string(),
                                            ),
                                        ),
                                    }
                                }
                            });
                        }
                        Err(err) => {
                            let taken =
                                slot.lock().unwrap_or_else(|e| e.into_inner()).take();
                            if let Some(slot) = taken {
                                slot.complete_error(Error::delegate_invocation_failed(
                                    delegate.name(),
                                    err.to_string(),
                                ));
                            }
                        }
                    }
                }
            }
        }

        Ok(None)
    }

    async fn on_peer_terminated(
        &mut self,
        _ctx: &mut ActorContext<M, R>,
        peer: Uuid,
    ) -> Result<()> {
        if let Some(position) = self.delegates.iter().position(|d| d.uuid() == peer) {
            let delegate = self.delegates.remove(position);
            self.dispatcher.unregister(&delegate);
            delegate.stop();
            error!(
                delegate = %delegate.name(),
                uuid = %peer,
                delegates = self.delegates.len(),
                "removed delegate after restart budget exhausted"
            );
        }
        Ok(())
    }

    fn pool_stats(&self) -> Option<PoolStats> {
        Some(PoolStats {
            delegates: self.delegates.len(),
            last_capacity_delta: self.last_capacity_delta,
            last_selection_count: self.last_selection_count,
        })
    }
}

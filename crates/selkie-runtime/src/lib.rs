//! Selkie Runtime
//!
//! Work-stealing message dispatcher and actor pool router.
//!
//! # Overview
//!
//! The runtime provides:
//! - Per-actor serial message delivery through a try-only dispatch lock
//! - A worker pool that drains mailboxes and tail-donates queued work from
//!   busy actors to idle peers
//! - A pool router with pluggable selectors and capacity strategies that
//!   grows and shrinks its delegate set under load
//!
//! # TigerStyle
//! - At most one worker drains any actor at any instant
//! - Try-only lock acquisition on every dispatch path (no deadlocks)
//! - Unbounded mailboxes; donation moves envelopes intact

pub mod actor;
pub mod capacity;
pub mod dispatcher;
pub mod mailbox;
pub mod router;
pub mod selector;

pub use actor::{Actor, ActorContext, ActorRef};
pub use capacity::{
    ActiveFuturesPressure, BasicBackoff, BasicFilter, BasicRampup, BoundedCapacity,
    CapacityStrategy, Filter, FixedSize, MailboxPressure, Pressure, RunningMeanBackoff,
};
pub use dispatcher::{DispatcherConfig, DispatcherHandle, WorkStealingDispatcher};
pub use mailbox::{Envelope, Mailbox, Payload, PoolStats, ReplySlot};
pub use router::{DelegateFactory, PoolRouter, RouterConfig};
pub use selector::{RoundRobin, Selector, SmallestMailbox};

//! Delegate selectors for the pool router
//!
//! A selector picks which delegates receive the current message. Selection
//! size is `count`, reduced to the pool size when `partial_fill` is set;
//! otherwise the pool is walked with repetition until `count` slots are
//! filled.

use selkie_core::constants::POOL_SELECTION_COUNT_MIN;

use crate::actor::ActorRef;

/// Policy choosing the recipients of a routed message
pub trait Selector<M, R>: Send + 'static {
    /// Select recipients from the current delegate set
    ///
    /// An empty delegate set always yields an empty selection.
    fn select(&mut self, delegates: &[ActorRef<M, R>]) -> Vec<ActorRef<M, R>>;
}

fn selection_size(count: usize, partial_fill: bool, delegates: usize) -> usize {
    if delegates == 0 {
        0
    } else if partial_fill {
        count.min(delegates)
    } else {
        count
    }
}

/// Selects the delegates with the fewest queued messages
///
/// Ordering is ascending by mailbox size with the uuid as a deterministic
/// tiebreaker.
#[derive(Debug, Clone)]
pub struct SmallestMailbox {
    count: usize,
    partial_fill: bool,
}

impl SmallestMailbox {
    /// Create a selector picking `count` delegates per message
    pub fn new(count: usize, partial_fill: bool) -> Self {
        debug_assert!(count >= POOL_SELECTION_COUNT_MIN);
        Self {
            count,
            partial_fill,
        }
    }
}

impl<M, R> Selector<M, R> for SmallestMailbox
where
    M: Send + 'static,
    R: Send + 'static,
{
    fn select(&mut self, delegates: &[ActorRef<M, R>]) -> Vec<ActorRef<M, R>> {
        let want = selection_size(self.count, self.partial_fill, delegates.len());
        if want == 0 {
            return Vec::new();
        }
        let mut order: Vec<&ActorRef<M, R>> = delegates.iter().collect();
        order.sort_by_key(|d| (d.mailbox_len(), d.uuid()));
        (0..want).map(|slot| order[slot % order.len()].clone()).collect()
    }
}

/// Rotates through the delegate set one slot at a time
///
/// The cursor persists across messages, so successive selections walk the
/// whole pool.
#[derive(Debug, Clone)]
pub struct RoundRobin {
    count: usize,
    partial_fill: bool,
    cursor: usize,
}

impl RoundRobin {
    /// Create a selector picking `count` delegates per message
    pub fn new(count: usize, partial_fill: bool) -> Self {
        debug_assert!(count >= POOL_SELECTION_COUNT_MIN);
        Self {
            count,
            partial_fill,
            cursor: 0,
        }
    }
}

impl<M, R> Selector<M, R> for RoundRobin
where
    M: Send + 'static,
    R: Send + 'static,
{
    fn select(&mut self, delegates: &[ActorRef<M, R>]) -> Vec<ActorRef<M, R>> {
        let want = selection_size(self.count, self.partial_fill, delegates.len());
        let mut out = Vec::with_capacity(want);
        for _ in 0..want {
            // Modulo at use time: the pool may have resized since the last
            // selection.
            let index = self.cursor % delegates.len();
            out.push(delegates[index].clone());
            self.cursor = self.cursor.wrapping_add(1);
        }
        out
    }
}

//! Capacity strategies for the pool router
//!
//! TigerStyle: Explicit bounds, clamped adjustments.
//!
//! A capacity strategy returns the requested change in delegate count for
//! the current message: positive to grow, negative to shrink, zero to hold.
//! The bounded strategy composes a pressure reading (how loaded the pool is)
//! with a filter (how aggressively to react).

use selkie_core::constants::POOL_DELEGATES_COUNT_MAX;

use crate::actor::ActorRef;

/// Policy returning the requested change in delegate count
pub trait CapacityStrategy<M, R>: Send + 'static {
    /// Compute the delta for the current delegate set
    fn capacity(&mut self, delegates: &[ActorRef<M, R>]) -> i64;
}

/// Grows the pool to a fixed size and never shrinks it
#[derive(Debug, Clone)]
pub struct FixedSize {
    limit: usize,
}

impl FixedSize {
    /// Create a strategy holding the pool at `limit` delegates
    pub fn new(limit: usize) -> Self {
        debug_assert!(limit >= 1);
        debug_assert!(limit <= POOL_DELEGATES_COUNT_MAX);
        Self { limit }
    }
}

impl<M, R> CapacityStrategy<M, R> for FixedSize
where
    M: Send + 'static,
    R: Send + 'static,
{
    fn capacity(&mut self, delegates: &[ActorRef<M, R>]) -> i64 {
        if delegates.len() >= self.limit {
            0
        } else {
            (self.limit - delegates.len()) as i64
        }
    }
}

/// Scalar load measure over the delegate set
pub trait Pressure<M, R>: Send + 'static {
    /// Count of delegates considered under pressure
    fn pressure(&self, delegates: &[ActorRef<M, R>]) -> usize;
}

/// Counts delegates whose mailbox exceeds a threshold
#[derive(Debug, Clone)]
pub struct MailboxPressure {
    threshold: usize,
}

impl MailboxPressure {
    /// Create a pressure gauge with the given mailbox threshold
    pub fn new(threshold: usize) -> Self {
        Self { threshold }
    }
}

impl<M, R> Pressure<M, R> for MailboxPressure
where
    M: Send + 'static,
    R: Send + 'static,
{
    fn pressure(&self, delegates: &[ActorRef<M, R>]) -> usize {
        delegates
            .iter()
            .filter(|d| d.mailbox_len() > self.threshold)
            .count()
    }
}

/// Counts delegates currently holding an un-resolved reply slot
#[derive(Debug, Clone, Default)]
pub struct ActiveFuturesPressure;

impl ActiveFuturesPressure {
    /// Create the gauge
    pub fn new() -> Self {
        Self
    }
}

impl<M, R> Pressure<M, R> for ActiveFuturesPressure
where
    M: Send + 'static,
    R: Send + 'static,
{
    fn pressure(&self, delegates: &[ActorRef<M, R>]) -> usize {
        delegates.iter().filter(|d| d.has_pending_reply()).count()
    }
}

/// Maps a `(pressure, capacity)` reading to a capacity delta
pub trait Filter: Send + 'static {
    /// Compute the delta
    fn delta(&mut self, pressure: usize, capacity: usize) -> i64;
}

/// Grows by a fraction of current capacity while saturated
#[derive(Debug, Clone)]
pub struct BasicRampup {
    rate: f64,
}

impl BasicRampup {
    /// Create a rampup growing by `ceil(rate * capacity)` under saturation
    pub fn new(rate: f64) -> Self {
        debug_assert!(rate > 0.0);
        Self { rate }
    }
}

impl Filter for BasicRampup {
    fn delta(&mut self, pressure: usize, capacity: usize) -> i64 {
        if pressure >= capacity {
            (self.rate * capacity as f64).ceil() as i64
        } else {
            0
        }
    }
}

/// Shrinks by a fraction of current capacity while mostly idle
#[derive(Debug, Clone)]
pub struct BasicBackoff {
    threshold: f64,
    rate: f64,
}

impl BasicBackoff {
    /// Create a backoff cutting `ceil(-rate * capacity)` below `threshold`
    /// utilization
    pub fn new(threshold: f64, rate: f64) -> Self {
        debug_assert!(threshold > 0.0 && threshold < 1.0);
        debug_assert!(rate > 0.0);
        Self { threshold, rate }
    }
}

impl Filter for BasicBackoff {
    fn delta(&mut self, pressure: usize, capacity: usize) -> i64 {
        if capacity > 0 && (pressure as f64 / capacity as f64) < self.threshold {
            (-(self.rate * capacity as f64)).ceil() as i64
        } else {
            0
        }
    }
}

/// Sum of rampup and backoff
///
/// Both sides are evaluated on every reading so stateful variants advance in
/// step; at most one of them is nonzero in any regime.
#[derive(Debug, Clone)]
pub struct BasicFilter {
    rampup: BasicRampup,
    backoff: BasicBackoff,
}

impl BasicFilter {
    /// Compose a rampup and a backoff
    pub fn new(rampup_rate: f64, backoff_threshold: f64, backoff_rate: f64) -> Self {
        Self {
            rampup: BasicRampup::new(rampup_rate),
            backoff: BasicBackoff::new(backoff_threshold, backoff_rate),
        }
    }
}

impl Filter for BasicFilter {
    fn delta(&mut self, pressure: usize, capacity: usize) -> i64 {
        let up = self.rampup.delta(pressure, capacity);
        let down = self.backoff.delta(pressure, capacity);
        up + down
    }
}

/// Backoff gated on both the instantaneous and the running-mean utilization
///
/// Cuts `floor(rate * (capacity - pressure))` — a proportional cut, larger
/// than the basic backoff's — but only when the pool has been idle on
/// average, not just momentarily.
#[derive(Debug, Clone)]
pub struct RunningMeanBackoff {
    threshold: f64,
    rate: f64,
    pressure_sum: f64,
    capacity_sum: f64,
}

impl RunningMeanBackoff {
    /// Create a running-mean backoff
    pub fn new(threshold: f64, rate: f64) -> Self {
        debug_assert!(threshold > 0.0 && threshold < 1.0);
        debug_assert!(rate > 0.0);
        Self {
            threshold,
            rate,
            pressure_sum: 0.0,
            capacity_sum: 0.0,
        }
    }

    /// Clear both accumulators
    pub fn reset(&mut self) {
        self.pressure_sum = 0.0;
        self.capacity_sum = 0.0;
    }
}

impl Filter for RunningMeanBackoff {
    fn delta(&mut self, pressure: usize, capacity: usize) -> i64 {
        self.pressure_sum += pressure as f64;
        self.capacity_sum += capacity as f64;

        let instant_low =
            capacity > 0 && (pressure as f64 / capacity as f64) < self.threshold;
        let mean_low =
            self.capacity_sum > 0.0 && (self.pressure_sum / self.capacity_sum) < self.threshold;

        if instant_low && mean_low {
            let spare = capacity.saturating_sub(pressure);
            -((self.rate * spare as f64).floor() as i64)
        } else {
            0
        }
    }
}

/// Keeps the delegate count within `[lower, upper]`
///
/// The raw delta from the filter is clamped so the resulting pool size never
/// leaves the bounds; with an empty pool this bootstraps straight to the
/// lower bound.
pub struct BoundedCapacity<M, R> {
    lower: usize,
    upper: usize,
    pressure: Box<dyn Pressure<M, R>>,
    filter: Box<dyn Filter>,
}

impl<M, R> BoundedCapacity<M, R>
where
    M: Send + 'static,
    R: Send + 'static,
{
    /// Create a bounded strategy from a pressure gauge and a filter
    pub fn new(
        lower: usize,
        upper: usize,
        pressure: impl Pressure<M, R>,
        filter: impl Filter,
    ) -> Self {
        debug_assert!(lower <= upper);
        debug_assert!(upper <= POOL_DELEGATES_COUNT_MAX);
        Self {
            lower,
            upper,
            pressure: Box::new(pressure),
            filter: Box::new(filter),
        }
    }
}

impl<M, R> CapacityStrategy<M, R> for BoundedCapacity<M, R>
where
    M: Send + 'static,
    R: Send + 'static,
{
    fn capacity(&mut self, delegates: &[ActorRef<M, R>]) -> i64 {
        let current = delegates.len() as i64;
        let reading = self.pressure.pressure(delegates);
        let delta = self.filter.delta(reading, delegates.len());
        let target = (current + delta).clamp(self.lower as i64, self.upper as i64);
        target - current
    }
}

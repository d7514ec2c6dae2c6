//! TigerStyle constants for Selkie
//!
//! All limits are explicit, use big-endian naming (most significant first),
//! and include units in the name.

// =============================================================================
// Dispatcher Limits
// =============================================================================

/// Default number of dispatch workers per dispatcher
pub const DISPATCH_WORKERS_COUNT_DEFAULT: usize = 4;

/// Maximum number of dispatch workers per dispatcher
pub const DISPATCH_WORKERS_COUNT_MAX: usize = 256;

/// Maximum length of a dispatcher name in bytes
pub const DISPATCHER_NAME_LENGTH_BYTES_MAX: usize = 128;

// =============================================================================
// Actor Limits
// =============================================================================

/// Maximum length of an actor name in bytes
pub const ACTOR_NAME_LENGTH_BYTES_MAX: usize = 128;

/// Restart budget per actor before the linked parent is notified
pub const ACTOR_RESTARTS_COUNT_MAX: u32 = 5;

// =============================================================================
// Pool Limits
// =============================================================================

/// Maximum number of delegates a pool router will manage
pub const POOL_DELEGATES_COUNT_MAX: usize = 1024;

/// Minimum selection size for pool selectors
pub const POOL_SELECTION_COUNT_MIN: usize = 1;

// =============================================================================
// Reply Limits
// =============================================================================

/// Default timeout when awaiting a reply future in milliseconds (5 sec)
pub const REPLY_TIMEOUT_MS_DEFAULT: u64 = 5 * 1000;

// Compile-time assertions for constant validity
const _: () = {
    assert!(DISPATCH_WORKERS_COUNT_DEFAULT >= 1);
    assert!(DISPATCH_WORKERS_COUNT_DEFAULT <= DISPATCH_WORKERS_COUNT_MAX);
    assert!(ACTOR_RESTARTS_COUNT_MAX >= 1);
    assert!(POOL_DELEGATES_COUNT_MAX >= 2);
    assert!(REPLY_TIMEOUT_MS_DEFAULT >= 100);
};

//! Selkie Core
//!
//! Core types, errors, and constants for the Selkie actor dispatch runtime.
//!
//! # Overview
//!
//! Selkie is a work-stealing dispatch core for pools of homogeneous actors:
//! a dispatcher that drains per-actor mailboxes and donates queued work to
//! idle peers, and a pool router that grows and shrinks its delegate set
//! under load.
//!
//! This crate carries the shared primitives: the error taxonomy, explicit
//! limits, the time abstraction, and the reply future adapter.
//!
//! # TigerStyle
//!
//! - Safety > Performance > Developer Experience
//! - Explicit limits with big-endian naming (e.g., `DISPATCH_WORKERS_COUNT_MAX`)
//! - Try-only locks on every dispatch path

pub mod clock;
pub mod constants;
pub mod error;
pub mod reply;
pub mod telemetry;

pub use clock::{TimeProvider, WallClock};
pub use constants::*;
pub use error::{Error, Result};
pub use reply::{ReplyFuture, ReplyValue};
pub use telemetry::{init_telemetry, TelemetryConfig};

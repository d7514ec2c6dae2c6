//! Error types for Selkie
//!
//! TigerStyle: Explicit error types with context, using thiserror.

use thiserror::Error;

/// Result type alias for Selkie operations
pub type Result<T> = std::result::Result<T, Error>;

/// Selkie error types
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Dispatcher Errors
    // =========================================================================
    #[error("Dispatcher not started: {name}")]
    DispatcherNotStarted { name: String },

    #[error("Dispatcher executor already built: {name}")]
    ExecutorAlreadyBuilt { name: String },

    #[error("Heterogeneous pool member: pool pinned to {pinned}, got {offered}")]
    HeterogeneousPoolMember { pinned: String, offered: String },

    #[error("Duplicate pool member: {actor}")]
    DuplicatePoolMember { actor: String },

    // =========================================================================
    // Actor Errors
    // =========================================================================
    #[error("Actor stopped: {actor}")]
    ActorStopped { actor: String },

    #[error("Reply channel dropped before completion: {actor}")]
    ReplyDropped { actor: String },

    #[error("Delegate invocation failed: {delegate}, reason: {reason}")]
    DelegateInvocationFailed { delegate: String, reason: String },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("Invalid configuration: {field}, reason: {reason}")]
    InvalidConfiguration { field: String, reason: String },

    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Create a dispatcher-not-started error
    pub fn dispatcher_not_started(name: impl Into<String>) -> Self {
        Self::DispatcherNotStarted { name: name.into() }
    }

    /// Create an actor-stopped error
    pub fn actor_stopped(actor: impl Into<String>) -> Self {
        Self::ActorStopped {
            actor: actor.into(),
        }
    }

    /// Create a reply-dropped error
    pub fn reply_dropped(actor: impl Into<String>) -> Self {
        Self::ReplyDropped {
            actor: actor.into(),
        }
    }

    /// Create a delegate invocation error
    pub fn delegate_invocation_failed(
        delegate: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::DelegateInvocationFailed {
            delegate: delegate.into(),
            reason: reason.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Check if this error indicates a caller bug rather than an operational
    /// condition
    pub fn is_programmer_error(&self) -> bool {
        matches!(
            self,
            Self::DispatcherNotStarted { .. }
                | Self::ExecutorAlreadyBuilt { .. }
                | Self::HeterogeneousPoolMember { .. }
                | Self::DuplicatePoolMember { .. }
                | Self::InvalidConfiguration { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::dispatcher_not_started("pooled");
        assert!(err.to_string().contains("pooled"));
    }

    #[test]
    fn test_error_is_programmer_error() {
        assert!(Error::HeterogeneousPoolMember {
            pinned: "A".into(),
            offered: "B".into()
        }
        .is_programmer_error());
        assert!(!Error::actor_stopped("worker-1").is_programmer_error());
    }

    #[test]
    fn test_error_from_anyhow() {
        let err: Error = anyhow::anyhow!("user receive blew up").into();
        assert!(err.to_string().contains("blew up"));
        assert!(!err.is_programmer_error());
    }
}

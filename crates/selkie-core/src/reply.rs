//! Reply future adapter
//!
//! TigerStyle: Single-assignment reply channels with explicit timeout
//! behavior.
//!
//! An ask enqueues a message together with a reply slot; the slot is
//! completed exactly once with a value or an error. `ReplyFuture` is the
//! caller-side adapter over that channel. A timed-out await yields no value
//! but never cancels the underlying work.

use crate::constants::REPLY_TIMEOUT_MS_DEFAULT;
use crate::error::{Error, Result};
use std::time::Duration;
use tokio::sync::oneshot;

/// The value a reply slot is completed with: `None` means the responder
/// finished without producing a value.
pub type ReplyValue<R> = Result<Option<R>>;

/// Caller-side future for an ask reply
#[derive(Debug)]
pub struct ReplyFuture<R> {
    rx: oneshot::Receiver<ReplyValue<R>>,
    /// Identity of the asked actor, for error context
    actor: String,
}

impl<R> ReplyFuture<R> {
    /// Create a reply future over a completion channel
    pub fn new(rx: oneshot::Receiver<ReplyValue<R>>, actor: impl Into<String>) -> Self {
        Self {
            rx,
            actor: actor.into(),
        }
    }

    /// Await the reply without a timeout
    ///
    /// # Errors
    /// `ReplyDropped` if the responder went away without completing the slot;
    /// otherwise whatever error the responder completed the slot with.
    pub async fn recv(self) -> ReplyValue<R> {
        match self.rx.await {
            Ok(value) => value,
            Err(_) => Err(Error::reply_dropped(self.actor)),
        }
    }

    /// Await the reply for at most `timeout`
    ///
    /// A timeout yields `Ok(None)`; the underlying work is not cancelled and
    /// its eventual completion is discarded.
    pub async fn recv_timeout(self, timeout: Duration) -> ReplyValue<R> {
        match tokio::time::timeout(timeout, self.rx).await {
            Ok(Ok(value)) => value,
            Ok(Err(_)) => Err(Error::reply_dropped(self.actor)),
            Err(_) => Ok(None),
        }
    }

    /// Await the reply with the default timeout
    pub async fn recv_default_timeout(self) -> ReplyValue<R> {
        self.recv_timeout(Duration::from_millis(REPLY_TIMEOUT_MS_DEFAULT))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reply_future_value() {
        let (tx, rx) = oneshot::channel();
        let future = ReplyFuture::new(rx, "worker-1");

        tx.send(Ok(Some(42u32))).unwrap();
        assert_eq!(future.recv().await.unwrap(), Some(42));
    }

    #[tokio::test]
    async fn test_reply_future_no_value() {
        let (tx, rx) = oneshot::channel::<ReplyValue<u32>>();
        let future = ReplyFuture::new(rx, "worker-1");

        tx.send(Ok(None)).unwrap();
        assert_eq!(future.recv().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_reply_future_error() {
        let (tx, rx) = oneshot::channel::<ReplyValue<u32>>();
        let future = ReplyFuture::new(rx, "worker-1");

        tx.send(Err(Error::internal("delegate raised"))).unwrap();
        assert!(future.recv().await.is_err());
    }

    #[tokio::test]
    async fn test_reply_future_dropped_sender() {
        let (tx, rx) = oneshot::channel::<ReplyValue<u32>>();
        let future = ReplyFuture::new(rx, "worker-1");

        drop(tx);
        let err = future.recv().await.unwrap_err();
        assert!(matches!(err, Error::ReplyDropped { .. }));
    }

    #[tokio::test]
    async fn test_reply_future_timeout_yields_none() {
        let (tx, rx) = oneshot::channel::<ReplyValue<u32>>();
        let future = ReplyFuture::new(rx, "worker-1");

        let value = future.recv_timeout(Duration::from_millis(20)).await;
        assert_eq!(value.unwrap(), None);

        // The channel is still usable from the sender's point of view: the
        // timeout did not cancel the work, completion is simply discarded.
        let _ = tx;
    }
}

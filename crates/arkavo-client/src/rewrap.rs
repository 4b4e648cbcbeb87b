//! Pending rewrap negotiation table.
//!
//! Correlates `RewrappedKey` responses back to the callers awaiting
//! them. Several callers can wait on the same correlation id; only the
//! first registration puts a request on the wire, and one response
//! settles every waiter.

#![allow(clippy::expect_used, reason = "Mutex poisoning should cause a panic")]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use arkavo_proto::REWRAP_ID_SIZE;
use bytes::Bytes;
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::ClientError;

type RewrapResult = Result<Bytes, ClientError>;

/// Table of in-flight rewrap negotiations keyed by correlation id.
///
/// Clone shares the same underlying table.
#[derive(Clone, Default)]
pub(crate) struct PendingRewraps {
    inner: Arc<Mutex<HashMap<[u8; REWRAP_ID_SIZE], Vec<oneshot::Sender<RewrapResult>>>>>,
}

impl PendingRewraps {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register a waiter for `id`.
    ///
    /// The returned flag is true when this is the first waiter, meaning
    /// the caller owns sending the request frame.
    pub(crate) fn register(&self, id: [u8; REWRAP_ID_SIZE]) -> (oneshot::Receiver<RewrapResult>, bool) {
        let (tx, rx) = oneshot::channel();
        let mut inner = self.inner.lock().expect("pending rewrap lock");

        let waiters = inner.entry(id).or_default();
        let is_first = waiters.is_empty();
        waiters.push(tx);

        (rx, is_first)
    }

    /// Settle every waiter for `id` with the rewrapped key.
    ///
    /// A response with no registered waiters is dropped; the service may
    /// answer after a timeout already abandoned the negotiation.
    pub(crate) fn resolve(&self, id: [u8; REWRAP_ID_SIZE], key: &Bytes) {
        let waiters = self.inner.lock().expect("pending rewrap lock").remove(&id);

        let Some(waiters) = waiters else {
            debug!("dropping rewrap response with no waiters");
            return;
        };

        for tx in waiters {
            // A waiter that timed out dropped its receiver; ignore.
            let _ = tx.send(Ok(key.clone()));
        }
    }

    /// Fail every waiter for `id` with `ConnectionClosed`.
    pub(crate) fn fail(&self, id: [u8; REWRAP_ID_SIZE]) {
        let waiters = self.inner.lock().expect("pending rewrap lock").remove(&id);

        for tx in waiters.into_iter().flatten() {
            let _ = tx.send(Err(ClientError::ConnectionClosed));
        }
    }

    /// Fail every outstanding negotiation. Called on disconnect.
    pub(crate) fn fail_all(&self) {
        let drained: Vec<_> =
            self.inner.lock().expect("pending rewrap lock").drain().collect();

        for (_, waiters) in drained {
            for tx in waiters {
                let _ = tx.send(Err(ClientError::ConnectionClosed));
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn outstanding(&self) -> usize {
        self.inner.lock().expect("pending rewrap lock").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn single_waiter_receives_key() {
        let pending = PendingRewraps::new();
        let (rx, is_first) = pending.register([1u8; 32]);
        assert!(is_first);

        pending.resolve([1u8; 32], &Bytes::from_static(b"wrapped"));
        let result = rx.await.expect("sender kept");
        assert_eq!(result.expect("resolved"), Bytes::from_static(b"wrapped"));
        assert_eq!(pending.outstanding(), 0);
    }

    #[tokio::test]
    async fn duplicate_registration_shares_one_negotiation() {
        let pending = PendingRewraps::new();
        let (rx_a, first_a) = pending.register([7u8; 32]);
        let (rx_b, first_b) = pending.register([7u8; 32]);
        assert!(first_a);
        assert!(!first_b);

        pending.resolve([7u8; 32], &Bytes::from_static(b"key"));
        assert_eq!(rx_a.await.expect("sender kept").expect("resolved"), Bytes::from_static(b"key"));
        assert_eq!(rx_b.await.expect("sender kept").expect("resolved"), Bytes::from_static(b"key"));
    }

    #[tokio::test]
    async fn fail_all_settles_every_waiter() {
        let pending = PendingRewraps::new();
        let (rx_a, _) = pending.register([1u8; 32]);
        let (rx_b, _) = pending.register([2u8; 32]);

        pending.fail_all();

        assert!(matches!(rx_a.await.expect("sender kept"), Err(ClientError::ConnectionClosed)));
        assert!(matches!(rx_b.await.expect("sender kept"), Err(ClientError::ConnectionClosed)));
        assert_eq!(pending.outstanding(), 0);
    }

    #[test]
    fn unsolicited_response_is_dropped() {
        let pending = PendingRewraps::new();
        pending.resolve([9u8; 32], &Bytes::from_static(b"key"));
        assert_eq!(pending.outstanding(), 0);
    }
}

//! Stream demultiplexer.
//!
//! Inbound `Message` frames carry a 32-byte stream id prefix; the router
//! strips it and hands the remainder to the handler registered for that
//! stream. At most one handler per stream: a later subscription replaces
//! the earlier one, and the earlier subscription's token goes stale so a
//! late unsubscribe cannot tear down its replacement.

#![allow(clippy::expect_used, reason = "Mutex poisoning should cause a panic")]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use arkavo_proto::StreamId;
use bytes::Bytes;
use tracing::debug;

/// Handler invoked with the payload of each frame addressed to a stream.
pub type StreamHandler = Box<dyn FnMut(Bytes) + Send>;

/// Proof of a specific subscription, required to unsubscribe.
///
/// Tokens are generation-stamped: after the subscription is replaced,
/// the old token no longer matches and unsubscribing with it is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionToken {
    stream_id: StreamId,
    generation: u64,
}

impl SubscriptionToken {
    /// Stream this token subscribes to.
    #[must_use]
    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }
}

struct RouterInner {
    handlers: HashMap<StreamId, (u64, Arc<Mutex<StreamHandler>>)>,
    next_generation: u64,
}

/// Routes stream-addressed payloads to per-stream handlers.
///
/// Clone shares the same underlying routing table.
#[derive(Clone)]
pub struct StreamRouter {
    inner: Arc<Mutex<RouterInner>>,
}

impl Default for StreamRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamRouter {
    /// Create an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self { inner: Arc::new(Mutex::new(RouterInner { handlers: HashMap::new(), next_generation: 0 })) }
    }

    /// Register `handler` for `stream_id`, replacing any existing one.
    pub fn subscribe(
        &self,
        stream_id: StreamId,
        handler: impl FnMut(Bytes) + Send + 'static,
    ) -> SubscriptionToken {
        let mut inner = self.inner.lock().expect("router lock");

        let generation = inner.next_generation;
        inner.next_generation += 1;

        let boxed: StreamHandler = Box::new(handler);
        if inner.handlers.insert(stream_id, (generation, Arc::new(Mutex::new(boxed)))).is_some() {
            debug!(stream = ?stream_id, "replaced existing stream handler");
        }

        SubscriptionToken { stream_id, generation }
    }

    /// Remove the subscription `token` proves, if it is still current.
    ///
    /// Stale tokens (their subscription was already replaced) are inert.
    pub fn unsubscribe(&self, token: SubscriptionToken) {
        let mut inner = self.inner.lock().expect("router lock");

        if let Some((generation, _)) = inner.handlers.get(&token.stream_id) {
            if *generation == token.generation {
                inner.handlers.remove(&token.stream_id);
            }
        }
    }

    /// Route one `Message` frame payload.
    ///
    /// Payloads shorter than a stream id, and payloads for streams with
    /// no handler, are logged and dropped. Routing never fails the
    /// connection.
    ///
    /// The routing table is not held during dispatch, so a handler may
    /// subscribe or unsubscribe streams from within a delivery.
    pub fn route(&self, payload: &Bytes) {
        let Ok((stream_id, body)) = StreamId::split_from(payload) else {
            debug!(len = payload.len(), "dropping message frame shorter than a stream id");
            return;
        };

        let handler = {
            let inner = self.inner.lock().expect("router lock");
            inner.handlers.get(&stream_id).map(|(_, handler)| Arc::clone(handler))
        };

        match handler {
            Some(handler) => {
                let mut handler = handler.lock().expect("handler lock");
                (*handler)(body);
            }
            None => debug!(stream = ?stream_id, "dropping message for unsubscribed stream"),
        }
    }

    /// Drop every subscription.
    pub fn clear(&self) {
        self.inner.lock().expect("router lock").handlers.clear();
    }

    /// Number of active subscriptions.
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.inner.lock().expect("router lock").handlers.len()
    }
}

//! Bus connection: request/reply and publish/subscribe over topic channels.

use crate::envelope::{DeliveryOptions, Envelope, Payload, Topic};
use crate::error::BusError;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, trace, warn};

/// Reply failure code for a document the store does not hold.
pub const CODE_NOT_FOUND: &str = "NOT_FOUND";

/// Reply failure code for a malformed request.
pub const CODE_BAD_REQUEST: &str = "BAD_REQUEST";

/// Reply failure code for an internal worker error.
pub const CODE_INTERNAL: &str = "INTERNAL";

/// Reply failure code for a request the worker tore down before completion.
pub const CODE_CANCELLED: &str = "CANCELLED";

type ReplyResult = Result<Payload, ReplyFailure>;

#[derive(Debug)]
struct ReplyFailure {
    code: String,
    message: String,
}

/// One-shot reply handle held by the consuming worker.
///
/// Exactly one of [`reply`](Replier::reply) or [`fail`](Replier::fail) may be
/// called. Dropping the replier without answering surfaces to the requester
/// as an internal worker failure rather than a hang.
#[derive(Debug)]
pub struct Replier {
    tx: oneshot::Sender<ReplyResult>,
}

impl Replier {
    /// Answer the request with a payload.
    pub fn reply(self, payload: Payload) {
        let _ = self.tx.send(Ok(payload));
    }

    /// Fail the request with a code and message.
    pub fn fail(self, code: &str, message: impl Into<String>) {
        let _ = self.tx.send(Err(ReplyFailure {
            code: code.to_string(),
            message: message.into(),
        }));
    }
}

/// A request delivered to a topic consumer.
#[derive(Debug)]
pub struct BusRequest {
    /// The envelope that was sent.
    pub envelope: Envelope,
    replier: Option<Replier>,
}

impl BusRequest {
    /// Check whether this was a fire-and-forget publish (no reply expected).
    pub fn is_publish(&self) -> bool {
        self.replier.is_none()
    }

    /// Reply to the request. No-op for publishes.
    pub fn reply(mut self, payload: Payload) {
        if let Some(replier) = self.replier.take() {
            replier.reply(payload);
        }
    }

    /// Fail the request. No-op for publishes.
    pub fn fail(mut self, code: &str, message: impl Into<String>) {
        if let Some(replier) = self.replier.take() {
            replier.fail(code, message);
        }
    }
}

/// Stream of requests delivered to a topic consumer.
pub type RequestStream = UnboundedReceiverStream<BusRequest>;

/// An in-process bus connection.
///
/// Cheaply clonable; all clones share one set of topic consumers and one
/// closed flag. The connection is constructed explicitly and its lifecycle is
/// owned by the caller; there is no ambient global instance.
#[derive(Clone)]
pub struct BusConnection {
    inner: Arc<BusInner>,
}

struct BusInner {
    consumers: DashMap<Topic, mpsc::UnboundedSender<BusRequest>>,
    closed: AtomicBool,
}

impl BusConnection {
    /// Create a new, open connection.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                consumers: DashMap::new(),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Register as the consumer for a topic.
    ///
    /// At most one consumer is active per topic; registering again replaces
    /// the previous consumer.
    pub fn consume(&self, topic: Topic) -> Result<RequestStream, BusError> {
        if self.is_closed() {
            return Err(BusError::Closed);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        if self.inner.consumers.insert(topic, tx).is_some() {
            debug!(topic = %topic, "Replacing existing topic consumer");
        }
        debug!(topic = %topic, "Consumer registered");
        Ok(UnboundedReceiverStream::new(rx))
    }

    /// Send a request and wait for exactly one reply.
    ///
    /// The wait is bounded by `options.send_timeout`; exceeding it fails with
    /// [`BusError::Timeout`], distinguishable from worker-reported failures.
    pub async fn request(
        &self,
        envelope: Envelope,
        options: DeliveryOptions,
    ) -> Result<Payload, BusError> {
        if self.is_closed() {
            return Err(BusError::Closed);
        }

        let topic = envelope.topic;
        trace!(
            topic = %topic,
            timeout_ms = options.send_timeout.as_millis() as u64,
            local_only = options.local_only,
            "Sending request"
        );

        let (tx, rx) = oneshot::channel();
        let request = BusRequest {
            envelope,
            replier: Some(Replier { tx }),
        };
        self.deliver(topic, request)?;

        match tokio::time::timeout(options.send_timeout, rx).await {
            Err(_) => Err(BusError::Timeout(options.send_timeout)),
            Ok(Err(_)) => Err(BusError::Reply {
                code: CODE_INTERNAL.to_string(),
                message: "worker dropped the request without replying".to_string(),
            }),
            Ok(Ok(Err(failure))) => Err(BusError::Reply {
                code: failure.code,
                message: failure.message,
            }),
            Ok(Ok(Ok(payload))) => {
                trace!(topic = %topic, "Reply received");
                Ok(payload)
            }
        }
    }

    /// Publish an envelope, fire-and-forget.
    ///
    /// If no consumer is registered for the topic the envelope is dropped.
    pub fn publish(&self, envelope: Envelope, options: DeliveryOptions) -> Result<(), BusError> {
        if self.is_closed() {
            return Err(BusError::Closed);
        }

        let topic = envelope.topic;
        trace!(topic = %topic, local_only = options.local_only, "Publishing");

        let request = BusRequest {
            envelope,
            replier: None,
        };
        if self.deliver(topic, request).is_err() {
            warn!(topic = %topic, "No consumer for published envelope, dropping");
        }
        Ok(())
    }

    /// Close the connection.
    ///
    /// Idempotent. All consumer streams terminate and every subsequent send
    /// fails fast with [`BusError::Closed`].
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        // Dropping the senders ends the consumer streams.
        self.inner.consumers.clear();
        debug!("Bus connection closed");
    }

    /// Check whether the connection has been closed.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    fn deliver(&self, topic: Topic, request: BusRequest) -> Result<(), BusError> {
        let sender = self
            .inner
            .consumers
            .get(&topic)
            .ok_or(BusError::NoConsumer(topic))?;
        sender
            .send(request)
            .map_err(|_| BusError::NoConsumer(topic))
    }
}

impl Default for BusConnection {
    fn default() -> Self {
        Self::new()
    }
}

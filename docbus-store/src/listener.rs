//! Live query listeners: change events, registration lifecycle, and streams.

use crate::entity::{Document, Entity};
use crate::error::StoreError;
use crate::query::Query;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, trace, warn};
use uuid::Uuid;

/// Kind of change observed on a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// The document newly matches the query (including pre-existing matches
    /// delivered at registration time).
    Added,
    /// A matching document was overwritten.
    Modified,
    /// A matching document was deleted.
    Removed,
}

/// A typed change event delivered on a listener stream.
#[derive(Debug, Clone)]
pub struct ChangeEvent<E> {
    /// What happened.
    pub kind: ChangeKind,
    /// The document after the change (before it, for removals).
    pub document: E,
}

/// A store-level change callback in transport form, before entity decoding.
#[derive(Debug, Clone)]
pub struct RawChange {
    /// What happened.
    pub kind: ChangeKind,
    /// The affected document.
    pub document: Document,
}

/// Custom handler receiving raw store-level changes.
///
/// Installing one bypasses the default decode-and-stream pipeline.
pub type RawChangeHandler = Box<dyn FnMut(RawChange) + Send + 'static>;

/// Sink the backing store pushes change callbacks into.
///
/// Per-document push order is preserved end to end.
#[derive(Debug, Clone)]
pub struct WatchSink {
    tx: mpsc::UnboundedSender<RawChange>,
}

impl WatchSink {
    /// Push a change. Returns false once the listener side has shut down.
    pub fn push(&self, change: RawChange) -> bool {
        self.tx.send(change).is_ok()
    }
}

/// Cancellation handle returned by a backing store's watch registration.
pub struct WatchHandle {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl WatchHandle {
    /// Wrap a cancel action.
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchHandle").finish_non_exhaustive()
    }
}

/// Boundary with the backing store's live-change capability.
#[async_trait]
pub trait DocumentWatcher: Send + Sync {
    /// Register a watch for the query, pushing changes into the sink.
    ///
    /// Implementations must first push an `Added` change for every document
    /// already matching the query, then ongoing changes in the order the
    /// store emits them.
    async fn watch(&self, query: Query, sink: WatchSink) -> Result<WatchHandle, StoreError>;
}

/// Lifecycle state of a listener registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ListenerState {
    /// No registration attempted yet.
    Unregistered = 0,
    /// Registration sent; waiting for the backing store to confirm.
    Registering = 1,
    /// Confirmed; events are flowing.
    Active = 2,
    /// Cancelled, failed, or the owning connection closed. Terminal.
    Closed = 3,
}

impl ListenerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ListenerState::Unregistered,
            1 => ListenerState::Registering,
            2 => ListenerState::Active,
            _ => ListenerState::Closed,
        }
    }
}

/// Cancellable handle for a live listener registration.
///
/// This is the one resource requiring explicit release: failing to call
/// [`remove`](ListenerRegistration::remove) leaks a live subscription and
/// backing-store resources.
pub struct ListenerRegistration {
    state: Arc<AtomicU8>,
    cancel: Mutex<Option<WatchHandle>>,
    on_close: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl ListenerRegistration {
    /// Current lifecycle state.
    pub fn state(&self) -> ListenerState {
        ListenerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Check whether events are still flowing.
    pub fn is_active(&self) -> bool {
        self.state() == ListenerState::Active
    }

    /// Cancel the registration. Idempotent; there is no way back out of the
    /// closed state, and events arriving afterwards are dropped.
    pub fn remove(&self) {
        let previous = self.state.swap(ListenerState::Closed as u8, Ordering::SeqCst);
        if previous == ListenerState::Closed as u8 {
            return;
        }
        debug!("Listener registration removed");
        let handle = self.cancel.lock().ok().and_then(|mut guard| guard.take());
        if let Some(handle) = handle {
            handle.cancel();
        }
        let on_close = self.on_close.lock().ok().and_then(|mut guard| guard.take());
        if let Some(on_close) = on_close {
            on_close();
        }
    }
}

impl std::fmt::Debug for ListenerRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistration")
            .field("state", &self.state())
            .finish()
    }
}

/// A listener registration paired with its live event stream.
///
/// The registration and the stream share a lifetime: removing the
/// registration terminates every subscriber stream.
pub struct EventListenerResponse<E: Entity> {
    registration: Arc<ListenerRegistration>,
    subscribers: Arc<DashMap<Uuid, mpsc::UnboundedSender<ChangeEvent<E>>>>,
}

impl<E: Entity> EventListenerResponse<E> {
    /// The cancellable registration handle.
    pub fn registration(&self) -> &ListenerRegistration {
        &self.registration
    }

    /// Subscribe to the change-event stream.
    ///
    /// May be called repeatedly; every subscriber receives its own unbounded
    /// stream of all events delivered from subscription time on. When a
    /// custom raw handler was installed at registration the stream stays
    /// empty. A subscription taken after the registration closed ends
    /// immediately.
    pub fn events(&self) -> UnboundedReceiverStream<ChangeEvent<E>> {
        let (tx, rx) = mpsc::unbounded_channel();
        if self.registration.state() != ListenerState::Closed {
            self.subscribers.insert(Uuid::new_v4(), tx);
        }
        UnboundedReceiverStream::new(rx)
    }
}

impl<E: Entity> std::fmt::Debug for EventListenerResponse<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventListenerResponse")
            .field("registration", &self.registration)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

/// Register a watch and start the event pump.
///
/// Used by the blocking bridge; split out so the registration itself stays a
/// plain asynchronous operation.
pub(crate) async fn register_listener<E: Entity>(
    watcher: &dyn DocumentWatcher,
    query: Query,
    handler: Option<RawChangeHandler>,
) -> Result<EventListenerResponse<E>, StoreError> {
    let state = Arc::new(AtomicU8::new(ListenerState::Registering as u8));
    let (tx, mut rx) = mpsc::unbounded_channel();

    trace!(collection = query.collection_name(), "Registering query listener");
    let handle = watcher.watch(query, WatchSink { tx }).await?;
    state.store(ListenerState::Active as u8, Ordering::SeqCst);

    let subscribers: Arc<DashMap<Uuid, mpsc::UnboundedSender<ChangeEvent<E>>>> =
        Arc::new(DashMap::new());
    let close_subscribers = Arc::clone(&subscribers);
    let registration = Arc::new(ListenerRegistration {
        state: Arc::clone(&state),
        cancel: Mutex::new(Some(handle)),
        // Clearing the senders ends every subscriber stream on removal, even
        // if the backing store keeps its sink alive a little longer.
        on_close: Mutex::new(Some(Box::new(move || close_subscribers.clear()))),
    });

    let pump_state = Arc::clone(&state);
    let pump_subscribers = Arc::clone(&subscribers);
    let mut handler = handler;
    tokio::spawn(async move {
        while let Some(raw) = rx.recv().await {
            if pump_state.load(Ordering::SeqCst) == ListenerState::Closed as u8 {
                // Closed registrations drop late events, never deliver them.
                continue;
            }

            if let Some(handler) = handler.as_mut() {
                handler(raw);
                continue;
            }

            let event = match E::from_document(raw.document) {
                Ok(document) => ChangeEvent {
                    kind: raw.kind,
                    document,
                },
                Err(e) => {
                    warn!(error = %e, "Dropping change event that failed to decode");
                    continue;
                }
            };

            let mut dead = Vec::new();
            for entry in pump_subscribers.iter() {
                if entry.value().send(event.clone()).is_err() {
                    dead.push(*entry.key());
                }
            }
            for key in dead {
                pump_subscribers.remove(&key);
            }
        }

        pump_state.store(ListenerState::Closed as u8, Ordering::SeqCst);
        // Dropping the senders ends every subscriber stream.
        pump_subscribers.clear();
        trace!("Listener event pump stopped");
    });

    Ok(EventListenerResponse {
        registration,
        subscribers,
    })
}

//! Blocking bridge for operations that must complete before returning.

use crate::config::StoreConfig;
use crate::entity::Entity;
use crate::error::{Result, StoreError};
use crate::listener::{
    register_listener, DocumentWatcher, EventListenerResponse, RawChangeHandler,
};
use crate::query::{Query, QueryBuilder};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, trace};

/// Synchronous counterpart to the dispatch client.
///
/// Two kinds of call site need to complete before the caller's next
/// statement: building a query and registering a long-lived listener. The
/// first bypasses the bus entirely (a builder is purely local, so there is no
/// serialization cost to avoid paying); the second wraps an asynchronous
/// registration in a blocking wait bounded by a default 10 s timeout.
///
/// Blocking calls must be made off the threads backing the asynchronous
/// dispatch path, or they would starve it; from inside a runtime, call
/// through `tokio::task::spawn_blocking`.
pub struct BlockingBridge<E: Entity> {
    watcher: Arc<dyn DocumentWatcher>,
    handle: Handle,
    register_timeout: Duration,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> BlockingBridge<E> {
    /// Create a bridge over a backing store's watch capability.
    pub fn new(watcher: Arc<dyn DocumentWatcher>, handle: Handle) -> Self {
        Self::with_config(watcher, handle, &StoreConfig::default())
    }

    /// Create a bridge with an explicit configuration.
    pub fn with_config(
        watcher: Arc<dyn DocumentWatcher>,
        handle: Handle,
        config: &StoreConfig,
    ) -> Self {
        Self {
            watcher,
            handle,
            register_timeout: config.register_timeout,
            _entity: PhantomData,
        }
    }

    /// Build a query locally, without a bus round-trip.
    pub fn query_builder(&self, collection: &str) -> QueryBuilder {
        trace!(collection, "query_builder (local) called");
        QueryBuilder::new(collection)
    }

    /// Register a live listener for a query and block until the backing
    /// store confirms it.
    ///
    /// Without a custom handler, changes are decoded into
    /// [`ChangeEvent`](crate::ChangeEvent)s and delivered on the response's
    /// multi-subscriber stream: first an `Added` event per pre-existing
    /// match, then ongoing changes until the registration is removed.
    ///
    /// Fails with [`StoreError::Timeout`] if registration does not complete
    /// within the bound, and with the backing store's error if it rejects the
    /// listener.
    pub fn add_query_listener(
        &self,
        query: Query,
        handler: Option<RawChangeHandler>,
    ) -> Result<EventListenerResponse<E>> {
        debug!(
            collection = query.collection_name(),
            timeout_ms = self.register_timeout.as_millis() as u64,
            "add_query_listener called"
        );

        let watcher = Arc::clone(&self.watcher);
        let bound = self.register_timeout;
        self.handle.block_on(async move {
            match tokio::time::timeout(bound, register_listener::<E>(watcher.as_ref(), query, handler))
                .await
            {
                Err(_) => Err(StoreError::Timeout(bound)),
                Ok(result) => result,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::{ChangeKind, WatchHandle, WatchSink};
    use crate::memory::{MemoryStore, MemoryWorker};
    use crate::StoreClient;
    use async_trait::async_trait;
    use docbus_bus::BusConnection;
    use serde::{Deserialize, Serialize};
    use tokio_stream::StreamExt;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Car {
        brand: String,
    }

    impl Entity for Car {
        fn collection_name(&self) -> &str {
            "cars"
        }
    }

    #[test]
    fn test_local_query_builder_bypasses_bus() {
        // No runtime work is needed to build a query.
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let store: Arc<dyn DocumentWatcher> = Arc::new(MemoryStore::new());
        let bridge: BlockingBridge<Car> = BlockingBridge::new(store, runtime.handle().clone());

        let query = bridge
            .query_builder("cars")
            .where_eq("brand", "Toyota")
            .build();
        assert_eq!(query.collection_name(), "cars");
        assert_eq!(query.filters().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_listener_sees_existing_and_subsequent_changes() {
        let bus = BusConnection::new();
        let store = Arc::new(MemoryStore::new());
        MemoryWorker::spawn(&bus, Arc::clone(&store));

        let client: StoreClient<Car> = StoreClient::new(bus);
        let id = client
            .insert(&Car {
                brand: "Toyota".to_string(),
            })
            .await
            .unwrap();

        let watcher: Arc<dyn DocumentWatcher> = store;
        let handle = Handle::current();
        let bridge: BlockingBridge<Car> = BlockingBridge::new(watcher, handle);
        let query = bridge
            .query_builder("cars")
            .where_eq("brand", "Toyota")
            .build();

        let response = tokio::task::spawn_blocking(move || bridge.add_query_listener(query, None))
            .await
            .unwrap()
            .unwrap();
        assert!(response.registration().is_active());
        let mut events = response.events();

        // Pre-existing match arrives first, as Added.
        let added = events.next().await.unwrap();
        assert_eq!(added.kind, ChangeKind::Added);
        assert_eq!(added.document.brand, "Toyota");

        // An external update surfaces as Modified.
        client
            .update(
                &id,
                "cars",
                &Car {
                    brand: "Toyota".to_string(),
                },
            )
            .await
            .unwrap();
        let modified = events.next().await.unwrap();
        assert_eq!(modified.kind, ChangeKind::Modified);

        // After removal the stream terminates and nothing further arrives.
        response.registration().remove();
        client.delete(&id, "cars").await.unwrap();
        assert!(events.next().await.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_registration_timeout() {
        struct StalledWatcher;

        #[async_trait]
        impl DocumentWatcher for StalledWatcher {
            async fn watch(&self, _query: Query, _sink: WatchSink) -> Result<WatchHandle> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(WatchHandle::new(|| {}))
            }
        }

        let config = StoreConfig::builder()
            .register_timeout(Duration::from_millis(100))
            .build();
        let bridge: BlockingBridge<Car> =
            BlockingBridge::with_config(Arc::new(StalledWatcher), Handle::current(), &config);
        let query = bridge.query_builder("cars").build();

        let err = tokio::task::spawn_blocking(move || bridge.add_query_listener(query, None))
            .await
            .unwrap()
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_rejected_registration_propagates() {
        struct RejectingWatcher;

        #[async_trait]
        impl DocumentWatcher for RejectingWatcher {
            async fn watch(&self, _query: Query, _sink: WatchSink) -> Result<WatchHandle> {
                Err(StoreError::Backend {
                    code: "INTERNAL".to_string(),
                    message: "listener rejected".to_string(),
                })
            }
        }

        let bridge: BlockingBridge<Car> =
            BlockingBridge::new(Arc::new(RejectingWatcher), Handle::current());
        let query = bridge.query_builder("cars").build();

        let err = tokio::task::spawn_blocking(move || bridge.add_query_listener(query, None))
            .await
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, StoreError::Backend { .. }));
    }
}

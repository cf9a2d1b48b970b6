//! Integration tests for common docbus workflows.
//!
//! These tests run the full dispatch path against the in-memory backing
//! worker: client call, envelope over the bus, worker execution, reply
//! decode.

use docbus::prelude::*;
use docbus_store::memory::{MemoryStore, MemoryWorker};
use docbus_store::DocumentWatcher;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio_stream::StreamExt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Car {
    name: String,
}

impl Entity for Car {
    fn collection_name(&self) -> &str {
        "cars"
    }
}

fn harness() -> (StoreClient<Car>, Arc<MemoryStore>) {
    let bus = BusConnection::new();
    let store = Arc::new(MemoryStore::new());
    MemoryWorker::spawn(&bus, Arc::clone(&store));
    let config = StoreConfig::builder()
        .send_timeout(Duration::from_secs(2))
        .build();
    (StoreClient::with_config(bus, &config), store)
}

// =============================================================================
// CRUD round trips
// =============================================================================

#[tokio::test]
async fn test_insert_then_get_returns_deep_equal_entity() {
    let (client, _store) = harness();

    let toyota = Car {
        name: "Toyota".to_string(),
    };
    let id = client.insert(&toyota).await.unwrap();
    assert!(!id.is_empty());

    let fetched = client.get_by_id(&id, "cars").await.unwrap();
    assert_eq!(fetched, toyota);
}

#[tokio::test]
async fn test_upsert_is_idempotent_create_or_replace() {
    let (client, _store) = harness();
    let car = Car {
        name: "Toyota".to_string(),
    };

    assert!(client.upsert("abc123", "cars", &car).await.unwrap());
    assert!(client.upsert("abc123", "cars", &car).await.unwrap());
    assert_eq!(client.get_by_id("abc123", "cars").await.unwrap(), car);
}

#[tokio::test]
async fn test_delete_absent_returns_false_get_absent_is_not_found() {
    let (client, _store) = harness();

    assert!(!client.delete("missing", "cars").await.unwrap());

    let err = client.get_by_id("missing", "cars").await.unwrap_err();
    assert!(err.is_not_found());
    assert!(!matches!(err, StoreError::Decode(_)));
}

#[tokio::test]
async fn test_query_with_zero_matches_is_empty_not_error() {
    let (client, _store) = harness();
    client
        .insert(&Car {
            name: "Toyota".to_string(),
        })
        .await
        .unwrap();

    let query = Query::builder("cars").where_eq("name", "Lada").build();
    assert!(client.get(&query).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_update_of_absent_document_fails_without_creating() {
    let (client, _store) = harness();
    let car = Car {
        name: "Toyota".to_string(),
    };

    let err = client.update("ghost", "cars", &car).await.unwrap_err();
    assert!(err.is_not_found());
    assert!(client.get_by_id("ghost", "cars").await.is_err());
}

// =============================================================================
// Live query listeners
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_listener_streams_existing_then_live_changes_then_stops() {
    let (client, store) = harness();

    // Pre-existing match.
    let id = client
        .insert(&Car {
            name: "Toyota".to_string(),
        })
        .await
        .unwrap();

    let watcher: Arc<dyn DocumentWatcher> = store;
    let bridge: BlockingBridge<Car> = BlockingBridge::new(watcher, Handle::current());
    let query = bridge
        .query_builder("cars")
        .where_eq("name", "Toyota")
        .build();

    let response = tokio::task::spawn_blocking(move || bridge.add_query_listener(query, None))
        .await
        .unwrap()
        .unwrap();
    let mut events = response.events();

    let added = events.next().await.unwrap();
    assert_eq!(added.kind, ChangeKind::Added);
    assert_eq!(added.document.name, "Toyota");

    // External update surfaces as a Modified event.
    client
        .update(
            &id,
            "cars",
            &Car {
                name: "Toyota".to_string(),
            },
        )
        .await
        .unwrap();
    let modified = events.next().await.unwrap();
    assert_eq!(modified.kind, ChangeKind::Modified);

    // After releasing the registration, no further events are delivered.
    response.registration().remove();
    client.delete(&id, "cars").await.unwrap();
    assert!(events.next().await.is_none());
}

// =============================================================================
// Connection lifecycle
// =============================================================================

#[tokio::test]
async fn test_dispatch_after_close_fails_fast() {
    let (client, _store) = harness();
    client.close_connection().unwrap();

    let start = std::time::Instant::now();
    let err = client
        .insert(&Car {
            name: "Toyota".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::ConnectionClosed));
    assert!(start.elapsed() < Duration::from_millis(500));
}

//! In-memory backing store and worker.
//!
//! [`MemoryStore`] is a DashMap-backed document store; [`MemoryWorker`] wires
//! it to a bus connection, consuming every operation topic. Together they are
//! the reference backend: embedded deployments and tests run the whole
//! dispatch path against them without an external database.

use crate::entity::Document;
use crate::error::StoreError;
use crate::listener::{ChangeKind, DocumentWatcher, RawChange, WatchHandle, WatchSink};
use crate::query::{Direction, Filter, FilterOp, Query};
use async_trait::async_trait;
use dashmap::DashMap;
use docbus_bus::{
    BusConnection, BusRequest, Payload, Topic, CODE_BAD_REQUEST, CODE_NOT_FOUND,
};
use serde_json::Value;
use std::cmp::Ordering;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tracing::{debug, warn};
use uuid::Uuid;

struct WatchEntry {
    query: Query,
    sink: WatchSink,
}

/// DashMap-backed document store with live-query watch support.
pub struct MemoryStore {
    collections: DashMap<String, DashMap<String, Document>>,
    watchers: Arc<DashMap<Uuid, WatchEntry>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            collections: DashMap::new(),
            watchers: Arc::new(DashMap::new()),
        }
    }

    /// Insert a document under a fresh auto-generated id.
    pub fn insert(&self, collection: &str, document: Document) -> String {
        let id = Uuid::new_v4().simple().to_string();
        self.collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), document.clone());
        self.notify(collection, None, Some(&document));
        id
    }

    /// Fetch a document by id.
    pub fn get(&self, collection: &str, id: &str) -> Option<Document> {
        self.collections
            .get(collection)?
            .get(id)
            .map(|doc| doc.clone())
    }

    /// Create or fully overwrite a document. Returns whether it existed.
    pub fn upsert(&self, collection: &str, id: &str, document: Document) -> bool {
        let previous = self
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), document.clone());
        let existed = previous.is_some();
        self.notify(collection, previous.as_ref(), Some(&document));
        existed
    }

    /// Overwrite an existing document. Returns false when the id is absent.
    pub fn update(&self, collection: &str, id: &str, document: Document) -> bool {
        let Some(docs) = self.collections.get(collection) else {
            return false;
        };
        let Some(mut entry) = docs.get_mut(id) else {
            return false;
        };
        let previous = std::mem::replace(&mut *entry, document.clone());
        drop(entry);
        drop(docs);
        self.notify(collection, Some(&previous), Some(&document));
        true
    }

    /// Delete a document. Returns whether it existed.
    pub fn delete(&self, collection: &str, id: &str) -> bool {
        let removed = self
            .collections
            .get(collection)
            .and_then(|docs| docs.remove(id));
        match removed {
            Some((_, document)) => {
                self.notify(collection, Some(&document), None);
                true
            }
            None => false,
        }
    }

    /// Run a query, returning matching documents with ordering, offset, and
    /// limit applied.
    pub fn run_query(&self, query: &Query) -> Vec<Document> {
        let mut matches: Vec<Document> = self
            .collections
            .get(query.collection_name())
            .map(|docs| {
                docs.iter()
                    .filter(|entry| matches_query(query, entry.value()))
                    .map(|entry| entry.value().clone())
                    .collect()
            })
            .unwrap_or_default();

        if let Some(order) = query.order_by() {
            matches.sort_by(|a, b| {
                let ordering = compare_values(
                    a.get(&order.field).unwrap_or(&Value::Null),
                    b.get(&order.field).unwrap_or(&Value::Null),
                )
                .unwrap_or(Ordering::Equal);
                match order.direction {
                    Direction::Ascending => ordering,
                    Direction::Descending => ordering.reverse(),
                }
            });
        }

        let offset = query.offset().unwrap_or(0);
        let mut matches: Vec<Document> = matches.into_iter().skip(offset).collect();
        if let Some(limit) = query.limit() {
            matches.truncate(limit);
        }
        matches
    }

    /// Fan a write out to watchers, classifying it against each watched
    /// query's result set: a document entering the set is Added, one staying
    /// inside is Modified, one leaving is Removed with its pre-change
    /// snapshot. A write matching on neither side emits nothing.
    fn notify(&self, collection: &str, old: Option<&Document>, new: Option<&Document>) {
        let mut dead = Vec::new();
        for entry in self.watchers.iter() {
            let watch = entry.value();
            if watch.query.collection_name() != collection {
                continue;
            }
            let was_in = old.filter(|doc| matches_query(&watch.query, doc));
            let now_in = new.filter(|doc| matches_query(&watch.query, doc));
            let (kind, document) = match (was_in, now_in) {
                (None, Some(doc)) => (ChangeKind::Added, doc),
                (Some(_), Some(doc)) => (ChangeKind::Modified, doc),
                (Some(doc), None) => (ChangeKind::Removed, doc),
                (None, None) => continue,
            };
            let delivered = watch.sink.push(RawChange {
                kind,
                document: document.clone(),
            });
            if !delivered {
                dead.push(*entry.key());
            }
        }
        for key in dead {
            self.watchers.remove(&key);
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentWatcher for MemoryStore {
    async fn watch(&self, query: Query, sink: WatchSink) -> Result<WatchHandle, StoreError> {
        // Pre-existing matches first, as Added, then live changes.
        for document in self.run_query(&query) {
            sink.push(RawChange {
                kind: ChangeKind::Added,
                document,
            });
        }

        let key = Uuid::new_v4();
        self.watchers.insert(key, WatchEntry { query, sink });

        let watchers = Arc::clone(&self.watchers);
        Ok(WatchHandle::new(move || {
            watchers.remove(&key);
        }))
    }
}

/// Worker consuming every operation topic against a [`MemoryStore`].
pub struct MemoryWorker;

impl MemoryWorker {
    /// Spawn one consumer task per topic. Tasks end when the bus closes.
    pub fn spawn(bus: &BusConnection, store: Arc<MemoryStore>) -> Vec<JoinHandle<()>> {
        const TOPICS: [Topic; 9] = [
            Topic::Insert,
            Topic::Empty,
            Topic::QueryBuilder,
            Topic::Query,
            Topic::Get,
            Topic::Upsert,
            Topic::Update,
            Topic::Delete,
            Topic::Close,
        ];

        let mut handles = Vec::with_capacity(TOPICS.len());
        for topic in TOPICS {
            let Ok(mut requests) = bus.consume(topic) else {
                warn!(topic = %topic, "Bus already closed, worker not started");
                continue;
            };
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                while let Some(request) = requests.next().await {
                    handle_request(&store, topic, request);
                }
                debug!(topic = %topic, "Worker consumer stopped");
            }));
        }
        handles
    }
}

fn handle_request(store: &MemoryStore, topic: Topic, request: BusRequest) {
    match topic {
        Topic::Insert => with_collection(request, |request, collection| {
            match parse_document(&request.envelope.payload) {
                Ok(document) => {
                    let id = store.insert(&collection, document);
                    request.reply(Payload::Text(id));
                }
                Err(message) => request.fail(CODE_BAD_REQUEST, message),
            }
        }),
        Topic::Empty => with_collection(request, |request, collection| {
            let id = store.insert(&collection, Document::new());
            request.reply(Payload::Text(id));
        }),
        Topic::QueryBuilder => with_collection(request, |request, collection| {
            match Query::builder(&collection).build().to_bytes() {
                Ok(bytes) => request.reply(Payload::Binary(bytes)),
                Err(e) => request.fail(CODE_BAD_REQUEST, e.to_string()),
            }
        }),
        Topic::Query => {
            let query = match Query::from_bytes(request.envelope.payload.as_bytes()) {
                Ok(query) => query,
                Err(e) => return request.fail(CODE_BAD_REQUEST, e.to_string()),
            };
            let records: Vec<Value> = store
                .run_query(&query)
                .into_iter()
                .map(Value::Object)
                .collect();
            match serde_json::to_string(&records) {
                Ok(json) => request.reply(Payload::Text(json)),
                Err(e) => request.fail(CODE_BAD_REQUEST, e.to_string()),
            }
        }
        Topic::Get => with_document_target(request, |request, collection, id| {
            match store.get(&collection, &id) {
                Some(document) => match serde_json::to_string(&Value::Object(document)) {
                    Ok(json) => request.reply(Payload::Text(json)),
                    Err(e) => request.fail(CODE_BAD_REQUEST, e.to_string()),
                },
                None => request.fail(
                    CODE_NOT_FOUND,
                    format!("no document '{id}' in collection '{collection}'"),
                ),
            }
        }),
        Topic::Upsert => with_document_target(request, |request, collection, id| {
            match parse_document(&request.envelope.payload) {
                Ok(document) => {
                    store.upsert(&collection, &id, document);
                    request.reply(Payload::Text("true".to_string()));
                }
                Err(message) => request.fail(CODE_BAD_REQUEST, message),
            }
        }),
        Topic::Update => with_document_target(request, |request, collection, id| {
            match parse_document(&request.envelope.payload) {
                Ok(document) => {
                    if store.update(&collection, &id, document) {
                        request.reply(Payload::Text("true".to_string()));
                    } else {
                        request.fail(
                            CODE_NOT_FOUND,
                            format!("no document '{id}' in collection '{collection}'"),
                        );
                    }
                }
                Err(message) => request.fail(CODE_BAD_REQUEST, message),
            }
        }),
        Topic::Delete => with_document_target(request, |request, collection, id| {
            let deleted = store.delete(&collection, &id);
            request.reply(Payload::Text(deleted.to_string()));
        }),
        Topic::Close => {
            debug!("Close requested by client");
        }
    }
}

fn with_collection(request: BusRequest, handle: impl FnOnce(BusRequest, String)) {
    match request.envelope.collection_name() {
        Some(collection) => {
            let collection = collection.to_string();
            handle(request, collection);
        }
        None => request.fail(CODE_BAD_REQUEST, "missing collection header"),
    }
}

fn with_document_target(request: BusRequest, handle: impl FnOnce(BusRequest, String, String)) {
    let Some(collection) = request.envelope.collection_name().map(str::to_string) else {
        return request.fail(CODE_BAD_REQUEST, "missing collection header");
    };
    let Some(id) = request.envelope.id().map(str::to_string) else {
        return request.fail(CODE_BAD_REQUEST, "missing document id header");
    };
    handle(request, collection, id);
}

fn parse_document(payload: &Payload) -> Result<Document, String> {
    let Some(text) = payload.as_str() else {
        return Err("expected a JSON document payload".to_string());
    };
    match serde_json::from_str(text) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(format!("expected a JSON object, got {other}")),
        Err(e) => Err(e.to_string()),
    }
}

fn matches_query(query: &Query, document: &Document) -> bool {
    query
        .filters()
        .iter()
        .all(|filter| matches_filter(filter, document))
}

fn matches_filter(filter: &Filter, document: &Document) -> bool {
    let Some(value) = document.get(&filter.field) else {
        return false;
    };
    match filter.op {
        FilterOp::Eq => value == &filter.value,
        FilterOp::Lt => compare_values(value, &filter.value) == Some(Ordering::Less),
        FilterOp::Le => matches!(
            compare_values(value, &filter.value),
            Some(Ordering::Less | Ordering::Equal)
        ),
        FilterOp::Gt => compare_values(value, &filter.value) == Some(Ordering::Greater),
        FilterOp::Ge => matches!(
            compare_values(value, &filter.value),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        FilterOp::ArrayContains => value
            .as_array()
            .is_some_and(|items| items.contains(&filter.value)),
    }
}

fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

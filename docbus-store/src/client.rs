//! Typed dispatch client: one envelope per operation, one deferred result.

use crate::config::StoreConfig;
use crate::decode;
use crate::entity::Entity;
use crate::error::Result;
use crate::query::Query;
use docbus_bus::{BusConnection, DeliveryOptions, Envelope, Payload, Topic};
use std::marker::PhantomData;
use tracing::{debug, trace};

/// Data-access client for one entity type.
///
/// Every operation serializes its arguments into an [`Envelope`], sends it
/// over the bus with local-only delivery and a bounded timeout (59 s unless
/// configured otherwise), and decodes the single reply into a typed result.
/// Errors surface through the returned future, never as panics; abandoning a
/// future has no side effect beyond the in-flight request eventually timing
/// out on the worker side.
///
/// # Examples
///
/// ```rust,no_run
/// use docbus_bus::BusConnection;
/// use docbus_store::{Entity, StoreClient};
/// # use serde::{Deserialize, Serialize};
/// # #[derive(Debug, Clone, Serialize, Deserialize)]
/// # struct Car { brand: String }
/// # impl Entity for Car {
/// #     fn collection_name(&self) -> &str { "cars" }
/// # }
///
/// # async fn example(bus: BusConnection) -> docbus_store::Result<()> {
/// let client: StoreClient<Car> = StoreClient::new(bus);
/// let id = client.insert(&Car { brand: "Toyota".into() }).await?;
/// let car = client.get_by_id(&id, "cars").await?;
/// # Ok(())
/// # }
/// ```
pub struct StoreClient<E: Entity> {
    bus: BusConnection,
    options: DeliveryOptions,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> StoreClient<E> {
    /// Create a client over an existing bus connection with default options.
    pub fn new(bus: BusConnection) -> Self {
        Self::with_config(bus, &StoreConfig::default())
    }

    /// Create a client with an explicit configuration.
    pub fn with_config(bus: BusConnection, config: &StoreConfig) -> Self {
        Self {
            bus,
            options: DeliveryOptions::default().send_timeout(config.send_timeout),
            _entity: PhantomData,
        }
    }

    /// The underlying bus connection.
    pub fn bus(&self) -> &BusConnection {
        &self.bus
    }

    /// Insert a document with an auto-generated id.
    ///
    /// Generated ids carry no ordering; store a timestamp field if documents
    /// must be orderable by creation time.
    pub async fn insert(&self, entity: &E) -> Result<String> {
        let collection = entity.collection_name();
        trace!(collection, "insert called");

        let envelope = Envelope::new(Topic::Insert, Payload::Text(entity.to_json()?))
            .collection(collection);
        let reply = self.bus.request(envelope, self.options.clone()).await?;
        decode::id(&reply)
    }

    /// Create an empty document, returning its auto-generated id.
    ///
    /// Useful for reserving an id up front and filling the document in later
    /// through [`upsert`](Self::upsert).
    pub async fn empty(&self, collection: &str) -> Result<String> {
        trace!(collection, "empty called");

        let envelope = Envelope::new(Topic::Empty, Payload::Empty).collection(collection);
        let reply = self.bus.request(envelope, self.options.clone()).await?;
        decode::id(&reply)
    }

    /// Request a query builder from the backing worker.
    ///
    /// For a purely local builder without the bus round-trip, use
    /// [`BlockingBridge::query_builder`](crate::BlockingBridge::query_builder).
    pub async fn query_builder(&self, collection: &str) -> Result<Query> {
        trace!(collection, "query_builder called");

        let envelope = Envelope::new(Topic::QueryBuilder, Payload::Empty).collection(collection);
        let reply = self.bus.request(envelope, self.options.clone()).await?;
        decode::query(&reply)
    }

    /// Retrieve all documents matching a query, in reply order.
    ///
    /// A query with zero matches resolves to an empty vec.
    pub async fn get(&self, query: &Query) -> Result<Vec<E>> {
        trace!(collection = query.collection_name(), "get by query called");

        let envelope = Envelope::new(Topic::Query, Payload::Binary(query.to_bytes()?));
        let reply = self.bus.request(envelope, self.options.clone()).await?;

        let documents = decode::records(&reply)?;
        let entities = documents
            .into_iter()
            .map(E::from_document)
            .collect::<Result<Vec<_>>>()?;
        trace!(count = entities.len(), "get by query replied");
        Ok(entities)
    }

    /// Retrieve a single document by id.
    ///
    /// Fails with [`StoreError::NotFound`](crate::StoreError::NotFound) when
    /// the backing store holds no document for the id.
    pub async fn get_by_id(&self, id: &str, collection: &str) -> Result<E> {
        trace!(collection, id, "get called");

        let envelope = Envelope::new(Topic::Get, Payload::Empty)
            .collection(collection)
            .document_id(id);
        let reply = self.bus.request(envelope, self.options.clone()).await?;
        E::from_document(decode::record(&reply)?)
    }

    /// Create the document if absent, otherwise fully overwrite it.
    ///
    /// Always reports `true` on success, whether or not the id existed.
    pub async fn upsert(&self, id: &str, collection: &str, entity: &E) -> Result<bool> {
        trace!(collection, id, "upsert called");

        let envelope = Envelope::new(Topic::Upsert, Payload::Text(entity.to_json()?))
            .collection(collection)
            .document_id(id);
        let reply = self.bus.request(envelope, self.options.clone()).await?;
        decode::boolean(&reply)
    }

    /// Overwrite an existing document.
    ///
    /// Unlike [`upsert`](Self::upsert), updating an absent document fails
    /// with [`StoreError::NotFound`](crate::StoreError::NotFound); it is
    /// never created implicitly.
    pub async fn update(&self, id: &str, collection: &str, entity: &E) -> Result<bool> {
        trace!(collection, id, "update called");

        let envelope = Envelope::new(Topic::Update, Payload::Text(entity.to_json()?))
            .collection(collection)
            .document_id(id);
        let reply = self.bus.request(envelope, self.options.clone()).await?;
        decode::boolean(&reply)
    }

    /// Delete a document.
    ///
    /// Resolves to `false`, not an error, when the id does not exist.
    /// Deleting a document does not delete its subcollections.
    pub async fn delete(&self, id: &str, collection: &str) -> Result<bool> {
        trace!(collection, id, "delete called");

        let envelope = Envelope::new(Topic::Delete, Payload::Empty)
            .collection(collection)
            .document_id(id);
        let reply = self.bus.request(envelope, self.options.clone()).await?;
        decode::boolean(&reply)
    }

    /// Release backing-worker resources and close the connection.
    ///
    /// The close notification is a fire-and-forget publish; no reply is
    /// awaited. Afterwards every dispatch call on this connection fails fast
    /// with [`StoreError::ConnectionClosed`](crate::StoreError::ConnectionClosed).
    pub fn close_connection(&self) -> Result<()> {
        debug!("close_connection called");

        let envelope = Envelope::new(Topic::Close, Payload::Empty);
        self.bus.publish(envelope, self.options.clone())?;
        self.bus.close();
        Ok(())
    }
}

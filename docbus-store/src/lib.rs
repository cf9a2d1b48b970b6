//! Typed document-store access over the docbus message bus.
//!
//! The crate has two halves:
//!
//! - The asynchronous dispatch path: [`StoreClient`] turns each CRUD or query
//!   call into one bus envelope and one deferred result, with [`decode`]
//!   converting raw reply payloads back into typed values.
//! - The blocking bridge: [`BlockingBridge`] serves the call sites that must
//!   complete before returning, building queries locally and registering
//!   live-change listeners against the backing store.
//!
//! Entities opt in through the [`Entity`] capability: a collection name plus
//! conversion to and from the transport document form.
//!
//! # Example
//!
//! ```rust,no_run
//! use docbus_bus::BusConnection;
//! use docbus_store::{Entity, Query, StoreClient};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! struct Car {
//!     brand: String,
//! }
//!
//! impl Entity for Car {
//!     fn collection_name(&self) -> &str {
//!         "cars"
//!     }
//! }
//!
//! # async fn example(bus: BusConnection) -> docbus_store::Result<()> {
//! let client: StoreClient<Car> = StoreClient::new(bus);
//!
//! let id = client.insert(&Car { brand: "Toyota".into() }).await?;
//! let query = Query::builder("cars").where_eq("brand", "Toyota").build();
//! let toyotas = client.get(&query).await?;
//! # Ok(())
//! # }
//! ```

mod bridge;
mod client;
mod config;
pub mod decode;
mod entity;
mod error;
mod listener;
pub mod memory;
mod query;

pub use bridge::BlockingBridge;
pub use client::StoreClient;
pub use config::{StoreConfig, StoreConfigBuilder, ENV_CREDENTIALS, ENV_WORKER_THREADS};
pub use entity::{Document, Entity};
pub use error::{Result, StoreError};
pub use listener::{
    ChangeEvent, ChangeKind, DocumentWatcher, EventListenerResponse, ListenerRegistration,
    ListenerState, RawChange, RawChangeHandler, WatchHandle, WatchSink,
};
pub use query::{Direction, Filter, FilterOp, OrderBy, Query, QueryBuilder};

/// Prelude for common imports.
pub mod prelude {
    pub use crate::bridge::BlockingBridge;
    pub use crate::client::StoreClient;
    pub use crate::config::StoreConfig;
    pub use crate::entity::{Document, Entity};
    pub use crate::error::{Result, StoreError};
    pub use crate::listener::{ChangeEvent, ChangeKind, EventListenerResponse};
    pub use crate::query::{Direction, Query, QueryBuilder};
}

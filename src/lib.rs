// docbus - reactive document-store access over an in-process message bus
//
// This library provides a typed dispatch client that turns CRUD and query
// calls into request/reply envelopes, plus live query change streams.

// Re-export the bus layer
pub use docbus_bus;

// Re-export the store layer
pub use docbus_store;

// Prelude for common imports
pub mod prelude {
    pub use docbus_bus::{BusConnection, DeliveryOptions, Envelope, Payload, Topic};
    pub use docbus_store::{
        BlockingBridge, ChangeEvent, ChangeKind, Document, Entity, EventListenerResponse, Query,
        QueryBuilder, StoreClient, StoreConfig, StoreError,
    };
}

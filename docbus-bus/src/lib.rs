//! In-process message bus for docbus.
//!
//! The bus carries typed [`Envelope`]s between a dispatch client and a backing
//! worker. Two delivery modes are supported:
//!
//! - **Request/reply**: [`BusConnection::request`] sends an envelope and
//!   resolves to exactly one reply payload or one error, bounded by the
//!   send timeout in [`DeliveryOptions`].
//! - **Publish**: [`BusConnection::publish`] is fire-and-forget; no reply is
//!   awaited.
//!
//! A connection is an explicitly constructed, cheaply clonable handle. The
//! caller owns its lifecycle: after [`BusConnection::close`], every further
//! send fails fast with [`BusError::Closed`] instead of hanging until the
//! timeout.
//!
//! # Example
//!
//! ```rust,no_run
//! use docbus_bus::{BusConnection, DeliveryOptions, Envelope, Payload, Topic};
//! use tokio_stream::StreamExt;
//!
//! # async fn example() -> Result<(), docbus_bus::BusError> {
//! let bus = BusConnection::new();
//!
//! // Worker side: consume a topic and answer requests.
//! let mut requests = bus.consume(Topic::Insert)?;
//! tokio::spawn(async move {
//!     while let Some(request) = requests.next().await {
//!         request.reply(Payload::Text("generated-id".into()));
//!     }
//! });
//!
//! // Client side: one request, one reply.
//! let envelope = Envelope::new(Topic::Insert, Payload::Text("{}".into()))
//!     .collection("cars");
//! let reply = bus.request(envelope, DeliveryOptions::default()).await?;
//! # Ok(())
//! # }
//! ```

mod bus;
mod envelope;
mod error;

pub use bus::{
    BusConnection, BusRequest, Replier, RequestStream, CODE_BAD_REQUEST, CODE_CANCELLED,
    CODE_INTERNAL, CODE_NOT_FOUND,
};
pub use envelope::{DeliveryOptions, Envelope, Payload, Topic, HEADER_COLLECTION, HEADER_ID};
pub use error::BusError;

/// Prelude for common imports.
pub mod prelude {
    pub use crate::bus::{BusConnection, BusRequest, Replier, RequestStream};
    pub use crate::envelope::{DeliveryOptions, Envelope, Payload, Topic};
    pub use crate::error::BusError;
}

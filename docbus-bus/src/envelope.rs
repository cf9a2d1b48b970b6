//! Message envelope, topics, and delivery options.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// Header key carrying the target collection name.
pub const HEADER_COLLECTION: &str = "_collectionName";

/// Header key carrying the target document id.
pub const HEADER_ID: &str = "_id";

/// Default send timeout for request/reply dispatch.
const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_millis(59_000);

/// Operation topics routed over the bus.
///
/// A closed enum rather than string constants, so consumers matching on
/// topics get exhaustiveness checking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    /// Create a document with an auto-generated id.
    Insert,
    /// Create an empty document, returning its auto-generated id.
    Empty,
    /// Build a query object for a collection.
    QueryBuilder,
    /// Execute a query, returning matching documents.
    Query,
    /// Fetch a single document by id.
    Get,
    /// Create or fully overwrite a document.
    Upsert,
    /// Overwrite an existing document.
    Update,
    /// Delete a document.
    Delete,
    /// Release backing-worker resources. Publish only, no reply.
    Close,
}

impl Topic {
    /// Get the wire name of the topic.
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::Insert => "insert",
            Topic::Empty => "empty",
            Topic::QueryBuilder => "query_builder",
            Topic::Query => "query",
            Topic::Get => "get",
            Topic::Upsert => "upsert",
            Topic::Update => "update",
            Topic::Delete => "delete",
            Topic::Close => "close",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request or reply payload.
///
/// Replies arrive in one of three shapes: a plain string literal, a JSON
/// document, or an opaque binary blob (serialized queries).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload {
    /// No payload.
    Empty,
    /// UTF-8 text: a literal (id, boolean) or JSON.
    Text(String),
    /// Opaque bytes.
    Binary(Vec<u8>),
}

impl Payload {
    /// Get the payload as text, if it is textual.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Payload::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get the payload bytes.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Payload::Empty => &[],
            Payload::Text(s) => s.as_bytes(),
            Payload::Binary(b) => b,
        }
    }

    /// Check whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        matches!(self, Payload::Empty) || self.as_bytes().is_empty()
    }
}

/// A request/reply unit sent over the bus.
///
/// Envelopes carry an operation topic, a payload, and headers. Operations
/// scoped to a collection carry the collection header; operations targeting a
/// single document additionally carry the document id header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Operation topic.
    pub topic: Topic,
    /// Request payload.
    pub payload: Payload,
    /// Message headers.
    pub headers: HashMap<String, String>,
}

impl Envelope {
    /// Create a new envelope.
    pub fn new(topic: Topic, payload: Payload) -> Self {
        Self {
            topic,
            payload,
            headers: HashMap::new(),
        }
    }

    /// Set a header.
    pub fn header(mut self, key: &str, value: &str) -> Self {
        self.headers.insert(key.to_string(), value.to_string());
        self
    }

    /// Set the collection-name header.
    pub fn collection(self, name: &str) -> Self {
        self.header(HEADER_COLLECTION, name)
    }

    /// Set the document-id header.
    pub fn document_id(self, id: &str) -> Self {
        self.header(HEADER_ID, id)
    }

    /// Get the collection-name header, if present.
    pub fn collection_name(&self) -> Option<&str> {
        self.headers.get(HEADER_COLLECTION).map(String::as_str)
    }

    /// Get the document-id header, if present.
    pub fn id(&self) -> Option<&str> {
        self.headers.get(HEADER_ID).map(String::as_str)
    }
}

/// Delivery options for a send.
#[derive(Debug, Clone)]
pub struct DeliveryOptions {
    /// Restrict delivery to the local process.
    pub local_only: bool,

    /// Bound on how long a request waits for its reply.
    pub send_timeout: Duration,
}

impl Default for DeliveryOptions {
    fn default() -> Self {
        Self {
            local_only: true,
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }
}

impl DeliveryOptions {
    /// Create options with the defaults (local-only, 59 s timeout).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the send timeout.
    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Set local-only delivery.
    pub fn local_only(mut self, local_only: bool) -> Self {
        self.local_only = local_only;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_wire_names() {
        assert_eq!(Topic::Insert.as_str(), "insert");
        assert_eq!(Topic::QueryBuilder.as_str(), "query_builder");
        assert_eq!(Topic::Close.as_str(), "close");
        assert_eq!(Topic::Get.to_string(), "get");
    }

    #[test]
    fn test_envelope_headers() {
        let envelope = Envelope::new(Topic::Get, Payload::Empty)
            .collection("cars")
            .document_id("abc123")
            .header("x-trace", "1");

        assert_eq!(envelope.collection_name(), Some("cars"));
        assert_eq!(envelope.id(), Some("abc123"));
        assert_eq!(envelope.headers.get("x-trace"), Some(&"1".to_string()));
    }

    #[test]
    fn test_delivery_defaults() {
        let options = DeliveryOptions::default();
        assert!(options.local_only);
        assert_eq!(options.send_timeout, Duration::from_millis(59_000));
    }

    #[test]
    fn test_payload_shapes() {
        assert!(Payload::Empty.is_empty());
        assert_eq!(Payload::Text("true".into()).as_str(), Some("true"));
        assert_eq!(Payload::Binary(vec![1, 2]).as_bytes(), &[1, 2]);
        assert!(Payload::Binary(Vec::new()).is_empty());
    }
}

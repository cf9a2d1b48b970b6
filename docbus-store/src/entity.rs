//! Entity capability: mapping records to and from the transport form.

use crate::error::StoreError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Transport-neutral document form: a JSON object map.
pub type Document = serde_json::Map<String, Value>;

/// Capability required of record types managed through the store.
///
/// An entity names its collection and converts to and from the transport
/// document form. The default conversions go through serde; implementors only
/// need to supply the collection name.
///
/// # Examples
///
/// ```rust
/// use docbus_store::Entity;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// struct Car {
///     brand: String,
/// }
///
/// impl Entity for Car {
///     fn collection_name(&self) -> &str {
///         "cars"
///     }
/// }
/// ```
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Name of the collection this entity belongs to.
    fn collection_name(&self) -> &str;

    /// Convert the entity to its transport document form.
    fn to_document(&self) -> Result<Document, StoreError> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(StoreError::Serialization(format!(
                "entity must serialize to an object, got {other}"
            ))),
            Err(e) => Err(StoreError::Serialization(e.to_string())),
        }
    }

    /// Reconstruct an entity from its transport document form.
    fn from_document(document: Document) -> Result<Self, StoreError> {
        serde_json::from_value(Value::Object(document))
            .map_err(|e| StoreError::Decode(e.to_string()))
    }

    /// Serialize the entity to its JSON wire form.
    fn to_json(&self) -> Result<String, StoreError> {
        serde_json::to_string(self).map_err(|e| StoreError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Car {
        brand: String,
        doors: u8,
    }

    impl Entity for Car {
        fn collection_name(&self) -> &str {
            "cars"
        }
    }

    #[test]
    fn test_document_round_trip() {
        let car = Car {
            brand: "Toyota".to_string(),
            doors: 5,
        };

        let document = car.to_document().unwrap();
        assert_eq!(document.get("brand"), Some(&Value::from("Toyota")));

        let restored = Car::from_document(document).unwrap();
        assert_eq!(restored, car);
    }

    #[test]
    fn test_from_document_rejects_mismatched_shape() {
        let mut document = Document::new();
        document.insert("brand".to_string(), Value::from(42));

        let err = Car::from_document(document).unwrap_err();
        assert!(matches!(err, StoreError::Decode(_)));
    }

    #[test]
    fn test_to_json() {
        let car = Car {
            brand: "Toyota".to_string(),
            doors: 3,
        };
        let json = car.to_json().unwrap();
        assert!(json.contains("\"brand\":\"Toyota\""));
    }
}

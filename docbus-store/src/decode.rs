//! Pure reply decoders.
//!
//! Each function transforms one raw reply payload into a typed result.
//! Replies arrive in three shapes: plain literals (ids, booleans), a JSON
//! record, or a JSON array of records. A payload that does not match the
//! expected shape fails with [`StoreError::Decode`]; nothing here silently
//! substitutes a default value.

use crate::entity::Document;
use crate::error::StoreError;
use crate::query::Query;
use docbus_bus::Payload;
use serde_json::Value;

/// Decode a document-id reply.
pub fn id(payload: &Payload) -> Result<String, StoreError> {
    let text = text_of(payload)?;
    if text.is_empty() {
        return Err(StoreError::Decode("empty id reply".to_string()));
    }
    Ok(text.to_string())
}

/// Decode a boolean-literal reply.
pub fn boolean(payload: &Payload) -> Result<bool, StoreError> {
    match text_of(payload)?.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(StoreError::Decode(format!(
            "expected boolean literal, got '{other}'"
        ))),
    }
}

/// Decode a single JSON record reply.
pub fn record(payload: &Payload) -> Result<Document, StoreError> {
    match parse(payload)? {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Decode(format!(
            "expected a JSON object, got {other}"
        ))),
    }
}

/// Decode a JSON array-of-records reply, preserving order.
///
/// An empty array decodes to an empty vec, never an error.
pub fn records(payload: &Payload) -> Result<Vec<Document>, StoreError> {
    let values = match parse(payload)? {
        Value::Array(values) => values,
        other => {
            return Err(StoreError::Decode(format!(
                "expected a JSON array, got {other}"
            )));
        }
    };

    values
        .into_iter()
        .map(|value| match value {
            Value::Object(map) => Ok(map),
            other => Err(StoreError::Decode(format!(
                "expected array of JSON objects, got element {other}"
            ))),
        })
        .collect()
}

/// Decode a serialized-query reply.
pub fn query(payload: &Payload) -> Result<Query, StoreError> {
    if payload.is_empty() {
        return Err(StoreError::Decode("empty query reply".to_string()));
    }
    Query::from_bytes(payload.as_bytes())
}

fn text_of(payload: &Payload) -> Result<&str, StoreError> {
    match payload {
        Payload::Text(s) => Ok(s),
        Payload::Binary(b) => std::str::from_utf8(b)
            .map_err(|e| StoreError::Decode(format!("reply is not UTF-8: {e}"))),
        Payload::Empty => Err(StoreError::Decode("empty reply payload".to_string())),
    }
}

fn parse(payload: &Payload) -> Result<Value, StoreError> {
    serde_json::from_str(text_of(payload)?).map_err(|e| StoreError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id() {
        assert_eq!(id(&Payload::Text("abc123".into())).unwrap(), "abc123");
        assert!(id(&Payload::Empty).is_err());
        assert!(id(&Payload::Text(String::new())).is_err());
    }

    #[test]
    fn test_boolean() {
        assert!(boolean(&Payload::Text("true".into())).unwrap());
        assert!(!boolean(&Payload::Text("false".into())).unwrap());
        assert!(boolean(&Payload::Text("yes".into())).is_err());
        assert!(boolean(&Payload::Empty).is_err());
    }

    #[test]
    fn test_record() {
        let doc = record(&Payload::Text(r#"{"brand":"Toyota"}"#.into())).unwrap();
        assert_eq!(doc.get("brand"), Some(&Value::from("Toyota")));

        assert!(record(&Payload::Text("[1,2]".into())).is_err());
        assert!(record(&Payload::Text("not json".into())).is_err());
    }

    #[test]
    fn test_records_preserves_order() {
        let docs = records(&Payload::Text(
            r#"[{"n":1},{"n":2},{"n":3}]"#.into(),
        ))
        .unwrap();
        let ns: Vec<i64> = docs
            .iter()
            .map(|d| d.get("n").and_then(Value::as_i64).unwrap())
            .collect();
        assert_eq!(ns, vec![1, 2, 3]);
    }

    #[test]
    fn test_records_empty_array_is_empty_vec() {
        assert!(records(&Payload::Text("[]".into())).unwrap().is_empty());
    }

    #[test]
    fn test_records_rejects_non_array() {
        assert!(records(&Payload::Text(r#"{"n":1}"#.into())).is_err());
        assert!(records(&Payload::Text(r#"[1]"#.into())).is_err());
    }

    #[test]
    fn test_query() {
        let original = Query::builder("cars").where_eq("brand", "Toyota").build();
        let bytes = original.to_bytes().unwrap();

        let decoded = query(&Payload::Binary(bytes)).unwrap();
        assert_eq!(decoded, original);

        assert!(query(&Payload::Empty).is_err());
        assert!(query(&Payload::Binary(b"garbage".to_vec())).is_err());
    }
}

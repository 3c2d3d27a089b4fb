//! Opaque continuation tokens for paginated scans.
//!
//! A token is the URL-safe base64 form of the canonical JSON of the last
//! evaluated key, every attribute tagged with its type:
//! `{"event_id":{"S":"orders#1"},"start_at":{"S":"2023-10-15T12:45:14Z"}}`.
//! Only this module reads or builds tokens.

use crate::Item;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use model::{KeySchema, KeyValue};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CursorError {
    #[error("cursor is not url-safe base64: {0}")]
    Encoding(String),
    #[error("cursor does not hold a typed key: {0}")]
    Shape(String),
    #[error("cursor does not match the key schema: {0}")]
    SchemaMismatch(String),
}

/// Exclusive start point of a scan: the key attributes of the last item seen.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StartKey(BTreeMap<String, KeyValue>);

impl StartKey {
    pub fn new() -> Self {
        StartKey::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: KeyValue) -> Self {
        self.0.insert(name.into(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&KeyValue> {
        self.0.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &KeyValue)> {
        self.0.iter()
    }

    /// Keep the attributes of `item` named by the given schemas.
    /// `None` if any of them is missing or not a key type.
    pub fn project(item: &Item, schemas: &[&KeySchema]) -> Option<StartKey> {
        let mut start_key = StartKey::new();

        for definition in schemas.iter().flat_map(|schema| schema.definitions()) {
            let value = item.get(definition.name).and_then(KeyValue::from_attribute)?;
            start_key.0.insert(definition.name.to_string(), value);
        }

        Some(start_key)
    }

    /// Build a start key out of every attribute of a key item.
    pub fn try_from_item(item: &Item) -> Result<StartKey, CursorError> {
        item.iter()
            .map(|(name, attribute)| {
                KeyValue::from_attribute(attribute)
                    .map(|value| (name.clone(), value))
                    .ok_or_else(|| CursorError::Shape(format!("{name} is not a key attribute")))
            })
            .collect::<Result<BTreeMap<String, KeyValue>, CursorError>>()
            .map(StartKey)
    }

    pub fn to_item(&self) -> Item {
        self.0
            .iter()
            .map(|(name, value)| (name.clone(), value.clone().into()))
            .collect()
    }

    /// The key must hold exactly the attributes of the schemas, with their types.
    pub fn check(&self, schemas: &[&KeySchema]) -> Result<(), CursorError> {
        let mut expected: BTreeSet<&str> = BTreeSet::new();

        for definition in schemas.iter().flat_map(|schema| schema.definitions()) {
            expected.insert(definition.name);

            let value = self.0.get(definition.name).ok_or_else(|| {
                CursorError::SchemaMismatch(format!("missing {}", definition.name))
            })?;

            if value.key_type() != definition.key_type {
                return Err(CursorError::SchemaMismatch(format!(
                    "{} is {:?}, expected {:?}",
                    definition.name,
                    value.key_type(),
                    definition.key_type
                )));
            }
        }

        // Index and table schemas may share attributes
        if self.0.len() != expected.len() {
            return Err(CursorError::SchemaMismatch(format!(
                "expected {} attributes, got {}",
                expected.len(),
                self.0.len()
            )));
        }

        Ok(())
    }
}

/// Continuation token handed to callers of paginated scans.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cursor(String);

impl Cursor {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Cursor {
    fn from(value: String) -> Self {
        Cursor(value)
    }
}

impl Display for Cursor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn encode(start_key: &StartKey) -> Cursor {
    let attributes: Map<String, Value> = start_key
        .0
        .iter()
        .map(|(name, value)| {
            let typed: Value = match value {
                KeyValue::S(value) => json!({ "S": value }),
                KeyValue::N(value) => json!({ "N": value }),
            };
            (name.clone(), typed)
        })
        .collect();

    Cursor(URL_SAFE_NO_PAD.encode(Value::Object(attributes).to_string()))
}

pub fn decode(cursor: &Cursor) -> Result<StartKey, CursorError> {
    let bytes: Vec<u8> = URL_SAFE_NO_PAD
        .decode(cursor.as_str())
        .map_err(|err| CursorError::Encoding(err.to_string()))?;

    let attributes: BTreeMap<String, KeyValue> =
        serde_json::from_slice(&bytes).map_err(|err| CursorError::Shape(err.to_string()))?;

    if attributes.is_empty() {
        return Err(CursorError::Shape("empty key".to_string()));
    }

    for (name, value) in attributes.iter() {
        if let KeyValue::N(number) = value {
            if number.parse::<f64>().map(|n| !n.is_finite()).unwrap_or(true) {
                return Err(CursorError::Shape(format!("{name} is not a number: {number}")));
            }
        }
    }

    let start_key: StartKey = StartKey(attributes);

    // Only the canonical form is accepted
    if encode(&start_key) != *cursor {
        return Err(CursorError::Shape("not in canonical form".to_string()));
    }

    Ok(start_key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::{KeyDefinition, KeyType};
    use serde_dynamo::AttributeValue;

    const TABLE_SCHEMA: KeySchema = KeySchema {
        partition_key: KeyDefinition::new("event_id", KeyType::S),
        sort_key: Some(KeyDefinition::new("target_queue_url", KeyType::S)),
    };

    const INDEX_SCHEMA: KeySchema = KeySchema {
        partition_key: KeyDefinition::new("is_open", KeyType::S),
        sort_key: Some(KeyDefinition::new("start_at", KeyType::S)),
    };

    fn token(raw: &str) -> Cursor {
        Cursor::from(URL_SAFE_NO_PAD.encode(raw))
    }

    fn table_key() -> StartKey {
        StartKey::new()
            .with("event_id", KeyValue::S("orders#1".to_string()))
            .with("target_queue_url", KeyValue::S("https://queue/a.fifo?x=1&y=/".to_string()))
    }

    #[test]
    fn decodes_what_it_encodes() {
        let numeric = StartKey::new()
            .with("account", KeyValue::S("acc-1".to_string()))
            .with("version", KeyValue::N("42".to_string()));

        assert_eq!(table_key(), decode(&encode(&table_key())).unwrap());
        assert_eq!(numeric, decode(&encode(&numeric)).unwrap());
    }

    #[test]
    fn encoding_is_deterministic_and_url_safe() {
        let cursor = encode(&table_key());

        assert_eq!(cursor, encode(&table_key()));
        assert!(cursor
            .as_str()
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn rejects_tokens_it_did_not_produce() {
        let malformed = [
            Cursor::from("not base64 !".to_string()),
            token("not json"),
            token("{}"),
            token(r#"["event_id"]"#),
            token(r#"{"event_id":{"B":"AAEC"}}"#),
            token(r#"{"event_id":{"S":"a","N":"1"}}"#),
            token(r#"{"version":{"N":"one"}}"#),
            token(r#"{"event_id":"orders#1"}"#),
            token(r#"{ "event_id" : {"S":"orders#1"} }"#),
            token(r#"{"version":{"N":"1"},"account":{"S":"acc-1"}}"#),
        ];

        for cursor in malformed {
            assert!(decode(&cursor).is_err(), "{cursor} should be malformed");
        }
    }

    #[test]
    fn type_mismatch_against_schema_is_rejected() {
        let numeric_queue = StartKey::new()
            .with("event_id", KeyValue::S("orders#1".to_string()))
            .with("target_queue_url", KeyValue::N("7".to_string()));
        let decoded = decode(&encode(&numeric_queue)).unwrap();

        assert!(matches!(
            decoded.check(&[&TABLE_SCHEMA]),
            Err(CursorError::SchemaMismatch(_))
        ));
        assert!(table_key().check(&[&TABLE_SCHEMA]).is_ok());
    }

    #[test]
    fn index_cursor_needs_table_and_index_keys() {
        let index_key = table_key()
            .with("is_open", KeyValue::S("OPEN".to_string()))
            .with("start_at", KeyValue::S("2023-10-15T12:45:14Z".to_string()));

        assert!(index_key.check(&[&TABLE_SCHEMA, &INDEX_SCHEMA]).is_ok());
        assert!(table_key().check(&[&TABLE_SCHEMA, &INDEX_SCHEMA]).is_err());
        assert!(index_key.check(&[&TABLE_SCHEMA]).is_err());
    }

    #[test]
    fn projects_key_attributes_out_of_items() {
        let item: Item = [
            ("event_id".to_string(), AttributeValue::S("orders#1".to_string())),
            (
                "target_queue_url".to_string(),
                AttributeValue::S("https://queue/a.fifo?x=1&y=/".to_string()),
            ),
            ("event".to_string(), AttributeValue::S("{}".to_string())),
        ]
        .into_iter()
        .collect();

        assert_eq!(Some(table_key()), StartKey::project(&item, &[&TABLE_SCHEMA]));
        assert_eq!(None, StartKey::project(&item, &[&INDEX_SCHEMA]));
    }
}

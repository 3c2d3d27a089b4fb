use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_dynamo::AttributeValue;
use std::collections::HashMap;

/// Scalar types a key attribute may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    S,
    N,
}

/// A typed key value. Numbers keep their textual form, as the store does.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyValue {
    S(String),
    N(String),
}

impl KeyValue {
    pub fn key_type(&self) -> KeyType {
        match self {
            KeyValue::S(_) => KeyType::S,
            KeyValue::N(_) => KeyType::N,
        }
    }

    /// Read a key value out of a stored attribute, if it has a key type.
    pub fn from_attribute(attribute: &AttributeValue) -> Option<KeyValue> {
        match attribute {
            AttributeValue::S(value) => Some(KeyValue::S(value.clone())),
            AttributeValue::N(value) => Some(KeyValue::N(value.clone())),
            _ => None,
        }
    }
}

impl From<KeyValue> for AttributeValue {
    fn from(value: KeyValue) -> Self {
        match value {
            KeyValue::S(value) => AttributeValue::S(value),
            KeyValue::N(value) => AttributeValue::N(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyAttribute {
    pub name: String,
    pub value: KeyValue,
}

impl KeyAttribute {
    pub fn new(name: impl Into<String>, value: KeyValue) -> Self {
        KeyAttribute {
            name: name.into(),
            value,
        }
    }

    pub fn string(name: impl Into<String>, value: impl Into<String>) -> Self {
        KeyAttribute::new(name, KeyValue::S(value.into()))
    }
}

/// Partition key plus optional sort key identifying exactly one row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PrimaryKey {
    pub partition_key: KeyAttribute,
    pub sort_key: Option<KeyAttribute>,
}

impl PrimaryKey {
    pub fn new(partition_key: KeyAttribute, sort_key: Option<KeyAttribute>) -> Self {
        PrimaryKey {
            partition_key,
            sort_key,
        }
    }

    pub fn attributes(&self) -> impl Iterator<Item = &KeyAttribute> {
        std::iter::once(&self.partition_key).chain(self.sort_key.as_ref())
    }

    /// The key as a store item, as used by point lookups.
    pub fn to_item(&self) -> HashMap<String, AttributeValue> {
        self.attributes()
            .map(|attribute| (attribute.name.clone(), attribute.value.clone().into()))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyDefinition {
    pub name: &'static str,
    pub key_type: KeyType,
}

impl KeyDefinition {
    pub const fn new(name: &'static str, key_type: KeyType) -> Self {
        KeyDefinition { name, key_type }
    }
}

/// Shape of the key of a table or of one of its indexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeySchema {
    pub partition_key: KeyDefinition,
    pub sort_key: Option<KeyDefinition>,
}

impl KeySchema {
    pub fn definitions(&self) -> impl Iterator<Item = &KeyDefinition> {
        std::iter::once(&self.partition_key).chain(self.sort_key.as_ref())
    }
}

/// Any record that can be stored in a table and report its own primary key.
pub trait Record: Serialize + DeserializeOwned + Send + Sync {
    fn key_schema() -> KeySchema;

    fn primary_key(&self) -> PrimaryKey;
}

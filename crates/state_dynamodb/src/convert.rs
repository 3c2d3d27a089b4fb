//! Between store items and the SDK's attribute values. Store values convert
//! into SDK values through serde_dynamo.

use aws_sdk_dynamodb::primitives::Blob;
use aws_sdk_dynamodb::types::AttributeValue;
use serde_dynamo::AttributeValue as StoreValue;
use state::Item;
use std::collections::HashMap;

pub(crate) type DynamoItem = HashMap<String, AttributeValue>;

/// Fails on attribute types this client does not know about. The `From`
/// impl shipped with serde_dynamo panics on those instead.
pub(crate) fn from_dynamo(value: AttributeValue) -> Result<StoreValue, String> {
    Ok(match value {
        AttributeValue::S(value) => StoreValue::S(value),
        AttributeValue::N(value) => StoreValue::N(value),
        AttributeValue::Bool(value) => StoreValue::Bool(value),
        AttributeValue::Null(value) => StoreValue::Null(value),
        AttributeValue::B(value) => StoreValue::B(value.into_inner()),
        AttributeValue::Ss(values) => StoreValue::Ss(values),
        AttributeValue::Ns(values) => StoreValue::Ns(values),
        AttributeValue::Bs(values) => {
            StoreValue::Bs(values.into_iter().map(Blob::into_inner).collect())
        }
        AttributeValue::L(values) => StoreValue::L(
            values
                .into_iter()
                .map(from_dynamo)
                .collect::<Result<Vec<StoreValue>, String>>()?,
        ),
        AttributeValue::M(values) => StoreValue::M(from_dynamo_item(values)?),
        other => return Err(format!("unsupported attribute type {other:?}")),
    })
}

pub(crate) fn to_dynamo_item(item: Item) -> DynamoItem {
    item.into_iter()
        .map(|(name, value)| (name, AttributeValue::from(value)))
        .collect()
}

pub(crate) fn from_dynamo_item(item: DynamoItem) -> Result<Item, String> {
    item.into_iter()
        .map(|(name, value)| from_dynamo(value).map(|value| (name, value)))
        .collect()
}

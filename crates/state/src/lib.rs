use async_trait::async_trait;
use model::{KeySchema, KeyValue, PrimaryKey};
use serde_dynamo::AttributeValue;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};

pub mod cursor;
pub mod table;
pub mod transaction;

pub use cursor::{Cursor, StartKey};
pub use table::{Page, Table};
pub use transaction::{check_distinct_rows, Transaction};

/// A stored row: attribute name to attribute value.
pub type Item = HashMap<String, AttributeValue>;

/// Item level access to a strongly consistent key-value store.
///
/// Every exclusive state transition is expressed as a single conditional write,
/// so implementations must evaluate a write's condition and apply it atomically.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get_item(&self, table: &str, key: &PrimaryKey) -> Result<Option<Item>, StateError>;

    async fn put_item(&self, put: Put) -> Result<(), StateError>;

    async fn update_item(&self, update: Update) -> Result<(), StateError>;

    async fn query(&self, query: QueryInput) -> Result<QueryPage, StateError>;

    /// All-or-nothing. A failed condition on any item rejects the whole batch.
    async fn transact_write(&self, items: Vec<TransactItem>) -> Result<(), StateError>;
}

/// Precondition on the current state of a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    AttributeExists(String),
    AttributeNotExists(String),
    All(Vec<Condition>),
}

impl Condition {
    pub fn attribute_exists(name: impl Into<String>) -> Self {
        Condition::AttributeExists(name.into())
    }

    pub fn attribute_not_exists(name: impl Into<String>) -> Self {
        Condition::AttributeNotExists(name.into())
    }

    /// The row identified by `key` must not exist yet.
    pub fn row_absent(key: &PrimaryKey) -> Self {
        Condition::All(
            key.attributes()
                .map(|attribute| Condition::attribute_not_exists(attribute.name.clone()))
                .collect(),
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Put {
    pub table: String,
    pub key: PrimaryKey,
    pub item: Item,
    pub condition: Option<Condition>,
}

/// Partial update of an existing row.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub table: String,
    pub key: PrimaryKey,
    pub set: Vec<(String, AttributeValue)>,
    pub increment: Vec<(String, i64)>,
    pub remove: Vec<String>,
    pub condition: Option<Condition>,
}

impl Update {
    pub fn new(table: impl Into<String>, key: PrimaryKey) -> Self {
        Update {
            table: table.into(),
            key,
            set: Vec::new(),
            increment: Vec::new(),
            remove: Vec::new(),
            condition: None,
        }
    }

    pub fn set(mut self, name: impl Into<String>, value: AttributeValue) -> Self {
        self.set.push((name.into(), value));
        self
    }

    pub fn increment(mut self, name: impl Into<String>, by: i64) -> Self {
        self.increment.push((name.into(), by));
        self
    }

    pub fn remove(mut self, name: impl Into<String>) -> Self {
        self.remove.push(name.into());
        self
    }

    pub fn condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransactItem {
    Put(Put),
    Update(Update),
}

impl TransactItem {
    pub fn table(&self) -> &str {
        match self {
            TransactItem::Put(put) => &put.table,
            TransactItem::Update(update) => &update.table,
        }
    }

    pub fn key(&self) -> &PrimaryKey {
        match self {
            TransactItem::Put(put) => &put.key,
            TransactItem::Update(update) => &update.key,
        }
    }

    pub fn condition(&self) -> Option<&Condition> {
        match self {
            TransactItem::Put(put) => put.condition.as_ref(),
            TransactItem::Update(update) => update.condition.as_ref(),
        }
    }
}

/// Secondary index to run a query against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexQuery {
    pub name: String,
    pub key_schema: KeySchema,
}

/// Range scan within one partition of a table or index.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryInput {
    pub table: String,
    pub key_schema: KeySchema,
    pub index: Option<IndexQuery>,
    pub partition_value: KeyValue,
    /// Inclusive upper bound on the sort key.
    pub sort_upper_bound: Option<KeyValue>,
    pub ascending: bool,
    pub limit: usize,
    pub start_key: Option<StartKey>,
}

impl QueryInput {
    /// Key schema the scan is ordered by.
    pub fn scan_schema(&self) -> &KeySchema {
        self.index
            .as_ref()
            .map(|index| &index.key_schema)
            .unwrap_or(&self.key_schema)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryPage {
    pub items: Vec<Item>,
    /// Key of the last evaluated item, `None` once the partition is exhausted.
    pub last_key: Option<StartKey>,
}

/// Errors arising from the record store.
#[derive(Debug)]
pub struct StateError {
    pub state_key: String,
    pub operation: StateOperation,
    pub reason: StateErrorReason,
}

#[derive(Debug, thiserror::Error)]
pub enum StateErrorReason {
    // An expected state entry was missing.
    #[error("record not found")]
    MissingEntry,
    // A write precondition did not hold
    #[error("conditional check failed")]
    ConditionalCheckFailed,
    #[error("malformed cursor: {0}")]
    MalformedCursor(String),
    // The state was not of the expected shape
    #[error("bad state: {0}")]
    BadState(String),
    // An error from the underlying store
    #[error("backend failure: {0}")]
    BackendFailure(model::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateOperation {
    Get,
    Put,
    Update,
    Query,
    TransactWrite,
}

impl StateError {
    pub fn new(state_key: impl Into<String>, operation: StateOperation, reason: StateErrorReason) -> Self {
        StateError {
            state_key: state_key.into(),
            operation,
            reason,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.reason, StateErrorReason::MissingEntry)
    }

    pub fn is_conditional_check_failed(&self) -> bool {
        matches!(self.reason, StateErrorReason::ConditionalCheckFailed)
    }

    pub fn is_malformed_cursor(&self) -> bool {
        matches!(self.reason, StateErrorReason::MalformedCursor(_))
    }
}

impl Display for StateError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:?} of [{}] failed: {}",
            self.operation, self.state_key, self.reason
        )
    }
}

impl std::error::Error for StateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.reason {
            StateErrorReason::BackendFailure(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

/// Human readable form of a key, used for error context and logs.
pub fn describe_key(key: &PrimaryKey) -> String {
    key.attributes()
        .map(|attribute| match &attribute.value {
            KeyValue::S(value) | KeyValue::N(value) => value.as_str(),
        })
        .collect::<Vec<&str>>()
        .join("|")
}

use crate::StateErrorReason::{BadState, ConditionalCheckFailed};
use crate::StateOperation::TransactWrite;
use crate::{describe_key, RecordStore, StateError, TransactItem};

/// Writes to commit together, across records and tables.
#[derive(Debug, Default)]
pub struct Transaction {
    items: Vec<TransactItem>,
    // First error met while building the items
    error: Option<StateError>,
}

impl Transaction {
    pub fn new() -> Self {
        Transaction::default()
    }

    pub fn include(mut self, item: Result<TransactItem, StateError>) -> Self {
        match item {
            Ok(item) => self.items.push(item),
            Err(err) => {
                if self.error.is_none() {
                    self.error = Some(err);
                }
            }
        }

        self
    }

    pub fn push(mut self, item: TransactItem) -> Self {
        self.items.push(item);
        self
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Commit all items or none. Nothing is sent if any item failed to build.
    pub async fn execute(self, store: &dyn RecordStore) -> Result<(), StateError> {
        if let Some(err) = self.error {
            return Err(err);
        }

        if self.items.is_empty() {
            return Ok(());
        }

        tracing::debug!(items = self.items.len(), "Executing transaction");

        store.transact_write(self.items).await
    }
}

/// A batch may write each row once. A guarded write to a row an earlier item
/// already writes cannot hold, so it fails its condition.
pub fn check_distinct_rows(items: &[TransactItem]) -> Result<(), StateError> {
    for (position, item) in items.iter().enumerate() {
        if items[..position]
            .iter()
            .any(|other| other.table() == item.table() && other.key() == item.key())
        {
            let reason = match item.condition() {
                Some(_) => ConditionalCheckFailed,
                None => BadState("transaction touches the same row twice".to_string()),
            };

            return Err(StateError::new(describe_key(item.key()), TransactWrite, reason));
        }
    }

    Ok(())
}

use async_trait::async_trait;
use model::{KeySchema, KeyValue, PrimaryKey};
use serde_dynamo::AttributeValue;
use state::StateErrorReason::{BadState, ConditionalCheckFailed};
use state::StateOperation::{Put as PutOperation, TransactWrite, Update as UpdateOperation};
use state::{
    check_distinct_rows, describe_key, Condition, Item, Put, QueryInput, QueryPage, RecordStore, StartKey, StateError,
    StateOperation, TransactItem, Update,
};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

type Rows = HashMap<PrimaryKey, Item>;

/// A record store held in process memory.
///
/// All tables live behind one lock, so every write and every transaction is
/// evaluated and applied atomically. Index scans project any row carrying the
/// index key attributes, which makes every index sparse.
#[derive(Default)]
pub struct InMemoryRecordStore {
    tables: Mutex<HashMap<String, Rows>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        InMemoryRecordStore::default()
    }

    /// Number of rows stored in `table`.
    pub fn row_count(&self, table: &str) -> usize {
        self.lock().get(table).map(Rows::len).unwrap_or_default()
    }

    /// Write a raw item, bypassing any record type. Useful to seed malformed rows.
    pub fn insert_raw(&self, table: &str, key: PrimaryKey, item: Item) {
        self.lock()
            .entry(table.to_string())
            .or_default()
            .insert(key, item);
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Rows>> {
        // A panicking writer never leaves a half applied write behind
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn get_item(&self, table: &str, key: &PrimaryKey) -> Result<Option<Item>, StateError> {
        Ok(self
            .lock()
            .get(table)
            .and_then(|rows| rows.get(key))
            .cloned())
    }

    async fn put_item(&self, put: Put) -> Result<(), StateError> {
        let mut tables = self.lock();

        apply(&mut tables, TransactItem::Put(put), PutOperation)
    }

    async fn update_item(&self, update: Update) -> Result<(), StateError> {
        let mut tables = self.lock();

        apply(&mut tables, TransactItem::Update(update), UpdateOperation)
    }

    async fn query(&self, query: QueryInput) -> Result<QueryPage, StateError> {
        let tables = self.lock();
        let Some(rows) = tables.get(&query.table) else {
            return Ok(QueryPage::default());
        };

        let scan_schema: KeySchema = *query.scan_schema();
        let direction = |ordering: Ordering| {
            if query.ascending {
                ordering
            } else {
                ordering.reverse()
            }
        };

        let mut matching: Vec<(Vec<KeyValue>, &Item)> = rows
            .values()
            .filter(|item| {
                key_value(item, scan_schema.partition_key.name).as_ref()
                    == Some(&query.partition_value)
            })
            .filter_map(|item| {
                sort_position(item, &scan_schema, &query.key_schema).map(|position| (position, item))
            })
            .filter(|(position, _)| match (&query.sort_upper_bound, position.first()) {
                (Some(bound), Some(sort_value)) if scan_schema.sort_key.is_some() => {
                    compare_values(sort_value, bound) != Ordering::Greater
                }
                _ => true,
            })
            .collect();

        matching.sort_by(|(left, _), (right, _)| direction(compare_positions(left, right)));

        if let Some(start_key) = query.start_key.as_ref() {
            let start: Vec<KeyValue> = sort_position(&start_key.to_item(), &scan_schema, &query.key_schema)
                .unwrap_or_default();

            matching.retain(|(position, _)| {
                direction(compare_positions(position, &start)) == Ordering::Greater
            });
        }

        let exhausted: bool = matching.len() <= query.limit;
        let items: Vec<Item> = matching
            .into_iter()
            .take(query.limit)
            .map(|(_, item)| item.clone())
            .collect();

        let last_key: Option<StartKey> = match (exhausted, items.last()) {
            (false, Some(last)) => {
                let mut schemas: Vec<&KeySchema> = vec![&query.key_schema];
                if let Some(index) = query.index.as_ref() {
                    schemas.push(&index.key_schema);
                }
                StartKey::project(last, &schemas)
            }
            _ => None,
        };

        tracing::debug!(
            table = %query.table,
            items = items.len(),
            more = last_key.is_some(),
            "In memory query"
        );

        Ok(QueryPage { items, last_key })
    }

    async fn transact_write(&self, items: Vec<TransactItem>) -> Result<(), StateError> {
        let mut tables = self.lock();

        check_distinct_rows(&items)?;

        // Apply on a copy and swap it in, so a late failure leaves nothing behind
        let mut staged: HashMap<String, Rows> = tables.clone();
        for item in items {
            apply(&mut staged, item, TransactWrite)?;
        }
        *tables = staged;

        Ok(())
    }
}

fn apply(
    tables: &mut HashMap<String, Rows>,
    write: TransactItem,
    operation: StateOperation,
) -> Result<(), StateError> {
    let rows: &mut Rows = tables.entry(write.table().to_string()).or_default();
    let key: PrimaryKey = write.key().clone();
    let existing: Option<&Item> = rows.get(&key);

    if let Some(condition) = write.condition() {
        if !holds(condition, existing) {
            return Err(StateError::new(
                describe_key(&key),
                operation,
                ConditionalCheckFailed,
            ));
        }
    }

    let item: Item = match write {
        TransactItem::Put(put) => {
            let mut item: Item = put.item;
            item.extend(key.to_item());
            item
        }
        TransactItem::Update(update) => {
            let mut item: Item = existing.cloned().unwrap_or_else(|| key.to_item());
            for (name, value) in update.set {
                item.insert(name, value);
            }
            for (name, by) in update.increment {
                let current: i64 = match item.get(&name) {
                    None => 0,
                    Some(AttributeValue::N(number)) => number.parse().map_err(|_| {
                        StateError::new(
                            describe_key(&key),
                            operation,
                            BadState(format!("{name} is not an integer: {number}")),
                        )
                    })?,
                    Some(_) => {
                        return Err(StateError::new(
                            describe_key(&key),
                            operation,
                            BadState(format!("{name} is not a number")),
                        ))
                    }
                };
                item.insert(name, AttributeValue::N((current + by).to_string()));
            }
            for name in update.remove {
                item.remove(&name);
            }
            item
        }
    };

    rows.insert(key, item);

    Ok(())
}

fn holds(condition: &Condition, existing: Option<&Item>) -> bool {
    match condition {
        Condition::AttributeExists(name) => existing.is_some_and(|item| item.contains_key(name)),
        Condition::AttributeNotExists(name) => !existing.is_some_and(|item| item.contains_key(name)),
        Condition::All(conditions) => conditions
            .iter()
            .all(|condition| holds(condition, existing)),
    }
}

fn key_value(item: &Item, name: &str) -> Option<KeyValue> {
    item.get(name).and_then(KeyValue::from_attribute)
}

/// Ordering of an item within a scan: the scan sort key, then the table key
/// to break ties between index entries.
fn sort_position(item: &Item, scan_schema: &KeySchema, table_schema: &KeySchema) -> Option<Vec<KeyValue>> {
    let mut position: Vec<KeyValue> = Vec::new();

    if let Some(sort_key) = scan_schema.sort_key {
        position.push(key_value(item, sort_key.name)?);
    }
    if scan_schema != table_schema {
        for definition in table_schema.definitions() {
            position.push(key_value(item, definition.name)?);
        }
    }

    Some(position)
}

fn compare_positions(left: &[KeyValue], right: &[KeyValue]) -> Ordering {
    left.iter()
        .zip(right)
        .map(|(left, right)| compare_values(left, right))
        .find(|ordering| ordering.is_ne())
        .unwrap_or_else(|| left.len().cmp(&right.len()))
}

/// Numbers compare numerically, strings by their bytes.
fn compare_values(left: &KeyValue, right: &KeyValue) -> Ordering {
    match (left, right) {
        (KeyValue::N(left), KeyValue::N(right)) => {
            match (left.parse::<f64>(), right.parse::<f64>()) {
                (Ok(left), Ok(right)) => left.partial_cmp(&right).unwrap_or(Ordering::Equal),
                _ => left.cmp(right),
            }
        }
        (KeyValue::S(left), KeyValue::S(right)) => left.as_bytes().cmp(right.as_bytes()),
        (KeyValue::N(_), KeyValue::S(_)) => Ordering::Less,
        (KeyValue::S(_), KeyValue::N(_)) => Ordering::Greater,
    }
}

use crate::cursor::{self, Cursor, StartKey};
use crate::StateErrorReason::{BadState, MalformedCursor, MissingEntry};
use crate::StateOperation::{Get, Put as PutOperation, Query};
use crate::{
    describe_key, Condition, Item, Put, QueryInput, QueryPage, RecordStore, StateError,
    TransactItem,
};
use model::{KeySchema, KeyValue, PrimaryKey, Record};
use std::marker::PhantomData;
use std::sync::Arc;

/// One page of a paginated scan.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<R> {
    pub records: Vec<R>,
    /// Resume point for the next page, `None` once the scan is exhausted.
    pub next_cursor: Option<Cursor>,
}

impl<R> Default for Page<R> {
    fn default() -> Self {
        Page {
            records: Vec::new(),
            next_cursor: None,
        }
    }
}

/// Typed access to a table holding records of type `R`.
pub struct Table<R> {
    store: Arc<dyn RecordStore>,
    name: String,
    // Hold the record type
    _record: PhantomData<fn() -> R>,
}

impl<R> Clone for Table<R> {
    fn clone(&self) -> Self {
        Table {
            store: self.store.clone(),
            name: self.name.clone(),
            _record: PhantomData,
        }
    }
}

impl<R: Record> Table<R> {
    pub fn new(store: Arc<dyn RecordStore>, name: impl Into<String>) -> Self {
        Table {
            store,
            name: name.into(),
            _record: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn store(&self) -> &dyn RecordStore {
        self.store.as_ref()
    }

    /// Unconditional upsert.
    pub async fn persist(&self, record: &R) -> Result<(), StateError> {
        let key: PrimaryKey = record.primary_key();
        let item: Item = Self::to_item(record, &key, PutOperation)?;

        self.store
            .put_item(Put {
                table: self.name.clone(),
                key,
                item,
                condition: None,
            })
            .await
    }

    pub async fn reconstitute(&self, key: &PrimaryKey) -> Result<R, StateError> {
        let item: Item = self
            .store
            .get_item(&self.name, key)
            .await?
            .ok_or_else(|| StateError::new(describe_key(key), Get, MissingEntry))?;

        Self::from_item(item, &describe_key(key), Get)
    }

    /// Newest first within one partition.
    pub async fn query(
        &self,
        partition_value: KeyValue,
        cursor: Option<&Cursor>,
        limit: usize,
    ) -> Result<Page<R>, StateError> {
        let input: QueryInput = QueryInput {
            table: self.name.clone(),
            key_schema: R::key_schema(),
            index: None,
            partition_value,
            sort_upper_bound: None,
            ascending: false,
            limit,
            start_key: None,
        };

        self.query_page(input, cursor).await
    }

    /// Run `input` resuming after `cursor` and decode the page.
    /// The cursor must carry the table key, plus the index key when scanning an index.
    pub async fn query_page(
        &self,
        mut input: QueryInput,
        cursor: Option<&Cursor>,
    ) -> Result<Page<R>, StateError> {
        let table_schema: KeySchema = R::key_schema();
        let mut schemas: Vec<&KeySchema> = vec![&table_schema];
        if let Some(index) = input.index.as_ref() {
            schemas.push(&index.key_schema);
        }

        if let Some(cursor) = cursor {
            let start_key: StartKey = cursor::decode(cursor)
                .and_then(|start_key| start_key.check(&schemas).map(|_| start_key))
                .map_err(|err| {
                    StateError::new(self.name.clone(), Query, MalformedCursor(err.to_string()))
                })?;

            input.start_key = Some(start_key);
        }

        if input.limit == 0 {
            return Ok(Page::default());
        }

        let page: QueryPage = self.store.query(input).await?;

        let records: Vec<R> = page
            .items
            .into_iter()
            .map(|item| Self::from_item(item, &self.name, Query))
            .collect::<Result<Vec<R>, StateError>>()?;

        Ok(Page {
            records,
            next_cursor: page.last_key.as_ref().map(cursor::encode),
        })
    }

    /// Put of `record` that fails unless no row with its key exists yet.
    pub fn transactional_insert(&self, record: &R) -> Result<TransactItem, StateError> {
        let key: PrimaryKey = record.primary_key();
        let item: Item = Self::to_item(record, &key, PutOperation)?;

        Ok(TransactItem::Put(Put {
            table: self.name.clone(),
            condition: Some(Condition::row_absent(&key)),
            key,
            item,
        }))
    }

    fn to_item(
        record: &R,
        key: &PrimaryKey,
        operation: crate::StateOperation,
    ) -> Result<Item, StateError> {
        serde_dynamo::to_item(record).map_err(|err| {
            StateError::new(describe_key(key), operation, BadState(err.to_string()))
        })
    }

    fn from_item(
        item: Item,
        state_key: &str,
        operation: crate::StateOperation,
    ) -> Result<R, StateError> {
        serde_dynamo::from_item(item).map_err(|err| {
            StateError::new(state_key.to_string(), operation, BadState(err.to_string()))
        })
    }
}

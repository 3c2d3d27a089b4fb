use crate::table::WorkflowTable;
use crate::WorkflowError;
use model::workflow::{IS_OPEN, OPEN, START_AT};
use model::{KeyDefinition, KeySchema, KeyType, KeyValue, Record, WorkflowRecord, ZuluDateTime};
use state::{Cursor, IndexQuery, Page, QueryInput, Table};

/// Key of the open-workflows index. Closed workflows carry no `is_open`
/// and so never appear in it.
pub const OPEN_WORKFLOWS_KEY_SCHEMA: KeySchema = KeySchema {
    partition_key: KeyDefinition::new(IS_OPEN, KeyType::S),
    sort_key: Some(KeyDefinition::new(START_AT, KeyType::S)),
};

/// Due open workflows, oldest start first.
#[derive(Clone)]
pub struct OpenWorkflowsIndex {
    table: Table<WorkflowRecord>,
    index_name: String,
}

impl OpenWorkflowsIndex {
    pub fn new(workflows: &WorkflowTable, index_name: impl Into<String>) -> Self {
        OpenWorkflowsIndex {
            table: workflows.table().clone(),
            index_name: index_name.into(),
        }
    }

    /// At most `limit` open workflows with `start_at <= until`, resuming after `cursor`.
    pub async fn open_workflows(
        &self,
        limit: usize,
        until: ZuluDateTime,
        cursor: Option<&Cursor>,
    ) -> Result<Page<WorkflowRecord>, WorkflowError> {
        let input: QueryInput = QueryInput {
            table: self.table.name().to_string(),
            key_schema: WorkflowRecord::key_schema(),
            index: Some(IndexQuery {
                name: self.index_name.clone(),
                key_schema: OPEN_WORKFLOWS_KEY_SCHEMA,
            }),
            partition_value: KeyValue::S(OPEN.to_string()),
            sort_upper_bound: Some(KeyValue::S(until.to_string())),
            ascending: true,
            limit,
            start_key: None,
        };

        Ok(self.table.query_page(input, cursor).await?)
    }
}

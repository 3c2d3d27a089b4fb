use crate::WorkflowError;
use model::workflow::{AMOUNT_OF_STARTS, FINISHED_AT, IS_OPEN, START_AT};
use model::{EventId, KeyValue, PrimaryKey, Record, WorkflowRecord, ZuluDateTime};
use serde_dynamo::AttributeValue;
use state::{
    Condition, Cursor, Page, RecordStore, StateError, Table, TransactItem, Transaction, Update,
};
use std::sync::Arc;

/// The workflows table and the state transitions of its records.
///
/// Postpone and close only apply to a workflow which is still open. Both
/// are single conditional writes on the presence of `is_open`, so concurrent
/// dispatchers and consumers never resurrect a closed workflow.
#[derive(Clone)]
pub struct WorkflowTable {
    table: Table<WorkflowRecord>,
}

impl WorkflowTable {
    pub fn new(store: Arc<dyn RecordStore>, table_name: impl Into<String>) -> Self {
        WorkflowTable {
            table: Table::new(store, table_name),
        }
    }

    pub fn name(&self) -> &str {
        self.table.name()
    }

    pub(crate) fn table(&self) -> &Table<WorkflowRecord> {
        &self.table
    }

    pub async fn persist(&self, workflow: &WorkflowRecord) -> Result<(), WorkflowError> {
        Ok(self.table.persist(workflow).await?)
    }

    pub async fn reconstitute(
        &self,
        event_id: &str,
        target_queue_url: &str,
    ) -> Result<WorkflowRecord, WorkflowError> {
        Ok(self
            .table
            .reconstitute(&WorkflowRecord::key(event_id, target_queue_url))
            .await?)
    }

    /// Every workflow created for `event_id`, one per target queue.
    pub async fn query(
        &self,
        event_id: &EventId,
        cursor: Option<&Cursor>,
        limit: usize,
    ) -> Result<Page<WorkflowRecord>, WorkflowError> {
        Ok(self
            .table
            .query(KeyValue::S(event_id.to_string()), cursor, limit)
            .await?)
    }

    /// Move the next attempt of an open workflow to `next_start_at` and count the start.
    pub async fn postpone(
        &self,
        workflow: &WorkflowRecord,
        next_start_at: ZuluDateTime,
    ) -> Result<(), WorkflowError> {
        let update: Update = Update::new(self.name(), workflow.primary_key())
            .set(START_AT, AttributeValue::S(next_start_at.to_string()))
            .increment(AMOUNT_OF_STARTS, 1)
            .condition(Condition::attribute_exists(IS_OPEN));

        self.table
            .store()
            .update_item(update)
            .await
            .map_err(|err| already_finished(err, workflow.event_id.as_str(), &workflow.target_queue_url))?;

        tracing::info!(
            event_id = %workflow.event_id,
            target_queue_url = %workflow.target_queue_url,
            %next_start_at,
            amount_of_starts = workflow.amount_of_starts + 1,
            "Workflow postponed"
        );

        Ok(())
    }

    /// Mark an open workflow finished. It will not be dispatched again.
    pub async fn close(
        &self,
        event_id: &str,
        target_queue_url: &str,
        finished_at: ZuluDateTime,
    ) -> Result<(), WorkflowError> {
        self.table
            .store()
            .update_item(close_update(self.name(), event_id, target_queue_url, finished_at))
            .await
            .map_err(|err| already_finished(err, event_id, target_queue_url))?;

        tracing::info!(event_id, target_queue_url, %finished_at, "Workflow closed");

        Ok(())
    }

    /// The close of an open workflow, to commit along with other writes.
    pub fn transactional_close(
        &self,
        event_id: &str,
        target_queue_url: &str,
        finished_at: ZuluDateTime,
    ) -> TransactItem {
        TransactItem::Update(close_update(self.name(), event_id, target_queue_url, finished_at))
    }

    /// The creation of a workflow which must not exist yet.
    pub fn transactional_insert(
        &self,
        workflow: &WorkflowRecord,
    ) -> Result<TransactItem, StateError> {
        self.table.transactional_insert(workflow)
    }

    /// Commit `transaction`. A failed precondition on any item rejects all of them.
    pub async fn execute(&self, transaction: Transaction) -> Result<(), WorkflowError> {
        transaction
            .execute(self.table.store())
            .await
            .map_err(|err| {
                if err.is_conditional_check_failed() {
                    WorkflowError::ConditionalCheckFailed(err)
                } else {
                    WorkflowError::State(err)
                }
            })
    }
}

fn close_update(
    table: &str,
    event_id: &str,
    target_queue_url: &str,
    finished_at: ZuluDateTime,
) -> Update {
    let key: PrimaryKey = WorkflowRecord::key(event_id, target_queue_url);

    Update::new(table, key)
        .set(FINISHED_AT, AttributeValue::S(finished_at.to_string()))
        .remove(IS_OPEN)
        .condition(Condition::attribute_exists(IS_OPEN))
}

fn already_finished(err: StateError, event_id: &str, target_queue_url: &str) -> WorkflowError {
    if err.is_conditional_check_failed() {
        WorkflowError::AlreadyFinished {
            event_id: event_id.to_string(),
            target_queue_url: target_queue_url.to_string(),
        }
    } else {
        WorkflowError::State(err)
    }
}

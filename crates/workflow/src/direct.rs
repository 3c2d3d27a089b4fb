use crate::stream::ChangeRecord;
use crate::table::WorkflowTable;
use crate::{notify, outbound_message, WorkflowError};
use tracing::Instrument;
use model::{WorkflowRecord, ZuluDateTime};
use service::{FailureNotifier, MessageSender};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirectDispatchReport {
    pub dispatched: usize,
    pub skipped: usize,
    pub failed: usize,
}

enum Outcome {
    Dispatched,
    Skipped,
}

/// Forwards freshly inserted workflows without waiting for the next poll.
pub struct DirectDispatcher {
    workflows: WorkflowTable,
    sender: Arc<dyn MessageSender>,
    notifier: Arc<dyn FailureNotifier>,
    next_start_in: Duration,
}

impl DirectDispatcher {
    pub fn new(
        workflows: WorkflowTable,
        sender: Arc<dyn MessageSender>,
        notifier: Arc<dyn FailureNotifier>,
        next_start_in: Duration,
    ) -> Self {
        DirectDispatcher {
            workflows,
            sender,
            notifier,
            next_start_in,
        }
    }

    pub async fn dispatch(&self, records: Vec<ChangeRecord>) -> DirectDispatchReport {
        self.dispatch_at(records, ZuluDateTime::now()).await
    }

    /// Handle a batch of change feed entries one after the other. A failing
    /// entry is notified on its own and never stops the batch.
    pub async fn dispatch_at(
        &self,
        records: Vec<ChangeRecord>,
        now: ZuluDateTime,
    ) -> DirectDispatchReport {
        let mut report: DirectDispatchReport = DirectDispatchReport::default();

        tracing::info!("Directly dispatching batch of [{}] changes", records.len());

        for record in records.iter() {
            let span = tracing::info_span!("Change", dynamodb_event_id = %record.event_id);

            match self.dispatch_one(record, now).instrument(span).await {
                Ok(Outcome::Dispatched) => report.dispatched += 1,
                Ok(Outcome::Skipped) => report.skipped += 1,
                Err(err) => {
                    tracing::error!(dynamodb_event_id = %record.event_id, "Failed to dispatch: {err}");
                    report.failed += 1;

                    notify(
                        self.notifier.as_ref(),
                        &record.event_id,
                        format!(
                            "impossible to directly pass the event {} to SQS",
                            record.event_id
                        ),
                    )
                    .await;
                }
            }
        }

        tracing::info!(
            dispatched = report.dispatched,
            skipped = report.skipped,
            failed = report.failed,
            "Batch dispatched"
        );

        report
    }

    async fn dispatch_one(
        &self,
        record: &ChangeRecord,
        now: ZuluDateTime,
    ) -> Result<Outcome, WorkflowError> {
        if !record.is_insert() {
            tracing::debug!(event_name = %record.event_name, "Skipping non insert change");

            return Ok(Outcome::Skipped);
        }

        let workflow: WorkflowRecord = record.workflow()?;

        if !workflow.is_open() {
            tracing::info!(event_id = %workflow.event_id, "Skipping workflow inserted closed");

            return Ok(Outcome::Skipped);
        }

        if workflow.start_at > now {
            tracing::info!(
                event_id = %workflow.event_id,
                start_at = %workflow.start_at,
                "Workflow is not due yet"
            );

            return Ok(Outcome::Skipped);
        }

        tracing::info!(
            event_id = %workflow.event_id,
            target_queue_url = %workflow.target_queue_url,
            "Sending event"
        );
        self.sender.send_message(outbound_message(&workflow)).await?;

        match self.workflows.postpone(&workflow, now + self.next_start_in).await {
            Ok(()) => Ok(Outcome::Dispatched),
            // Closed between its insert and now, the consumer already has it
            Err(err) if err.is_already_finished() => {
                tracing::info!(event_id = %workflow.event_id, "Workflow finished while sending");

                Ok(Outcome::Dispatched)
            }
            Err(err) => Err(err),
        }
    }
}

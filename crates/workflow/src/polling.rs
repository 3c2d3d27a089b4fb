use crate::open_workflows::OpenWorkflowsIndex;
use crate::table::WorkflowTable;
use crate::{notify, outbound_message, WorkflowError};
use tracing::Instrument;
use model::{WorkflowRecord, ZuluDateTime};
use service::{FailureNotifier, MessageSender};
use state::Page;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollingReport {
    pub fetched: usize,
    pub sent: usize,
    pub failed_sends: usize,
    pub postponed: usize,
    /// Closed by their consumer while being dispatched.
    pub already_finished: usize,
}

/// Periodically forwards every open workflow whose start time has passed.
pub struct PollingDispatcher {
    workflows: WorkflowTable,
    open_workflows: OpenWorkflowsIndex,
    sender: Arc<dyn MessageSender>,
    notifier: Arc<dyn FailureNotifier>,
    next_start_in: Duration,
    workflows_to_dispatch: usize,
}

impl PollingDispatcher {
    pub fn new(
        workflows: WorkflowTable,
        open_workflows: OpenWorkflowsIndex,
        sender: Arc<dyn MessageSender>,
        notifier: Arc<dyn FailureNotifier>,
        next_start_in: Duration,
        workflows_to_dispatch: usize,
    ) -> Self {
        PollingDispatcher {
            workflows,
            open_workflows,
            sender,
            notifier,
            next_start_in,
            workflows_to_dispatch,
        }
    }

    pub async fn dispatch(&self, request_id: &str) -> Result<PollingReport, WorkflowError> {
        self.dispatch_at(request_id, ZuluDateTime::now()).await
    }

    /// Dispatch the oldest due workflows as of `now`.
    ///
    /// Failed sends are counted and reported in one notification, the
    /// workflow is postponed all the same. Any postpone failure other than an
    /// already finished workflow aborts the run and is returned.
    pub async fn dispatch_at(
        &self,
        request_id: &str,
        now: ZuluDateTime,
    ) -> Result<PollingReport, WorkflowError> {
        let span = tracing::info_span!("Polling", request_id);
        let mut report: PollingReport = PollingReport::default();

        let result: Result<(), WorkflowError> =
            self.run(now, &mut report).instrument(span).await;

        if report.failed_sends > 0 {
            notify(
                self.notifier.as_ref(),
                request_id,
                format!("impossible to send {} events", report.failed_sends),
            )
            .await;
        }

        match result {
            Ok(()) => {
                tracing::info!(
                    request_id,
                    fetched = report.fetched,
                    sent = report.sent,
                    failed_sends = report.failed_sends,
                    "Workflows dispatched"
                );

                Ok(report)
            }
            Err(err) => {
                tracing::error!(request_id, "Dispatch aborted: {err}");
                notify(self.notifier.as_ref(), request_id, err.to_string()).await;

                Err(err)
            }
        }
    }

    async fn run(&self, now: ZuluDateTime, report: &mut PollingReport) -> Result<(), WorkflowError> {
        let page: Page<WorkflowRecord> = self
            .open_workflows
            .open_workflows(self.workflows_to_dispatch, now, None)
            .await?;
        report.fetched = page.records.len();

        tracing::info!("Fetched [{}] open workflows", report.fetched);

        for workflow in page.records.iter() {
            tracing::info!(
                event_id = %workflow.event_id,
                target_queue_url = %workflow.target_queue_url,
                "Sending event"
            );

            match self.sender.send_message(outbound_message(workflow)).await {
                Ok(()) => report.sent += 1,
                Err(err) => {
                    tracing::error!(event_id = %workflow.event_id, "Failed to send event: {err}");
                    report.failed_sends += 1;
                }
            }

            match self.workflows.postpone(workflow, now + self.next_start_in).await {
                Ok(()) => report.postponed += 1,
                Err(err) if err.is_already_finished() => {
                    tracing::info!(event_id = %workflow.event_id, "Workflow finished while sending");
                    report.already_finished += 1;
                }
                Err(err) => return Err(err),
            }
        }

        Ok(())
    }
}

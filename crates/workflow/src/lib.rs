//! Dispatch of workflow records to their target FIFO queues.
//!
//! Workflows are scheduled, retryable units of outbound work stored in a
//! record store. Two dispatchers forward them: the [`DirectDispatcher`] reacts
//! to freshly inserted workflows from a change feed, the [`PollingDispatcher`]
//! periodically picks up every open workflow whose start time has passed.
//! Both postpone a dispatched workflow by a fixed backoff, so a workflow keeps
//! being sent until its consumer closes it, see [`consumer`].

use model::{ModelError, WorkflowRecord};
use service::{
    FailureNotifier, Notification, OutboundMessage, ServiceError, EVENT_ID_ATTRIBUTE,
    TARGET_QUEUE_URL_ATTRIBUTE,
};
use state::StateError;

pub mod config;
pub mod consumer;
pub mod direct;
pub mod open_workflows;
pub mod polling;
pub mod stream;
pub mod table;

pub use config::{ConfigError, DispatchConfig};
pub use consumer::{process_multiple, DeliveredWorkflow, MessageProcessor, WorkflowCloser};
pub use direct::{DirectDispatchReport, DirectDispatcher};
pub use open_workflows::OpenWorkflowsIndex;
pub use polling::{PollingDispatcher, PollingReport};
pub use stream::ChangeRecord;
pub use table::WorkflowTable;

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// The workflow was closed before the write, no transition applies anymore.
    #[error("workflow {event_id} to {target_queue_url} had been finished")]
    AlreadyFinished {
        event_id: String,
        target_queue_url: String,
    },
    /// A precondition of a multi-record transaction did not hold.
    #[error("transaction rejected: {0}")]
    ConditionalCheckFailed(StateError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Transport(#[from] ServiceError),
}

impl WorkflowError {
    pub fn is_already_finished(&self) -> bool {
        matches!(self, WorkflowError::AlreadyFinished { .. })
    }
}

/// The message delivering `workflow` to its target queue.
pub fn outbound_message(workflow: &WorkflowRecord) -> OutboundMessage {
    OutboundMessage::new(
        workflow.target_queue_url.as_str(),
        workflow.event.as_str(),
        workflow.event_message_group_id.as_str(),
        workflow.deduplication_id(),
    )
    .with_attribute(EVENT_ID_ATTRIBUTE, workflow.event_id.as_str())
    .with_attribute(TARGET_QUEUE_URL_ATTRIBUTE, workflow.target_queue_url.as_str())
}

/// Notifications are best effort: a failing notifier is logged and ignored.
pub(crate) async fn notify(notifier: &dyn FailureNotifier, request_id: &str, message: String) {
    if let Err(err) = notifier.notify(Notification::new(request_id, message)).await {
        tracing::error!(request_id, "Failed to send notification: {err}");
    }
}

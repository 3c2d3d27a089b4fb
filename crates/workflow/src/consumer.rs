//! Consumer side of a dispatch: the Lambda reading a target queue.
//!
//! Messages of one batch are handled one after the other. Failed messages
//! are reported back so that only they are redelivered.

use crate::table::WorkflowTable;
use crate::WorkflowError;
use async_trait::async_trait;
use aws_lambda_events::sqs::{BatchItemFailure, SqsBatchResponse, SqsEvent, SqsMessage};
use model::{ModelError, ZuluDateTime};
use service::{EVENT_ID_ATTRIBUTE, TARGET_QUEUE_URL_ATTRIBUTE};
use tracing::Instrument;

/// Handles one message delivered by a dispatcher.
#[async_trait]
pub trait MessageProcessor: Send + Sync {
    async fn process_single(&self, message: &SqsMessage) -> Result<(), WorkflowError>;
}

pub async fn process_multiple(event: SqsEvent, processor: &dyn MessageProcessor) -> SqsBatchResponse {
    tracing::info!("Processing batch of [{}] messages", event.records.len());

    let mut batch_item_failures: Vec<BatchItemFailure> = Vec::new();

    for message in event.records.iter() {
        let message_id: String = message.message_id.clone().unwrap_or_default();
        let span = tracing::info_span!("Message", message_id = %message_id);

        if let Err(err) = processor.process_single(message).instrument(span).await {
            tracing::error!(message_id = %message_id, "Failed to process message: {err}");

            batch_item_failures.push(BatchItemFailure {
                item_identifier: message_id,
            });
        }
    }

    if !batch_item_failures.is_empty() {
        tracing::error!(failures = batch_item_failures.len(), "Some messages failed");
    }

    SqsBatchResponse {
        batch_item_failures,
    }
}

/// The workflow a delivered message was sent for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveredWorkflow {
    pub event_id: String,
    pub target_queue_url: String,
}

impl DeliveredWorkflow {
    /// Read the routing attributes every dispatched message carries.
    pub fn from_message(message: &SqsMessage) -> Result<Self, ModelError> {
        let attribute = |name: &str| -> Result<String, ModelError> {
            message
                .message_attributes
                .get(name)
                .and_then(|attribute| attribute.string_value.clone())
                .ok_or_else(|| ModelError::InvalidRecord(format!("message has no {name} attribute")))
        };

        Ok(DeliveredWorkflow {
            event_id: attribute(EVENT_ID_ATTRIBUTE)?,
            target_queue_url: attribute(TARGET_QUEUE_URL_ATTRIBUTE)?,
        })
    }
}

/// Closes the workflow of every message it receives. A redelivered message
/// finds its workflow already closed, which is not a failure.
pub struct WorkflowCloser {
    workflows: WorkflowTable,
}

impl WorkflowCloser {
    pub fn new(workflows: WorkflowTable) -> Self {
        WorkflowCloser { workflows }
    }

    pub async fn close_at(
        &self,
        message: &SqsMessage,
        finished_at: ZuluDateTime,
    ) -> Result<(), WorkflowError> {
        let delivered: DeliveredWorkflow = DeliveredWorkflow::from_message(message)?;

        match self
            .workflows
            .close(&delivered.event_id, &delivered.target_queue_url, finished_at)
            .await
        {
            Err(err) if err.is_already_finished() => {
                tracing::info!(event_id = %delivered.event_id, "Workflow already closed");

                Ok(())
            }
            result => result,
        }
    }
}

#[async_trait]
impl MessageProcessor for WorkflowCloser {
    async fn process_single(&self, message: &SqsMessage) -> Result<(), WorkflowError> {
        self.close_at(message, ZuluDateTime::now()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{outbound_message, OpenWorkflowsIndex, PollingDispatcher};
    use aws_lambda_events::sqs::SqsMessageAttribute;
    use model::WorkflowRecord;
    use service::{OutboundMessage, ServiceError};
    use state_in_memory::InMemoryRecordStore;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;
    use test_utils::{
        open_workflow, zulu, RecordingNotifier, RecordingSender, TEST_INDEX, TEST_QUEUE, TEST_TABLE,
    };

    fn delivery(message_id: &str, message: &OutboundMessage) -> SqsMessage {
        let message_attributes: HashMap<String, SqsMessageAttribute> = message
            .attributes
            .iter()
            .map(|(name, value)| {
                let attribute = SqsMessageAttribute {
                    string_value: Some(value.clone()),
                    data_type: Some("String".to_string()),
                    ..Default::default()
                };
                (name.clone(), attribute)
            })
            .collect();

        SqsMessage {
            message_id: Some(message_id.to_string()),
            body: Some(message.body.clone()),
            message_attributes,
            ..Default::default()
        }
    }

    fn workflows() -> WorkflowTable {
        WorkflowTable::new(Arc::new(InMemoryRecordStore::new()), TEST_TABLE)
    }

    /// Fails every message whose body mentions `poison`.
    struct PoisonAware;

    #[async_trait]
    impl MessageProcessor for PoisonAware {
        async fn process_single(&self, message: &SqsMessage) -> Result<(), WorkflowError> {
            match message.body.as_deref() {
                Some(body) if body.contains("poison") => Err(WorkflowError::Transport(
                    ServiceError::Transport("downstream refused".into()),
                )),
                _ => Ok(()),
            }
        }
    }

    #[tokio::test]
    async fn only_failed_messages_are_reported() {
        let ok = OutboundMessage::new(TEST_QUEUE, "{}", "group-1", "dedup-1");
        let poison = OutboundMessage::new(TEST_QUEUE, "poison", "group-1", "dedup-2");
        let event = SqsEvent {
            records: vec![
                delivery("msg-1", &ok),
                delivery("msg-2", &poison),
                delivery("msg-3", &ok),
                delivery("msg-4", &poison),
            ],
        };

        let response: SqsBatchResponse = process_multiple(event, &PoisonAware).await;

        assert_eq!(
            vec!["msg-2", "msg-4"],
            response
                .batch_item_failures
                .into_iter()
                .map(|failure| failure.item_identifier)
                .collect::<Vec<String>>()
        );
    }

    #[tokio::test]
    async fn successful_batch_reports_nothing() {
        let ok = OutboundMessage::new(TEST_QUEUE, "{}", "group-1", "dedup-1");

        let response = process_multiple(
            SqsEvent {
                records: vec![delivery("msg-1", &ok)],
            },
            &PoisonAware,
        )
        .await;

        assert!(response.batch_item_failures.is_empty());
    }

    #[test]
    fn delivered_workflow_is_read_from_attributes() {
        let workflow: WorkflowRecord = open_workflow(zulu("2023-10-15T12:45:14Z"), TEST_QUEUE);

        let delivered = DeliveredWorkflow::from_message(&delivery("msg-1", &outbound_message(&workflow)))
            .unwrap();

        assert_eq!(workflow.event_id.as_str(), delivered.event_id);
        assert_eq!(TEST_QUEUE, delivered.target_queue_url);
    }

    #[tokio::test]
    async fn message_without_routing_attributes_fails() {
        let closer = WorkflowCloser::new(workflows());
        let bare = OutboundMessage::new(TEST_QUEUE, "{}", "group-1", "dedup-1");

        let response = process_multiple(
            SqsEvent {
                records: vec![delivery("msg-1", &bare)],
            },
            &closer,
        )
        .await;

        assert_eq!(1, response.batch_item_failures.len());
        assert_eq!("msg-1", response.batch_item_failures[0].item_identifier);
    }

    #[tokio::test]
    async fn redelivered_message_closes_once() {
        let workflows = workflows();
        let workflow: WorkflowRecord = open_workflow(zulu("2023-10-15T12:40:00Z"), TEST_QUEUE);
        workflows.persist(&workflow).await.unwrap();
        let closer = WorkflowCloser::new(workflows.clone());
        let message = delivery("msg-1", &outbound_message(&workflow));

        closer.close_at(&message, zulu("2023-10-15T12:45:00Z")).await.unwrap();
        closer.close_at(&message, zulu("2023-10-15T12:50:00Z")).await.unwrap();

        let closed = workflows
            .reconstitute(workflow.event_id.as_str(), TEST_QUEUE)
            .await
            .unwrap();
        assert_eq!(
            model::WorkflowState::Closed {
                finished_at: zulu("2023-10-15T12:45:00Z")
            },
            closed.state
        );
    }

    #[tokio::test]
    async fn consumed_workflow_is_not_polled_again() {
        let workflows = workflows();
        let sender: Arc<RecordingSender> = Arc::new(RecordingSender::default());
        let dispatcher = PollingDispatcher::new(
            workflows.clone(),
            OpenWorkflowsIndex::new(&workflows, TEST_INDEX),
            sender.clone(),
            Arc::new(RecordingNotifier::default()),
            Duration::from_secs(600),
            100,
        );
        let workflow: WorkflowRecord = open_workflow(zulu("2023-10-15T12:40:00Z"), TEST_QUEUE);
        workflows.persist(&workflow).await.unwrap();

        dispatcher
            .dispatch_at("req-1", zulu("2023-10-15T12:45:14Z"))
            .await
            .unwrap();
        let records: Vec<SqsMessage> = sender
            .sent()
            .iter()
            .enumerate()
            .map(|(position, message)| delivery(&format!("msg-{position}"), message))
            .collect();
        let response = process_multiple(
            SqsEvent { records },
            &WorkflowCloser::new(workflows.clone()),
        )
        .await;
        let after = dispatcher
            .dispatch_at("req-2", zulu("2023-10-15T13:30:00Z"))
            .await
            .unwrap();

        assert!(response.batch_item_failures.is_empty());
        assert_eq!(0, after.fetched);
        assert_eq!(1, sender.sent().len());
    }
}

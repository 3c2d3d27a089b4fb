use async_trait::async_trait;
use aws_sdk_sqs::operation::send_message::SendMessageOutput;
use aws_smithy_mocks::{mock, mock_client, Rule};
use model::env::{
    NOTIFICATION_TOPIC_ARN, OPEN_WORKFLOWS_INDEX_NAME, WORKFLOWS_TABLE_NAME,
    WORKFLOWS_TO_DISPATCH, WORKFLOW_NEXT_START_IN_SECONDS,
};
use model::{WorkflowRecord, ZuluDateTime};
use service::{FailureNotifier, MessageSender, Notification, OutboundMessage, ServiceError};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// Test queue values
pub const TEST_QUEUE: &str = "https://sqs.eu-west-1.amazonaws.com/000000000000/test.fifo";
pub const OTHER_TEST_QUEUE: &str = "https://sqs.eu-west-1.amazonaws.com/000000000000/other.fifo";
pub const TEST_TABLE: &str = "workflows";
pub const TEST_INDEX: &str = "open_workflows";
pub const TEST_ORIGIN_TABLE: &str = "orders";

/// A default mock SQS client which accepts every message
pub fn create_mock_sqs_client() -> aws_sdk_sqs::Client {
    let send_message_rule: Rule = mock!(aws_sdk_sqs::Client::send_message)
        .match_requests(|_| true)
        .sequence()
        .output(|| SendMessageOutput::builder().build())
        .repeatedly()
        .build();

    mock_client!(aws_sdk_sqs, [&send_message_rule])
}

/// Parse a zulu date time literal.
pub fn zulu(value: &str) -> ZuluDateTime {
    ZuluDateTime::parse(value).expect("Test date time should be valid")
}

/// An open workflow for a fresh origin item, due at `start_at`.
pub fn open_workflow(start_at: ZuluDateTime, target_queue_url: &str) -> WorkflowRecord {
    let partition_key: String = uuid::Uuid::new_v4().to_string();

    WorkflowRecord::new_fifo(
        TEST_ORIGIN_TABLE,
        &partition_key,
        None,
        start_at,
        start_at,
        target_queue_url,
        &format!(r#"{{"orderId":"{partition_key}"}}"#),
        &partition_key,
    )
    .expect("Test workflow should target a fifo queue")
}

/// Environment of a correctly configured dispatcher.
pub fn default_env() -> HashMap<&'static str, String> {
    HashMap::from([
        (WORKFLOWS_TABLE_NAME, TEST_TABLE.to_string()),
        (OPEN_WORKFLOWS_INDEX_NAME, TEST_INDEX.to_string()),
        (
            NOTIFICATION_TOPIC_ARN,
            "arn:aws:sns:eu-west-1:000000000000:failures.fifo".to_string(),
        ),
        (WORKFLOW_NEXT_START_IN_SECONDS, "600".to_string()),
        (WORKFLOWS_TO_DISPATCH, "100".to_string()),
    ])
}

/// Sender keeping every accepted message. Sends to a failing queue are refused.
#[derive(Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<OutboundMessage>>,
    attempts: Mutex<usize>,
    failing_queues: HashSet<String>,
}

impl RecordingSender {
    pub fn failing_for(queues: &[&str]) -> Self {
        RecordingSender {
            failing_queues: queues.iter().map(|queue| queue.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().expect("Lock should not be poisoned").clone()
    }

    /// Every send, accepted or refused.
    pub fn attempts(&self) -> usize {
        *self.attempts.lock().expect("Lock should not be poisoned")
    }
}

#[async_trait]
impl MessageSender for RecordingSender {
    async fn send_message(&self, message: OutboundMessage) -> Result<(), ServiceError> {
        *self.attempts.lock().expect("Lock should not be poisoned") += 1;

        if self.failing_queues.contains(&message.queue_url) {
            return Err(ServiceError::Transport(
                format!("queue {} unavailable", message.queue_url).into(),
            ));
        }

        self.sent
            .lock()
            .expect("Lock should not be poisoned")
            .push(message);

        Ok(())
    }
}

/// Notifier keeping every notification, optionally failing after recording it.
#[derive(Default)]
pub struct RecordingNotifier {
    notifications: Mutex<Vec<Notification>>,
    failing: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        RecordingNotifier {
            failing: true,
            ..Default::default()
        }
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications
            .lock()
            .expect("Lock should not be poisoned")
            .clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.notifications()
            .into_iter()
            .map(|notification| notification.message)
            .collect()
    }
}

#[async_trait]
impl FailureNotifier for RecordingNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), ServiceError> {
        self.notifications
            .lock()
            .expect("Lock should not be poisoned")
            .push(notification);

        if self.failing {
            return Err(ServiceError::Transport("topic unavailable".into()));
        }

        Ok(())
    }
}

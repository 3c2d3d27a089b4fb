use async_trait::async_trait;
use service::{FailureNotifier, MessageSender, Notification, OutboundMessage, ServiceError};
use std::collections::HashMap;

const STRING_DATA_TYPE: &str = "String";
const NOTIFICATION_TYPE_ATTRIBUTE: &str = "NotificationType";
const NOTIFICATION_TYPE: &str = "Job";
// Notifications are not ordered against each other
const NOTIFICATION_GROUP_ID: &str = "0";

/// Sends outbound messages to SQS FIFO queues.
#[derive(Clone)]
pub struct SqsSender {
    sqs: aws_sdk_sqs::Client,
}

impl SqsSender {
    pub fn new(sqs: aws_sdk_sqs::Client) -> Self {
        Self { sqs }
    }
}

#[async_trait]
impl MessageSender for SqsSender {
    async fn send_message(&self, message: OutboundMessage) -> Result<(), ServiceError> {
        let attributes: HashMap<String, aws_sdk_sqs::types::MessageAttributeValue> = message
            .attributes
            .into_iter()
            .map(|(name, value)| {
                aws_sdk_sqs::types::MessageAttributeValue::builder()
                    .data_type(STRING_DATA_TYPE)
                    .string_value(value)
                    .build()
                    .map(|attribute| (name, attribute))
            })
            .collect::<Result<HashMap<_, _>, _>>()
            .map_err(|err| ServiceError::Serialization(err.to_string()))?;

        self.sqs
            .send_message()
            .queue_url(message.queue_url)
            .message_body(message.body)
            .message_group_id(message.group_id)
            .message_deduplication_id(message.deduplication_id)
            .set_message_attributes(Some(attributes).filter(|attributes| !attributes.is_empty()))
            .send()
            .await
            .map_err(|err| ServiceError::Transport(err.into()))?;

        Ok(())
    }
}

/// Publishes failure notifications to an SNS FIFO topic.
#[derive(Clone)]
pub struct SnsNotifier {
    sns: aws_sdk_sns::Client,
    topic_arn: String,
}

impl SnsNotifier {
    pub fn new(sns: aws_sdk_sns::Client, topic_arn: impl Into<String>) -> Self {
        Self {
            sns,
            topic_arn: topic_arn.into(),
        }
    }
}

#[async_trait]
impl FailureNotifier for SnsNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), ServiceError> {
        let notification_type = aws_sdk_sns::types::MessageAttributeValue::builder()
            .data_type(STRING_DATA_TYPE)
            .string_value(NOTIFICATION_TYPE)
            .build()
            .map_err(|err| ServiceError::Serialization(err.to_string()))?;

        self.sns
            .publish()
            .topic_arn(&self.topic_arn)
            .message(notification.to_json()?)
            .message_group_id(NOTIFICATION_GROUP_ID)
            .message_deduplication_id(uuid::Uuid::new_v4().to_string())
            .message_attributes(NOTIFICATION_TYPE_ATTRIBUTE, notification_type)
            .send()
            .await
            .map_err(|err| ServiceError::Transport(err.into()))?;

        tracing::debug!(request_id = %notification.request_id, "Published failure notification");

        Ok(())
    }
}

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

mod tracing_notifier;

pub use tracing_notifier::TracingNotifier;

/// Message attribute carrying the workflow event id.
pub const EVENT_ID_ATTRIBUTE: &str = "EventId";
/// Message attribute carrying the queue the message was routed to.
pub const TARGET_QUEUE_URL_ATTRIBUTE: &str = "TargetQueueUrl";

/// A message bound for a FIFO queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub queue_url: String,
    pub body: String,
    pub group_id: String,
    // The queue drops messages with an already seen id inside its dedup window
    pub deduplication_id: String,
    /// String message attributes.
    pub attributes: BTreeMap<String, String>,
}

impl OutboundMessage {
    pub fn new(
        queue_url: impl Into<String>,
        body: impl Into<String>,
        group_id: impl Into<String>,
        deduplication_id: impl Into<String>,
    ) -> Self {
        OutboundMessage {
            queue_url: queue_url.into(),
            body: body.into(),
            group_id: group_id.into(),
            deduplication_id: deduplication_id.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }
}

/// Delivers messages to an external queue.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send_message(&self, message: OutboundMessage) -> Result<(), ServiceError>;
}

/// Operator facing report of a dispatch failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub request_id: String,
    pub message: String,
}

impl Notification {
    pub fn new(request_id: impl Into<String>, message: impl Into<String>) -> Self {
        Notification {
            request_id: request_id.into(),
            message: message.into(),
        }
    }

    pub fn to_json(&self) -> Result<String, ServiceError> {
        serde_json::to_string(self).map_err(|err| ServiceError::Serialization(err.to_string()))
    }
}

/// Out of band channel for failures nobody is waiting on.
#[async_trait]
pub trait FailureNotifier: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<(), ServiceError>;
}

/// Errors arising from calling external services.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    // The service could not be reached or rejected the call
    #[error("transport failure: {0}")]
    Transport(model::Error),
    // The payload couldn't be built
    #[error("serialization failure: {0}")]
    Serialization(String),
}

//! Wiring shared by the dispatcher entry points.

use aws_config::SdkConfig;
use service::{FailureNotifier, TracingNotifier};
use service_aws::{SnsNotifier, SqsSender};
use state::RecordStore;
use state_dynamodb::DynamoDbRecordStore;
use std::sync::Arc;
use workflow::{DispatchConfig, WorkflowTable};

pub fn workflow_table(aws_config: &SdkConfig, config: &DispatchConfig) -> WorkflowTable {
    let store: Arc<dyn RecordStore> = Arc::new(DynamoDbRecordStore::new(
        aws_sdk_dynamodb::Client::new(aws_config),
    ));

    WorkflowTable::new(store, config.workflows_table_name.as_str())
}

pub fn sqs_sender(aws_config: &SdkConfig) -> Arc<SqsSender> {
    Arc::new(SqsSender::new(aws_sdk_sqs::Client::new(aws_config)))
}

/// Publish to the configured topic, or only log when there is none.
pub fn failure_notifier(aws_config: &SdkConfig, config: &DispatchConfig) -> Arc<dyn FailureNotifier> {
    match config.notification_topic_arn.as_deref() {
        Some(topic_arn) => Arc::new(SnsNotifier::new(
            aws_sdk_sns::Client::new(aws_config),
            topic_arn,
        )),
        None => {
            tracing::warn!("No notification topic configured, failures are only logged");

            Arc::new(TracingNotifier)
        }
    }
}

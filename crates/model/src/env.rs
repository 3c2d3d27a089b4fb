/// Name of the table holding workflow records
pub const WORKFLOWS_TABLE_NAME: &str = "WORKFLOWS_TABLE_NAME";
/// Name of the secondary index keyed by `is_open` and `start_at`
pub const OPEN_WORKFLOWS_INDEX_NAME: &str = "OPEN_WORKFLOWS_INDEX_NAME";
/// FIFO topic receiving operator notifications. Notifications are only logged when unset.
pub const NOTIFICATION_TOPIC_ARN: &str = "NOTIFICATION_TOPIC_ARN";
/// Seconds between two dispatch attempts of the same workflow
pub const WORKFLOW_NEXT_START_IN_SECONDS: &str = "WORKFLOW_NEXT_START_IN_SECONDS";
/// Amount of due workflows the polling dispatcher handles per invocation
pub const WORKFLOWS_TO_DISPATCH: &str = "WORKFLOWS_TO_DISPATCH";

use crate::key::{KeyAttribute, KeyDefinition, KeySchema, KeyType, PrimaryKey, Record};
use crate::zulu::ZuluDateTime;
use crate::ModelError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::{Display, Formatter};

pub const EVENT_ID: &str = "event_id";
pub const TARGET_QUEUE_URL: &str = "target_queue_url";
pub const CREATED_AT: &str = "created_at";
pub const START_AT: &str = "start_at";
pub const AMOUNT_OF_STARTS: &str = "amount_of_starts";
pub const IS_OPEN: &str = "is_open";
pub const FINISHED_AT: &str = "finished_at";
pub const EVENT: &str = "event";
pub const EVENT_MESSAGE_GROUP_ID: &str = "event_message_group_id";

/// Stored value of the `is_open` marker.
pub const OPEN: &str = "OPEN";
pub const FIFO_QUEUE_SUFFIX: &str = ".fifo";

/// Identity of the source item a workflow was created for:
/// `origin_table#partition_key[#sort_key]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    pub fn new(origin_table: &str, partition_key: &str, sort_key: Option<&str>) -> Self {
        match sort_key {
            Some(sort_key) => EventId(format!("{origin_table}#{partition_key}#{sort_key}")),
            None => EventId(format!("{origin_table}#{partition_key}")),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for EventId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for EventId {
    fn from(value: String) -> Self {
        EventId(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowState {
    /// Eligible for dispatch once `start_at` has passed.
    Open,
    /// Terminal.
    Closed { finished_at: ZuluDateTime },
}

impl WorkflowState {
    pub fn is_open(&self) -> bool {
        matches!(self, WorkflowState::Open)
    }
}

/// One scheduled, retryable unit of outbound dispatch work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WorkflowRow", into = "WorkflowRow")]
pub struct WorkflowRecord {
    pub event_id: EventId,
    pub target_queue_url: String,
    pub created_at: ZuluDateTime,
    pub start_at: ZuluDateTime,
    pub amount_of_starts: u64,
    pub state: WorkflowState,
    pub event: String,
    pub event_message_group_id: String,
}

impl WorkflowRecord {
    /// Create an open workflow delegating `event` to a FIFO queue.
    #[allow(clippy::too_many_arguments)]
    pub fn new_fifo(
        origin_table: &str,
        partition_key: &str,
        sort_key: Option<&str>,
        created_at: ZuluDateTime,
        start_at: ZuluDateTime,
        target_queue_url: &str,
        event: &str,
        event_group_id: &str,
    ) -> Result<Self, ModelError> {
        if !target_queue_url.ends_with(FIFO_QUEUE_SUFFIX) {
            return Err(ModelError::FifoQueueMismatch(target_queue_url.to_string()));
        }

        Ok(WorkflowRecord {
            event_id: EventId::new(origin_table, partition_key, sort_key),
            target_queue_url: target_queue_url.to_string(),
            created_at,
            start_at,
            amount_of_starts: 0,
            state: WorkflowState::Open,
            event: event.to_string(),
            event_message_group_id: event_group_id.to_string(),
        })
    }

    /// Primary key of the workflow delegating `event_id` to `target_queue_url`.
    pub fn key(event_id: &str, target_queue_url: &str) -> PrimaryKey {
        PrimaryKey::new(
            KeyAttribute::string(EVENT_ID, event_id),
            Some(KeyAttribute::string(TARGET_QUEUE_URL, target_queue_url)),
        )
    }

    /// Hex encoded SHA-256 of the event id. Stable across reschedules and payload changes.
    pub fn deduplication_id(&self) -> String {
        format!("{:x}", Sha256::digest(self.event_id.as_str().as_bytes()))
    }

    pub fn is_open(&self) -> bool {
        self.state.is_open()
    }
}

impl Record for WorkflowRecord {
    fn key_schema() -> KeySchema {
        KeySchema {
            partition_key: KeyDefinition::new(EVENT_ID, KeyType::S),
            sort_key: Some(KeyDefinition::new(TARGET_QUEUE_URL, KeyType::S)),
        }
    }

    fn primary_key(&self) -> PrimaryKey {
        WorkflowRecord::key(self.event_id.as_str(), &self.target_queue_url)
    }
}

/// Storage shape of a workflow: the state is spread over the sparse
/// `is_open` and `finished_at` attributes.
#[derive(Serialize, Deserialize)]
struct WorkflowRow {
    event_id: EventId,
    target_queue_url: String,
    created_at: ZuluDateTime,
    start_at: ZuluDateTime,
    amount_of_starts: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    is_open: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    finished_at: Option<ZuluDateTime>,
    event: String,
    event_message_group_id: String,
}

impl TryFrom<WorkflowRow> for WorkflowRecord {
    type Error = ModelError;

    fn try_from(row: WorkflowRow) -> Result<Self, Self::Error> {
        let state: WorkflowState = match (row.is_open, row.finished_at) {
            (Some(marker), None) if marker == OPEN => WorkflowState::Open,
            (Some(marker), None) => {
                return Err(ModelError::InvalidRecord(format!(
                    "unexpected {IS_OPEN} marker {marker}"
                )))
            }
            (None, Some(finished_at)) => WorkflowState::Closed { finished_at },
            (Some(_), Some(_)) => {
                return Err(ModelError::InvalidRecord(format!(
                    "both {IS_OPEN} and {FINISHED_AT} are set"
                )))
            }
            (None, None) => {
                return Err(ModelError::InvalidRecord(format!(
                    "neither {IS_OPEN} nor {FINISHED_AT} is set"
                )))
            }
        };

        Ok(WorkflowRecord {
            event_id: row.event_id,
            target_queue_url: row.target_queue_url,
            created_at: row.created_at,
            start_at: row.start_at,
            amount_of_starts: row.amount_of_starts,
            state,
            event: row.event,
            event_message_group_id: row.event_message_group_id,
        })
    }
}

impl From<WorkflowRecord> for WorkflowRow {
    fn from(record: WorkflowRecord) -> Self {
        let (is_open, finished_at) = match record.state {
            WorkflowState::Open => (Some(OPEN.to_string()), None),
            WorkflowState::Closed { finished_at } => (None, Some(finished_at)),
        };

        WorkflowRow {
            event_id: record.event_id,
            target_queue_url: record.target_queue_url,
            created_at: record.created_at,
            start_at: record.start_at,
            amount_of_starts: record.amount_of_starts,
            is_open,
            finished_at,
            event: record.event,
            event_message_group_id: record.event_message_group_id,
        }
    }
}

//! Domain types shared by every crate of the outbox: record keys, the
//! `Record` capability, zulu timestamps and the workflow record itself.

pub mod env;
pub mod key;
pub mod workflow;
pub mod zulu;

pub use key::{KeyAttribute, KeyDefinition, KeySchema, KeyType, KeyValue, PrimaryKey, Record};
pub use workflow::{EventId, WorkflowRecord, WorkflowState};
pub use zulu::ZuluDateTime;

use thiserror::Error;

pub type Error = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised while building or reading domain values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// A FIFO workflow may only target a FIFO queue.
    #[error("fifo workflow should not delegate to a simple queue {0}")]
    FifoQueueMismatch(String),
    #[error("invalid workflow record: {0}")]
    InvalidRecord(String),
    #[error("invalid zulu date time {value}: {reason}")]
    InvalidDateTime { value: String, reason: String },
}

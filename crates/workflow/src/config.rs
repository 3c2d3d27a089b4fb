use model::env::{
    NOTIFICATION_TOPIC_ARN, OPEN_WORKFLOWS_INDEX_NAME, WORKFLOWS_TABLE_NAME,
    WORKFLOWS_TO_DISPATCH, WORKFLOW_NEXT_START_IN_SECONDS,
};
use std::time::Duration;

const DEFAULT_NEXT_START_IN_SECONDS: u64 = 600;
const DEFAULT_WORKFLOWS_TO_DISPATCH: usize = 100;
/// One year. Keeps rescheduled start times within four digit years, which
/// the open-workflows index needs to sort them.
const MAX_NEXT_START_IN_SECONDS: u64 = 365 * 24 * 3600;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    Missing(&'static str),
    #[error("invalid environment variable {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Settings of both dispatchers, read once at start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchConfig {
    pub workflows_table_name: String,
    /// Only the polling dispatcher scans the index.
    pub open_workflows_index_name: Option<String>,
    /// Notifications are only logged when unset.
    pub notification_topic_arn: Option<String>,
    /// Backoff between two dispatches of the same workflow.
    pub next_start_in: Duration,
    pub workflows_to_dispatch: usize,
}

impl DispatchConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read the settings through `lookup`. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let read = |name: &'static str| -> Option<String> {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let workflows_table_name: String =
            read(WORKFLOWS_TABLE_NAME).ok_or(ConfigError::Missing(WORKFLOWS_TABLE_NAME))?;

        let next_start_in_seconds: u64 = match read(WORKFLOW_NEXT_START_IN_SECONDS) {
            Some(value) => positive(WORKFLOW_NEXT_START_IN_SECONDS, &value)?,
            None => DEFAULT_NEXT_START_IN_SECONDS,
        };
        if next_start_in_seconds > MAX_NEXT_START_IN_SECONDS {
            return Err(ConfigError::Invalid {
                name: WORKFLOW_NEXT_START_IN_SECONDS,
                reason: format!(
                    "{next_start_in_seconds} exceeds {MAX_NEXT_START_IN_SECONDS} seconds"
                ),
            });
        }

        let workflows_to_dispatch: usize = match read(WORKFLOWS_TO_DISPATCH) {
            Some(value) => positive(WORKFLOWS_TO_DISPATCH, &value)?,
            None => DEFAULT_WORKFLOWS_TO_DISPATCH,
        };

        Ok(DispatchConfig {
            workflows_table_name,
            open_workflows_index_name: read(OPEN_WORKFLOWS_INDEX_NAME),
            notification_topic_arn: read(NOTIFICATION_TOPIC_ARN),
            next_start_in: Duration::from_secs(next_start_in_seconds),
            workflows_to_dispatch,
        })
    }

    pub fn require_index_name(&self) -> Result<&str, ConfigError> {
        self.open_workflows_index_name
            .as_deref()
            .ok_or(ConfigError::Missing(OPEN_WORKFLOWS_INDEX_NAME))
    }
}

fn positive<N>(name: &'static str, value: &str) -> Result<N, ConfigError>
where
    N: std::str::FromStr + PartialOrd + Default,
    N::Err: std::fmt::Display,
{
    let number: N = value.parse().map_err(|err: N::Err| ConfigError::Invalid {
        name,
        reason: format!("{value}: {err}"),
    })?;

    if number <= N::default() {
        return Err(ConfigError::Invalid {
            name,
            reason: format!("{value} is not positive"),
        });
    }

    Ok(number)
}

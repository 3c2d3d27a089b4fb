use aws_lambda_events::dynamodb::EventRecord;
use model::{ModelError, WorkflowRecord};
use state::Item;

/// Change feed event name of a newly created item.
pub const INSERT: &str = "INSERT";

/// One entry of the workflows table change feed.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRecord {
    /// Identity of the feed entry, not of the workflow.
    pub event_id: String,
    pub event_name: String,
    pub new_image: Item,
}

impl ChangeRecord {
    pub fn is_insert(&self) -> bool {
        self.event_name == INSERT
    }

    /// The workflow as it was written.
    pub fn workflow(&self) -> Result<WorkflowRecord, ModelError> {
        serde_dynamo::from_item(self.new_image.clone())
            .map_err(|err| ModelError::InvalidRecord(err.to_string()))
    }
}

impl From<EventRecord> for ChangeRecord {
    fn from(record: EventRecord) -> Self {
        ChangeRecord {
            event_id: record.event_id,
            event_name: record.event_name,
            new_image: record.change.new_image.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::workflow::{AMOUNT_OF_STARTS, EVENT, IS_OPEN};
    use model::WorkflowState;
    use serde_dynamo::AttributeValue;
    use test_utils::{open_workflow, zulu, TEST_QUEUE};

    fn insert_of(workflow: &WorkflowRecord) -> ChangeRecord {
        ChangeRecord {
            event_id: "feed-1".to_string(),
            event_name: INSERT.to_string(),
            new_image: serde_dynamo::to_item(workflow).unwrap(),
        }
    }

    #[test]
    fn parses_flat_workflow_image() {
        let workflow = open_workflow(zulu("2023-10-15T12:45:14Z"), TEST_QUEUE);
        let change = insert_of(&workflow);

        assert!(change.is_insert());
        assert_eq!(
            Some(&AttributeValue::N("0".to_string())),
            change.new_image.get(AMOUNT_OF_STARTS)
        );
        assert_eq!(workflow, change.workflow().unwrap());
        assert_eq!(WorkflowState::Open, change.workflow().unwrap().state);
    }

    #[test]
    fn incomplete_image_is_invalid_record() {
        let workflow = open_workflow(zulu("2023-10-15T12:45:14Z"), TEST_QUEUE);
        let mut missing_event = insert_of(&workflow);
        missing_event.new_image.remove(EVENT);
        let mut unmarked = insert_of(&workflow);
        unmarked.new_image.remove(IS_OPEN);

        for change in [missing_event, unmarked] {
            assert!(matches!(change.workflow(), Err(ModelError::InvalidRecord(_))));
        }
    }

    #[test]
    fn converts_lambda_stream_records() {
        let workflow = open_workflow(zulu("2023-10-15T12:45:14Z"), TEST_QUEUE);
        let mut record: EventRecord = EventRecord::default();
        record.event_id = "feed-1".to_string();
        record.event_name = "MODIFY".to_string();
        record.change.new_image = serde_dynamo::to_item(&workflow).unwrap();

        let change: ChangeRecord = record.into();

        assert_eq!("feed-1", change.event_id);
        assert!(!change.is_insert());
        assert_eq!(workflow, change.workflow().unwrap());
    }
}

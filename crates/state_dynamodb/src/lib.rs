use crate::convert::{from_dynamo_item, to_dynamo_item};
use crate::expression::Expression;
use async_trait::async_trait;
use aws_sdk_dynamodb::error::{BuildError, SdkError};
use aws_sdk_dynamodb::operation::get_item::GetItemOutput;
use aws_sdk_dynamodb::operation::query::QueryOutput;
use aws_sdk_dynamodb::operation::transact_write_items::TransactWriteItemsError;
use aws_sdk_dynamodb::types::{self as ddb, TransactWriteItem};
use model::PrimaryKey;
use state::StateErrorReason::{BackendFailure, BadState, ConditionalCheckFailed};
use state::StateOperation::{Get, Put as PutOperation, Query, TransactWrite, Update as UpdateOperation};
use state::{
    check_distinct_rows, describe_key, Item, Put, QueryInput, QueryPage, RecordStore, StartKey, StateError,
    TransactItem, Update,
};

mod convert;
mod expression;

/// Record store backed by DynamoDB tables.
pub struct DynamoDbRecordStore {
    dynamodb_client: aws_sdk_dynamodb::Client,
    // Base table reads are strongly consistent unless disabled
    consistent_read: bool,
}

impl DynamoDbRecordStore {
    pub fn new(dynamodb_client: aws_sdk_dynamodb::Client) -> Self {
        DynamoDbRecordStore {
            dynamodb_client,
            consistent_read: true,
        }
    }

    pub fn with_consistent_read(mut self, consistent_read: bool) -> Self {
        self.consistent_read = consistent_read;
        self
    }
}

#[async_trait]
impl RecordStore for DynamoDbRecordStore {
    async fn get_item(&self, table: &str, key: &PrimaryKey) -> Result<Option<Item>, StateError> {
        let output: GetItemOutput = self
            .dynamodb_client
            .get_item()
            .table_name(table)
            .consistent_read(self.consistent_read)
            .set_key(Some(to_dynamo_item(key.to_item())))
            .send()
            .await
            .map_err(|err| StateError::new(describe_key(key), Get, BackendFailure(err.into())))?;

        output
            .item
            .map(from_dynamo_item)
            .transpose()
            .map_err(|reason| StateError::new(describe_key(key), Get, BadState(reason)))
    }

    async fn put_item(&self, put: Put) -> Result<(), StateError> {
        let state_key: String = describe_key(&put.key);
        let mut expression: Expression = Expression::default();
        let condition: Option<String> = put
            .condition
            .as_ref()
            .and_then(|condition| expression.condition(condition));

        self.dynamodb_client
            .put_item()
            .table_name(put.table)
            .set_item(Some(to_dynamo_item(put.item)))
            .set_condition_expression(condition)
            .set_expression_attribute_names(expression.names())
            .set_expression_attribute_values(expression.values())
            .send()
            .await
            .map_err(|err| {
                let conditional: bool = err
                    .as_service_error()
                    .is_some_and(|err| err.is_conditional_check_failed_exception());
                failure(state_key, PutOperation, conditional, err)
            })?;

        Ok(())
    }

    async fn update_item(&self, update: Update) -> Result<(), StateError> {
        let state_key: String = describe_key(&update.key);
        let mut expression: Expression = Expression::default();
        let update_expression: String = expression.update(&update);
        let condition: Option<String> = update
            .condition
            .as_ref()
            .and_then(|condition| expression.condition(condition));

        tracing::debug!(state_key = %state_key, update_expression = %update_expression, "Updating item");

        self.dynamodb_client
            .update_item()
            .table_name(update.table)
            .set_key(Some(to_dynamo_item(update.key.to_item())))
            .update_expression(update_expression)
            .set_condition_expression(condition)
            .set_expression_attribute_names(expression.names())
            .set_expression_attribute_values(expression.values())
            .send()
            .await
            .map_err(|err| {
                let conditional: bool = err
                    .as_service_error()
                    .is_some_and(|err| err.is_conditional_check_failed_exception());
                failure(state_key, UpdateOperation, conditional, err)
            })?;

        Ok(())
    }

    async fn query(&self, query: QueryInput) -> Result<QueryPage, StateError> {
        let scan_schema = *query.scan_schema();
        let mut expression: Expression = Expression::default();

        let mut key_condition: String = format!(
            "{} = {}",
            expression.name(scan_schema.partition_key.name),
            expression.value(serde_dynamo::AttributeValue::from(query.partition_value.clone()))
        );
        if let (Some(sort_key), Some(bound)) = (scan_schema.sort_key, query.sort_upper_bound.clone()) {
            key_condition.push_str(&format!(
                " AND {} <= {}",
                expression.name(sort_key.name),
                expression.value(serde_dynamo::AttributeValue::from(bound))
            ));
        }

        let output: QueryOutput = self
            .dynamodb_client
            .query()
            .table_name(&query.table)
            .set_index_name(query.index.as_ref().map(|index| index.name.clone()))
            // Global secondary indexes only offer eventually consistent reads
            .consistent_read(self.consistent_read && query.index.is_none())
            .key_condition_expression(key_condition)
            .set_expression_attribute_names(expression.names())
            .set_expression_attribute_values(expression.values())
            .scan_index_forward(query.ascending)
            .limit(i32::try_from(query.limit).unwrap_or(i32::MAX))
            .set_exclusive_start_key(
                query
                    .start_key
                    .as_ref()
                    .map(|start_key| to_dynamo_item(start_key.to_item())),
            )
            .send()
            .await
            .map_err(|err| StateError::new(query.table.clone(), Query, BackendFailure(err.into())))?;

        let last_key: Option<StartKey> = output
            .last_evaluated_key
            .map(|key| {
                from_dynamo_item(key)
                    .and_then(|key| StartKey::try_from_item(&key).map_err(|err| err.to_string()))
            })
            .transpose()
            .map_err(|reason| StateError::new(query.table.clone(), Query, BadState(reason)))?;

        let items: Vec<Item> = output
            .items
            .unwrap_or_default()
            .into_iter()
            .map(from_dynamo_item)
            .collect::<Result<Vec<Item>, String>>()
            .map_err(|reason| StateError::new(query.table.clone(), Query, BadState(reason)))?;

        Ok(QueryPage { items, last_key })
    }

    async fn transact_write(&self, items: Vec<TransactItem>) -> Result<(), StateError> {
        check_distinct_rows(&items)?;

        let state_key: String = items
            .iter()
            .map(|item| describe_key(item.key()))
            .collect::<Vec<String>>()
            .join(", ");

        let transact_items: Vec<TransactWriteItem> = items
            .into_iter()
            .map(to_transact_write_item)
            .collect::<Result<Vec<TransactWriteItem>, BuildError>>()
            .map_err(|err| StateError::new(state_key.clone(), TransactWrite, BadState(err.to_string())))?;

        self.dynamodb_client
            .transact_write_items()
            .set_transact_items(Some(transact_items))
            .send()
            .await
            .map_err(|err| {
                let conditional: bool = match err.as_service_error() {
                    Some(TransactWriteItemsError::TransactionCanceledException(cancelled)) => {
                        cancelled
                            .cancellation_reasons()
                            .iter()
                            .any(|reason| reason.code() == Some("ConditionalCheckFailed"))
                    }
                    _ => false,
                };
                failure(state_key, TransactWrite, conditional, err)
            })?;

        Ok(())
    }
}

fn to_transact_write_item(item: TransactItem) -> Result<TransactWriteItem, BuildError> {
    let mut expression: Expression = Expression::default();

    let transact_item: TransactWriteItem = match item {
        TransactItem::Put(put) => {
            let condition: Option<String> = put
                .condition
                .as_ref()
                .and_then(|condition| expression.condition(condition));

            TransactWriteItem::builder()
                .put(
                    ddb::Put::builder()
                        .table_name(put.table)
                        .set_item(Some(to_dynamo_item(put.item)))
                        .set_condition_expression(condition)
                        .set_expression_attribute_names(expression.names())
                        .set_expression_attribute_values(expression.values())
                        .build()?,
                )
                .build()
        }
        TransactItem::Update(update) => {
            let update_expression: String = expression.update(&update);
            let condition: Option<String> = update
                .condition
                .as_ref()
                .and_then(|condition| expression.condition(condition));

            TransactWriteItem::builder()
                .update(
                    ddb::Update::builder()
                        .table_name(update.table)
                        .set_key(Some(to_dynamo_item(update.key.to_item())))
                        .update_expression(update_expression)
                        .set_condition_expression(condition)
                        .set_expression_attribute_names(expression.names())
                        .set_expression_attribute_values(expression.values())
                        .build()?,
                )
                .build()
        }
    };

    Ok(transact_item)
}

fn failure<E, R>(
    state_key: String,
    operation: state::StateOperation,
    conditional: bool,
    err: SdkError<E, R>,
) -> StateError
where
    E: std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    if conditional {
        tracing::debug!(state_key = %state_key, "Conditional check failed");

        StateError::new(state_key, operation, ConditionalCheckFailed)
    } else {
        StateError::new(state_key, operation, BackendFailure(err.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_dynamodb::operation::put_item::{PutItemError, PutItemOutput};
    use aws_sdk_dynamodb::operation::transact_write_items::TransactWriteItemsOutput;
    use aws_sdk_dynamodb::operation::update_item::{UpdateItemError, UpdateItemOutput};
    use aws_sdk_dynamodb::types::error::{
        ConditionalCheckFailedException, InternalServerError, TransactionCanceledException,
    };
    use aws_sdk_dynamodb::types::{AttributeValue, CancellationReason};
    use aws_smithy_mocks::{mock, mock_client};
    use model::{KeyAttribute, KeyDefinition, KeySchema, KeyType, KeyValue};
    use state::{Condition, IndexQuery};
    use std::collections::HashMap;

    const TABLE: &str = "workflows";

    fn key() -> PrimaryKey {
        PrimaryKey::new(
            KeyAttribute::string("event_id", "orders#1"),
            Some(KeyAttribute::string("target_queue_url", "https://queue/a.fifo")),
        )
    }

    fn table_schema() -> KeySchema {
        KeySchema {
            partition_key: KeyDefinition::new("event_id", KeyType::S),
            sort_key: Some(KeyDefinition::new("target_queue_url", KeyType::S)),
        }
    }

    fn postpone() -> Update {
        Update::new(TABLE, key())
            .set("start_at", serde_dynamo::AttributeValue::S("2023-10-15T12:55:14Z".to_string()))
            .increment("amount_of_starts", 1)
            .condition(Condition::attribute_exists("is_open"))
    }

    #[tokio::test]
    async fn get_item_reads_consistently_by_key() {
        let get_rule = mock!(aws_sdk_dynamodb::Client::get_item)
            .match_requests(|req| {
                req.consistent_read() == Some(true)
                    && req.key().and_then(|key| key.get("event_id"))
                        == Some(&AttributeValue::S("orders#1".to_string()))
            })
            .then_output(|| {
                GetItemOutput::builder()
                    .item("event_id", AttributeValue::S("orders#1".to_string()))
                    .item("amount_of_starts", AttributeValue::N("2".to_string()))
                    .build()
            });
        let store = DynamoDbRecordStore::new(mock_client!(aws_sdk_dynamodb, [&get_rule]));

        let item: Item = store.get_item(TABLE, &key()).await.unwrap().unwrap();

        assert_eq!(
            Some(&serde_dynamo::AttributeValue::N("2".to_string())),
            item.get("amount_of_starts")
        );
    }

    #[tokio::test]
    async fn update_sends_expressions() {
        let update_rule = mock!(aws_sdk_dynamodb::Client::update_item)
            .match_requests(|req| {
                req.update_expression() == Some("SET #n0 = :v0 ADD #n1 :v1")
                    && req.condition_expression() == Some("attribute_exists(#n2)")
                    && req
                        .expression_attribute_names()
                        .and_then(|names| names.get("#n2"))
                        .map(String::as_str)
                        == Some("is_open")
            })
            .then_output(|| UpdateItemOutput::builder().build());
        let store = DynamoDbRecordStore::new(mock_client!(aws_sdk_dynamodb, [&update_rule]));

        store.update_item(postpone()).await.unwrap();

        assert_eq!(1, update_rule.num_calls());
    }

    #[tokio::test]
    async fn conditional_update_failure_is_mapped() {
        let update_rule = mock!(aws_sdk_dynamodb::Client::update_item).then_error(|| {
            UpdateItemError::ConditionalCheckFailedException(
                ConditionalCheckFailedException::builder().build(),
            )
        });
        let store = DynamoDbRecordStore::new(mock_client!(aws_sdk_dynamodb, [&update_rule]));

        let err: StateError = store.update_item(postpone()).await.unwrap_err();

        assert!(err.is_conditional_check_failed());
        assert_eq!("orders#1|https://queue/a.fifo", err.state_key);
    }

    #[tokio::test]
    async fn other_put_failures_are_backend_failures() {
        let put_rule = mock!(aws_sdk_dynamodb::Client::put_item).then_error(|| {
            PutItemError::InternalServerError(InternalServerError::builder().build())
        });
        let store = DynamoDbRecordStore::new(mock_client!(aws_sdk_dynamodb, [&put_rule]));

        let err: StateError = store
            .put_item(Put {
                table: TABLE.to_string(),
                key: key(),
                item: key().to_item(),
                condition: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(err.reason, BackendFailure(_)));
    }

    #[tokio::test]
    async fn unconditional_put_sends_no_expressions() {
        let put_rule = mock!(aws_sdk_dynamodb::Client::put_item)
            .match_requests(|req| {
                req.condition_expression().is_none() && req.expression_attribute_values().is_none()
            })
            .then_output(|| PutItemOutput::builder().build());
        let store = DynamoDbRecordStore::new(mock_client!(aws_sdk_dynamodb, [&put_rule]));

        store
            .put_item(Put {
                table: TABLE.to_string(),
                key: key(),
                item: key().to_item(),
                condition: None,
            })
            .await
            .unwrap();

        assert_eq!(1, put_rule.num_calls());
    }

    #[tokio::test]
    async fn cancelled_transaction_with_conditional_reason_is_mapped() {
        let transact_rule = mock!(aws_sdk_dynamodb::Client::transact_write_items).then_error(|| {
            TransactWriteItemsError::TransactionCanceledException(
                TransactionCanceledException::builder()
                    .cancellation_reasons(CancellationReason::builder().code("None").build())
                    .cancellation_reasons(
                        CancellationReason::builder()
                            .code("ConditionalCheckFailed")
                            .build(),
                    )
                    .build(),
            )
        });
        let store = DynamoDbRecordStore::new(mock_client!(aws_sdk_dynamodb, [&transact_rule]));

        let err: StateError = store
            .transact_write(vec![
                TransactItem::Update(postpone()),
                TransactItem::Put(Put {
                    table: TABLE.to_string(),
                    key: key(),
                    item: key().to_item(),
                    condition: Some(Condition::row_absent(&key())),
                }),
            ])
            .await
            .unwrap_err();

        assert!(err.is_conditional_check_failed());
    }

    #[tokio::test]
    async fn transaction_sends_every_item() {
        let transact_rule = mock!(aws_sdk_dynamodb::Client::transact_write_items)
            .match_requests(|req| {
                let items = req.transact_items();
                items.len() == 2
                    && items[0].update().is_some()
                    && items[1]
                        .put()
                        .and_then(|put| put.condition_expression())
                        == Some("(attribute_not_exists(#n0)) AND (attribute_not_exists(#n1))")
            })
            .then_output(|| TransactWriteItemsOutput::builder().build());
        let store = DynamoDbRecordStore::new(mock_client!(aws_sdk_dynamodb, [&transact_rule]));

        store
            .transact_write(vec![
                TransactItem::Update(postpone()),
                TransactItem::Put(Put {
                    table: TABLE.to_string(),
                    key: key(),
                    item: key().to_item(),
                    condition: Some(Condition::row_absent(&key())),
                }),
            ])
            .await
            .unwrap();

        assert_eq!(1, transact_rule.num_calls());
    }

    #[tokio::test]
    async fn colliding_inserts_are_rejected_before_sending() {
        let transact_rule = mock!(aws_sdk_dynamodb::Client::transact_write_items)
            .then_output(|| TransactWriteItemsOutput::builder().build());
        let store = DynamoDbRecordStore::new(mock_client!(aws_sdk_dynamodb, [&transact_rule]));
        let insert = || {
            TransactItem::Put(Put {
                table: TABLE.to_string(),
                key: key(),
                item: key().to_item(),
                condition: Some(Condition::row_absent(&key())),
            })
        };

        let err: StateError = store
            .transact_write(vec![insert(), insert()])
            .await
            .unwrap_err();

        assert!(err.is_conditional_check_failed());
        assert_eq!(0, transact_rule.num_calls());
    }

    #[tokio::test]
    async fn index_query_pages_through_last_evaluated_key() {
        let index_schema = KeySchema {
            partition_key: KeyDefinition::new("is_open", KeyType::S),
            sort_key: Some(KeyDefinition::new("start_at", KeyType::S)),
        };
        let query_rule = mock!(aws_sdk_dynamodb::Client::query)
            .match_requests(|req| {
                req.index_name() == Some("open_workflows")
                    && req.key_condition_expression() == Some("#n0 = :v0 AND #n1 <= :v1")
                    && req.scan_index_forward() == Some(true)
                    && req.limit() == Some(2)
                    && req.consistent_read() == Some(false)
            })
            .then_output(|| {
                QueryOutput::builder()
                    .items(HashMap::from([(
                        "event_id".to_string(),
                        AttributeValue::S("orders#1".to_string()),
                    )]))
                    .last_evaluated_key("event_id", AttributeValue::S("orders#1".to_string()))
                    .last_evaluated_key(
                        "target_queue_url",
                        AttributeValue::S("https://queue/a.fifo".to_string()),
                    )
                    .last_evaluated_key("is_open", AttributeValue::S("OPEN".to_string()))
                    .last_evaluated_key(
                        "start_at",
                        AttributeValue::S("2023-10-15T12:45:14Z".to_string()),
                    )
                    .build()
            });
        let store = DynamoDbRecordStore::new(mock_client!(aws_sdk_dynamodb, [&query_rule]));

        let page: QueryPage = store
            .query(QueryInput {
                table: TABLE.to_string(),
                key_schema: table_schema(),
                index: Some(IndexQuery {
                    name: "open_workflows".to_string(),
                    key_schema: index_schema,
                }),
                partition_value: KeyValue::S("OPEN".to_string()),
                sort_upper_bound: Some(KeyValue::S("2023-10-15T13:00:00Z".to_string())),
                ascending: true,
                limit: 2,
                start_key: None,
            })
            .await
            .unwrap();

        let last_key: StartKey = page.last_key.unwrap();
        assert_eq!(1, page.items.len());
        assert!(last_key.check(&[&table_schema(), &index_schema]).is_ok());
    }
}

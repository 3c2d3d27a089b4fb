use aws_config::BehaviorVersion;
use aws_lambda_events::dynamodb::Event;
use lambda_runtime::{service_fn, Error, LambdaEvent};
use outboxer::{failure_notifier, sqs_sender, workflow_table};
use workflow::{ChangeRecord, DirectDispatchReport, DirectDispatcher, DispatchConfig};

async fn handle(dispatcher: &DirectDispatcher, event: LambdaEvent<Event>) -> Result<(), Error> {
    let records: Vec<ChangeRecord> = event
        .payload
        .records
        .into_iter()
        .map(ChangeRecord::from)
        .collect();

    // Failures are notified per record, the batch itself never fails
    let report: DirectDispatchReport = dispatcher.dispatch(records).await;

    tracing::info!(request_id = %event.context.request_id, ?report, "Direct dispatch finished");

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    lambda_runtime::tracing::init_default_subscriber();

    let config: DispatchConfig = DispatchConfig::from_env()?;
    let aws_config = aws_config::load_defaults(BehaviorVersion::latest()).await;

    let dispatcher: DirectDispatcher = DirectDispatcher::new(
        workflow_table(&aws_config, &config),
        sqs_sender(&aws_config),
        failure_notifier(&aws_config, &config),
        config.next_start_in,
    );
    let dispatcher_ref: &DirectDispatcher = &dispatcher;

    lambda_runtime::run(service_fn(move |event: LambdaEvent<Event>| async move {
        handle(dispatcher_ref, event).await
    }))
    .await
}

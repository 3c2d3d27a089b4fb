use aws_config::BehaviorVersion;
use aws_lambda_events::cloudwatch_events::CloudWatchEvent;
use lambda_runtime::{service_fn, Error, LambdaEvent};
use outboxer::{failure_notifier, sqs_sender, workflow_table};
use workflow::{DispatchConfig, OpenWorkflowsIndex, PollingDispatcher, PollingReport, WorkflowTable};

async fn handle(
    dispatcher: &PollingDispatcher,
    event: LambdaEvent<CloudWatchEvent<serde_json::Value>>,
) -> Result<(), Error> {
    // The schedule event id identifies the run, the invocation id stands in when absent
    let request_id: String = event
        .payload
        .id
        .unwrap_or_else(|| event.context.request_id.clone());

    let report: PollingReport = dispatcher.dispatch(&request_id).await?;

    tracing::info!(request_id = %request_id, ?report, "Polling dispatch finished");

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    lambda_runtime::tracing::init_default_subscriber();

    let config: DispatchConfig = DispatchConfig::from_env()?;
    let index_name: String = config.require_index_name()?.to_string();
    let aws_config = aws_config::load_defaults(BehaviorVersion::latest()).await;

    let workflows: WorkflowTable = workflow_table(&aws_config, &config);
    let dispatcher: PollingDispatcher = PollingDispatcher::new(
        workflows.clone(),
        OpenWorkflowsIndex::new(&workflows, index_name),
        sqs_sender(&aws_config),
        failure_notifier(&aws_config, &config),
        config.next_start_in,
        config.workflows_to_dispatch,
    );
    let dispatcher_ref: &PollingDispatcher = &dispatcher;

    lambda_runtime::run(service_fn(
        move |event: LambdaEvent<CloudWatchEvent<serde_json::Value>>| async move {
            handle(dispatcher_ref, event).await
        },
    ))
    .await
}

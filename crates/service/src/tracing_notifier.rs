use crate::{FailureNotifier, Notification, ServiceError};
use async_trait::async_trait;

/// A notifier which only logs, for when no notification channel is configured.
#[derive(Debug, Default, Clone)]
pub struct TracingNotifier;

#[async_trait]
impl FailureNotifier for TracingNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), ServiceError> {
        tracing::error!(
            request_id = %notification.request_id,
            "Failure notification: {}",
            notification.message
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn always_succeeds() {
        let result = TracingNotifier
            .notify(Notification::new("req-1", "impossible to send 1 events"))
            .await;

        assert!(result.is_ok());
    }
}

//! Best-effort usage reporting.
//!
//! Each lifecycle call enqueues a [`UsageEvent`] snapshot on a bounded
//! channel with `try_send`; a single background task posts events to the
//! platform. A full or closed queue drops the event, and delivery failures
//! are only logged, so reporting never blocks or fails the caller.

use std::fmt;
use std::sync::Arc;

use serde_json::json;
use tokio::sync::mpsc;
use tracing::debug;

use crate::client::{ApiRequest, HttpClient};

/// Endpoint receiving usage events.
pub const USAGE_ENDPOINT: &str = "artifactory/api/system/usage";

/// Lifecycle operation being reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Create.
    Create,
    /// Read.
    Read,
    /// Update.
    Update,
    /// Delete.
    Delete,
    /// Import.
    Import,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Create => "CREATE",
            Self::Read => "READ",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Import => "IMPORT",
        })
    }
}

/// Owned snapshot of one lifecycle call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageEvent {
    /// Resource type name.
    pub resource_type: String,
    /// Operation performed.
    pub operation: Operation,
}

impl UsageEvent {
    /// Create an event.
    pub fn new(resource_type: impl Into<String>, operation: Operation) -> Self {
        Self {
            resource_type: resource_type.into(),
            operation,
        }
    }

    /// Feature identifier sent to the platform.
    pub fn feature_id(&self) -> String {
        format!("Resource/{}/{}", self.resource_type, self.operation)
    }
}

/// Handle used on the call path to enqueue usage events.
#[derive(Debug, Clone, Default)]
pub struct UsageReporter {
    sender: Option<mpsc::Sender<UsageEvent>>,
}

impl UsageReporter {
    /// A reporter that drops every event.
    pub fn disabled() -> Self {
        Self { sender: None }
    }

    /// A reporter feeding the returned receiver; the caller owns consumption.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<UsageEvent>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                sender: Some(sender),
            },
            receiver,
        )
    }

    /// Start the background consumer posting events through `client`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(client: Arc<dyn HttpClient>, product_id: String, capacity: usize) -> Self {
        let (reporter, receiver) = Self::channel(capacity);
        tokio::spawn(run_consumer(receiver, client, product_id));
        reporter
    }

    /// Enqueue an event without waiting.
    pub fn report(&self, event: UsageEvent) {
        let Some(sender) = &self.sender else { return };
        if let Err(err) = sender.try_send(event) {
            debug!(error = %err, "Usage event dropped");
        }
    }
}

async fn run_consumer(
    mut receiver: mpsc::Receiver<UsageEvent>,
    client: Arc<dyn HttpClient>,
    product_id: String,
) {
    while let Some(event) = receiver.recv().await {
        let body = json!({
            "productId": product_id,
            "features": [{"featureId": event.feature_id()}],
        });
        match client.execute(ApiRequest::post(USAGE_ENDPOINT, body)).await {
            Ok(response) if response.is_success() => {}
            Ok(response) => debug!(status = response.status, "Usage report rejected"),
            Err(err) => debug!(error = %err, "Usage report failed"),
        }
    }
    debug!("Usage reporter stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ApiResponse;
    use crate::testing::MockClient;

    #[test]
    fn test_feature_id() {
        let event = UsageEvent::new("artifactory_scoped_token", Operation::Create);
        assert_eq!(event.feature_id(), "Resource/artifactory_scoped_token/CREATE");
    }

    #[test]
    fn test_full_queue_drops_without_blocking() {
        let (reporter, mut receiver) = UsageReporter::channel(1);
        reporter.report(UsageEvent::new("a", Operation::Read));
        reporter.report(UsageEvent::new("b", Operation::Read));

        assert_eq!(receiver.try_recv().unwrap().resource_type, "a");
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn test_closed_queue_is_ignored() {
        let (reporter, receiver) = UsageReporter::channel(1);
        drop(receiver);
        reporter.report(UsageEvent::new("a", Operation::Delete));
        UsageReporter::disabled().report(UsageEvent::new("a", Operation::Delete));
    }

    #[tokio::test]
    async fn test_consumer_posts_and_ignores_failures() {
        let client = Arc::new(MockClient::new());
        client.push_response(ApiResponse::new(500, "boom"));
        client.push_response(ApiResponse::new(200, ""));

        let (reporter, receiver) = UsageReporter::channel(4);
        reporter.report(UsageEvent::new("artifactory_keypair", Operation::Create));
        reporter.report(UsageEvent::new("artifactory_keypair", Operation::Delete));
        drop(reporter);

        run_consumer(receiver, client.clone(), "test/1.0".to_string()).await;

        let requests = client.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].path, USAGE_ENDPOINT);
        assert_eq!(
            requests[1].body.as_ref().unwrap()["features"][0]["featureId"],
            "Resource/artifactory_keypair/DELETE"
        );
        assert_eq!(requests[0].body.as_ref().unwrap()["productId"], "test/1.0");
    }
}

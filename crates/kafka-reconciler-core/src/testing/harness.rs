//! Test harness bundling a mock broker with a connected client and both
//! reconcilers.

use std::sync::Arc;
use std::time::Duration;

use crate::admin::AdminClient;
use crate::config::ClusterConfig;
use crate::reconcile::{AclReconciler, TopicReconciler};
use crate::retry::Retry;

use super::mock_broker::MockBroker;

/// A complete reconciliation test environment.
pub struct TestHarness {
    /// The mock broker; inspect its state and call log in assertions.
    pub broker: MockBroker,
    /// The shared admin client.
    pub client: Arc<AdminClient>,
    /// Topic reconciler wired to the mock broker.
    pub topics: TopicReconciler,
    /// ACL reconciler wired to the mock broker.
    pub acls: AclReconciler,
}

impl TestHarness {
    /// Start a harness with no propagation lag and a generous retry budget.
    pub async fn start() -> Self {
        Self::with_options(0, Self::fast_retry()).await
    }

    /// Start a harness with a metadata visibility lag and a custom retry
    /// budget.
    pub async fn with_options(visibility_lag: u32, retry: Retry) -> Self {
        let broker = MockBroker::start("127.0.0.1:0")
            .await
            .expect("failed to start mock broker");
        broker.set_visibility_lag(visibility_lag);

        let mut config = ClusterConfig::plaintext(vec![broker.address().to_string()]);
        config.connect_timeout_ms = 5_000;
        config.request_timeout_ms = 10_000;

        let client = Arc::new(AdminClient::new(config).expect("failed to build admin client"));
        let topics = TopicReconciler::new(Arc::clone(&client), retry.clone());
        let acls = AclReconciler::new(Arc::clone(&client), retry);

        Self {
            broker,
            client,
            topics,
            acls,
        }
    }

    /// A retry budget with millisecond backoffs, suited to in-process tests.
    #[must_use]
    pub fn fast_retry() -> Retry {
        Retry::default()
            .max_attempts(10)
            .initial_backoff(Duration::from_millis(2))
            .max_backoff(Duration::from_millis(10))
            .deadline(Some(Duration::from_secs(10)))
    }

    /// Number of RPCs of one kind the broker has served.
    #[must_use]
    pub fn rpc_count(&self, api_key: i16) -> usize {
        self.broker.call_count(api_key)
    }
}

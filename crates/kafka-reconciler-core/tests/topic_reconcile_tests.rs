//! Integration tests for topic reconciliation against the mock broker.

use std::collections::BTreeMap;

use kafka_reconciler_core::error::ReconcileError;
use kafka_reconciler_core::model::TopicSpec;
use kafka_reconciler_core::testing::{api_keys, TestHarness};

fn config(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn spec(name: &str, partitions: i32, config_pairs: &[(&str, &str)]) -> TopicSpec {
    TopicSpec {
        name: name.to_string(),
        partitions,
        replication_factor: 1,
        config: config(config_pairs),
    }
}

#[tokio::test]
async fn test_create_then_read_reports_exact_shape() {
    let harness = TestHarness::start().await;

    harness.topics.create(&spec("syslog-a", 3, &[])).await.unwrap();

    let state = harness.topics.read("syslog-a").await.unwrap();
    assert_eq!(state.partitions, 3);
    assert_eq!(state.replication_factor, 1);
    assert_eq!(state.assignments.len(), 3);
}

#[tokio::test]
async fn test_fresh_topic_has_empty_config() {
    let harness = TestHarness::start().await;

    harness.topics.create(&spec("syslog-b", 1, &[])).await.unwrap();

    let state = harness.topics.read("syslog-b").await.unwrap();
    assert!(
        state.config.is_empty(),
        "expected no configs, got {:?}",
        state.config
    );
}

#[tokio::test]
async fn test_config_update_scenario() {
    let harness = TestHarness::start().await;

    // Create with no config, then apply an initial config map.
    harness.topics.create(&spec("syslog-c", 1, &[])).await.unwrap();
    let initial = config(&[("retention.ms", "11111"), ("segment.ms", "22222")]);
    harness
        .topics
        .update_config("syslog-c", &initial)
        .await
        .unwrap();

    let state = harness.topics.read("syslog-c").await.unwrap();
    assert_eq!(state.config, initial);

    // Replace the desired map: segment.ms changes, segment.bytes appears,
    // retention.ms disappears and must be explicitly removed.
    let updated = config(&[("segment.ms", "33333"), ("segment.bytes", "44444")]);
    harness
        .topics
        .update_config("syslog-c", &updated)
        .await
        .unwrap();

    let state = harness.topics.read("syslog-c").await.unwrap();
    assert_eq!(state.config.get("segment.ms").map(String::as_str), Some("33333"));
    assert_eq!(
        state.config.get("segment.bytes").map(String::as_str),
        Some("44444")
    );
    assert!(
        !state.config.contains_key("retention.ms"),
        "retention.ms did not get removed: {:?}",
        state.config
    );
}

#[tokio::test]
async fn test_config_update_is_idempotent() {
    let harness = TestHarness::start().await;

    let desired = spec("syslog-d", 1, &[("retention.ms", "11111")]);
    harness.topics.apply(&desired).await.unwrap();

    // A second apply of the same desired state must find an empty delta and
    // issue no further alter-config RPCs.
    harness.broker.clear_calls();
    harness.topics.apply(&desired).await.unwrap();
    assert_eq!(harness.rpc_count(api_keys::INCREMENTAL_ALTER_CONFIGS), 0);
}

#[tokio::test]
async fn test_removed_key_reaches_broker_as_removal() {
    let harness = TestHarness::start().await;

    harness
        .topics
        .apply(&spec("syslog-e", 1, &[("retention.ms", "11111")]))
        .await
        .unwrap();

    harness.topics.apply(&spec("syslog-e", 1, &[])).await.unwrap();

    // The broker-side map must no longer carry the key.
    let broker_config = harness.broker.topic_config("syslog-e").unwrap();
    assert!(!broker_config.contains_key("retention.ms"));
}

#[tokio::test]
async fn test_partition_increase() {
    let harness = TestHarness::start().await;

    harness.topics.create(&spec("syslog-f", 1, &[])).await.unwrap();
    harness
        .topics
        .update_partitions("syslog-f", 2)
        .await
        .unwrap();

    let state = harness.topics.read("syslog-f").await.unwrap();
    assert_eq!(state.partitions, 2);
}

#[tokio::test]
async fn test_partition_shrink_fails_without_rpc() {
    let harness = TestHarness::start().await;

    harness.topics.create(&spec("syslog-g", 4, &[])).await.unwrap();
    harness.broker.clear_calls();

    let result = harness.topics.update_partitions("syslog-g", 2).await;
    assert!(matches!(result, Err(ReconcileError::InvalidOperation(_))));
    assert_eq!(harness.rpc_count(api_keys::CREATE_PARTITIONS), 0);

    let state = harness.topics.read("syslog-g").await.unwrap();
    assert_eq!(state.partitions, 4);
}

#[tokio::test]
async fn test_partition_count_unchanged_is_a_noop() {
    let harness = TestHarness::start().await;

    harness.topics.create(&spec("syslog-h", 2, &[])).await.unwrap();
    harness.broker.clear_calls();

    harness
        .topics
        .update_partitions("syslog-h", 2)
        .await
        .unwrap();
    assert_eq!(harness.rpc_count(api_keys::CREATE_PARTITIONS), 0);
}

#[tokio::test]
async fn test_create_collision() {
    let harness = TestHarness::start().await;

    harness.topics.create(&spec("syslog-i", 1, &[])).await.unwrap();
    let result = harness.topics.create(&spec("syslog-i", 1, &[])).await;
    assert!(matches!(result, Err(ReconcileError::AlreadyExists(_))));
}

#[tokio::test]
async fn test_replication_factor_exceeding_broker_count() {
    let harness = TestHarness::start().await;

    // The mock cluster has a single broker.
    let doomed = TopicSpec {
        name: "syslog-j".to_string(),
        partitions: 1,
        replication_factor: 3,
        config: BTreeMap::new(),
    };
    let result = harness.topics.create(&doomed).await;
    assert!(matches!(result, Err(ReconcileError::InvalidOperation(_))));
}

#[tokio::test]
async fn test_read_missing_topic() {
    let harness = TestHarness::start().await;

    let result = harness.topics.read("no-such-topic").await;
    match result {
        Err(ReconcileError::TopicMissing(name)) => assert_eq!(name, "no-such-topic"),
        other => panic!("expected TopicMissing, got {other:?}"),
    }
}

#[tokio::test]
async fn test_delete_then_destroy_check() {
    let harness = TestHarness::start().await;

    harness.topics.create(&spec("syslog-k", 1, &[])).await.unwrap();
    harness.topics.delete("syslog-k").await.unwrap();

    // Destroy verification: the read must report the topic missing.
    let result = harness.topics.read("syslog-k").await;
    assert!(matches!(result, Err(ReconcileError::TopicMissing(_))));

    // Deleting again is idempotent.
    harness.topics.delete("syslog-k").await.unwrap();
}

#[tokio::test]
async fn test_apply_creates_missing_topic_and_returns_state() {
    let harness = TestHarness::start().await;

    let desired = spec("syslog-l", 2, &[("retention.ms", "11111")]);
    let observed = harness.topics.apply(&desired).await.unwrap();

    assert_eq!(observed.partitions, 2);
    assert_eq!(
        observed.config.get("retention.ms").map(String::as_str),
        Some("11111")
    );
}

#[tokio::test]
async fn test_apply_converges_partitions_and_config_together() {
    let harness = TestHarness::start().await;

    harness
        .topics
        .apply(&spec("syslog-m", 1, &[("retention.ms", "11111"), ("segment.ms", "33333")]))
        .await
        .unwrap();

    // One pass carrying both a partition increase and a config change.
    let observed = harness
        .topics
        .apply(&spec("syslog-m", 2, &[("retention.ms", "11111"), ("segment.ms", "33333")]))
        .await
        .unwrap();
    assert_eq!(observed.partitions, 2);
    assert_eq!(
        observed.config.get("segment.ms").map(String::as_str),
        Some("33333")
    );
}

//! Integration tests for ACL reconciliation against the mock broker.

use kafka_reconciler_core::admin::AclFilter;
use kafka_reconciler_core::model::{
    AclBinding, AclOperation, AclPermission, PatternType, ResourceType,
};
use kafka_reconciler_core::reconcile::AclReconciler;
use kafka_reconciler_core::testing::{api_keys, TestHarness};

fn binding(
    resource: &str,
    pattern: PatternType,
    principal: &str,
    permission: AclPermission,
) -> AclBinding {
    AclBinding {
        resource_type: ResourceType::Topic,
        resource_name: resource.to_string(),
        pattern_type: pattern,
        principal: principal.to_string(),
        host: "*".to_string(),
        operation: AclOperation::Write,
        permission,
    }
}

#[tokio::test]
async fn test_create_binding_and_list() {
    let harness = TestHarness::start().await;

    let allow = binding(
        "syslog-acl-a",
        PatternType::Literal,
        "User:Alice",
        AclPermission::Allow,
    );
    harness.acls.create(&allow).await.unwrap();

    let groups = harness.acls.list(&AclFilter::default()).await.unwrap();
    let matching: Vec<_> = groups
        .iter()
        .filter(|g| g.resource_name == "syslog-acl-a")
        .collect();
    assert_eq!(matching.len(), 1);
    assert_eq!(matching[0].pattern_type, PatternType::Literal);
    assert_eq!(matching[0].entries.len(), 1);
    assert_eq!(matching[0].entries[0].principal, "User:Alice");
    assert_eq!(matching[0].entries[0].host, "*");
    assert_eq!(matching[0].entries[0].permission, AclPermission::Allow);
}

#[tokio::test]
async fn test_replace_binding_is_delete_plus_create() {
    let harness = TestHarness::start().await;

    let allow = binding(
        "syslog-acl-b",
        PatternType::Literal,
        "User:Alice",
        AclPermission::Allow,
    );
    harness.acls.create(&allow).await.unwrap();

    // The "update" replaces Literal/Allow with Prefixed/Deny: two distinct
    // composite keys, so the plan is one create and one delete.
    let deny = binding(
        "syslog-acl-b",
        PatternType::Prefixed,
        "User:Alice",
        AclPermission::Deny,
    );
    let observed = harness.acls.observed(&AclFilter::default()).await.unwrap();
    let delta = AclReconciler::plan(std::slice::from_ref(&deny), &observed);
    assert_eq!(delta.to_create.len(), 1);
    assert_eq!(delta.to_delete.len(), 1);
    harness.acls.apply(&delta).await.unwrap();

    let groups = harness.acls.list(&AclFilter::default()).await.unwrap();
    let matching: Vec<_> = groups
        .iter()
        .filter(|g| g.resource_name == "syslog-acl-b")
        .collect();
    assert_eq!(matching.len(), 1, "old binding must be gone, not mutated");
    assert_eq!(matching[0].pattern_type, PatternType::Prefixed);
    assert_eq!(matching[0].entries.len(), 1);
    assert_eq!(matching[0].entries[0].permission, AclPermission::Deny);
}

#[tokio::test]
async fn test_diff_is_exact_set_difference() {
    let harness = TestHarness::start().await;

    let keep = binding(
        "syslog-acl-c",
        PatternType::Literal,
        "User:Alice",
        AclPermission::Allow,
    );
    let stale = binding(
        "syslog-acl-c",
        PatternType::Literal,
        "User:Mallory",
        AclPermission::Allow,
    );
    harness.acls.create(&keep).await.unwrap();
    harness.acls.create(&stale).await.unwrap();

    let fresh = binding(
        "syslog-acl-c",
        PatternType::Literal,
        "User:Bob",
        AclPermission::Allow,
    );
    let desired = vec![keep.clone(), fresh.clone()];
    let observed = harness.acls.observed(&AclFilter::default()).await.unwrap();
    let delta = AclReconciler::plan(&desired, &observed);

    assert_eq!(delta.to_create, vec![fresh.clone()]);
    assert_eq!(delta.to_delete, vec![stale]);
    harness.acls.apply(&delta).await.unwrap();

    let mut bindings = harness.broker.bindings();
    bindings.sort();
    let mut expected = vec![keep, fresh];
    expected.sort();
    assert_eq!(bindings, expected);
}

#[tokio::test]
async fn test_converged_set_issues_no_rpcs() {
    let harness = TestHarness::start().await;

    let bound = binding(
        "syslog-acl-d",
        PatternType::Literal,
        "User:Alice",
        AclPermission::Allow,
    );
    harness.acls.create(&bound).await.unwrap();

    let observed = harness.acls.observed(&AclFilter::default()).await.unwrap();
    let delta = AclReconciler::plan(std::slice::from_ref(&bound), &observed);
    assert!(delta.is_empty());

    harness.broker.clear_calls();
    harness.acls.apply(&delta).await.unwrap();
    assert_eq!(harness.rpc_count(api_keys::CREATE_ACLS), 0);
    assert_eq!(harness.rpc_count(api_keys::DELETE_ACLS), 0);
}

#[tokio::test]
async fn test_destroy_check_counts_by_resource_name() {
    let harness = TestHarness::start().await;

    // Two managed bindings share one resource name; an unrelated binding
    // must not disturb the count.
    let write = binding(
        "syslog-acl-e",
        PatternType::Literal,
        "User:Alice",
        AclPermission::Allow,
    );
    let mut read = write.clone();
    read.operation = AclOperation::Read;
    let unrelated = binding(
        "audit-acl",
        PatternType::Literal,
        "User:Carol",
        AclPermission::Allow,
    );
    harness.acls.create(&write).await.unwrap();
    harness.acls.create(&read).await.unwrap();
    harness.acls.create(&unrelated).await.unwrap();

    assert_eq!(
        harness.acls.count_for_resource("syslog-acl-e").await.unwrap(),
        2
    );

    harness.acls.delete_matching(&write).await.unwrap();
    assert_eq!(
        harness.acls.count_for_resource("syslog-acl-e").await.unwrap(),
        1
    );

    harness.acls.delete_matching(&read).await.unwrap();
    assert_eq!(
        harness.acls.count_for_resource("syslog-acl-e").await.unwrap(),
        0
    );
    assert_eq!(harness.acls.count_for_resource("audit-acl").await.unwrap(), 1);
}

#[tokio::test]
async fn test_delete_absent_binding_succeeds() {
    let harness = TestHarness::start().await;

    let ghost = binding(
        "never-created",
        PatternType::Literal,
        "User:Alice",
        AclPermission::Allow,
    );
    harness.acls.delete_matching(&ghost).await.unwrap();
}

#[tokio::test]
async fn test_list_filters_by_resource() {
    let harness = TestHarness::start().await;

    let a = binding(
        "syslog-acl-f",
        PatternType::Literal,
        "User:Alice",
        AclPermission::Allow,
    );
    let b = binding(
        "other-resource",
        PatternType::Literal,
        "User:Alice",
        AclPermission::Allow,
    );
    harness.acls.create(&a).await.unwrap();
    harness.acls.create(&b).await.unwrap();

    let filter = AclFilter {
        resource_type: Some(ResourceType::Topic),
        resource_name: Some("syslog-acl-f".to_string()),
        pattern_type: Some(PatternType::Literal),
    };
    let groups = harness.acls.list(&filter).await.unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].resource_name, "syslog-acl-f");
}

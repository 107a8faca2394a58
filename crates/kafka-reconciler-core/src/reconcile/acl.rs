//! ACL reconciliation.
//!
//! Bindings are immutable and the broker ACL model has no update verb, so a
//! "change" to a binding is delete-old plus create-new. The diff is an
//! exact-set comparison over the full composite key; prefix or partial
//! matching would silently leave stale bindings behind.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info};

use crate::admin::{AclFilter, AdminClient};
use crate::error::Result;
use crate::model::{AclBinding, AclDelta, AclGroup};
use crate::retry::Retry;

/// Reconciles declared ACL bindings against live cluster state.
pub struct AclReconciler {
    client: Arc<AdminClient>,
    retry: Retry,
}

impl AclReconciler {
    /// Create a reconciler sharing the process-wide admin client.
    #[must_use]
    pub fn new(client: Arc<AdminClient>, retry: Retry) -> Self {
        Self { client, retry }
    }

    /// List bindings matching `filter`, grouped by resource.
    ///
    /// A finite, deterministically ordered snapshot.
    pub async fn list(&self, filter: &AclFilter) -> Result<Vec<AclGroup>> {
        self.client.describe_acls(filter).await
    }

    /// List bindings matching `filter`, flattened to full composite keys.
    pub async fn observed(&self, filter: &AclFilter) -> Result<Vec<AclBinding>> {
        let groups = self.list(filter).await?;
        Ok(groups.iter().flat_map(AclGroup::bindings).collect())
    }

    /// Create one binding and wait until it is readable.
    pub async fn create(&self, binding: &AclBinding) -> Result<()> {
        info!(
            resource = %binding.resource_name,
            principal = %binding.principal,
            operation = ?binding.operation,
            permission = ?binding.permission,
            "creating acl binding"
        );
        {
            let client = Arc::clone(&self.client);
            let binding = binding.clone();
            self.retry
                .run(move || {
                    let client = Arc::clone(&client);
                    let binding = binding.clone();
                    async move { client.create_acl(&binding).await }
                })
                .await?;
        }

        let client = Arc::clone(&self.client);
        let target = binding.clone();
        self.retry
            .until(
                &format!("creation of acl binding for {}", binding.resource_name),
                move || {
                    let client = Arc::clone(&client);
                    let target = target.clone();
                    async move { binding_present(&client, &target).await }
                },
            )
            .await
    }

    /// Delete the binding matching the full composite key, waiting until it
    /// is no longer readable. Deleting an absent binding succeeds.
    pub async fn delete_matching(&self, binding: &AclBinding) -> Result<()> {
        let removed = {
            let client = Arc::clone(&self.client);
            let binding = binding.clone();
            self.retry
                .run(move || {
                    let client = Arc::clone(&client);
                    let binding = binding.clone();
                    async move { client.delete_acls(&binding).await }
                })
                .await?
        };
        if removed == 0 {
            debug!(resource = %binding.resource_name, "no matching acl binding to delete");
        } else {
            info!(resource = %binding.resource_name, removed, "deleted acl binding");
        }

        let client = Arc::clone(&self.client);
        let target = binding.clone();
        self.retry
            .until(
                &format!("deletion of acl binding for {}", binding.resource_name),
                move || {
                    let client = Arc::clone(&client);
                    let target = target.clone();
                    async move { Ok(!binding_present(&client, &target).await?) }
                },
            )
            .await
    }

    /// Compute the exact set difference between desired and observed
    /// bindings: create `D \ O`, delete `O \ D`, leave `D ∩ O` untouched.
    #[must_use]
    pub fn plan(desired: &[AclBinding], observed: &[AclBinding]) -> AclDelta {
        let desired: BTreeSet<&AclBinding> = desired.iter().collect();
        let observed: BTreeSet<&AclBinding> = observed.iter().collect();
        AclDelta {
            to_create: desired
                .difference(&observed)
                .map(|b| (*b).clone())
                .collect(),
            to_delete: observed
                .difference(&desired)
                .map(|b| (*b).clone())
                .collect(),
        }
    }

    /// Apply a planned delta: create the missing bindings, then delete the
    /// stale ones. Each side is verified readable before returning.
    pub async fn apply(&self, delta: &AclDelta) -> Result<()> {
        for binding in &delta.to_create {
            self.create(binding).await?;
        }
        for binding in &delta.to_delete {
            self.delete_matching(binding).await?;
        }
        Ok(())
    }

    /// Destroy check: how many bindings exist whose resource name matches
    /// `resource_name` exactly. Multiple managed bindings may share one
    /// resource name, so destruction is verified by this count reaching
    /// zero, not by any single deletion succeeding.
    pub async fn count_for_resource(&self, resource_name: &str) -> Result<usize> {
        let groups = self.list(&AclFilter::default()).await?;
        Ok(groups
            .iter()
            .filter(|g| g.resource_name == resource_name)
            .map(|g| g.entries.len())
            .sum())
    }
}

/// Whether the exact binding is currently readable.
async fn binding_present(client: &AdminClient, binding: &AclBinding) -> Result<bool> {
    let filter = AclFilter {
        resource_type: Some(binding.resource_type),
        resource_name: Some(binding.resource_name.clone()),
        pattern_type: Some(binding.pattern_type),
    };
    let groups = client.describe_acls(&filter).await?;
    Ok(groups
        .iter()
        .flat_map(AclGroup::bindings)
        .any(|b| b == *binding))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AclOperation, AclPermission, PatternType, ResourceType};

    fn binding(resource: &str, principal: &str, permission: AclPermission) -> AclBinding {
        AclBinding {
            resource_type: ResourceType::Topic,
            resource_name: resource.to_string(),
            pattern_type: PatternType::Literal,
            principal: principal.to_string(),
            host: "*".to_string(),
            operation: AclOperation::Write,
            permission,
        }
    }

    #[test]
    fn test_plan_converged_is_empty() {
        let bindings = vec![binding("syslog", "User:Alice", AclPermission::Allow)];
        let delta = AclReconciler::plan(&bindings, &bindings.clone());
        assert!(delta.is_empty());
    }

    #[test]
    fn test_plan_is_exact_set_difference() {
        let keep = binding("syslog", "User:Alice", AclPermission::Allow);
        let add = binding("syslog", "User:Bob", AclPermission::Allow);
        let drop = binding("audit", "User:Carol", AclPermission::Deny);

        let desired = vec![keep.clone(), add.clone()];
        let observed = vec![keep.clone(), drop.clone()];

        let delta = AclReconciler::plan(&desired, &observed);
        assert_eq!(delta.to_create, vec![add]);
        assert_eq!(delta.to_delete, vec![drop]);
    }

    #[test]
    fn test_plan_permission_flip_is_delete_plus_create() {
        // Allow -> Deny is two distinct bindings, never an in-place change.
        let allow = binding("syslog", "User:Alice", AclPermission::Allow);
        let deny = binding("syslog", "User:Alice", AclPermission::Deny);

        let delta = AclReconciler::plan(&[deny.clone()], &[allow.clone()]);
        assert_eq!(delta.to_create, vec![deny]);
        assert_eq!(delta.to_delete, vec![allow]);
    }

    #[test]
    fn test_plan_empty_observed_creates_everything() {
        let desired = vec![
            binding("syslog", "User:Alice", AclPermission::Allow),
            binding("syslog", "User:Bob", AclPermission::Allow),
        ];
        let delta = AclReconciler::plan(&desired, &[]);
        assert_eq!(delta.to_create.len(), 2);
        assert!(delta.to_delete.is_empty());
    }
}

//! Topic reconciliation.
//!
//! Config management is declarative and total: the desired map is the whole
//! truth. Keys that differ are altered, keys missing from the desired map
//! are explicitly unset on the broker; a no-op is never assumed. Partition
//! counts only grow; the replication factor never changes after creation.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::admin::AdminClient;
use crate::error::{ReconcileError, Result};
use crate::model::{TopicDelta, TopicSpec, TopicState};
use crate::retry::Retry;

/// Reconciles declared topic specs against live cluster state.
pub struct TopicReconciler {
    client: Arc<AdminClient>,
    retry: Retry,
}

impl TopicReconciler {
    /// Create a reconciler sharing the process-wide admin client.
    #[must_use]
    pub fn new(client: Arc<AdminClient>, retry: Retry) -> Self {
        Self { client, retry }
    }

    /// Read the current state of a topic.
    ///
    /// Fails with [`ReconcileError::TopicMissing`] when the topic does not
    /// exist; callers use that distinction for existence checks and destroy
    /// verification.
    pub async fn read(&self, name: &str) -> Result<TopicState> {
        let meta = self.client.fetch_topic_metadata(name).await?;
        let config = self.client.fetch_topic_config(name).await?;
        Ok(TopicState {
            name: name.to_string(),
            partitions: meta.partitions(),
            replication_factor: meta.replication_factor(),
            config,
            assignments: meta.assignments,
        })
    }

    /// Create a topic and wait until the cluster metadata reports it with
    /// the requested partition count.
    pub async fn create(&self, spec: &TopicSpec) -> Result<()> {
        if spec.partitions < 1 {
            return Err(ReconcileError::InvalidOperation(format!(
                "topic {} requires at least one partition, got {}",
                spec.name, spec.partitions
            )));
        }
        if spec.replication_factor < 1 {
            return Err(ReconcileError::InvalidOperation(format!(
                "topic {} requires a replication factor of at least one, got {}",
                spec.name, spec.replication_factor
            )));
        }

        info!(topic = %spec.name, partitions = spec.partitions, replication_factor = spec.replication_factor, "creating topic");
        {
            let client = Arc::clone(&self.client);
            let spec = spec.clone();
            self.retry
                .run(move || {
                    let client = Arc::clone(&client);
                    let spec = spec.clone();
                    async move { client.create_topic(&spec).await }
                })
                .await?;
        }

        // Creation is acknowledged by the controller before it is visible in
        // metadata; poll until the topic reports the requested partitions.
        let client = Arc::clone(&self.client);
        let name = spec.name.clone();
        let want = spec.partitions;
        self.retry
            .until(&format!("creation of topic {}", spec.name), move || {
                let client = Arc::clone(&client);
                let name = name.clone();
                async move {
                    match client.fetch_topic_metadata(&name).await {
                        Ok(meta) => Ok(meta.partitions() == want),
                        Err(ReconcileError::TopicMissing(_)) => Ok(false),
                        Err(e) => Err(e),
                    }
                }
            })
            .await
    }

    /// Converge the topic's dynamic config onto `desired`.
    ///
    /// Computes the symmetric difference against the currently observed
    /// config: changed or new keys are set, keys on the broker but absent
    /// from `desired` are issued as explicit removals. Applying the same
    /// desired map twice issues no RPCs the second time.
    pub async fn update_config(
        &self,
        name: &str,
        desired: &BTreeMap<String, String>,
    ) -> Result<()> {
        let observed = self.client.fetch_topic_config(name).await?;
        let (set, unset) = config_delta(desired, &observed);
        if set.is_empty() && unset.is_empty() {
            debug!(topic = %name, "config already converged");
            return Ok(());
        }

        info!(topic = %name, set = set.len(), unset = unset.len(), "altering topic config");
        {
            let client = Arc::clone(&self.client);
            let name = name.to_string();
            let set = set.clone();
            let unset = unset.clone();
            self.retry
                .run(move || {
                    let client = Arc::clone(&client);
                    let name = name.clone();
                    let set = set.clone();
                    let unset = unset.clone();
                    async move { client.alter_topic_config(&name, &set, &unset).await }
                })
                .await?;
        }

        let client = Arc::clone(&self.client);
        let probe_name = name.to_string();
        let want = desired.clone();
        self.retry
            .until(&format!("config update of topic {name}"), move || {
                let client = Arc::clone(&client);
                let name = probe_name.clone();
                let want = want.clone();
                async move { Ok(client.fetch_topic_config(&name).await? == want) }
            })
            .await
    }

    /// Raise the topic's partition count to `count`.
    ///
    /// Partition counts are monotonic: a lower count fails fast with
    /// [`ReconcileError::InvalidOperation`] and issues no RPC. The current
    /// count is a no-op.
    pub async fn update_partitions(&self, name: &str, count: i32) -> Result<()> {
        let current = self.client.fetch_topic_metadata(name).await?.partitions();
        if count < current {
            return Err(ReconcileError::InvalidOperation(format!(
                "cannot shrink topic {name} from {current} to {count} partitions"
            )));
        }
        if count == current {
            debug!(topic = %name, partitions = count, "partition count already converged");
            return Ok(());
        }

        info!(topic = %name, from = current, to = count, "increasing partitions");
        {
            let client = Arc::clone(&self.client);
            let name = name.to_string();
            self.retry
                .run(move || {
                    let client = Arc::clone(&client);
                    let name = name.clone();
                    async move { client.create_partitions(&name, count).await }
                })
                .await?;
        }

        let client = Arc::clone(&self.client);
        let probe_name = name.to_string();
        self.retry
            .until(&format!("partition increase of topic {name}"), move || {
                let client = Arc::clone(&client);
                let name = probe_name.clone();
                async move { Ok(client.fetch_topic_metadata(&name).await?.partitions() == count) }
            })
            .await
    }

    /// Delete a topic and wait until it disappears from metadata. Deleting
    /// an absent topic succeeds.
    pub async fn delete(&self, name: &str) -> Result<()> {
        let already_missing = {
            let client = Arc::clone(&self.client);
            let name = name.to_string();
            self.retry
                .run(move || {
                    let client = Arc::clone(&client);
                    let name = name.clone();
                    async move { client.delete_topic(&name, true).await }
                })
                .await?
        };
        if already_missing {
            debug!(topic = %name, "topic already absent");
            return Ok(());
        }

        info!(topic = %name, "deleting topic");
        let client = Arc::clone(&self.client);
        let probe_name = name.to_string();
        self.retry
            .until(&format!("deletion of topic {name}"), move || {
                let client = Arc::clone(&client);
                let name = probe_name.clone();
                async move {
                    match client.fetch_topic_metadata(&name).await {
                        Ok(_) => Ok(false),
                        Err(ReconcileError::TopicMissing(_)) => Ok(true),
                        Err(e) => Err(e),
                    }
                }
            })
            .await
    }

    /// Compute the delta between a spec and observed state without issuing
    /// any RPCs.
    ///
    /// Fails when the spec demands an immutable change (replication factor)
    /// or a partition shrink.
    pub fn plan(spec: &TopicSpec, observed: &TopicState) -> Result<TopicDelta> {
        if spec.replication_factor != observed.replication_factor {
            return Err(ReconcileError::InvalidOperation(format!(
                "replication factor of topic {} is immutable ({} declared, {} observed)",
                spec.name, spec.replication_factor, observed.replication_factor
            )));
        }
        if spec.partitions < observed.partitions {
            return Err(ReconcileError::InvalidOperation(format!(
                "cannot shrink topic {} from {} to {} partitions",
                spec.name, observed.partitions, spec.partitions
            )));
        }

        let (config_set, config_delete) = config_delta(&spec.config, &observed.config);
        Ok(TopicDelta {
            config_set,
            config_delete,
            partition_increase: (spec.partitions > observed.partitions).then_some(spec.partitions),
        })
    }

    /// Converge the topic onto `spec`: create it when missing, otherwise
    /// apply the planned partition and config changes. Returns the
    /// post-operation observed state.
    pub async fn apply(&self, spec: &TopicSpec) -> Result<TopicState> {
        match self.read(&spec.name).await {
            Ok(observed) => {
                let delta = Self::plan(spec, &observed)?;
                if let Some(count) = delta.partition_increase {
                    self.update_partitions(&spec.name, count).await?;
                }
                if !delta.config_set.is_empty() || !delta.config_delete.is_empty() {
                    self.update_config(&spec.name, &spec.config).await?;
                }
            }
            Err(ReconcileError::TopicMissing(_)) => {
                self.create(spec).await?;
            }
            Err(e) => return Err(e),
        }
        self.read(&spec.name).await
    }
}

/// The symmetric config difference: keys to set (new or changed) and keys
/// to explicitly unset (observed but not desired).
fn config_delta(
    desired: &BTreeMap<String, String>,
    observed: &BTreeMap<String, String>,
) -> (BTreeMap<String, String>, Vec<String>) {
    let set: BTreeMap<String, String> = desired
        .iter()
        .filter(|(key, value)| observed.get(*key) != Some(value))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    let unset: Vec<String> = observed
        .keys()
        .filter(|key| !desired.contains_key(*key))
        .cloned()
        .collect();
    (set, unset)
}

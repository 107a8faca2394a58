//! Broker admin client.
//!
//! [`AdminClient`] is the process-wide handle the reconcilers share. It owns
//! a single lazily-dialed broker connection behind a mutex: the first call
//! dials one of the bootstrap servers, later calls reuse the connection, and
//! a transport failure clears the slot so the next call transparently
//! redials. Callers never observe connection staleness directly.
//!
//! The typed RPC surface below speaks the admin protocol at pinned versions
//! (all within the non-flexible range) and translates responses into the
//! domain model, mapping broker error codes through the error taxonomy.

mod connection;
mod stream;

use std::collections::BTreeMap;

use kafka_protocol::messages::create_acls_request::AclCreation;
use kafka_protocol::messages::create_partitions_request::CreatePartitionsTopic;
use kafka_protocol::messages::create_topics_request::{CreatableTopic, CreateableTopicConfig};
use kafka_protocol::messages::delete_acls_request::DeleteAclsFilter;
use kafka_protocol::messages::describe_configs_request::DescribeConfigsResource;
use kafka_protocol::messages::incremental_alter_configs_request::{
    AlterableConfig, AlterConfigsResource,
};
use kafka_protocol::messages::metadata_request::MetadataRequestTopic;
use kafka_protocol::messages::{
    ApiKey, CreateAclsRequest, CreatePartitionsRequest, CreateTopicsRequest, DeleteAclsRequest,
    DeleteTopicsRequest, DescribeAclsRequest, DescribeConfigsRequest,
    IncrementalAlterConfigsRequest, MetadataRequest, TopicName,
};
use kafka_protocol::protocol::StrBytes;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::ClusterConfig;
use crate::error::{ReconcileError, Result};
use crate::model::{
    AclBinding, AclEntry, AclGroup, PartitionAssignment, PatternType, ResourceType, TopicSpec,
};
use crate::tls::TlsConnector;

use connection::BrokerConnection;

// Pinned protocol versions, all in the non-flexible range. Because every
// pinned version is below its API's flexible-version cutoff, the request
// header is always v1 and the response header v0.
pub(crate) const REQUEST_HEADER_VERSION: i16 = 1;
pub(crate) const RESPONSE_HEADER_VERSION: i16 = 0;

const METADATA_VERSION: i16 = 8;
const CREATE_TOPICS_VERSION: i16 = 3;
const DELETE_TOPICS_VERSION: i16 = 3;
const DESCRIBE_CONFIGS_VERSION: i16 = 2;
const ALTER_CONFIGS_VERSION: i16 = 0;
const CREATE_PARTITIONS_VERSION: i16 = 1;
const DESCRIBE_ACLS_VERSION: i16 = 1;
const CREATE_ACLS_VERSION: i16 = 1;
const DELETE_ACLS_VERSION: i16 = 1;

/// ConfigResource type code for topics (DescribeConfigs/AlterConfigs).
const CONFIG_RESOURCE_TOPIC: i8 = 2;
/// Config entries whose source is the dynamic topic config (not broker
/// defaults).
const CONFIG_SOURCE_TOPIC: i8 = 1;
/// IncrementalAlterConfigs operations.
const CONFIG_OP_SET: i8 = 0;
const CONFIG_OP_DELETE: i8 = 1;
/// Wildcard code shared by the ACL filter enums.
const ACL_MATCH_ANY: i8 = 1;

/// Topic shape reported by cluster metadata.
#[derive(Debug, Clone)]
pub struct TopicMetadata {
    pub name: String,
    pub assignments: Vec<PartitionAssignment>,
}

impl TopicMetadata {
    /// Current partition count.
    #[must_use]
    pub fn partitions(&self) -> i32 {
        self.assignments.len() as i32
    }

    /// Replication factor, derived from the replica assignment.
    #[must_use]
    pub fn replication_factor(&self) -> i16 {
        self.assignments
            .first()
            .map(|a| a.replicas.len() as i16)
            .unwrap_or(0)
    }
}

/// Filter for listing ACL bindings. `None` fields match anything.
#[derive(Debug, Clone, Default)]
pub struct AclFilter {
    pub resource_type: Option<ResourceType>,
    pub resource_name: Option<String>,
    pub pattern_type: Option<PatternType>,
}

/// The shared broker admin client.
///
/// Cheap to share via `Arc`; all operations take `&self`. Calls against
/// different resources may be issued concurrently from different tasks; the
/// connection mutex serializes the actual wire traffic and, more
/// importantly, redial attempts.
pub struct AdminClient {
    config: ClusterConfig,
    tls: Option<TlsConnector>,
    conn: Mutex<Option<BrokerConnection>>,
}

impl AdminClient {
    /// Create a client. No connection is dialed until the first call.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS configuration cannot be loaded.
    pub fn new(config: ClusterConfig) -> Result<Self> {
        let tls = if config.security_protocol.requires_tls() {
            let tls_config = config.tls.clone().unwrap_or_default();
            Some(TlsConnector::new(&tls_config)?)
        } else {
            None
        };
        Ok(Self {
            config,
            tls,
            conn: Mutex::new(None),
        })
    }

    /// Eagerly establish the connection. Optional; the first RPC dials
    /// on demand.
    pub async fn connect(&self) -> Result<()> {
        let mut guard = self.conn.lock().await;
        if guard.is_none() {
            *guard = Some(self.dial().await?);
        }
        Ok(())
    }

    /// Dial bootstrap servers in order; first success wins.
    async fn dial(&self) -> Result<BrokerConnection> {
        for server in &self.config.bootstrap_servers {
            match BrokerConnection::open(
                server,
                &self.config.client_id,
                self.config.connect_timeout(),
                self.config.request_timeout(),
                self.tls.as_ref(),
            )
            .await
            {
                Ok(conn) => {
                    info!(server = %server, protocol = ?self.config.security_protocol, "connected to bootstrap server");
                    return Ok(conn);
                }
                Err(e) => {
                    warn!(server = %server, error = %e, "failed to connect to bootstrap server");
                }
            }
        }
        Err(ReconcileError::NoBrokersReachable)
    }

    /// Issue one RPC on the shared connection, dialing lazily and
    /// invalidating the connection on transport failure.
    async fn call<R>(&self, api_key: ApiKey, version: i16, request: &R) -> Result<R::Response>
    where
        R: kafka_protocol::protocol::Request + kafka_protocol::protocol::Encodable,
        R::Response: kafka_protocol::protocol::Decodable,
    {
        let mut guard = self.conn.lock().await;
        let conn = match guard.as_mut() {
            Some(conn) => conn,
            None => {
                let fresh = self.dial().await?;
                guard.insert(fresh)
            }
        };

        let result = conn.send(api_key, version, request).await;
        if let Err(err) = &result {
            if matches!(
                err,
                ReconcileError::Connection(_) | ReconcileError::Protocol { .. }
            ) {
                debug!(broker = %conn.address(), error = %err, "invalidating broker connection");
                *guard = None;
            }
        }
        result
    }

    /// Fetch metadata for one topic.
    ///
    /// Fails with [`ReconcileError::TopicMissing`] when the topic does not
    /// exist. Auto-creation is explicitly disabled in the request, so probing
    /// a missing topic can never create it.
    pub async fn fetch_topic_metadata(&self, name: &str) -> Result<TopicMetadata> {
        let mut topic = MetadataRequestTopic::default();
        topic.name = Some(TopicName::from(StrBytes::from_string(name.to_string())));

        let mut request = MetadataRequest::default();
        request.topics = Some(vec![topic]);
        request.allow_auto_topic_creation = false;

        let response = self.call(ApiKey::MetadataKey, METADATA_VERSION, &request).await?;

        let topic = response
            .topics
            .iter()
            .find(|t| t.name.as_ref().is_some_and(|n| n.to_string() == name))
            .ok_or_else(|| ReconcileError::TopicMissing(name.to_string()))?;

        if topic.error_code != 0 {
            return Err(ReconcileError::from_code(topic.error_code, name));
        }

        let mut assignments: Vec<PartitionAssignment> = topic
            .partitions
            .iter()
            .map(|p| PartitionAssignment {
                partition: p.partition_index,
                leader: p.leader_id.0,
                replicas: p.replica_nodes.iter().map(|b| b.0).collect(),
            })
            .collect();
        assignments.sort_by_key(|a| a.partition);

        Ok(TopicMetadata {
            name: name.to_string(),
            assignments,
        })
    }

    /// Read the dynamic (topic-source) configuration of a topic.
    ///
    /// Broker defaults are excluded: a freshly created topic with no
    /// overrides reads back as an empty map.
    pub async fn fetch_topic_config(&self, name: &str) -> Result<BTreeMap<String, String>> {
        let mut resource = DescribeConfigsResource::default();
        resource.resource_type = CONFIG_RESOURCE_TOPIC;
        resource.resource_name = StrBytes::from_string(name.to_string());
        resource.configuration_keys = None;

        let mut request = DescribeConfigsRequest::default();
        request.resources = vec![resource];

        let response = self
            .call(ApiKey::DescribeConfigsKey, DESCRIBE_CONFIGS_VERSION, &request)
            .await?;

        let result = single(&response.results, "describe configs")?;
        if result.error_code != 0 {
            return Err(ReconcileError::from_code(result.error_code, name));
        }

        Ok(result
            .configs
            .iter()
            .filter(|c| c.config_source == CONFIG_SOURCE_TOPIC)
            .filter_map(|c| {
                c.value
                    .as_ref()
                    .map(|v| (c.name.to_string(), v.to_string()))
            })
            .collect())
    }

    /// Create a topic with an exact partition count, replication factor, and
    /// initial config map.
    ///
    /// Fails with [`ReconcileError::AlreadyExists`] on a name collision.
    pub async fn create_topic(&self, spec: &TopicSpec) -> Result<()> {
        let mut topic = CreatableTopic::default();
        topic.name = TopicName::from(StrBytes::from_string(spec.name.clone()));
        topic.num_partitions = spec.partitions;
        topic.replication_factor = spec.replication_factor;
        topic.configs = spec
            .config
            .iter()
            .map(|(key, value)| {
                let mut config = CreateableTopicConfig::default();
                config.name = StrBytes::from_string(key.clone());
                config.value = Some(StrBytes::from_string(value.clone()));
                config
            })
            .collect();

        let mut request = CreateTopicsRequest::default();
        request.topics = vec![topic];
        request.timeout_ms = self.config.request_timeout_ms as i32;

        let response = self
            .call(ApiKey::CreateTopicsKey, CREATE_TOPICS_VERSION, &request)
            .await?;

        let result = single(&response.topics, "create topics")?;
        broker_result(result.error_code, &spec.name)
    }

    /// Delete a topic. With `allow_missing`, deleting an absent topic
    /// succeeds and returns `true`.
    pub async fn delete_topic(&self, name: &str, allow_missing: bool) -> Result<bool> {
        let mut request = DeleteTopicsRequest::default();
        request.topic_names = vec![TopicName::from(StrBytes::from_string(name.to_string()))];
        request.timeout_ms = self.config.request_timeout_ms as i32;

        let response = self
            .call(ApiKey::DeleteTopicsKey, DELETE_TOPICS_VERSION, &request)
            .await?;

        let result = single(&response.responses, "delete topics")?;
        if result.error_code == 0 {
            return Ok(false);
        }
        match ReconcileError::from_code(result.error_code, name) {
            ReconcileError::TopicMissing(_) if allow_missing => Ok(true),
            err => Err(err),
        }
    }

    /// Increase a topic's partition count. The broker rejects counts at or
    /// below the current one; the reconciler checks before calling.
    pub async fn create_partitions(&self, name: &str, count: i32) -> Result<()> {
        let mut topic = CreatePartitionsTopic::default();
        topic.name = TopicName::from(StrBytes::from_string(name.to_string()));
        topic.count = count;
        topic.assignments = None;

        let mut request = CreatePartitionsRequest::default();
        request.topics = vec![topic];
        request.timeout_ms = self.config.request_timeout_ms as i32;
        request.validate_only = false;

        let response = self
            .call(ApiKey::CreatePartitionsKey, CREATE_PARTITIONS_VERSION, &request)
            .await?;

        let result = single(&response.results, "create partitions")?;
        broker_result(result.error_code, name)
    }

    /// Apply an incremental config delta: `set` entries are written, `unset`
    /// keys are explicitly reverted to the broker default.
    pub async fn alter_topic_config(
        &self,
        name: &str,
        set: &BTreeMap<String, String>,
        unset: &[String],
    ) -> Result<()> {
        let mut configs = Vec::with_capacity(set.len() + unset.len());
        for (key, value) in set {
            let mut config = AlterableConfig::default();
            config.name = StrBytes::from_string(key.clone());
            config.config_operation = CONFIG_OP_SET;
            config.value = Some(StrBytes::from_string(value.clone()));
            configs.push(config);
        }
        for key in unset {
            let mut config = AlterableConfig::default();
            config.name = StrBytes::from_string(key.clone());
            config.config_operation = CONFIG_OP_DELETE;
            config.value = None;
            configs.push(config);
        }

        let mut resource = AlterConfigsResource::default();
        resource.resource_type = CONFIG_RESOURCE_TOPIC;
        resource.resource_name = StrBytes::from_string(name.to_string());
        resource.configs = configs;

        let mut request = IncrementalAlterConfigsRequest::default();
        request.resources = vec![resource];
        request.validate_only = false;

        let response = self
            .call(
                ApiKey::IncrementalAlterConfigsKey,
                ALTER_CONFIGS_VERSION,
                &request,
            )
            .await?;

        let result = single(&response.responses, "alter configs")?;
        broker_result(result.error_code, name)
    }

    /// List ACL bindings matching `filter`, grouped by resource and
    /// deterministically ordered. A finite snapshot, not a live stream.
    pub async fn describe_acls(&self, filter: &AclFilter) -> Result<Vec<AclGroup>> {
        let mut request = DescribeAclsRequest::default();
        request.resource_type_filter = filter
            .resource_type
            .map(ResourceType::code)
            .unwrap_or(ACL_MATCH_ANY);
        request.resource_name_filter = filter
            .resource_name
            .as_ref()
            .map(|n| StrBytes::from_string(n.clone()));
        request.pattern_type_filter = filter
            .pattern_type
            .map(PatternType::code)
            .unwrap_or(ACL_MATCH_ANY);
        request.principal_filter = None;
        request.host_filter = None;
        request.operation = ACL_MATCH_ANY;
        request.permission_type = ACL_MATCH_ANY;

        let response = self
            .call(ApiKey::DescribeAclsKey, DESCRIBE_ACLS_VERSION, &request)
            .await?;

        if response.error_code != 0 {
            return Err(ReconcileError::from_code(
                response.error_code,
                "describe acls",
            ));
        }

        let mut groups = Vec::with_capacity(response.resources.len());
        for resource in &response.resources {
            let (Some(resource_type), Some(pattern_type)) = (
                ResourceType::from_code(resource.resource_type),
                PatternType::from_code(resource.pattern_type),
            ) else {
                warn!(
                    resource_type = resource.resource_type,
                    pattern_type = resource.pattern_type,
                    resource = %resource.resource_name,
                    "skipping ACL resource with unrecognized codes"
                );
                continue;
            };

            let mut entries = Vec::with_capacity(resource.acls.len());
            for acl in &resource.acls {
                let (Some(operation), Some(permission)) = (
                    crate::model::AclOperation::from_code(acl.operation),
                    crate::model::AclPermission::from_code(acl.permission_type),
                ) else {
                    warn!(
                        operation = acl.operation,
                        permission = acl.permission_type,
                        resource = %resource.resource_name,
                        "skipping ACL entry with unrecognized codes"
                    );
                    continue;
                };
                entries.push(AclEntry {
                    principal: acl.principal.to_string(),
                    host: acl.host.to_string(),
                    operation,
                    permission,
                });
            }
            entries.sort();

            groups.push(AclGroup {
                resource_type,
                resource_name: resource.resource_name.to_string(),
                pattern_type,
                entries,
            });
        }
        groups.sort_by(|a, b| {
            (a.resource_type, &a.resource_name, a.pattern_type).cmp(&(
                b.resource_type,
                &b.resource_name,
                b.pattern_type,
            ))
        });
        Ok(groups)
    }

    /// Create one ACL binding. Bindings are atomic units; there is no
    /// partial update.
    pub async fn create_acl(&self, binding: &AclBinding) -> Result<()> {
        let mut creation = AclCreation::default();
        creation.resource_type = binding.resource_type.code();
        creation.resource_name = StrBytes::from_string(binding.resource_name.clone());
        creation.resource_pattern_type = binding.pattern_type.code();
        creation.principal = StrBytes::from_string(binding.principal.clone());
        creation.host = StrBytes::from_string(binding.host.clone());
        creation.operation = binding.operation.code();
        creation.permission_type = binding.permission.code();

        let mut request = CreateAclsRequest::default();
        request.creations = vec![creation];

        let response = self
            .call(ApiKey::CreateAclsKey, CREATE_ACLS_VERSION, &request)
            .await?;

        let result = single(&response.results, "create acls")?;
        broker_result(result.error_code, &binding.resource_name)
    }

    /// Delete the bindings matching `binding` exactly (full composite key,
    /// never prefix matching). Returns how many bindings were removed.
    pub async fn delete_acls(&self, binding: &AclBinding) -> Result<usize> {
        let mut filter = DeleteAclsFilter::default();
        filter.resource_type_filter = binding.resource_type.code();
        filter.resource_name_filter = Some(StrBytes::from_string(binding.resource_name.clone()));
        filter.pattern_type_filter = binding.pattern_type.code();
        filter.principal_filter = Some(StrBytes::from_string(binding.principal.clone()));
        filter.host_filter = Some(StrBytes::from_string(binding.host.clone()));
        filter.operation = binding.operation.code();
        filter.permission_type = binding.permission.code();

        let mut request = DeleteAclsRequest::default();
        request.filters = vec![filter];

        let response = self
            .call(ApiKey::DeleteAclsKey, DELETE_ACLS_VERSION, &request)
            .await?;

        let result = single(&response.filter_results, "delete acls")?;
        broker_result(result.error_code, &binding.resource_name)?;
        for matched in &result.matching_acls {
            broker_result(matched.error_code, &binding.resource_name)?;
        }
        Ok(result.matching_acls.len())
    }
}

/// Map a per-item broker error code; `0` is success.
fn broker_result(code: i16, what: &str) -> Result<()> {
    if code == 0 {
        Ok(())
    } else {
        Err(ReconcileError::from_code(code, what.to_string()))
    }
}

/// The admin APIs used here are always issued for exactly one resource.
fn single<'a, T>(items: &'a [T], what: &str) -> Result<&'a T> {
    match items {
        [item] => Ok(item),
        other => Err(ReconcileError::protocol(format!(
            "{what} returned {} results, expected exactly one",
            other.len()
        ))),
    }
}

//! Mock Kafka broker for integration testing.
//!
//! A lightweight single-node broker that accepts admin protocol connections,
//! records every request, and serves typed responses from an in-memory
//! cluster state. A configurable visibility lag hides topic creations and
//! deletions from the next N metadata reads, simulating the metadata
//! propagation delay of a real cluster.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use bytes::{BufMut, Bytes, BytesMut};
use kafka_protocol::messages::create_acls_response::AclCreationResult;
use kafka_protocol::messages::create_partitions_response::CreatePartitionsTopicResult;
use kafka_protocol::messages::create_topics_response::CreatableTopicResult;
use kafka_protocol::messages::delete_acls_response::{
    DeleteAclsFilterResult, DeleteAclsMatchingAcl,
};
use kafka_protocol::messages::delete_topics_response::DeletableTopicResult;
use kafka_protocol::messages::describe_acls_response::{AclDescription, DescribeAclsResource};
use kafka_protocol::messages::describe_configs_response::{
    DescribeConfigsResourceResult, DescribeConfigsResult,
};
use kafka_protocol::messages::incremental_alter_configs_response::AlterConfigsResourceResponse;
use kafka_protocol::messages::metadata_response::{
    MetadataResponseBroker, MetadataResponsePartition, MetadataResponseTopic,
};
use kafka_protocol::messages::{
    ApiKey, BrokerId, CreateAclsRequest, CreateAclsResponse, CreatePartitionsRequest,
    CreatePartitionsResponse, CreateTopicsRequest, CreateTopicsResponse, DeleteAclsRequest,
    DeleteAclsResponse, DeleteTopicsRequest, DeleteTopicsResponse, DescribeAclsRequest,
    DescribeAclsResponse, DescribeConfigsRequest, DescribeConfigsResponse,
    IncrementalAlterConfigsRequest, IncrementalAlterConfigsResponse, MetadataRequest,
    MetadataResponse, RequestHeader, ResponseHeader, TopicName,
};
use kafka_protocol::protocol::{Decodable, Encodable, StrBytes};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;

use crate::model::{AclBinding, AclOperation, AclPermission, PatternType, ResourceType};

/// Admin API keys served by the mock broker.
pub mod api_keys {
    pub const METADATA: i16 = 3;
    pub const CREATE_TOPICS: i16 = 19;
    pub const DELETE_TOPICS: i16 = 20;
    pub const DESCRIBE_ACLS: i16 = 29;
    pub const CREATE_ACLS: i16 = 30;
    pub const DELETE_ACLS: i16 = 31;
    pub const DESCRIBE_CONFIGS: i16 = 32;
    pub const CREATE_PARTITIONS: i16 = 37;
    pub const INCREMENTAL_ALTER_CONFIGS: i16 = 44;
}

// Kafka protocol error codes used by the handlers.
const NONE: i16 = 0;
const UNKNOWN_TOPIC_OR_PARTITION: i16 = 3;
const TOPIC_ALREADY_EXISTS: i16 = 36;
const INVALID_PARTITIONS: i16 = 37;
const INVALID_REPLICATION_FACTOR: i16 = 38;
const INVALID_REQUEST: i16 = 42;

/// Wildcard code in ACL filter fields.
const ACL_MATCH_ANY: i8 = 1;
/// Dynamic topic config source.
const CONFIG_SOURCE_TOPIC: i8 = 1;
/// ConfigResource type code for topics.
const CONFIG_RESOURCE_TOPIC: i8 = 2;

/// A recorded admin call.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub api_key: i16,
    pub api_version: i16,
    pub correlation_id: i32,
}

/// A topic held by the mock cluster.
#[derive(Debug, Clone)]
struct MockTopic {
    partitions: i32,
    replication_factor: i16,
    configs: BTreeMap<String, String>,
    /// Metadata reads remaining before a fresh creation becomes visible.
    hidden_for: u32,
    /// Set when deleted; the topic stays visible for `linger_for` reads.
    deleted: bool,
    linger_for: u32,
}

impl MockTopic {
    fn visible(&self) -> bool {
        if self.deleted {
            self.linger_for > 0
        } else {
            self.hidden_for == 0
        }
    }
}

/// In-memory cluster state.
#[derive(Debug, Default)]
struct ClusterState {
    topics: BTreeMap<String, MockTopic>,
    acls: Vec<AclBinding>,
    /// Lag applied to newly created and deleted topics.
    visibility_lag: u32,
}

impl ClusterState {
    /// Advance propagation by one metadata read: count down creation
    /// visibility and deletion linger, dropping fully deleted topics.
    fn tick(&mut self) {
        for topic in self.topics.values_mut() {
            if topic.deleted {
                topic.linger_for = topic.linger_for.saturating_sub(1);
            } else {
                topic.hidden_for = topic.hidden_for.saturating_sub(1);
            }
        }
        self.topics.retain(|_, t| !(t.deleted && t.linger_for == 0));
    }

    fn visible_topic(&self, name: &str) -> Option<&MockTopic> {
        self.topics.get(name).filter(|t| t.visible())
    }
}

/// Mock Kafka broker.
pub struct MockBroker {
    address: String,
    state: Arc<Mutex<ClusterState>>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    shutdown_tx: Option<broadcast::Sender<()>>,
}

impl MockBroker {
    /// Bind and start serving. Pass `127.0.0.1:0` for an ephemeral port;
    /// the bound address is available from [`MockBroker::address`].
    pub async fn start(bind: &str) -> std::io::Result<Self> {
        let listener = TcpListener::bind(bind).await?;
        let address = listener.local_addr()?.to_string();

        let state = Arc::new(Mutex::new(ClusterState::default()));
        let calls = Arc::new(Mutex::new(Vec::new()));
        let (shutdown_tx, _) = broadcast::channel::<()>(1);

        let accept_state = Arc::clone(&state);
        let accept_calls = Arc::clone(&calls);
        let accept_shutdown = shutdown_tx.clone();
        let mut shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    result = listener.accept() => {
                        match result {
                            Ok((stream, _addr)) => {
                                let state = Arc::clone(&accept_state);
                                let calls = Arc::clone(&accept_calls);
                                let shutdown_rx = accept_shutdown.subscribe();
                                tokio::spawn(async move {
                                    handle_connection(stream, state, calls, shutdown_rx).await;
                                });
                            }
                            Err(_) => break,
                        }
                    }
                }
            }
        });

        Ok(Self {
            address,
            state,
            calls,
            shutdown_tx: Some(shutdown_tx),
        })
    }

    /// Stop accepting connections.
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }

    /// The bound address.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Hide topic creations and deletions from the next `lag` metadata
    /// reads.
    pub fn set_visibility_lag(&self, lag: u32) {
        self.state.lock().expect("state lock").visibility_lag = lag;
    }

    /// Seed a topic directly, bypassing the protocol (always immediately
    /// visible).
    pub fn seed_topic(
        &self,
        name: &str,
        partitions: i32,
        replication_factor: i16,
        configs: BTreeMap<String, String>,
    ) {
        self.state.lock().expect("state lock").topics.insert(
            name.to_string(),
            MockTopic {
                partitions,
                replication_factor,
                configs,
                hidden_for: 0,
                deleted: false,
                linger_for: 0,
            },
        );
    }

    /// Whether the topic currently exists (visible or not).
    #[must_use]
    pub fn topic_exists(&self, name: &str) -> bool {
        let state = self.state.lock().expect("state lock");
        state.topics.get(name).is_some_and(|t| !t.deleted)
    }

    /// The raw config map of a topic, if it exists.
    #[must_use]
    pub fn topic_config(&self, name: &str) -> Option<BTreeMap<String, String>> {
        let state = self.state.lock().expect("state lock");
        state.topics.get(name).map(|t| t.configs.clone())
    }

    /// All ACL bindings currently held.
    #[must_use]
    pub fn bindings(&self) -> Vec<AclBinding> {
        self.state.lock().expect("state lock").acls.clone()
    }

    /// All recorded calls.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().expect("call log lock").clone()
    }

    /// Number of recorded calls for one API key.
    #[must_use]
    pub fn call_count(&self, api_key: i16) -> usize {
        self.calls
            .lock()
            .expect("call log lock")
            .iter()
            .filter(|c| c.api_key == api_key)
            .count()
    }

    /// Clear the call log.
    pub fn clear_calls(&self) {
        self.calls.lock().expect("call log lock").clear();
    }
}

impl Drop for MockBroker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Serve one client connection until it closes or sends something the mock
/// does not understand.
async fn handle_connection(
    mut stream: TcpStream,
    state: Arc<Mutex<ClusterState>>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        let frame = tokio::select! {
            _ = shutdown_rx.recv() => break,
            result = read_frame(&mut stream) => match result {
                Ok(Some(frame)) => frame,
                Ok(None) | Err(_) => break,
            },
        };

        if frame.len() < 4 {
            break;
        }
        let api_key = i16::from_be_bytes([frame[0], frame[1]]);
        let api_version = i16::from_be_bytes([frame[2], frame[3]]);
        let Ok(key) = ApiKey::try_from(api_key) else {
            break;
        };

        let mut bytes = Bytes::from(frame);
        let Ok(header) =
            RequestHeader::decode(&mut bytes, crate::admin::REQUEST_HEADER_VERSION)
        else {
            break;
        };

        calls.lock().expect("call log lock").push(RecordedCall {
            api_key,
            api_version,
            correlation_id: header.correlation_id,
        });

        let mut out = BytesMut::new();
        let mut response_header = ResponseHeader::default();
        response_header.correlation_id = header.correlation_id;
        if response_header
            .encode(&mut out, crate::admin::RESPONSE_HEADER_VERSION)
            .is_err()
        {
            break;
        }

        let encoded = dispatch(key, api_version, &mut bytes, &state, &mut out);
        if encoded.is_err() || write_frame(&mut stream, &out).await.is_err() {
            break;
        }
    }
}

/// Decode the request body, mutate cluster state, and encode the response
/// body into `out`.
fn dispatch(
    key: ApiKey,
    version: i16,
    bytes: &mut Bytes,
    state: &Arc<Mutex<ClusterState>>,
    out: &mut BytesMut,
) -> Result<(), ()> {
    let mut state = state.lock().expect("state lock");
    match key {
        ApiKey::MetadataKey => {
            let req = MetadataRequest::decode(bytes, version).map_err(|_| ())?;
            handle_metadata(&mut state, &req)
                .encode(out, version)
                .map_err(|_| ())
        }
        ApiKey::CreateTopicsKey => {
            let req = CreateTopicsRequest::decode(bytes, version).map_err(|_| ())?;
            handle_create_topics(&mut state, &req)
                .encode(out, version)
                .map_err(|_| ())
        }
        ApiKey::DeleteTopicsKey => {
            let req = DeleteTopicsRequest::decode(bytes, version).map_err(|_| ())?;
            handle_delete_topics(&mut state, &req)
                .encode(out, version)
                .map_err(|_| ())
        }
        ApiKey::DescribeConfigsKey => {
            let req = DescribeConfigsRequest::decode(bytes, version).map_err(|_| ())?;
            handle_describe_configs(&state, &req)
                .encode(out, version)
                .map_err(|_| ())
        }
        ApiKey::IncrementalAlterConfigsKey => {
            let req = IncrementalAlterConfigsRequest::decode(bytes, version).map_err(|_| ())?;
            handle_alter_configs(&mut state, &req)
                .encode(out, version)
                .map_err(|_| ())
        }
        ApiKey::CreatePartitionsKey => {
            let req = CreatePartitionsRequest::decode(bytes, version).map_err(|_| ())?;
            handle_create_partitions(&mut state, &req)
                .encode(out, version)
                .map_err(|_| ())
        }
        ApiKey::DescribeAclsKey => {
            let req = DescribeAclsRequest::decode(bytes, version).map_err(|_| ())?;
            handle_describe_acls(&state, &req)
                .encode(out, version)
                .map_err(|_| ())
        }
        ApiKey::CreateAclsKey => {
            let req = CreateAclsRequest::decode(bytes, version).map_err(|_| ())?;
            handle_create_acls(&mut state, &req)
                .encode(out, version)
                .map_err(|_| ())
        }
        ApiKey::DeleteAclsKey => {
            let req = DeleteAclsRequest::decode(bytes, version).map_err(|_| ())?;
            handle_delete_acls(&mut state, &req)
                .encode(out, version)
                .map_err(|_| ())
        }
        _ => Err(()),
    }
}

fn topic_name(name: &str) -> TopicName {
    TopicName::from(StrBytes::from_string(name.to_string()))
}

fn handle_metadata(state: &mut ClusterState, req: &MetadataRequest) -> MetadataResponse {
    let mut response = MetadataResponse::default();
    let mut broker = MetadataResponseBroker::default();
    broker.node_id = BrokerId(1);
    broker.host = StrBytes::from_static_str("127.0.0.1");
    broker.port = 0;
    response.brokers.push(broker);
    response.controller_id = BrokerId(1);

    let topic_entry = |name: &str, topic: Option<&MockTopic>| {
        let mut entry = MetadataResponseTopic::default();
        entry.name = Some(topic_name(name));
        match topic {
            Some(mock) => {
                for index in 0..mock.partitions {
                    let mut partition = MetadataResponsePartition::default();
                    partition.partition_index = index;
                    partition.leader_id = BrokerId(1);
                    partition.replica_nodes =
                        (1..=i32::from(mock.replication_factor)).map(BrokerId).collect();
                    partition.isr_nodes = partition.replica_nodes.clone();
                    entry.partitions.push(partition);
                }
            }
            None => entry.error_code = UNKNOWN_TOPIC_OR_PARTITION,
        }
        entry
    };

    match &req.topics {
        Some(requested) if !requested.is_empty() => {
            for topic in requested {
                let Some(name) = topic.name.as_ref() else {
                    continue;
                };
                let name = name.to_string();
                response
                    .topics
                    .push(topic_entry(&name, state.visible_topic(&name)));
            }
        }
        _ => {
            for (name, topic) in &state.topics {
                if topic.visible() {
                    response.topics.push(topic_entry(name, Some(topic)));
                }
            }
        }
    }

    // Propagation advances after the read: a lag of N hides a write from
    // exactly the next N metadata reads.
    state.tick();
    response
}

fn handle_create_topics(
    state: &mut ClusterState,
    req: &CreateTopicsRequest,
) -> CreateTopicsResponse {
    let mut response = CreateTopicsResponse::default();
    for topic in &req.topics {
        let name = topic.name.to_string();
        let mut result = CreatableTopicResult::default();
        result.name = topic_name(&name);
        result.error_code = if state.topics.contains_key(&name) {
            TOPIC_ALREADY_EXISTS
        } else if topic.num_partitions < 1 {
            INVALID_PARTITIONS
        } else if topic.replication_factor < 1 || topic.replication_factor > 1 {
            // Single-node cluster: a replication factor above the broker
            // count is rejected like a real broker would.
            INVALID_REPLICATION_FACTOR
        } else {
            let configs = topic
                .configs
                .iter()
                .filter_map(|c| {
                    c.value
                        .as_ref()
                        .map(|v| (c.name.to_string(), v.to_string()))
                })
                .collect();
            let lag = state.visibility_lag;
            state.topics.insert(
                name.clone(),
                MockTopic {
                    partitions: topic.num_partitions,
                    replication_factor: topic.replication_factor,
                    configs,
                    hidden_for: lag,
                    deleted: false,
                    linger_for: 0,
                },
            );
            NONE
        };
        response.topics.push(result);
    }
    response
}

fn handle_delete_topics(
    state: &mut ClusterState,
    req: &DeleteTopicsRequest,
) -> DeleteTopicsResponse {
    let mut response = DeleteTopicsResponse::default();
    for name in &req.topic_names {
        let name = name.to_string();
        let mut result = DeletableTopicResult::default();
        result.name = Some(topic_name(&name));
        let lag = state.visibility_lag;
        match state.topics.get_mut(&name).filter(|t| t.visible()) {
            Some(topic) => {
                topic.deleted = true;
                topic.linger_for = lag;
                result.error_code = NONE;
            }
            None => result.error_code = UNKNOWN_TOPIC_OR_PARTITION,
        }
        response.responses.push(result);
    }
    state.topics.retain(|_, t| !(t.deleted && t.linger_for == 0));
    response
}

fn handle_describe_configs(
    state: &ClusterState,
    req: &DescribeConfigsRequest,
) -> DescribeConfigsResponse {
    let mut response = DescribeConfigsResponse::default();
    for resource in &req.resources {
        let mut result = DescribeConfigsResult::default();
        result.resource_type = resource.resource_type;
        result.resource_name = resource.resource_name.clone();

        if resource.resource_type != CONFIG_RESOURCE_TOPIC {
            result.error_code = INVALID_REQUEST;
        } else {
            match state.visible_topic(&resource.resource_name.to_string()) {
                Some(topic) => {
                    for (key, value) in &topic.configs {
                        let mut entry = DescribeConfigsResourceResult::default();
                        entry.name = StrBytes::from_string(key.clone());
                        entry.value = Some(StrBytes::from_string(value.clone()));
                        entry.config_source = CONFIG_SOURCE_TOPIC;
                        result.configs.push(entry);
                    }
                }
                None => result.error_code = UNKNOWN_TOPIC_OR_PARTITION,
            }
        }
        response.results.push(result);
    }
    response
}

fn handle_alter_configs(
    state: &mut ClusterState,
    req: &IncrementalAlterConfigsRequest,
) -> IncrementalAlterConfigsResponse {
    const OP_SET: i8 = 0;
    const OP_DELETE: i8 = 1;

    let mut response = IncrementalAlterConfigsResponse::default();
    for resource in &req.resources {
        let mut result = AlterConfigsResourceResponse::default();
        result.resource_type = resource.resource_type;
        result.resource_name = resource.resource_name.clone();

        result.error_code = if resource.resource_type != CONFIG_RESOURCE_TOPIC {
            INVALID_REQUEST
        } else {
            let name = resource.resource_name.to_string();
            match state.topics.get_mut(&name).filter(|t| t.visible()) {
                Some(topic) => {
                    let mut code = NONE;
                    for config in &resource.configs {
                        match (config.config_operation, &config.value) {
                            (OP_SET, Some(value)) => {
                                topic
                                    .configs
                                    .insert(config.name.to_string(), value.to_string());
                            }
                            (OP_DELETE, _) => {
                                topic.configs.remove(&config.name.to_string());
                            }
                            _ => code = INVALID_REQUEST,
                        }
                    }
                    code
                }
                None => UNKNOWN_TOPIC_OR_PARTITION,
            }
        };
        response.responses.push(result);
    }
    response
}

fn handle_create_partitions(
    state: &mut ClusterState,
    req: &CreatePartitionsRequest,
) -> CreatePartitionsResponse {
    let mut response = CreatePartitionsResponse::default();
    for topic in &req.topics {
        let name = topic.name.to_string();
        let mut result = CreatePartitionsTopicResult::default();
        result.name = topic_name(&name);
        result.error_code = match state.topics.get_mut(&name).filter(|t| t.visible()) {
            Some(mock) if topic.count <= mock.partitions => INVALID_PARTITIONS,
            Some(mock) => {
                mock.partitions = topic.count;
                NONE
            }
            None => UNKNOWN_TOPIC_OR_PARTITION,
        };
        response.results.push(result);
    }
    response
}

/// Filter-code match: `ANY` matches everything, otherwise exact.
fn code_matches(filter: i8, code: i8) -> bool {
    filter == ACL_MATCH_ANY || filter == code
}

/// Filter-string match: absent filters match everything.
fn name_matches(filter: Option<&StrBytes>, value: &str) -> bool {
    filter.is_none_or(|f| f.to_string() == value)
}

fn binding_matches(
    binding: &AclBinding,
    resource_type: i8,
    resource_name: Option<&StrBytes>,
    pattern_type: i8,
    principal: Option<&StrBytes>,
    host: Option<&StrBytes>,
    operation: i8,
    permission: i8,
) -> bool {
    code_matches(resource_type, binding.resource_type.code())
        && name_matches(resource_name, &binding.resource_name)
        && code_matches(pattern_type, binding.pattern_type.code())
        && name_matches(principal, &binding.principal)
        && name_matches(host, &binding.host)
        && code_matches(operation, binding.operation.code())
        && code_matches(permission, binding.permission.code())
}

fn handle_describe_acls(state: &ClusterState, req: &DescribeAclsRequest) -> DescribeAclsResponse {
    let mut grouped: BTreeMap<(i8, String, i8), Vec<&AclBinding>> = BTreeMap::new();
    for binding in &state.acls {
        if binding_matches(
            binding,
            req.resource_type_filter,
            req.resource_name_filter.as_ref(),
            req.pattern_type_filter,
            req.principal_filter.as_ref(),
            req.host_filter.as_ref(),
            req.operation,
            req.permission_type,
        ) {
            grouped
                .entry((
                    binding.resource_type.code(),
                    binding.resource_name.clone(),
                    binding.pattern_type.code(),
                ))
                .or_default()
                .push(binding);
        }
    }

    let mut response = DescribeAclsResponse::default();
    for ((resource_type, resource_name, pattern_type), bindings) in grouped {
        let mut resource = DescribeAclsResource::default();
        resource.resource_type = resource_type;
        resource.resource_name = StrBytes::from_string(resource_name);
        resource.pattern_type = pattern_type;
        for binding in bindings {
            let mut acl = AclDescription::default();
            acl.principal = StrBytes::from_string(binding.principal.clone());
            acl.host = StrBytes::from_string(binding.host.clone());
            acl.operation = binding.operation.code();
            acl.permission_type = binding.permission.code();
            resource.acls.push(acl);
        }
        response.resources.push(resource);
    }
    response
}

fn handle_create_acls(state: &mut ClusterState, req: &CreateAclsRequest) -> CreateAclsResponse {
    let mut response = CreateAclsResponse::default();
    for creation in &req.creations {
        let mut result = AclCreationResult::default();
        let decoded = (
            ResourceType::from_code(creation.resource_type),
            PatternType::from_code(creation.resource_pattern_type),
            AclOperation::from_code(creation.operation),
            AclPermission::from_code(creation.permission_type),
        );
        result.error_code = match decoded {
            (Some(resource_type), Some(pattern_type), Some(operation), Some(permission)) => {
                let binding = AclBinding {
                    resource_type,
                    resource_name: creation.resource_name.to_string(),
                    pattern_type,
                    principal: creation.principal.to_string(),
                    host: creation.host.to_string(),
                    operation,
                    permission,
                };
                if !state.acls.contains(&binding) {
                    state.acls.push(binding);
                }
                NONE
            }
            _ => INVALID_REQUEST,
        };
        response.results.push(result);
    }
    response
}

fn handle_delete_acls(state: &mut ClusterState, req: &DeleteAclsRequest) -> DeleteAclsResponse {
    let mut response = DeleteAclsResponse::default();
    for filter in &req.filters {
        let (matched, kept): (Vec<AclBinding>, Vec<AclBinding>) =
            state.acls.drain(..).partition(|binding| {
                binding_matches(
                    binding,
                    filter.resource_type_filter,
                    filter.resource_name_filter.as_ref(),
                    filter.pattern_type_filter,
                    filter.principal_filter.as_ref(),
                    filter.host_filter.as_ref(),
                    filter.operation,
                    filter.permission_type,
                )
            });
        state.acls = kept;

        let mut result = DeleteAclsFilterResult::default();
        for binding in matched {
            let mut acl = DeleteAclsMatchingAcl::default();
            acl.resource_type = binding.resource_type.code();
            acl.resource_name = StrBytes::from_string(binding.resource_name);
            acl.pattern_type = binding.pattern_type.code();
            acl.principal = StrBytes::from_string(binding.principal);
            acl.host = StrBytes::from_string(binding.host);
            acl.operation = binding.operation.code();
            acl.permission_type = binding.permission.code();
            result.matching_acls.push(acl);
        }
        response.filter_results.push(result);
    }
    response
}

/// Read one length-prefixed frame.
async fn read_frame(stream: &mut TcpStream) -> std::io::Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match stream.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).await?;
    Ok(Some(buf))
}

/// Write one length-prefixed frame.
async fn write_frame(stream: &mut TcpStream, data: &[u8]) -> std::io::Result<()> {
    let mut buf = BytesMut::with_capacity(4 + data.len());
    buf.put_u32(data.len() as u32);
    buf.extend_from_slice(data);
    stream.write_all(&buf).await?;
    stream.flush().await
}

//! Domain model: topic specifications, observed topic state, ACL bindings.
//!
//! The enums carry the Kafka protocol `i8` wire codes. Their serde string
//! forms ("Topic", "Literal", "Allow", ...) match the vocabulary used by
//! declarative resource managers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Declared desired state for a topic.
///
/// The config map is declarative and total: a key absent from `config` means
/// "unset on the broker", not "leave whatever is there".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicSpec {
    /// Topic name. Unique within a cluster, immutable after creation.
    pub name: String,
    /// Partition count. Monotonically non-decreasing; Kafka cannot shrink.
    pub partitions: i32,
    /// Replication factor. Immutable after creation.
    pub replication_factor: i16,
    /// Topic-level configuration overrides.
    #[serde(default)]
    pub config: BTreeMap<String, String>,
}

/// Observed state of a topic, produced by a fresh read.
///
/// Never cached across reconciliation cycles: every diff starts from a new
/// round trip to the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicState {
    /// Topic name.
    pub name: String,
    /// Current partition count.
    pub partitions: i32,
    /// Replication factor, derived from the replica assignment.
    pub replication_factor: i16,
    /// Dynamic topic-level configuration (broker defaults excluded).
    pub config: BTreeMap<String, String>,
    /// Replica assignment per partition.
    pub assignments: Vec<PartitionAssignment>,
}

/// Replica placement of a single partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionAssignment {
    /// Partition index.
    pub partition: i32,
    /// Leader broker id.
    pub leader: i32,
    /// Broker ids holding replicas, leader included.
    pub replicas: Vec<i32>,
}

/// The kind of resource an ACL binding applies to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum ResourceType {
    Topic,
    Group,
    Cluster,
    TransactionalId,
}

impl ResourceType {
    /// Kafka protocol wire code.
    #[must_use]
    pub fn code(self) -> i8 {
        match self {
            Self::Topic => 2,
            Self::Group => 3,
            Self::Cluster => 4,
            Self::TransactionalId => 5,
        }
    }

    /// Decode a wire code.
    #[must_use]
    pub fn from_code(code: i8) -> Option<Self> {
        match code {
            2 => Some(Self::Topic),
            3 => Some(Self::Group),
            4 => Some(Self::Cluster),
            5 => Some(Self::TransactionalId),
            _ => None,
        }
    }
}

/// How a binding's resource name matches resources.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum PatternType {
    /// Exact name match.
    Literal,
    /// Prefix match.
    Prefixed,
}

impl PatternType {
    /// Kafka protocol wire code.
    #[must_use]
    pub fn code(self) -> i8 {
        match self {
            Self::Literal => 3,
            Self::Prefixed => 4,
        }
    }

    /// Decode a wire code.
    #[must_use]
    pub fn from_code(code: i8) -> Option<Self> {
        match code {
            3 => Some(Self::Literal),
            4 => Some(Self::Prefixed),
            _ => None,
        }
    }
}

/// The operation a binding authorizes or denies.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum AclOperation {
    All,
    Read,
    Write,
    Create,
    Delete,
    Alter,
    Describe,
    ClusterAction,
    DescribeConfigs,
    AlterConfigs,
    IdempotentWrite,
}

impl AclOperation {
    /// Kafka protocol wire code.
    #[must_use]
    pub fn code(self) -> i8 {
        match self {
            Self::All => 2,
            Self::Read => 3,
            Self::Write => 4,
            Self::Create => 5,
            Self::Delete => 6,
            Self::Alter => 7,
            Self::Describe => 8,
            Self::ClusterAction => 9,
            Self::DescribeConfigs => 10,
            Self::AlterConfigs => 11,
            Self::IdempotentWrite => 12,
        }
    }

    /// Decode a wire code.
    #[must_use]
    pub fn from_code(code: i8) -> Option<Self> {
        match code {
            2 => Some(Self::All),
            3 => Some(Self::Read),
            4 => Some(Self::Write),
            5 => Some(Self::Create),
            6 => Some(Self::Delete),
            7 => Some(Self::Alter),
            8 => Some(Self::Describe),
            9 => Some(Self::ClusterAction),
            10 => Some(Self::DescribeConfigs),
            11 => Some(Self::AlterConfigs),
            12 => Some(Self::IdempotentWrite),
            _ => None,
        }
    }
}

/// Whether a binding allows or denies the operation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum AclPermission {
    Deny,
    Allow,
}

impl AclPermission {
    /// Kafka protocol wire code.
    #[must_use]
    pub fn code(self) -> i8 {
        match self {
            Self::Deny => 2,
            Self::Allow => 3,
        }
    }

    /// Decode a wire code.
    #[must_use]
    pub fn from_code(code: i8) -> Option<Self> {
        match code {
            2 => Some(Self::Deny),
            3 => Some(Self::Allow),
            _ => None,
        }
    }
}

/// An access-control binding.
///
/// The full struct is the composite key; bindings are immutable. A "change"
/// to a binding is modeled as delete-old + create-new, because the broker
/// ACL model has no update verb.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct AclBinding {
    pub resource_type: ResourceType,
    pub resource_name: String,
    pub pattern_type: PatternType,
    pub principal: String,
    pub host: String,
    pub operation: AclOperation,
    pub permission: AclPermission,
}

/// A resource together with the ACL entries bound to it; the shape an ACL
/// listing returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AclGroup {
    pub resource_type: ResourceType,
    pub resource_name: String,
    pub pattern_type: PatternType,
    pub entries: Vec<AclEntry>,
}

/// One (principal, host, operation, permission) entry within an [`AclGroup`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct AclEntry {
    pub principal: String,
    pub host: String,
    pub operation: AclOperation,
    pub permission: AclPermission,
}

impl AclGroup {
    /// Flatten the group back into full bindings.
    #[must_use]
    pub fn bindings(&self) -> Vec<AclBinding> {
        self.entries
            .iter()
            .map(|e| AclBinding {
                resource_type: self.resource_type,
                resource_name: self.resource_name.clone(),
                pattern_type: self.pattern_type,
                principal: e.principal.clone(),
                host: e.host.clone(),
                operation: e.operation,
                permission: e.permission,
            })
            .collect()
    }
}

/// Planned topic changes: the exact RPC-level delta an apply will issue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicDelta {
    /// Config keys to set (new keys and changed values).
    pub config_set: BTreeMap<String, String>,
    /// Config keys to explicitly unset (present on the broker, absent from
    /// the desired map).
    pub config_delete: Vec<String>,
    /// New partition count, when an increase is required.
    pub partition_increase: Option<i32>,
}

impl TopicDelta {
    /// True when applying this delta would issue no RPCs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.config_set.is_empty()
            && self.config_delete.is_empty()
            && self.partition_increase.is_none()
    }
}

/// Planned ACL changes: bindings to create and bindings to delete.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AclDelta {
    pub to_create: Vec<AclBinding>,
    pub to_delete: Vec<AclBinding>,
}

impl AclDelta {
    /// True when applying this delta would issue no RPCs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_create.is_empty() && self.to_delete.is_empty()
    }
}

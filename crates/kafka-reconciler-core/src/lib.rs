//! Kafka Cluster Reconciler Core Library
//!
//! This library reconciles a declared desired state for Kafka cluster
//! resources (topics and ACL bindings) against the live, eventually-consistent
//! state of a running cluster, issuing idempotent create/update/delete
//! operations until the two converge.
//!
//! # Architecture
//!
//! - [`config`] - Cluster connection and retry-budget configuration
//! - [`error`] - Domain error types and the broker error-code classifier
//! - [`model`] - Topic specs, observed topic state, ACL bindings and deltas
//! - [`admin`] - The broker admin client (shared connection, typed RPCs)
//! - [`retry`] - Bounded retry/backoff for eventually-consistent reads
//! - [`reconcile`] - Topic and ACL reconcilers (diff and apply)
//! - [`tls`] - TLS connector for broker connections
//!
//! # Example
//!
//! ```rust,ignore
//! use kafka_reconciler_core::admin::AdminClient;
//! use kafka_reconciler_core::config::ClusterConfig;
//! use kafka_reconciler_core::reconcile::TopicReconciler;
//!
//! let client = Arc::new(AdminClient::new(config)?);
//! let topics = TopicReconciler::new(client, Retry::default());
//! let observed = topics.apply(&desired_topic).await?;
//! ```

#![forbid(unsafe_code)]

pub mod admin;
pub mod config;
pub mod error;
pub mod model;
pub mod reconcile;
pub mod retry;
pub mod tls;

/// Test utilities: an in-memory mock broker and a reconciler test harness.
///
/// Only available when compiling tests or when the `testing` feature is enabled.
#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export commonly used types
pub use admin::AdminClient;
pub use config::{ClusterConfig, RetryConfig, SecurityProtocol, TlsConfig};
pub use error::{ErrorClass, ReconcileError, Result};
pub use model::{AclBinding, AclDelta, AclGroup, TopicDelta, TopicSpec, TopicState};
pub use reconcile::{AclReconciler, TopicReconciler};
pub use retry::Retry;

//! Domain error types for the cluster reconciler.
//!
//! Uses `thiserror` for ergonomic error definitions. Broker error codes are
//! folded into a closed taxonomy so the retry layer can branch on an
//! enumerated class instead of inspecting error identity.

use kafka_protocol::error::ResponseError;
use thiserror::Error;

/// Broad classification of a failure, consumed by the retry layer.
///
/// - `NotFound`: the resource is absent. Expected in destroy verification,
///   never retried.
/// - `Transient`: propagation delay, throttling, leader movement. Eligible
///   for bounded retry.
/// - `Fatal`: authorization failures, invalid requests. Surfaced immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    NotFound,
    Transient,
    Fatal,
}

/// Classify a Kafka protocol error code.
///
/// Code `0` (no error) classifies as `Fatal` because reaching this function
/// with a success code is itself a bug in the caller.
#[must_use]
pub fn classify_code(code: i16) -> ErrorClass {
    use ResponseError::*;
    match ResponseError::try_from_code(code) {
        Some(UnknownTopicOrPartition) => ErrorClass::NotFound,
        Some(
            LeaderNotAvailable
            | NotLeaderOrFollower
            | NotController
            | BrokerNotAvailable
            | ReplicaNotAvailable
            | NetworkException
            | RequestTimedOut
            | CoordinatorLoadInProgress
            | CoordinatorNotAvailable
            | NotEnoughReplicas
            | NotEnoughReplicasAfterAppend
            | ThrottlingQuotaExceeded,
        ) => ErrorClass::Transient,
        _ => ErrorClass::Fatal,
    }
}

/// Errors produced by the reconciliation core.
#[derive(Error, Debug)]
pub enum ReconcileError {
    /// The topic does not exist. A legitimate outcome for existence checks
    /// and destroy verification, distinguished from all other read failures.
    #[error("topic not found: {0}")]
    TopicMissing(String),

    /// A non-topic resource (e.g. an ACL binding) does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Create collision: the resource already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The request violates a cluster invariant (e.g. partition shrink,
    /// replication factor change).
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Transport failure. The connection slot is invalidated and redialed
    /// on the next call; callers see this only when the dial itself fails.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// No bootstrap server could be reached.
    #[error("no brokers reachable")]
    NoBrokersReachable,

    /// A write was acknowledged but did not become observable within the
    /// retry budget.
    #[error("{operation} not observable after {attempts} attempts")]
    ConsistencyTimeout { operation: String, attempts: u32 },

    /// Broker rejection that must never be retried (authorization failure,
    /// malformed request, invalid configuration).
    #[error("fatal broker error (code {code}): {message}")]
    FatalBroker { code: i16, message: String },

    /// Broker rejection eligible for retry (throttling, leader movement,
    /// controller unavailability).
    #[error("transient broker error (code {code}): {message}")]
    TransientBroker { code: i16, message: String },

    /// Failed to encode a request or decode a response.
    #[error("protocol error: {message}")]
    Protocol { message: String },

    /// TLS configuration or handshake failure.
    #[error("tls error: {0}")]
    Tls(#[from] TlsError),
}

impl ReconcileError {
    /// The classification the retry layer branches on.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::TopicMissing(_) | Self::NotFound(_) => ErrorClass::NotFound,
            Self::Connection(_) | Self::NoBrokersReachable | Self::TransientBroker { .. } => {
                ErrorClass::Transient
            }
            _ => ErrorClass::Fatal,
        }
    }

    /// Map a broker error code into the taxonomy.
    ///
    /// `what` names the resource or operation for the error message.
    pub(crate) fn from_code(code: i16, what: impl Into<String>) -> Self {
        let what = what.into();
        match ResponseError::try_from_code(code) {
            Some(ResponseError::UnknownTopicOrPartition) => Self::TopicMissing(what),
            Some(ResponseError::TopicAlreadyExists) => Self::AlreadyExists(what),
            Some(ResponseError::InvalidPartitions | ResponseError::InvalidReplicationFactor) => {
                Self::InvalidOperation(what)
            }
            other => {
                let message = match other {
                    Some(err) => format!("{err:?}: {what}"),
                    None => what,
                };
                match classify_code(code) {
                    ErrorClass::Transient => Self::TransientBroker { code, message },
                    _ => Self::FatalBroker { code, message },
                }
            }
        }
    }

    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }
}

/// Errors related to configuration parsing and validation.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read a configuration file.
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse YAML configuration.
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// Invalid address format.
    #[error("invalid address: {0} (expected 'host:port')")]
    InvalidAddress(String),

    /// A semantic validation failure.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Errors from the TLS layer.
#[derive(Error, Debug)]
pub enum TlsError {
    /// Failed to load a certificate file.
    #[error("failed to load certificates from '{path}': {message}")]
    CertificateLoad { path: String, message: String },

    /// Failed to load a private key file.
    #[error("failed to load private key from '{path}': {message}")]
    PrivateKeyLoad { path: String, message: String },

    /// A PEM file contained no certificates.
    #[error("no certificates found in '{0}'")]
    NoCertificates(String),

    /// A PEM file contained no private keys.
    #[error("no private key found in '{0}'")]
    NoPrivateKeys(String),

    /// Invalid TLS configuration.
    #[error("tls configuration error: {0}")]
    Config(String),

    /// TLS handshake failure.
    #[error("tls handshake failed: {0}")]
    Handshake(String),
}

/// Result type alias for reconciliation operations.
pub type Result<T> = std::result::Result<T, ReconcileError>;

/// Result type alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for TLS operations.
pub type TlsResult<T> = std::result::Result<T, TlsError>;

#[cfg(test)]
mod tests {
    use super::*;

    // Wire codes from the Kafka protocol error table.
    const UNKNOWN_TOPIC_OR_PARTITION: i16 = 3;
    const LEADER_NOT_AVAILABLE: i16 = 5;
    const TOPIC_AUTHORIZATION_FAILED: i16 = 29;
    const TOPIC_ALREADY_EXISTS: i16 = 36;
    const INVALID_PARTITIONS: i16 = 37;
    const NOT_CONTROLLER: i16 = 41;
    const THROTTLING_QUOTA_EXCEEDED: i16 = 89;

    #[test]
    fn test_classify_not_found() {
        assert_eq!(
            classify_code(UNKNOWN_TOPIC_OR_PARTITION),
            ErrorClass::NotFound
        );
    }

    #[test]
    fn test_classify_transient() {
        assert_eq!(classify_code(LEADER_NOT_AVAILABLE), ErrorClass::Transient);
        assert_eq!(classify_code(NOT_CONTROLLER), ErrorClass::Transient);
        assert_eq!(
            classify_code(THROTTLING_QUOTA_EXCEEDED),
            ErrorClass::Transient
        );
    }

    #[test]
    fn test_classify_fatal() {
        assert_eq!(
            classify_code(TOPIC_AUTHORIZATION_FAILED),
            ErrorClass::Fatal
        );
        // An unknown/unmapped code must never be retried.
        assert_eq!(classify_code(9999), ErrorClass::Fatal);
    }

    #[test]
    fn test_from_code_special_cases() {
        let err = ReconcileError::from_code(UNKNOWN_TOPIC_OR_PARTITION, "syslog");
        assert!(matches!(err, ReconcileError::TopicMissing(_)));

        let err = ReconcileError::from_code(TOPIC_ALREADY_EXISTS, "syslog");
        assert!(matches!(err, ReconcileError::AlreadyExists(_)));

        let err = ReconcileError::from_code(INVALID_PARTITIONS, "syslog");
        assert!(matches!(err, ReconcileError::InvalidOperation(_)));
    }

    #[test]
    fn test_from_code_classifies_remainder() {
        let err = ReconcileError::from_code(NOT_CONTROLLER, "create syslog");
        assert!(matches!(err, ReconcileError::TransientBroker { code: 41, .. }));
        assert_eq!(err.class(), ErrorClass::Transient);

        let err = ReconcileError::from_code(TOPIC_AUTHORIZATION_FAILED, "create syslog");
        assert!(matches!(err, ReconcileError::FatalBroker { code: 29, .. }));
        assert_eq!(err.class(), ErrorClass::Fatal);
    }

    #[test]
    fn test_error_class_of_variants() {
        assert_eq!(
            ReconcileError::TopicMissing("t".into()).class(),
            ErrorClass::NotFound
        );
        assert_eq!(
            ReconcileError::NoBrokersReachable.class(),
            ErrorClass::Transient
        );
        assert_eq!(
            ReconcileError::InvalidOperation("shrink".into()).class(),
            ErrorClass::Fatal
        );
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert_eq!(ReconcileError::from(io).class(), ErrorClass::Transient);
    }

    #[test]
    fn test_display_includes_context() {
        let err = ReconcileError::ConsistencyTimeout {
            operation: "creation of topic syslog".to_string(),
            attempts: 7,
        };
        let text = err.to_string();
        assert!(text.contains("syslog"));
        assert!(text.contains('7'));
    }
}

//! Configuration types for the cluster reconciler.
//!
//! Loaded from YAML and validated before use. Credential material is passed
//! as file paths; loading and validating the declarative front end that
//! produces these values is outside the core.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::model::{AclBinding, TopicSpec};

/// Kafka cluster connection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClusterConfig {
    /// Bootstrap server addresses (`host:port`). Tried in order on dial.
    pub bootstrap_servers: Vec<String>,

    /// Client id sent in request headers.
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Connection timeout in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Per-request timeout in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Security protocol for broker connections.
    #[serde(default)]
    pub security_protocol: SecurityProtocol,

    /// TLS configuration (when using SSL).
    #[serde(default)]
    pub tls: Option<TlsConfig>,
}

fn default_client_id() -> String {
    "kafka-reconciler".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

impl ClusterConfig {
    /// Minimal config for a plaintext cluster, used by tests and tools.
    #[must_use]
    pub fn plaintext(bootstrap_servers: Vec<String>) -> Self {
        Self {
            bootstrap_servers,
            client_id: default_client_id(),
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            security_protocol: SecurityProtocol::Plaintext,
            tls: None,
        }
    }

    /// Load and validate a configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = serde_yaml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate semantic constraints.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.bootstrap_servers.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one bootstrap server is required".to_string(),
            ));
        }
        for server in &self.bootstrap_servers {
            let mut parts = server.rsplitn(2, ':');
            let port_ok = parts
                .next()
                .is_some_and(|p| p.parse::<u16>().is_ok());
            let host_ok = parts.next().is_some_and(|h| !h.is_empty());
            if !port_ok || !host_ok {
                return Err(ConfigError::InvalidAddress(server.clone()));
            }
        }
        if self.security_protocol.requires_tls() {
            let tls = self.tls.as_ref().cloned().unwrap_or_default();
            if tls.cert_path.is_some() != tls.key_path.is_some() {
                return Err(ConfigError::Invalid(
                    "client certificate and key must be configured together".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Connection timeout as a [`Duration`].
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Request timeout as a [`Duration`].
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Security protocol for broker connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SecurityProtocol {
    /// Plain TCP without encryption.
    #[default]
    Plaintext,
    /// TLS, optionally with client-certificate authentication.
    Ssl,
}

impl SecurityProtocol {
    /// Check if TLS is required for this protocol.
    #[must_use]
    pub fn requires_tls(&self) -> bool {
        matches!(self, Self::Ssl)
    }
}

/// TLS configuration for broker connections.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TlsConfig {
    /// CA certificate file (PEM) for verifying broker certificates.
    /// When unset, the bundled webpki roots are used.
    pub ca_cert_path: Option<PathBuf>,

    /// Client certificate file (PEM) for mutual TLS.
    pub cert_path: Option<PathBuf>,

    /// Client private key file (PEM) for mutual TLS.
    pub key_path: Option<PathBuf>,
}

/// Retry budget for read-after-write verification and transient errors.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    /// Maximum polling attempts.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First backoff interval in milliseconds; doubles per attempt.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Backoff cap in milliseconds.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Overall wall-clock deadline in milliseconds, if any.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: Option<u64>,
}

fn default_max_attempts() -> u32 {
    10
}

fn default_initial_backoff_ms() -> u64 {
    250
}

fn default_max_backoff_ms() -> u64 {
    5_000
}

fn default_timeout_ms() -> Option<u64> {
    Some(30_000)
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// A desired-state document: the topics and ACL bindings a cluster should
/// converge to. Consumed by the CLI front end.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DesiredState {
    #[serde(default)]
    pub topics: Vec<TopicSpec>,

    #[serde(default)]
    pub acls: Vec<AclBinding>,
}

impl DesiredState {
    /// Load a desired-state document.
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_yaml::from_str(&raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClusterConfig::plaintext(vec!["localhost:9092".to_string()]);
        assert_eq!(config.client_id, "kafka-reconciler");
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_bootstrap_rejected() {
        let config = ClusterConfig::plaintext(vec![]);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_bad_address_rejected() {
        for addr in ["nocolon", "host:", ":9092", "host:notaport"] {
            let config = ClusterConfig::plaintext(vec![addr.to_string()]);
            assert!(
                matches!(config.validate(), Err(ConfigError::InvalidAddress(_))),
                "address {addr:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_cert_without_key_rejected() {
        let mut config = ClusterConfig::plaintext(vec!["kafka:9093".to_string()]);
        config.security_protocol = SecurityProtocol::Ssl;
        config.tls = Some(TlsConfig {
            ca_cert_path: None,
            cert_path: Some(PathBuf::from("/etc/kafka/client.crt")),
            key_path: None,
        });
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = "
bootstrap_servers:
  - kafka-0.example.com:9093
  - kafka-1.example.com:9093
security_protocol: SSL
tls:
  ca_cert_path: /etc/kafka/ca.crt
  cert_path: /etc/kafka/client.crt
  key_path: /etc/kafka/client.key
";
        let config: ClusterConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.bootstrap_servers.len(), 2);
        assert!(config.security_protocol.requires_tls());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_retry_config_defaults() {
        let retry = RetryConfig::default();
        assert_eq!(retry.max_attempts, 10);
        assert_eq!(retry.initial_backoff_ms, 250);
        assert_eq!(retry.timeout_ms, Some(30_000));
    }

    #[test]
    fn test_desired_state_document() {
        let yaml = "
topics:
  - name: syslog
    partitions: 3
    replication_factor: 1
    config:
      retention.ms: '11111'
acls:
  - resource_type: Topic
    resource_name: syslog
    pattern_type: Literal
    principal: 'User:Alice'
    host: '*'
    operation: Write
    permission: Allow
";
        let state: DesiredState = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(state.topics.len(), 1);
        assert_eq!(state.topics[0].config["retention.ms"], "11111");
        assert_eq!(state.acls.len(), 1);
    }
}

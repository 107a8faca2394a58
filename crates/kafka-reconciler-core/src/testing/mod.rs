//! Test utilities for integration testing the reconcilers.
//!
//! [`MockBroker`] is a single-node in-memory Kafka admin endpoint: it
//! decodes the typed admin requests the client issues, applies them to an
//! in-memory cluster state, and records every call so tests can assert on
//! RPC counts. Its visibility lag simulates metadata propagation delay.
//!
//! [`TestHarness`] wires a mock broker to an [`crate::admin::AdminClient`]
//! and both reconcilers.

pub mod harness;
pub mod mock_broker;

pub use harness::TestHarness;
pub use mock_broker::{api_keys, MockBroker, RecordedCall};

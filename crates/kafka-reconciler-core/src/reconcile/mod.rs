//! Topic and ACL reconcilers.
//!
//! Both reconcilers follow the same contract: read fresh cluster state,
//! diff it against the declared spec, apply the minimal set of operations,
//! and verify every write readable through the retry layer before
//! returning. Nothing read from the cluster outlives the call that read it.

pub mod acl;
pub mod topic;

pub use acl::AclReconciler;
pub use topic::TopicReconciler;

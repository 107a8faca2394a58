//! Kafka Cluster Reconciler CLI
//!
//! Loads a cluster connection config and a desired-state document, then
//! plans, applies, or destroys the declared topics and ACL bindings.

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use kafka_reconciler_core::admin::{AclFilter, AdminClient};
use kafka_reconciler_core::config::{ClusterConfig, DesiredState, RetryConfig};
use kafka_reconciler_core::error::ReconcileError;
use kafka_reconciler_core::model::AclBinding;
use kafka_reconciler_core::reconcile::{AclReconciler, TopicReconciler};
use kafka_reconciler_core::retry::Retry;

/// Reconcile declared Kafka topics and ACL bindings against a live cluster.
#[derive(Parser)]
#[command(name = "kafka-reconciler")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the cluster connection config.
    #[arg(short, long, default_value = "cluster.yaml")]
    config: String,

    /// Path to the desired-state document.
    #[arg(short, long, default_value = "state.yaml")]
    state: String,

    /// Emit logs as JSON.
    #[arg(long)]
    json: bool,

    /// Increase logging verbosity (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show the operations an apply would issue, without issuing them.
    Plan,
    /// Converge the cluster onto the desired state.
    Apply,
    /// Delete the declared resources and verify they are gone.
    Destroy,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    setup_tracing(args.verbose, args.json);

    let config = ClusterConfig::from_file(&args.config)
        .with_context(|| format!("loading cluster config {}", args.config))?;
    let state = DesiredState::from_file(&args.state)
        .with_context(|| format!("loading desired state {}", args.state))?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        bootstrap_servers = ?config.bootstrap_servers,
        topics = state.topics.len(),
        acls = state.acls.len(),
        "starting kafka reconciler"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run(args.command, config, state))
}

fn setup_tracing(verbose: u8, json: bool) {
    let level = match verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::from_default_env().add_directive(level.into());
    let subscriber = tracing_subscriber::registry().with(filter);
    if json {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber.with(fmt::layer()).init();
    }
}

async fn run(command: Command, config: ClusterConfig, state: DesiredState) -> anyhow::Result<()> {
    let retry = Retry::from(&RetryConfig::default());
    let client = Arc::new(AdminClient::new(config)?);
    client.connect().await?;

    let topics = TopicReconciler::new(Arc::clone(&client), retry.clone());
    let acls = AclReconciler::new(Arc::clone(&client), retry);

    match command {
        Command::Plan => plan(&topics, &acls, &state).await,
        Command::Apply => apply(&topics, &acls, &state).await,
        Command::Destroy => destroy(&topics, &acls, &state).await,
    }
}

async fn plan(
    topics: &TopicReconciler,
    acls: &AclReconciler,
    state: &DesiredState,
) -> anyhow::Result<()> {
    let mut changes = 0usize;

    for spec in &state.topics {
        match topics.read(&spec.name).await {
            Ok(observed) => {
                let delta = TopicReconciler::plan(spec, &observed)?;
                if delta.is_empty() {
                    info!(topic = %spec.name, "topic converged");
                } else {
                    changes += 1;
                    info!(
                        topic = %spec.name,
                        set = delta.config_set.len(),
                        unset = delta.config_delete.len(),
                        partitions = ?delta.partition_increase,
                        "topic would change"
                    );
                }
            }
            Err(ReconcileError::TopicMissing(_)) => {
                changes += 1;
                info!(topic = %spec.name, partitions = spec.partitions, "topic would be created");
            }
            Err(e) => return Err(e.into()),
        }
    }

    let observed = observed_managed_bindings(acls, &state.acls).await?;
    let delta = AclReconciler::plan(&state.acls, &observed);
    if delta.is_empty() {
        info!("acl bindings converged");
    } else {
        changes += delta.to_create.len() + delta.to_delete.len();
        info!(
            create = delta.to_create.len(),
            delete = delta.to_delete.len(),
            "acl bindings would change"
        );
    }

    info!(changes, "plan complete");
    Ok(())
}

async fn apply(
    topics: &TopicReconciler,
    acls: &AclReconciler,
    state: &DesiredState,
) -> anyhow::Result<()> {
    for spec in &state.topics {
        let observed = topics.apply(spec).await?;
        info!(topic = %spec.name, partitions = observed.partitions, "topic converged");
    }

    let observed = observed_managed_bindings(acls, &state.acls).await?;
    let delta = AclReconciler::plan(&state.acls, &observed);
    acls.apply(&delta).await?;
    info!(
        created = delta.to_create.len(),
        deleted = delta.to_delete.len(),
        "acl bindings converged"
    );
    Ok(())
}

async fn destroy(
    topics: &TopicReconciler,
    acls: &AclReconciler,
    state: &DesiredState,
) -> anyhow::Result<()> {
    for binding in &state.acls {
        acls.delete_matching(binding).await?;
    }
    for resource in state
        .acls
        .iter()
        .map(|b| b.resource_name.as_str())
        .collect::<BTreeSet<_>>()
    {
        let remaining = acls.count_for_resource(resource).await?;
        if remaining != 0 {
            warn!(resource, remaining, "unmanaged acl bindings remain");
        }
    }

    for spec in &state.topics {
        topics.delete(&spec.name).await?;
        match topics.read(&spec.name).await {
            Err(ReconcileError::TopicMissing(_)) => {
                info!(topic = %spec.name, "topic destroyed");
            }
            Ok(_) => anyhow::bail!("topic {} still present after deletion", spec.name),
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Observed bindings restricted to the resources the desired state manages.
///
/// Diffing against the whole cluster would plan deletions for bindings this
/// tool never declared, so the observed set is scoped to the declared
/// (resource type, name, pattern) triples.
async fn observed_managed_bindings(
    acls: &AclReconciler,
    desired: &[AclBinding],
) -> anyhow::Result<Vec<AclBinding>> {
    let mut observed = Vec::new();
    let mut seen = BTreeSet::new();
    for binding in desired {
        let key = (
            binding.resource_type,
            binding.resource_name.clone(),
            binding.pattern_type,
        );
        if !seen.insert(key) {
            continue;
        }
        let filter = AclFilter {
            resource_type: Some(binding.resource_type),
            resource_name: Some(binding.resource_name.clone()),
            pattern_type: Some(binding.pattern_type),
        };
        observed.extend(acls.observed(&filter).await?);
    }
    Ok(observed)
}

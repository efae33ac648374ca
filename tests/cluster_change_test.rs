//! Integration tests for cluster changes
//!
//! Scaling a cluster from one to three members, deleting exporter history,
//! and retrying operations whose side effect fails.

mod common;

use common::create_test_logger;
use eventide::cluster::{
    ClusterChangeConfig, ClusterChangeCoordinator, ClusterChangeError, ClusterConfiguration, ClusterOperation,
    MemberId, MemberState, MemberStatus, PartitionClusterChangeExecutor, PartitionState, StaticNodeIdProvider,
};
use eventide::exporter::{Exporter, ExporterError, ExporterRepository};
use eventide::record::Record;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct PurgeCounter {
    id: String,
    purges: Arc<AtomicUsize>,
    /// Purges that fail before one succeeds
    failures: Arc<AtomicUsize>,
}

impl Exporter for PurgeCounter {
    fn id(&self) -> &str {
        &self.id
    }

    fn export(&mut self, _record: &Record) -> Result<(), ExporterError> {
        Ok(())
    }

    fn purge(&mut self) -> Result<(), ExporterError> {
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ExporterError::Purge {
                exporter_id: self.id.clone(),
                reason: "index unavailable".to_string(),
            });
        }
        self.purges.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct Cluster {
    coordinator: ClusterChangeCoordinator,
    node_ids: Arc<StaticNodeIdProvider>,
    purges: Arc<AtomicUsize>,
    purge_failures: Arc<AtomicUsize>,
}

fn single_member() -> ClusterConfiguration {
    let mut partitions = BTreeMap::new();
    partitions.insert(1, PartitionState { priority: 1 });
    ClusterConfiguration::init()
        .add_member(MemberId(0), MemberState::active(partitions))
        .with_version(1)
}

fn members(ids: &[u32]) -> BTreeSet<MemberId> {
    ids.iter().copied().map(MemberId).collect()
}

fn cluster(config: ClusterChangeConfig) -> Cluster {
    let purges = Arc::new(AtomicUsize::new(0));
    let purge_failures = Arc::new(AtomicUsize::new(0));
    let repository = Arc::new(ExporterRepository::new());
    {
        let (purges, purge_failures) = (purges.clone(), purge_failures.clone());
        repository.register("search", move || {
            Box::new(PurgeCounter {
                id: "search".to_string(),
                purges: purges.clone(),
                failures: purge_failures.clone(),
            }) as Box<dyn Exporter>
        });
    }

    let node_ids = Arc::new(StaticNodeIdProvider::new(1));
    let executor = Arc::new(PartitionClusterChangeExecutor::new(
        repository,
        node_ids.clone(),
        create_test_logger(),
    ));
    Cluster {
        coordinator: ClusterChangeCoordinator::new(single_member(), executor, config, create_test_logger()),
        node_ids,
        purges,
        purge_failures,
    }
}

fn fast_retries(max_attempts: u32) -> ClusterChangeConfig {
    ClusterChangeConfig {
        max_attempts,
        retry_backoff_ms: 1,
    }
}

#[tokio::test]
async fn test_scale_up_from_one_to_three_members() {
    let cluster = cluster(ClusterChangeConfig::default());
    let target = members(&[0, 1, 2]);

    let configuration = cluster
        .coordinator
        .execute(&ClusterOperation::PreScaling {
            member_id: MemberId(0),
            cluster_members: target.clone(),
        })
        .await
        .unwrap();
    // pre-scaling only leases node ids, the configuration stays as is
    assert_eq!(configuration, single_member());
    assert_eq!(cluster.node_ids.scale_requests(), vec![3]);

    for member_id in [MemberId(1), MemberId(2)] {
        cluster
            .coordinator
            .execute(&ClusterOperation::MemberJoin { member_id })
            .await
            .unwrap();
    }
    let configuration = cluster
        .coordinator
        .execute(&ClusterOperation::PostScaling {
            member_id: MemberId(0),
            cluster_members: target.clone(),
        })
        .await
        .unwrap();

    assert_eq!(configuration.member_ids(), target);
    assert!(configuration
        .members
        .values()
        .all(|member| member.status == MemberStatus::Active));
    // joining and activating each bump the version once
    assert_eq!(configuration.version, 5);
    assert_eq!(cluster.node_ids.scale_requests(), vec![3, 3]);
    assert_eq!(cluster.node_ids.cluster_size(), 3);
}

#[tokio::test]
async fn test_pre_scaling_does_not_shrink_node_ids() {
    let cluster = cluster(ClusterChangeConfig::default());
    cluster
        .coordinator
        .execute(&ClusterOperation::MemberJoin { member_id: MemberId(1) })
        .await
        .unwrap();

    cluster
        .coordinator
        .execute(&ClusterOperation::PreScaling {
            member_id: MemberId(0),
            cluster_members: members(&[0]),
        })
        .await
        .unwrap();
    assert!(cluster.node_ids.scale_requests().is_empty());

    cluster
        .coordinator
        .execute(&ClusterOperation::MemberLeave { member_id: MemberId(1) })
        .await
        .unwrap();
    cluster
        .coordinator
        .execute(&ClusterOperation::PostScaling {
            member_id: MemberId(0),
            cluster_members: members(&[0]),
        })
        .await
        .unwrap();
    assert_eq!(cluster.node_ids.scale_requests(), vec![1]);
    assert_eq!(cluster.coordinator.current().member_ids(), members(&[0]));
}

#[tokio::test]
async fn test_operation_for_unknown_member_is_rejected_without_side_effects() {
    let cluster = cluster(ClusterChangeConfig::default());

    let error = cluster
        .coordinator
        .execute(&ClusterOperation::PreScaling {
            member_id: MemberId(7),
            cluster_members: members(&[0, 7]),
        })
        .await
        .unwrap_err();
    assert_eq!(
        error.to_string(),
        "Cannot apply pre-scaling operation: member 7 is not part of the current cluster configuration."
    );

    let error = cluster
        .coordinator
        .execute(&ClusterOperation::DeleteHistory { member_id: MemberId(7) })
        .await
        .unwrap_err();
    assert!(matches!(error, ClusterChangeError::MemberNotFound { .. }));

    assert!(cluster.node_ids.scale_requests().is_empty());
    assert_eq!(cluster.purges.load(Ordering::SeqCst), 0);
    assert_eq!(cluster.coordinator.current(), single_member());
}

#[tokio::test]
async fn test_join_of_active_member_is_rejected() {
    let cluster = cluster(ClusterChangeConfig::default());
    let error = cluster
        .coordinator
        .execute(&ClusterOperation::MemberJoin { member_id: MemberId(0) })
        .await
        .unwrap_err();
    assert!(matches!(error, ClusterChangeError::MemberAlreadyActive(MemberId(0))));
    assert_eq!(cluster.coordinator.current().version, 1);
}

#[tokio::test]
async fn test_delete_history_purges_exporters_and_keeps_configuration() {
    let cluster = cluster(ClusterChangeConfig::default());
    let mut changes = cluster.coordinator.subscribe();

    let configuration = cluster
        .coordinator
        .execute(&ClusterOperation::DeleteHistory { member_id: MemberId(0) })
        .await
        .unwrap();

    assert_eq!(cluster.purges.load(Ordering::SeqCst), 1);
    assert_eq!(configuration, single_member());
    assert!(!changes.has_changed().unwrap());
}

#[tokio::test]
async fn test_failed_purge_is_retried() {
    let cluster = cluster(fast_retries(5));
    cluster.purge_failures.store(2, Ordering::SeqCst);

    cluster
        .coordinator
        .execute(&ClusterOperation::DeleteHistory { member_id: MemberId(0) })
        .await
        .unwrap();
    assert_eq!(cluster.purges.load(Ordering::SeqCst), 1);
    assert_eq!(cluster.purge_failures.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_scaling_gives_up_after_max_attempts() {
    let cluster = cluster(fast_retries(2));
    cluster.node_ids.fail_next(3);

    let operation = ClusterOperation::PostScaling {
        member_id: MemberId(0),
        cluster_members: members(&[0]),
    };
    let error = cluster.coordinator.execute(&operation).await.unwrap_err();
    assert!(matches!(error, ClusterChangeError::NodeIdProvider { cluster_size: 1, .. }));
    assert!(cluster.node_ids.scale_requests().is_empty());

    // the provider recovers after one more failure
    let configuration = cluster.coordinator.execute(&operation).await.unwrap();
    assert_eq!(configuration, single_member());
    assert_eq!(cluster.node_ids.scale_requests(), vec![1]);
}

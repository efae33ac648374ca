//! Side effects of cluster operations on this node

use async_trait::async_trait;
use slog::{info, Logger};
use std::collections::BTreeSet;
use std::sync::Arc;

use super::configuration::MemberId;
use super::errors::ClusterChangeError;
use super::node_id_provider::NodeIdProvider;
use crate::exporter::ExporterRepository;

/// Every method may be retried until it succeeds, so each must be idempotent.
#[async_trait]
pub trait ClusterChangeExecutor: Send + Sync {
    /// Purge all history data. On failure none, some or all data may be gone.
    async fn delete_history(&self) -> Result<(), ClusterChangeError>;

    /// Prepare this member for a cluster that will consist of `cluster_members`.
    ///
    /// # Arguments
    /// * `current_cluster_size` - Number of members before scaling
    /// * `cluster_members` - Members after scaling
    async fn pre_scaling(
        &self,
        current_cluster_size: usize,
        cluster_members: &BTreeSet<MemberId>,
    ) -> Result<(), ClusterChangeError>;

    /// Called after all scaling steps completed, for scale up and scale down.
    async fn post_scaling(&self, cluster_members: &BTreeSet<MemberId>) -> Result<(), ClusterChangeError>;
}

pub struct NoopClusterChangeExecutor;

#[async_trait]
impl ClusterChangeExecutor for NoopClusterChangeExecutor {
    async fn delete_history(&self) -> Result<(), ClusterChangeError> {
        Ok(())
    }

    async fn pre_scaling(
        &self,
        _current_cluster_size: usize,
        _cluster_members: &BTreeSet<MemberId>,
    ) -> Result<(), ClusterChangeError> {
        Ok(())
    }

    async fn post_scaling(&self, _cluster_members: &BTreeSet<MemberId>) -> Result<(), ClusterChangeError> {
        Ok(())
    }
}

/// Executor backed by this node's exporters and node id leases
pub struct PartitionClusterChangeExecutor {
    exporters: Arc<ExporterRepository>,
    node_id_provider: Arc<dyn NodeIdProvider>,
    logger: Logger,
}

impl PartitionClusterChangeExecutor {
    pub fn new(
        exporters: Arc<ExporterRepository>,
        node_id_provider: Arc<dyn NodeIdProvider>,
        logger: Logger,
    ) -> Self {
        Self {
            exporters,
            node_id_provider,
            logger,
        }
    }
}

#[async_trait]
impl ClusterChangeExecutor for PartitionClusterChangeExecutor {
    async fn delete_history(&self) -> Result<(), ClusterChangeError> {
        let purged = self
            .exporters
            .purge_all()
            .map_err(|e| ClusterChangeError::ExporterPurge {
                exporter_id: e.exporter_id().to_string(),
                reason: e.to_string(),
            })?;
        for exporter_id in purged {
            info!(self.logger, "Purged history"; "exporter" => exporter_id);
        }
        Ok(())
    }

    async fn pre_scaling(
        &self,
        current_cluster_size: usize,
        cluster_members: &BTreeSet<MemberId>,
    ) -> Result<(), ClusterChangeError> {
        if current_cluster_size >= cluster_members.len() {
            // not growing, the existing leases suffice
            return Ok(());
        }
        self.node_id_provider.scale(cluster_members.len()).await
    }

    async fn post_scaling(&self, cluster_members: &BTreeSet<MemberId>) -> Result<(), ClusterChangeError> {
        // no-op after scale up; drops surplus leases after scale down
        self.node_id_provider.scale(cluster_members.len()).await
    }
}

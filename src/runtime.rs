//! High-level runtime for an eventide node.
//!
//! Starts every partition of the node and the cluster change coordinator,
//! routes commands to partitions, and shuts everything down.

use log::{info, warn};
use slog::Logger;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

use crate::cluster::{
    ClusterChangeCoordinator, ClusterChangeError, ClusterConfiguration, ClusterOperation, MemberId, MemberState,
    PartitionClusterChangeExecutor, StaticNodeIdProvider,
};
use crate::config::{ConfigError, EngineConfig};
use crate::engine::CommandResponse;
use crate::exporter::ExporterRepository;
use crate::partition::{CommandRequest, Partition, PartitionError};

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Partition(#[from] PartitionError),

    #[error(transparent)]
    ClusterChange(#[from] ClusterChangeError),

    #[error("Unknown partition {0}")]
    UnknownPartition(u32),
}

pub struct EngineRuntime {
    config: EngineConfig,
    partitions: BTreeMap<u32, Partition>,
    coordinator: ClusterChangeCoordinator,
}

impl EngineRuntime {
    /// Start all partitions of this node.
    ///
    /// This will:
    /// 1. Validate the configuration
    /// 2. Start partitions 1..=partition_count, each replaying its log
    /// 3. Create the cluster change coordinator with this node as only member
    pub fn start(
        config: EngineConfig,
        exporters: Arc<ExporterRepository>,
        logger: Logger,
    ) -> Result<Self, RuntimeError> {
        config.validate()?;
        info!(
            "Starting eventide node {} with {} partitions",
            config.node_id, config.partition_count
        );

        let mut partitions = BTreeMap::new();
        for partition_id in 1..=config.partition_count {
            let partition = Partition::start(partition_id, &config, &exporters, logger.clone())?;
            partitions.insert(partition_id, partition);
        }

        let member_id = MemberId(config.node_id);
        let member = (1..=config.partition_count).fold(MemberState::active(BTreeMap::new()), |member, id| {
            member.with_partition(id, 1)
        });
        let initial = ClusterConfiguration::init().add_member(member_id, member);
        let executor = Arc::new(PartitionClusterChangeExecutor::new(
            exporters,
            Arc::new(StaticNodeIdProvider::new(1)),
            logger.clone(),
        ));
        let coordinator =
            ClusterChangeCoordinator::new(initial, executor, config.cluster_change.clone(), logger);

        Ok(Self {
            config,
            partitions,
            coordinator,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn partition(&self, partition_id: u32) -> Result<&Partition, RuntimeError> {
        self.partitions
            .get(&partition_id)
            .ok_or(RuntimeError::UnknownPartition(partition_id))
    }

    pub fn cluster(&self) -> &ClusterChangeCoordinator {
        &self.coordinator
    }

    /// Submit a command to `partition_id` and wait for its response.
    pub async fn submit(
        &self,
        partition_id: u32,
        request: CommandRequest,
    ) -> Result<CommandResponse, RuntimeError> {
        Ok(self.partition(partition_id)?.submit(request).await?)
    }

    /// Run a cluster operation through the coordinator.
    pub async fn change_cluster(&self, operation: ClusterOperation) -> Result<ClusterConfiguration, RuntimeError> {
        Ok(self.coordinator.execute(&operation).await?)
    }

    /// Close every partition; returns the first failure after all are closed.
    pub async fn shutdown(self) -> Result<(), RuntimeError> {
        info!("Shutting down eventide node {}", self.config.node_id);
        let mut first_error = None;
        for (partition_id, partition) in &self.partitions {
            if let Err(e) = partition.close().await {
                warn!("Partition {} closed with error: {}", partition_id, e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}

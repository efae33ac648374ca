//! Configuration for eventide nodes

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::cluster::ClusterChangeConfig;
use crate::log::LogStreamConfig;
use crate::stream::{FlowControlConfig, StreamProcessorConfig, StreamProcessorMode};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Configuration for starting an eventide node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Id of this node in the cluster
    pub node_id: u32,

    /// Number of partitions; partition ids are 1..=partition_count
    pub partition_count: u32,

    /// Directory for state, log and snapshots. In memory if None
    /// (persistent storage needs the `persistent-storage` feature).
    pub data_dir: Option<PathBuf>,

    /// Check command authorizations against stored permissions
    pub authorization_checks: bool,

    pub stream_processor: StreamProcessorConfig,
    pub log: LogStreamConfig,
    pub flow_control: FlowControlConfig,
    pub cluster_change: ClusterChangeConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            node_id: 0,
            partition_count: 1,
            data_dir: None,
            authorization_checks: false,
            stream_processor: StreamProcessorConfig::default(),
            log: LogStreamConfig::default(),
            flow_control: FlowControlConfig::default(),
            cluster_change: ClusterChangeConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load a JSON config file; missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: EngineConfig = serde_json::from_slice(&bytes).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.partition_count == 0 {
            return Err(ConfigError::Invalid("partition_count must be at least 1".to_string()));
        }
        if self.flow_control.max_in_flight_requests == 0 {
            return Err(ConfigError::Invalid(
                "flow_control.max_in_flight_requests must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_node_id(mut self, node_id: u32) -> Self {
        self.node_id = node_id;
        self
    }

    pub fn with_partition_count(mut self, partition_count: u32) -> Self {
        self.partition_count = partition_count;
        self
    }

    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(data_dir.into());
        self
    }

    pub fn with_authorization_checks(mut self, enabled: bool) -> Self {
        self.authorization_checks = enabled;
        self
    }

    pub fn with_stream_processor(mut self, stream_processor: StreamProcessorConfig) -> Self {
        self.stream_processor = stream_processor;
        self
    }

    /// Followers only replay; they never process commands.
    pub fn with_mode(mut self, mode: StreamProcessorMode) -> Self {
        self.stream_processor.mode = mode;
        self
    }

    pub fn with_log(mut self, log: LogStreamConfig) -> Self {
        self.log = log;
        self
    }

    pub fn with_flow_control(mut self, flow_control: FlowControlConfig) -> Self {
        self.flow_control = flow_control;
        self
    }

    pub fn with_cluster_change(mut self, cluster_change: ClusterChangeConfig) -> Self {
        self.cluster_change = cluster_change;
        self
    }

    /// Directory of one partition's state, log and snapshots.
    pub fn partition_dir(&self, partition_id: u32) -> Option<PathBuf> {
        self.data_dir
            .as_ref()
            .map(|dir| dir.join(format!("partition-{}", partition_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_file_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"node_id": 3, "stream_processor": {{"max_command_retries": 7}}}}"#).unwrap();

        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.node_id, 3);
        assert_eq!(config.partition_count, 1);
        assert_eq!(config.stream_processor.max_command_retries, 7);
        assert_eq!(config.stream_processor.mode, StreamProcessorMode::Processing);
    }

    #[test]
    fn zero_partitions_is_invalid() {
        assert!(EngineConfig::default().with_partition_count(0).validate().is_err());
    }
}

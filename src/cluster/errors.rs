use thiserror::Error;

use super::configuration::MemberId;

#[derive(Debug, Error)]
pub enum ClusterChangeError {
    /// Synchronous validation failed; nothing was executed
    #[error("Cannot apply {operation} operation: member {member_id} is not part of the current cluster configuration.")]
    MemberNotFound {
        operation: &'static str,
        member_id: MemberId,
    },

    #[error("Cannot apply member-join operation: member {0} is already active in the current cluster configuration.")]
    MemberAlreadyActive(MemberId),

    #[error("Cannot apply {operation} operation: apply was called before init")]
    NotInitialized { operation: &'static str },

    #[error("Cannot apply {operation} operation: apply was already called")]
    AlreadyApplied { operation: &'static str },

    #[error("Failed to purge data from exporter {exporter_id}; operation will be retried: {reason}")]
    ExporterPurge { exporter_id: String, reason: String },

    #[error("Node id provider failed to scale to {cluster_size} members: {reason}")]
    NodeIdProvider { cluster_size: usize, reason: String },

    #[error("Cluster change coordinator stopped")]
    Stopped,
}

impl ClusterChangeError {
    /// Failures of the asynchronous side effect; the whole operation may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClusterChangeError::ExporterPurge { .. } | ClusterChangeError::NodeIdProvider { .. }
        )
    }
}

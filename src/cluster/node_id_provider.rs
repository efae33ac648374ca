use async_trait::async_trait;
use std::sync::Mutex;

use super::errors::ClusterChangeError;

/// Allocates node id leases for the members of the cluster
#[async_trait]
pub trait NodeIdProvider: Send + Sync {
    /// Make exactly `cluster_size` node ids available.
    async fn scale(&self, cluster_size: usize) -> Result<(), ClusterChangeError>;
}

/// In-process provider that only remembers the requested sizes
pub struct StaticNodeIdProvider {
    state: Mutex<StaticState>,
}

struct StaticState {
    cluster_size: usize,
    requests: Vec<usize>,
    failures_left: u32,
}

impl StaticNodeIdProvider {
    pub fn new(cluster_size: usize) -> Self {
        Self {
            state: Mutex::new(StaticState {
                cluster_size,
                requests: Vec::new(),
                failures_left: 0,
            }),
        }
    }

    /// Fail the next `count` scale requests.
    pub fn fail_next(&self, count: u32) {
        if let Ok(mut state) = self.state.lock() {
            state.failures_left = count;
        }
    }

    pub fn cluster_size(&self) -> usize {
        self.state.lock().map(|state| state.cluster_size).unwrap_or(0)
    }

    /// Sizes of all successful scale requests, oldest first.
    pub fn scale_requests(&self) -> Vec<usize> {
        self.state
            .lock()
            .map(|state| state.requests.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl NodeIdProvider for StaticNodeIdProvider {
    async fn scale(&self, cluster_size: usize) -> Result<(), ClusterChangeError> {
        let mut state = self.state.lock().map_err(|_| ClusterChangeError::NodeIdProvider {
            cluster_size,
            reason: "state lock poisoned".to_string(),
        })?;
        if state.failures_left > 0 {
            state.failures_left -= 1;
            return Err(ClusterChangeError::NodeIdProvider {
                cluster_size,
                reason: "lease store unavailable".to_string(),
            });
        }
        state.cluster_size = cluster_size;
        state.requests.push(cluster_size);
        Ok(())
    }
}

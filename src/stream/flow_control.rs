//! Bounded number of in-flight client requests per partition

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowControlConfig {
    pub max_in_flight_requests: usize,
}

impl Default for FlowControlConfig {
    fn default() -> Self {
        Self {
            max_in_flight_requests: 1_000,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Expected at most {limit} requests in flight, but the limit is reached")]
pub struct RequestLimitExhausted {
    pub limit: usize,
}

pub struct RequestLimiter {
    permits: Arc<Semaphore>,
    limit: usize,
}

/// Released when the request completes or is abandoned
#[derive(Debug)]
pub struct InFlightGuard {
    _permit: OwnedSemaphorePermit,
}

impl RequestLimiter {
    pub fn new(config: &FlowControlConfig) -> Self {
        let limit = config.max_in_flight_requests.max(1);
        Self {
            permits: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    pub fn try_acquire(&self) -> Result<InFlightGuard, RequestLimitExhausted> {
        self.permits
            .clone()
            .try_acquire_owned()
            .map(|permit| InFlightGuard { _permit: permit })
            .map_err(|_| RequestLimitExhausted { limit: self.limit })
    }

    pub fn in_flight(&self) -> usize {
        self.limit - self.permits.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_in_flight_requests() {
        let limiter = RequestLimiter::new(&FlowControlConfig {
            max_in_flight_requests: 2,
        });
        let first = limiter.try_acquire().unwrap();
        let _second = limiter.try_acquire().unwrap();
        assert_eq!(limiter.try_acquire().unwrap_err(), RequestLimitExhausted { limit: 2 });
        assert_eq!(limiter.in_flight(), 2);

        drop(first);
        assert!(limiter.try_acquire().is_ok());
    }
}

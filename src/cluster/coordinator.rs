//! Cluster Change Coordinator (Layer 7)
//!
//! Runs cluster operations one at a time against the current configuration:
//! init, apply the init transformer, await apply, apply its transformer. A
//! failed side effect restarts the whole two-phase operation against the
//! configuration as it is then.

use rand::Rng;
use serde::{Deserialize, Serialize};
use slog::{error, info, o, warn, Logger};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};

use super::applier::{ClusterOperation, ConfigTransformer};
use super::configuration::ClusterConfiguration;
use super::errors::ClusterChangeError;
use super::executor::ClusterChangeExecutor;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterChangeConfig {
    /// Attempts of one operation before giving up
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
}

impl Default for ClusterChangeConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            retry_backoff_ms: 100,
        }
    }
}

pub struct ClusterChangeCoordinator {
    configuration: watch::Sender<ClusterConfiguration>,
    executor: Arc<dyn ClusterChangeExecutor>,
    config: ClusterChangeConfig,
    /// Serializes operations
    running: Mutex<()>,
    logger: Logger,
}

impl ClusterChangeCoordinator {
    pub fn new(
        initial: ClusterConfiguration,
        executor: Arc<dyn ClusterChangeExecutor>,
        config: ClusterChangeConfig,
        logger: Logger,
    ) -> Self {
        let (configuration, _) = watch::channel(initial);
        Self {
            configuration,
            executor,
            config,
            running: Mutex::new(()),
            logger: logger.new(o!("component" => "cluster-change")),
        }
    }

    pub fn current(&self) -> ClusterConfiguration {
        self.configuration.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ClusterConfiguration> {
        self.configuration.subscribe()
    }

    /// Run `operation` to completion.
    ///
    /// # Returns
    /// * `Ok(configuration)` - The configuration after the operation
    /// * `Err(e)` - Validation failed, or the side effect kept failing
    pub async fn execute(&self, operation: &ClusterOperation) -> Result<ClusterConfiguration, ClusterChangeError> {
        let _running = self.running.lock().await;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_execute(operation).await {
                Ok(configuration) => {
                    info!(self.logger, "Cluster operation completed";
                        "operation" => %operation,
                        "version" => configuration.version
                    );
                    return Ok(configuration);
                }
                Err(e) if e.is_retryable() && attempt < self.config.max_attempts => {
                    let delay = self.retry_delay(attempt);
                    warn!(self.logger, "Cluster operation failed, retrying";
                        "operation" => %operation,
                        "attempt" => attempt,
                        "delay_ms" => delay.as_millis() as u64,
                        "error" => %e
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    error!(self.logger, "Cluster operation failed";
                        "operation" => %operation, "error" => %e);
                    return Err(e);
                }
            }
        }
    }

    async fn try_execute(&self, operation: &ClusterOperation) -> Result<ClusterConfiguration, ClusterChangeError> {
        let mut applier = operation.applier(self.executor.clone());
        let started = applier.init(&self.current())?;
        self.update(started);
        let completed = applier.apply().await?;
        Ok(self.update(completed))
    }

    /// Apply `transformer`; the version is bumped only when members changed.
    fn update(&self, transformer: ConfigTransformer) -> ClusterConfiguration {
        let mut updated = None;
        self.configuration.send_if_modified(|configuration| {
            let next = transformer(configuration.clone());
            if next.same_members(configuration) {
                return false;
            }
            let version = configuration.version + 1;
            *configuration = next.with_version(version);
            updated = Some(configuration.clone());
            true
        });
        updated.unwrap_or_else(|| self.current())
    }

    fn retry_delay(&self, attempt: u32) -> Duration {
        let base = self.config.retry_backoff_ms.max(1);
        let backoff = base.saturating_mul(1 << attempt.min(10));
        Duration::from_millis(backoff + rand::thread_rng().gen_range(0..=base / 2))
    }
}

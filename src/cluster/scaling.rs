//! Pre- and post-scaling operations
//!
//! Both leave the configuration unchanged; their effect is the executor's side
//! effect on node id leases.

use futures::future::{BoxFuture, FutureExt};
use std::collections::BTreeSet;
use std::sync::Arc;

use super::applier::{identity, ApplierStage, ClusterOperationApplier, ConfigTransformer};
use super::configuration::{ClusterConfiguration, MemberId};
use super::errors::ClusterChangeError;
use super::executor::ClusterChangeExecutor;

const PRE_SCALING: &str = "pre-scaling";
const POST_SCALING: &str = "post-scaling";

pub struct PreScalingApplier {
    member_id: MemberId,
    cluster_members: BTreeSet<MemberId>,
    executor: Arc<dyn ClusterChangeExecutor>,
    /// Cluster size seen by `init`
    current_cluster_size: usize,
    stage: ApplierStage,
}

impl PreScalingApplier {
    pub fn new(
        member_id: MemberId,
        cluster_members: BTreeSet<MemberId>,
        executor: Arc<dyn ClusterChangeExecutor>,
    ) -> Self {
        Self {
            member_id,
            cluster_members,
            executor,
            current_cluster_size: 0,
            stage: ApplierStage::Created,
        }
    }
}

impl ClusterOperationApplier for PreScalingApplier {
    fn init(&mut self, current: &ClusterConfiguration) -> Result<ConfigTransformer, ClusterChangeError> {
        if !current.has_member(self.member_id) {
            return Err(ClusterChangeError::MemberNotFound {
                operation: PRE_SCALING,
                member_id: self.member_id,
            });
        }
        self.current_cluster_size = current.cluster_size();
        self.stage.initialized();
        Ok(identity())
    }

    fn apply(&mut self) -> BoxFuture<'static, Result<ConfigTransformer, ClusterChangeError>> {
        if let Err(failed) = self.stage.begin_apply(PRE_SCALING) {
            return failed;
        }
        let executor = self.executor.clone();
        let members = self.cluster_members.clone();
        let current_cluster_size = self.current_cluster_size;
        async move {
            executor.pre_scaling(current_cluster_size, &members).await?;
            Ok(identity())
        }
        .boxed()
    }
}

pub struct PostScalingApplier {
    member_id: MemberId,
    cluster_members: BTreeSet<MemberId>,
    executor: Arc<dyn ClusterChangeExecutor>,
    stage: ApplierStage,
}

impl PostScalingApplier {
    pub fn new(
        member_id: MemberId,
        cluster_members: BTreeSet<MemberId>,
        executor: Arc<dyn ClusterChangeExecutor>,
    ) -> Self {
        Self {
            member_id,
            cluster_members,
            executor,
            stage: ApplierStage::Created,
        }
    }
}

impl ClusterOperationApplier for PostScalingApplier {
    fn init(&mut self, current: &ClusterConfiguration) -> Result<ConfigTransformer, ClusterChangeError> {
        if !current.has_member(self.member_id) {
            return Err(ClusterChangeError::MemberNotFound {
                operation: POST_SCALING,
                member_id: self.member_id,
            });
        }
        self.stage.initialized();
        Ok(identity())
    }

    fn apply(&mut self) -> BoxFuture<'static, Result<ConfigTransformer, ClusterChangeError>> {
        if let Err(failed) = self.stage.begin_apply(POST_SCALING) {
            return failed;
        }
        let executor = self.executor.clone();
        let members = self.cluster_members.clone();
        async move {
            executor.post_scaling(&members).await?;
            Ok(identity())
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::configuration::MemberState;
    use crate::cluster::executor::NoopClusterChangeExecutor;
    use async_trait::async_trait;
    use std::collections::BTreeMap;

    struct FailingExecutor;

    #[async_trait]
    impl ClusterChangeExecutor for FailingExecutor {
        async fn delete_history(&self) -> Result<(), ClusterChangeError> {
            Ok(())
        }

        async fn pre_scaling(&self, _: usize, members: &BTreeSet<MemberId>) -> Result<(), ClusterChangeError> {
            Err(ClusterChangeError::NodeIdProvider {
                cluster_size: members.len(),
                reason: "expected".to_string(),
            })
        }

        async fn post_scaling(&self, _: &BTreeSet<MemberId>) -> Result<(), ClusterChangeError> {
            Ok(())
        }
    }

    fn members(ids: &[u32]) -> BTreeSet<MemberId> {
        ids.iter().copied().map(MemberId).collect()
    }

    fn configuration(ids: &[u32]) -> ClusterConfiguration {
        ids.iter().fold(ClusterConfiguration::init(), |config, id| {
            config.add_member(MemberId(*id), MemberState::active(BTreeMap::new()))
        })
    }

    #[test]
    fn init_fails_for_unknown_member() {
        let mut applier =
            PreScalingApplier::new(MemberId(1), members(&[1, 2]), Arc::new(NoopClusterChangeExecutor));

        let error = applier.init(&configuration(&[2])).err().unwrap();
        assert_eq!(
            error.to_string(),
            "Cannot apply pre-scaling operation: member 1 is not part of the current cluster configuration."
        );
    }

    #[tokio::test]
    async fn configuration_is_unchanged_after_apply() {
        let initial = configuration(&[1, 2]);
        let mut applier =
            PreScalingApplier::new(MemberId(1), members(&[1, 2]), Arc::new(NoopClusterChangeExecutor));

        let initialized = applier.init(&initial).unwrap()(initial.clone());
        let updated = applier.apply().await.unwrap()(initialized);
        assert_eq!(updated, initial);
    }

    #[tokio::test]
    async fn apply_failure_fails_the_future() {
        let mut applier = PreScalingApplier::new(MemberId(1), members(&[1, 2, 3]), Arc::new(FailingExecutor));
        applier.init(&configuration(&[1, 2])).unwrap();

        let error = applier.apply().await.err().unwrap();
        assert!(error.is_retryable());
    }

    #[tokio::test]
    async fn apply_requires_init_and_runs_once() {
        let mut applier =
            PostScalingApplier::new(MemberId(1), members(&[1]), Arc::new(NoopClusterChangeExecutor));
        assert!(matches!(
            applier.apply().await,
            Err(ClusterChangeError::NotInitialized { .. })
        ));

        applier.init(&configuration(&[1])).unwrap();
        assert!(applier.apply().await.is_ok());
        assert!(matches!(
            applier.apply().await,
            Err(ClusterChangeError::AlreadyApplied { .. })
        ));
    }
}

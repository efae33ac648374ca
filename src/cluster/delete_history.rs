use futures::future::{BoxFuture, FutureExt};
use std::sync::Arc;

use super::applier::{identity, ApplierStage, ClusterOperationApplier, ConfigTransformer};
use super::configuration::{ClusterConfiguration, MemberId};
use super::errors::ClusterChangeError;
use super::executor::ClusterChangeExecutor;

const DELETE_HISTORY: &str = "delete-history";

/// Purges the history of every exporter of the member; configuration is unchanged.
pub struct DeleteHistoryApplier {
    member_id: MemberId,
    executor: Arc<dyn ClusterChangeExecutor>,
    stage: ApplierStage,
}

impl DeleteHistoryApplier {
    pub fn new(member_id: MemberId, executor: Arc<dyn ClusterChangeExecutor>) -> Self {
        Self {
            member_id,
            executor,
            stage: ApplierStage::Created,
        }
    }
}

impl ClusterOperationApplier for DeleteHistoryApplier {
    fn init(&mut self, current: &ClusterConfiguration) -> Result<ConfigTransformer, ClusterChangeError> {
        if !current.has_member(self.member_id) {
            return Err(ClusterChangeError::MemberNotFound {
                operation: DELETE_HISTORY,
                member_id: self.member_id,
            });
        }
        self.stage.initialized();
        Ok(identity())
    }

    fn apply(&mut self) -> BoxFuture<'static, Result<ConfigTransformer, ClusterChangeError>> {
        if let Err(failed) = self.stage.begin_apply(DELETE_HISTORY) {
            return failed;
        }
        let executor = self.executor.clone();
        async move {
            executor.delete_history().await?;
            Ok(identity())
        }
        .boxed()
    }
}

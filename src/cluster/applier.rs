//! Two-phase cluster operation appliers
//!
//! `init` validates against the current configuration without side effects and
//! returns a transformer to record that the operation started. `apply` runs the
//! side effect and resolves to the transformer that records its completion.
//! Transformers must be idempotent: applying one to a configuration that
//! already reflects the change returns it unchanged.

use futures::future::{self, BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use super::configuration::{ClusterConfiguration, MemberId};
use super::delete_history::DeleteHistoryApplier;
use super::errors::ClusterChangeError;
use super::executor::ClusterChangeExecutor;
use super::member::{MemberJoinApplier, MemberLeaveApplier};
use super::scaling::{PostScalingApplier, PreScalingApplier};

pub type ConfigTransformer = Arc<dyn Fn(ClusterConfiguration) -> ClusterConfiguration + Send + Sync>;

/// Transformer that leaves the configuration as it is.
pub fn identity() -> ConfigTransformer {
    Arc::new(|configuration| configuration)
}

pub trait ClusterOperationApplier: Send {
    /// Validate the operation against `current`.
    ///
    /// # Returns
    /// * `Ok(transformer)` - Applied before `apply` is started
    /// * `Err(e)` - The operation is invalid; nothing was executed
    fn init(&mut self, current: &ClusterConfiguration) -> Result<ConfigTransformer, ClusterChangeError>;

    /// Execute the operation. Must be called once, after a successful `init`.
    fn apply(&mut self) -> BoxFuture<'static, Result<ConfigTransformer, ClusterChangeError>>;
}

/// Guards the init → apply order of one applier instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ApplierStage {
    Created,
    Initialized,
    Applied,
}

impl ApplierStage {
    pub(crate) fn initialized(&mut self) {
        *self = ApplierStage::Initialized;
    }

    /// Move to `Applied`, or return the failed future `apply` must resolve to.
    pub(crate) fn begin_apply(
        &mut self,
        operation: &'static str,
    ) -> Result<(), BoxFuture<'static, Result<ConfigTransformer, ClusterChangeError>>> {
        let error = match self {
            ApplierStage::Initialized => {
                *self = ApplierStage::Applied;
                return Ok(());
            }
            ApplierStage::Created => ClusterChangeError::NotInitialized { operation },
            ApplierStage::Applied => ClusterChangeError::AlreadyApplied { operation },
        };
        Err(future::ready(Err(error)).boxed())
    }
}

/// A change requested for one member of the cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClusterOperation {
    MemberJoin {
        member_id: MemberId,
    },
    MemberLeave {
        member_id: MemberId,
    },
    PreScaling {
        member_id: MemberId,
        cluster_members: BTreeSet<MemberId>,
    },
    PostScaling {
        member_id: MemberId,
        cluster_members: BTreeSet<MemberId>,
    },
    DeleteHistory {
        member_id: MemberId,
    },
}

impl ClusterOperation {
    pub fn member_id(&self) -> MemberId {
        match self {
            ClusterOperation::MemberJoin { member_id }
            | ClusterOperation::MemberLeave { member_id }
            | ClusterOperation::PreScaling { member_id, .. }
            | ClusterOperation::PostScaling { member_id, .. }
            | ClusterOperation::DeleteHistory { member_id } => *member_id,
        }
    }

    /// A fresh applier for one execution of this operation.
    pub fn applier(&self, executor: Arc<dyn ClusterChangeExecutor>) -> Box<dyn ClusterOperationApplier> {
        match self {
            ClusterOperation::MemberJoin { member_id } => Box::new(MemberJoinApplier::new(*member_id)),
            ClusterOperation::MemberLeave { member_id } => Box::new(MemberLeaveApplier::new(*member_id)),
            ClusterOperation::PreScaling {
                member_id,
                cluster_members,
            } => Box::new(PreScalingApplier::new(*member_id, cluster_members.clone(), executor)),
            ClusterOperation::PostScaling {
                member_id,
                cluster_members,
            } => Box::new(PostScalingApplier::new(*member_id, cluster_members.clone(), executor)),
            ClusterOperation::DeleteHistory { member_id } => {
                Box::new(DeleteHistoryApplier::new(*member_id, executor))
            }
        }
    }
}

impl fmt::Display for ClusterOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClusterOperation::MemberJoin { member_id } => write!(f, "member-join({})", member_id),
            ClusterOperation::MemberLeave { member_id } => write!(f, "member-leave({})", member_id),
            ClusterOperation::PreScaling {
                member_id,
                cluster_members,
            } => write!(f, "pre-scaling({}, size {})", member_id, cluster_members.len()),
            ClusterOperation::PostScaling {
                member_id,
                cluster_members,
            } => write!(f, "post-scaling({}, size {})", member_id, cluster_members.len()),
            ClusterOperation::DeleteHistory { member_id } => write!(f, "delete-history({})", member_id),
        }
    }
}

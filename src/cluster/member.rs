//! Member join and leave
//!
//! Both record progress in the configuration: `init` marks the member as
//! joining or leaving, `apply` marks it active or removes it.

use futures::future::{self, BoxFuture, FutureExt};
use std::sync::Arc;

use super::applier::{ApplierStage, ClusterOperationApplier, ConfigTransformer};
use super::configuration::{ClusterConfiguration, MemberId, MemberState, MemberStatus};
use super::errors::ClusterChangeError;

const MEMBER_JOIN: &str = "member-join";
const MEMBER_LEAVE: &str = "member-leave";

pub struct MemberJoinApplier {
    member_id: MemberId,
    stage: ApplierStage,
}

impl MemberJoinApplier {
    pub fn new(member_id: MemberId) -> Self {
        Self {
            member_id,
            stage: ApplierStage::Created,
        }
    }
}

impl ClusterOperationApplier for MemberJoinApplier {
    fn init(&mut self, current: &ClusterConfiguration) -> Result<ConfigTransformer, ClusterChangeError> {
        let member_id = self.member_id;
        if current
            .member(member_id)
            .map_or(false, |member| member.status == MemberStatus::Active)
        {
            return Err(ClusterChangeError::MemberAlreadyActive(member_id));
        }
        self.stage.initialized();
        Ok(Arc::new(move |configuration: ClusterConfiguration| {
            if configuration.has_member(member_id) {
                configuration
            } else {
                configuration.add_member(member_id, MemberState::joining())
            }
        }))
    }

    fn apply(&mut self) -> BoxFuture<'static, Result<ConfigTransformer, ClusterChangeError>> {
        if let Err(failed) = self.stage.begin_apply(MEMBER_JOIN) {
            return failed;
        }
        let member_id = self.member_id;
        let transformer: ConfigTransformer = Arc::new(move |configuration: ClusterConfiguration| {
            configuration.update_member(member_id, |state| state.with_status(MemberStatus::Active))
        });
        future::ready(Ok(transformer)).boxed()
    }
}

pub struct MemberLeaveApplier {
    member_id: MemberId,
    stage: ApplierStage,
}

impl MemberLeaveApplier {
    pub fn new(member_id: MemberId) -> Self {
        Self {
            member_id,
            stage: ApplierStage::Created,
        }
    }
}

impl ClusterOperationApplier for MemberLeaveApplier {
    fn init(&mut self, current: &ClusterConfiguration) -> Result<ConfigTransformer, ClusterChangeError> {
        let member_id = self.member_id;
        if !current.has_member(member_id) {
            return Err(ClusterChangeError::MemberNotFound {
                operation: MEMBER_LEAVE,
                member_id,
            });
        }
        self.stage.initialized();
        Ok(Arc::new(move |configuration: ClusterConfiguration| {
            configuration.update_member(member_id, |state| state.with_status(MemberStatus::Leaving))
        }))
    }

    fn apply(&mut self) -> BoxFuture<'static, Result<ConfigTransformer, ClusterChangeError>> {
        if let Err(failed) = self.stage.begin_apply(MEMBER_LEAVE) {
            return failed;
        }
        let member_id = self.member_id;
        let transformer: ConfigTransformer =
            Arc::new(move |configuration: ClusterConfiguration| configuration.remove_member(member_id));
        future::ready(Ok(transformer)).boxed()
    }
}

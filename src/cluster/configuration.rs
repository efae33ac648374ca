//! Replicated cluster configuration
//!
//! The configuration is a value: every change produces a new configuration,
//! and transformers are plain functions from old to new.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MemberId(pub u32);

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for MemberId {
    fn from(id: u32) -> Self {
        MemberId(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberStatus {
    Joining,
    Active,
    Leaving,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionState {
    /// Election priority of this member for the partition
    pub priority: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberState {
    /// Bumped on every change of this member
    pub version: u64,
    pub status: MemberStatus,
    pub partitions: BTreeMap<u32, PartitionState>,
}

impl MemberState {
    pub fn joining() -> Self {
        Self {
            version: 0,
            status: MemberStatus::Joining,
            partitions: BTreeMap::new(),
        }
    }

    pub fn active(partitions: BTreeMap<u32, PartitionState>) -> Self {
        Self {
            version: 0,
            status: MemberStatus::Active,
            partitions,
        }
    }

    pub fn with_status(mut self, status: MemberStatus) -> Self {
        if self.status != status {
            self.status = status;
            self.version += 1;
        }
        self
    }

    pub fn with_partition(mut self, partition_id: u32, priority: u32) -> Self {
        let state = PartitionState { priority };
        if self.partitions.get(&partition_id) != Some(&state) {
            self.partitions.insert(partition_id, state);
            self.version += 1;
        }
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfiguration {
    /// Bumped whenever the member map changes
    pub version: u64,
    pub members: BTreeMap<MemberId, MemberState>,
}

impl ClusterConfiguration {
    /// An empty configuration
    pub fn init() -> Self {
        Self::default()
    }

    pub fn has_member(&self, member_id: MemberId) -> bool {
        self.members.contains_key(&member_id)
    }

    pub fn member(&self, member_id: MemberId) -> Option<&MemberState> {
        self.members.get(&member_id)
    }

    pub fn member_ids(&self) -> BTreeSet<MemberId> {
        self.members.keys().copied().collect()
    }

    pub fn cluster_size(&self) -> usize {
        self.members.len()
    }

    pub fn add_member(mut self, member_id: MemberId, state: MemberState) -> Self {
        self.members.insert(member_id, state);
        self
    }

    /// Change a member if present; absent members are left absent.
    pub fn update_member<F>(mut self, member_id: MemberId, update: F) -> Self
    where
        F: FnOnce(MemberState) -> MemberState,
    {
        if let Some(state) = self.members.remove(&member_id) {
            self.members.insert(member_id, update(state));
        }
        self
    }

    pub fn remove_member(mut self, member_id: MemberId) -> Self {
        self.members.remove(&member_id);
        self
    }

    /// Same members, ignoring the configuration version.
    pub fn same_members(&self, other: &ClusterConfiguration) -> bool {
        self.members == other.members
    }

    pub fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }
}

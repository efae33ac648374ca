//! Cluster Changes (Layer 7)
//!
//! Distributed reconfiguration as two-phase operations over a replicated
//! [`ClusterConfiguration`]: synchronous validation (`init`) followed by an
//! asynchronous side effect (`apply`) that yields a configuration transformer.

pub mod applier;
pub mod configuration;
pub mod coordinator;
pub mod delete_history;
pub mod errors;
pub mod executor;
pub mod member;
pub mod node_id_provider;
pub mod scaling;

pub use applier::{identity, ClusterOperation, ClusterOperationApplier, ConfigTransformer};
pub use configuration::{ClusterConfiguration, MemberId, MemberState, MemberStatus, PartitionState};
pub use coordinator::{ClusterChangeConfig, ClusterChangeCoordinator};
pub use delete_history::DeleteHistoryApplier;
pub use errors::ClusterChangeError;
pub use executor::{ClusterChangeExecutor, NoopClusterChangeExecutor, PartitionClusterChangeExecutor};
pub use member::{MemberJoinApplier, MemberLeaveApplier};
pub use node_id_provider::{NodeIdProvider, StaticNodeIdProvider};
pub use scaling::{PostScalingApplier, PreScalingApplier};

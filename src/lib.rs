#[macro_use]
mod macros;

pub mod cluster;
pub mod config;
pub mod db;
pub mod engine;
pub mod exporter;
pub mod log;
pub mod partition;
pub mod record;
pub mod runtime;
pub mod state;
pub mod stream;

pub use cluster::{ClusterChangeCoordinator, ClusterConfiguration, ClusterOperation, MemberId};
pub use config::EngineConfig;
pub use db::KeyedStateStore;
pub use engine::{CommandResponse, Engine, ProcessingError, Rejection};
pub use exporter::{Exporter, ExporterRepository};
pub use partition::{CommandRequest, Partition, PartitionError};
pub use record::{Record, RecordValue};
pub use runtime::{EngineRuntime, RuntimeError};
pub use state::ProcessingState;
pub use stream::{StreamProcessor, StreamProcessorHandle, StreamProcessorPhase};

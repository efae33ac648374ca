//! Log Stream (Layer 3)
//!
//! The per-partition, append-only command/event log. Positions are assigned on
//! append and strictly increase; readers only see records up to the commit
//! position published by the replication collaborator.

pub mod errors;
#[cfg(feature = "persistent-storage")]
pub mod rocksdb_storage;
pub mod storage;
pub mod stream;

pub use errors::LogError;
#[cfg(feature = "persistent-storage")]
pub use rocksdb_storage::RocksDbLogStorage;
pub use storage::{LogStorage, MemoryLogStorage};
pub use stream::{LogAppendEntry, LogStream, LogStreamConfig, LogStreamReader};

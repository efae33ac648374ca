//! Stream Processor (Layer 6)
//!
//! Drives one partition: replays events into state on start, then processes
//! commands in log order with state and processed position committed
//! atomically per command.

pub mod errors;
pub mod event_bus;
pub mod flow_control;
pub mod phase;
pub mod processing;
pub mod processor;
pub mod replay;
pub mod response;

pub use errors::StreamProcessorError;
pub use event_bus::EventBus;
pub use flow_control::{FlowControlConfig, InFlightGuard, RequestLimitExhausted, RequestLimiter};
pub use phase::StreamProcessorPhase;
pub use processing::{CommandOutcome, ProcessingStateMachine};
pub use processor::{StreamProcessor, StreamProcessorConfig, StreamProcessorHandle, StreamProcessorMode};
pub use replay::{ReplayStateMachine, ReplaySummary};
pub use response::ResponseRegistry;

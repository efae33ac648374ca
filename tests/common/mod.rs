//! Shared harness: one stream processor over an in-memory store and log.
#![allow(dead_code)]

use eventide::db::{KeyedStateStore, MemoryBackend};
use eventide::engine::{CommandResponse, Engine};
use eventide::log::{LogAppendEntry, LogStream, LogStreamConfig};
use eventide::record::{AuthInfo, Intent, Record, RecordMetadata, RecordValue, NO_KEY, NO_POSITION};
use eventide::state::ProcessingState;
use eventide::stream::{
    EventBus, ResponseRegistry, StreamProcessor, StreamProcessorConfig, StreamProcessorError,
    StreamProcessorHandle, StreamProcessorPhase,
};
use slog::Drain;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

pub const PARTITION_ID: u32 = 1;
const REQUEST_STREAM: i32 = 7;

pub fn create_test_logger() -> slog::Logger {
    let decorator = slog_term::PlainDecorator::new(slog_term::TestStdoutWriter);
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    slog::Logger::root(drain, slog::o!())
}

pub struct Harness {
    pub backend: Arc<MemoryBackend>,
    pub log: Arc<LogStream>,
    pub responses: Arc<ResponseRegistry>,
    pub event_bus: Arc<EventBus<Record>>,
    pub handle: StreamProcessorHandle,
    task: JoinHandle<Result<(), StreamProcessorError>>,
}

impl Harness {
    pub async fn start(config: StreamProcessorConfig) -> Self {
        let log = Arc::new(LogStream::in_memory(PARTITION_ID, LogStreamConfig::default()));
        Self::start_with(Arc::new(MemoryBackend::new()), log, config, false).await
    }

    /// Start a processor on existing storage, e.g. to restart after `stop`.
    pub async fn start_with(
        backend: Arc<MemoryBackend>,
        log: Arc<LogStream>,
        config: StreamProcessorConfig,
        authorization_checks: bool,
    ) -> Self {
        let state = ProcessingState::new(PARTITION_ID, KeyedStateStore::new(backend.clone()));
        let engine = Arc::new(Engine::new(authorization_checks, config.max_follow_up_records));
        let responses = Arc::new(ResponseRegistry::new());
        let event_bus = Arc::new(EventBus::new(1024));
        let (processor, handle) = StreamProcessor::new(
            state,
            engine,
            log.clone(),
            responses.clone(),
            event_bus.clone(),
            config,
            create_test_logger(),
        );
        let task = tokio::spawn(processor.run());
        handle
            .wait_for_phase(|phase| phase != StreamProcessorPhase::Initializing)
            .await
            .expect("processor stopped while starting");

        Self {
            backend,
            log,
            responses,
            event_bus,
            handle,
            task,
        }
    }

    pub async fn submit(&self, intent: Intent, value: impl Into<RecordValue>) -> CommandResponse {
        self.submit_as(intent, value, AuthInfo::default()).await
    }

    pub async fn submit_as(
        &self,
        intent: Intent,
        value: impl Into<RecordValue>,
        authorization: AuthInfo,
    ) -> CommandResponse {
        let (request_id, response) = self.responses.register(REQUEST_STREAM);
        self.log
            .try_write(vec![LogAppendEntry {
                key: NO_KEY,
                source_record_position: NO_POSITION,
                metadata: RecordMetadata::command(intent)
                    .with_request(REQUEST_STREAM, request_id)
                    .with_authorization(authorization),
                value: value.into(),
            }])
            .expect("failed to write command");
        tokio::time::timeout(Duration::from_secs(5), response)
            .await
            .expect("no response within 5s")
            .expect("response dropped")
    }

    /// Committed state, read through a separate view on the same backend.
    pub fn state(&self) -> ProcessingState {
        ProcessingState::new(PARTITION_ID, KeyedStateStore::new(self.backend.clone()))
    }

    /// Every record currently in the log.
    pub fn records(&self) -> Vec<Record> {
        self.log
            .new_reader()
            .collect::<Result<Vec<_>, _>>()
            .expect("failed to read log")
    }

    pub async fn stop(self) -> Result<(), StreamProcessorError> {
        self.handle.close().await?;
        self.task.await.expect("processor task panicked")
    }
}

//! Partition (Layer 7)
//!
//! Wires one partition together: keyed state store, log stream, engine, the
//! stream processor task and the exporter director task. Clients submit
//! commands through [`Partition::submit`] and await the response.

use slog::{error, info, o, Logger};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::config::EngineConfig;
use crate::db::{DbError, KeyedStateStore, SnapshotFileSet};
use crate::engine::{CommandResponse, Engine};
use crate::exporter::{compaction_watermark, ExporterDirector, ExporterPositions, ExporterRepository};
use crate::log::{LogAppendEntry, LogError, LogStream};
use crate::record::{AgentInfo, AuthInfo, Intent, Record, RecordMetadata, RecordValue, NO_KEY, NO_POSITION};
use crate::state::ProcessingState;
use crate::stream::{
    EventBus, RequestLimitExhausted, RequestLimiter, ResponseRegistry, StreamProcessor, StreamProcessorError,
    StreamProcessorHandle, StreamProcessorPhase,
};

/// Request stream id of commands submitted through a partition handle
const LOCAL_REQUEST_STREAM: i32 = 1;

const EVENT_BUS_CAPACITY: usize = 1024;

#[derive(Debug, Error)]
pub enum PartitionError {
    #[error("Expected partition {partition_id} to accept commands, but it is {phase}")]
    Unavailable {
        partition_id: u32,
        phase: StreamProcessorPhase,
    },

    #[error(transparent)]
    RequestLimit(#[from] RequestLimitExhausted),

    #[error(transparent)]
    Log(#[from] LogError),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Processor(#[from] StreamProcessorError),

    #[error("Partition {partition_id} stopped before responding")]
    ResponseDropped { partition_id: u32 },

    #[error("Persistent storage for {0} requires the persistent-storage feature")]
    PersistenceUnavailable(PathBuf),

    #[error("Partition task failed: {0}")]
    Task(String),
}

/// A command submitted by a client
#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub intent: Intent,
    pub key: i64,
    pub value: RecordValue,
    pub authorization: AuthInfo,
    pub agent: Option<AgentInfo>,
    pub operation_reference: Option<u64>,
    pub batch_operation_reference: Option<i64>,
}

impl CommandRequest {
    pub fn new(intent: Intent, value: impl Into<RecordValue>) -> Self {
        Self {
            intent,
            key: NO_KEY,
            value: value.into(),
            authorization: AuthInfo::default(),
            agent: None,
            operation_reference: None,
            batch_operation_reference: None,
        }
    }

    pub fn with_key(mut self, key: i64) -> Self {
        self.key = key;
        self
    }

    pub fn with_authorization(mut self, authorization: AuthInfo) -> Self {
        self.authorization = authorization;
        self
    }

    pub fn with_agent(mut self, agent: AgentInfo) -> Self {
        self.agent = Some(agent);
        self
    }

    pub fn with_operation_reference(mut self, operation_reference: u64) -> Self {
        self.operation_reference = Some(operation_reference);
        self
    }

    pub fn with_batch_operation_reference(mut self, batch_operation_reference: i64) -> Self {
        self.batch_operation_reference = Some(batch_operation_reference);
        self
    }

    fn into_entry(self, request_stream_id: i32, request_id: u64) -> LogAppendEntry {
        let mut metadata = RecordMetadata::command(self.intent)
            .with_request(request_stream_id, request_id)
            .with_authorization(self.authorization);
        metadata.agent = self.agent;
        metadata.operation_reference = self.operation_reference;
        metadata.batch_operation_reference = self.batch_operation_reference;
        LogAppendEntry {
            key: self.key,
            source_record_position: NO_POSITION,
            metadata,
            value: self.value,
        }
    }
}

pub struct Partition {
    partition_id: u32,
    node_id: u32,
    log: Arc<LogStream>,
    responses: Arc<ResponseRegistry>,
    limiter: RequestLimiter,
    event_bus: Arc<EventBus<Record>>,
    exporter_positions: ExporterPositions,
    processor: StreamProcessorHandle,
    processor_task: Mutex<Option<JoinHandle<Result<(), StreamProcessorError>>>>,
    exporter_task: Mutex<Option<JoinHandle<()>>>,
    shutdown_tx: watch::Sender<bool>,
    logger: Logger,
}

impl Partition {
    /// Open the partition's storage and start its tasks.
    ///
    /// # Arguments
    /// * `partition_id` - Id of the partition, encoded into every generated key
    /// * `config` - Node configuration
    /// * `exporters` - Exporters to feed with the partition's events
    /// * `logger` - Parent logger
    pub fn start(
        partition_id: u32,
        config: &EngineConfig,
        exporters: &ExporterRepository,
        logger: Logger,
    ) -> Result<Self, PartitionError> {
        let logger = logger.new(o!("partition" => partition_id));
        let (store, log) = open_storage(partition_id, config)?;
        let state = ProcessingState::new(partition_id, store);

        let engine = Arc::new(Engine::new(
            config.authorization_checks,
            config.stream_processor.max_follow_up_records,
        ));
        let responses = Arc::new(ResponseRegistry::new());
        let event_bus = Arc::new(EventBus::new(EVENT_BUS_CAPACITY));
        let exporter_positions = ExporterPositions::new();

        let director = ExporterDirector::new(
            exporters,
            exporter_positions.clone(),
            log.clone(),
            &event_bus,
            logger.clone(),
        );
        let (processor, handle) = StreamProcessor::new(
            state,
            engine,
            log.clone(),
            responses.clone(),
            event_bus.clone(),
            config.stream_processor.clone(),
            logger.clone(),
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let processor_task = tokio::spawn(processor.run());
        let exporter_task = tokio::spawn(director.run(shutdown_rx));
        info!(logger, "Partition started"; "mode" => ?config.stream_processor.mode);

        Ok(Self {
            partition_id,
            node_id: config.node_id,
            log,
            responses,
            limiter: RequestLimiter::new(&config.flow_control),
            event_bus,
            exporter_positions,
            processor: handle,
            processor_task: Mutex::new(Some(processor_task)),
            exporter_task: Mutex::new(Some(exporter_task)),
            shutdown_tx,
            logger,
        })
    }

    pub fn partition_id(&self) -> u32 {
        self.partition_id
    }

    pub fn processor(&self) -> &StreamProcessorHandle {
        &self.processor
    }

    pub fn log(&self) -> &Arc<LogStream> {
        &self.log
    }

    pub fn exporter_positions(&self) -> &ExporterPositions {
        &self.exporter_positions
    }

    /// Committed events, as they are processed.
    pub fn subscribe(&self) -> broadcast::Receiver<Record> {
        self.event_bus.subscribe()
    }

    /// Append a command and wait for its response.
    ///
    /// # Returns
    /// * `Ok(response)` - The command's response; may be a rejection
    /// * `Err(e)` - The command was not accepted, or the partition stopped
    pub async fn submit(&self, request: CommandRequest) -> Result<CommandResponse, PartitionError> {
        let phase = self.processor.phase();
        if phase != StreamProcessorPhase::Processing {
            return Err(PartitionError::Unavailable {
                partition_id: self.partition_id,
                phase,
            });
        }
        let _in_flight = self.limiter.try_acquire()?;

        let (request_id, response) = self.responses.register(LOCAL_REQUEST_STREAM);
        let entry = request.into_entry(LOCAL_REQUEST_STREAM, request_id);
        if let Err(e) = self.log.try_write(vec![entry]) {
            self.responses.cancel(LOCAL_REQUEST_STREAM, request_id);
            return Err(e.into());
        }
        response.await.map_err(|_| PartitionError::ResponseDropped {
            partition_id: self.partition_id,
        })
    }

    /// Take a snapshot under `root` and compact the log up to what it and
    /// every exporter no longer need.
    pub async fn snapshot(&self, root: PathBuf, checkpoint_id: u64) -> Result<SnapshotFileSet, PartitionError> {
        let snapshot = self.processor.snapshot(root, checkpoint_id, self.node_id).await?;
        let watermark = compaction_watermark(snapshot.metadata.last_processed_position, &self.exporter_positions);
        let removed = self.log.compact(watermark)?;
        info!(self.logger, "Compacted log after snapshot";
            "watermark" => watermark, "removed" => removed);
        Ok(snapshot)
    }

    /// Stop the processor and the exporters.
    ///
    /// # Returns
    /// * `Err(e)` - The processor had failed with `e`
    pub async fn close(&self) -> Result<(), PartitionError> {
        self.processor.close().await?;
        let _ = self.shutdown_tx.send(true);

        let exporter_task = self.exporter_task.lock().ok().and_then(|mut task| task.take());
        if let Some(task) = exporter_task {
            task.await.map_err(|e| PartitionError::Task(e.to_string()))?;
        }

        let processor_task = self.processor_task.lock().ok().and_then(|mut task| task.take());
        let result = match processor_task {
            Some(task) => task.await.map_err(|e| PartitionError::Task(e.to_string()))?,
            None => Ok(()),
        };
        self.responses.clear();
        match result {
            Ok(()) => {
                info!(self.logger, "Partition closed");
                Ok(())
            }
            Err(e) => {
                error!(self.logger, "Partition closed after failure"; "error" => %e);
                Err(e.into())
            }
        }
    }
}

fn open_storage(
    partition_id: u32,
    config: &EngineConfig,
) -> Result<(KeyedStateStore, Arc<LogStream>), PartitionError> {
    match config.partition_dir(partition_id) {
        #[cfg(feature = "persistent-storage")]
        Some(dir) => {
            let backend = crate::db::RocksDbBackend::open_or_create(dir.join("state"))?;
            let storage = crate::log::RocksDbLogStorage::open_or_create(dir.join("log"))?;
            Ok((
                KeyedStateStore::new(Arc::new(backend)),
                Arc::new(LogStream::new(partition_id, Arc::new(storage), config.log.clone())),
            ))
        }
        #[cfg(not(feature = "persistent-storage"))]
        Some(dir) => Err(PartitionError::PersistenceUnavailable(dir)),
        None => Ok((
            KeyedStateStore::in_memory(),
            Arc::new(LogStream::in_memory(partition_id, config.log.clone())),
        )),
    }
}

//! Stream Processor (Layer 6)
//!
//! One actor per partition owns the partition's [`ProcessingState`] and reads
//! the log strictly in order. Nothing else mutates the state; other tasks
//! talk to the actor through its [`StreamProcessorHandle`].

use serde::{Deserialize, Serialize};
use slog::{error, info, o, warn, Logger};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};

use super::errors::StreamProcessorError;
use super::event_bus::EventBus;
use super::phase::StreamProcessorPhase;
use super::processing::{CommandOutcome, ProcessingStateMachine};
use super::replay::ReplayStateMachine;
use super::response::ResponseRegistry;
use crate::db::{SnapshotFileSet, SnapshotId};
use crate::engine::{Engine, DEFAULT_MAX_FOLLOW_UP_RECORDS};
use crate::log::{LogStream, LogStreamReader};
use crate::record::Record;
use crate::state::{MigrationRunner, ProcessingState};

/// Whether the partition processes commands (leader) or only follows the log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamProcessorMode {
    Processing,
    Replay,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamProcessorConfig {
    pub mode: StreamProcessorMode,
    /// Attempts after a transient failure before the partition fails
    pub max_command_retries: u32,
    /// Base delay between attempts; doubles per attempt, plus jitter
    pub retry_backoff_ms: u64,
    /// Records one command may produce (0 = unlimited)
    pub max_follow_up_records: usize,
}

impl Default for StreamProcessorConfig {
    fn default() -> Self {
        Self {
            mode: StreamProcessorMode::Processing,
            max_command_retries: 3,
            retry_backoff_ms: 10,
            max_follow_up_records: DEFAULT_MAX_FOLLOW_UP_RECORDS,
        }
    }
}

enum ControlMessage {
    Pause,
    Resume,
    Snapshot {
        root: PathBuf,
        checkpoint_id: u64,
        node_id: u32,
        reply: oneshot::Sender<Result<SnapshotFileSet, StreamProcessorError>>,
    },
    Close(oneshot::Sender<()>),
}

/// Control and observation of a running stream processor
#[derive(Clone)]
pub struct StreamProcessorHandle {
    partition_id: u32,
    control_tx: mpsc::Sender<ControlMessage>,
    phase_rx: watch::Receiver<StreamProcessorPhase>,
    last_processed_rx: watch::Receiver<i64>,
}

impl StreamProcessorHandle {
    pub fn partition_id(&self) -> u32 {
        self.partition_id
    }

    pub fn phase(&self) -> StreamProcessorPhase {
        *self.phase_rx.borrow()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<StreamProcessorPhase> {
        self.phase_rx.clone()
    }

    pub fn last_processed_position(&self) -> i64 {
        *self.last_processed_rx.borrow()
    }

    async fn send(&self, message: ControlMessage) -> Result<(), StreamProcessorError> {
        self.control_tx
            .send(message)
            .await
            .map_err(|_| StreamProcessorError::Closed)
    }

    /// Stop taking new commands after the current one; a follower stops applying events.
    pub async fn pause(&self) -> Result<(), StreamProcessorError> {
        self.send(ControlMessage::Pause).await
    }

    pub async fn resume(&self) -> Result<(), StreamProcessorError> {
        self.send(ControlMessage::Resume).await
    }

    /// Export a snapshot of the committed state between two commands.
    pub async fn snapshot(
        &self,
        root: PathBuf,
        checkpoint_id: u64,
        node_id: u32,
    ) -> Result<SnapshotFileSet, StreamProcessorError> {
        let (reply, rx) = oneshot::channel();
        self.send(ControlMessage::Snapshot {
            root,
            checkpoint_id,
            node_id,
            reply,
        })
        .await?;
        rx.await.map_err(|_| StreamProcessorError::Closed)?
    }

    /// Close the processor and wait until it stopped.
    pub async fn close(&self) -> Result<(), StreamProcessorError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.send(ControlMessage::Close(ack_tx)).await.is_err() {
            // already gone
            return Ok(());
        }
        ack_rx.await.map_err(|_| StreamProcessorError::Closed)
    }

    /// Wait until the phase satisfies `predicate`.
    pub async fn wait_for_phase<F>(&self, predicate: F) -> Result<StreamProcessorPhase, StreamProcessorError>
    where
        F: Fn(StreamProcessorPhase) -> bool,
    {
        let mut rx = self.phase_rx.clone();
        let phase = rx
            .wait_for(|phase| predicate(*phase))
            .await
            .map_err(|_| StreamProcessorError::Closed)?;
        Ok(*phase)
    }

    /// Wait until the command at `position` (or a later one) was processed.
    pub async fn wait_for_processed(&self, position: i64) -> Result<(), StreamProcessorError> {
        let mut rx = self.last_processed_rx.clone();
        rx.wait_for(|processed| *processed >= position)
            .await
            .map_err(|_| StreamProcessorError::Closed)?;
        Ok(())
    }
}

/// What woke the actor while it was idle
enum Wakeup {
    Control(Option<ControlMessage>),
    Log,
}

pub struct StreamProcessor {
    partition_id: u32,
    state: ProcessingState,
    engine: Arc<Engine>,
    log: Arc<LogStream>,
    processing: ProcessingStateMachine,
    migrations: MigrationRunner,
    config: StreamProcessorConfig,
    logger: Logger,
    control_rx: mpsc::Receiver<ControlMessage>,
    phase_tx: watch::Sender<StreamProcessorPhase>,
    last_processed_tx: watch::Sender<i64>,
    paused: bool,
}

/// What the main loop does after handling a control message
enum Flow {
    Continue,
    Stop,
}

impl StreamProcessor {
    pub fn new(
        state: ProcessingState,
        engine: Arc<Engine>,
        log: Arc<LogStream>,
        responses: Arc<ResponseRegistry>,
        event_bus: Arc<EventBus<Record>>,
        config: StreamProcessorConfig,
        logger: Logger,
    ) -> (Self, StreamProcessorHandle) {
        let partition_id = state.partition_id();
        let logger = logger.new(o!("partition" => partition_id));
        let (control_tx, control_rx) = mpsc::channel(16);
        let (phase_tx, phase_rx) = watch::channel(StreamProcessorPhase::Initializing);
        let (last_processed_tx, last_processed_rx) = watch::channel(-1);

        let processing = ProcessingStateMachine::new(
            engine.clone(),
            log.clone(),
            responses,
            event_bus,
            config.clone(),
            logger.clone(),
        );

        let processor = Self {
            partition_id,
            state,
            engine,
            log,
            processing,
            migrations: MigrationRunner::new(logger.clone()),
            config,
            logger,
            control_rx,
            phase_tx,
            last_processed_tx,
            paused: false,
        };
        let handle = StreamProcessorHandle {
            partition_id,
            control_tx,
            phase_rx,
            last_processed_rx,
        };
        (processor, handle)
    }

    /// Replace the migrations run before replay.
    pub fn with_migrations(mut self, migrations: MigrationRunner) -> Self {
        self.migrations = migrations;
        self
    }

    fn phase(&self) -> StreamProcessorPhase {
        *self.phase_tx.borrow()
    }

    fn transition(&self, next: StreamProcessorPhase) {
        let current = self.phase();
        if current == next {
            return;
        }
        if !current.can_transition_to(next) {
            warn!(self.logger, "Ignoring invalid phase transition";
                "from" => %current, "to" => %next);
            return;
        }
        info!(self.logger, "Stream processor phase changed"; "from" => %current, "to" => %next);
        self.phase_tx.send_replace(next);
    }

    fn publish_last_processed(&self, position: i64) {
        self.last_processed_tx.send_if_modified(|current| {
            if position > *current {
                *current = position;
                true
            } else {
                false
            }
        });
    }

    /// Run until closed.
    ///
    /// # Returns
    /// * `Ok(())` - Closed on request
    /// * `Err(e)` - The processor failed with `e`, then was closed
    pub async fn run(mut self) -> Result<(), StreamProcessorError> {
        info!(self.logger, "Starting stream processor"; "mode" => ?self.config.mode);
        match self.run_phases().await {
            Ok(()) => Ok(()),
            Err(e) => {
                error!(self.logger, "Stream processor failed"; "error" => %e);
                self.transition(StreamProcessorPhase::Failed);
                self.processing_failed().await;
                Err(e)
            }
        }
    }

    async fn run_phases(&mut self) -> Result<(), StreamProcessorError> {
        let executed = self.migrations.run(&mut self.state)?;
        if !executed.is_empty() {
            info!(self.logger, "Executed migrations"; "migrations" => ?executed);
        }
        let last_processed = self.state.last_processed().get()?;
        self.publish_last_processed(last_processed);

        self.transition(StreamProcessorPhase::Replaying);
        let mut reader = self.log.new_reader();
        let mut commits = self.log.subscribe_commits();
        let mut replay = ReplayStateMachine::new(self.engine.clone(), last_processed, self.logger.clone());
        let summary = replay.replay_available(&mut self.state, &mut reader)?;
        self.publish_last_processed(summary.last_processed_position);
        info!(self.logger, "Replay finished";
            "events_applied" => summary.events_applied,
            "last_processed_position" => summary.last_processed_position
        );

        match self.config.mode {
            StreamProcessorMode::Replay => self.follow(replay, reader, &mut commits).await,
            StreamProcessorMode::Processing => {
                reader.seek(summary.last_processed_position + 1);
                self.transition(StreamProcessorPhase::Processing);
                self.process(reader, &mut commits).await
            }
        }
    }

    /// Follower: keep replaying committed events as they arrive.
    ///
    /// While paused nothing is applied; resuming catches up with the log.
    async fn follow(
        &mut self,
        mut replay: ReplayStateMachine,
        mut reader: LogStreamReader,
        commits: &mut watch::Receiver<i64>,
    ) -> Result<(), StreamProcessorError> {
        loop {
            if let Wakeup::Control(message) = self.wait(commits).await {
                if let Flow::Stop = self.handle_control(message) {
                    return Ok(());
                }
            }
            if !self.paused {
                let summary = replay.replay_available(&mut self.state, &mut reader)?;
                self.publish_last_processed(summary.last_processed_position);
            }
        }
    }

    /// Leader: process every new command in log order.
    async fn process(
        &mut self,
        mut reader: LogStreamReader,
        commits: &mut watch::Receiver<i64>,
    ) -> Result<(), StreamProcessorError> {
        let mut current: Option<Record> = None;
        loop {
            while let Ok(message) = self.control_rx.try_recv() {
                if let Flow::Stop = self.handle_control(Some(message)) {
                    return Ok(());
                }
            }

            if self.paused {
                if let Wakeup::Control(message) = self.wait(commits).await {
                    if let Flow::Stop = self.handle_control(message) {
                        return Ok(());
                    }
                }
                continue;
            }

            if current.is_none() {
                current = match reader.next_record() {
                    Some(record) => Some(record?),
                    None => None,
                };
            }
            let Some(record) = current.take() else {
                if let Wakeup::Control(message) = self.wait(commits).await {
                    if let Flow::Stop = self.handle_control(message) {
                        return Ok(());
                    }
                }
                continue;
            };

            if !record.is_command() {
                continue;
            }

            match self.processing.process_command(&mut self.state, &record).await? {
                CommandOutcome::Processed { .. } | CommandOutcome::Skipped => {
                    self.publish_last_processed(record.position);
                }
                CommandOutcome::Backpressured => {
                    self.transition(StreamProcessorPhase::Paused);
                    if let Wakeup::Control(message) = self.wait(commits).await {
                        if let Flow::Stop = self.handle_control(message) {
                            return Ok(());
                        }
                    }
                    if !self.paused {
                        self.transition(StreamProcessorPhase::Processing);
                    }
                    current = Some(record);
                }
            }
        }
    }

    async fn wait(&mut self, commits: &mut watch::Receiver<i64>) -> Wakeup {
        tokio::select! {
            biased;
            message = self.control_rx.recv() => Wakeup::Control(message),
            changed = commits.changed() => match changed {
                Ok(()) => Wakeup::Log,
                // the log is gone, nothing more to read
                Err(_) => Wakeup::Control(None),
            },
        }
    }

    fn handle_control(&mut self, message: Option<ControlMessage>) -> Flow {
        match message {
            Some(ControlMessage::Pause) => {
                self.paused = true;
                if self.config.mode == StreamProcessorMode::Processing {
                    self.transition(StreamProcessorPhase::Paused);
                }
                Flow::Continue
            }
            Some(ControlMessage::Resume) => {
                self.paused = false;
                if self.config.mode == StreamProcessorMode::Processing {
                    self.transition(StreamProcessorPhase::Processing);
                }
                Flow::Continue
            }
            Some(ControlMessage::Snapshot {
                root,
                checkpoint_id,
                node_id,
                reply,
            }) => {
                let _ = reply.send(self.take_snapshot(root, checkpoint_id, node_id));
                Flow::Continue
            }
            Some(ControlMessage::Close(ack)) => {
                self.close();
                let _ = ack.send(());
                Flow::Stop
            }
            None => {
                self.close();
                Flow::Stop
            }
        }
    }

    fn take_snapshot(
        &self,
        root: PathBuf,
        checkpoint_id: u64,
        node_id: u32,
    ) -> Result<SnapshotFileSet, StreamProcessorError> {
        let position = self.state.last_processed().get()?;
        let id = SnapshotId::new(self.partition_id, checkpoint_id, node_id);
        let snapshot = self.state.store().export_snapshot(&root, id, position)?;
        info!(self.logger, "Snapshot taken";
            "snapshot" => %id, "last_processed_position" => position);
        Ok(snapshot)
    }

    fn close(&self) {
        info!(self.logger, "Closing stream processor");
        self.processing.clear_pending_responses();
        self.transition(StreamProcessorPhase::Closed);
    }

    /// FAILED: nothing is read anymore; wait for the close request.
    async fn processing_failed(&mut self) {
        self.processing.clear_pending_responses();
        loop {
            match self.control_rx.recv().await {
                Some(ControlMessage::Close(ack)) => {
                    self.transition(StreamProcessorPhase::Closed);
                    let _ = ack.send(());
                    return;
                }
                Some(ControlMessage::Snapshot { reply, .. }) => {
                    let _ = reply.send(Err(StreamProcessorError::InvalidPhase {
                        action: "snapshot",
                        phase: StreamProcessorPhase::Failed,
                    }));
                }
                Some(ControlMessage::Pause) | Some(ControlMessage::Resume) => {}
                None => {
                    self.transition(StreamProcessorPhase::Closed);
                    return;
                }
            }
        }
    }
}

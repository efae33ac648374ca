//! Exporter director: feeds the committed events of one partition to its exporters

use slog::{debug, info, o, warn, Logger};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};

use super::{Exporter, ExporterPositions, ExporterRepository};
use crate::log::LogStream;
use crate::record::Record;
use crate::stream::EventBus;

const EXPORT_RETRY_DELAY: Duration = Duration::from_millis(100);

pub struct ExporterDirector {
    exporters: Vec<Box<dyn Exporter>>,
    positions: ExporterPositions,
    log: Arc<LogStream>,
    events: broadcast::Receiver<Record>,
    /// Published events that are not yet committed in the log
    pending: VecDeque<Record>,
    logger: Logger,
}

impl ExporterDirector {
    /// Subscribes to `event_bus` right away so no event published after this
    /// call is missed.
    pub fn new(
        repository: &ExporterRepository,
        positions: ExporterPositions,
        log: Arc<LogStream>,
        event_bus: &EventBus<Record>,
        logger: Logger,
    ) -> Self {
        let exporters = repository.instantiate_all();
        for exporter in &exporters {
            positions.register(exporter.id());
        }
        Self {
            exporters,
            positions,
            events: event_bus.subscribe(),
            logger: logger.new(o!("partition" => log.partition_id(), "component" => "exporter-director")),
            log,
            pending: VecDeque::new(),
        }
    }

    /// Export until `shutdown` turns true or the event bus closes.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        if self.exporters.is_empty() {
            debug!(self.logger, "No exporters configured");
            return;
        }
        info!(self.logger, "Starting exporter director"; "exporters" => self.exporters.len());
        let mut commits = self.log.subscribe_commits();

        if !self.catch_up(&mut shutdown).await {
            return;
        }
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                received = self.events.recv() => match received {
                    Ok(record) => {
                        if record.is_event() {
                            self.pending.push_back(record);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(self.logger, "Exporter director lagged behind, reading from the log";
                            "skipped" => skipped);
                        self.pending.clear();
                        if !self.catch_up(&mut shutdown).await {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                changed = commits.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
            if !self.export_committed(&mut shutdown).await {
                break;
            }
        }
        info!(self.logger, "Exporter director stopped");
    }

    async fn export_committed(&mut self, shutdown: &mut watch::Receiver<bool>) -> bool {
        let commit_position = self.log.commit_position();
        while self
            .pending
            .front()
            .map_or(false, |record| record.position <= commit_position)
        {
            if let Some(record) = self.pending.pop_front() {
                if !self.export(&record, shutdown).await {
                    return false;
                }
            }
        }
        true
    }

    /// Export every committed event the slowest exporter has not seen yet.
    ///
    /// A failed read is retried from the same position, so no record is skipped.
    async fn catch_up(&mut self, shutdown: &mut watch::Receiver<bool>) -> bool {
        let mut next = self.positions.lowest().unwrap_or(-1) + 1;
        let mut reader = self.log.new_reader();
        reader.seek(next);
        while let Some(record) = reader.next_record() {
            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    warn!(self.logger, "Failed to read log while catching up, retrying";
                        "position" => next,
                        "error" => %e
                    );
                    tokio::select! {
                        _ = shutdown.changed() => return false,
                        _ = tokio::time::sleep(EXPORT_RETRY_DELAY) => {}
                    }
                    reader.seek(next);
                    continue;
                }
            };
            next = record.position + 1;
            if record.is_event() && !self.export(&record, shutdown).await {
                return false;
            }
        }
        true
    }

    /// Hand `record` to every exporter that has not exported it, retrying
    /// failures until they succeed or shutdown is requested.
    async fn export(&mut self, record: &Record, shutdown: &mut watch::Receiver<bool>) -> bool {
        for exporter in self.exporters.iter_mut() {
            if self.positions.get(exporter.id()).unwrap_or(-1) >= record.position {
                continue;
            }
            while let Err(e) = exporter.export(record) {
                warn!(self.logger, "Export failed, retrying"; "error" => %e);
                tokio::select! {
                    _ = shutdown.changed() => return false,
                    _ = tokio::time::sleep(EXPORT_RETRY_DELAY) => {}
                }
            }
            self.positions.update(exporter.id(), record.position);
        }
        true
    }
}

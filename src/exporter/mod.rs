//! Exporters (Layer 6)
//!
//! Exporters receive the committed events of a partition in position order and
//! acknowledge the highest position they exported. The lowest acknowledged
//! position bounds how far the log may be compacted.

pub mod director;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::record::Record;

pub use director::ExporterDirector;

#[derive(Debug, Error)]
pub enum ExporterError {
    #[error("Exporter {exporter_id} failed to export record at position {position}: {reason}")]
    Export {
        exporter_id: String,
        position: i64,
        reason: String,
    },

    #[error("Exporter {exporter_id} failed to purge its data: {reason}")]
    Purge { exporter_id: String, reason: String },
}

impl ExporterError {
    pub fn exporter_id(&self) -> &str {
        match self {
            ExporterError::Export { exporter_id, .. } | ExporterError::Purge { exporter_id, .. } => {
                exporter_id
            }
        }
    }
}

/// A sink for committed events
pub trait Exporter: Send {
    fn id(&self) -> &str;

    /// Export one event. Failed exports are retried with the same record.
    fn export(&mut self, record: &Record) -> Result<(), ExporterError>;

    /// Delete everything this exporter has written so far.
    fn purge(&mut self) -> Result<(), ExporterError>;
}

type ExporterFactory = Arc<dyn Fn() -> Box<dyn Exporter> + Send + Sync>;

/// Configured exporters; each use gets a fresh instance
#[derive(Default)]
pub struct ExporterRepository {
    factories: Mutex<BTreeMap<String, ExporterFactory>>,
}

impl ExporterRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&self, id: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn Exporter> + Send + Sync + 'static,
    {
        if let Ok(mut factories) = self.factories.lock() {
            factories.insert(id.into(), Arc::new(factory));
        }
    }

    pub fn ids(&self) -> Vec<String> {
        self.factories
            .lock()
            .map(|factories| factories.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn instantiate_all(&self) -> Vec<Box<dyn Exporter>> {
        self.factories()
            .into_iter()
            .map(|(_, factory)| factory())
            .collect()
    }

    /// Purge the data of every exporter.
    ///
    /// # Returns
    /// The ids of the purged exporters, or the first failure
    pub fn purge_all(&self) -> Result<Vec<String>, ExporterError> {
        let mut purged = Vec::new();
        for (id, factory) in self.factories() {
            factory().purge()?;
            purged.push(id);
        }
        Ok(purged)
    }

    fn factories(&self) -> Vec<(String, ExporterFactory)> {
        self.factories
            .lock()
            .map(|factories| {
                factories
                    .iter()
                    .map(|(id, factory)| (id.clone(), factory.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Highest exported position per exporter
#[derive(Clone, Default)]
pub struct ExporterPositions {
    positions: Arc<Mutex<BTreeMap<String, i64>>>,
}

impl ExporterPositions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `exporter_id` if it is not tracked yet.
    pub fn register(&self, exporter_id: &str) {
        if let Ok(mut positions) = self.positions.lock() {
            positions.entry(exporter_id.to_string()).or_insert(-1);
        }
    }

    /// Positions only move forward.
    pub fn update(&self, exporter_id: &str, position: i64) {
        if let Ok(mut positions) = self.positions.lock() {
            let current = positions.entry(exporter_id.to_string()).or_insert(-1);
            if position > *current {
                *current = position;
            }
        }
    }

    pub fn get(&self, exporter_id: &str) -> Option<i64> {
        self.positions
            .lock()
            .ok()
            .and_then(|positions| positions.get(exporter_id).copied())
    }

    /// Lowest position over all exporters; `None` without exporters.
    pub fn lowest(&self) -> Option<i64> {
        self.positions
            .lock()
            .ok()
            .and_then(|positions| positions.values().copied().min())
    }
}

/// Position up to which the log may be compacted.
pub fn compaction_watermark(snapshot_position: i64, positions: &ExporterPositions) -> i64 {
    match positions.lowest() {
        Some(exported) => snapshot_position.min(exported),
        None => snapshot_position,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct PurgeCounter {
        purged: Arc<Mutex<u32>>,
    }

    impl Exporter for PurgeCounter {
        fn id(&self) -> &str {
            "counter"
        }

        fn export(&mut self, _record: &Record) -> Result<(), ExporterError> {
            Ok(())
        }

        fn purge(&mut self) -> Result<(), ExporterError> {
            *self.purged.lock().unwrap() += 1;
            Ok(())
        }
    }

    #[test]
    fn positions_never_decrease() {
        let positions = ExporterPositions::new();
        positions.update("a", 5);
        positions.update("a", 3);
        assert_eq!(positions.get("a"), Some(5));
    }

    #[test]
    fn watermark_is_bounded_by_slowest_exporter() {
        let positions = ExporterPositions::new();
        assert_eq!(compaction_watermark(10, &positions), 10);

        positions.update("fast", 12);
        positions.update("slow", 4);
        assert_eq!(compaction_watermark(10, &positions), 4);

        positions.update("slow", 20);
        assert_eq!(compaction_watermark(10, &positions), 10);
    }

    #[test]
    fn purge_all_uses_fresh_instances() {
        let purged = Arc::new(Mutex::new(0));
        let repository = ExporterRepository::new();
        let counter = purged.clone();
        repository.register("counter", move || {
            Box::new(PurgeCounter {
                purged: counter.clone(),
            }) as Box<dyn Exporter>
        });

        assert_eq!(repository.purge_all().unwrap(), vec!["counter".to_string()]);
        assert_eq!(repository.purge_all().unwrap().len(), 1);
        assert_eq!(*purged.lock().unwrap(), 2);
    }
}

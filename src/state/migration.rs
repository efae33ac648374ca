//! One-shot state migrations
//!
//! Migrations run once, before replay and processing start, never interleaved
//! with live commands. Each finished migration is recorded in the MIGRATIONS
//! column family and skipped on later starts.

use slog::{debug, info, Logger};
use std::marker::PhantomData;

use crate::db::{ColumnFamily, DbKey, DbNil, DbResult, DbValue};
use crate::record::DEFAULT_TENANT;

use super::history_deletion_state::{HistoryDeletionKey, PersistedHistoryDeletion};
use super::{ColumnFamilies, HistoryDeletionState, ProcessingState};

pub trait MigrationTask: Send + Sync {
    /// Stable name under which the migration is recorded as finished.
    fn identifier(&self) -> &'static str;

    fn needs_to_run(&self, state: &ProcessingState) -> DbResult<bool>;

    fn run_migration(&self, state: &mut ProcessingState) -> DbResult<()>;
}

/// A persisted column family layout: key type, value type and location.
pub trait StateLayout {
    type Key: DbKey + Clone;
    type Value: DbValue;
    const COLUMN_FAMILY: ColumnFamilies;
}

/// Moves every entry of the source layout into the target layout, re-keying it
/// on the way, and deletes the source entry.
pub struct RekeyMigration<S: StateLayout, T: StateLayout> {
    identifier: &'static str,
    rekey: fn(S::Key, S::Value) -> (T::Key, T::Value),
    _layouts: PhantomData<fn() -> (S, T)>,
}

impl<S: StateLayout, T: StateLayout> RekeyMigration<S, T> {
    pub fn new(identifier: &'static str, rekey: fn(S::Key, S::Value) -> (T::Key, T::Value)) -> Self {
        Self {
            identifier,
            rekey,
            _layouts: PhantomData,
        }
    }

    fn source(state: &ProcessingState) -> ColumnFamily<S::Key, S::Value> {
        state.store().create_column_family(S::COLUMN_FAMILY)
    }

    fn target(state: &ProcessingState) -> ColumnFamily<T::Key, T::Value> {
        state.store().create_column_family(T::COLUMN_FAMILY)
    }
}

impl<S: StateLayout, T: StateLayout> MigrationTask for RekeyMigration<S, T> {
    fn identifier(&self) -> &'static str {
        self.identifier
    }

    fn needs_to_run(&self, state: &ProcessingState) -> DbResult<bool> {
        Ok(!Self::source(state).is_empty()?)
    }

    fn run_migration(&self, state: &mut ProcessingState) -> DbResult<()> {
        let source = Self::source(state);
        let target = Self::target(state);
        for (key, value) in source.entries()? {
            let (new_key, new_value) = (self.rekey)(key.clone(), value);
            target.upsert(&new_key, &new_value)?;
            source.delete_existing(&key)?;
        }
        Ok(())
    }
}

/// History deletions keyed by resource key only
pub struct LegacyHistoryDeletionLayout;

impl StateLayout for LegacyHistoryDeletionLayout {
    type Key = i64;
    type Value = PersistedHistoryDeletion;
    const COLUMN_FAMILY: ColumnFamilies = ColumnFamilies::DeprecatedHistoryDeletions;
}

/// History deletions keyed by [tenant, [resource type, resource key]]
pub struct TenantAwareHistoryDeletionLayout;

impl StateLayout for TenantAwareHistoryDeletionLayout {
    type Key = HistoryDeletionKey;
    type Value = PersistedHistoryDeletion;
    const COLUMN_FAMILY: ColumnFamilies = ColumnFamilies::HistoryDeletions;
}

pub fn history_deletion_tenant_migration(
) -> RekeyMigration<LegacyHistoryDeletionLayout, TenantAwareHistoryDeletionLayout> {
    RekeyMigration::new(
        "history-deletion-tenant-aware",
        |_, mut deletion: PersistedHistoryDeletion| {
            if deletion.tenant_id.is_empty() {
                deletion.tenant_id = DEFAULT_TENANT.to_string();
            }
            let key = HistoryDeletionState::key(
                &deletion.tenant_id,
                deletion.resource_type,
                deletion.resource_key,
            );
            (key, deletion)
        },
    )
}

pub struct MigrationRunner {
    tasks: Vec<Box<dyn MigrationTask>>,
    logger: Logger,
}

impl MigrationRunner {
    /// Runner with all migrations the engine ships with.
    pub fn new(logger: Logger) -> Self {
        Self::with_tasks(vec![Box::new(history_deletion_tenant_migration())], logger)
    }

    pub fn with_tasks(tasks: Vec<Box<dyn MigrationTask>>, logger: Logger) -> Self {
        Self { tasks, logger }
    }

    /// Run every migration not yet recorded as finished, each in its own transaction.
    ///
    /// # Returns
    /// Identifiers of the migrations that actually changed state
    pub fn run(&self, state: &mut ProcessingState) -> DbResult<Vec<&'static str>> {
        let finished: ColumnFamily<String, DbNil> =
            state.store().create_column_family(ColumnFamilies::Migrations);
        let context = state.store().transaction_context().clone();
        let mut executed = Vec::new();

        for task in &self.tasks {
            let identifier = task.identifier().to_string();
            if finished.exists(&identifier)? {
                debug!(self.logger, "Migration already finished"; "migration" => &identifier);
                continue;
            }

            let result = (|| -> DbResult<bool> {
                let needed = task.needs_to_run(state)?;
                if needed {
                    task.run_migration(state)?;
                }
                finished.upsert(&identifier, &DbNil)?;
                context.commit()?;
                Ok(needed)
            })();

            match result {
                Ok(true) => {
                    info!(self.logger, "Migration finished"; "migration" => &identifier);
                    executed.push(task.identifier());
                }
                Ok(false) => {
                    debug!(self.logger, "Migration not needed"; "migration" => &identifier);
                }
                Err(e) => {
                    context.rollback()?;
                    return Err(e);
                }
            }
        }
        Ok(executed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::KeyedStateStore;
    use crate::record::HistoryDeletionType;

    fn legacy(resource_key: i64, tenant_id: &str) -> PersistedHistoryDeletion {
        PersistedHistoryDeletion {
            resource_key,
            resource_type: HistoryDeletionType::ProcessInstance,
            process_id: "order".to_string(),
            decision_definition_id: String::new(),
            tenant_id: tenant_id.to_string(),
        }
    }

    #[test]
    fn rekeys_legacy_entries_once() {
        let store = KeyedStateStore::in_memory();
        let mut state = ProcessingState::new(1, store.clone());
        let source: ColumnFamily<i64, PersistedHistoryDeletion> =
            store.create_column_family(ColumnFamilies::DeprecatedHistoryDeletions);
        source.insert(&11, &legacy(11, "")).unwrap();
        source.insert(&12, &legacy(12, "acme")).unwrap();
        store.transaction_context().commit().unwrap();

        let runner = MigrationRunner::new(slog::Logger::root(slog::Discard, slog::o!()));
        assert_eq!(runner.run(&mut state).unwrap(), vec!["history-deletion-tenant-aware"]);

        assert!(source.is_empty().unwrap());
        let deletions = state.history_deletions();
        assert!(deletions
            .is_deleted(DEFAULT_TENANT, HistoryDeletionType::ProcessInstance, 11)
            .unwrap());
        assert!(deletions
            .is_deleted("acme", HistoryDeletionType::ProcessInstance, 12)
            .unwrap());
        assert_eq!(store.transaction_context().pending_writes(), 0);

        // a legacy entry written after the migration finished is left alone
        source.insert(&13, &legacy(13, "")).unwrap();
        store.transaction_context().commit().unwrap();
        assert!(runner.run(&mut state).unwrap().is_empty());
        assert!(source.exists(&13).unwrap());
    }

    #[test]
    fn empty_state_records_migration_as_finished() {
        let store = KeyedStateStore::in_memory();
        let mut state = ProcessingState::new(1, store.clone());
        let runner = MigrationRunner::new(slog::Logger::root(slog::Discard, slog::o!()));

        assert!(runner.run(&mut state).unwrap().is_empty());
        let finished: ColumnFamily<String, DbNil> =
            store.create_column_family(ColumnFamilies::Migrations);
        assert!(finished
            .exists(&"history-deletion-tenant-aware".to_string())
            .unwrap());
    }
}

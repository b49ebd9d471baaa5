//! DeploymentStore — redb-backed, versioned deployment persistence.
//!
//! Every deployment is stored as a `VersionedRecord` (JSON) under its id.
//! Writes after the initial insert go through `compare_and_swap`, which
//! commits only if the stored version still matches what the writer read.
//! The store supports both on-disk and in-memory backends (the latter for
//! testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::action::{ActionId, JournalEntry, journal_key};
use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// On-disk form of a deployment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct VersionedRecord {
    version: u64,
    deployment: Deployment,
}

/// Thread-safe deployment store backed by redb.
#[derive(Clone)]
pub struct DeploymentStore {
    db: Arc<Database>,
}

impl DeploymentStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "deployment store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory deployment store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(DEPLOYMENTS).map_err(map_err!(Table))?;
        txn.open_table(ACTIONS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Deployments ────────────────────────────────────────────────

    /// Insert a new deployment at version 1.
    ///
    /// Fails with `AlreadyExists` if a record with the same id is present.
    pub fn insert(&self, deployment: &Deployment) -> StateResult<u64> {
        let record = VersionedRecord {
            version: 1,
            deployment: deployment.clone(),
        };
        let value = serde_json::to_vec(&record).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(DEPLOYMENTS).map_err(map_err!(Table))?;
            if table
                .get(deployment.id.as_str())
                .map_err(map_err!(Read))?
                .is_some()
            {
                return Err(StateError::AlreadyExists(deployment.id.clone()));
            }
            table
                .insert(deployment.id.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(id = %deployment.id, "deployment inserted");
        Ok(1)
    }

    /// Read a deployment and the version it was stored at.
    pub fn read(&self, id: &str) -> StateResult<Option<(Deployment, u64)>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(DEPLOYMENTS).map_err(map_err!(Table))?;
        match table.get(id).map_err(map_err!(Read))? {
            Some(guard) => {
                let record: VersionedRecord =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some((record.deployment, record.version)))
            }
            None => Ok(None),
        }
    }

    /// Replace a deployment if its stored version still equals `expected`.
    ///
    /// Returns `false` (and writes nothing) on a version mismatch or when the
    /// deployment does not exist. On success the stored version becomes
    /// `expected + 1`.
    pub fn compare_and_swap(
        &self,
        id: &str,
        expected: u64,
        deployment: &Deployment,
    ) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(DEPLOYMENTS).map_err(map_err!(Table))?;
            let current = match table.get(id).map_err(map_err!(Read))? {
                Some(guard) => {
                    let record: VersionedRecord = serde_json::from_slice(guard.value())
                        .map_err(map_err!(Deserialize))?;
                    record.version
                }
                None => return Ok(false),
            };
            if current != expected {
                debug!(%id, expected, current, "version mismatch, swap rejected");
                return Ok(false);
            }
            let record = VersionedRecord {
                version: expected + 1,
                deployment: deployment.clone(),
            };
            let value = serde_json::to_vec(&record).map_err(map_err!(Serialize))?;
            table
                .insert(id, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(true)
    }

    /// List all deployments with their versions, ordered by id.
    pub fn list(&self) -> StateResult<Vec<(Deployment, u64)>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(DEPLOYMENTS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let record: VersionedRecord =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push((record.deployment, record.version));
        }
        Ok(results)
    }

    // ── Action journal ─────────────────────────────────────────────

    /// Insert or advance a journal entry.
    ///
    /// Returns `false`, writing nothing, if the stored entry is already closed
    /// or would move back from acknowledged to emitted.
    pub fn put_journal(&self, entry: &JournalEntry) -> StateResult<bool> {
        let key = entry.table_key();
        let value = serde_json::to_vec(entry).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(ACTIONS).map_err(map_err!(Table))?;
            let current = match table.get(key.as_str()).map_err(map_err!(Read))? {
                Some(guard) => {
                    let stored: JournalEntry =
                        serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                    Some(stored.status)
                }
                None => None,
            };
            if let Some(status) = current
                && !status.admits(&entry.status)
            {
                debug!(%key, ?status, next = ?entry.status, "journal entry already settled");
                return Ok(false);
            }
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(true)
    }

    /// Get one journal entry.
    pub fn get_journal(&self, deployment_id: &str, action_id: u64) -> StateResult<Option<JournalEntry>> {
        let key = journal_key(deployment_id, action_id);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ACTIONS).map_err(map_err!(Table))?;
        match table.get(key.as_str()).map_err(map_err!(Read))? {
            Some(guard) => {
                let entry: JournalEntry =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(entry))
            }
            None => Ok(None),
        }
    }

    /// List journal entries for a deployment in emission order.
    pub fn list_journal(&self, deployment_id: &str) -> StateResult<Vec<JournalEntry>> {
        let first = journal_key(deployment_id, 0);
        let last = journal_key(deployment_id, ActionId::MAX);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ACTIONS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table
            .range(first.as_str()..=last.as_str())
            .map_err(map_err!(Read))?
        {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let entry: JournalEntry =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            // Ids that extend this one with ':' can sort into the range.
            if entry.action.deployment_id == deployment_id {
                results.push(entry);
            }
        }
        Ok(results)
    }

    /// Highest action id recorded in the journal (0 if empty).
    pub fn last_action_id(&self) -> StateResult<u64> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ACTIONS).map_err(map_err!(Table))?;
        let mut last = 0;
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, _) = entry.map_err(map_err!(Read))?;
            if let Some(id) = key
                .value()
                .rsplit_once(':')
                .and_then(|(_, id)| id.parse::<u64>().ok())
            {
                last = last.max(id);
            }
        }
        Ok(last)
    }
}

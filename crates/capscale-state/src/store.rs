//! StateStore: redb-backed persistence for capscale.
//!
//! Holds the local control plane's tenant records, per-batch progress
//! checkpoints, and finished run summaries. Values are JSON-serialized
//! into redb's `&[u8]` columns. On-disk and in-memory backends are
//! supported (the latter for tests and dry experiments).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use capscale_core::TenantState;
use capscale_engine::{BatchResult, Checkpoint};

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

type JsonTable = TableDefinition<'static, &'static str, &'static [u8]>;

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store.
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(TENANTS).map_err(map_err!(Table))?;
        txn.open_table(CHECKPOINTS).map_err(map_err!(Table))?;
        txn.open_table(RUNS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Tenants ────────────────────────────────────────────────────

    /// Insert or update a tenant's capacity state.
    pub fn put_tenant(&self, tenant: &str, state: TenantState) -> StateResult<()> {
        let record = TenantRecord::new(tenant, state);
        self.put_json(TENANTS, tenant, &record)?;
        debug!(tenant, %state, "tenant stored");
        Ok(())
    }

    pub fn get_tenant(&self, tenant: &str) -> StateResult<Option<TenantRecord>> {
        self.get_json(TENANTS, tenant)
    }

    /// All tenants in key order.
    pub fn list_tenants(&self) -> StateResult<Vec<TenantRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(TENANTS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let record: TenantRecord =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(record);
        }
        Ok(results)
    }

    /// Delete a tenant. Returns true if it existed.
    pub fn delete_tenant(&self, tenant: &str) -> StateResult<bool> {
        self.remove(TENANTS, tenant)
    }

    // ── Checkpoints ────────────────────────────────────────────────

    /// Overwrite the checkpoint for a batch.
    pub fn put_checkpoint(&self, batch_id: &str, checkpoint: Checkpoint) -> StateResult<()> {
        self.put_json(CHECKPOINTS, batch_id, &checkpoint)
    }

    /// Most recent checkpoint recorded for a batch.
    pub fn latest_checkpoint(&self, batch_id: &str) -> StateResult<Option<Checkpoint>> {
        self.get_json(CHECKPOINTS, batch_id)
    }

    /// Forget a batch's checkpoint. Returns true if one existed.
    pub fn clear_checkpoint(&self, batch_id: &str) -> StateResult<bool> {
        self.remove(CHECKPOINTS, batch_id)
    }

    // ── Runs ───────────────────────────────────────────────────────

    /// Store a finished batch's summary.
    pub fn record_run(&self, result: &BatchResult) -> StateResult<RunRecord> {
        let record = RunRecord::from_batch(result);
        let key = record.table_key();
        self.put_json(RUNS, &key, &record)?;
        debug!(%key, summary = %record.summary, "run recorded");
        Ok(record)
    }

    /// Most recent runs first.
    pub fn list_runs(&self, limit: usize) -> StateResult<Vec<RunRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(RUNS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))?.rev() {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let record: RunRecord =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(record);
            if results.len() >= limit {
                break;
            }
        }
        Ok(results)
    }

    // ── Helpers ────────────────────────────────────────────────────

    fn put_json<T: Serialize>(&self, table: JsonTable, key: &str, value: &T) -> StateResult<()> {
        let value = serde_json::to_vec(value).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(table).map_err(map_err!(Table))?;
            table
                .insert(key, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn get_json<T: DeserializeOwned>(&self, table: JsonTable, key: &str) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let value: T =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn remove(&self, table: JsonTable, key: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(table).map_err(map_err!(Table))?;
            existed = table.remove(key).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, existed, "record deleted");
        Ok(existed)
    }
}

//! SQLite-backed durable store.
//!
//! The store owns the single connection every registry table lives in,
//! alongside the audit ledger. All mutations go through [`Store::write`],
//! which runs a closure inside one transaction and commits only when the
//! closure succeeds; any error drops the transaction and rolls it back.

use crate::ledger::{AuditLedger, LedgerError, LedgerHealth, LedgerHealthInfo};
use rusqlite::{Connection, OpenFlags, Transaction};
use std::path::Path;
use tracing::{error, info, warn};

type Result<T> = std::result::Result<T, LedgerError>;

/// Observability counters for the store
#[derive(Debug, Default, Clone)]
pub struct StoreMetrics {
    /// Write transactions committed
    pub transactions_committed_total: u64,
    /// Write transactions rolled back because the closure failed
    pub transactions_rolled_back_total: u64,
    /// Startup/explicit continuity checks performed
    pub continuity_checks_total: u64,
    /// Continuity checks that found corruption
    pub corruption_detections_total: u64,
}

pub struct Store {
    conn: Connection,
    node_id: String,
    health: LedgerHealth,
    metrics: StoreMetrics,
}

impl Store {
    /// Create or open a store at the specified path
    ///
    /// Runs the audit continuity check and fails if the chain is corrupted.
    pub fn open(path: impl AsRef<Path>, node_id: impl Into<String>) -> Result<Self> {
        let node_id = node_id.into();
        let path = path.as_ref();

        info!(
            node_id = %node_id,
            path = %path.display(),
            "Opening registry store"
        );

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        Self::from_connection(conn, node_id)
    }

    /// Volatile store for tests and dry runs
    pub fn open_in_memory(node_id: impl Into<String>) -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, node_id.into())
    }

    fn from_connection(conn: Connection, node_id: String) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        AuditLedger::init_schema(&conn)?;

        let mut store = Self {
            conn,
            node_id,
            health: LedgerHealth::Ok,
            metrics: StoreMetrics::default(),
        };

        store.continuity_check()?;

        Ok(store)
    }

    /// Apply a table schema owned by a higher layer.
    pub fn apply_schema(&self, sql: &str) -> Result<()> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    /// Run `f` inside a transaction, committing only on `Ok`.
    pub fn write<T, E, F>(&mut self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&Transaction<'_>) -> std::result::Result<T, E>,
        E: From<LedgerError>,
    {
        if !self.health.is_ok() {
            warn!(
                node_id = %self.node_id,
                "Attempted to write to corrupted store"
            );
            return Err(LedgerError::CorruptionDetected(
                "Cannot write to a store with a corrupted audit ledger".to_string(),
            )
            .into());
        }

        let tx = self.conn.transaction().map_err(LedgerError::from)?;

        match f(&tx) {
            Ok(value) => {
                tx.commit().map_err(LedgerError::from)?;
                self.metrics.transactions_committed_total += 1;
                Ok(value)
            }
            Err(e) => {
                // Dropping the transaction rolls it back.
                drop(tx);
                self.metrics.transactions_rolled_back_total += 1;
                Err(e)
            }
        }
    }

    /// Read-only access to the connection.
    pub fn reader(&self) -> &Connection {
        &self.conn
    }

    /// Re-verify the audit chain and update health.
    pub fn continuity_check(&mut self) -> Result<()> {
        self.metrics.continuity_checks_total += 1;

        info!(node_id = %self.node_id, "Starting audit continuity check");

        let health = AuditLedger::check_continuity(&self.conn)?;
        self.health = health.clone();

        match health {
            LedgerHealth::Ok => Ok(()),
            LedgerHealth::Corrupted { error_type, .. } => {
                self.metrics.corruption_detections_total += 1;
                error!(
                    node_id = %self.node_id,
                    error_type = %error_type,
                    "Registry store refused: audit ledger corrupted"
                );
                Err(LedgerError::CorruptionDetected(error_type))
            }
        }
    }

    pub fn health(&self) -> LedgerHealthInfo {
        LedgerHealthInfo {
            status: self.health.clone(),
            node_id: self.node_id.clone(),
        }
    }

    pub fn metrics(&self) -> &StoreMetrics {
        &self.metrics
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Execute raw SQL for testing purposes only
    ///
    /// **WARNING**: This bypasses the transaction discipline and the audit
    /// ledger. It exists so tests can simulate on-disk tampering.
    #[doc(hidden)]
    pub fn __test_execute_raw_sql(
        &self,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<usize> {
        Ok(self.conn.execute(sql, params)?)
    }
}

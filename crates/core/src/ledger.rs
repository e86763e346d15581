//! Audit Ledger - Append-Only Record of Registry Transitions
//!
//! Every committed state change in the registry (identity registered,
//! endpoint registered, consumer authorized, grant issued or revoked) is
//! mirrored by one audit event written in the same SQLite transaction.
//!
//! # Architecture
//!
//! Each audit event is persisted with:
//! - seq_no: Monotonically increasing sequence number
//! - event_id: Unique event identifier (UUID v4)
//! - height: Logical clock value the transition was committed at
//! - actor: Principal that performed the transition
//! - action: Transition kind
//! - subject: JSON description of the affected record
//! - event_hash: BLAKE3 over prev_event_hash and the canonical event body
//! - prev_event_hash: Hash of the previous event (32 zero bytes for genesis)
//!
//! # Guarantees
//!
//! - Strict ordering: seq_no increases by 1 for each event
//! - Chain continuity: prev_event_hash must match previous event's event_hash
//! - Append-only: No in-place updates or deletes allowed
//! - Corruption detection: Startup checks recompute every hash in order

use crate::clock::BlockHeight;
use crate::principal::Principal;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, error, info};

/// Previous-hash value of the first event in the chain.
pub const GENESIS_HASH: [u8; 32] = [0u8; 32];

/// Kind of registry transition recorded in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditAction {
    #[serde(rename = "identity.registered")]
    IdentityRegistered,
    #[serde(rename = "endpoint.registered")]
    EndpointRegistered,
    #[serde(rename = "consumer.authorized")]
    ConsumerAuthorized,
    #[serde(rename = "grant.issued")]
    GrantIssued,
    #[serde(rename = "grant.revoked")]
    GrantRevoked,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::IdentityRegistered => "identity.registered",
            AuditAction::EndpointRegistered => "endpoint.registered",
            AuditAction::ConsumerAuthorized => "consumer.authorized",
            AuditAction::GrantIssued => "grant.issued",
            AuditAction::GrantRevoked => "grant.revoked",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "identity.registered" => Ok(AuditAction::IdentityRegistered),
            "endpoint.registered" => Ok(AuditAction::EndpointRegistered),
            "consumer.authorized" => Ok(AuditAction::ConsumerAuthorized),
            "grant.issued" => Ok(AuditAction::GrantIssued),
            "grant.revoked" => Ok(AuditAction::GrantRevoked),
            other => Err(LedgerError::InvalidEvent(format!(
                "unknown audit action: {}",
                other
            ))),
        }
    }
}

/// A committed audit event with chain pointers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditEvent {
    pub seq_no: u64,
    pub event_id: String,
    pub height: BlockHeight,
    pub actor: Principal,
    pub action: AuditAction,
    pub subject: serde_json::Value,
    #[serde(with = "hex_bytes")]
    pub event_hash: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub prev_event_hash: Vec<u8>,
}

/// Hashes travel as lowercase hex strings.
mod hex_bytes {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        hex::decode(raw).map_err(D::Error::custom)
    }
}

/// Hashed portion of an event. Field order is part of the hash format.
#[derive(Serialize)]
struct CanonicalBody<'a> {
    event_id: &'a str,
    height: u64,
    actor: &'a str,
    action: &'a str,
    subject: &'a serde_json::Value,
}

/// Ledger health status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LedgerHealth {
    /// Ledger is healthy
    Ok,
    /// Ledger is corrupted
    Corrupted {
        /// Last good sequence number
        last_good_seq_no: Option<u64>,
        /// First failing sequence number
        first_bad_seq_no: u64,
        /// Error type description
        error_type: String,
    },
}

impl LedgerHealth {
    /// Check if the ledger is healthy
    pub fn is_ok(&self) -> bool {
        matches!(self, LedgerHealth::Ok)
    }
}

/// Ledger health information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerHealthInfo {
    /// Health status
    pub status: LedgerHealth,
    /// Node identifier
    pub node_id: String,
}

/// Errors that can occur in ledger operations
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    #[error("Event not found: seq_no={seq_no}")]
    EventNotFound { seq_no: u64 },

    #[error("Ledger corrupted: {0}")]
    CorruptionDetected(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid event: {0}")]
    InvalidEvent(String),
}

pub type Result<T> = std::result::Result<T, LedgerError>;

/// Row as stored, before principal and action parsing.
struct StoredRow {
    seq_no: i64,
    event_id: String,
    height: BlockHeight,
    actor: String,
    action: String,
    subject: String,
    event_hash: Vec<u8>,
    prev_event_hash: Vec<u8>,
}

impl StoredRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            seq_no: row.get(0)?,
            event_id: row.get(1)?,
            height: row.get(2)?,
            actor: row.get(3)?,
            action: row.get(4)?,
            subject: row.get(5)?,
            event_hash: row.get(6)?,
            prev_event_hash: row.get(7)?,
        })
    }

    fn into_event(self) -> Result<AuditEvent> {
        let actor = Principal::parse(self.actor).map_err(|e| {
            LedgerError::CorruptionDetected(format!("seq_no {}: {}", self.seq_no, e))
        })?;

        Ok(AuditEvent {
            seq_no: self.seq_no as u64,
            event_id: self.event_id,
            height: self.height,
            actor,
            action: self.action.parse()?,
            subject: serde_json::from_str(&self.subject)?,
            event_hash: self.event_hash,
            prev_event_hash: self.prev_event_hash,
        })
    }
}

const SELECT_COLUMNS: &str = "SELECT seq_no, event_id, height, actor, action, subject, \
                              event_hash, prev_event_hash FROM audit_events";

/// Append-only audit ledger over a SQLite connection.
///
/// All functions take a borrowed connection so that appends can share the
/// caller's transaction (`rusqlite::Transaction` derefs to `Connection`).
pub struct AuditLedger;

impl AuditLedger {
    /// Initialize database schema
    pub fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS audit_events (
                seq_no INTEGER PRIMARY KEY AUTOINCREMENT,
                event_id TEXT NOT NULL UNIQUE,
                height INTEGER NOT NULL,
                actor TEXT NOT NULL,
                action TEXT NOT NULL,
                subject TEXT NOT NULL,
                event_hash BLOB NOT NULL,
                prev_event_hash BLOB NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_audit_actor ON audit_events(actor);
            CREATE INDEX IF NOT EXISTS idx_audit_height ON audit_events(height);
            "#,
        )?;

        Ok(())
    }

    /// Compute the chained hash of an event body.
    pub fn compute_hash(
        prev_event_hash: &[u8],
        event_id: &str,
        height: BlockHeight,
        actor: &Principal,
        action: AuditAction,
        subject: &serde_json::Value,
    ) -> Result<Vec<u8>> {
        let body = CanonicalBody {
            event_id,
            height: height.0,
            actor: actor.as_str(),
            action: action.as_str(),
            subject,
        };

        let mut hasher = blake3::Hasher::new();
        hasher.update(prev_event_hash);
        hasher.update(&serde_json::to_vec(&body)?);
        Ok(hasher.finalize().as_bytes().to_vec())
    }

    /// Append an event, chaining it to the current head.
    ///
    /// Call this with the transaction that performs the state change so both
    /// commit or roll back together.
    ///
    /// # Returns
    /// * `Ok(AuditEvent)` - The stored event with its assigned sequence number
    pub fn append(
        conn: &Connection,
        height: BlockHeight,
        actor: &Principal,
        action: AuditAction,
        subject: serde_json::Value,
    ) -> Result<AuditEvent> {
        if height > BlockHeight::MAX {
            return Err(LedgerError::InvalidEvent(format!(
                "height {} exceeds {}",
                height,
                BlockHeight::MAX
            )));
        }

        let prev_event_hash = Self::latest(conn)?
            .map(|e| e.event_hash)
            .unwrap_or_else(|| GENESIS_HASH.to_vec());

        let event_id = uuid::Uuid::new_v4().to_string();
        let event_hash =
            Self::compute_hash(&prev_event_hash, &event_id, height, actor, action, &subject)?;

        conn.execute(
            r#"
            INSERT INTO audit_events (
                event_id, height, actor, action, subject, event_hash, prev_event_hash
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                event_id,
                height,
                actor.as_str(),
                action.as_str(),
                serde_json::to_string(&subject)?,
                event_hash,
                prev_event_hash,
            ],
        )?;

        let seq_no = conn.last_insert_rowid() as u64;

        debug!(
            seq_no = seq_no,
            event_id = %event_id,
            action = %action,
            actor = %actor,
            "Audit event appended"
        );

        Ok(AuditEvent {
            seq_no,
            event_id,
            height,
            actor: actor.clone(),
            action,
            subject,
            event_hash,
            prev_event_hash,
        })
    }

    /// Get the latest event from the ledger
    pub fn latest(conn: &Connection) -> Result<Option<AuditEvent>> {
        let row = conn
            .query_row(
                &format!("{} ORDER BY seq_no DESC LIMIT 1", SELECT_COLUMNS),
                [],
                StoredRow::from_row,
            )
            .optional()?;

        row.map(StoredRow::into_event).transpose()
    }

    /// Get an event by sequence number
    pub fn get(conn: &Connection, seq_no: u64) -> Result<AuditEvent> {
        conn.query_row(
            &format!("{} WHERE seq_no = ?1", SELECT_COLUMNS),
            [seq_no as i64],
            StoredRow::from_row,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => LedgerError::EventNotFound { seq_no },
            e => LedgerError::DatabaseError(e),
        })?
        .into_event()
    }

    /// Iterate events starting from a sequence number (inclusive)
    pub fn iterate(conn: &Connection, from_seq_no: u64, limit: usize) -> Result<Vec<AuditEvent>> {
        let mut stmt = conn.prepare(&format!(
            "{} WHERE seq_no >= ?1 ORDER BY seq_no ASC LIMIT ?2",
            SELECT_COLUMNS
        ))?;

        let rows = stmt
            .query_map(
                params![from_seq_no as i64, limit as i64],
                StoredRow::from_row,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter().map(StoredRow::into_event).collect()
    }

    /// Events performed by one principal, oldest first
    pub fn events_by_actor(conn: &Connection, actor: &Principal) -> Result<Vec<AuditEvent>> {
        let mut stmt = conn.prepare(&format!(
            "{} WHERE actor = ?1 ORDER BY seq_no ASC",
            SELECT_COLUMNS
        ))?;

        let rows = stmt
            .query_map([actor.as_str()], StoredRow::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter().map(StoredRow::into_event).collect()
    }

    /// Newest event performed by one principal
    pub fn latest_by_actor(conn: &Connection, actor: &Principal) -> Result<Option<AuditEvent>> {
        let row = conn
            .query_row(
                &format!(
                    "{} WHERE actor = ?1 ORDER BY seq_no DESC LIMIT 1",
                    SELECT_COLUMNS
                ),
                [actor.as_str()],
                StoredRow::from_row,
            )
            .optional()?;

        row.map(StoredRow::into_event).transpose()
    }

    pub fn count(conn: &Connection) -> Result<u64> {
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM audit_events", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Walk the whole chain and report its health.
    ///
    /// Verifies:
    /// - Sequence numbers are strictly increasing by 1
    /// - prev_event_hash matches the previous event's event_hash
    /// - event_hash matches the recomputed hash of the stored body
    ///
    /// Only database failures are returned as `Err`; corruption is reported
    /// through the returned `LedgerHealth`.
    pub fn check_continuity(conn: &Connection) -> Result<LedgerHealth> {
        let mut stmt = conn.prepare(&format!("{} ORDER BY seq_no ASC", SELECT_COLUMNS))?;
        let rows = stmt
            .query_map([], StoredRow::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        if rows.is_empty() {
            info!("Audit ledger is empty, continuity check passed");
            return Ok(LedgerHealth::Ok);
        }

        let mut expected_seq_no = rows[0].seq_no as u64;
        let mut prev_event_hash = GENESIS_HASH.to_vec();
        let mut last_good_seq_no = None;
        let total = rows.len();

        for row in rows {
            let seq_no = row.seq_no as u64;

            let corrupted = |error_type: String| {
                error!(
                    seq_no = seq_no,
                    error_type = %error_type,
                    "Audit ledger corruption detected"
                );
                LedgerHealth::Corrupted {
                    last_good_seq_no,
                    first_bad_seq_no: seq_no,
                    error_type,
                }
            };

            if seq_no != expected_seq_no {
                return Ok(corrupted(format!(
                    "Missing events: gap between {} and {}",
                    expected_seq_no.saturating_sub(1),
                    seq_no
                )));
            }

            if row.prev_event_hash != prev_event_hash {
                return Ok(corrupted(format!(
                    "Hash mismatch at seq_no {}: expected prev_hash {}, got {}",
                    seq_no,
                    hex::encode(&prev_event_hash),
                    hex::encode(&row.prev_event_hash)
                )));
            }

            let stored_hash = row.event_hash.clone();
            let event = match row.into_event() {
                Ok(event) => event,
                Err(e) => return Ok(corrupted(format!("Unreadable event: {}", e))),
            };

            let recomputed = Self::compute_hash(
                &event.prev_event_hash,
                &event.event_id,
                event.height,
                &event.actor,
                event.action,
                &event.subject,
            )?;

            if recomputed != stored_hash {
                return Ok(corrupted(format!(
                    "Body tampered at seq_no {}: stored hash {}, recomputed {}",
                    seq_no,
                    hex::encode(&stored_hash),
                    hex::encode(&recomputed)
                )));
            }

            prev_event_hash = stored_hash;
            last_good_seq_no = Some(seq_no);
            expected_seq_no += 1;
        }

        info!(event_count = total, "Audit ledger continuity check passed");

        Ok(LedgerHealth::Ok)
    }
}

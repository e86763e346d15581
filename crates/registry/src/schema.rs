//! Table layout shared by the registries and row conversion helpers.
//!
//! Tables are insert/overwrite only. Nothing in the registry issues DELETE.

use crate::error::{AccessError, AccessResult};
use vitalledger_core::{LedgerError, Principal};

pub(crate) const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS identities (
    principal TEXT PRIMARY KEY,
    registered_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS endpoints (
    owner TEXT NOT NULL REFERENCES identities(principal),
    device_id TEXT NOT NULL,
    device_type TEXT NOT NULL,
    registered_at INTEGER NOT NULL,
    PRIMARY KEY (owner, device_id)
);

CREATE TABLE IF NOT EXISTS consumers (
    consumer TEXT PRIMARY KEY,
    category TEXT NOT NULL,
    authorized_by TEXT NOT NULL,
    authorized_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS domain_grants (
    owner TEXT NOT NULL REFERENCES identities(principal),
    consumer TEXT NOT NULL REFERENCES consumers(consumer),
    domain TEXT NOT NULL,
    expires_at INTEGER,
    active INTEGER NOT NULL,
    granted_at INTEGER NOT NULL,
    revoked_at INTEGER,
    PRIMARY KEY (owner, consumer, domain)
);

CREATE INDEX IF NOT EXISTS idx_domain_grants_consumer ON domain_grants(consumer);
"#;

pub(crate) fn principal_from_sql(column: &'static str, raw: String) -> AccessResult<Principal> {
    Principal::parse(raw).map_err(|e| {
        AccessError::Storage(LedgerError::CorruptionDetected(format!(
            "stored {} is not a valid principal: {}",
            column, e
        )))
    })
}

#[cfg(test)]
pub(crate) fn test_connection() -> rusqlite::Connection {
    let conn = rusqlite::Connection::open_in_memory().unwrap();
    conn.pragma_update(None, "foreign_keys", "ON").unwrap();
    vitalledger_core::AuditLedger::init_schema(&conn).unwrap();
    conn.execute_batch(SCHEMA).unwrap();
    conn
}

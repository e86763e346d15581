//! Core functionality for the VitalLedger health-data access registry.
//!
//! This crate provides the fundamental types, storage plumbing and ambient
//! services shared by the registry and the node binary: opaque caller
//! principals, the externally supplied logical clock, configuration,
//! structured logging, the SQLite store and the append-only audit ledger.

pub mod clock;
pub mod config;
pub mod error;
#[cfg(feature = "sqlite")]
pub mod ledger;
pub mod logging;
pub mod principal;
#[cfg(feature = "sqlite")]
pub mod store;

pub use clock::{BlockHeight, CallContext, Clock, ManualClock};
pub use config::{Config, LogFormat, LoggingConfig, RegistryConfig};
pub use error::{CoreError, Result};
#[cfg(feature = "sqlite")]
pub use ledger::{
    AuditAction, AuditEvent, AuditLedger, LedgerError, LedgerHealth, LedgerHealthInfo,
    GENESIS_HASH,
};
pub use principal::{Principal, MAX_PRINCIPAL_LEN};
#[cfg(feature = "sqlite")]
pub use store::{Store, StoreMetrics};

//! End-to-end scenarios for the VitalLedger access registry
//!
//! This test suite validates:
//! - Identity, endpoint and consumer registration receipts
//! - Domain access grant, check, revoke and expiry across mined blocks
//! - Signed callers mapped to key-derived principals
//! - Audit chain persistence and tamper detection on reopen

pub mod test_utils;

#[cfg(test)]
mod access_control_tests;

#[cfg(test)]
mod audit_persistence_tests;

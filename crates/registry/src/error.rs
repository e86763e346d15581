//! Error types for VitalLedger registry operations.
//!
//! Every domain rejection carries a stable numeric code (`u1`..`u9`) that
//! callers can match on across releases. Storage failures carry no code.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use vitalledger_core::{LedgerError, Principal};

/// How a caller should react to a rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Uniqueness would be violated; terminal for that key.
    Conflict,
    /// A prerequisite step is missing; retry after completing it.
    Precondition,
    /// The caller lacks the role or ownership; never retryable by that caller.
    Authorization,
    /// The referenced record does not exist.
    NotFound,
    /// Malformed input.
    Invalid,
    /// The store failed; nothing was committed.
    Storage,
}

/// Errors that can occur in registry operations.
#[derive(Debug, Error)]
pub enum AccessError {
    /// Caller is not the configured administrator
    #[error("Not authorized: {caller} is not the registry administrator")]
    NotAdmin { caller: Principal },

    /// Identity already exists
    #[error("Identity already registered: {principal}")]
    AlreadyRegistered { principal: Principal },

    /// Identity not found
    #[error("Identity not found: {principal}")]
    IdentityNotFound { principal: Principal },

    /// Endpoint already registered for this owner
    #[error("Endpoint already registered: {owner}/{device_id}")]
    DuplicateEndpoint { owner: Principal, device_id: String },

    /// Consumer has no authorization record
    #[error("Consumer not authorized: {consumer}")]
    ConsumerNotAuthorized { consumer: Principal },

    /// No grant exists for the key
    #[error("Grant not found: owner={owner} consumer={consumer} domain={domain}")]
    GrantNotFound {
        owner: Principal,
        consumer: Principal,
        domain: String,
    },

    /// Consumer was already authorized
    #[error("Consumer already authorized: {consumer}")]
    AlreadyAuthorized { consumer: Principal },

    /// Caller tried to touch a grant owned by someone else
    #[error("Not grant owner: {caller} cannot modify grants of {owner}")]
    NotGrantOwner { caller: Principal, owner: Principal },

    /// Argument failed validation
    #[error("Invalid argument {field}: {reason}")]
    InvalidArgument { field: &'static str, reason: String },

    /// Store or audit ledger failure
    #[error("Storage error: {0}")]
    Storage(#[from] LedgerError),
}

impl AccessError {
    /// Stable error code, `None` for storage failures.
    pub fn code(&self) -> Option<u32> {
        match self {
            AccessError::NotAdmin { .. } => Some(1),
            AccessError::AlreadyRegistered { .. } => Some(2),
            AccessError::IdentityNotFound { .. } => Some(3),
            AccessError::DuplicateEndpoint { .. } => Some(4),
            AccessError::ConsumerNotAuthorized { .. } => Some(5),
            AccessError::GrantNotFound { .. } => Some(6),
            AccessError::AlreadyAuthorized { .. } => Some(7),
            AccessError::NotGrantOwner { .. } => Some(8),
            AccessError::InvalidArgument { .. } => Some(9),
            AccessError::Storage(_) => None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AccessError::AlreadyRegistered { .. }
            | AccessError::DuplicateEndpoint { .. }
            | AccessError::AlreadyAuthorized { .. } => ErrorKind::Conflict,
            AccessError::IdentityNotFound { .. } | AccessError::ConsumerNotAuthorized { .. } => {
                ErrorKind::Precondition
            }
            AccessError::NotAdmin { .. } | AccessError::NotGrantOwner { .. } => {
                ErrorKind::Authorization
            }
            AccessError::GrantNotFound { .. } => ErrorKind::NotFound,
            AccessError::InvalidArgument { .. } => ErrorKind::Invalid,
            AccessError::Storage(_) => ErrorKind::Storage,
        }
    }

    /// Whether the same call can succeed once a prerequisite is in place.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Precondition
    }
}

impl From<rusqlite::Error> for AccessError {
    fn from(e: rusqlite::Error) -> Self {
        AccessError::Storage(LedgerError::DatabaseError(e))
    }
}

/// Result type for registry operations.
pub type AccessResult<T> = Result<T, AccessError>;

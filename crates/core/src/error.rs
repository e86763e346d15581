//! Core error types

use thiserror::Error;

/// Core error type for VitalLedger
#[derive(Debug, Error)]
pub enum CoreError {
    /// Principal failed validation
    #[error("Invalid principal: {0}")]
    InvalidPrincipal(String),

    /// Caller signature could not be verified
    #[error("Signature verification failed: {0}")]
    SignatureVerification(String),

    /// Configuration is unusable
    #[error("Configuration error: {0}")]
    Config(String),

    /// Clock was asked to move backwards
    #[error("Clock regression: current height {current}, requested {requested}")]
    ClockRegression { current: u64, requested: u64 },

    /// Height does not fit the storage range
    #[error("Block height {0} is out of range")]
    HeightOutOfRange(u64),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;

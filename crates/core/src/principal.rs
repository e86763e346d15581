//! Opaque caller principals.
//!
//! A principal is the only notion of "who is calling" the registry has. It is
//! compared by value and never interpreted, so any capability-bearing string
//! works: a wallet address handed over by a transaction layer, or a key
//! fingerprint derived from a verified Ed25519 signature.

use crate::error::{CoreError, Result};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Upper bound on the encoded length of a principal.
pub const MAX_PRINCIPAL_LEN: usize = 128;

/// Opaque, comparable caller identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Principal(String);

impl Principal {
    /// Accept an externally issued principal after shape validation.
    pub fn parse(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();

        if raw.is_empty() {
            return Err(CoreError::InvalidPrincipal(
                "principal cannot be empty".to_string(),
            ));
        }

        if raw.len() > MAX_PRINCIPAL_LEN {
            return Err(CoreError::InvalidPrincipal(format!(
                "principal exceeds {} bytes",
                MAX_PRINCIPAL_LEN
            )));
        }

        if raw.chars().any(char::is_whitespace) {
            return Err(CoreError::InvalidPrincipal(
                "principal cannot contain whitespace".to_string(),
            ));
        }

        Ok(Self(raw))
    }

    /// Derive the principal bound to an Ed25519 verifying key.
    ///
    /// The encoding is the hex BLAKE3 digest of the raw key bytes.
    pub fn from_verifying_key(key: &VerifyingKey) -> Self {
        Self(hex::encode(blake3::hash(key.as_bytes()).as_bytes()))
    }

    /// Authenticate a caller from a signed message.
    ///
    /// Returns the principal of the signing key only if `signature` is a valid
    /// Ed25519 signature over `message`.
    pub fn authenticate(public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<Self> {
        let key_bytes: [u8; 32] = public_key.try_into().map_err(|_| {
            CoreError::SignatureVerification(format!(
                "public key must be 32 bytes, got {}",
                public_key.len()
            ))
        })?;

        let key = VerifyingKey::from_bytes(&key_bytes)
            .map_err(|e| CoreError::SignatureVerification(e.to_string()))?;
        let signature = Signature::from_slice(signature)
            .map_err(|e| CoreError::SignatureVerification(e.to_string()))?;

        key.verify(message, &signature)
            .map_err(|e| CoreError::SignatureVerification(e.to_string()))?;

        Ok(Self::from_verifying_key(&key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Principal {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Principal {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(value)
    }
}

impl From<Principal> for String {
    fn from(principal: Principal) -> Self {
        principal.0
    }
}

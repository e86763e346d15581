//! Replay protection for signed callers.
//!
//! A signature covers the command, its arguments and the block height, so
//! it can only be replayed verbatim. A signed write is accepted only when
//! its height is not behind the audit head and is strictly after the
//! signer's last audited action. Each signer therefore lands at most one
//! signed write per block, and a captured signature cannot be resubmitted
//! once it has taken effect.

use thiserror::Error;
use vitalledger_core::{BlockHeight, Principal};
use vitalledger_registry::{AccessError, AccessRegistry};

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("stale height {height}: registry is already at height {head}")]
    StaleHeight {
        height: BlockHeight,
        head: BlockHeight,
    },

    #[error("{signer} already acted at height {last}; signed height {height} must be later")]
    AlreadyActed {
        signer: Principal,
        height: BlockHeight,
        last: BlockHeight,
    },

    #[error(transparent)]
    Registry(#[from] AccessError),
}

pub type ReplayResult<T> = Result<T, ReplayError>;

/// Reject a signed write at `height` that could be a resubmission.
pub fn ensure_fresh(
    registry: &AccessRegistry,
    signer: &Principal,
    height: BlockHeight,
) -> ReplayResult<()> {
    if let Some(head) = registry.audit_head()? {
        if height < head.height {
            return Err(ReplayError::StaleHeight {
                height,
                head: head.height,
            });
        }
    }

    if let Some(last) = registry.last_audit_event_by(signer)? {
        if height <= last.height {
            return Err(ReplayError::AlreadyActed {
                signer: signer.clone(),
                height,
                last: last.height,
            });
        }
    }

    Ok(())
}

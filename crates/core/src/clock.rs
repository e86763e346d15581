//! Logical clock supplied by the host chain.
//!
//! The registry never reads wall-clock time. Every operation receives the
//! current block height from outside and grant expiry is a comparison
//! against it.

use crate::error::{CoreError, Result};
use crate::principal::Principal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotone non-decreasing logical time.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct BlockHeight(pub u64);

impl BlockHeight {
    pub const GENESIS: BlockHeight = BlockHeight(0);

    /// Largest height that fits a SQLite INTEGER column.
    pub const MAX: BlockHeight = BlockHeight(i64::MAX as u64);

    /// Range-checked constructor for heights coming from outside.
    pub fn new(value: u64) -> Result<Self> {
        if value > Self::MAX.0 {
            return Err(CoreError::HeightOutOfRange(value));
        }
        Ok(BlockHeight(value))
    }

    /// Height `blocks` after this one, or `None` past [`BlockHeight::MAX`].
    pub fn checked_offset(self, blocks: u64) -> Option<BlockHeight> {
        self.0
            .checked_add(blocks)
            .filter(|h| *h <= Self::MAX.0)
            .map(BlockHeight)
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for BlockHeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u64> for BlockHeight {
    type Error = CoreError;

    fn try_from(value: u64) -> Result<Self> {
        BlockHeight::new(value)
    }
}

#[cfg(feature = "sqlite")]
impl rusqlite::types::ToSql for BlockHeight {
    fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
        let value = i64::try_from(self.0)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
        Ok(rusqlite::types::ToSqlOutput::from(value))
    }
}

#[cfg(feature = "sqlite")]
impl rusqlite::types::FromSql for BlockHeight {
    fn column_result(value: rusqlite::types::ValueRef<'_>) -> rusqlite::types::FromSqlResult<Self> {
        let raw = <i64 as rusqlite::types::FromSql>::column_result(value)?;
        u64::try_from(raw)
            .map(BlockHeight)
            .map_err(|_| rusqlite::types::FromSqlError::OutOfRange(raw))
    }
}

/// Source of the current block height.
pub trait Clock {
    fn height(&self) -> BlockHeight;
}

/// Clock driven by an external block producer.
///
/// Heights only move forward; `set` rejects regressions.
#[derive(Debug, Default)]
pub struct ManualClock {
    height: AtomicU64,
}

impl ManualClock {
    pub fn new(start: BlockHeight) -> Self {
        Self {
            height: AtomicU64::new(start.0.min(BlockHeight::MAX.0)),
        }
    }

    /// Advance by `blocks` and return the new height. Stops at [`BlockHeight::MAX`].
    pub fn advance(&self, blocks: u64) -> BlockHeight {
        let previous = self
            .height
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |h| {
                Some(h.saturating_add(blocks).min(BlockHeight::MAX.0))
            })
            .unwrap_or_else(|h| h);
        BlockHeight(previous.saturating_add(blocks).min(BlockHeight::MAX.0))
    }

    /// Jump to an absolute height at or after the current one.
    pub fn set(&self, height: BlockHeight) -> Result<()> {
        let height = BlockHeight::new(height.0)?;
        self.height
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                (height.0 >= current).then_some(height.0)
            })
            .map(|_| ())
            .map_err(|current| CoreError::ClockRegression {
                current,
                requested: height.0,
            })
    }
}

impl Clock for ManualClock {
    fn height(&self) -> BlockHeight {
        BlockHeight(self.height.load(Ordering::SeqCst))
    }
}

/// Caller identity and logical time for a single registry operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallContext {
    pub caller: Principal,
    pub height: BlockHeight,
}

impl CallContext {
    pub fn new(caller: Principal, height: BlockHeight) -> Self {
        Self { caller, height }
    }

    /// Context stamped with the clock's current height.
    pub fn now(caller: Principal, clock: &impl Clock) -> Self {
        Self::new(caller, clock.height())
    }
}

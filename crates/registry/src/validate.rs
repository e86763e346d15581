//! Argument validation applied before any precondition lookup.

use crate::error::{AccessError, AccessResult};
use vitalledger_core::BlockHeight;

/// Upper bound on device ids, device types, categories and domains.
pub const MAX_TEXT_LEN: usize = 64;

pub(crate) fn require_text(field: &'static str, value: &str) -> AccessResult<()> {
    if value.is_empty() {
        return Err(AccessError::InvalidArgument {
            field,
            reason: "cannot be empty".to_string(),
        });
    }

    if value.len() > MAX_TEXT_LEN {
        return Err(AccessError::InvalidArgument {
            field,
            reason: format!("exceeds {} bytes", MAX_TEXT_LEN),
        });
    }

    Ok(())
}

/// Heights past [`BlockHeight::MAX`] cannot be stored.
pub(crate) fn require_height(height: BlockHeight) -> AccessResult<()> {
    if height > BlockHeight::MAX {
        return Err(AccessError::InvalidArgument {
            field: "height",
            reason: format!("{} exceeds {}", height, BlockHeight::MAX),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_text_bounds() {
        assert!(require_text("domain", "cardiac-metrics").is_ok());
        assert!(require_text("domain", &"d".repeat(MAX_TEXT_LEN)).is_ok());
        assert!(matches!(
            require_text("domain", ""),
            Err(AccessError::InvalidArgument { field: "domain", .. })
        ));
        assert!(require_text("domain", &"d".repeat(MAX_TEXT_LEN + 1)).is_err());
    }

    #[test]
    fn test_require_height_bounds() {
        assert!(require_height(BlockHeight::MAX).is_ok());
        assert!(matches!(
            require_height(BlockHeight(BlockHeight::MAX.0 + 1)),
            Err(AccessError::InvalidArgument { field: "height", .. })
        ));
    }
}

//! # Validation Module
//!
//! Input validation for adjustment and sync operations.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: THIS MODULE - business rule validation                        │
//! │  ├── Runs before any database work                                     │
//! │  └── Validation failures are never retried                             │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Database (SQLite)                                             │
//! │  ├── NOT NULL / UNIQUE / CHECK constraints                              │
//! │  └── Foreign key constraints                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::{MAX_ADJUSTMENT_QUANTITY, MAX_SKU_LEN};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a SKU (Stock Keeping Unit).
///
/// ## Rules
/// - Must not be empty (after trimming)
/// - At most [`MAX_SKU_LEN`] characters
/// - Only alphanumeric characters, hyphens, underscores, and dots
pub fn validate_sku(sku: &str) -> ValidationResult<()> {
    let sku = sku.trim();

    if sku.is_empty() {
        return Err(ValidationError::Required {
            field: "sku".to_string(),
        });
    }

    if sku.len() > MAX_SKU_LEN {
        return Err(ValidationError::TooLong {
            field: "sku".to_string(),
            max: MAX_SKU_LEN,
        });
    }

    if !sku
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(ValidationError::InvalidFormat {
            field: "sku".to_string(),
            reason: "must contain only letters, numbers, hyphens, underscores, and dots"
                .to_string(),
        });
    }

    Ok(())
}

/// Validates a source identifier (configured vendor/POS source).
pub fn validate_source_id(source_id: &str) -> ValidationResult<()> {
    if source_id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "source_id".to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a quantity for deduct/add (must be strictly positive and bounded).
pub fn validate_quantity(quantity: i64) -> ValidationResult<()> {
    if quantity <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }
    if quantity > MAX_ADJUSTMENT_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ADJUSTMENT_QUANTITY,
        });
    }
    Ok(())
}

/// Validates an absolute target quantity for `set_absolute`.
///
/// Zero is allowed (an external source reporting an empty shelf is
/// normal); negatives are not, even with backorder, because external
/// systems report physical counts.
pub fn validate_target_quantity(target: i64) -> ValidationResult<()> {
    if target < 0 {
        return Err(ValidationError::OutOfRange {
            field: "target_quantity".to_string(),
            min: 0,
            max: MAX_ADJUSTMENT_QUANTITY,
        });
    }
    if target > MAX_ADJUSTMENT_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "target_quantity".to_string(),
            min: 0,
            max: MAX_ADJUSTMENT_QUANTITY,
        });
    }
    Ok(())
}

/// Validates a low-stock threshold (non-negative).
pub fn validate_threshold(threshold: i64) -> ValidationResult<()> {
    if threshold < 0 {
        return Err(ValidationError::OutOfRange {
            field: "low_stock_threshold".to_string(),
            min: 0,
            max: MAX_ADJUSTMENT_QUANTITY,
        });
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_sku() {
        assert!(validate_sku("COKE-330").is_ok());
        assert!(validate_sku("abc_123.X").is_ok());
        assert!(validate_sku("").is_err());
        assert!(validate_sku("   ").is_err());
        assert!(validate_sku(&"A".repeat(100)).is_err());
        assert!(validate_sku("has space").is_err());
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-5).is_err());
        assert!(validate_quantity(MAX_ADJUSTMENT_QUANTITY + 1).is_err());
    }

    #[test]
    fn test_validate_target_quantity() {
        assert!(validate_target_quantity(0).is_ok());
        assert!(validate_target_quantity(50).is_ok());
        assert!(validate_target_quantity(-1).is_err());
    }

    #[test]
    fn test_validate_threshold() {
        assert!(validate_threshold(0).is_ok());
        assert!(validate_threshold(10).is_ok());
        assert!(validate_threshold(-1).is_err());
    }
}

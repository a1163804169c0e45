//! # Error Types
//!
//! Domain-specific error types for stockpilot-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  stockpilot-core errors (this file)                                    │
//! │  ├── CoreError        - Business rule violations                       │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  stockpilot-db errors (separate crate)                                 │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  stockpilot-sync errors (separate crate)                               │
//! │  └── SyncError        - Adapter/orchestrator failures                  │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → SyncError → SyncRun.error│
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (SKU, ID, quantities)
//! 3. Errors are enum variants, never String
//! 4. A skipped adjustment (tracking disabled) is an *outcome*, not an error

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
///
/// These errors represent business rule violations. They are recoverable
/// and surfaced to callers; they are never retried blindly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Stock item cannot be found by ID.
    #[error("Stock item not found: {0}")]
    ItemNotFound(String),

    /// No stock item carries the given SKU.
    ///
    /// ## When This Occurs
    /// - A sync record references a SKU that was never imported
    /// - An order line references a deactivated item
    #[error("No stock item with SKU: {0}")]
    SkuNotFound(String),

    /// Deduction exceeds availability and backorder is disallowed.
    ///
    /// ## Guarantee
    /// The adjustment that raised this error left state unchanged: no
    /// quantity mutation, no ledger entry.
    #[error("Insufficient stock for {sku}: available {available}, requested {requested}")]
    InsufficientStock {
        sku: String,
        available: i64,
        requested: i64,
    },

    /// Two writers raced on the same item row.
    ///
    /// ## When This Occurs
    /// The compare-and-set guard on the quantity UPDATE missed because
    /// another transaction committed between our read and our write.
    /// The adjustment engine retries once before surfacing this.
    #[error("Concurrent modification of stock item {item_id}")]
    ConcurrencyConflict { item_id: String },

    /// The item exists but is soft-deactivated.
    #[error("Stock item {0} is deactivated")]
    ItemDeactivated(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These occur when input doesn't meet requirements. Used for early
/// validation before any business logic or database work runs.
/// Validation failures are never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., invalid characters in a SKU).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Duplicate value (e.g., duplicate SKU).
    #[error("{field} '{value}' already exists")]
    Duplicate { field: String, value: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InsufficientStock {
            sku: "COKE-330".to_string(),
            available: 3,
            requested: 5,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for COKE-330: available 3, requested 5"
        );
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::Required {
            field: "sku".to_string(),
        };
        assert_eq!(err.to_string(), "sku is required");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::MustBePositive {
            field: "quantity".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}

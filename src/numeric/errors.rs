// ============================================================================
// Numeric Errors
// Error types for checked decimal arithmetic
// ============================================================================

use thiserror::Error;

/// Errors that can occur during checked decimal arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum NumericError {
    /// Result exceeded the representable decimal range
    #[error("arithmetic overflow: result exceeded maximum value")]
    Overflow,
    /// Attempted division by zero
    #[error("division by zero")]
    DivisionByZero,
}

/// Result type alias for numeric operations
pub type NumericResult<T> = Result<T, NumericError>;

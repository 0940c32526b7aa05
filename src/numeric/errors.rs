// ============================================================================
// Numeric Errors
// Error types for the constant-product math kernel
// ============================================================================

use std::fmt;

/// Errors that can occur inside the pure AMM math functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MathError {
    /// Reserves are empty, or the computed output would be zero or would
    /// drain a reserve completely
    InsufficientLiquidity,
    /// Input amount is zero or too small to produce any output
    InsufficientInputAmount,
    /// Requested output is zero or not obtainable from the reserves
    InsufficientOutputAmount,
    /// An intermediate product exceeded 512 bits
    Overflow,
    /// The commission-adjusted reserve product decreased across a swap.
    /// This indicates an arithmetic or bookkeeping bug, not user error,
    /// and callers must abort the operation rather than persist the result.
    KInvariantViolation,
}

impl fmt::Display for MathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MathError::InsufficientLiquidity => write!(f, "insufficient liquidity"),
            MathError::InsufficientInputAmount => write!(f, "insufficient input amount"),
            MathError::InsufficientOutputAmount => write!(f, "insufficient output amount"),
            MathError::Overflow => write!(f, "arithmetic overflow: value exceeded 512 bits"),
            MathError::KInvariantViolation => {
                write!(f, "K invariant violation: reserve product decreased")
            }
        }
    }
}

impl std::error::Error for MathError {}

/// Result type alias for math operations
pub type MathResult<T> = Result<T, MathError>;

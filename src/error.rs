// ============================================================================
// Swap Engine Errors
// ============================================================================

use std::fmt;

use crate::numeric::MathError;

/// Errors surfaced by pair, registry and router operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwapError {
    /// Pool reserves cannot support the operation
    InsufficientLiquidity,
    /// Input amount is zero or produces no output
    InsufficientInputAmount,
    /// Requested output is zero or unobtainable
    InsufficientOutputAmount,
    /// A pair of a coin with itself was requested
    IdenticalCoins,
    /// The pair already exists
    PairExists,
    /// No order with this id rests in the pair
    OrderNotFound(u32),
    /// The caller does not own the order
    NotOrderOwner,
    /// Both legs of a new order must meet the minimum volume
    OrderVolumeTooLow,
    /// The commission-adjusted reserve product decreased; the operation
    /// must be aborted and nothing persisted
    KInvariantViolation,
    /// An intermediate value exceeded 512 bits
    Overflow,
    /// A persisted record could not be decoded
    Storage(String),
}

impl fmt::Display for SwapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwapError::InsufficientLiquidity => write!(f, "insufficient liquidity"),
            SwapError::InsufficientInputAmount => write!(f, "insufficient input amount"),
            SwapError::InsufficientOutputAmount => write!(f, "insufficient output amount"),
            SwapError::IdenticalCoins => write!(f, "cannot pair a coin with itself"),
            SwapError::PairExists => write!(f, "pair already exists"),
            SwapError::OrderNotFound(id) => write!(f, "order {id} not found"),
            SwapError::NotOrderOwner => write!(f, "caller does not own this order"),
            SwapError::OrderVolumeTooLow => write!(f, "order volume below minimum"),
            SwapError::KInvariantViolation => {
                write!(f, "K invariant violation: reserve product decreased")
            }
            SwapError::Overflow => write!(f, "arithmetic overflow: value exceeded 512 bits"),
            SwapError::Storage(msg) => write!(f, "storage error: {msg}"),
        }
    }
}

impl std::error::Error for SwapError {}

impl From<MathError> for SwapError {
    fn from(err: MathError) -> Self {
        match err {
            MathError::InsufficientLiquidity => SwapError::InsufficientLiquidity,
            MathError::InsufficientInputAmount => SwapError::InsufficientInputAmount,
            MathError::InsufficientOutputAmount => SwapError::InsufficientOutputAmount,
            MathError::Overflow => SwapError::Overflow,
            MathError::KInvariantViolation => SwapError::KInvariantViolation,
        }
    }
}

/// Result type alias for swap operations
pub type SwapResult<T> = Result<T, SwapError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(SwapError::OrderNotFound(7).to_string(), "order 7 not found");
        assert_eq!(
            SwapError::Storage("bad blob".to_string()).to_string(),
            "storage error: bad blob"
        );
    }

    #[test]
    fn test_from_math_error() {
        let err: SwapError = MathError::KInvariantViolation.into();
        assert_eq!(err, SwapError::KInvariantViolation);
    }
}

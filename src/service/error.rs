// ============================================================================
// API Errors
// ============================================================================

use std::fmt;

use crate::error::EngineError;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Error body returned to clients: machine-readable code, message and
/// whether the same request may succeed later
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ApiError {
    pub code: String,
    pub message: String,
    pub retryable: bool,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            retryable: false,
        }
    }

    /// HTTP-style status for transports that want one
    pub fn status(&self) -> u16 {
        match self.code.as_str() {
            "NOT_FOUND" => 404,
            "ALREADY_TERMINAL" => 409,
            "CONCURRENCY_TIMEOUT" | "ASSET_HALTED" => 503,
            "SETTLEMENT_INCONSISTENCY" | "STORE_ERROR" | "LEDGER_ERROR" | "CONFIG_ERROR"
            | "INTERNAL" => 500,
            _ => 400,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        let message = match &err {
            EngineError::Rejected(rejection) => rejection.message.clone(),
            other => other.to_string(),
        };
        Self {
            code: err.code().to_string(),
            message,
            retryable: err.is_retryable(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AssetId, OrderId, OrderStatus};
    use crate::error::{RejectCode, Rejection};

    #[test]
    fn test_from_engine_error() {
        let err: ApiError = EngineError::ConcurrencyTimeout { asset: AssetId(1) }.into();
        assert_eq!(err.code, "CONCURRENCY_TIMEOUT");
        assert!(err.retryable);
        assert_eq!(err.status(), 503);

        let err: ApiError =
            EngineError::from(Rejection::new(RejectCode::InvalidTickSize, "price off tick")).into();
        assert_eq!(err.code, "INVALID_TICK_SIZE");
        assert_eq!(err.message, "price off tick");
        assert!(!err.retryable);
        assert_eq!(err.status(), 400);

        let err: ApiError = EngineError::AlreadyTerminal {
            order_id: OrderId::new(),
            status: OrderStatus::Executed,
        }
        .into();
        assert_eq!(err.status(), 409);
    }
}

use crate::models::WalletId;
use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use rust_decimal::Decimal;
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, WalletError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WalletError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Wallet not found: {0}")]
    WalletNotFound(WalletId),

    #[error("Wallet already exists with external id: {0}")]
    WalletAlreadyExists(String),

    #[error("No transaction found for wallet: {0}")]
    TransactionNotFound(WalletId),

    #[error("A transaction already exists with fingerprint: {0}")]
    DuplicateFingerprint(String),

    #[error("Insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance { available: Decimal, requested: Decimal },

    /// Another writer committed to the same wallet first.
    #[error("Concurrent update on wallet {0}, retry the transaction")]
    ConsistencyConflict(WalletId),

    /// Storage failed for a reason outside the ledger rules. The outcome of
    /// the operation is unknown.
    #[error("Storage failure during {operation}")]
    Infrastructure { operation: &'static str },
}

impl WalletError {
    /// Whether repeating the whole operation can succeed without changing the request.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            WalletError::ConsistencyConflict(_) | WalletError::Infrastructure { .. }
        )
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            WalletError::Validation(_) => "validation_error",
            WalletError::WalletNotFound(_) => "wallet_not_found",
            WalletError::WalletAlreadyExists(_) => "wallet_already_exists",
            WalletError::TransactionNotFound(_) => "transaction_not_found",
            WalletError::DuplicateFingerprint(_) => "duplicate_fingerprint",
            WalletError::InsufficientBalance { .. } => "insufficient_balance",
            WalletError::ConsistencyConflict(_) => "consistency_conflict",
            WalletError::Infrastructure { .. } => "infrastructure_failure",
        }
    }
}

impl From<validator::ValidationErrors> for WalletError {
    fn from(err: validator::ValidationErrors) -> Self {
        WalletError::Validation(err.to_string())
    }
}

impl ResponseError for WalletError {
    fn error_response(&self) -> HttpResponse {
        let status_code = self.status_code();

        HttpResponse::build(status_code).json(json!({
            "error": {
                "code": status_code.as_u16(),
                "message": self.to_string(),
                "type": self.error_type(),
                "retriable": self.is_retriable()
            }
        }))
    }

    fn status_code(&self) -> StatusCode {
        match self {
            WalletError::Validation(_) => StatusCode::BAD_REQUEST,
            WalletError::WalletNotFound(_) => StatusCode::NOT_FOUND,
            WalletError::TransactionNotFound(_) => StatusCode::NOT_FOUND,
            WalletError::WalletAlreadyExists(_) => StatusCode::CONFLICT,
            WalletError::DuplicateFingerprint(_) => StatusCode::CONFLICT,
            WalletError::ConsistencyConflict(_) => StatusCode::CONFLICT,
            WalletError::InsufficientBalance { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            WalletError::Infrastructure { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_only_races_and_storage_failures_are_retriable() {
        assert!(WalletError::ConsistencyConflict(1).is_retriable());
        assert!(WalletError::Infrastructure { operation: "get_wallet" }.is_retriable());

        assert!(!WalletError::WalletNotFound(1).is_retriable());
        assert!(!WalletError::WalletAlreadyExists("abc".into()).is_retriable());
        assert!(!WalletError::DuplicateFingerprint("fp".into()).is_retriable());
        assert!(!WalletError::InsufficientBalance {
            available: dec!(1),
            requested: dec!(-2)
        }
        .is_retriable());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(WalletError::WalletNotFound(7).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            WalletError::DuplicateFingerprint("fp".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            WalletError::InsufficientBalance {
                available: dec!(14.75),
                requested: dec!(-20)
            }
            .status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            WalletError::Infrastructure { operation: "create_transaction" }.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_infrastructure_message_is_opaque() {
        let err = WalletError::Infrastructure { operation: "create_transaction" };
        assert_eq!(err.to_string(), "Storage failure during create_transaction");
    }
}

//! Gateway error types with HTTP status code mapping.
//!
//! [`GatewayError`] is the central error type of the engine. Each variant
//! maps to a numeric code, an HTTP status and a structured JSON error
//! response. Messages are specific enough for a user to decide whether
//! to retry, re-quote or wait.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use rust_decimal::Decimal;
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::{Amount, AssetId, ListingStatus, ParseValueError, TxRef};
use crate::ledger::LedgerError;

/// Structured JSON error response body.
///
/// ```json
/// {
///   "error": {
///     "code": 2002,
///     "message": "token nft-42 is not yet held in escrow",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Whether the same request may succeed later without operator help.
    pub retryable: bool,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Server-side error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category                    | HTTP Status          |
/// |-----------|-----------------------------|----------------------|
/// | 1000–1999 | Validation / auth           | 400 / 401            |
/// | 2000–2999 | Escrow and listing state    | 404 / 409            |
/// | 3000–3999 | Server / configuration      | 500 / 503            |
/// | 4000–4999 | Pool state and pricing      | 409 / 422            |
/// | 5000–5999 | Ledger network              | 422 / 502 / 504      |
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Anchor credentials or network settings missing or malformed.
    #[error("configuration error: {0}")]
    ConfigurationError(String),

    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Swap input exceeds the anti-drain cap.
    #[error("input amount {requested} exceeds the maximum swap size of {max_input}")]
    SwapCapExceeded {
        /// Requested input amount.
        requested: Amount,
        /// Largest accepted input for the current pool.
        max_input: Amount,
    },

    /// One of the pool balances is zero; pricing is undefined.
    #[error("no liquidity: pool balance is zero")]
    NoLiquidity,

    /// The pool cannot pay out the computed amount.
    #[error("insufficient liquidity in pool")]
    InsufficientLiquidity,

    /// The live rate moved beyond the caller's tolerance.
    #[error(
        "slippage exceeded: current rate {current_rate} deviates from expected rate {expected_rate} by more than {tolerance_pct}%"
    )]
    SlippageExceeded {
        /// Rate computed from live balances.
        current_rate: Decimal,
        /// Rate the caller quoted against.
        expected_rate: Decimal,
        /// Caller's tolerance in percent.
        tolerance_pct: Decimal,
    },

    /// Listing with the given ID was not found.
    #[error("listing not found: {0}")]
    ListingNotFound(uuid::Uuid),

    /// The anchor does not hold the NFT yet.
    #[error("token {0} is not yet held in escrow")]
    NotYetEscrowed(AssetId),

    /// Custody on the ledger disagrees with the listing records.
    #[error("escrow mismatch: {0}")]
    EscrowMismatch(String),

    /// The listing is no longer active (sold, cancelled or claimed by a
    /// concurrent request).
    #[error("listing {listing_id} is not active (status: {status})")]
    AlreadyClaimed {
        /// Listing identifier.
        listing_id: uuid::Uuid,
        /// Status observed at execution time.
        status: ListingStatus,
    },

    /// The listing lifecycle does not allow the transition.
    #[error("listing {listing_id} cannot move from {from} to {to}")]
    InvalidTransition {
        /// Listing identifier.
        listing_id: uuid::Uuid,
        /// Current status.
        from: ListingStatus,
        /// Requested status.
        to: ListingStatus,
    },

    /// Another active listing already exists for the token.
    #[error("token {0} already has an active listing")]
    DuplicateListing(AssetId),

    /// The user transfer was already used to settle a swap.
    #[error("user transfer {0} has already been settled")]
    TransferAlreadySettled(TxRef),

    /// Transient failure talking to the ledger.
    #[error("ledger network error: {0}")]
    LedgerNetworkError(String),

    /// The ledger refused the transaction.
    #[error("ledger rejected transaction: {0}")]
    LedgerRejected(String),

    /// The user transfer did not reach finality in time.
    #[error("user transfer {0} did not reach finality before the settlement timeout")]
    SettlementTimeout(TxRef),

    /// The user transfer failed or does not match the request.
    #[error("user transfer invalid: {0}")]
    UserTransferFailed(String),

    /// Persistence layer failure.
    #[error("persistence error: {0}")]
    PersistenceError(String),

    /// Administrative operation without valid authorization.
    #[error("unauthorized")]
    Unauthorized,

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequest(_) => 1001,
            Self::SwapCapExceeded { .. } => 1002,
            Self::Unauthorized => 1101,
            Self::ListingNotFound(_) => 2001,
            Self::NotYetEscrowed(_) => 2002,
            Self::EscrowMismatch(_) => 2003,
            Self::AlreadyClaimed { .. } => 2004,
            Self::InvalidTransition { .. } => 2005,
            Self::DuplicateListing(_) => 2006,
            Self::TransferAlreadySettled(_) => 2007,
            Self::Internal(_) => 3000,
            Self::PersistenceError(_) => 3001,
            Self::ConfigurationError(_) => 3002,
            Self::NoLiquidity => 4001,
            Self::InsufficientLiquidity => 4002,
            Self::SlippageExceeded { .. } => 4003,
            Self::LedgerNetworkError(_) => 5001,
            Self::LedgerRejected(_) => 5002,
            Self::SettlementTimeout(_) => 5003,
            Self::UserTransferFailed(_) => 5004,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) | Self::SwapCapExceeded { .. } => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::ListingNotFound(_) => StatusCode::NOT_FOUND,
            Self::NotYetEscrowed(_)
            | Self::EscrowMismatch(_)
            | Self::AlreadyClaimed { .. }
            | Self::InvalidTransition { .. }
            | Self::DuplicateListing(_)
            | Self::TransferAlreadySettled(_)
            | Self::SlippageExceeded { .. } => StatusCode::CONFLICT,
            Self::NoLiquidity
            | Self::InsufficientLiquidity
            | Self::LedgerRejected(_)
            | Self::UserTransferFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::LedgerNetworkError(_) => StatusCode::BAD_GATEWAY,
            Self::SettlementTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::ConfigurationError(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::PersistenceError(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns `true` if the caller may retry the same request later
    /// (possibly after re-quoting) without operator involvement.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NoLiquidity
                | Self::InsufficientLiquidity
                | Self::SlippageExceeded { .. }
                | Self::NotYetEscrowed(_)
                | Self::LedgerNetworkError(_)
                | Self::SettlementTimeout(_)
        )
    }
}

impl From<ParseValueError> for GatewayError {
    fn from(err: ParseValueError) -> Self {
        Self::InvalidRequest(err.to_string())
    }
}

impl From<LedgerError> for GatewayError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Network(msg) => Self::LedgerNetworkError(msg),
            LedgerError::Rejected(msg) | LedgerError::Authorization(msg) => {
                Self::LedgerRejected(msg)
            }
            LedgerError::Decode(msg) => Self::InvalidRequest(msg),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let details = match &self {
            Self::SwapCapExceeded { max_input, .. } => Some(format!("max_input={max_input}")),
            Self::SlippageExceeded { current_rate, .. } => {
                Some(format!("current_rate={current_rate}"))
            }
            _ => None,
        };
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                retryable: self.is_retryable(),
                details,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn cap_error_carries_maximum() {
        let err = GatewayError::SwapCapExceeded {
            requested: Amount::new(151),
            max_input: Amount::new(150),
        };
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(err.to_string().contains("150"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn slippage_is_retryable_conflict() {
        let err = GatewayError::SlippageExceeded {
            current_rate: dec!(10.6),
            expected_rate: dec!(10),
            tolerance_pct: dec!(5),
        };
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(err.error_code(), 4003);
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn response_body_reports_retryability() {
        let response = GatewayError::NoLiquidity.into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let Ok(bytes) = axum::body::to_bytes(response.into_body(), usize::MAX).await else {
            return;
        };
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap_or_default();
        assert_eq!(body["error"]["code"], 4001);
        assert_eq!(body["error"]["retryable"], true);
    }

    #[test]
    fn ledger_errors_map_to_taxonomy() {
        let network: GatewayError = LedgerError::Network("timeout".to_string()).into();
        assert_eq!(network.status_code(), StatusCode::BAD_GATEWAY);

        let rejected: GatewayError = LedgerError::Rejected("bad seq".to_string()).into();
        assert_eq!(rejected.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn configuration_error_is_fatal() {
        let err = GatewayError::ConfigurationError("missing key".to_string());
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(!err.is_retryable());
    }
}

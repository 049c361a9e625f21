//! Shared DTO types and request parsing helpers.

use serde::Deserialize;
use utoipa::IntoParams;

use crate::domain::{AccountAddress, Amount, AssetId, Network};
use crate::error::GatewayError;

/// `?network=` query parameter.
#[derive(Debug, Clone, Copy, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct NetworkQuery {
    /// Ledger network (`main` or `test`).
    pub network: Network,
}

/// Parses a string-encoded amount field.
///
/// # Errors
///
/// Returns [`GatewayError::InvalidRequest`] naming the field.
pub fn parse_amount(field: &str, value: &str) -> Result<Amount, GatewayError> {
    value
        .parse()
        .map_err(|_| GatewayError::InvalidRequest(format!("invalid {field}: {value:?}")))
}

/// Parses an asset code field.
///
/// # Errors
///
/// Returns [`GatewayError::InvalidRequest`] naming the field.
pub fn parse_asset(field: &str, value: &str) -> Result<AssetId, GatewayError> {
    AssetId::new(value)
        .map_err(|_| GatewayError::InvalidRequest(format!("invalid {field}: {value:?}")))
}

/// Parses an account address field.
///
/// # Errors
///
/// Returns [`GatewayError::InvalidRequest`] naming the field.
pub fn parse_address(field: &str, value: &str) -> Result<AccountAddress, GatewayError> {
    AccountAddress::parse(value)
        .map_err(|_| GatewayError::InvalidRequest(format!("malformed address in {field}: {value:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amount_errors_name_the_field() {
        let err = parse_amount("inputAmount", "-5").err().map(|e| e.to_string());
        assert!(err.is_some_and(|m| m.contains("inputAmount")));
        assert_eq!(parse_amount("inputAmount", "100").ok(), Some(Amount::new(100)));
    }

    #[test]
    fn malformed_address_is_rejected() {
        assert!(matches!(
            parse_address("callerAddress", "not-an-address"),
            Err(GatewayError::InvalidRequest(_))
        ));
    }
}

//! Database row shapes for listings and swap records.
//!
//! Rows are fetched as tuples and converted into domain types here, so a
//! corrupt row surfaces as a [`GatewayError::PersistenceError`] naming the
//! offending column instead of a panic.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::{
    AccountAddress, Amount, AssetId, Listing, ListingId, ListingStatus, Network, SwapRecord,
};
use crate::error::GatewayError;

/// Column list matching [`ListingRow`].
pub const LISTING_COLUMNS: &str = "id, network, token_id, seller_address, price, currency, \
                                   status, buyer_address, created_at, sold_at";

/// Column list matching [`SwapRow`].
pub const SWAP_COLUMNS: &str =
    "network, from_asset, to_asset, rate, pool_balance_a, pool_balance_b, volume, created_at";

/// A row of the `listings` table.
pub type ListingRow = (
    Uuid,
    String,
    String,
    String,
    Decimal,
    String,
    String,
    Option<String>,
    DateTime<Utc>,
    Option<DateTime<Utc>>,
);

/// A row of the `swap_records` table. Amounts are stored as text so that
/// `u128` values survive the round trip.
pub type SwapRow = (
    String,
    String,
    String,
    Decimal,
    String,
    String,
    String,
    DateTime<Utc>,
);

fn corrupt(column: &str, err: impl std::fmt::Display) -> GatewayError {
    GatewayError::PersistenceError(format!("corrupt {column} column: {err}"))
}

/// Converts a `listings` row into a [`Listing`].
///
/// # Errors
///
/// Returns [`GatewayError::PersistenceError`] if a column does not parse.
pub fn listing_from_row(row: ListingRow) -> Result<Listing, GatewayError> {
    let (id, network, token_id, seller, price, currency, status, buyer, created_at, sold_at) = row;
    Ok(Listing {
        id: ListingId::from_uuid(id),
        network: network.parse().map_err(|e| corrupt("network", e))?,
        token_id: AssetId::new(token_id).map_err(|e| corrupt("token_id", e))?,
        seller_address: AccountAddress::parse(&seller).map_err(|e| corrupt("seller_address", e))?,
        price,
        currency,
        status: status
            .parse::<ListingStatus>()
            .map_err(|e| corrupt("status", e))?,
        buyer_address: buyer
            .as_deref()
            .map(AccountAddress::parse)
            .transpose()
            .map_err(|e| corrupt("buyer_address", e))?,
        created_at,
        sold_at,
    })
}

/// Converts a `swap_records` row into a [`SwapRecord`].
///
/// # Errors
///
/// Returns [`GatewayError::PersistenceError`] if a column does not parse.
pub fn swap_from_row(row: SwapRow) -> Result<SwapRecord, GatewayError> {
    let (network, from_asset, to_asset, rate, balance_a, balance_b, volume, created_at) = row;
    Ok(SwapRecord {
        from_asset: AssetId::new(from_asset).map_err(|e| corrupt("from_asset", e))?,
        to_asset: AssetId::new(to_asset).map_err(|e| corrupt("to_asset", e))?,
        rate,
        pool_balance_a: balance_a
            .parse::<Amount>()
            .map_err(|e| corrupt("pool_balance_a", e))?,
        pool_balance_b: balance_b
            .parse::<Amount>()
            .map_err(|e| corrupt("pool_balance_b", e))?,
        volume: volume.parse::<Amount>().map_err(|e| corrupt("volume", e))?,
        network: network.parse::<Network>().map_err(|e| corrupt("network", e))?,
        timestamp: created_at,
    })
}

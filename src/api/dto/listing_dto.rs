//! Escrow listing DTOs.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::domain::{Listing, ListingStatus, Network};
use crate::service::{CancelReceipt, PurchaseReceipt};

/// Request body for `POST /api/v1/listings`.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateListingRequest {
    /// Ledger network.
    pub network: Network,
    /// NFT already transferred to the anchor.
    pub token_id: String,
    /// Seller address.
    pub seller_address: String,
    /// Asking price.
    #[schema(value_type = f64)]
    pub price: Decimal,
    /// Price currency code.
    pub currency: String,
}

/// Request body for `POST /api/v1/listings/{id}/buy`.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BuyRequest {
    /// Ledger network.
    pub network: Network,
    /// Buyer address; receives the NFT.
    pub buyer_address: String,
}

/// Request body for `POST /api/v1/listings/{id}/cancel`.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    /// Ledger network.
    pub network: Network,
}

/// Query parameters of `GET /api/v1/listings`.
#[derive(Debug, Clone, Copy, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListingQuery {
    /// Ledger network.
    pub network: Network,
    /// Optional status filter.
    #[serde(default)]
    pub status: Option<ListingStatus>,
}

/// Persisted listing.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListingDto {
    /// Listing identifier.
    pub id: uuid::Uuid,
    /// Ledger network.
    pub network: Network,
    /// Escrowed NFT.
    pub token_id: String,
    /// Seller address.
    pub seller_address: String,
    /// Asking price.
    pub price: String,
    /// Price currency code.
    pub currency: String,
    /// Lifecycle state.
    pub status: ListingStatus,
    /// Buyer, once sold.
    pub buyer_address: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Sale time.
    pub sold_at: Option<DateTime<Utc>>,
}

impl From<Listing> for ListingDto {
    fn from(listing: Listing) -> Self {
        Self {
            id: *listing.id.as_uuid(),
            network: listing.network,
            token_id: listing.token_id.to_string(),
            seller_address: listing.seller_address.to_string(),
            price: listing.price.to_string(),
            currency: listing.currency,
            status: listing.status,
            buyer_address: listing.buyer_address.map(|b| b.to_string()),
            created_at: listing.created_at,
            sold_at: listing.sold_at,
        }
    }
}

/// Response body for `POST /api/v1/listings/{id}/buy`.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseResponse {
    /// Listing after the sale.
    pub listing: ListingDto,
    /// Delivery transaction hash, or `"unknown"`.
    pub transaction_ref: String,
}

impl From<PurchaseReceipt> for PurchaseResponse {
    fn from(receipt: PurchaseReceipt) -> Self {
        Self {
            listing: receipt.listing.into(),
            transaction_ref: receipt.transaction_ref.to_string(),
        }
    }
}

/// Response body for `POST /api/v1/listings/{id}/cancel`.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    /// Listing after cancellation.
    pub listing: ListingDto,
    /// Return transaction hash or `"unknown"`; absent when nothing was
    /// returned.
    pub transaction_ref: Option<String>,
    /// `true` if the anchor no longer held the NFT.
    pub custody_missing: bool,
}

impl From<CancelReceipt> for CancelResponse {
    fn from(receipt: CancelReceipt) -> Self {
        Self {
            listing: receipt.listing.into(),
            transaction_ref: receipt.transaction_ref.map(|t| t.to_string()),
            custody_missing: receipt.custody_missing,
        }
    }
}

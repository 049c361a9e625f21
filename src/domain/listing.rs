//! Escrow listings and their lifecycle.
//!
//! A [`Listing`] is the authoritative record of an NFT held in escrow by
//! the anchor account. Its [`ListingStatus`] only moves forward:
//!
//! ```text
//! PendingEscrow ──► Active ──► Sold
//!                     │
//!                     └──────► Cancelled
//! ```
//!
//! `Sold` and `Cancelled` are terminal; rows are never deleted.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{AccountAddress, AssetId, ListingId, Network};
use crate::error::GatewayError;

/// Maximum length of a listing currency code.
pub const MAX_CURRENCY_LEN: usize = 16;

/// Lifecycle state of a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
    /// Seller announced the listing; custody not verified yet.
    PendingEscrow,
    /// NFT verified in escrow and available for purchase.
    Active,
    /// Purchased; NFT transferred to the buyer.
    Sold,
    /// Withdrawn; NFT returned to the seller (or already absent).
    Cancelled,
}

impl ListingStatus {
    /// Storage and wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PendingEscrow => "pending_escrow",
            Self::Active => "active",
            Self::Sold => "sold",
            Self::Cancelled => "cancelled",
        }
    }

    /// Returns `true` for `Sold` and `Cancelled`.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Sold | Self::Cancelled)
    }

    /// Returns `true` if the lifecycle allows moving from `self` to `next`.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::PendingEscrow, Self::Active)
                | (Self::Active, Self::Sold)
                | (Self::Active, Self::Cancelled)
        )
    }

    /// Validates a transition.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidTransition`] if the lifecycle does
    /// not allow it.
    pub fn transition(self, next: Self, listing_id: ListingId) -> Result<Self, GatewayError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(GatewayError::InvalidTransition {
                listing_id: *listing_id.as_uuid(),
                from: self,
                to: next,
            })
        }
    }
}

impl fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ListingStatus {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending_escrow" => Ok(Self::PendingEscrow),
            "active" => Ok(Self::Active),
            "sold" => Ok(Self::Sold),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(GatewayError::InvalidRequest(format!(
                "unknown listing status: {other}"
            ))),
        }
    }
}

/// Persisted escrow listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    /// Listing identifier.
    pub id: ListingId,
    /// Network the NFT lives on.
    pub network: Network,
    /// The single non-fungible asset being sold.
    pub token_id: AssetId,
    /// Seller; receives the NFT back on cancellation.
    pub seller_address: AccountAddress,
    /// Asking price in `currency` units.
    pub price: Decimal,
    /// Currency code of the price.
    pub currency: String,
    /// Authoritative lifecycle state.
    pub status: ListingStatus,
    /// Buyer, set when sold.
    pub buyer_address: Option<AccountAddress>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Sale timestamp.
    pub sold_at: Option<DateTime<Utc>>,
}

/// Validated input for a new listing.
#[derive(Debug, Clone, PartialEq)]
pub struct NewListing {
    /// NFT to list.
    pub token_id: AssetId,
    /// Seller address.
    pub seller_address: AccountAddress,
    /// Asking price, strictly positive.
    pub price: Decimal,
    /// Currency code.
    pub currency: String,
}

impl NewListing {
    /// Validates the listing terms.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRequest`] if the price is not
    /// positive or the currency code is blank or too long.
    pub fn new(
        token_id: AssetId,
        seller_address: AccountAddress,
        price: Decimal,
        currency: &str,
    ) -> Result<Self, GatewayError> {
        if price <= Decimal::ZERO {
            return Err(GatewayError::InvalidRequest(format!(
                "price must be positive, got {price}"
            )));
        }
        let currency = currency.trim();
        if currency.is_empty() || currency.len() > MAX_CURRENCY_LEN {
            return Err(GatewayError::InvalidRequest(format!(
                "invalid currency code: {currency:?}"
            )));
        }
        Ok(Self {
            token_id,
            seller_address,
            price,
            currency: currency.to_string(),
        })
    }

    /// Promotes verified terms to an active listing.
    ///
    /// Custody must have been confirmed by the caller; this only walks the
    /// `PendingEscrow → Active` edge.
    ///
    /// # Errors
    ///
    /// Propagates [`ListingStatus::transition`] failures.
    pub fn activate(self, network: Network) -> Result<Listing, GatewayError> {
        let id = ListingId::new();
        let status = ListingStatus::PendingEscrow.transition(ListingStatus::Active, id)?;
        Ok(Listing {
            id,
            network,
            token_id: self.token_id,
            seller_address: self.seller_address,
            price: self.price,
            currency: self.currency,
            status,
            buyer_address: None,
            created_at: Utc::now(),
            sold_at: None,
        })
    }
}

/// Conditional status change applied by a [`crate::persistence::ListingStore`].
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    /// New status.
    pub status: ListingStatus,
    /// Buyer to record (sales only).
    pub buyer_address: Option<AccountAddress>,
    /// Sale timestamp (sales only).
    pub sold_at: Option<DateTime<Utc>>,
}

impl StatusUpdate {
    /// Update marking a listing sold to `buyer` now.
    #[must_use]
    pub fn sold(buyer: AccountAddress) -> Self {
        Self {
            status: ListingStatus::Sold,
            buyer_address: Some(buyer),
            sold_at: Some(Utc::now()),
        }
    }

    /// Update marking a listing cancelled.
    #[must_use]
    pub const fn cancelled() -> Self {
        Self {
            status: ListingStatus::Cancelled,
            buyer_address: None,
            sold_at: None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;
    use rust_decimal_macros::dec;

    fn seller() -> AccountAddress {
        AccountAddress::from_public_key(&SigningKey::from_bytes(&[3u8; 32]).verifying_key())
    }

    fn token() -> AssetId {
        let Ok(token) = AssetId::new("nft-0001") else {
            panic!("valid token id");
        };
        token
    }

    #[test]
    fn lifecycle_edges() {
        use ListingStatus::*;
        assert!(PendingEscrow.can_transition_to(Active));
        assert!(Active.can_transition_to(Sold));
        assert!(Active.can_transition_to(Cancelled));

        assert!(!PendingEscrow.can_transition_to(Sold));
        assert!(!Active.can_transition_to(Active));
        assert!(!Sold.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Cancelled));
        assert!(!Sold.can_transition_to(Active));
    }

    #[test]
    fn terminal_states() {
        assert!(ListingStatus::Sold.is_terminal());
        assert!(ListingStatus::Cancelled.is_terminal());
        assert!(!ListingStatus::Active.is_terminal());
    }

    #[test]
    fn invalid_transition_is_an_error() {
        let result = ListingStatus::Cancelled.transition(ListingStatus::Cancelled, ListingId::new());
        assert!(matches!(
            result,
            Err(GatewayError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn status_parses_its_own_names() {
        for status in [
            ListingStatus::PendingEscrow,
            ListingStatus::Active,
            ListingStatus::Sold,
            ListingStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<ListingStatus>().ok(), Some(status));
        }
    }

    #[test]
    fn new_listing_requires_positive_price() {
        assert!(NewListing::new(token(), seller(), dec!(0), "XLM").is_err());
        assert!(NewListing::new(token(), seller(), dec!(-1.5), "XLM").is_err());
        assert!(NewListing::new(token(), seller(), dec!(12.5), " ").is_err());
    }

    #[test]
    fn activate_yields_active_listing() {
        let Ok(terms) = NewListing::new(token(), seller(), dec!(12.5), "XLM") else {
            panic!("valid terms");
        };
        let Ok(listing) = terms.activate(Network::Test) else {
            panic!("activation failed");
        };
        assert_eq!(listing.status, ListingStatus::Active);
        assert_eq!(listing.network, Network::Test);
        assert!(listing.buyer_address.is_none());
        assert!(listing.sold_at.is_none());
    }
}

//! Domain events emitted by the settlement engine.
//!
//! Every completed (or failed) engine operation publishes an
//! [`EngineEvent`] through the [`super::EventBus`]. Events feed the
//! WebSocket live feed that the charting and listing UIs subscribe to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AccountAddress, Amount, AssetId, ListingId, Network, TxRef};

/// Subscription topic an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventTopic {
    /// Swap settlement outcomes.
    Swaps,
    /// Listing lifecycle changes.
    Listings,
    /// Custody anomalies and administrative recoveries.
    Custody,
}

impl EventTopic {
    /// Every topic, in order.
    pub const ALL: [Self; 3] = [Self::Swaps, Self::Listings, Self::Custody];

    /// Parses a topic name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "swaps" => Some(Self::Swaps),
            "listings" => Some(Self::Listings),
            "custody" => Some(Self::Custody),
            _ => None,
        }
    }
}

/// Domain event emitted after an engine operation.
///
/// Amounts serialize as strings and rates as decimal strings.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A swap completed on the ledger.
    SwapSettled {
        /// Network of the swap.
        network: Network,
        /// Settlement protocol used.
        mode: &'static str,
        /// Trader.
        caller: AccountAddress,
        /// Asset sold to the pool.
        from_asset: AssetId,
        /// Asset bought from the pool.
        to_asset: AssetId,
        /// Input amount.
        input_amount: Amount,
        /// Output amount.
        output_amount: Amount,
        /// Pool rate used for pricing.
        rate: String,
        /// Payout or combined transaction.
        transaction_ref: TxRef,
        /// Settlement time.
        timestamp: DateTime<Utc>,
    },

    /// A swap attempt ended in `Rejected` or `Failed`.
    SwapFailed {
        /// Network of the swap.
        network: Network,
        /// Settlement protocol used.
        mode: &'static str,
        /// Trader.
        caller: AccountAddress,
        /// Human-readable failure reason.
        reason: String,
        /// Failure time.
        timestamp: DateTime<Utc>,
    },

    /// A listing became active.
    ListingCreated {
        /// Network of the listing.
        network: Network,
        /// Listing identifier.
        listing_id: ListingId,
        /// Escrowed NFT.
        token_id: AssetId,
        /// Seller.
        seller: AccountAddress,
        /// Asking price.
        price: String,
        /// Price currency.
        currency: String,
        /// Creation time.
        timestamp: DateTime<Utc>,
    },

    /// A listing was sold and the NFT left escrow.
    ListingSold {
        /// Network of the listing.
        network: Network,
        /// Listing identifier.
        listing_id: ListingId,
        /// Escrowed NFT.
        token_id: AssetId,
        /// Buyer.
        buyer: AccountAddress,
        /// Delivery transaction.
        transaction_ref: TxRef,
        /// Sale time.
        timestamp: DateTime<Utc>,
    },

    /// A listing was cancelled.
    ListingCancelled {
        /// Network of the listing.
        network: Network,
        /// Listing identifier.
        listing_id: ListingId,
        /// Escrowed NFT.
        token_id: AssetId,
        /// Return transaction, absent when custody was already missing.
        transaction_ref: Option<TxRef>,
        /// Cancellation time.
        timestamp: DateTime<Utc>,
    },

    /// A listing was cancelled while the anchor no longer held its NFT.
    CustodyMissing {
        /// Network of the listing.
        network: Network,
        /// Listing identifier.
        listing_id: ListingId,
        /// NFT that was expected in escrow.
        token_id: AssetId,
        /// Detection time.
        timestamp: DateTime<Utc>,
    },

    /// An operator moved an asset out of escrow.
    AssetRecovered {
        /// Network of the recovery.
        network: Network,
        /// Recovered asset.
        token_id: AssetId,
        /// Destination account.
        recipient: AccountAddress,
        /// Transferred balance.
        amount: Amount,
        /// Recovery transaction.
        transaction_ref: TxRef,
        /// Recovery time.
        timestamp: DateTime<Utc>,
    },
}

impl EngineEvent {
    /// Returns the network the event happened on.
    #[must_use]
    pub fn network(&self) -> Network {
        match self {
            Self::SwapSettled { network, .. }
            | Self::SwapFailed { network, .. }
            | Self::ListingCreated { network, .. }
            | Self::ListingSold { network, .. }
            | Self::ListingCancelled { network, .. }
            | Self::CustodyMissing { network, .. }
            | Self::AssetRecovered { network, .. } => *network,
        }
    }

    /// Returns the subscription topic of the event.
    #[must_use]
    pub const fn topic(&self) -> EventTopic {
        match self {
            Self::SwapSettled { .. } | Self::SwapFailed { .. } => EventTopic::Swaps,
            Self::ListingCreated { .. }
            | Self::ListingSold { .. }
            | Self::ListingCancelled { .. } => EventTopic::Listings,
            Self::CustodyMissing { .. } | Self::AssetRecovered { .. } => EventTopic::Custody,
        }
    }

    /// Returns the event type as a static string slice.
    #[must_use]
    pub const fn event_type_str(&self) -> &'static str {
        match self {
            Self::SwapSettled { .. } => "swap_settled",
            Self::SwapFailed { .. } => "swap_failed",
            Self::ListingCreated { .. } => "listing_created",
            Self::ListingSold { .. } => "listing_sold",
            Self::ListingCancelled { .. } => "listing_cancelled",
            Self::CustodyMissing { .. } => "custody_missing",
            Self::AssetRecovered { .. } => "asset_recovered",
        }
    }
}

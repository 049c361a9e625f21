//! Persistence layer: listings, swap log and settled-transfer claims.
//!
//! The engine depends on the [`ListingStore`] and [`SwapLog`] traits only.
//! [`postgres::PgStore`] implements both on PostgreSQL via `sqlx`;
//! [`memory::MemoryStore`] implements them in process for tests and for
//! running with `PERSISTENCE_ENABLED=false`.
//!
//! Listing status changes go through [`ListingStore::transition`], a
//! compare-and-swap on the current status. It is the correctness boundary
//! for concurrent `buy`/`cancel` requests.

pub mod memory;
pub mod models;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use std::collections::BTreeSet;
use std::fmt;

use async_trait::async_trait;

use crate::domain::{
    AssetId, Listing, ListingId, ListingStatus, Network, StatusUpdate, SwapRecord, TxRef,
};
use crate::error::GatewayError;

/// Durable store of escrow listings.
#[async_trait]
pub trait ListingStore: Send + Sync + fmt::Debug {
    /// Inserts a new listing.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::DuplicateListing`] if the token already has
    /// an active listing on the same network, or
    /// [`GatewayError::PersistenceError`] on storage failure.
    async fn insert_listing(&self, listing: &Listing) -> Result<(), GatewayError>;

    /// Loads a listing by id.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PersistenceError`] on storage failure.
    async fn get_listing(&self, id: ListingId) -> Result<Option<Listing>, GatewayError>;

    /// Lists listings of a network, newest first, optionally filtered by
    /// status.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PersistenceError`] on storage failure.
    async fn list_listings(
        &self,
        network: Network,
        status: Option<ListingStatus>,
    ) -> Result<Vec<Listing>, GatewayError>;

    /// Token ids of all active listings on a network.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PersistenceError`] on storage failure.
    async fn active_token_ids(&self, network: Network) -> Result<BTreeSet<AssetId>, GatewayError>;

    /// Applies `update` only if the listing is currently in `from`.
    ///
    /// Returns the updated listing, or `None` when the listing does not
    /// exist or its status is no longer `from`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PersistenceError`] on storage failure.
    async fn transition(
        &self,
        id: ListingId,
        from: ListingStatus,
        update: &StatusUpdate,
    ) -> Result<Option<Listing>, GatewayError>;

    /// Compensates a claim whose ledger transfer failed: moves the listing
    /// from `claimed` back to `active` and clears the sale fields.
    ///
    /// Returns `false` if the listing is no longer in `claimed`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::DuplicateListing`] if another listing for
    /// the token became active meanwhile, and
    /// [`GatewayError::PersistenceError`] on storage failure.
    async fn revert_claim(&self, id: ListingId, claimed: ListingStatus)
    -> Result<bool, GatewayError>;
}

/// Append-only swap log plus the registry of user transfers already used
/// for a trusted settlement.
#[async_trait]
pub trait SwapLog: Send + Sync + fmt::Debug {
    /// Appends records in one transaction.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PersistenceError`] on storage failure; no
    /// record is written in that case.
    async fn append_swaps(&self, records: &[SwapRecord]) -> Result<(), GatewayError>;

    /// Most recent records of a network, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PersistenceError`] on storage failure.
    async fn recent_swaps(
        &self,
        network: Network,
        limit: usize,
    ) -> Result<Vec<SwapRecord>, GatewayError>;

    /// Claims a user transfer for settlement. Returns `false` if it was
    /// already claimed.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PersistenceError`] on storage failure.
    async fn claim_transfer(&self, network: Network, tx_ref: &TxRef) -> Result<bool, GatewayError>;

    /// Releases a claim whose payout never happened.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PersistenceError`] on storage failure.
    async fn release_transfer(&self, network: Network, tx_ref: &TxRef)
    -> Result<(), GatewayError>;
}

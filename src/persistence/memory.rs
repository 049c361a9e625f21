//! In-memory implementation of the persistence layer.
//!
//! Every write takes the relevant [`tokio::sync::RwLock`] for writing, so
//! the status compare-and-swap and the one-active-listing-per-token check
//! are atomic with respect to concurrent requests, the same guarantees
//! the PostgreSQL store gets from conditional updates and its partial
//! unique index.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{ListingStore, SwapLog};
use crate::domain::{
    AssetId, Listing, ListingId, ListingStatus, Network, StatusUpdate, SwapRecord, TxRef,
};
use crate::error::GatewayError;

/// Process-local store for listings, swap records and transfer claims.
#[derive(Debug, Default)]
pub struct MemoryStore {
    listings: RwLock<HashMap<ListingId, Listing>>,
    swaps: RwLock<Vec<SwapRecord>>,
    claimed_transfers: RwLock<HashSet<(Network, TxRef)>>,
    fail_swap_appends: AtomicBool,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent [`SwapLog::append_swaps`] calls fail, simulating a
    /// database outage after a ledger transfer already happened.
    pub fn fail_swap_appends(&self, fail: bool) {
        self.fail_swap_appends.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ListingStore for MemoryStore {
    async fn insert_listing(&self, listing: &Listing) -> Result<(), GatewayError> {
        let mut map = self.listings.write().await;
        if map.contains_key(&listing.id) {
            return Err(GatewayError::PersistenceError(format!(
                "listing {} already exists",
                listing.id
            )));
        }
        if listing.status == ListingStatus::Active && has_active_listing(&map, listing) {
            return Err(GatewayError::DuplicateListing(listing.token_id.clone()));
        }
        map.insert(listing.id, listing.clone());
        Ok(())
    }

    async fn get_listing(&self, id: ListingId) -> Result<Option<Listing>, GatewayError> {
        Ok(self.listings.read().await.get(&id).cloned())
    }

    async fn list_listings(
        &self,
        network: Network,
        status: Option<ListingStatus>,
    ) -> Result<Vec<Listing>, GatewayError> {
        let map = self.listings.read().await;
        let mut listings: Vec<Listing> = map
            .values()
            .filter(|l| l.network == network && status.is_none_or(|s| l.status == s))
            .cloned()
            .collect();
        listings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(listings)
    }

    async fn active_token_ids(&self, network: Network) -> Result<BTreeSet<AssetId>, GatewayError> {
        let map = self.listings.read().await;
        Ok(map
            .values()
            .filter(|l| l.network == network && l.status == ListingStatus::Active)
            .map(|l| l.token_id.clone())
            .collect())
    }

    async fn transition(
        &self,
        id: ListingId,
        from: ListingStatus,
        update: &StatusUpdate,
    ) -> Result<Option<Listing>, GatewayError> {
        let mut map = self.listings.write().await;
        let Some(listing) = map.get_mut(&id) else {
            return Ok(None);
        };
        if listing.status != from {
            return Ok(None);
        }
        listing.status = update.status;
        if let Some(buyer) = &update.buyer_address {
            listing.buyer_address = Some(buyer.clone());
        }
        if let Some(sold_at) = update.sold_at {
            listing.sold_at = Some(sold_at);
        }
        Ok(Some(listing.clone()))
    }

    async fn revert_claim(
        &self,
        id: ListingId,
        claimed: ListingStatus,
    ) -> Result<bool, GatewayError> {
        let mut map = self.listings.write().await;
        let Some(listing) = map.get(&id) else {
            return Ok(false);
        };
        if listing.status != claimed {
            return Ok(false);
        }
        if has_active_listing(&map, listing) {
            return Err(GatewayError::DuplicateListing(listing.token_id.clone()));
        }
        let Some(listing) = map.get_mut(&id) else {
            return Ok(false);
        };
        listing.status = ListingStatus::Active;
        listing.buyer_address = None;
        listing.sold_at = None;
        Ok(true)
    }
}

/// Whether another listing for the same token on the same network is active.
fn has_active_listing(map: &HashMap<ListingId, Listing>, listing: &Listing) -> bool {
    map.values().any(|existing| {
        existing.id != listing.id
            && existing.status == ListingStatus::Active
            && existing.network == listing.network
            && existing.token_id == listing.token_id
    })
}

#[async_trait]
impl SwapLog for MemoryStore {
    async fn append_swaps(&self, records: &[SwapRecord]) -> Result<(), GatewayError> {
        if self.fail_swap_appends.load(Ordering::SeqCst) {
            return Err(GatewayError::PersistenceError(
                "swap log unavailable".to_string(),
            ));
        }
        self.swaps.write().await.extend_from_slice(records);
        Ok(())
    }

    async fn recent_swaps(
        &self,
        network: Network,
        limit: usize,
    ) -> Result<Vec<SwapRecord>, GatewayError> {
        let swaps = self.swaps.read().await;
        Ok(swaps
            .iter()
            .rev()
            .filter(|r| r.network == network)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn claim_transfer(&self, network: Network, tx_ref: &TxRef) -> Result<bool, GatewayError> {
        Ok(self
            .claimed_transfers
            .write()
            .await
            .insert((network, tx_ref.clone())))
    }

    async fn release_transfer(&self, network: Network, tx_ref: &TxRef) -> Result<(), GatewayError> {
        self.claimed_transfers
            .write()
            .await
            .remove(&(network, tx_ref.clone()));
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::{AccountAddress, NewListing};
    use ed25519_dalek::SigningKey;
    use rust_decimal_macros::dec;

    fn address(seed: u8) -> AccountAddress {
        AccountAddress::from_public_key(&SigningKey::from_bytes(&[seed; 32]).verifying_key())
    }

    fn active_listing(token: &str) -> Listing {
        let Ok(token) = AssetId::new(token) else {
            panic!("valid token");
        };
        let Ok(terms) = NewListing::new(token, address(1), dec!(10), "XLM") else {
            panic!("valid terms");
        };
        let Ok(listing) = terms.activate(Network::Test) else {
            panic!("activation");
        };
        listing
    }

    #[tokio::test]
    async fn second_active_listing_for_token_is_rejected() {
        let store = MemoryStore::new();
        assert!(store.insert_listing(&active_listing("nft-1")).await.is_ok());
        assert!(matches!(
            store.insert_listing(&active_listing("nft-1")).await,
            Err(GatewayError::DuplicateListing(_))
        ));
        assert!(store.insert_listing(&active_listing("nft-2")).await.is_ok());
    }

    #[tokio::test]
    async fn transition_is_compare_and_swap() {
        let store = MemoryStore::new();
        let listing = active_listing("nft-1");
        let Ok(()) = store.insert_listing(&listing).await else {
            panic!("insert");
        };

        let update = StatusUpdate::sold(address(2));
        let Ok(Some(sold)) = store
            .transition(listing.id, ListingStatus::Active, &update)
            .await
        else {
            panic!("first claim wins");
        };
        assert_eq!(sold.status, ListingStatus::Sold);
        assert_eq!(sold.buyer_address, Some(address(2)));

        let Ok(second) = store
            .transition(listing.id, ListingStatus::Active, &StatusUpdate::cancelled())
            .await
        else {
            panic!("store error");
        };
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn revert_claim_restores_active() {
        let store = MemoryStore::new();
        let listing = active_listing("nft-1");
        let Ok(()) = store.insert_listing(&listing).await else {
            panic!("insert");
        };
        let _ = store
            .transition(listing.id, ListingStatus::Active, &StatusUpdate::sold(address(2)))
            .await;

        assert_eq!(store.revert_claim(listing.id, ListingStatus::Sold).await.ok(), Some(true));
        let Ok(Some(restored)) = store.get_listing(listing.id).await else {
            panic!("listing exists");
        };
        assert_eq!(restored.status, ListingStatus::Active);
        assert!(restored.buyer_address.is_none());
        assert_eq!(store.revert_claim(listing.id, ListingStatus::Sold).await.ok(), Some(false));
    }

    #[tokio::test]
    async fn revert_claim_keeps_one_active_listing_per_token() {
        let store = MemoryStore::new();
        let first = active_listing("nft-1");
        let Ok(()) = store.insert_listing(&first).await else {
            panic!("insert");
        };
        let _ = store
            .transition(first.id, ListingStatus::Active, &StatusUpdate::sold(address(2)))
            .await;
        let relisted = active_listing("nft-1");
        let Ok(()) = store.insert_listing(&relisted).await else {
            panic!("token is free while the first listing is claimed");
        };

        assert!(matches!(
            store.revert_claim(first.id, ListingStatus::Sold).await,
            Err(GatewayError::DuplicateListing(_))
        ));
        let Ok(Some(current)) = store.get_listing(first.id).await else {
            panic!("listing exists");
        };
        assert_eq!(current.status, ListingStatus::Sold);
        let Ok(active) = store.list_listings(Network::Test, Some(ListingStatus::Active)).await else {
            panic!("list");
        };
        assert_eq!(active.len(), 1);
    }

    #[tokio::test]
    async fn transfer_claims_are_exclusive_until_released() {
        let store = MemoryStore::new();
        let tx = TxRef::new("abc");
        assert_eq!(store.claim_transfer(Network::Test, &tx).await.ok(), Some(true));
        assert_eq!(store.claim_transfer(Network::Test, &tx).await.ok(), Some(false));
        assert_eq!(store.claim_transfer(Network::Main, &tx).await.ok(), Some(true));

        let Ok(()) = store.release_transfer(Network::Test, &tx).await else {
            panic!("release");
        };
        assert_eq!(store.claim_transfer(Network::Test, &tx).await.ok(), Some(true));
    }

    #[tokio::test]
    async fn recent_swaps_are_newest_first_per_network() {
        let store = MemoryStore::new();
        let Ok(asset) = AssetId::new("AAA") else {
            panic!("valid asset");
        };
        let record = |network, volume| SwapRecord {
            from_asset: asset.clone(),
            to_asset: asset.clone(),
            rate: dec!(1),
            pool_balance_a: crate::domain::Amount::new(1),
            pool_balance_b: crate::domain::Amount::new(1),
            volume: crate::domain::Amount::new(volume),
            network,
            timestamp: chrono::Utc::now(),
        };
        let Ok(()) = store
            .append_swaps(&[record(Network::Test, 1), record(Network::Main, 2), record(Network::Test, 3)])
            .await
        else {
            panic!("append");
        };
        let Ok(recent) = store.recent_swaps(Network::Test, 10).await else {
            panic!("query");
        };
        let volumes: Vec<u128> = recent.iter().map(|r| r.volume.get()).collect();
        assert_eq!(volumes, vec![3, 1]);
    }
}

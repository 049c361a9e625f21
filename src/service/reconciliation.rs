//! Custody reconciliation between listing records and the anchor account.
//!
//! [`ReconciliationScanner::scan_orphans`] finds assets the anchor holds
//! without an active listing (for example an NFT whose seller never
//! completed a listing, or whose cancellation return failed).
//! [`ReconciliationScanner::scan`] also reports the opposite direction:
//! active listings whose token is no longer in custody. Scans are
//! read-only.
//!
//! [`ReconciliationScanner::recover`] is an operator escape hatch that
//! moves an asset out of escrow regardless of listing history. It takes
//! an [`AdminAuthorization`], which only [`AdminAuthorization::verify`]
//! can produce.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use sha2::{Digest, Sha256};

use super::AnchorContext;
use crate::domain::{AccountAddress, Amount, AssetId, EngineEvent, EventBus, Listing, ListingStatus, Network, TxRef};
use crate::error::GatewayError;
use crate::persistence::ListingStore;

/// Proof that the caller presented the operator token.
#[derive(Debug)]
pub struct AdminAuthorization {
    _private: (),
}

impl AdminAuthorization {
    /// Checks `presented` against the configured admin token.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::ConfigurationError`] if no admin token is
    /// configured and [`GatewayError::Unauthorized`] if the presented
    /// token is missing or wrong.
    pub fn verify(configured: Option<&str>, presented: Option<&str>) -> Result<Self, GatewayError> {
        let Some(configured) = configured.filter(|t| !t.is_empty()) else {
            return Err(GatewayError::ConfigurationError(
                "ADMIN_API_TOKEN is not configured".to_string(),
            ));
        };
        let Some(presented) = presented else {
            return Err(GatewayError::Unauthorized);
        };
        if constant_time_eq(configured.as_bytes(), presented.as_bytes()) {
            Ok(Self { _private: () })
        } else {
            Err(GatewayError::Unauthorized)
        }
    }
}

/// Compares fixed-length digests so timing does not depend on where the
/// inputs differ.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    let (da, db) = (Sha256::digest(a), Sha256::digest(b));
    da.iter().zip(db.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Custody discrepancies of one network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationReport {
    /// Network scanned.
    pub network: Network,
    /// Assets held by the anchor without an active listing.
    pub orphaned: BTreeSet<AssetId>,
    /// Active listings whose token the anchor does not hold.
    pub unbacked: Vec<Listing>,
}

/// Result of an administrative recovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryReceipt {
    /// Recovered asset.
    pub token_id: AssetId,
    /// Destination.
    pub recipient: AccountAddress,
    /// Amount moved.
    pub amount: Amount,
    /// Recovery transaction.
    pub transaction_ref: TxRef,
}

/// Detects and repairs divergence between listings and custody.
#[derive(Debug, Clone)]
pub struct ReconciliationScanner {
    listings: Arc<dyn ListingStore>,
    event_bus: EventBus,
}

impl ReconciliationScanner {
    /// Creates the scanner.
    #[must_use]
    pub fn new(listings: Arc<dyn ListingStore>, event_bus: EventBus) -> Self {
        Self {
            listings,
            event_bus,
        }
    }

    async fn held_assets(&self, ctx: &AnchorContext) -> Result<BTreeSet<AssetId>, GatewayError> {
        let holdings = ctx.ledger.holdings(ctx.address()).await?;
        Ok(holdings
            .into_iter()
            .filter(|h| !h.amount.is_zero() && !ctx.pool.contains(&h.asset))
            .map(|h| h.asset)
            .collect())
    }

    /// Assets in custody with no active listing, excluding the pool
    /// assets.
    ///
    /// # Errors
    ///
    /// Propagates ledger and persistence failures.
    pub async fn scan_orphans(&self, ctx: &AnchorContext) -> Result<BTreeSet<AssetId>, GatewayError> {
        let held = self.held_assets(ctx).await?;
        let listed = self.listings.active_token_ids(ctx.network).await?;
        Ok(held.difference(&listed).cloned().collect())
    }

    /// Orphans plus active listings without custody.
    ///
    /// # Errors
    ///
    /// Propagates ledger and persistence failures.
    pub async fn scan(&self, ctx: &AnchorContext) -> Result<ReconciliationReport, GatewayError> {
        let held = self.held_assets(ctx).await?;
        let active = self
            .listings
            .list_listings(ctx.network, Some(ListingStatus::Active))
            .await?;
        let listed: BTreeSet<AssetId> = active.iter().map(|l| l.token_id.clone()).collect();

        let orphaned: BTreeSet<AssetId> = held.difference(&listed).cloned().collect();
        let unbacked: Vec<Listing> = active
            .into_iter()
            .filter(|l| !held.contains(&l.token_id))
            .collect();

        if !orphaned.is_empty() || !unbacked.is_empty() {
            tracing::warn!(
                network = %ctx.network,
                orphaned = orphaned.len(),
                unbacked = unbacked.len(),
                "custody discrepancies found"
            );
        }
        Ok(ReconciliationReport {
            network: ctx.network,
            orphaned,
            unbacked,
        })
    }

    /// Transfers the anchor's whole balance of `token_id` to `recipient`.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::InvalidRequest`] for a pool asset.
    /// - [`GatewayError::EscrowMismatch`] if the anchor holds none.
    /// - Ledger errors from the transfer.
    pub async fn recover(
        &self,
        ctx: &AnchorContext,
        _authorization: &AdminAuthorization,
        token_id: &AssetId,
        recipient: &AccountAddress,
    ) -> Result<RecoveryReceipt, GatewayError> {
        if ctx.pool.contains(token_id) {
            return Err(GatewayError::InvalidRequest(format!(
                "{token_id} is pool liquidity and cannot be recovered"
            )));
        }
        let amount = ctx.custody(token_id).await?;
        if amount.is_zero() {
            return Err(GatewayError::EscrowMismatch(format!(
                "anchor holds no {token_id} to recover"
            )));
        }
        if self.listings.active_token_ids(ctx.network).await?.contains(token_id) {
            tracing::warn!(network = %ctx.network, token_id = %token_id, "recovering a token that backs an active listing");
        }

        let transaction_ref = ctx
            .transfer_from_anchor(recipient, token_id, amount, format!("recovery of {token_id}"))
            .await?;

        tracing::warn!(
            network = %ctx.network,
            token_id = %token_id,
            recipient = %recipient,
            amount = %amount,
            tx_ref = %transaction_ref,
            "asset recovered from escrow"
        );
        let _ = self.event_bus.publish(EngineEvent::AssetRecovered {
            network: ctx.network,
            token_id: token_id.clone(),
            recipient: recipient.clone(),
            amount,
            transaction_ref: transaction_ref.clone(),
            timestamp: Utc::now(),
        });
        Ok(RecoveryReceipt {
            token_id: token_id.clone(),
            recipient: recipient.clone(),
            amount,
            transaction_ref,
        })
    }
}

//! NFT escrow listings held by the anchor account.
//!
//! A listing is created only once the anchor verifiably holds the NFT.
//! `buy` and `cancel` first claim the listing with a conditional status
//! update (`active → sold | cancelled`); only the request that wins the
//! claim touches the ledger. If its transfer is rejected, the claim is
//! reverted so the listing becomes purchasable again.

use std::sync::Arc;

use chrono::Utc;

use super::AnchorContext;
use crate::domain::{
    AccountAddress, Amount, EngineEvent, EventBus, Listing, ListingId, ListingStatus, Network,
    NewListing, StatusUpdate, TxRef,
};
use crate::error::GatewayError;
use crate::ledger::LedgerError;
use crate::persistence::ListingStore;

/// Quantity of a non-fungible token moved in and out of escrow.
const NFT_UNIT: Amount = Amount::new(1);

/// Result of a purchase.
#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseReceipt {
    /// Listing after the sale.
    pub listing: Listing,
    /// Delivery transaction.
    pub transaction_ref: TxRef,
}

/// Result of a cancellation.
#[derive(Debug, Clone, PartialEq)]
pub struct CancelReceipt {
    /// Listing after cancellation.
    pub listing: Listing,
    /// Return transaction; `None` when custody was already missing.
    pub transaction_ref: Option<TxRef>,
    /// `true` if the anchor no longer held the NFT.
    pub custody_missing: bool,
}

/// Listing lifecycle against the anchor's custody.
#[derive(Debug, Clone)]
pub struct EscrowLedger {
    listings: Arc<dyn ListingStore>,
    event_bus: EventBus,
}

impl EscrowLedger {
    /// Creates the escrow service.
    #[must_use]
    pub fn new(listings: Arc<dyn ListingStore>, event_bus: EventBus) -> Self {
        Self {
            listings,
            event_bus,
        }
    }

    /// Lists an NFT the seller already transferred to the anchor.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::NotYetEscrowed`] if the anchor does not hold the
    ///   token.
    /// - [`GatewayError::DuplicateListing`] if the token already has an
    ///   active listing.
    /// - [`GatewayError::InvalidRequest`] for pool assets or an anchor
    ///   seller.
    pub async fn create_listing(
        &self,
        ctx: &AnchorContext,
        terms: NewListing,
    ) -> Result<Listing, GatewayError> {
        if ctx.pool.contains(&terms.token_id) {
            return Err(GatewayError::InvalidRequest(format!(
                "{} is a pool asset, not an NFT",
                terms.token_id
            )));
        }
        if &terms.seller_address == ctx.address() {
            return Err(GatewayError::InvalidRequest(
                "the anchor cannot list on its own behalf".to_string(),
            ));
        }

        let held = ctx.custody(&terms.token_id).await?;
        if held.is_zero() {
            return Err(GatewayError::NotYetEscrowed(terms.token_id));
        }

        let listing = terms.activate(ctx.network)?;
        self.listings.insert_listing(&listing).await?;

        tracing::info!(
            network = %ctx.network,
            listing_id = %listing.id,
            token_id = %listing.token_id,
            seller = %listing.seller_address,
            "listing created"
        );
        let _ = self.event_bus.publish(EngineEvent::ListingCreated {
            network: ctx.network,
            listing_id: listing.id,
            token_id: listing.token_id.clone(),
            seller: listing.seller_address.clone(),
            price: listing.price.to_string(),
            currency: listing.currency.clone(),
            timestamp: Utc::now(),
        });
        Ok(listing)
    }

    /// Sells an active listing to `buyer` and delivers the NFT.
    ///
    /// Payment is collected out of band; this call does not verify it.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::ListingNotFound`] for an unknown id.
    /// - [`GatewayError::AlreadyClaimed`] if the listing is not active when
    ///   the claim executes.
    /// - Ledger errors if delivery fails; the listing is active again
    ///   unless the outcome is unknown.
    pub async fn buy(
        &self,
        ctx: &AnchorContext,
        id: ListingId,
        buyer: AccountAddress,
    ) -> Result<PurchaseReceipt, GatewayError> {
        let listing = self.load(ctx.network, id).await?;
        ensure_claimable(&listing, ListingStatus::Sold)?;
        if &buyer == ctx.address() {
            return Err(GatewayError::InvalidRequest(
                "the anchor cannot buy from escrow".to_string(),
            ));
        }

        let claimed = self.claim(&listing, StatusUpdate::sold(buyer.clone())).await?;

        let delivery = ctx
            .transfer_from_anchor(
                &buyer,
                &claimed.token_id,
                NFT_UNIT,
                format!("escrow delivery for listing {id}"),
            )
            .await;
        let transaction_ref = match delivery {
            Ok(tx_ref) => tx_ref,
            Err(e) => return Err(self.compensate(&claimed, ListingStatus::Sold, e, true).await),
        };

        tracing::info!(
            network = %ctx.network,
            listing_id = %id,
            token_id = %claimed.token_id,
            buyer = %buyer,
            tx_ref = %transaction_ref,
            "listing sold"
        );
        let _ = self.event_bus.publish(EngineEvent::ListingSold {
            network: ctx.network,
            listing_id: id,
            token_id: claimed.token_id.clone(),
            buyer,
            transaction_ref: transaction_ref.clone(),
            timestamp: Utc::now(),
        });
        Ok(PurchaseReceipt {
            listing: claimed,
            transaction_ref,
        })
    }

    /// Cancels an active listing and returns the NFT to the seller.
    ///
    /// If the anchor no longer holds the token the listing is still
    /// cancelled; the receipt, log and a `custody_missing` event flag it.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::ListingNotFound`] for an unknown id.
    /// - [`GatewayError::AlreadyClaimed`] if the listing is not active when
    ///   the claim executes.
    /// - Ledger errors if the custody read or return transfer fails; the
    ///   listing is active again unless the outcome is unknown.
    pub async fn cancel(
        &self,
        ctx: &AnchorContext,
        id: ListingId,
    ) -> Result<CancelReceipt, GatewayError> {
        let listing = self.load(ctx.network, id).await?;
        ensure_claimable(&listing, ListingStatus::Cancelled)?;

        let claimed = self.claim(&listing, StatusUpdate::cancelled()).await?;

        let held = match ctx.custody(&claimed.token_id).await {
            Ok(held) => held,
            Err(e) => {
                return Err(self
                    .compensate(&claimed, ListingStatus::Cancelled, e, false)
                    .await);
            }
        };

        if held.is_zero() {
            tracing::warn!(
                network = %ctx.network,
                listing_id = %id,
                token_id = %claimed.token_id,
                custody_missing = true,
                "listing cancelled but the anchor no longer holds the token"
            );
            let _ = self.event_bus.publish(EngineEvent::CustodyMissing {
                network: ctx.network,
                listing_id: id,
                token_id: claimed.token_id.clone(),
                timestamp: Utc::now(),
            });
            self.publish_cancelled(&claimed, None);
            return Ok(CancelReceipt {
                listing: claimed,
                transaction_ref: None,
                custody_missing: true,
            });
        }

        let returned = ctx
            .transfer_from_anchor(
                &claimed.seller_address,
                &claimed.token_id,
                held,
                format!("escrow return for listing {id}"),
            )
            .await;
        let transaction_ref = match returned {
            Ok(tx_ref) => tx_ref,
            Err(e) => {
                return Err(self
                    .compensate(&claimed, ListingStatus::Cancelled, e, true)
                    .await);
            }
        };

        tracing::info!(
            network = %ctx.network,
            listing_id = %id,
            token_id = %claimed.token_id,
            tx_ref = %transaction_ref,
            "listing cancelled"
        );
        self.publish_cancelled(&claimed, Some(transaction_ref.clone()));
        Ok(CancelReceipt {
            listing: claimed,
            transaction_ref: Some(transaction_ref),
            custody_missing: false,
        })
    }

    /// Loads one listing.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::ListingNotFound`] if it does not exist on
    /// `network`.
    pub async fn get(&self, network: Network, id: ListingId) -> Result<Listing, GatewayError> {
        self.load(network, id).await
    }

    /// Lists listings of a network, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PersistenceError`] on storage failure.
    pub async fn list(
        &self,
        network: Network,
        status: Option<ListingStatus>,
    ) -> Result<Vec<Listing>, GatewayError> {
        self.listings.list_listings(network, status).await
    }

    async fn load(&self, network: Network, id: ListingId) -> Result<Listing, GatewayError> {
        match self.listings.get_listing(id).await? {
            Some(listing) if listing.network == network => Ok(listing),
            _ => Err(GatewayError::ListingNotFound(*id.as_uuid())),
        }
    }

    /// Conditional `active → update.status`. Losing the race yields
    /// [`GatewayError::AlreadyClaimed`] with the status observed afterwards.
    async fn claim(&self, listing: &Listing, update: StatusUpdate) -> Result<Listing, GatewayError> {
        if let Some(claimed) = self
            .listings
            .transition(listing.id, ListingStatus::Active, &update)
            .await?
        {
            return Ok(claimed);
        }
        let status = self
            .listings
            .get_listing(listing.id)
            .await?
            .map_or(listing.status, |current| current.status);
        tracing::info!(listing_id = %listing.id, %status, "listing claimed by a concurrent request");
        Err(GatewayError::AlreadyClaimed {
            listing_id: *listing.id.as_uuid(),
            status,
        })
    }

    /// Undoes a claim after a failed ledger call and returns the error to
    /// report. A submission whose outcome is unknown keeps the claim.
    async fn compensate(
        &self,
        claimed: &Listing,
        claimed_status: ListingStatus,
        err: LedgerError,
        submitted: bool,
    ) -> GatewayError {
        if submitted && let LedgerError::Network(msg) = &err {
            tracing::error!(
                network = %claimed.network,
                listing_id = %claimed.id,
                token_id = %claimed.token_id,
                status = %claimed_status,
                error = %msg,
                reconciliation_candidate = true,
                "escrow transfer outcome unknown; claim kept"
            );
            return err.into();
        }
        match self.listings.revert_claim(claimed.id, claimed_status).await {
            Ok(true) => tracing::warn!(
                network = %claimed.network,
                listing_id = %claimed.id,
                error = %err,
                "escrow transfer failed; listing is active again"
            ),
            Ok(false) => tracing::error!(
                network = %claimed.network,
                listing_id = %claimed.id,
                reconciliation_candidate = true,
                "escrow transfer failed and the claim changed before it could be reverted"
            ),
            Err(e) => tracing::error!(
                network = %claimed.network,
                listing_id = %claimed.id,
                error = %e,
                reconciliation_candidate = true,
                "escrow transfer failed and the claim could not be reverted"
            ),
        }
        err.into()
    }

    fn publish_cancelled(&self, listing: &Listing, transaction_ref: Option<TxRef>) {
        let _ = self.event_bus.publish(EngineEvent::ListingCancelled {
            network: listing.network,
            listing_id: listing.id,
            token_id: listing.token_id.clone(),
            transaction_ref,
            timestamp: Utc::now(),
        });
    }
}

/// Terminal listings are reported as claimed; other non-active states as
/// an invalid transition.
fn ensure_claimable(listing: &Listing, next: ListingStatus) -> Result<(), GatewayError> {
    if listing.status.is_terminal() {
        return Err(GatewayError::AlreadyClaimed {
            listing_id: *listing.id.as_uuid(),
            status: listing.status,
        });
    }
    listing.status.transition(next, listing.id).map(|_| ())
}

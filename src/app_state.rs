//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::domain::EventBus;
use crate::persistence::{ListingStore, SwapLog};
use crate::service::{
    EscrowLedger, NetworkRegistry, ReconciliationScanner, SettlementSettings,
    SwapSettlementCoordinator,
};

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Anchor context of every configured network.
    pub networks: Arc<NetworkRegistry>,
    /// Swap quoting and settlement.
    pub settlement: Arc<SwapSettlementCoordinator>,
    /// NFT escrow listings.
    pub escrow: Arc<EscrowLedger>,
    /// Custody reconciliation.
    pub reconciliation: Arc<ReconciliationScanner>,
    /// Event bus for WebSocket subscriptions.
    pub event_bus: EventBus,
    /// Operator token guarding the admin endpoints.
    pub admin_token: Option<Arc<str>>,
}

impl AppState {
    /// Wires the engine services over the given stores.
    #[must_use]
    pub fn new(
        networks: NetworkRegistry,
        listings: Arc<dyn ListingStore>,
        swaps: Arc<dyn SwapLog>,
        event_bus: EventBus,
        settings: SettlementSettings,
        admin_token: Option<String>,
    ) -> Self {
        Self {
            networks: Arc::new(networks),
            settlement: Arc::new(SwapSettlementCoordinator::new(
                swaps,
                event_bus.clone(),
                settings,
            )),
            escrow: Arc::new(EscrowLedger::new(Arc::clone(&listings), event_bus.clone())),
            reconciliation: Arc::new(ReconciliationScanner::new(listings, event_bus.clone())),
            event_bus,
            admin_token: admin_token.map(Arc::from),
        }
    }
}

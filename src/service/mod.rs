//! Service layer: the settlement engine.
//!
//! - [`pricing`] prices swaps against the anchor's live pool balances.
//! - [`SwapSettlementCoordinator`] settles swaps atomically or in two
//!   trusted phases.
//! - [`EscrowLedger`] runs NFT listings held by the anchor.
//! - [`ReconciliationScanner`] finds and recovers custody the listings do
//!   not account for.
//!
//! Every operation takes the [`AnchorContext`] of its network and emits
//! events through the [`super::domain::EventBus`].

pub mod escrow;
pub mod network;
pub mod pricing;
pub mod reconciliation;
pub mod settlement;

pub use escrow::{CancelReceipt, EscrowLedger, PurchaseReceipt};
pub use network::{AnchorContext, NetworkRegistry, PoolAssets};
pub use pricing::{AnchorStatus, PoolBalances, SwapQuote};
pub use reconciliation::{
    AdminAuthorization, ReconciliationReport, ReconciliationScanner, RecoveryReceipt,
};
pub use settlement::{
    SettlementMode, SettlementReceipt, SettlementRequest, SettlementSettings, SwapIntent,
    SwapSettlementCoordinator,
};

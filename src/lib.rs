//! # anchor-gateway
//!
//! Anchor-mediated settlement engine behind a REST and WebSocket gateway.
//!
//! A custodial anchor account on a ledger network holds two fungible pool
//! assets and any NFTs listed for sale. The engine
//!
//! - prices swaps against the anchor's live balances with the constant
//!   product formula,
//! - settles swaps atomically (caller leg and payout in one transaction)
//!   or in two trusted phases (caller pays, anchor verifies and pays out),
//! - runs NFT escrow listings with claim-before-transfer semantics,
//! - reconciles custody against listing records.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP, WebSocket)
//!     │
//!     ├── REST Handlers (api/)
//!     ├── WS Feed (ws/)
//!     │
//!     ├── SwapSettlementCoordinator, EscrowLedger,
//!     │   ReconciliationScanner, pricing (service/)
//!     ├── EventBus (domain/)
//!     │
//!     ├── LedgerClient: HTTP node or in-memory (ledger/)
//!     └── ListingStore / SwapLog: PostgreSQL or in-memory (persistence/)
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod ledger;
pub mod persistence;
pub mod service;
pub mod ws;

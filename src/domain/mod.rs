//! Domain layer: typed ledger values, listings, swap records and events.
//!
//! Everything in here is independent of the ledger SDK and the database:
//! adapters convert their wire shapes into these types at the boundary.

pub mod engine_event;
pub mod event_bus;
pub mod listing;
pub mod listing_id;
pub mod swap_record;
pub mod values;

pub use engine_event::{EngineEvent, EventTopic};
pub use event_bus::EventBus;
pub use listing::{Listing, ListingStatus, NewListing, StatusUpdate};
pub use listing_id::ListingId;
pub use swap_record::{SettledSwap, SwapRecord};
pub use values::{AccountAddress, Amount, AssetId, Network, ParseValueError, TxRef};

//! Data Transfer Objects for REST request/response serialization.
//!
//! Field names are camelCase. All amounts are serialized as JSON strings
//! to prevent precision loss on u128 values.

pub mod admin_dto;
pub mod common_dto;
pub mod listing_dto;
pub mod swap_dto;

pub use admin_dto::*;
pub use common_dto::*;
pub use listing_dto::*;
pub use swap_dto::*;

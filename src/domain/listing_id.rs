//! Type-safe listing identifier.
//!
//! [`ListingId`] is a newtype wrapper around [`uuid::Uuid`] (v4) so that
//! listing identifiers cannot be confused with transaction ids or other
//! UUIDs flowing through the engine.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique identifier of an escrow listing.
///
/// Generated once when the listing is created and immutable thereafter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListingId(uuid::Uuid);

impl ListingId {
    /// Creates a new random `ListingId` (UUID v4).
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Creates a `ListingId` from an existing [`uuid::Uuid`].
    #[must_use]
    pub const fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner [`uuid::Uuid`].
    #[must_use]
    pub const fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for ListingId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ListingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<uuid::Uuid> for ListingId {
    fn from(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }
}

impl From<ListingId> for uuid::Uuid {
    fn from(id: ListingId) -> Self {
        id.0
    }
}

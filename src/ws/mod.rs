//! WebSocket layer: live feed of engine events.
//!
//! The endpoint at `/ws` forwards [`crate::domain::EngineEvent`]s to
//! clients subscribed to their topic (`swaps`, `listings`, `custody`).

pub mod connection;
pub mod handler;
pub mod messages;
pub mod subscription;

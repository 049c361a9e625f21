//! REST endpoint handlers organized by resource.

pub mod admin;
pub mod anchor;
pub mod listing;
pub mod swap;
pub mod system;

use axum::Router;

use crate::app_state::AppState;

/// Composes all resource routes under `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(anchor::routes())
        .merge(swap::routes())
        .merge(listing::routes())
        .merge(admin::routes())
}

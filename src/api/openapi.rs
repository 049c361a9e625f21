//! OpenAPI document assembled from the handler annotations.

use utoipa::OpenApi;

use super::handlers;
use crate::error::{ErrorBody, ErrorResponse};

/// OpenAPI description of the REST surface.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "anchor-gateway",
        description = "Anchor-mediated settlement engine: constant-product swaps against the anchor's pool and NFT escrow listings."
    ),
    paths(
        handlers::system::health_handler,
        handlers::anchor::anchor_status,
        handlers::swap::quote_swap,
        handlers::swap::settle_swap,
        handlers::swap::swap_history,
        handlers::listing::create_listing,
        handlers::listing::list_listings,
        handlers::listing::get_listing,
        handlers::listing::buy_listing,
        handlers::listing::cancel_listing,
        handlers::admin::reconciliation,
        handlers::admin::recover,
    ),
    components(schemas(ErrorResponse, ErrorBody)),
    tags(
        (name = "System", description = "Liveness"),
        (name = "Anchor", description = "Anchor account and pool balances"),
        (name = "Swaps", description = "Pool pricing and swap settlement"),
        (name = "Listings", description = "NFT escrow listings"),
        (name = "Admin", description = "Custody reconciliation, requires x-admin-token"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_endpoint() {
        let doc = ApiDoc::openapi();
        for path in [
            "/health",
            "/api/v1/anchor",
            "/api/v1/swap/quote",
            "/api/v1/swap/settle",
            "/api/v1/swaps",
            "/api/v1/listings",
            "/api/v1/listings/{id}",
            "/api/v1/listings/{id}/buy",
            "/api/v1/listings/{id}/cancel",
            "/api/v1/admin/reconciliation",
            "/api/v1/admin/recover",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}

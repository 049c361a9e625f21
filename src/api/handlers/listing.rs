//! Escrow listing handlers: create, list, get, buy, cancel.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{
    BuyRequest, CancelRequest, CancelResponse, CreateListingRequest, ListingDto, ListingQuery,
    NetworkQuery, PurchaseResponse, parse_address, parse_asset,
};
use crate::app_state::AppState;
use crate::domain::{ListingId, NewListing};
use crate::error::{ErrorResponse, GatewayError};

/// `POST /listings`: List an NFT already held by the anchor.
///
/// # Errors
///
/// Returns [`GatewayError::NotYetEscrowed`] if the anchor does not hold
/// the token yet, and other [`GatewayError`]s for invalid terms or
/// duplicates.
#[utoipa::path(
    post,
    path = "/api/v1/listings",
    tag = "Listings",
    summary = "Create a listing",
    description = "Creates an active listing once the anchor verifiably holds the NFT. The seller must transfer the token to the anchor first.",
    request_body = CreateListingRequest,
    responses(
        (status = 201, description = "Listing created", body = ListingDto),
        (status = 400, description = "Invalid terms", body = ErrorResponse),
        (status = 409, description = "Not yet escrowed or already listed", body = ErrorResponse),
    )
)]
pub async fn create_listing(
    State(state): State<AppState>,
    Json(req): Json<CreateListingRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    let terms = NewListing::new(
        parse_asset("tokenId", &req.token_id)?,
        parse_address("sellerAddress", &req.seller_address)?,
        req.price,
        &req.currency,
    )?;
    let ctx = state.networks.get(req.network)?;

    let listing = state.escrow.create_listing(&ctx, terms).await?;
    Ok((StatusCode::CREATED, Json(ListingDto::from(listing))))
}

/// `GET /listings`: List listings of a network.
///
/// # Errors
///
/// Returns [`GatewayError::PersistenceError`] on storage failure.
#[utoipa::path(
    get,
    path = "/api/v1/listings",
    tag = "Listings",
    summary = "List listings",
    description = "Returns the listings of a network, newest first, optionally filtered by status.",
    params(ListingQuery),
    responses(
        (status = 200, description = "Listings", body = Vec<ListingDto>),
    )
)]
pub async fn list_listings(
    State(state): State<AppState>,
    Query(query): Query<ListingQuery>,
) -> Result<impl IntoResponse, GatewayError> {
    let listings = state.escrow.list(query.network, query.status).await?;
    let body: Vec<ListingDto> = listings.into_iter().map(ListingDto::from).collect();
    Ok(Json(body))
}

/// `GET /listings/{id}`: Get one listing.
///
/// # Errors
///
/// Returns [`GatewayError::ListingNotFound`] if the listing does not
/// exist on the network.
#[utoipa::path(
    get,
    path = "/api/v1/listings/{id}",
    tag = "Listings",
    summary = "Get listing",
    params(
        ("id" = uuid::Uuid, Path, description = "Listing UUID"),
        NetworkQuery,
    ),
    responses(
        (status = 200, description = "Listing", body = ListingDto),
        (status = 404, description = "Listing not found", body = ErrorResponse),
    )
)]
pub async fn get_listing(
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
    Query(query): Query<NetworkQuery>,
) -> Result<impl IntoResponse, GatewayError> {
    let listing = state
        .escrow
        .get(query.network, ListingId::from_uuid(id))
        .await?;
    Ok(Json(ListingDto::from(listing)))
}

/// `POST /listings/{id}/buy`: Buy a listing; the NFT goes to the buyer.
///
/// # Errors
///
/// Returns [`GatewayError::AlreadyClaimed`] if another request sold or
/// cancelled the listing first, and ledger errors if delivery fails.
#[utoipa::path(
    post,
    path = "/api/v1/listings/{id}/buy",
    tag = "Listings",
    summary = "Buy a listing",
    description = "Marks the listing sold and transfers the NFT from the anchor to the buyer. Payment is settled out of band.",
    params(
        ("id" = uuid::Uuid, Path, description = "Listing UUID"),
    ),
    request_body = BuyRequest,
    responses(
        (status = 200, description = "Listing sold", body = PurchaseResponse),
        (status = 404, description = "Listing not found", body = ErrorResponse),
        (status = 409, description = "Listing no longer active", body = ErrorResponse),
        (status = 422, description = "Delivery rejected by the ledger", body = ErrorResponse),
    )
)]
pub async fn buy_listing(
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
    Json(req): Json<BuyRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    let buyer = parse_address("buyerAddress", &req.buyer_address)?;
    let ctx = state.networks.get(req.network)?;

    let receipt = state
        .escrow
        .buy(&ctx, ListingId::from_uuid(id), buyer)
        .await?;
    Ok(Json(PurchaseResponse::from(receipt)))
}

/// `POST /listings/{id}/cancel`: Cancel a listing; the NFT goes back to
/// the seller.
///
/// # Errors
///
/// Returns [`GatewayError::AlreadyClaimed`] if the listing is no longer
/// active, and ledger errors if the return transfer fails.
#[utoipa::path(
    post,
    path = "/api/v1/listings/{id}/cancel",
    tag = "Listings",
    summary = "Cancel a listing",
    description = "Marks the listing cancelled and returns the NFT to the seller. If the anchor no longer holds the NFT the listing is still cancelled and `custodyMissing` is set.",
    params(
        ("id" = uuid::Uuid, Path, description = "Listing UUID"),
    ),
    request_body = CancelRequest,
    responses(
        (status = 200, description = "Listing cancelled", body = CancelResponse),
        (status = 404, description = "Listing not found", body = ErrorResponse),
        (status = 409, description = "Listing no longer active", body = ErrorResponse),
    )
)]
pub async fn cancel_listing(
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
    Json(req): Json<CancelRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    let ctx = state.networks.get(req.network)?;
    let receipt = state.escrow.cancel(&ctx, ListingId::from_uuid(id)).await?;
    Ok(Json(CancelResponse::from(receipt)))
}

/// Listing routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/listings", post(create_listing).get(list_listings))
        .route("/listings/{id}", get(get_listing))
        .route("/listings/{id}/buy", post(buy_listing))
        .route("/listings/{id}/cancel", post(cancel_listing))
}

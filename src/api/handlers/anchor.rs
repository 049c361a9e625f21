//! Anchor status endpoint.

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::api::dto::{AnchorStatusResponse, NetworkQuery};
use crate::app_state::AppState;
use crate::error::{ErrorResponse, GatewayError};
use crate::service::pricing;

/// `GET /anchor`: Anchor address and live pool balances.
///
/// # Errors
///
/// Returns [`GatewayError`] for an unconfigured network or a ledger
/// failure.
#[utoipa::path(
    get,
    path = "/api/v1/anchor",
    tag = "Anchor",
    summary = "Anchor status",
    description = "Returns the anchor account address and its balances of the two pool assets. Read-only.",
    params(NetworkQuery),
    responses(
        (status = 200, description = "Anchor status", body = AnchorStatusResponse),
        (status = 502, description = "Ledger unreachable", body = ErrorResponse),
        (status = 503, description = "Network not configured", body = ErrorResponse),
    )
)]
pub async fn anchor_status(
    State(state): State<AppState>,
    Query(query): Query<NetworkQuery>,
) -> Result<impl IntoResponse, GatewayError> {
    let ctx = state.networks.get(query.network)?;
    let status = pricing::anchor_status(&ctx).await?;
    Ok(Json(AnchorStatusResponse::from(status)))
}

/// Anchor routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/anchor", get(anchor_status))
}

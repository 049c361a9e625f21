//! Operator endpoints guarded by the `x-admin-token` header.

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{
    NetworkQuery, ReconciliationResponse, RecoverRequest, RecoveryResponse, parse_address,
    parse_asset,
};
use crate::app_state::AppState;
use crate::error::{ErrorResponse, GatewayError};
use crate::service::AdminAuthorization;

/// Header carrying the operator token.
pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<AdminAuthorization, GatewayError> {
    let presented = headers
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok());
    AdminAuthorization::verify(state.admin_token.as_deref(), presented)
}

/// `GET /admin/reconciliation`: Custody discrepancies of a network.
///
/// # Errors
///
/// Returns [`GatewayError::Unauthorized`] without a valid token and
/// ledger or storage errors from the scan.
#[utoipa::path(
    get,
    path = "/api/v1/admin/reconciliation",
    tag = "Admin",
    summary = "Reconciliation scan",
    description = "Lists assets the anchor holds without an active listing and active listings whose NFT the anchor does not hold. Read-only.",
    params(NetworkQuery),
    responses(
        (status = 200, description = "Scan result", body = ReconciliationResponse),
        (status = 401, description = "Missing or wrong admin token", body = ErrorResponse),
        (status = 503, description = "Admin token not configured", body = ErrorResponse),
    )
)]
pub async fn reconciliation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<NetworkQuery>,
) -> Result<impl IntoResponse, GatewayError> {
    authorize(&state, &headers)?;
    let ctx = state.networks.get(query.network)?;
    let report = state.reconciliation.scan(&ctx).await?;
    Ok(Json(ReconciliationResponse::from(report)))
}

/// `POST /admin/recover`: Move an asset out of escrow.
///
/// # Errors
///
/// Returns [`GatewayError::Unauthorized`] without a valid token,
/// [`GatewayError::EscrowMismatch`] if the anchor holds none of the asset
/// and ledger errors from the transfer.
#[utoipa::path(
    post,
    path = "/api/v1/admin/recover",
    tag = "Admin",
    summary = "Recover an asset",
    description = "Transfers the anchor's whole balance of a non-pool asset to the given recipient, regardless of listing history.",
    request_body = RecoverRequest,
    responses(
        (status = 200, description = "Asset recovered", body = RecoveryResponse),
        (status = 401, description = "Missing or wrong admin token", body = ErrorResponse),
        (status = 409, description = "Asset not held by the anchor", body = ErrorResponse),
    )
)]
pub async fn recover(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RecoverRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    let authorization = authorize(&state, &headers)?;
    let token_id = parse_asset("tokenId", &req.token_id)?;
    let recipient = parse_address("recipientAddress", &req.recipient_address)?;
    let ctx = state.networks.get(req.network)?;

    let receipt = state
        .reconciliation
        .recover(&ctx, &authorization, &token_id, &recipient)
        .await?;
    Ok(Json(RecoveryResponse::from(receipt)))
}

/// Admin routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/admin/reconciliation", get(reconciliation))
        .route("/admin/recover", post(recover))
}

//! Swap quote, settlement and history handlers.

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{
    QuoteRequest, QuoteResponse, SettleRequest, SettlementResponse, SwapHistoryQuery,
    SwapRecordDto, parse_address, parse_amount, parse_asset,
};
use crate::app_state::AppState;
use crate::domain::TxRef;
use crate::error::{ErrorResponse, GatewayError};
use crate::ledger::LedgerTransaction;
use crate::service::{SettlementMode, SettlementRequest, SwapIntent};

/// `POST /swap/quote`: Price a swap at live balances (read-only).
///
/// # Errors
///
/// Returns [`GatewayError`] on invalid parameters, an empty pool or a
/// ledger failure.
#[utoipa::path(
    post,
    path = "/api/v1/swap/quote",
    tag = "Swaps",
    summary = "Quote a swap",
    description = "Computes the constant-product output, rate and price impact for a swap against the anchor's live balances. Nothing is submitted.",
    request_body = QuoteRequest,
    responses(
        (status = 200, description = "Quote computed", body = QuoteResponse),
        (status = 400, description = "Invalid parameters", body = ErrorResponse),
        (status = 422, description = "Pool has no liquidity", body = ErrorResponse),
    )
)]
pub async fn quote_swap(
    State(state): State<AppState>,
    Json(req): Json<QuoteRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    let from = parse_asset("fromAsset", &req.from_asset)?;
    let to = parse_asset("toAsset", &req.to_asset)?;
    let input = parse_amount("inputAmount", &req.input_amount)?;
    let ctx = state.networks.get(req.network)?;

    let quote = state.settlement.quote(&ctx, &from, &to, input).await?;
    Ok(Json(QuoteResponse::new(req.network, &quote)))
}

/// `POST /swap/settle`: Settle a swap atomically or in two trusted phases.
///
/// Failures use the same body shape with `success: false` and the HTTP
/// status of the error.
#[utoipa::path(
    post,
    path = "/api/v1/swap/settle",
    tag = "Swaps",
    summary = "Settle a swap",
    description = "With `unsignedCombinedTxBase64` the caller's signed payment leg and the anchor's payout are submitted as one transaction. With `userTransferRef` the anchor waits for the caller's payment to be final, verifies it and pays out.",
    request_body = SettleRequest,
    responses(
        (status = 200, description = "Swap settled", body = SettlementResponse),
        (status = 400, description = "Invalid parameters or swap cap exceeded", body = SettlementResponse),
        (status = 409, description = "Slippage exceeded or transfer already settled", body = SettlementResponse),
        (status = 422, description = "Liquidity or ledger rejection", body = SettlementResponse),
        (status = 504, description = "User transfer not final in time", body = SettlementResponse),
    )
)]
pub async fn settle_swap(State(state): State<AppState>, Json(req): Json<SettleRequest>) -> Response {
    let request = match parse_settle_request(&req) {
        Ok(request) => request,
        Err(err) => return failure(None, &req.input_amount, &err),
    };
    let mode = request.mode.name();

    let ctx = match state.networks.get(req.network) {
        Ok(ctx) => ctx,
        Err(err) => return failure(Some(mode), &req.input_amount, &err),
    };
    match state.settlement.settle(&ctx, request).await {
        Ok(receipt) => Json(SettlementResponse::settled(&receipt)).into_response(),
        Err(err) => failure(Some(mode), &req.input_amount, &err),
    }
}

fn failure(mode: Option<&str>, input_amount: &str, err: &GatewayError) -> Response {
    (
        err.status_code(),
        Json(SettlementResponse::failed(mode, input_amount, err)),
    )
        .into_response()
}

/// Parses a [`SettleRequest`] into typed swap terms and a settlement mode.
fn parse_settle_request(req: &SettleRequest) -> Result<SettlementRequest, GatewayError> {
    let swap = SwapIntent {
        network: req.network,
        from_asset: parse_asset("fromAsset", &req.from_asset)?,
        to_asset: parse_asset("toAsset", &req.to_asset)?,
        input_amount: parse_amount("inputAmount", &req.input_amount)?,
        caller: parse_address("callerAddress", &req.caller_address)?,
        expected_rate: req.expected_rate,
        slippage_tolerance_pct: req.slippage_tolerance_pct,
    };

    let mode = match (&req.unsigned_combined_tx_base64, &req.user_transfer_ref) {
        (Some(encoded), None) => SettlementMode::Atomic {
            unsigned_tx: LedgerTransaction::from_base64(encoded)?,
        },
        (None, Some(user_transfer)) if !user_transfer.trim().is_empty() => {
            SettlementMode::TrustedTwoPhase {
                user_transfer: TxRef::new(user_transfer.trim()),
            }
        }
        (Some(_), Some(_)) => {
            return Err(GatewayError::InvalidRequest(
                "specify either unsignedCombinedTxBase64 or userTransferRef, not both".to_string(),
            ));
        }
        _ => {
            return Err(GatewayError::InvalidRequest(
                "must specify unsignedCombinedTxBase64 or userTransferRef".to_string(),
            ));
        }
    };
    Ok(SettlementRequest { swap, mode })
}

/// `GET /swaps`: Most recent swap records for charting.
///
/// # Errors
///
/// Returns [`GatewayError::PersistenceError`] on storage failure.
#[utoipa::path(
    get,
    path = "/api/v1/swaps",
    tag = "Swaps",
    summary = "Swap history",
    description = "Returns the most recent swap log entries of a network, newest first. Every settled swap appears twice, once per direction.",
    params(SwapHistoryQuery),
    responses(
        (status = 200, description = "Swap records", body = Vec<SwapRecordDto>),
        (status = 500, description = "Storage failure", body = ErrorResponse),
    )
)]
pub async fn swap_history(
    State(state): State<AppState>,
    Query(query): Query<SwapHistoryQuery>,
) -> Result<impl IntoResponse, GatewayError> {
    let records = state
        .settlement
        .history(query.network, query.clamped_limit())
        .await?;
    let body: Vec<SwapRecordDto> = records.into_iter().map(SwapRecordDto::from).collect();
    Ok(Json(body))
}

/// Swap routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/swap/quote", post(quote_swap))
        .route("/swap/settle", post(settle_swap))
        .route("/swaps", get(swap_history))
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::Network;
    use crate::ledger::AccountSigner;

    fn request(tx: Option<String>, transfer: Option<&str>) -> SettleRequest {
        SettleRequest {
            network: Network::Test,
            from_asset: "AAA".to_string(),
            to_asset: "BBB".to_string(),
            input_amount: "100".to_string(),
            caller_address: AccountSigner::from_seed([4; 32]).address().to_string(),
            unsigned_combined_tx_base64: tx,
            user_transfer_ref: transfer.map(str::to_string),
            expected_rate: None,
            slippage_tolerance_pct: None,
        }
    }

    #[test]
    fn user_transfer_selects_trusted_mode() {
        let Ok(parsed) = parse_settle_request(&request(None, Some("abc"))) else {
            panic!("request should parse");
        };
        assert_eq!(parsed.mode.name(), "trusted_two_phase");
    }

    #[test]
    fn payload_selects_atomic_mode() {
        let tx = LedgerTransaction::new(Network::Test, Vec::new());
        let Ok(parsed) = parse_settle_request(&request(Some(tx.to_base64()), None)) else {
            panic!("request should parse");
        };
        assert_eq!(parsed.mode.name(), "atomic");
    }

    #[test]
    fn mode_must_be_unambiguous() {
        assert!(parse_settle_request(&request(None, None)).is_err());
        assert!(parse_settle_request(&request(None, Some("  "))).is_err());
        assert!(parse_settle_request(&request(Some("eA==".to_string()), Some("abc"))).is_err());
    }

    #[test]
    fn garbage_payload_is_invalid_request() {
        assert!(matches!(
            parse_settle_request(&request(Some("%%%".to_string()), None)),
            Err(GatewayError::InvalidRequest(_))
        ));
    }
}

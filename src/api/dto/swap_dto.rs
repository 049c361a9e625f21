//! Quote, settlement, anchor status and swap history DTOs.
//!
//! Amounts travel as decimal strings. Rates and percentages travel as
//! decimal strings on output and accept numbers or strings on input.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::domain::{Network, SwapRecord};
use crate::error::GatewayError;
use crate::service::{AnchorStatus, SettlementReceipt, SwapQuote};

/// Default number of swap records returned by the history endpoint.
pub const DEFAULT_HISTORY_LIMIT: usize = 100;
/// Largest accepted history `limit`.
pub const MAX_HISTORY_LIMIT: usize = 1_000;

/// Request body for `POST /api/v1/swap/quote`.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequest {
    /// Ledger network.
    pub network: Network,
    /// Asset sold to the pool.
    pub from_asset: String,
    /// Asset bought from the pool.
    pub to_asset: String,
    /// Input amount (string-encoded u128).
    pub input_amount: String,
}

/// Response body for `POST /api/v1/swap/quote`.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuoteResponse {
    /// Ledger network.
    pub network: Network,
    /// Asset sold to the pool.
    pub from_asset: String,
    /// Asset bought from the pool.
    pub to_asset: String,
    /// Input amount.
    pub input_amount: String,
    /// Output amount at current balances.
    pub output_amount: String,
    /// Pre-trade rate `balance(to) / balance(from)`.
    pub rate: String,
    /// Price impact in percent.
    pub price_impact_pct: String,
    /// Quote time.
    pub quoted_at: DateTime<Utc>,
}

impl QuoteResponse {
    /// Builds the response from a service quote.
    #[must_use]
    pub fn new(network: Network, quote: &SwapQuote) -> Self {
        Self {
            network,
            from_asset: quote.from_asset.to_string(),
            to_asset: quote.to_asset.to_string(),
            input_amount: quote.input_amount.to_string(),
            output_amount: quote.output_amount.to_string(),
            rate: quote.rate.to_string(),
            price_impact_pct: quote.price_impact_pct.to_string(),
            quoted_at: Utc::now(),
        }
    }
}

/// Request body for `POST /api/v1/swap/settle`.
///
/// `unsignedCombinedTxBase64` selects atomic settlement; otherwise
/// `userTransferRef` names the caller's completed payment.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SettleRequest {
    /// Ledger network.
    pub network: Network,
    /// Asset sold to the pool.
    pub from_asset: String,
    /// Asset bought from the pool.
    pub to_asset: String,
    /// Input amount (string-encoded u128).
    pub input_amount: String,
    /// Trader address.
    pub caller_address: String,
    /// Base64 JSON transaction carrying the caller's signed payment leg.
    #[serde(default)]
    pub unsigned_combined_tx_base64: Option<String>,
    /// Hash of the caller's already-submitted payment.
    #[serde(default)]
    pub user_transfer_ref: Option<String>,
    /// Rate the caller quoted against.
    #[serde(default)]
    #[schema(value_type = Option<f64>)]
    pub expected_rate: Option<Decimal>,
    /// Accepted deviation from `expectedRate`, in percent.
    #[serde(default)]
    #[schema(value_type = Option<f64>)]
    pub slippage_tolerance_pct: Option<Decimal>,
}

/// Response body for `POST /api/v1/swap/settle`, on success and failure.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SettlementResponse {
    /// `true` if the swap settled on the ledger.
    pub success: bool,
    /// Settlement protocol, when the request could be parsed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    /// Input amount as requested.
    pub input_amount: String,
    /// Output amount paid out.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_amount: Option<String>,
    /// Pre-trade rate the swap was priced at.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate: Option<String>,
    /// Price impact in percent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_impact_pct: Option<String>,
    /// Payout or combined transaction hash, or `"unknown"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_ref: Option<String>,
    /// Failure reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Numeric error code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<u32>,
    /// Whether the caller may retry (after re-quoting) without operator
    /// help.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
    /// Set when the live rate moved beyond the tolerance.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slippage_exceeded: Option<bool>,
    /// Live rate at rejection time (slippage failures only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_rate: Option<String>,
    /// Set when the swap settled but could not be recorded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bookkeeping_error: Option<String>,
}

impl SettlementResponse {
    /// Successful settlement.
    #[must_use]
    pub fn settled(receipt: &SettlementReceipt) -> Self {
        Self {
            success: true,
            mode: Some(receipt.mode.to_string()),
            input_amount: receipt.input_amount.to_string(),
            output_amount: Some(receipt.output_amount.to_string()),
            rate: Some(receipt.rate.to_string()),
            price_impact_pct: Some(receipt.price_impact_pct.to_string()),
            transaction_ref: Some(receipt.transaction_ref.to_string()),
            error: None,
            error_code: None,
            retryable: None,
            slippage_exceeded: None,
            current_rate: None,
            bookkeeping_error: receipt.bookkeeping_error.clone(),
        }
    }

    /// Failed settlement.
    #[must_use]
    pub fn failed(mode: Option<&str>, input_amount: &str, err: &GatewayError) -> Self {
        let current_rate = match err {
            GatewayError::SlippageExceeded { current_rate, .. } => Some(current_rate.to_string()),
            _ => None,
        };
        Self {
            success: false,
            mode: mode.map(str::to_string),
            input_amount: input_amount.to_string(),
            output_amount: None,
            rate: None,
            price_impact_pct: None,
            transaction_ref: None,
            error: Some(err.to_string()),
            error_code: Some(err.error_code()),
            retryable: Some(err.is_retryable()),
            slippage_exceeded: current_rate.as_ref().map(|_| true),
            current_rate,
            bookkeeping_error: None,
        }
    }
}

/// Response body for `GET /api/v1/anchor`.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnchorStatusResponse {
    /// Anchor account address.
    pub address: String,
    /// Ledger network.
    pub network: Network,
    /// Pool asset A.
    pub asset_a: String,
    /// Anchor balance of asset A.
    pub balance_a: String,
    /// Pool asset B.
    pub asset_b: String,
    /// Anchor balance of asset B.
    pub balance_b: String,
}

impl From<AnchorStatus> for AnchorStatusResponse {
    fn from(status: AnchorStatus) -> Self {
        Self {
            address: status.address.to_string(),
            network: status.network,
            asset_a: status.pool.asset_a.to_string(),
            balance_a: status.pool.balance_a.to_string(),
            asset_b: status.pool.asset_b.to_string(),
            balance_b: status.pool.balance_b.to_string(),
        }
    }
}

/// Query parameters of `GET /api/v1/swaps`.
#[derive(Debug, Clone, Copy, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SwapHistoryQuery {
    /// Ledger network.
    pub network: Network,
    /// Maximum number of records (default 100, max 1000).
    #[serde(default)]
    pub limit: Option<usize>,
}

impl SwapHistoryQuery {
    /// Limit clamped to `1..=MAX_HISTORY_LIMIT`.
    #[must_use]
    pub fn clamped_limit(&self) -> usize {
        self.limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, MAX_HISTORY_LIMIT)
    }
}

/// One swap log entry.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SwapRecordDto {
    /// Asset sold to the pool.
    pub from_asset: String,
    /// Asset bought from the pool.
    pub to_asset: String,
    /// Pool rate after settlement.
    pub rate: String,
    /// Pool balance of asset A after settlement.
    pub pool_balance_a: String,
    /// Pool balance of asset B after settlement.
    pub pool_balance_b: String,
    /// Traded quantity of `fromAsset`.
    pub volume: String,
    /// Ledger network.
    pub network: Network,
    /// Settlement time.
    pub timestamp: DateTime<Utc>,
}

impl From<SwapRecord> for SwapRecordDto {
    fn from(record: SwapRecord) -> Self {
        Self {
            from_asset: record.from_asset.to_string(),
            to_asset: record.to_asset.to_string(),
            rate: record.rate.to_string(),
            pool_balance_a: record.pool_balance_a.to_string(),
            pool_balance_b: record.pool_balance_b.to_string(),
            volume: record.volume.to_string(),
            network: record.network,
            timestamp: record.timestamp,
        }
    }
}

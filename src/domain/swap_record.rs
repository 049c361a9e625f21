//! Append-only swap log entries used for charting.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{Amount, AssetId, Network};

/// One row of the swap log.
///
/// Every settled swap is written as two mirrored rows: the forward
/// direction (`from → to`, volume = input) and the inverse direction
/// (`to → from`, volume = output, reciprocal rate). Rows are never
/// updated or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapRecord {
    /// Asset sold to the pool.
    pub from_asset: AssetId,
    /// Asset bought from the pool.
    pub to_asset: AssetId,
    /// Pool rate `balance(to) / balance(from)` after settlement.
    pub rate: Decimal,
    /// Pool balance of asset A after settlement.
    pub pool_balance_a: Amount,
    /// Pool balance of asset B after settlement.
    pub pool_balance_b: Amount,
    /// Traded quantity of `from_asset`.
    pub volume: Amount,
    /// Network of the swap.
    pub network: Network,
    /// Settlement time.
    pub timestamp: DateTime<Utc>,
}

/// Inputs for [`SwapRecord::mirrored_pair`].
#[derive(Debug, Clone)]
pub struct SettledSwap {
    /// Network of the swap.
    pub network: Network,
    /// Asset sold to the pool.
    pub from_asset: AssetId,
    /// Asset bought from the pool.
    pub to_asset: AssetId,
    /// Amount of `from_asset` paid in.
    pub input_amount: Amount,
    /// Amount of `to_asset` paid out.
    pub output_amount: Amount,
    /// Pool rate (`to / from`) after settlement.
    pub rate_after: Decimal,
    /// Pool balance of asset A after settlement.
    pub pool_balance_a: Amount,
    /// Pool balance of asset B after settlement.
    pub pool_balance_b: Amount,
}

impl SwapRecord {
    /// Builds the forward and inverse rows for one settled swap.
    #[must_use]
    pub fn mirrored_pair(swap: &SettledSwap) -> [Self; 2] {
        let timestamp = Utc::now();
        let inverse_rate = if swap.rate_after.is_zero() {
            Decimal::ZERO
        } else {
            Decimal::ONE
                .checked_div(swap.rate_after)
                .unwrap_or(Decimal::ZERO)
        };
        [
            Self {
                from_asset: swap.from_asset.clone(),
                to_asset: swap.to_asset.clone(),
                rate: swap.rate_after,
                pool_balance_a: swap.pool_balance_a,
                pool_balance_b: swap.pool_balance_b,
                volume: swap.input_amount,
                network: swap.network,
                timestamp,
            },
            Self {
                from_asset: swap.to_asset.clone(),
                to_asset: swap.from_asset.clone(),
                rate: inverse_rate,
                pool_balance_a: swap.pool_balance_a,
                pool_balance_b: swap.pool_balance_b,
                volume: swap.output_amount,
                network: swap.network,
                timestamp,
            },
        ]
    }
}

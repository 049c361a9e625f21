//! Constant-product pricing over the anchor's live pool balances.
//!
//! The pool is not stored anywhere: its state is the anchor account's
//! balance of the two pool assets, read from the ledger on demand. All
//! functions here are pure except [`read_pool`], [`quote`] and
//! [`anchor_status`], which perform the balance reads.
//!
//! Output amounts are computed in 256-bit integer arithmetic and rounded
//! down, so rounding always favours the pool. Rates and price impact are
//! exact 256-bit ratios rendered as [`rust_decimal::Decimal`] with as many
//! digits as fit, so pools of 18-decimal assets price as well as small ones.

use ethnum::U256;
use rust_decimal::Decimal;
use serde::Serialize;

use super::AnchorContext;
use crate::domain::{AccountAddress, Amount, AssetId, Network};
use crate::error::GatewayError;

/// Denominator of basis-point quantities.
pub const BPS_DENOMINATOR: u32 = 10_000;

/// Live balances of the two pool assets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolBalances {
    /// Pool asset `A`.
    pub asset_a: AssetId,
    /// Anchor balance of `A`.
    pub balance_a: Amount,
    /// Pool asset `B`.
    pub asset_b: AssetId,
    /// Anchor balance of `B`.
    pub balance_b: Amount,
}

impl PoolBalances {
    /// Balance of `asset`, if it is a pool asset.
    #[must_use]
    pub fn balance_of(&self, asset: &AssetId) -> Option<Amount> {
        if asset == &self.asset_a {
            Some(self.balance_a)
        } else if asset == &self.asset_b {
            Some(self.balance_b)
        } else {
            None
        }
    }

    /// Returns a copy with the balance of `asset` replaced.
    #[must_use]
    pub fn with_balance(mut self, asset: &AssetId, amount: Amount) -> Self {
        if asset == &self.asset_a {
            self.balance_a = amount;
        } else if asset == &self.asset_b {
            self.balance_b = amount;
        }
        self
    }

    /// Balances of `(from, to)`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRequest`] if either asset is not a
    /// pool asset.
    pub fn pair(&self, from: &AssetId, to: &AssetId) -> Result<(Amount, Amount), GatewayError> {
        let lookup = |asset: &AssetId| {
            self.balance_of(asset).ok_or_else(|| {
                GatewayError::InvalidRequest(format!("asset {asset} is not traded by the pool"))
            })
        };
        Ok((lookup(from)?, lookup(to)?))
    }
}

/// Ephemeral swap quote. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SwapQuote {
    /// Asset sold to the pool.
    pub from_asset: AssetId,
    /// Asset bought from the pool.
    pub to_asset: AssetId,
    /// Input amount.
    pub input_amount: Amount,
    /// Output amount at current balances.
    pub output_amount: Amount,
    /// Pre-trade rate `balance(to) / balance(from)`.
    pub rate: Decimal,
    /// Marginal-rate deviation caused by the trade, in percent.
    pub price_impact_pct: Decimal,
}

/// Read-only view of the anchor account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchorStatus {
    /// Anchor address.
    pub address: AccountAddress,
    /// Network.
    pub network: Network,
    /// Pool balances.
    pub pool: PoolBalances,
}

/// Largest `Decimal` mantissa, `2^96 - 1`.
const MAX_MANTISSA: u128 = (1 << 96) - 1;

/// Largest `Decimal` scale.
const MAX_SCALE: u32 = 28;

/// `numerator / denominator` as a `Decimal` carrying as many fractional
/// digits as the 96-bit mantissa allows, rounded down.
///
/// Both operands may use the full `u128` range of [`Amount`]; only the
/// quotient has to fit in a `Decimal`.
fn ratio_to_decimal(numerator: U256, denominator: U256) -> Option<Decimal> {
    if denominator == U256::ZERO || numerator / denominator > U256::from(MAX_MANTISSA) {
        return None;
    }
    (0..=MAX_SCALE).rev().find_map(|scale| {
        let scaled = numerator.checked_mul(U256::from(10_u128.pow(scale)))? / denominator;
        if scaled > U256::from(MAX_MANTISSA) {
            return None;
        }
        let mantissa = i128::try_from(scaled.as_u128()).ok()?;
        Decimal::try_from_i128_with_scale(mantissa, scale).ok()
    })
}

fn require_liquidity(from_balance: Amount, to_balance: Amount) -> Result<(), GatewayError> {
    if from_balance.is_zero() || to_balance.is_zero() {
        Err(GatewayError::NoLiquidity)
    } else {
        Ok(())
    }
}

/// Rate `balance(to) / balance(from)`.
///
/// # Errors
///
/// Returns [`GatewayError::NoLiquidity`] if either balance is zero and
/// [`GatewayError::InvalidRequest`] if an asset is not in the pool.
pub fn compute_rate(
    from: &AssetId,
    to: &AssetId,
    balances: &PoolBalances,
) -> Result<Decimal, GatewayError> {
    let (from_balance, to_balance) = balances.pair(from, to)?;
    require_liquidity(from_balance, to_balance)?;
    ratio_to_decimal(U256::from(to_balance.get()), U256::from(from_balance.get()))
        .map(|rate| rate.normalize())
        .ok_or_else(|| GatewayError::InvalidRequest("rate is out of range".to_string()))
}

/// Constant-product output for selling `input` into the pool:
/// `to * input / (from + input)`, rounded down.
///
/// The result is always strictly below `to_balance`.
///
/// # Errors
///
/// Returns [`GatewayError::NoLiquidity`] if either balance is zero and
/// [`GatewayError::InvalidRequest`] if the input is zero or too small to
/// buy a single unit.
pub fn compute_output_amount(
    input: Amount,
    from_balance: Amount,
    to_balance: Amount,
) -> Result<Amount, GatewayError> {
    require_liquidity(from_balance, to_balance)?;
    if input.is_zero() {
        return Err(GatewayError::InvalidRequest(
            "input amount must be positive".to_string(),
        ));
    }
    let dx = U256::from(input.get());
    let numerator = U256::from(to_balance.get()) * dx;
    let denominator = U256::from(from_balance.get()) + dx;
    let output = numerator / denominator;
    if output == U256::ZERO {
        return Err(GatewayError::InvalidRequest(format!(
            "input amount {input} is too small to buy one unit"
        )));
    }
    // output < to_balance, so it fits in u128.
    Ok(Amount::new(output.as_u128()))
}

/// Price impact of a trade in percent: the deviation of the post-trade
/// marginal rate `newFrom / newTo` from the pre-trade rate `from / to`.
///
/// With `newTo = k / newFrom` the ratio of the two rates is
/// `(newFrom / from)²`, which is evaluated exactly.
///
/// # Errors
///
/// Returns [`GatewayError::NoLiquidity`] if either balance is zero and
/// [`GatewayError::InvalidRequest`] if the input outweighs the pool so far
/// that the impact leaves `Decimal` range.
pub fn compute_price_impact(
    input: Amount,
    from_balance: Amount,
    to_balance: Amount,
) -> Result<Decimal, GatewayError> {
    require_liquidity(from_balance, to_balance)?;
    let out_of_range = || GatewayError::InvalidRequest("price impact is out of range".to_string());
    let from = U256::from(from_balance.get());
    let new_from = from + U256::from(input.get());
    let growth = ratio_to_decimal(new_from, from).ok_or_else(out_of_range)?;
    let ratio = growth.checked_mul(growth).ok_or_else(out_of_range)?;
    ratio
        .checked_sub(Decimal::ONE)
        .and_then(|d| d.checked_mul(Decimal::ONE_HUNDRED))
        .map(|d| d.abs().round_dp(6).normalize())
        .ok_or_else(out_of_range)
}

/// Largest input accepted by the anti-drain cap: `floor(from * bps / 10000)`.
#[must_use]
pub fn max_swap_input(from_balance: Amount, max_input_bps: u32) -> Amount {
    let max = U256::from(from_balance.get()) * U256::from(max_input_bps)
        / U256::from(BPS_DENOMINATOR);
    // max <= from_balance whenever bps <= 10000; clamp otherwise.
    if max > U256::from(u128::MAX) {
        Amount::new(u128::MAX)
    } else {
        Amount::new(max.as_u128())
    }
}

/// Reads the anchor's balances of both pool assets.
///
/// # Errors
///
/// Propagates ledger failures as [`GatewayError::LedgerNetworkError`] /
/// [`GatewayError::LedgerRejected`].
pub async fn read_pool(ctx: &AnchorContext) -> Result<PoolBalances, GatewayError> {
    let anchor = ctx.address();
    let balance_a = ctx.ledger.balance(anchor, &ctx.pool.asset_a).await?;
    let balance_b = ctx.ledger.balance(anchor, &ctx.pool.asset_b).await?;
    Ok(PoolBalances {
        asset_a: ctx.pool.asset_a.clone(),
        balance_a,
        asset_b: ctx.pool.asset_b.clone(),
        balance_b,
    })
}

/// Prices `input` of `from` against given balances.
///
/// # Errors
///
/// Returns the errors of [`compute_rate`], [`compute_output_amount`] and
/// [`compute_price_impact`].
pub fn quote_against(
    balances: &PoolBalances,
    from: &AssetId,
    to: &AssetId,
    input: Amount,
) -> Result<SwapQuote, GatewayError> {
    let (from_balance, to_balance) = balances.pair(from, to)?;
    let rate = compute_rate(from, to, balances)?;
    let output_amount = compute_output_amount(input, from_balance, to_balance)?;
    let price_impact_pct = compute_price_impact(input, from_balance, to_balance)?;
    Ok(SwapQuote {
        from_asset: from.clone(),
        to_asset: to.clone(),
        input_amount: input,
        output_amount,
        rate,
        price_impact_pct,
    })
}

/// Quotes a swap at the current live balances.
///
/// # Errors
///
/// Returns [`GatewayError::InvalidRequest`] for a pair the pool does not
/// trade, plus the errors of [`read_pool`] and [`quote_against`].
pub async fn quote(
    ctx: &AnchorContext,
    from: &AssetId,
    to: &AssetId,
    input: Amount,
) -> Result<SwapQuote, GatewayError> {
    ctx.pool.validate_pair(from, to)?;
    let balances = read_pool(ctx).await?;
    quote_against(&balances, from, to, input)
}

/// Anchor status query.
///
/// # Errors
///
/// Propagates the errors of [`read_pool`].
pub async fn anchor_status(ctx: &AnchorContext) -> Result<AnchorStatus, GatewayError> {
    Ok(AnchorStatus {
        address: ctx.address().clone(),
        network: ctx.network,
        pool: read_pool(ctx).await?,
    })
}

//! Swap settlement against the anchor's liquidity pool.
//!
//! [`SwapSettlementCoordinator::settle`] re-prices a swap at live balances,
//! enforces slippage protection and the anti-drain cap, and executes one
//! of two protocols behind the [`SettlementProtocol`] trait:
//!
//! - [`AtomicSettlement`]: the caller's signed payment leg and the
//!   anchor's payout leg are submitted as one ledger transaction.
//! - [`TrustedSettlement`]: the caller has already paid in a separate
//!   transaction; the coordinator waits for it to become final, checks it
//!   and pays out. Between the two transactions the caller has paid but
//!   not been paid; a failure in that window is logged for operator
//!   follow-up.
//!
//! Each attempt walks a [`SwapPhase`] state machine:
//!
//! ```text
//! Quoted ─► Submitted ─► Settled | Rejected                  (atomic)
//! Quoted ─► AwaitingUserTransfer ─► Verifying ─► Settled | Failed  (trusted)
//! ```
//!
//! Failed or rejected attempts are never retried automatically.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::time::Instant;

use super::AnchorContext;
use super::pricing::{
    PoolBalances, SwapQuote, compute_output_amount, compute_price_impact, compute_rate,
    max_swap_input, read_pool,
};
use crate::domain::{
    AccountAddress, Amount, AssetId, EngineEvent, EventBus, Network, SettledSwap, SwapRecord,
    TxRef,
};
use crate::error::GatewayError;
use crate::ledger::{LedgerError, LedgerTransaction, TransactionInfo, Transfer, TxStatus};
use crate::persistence::SwapLog;

/// Default anti-drain cap: 15% of the pool's `from` balance.
pub const DEFAULT_MAX_INPUT_BPS: u32 = 1_500;

/// How a swap is settled on the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementMode {
    /// Caller-signed payment leg completed by the anchor and submitted as
    /// one indivisible transaction.
    Atomic {
        /// Decoded combined transaction carrying the caller's leg.
        unsigned_tx: LedgerTransaction,
    },
    /// Caller paid first in a separate transaction; the anchor pays out
    /// after verifying it.
    TrustedTwoPhase {
        /// Hash of the caller's payment.
        user_transfer: TxRef,
    },
}

impl SettlementMode {
    /// Protocol name used in logs, events and responses.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Atomic { .. } => "atomic",
            Self::TrustedTwoPhase { .. } => "trusted_two_phase",
        }
    }
}

/// Protocol-independent swap terms.
#[derive(Debug, Clone, PartialEq)]
pub struct SwapIntent {
    /// Network of the swap.
    pub network: Network,
    /// Asset sold to the pool.
    pub from_asset: AssetId,
    /// Asset bought from the pool.
    pub to_asset: AssetId,
    /// Amount of `from_asset` paid in.
    pub input_amount: Amount,
    /// Trader.
    pub caller: AccountAddress,
    /// Rate the caller quoted against.
    pub expected_rate: Option<Decimal>,
    /// Accepted deviation from `expected_rate`, in percent.
    pub slippage_tolerance_pct: Option<Decimal>,
}

/// A settlement request.
#[derive(Debug, Clone, PartialEq)]
pub struct SettlementRequest {
    /// Swap terms.
    pub swap: SwapIntent,
    /// Settlement protocol.
    pub mode: SettlementMode,
}

/// Coordinator tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlementSettings {
    /// Anti-drain cap in basis points of the `from` balance.
    pub max_input_bps: u32,
    /// How long to wait for a user transfer to become final.
    pub finality_timeout: Duration,
    /// Delay between finality polls.
    pub poll_interval: Duration,
}

impl Default for SettlementSettings {
    fn default() -> Self {
        Self {
            max_input_bps: DEFAULT_MAX_INPUT_BPS,
            finality_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(1_000),
        }
    }
}

/// Phase of one settlement attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapPhase {
    /// Priced; no ledger interaction yet.
    Quoted,
    /// Combined transaction handed to the ledger.
    Submitted,
    /// Waiting for the caller's payment to become final.
    AwaitingUserTransfer,
    /// Checking the caller's payment and paying out.
    Verifying,
    /// Both legs happened.
    Settled,
    /// Refused before or at submission; nothing moved.
    Rejected,
    /// Trusted protocol failed after the caller may have paid.
    Failed,
}

impl SwapPhase {
    /// Lowercase name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Quoted => "quoted",
            Self::Submitted => "submitted",
            Self::AwaitingUserTransfer => "awaiting_user_transfer",
            Self::Verifying => "verifying",
            Self::Settled => "settled",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
        }
    }

    /// Returns `true` if the state machine allows `self → next`.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (
                Self::Quoted,
                Self::Submitted | Self::AwaitingUserTransfer | Self::Rejected
            ) | (Self::Submitted, Self::Settled | Self::Rejected)
                | (Self::AwaitingUserTransfer, Self::Verifying | Self::Failed)
                | (Self::Verifying, Self::Settled | Self::Failed)
        )
    }

    /// Terminal phase for an attempt that stopped in `self`.
    #[must_use]
    pub const fn failure(&self) -> Self {
        match self {
            Self::AwaitingUserTransfer | Self::Verifying | Self::Failed => Self::Failed,
            _ => Self::Rejected,
        }
    }
}

impl fmt::Display for SwapPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks the phase of one settlement attempt.
#[derive(Debug)]
pub struct SwapAttempt {
    id: uuid::Uuid,
    mode: &'static str,
    phase: SwapPhase,
}

impl SwapAttempt {
    fn new(mode: &'static str) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            mode,
            phase: SwapPhase::Quoted,
        }
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> SwapPhase {
        self.phase
    }

    /// Moves to `next`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Internal`] if the state machine does not
    /// allow the transition.
    pub fn enter(&mut self, next: SwapPhase) -> Result<(), GatewayError> {
        if !self.phase.can_transition_to(next) {
            return Err(GatewayError::Internal(format!(
                "swap {} cannot move from {} to {next}",
                self.id, self.phase
            )));
        }
        tracing::debug!(swap_id = %self.id, mode = self.mode, from = %self.phase, phase = %next, "swap phase");
        self.phase = next;
        Ok(())
    }

    fn fail(&mut self) {
        let terminal = self.phase.failure();
        if self.phase != terminal {
            tracing::debug!(swap_id = %self.id, mode = self.mode, from = %self.phase, phase = %terminal, "swap phase");
            self.phase = terminal;
        }
    }
}

/// One ledger protocol for settling a priced swap.
#[async_trait]
pub trait SettlementProtocol: Send + Sync + fmt::Debug {
    /// Protocol name.
    fn name(&self) -> &'static str;

    /// Whether the caller's slippage tolerance is enforced.
    fn enforces_slippage(&self) -> bool;

    /// Validates the protocol payload (waiting for the caller's payment if
    /// needed) and returns the pool balances to price against.
    async fn prepare(
        &mut self,
        ctx: &AnchorContext,
        swap: &SwapIntent,
        attempt: &mut SwapAttempt,
    ) -> Result<PoolBalances, GatewayError>;

    /// Pays `output` of the `to` asset to the caller.
    async fn execute(
        &mut self,
        ctx: &AnchorContext,
        swap: &SwapIntent,
        output: Amount,
        attempt: &mut SwapAttempt,
    ) -> Result<TxRef, GatewayError>;

    /// Releases whatever `prepare` reserved when the attempt does not
    /// settle.
    async fn abort(&mut self, ctx: &AnchorContext);
}

/// Single combined transaction: the caller's payment leg plus the anchor's
/// payout leg.
///
/// The submitted transaction's reference is claimed in the swap log so it
/// can never be presented again as a trusted-mode payment.
#[derive(Debug)]
pub struct AtomicSettlement {
    transaction: LedgerTransaction,
    swap_log: Arc<dyn SwapLog>,
}

impl AtomicSettlement {
    /// Wraps the caller's partially built transaction.
    #[must_use]
    pub fn new(transaction: LedgerTransaction, swap_log: Arc<dyn SwapLog>) -> Self {
        Self {
            transaction,
            swap_log,
        }
    }

    /// Marks the settled transaction as used. The swap already happened, so
    /// a failure here is logged, not returned.
    async fn claim_settled(&self, ctx: &AnchorContext, tx_ref: &TxRef) {
        match self.swap_log.claim_transfer(ctx.network, tx_ref).await {
            Ok(true) => {}
            Ok(false) => tracing::error!(
                network = %ctx.network,
                tx_ref = %tx_ref,
                reconciliation_candidate = true,
                "combined transaction was already claimed"
            ),
            Err(e) => tracing::error!(
                network = %ctx.network,
                tx_ref = %tx_ref,
                error = %e,
                reconciliation_candidate = true,
                "failed to claim combined transaction"
            ),
        }
    }

    fn check_payment_leg(&self, ctx: &AnchorContext, swap: &SwapIntent) -> Result<(), GatewayError> {
        let tx = &self.transaction;
        if tx.network != swap.network {
            return Err(GatewayError::InvalidRequest(format!(
                "combined transaction targets {}, request is for {}",
                tx.network, swap.network
            )));
        }
        let [leg] = tx.legs.as_slice() else {
            return Err(GatewayError::InvalidRequest(format!(
                "combined transaction must carry exactly the caller's payment leg, found {} legs",
                tx.legs.len()
            )));
        };
        let expected = Transfer {
            from: swap.caller.clone(),
            to: ctx.address().clone(),
            asset: swap.from_asset.clone(),
            amount: swap.input_amount,
        };
        if leg != &expected {
            return Err(GatewayError::InvalidRequest(format!(
                "payment leg must move {} {} from {} to the anchor",
                swap.input_amount, swap.from_asset, swap.caller
            )));
        }
        tx.verify_leg(0).map_err(|e| {
            GatewayError::InvalidRequest(format!("payment leg is not signed by the caller: {e}"))
        })
    }
}

#[async_trait]
impl SettlementProtocol for AtomicSettlement {
    fn name(&self) -> &'static str {
        "atomic"
    }

    fn enforces_slippage(&self) -> bool {
        true
    }

    async fn prepare(
        &mut self,
        ctx: &AnchorContext,
        swap: &SwapIntent,
        _attempt: &mut SwapAttempt,
    ) -> Result<PoolBalances, GatewayError> {
        self.check_payment_leg(ctx, swap)?;
        read_pool(ctx).await
    }

    async fn execute(
        &mut self,
        ctx: &AnchorContext,
        swap: &SwapIntent,
        output: Amount,
        attempt: &mut SwapAttempt,
    ) -> Result<TxRef, GatewayError> {
        let index = self.transaction.push_leg(Transfer {
            from: ctx.address().clone(),
            to: swap.caller.clone(),
            asset: swap.to_asset.clone(),
            amount: output,
        });
        ctx.signer
            .authorize_leg(&mut self.transaction, index)
            .map_err(|e| GatewayError::Internal(format!("anchor cannot sign payout: {e}")))?;

        attempt.enter(SwapPhase::Submitted)?;
        match ctx.ledger.submit(&self.transaction).await {
            Ok(tx_ref) => {
                self.claim_settled(ctx, &tx_ref).await;
                Ok(tx_ref)
            }
            Err(LedgerError::Network(msg)) => {
                tracing::error!(
                    network = %ctx.network,
                    tx_id = %self.transaction.id,
                    content_hash = %self.transaction.content_hash(),
                    error = %msg,
                    reconciliation_candidate = true,
                    "combined transaction outcome unknown"
                );
                Err(GatewayError::LedgerNetworkError(msg))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn abort(&mut self, _ctx: &AnchorContext) {}
}

/// Payout after verifying a separate, already-submitted user payment.
#[derive(Debug)]
pub struct TrustedSettlement {
    user_transfer: TxRef,
    swap_log: Arc<dyn SwapLog>,
    settings: SettlementSettings,
    claimed: bool,
}

impl TrustedSettlement {
    /// Creates the protocol for the payment `user_transfer`.
    #[must_use]
    pub fn new(user_transfer: TxRef, swap_log: Arc<dyn SwapLog>, settings: SettlementSettings) -> Self {
        Self {
            user_transfer,
            swap_log,
            settings,
            claimed: false,
        }
    }

    /// Polls the ledger until the user transfer is final.
    async fn await_finality(&self, ctx: &AnchorContext) -> Result<TransactionInfo, GatewayError> {
        let deadline = Instant::now() + self.settings.finality_timeout;
        loop {
            match ctx.ledger.transaction(&self.user_transfer).await {
                Ok(Some(info)) => match &info.status {
                    TxStatus::Final => return Ok(info),
                    TxStatus::Failed(reason) => {
                        return Err(GatewayError::UserTransferFailed(format!(
                            "transaction {} failed on the ledger: {reason}",
                            self.user_transfer
                        )));
                    }
                    TxStatus::Pending => {}
                },
                Ok(None) => {}
                Err(LedgerError::Network(msg)) => {
                    tracing::warn!(network = %ctx.network, tx_ref = %self.user_transfer, error = %msg, "finality poll failed");
                }
                Err(e) => return Err(e.into()),
            }
            if Instant::now() + self.settings.poll_interval > deadline {
                return Err(GatewayError::SettlementTimeout(self.user_transfer.clone()));
            }
            tokio::time::sleep(self.settings.poll_interval).await;
        }
    }
}

#[async_trait]
impl SettlementProtocol for TrustedSettlement {
    fn name(&self) -> &'static str {
        "trusted_two_phase"
    }

    fn enforces_slippage(&self) -> bool {
        false
    }

    async fn prepare(
        &mut self,
        ctx: &AnchorContext,
        swap: &SwapIntent,
        attempt: &mut SwapAttempt,
    ) -> Result<PoolBalances, GatewayError> {
        if self.user_transfer.is_unknown() {
            return Err(GatewayError::InvalidRequest(
                "userTransferRef must name the caller's payment".to_string(),
            ));
        }
        attempt.enter(SwapPhase::AwaitingUserTransfer)?;
        let info = self.await_finality(ctx).await?;

        attempt.enter(SwapPhase::Verifying)?;
        if info.legs.iter().any(|leg| &leg.from == ctx.address()) {
            return Err(GatewayError::UserTransferFailed(format!(
                "transaction {} moves anchor funds and is not a plain payment",
                self.user_transfer
            )));
        }
        if !info.contains_transfer(&swap.caller, ctx.address(), &swap.from_asset, swap.input_amount) {
            return Err(GatewayError::UserTransferFailed(format!(
                "transaction {} does not pay {} {} from {} to the anchor",
                self.user_transfer, swap.input_amount, swap.from_asset, swap.caller
            )));
        }
        if !self.swap_log.claim_transfer(swap.network, &self.user_transfer).await? {
            return Err(GatewayError::TransferAlreadySettled(self.user_transfer.clone()));
        }
        self.claimed = true;

        // The payment is already part of the live balance.
        let live = read_pool(ctx).await?;
        let live_from = live.balance_of(&swap.from_asset).unwrap_or(Amount::ZERO);
        let pre_trade = live_from.checked_sub(swap.input_amount).ok_or_else(|| {
            GatewayError::EscrowMismatch(format!(
                "anchor holds {live_from} {} after a final payment of {}",
                swap.from_asset, swap.input_amount
            ))
        })?;
        Ok(live.with_balance(&swap.from_asset, pre_trade))
    }

    async fn execute(
        &mut self,
        ctx: &AnchorContext,
        swap: &SwapIntent,
        output: Amount,
        _attempt: &mut SwapAttempt,
    ) -> Result<TxRef, GatewayError> {
        match ctx
            .transfer_from_anchor(
                &swap.caller,
                &swap.to_asset,
                output,
                format!("swap payout for {}", self.user_transfer),
            )
            .await
        {
            Ok(tx_ref) => Ok(tx_ref),
            Err(LedgerError::Network(msg)) => {
                // The payout may have landed; the claim must outlive this attempt.
                self.claimed = false;
                tracing::error!(
                    network = %ctx.network,
                    tx_ref = %self.user_transfer,
                    error = %msg,
                    reconciliation_candidate = true,
                    "payout outcome unknown; user transfer stays claimed"
                );
                Err(GatewayError::LedgerNetworkError(msg))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn abort(&mut self, ctx: &AnchorContext) {
        if !self.claimed {
            return;
        }
        match self.swap_log.release_transfer(ctx.network, &self.user_transfer).await {
            Ok(()) => self.claimed = false,
            Err(e) => tracing::error!(
                network = %ctx.network,
                tx_ref = %self.user_transfer,
                error = %e,
                reconciliation_candidate = true,
                "failed to release user transfer claim"
            ),
        }
    }
}

/// Outcome of a settled swap.
#[derive(Debug, Clone, PartialEq)]
pub struct SettlementReceipt {
    /// Protocol used.
    pub mode: &'static str,
    /// Network.
    pub network: Network,
    /// Input amount.
    pub input_amount: Amount,
    /// Output amount paid to the caller.
    pub output_amount: Amount,
    /// Pre-trade pool rate the swap was priced at.
    pub rate: Decimal,
    /// Price impact in percent.
    pub price_impact_pct: Decimal,
    /// Payout (trusted) or combined (atomic) transaction.
    pub transaction_ref: TxRef,
    /// Set when the swap settled but the swap log write failed.
    pub bookkeeping_error: Option<String>,
}

struct Priced {
    output: Amount,
    rate: Decimal,
    price_impact_pct: Decimal,
    balances: PoolBalances,
}

/// Orchestrates quoting and settlement of pool swaps.
#[derive(Debug, Clone)]
pub struct SwapSettlementCoordinator {
    swap_log: Arc<dyn SwapLog>,
    event_bus: EventBus,
    settings: SettlementSettings,
}

impl SwapSettlementCoordinator {
    /// Creates a coordinator.
    #[must_use]
    pub fn new(swap_log: Arc<dyn SwapLog>, event_bus: EventBus, settings: SettlementSettings) -> Self {
        Self {
            swap_log,
            event_bus,
            settings,
        }
    }

    /// Coordinator settings.
    #[must_use]
    pub const fn settings(&self) -> &SettlementSettings {
        &self.settings
    }

    /// Quotes a swap at live balances.
    ///
    /// # Errors
    ///
    /// See [`super::pricing::quote`].
    pub async fn quote(
        &self,
        ctx: &AnchorContext,
        from: &AssetId,
        to: &AssetId,
        input: Amount,
    ) -> Result<SwapQuote, GatewayError> {
        super::pricing::quote(ctx, from, to, input).await
    }

    /// Most recent swap records of a network.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PersistenceError`] on storage failure.
    pub async fn history(&self, network: Network, limit: usize) -> Result<Vec<SwapRecord>, GatewayError> {
        self.swap_log.recent_swaps(network, limit).await
    }

    fn protocol(&self, mode: SettlementMode) -> Box<dyn SettlementProtocol> {
        match mode {
            SettlementMode::Atomic { unsigned_tx } => Box::new(AtomicSettlement::new(
                unsigned_tx,
                Arc::clone(&self.swap_log),
            )),
            SettlementMode::TrustedTwoPhase { user_transfer } => Box::new(TrustedSettlement::new(
                user_transfer,
                Arc::clone(&self.swap_log),
                self.settings,
            )),
        }
    }

    /// Settles a swap.
    ///
    /// Validation, slippage, cap and liquidity failures are reported
    /// before anything is submitted to the ledger. A failure to record the
    /// settled swap does not fail the call: the receipt carries
    /// `bookkeeping_error` instead.
    ///
    /// # Errors
    ///
    /// Returns the [`GatewayError`] that ended the attempt.
    pub async fn settle(
        &self,
        ctx: &AnchorContext,
        request: SettlementRequest,
    ) -> Result<SettlementReceipt, GatewayError> {
        let SettlementRequest { swap, mode } = request;
        let mut protocol = self.protocol(mode);
        let mut attempt = SwapAttempt::new(protocol.name());

        let outcome = self.run(ctx, &swap, protocol.as_mut(), &mut attempt).await;
        let (priced, tx_ref) = match outcome {
            Ok(done) => done,
            Err(err) => {
                attempt.fail();
                protocol.abort(ctx).await;
                let funds_received = attempt.phase() == SwapPhase::Failed;
                if funds_received {
                    tracing::error!(
                        network = %swap.network,
                        swap_id = %attempt.id,
                        mode = protocol.name(),
                        caller = %swap.caller,
                        error = %err,
                        "trusted settlement failed; user transfer may need manual refund"
                    );
                } else {
                    tracing::warn!(
                        network = %swap.network,
                        swap_id = %attempt.id,
                        mode = protocol.name(),
                        error = %err,
                        "swap rejected"
                    );
                }
                let _ = self.event_bus.publish(EngineEvent::SwapFailed {
                    network: swap.network,
                    mode: protocol.name(),
                    caller: swap.caller.clone(),
                    reason: err.to_string(),
                    timestamp: Utc::now(),
                });
                return Err(err);
            }
        };

        let bookkeeping_error = self.record(&swap, &priced, &tx_ref).await;

        tracing::info!(
            network = %swap.network,
            swap_id = %attempt.id,
            mode = protocol.name(),
            from_asset = %swap.from_asset,
            to_asset = %swap.to_asset,
            input = %swap.input_amount,
            output = %priced.output,
            tx_ref = %tx_ref,
            "swap settled"
        );
        let _ = self.event_bus.publish(EngineEvent::SwapSettled {
            network: swap.network,
            mode: protocol.name(),
            caller: swap.caller.clone(),
            from_asset: swap.from_asset.clone(),
            to_asset: swap.to_asset.clone(),
            input_amount: swap.input_amount,
            output_amount: priced.output,
            rate: priced.rate.to_string(),
            transaction_ref: tx_ref.clone(),
            timestamp: Utc::now(),
        });

        Ok(SettlementReceipt {
            mode: protocol.name(),
            network: swap.network,
            input_amount: swap.input_amount,
            output_amount: priced.output,
            rate: priced.rate,
            price_impact_pct: priced.price_impact_pct,
            transaction_ref: tx_ref,
            bookkeeping_error,
        })
    }

    async fn run(
        &self,
        ctx: &AnchorContext,
        swap: &SwapIntent,
        protocol: &mut dyn SettlementProtocol,
        attempt: &mut SwapAttempt,
    ) -> Result<(Priced, TxRef), GatewayError> {
        if swap.input_amount.is_zero() {
            return Err(GatewayError::InvalidRequest(
                "input amount must be positive".to_string(),
            ));
        }
        if swap.network != ctx.network {
            return Err(GatewayError::InvalidRequest(format!(
                "request for {} routed to the {} anchor",
                swap.network, ctx.network
            )));
        }
        ctx.pool.validate_pair(&swap.from_asset, &swap.to_asset)?;
        if &swap.caller == ctx.address() {
            return Err(GatewayError::InvalidRequest(
                "the anchor cannot swap with itself".to_string(),
            ));
        }

        let balances = protocol.prepare(ctx, swap, attempt).await?;
        let priced = self.price(swap, balances, protocol.enforces_slippage())?;
        let tx_ref = protocol.execute(ctx, swap, priced.output, attempt).await?;
        attempt.enter(SwapPhase::Settled)?;
        Ok((priced, tx_ref))
    }

    /// Slippage, cap and liquidity checks, in that order.
    fn price(
        &self,
        swap: &SwapIntent,
        balances: PoolBalances,
        enforce_slippage: bool,
    ) -> Result<Priced, GatewayError> {
        let (from_balance, to_balance) = balances.pair(&swap.from_asset, &swap.to_asset)?;
        let rate = compute_rate(&swap.from_asset, &swap.to_asset, &balances)?;

        if enforce_slippage
            && let (Some(expected), Some(tolerance)) =
                (swap.expected_rate, swap.slippage_tolerance_pct)
        {
            check_slippage(rate, expected, tolerance)?;
        }

        let max_input = max_swap_input(from_balance, self.settings.max_input_bps);
        if swap.input_amount > max_input {
            return Err(GatewayError::SwapCapExceeded {
                requested: swap.input_amount,
                max_input,
            });
        }

        let output = compute_output_amount(swap.input_amount, from_balance, to_balance)?;
        if output > to_balance {
            return Err(GatewayError::InsufficientLiquidity);
        }
        let price_impact_pct = compute_price_impact(swap.input_amount, from_balance, to_balance)?;
        Ok(Priced {
            output,
            rate,
            price_impact_pct,
            balances,
        })
    }

    /// Appends the mirrored swap records. Returns the failure message, if
    /// any; the swap itself has already settled.
    async fn record(&self, swap: &SwapIntent, priced: &Priced, tx_ref: &TxRef) -> Option<String> {
        let post = priced
            .balances
            .balance_of(&swap.from_asset)
            .and_then(|b| b.checked_add(swap.input_amount))
            .zip(
                priced
                    .balances
                    .balance_of(&swap.to_asset)
                    .and_then(|b| b.checked_sub(priced.output)),
            );
        let result = match post {
            Some((from_after, to_after)) => {
                let after = priced
                    .balances
                    .clone()
                    .with_balance(&swap.from_asset, from_after)
                    .with_balance(&swap.to_asset, to_after);
                match compute_rate(&swap.from_asset, &swap.to_asset, &after) {
                    Ok(rate_after) => {
                        let records = SwapRecord::mirrored_pair(&SettledSwap {
                            network: swap.network,
                            from_asset: swap.from_asset.clone(),
                            to_asset: swap.to_asset.clone(),
                            input_amount: swap.input_amount,
                            output_amount: priced.output,
                            rate_after,
                            pool_balance_a: after.balance_a,
                            pool_balance_b: after.balance_b,
                        });
                        self.swap_log.append_swaps(&records).await
                    }
                    Err(e) => Err(e),
                }
            }
            None => Err(GatewayError::Internal(
                "post-trade balances out of range".to_string(),
            )),
        };

        result.err().map(|e| {
            tracing::error!(
                network = %swap.network,
                tx_ref = %tx_ref,
                error = %e,
                reconciliation_candidate = true,
                "swap settled but swap log write failed"
            );
            e.to_string()
        })
    }
}

/// Rejects when `|current − expected| / expected × 100 > tolerance`.
///
/// # Errors
///
/// Returns [`GatewayError::InvalidRequest`] for a non-positive expected
/// rate or negative tolerance and [`GatewayError::SlippageExceeded`] when
/// the deviation is too large.
pub fn check_slippage(
    current_rate: Decimal,
    expected_rate: Decimal,
    tolerance_pct: Decimal,
) -> Result<(), GatewayError> {
    if expected_rate <= Decimal::ZERO {
        return Err(GatewayError::InvalidRequest(
            "expectedRate must be positive".to_string(),
        ));
    }
    if tolerance_pct < Decimal::ZERO {
        return Err(GatewayError::InvalidRequest(
            "slippageTolerancePct must not be negative".to_string(),
        ));
    }
    let deviation = (current_rate - expected_rate)
        .abs()
        .checked_div(expected_rate)
        .and_then(|d| d.checked_mul(Decimal::ONE_HUNDRED))
        .ok_or_else(|| GatewayError::InvalidRequest("slippage out of range".to_string()))?;
    if deviation > tolerance_pct {
        return Err(GatewayError::SlippageExceeded {
            current_rate,
            expected_rate,
            tolerance_pct,
        });
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::ledger::{AccountSigner, LedgerClient, MemoryLedger};
    use crate::persistence::MemoryStore;
    use crate::service::PoolAssets;
    use rust_decimal_macros::dec;

    const ANCHOR_SEED: [u8; 32] = [9; 32];
    const USER_SEED: [u8; 32] = [1; 32];

    fn asset(code: &str) -> AssetId {
        let Ok(asset) = AssetId::new(code) else {
            panic!("valid asset");
        };
        asset
    }

    struct Fixture {
        ledger: Arc<MemoryLedger>,
        store: Arc<MemoryStore>,
        ctx: AnchorContext,
        user: AccountSigner,
        coordinator: SwapSettlementCoordinator,
        events: tokio::sync::broadcast::Receiver<EngineEvent>,
    }

    async fn fixture(balance_a: u128, balance_b: u128, settings: SettlementSettings) -> Fixture {
        let ledger = Arc::new(MemoryLedger::new(Network::Test));
        let store = Arc::new(MemoryStore::new());
        let Ok(pool) = PoolAssets::new(asset("AAA"), asset("BBB")) else {
            panic!("valid pool");
        };
        let client: Arc<dyn LedgerClient> = Arc::<MemoryLedger>::clone(&ledger);
        let Ok(ctx) = AnchorContext::new(Network::Test, client, AccountSigner::from_seed(ANCHOR_SEED), pool) else {
            panic!("valid context");
        };
        ledger.set_balance(ctx.address(), &asset("AAA"), Amount::new(balance_a)).await;
        ledger.set_balance(ctx.address(), &asset("BBB"), Amount::new(balance_b)).await;
        let user = AccountSigner::from_seed(USER_SEED);
        ledger.set_balance(user.address(), &asset("AAA"), Amount::new(1_000_000)).await;

        let bus = EventBus::new(64);
        let events = bus.subscribe();
        let log: Arc<dyn SwapLog> = Arc::<MemoryStore>::clone(&store);
        let coordinator = SwapSettlementCoordinator::new(log, bus, settings);
        Fixture {
            ledger,
            store,
            ctx,
            user,
            coordinator,
            events,
        }
    }

    fn intent(f: &Fixture, input: u128) -> SwapIntent {
        SwapIntent {
            network: Network::Test,
            from_asset: asset("AAA"),
            to_asset: asset("BBB"),
            input_amount: Amount::new(input),
            caller: f.user.address().clone(),
            expected_rate: None,
            slippage_tolerance_pct: None,
        }
    }

    fn payment(f: &Fixture, input: u128) -> LedgerTransaction {
        let mut tx = LedgerTransaction::new(
            Network::Test,
            vec![Transfer {
                from: f.user.address().clone(),
                to: f.ctx.address().clone(),
                asset: asset("AAA"),
                amount: Amount::new(input),
            }],
        );
        let Ok(()) = f.user.authorize_leg(&mut tx, 0) else {
            panic!("user signs own leg");
        };
        tx
    }

    fn atomic(f: &Fixture, input: u128) -> SettlementRequest {
        SettlementRequest {
            swap: intent(f, input),
            mode: SettlementMode::Atomic {
                unsigned_tx: payment(f, input),
            },
        }
    }

    async fn pay_first(f: &Fixture, input: u128) -> TxRef {
        let Ok(tx_ref) = f.ledger.submit(&payment(f, input)).await else {
            panic!("user payment accepted");
        };
        tx_ref
    }

    fn trusted(f: &Fixture, input: u128, user_transfer: TxRef) -> SettlementRequest {
        SettlementRequest {
            swap: intent(f, input),
            mode: SettlementMode::TrustedTwoPhase { user_transfer },
        }
    }

    async fn balance(f: &Fixture, who: &AccountAddress, code: &str) -> u128 {
        let Ok(amount) = f.ledger.balance(who, &asset(code)).await else {
            panic!("balance read");
        };
        amount.get()
    }

    #[test]
    fn phase_machine_edges() {
        use SwapPhase::*;
        assert!(Quoted.can_transition_to(Submitted));
        assert!(Submitted.can_transition_to(Settled));
        assert!(Submitted.can_transition_to(Rejected));
        assert!(Quoted.can_transition_to(AwaitingUserTransfer));
        assert!(AwaitingUserTransfer.can_transition_to(Verifying));
        assert!(Verifying.can_transition_to(Failed));
        assert!(!Quoted.can_transition_to(Settled));
        assert!(!Settled.can_transition_to(Submitted));
        assert!(!Rejected.can_transition_to(Quoted));
        assert_eq!(Verifying.failure(), Failed);
        assert_eq!(Submitted.failure(), Rejected);
    }

    #[test]
    fn slippage_check_matches_tolerance() {
        let result = check_slippage(dec!(10.6), dec!(10), dec!(5));
        let Err(GatewayError::SlippageExceeded { current_rate, .. }) = result else {
            panic!("expected slippage rejection");
        };
        assert_eq!(current_rate, dec!(10.6));
        assert!(check_slippage(dec!(10.4), dec!(10), dec!(5)).is_ok());
        assert!(check_slippage(dec!(10.5), dec!(10), dec!(5)).is_ok());
        assert!(check_slippage(dec!(1), dec!(0), dec!(5)).is_err());
    }

    #[tokio::test]
    async fn atomic_swap_settles_both_legs() {
        let mut f = fixture(1_000, 2_000_000, SettlementSettings::default()).await;
        let Ok(receipt) = f.coordinator.settle(&f.ctx, atomic(&f, 10)).await else {
            panic!("settlement failed");
        };
        assert_eq!(receipt.output_amount, Amount::new(19_801));
        assert_eq!(receipt.rate, dec!(2000));
        assert!(receipt.bookkeeping_error.is_none());

        let user = f.user.address().clone();
        let anchor = f.ctx.address().clone();
        assert_eq!(balance(&f, &user, "BBB").await, 19_801);
        assert_eq!(balance(&f, &anchor, "AAA").await, 1_010);
        assert_eq!(balance(&f, &anchor, "BBB").await, 2_000_000 - 19_801);

        let Ok(history) = f.coordinator.history(Network::Test, 10).await else {
            panic!("history");
        };
        assert_eq!(history.len(), 2);

        let Ok(EngineEvent::SwapSettled { output_amount, .. }) = f.events.try_recv() else {
            panic!("expected swap_settled event");
        };
        assert_eq!(output_amount, Amount::new(19_801));
    }

    #[tokio::test]
    async fn cap_boundary_is_inclusive() {
        let f = fixture(1_000, 2_000_000, SettlementSettings::default()).await;
        assert!(f.coordinator.settle(&f.ctx, atomic(&f, 150)).await.is_ok());

        let f = fixture(1_000, 2_000_000, SettlementSettings::default()).await;
        let result = f.coordinator.settle(&f.ctx, atomic(&f, 151)).await;
        let Err(GatewayError::SwapCapExceeded { max_input, .. }) = result else {
            panic!("expected cap rejection");
        };
        assert_eq!(max_input, Amount::new(150));
        assert_eq!(f.ledger.transaction_count().await, 0);
    }

    #[tokio::test]
    async fn atomic_slippage_is_rejected_before_submission() {
        let f = fixture(1_000, 10_600, SettlementSettings::default()).await;
        let mut request = atomic(&f, 10);
        request.swap.expected_rate = Some(dec!(10));
        request.swap.slippage_tolerance_pct = Some(dec!(5));

        let result = f.coordinator.settle(&f.ctx, request).await;
        let Err(GatewayError::SlippageExceeded { current_rate, .. }) = result else {
            panic!("expected slippage rejection");
        };
        assert_eq!(current_rate, dec!(10.6));
        assert_eq!(f.ledger.transaction_count().await, 0);
    }

    #[tokio::test]
    async fn tampered_payment_leg_is_rejected() {
        let f = fixture(1_000, 2_000_000, SettlementSettings::default()).await;
        let mut request = atomic(&f, 10);
        if let SettlementMode::Atomic { unsigned_tx } = &mut request.mode
            && let Some(leg) = unsigned_tx.legs.get_mut(0)
        {
            leg.amount = Amount::new(1);
        }
        assert!(matches!(
            f.coordinator.settle(&f.ctx, request).await,
            Err(GatewayError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn ledger_rejection_moves_nothing() {
        let f = fixture(1_000, 2_000_000, SettlementSettings::default()).await;
        f.ledger.set_balance(f.user.address(), &asset("AAA"), Amount::ZERO).await;

        let result = f.coordinator.settle(&f.ctx, atomic(&f, 10)).await;
        assert!(matches!(result, Err(GatewayError::LedgerRejected(_))));
        let anchor = f.ctx.address().clone();
        assert_eq!(balance(&f, &anchor, "BBB").await, 2_000_000);
    }

    #[tokio::test]
    async fn trusted_swap_prices_against_pre_payment_pool() {
        let f = fixture(1_000, 2_000_000, SettlementSettings::default()).await;
        let tx_ref = pay_first(&f, 10).await;

        let Ok(receipt) = f.coordinator.settle(&f.ctx, trusted(&f, 10, tx_ref)).await else {
            panic!("settlement failed");
        };
        assert_eq!(receipt.mode, "trusted_two_phase");
        assert_eq!(receipt.output_amount, Amount::new(19_801));
        let user = f.user.address().clone();
        assert_eq!(balance(&f, &user, "BBB").await, 19_801);
    }

    #[tokio::test]
    async fn trusted_transfer_settles_once() {
        let f = fixture(1_000, 2_000_000, SettlementSettings::default()).await;
        let tx_ref = pay_first(&f, 10).await;

        assert!(f.coordinator.settle(&f.ctx, trusted(&f, 10, tx_ref.clone())).await.is_ok());
        assert!(matches!(
            f.coordinator.settle(&f.ctx, trusted(&f, 10, tx_ref)).await,
            Err(GatewayError::TransferAlreadySettled(_))
        ));
        let user = f.user.address().clone();
        assert_eq!(balance(&f, &user, "BBB").await, 19_801);
    }

    #[tokio::test]
    async fn atomic_transaction_is_not_a_trusted_payment() {
        let f = fixture(1_000, 2_000_000, SettlementSettings::default()).await;
        let Ok(first) = f.coordinator.settle(&f.ctx, atomic(&f, 10)).await else {
            panic!("atomic swap settles");
        };
        assert!(matches!(
            f.coordinator.settle(&f.ctx, trusted(&f, 10, first.transaction_ref.clone())).await,
            Err(GatewayError::UserTransferFailed(_))
        ));
        let user = f.user.address().clone();
        assert_eq!(balance(&f, &user, "BBB").await, 19_801);
        assert!(matches!(
            f.store.claim_transfer(Network::Test, &first.transaction_ref).await,
            Ok(false)
        ));
    }

    #[tokio::test]
    async fn payment_with_anchor_leg_is_rejected() {
        let f = fixture(1_000, 2_000_000, SettlementSettings::default()).await;
        let mut tx = payment(&f, 10);
        let index = tx.push_leg(Transfer {
            from: f.ctx.address().clone(),
            to: f.user.address().clone(),
            asset: asset("BBB"),
            amount: Amount::new(1),
        });
        let Ok(()) = AccountSigner::from_seed(ANCHOR_SEED).authorize_leg(&mut tx, index) else {
            panic!("anchor signs own leg");
        };
        let Ok(tx_ref) = f.ledger.submit(&tx).await else {
            panic!("combined transaction accepted");
        };

        assert!(matches!(
            f.coordinator.settle(&f.ctx, trusted(&f, 10, tx_ref)).await,
            Err(GatewayError::UserTransferFailed(_))
        ));
        let user = f.user.address().clone();
        assert_eq!(balance(&f, &user, "BBB").await, 1);
    }

    #[tokio::test]
    async fn trusted_mode_ignores_expected_rate() {
        let f = fixture(1_000, 2_000_000, SettlementSettings::default()).await;
        let tx_ref = pay_first(&f, 10).await;
        let mut request = trusted(&f, 10, tx_ref);
        request.swap.expected_rate = Some(dec!(10));
        request.swap.slippage_tolerance_pct = Some(dec!(0.1));

        let Ok(receipt) = f.coordinator.settle(&f.ctx, request).await else {
            panic!("trusted settlement does not check slippage");
        };
        assert_eq!(receipt.rate, dec!(2000));
        assert_eq!(receipt.output_amount, Amount::new(19_801));
    }

    #[tokio::test]
    async fn trusted_transfer_must_match_request() {
        let f = fixture(1_000, 2_000_000, SettlementSettings::default()).await;
        let tx_ref = pay_first(&f, 5).await;
        assert!(matches!(
            f.coordinator.settle(&f.ctx, trusted(&f, 10, tx_ref)).await,
            Err(GatewayError::UserTransferFailed(_))
        ));
    }

    #[tokio::test]
    async fn trusted_pending_transfer_times_out() {
        let settings = SettlementSettings {
            finality_timeout: Duration::from_millis(50),
            poll_interval: Duration::from_millis(10),
            ..SettlementSettings::default()
        };
        let f = fixture(1_000, 2_000_000, settings).await;
        f.ledger.hold_submissions(true).await;
        let tx_ref = pay_first(&f, 10).await;

        assert!(matches!(
            f.coordinator.settle(&f.ctx, trusted(&f, 10, tx_ref.clone())).await,
            Err(GatewayError::SettlementTimeout(_))
        ));

        // Once final, the same transfer can still be settled.
        f.ledger.hold_submissions(false).await;
        let Ok(TxStatus::Final) = f.ledger.finalize(&tx_ref).await else {
            panic!("finalize");
        };
        assert!(f.coordinator.settle(&f.ctx, trusted(&f, 10, tx_ref)).await.is_ok());
    }

    #[tokio::test]
    async fn failed_payout_releases_claim() {
        let f = fixture(1_000, 2_000_000, SettlementSettings::default()).await;
        let tx_ref = pay_first(&f, 10).await;
        f.ledger.reject_next_submission("sequence mismatch").await;

        assert!(matches!(
            f.coordinator.settle(&f.ctx, trusted(&f, 10, tx_ref.clone())).await,
            Err(GatewayError::LedgerRejected(_))
        ));
        assert!(f.coordinator.settle(&f.ctx, trusted(&f, 10, tx_ref)).await.is_ok());
    }

    #[tokio::test]
    async fn unknown_payout_outcome_keeps_claim() {
        let f = fixture(1_000, 2_000_000, SettlementSettings::default()).await;
        let tx_ref = pay_first(&f, 10).await;
        f.ledger.lose_next_acknowledgement().await;

        assert!(matches!(
            f.coordinator.settle(&f.ctx, trusted(&f, 10, tx_ref.clone())).await,
            Err(GatewayError::LedgerNetworkError(_))
        ));
        let user = f.user.address().clone();
        assert_eq!(balance(&f, &user, "BBB").await, 19_801);
        assert!(matches!(
            f.coordinator.settle(&f.ctx, trusted(&f, 10, tx_ref)).await,
            Err(GatewayError::TransferAlreadySettled(_))
        ));
    }

    #[tokio::test]
    async fn unknown_atomic_outcome_is_a_network_error() {
        let f = fixture(1_000, 2_000_000, SettlementSettings::default()).await;
        f.ledger.lose_next_acknowledgement().await;

        assert!(matches!(
            f.coordinator.settle(&f.ctx, atomic(&f, 10)).await,
            Err(GatewayError::LedgerNetworkError(_))
        ));
        let user = f.user.address().clone();
        assert_eq!(balance(&f, &user, "BBB").await, 19_801);
        let Ok(history) = f.coordinator.history(Network::Test, 10).await else {
            panic!("history");
        };
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn swap_log_failure_is_reported_not_raised() {
        let f = fixture(1_000, 2_000_000, SettlementSettings::default()).await;
        f.store.fail_swap_appends(true);

        let Ok(receipt) = f.coordinator.settle(&f.ctx, atomic(&f, 10)).await else {
            panic!("settlement must succeed after the transfer");
        };
        assert!(receipt.bookkeeping_error.is_some());
        let user = f.user.address().clone();
        assert_eq!(balance(&f, &user, "BBB").await, 19_801);
    }

    #[tokio::test]
    async fn empty_pool_is_no_liquidity() {
        let f = fixture(0, 2_000_000, SettlementSettings::default()).await;
        assert!(matches!(
            f.coordinator.settle(&f.ctx, atomic(&f, 10)).await,
            Err(GatewayError::NoLiquidity)
        ));
    }
}

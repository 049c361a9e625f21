//! In-process ledger.
//!
//! [`MemoryLedger`] enforces the same rules a real ledger node does for
//! the engine's purposes: every leg must be signed by its sender,
//! transaction ids cannot be replayed, and all legs of a transaction
//! apply atomically or not at all. It backs the test suite and the
//! `LEDGER_BACKEND=memory` development mode.
//!
//! Test hooks allow holding submissions in `pending` (to exercise
//! finality polling), forcing the next submission to be rejected, and
//! losing the acknowledgement of an applied submission.

use std::collections::{HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{Holding, LedgerClient, LedgerError, LedgerTransaction, TransactionInfo, TxStatus};
use crate::domain::{AccountAddress, Amount, AssetId, Network, TxRef};

/// Ledger state held in memory.
#[derive(Debug)]
pub struct MemoryLedger {
    network: Network,
    state: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    balances: HashMap<(AccountAddress, AssetId), u128>,
    transactions: HashMap<TxRef, TransactionInfo>,
    pending: HashMap<TxRef, LedgerTransaction>,
    seen_ids: HashSet<uuid::Uuid>,
    hold_submissions: bool,
    forced_rejections: VecDeque<String>,
    lose_next_ack: bool,
}

impl MemoryState {
    fn balance(&self, account: &AccountAddress, asset: &AssetId) -> u128 {
        self.balances
            .get(&(account.clone(), asset.clone()))
            .copied()
            .unwrap_or(0)
    }

    /// Applies every leg or none of them.
    fn apply(&mut self, transaction: &LedgerTransaction) -> Result<(), LedgerError> {
        let mut next: HashMap<(AccountAddress, AssetId), u128> = HashMap::new();
        for leg in &transaction.legs {
            let debit_key = (leg.from.clone(), leg.asset.clone());
            let available = next
                .get(&debit_key)
                .copied()
                .unwrap_or_else(|| self.balance(&leg.from, &leg.asset));
            let remaining = available.checked_sub(leg.amount.get()).ok_or_else(|| {
                LedgerError::Rejected(format!(
                    "insufficient balance: {} holds {available} {}, needs {}",
                    leg.from, leg.asset, leg.amount
                ))
            })?;
            next.insert(debit_key, remaining);

            let credit_key = (leg.to.clone(), leg.asset.clone());
            let current = next
                .get(&credit_key)
                .copied()
                .unwrap_or_else(|| self.balance(&leg.to, &leg.asset));
            let credited = current
                .checked_add(leg.amount.get())
                .ok_or_else(|| LedgerError::Rejected("balance overflow".to_string()))?;
            next.insert(credit_key, credited);
        }
        self.balances.extend(next);
        Ok(())
    }
}

impl MemoryLedger {
    /// Creates an empty ledger for `network`.
    #[must_use]
    pub fn new(network: Network) -> Self {
        Self {
            network,
            state: Mutex::new(MemoryState::default()),
        }
    }

    /// Sets the balance of `asset` held by `account`.
    pub async fn set_balance(&self, account: &AccountAddress, asset: &AssetId, amount: Amount) {
        let mut state = self.state.lock().await;
        state
            .balances
            .insert((account.clone(), asset.clone()), amount.get());
    }

    /// Keeps subsequent submissions in `pending` until [`Self::finalize`]
    /// (or releases that behaviour with `false`).
    pub async fn hold_submissions(&self, hold: bool) {
        self.state.lock().await.hold_submissions = hold;
    }

    /// Rejects the next submission with `reason`.
    pub async fn reject_next_submission(&self, reason: &str) {
        self.state
            .lock()
            .await
            .forced_rejections
            .push_back(reason.to_string());
    }

    /// Applies the next submission but answers it with a network error,
    /// as a node that times out after committing would.
    pub async fn lose_next_acknowledgement(&self) {
        self.state.lock().await.lose_next_ack = true;
    }

    /// Applies a pending transaction and returns its final status.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Rejected`] if no pending transaction has the
    /// given reference.
    pub async fn finalize(&self, tx_ref: &TxRef) -> Result<TxStatus, LedgerError> {
        let mut state = self.state.lock().await;
        let transaction = state
            .pending
            .remove(tx_ref)
            .ok_or_else(|| LedgerError::Rejected(format!("no pending transaction {tx_ref}")))?;
        let status = match state.apply(&transaction) {
            Ok(()) => TxStatus::Final,
            Err(e) => TxStatus::Failed(e.to_string()),
        };
        if let Some(info) = state.transactions.get_mut(tx_ref) {
            info.status = status.clone();
        }
        Ok(status)
    }

    /// Number of transactions the ledger has accepted.
    pub async fn transaction_count(&self) -> usize {
        self.state.lock().await.transactions.len()
    }
}

#[async_trait]
impl LedgerClient for MemoryLedger {
    fn network(&self) -> Network {
        self.network
    }

    async fn balance(
        &self,
        account: &AccountAddress,
        asset: &AssetId,
    ) -> Result<Amount, LedgerError> {
        Ok(Amount::new(self.state.lock().await.balance(account, asset)))
    }

    async fn holdings(&self, account: &AccountAddress) -> Result<Vec<Holding>, LedgerError> {
        let state = self.state.lock().await;
        let mut holdings: Vec<Holding> = state
            .balances
            .iter()
            .filter(|((owner, _), amount)| owner == account && **amount > 0)
            .map(|((_, asset), amount)| Holding {
                asset: asset.clone(),
                amount: Amount::new(*amount),
            })
            .collect();
        holdings.sort_by(|a, b| a.asset.cmp(&b.asset));
        Ok(holdings)
    }

    async fn submit(&self, transaction: &LedgerTransaction) -> Result<TxRef, LedgerError> {
        if transaction.network != self.network {
            return Err(LedgerError::Rejected(format!(
                "transaction targets {} but this ledger is {}",
                transaction.network, self.network
            )));
        }
        transaction.verify_authorizations()?;

        let mut state = self.state.lock().await;
        if let Some(reason) = state.forced_rejections.pop_front() {
            return Err(LedgerError::Rejected(reason));
        }
        if !state.seen_ids.insert(transaction.id) {
            return Err(LedgerError::Rejected(format!(
                "duplicate transaction id {}",
                transaction.id
            )));
        }

        let tx_ref = transaction.content_hash();
        if state.hold_submissions {
            state.pending.insert(tx_ref.clone(), transaction.clone());
            state.transactions.insert(
                tx_ref.clone(),
                TransactionInfo {
                    tx_ref: tx_ref.clone(),
                    status: TxStatus::Pending,
                    legs: transaction.legs.clone(),
                },
            );
            return Ok(tx_ref);
        }

        state.apply(transaction)?;
        state.transactions.insert(
            tx_ref.clone(),
            TransactionInfo {
                tx_ref: tx_ref.clone(),
                status: TxStatus::Final,
                legs: transaction.legs.clone(),
            },
        );
        if std::mem::take(&mut state.lose_next_ack) {
            return Err(LedgerError::Network("connection reset after submit".to_string()));
        }
        Ok(tx_ref)
    }

    async fn transaction(&self, tx_ref: &TxRef) -> Result<Option<TransactionInfo>, LedgerError> {
        Ok(self.state.lock().await.transactions.get(tx_ref).cloned())
    }
}

//! Ledger adapter boundary.
//!
//! The engine talks to the ledger network exclusively through the
//! [`LedgerClient`] trait. Adapters translate their wire formats into the
//! typed values of [`crate::domain`] so that the settlement and escrow
//! logic never depends on SDK object shapes.
//!
//! Transactions are lists of transfer legs that the ledger applies
//! atomically. Every leg must be authorized by an ed25519 signature of
//! its `from` account over [`LedgerTransaction::leg_digest`].

pub mod http;
pub mod memory;
pub mod signer;

pub use http::HttpLedger;
pub use memory::MemoryLedger;
pub use signer::AccountSigner;

use std::fmt;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use ed25519_dalek::{Signature, Verifier};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::{AccountAddress, Amount, AssetId, Network, TxRef};

/// Failure reported by a ledger adapter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// Transport or server failure; the request may be retried.
    #[error("{0}")]
    Network(String),
    /// The ledger refused the transaction.
    #[error("{0}")]
    Rejected(String),
    /// A leg lacks a valid authorization from its sender.
    #[error("{0}")]
    Authorization(String),
    /// A payload could not be decoded.
    #[error("{0}")]
    Decode(String),
}

/// A single asset movement inside a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    /// Debited account.
    pub from: AccountAddress,
    /// Credited account.
    pub to: AccountAddress,
    /// Moved asset.
    pub asset: AssetId,
    /// Moved quantity in smallest units.
    pub amount: Amount,
}

/// Signature of one leg by its sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegAuthorization {
    /// Index of the authorized leg.
    pub leg: usize,
    /// Signing account; must equal the leg's `from`.
    pub signer: AccountAddress,
    /// Base64 ed25519 signature over the leg digest.
    pub signature: String,
}

/// Combined ledger transaction: all legs apply or none do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    /// Client-chosen unique id; ledgers reject replays.
    pub id: uuid::Uuid,
    /// Target network.
    pub network: Network,
    /// Transfer legs, applied in order.
    pub legs: Vec<Transfer>,
    /// Per-leg sender authorizations.
    #[serde(default)]
    pub authorizations: Vec<LegAuthorization>,
    /// Optional free-form memo.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
}

impl LedgerTransaction {
    /// Creates an unsigned transaction with a fresh id.
    #[must_use]
    pub fn new(network: Network, legs: Vec<Transfer>) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            network,
            legs,
            authorizations: Vec::new(),
            memo: None,
        }
    }

    /// Sets the memo.
    #[must_use]
    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = Some(memo.into());
        self
    }

    /// Appends a leg and returns its index.
    pub fn push_leg(&mut self, leg: Transfer) -> usize {
        self.legs.push(leg);
        self.legs.len() - 1
    }

    /// Message signed by the sender of leg `index`:
    /// `sha256(json([id, network, index, leg]))`.
    #[must_use]
    pub fn leg_digest(&self, index: usize) -> Option<[u8; 32]> {
        let leg = self.legs.get(index)?;
        let payload = serde_json::to_vec(&(self.id, self.network, index, leg)).ok()?;
        Some(Sha256::digest(&payload).into())
    }

    /// Content hash used as the transaction reference.
    #[must_use]
    pub fn content_hash(&self) -> TxRef {
        let payload = serde_json::to_vec(self).unwrap_or_default();
        TxRef::new(bs58::encode(Sha256::digest(&payload)).into_string())
    }

    /// Checks that leg `index` carries a valid signature of its sender.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Authorization`] if the leg does not exist or
    /// no authorization verifies against the sender's public key.
    pub fn verify_leg(&self, index: usize) -> Result<(), LedgerError> {
        let (Some(leg), Some(digest)) = (self.legs.get(index), self.leg_digest(index)) else {
            return Err(LedgerError::Authorization(format!("leg {index} does not exist")));
        };
        let key = leg
            .from
            .verifying_key()
            .map_err(|e| LedgerError::Authorization(e.to_string()))?;

        let verified = self
            .authorizations
            .iter()
            .filter(|auth| auth.leg == index && auth.signer == leg.from)
            .any(|auth| {
                BASE64
                    .decode(&auth.signature)
                    .ok()
                    .and_then(|bytes| Signature::from_slice(&bytes).ok())
                    .is_some_and(|sig| key.verify(&digest, &sig).is_ok())
            });

        if verified {
            Ok(())
        } else {
            Err(LedgerError::Authorization(format!(
                "leg {index} is not authorized by {}",
                leg.from
            )))
        }
    }

    /// Checks every leg's authorization.
    ///
    /// # Errors
    ///
    /// Returns the first [`LedgerError::Authorization`] encountered, or an
    /// error for a transaction without legs.
    pub fn verify_authorizations(&self) -> Result<(), LedgerError> {
        if self.legs.is_empty() {
            return Err(LedgerError::Rejected("transaction has no legs".to_string()));
        }
        (0..self.legs.len()).try_for_each(|index| self.verify_leg(index))
    }

    /// Decodes a base64-encoded JSON transaction.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Decode`] for invalid base64 or JSON.
    pub fn from_base64(encoded: &str) -> Result<Self, LedgerError> {
        let bytes = BASE64
            .decode(encoded.trim())
            .map_err(|e| LedgerError::Decode(format!("combined transaction is not base64: {e}")))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| LedgerError::Decode(format!("malformed combined transaction: {e}")))
    }

    /// Encodes the transaction as base64 JSON.
    #[must_use]
    pub fn to_base64(&self) -> String {
        BASE64.encode(serde_json::to_vec(self).unwrap_or_default())
    }
}

/// Non-zero balance of an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holding {
    /// Held asset.
    pub asset: AssetId,
    /// Held quantity.
    pub amount: Amount,
}

/// Ledger-side state of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxStatus {
    /// Accepted but not final; may still be dropped.
    Pending,
    /// Irreversibly applied.
    Final,
    /// Will never apply.
    Failed(String),
}

/// Transaction as reported by the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionInfo {
    /// Transaction hash.
    pub tx_ref: TxRef,
    /// Finality status.
    pub status: TxStatus,
    /// Transfer legs.
    pub legs: Vec<Transfer>,
}

impl TransactionInfo {
    /// Returns `true` if the transaction moves exactly `amount` of
    /// `asset` from `from` to `to` in one of its legs.
    #[must_use]
    pub fn contains_transfer(
        &self,
        from: &AccountAddress,
        to: &AccountAddress,
        asset: &AssetId,
        amount: Amount,
    ) -> bool {
        self.legs.iter().any(|leg| {
            &leg.from == from && &leg.to == to && &leg.asset == asset && leg.amount == amount
        })
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Final => f.write_str("final"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Access to one ledger network.
///
/// Implementations must be cheap to share behind an `Arc`; every method is
/// a single network round trip with no retries of its own.
#[async_trait]
pub trait LedgerClient: Send + Sync + fmt::Debug {
    /// Network this client is connected to.
    fn network(&self) -> Network;

    /// Balance of `asset` held by `account` (zero if none).
    async fn balance(&self, account: &AccountAddress, asset: &AssetId)
    -> Result<Amount, LedgerError>;

    /// All non-zero balances of `account`.
    async fn holdings(&self, account: &AccountAddress) -> Result<Vec<Holding>, LedgerError>;

    /// Submits a signed transaction. Resolves once the ledger accepted
    /// (possibly still pending) or rejected it.
    async fn submit(&self, transaction: &LedgerTransaction) -> Result<TxRef, LedgerError>;

    /// Looks up a transaction by reference.
    async fn transaction(&self, tx_ref: &TxRef) -> Result<Option<TransactionInfo>, LedgerError>;
}

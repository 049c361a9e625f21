//! Per-network anchor context.
//!
//! Every engine operation receives the [`AnchorContext`] of its network
//! explicitly: the ledger client to talk to, the anchor's signer and the
//! two fungible assets making up the liquidity pool. Nothing in the
//! engine reaches for a signer through global state.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::{AccountAddress, Amount, AssetId, Network, TxRef};
use crate::error::GatewayError;
use crate::ledger::{AccountSigner, LedgerClient, LedgerError, LedgerTransaction, Transfer};

/// The two fungible assets of the liquidity pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolAssets {
    /// First pool asset (`A`).
    pub asset_a: AssetId,
    /// Second pool asset (`B`).
    pub asset_b: AssetId,
}

impl PoolAssets {
    /// Creates a pool definition.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::ConfigurationError`] if both assets are the
    /// same.
    pub fn new(asset_a: AssetId, asset_b: AssetId) -> Result<Self, GatewayError> {
        if asset_a == asset_b {
            return Err(GatewayError::ConfigurationError(format!(
                "pool assets must differ, both are {asset_a}"
            )));
        }
        Ok(Self { asset_a, asset_b })
    }

    /// Returns `true` if `asset` is one of the pool assets.
    #[must_use]
    pub fn contains(&self, asset: &AssetId) -> bool {
        asset == &self.asset_a || asset == &self.asset_b
    }

    /// Checks that `from → to` is a swap direction of this pool.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRequest`] if either asset is not in
    /// the pool or both are the same.
    pub fn validate_pair(&self, from: &AssetId, to: &AssetId) -> Result<(), GatewayError> {
        if from == to {
            return Err(GatewayError::InvalidRequest(format!(
                "cannot swap {from} for itself"
            )));
        }
        for asset in [from, to] {
            if !self.contains(asset) {
                return Err(GatewayError::InvalidRequest(format!(
                    "asset {asset} is not traded by the pool ({} / {})",
                    self.asset_a, self.asset_b
                )));
            }
        }
        Ok(())
    }
}

/// Everything an engine operation needs to act as the anchor on one
/// network.
#[derive(Debug)]
pub struct AnchorContext {
    /// Network served.
    pub network: Network,
    /// Ledger access.
    pub ledger: Arc<dyn LedgerClient>,
    /// Anchor account signer.
    pub signer: AccountSigner,
    /// Pool definition.
    pub pool: PoolAssets,
}

impl AnchorContext {
    /// Bundles the anchor's collaborators for `network`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::ConfigurationError`] if the ledger client is
    /// connected to a different network.
    pub fn new(
        network: Network,
        ledger: Arc<dyn LedgerClient>,
        signer: AccountSigner,
        pool: PoolAssets,
    ) -> Result<Self, GatewayError> {
        if ledger.network() != network {
            return Err(GatewayError::ConfigurationError(format!(
                "ledger client for {} configured as {network}",
                ledger.network()
            )));
        }
        Ok(Self {
            network,
            ledger,
            signer,
            pool,
        })
    }

    /// The anchor account address.
    #[must_use]
    pub fn address(&self) -> &AccountAddress {
        self.signer.address()
    }

    /// Moves `amount` of `asset` from the anchor to `to` in one signed
    /// single-leg transaction.
    ///
    /// # Errors
    ///
    /// Returns the [`LedgerError`] reported by signing or submission.
    pub async fn transfer_from_anchor(
        &self,
        to: &AccountAddress,
        asset: &AssetId,
        amount: Amount,
        memo: String,
    ) -> Result<TxRef, LedgerError> {
        let mut tx = LedgerTransaction::new(
            self.network,
            vec![Transfer {
                from: self.address().clone(),
                to: to.clone(),
                asset: asset.clone(),
                amount,
            }],
        )
        .with_memo(memo);
        self.signer.authorize_leg(&mut tx, 0)?;
        self.ledger.submit(&tx).await
    }

    /// Anchor balance of `asset`.
    ///
    /// # Errors
    ///
    /// Returns the [`LedgerError`] of the balance read.
    pub async fn custody(&self, asset: &AssetId) -> Result<Amount, LedgerError> {
        self.ledger.balance(self.address(), asset).await
    }
}

/// Anchor contexts of all configured networks.
#[derive(Debug, Clone, Default)]
pub struct NetworkRegistry {
    anchors: BTreeMap<Network, Arc<AnchorContext>>,
}

impl NetworkRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the context of its network.
    pub fn insert(&mut self, context: AnchorContext) {
        self.anchors.insert(context.network, Arc::new(context));
    }

    /// Returns the context of `network`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::ConfigurationError`] if the network has no
    /// anchor configured.
    pub fn get(&self, network: Network) -> Result<Arc<AnchorContext>, GatewayError> {
        self.anchors.get(&network).map(Arc::clone).ok_or_else(|| {
            GatewayError::ConfigurationError(format!("no anchor configured for network {network}"))
        })
    }

    /// Configured networks in order.
    #[must_use]
    pub fn networks(&self) -> Vec<Network> {
        self.anchors.keys().copied().collect()
    }

    /// Returns `true` if no network is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::ledger::MemoryLedger;

    fn asset(code: &str) -> AssetId {
        let Ok(asset) = AssetId::new(code) else {
            panic!("valid asset");
        };
        asset
    }

    fn pool() -> PoolAssets {
        let Ok(pool) = PoolAssets::new(asset("AAA"), asset("BBB")) else {
            panic!("valid pool");
        };
        pool
    }

    #[test]
    fn pool_rejects_identical_assets() {
        assert!(PoolAssets::new(asset("AAA"), asset("AAA")).is_err());
    }

    #[test]
    fn pair_validation() {
        let pool = pool();
        assert!(pool.validate_pair(&asset("AAA"), &asset("BBB")).is_ok());
        assert!(pool.validate_pair(&asset("BBB"), &asset("AAA")).is_ok());
        assert!(pool.validate_pair(&asset("AAA"), &asset("AAA")).is_err());
        assert!(pool.validate_pair(&asset("AAA"), &asset("CCC")).is_err());
    }

    #[test]
    fn context_requires_matching_network() {
        let ledger: Arc<dyn LedgerClient> = Arc::new(MemoryLedger::new(Network::Main));
        let result = AnchorContext::new(
            Network::Test,
            ledger,
            AccountSigner::from_seed([9; 32]),
            pool(),
        );
        assert!(matches!(result, Err(GatewayError::ConfigurationError(_))));
    }

    #[test]
    fn unknown_network_is_configuration_error() {
        let mut registry = NetworkRegistry::new();
        let ledger: Arc<dyn LedgerClient> = Arc::new(MemoryLedger::new(Network::Test));
        let Ok(context) =
            AnchorContext::new(Network::Test, ledger, AccountSigner::from_seed([9; 32]), pool())
        else {
            panic!("valid context");
        };
        registry.insert(context);

        assert!(registry.get(Network::Test).is_ok());
        assert!(matches!(
            registry.get(Network::Main),
            Err(GatewayError::ConfigurationError(_))
        ));
        assert_eq!(registry.networks(), vec![Network::Test]);
    }
}

//! ed25519 account signer.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use ed25519_dalek::{Signer, SigningKey};

use super::{LedgerError, LedgerTransaction, LegAuthorization};
use crate::domain::AccountAddress;

/// Signing key of one ledger account.
///
/// The anchor's signer is handed to engine operations explicitly through
/// [`crate::service::AnchorContext`]; nothing reads it from global state.
pub struct AccountSigner {
    address: AccountAddress,
    key: SigningKey,
}

impl AccountSigner {
    /// Builds a signer from a raw 32-byte seed.
    #[must_use]
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let key = SigningKey::from_bytes(&seed);
        let address = AccountAddress::from_public_key(&key.verifying_key());
        Self { address, key }
    }

    /// Builds a signer from a base64-encoded 32-byte seed.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Decode`] if the seed is not base64 or not
    /// exactly 32 bytes long.
    pub fn from_base64_seed(encoded: &str) -> Result<Self, LedgerError> {
        let bytes = BASE64
            .decode(encoded.trim())
            .map_err(|_| LedgerError::Decode("secret key is not valid base64".to_string()))?;
        let seed: [u8; 32] = bytes.try_into().map_err(|bytes: Vec<u8>| {
            LedgerError::Decode(format!("secret key must be 32 bytes, got {}", bytes.len()))
        })?;
        Ok(Self::from_seed(seed))
    }

    /// Address of the account.
    #[must_use]
    pub fn address(&self) -> &AccountAddress {
        &self.address
    }

    /// Signs leg `index` of `transaction` and records the authorization.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Authorization`] if the leg does not exist or
    /// is not sent by this account.
    pub fn authorize_leg(
        &self,
        transaction: &mut LedgerTransaction,
        index: usize,
    ) -> Result<(), LedgerError> {
        let sender = transaction
            .legs
            .get(index)
            .map(|leg| &leg.from)
            .ok_or_else(|| LedgerError::Authorization(format!("leg {index} does not exist")))?;
        if sender != &self.address {
            return Err(LedgerError::Authorization(format!(
                "leg {index} is sent by {sender}, not by {}",
                self.address
            )));
        }
        let digest = transaction
            .leg_digest(index)
            .ok_or_else(|| LedgerError::Authorization(format!("leg {index} cannot be hashed")))?;
        let signature = self.key.sign(&digest);
        transaction.authorizations.push(LegAuthorization {
            leg: index,
            signer: self.address.clone(),
            signature: BASE64.encode(signature.to_bytes()),
        });
        Ok(())
    }
}

impl fmt::Debug for AccountSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountSigner")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::{Amount, AssetId, Network};
    use crate::ledger::Transfer;

    #[test]
    fn base64_seed_matches_raw_seed() {
        let encoded = BASE64.encode([5u8; 32]);
        let Ok(signer) = AccountSigner::from_base64_seed(&encoded) else {
            panic!("valid seed");
        };
        assert_eq!(signer.address(), AccountSigner::from_seed([5u8; 32]).address());
    }

    #[test]
    fn short_seed_is_rejected() {
        let encoded = BASE64.encode([5u8; 16]);
        assert!(matches!(
            AccountSigner::from_base64_seed(&encoded),
            Err(LedgerError::Decode(_))
        ));
        assert!(AccountSigner::from_base64_seed("not base64!").is_err());
    }

    #[test]
    fn cannot_sign_someone_elses_leg() {
        let (alice, bob) = (AccountSigner::from_seed([1; 32]), AccountSigner::from_seed([2; 32]));
        let Ok(asset) = AssetId::new("AAA") else {
            panic!("valid asset");
        };
        let mut tx = LedgerTransaction::new(
            Network::Test,
            vec![Transfer {
                from: alice.address().clone(),
                to: bob.address().clone(),
                asset,
                amount: Amount::new(1),
            }],
        );
        assert!(bob.authorize_leg(&mut tx, 0).is_err());
        assert!(alice.authorize_leg(&mut tx, 3).is_err());
        assert!(tx.authorizations.is_empty());
    }

    #[test]
    fn debug_hides_key_material() {
        let signer = AccountSigner::from_seed([8; 32]);
        let rendered = format!("{signer:?}");
        assert!(rendered.contains(signer.address().as_str()));
        assert!(!rendered.contains("key"));
    }
}

//! Strongly-typed ledger values produced at the adapter boundary.
//!
//! The engine never handles raw SDK objects: every address, asset code,
//! amount and transaction hash is parsed into one of these newtypes when
//! it enters the gateway (HTTP request, ledger response, database row).

use std::fmt;
use std::str::FromStr;

use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use utoipa::ToSchema;

/// Maximum length of an asset code or NFT token id.
pub const MAX_ASSET_ID_LEN: usize = 128;

/// Failure to parse a domain value from its external representation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseValueError {
    /// The network name is neither `main` nor `test`.
    #[error("unknown network: {0}")]
    Network(String),
    /// The asset id is empty, too long or contains whitespace.
    #[error("malformed asset id: {0:?}")]
    AssetId(String),
    /// The address is not a base58-encoded 32-byte ed25519 public key.
    #[error("malformed address: {0:?}")]
    Address(String),
    /// The amount is not a non-negative integer in smallest units.
    #[error("malformed amount: {0:?}")]
    Amount(String),
}

/// Ledger network the anchor operates on.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// Production network.
    Main,
    /// Test network.
    Test,
}

impl Network {
    /// Every supported network.
    pub const ALL: [Self; 2] = [Self::Main, Self::Test];

    /// Lowercase wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Test => "test",
        }
    }

    /// Suffix used for per-network environment variables.
    #[must_use]
    pub const fn env_suffix(&self) -> &'static str {
        match self {
            Self::Main => "MAIN",
            Self::Test => "TEST",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = ParseValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "main" | "mainnet" => Ok(Self::Main),
            "test" | "testnet" => Ok(Self::Test),
            _ => Err(ParseValueError::Network(s.to_string())),
        }
    }
}

/// Opaque asset code: a fungible asset of the pool or an NFT token id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AssetId(String);

impl AssetId {
    /// Validates and wraps an asset code.
    ///
    /// # Errors
    ///
    /// Returns [`ParseValueError::AssetId`] if the code is empty, longer
    /// than [`MAX_ASSET_ID_LEN`] or contains whitespace.
    pub fn new(code: impl Into<String>) -> Result<Self, ParseValueError> {
        let code = code.into();
        if code.is_empty()
            || code.len() > MAX_ASSET_ID_LEN
            || code.chars().any(char::is_whitespace)
        {
            return Err(ParseValueError::AssetId(code));
        }
        Ok(Self(code))
    }

    /// Returns the asset code.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for AssetId {
    type Err = ParseValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for AssetId {
    type Error = ParseValueError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<AssetId> for String {
    fn from(id: AssetId) -> Self {
        id.0
    }
}

/// Ledger account address: base58 encoding of an ed25519 public key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountAddress(String);

impl AccountAddress {
    /// Parses a base58 address.
    ///
    /// # Errors
    ///
    /// Returns [`ParseValueError::Address`] if the string does not decode
    /// to a valid 32-byte ed25519 public key.
    pub fn parse(s: &str) -> Result<Self, ParseValueError> {
        let address = Self(s.to_string());
        address.verifying_key()?;
        Ok(address)
    }

    /// Derives the address of an ed25519 public key.
    #[must_use]
    pub fn from_public_key(key: &VerifyingKey) -> Self {
        Self(bs58::encode(key.as_bytes()).into_string())
    }

    /// Decodes the public key behind this address.
    ///
    /// # Errors
    ///
    /// Returns [`ParseValueError::Address`] if the address is not a valid
    /// encoded public key.
    pub fn verifying_key(&self) -> Result<VerifyingKey, ParseValueError> {
        let bytes = bs58::decode(&self.0)
            .into_vec()
            .map_err(|_| ParseValueError::Address(self.0.clone()))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| ParseValueError::Address(self.0.clone()))?;
        VerifyingKey::from_bytes(&bytes).map_err(|_| ParseValueError::Address(self.0.clone()))
    }

    /// Returns the base58 string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for AccountAddress {
    type Err = ParseValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for AccountAddress {
    type Error = ParseValueError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<AccountAddress> for String {
    fn from(address: AccountAddress) -> Self {
        address.0
    }
}

/// Quantity of an asset in its smallest unit.
///
/// Serialized as a decimal string so that `u128` values survive JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Amount(u128);

impl Amount {
    /// The zero amount.
    pub const ZERO: Self = Self(0);

    /// Wraps a raw smallest-unit quantity.
    #[must_use]
    pub const fn new(value: u128) -> Self {
        Self(value)
    }

    /// Returns the raw smallest-unit quantity.
    #[must_use]
    pub const fn get(&self) -> u128 {
        self.0
    }

    /// Returns `true` for the zero amount.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checked addition.
    #[must_use]
    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    /// Checked subtraction.
    #[must_use]
    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Amount {
    type Err = ParseValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u128>()
            .map(Self)
            .map_err(|_| ParseValueError::Amount(s.to_string()))
    }
}

impl From<u128> for Amount {
    fn from(value: u128) -> Self {
        Self(value)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(u64),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
            Raw::Number(n) => Ok(Self(u128::from(n))),
        }
    }
}

/// Reference (hash) of a ledger transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxRef(String);

impl TxRef {
    const UNKNOWN: &'static str = "unknown";

    /// Wraps a transaction hash. Blank hashes become [`TxRef::unknown`].
    #[must_use]
    pub fn new(hash: impl Into<String>) -> Self {
        let hash = hash.into();
        if hash.trim().is_empty() {
            Self::unknown()
        } else {
            Self(hash)
        }
    }

    /// Placeholder for a transaction the ledger accepted without
    /// returning a recoverable hash.
    #[must_use]
    pub fn unknown() -> Self {
        Self(Self::UNKNOWN.to_string())
    }

    /// Returns `true` if the hash could not be recovered.
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        self.0 == Self::UNKNOWN
    }

    /// Returns the hash string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

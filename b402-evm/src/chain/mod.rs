//! EVM chain primitives, providers, and nonce discipline.
//!
//! - [`Eip155ChainReference`] — a numeric EVM chain id (e.g. 84532)
//! - [`TokenAmount`] — a `U256` amount that travels as a decimal string
//! - [`Eip155ChainProvider`] — the per-chain RPC facade used for reads,
//!   settlement submissions, and bridge burns
//! - [`PendingNonceManager`] — strictly monotonic nonce issuance per signer

pub mod nonce;
pub mod provider;

pub use nonce::PendingNonceManager;
pub use provider::{
    ChainTimeouts, Eip155ChainProvider, Eip155SettlementProvider, MetaTransaction,
    TransactionSendError,
};

use alloy_primitives::U256;
use b402::chain::ChainId;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A numeric EIP-155 chain id (e.g. `84532` for Base Sepolia).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Eip155ChainReference(u64);

impl Eip155ChainReference {
    /// Creates a chain reference from a raw numeric chain id.
    #[must_use]
    pub const fn new(chain_id: u64) -> Self {
        Self(chain_id)
    }

    /// Returns the raw numeric chain id.
    #[must_use]
    pub const fn inner(&self) -> u64 {
        self.0
    }

    /// Returns the CAIP-2 identifier for this chain.
    #[must_use]
    pub fn as_chain_id(&self) -> ChainId {
        ChainId::eip155(self.0)
    }

    /// Parses a CAIP-2 identifier into a chain reference.
    ///
    /// Returns `None` unless the namespace is `eip155` with a numeric
    /// reference.
    #[must_use]
    pub fn from_chain_id(chain_id: &ChainId) -> Option<Self> {
        chain_id.as_eip155().map(Self)
    }
}

impl fmt::Display for Eip155ChainReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Eip155ChainReference> for ChainId {
    fn from(value: Eip155ChainReference) -> Self {
        value.as_chain_id()
    }
}

/// A token amount in atomic units, serialized as a decimal string.
///
/// ERC-20 amounts exceed what JSON numbers can carry, so the wire format is
/// a string (`"10000"` for 0.01 USDC at 6 decimals).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TokenAmount(U256);

impl TokenAmount {
    /// Returns the inner `U256` value.
    #[must_use]
    pub const fn inner(&self) -> U256 {
        self.0
    }
}

impl From<U256> for TokenAmount {
    fn from(value: U256) -> Self {
        Self(value)
    }
}

impl From<u64> for TokenAmount {
    fn from(value: u64) -> Self {
        Self(U256::from(value))
    }
}

impl From<TokenAmount> for U256 {
    fn from(value: TokenAmount) -> Self {
        value.0
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TokenAmount {
    type Err = alloy_primitives::ruint::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        U256::from_str_radix(s, 10).map(Self)
    }
}

impl Serialize for TokenAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for TokenAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_reference_caip2_round_trip() {
        let chain = Eip155ChainReference::new(84532);
        let caip2 = chain.as_chain_id();
        assert_eq!(caip2.to_string(), "eip155:84532");
        assert_eq!(Eip155ChainReference::from_chain_id(&caip2), Some(chain));
    }

    #[test]
    fn token_amount_decimal_serde() {
        let amount: TokenAmount = "10000".parse().unwrap();
        assert_eq!(amount.inner(), U256::from(10_000u64));
        assert_eq!(serde_json::to_string(&amount).unwrap(), "\"10000\"");
        assert!(serde_json::from_str::<TokenAmount>("\"0x10\"").is_err());
    }
}

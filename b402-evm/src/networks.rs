//! USDC deployments on supported EVM networks.
//!
//! The facilitator only moves USDC. This table is the strict per-chain
//! allowlist backing asset checks: an address is USDC on a chain iff it
//! appears here for that chain.
//!
//! Source: <https://developers.circle.com/stablecoins/usdc-contract-addresses>

use alloy_primitives::{address, Address};

use crate::chain::Eip155ChainReference;

/// A USDC deployment: chain, contract address, and its EIP-712 identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsdcDeployment {
    /// The chain the contract is deployed on.
    pub chain: Eip155ChainReference,
    /// The token contract address.
    pub address: Address,
    /// Token decimals (6 for every USDC deployment).
    pub decimals: u8,
    /// EIP-712 domain name the contract signs under.
    pub eip712_name: &'static str,
    /// EIP-712 domain version the contract signs under.
    pub eip712_version: &'static str,
}

/// All USDC deployments this facilitator knows.
#[must_use]
pub fn usdc_deployments() -> Vec<UsdcDeployment> {
    vec![
        UsdcDeployment {
            chain: Eip155ChainReference::new(1),
            address: address!("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"),
            decimals: 6,
            eip712_name: "USD Coin",
            eip712_version: "2",
        },
        UsdcDeployment {
            chain: Eip155ChainReference::new(11_155_111),
            address: address!("0x1c7D4B196Cb0C7B01d743Fbc6116a902379C7238"),
            decimals: 6,
            eip712_name: "USDC",
            eip712_version: "2",
        },
        UsdcDeployment {
            chain: Eip155ChainReference::new(8453),
            address: address!("0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"),
            decimals: 6,
            eip712_name: "USD Coin",
            eip712_version: "2",
        },
        UsdcDeployment {
            chain: Eip155ChainReference::new(84_532),
            address: address!("0x036CbD53842c5426634e7929541eC2318f3dCF7e"),
            decimals: 6,
            eip712_name: "USDC",
            eip712_version: "2",
        },
        UsdcDeployment {
            chain: Eip155ChainReference::new(137),
            address: address!("0x3c499c542cEF5E3811e1192ce70d8cC03d5c3359"),
            decimals: 6,
            eip712_name: "USD Coin",
            eip712_version: "2",
        },
        UsdcDeployment {
            chain: Eip155ChainReference::new(80_002),
            address: address!("0x41E94Eb019C0762f9Bfcf9Fb1E58725BfB0e7582"),
            decimals: 6,
            eip712_name: "USDC",
            eip712_version: "2",
        },
        UsdcDeployment {
            chain: Eip155ChainReference::new(42_161),
            address: address!("0xaf88d065e77c8cC2239327C5EDb3A432268e5831"),
            decimals: 6,
            eip712_name: "USD Coin",
            eip712_version: "2",
        },
        UsdcDeployment {
            chain: Eip155ChainReference::new(421_614),
            address: address!("0x75faf114eafb1BDbe2F0316DF893fd58CE46AA4d"),
            decimals: 6,
            eip712_name: "USDC",
            eip712_version: "2",
        },
    ]
}

/// Looks up the USDC deployment for a chain.
#[must_use]
pub fn usdc_on_chain(chain: Eip155ChainReference) -> Option<UsdcDeployment> {
    usdc_deployments().into_iter().find(|d| d.chain == chain)
}

/// Returns `true` iff `asset` is the USDC contract on `chain`.
///
/// Comparison is case-insensitive by construction: addresses are compared
/// as 20-byte values, not strings.
#[must_use]
pub fn is_usdc(chain: Eip155ChainReference, asset: Address) -> bool {
    usdc_on_chain(chain).is_some_and(|d| d.address == asset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn base_sepolia_usdc_is_allowlisted() {
        let chain = Eip155ChainReference::new(84_532);
        let usdc = Address::from_str("0x036cbd53842c5426634e7929541ec2318f3dcf7e").unwrap();
        assert!(is_usdc(chain, usdc));
    }

    #[test]
    fn unknown_token_is_rejected() {
        let chain = Eip155ChainReference::new(84_532);
        let other = Address::from_str("0x0000000000000000000000000000000000000001").unwrap();
        assert!(!is_usdc(chain, other));
    }

    #[test]
    fn usdc_on_one_chain_is_not_usdc_on_another() {
        let base_usdc = Address::from_str("0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913").unwrap();
        assert!(is_usdc(Eip155ChainReference::new(8453), base_usdc));
        assert!(!is_usdc(Eip155ChainReference::new(1), base_usdc));
    }
}

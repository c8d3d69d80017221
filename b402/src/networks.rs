//! Well-known EVM network names.
//!
//! Maps human-readable network names to CAIP-2 identifiers. The wire format
//! only ever uses CAIP-2; the names exist for configuration and logs.

use crate::chain::ChainId;

/// A well-known network: readable name plus CAIP-2 components.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkInfo {
    /// Human-readable network name.
    pub name: &'static str,
    /// CAIP-2 namespace.
    pub namespace: &'static str,
    /// CAIP-2 reference.
    pub reference: &'static str,
}

impl NetworkInfo {
    /// Returns the CAIP-2 chain ID for this network.
    #[must_use]
    pub fn chain_id(&self) -> ChainId {
        ChainId::new(self.namespace, self.reference)
    }
}

/// Well-known EVM (EIP-155) networks.
///
/// Source: <https://developers.circle.com/stablecoins/usdc-contract-addresses>
pub static EVM_NETWORKS: &[NetworkInfo] = &[
    NetworkInfo {
        name: "ethereum",
        namespace: "eip155",
        reference: "1",
    },
    NetworkInfo {
        name: "ethereum-sepolia",
        namespace: "eip155",
        reference: "11155111",
    },
    NetworkInfo {
        name: "base",
        namespace: "eip155",
        reference: "8453",
    },
    NetworkInfo {
        name: "base-sepolia",
        namespace: "eip155",
        reference: "84532",
    },
    NetworkInfo {
        name: "polygon",
        namespace: "eip155",
        reference: "137",
    },
    NetworkInfo {
        name: "polygon-amoy",
        namespace: "eip155",
        reference: "80002",
    },
    NetworkInfo {
        name: "arbitrum",
        namespace: "eip155",
        reference: "42161",
    },
    NetworkInfo {
        name: "arbitrum-sepolia",
        namespace: "eip155",
        reference: "421614",
    },
];

/// Looks up the chain ID for a well-known network name.
#[must_use]
pub fn chain_id_by_name(name: &str) -> Option<ChainId> {
    EVM_NETWORKS
        .iter()
        .find(|n| n.name == name)
        .map(NetworkInfo::chain_id)
}

/// Looks up the well-known name for a chain ID.
#[must_use]
pub fn name_by_chain_id(chain_id: &ChainId) -> Option<&'static str> {
    EVM_NETWORKS
        .iter()
        .find(|n| n.namespace == chain_id.namespace() && n.reference == chain_id.reference())
        .map(|n| n.name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_lookup_round_trips() {
        let chain_id = chain_id_by_name("base-sepolia").unwrap();
        assert_eq!(chain_id, ChainId::eip155(84532));
        assert_eq!(name_by_chain_id(&chain_id), Some("base-sepolia"));
    }

    #[test]
    fn unknown_name_is_none() {
        assert!(chain_id_by_name("hyperspace").is_none());
    }
}

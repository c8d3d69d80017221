//! EIP-712 domain reconstruction.
//!
//! The facilitator must sign-check against the exact domain the token
//! contract uses, and tokens disagree on which fields that domain contains.
//! The merchant's `extra` supplies `name`/`version` and may pin the field
//! set with an EIP-5267 bitmask; without a pin, the canonical field set is
//! tried first and a published list of alternatives is probed against the
//! token's on-chain `DOMAIN_SEPARATOR()`.
//!
//! Probing happens at most once per (chain, token): successful domains are
//! cached for the lifetime of the facilitator.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Mutex;

use alloy_primitives::{Address, B256, U256};
use alloy_sol_types::Eip712Domain;

use crate::chain::Eip155ChainReference;
use crate::exact::types::{DomainOverride, PaymentRequirementsExtra};

/// EIP-5267 domain field flags.
pub mod fields {
    /// The domain contains `name`.
    pub const NAME: u8 = 0x01;
    /// The domain contains `version`.
    pub const VERSION: u8 = 0x02;
    /// The domain contains `chainId`.
    pub const CHAIN_ID: u8 = 0x04;
    /// The domain contains `verifyingContract`.
    pub const VERIFYING_CONTRACT: u8 = 0x08;
    /// The domain contains `salt`.
    pub const SALT: u8 = 0x10;

    /// The canonical field set: `{name, version, chainId, verifyingContract}`.
    pub const CANONICAL: u8 = NAME | VERSION | CHAIN_ID | VERIFYING_CONTRACT;
    /// Salt-based tokens: `{name, version, verifyingContract, salt}` — the
    /// chain id moves into the salt instead of the `chainId` field.
    pub const SALTED: u8 = NAME | VERSION | VERIFYING_CONTRACT | SALT;
}

/// Field sets probed, in order, when the merchant pinned nothing and the
/// canonical domain does not reproduce the token's separator.
pub const PROBE_FIELD_SETS: &[u8] = &[
    fields::CANONICAL,
    fields::SALTED,
    // Tokens without a version field.
    fields::NAME | fields::CHAIN_ID | fields::VERIFYING_CONTRACT,
    // Tokens without a verifying contract (domain bound by name alone).
    fields::NAME | fields::VERSION | fields::CHAIN_ID,
];

/// Builds an EIP-712 domain containing exactly the flagged fields.
///
/// When the salt flag is set and no explicit salt was provided, the chain id
/// left-padded to 32 bytes is used — the convention of salt-based tokens
/// that key their domain to the chain via the salt.
#[must_use]
pub fn build_domain(
    field_set: u8,
    name: &str,
    version: &str,
    chain: Eip155ChainReference,
    asset: Address,
    override_: Option<&DomainOverride>,
) -> Eip712Domain {
    let chain_id = override_
        .and_then(|o| o.chain_id)
        .unwrap_or_else(|| chain.inner());
    let salt = override_
        .and_then(|o| o.salt)
        .unwrap_or_else(|| B256::from(U256::from(chain_id)));

    Eip712Domain::new(
        (field_set & fields::NAME != 0).then(|| Cow::Owned(name.to_owned())),
        (field_set & fields::VERSION != 0).then(|| Cow::Owned(version.to_owned())),
        (field_set & fields::CHAIN_ID != 0).then(|| U256::from(chain_id)),
        (field_set & fields::VERIFYING_CONTRACT != 0).then_some(asset),
        (field_set & fields::SALT != 0).then_some(salt),
    )
}

/// Returns the field set to use for the given merchant hints.
///
/// With an explicit `fields` bitmask, exactly that set. Without one, the
/// canonical set — unless a salt was provided, in which case the salted set
/// with no `chainId` field.
#[must_use]
pub fn field_set_for(extra: &PaymentRequirementsExtra) -> u8 {
    match &extra.domain {
        Some(DomainOverride {
            fields: Some(mask), ..
        }) => *mask,
        Some(DomainOverride { salt: Some(_), .. }) => fields::SALTED,
        _ => fields::CANONICAL,
    }
}

/// Cache of resolved domains, keyed by token address.
///
/// One cache per facilitator instance, which is per chain, so the key does
/// not need the chain component.
#[derive(Debug, Default)]
pub struct DomainCache(Mutex<HashMap<Address, Eip712Domain>>);

impl DomainCache {
    /// Returns the cached domain for `asset`, if resolved before.
    #[must_use]
    pub fn get(&self, asset: &Address) -> Option<Eip712Domain> {
        self.0.lock().ok()?.get(asset).cloned()
    }

    /// Records the resolved domain for `asset`.
    pub fn insert(&self, asset: Address, domain: Eip712Domain) {
        if let Ok(mut cache) = self.0.lock() {
            cache.insert(asset, domain);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    const ASSET: Address = address!("0x036CbD53842c5426634e7929541eC2318f3dCF7e");

    fn extra(domain: Option<DomainOverride>) -> PaymentRequirementsExtra {
        PaymentRequirementsExtra {
            name: Some("USDC".into()),
            version: Some("2".into()),
            domain,
        }
    }

    #[test]
    fn canonical_set_without_hints() {
        assert_eq!(field_set_for(&extra(None)), fields::CANONICAL);
    }

    #[test]
    fn salt_hint_without_bitmask_switches_to_salted_set() {
        let hint = DomainOverride {
            fields: None,
            chain_id: None,
            salt: Some(B256::repeat_byte(0x42)),
        };
        assert_eq!(field_set_for(&extra(Some(hint))), fields::SALTED);
    }

    #[test]
    fn explicit_bitmask_wins_over_salt_presence() {
        let hint = DomainOverride {
            fields: Some(fields::NAME | fields::CHAIN_ID | fields::VERIFYING_CONTRACT),
            chain_id: None,
            salt: Some(B256::repeat_byte(0x42)),
        };
        assert_eq!(
            field_set_for(&extra(Some(hint))),
            fields::NAME | fields::CHAIN_ID | fields::VERIFYING_CONTRACT
        );
    }

    #[test]
    fn bitmask_controls_domain_contents() {
        let chain = Eip155ChainReference::new(84_532);
        let canonical = build_domain(fields::CANONICAL, "USDC", "2", chain, ASSET, None);
        assert!(canonical.chain_id.is_some());
        assert!(canonical.salt.is_none());

        let salted = build_domain(fields::SALTED, "USDC", "2", chain, ASSET, None);
        assert!(salted.chain_id.is_none());
        assert_eq!(salted.salt, Some(B256::from(U256::from(84_532u64))));

        // Different field sets hash to different separators.
        assert_ne!(canonical.hash_struct(), salted.hash_struct());
    }

    #[test]
    fn explicit_salt_is_used_verbatim() {
        let chain = Eip155ChainReference::new(84_532);
        let hint = DomainOverride {
            fields: Some(fields::SALTED),
            chain_id: None,
            salt: Some(B256::repeat_byte(0x42)),
        };
        let domain = build_domain(fields::SALTED, "USDC", "2", chain, ASSET, Some(&hint));
        assert_eq!(domain.salt, Some(B256::repeat_byte(0x42)));
    }

    #[test]
    fn cache_round_trip() {
        let cache = DomainCache::default();
        assert!(cache.get(&ASSET).is_none());
        let chain = Eip155ChainReference::new(84_532);
        let domain = build_domain(fields::CANONICAL, "USDC", "2", chain, ASSET, None);
        cache.insert(ASSET, domain.clone());
        assert_eq!(
            cache.get(&ASSET).map(|d| d.hash_struct()),
            Some(domain.hash_struct())
        );
    }
}

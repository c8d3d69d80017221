//! Wire types for the EIP-155 exact scheme.
//!
//! An exact payment carries an [`Eip3009Authorization`] plus its EIP-712
//! signature. The merchant's requirements carry the token's EIP-712 domain
//! hints in `extra`, including the optional EIP-5267 field bitmask for
//! tokens with non-standard domains.

use alloy_primitives::{Address, B256, Bytes};
use alloy_sol_types::sol;
use b402::proto;
use b402::UnixTimestamp;
use serde::{Deserialize, Serialize};

use super::ExactScheme;
use crate::chain::TokenAmount;

/// The structured authorization data the buyer signed.
#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Eip3009Authorization {
    /// The address authorizing the transfer (token owner).
    pub from: Address,
    /// The recipient of the transfer.
    pub to: Address,
    /// The amount to transfer, in atomic units.
    pub value: TokenAmount,
    /// Not valid before this timestamp (inclusive).
    pub valid_after: UnixTimestamp,
    /// Expires at this timestamp (exclusive).
    pub valid_before: UnixTimestamp,
    /// Fresh 32-byte random nonce. Not an account nonce: the token contract
    /// records it per authorizer, which is what prevents replay.
    pub nonce: B256,
}

/// The scheme-specific payload of an exact payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Eip3009Payload {
    /// The signature over the authorization. EOA (64-65 bytes), ERC-1271
    /// contract signature, or an EIP-6492 deploy-wrapped signature.
    pub signature: Bytes,
    /// The authorization data that was signed.
    pub authorization: Eip3009Authorization,
}

/// Optional overrides for the token's EIP-712 domain shape.
///
/// Most tokens use the canonical `{name, version, chainId,
/// verifyingContract}` domain; some replace `chainId` with a `salt`, and
/// EIP-5267-aware merchants can pin the exact field set with `fields`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainOverride {
    /// EIP-5267 field bitmask: 0x01 name, 0x02 version, 0x04 chainId,
    /// 0x08 verifyingContract, 0x10 salt. When present, exactly these
    /// fields go into the domain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<u8>,
    /// Chain id to use in the domain, when it differs from the network's.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
    /// Domain salt for salt-based tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<B256>,
}

/// Extra payment requirements data for the exact scheme.
///
/// `name` and `version` are optional at the parsing layer so their absence
/// can surface as `missing_eip712_domain` instead of a generic format
/// error; verification requires both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirementsExtra {
    /// The token's EIP-712 domain name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// The token's EIP-712 domain version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Optional domain shape override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<DomainOverride>,
}

/// Typed payment requirements for the exact scheme.
pub type PaymentRequirements =
    proto::PaymentRequirements<ExactScheme, TokenAmount, Address, PaymentRequirementsExtra>;

/// Typed payment payload for the exact scheme.
pub type PaymentPayload = proto::PaymentPayload<PaymentRequirements, Eip3009Payload>;

/// Typed request body for exact verify and settle operations.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExactRequest {
    /// The buyer's signed payload.
    pub payment_payload: PaymentPayload,
    /// The merchant's requirements.
    pub payment_requirements: PaymentRequirements,
}

sol!(
    /// EIP-712 struct for ERC-3009 `transferWithAuthorization`.
    ///
    /// Reconstructed on the facilitator side to recompute the typed-data
    /// hash the buyer signed.
    #[derive(Serialize, Deserialize)]
    struct TransferWithAuthorization {
        address from;
        address to;
        uint256 value;
        uint256 validAfter;
        uint256 validBefore;
        bytes32 nonce;
    }
);

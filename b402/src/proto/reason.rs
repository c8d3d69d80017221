//! Stable machine-readable failure reasons.
//!
//! Every verification or settlement failure surfaces one of these codes in
//! `invalidReason` / `errorReason`. The strings are part of the wire
//! contract: clients branch on them, so variants are append-only and the
//! serialized form never changes.

use serde::{Deserialize, Serialize};

/// Machine-readable reason for a failed verify or settle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum FailureReason {
    /// No handler is registered for the requested scheme or network.
    UnsupportedScheme,
    /// The payload's accepted network differs from the requirements network.
    NetworkMismatch,
    /// The requirements lack the EIP-712 `name`/`version` domain hints.
    MissingEip712Domain,
    /// The request body does not decode into the scheme's payload shape.
    InvalidPayloadFormat,
    /// The reconstructed EIP-712 domain separator does not match the token's.
    DomainSeparatorMismatch,
    /// Signature does not verify against the reconstructed typed data.
    InvalidExactEvmPayloadSignature,
    /// `authorization.to` differs from the required recipient.
    InvalidExactEvmPayloadRecipientMismatch,
    /// The authorization expires too soon (`validBefore` bound).
    InvalidExactEvmPayloadAuthorizationValidBefore,
    /// The authorization is not yet valid (`validAfter` bound).
    InvalidExactEvmPayloadAuthorizationValidAfter,
    /// The authorized value does not cover the required amount.
    InvalidExactEvmPayloadAuthorizationValue,
    /// The payer's on-chain token balance cannot cover the amount.
    InsufficientFunds,
    /// The settlement transaction was mined but reverted.
    InvalidTransactionState,
    /// The settlement transaction could not be executed (e.g. replayed nonce).
    TransactionFailed,
    /// Cross-chain scheme without a well-formed `cross-chain` extension.
    MissingCrossChainExtension,
    /// The extension's destination recipient is not a valid address.
    InvalidDestinationPayTo,
    /// The bridge provider does not serve this source/destination pair.
    UnsupportedChainPair,
    /// The source asset is not USDC on the source chain.
    UnsupportedSourceAsset,
    /// The destination asset is not USDC on the destination chain.
    UnsupportedDestinationAsset,
    /// Cross-chain requirements must pay the facilitator on the source chain.
    InvalidSourcePayTo,
    /// The bridge provider reports insufficient liquidity for the amount.
    InsufficientBridgeLiquidity,
    /// Differing assets with a non-positive exchange rate.
    InvalidExchangeRate,
    /// Bridging is disabled by configuration.
    CrossChainDisabled,
    /// An internal error that does not map to a protocol reason.
    UnexpectedError,
}

impl FailureReason {
    /// Returns the stable wire string for this reason.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnsupportedScheme => "unsupported_scheme",
            Self::NetworkMismatch => "network_mismatch",
            Self::MissingEip712Domain => "missing_eip712_domain",
            Self::InvalidPayloadFormat => "invalid_payload_format",
            Self::DomainSeparatorMismatch => "domain_separator_mismatch",
            Self::InvalidExactEvmPayloadSignature => "invalid_exact_evm_payload_signature",
            Self::InvalidExactEvmPayloadRecipientMismatch => {
                "invalid_exact_evm_payload_recipient_mismatch"
            }
            Self::InvalidExactEvmPayloadAuthorizationValidBefore => {
                "invalid_exact_evm_payload_authorization_valid_before"
            }
            Self::InvalidExactEvmPayloadAuthorizationValidAfter => {
                "invalid_exact_evm_payload_authorization_valid_after"
            }
            Self::InvalidExactEvmPayloadAuthorizationValue => {
                "invalid_exact_evm_payload_authorization_value"
            }
            Self::InsufficientFunds => "insufficient_funds",
            Self::InvalidTransactionState => "invalid_transaction_state",
            Self::TransactionFailed => "transaction_failed",
            Self::MissingCrossChainExtension => "missing_cross_chain_extension",
            Self::InvalidDestinationPayTo => "invalid_destination_pay_to",
            Self::UnsupportedChainPair => "unsupported_chain_pair",
            Self::UnsupportedSourceAsset => "unsupported_source_asset",
            Self::UnsupportedDestinationAsset => "unsupported_destination_asset",
            Self::InvalidSourcePayTo => "invalid_source_pay_to",
            Self::InsufficientBridgeLiquidity => "insufficient_bridge_liquidity",
            Self::InvalidExchangeRate => "invalid_exchange_rate",
            Self::CrossChainDisabled => "cross_chain_disabled",
            Self::UnexpectedError => "unexpected_error",
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_matches_as_str() {
        // Serde's snake_case rename and as_str() must never diverge: both
        // are read by clients.
        let all = [
            FailureReason::UnsupportedScheme,
            FailureReason::NetworkMismatch,
            FailureReason::MissingEip712Domain,
            FailureReason::InvalidPayloadFormat,
            FailureReason::DomainSeparatorMismatch,
            FailureReason::InvalidExactEvmPayloadSignature,
            FailureReason::InvalidExactEvmPayloadRecipientMismatch,
            FailureReason::InvalidExactEvmPayloadAuthorizationValidBefore,
            FailureReason::InvalidExactEvmPayloadAuthorizationValidAfter,
            FailureReason::InvalidExactEvmPayloadAuthorizationValue,
            FailureReason::InsufficientFunds,
            FailureReason::InvalidTransactionState,
            FailureReason::TransactionFailed,
            FailureReason::MissingCrossChainExtension,
            FailureReason::InvalidDestinationPayTo,
            FailureReason::UnsupportedChainPair,
            FailureReason::UnsupportedSourceAsset,
            FailureReason::UnsupportedDestinationAsset,
            FailureReason::InvalidSourcePayTo,
            FailureReason::InsufficientBridgeLiquidity,
            FailureReason::InvalidExchangeRate,
            FailureReason::CrossChainDisabled,
            FailureReason::UnexpectedError,
        ];
        for reason in all {
            let json = serde_json::to_string(&reason).unwrap();
            assert_eq!(json, format!("\"{}\"", reason.as_str()));
            let back: FailureReason = serde_json::from_str(&json).unwrap();
            assert_eq!(back, reason);
        }
    }

    #[test]
    fn temporal_reasons_use_full_prefix() {
        assert_eq!(
            FailureReason::InvalidExactEvmPayloadAuthorizationValidBefore.as_str(),
            "invalid_exact_evm_payload_authorization_valid_before"
        );
    }
}

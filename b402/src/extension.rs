//! The `cross-chain` payment extension.
//!
//! A merchant that wants settlement on a different chain than the buyer pays
//! on declares this extension inside the payment requirements. The buyer's
//! wallet copies it into the payment payload; the facilitator extracts it to
//! decide where bridged funds should land.
//!
//! Absence of the extension means a same-chain payment — extraction returns
//! `None` and the caller decides what that implies for its scheme.

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::chain::{ChainId, EIP155_NAMESPACE};
use crate::proto::{Extensions, PaymentPayload};

/// Extension key under which routing directives travel.
pub const CROSS_CHAIN_EXTENSION_KEY: &str = "cross-chain";

/// Destination-chain routing directives carried inside a payment payload.
///
/// All three fields are mandatory when the extension is present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossChainExtensionInfo {
    /// CAIP-2 identifier of the chain the merchant receives on.
    pub destination_network: ChainId,
    /// Token contract address on the destination chain.
    pub destination_asset: Address,
    /// Merchant address on the destination chain.
    pub destination_pay_to: Address,
}

/// Declares the cross-chain extension for inclusion in payment requirements.
///
/// The declared value carries both the routing data and a JSON schema
/// describing its shape, so clients can validate before signing.
#[must_use]
pub fn declare_cross_chain_extension(info: &CrossChainExtensionInfo) -> serde_json::Value {
    serde_json::json!({
        "info": info,
        "schema": {
            "type": "object",
            "required": ["destinationNetwork", "destinationAsset", "destinationPayTo"],
            "properties": {
                "destinationNetwork": {
                    "type": "string",
                    "pattern": "^eip155:\\d+$",
                },
                "destinationAsset": {
                    "type": "string",
                    "pattern": "^0x[0-9a-fA-F]{40}$",
                },
                "destinationPayTo": {
                    "type": "string",
                    "pattern": "^0x[0-9a-fA-F]{40}$",
                },
            },
        },
    })
}

/// Extracts cross-chain routing directives from a payment payload.
///
/// Returns `Some` only when the `cross-chain` extension is present and all
/// three fields are syntactically valid: an `eip155:<digits>` network and
/// two 20-byte hex addresses. Anything else — absent extension, missing
/// field, malformed value — yields `None`; treating that as a same-chain
/// payment is the caller's call.
#[must_use]
pub fn extract_cross_chain_info<TAccepted, TPayload>(
    payload: &PaymentPayload<TAccepted, TPayload>,
) -> Option<CrossChainExtensionInfo> {
    extract_from_extensions(payload.extensions.as_ref()?)
}

/// Extracts cross-chain routing directives from an extension map.
#[must_use]
pub fn extract_from_extensions(extensions: &Extensions) -> Option<CrossChainExtensionInfo> {
    let value = extensions.get(CROSS_CHAIN_EXTENSION_KEY)?;
    // Declarations wrap the data under "info"; payloads may carry it bare.
    let info = value.get("info").unwrap_or(value);

    let destination_network = parse_eip155_network(info.get("destinationNetwork")?.as_str()?)?;
    let destination_asset = parse_address(info.get("destinationAsset")?.as_str()?)?;
    let destination_pay_to = parse_address(info.get("destinationPayTo")?.as_str()?)?;

    Some(CrossChainExtensionInfo {
        destination_network,
        destination_asset,
        destination_pay_to,
    })
}

fn parse_eip155_network(raw: &str) -> Option<ChainId> {
    let chain_id = ChainId::from_str(raw).ok()?;
    if chain_id.namespace() != EIP155_NAMESPACE {
        return None;
    }
    let reference = chain_id.reference();
    if reference.is_empty() || !reference.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(chain_id)
}

fn parse_address(raw: &str) -> Option<Address> {
    // Address::from_str accepts the 0x-prefixed 40-hex-char form only,
    // which is exactly the lexical constraint this extension requires.
    if !raw.starts_with("0x") {
        return None;
    }
    Address::from_str(raw).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;
    use std::collections::HashMap;

    fn info() -> CrossChainExtensionInfo {
        CrossChainExtensionInfo {
            destination_network: ChainId::eip155(11_155_111),
            destination_asset: address!("0x1c7D4B196Cb0C7B01d743Fbc6116a902379C7238"),
            destination_pay_to: address!("0x2222222222222222222222222222222222222222"),
        }
    }

    fn payload_with(value: serde_json::Value) -> PaymentPayload<serde_json::Value> {
        let mut extensions: Extensions = HashMap::new();
        extensions.insert(CROSS_CHAIN_EXTENSION_KEY.to_owned(), value);
        PaymentPayload {
            x402_version: 2,
            accepted: serde_json::json!({}),
            payload: serde_json::json!({}),
            extensions: Some(extensions),
        }
    }

    #[test]
    fn declare_then_extract_round_trips() {
        let declared = declare_cross_chain_extension(&info());
        let payload = payload_with(declared);
        assert_eq!(extract_cross_chain_info(&payload), Some(info()));
    }

    #[test]
    fn extracts_bare_info_without_declaration_wrapper() {
        let payload = payload_with(serde_json::to_value(info()).unwrap());
        assert_eq!(extract_cross_chain_info(&payload), Some(info()));
    }

    #[test]
    fn missing_extension_is_none() {
        let payload: PaymentPayload<serde_json::Value> = PaymentPayload {
            x402_version: 2,
            accepted: serde_json::json!({}),
            payload: serde_json::json!({}),
            extensions: None,
        };
        assert!(extract_cross_chain_info(&payload).is_none());
    }

    #[test]
    fn rejects_partial_or_malformed_directives() {
        // Missing destinationPayTo.
        let payload = payload_with(serde_json::json!({
            "destinationNetwork": "eip155:11155111",
            "destinationAsset": "0x1c7D4B196Cb0C7B01d743Fbc6116a902379C7238",
        }));
        assert!(extract_cross_chain_info(&payload).is_none());

        // Non-EVM namespace.
        let payload = payload_with(serde_json::json!({
            "destinationNetwork": "solana:mainnet",
            "destinationAsset": "0x1c7D4B196Cb0C7B01d743Fbc6116a902379C7238",
            "destinationPayTo": "0x2222222222222222222222222222222222222222",
        }));
        assert!(extract_cross_chain_info(&payload).is_none());

        // Address without 0x prefix.
        let payload = payload_with(serde_json::json!({
            "destinationNetwork": "eip155:11155111",
            "destinationAsset": "1c7D4B196Cb0C7B01d743Fbc6116a902379C7238",
            "destinationPayTo": "0x2222222222222222222222222222222222222222",
        }));
        assert!(extract_cross_chain_info(&payload).is_none());

        // Address too short.
        let payload = payload_with(serde_json::json!({
            "destinationNetwork": "eip155:11155111",
            "destinationAsset": "0x1c7D4B19",
            "destinationPayTo": "0x2222222222222222222222222222222222222222",
        }));
        assert!(extract_cross_chain_info(&payload).is_none());
    }

    #[test]
    fn declaration_embeds_a_schema() {
        let declared = declare_cross_chain_extension(&info());
        assert_eq!(declared["schema"]["type"], "object");
        assert_eq!(
            declared["schema"]["required"],
            serde_json::json!(["destinationNetwork", "destinationAsset", "destinationPayTo"])
        );
    }
}

//! Wire format types for facilitator messages.
//!
//! These types define the JSON contract between merchants, buyers, and the
//! facilitator. All fields are camelCase on the wire. Amounts and timestamps
//! travel as decimal strings so JavaScript peers keep full precision.
//!
//! # Key Types
//!
//! - [`PaymentRequirements`] — the merchant's offer for a payment route
//! - [`PaymentPayload`] — the buyer's signed authorization
//! - [`VerifyRequest`] / [`SettleRequest`] — facilitator request bodies
//! - [`VerifyResponse`] / [`SettleResponse`] — structured outcomes
//! - [`SupportedResponse`] — the `/supported` listing
//! - [`FailureReason`] — stable machine-readable failure codes

mod reason;

pub use reason::FailureReason;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_with::{serde_as, VecSkipError};
use std::collections::HashMap;
use std::str::FromStr;

use crate::chain::ChainId;

/// Protocol version spoken by this facilitator.
pub const X402_VERSION: u8 = 2;

/// Protocol extension data attached to requirements and payloads.
///
/// Keys are extension names; values are extension-specific JSON.
pub type Extensions = HashMap<String, serde_json::Value>;

/// The merchant's offer for a payment route.
///
/// Immutable once issued; a merchant emits a fresh copy per 402 response.
///
/// # Type Parameters
///
/// - `TScheme` — the scheme tag type (default `String`)
/// - `TAmount` — the amount type (default `String`, atomic units)
/// - `TAddress` — the address type (default `String`)
/// - `TExtra` — scheme-specific extra data (default `serde_json::Value`)
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements<
    TScheme = String,
    TAmount = String,
    TAddress = String,
    TExtra = serde_json::Value,
> {
    /// The payment scheme tag (`"exact"` or `"cross-chain"`).
    pub scheme: TScheme,
    /// The CAIP-2 chain ID the payment settles on.
    pub network: ChainId,
    /// The payment amount in the asset's atomic units.
    pub amount: TAmount,
    /// The recipient address.
    pub pay_to: TAddress,
    /// Upper bound on the authorization validity window, in seconds.
    pub max_timeout_seconds: u64,
    /// The token contract address.
    pub asset: TAddress,
    /// Scheme-specific extra data (EIP-712 domain hints for `exact`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<TExtra>,
    /// Declared protocol extensions, keyed by extension name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Extensions>,
}

impl PaymentRequirements {
    /// Reinterprets the untyped requirements as scheme-concrete types.
    ///
    /// Returns `None` when any field fails to parse into the target type.
    #[must_use]
    pub fn as_concrete<TScheme, TAmount, TAddress, TExtra>(
        &self,
    ) -> Option<PaymentRequirements<TScheme, TAmount, TAddress, TExtra>>
    where
        TScheme: FromStr,
        TAmount: FromStr,
        TAddress: FromStr,
        TExtra: serde::de::DeserializeOwned,
    {
        let extra = match &self.extra {
            Some(value) => Some(serde_json::from_value(value.clone()).ok()?),
            None => None,
        };
        Some(PaymentRequirements {
            scheme: self.scheme.parse().ok()?,
            network: self.network.clone(),
            amount: self.amount.parse().ok()?,
            pay_to: self.pay_to.parse().ok()?,
            max_timeout_seconds: self.max_timeout_seconds,
            asset: self.asset.parse().ok()?,
            extra,
            extensions: self.extensions.clone(),
        })
    }
}

/// The buyer's signed payment authorization.
///
/// Includes the requirements the buyer accepted, so the facilitator can
/// check the buyer agreed to the same terms the merchant presented.
///
/// # Type Parameters
///
/// - `TAccepted` — the accepted requirements type
/// - `TPayload` — the scheme-specific signed payload type
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload<TAccepted = PaymentRequirements, TPayload = serde_json::Value> {
    /// Protocol version (always 2).
    pub x402_version: u8,
    /// The payment requirements the buyer accepted.
    pub accepted: TAccepted,
    /// The scheme-specific signed payload.
    pub payload: TPayload,
    /// Extensions copied from the requirements (may carry routing directives).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Extensions>,
}

/// A `(scheme, network)` pair used to route a request to its handler.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DispatchKey {
    /// The scheme tag from the requirements.
    pub scheme: String,
    /// The network from the requirements.
    pub network: ChainId,
}

/// Request to verify a payment before settlement.
///
/// Kept as raw JSON at this layer: the orchestrator only needs the dispatch
/// key; the scheme handler parses the body into its own typed shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyRequest(serde_json::Value);

/// Request to settle a verified payment on-chain.
///
/// Structurally identical to [`VerifyRequest`] on the wire; a distinct type
/// so the compiler keeps the two operations apart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettleRequest(serde_json::Value);

impl VerifyRequest {
    /// Consumes the request, returning the raw JSON body.
    #[must_use]
    pub fn into_json(self) -> serde_json::Value {
        self.0
    }

    /// Borrows the raw JSON body.
    #[must_use]
    pub fn as_json(&self) -> &serde_json::Value {
        &self.0
    }

    /// Extracts the routing key from `paymentRequirements.scheme` and
    /// `paymentRequirements.network`.
    ///
    /// Returns `None` when either field is absent or malformed.
    #[must_use]
    pub fn dispatch_key(&self) -> Option<DispatchKey> {
        dispatch_key_of(&self.0)
    }
}

impl SettleRequest {
    /// Consumes the request, returning the raw JSON body.
    #[must_use]
    pub fn into_json(self) -> serde_json::Value {
        self.0
    }

    /// Borrows the raw JSON body.
    #[must_use]
    pub fn as_json(&self) -> &serde_json::Value {
        &self.0
    }

    /// Extracts the routing key; same logic as [`VerifyRequest::dispatch_key`].
    #[must_use]
    pub fn dispatch_key(&self) -> Option<DispatchKey> {
        dispatch_key_of(&self.0)
    }
}

fn dispatch_key_of(body: &serde_json::Value) -> Option<DispatchKey> {
    let requirements = body.get("paymentRequirements")?;
    let scheme = requirements.get("scheme")?.as_str()?.to_owned();
    let network = ChainId::from_str(requirements.get("network")?.as_str()?).ok()?;
    Some(DispatchKey { scheme, network })
}

impl From<serde_json::Value> for VerifyRequest {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

impl From<serde_json::Value> for SettleRequest {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

impl From<VerifyRequest> for SettleRequest {
    fn from(request: VerifyRequest) -> Self {
        Self(request.into_json())
    }
}

/// Outcome of a payment verification.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum VerifyResponse {
    /// The payload matches the requirements and passes all checks.
    Valid {
        /// The payer address recovered from the signature.
        payer: String,
    },
    /// The payload was well-formed but failed verification.
    Invalid {
        /// Machine-readable failure reason.
        reason: FailureReason,
        /// The payer address, if identifiable before the failing check.
        payer: Option<String>,
    },
}

impl VerifyResponse {
    /// Constructs a successful verification response.
    #[must_use]
    pub const fn valid(payer: String) -> Self {
        Self::Valid { payer }
    }

    /// Constructs a failed verification response.
    #[must_use]
    pub const fn invalid(reason: FailureReason) -> Self {
        Self::Invalid {
            reason,
            payer: None,
        }
    }

    /// Returns `true` if verification succeeded.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        matches!(self, Self::Valid { .. })
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyResponseWire {
    is_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    invalid_reason: Option<FailureReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payer: Option<String>,
}

impl Serialize for VerifyResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let wire = match self {
            Self::Valid { payer } => VerifyResponseWire {
                is_valid: true,
                invalid_reason: None,
                payer: Some(payer.clone()),
            },
            Self::Invalid { reason, payer } => VerifyResponseWire {
                is_valid: false,
                invalid_reason: Some(*reason),
                payer: payer.clone(),
            },
        };
        wire.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for VerifyResponse {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = VerifyResponseWire::deserialize(deserializer)?;
        if wire.is_valid {
            let payer = wire
                .payer
                .ok_or_else(|| serde::de::Error::missing_field("payer"))?;
            Ok(Self::Valid { payer })
        } else {
            let reason = wire
                .invalid_reason
                .ok_or_else(|| serde::de::Error::missing_field("invalidReason"))?;
            Ok(Self::Invalid {
                reason,
                payer: wire.payer,
            })
        }
    }
}

/// Outcome of a payment settlement.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum SettleResponse {
    /// The source-chain transaction was mined successfully.
    Success {
        /// The payer address.
        payer: String,
        /// The on-chain transaction hash.
        transaction: String,
        /// The CAIP-2 network the settlement happened on.
        network: ChainId,
    },
    /// Settlement did not happen.
    Error {
        /// Machine-readable failure reason.
        reason: FailureReason,
        /// The network settlement was attempted on.
        network: ChainId,
        /// The payer address, if identified before the failure.
        payer: Option<String>,
    },
}

impl SettleResponse {
    /// Returns `true` if the settlement succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettleResponseWire {
    success: bool,
    /// Always present on the wire; empty when settlement failed.
    transaction: String,
    network: ChainId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_reason: Option<FailureReason>,
}

impl Serialize for SettleResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let wire = match self {
            Self::Success {
                payer,
                transaction,
                network,
            } => SettleResponseWire {
                success: true,
                transaction: transaction.clone(),
                network: network.clone(),
                payer: Some(payer.clone()),
                error_reason: None,
            },
            Self::Error {
                reason,
                network,
                payer,
            } => SettleResponseWire {
                success: false,
                transaction: String::new(),
                network: network.clone(),
                payer: payer.clone(),
                error_reason: Some(*reason),
            },
        };
        wire.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SettleResponse {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = SettleResponseWire::deserialize(deserializer)?;
        if wire.success {
            let payer = wire
                .payer
                .ok_or_else(|| serde::de::Error::missing_field("payer"))?;
            Ok(Self::Success {
                payer,
                transaction: wire.transaction,
                network: wire.network,
            })
        } else {
            let reason = wire
                .error_reason
                .ok_or_else(|| serde::de::Error::missing_field("errorReason"))?;
            Ok(Self::Error {
                reason,
                network: wire.network,
                payer: wire.payer,
            })
        }
    }
}

/// One payment method a facilitator can process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedPaymentKind {
    /// The x402 protocol version.
    pub x402_version: u8,
    /// The scheme tag (e.g. `"exact"`).
    pub scheme: String,
    /// The CAIP-2 network.
    pub network: String,
    /// Optional scheme-specific extra data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

/// Response from the `/supported` endpoint.
#[serde_as]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedResponse {
    /// Supported payment kinds.
    #[serde_as(as = "VecSkipError<_>")]
    pub kinds: Vec<SupportedPaymentKind>,
    /// Declared protocol extension keys.
    #[serde(default)]
    pub extensions: Vec<String>,
    /// Signer addresses per chain-family pattern (e.g. `"eip155:*"`).
    #[serde(default)]
    pub signers: HashMap<String, Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_response_wire_shape() {
        let valid = VerifyResponse::valid("0xabc".into());
        let json = serde_json::to_value(&valid).unwrap();
        assert_eq!(json, serde_json::json!({"isValid": true, "payer": "0xabc"}));

        let invalid = VerifyResponse::invalid(FailureReason::InsufficientFunds);
        let json = serde_json::to_value(&invalid).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"isValid": false, "invalidReason": "insufficient_funds"})
        );
    }

    #[test]
    fn settle_response_wire_shape() {
        let ok = SettleResponse::Success {
            payer: "0xbuyer".into(),
            transaction: "0xhash".into(),
            network: ChainId::eip155(84532),
        };
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "success": true,
                "transaction": "0xhash",
                "network": "eip155:84532",
                "payer": "0xbuyer",
            })
        );

        let err = SettleResponse::Error {
            reason: FailureReason::TransactionFailed,
            network: ChainId::eip155(84532),
            payer: None,
        };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "success": false,
                "transaction": "",
                "network": "eip155:84532",
                "errorReason": "transaction_failed",
            })
        );
    }

    #[test]
    fn dispatch_key_reads_requirements() {
        let request = VerifyRequest::from(serde_json::json!({
            "paymentPayload": {},
            "paymentRequirements": {
                "scheme": "cross-chain",
                "network": "eip155:84532",
            },
        }));
        let key = request.dispatch_key().unwrap();
        assert_eq!(key.scheme, "cross-chain");
        assert_eq!(key.network, ChainId::eip155(84532));
    }

    #[test]
    fn dispatch_key_missing_fields() {
        let request = VerifyRequest::from(serde_json::json!({"paymentPayload": {}}));
        assert!(request.dispatch_key().is_none());
    }

    #[test]
    fn requirements_round_trip() {
        let json = serde_json::json!({
            "scheme": "exact",
            "network": "eip155:84532",
            "amount": "10000",
            "payTo": "0x1111111111111111111111111111111111111111",
            "maxTimeoutSeconds": 300,
            "asset": "0x036CbD53842c5426634e7929541eC2318f3dCF7e",
            "extra": {"name": "USDC", "version": "2"},
        });
        let requirements: PaymentRequirements = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(requirements.scheme, "exact");
        assert_eq!(requirements.max_timeout_seconds, 300);
        let back = serde_json::to_value(&requirements).unwrap();
        assert_eq!(back, json);
    }
}

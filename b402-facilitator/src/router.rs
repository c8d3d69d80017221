//! Cross-chain payment routing.
//!
//! [`CrossChainFacilitator`] serves `scheme = "cross-chain"` requests for
//! one source chain. It validates the routing directives against the bridge
//! provider, rewrites the requirements so the on-chain authorization pays
//! the facilitator's own source-chain address, delegates verification and
//! settlement to the exact handler, and enqueues a bridge job once the
//! source settlement confirms.
//!
//! The `payTo` rewrite is the custody boundary: buyer funds always land at
//! the facilitator on the source chain, never directly at an address a
//! malicious merchant slipped into the requirements.

use std::str::FromStr;
use std::sync::Arc;

use alloy_primitives::{Address, U256};
use b402::extension::CROSS_CHAIN_EXTENSION_KEY;
use b402::facilitator::{Facilitator, FacilitatorFuture};
use b402::proto::{
    self, Extensions, FailureReason, SettleResponse, SupportedPaymentKind, SupportedResponse,
    VerifyResponse, X402_VERSION,
};
use b402::{ChainId, CrossChainExtensionInfo};
use b402_bridge::{BridgeJob, BridgeProvider, BridgeWorker};
use tracing::{error, info, warn};

/// The scheme tag this router serves.
pub const CROSS_CHAIN_SCHEME: &str = "cross-chain";

/// Facilitator for cross-chain payments on one source chain.
pub struct CrossChainFacilitator {
    /// The exact handler for the source chain.
    inner: Arc<dyn Facilitator>,
    bridge: Arc<dyn BridgeProvider>,
    worker: Arc<BridgeWorker>,
    source_network: ChainId,
    /// The facilitator's settlement address on the source chain.
    facilitator_address: Address,
    enabled: bool,
}

impl std::fmt::Debug for CrossChainFacilitator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrossChainFacilitator")
            .field("source_network", &self.source_network)
            .field("facilitator_address", &self.facilitator_address)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

impl CrossChainFacilitator {
    /// Creates a router over the source chain's exact handler.
    #[must_use]
    pub fn new(
        inner: Arc<dyn Facilitator>,
        bridge: Arc<dyn BridgeProvider>,
        worker: Arc<BridgeWorker>,
        source_network: ChainId,
        facilitator_address: Address,
        enabled: bool,
    ) -> Self {
        Self {
            inner,
            bridge,
            worker,
            source_network,
            facilitator_address,
            enabled,
        }
    }

    /// Runs the cross-chain validation chain of the payment requirements
    /// against the bridge capability, in protocol order.
    async fn validate(
        &self,
        body: &serde_json::Value,
    ) -> Result<CrossChainExtensionInfo, FailureReason> {
        if !self.enabled {
            return Err(FailureReason::CrossChainDisabled);
        }

        let extensions = body
            .get("paymentPayload")
            .and_then(|p| p.get("extensions"))
            .and_then(|e| serde_json::from_value::<Extensions>(e.clone()).ok())
            .ok_or(FailureReason::MissingCrossChainExtension)?;
        let info = extract_validated(&extensions)?;

        if !self.bridge.supports_chain(&self.source_network)
            || !self.bridge.supports_chain(&info.destination_network)
        {
            return Err(FailureReason::UnsupportedChainPair);
        }

        let source_asset = body
            .get("paymentRequirements")
            .and_then(|r| r.get("asset"))
            .and_then(|a| a.as_str())
            .and_then(|a| Address::from_str(a).ok())
            .ok_or(FailureReason::UnsupportedSourceAsset)?;
        if !self.bridge.is_usdc(&self.source_network, source_asset) {
            return Err(FailureReason::UnsupportedSourceAsset);
        }
        if !self
            .bridge
            .is_usdc(&info.destination_network, info.destination_asset)
        {
            return Err(FailureReason::UnsupportedDestinationAsset);
        }

        let pay_to = body
            .get("paymentRequirements")
            .and_then(|r| r.get("payTo"))
            .and_then(|p| p.as_str())
            .and_then(|p| Address::from_str(p).ok())
            .ok_or(FailureReason::InvalidSourcePayTo)?;
        if pay_to != self.facilitator_address {
            return Err(FailureReason::InvalidSourcePayTo);
        }

        let amount = body
            .get("paymentRequirements")
            .and_then(|r| r.get("amount"))
            .and_then(|a| a.as_str())
            .and_then(|a| U256::from_str_radix(a, 10).ok())
            .ok_or(FailureReason::InvalidPayloadFormat)?;
        let liquid = self
            .bridge
            .check_liquidity(
                &self.source_network,
                &info.destination_network,
                source_asset,
                amount,
            )
            .await
            .map_err(|e| {
                warn!(error = %e, "liquidity check failed");
                FailureReason::InsufficientBridgeLiquidity
            })?;
        if !liquid {
            return Err(FailureReason::InsufficientBridgeLiquidity);
        }

        if source_asset != info.destination_asset {
            let rate = self.bridge.exchange_rate(
                &self.source_network,
                &info.destination_network,
                source_asset,
                info.destination_asset,
            );
            if rate <= 0.0 {
                return Err(FailureReason::InvalidExchangeRate);
            }
        }

        Ok(info)
    }

    /// Rewrites the request for the exact handler: the scheme tag becomes
    /// `exact` and both `payTo` fields point at the facilitator's
    /// source-chain address. The extension keeps the true destination for
    /// the bridge worker.
    fn rewrite_for_exact(&self, body: &mut serde_json::Value) {
        let facilitator = self.facilitator_address.to_string();
        if let Some(requirements) = body.get_mut("paymentRequirements") {
            requirements["scheme"] = serde_json::Value::String("exact".into());
            requirements["payTo"] = serde_json::Value::String(facilitator.clone());
        }
        if let Some(accepted) = body
            .get_mut("paymentPayload")
            .and_then(|p| p.get_mut("accepted"))
        {
            accepted["scheme"] = serde_json::Value::String("exact".into());
            accepted["payTo"] = serde_json::Value::String(facilitator);
        }
    }

    /// Enqueues the bridge job for a settled cross-chain payment.
    async fn enqueue_bridge(
        &self,
        info: &CrossChainExtensionInfo,
        amount: String,
        source_tx_hash: String,
    ) {
        let job = BridgeJob::new(
            self.source_network.clone(),
            info.destination_network.clone(),
            source_tx_hash,
            amount,
            info.destination_asset,
            info.destination_pay_to,
        );
        match self.worker.enqueue(job).await {
            Ok(job) => {
                info!(
                    job_id = %job.id,
                    idempotency_key = %job.idempotency_key,
                    "bridge job enqueued"
                );
            }
            Err(e) => {
                // The payment already settled; losing the enqueue would
                // strand funds at the facilitator. The recovery path is the
                // operator replaying from the settlement transaction.
                error!(error = %e, "failed to enqueue bridge job");
            }
        }
    }
}

/// Extracts routing directives, distinguishing a malformed destination
/// recipient from an absent or malformed extension.
fn extract_validated(extensions: &Extensions) -> Result<CrossChainExtensionInfo, FailureReason> {
    let value = extensions
        .get(CROSS_CHAIN_EXTENSION_KEY)
        .ok_or(FailureReason::MissingCrossChainExtension)?;
    let info = value.get("info").unwrap_or(value);

    // destinationPayTo gets its own failure reason; the rest of the
    // directives collapse into the missing-extension reason.
    if let Some(raw) = info.get("destinationPayTo").and_then(|v| v.as_str()) {
        if !raw.starts_with("0x") || Address::from_str(raw).is_err() {
            return Err(FailureReason::InvalidDestinationPayTo);
        }
    }

    b402::extension::extract_from_extensions(extensions)
        .ok_or(FailureReason::MissingCrossChainExtension)
}

impl Facilitator for CrossChainFacilitator {
    fn verify(&self, request: proto::VerifyRequest) -> FacilitatorFuture<'_, VerifyResponse> {
        Box::pin(async move {
            let mut body = request.into_json();
            match self.validate(&body).await {
                Ok(_info) => {}
                Err(reason) => return Ok(VerifyResponse::invalid(reason)),
            }
            self.rewrite_for_exact(&mut body);
            self.inner.verify(proto::VerifyRequest::from(body)).await
        })
    }

    fn settle(&self, request: proto::SettleRequest) -> FacilitatorFuture<'_, SettleResponse> {
        Box::pin(async move {
            let mut body = request.into_json();
            let info = match self.validate(&body).await {
                Ok(info) => info,
                Err(reason) => {
                    return Ok(SettleResponse::Error {
                        reason,
                        network: self.source_network.clone(),
                        payer: None,
                    });
                }
            };
            let amount = body
                .get("paymentRequirements")
                .and_then(|r| r.get("amount"))
                .and_then(|a| a.as_str())
                .unwrap_or_default()
                .to_owned();

            self.rewrite_for_exact(&mut body);
            let response = self.inner.settle(proto::SettleRequest::from(body)).await?;

            // Settlement confirmed on the source chain: hand the second leg
            // to the bridge worker. Same-chain "cross-chain" payments have
            // nothing to bridge.
            if let SettleResponse::Success { transaction, .. } = &response {
                if info.destination_network != self.source_network {
                    self.enqueue_bridge(&info, amount, transaction.clone()).await;
                }
            }
            Ok(response)
        })
    }

    fn supported(&self) -> FacilitatorFuture<'_, SupportedResponse> {
        Box::pin(async move {
            let kinds = vec![SupportedPaymentKind {
                x402_version: X402_VERSION,
                scheme: CROSS_CHAIN_SCHEME.to_owned(),
                network: self.source_network.to_string(),
                extra: None,
            }];
            Ok(SupportedResponse {
                kinds,
                extensions: vec![CROSS_CHAIN_EXTENSION_KEY.to_owned()],
                signers: std::collections::HashMap::new(),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destination_pay_to_gets_its_own_reason() {
        let mut extensions = Extensions::new();
        extensions.insert(
            CROSS_CHAIN_EXTENSION_KEY.to_owned(),
            serde_json::json!({
                "destinationNetwork": "eip155:11155111",
                "destinationAsset": "0x1c7D4B196Cb0C7B01d743Fbc6116a902379C7238",
                "destinationPayTo": "not-an-address",
            }),
        );
        assert_eq!(
            extract_validated(&extensions),
            Err(FailureReason::InvalidDestinationPayTo)
        );
    }

    #[test]
    fn absent_extension_is_missing() {
        let extensions = Extensions::new();
        assert_eq!(
            extract_validated(&extensions),
            Err(FailureReason::MissingCrossChainExtension)
        );
    }

    #[test]
    fn well_formed_extension_extracts() {
        let mut extensions = Extensions::new();
        extensions.insert(
            CROSS_CHAIN_EXTENSION_KEY.to_owned(),
            serde_json::json!({
                "destinationNetwork": "eip155:11155111",
                "destinationAsset": "0x1c7D4B196Cb0C7B01d743Fbc6116a902379C7238",
                "destinationPayTo": "0x2222222222222222222222222222222222222222",
            }),
        );
        let info = extract_validated(&extensions).unwrap();
        assert_eq!(info.destination_network, ChainId::eip155(11_155_111));
    }
}

//! Facilitator-side verify and settle for the EIP-155 exact scheme.
//!
//! [`Eip155ExactFacilitator`] implements [`Facilitator`] for one EVM chain.
//! Expected payment failures come back as structured responses; only broken
//! request bodies surface as errors.

mod contract;
mod domain;
mod settle;
mod signature;
mod verify;

pub use contract::{Sig6492, Validator6492, IEIP3009, VALIDATOR_ADDRESS};
pub use domain::{build_domain, fields, DomainCache, PROBE_FIELD_SETS};
pub use signature::{PaymentSignature, SignatureFormatError};
pub use verify::CLOCK_SKEW_GRACE_SECS;

use std::collections::HashMap;

use b402::facilitator::{Facilitator, FacilitatorFuture};
use b402::proto::{
    self, FailureReason, SettleResponse, SupportedPaymentKind, SupportedResponse, VerifyResponse,
    X402_VERSION,
};

use crate::chain::Eip155SettlementProvider;
use crate::exact::types::ExactRequest;
use crate::exact::ExactScheme;

/// Configuration for the exact scheme facilitator.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactEvmConfig {
    /// Deploy counterfactual (EIP-6492 wrapped) wallets during settle.
    pub deploy_erc4337_with_eip6492: bool,
}

/// Exact scheme facilitator for one EVM chain.
pub struct Eip155ExactFacilitator<P> {
    provider: P,
    config: ExactEvmConfig,
    domain_cache: DomainCache,
}

impl<P> std::fmt::Debug for Eip155ExactFacilitator<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Eip155ExactFacilitator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<P> Eip155ExactFacilitator<P> {
    /// Creates a facilitator over the given chain provider.
    #[must_use]
    pub fn new(provider: P) -> Self {
        Self::with_config(provider, ExactEvmConfig::default())
    }

    /// Creates a facilitator with explicit configuration.
    #[must_use]
    pub fn with_config(provider: P, config: ExactEvmConfig) -> Self {
        Self {
            provider,
            config,
            domain_cache: DomainCache::default(),
        }
    }
}

/// Checks the scheme tags on the raw body before typed parsing, so a wrong
/// scheme reports `unsupported_scheme` rather than a format error.
fn assert_exact_scheme(body: &serde_json::Value) -> Result<(), FailureReason> {
    let requirements_scheme = body
        .get("paymentRequirements")
        .and_then(|r| r.get("scheme"))
        .and_then(|s| s.as_str());
    let accepted_scheme = body
        .get("paymentPayload")
        .and_then(|p| p.get("accepted"))
        .and_then(|a| a.get("scheme"))
        .and_then(|s| s.as_str());
    match (requirements_scheme, accepted_scheme) {
        (Some(ExactScheme::VALUE), Some(ExactScheme::VALUE)) => Ok(()),
        _ => Err(FailureReason::UnsupportedScheme),
    }
}

impl<P> Facilitator for Eip155ExactFacilitator<P>
where
    P: Eip155SettlementProvider,
{
    fn verify(&self, request: proto::VerifyRequest) -> FacilitatorFuture<'_, VerifyResponse> {
        Box::pin(async move {
            let body = request.into_json();
            if let Err(reason) = assert_exact_scheme(&body) {
                return Ok(VerifyResponse::invalid(reason));
            }
            let request: ExactRequest = match serde_json::from_value(body) {
                Ok(request) => request,
                Err(_) => {
                    return Ok(VerifyResponse::invalid(FailureReason::InvalidPayloadFormat));
                }
            };

            match verify::assert_valid_payment(
                self.provider.inner(),
                *self.provider.chain(),
                &request.payment_payload,
                &request.payment_requirements,
                &self.domain_cache,
            )
            .await
            {
                Ok(verified) => Ok(VerifyResponse::valid(verified.payer.to_string())),
                Err(reason) => Ok(VerifyResponse::invalid(reason)),
            }
        })
    }

    fn settle(&self, request: proto::SettleRequest) -> FacilitatorFuture<'_, SettleResponse> {
        Box::pin(async move {
            let network = self.provider.chain().as_chain_id();
            let body = request.into_json();
            if let Err(reason) = assert_exact_scheme(&body) {
                return Ok(SettleResponse::Error {
                    reason,
                    network,
                    payer: None,
                });
            }
            let request: ExactRequest = match serde_json::from_value(body) {
                Ok(request) => request,
                Err(_) => {
                    return Ok(SettleResponse::Error {
                        reason: FailureReason::InvalidPayloadFormat,
                        network,
                        payer: None,
                    });
                }
            };

            // Settlement re-runs the full verification pipeline.
            let verified = match verify::assert_valid_payment(
                self.provider.inner(),
                *self.provider.chain(),
                &request.payment_payload,
                &request.payment_requirements,
                &self.domain_cache,
            )
            .await
            {
                Ok(verified) => verified,
                Err(reason) => {
                    return Ok(SettleResponse::Error {
                        reason,
                        network,
                        payer: None,
                    });
                }
            };

            let payer = verified.payer.to_string();
            match settle::settle_payment(
                &self.provider,
                &verified,
                request.payment_requirements.asset,
                self.config.deploy_erc4337_with_eip6492,
            )
            .await
            {
                Ok(tx_hash) => Ok(SettleResponse::Success {
                    payer,
                    transaction: tx_hash.to_string(),
                    network,
                }),
                Err(reason) => Ok(SettleResponse::Error {
                    reason,
                    network,
                    payer: Some(payer),
                }),
            }
        })
    }

    fn supported(&self) -> FacilitatorFuture<'_, SupportedResponse> {
        Box::pin(async move {
            let network = self.provider.chain().as_chain_id();
            let kinds = vec![SupportedPaymentKind {
                x402_version: X402_VERSION,
                scheme: ExactScheme.to_string(),
                network: network.to_string(),
                extra: None,
            }];
            let mut signers = HashMap::with_capacity(1);
            signers.insert(
                "eip155:*".to_owned(),
                vec![self.provider.signer_address().to_string()],
            );
            Ok(SupportedResponse {
                kinds,
                extensions: Vec::new(),
                signers,
            })
        })
    }
}

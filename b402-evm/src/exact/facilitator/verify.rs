//! Verification pipeline for exact payments.
//!
//! Checks run in a fixed order, each mapping to a stable failure reason:
//! domain reconstruction, signature, recipient, temporal bounds, balance,
//! value. The balance check is best-effort — an RPC failure there must not
//! fail an otherwise valid payment.

use alloy_primitives::{Address, B256, U256};
use alloy_provider::Provider;
use alloy_sol_types::{Eip712Domain, SolStruct};
use b402::proto::FailureReason;
use b402::UnixTimestamp;
use tracing::warn;

use super::contract::{Validator6492, IEIP3009, VALIDATOR_ADDRESS};
use super::domain::{build_domain, field_set_for, DomainCache, PROBE_FIELD_SETS};
use super::signature::PaymentSignature;
use crate::chain::Eip155ChainReference;
use crate::exact::types::{
    Eip3009Authorization, PaymentPayload, PaymentRequirements, PaymentRequirementsExtra,
    TransferWithAuthorization,
};

/// Grace period for the expiry bound: the authorization must stay valid for
/// at least this many seconds past now, or settlement could race expiry.
pub const CLOCK_SKEW_GRACE_SECS: u64 = 6;

/// A payment that passed every verification step.
#[derive(Debug)]
pub(super) struct VerifiedPayment {
    /// The authorization the buyer signed.
    pub authorization: Eip3009Authorization,
    /// The parsed signature, ready for settlement dispatch.
    pub signature: PaymentSignature,
    /// The payer (the authorization's `from`).
    pub payer: Address,
}

/// Runs the full verification pipeline.
pub(super) async fn assert_valid_payment<P: Provider>(
    provider: &P,
    chain: Eip155ChainReference,
    payload: &PaymentPayload,
    requirements: &PaymentRequirements,
    domain_cache: &DomainCache,
) -> Result<VerifiedPayment, FailureReason> {
    let accepted = &payload.accepted;
    if accepted.network != requirements.network
        || requirements.network != chain.as_chain_id()
    {
        return Err(FailureReason::NetworkMismatch);
    }

    let extra = requirements
        .extra
        .as_ref()
        .ok_or(FailureReason::MissingEip712Domain)?;
    let (name, version) = match (&extra.name, &extra.version) {
        (Some(name), Some(version)) => (name.as_str(), version.as_str()),
        _ => return Err(FailureReason::MissingEip712Domain),
    };

    let asset = requirements.asset;
    let contract = IEIP3009::new(asset, provider);
    let authorization = payload.payload.authorization;

    // 1. Domain reconstruction.
    let domain =
        resolve_domain(&contract, chain, asset, name, version, extra, domain_cache).await?;

    // 2. Signature recovery / validation.
    let (payer, signature) =
        verify_signature(provider, &authorization, &payload.payload.signature, &domain).await?;

    // 3. Recipient integrity.
    if authorization.to != requirements.pay_to {
        return Err(FailureReason::InvalidExactEvmPayloadRecipientMismatch);
    }

    // 4. Temporal bounds.
    assert_time(authorization.valid_after, authorization.valid_before)?;

    // 5. Balance (best-effort).
    assert_enough_balance(&contract, authorization.from, requirements.amount.inner()).await?;

    // 6. Value sufficiency.
    if authorization.value.inner() < requirements.amount.inner() {
        return Err(FailureReason::InvalidExactEvmPayloadAuthorizationValue);
    }

    Ok(VerifiedPayment {
        authorization,
        signature,
        payer,
    })
}

/// Reconstructs the token's EIP-712 domain.
///
/// With an explicit merchant override the constructed domain is used as-is.
/// Otherwise the canonical field set is compared against the token's
/// on-chain `DOMAIN_SEPARATOR()`, probing the published alternatives on
/// mismatch; the resolved domain is cached per token. An unreadable
/// separator falls back to the constructed domain — a wrong domain can only
/// make the signature check fail, never pass wrongly.
async fn resolve_domain<P: Provider>(
    contract: &IEIP3009::IEIP3009Instance<&P>,
    chain: Eip155ChainReference,
    asset: Address,
    name: &str,
    version: &str,
    extra: &PaymentRequirementsExtra,
    cache: &DomainCache,
) -> Result<Eip712Domain, FailureReason> {
    let override_ = extra.domain.as_ref();
    if override_.is_some() {
        let field_set = field_set_for(extra);
        return Ok(build_domain(field_set, name, version, chain, asset, override_));
    }

    if let Some(domain) = cache.get(&asset) {
        return Ok(domain);
    }

    let constructed = build_domain(field_set_for(extra), name, version, chain, asset, None);
    let on_chain = match contract.DOMAIN_SEPARATOR().call().await {
        Ok(separator) => separator,
        Err(e) => {
            warn!(asset = %asset, error = %e, "DOMAIN_SEPARATOR unreadable, using constructed domain");
            return Ok(constructed);
        }
    };

    if constructed.hash_struct() == on_chain {
        cache.insert(asset, constructed.clone());
        return Ok(constructed);
    }

    for field_set in PROBE_FIELD_SETS {
        let candidate = build_domain(*field_set, name, version, chain, asset, None);
        if candidate.hash_struct() == on_chain {
            cache.insert(asset, candidate.clone());
            return Ok(candidate);
        }
    }

    Err(FailureReason::DomainSeparatorMismatch)
}

/// Verifies the signature over `TransferWithAuthorization` typed data.
///
/// EOA signatures are recovered locally; contract and deploy-wrapped
/// signatures are validated through the universal validator contract.
async fn verify_signature<P: Provider>(
    provider: &P,
    authorization: &Eip3009Authorization,
    signature: &alloy_primitives::Bytes,
    domain: &Eip712Domain,
) -> Result<(Address, PaymentSignature), FailureReason> {
    let digest = signing_digest(authorization, domain);
    let payer = authorization.from;

    let parsed = PaymentSignature::parse(signature.clone(), payer, &digest)
        .map_err(|_| FailureReason::InvalidExactEvmPayloadSignature)?;

    match &parsed {
        // parse() only yields Eoa when the recovered address matches.
        PaymentSignature::Eoa(_) => {}
        PaymentSignature::Contract(bytes) => {
            assert_valid_contract_signature(provider, payer, digest, bytes.clone()).await?;
        }
        PaymentSignature::DeployWrapped { original, .. } => {
            assert_valid_contract_signature(provider, payer, digest, original.clone()).await?;
        }
    }

    Ok((payer, parsed))
}

/// Computes the EIP-712 signing digest for an authorization under `domain`.
pub(super) fn signing_digest(
    authorization: &Eip3009Authorization,
    domain: &Eip712Domain,
) -> B256 {
    let message = TransferWithAuthorization {
        from: authorization.from,
        to: authorization.to,
        value: authorization.value.inner(),
        validAfter: U256::from(authorization.valid_after.as_secs()),
        validBefore: U256::from(authorization.valid_before.as_secs()),
        nonce: authorization.nonce,
    };
    message.eip712_signing_hash(domain)
}

async fn assert_valid_contract_signature<P: Provider>(
    provider: &P,
    signer: Address,
    digest: B256,
    signature: alloy_primitives::Bytes,
) -> Result<(), FailureReason> {
    let validator = Validator6492::new(VALIDATOR_ADDRESS, provider);
    let valid = validator
        .isValidSigWithSideEffects(signer, digest, signature)
        .call()
        .await
        .map_err(|_| FailureReason::InvalidExactEvmPayloadSignature)?;
    if valid {
        Ok(())
    } else {
        Err(FailureReason::InvalidExactEvmPayloadSignature)
    }
}

/// Validates the authorization's time window against now.
///
/// The expiry check keeps [`CLOCK_SKEW_GRACE_SECS`] of headroom so a
/// payment cannot expire between verify and the settlement transaction.
pub(super) fn assert_time(
    valid_after: UnixTimestamp,
    valid_before: UnixTimestamp,
) -> Result<(), FailureReason> {
    let now = UnixTimestamp::now();
    if valid_before <= now + CLOCK_SKEW_GRACE_SECS {
        return Err(FailureReason::InvalidExactEvmPayloadAuthorizationValidBefore);
    }
    if valid_after > now {
        return Err(FailureReason::InvalidExactEvmPayloadAuthorizationValidAfter);
    }
    Ok(())
}

/// Checks the payer's token balance covers the required amount.
///
/// Best-effort: an RPC failure is logged and treated as sufficient — the
/// settlement transaction is the authoritative check.
async fn assert_enough_balance<P: Provider>(
    contract: &IEIP3009::IEIP3009Instance<&P>,
    payer: Address,
    required: U256,
) -> Result<(), FailureReason> {
    match contract.balanceOf(payer).call().await {
        Ok(balance) if balance < required => Err(FailureReason::InsufficientFunds),
        Ok(_) => Ok(()),
        Err(e) => {
            warn!(payer = %payer, error = %e, "balance check skipped: RPC failure");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_window_bounds() {
        let now = UnixTimestamp::now();

        // Healthy window.
        assert!(assert_time(
            UnixTimestamp::from_secs(0),
            now + 3600,
        )
        .is_ok());

        // Expired a second ago.
        assert_eq!(
            assert_time(UnixTimestamp::from_secs(0), UnixTimestamp::from_secs(now.as_secs() - 1)),
            Err(FailureReason::InvalidExactEvmPayloadAuthorizationValidBefore)
        );

        // Expires within the grace window: still rejected.
        assert_eq!(
            assert_time(UnixTimestamp::from_secs(0), now + CLOCK_SKEW_GRACE_SECS),
            Err(FailureReason::InvalidExactEvmPayloadAuthorizationValidBefore)
        );

        // Not yet valid.
        assert_eq!(
            assert_time(now + 60, now + 3600),
            Err(FailureReason::InvalidExactEvmPayloadAuthorizationValidAfter)
        );
    }
}

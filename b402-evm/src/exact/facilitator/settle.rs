//! On-chain settlement for exact payments.
//!
//! Dispatches the verified authorization to the matching
//! `transferWithAuthorization` overload: split `(v, r, s)` for EOA
//! signatures, raw bytes for contract signatures. Deploy-wrapped signatures
//! may first deploy the counterfactual wallet via the embedded factory call.

use alloy_primitives::{Bytes, Signature, TxHash, B256, U256};
use alloy_provider::Provider;
use alloy_sol_types::SolCall;
use b402::proto::FailureReason;
use tracing::{info, warn};

use super::contract::IEIP3009;
use super::signature::PaymentSignature;
use super::verify::VerifiedPayment;
use crate::chain::{Eip155SettlementProvider, MetaTransaction};
use crate::exact::types::Eip3009Authorization;

/// Settles a verified payment, returning the settlement transaction hash.
///
/// Failures map onto the two settlement reasons: a transaction that could
/// not be executed at all (`transaction_failed` — covers replayed
/// authorization nonces rejected at gas estimation) and one that was mined
/// but reverted (`invalid_transaction_state`).
pub(super) async fn settle_payment<P>(
    provider: &P,
    payment: &VerifiedPayment,
    asset: alloy_primitives::Address,
    deploy_wallet_if_needed: bool,
) -> Result<TxHash, FailureReason>
where
    P: Eip155SettlementProvider,
{
    let authorization = &payment.authorization;

    let calldata = match &payment.signature {
        PaymentSignature::Eoa(signature) => encode_split_call(authorization, signature),
        PaymentSignature::Contract(bytes) => encode_bytes_call(authorization, bytes.clone()),
        PaymentSignature::DeployWrapped {
            factory,
            factory_calldata,
            inner,
            ..
        } => {
            let deployed = is_contract_deployed(provider.inner(), payment.payer).await;
            if !deployed {
                if !deploy_wallet_if_needed {
                    warn!(
                        payer = %payment.payer,
                        "counterfactual wallet not deployed and deployment is disabled"
                    );
                    return Err(FailureReason::TransactionFailed);
                }
                let receipt = provider
                    .send_transaction(MetaTransaction {
                        to: *factory,
                        calldata: factory_calldata.clone(),
                        confirmations: 1,
                    })
                    .await
                    .map_err(|e| {
                        warn!(payer = %payment.payer, error = %e, "wallet deployment failed");
                        FailureReason::TransactionFailed
                    })?;
                if !receipt.status() {
                    return Err(FailureReason::TransactionFailed);
                }
                info!(
                    payer = %payment.payer,
                    tx = %receipt.transaction_hash,
                    "deployed counterfactual wallet"
                );
            }
            encode_bytes_call(authorization, inner.clone())
        }
    };

    let receipt = provider
        .send_transaction(MetaTransaction {
            to: asset,
            calldata,
            confirmations: 1,
        })
        .await
        .map_err(|e| {
            warn!(
                payer = %payment.payer,
                error = %e,
                "transferWithAuthorization submission failed"
            );
            FailureReason::TransactionFailed
        })?;

    if receipt.status() {
        info!(
            payer = %payment.payer,
            tx = %receipt.transaction_hash,
            "transferWithAuthorization succeeded"
        );
        Ok(receipt.transaction_hash)
    } else {
        warn!(
            payer = %payment.payer,
            tx = %receipt.transaction_hash,
            "transferWithAuthorization reverted"
        );
        Err(FailureReason::InvalidTransactionState)
    }
}

/// Encodes the split-signature overload:
/// `transferWithAuthorization(..., uint8 v, bytes32 r, bytes32 s)`.
fn encode_split_call(authorization: &Eip3009Authorization, signature: &Signature) -> Bytes {
    let call = IEIP3009::transferWithAuthorization_1Call {
        from: authorization.from,
        to: authorization.to,
        value: authorization.value.inner(),
        validAfter: U256::from(authorization.valid_after.as_secs()),
        validBefore: U256::from(authorization.valid_before.as_secs()),
        nonce: authorization.nonce,
        v: 27 + u8::from(signature.v()),
        r: B256::from(signature.r()),
        s: B256::from(signature.s()),
    };
    call.abi_encode().into()
}

/// Encodes the bytes-signature overload:
/// `transferWithAuthorization(..., bytes signature)`.
fn encode_bytes_call(authorization: &Eip3009Authorization, signature: Bytes) -> Bytes {
    let call = IEIP3009::transferWithAuthorization_0Call {
        from: authorization.from,
        to: authorization.to,
        value: authorization.value.inner(),
        validAfter: U256::from(authorization.valid_after.as_secs()),
        validBefore: U256::from(authorization.valid_before.as_secs()),
        nonce: authorization.nonce,
        signature,
    };
    call.abi_encode().into()
}

/// Checks whether contract code is present at `address`.
///
/// Unreadable code is treated as deployed: skipping deployment at worst
/// makes the settlement transaction revert, while deploying twice wastes a
/// transaction.
async fn is_contract_deployed<P: Provider>(provider: &P, address: alloy_primitives::Address) -> bool {
    match provider.get_code_at(address).await {
        Ok(code) => !code.is_empty(),
        Err(e) => {
            warn!(address = %address, error = %e, "get_code_at failed, assuming deployed");
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{address, b256};
    use alloy_signer::SignerSync;
    use alloy_signer_local::PrivateKeySigner;
    use b402::UnixTimestamp;

    fn authorization() -> Eip3009Authorization {
        Eip3009Authorization {
            from: address!("0x2222222222222222222222222222222222222222"),
            to: address!("0x1111111111111111111111111111111111111111"),
            value: "10000".parse().unwrap(),
            valid_after: UnixTimestamp::from_secs(0),
            valid_before: UnixTimestamp::from_secs(2_000_000_000),
            nonce: b256!("0x0101010101010101010101010101010101010101010101010101010101010101"),
        }
    }

    #[test]
    fn split_call_selector_differs_from_bytes_call() {
        let signer = PrivateKeySigner::random();
        let signature = signer.sign_hash_sync(&B256::ZERO).unwrap();
        let split = encode_split_call(&authorization(), &signature);
        let bytes = encode_bytes_call(&authorization(), vec![0u8; 65].into());
        assert_ne!(split[..4], bytes[..4]);
    }

    #[test]
    fn split_call_encodes_legacy_v() {
        let signer = PrivateKeySigner::random();
        let signature = signer.sign_hash_sync(&B256::ZERO).unwrap();
        let calldata = encode_split_call(&authorization(), &signature);
        let decoded =
            IEIP3009::transferWithAuthorization_1Call::abi_decode(&calldata).unwrap();
        assert!(decoded.v == 27 || decoded.v == 28);
        assert_eq!(decoded.nonce, authorization().nonce);
    }
}

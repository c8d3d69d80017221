//! Signature parsing for ERC-3009 authorizations.
//!
//! Payment signatures arrive as raw bytes and take one of three shapes,
//! normalized here into [`PaymentSignature`]:
//!
//! - EOA signatures (64-65 bytes) that recover to the expected signer
//! - ERC-1271 contract signatures (anything else)
//! - EIP-6492 deploy-wrapped signatures, detected by the magic suffix and
//!   carrying the factory call that deploys the counterfactual wallet

use alloy_primitives::{hex, Address, Bytes, Signature, B256};
use alloy_sol_types::SolValue;

use super::contract::Sig6492;

/// The fixed 32-byte magic suffix defined by
/// [EIP-6492](https://eips.ethereum.org/EIPS/eip-6492).
const EIP6492_MAGIC_SUFFIX: [u8; 32] =
    hex!("6492649264926492649264926492649264926492649264926492649264926492");

/// A payment signature normalized by structure.
#[derive(Debug, Clone)]
pub enum PaymentSignature {
    /// A plain EOA signature that recovers to the expected signer.
    Eoa(Signature),
    /// An ERC-1271 contract signature (validated on-chain).
    Contract(Bytes),
    /// An EIP-6492 wrapped signature for a counterfactual wallet.
    DeployWrapped {
        /// Wallet factory to call before verification.
        factory: Address,
        /// Calldata for the factory deployment.
        factory_calldata: Bytes,
        /// The inner signature to use once the wallet exists.
        inner: Bytes,
        /// The full wrapped bytes, as the validator contract expects them.
        original: Bytes,
    },
}

/// Errors from parsing a payment signature.
#[derive(Debug, thiserror::Error)]
pub enum SignatureFormatError {
    /// The EIP-6492 wrapper could not be ABI-decoded.
    #[error("malformed EIP-6492 signature wrapper: {0}")]
    InvalidWrapper(alloy_sol_types::Error),
}

impl PaymentSignature {
    /// Parses raw signature bytes against the expected signer and the
    /// EIP-712 digest they should cover.
    ///
    /// A 64/65-byte signature that recovers to `expected_signer` is an EOA
    /// signature; one that recovers elsewhere is treated as a contract
    /// signature and left to on-chain validation.
    ///
    /// # Errors
    ///
    /// Returns [`SignatureFormatError`] when the 6492 wrapper is present
    /// but undecodable.
    pub fn parse(
        bytes: Bytes,
        expected_signer: Address,
        digest: &B256,
    ) -> Result<Self, SignatureFormatError> {
        let is_wrapped =
            bytes.len() >= 32 && bytes[bytes.len() - 32..] == EIP6492_MAGIC_SUFFIX;
        if is_wrapped {
            let body = &bytes[..bytes.len() - 32];
            let wrapper =
                Sig6492::abi_decode_params(body).map_err(SignatureFormatError::InvalidWrapper)?;
            return Ok(Self::DeployWrapped {
                factory: wrapper.factory,
                factory_calldata: wrapper.factoryCalldata,
                inner: wrapper.innerSig,
                original: bytes,
            });
        }

        let eoa = if bytes.len() == 65 {
            Signature::from_raw(&bytes).ok().map(Signature::normalized_s)
        } else if bytes.len() == 64 {
            Some(Signature::from_erc2098(&bytes).normalized_s())
        } else {
            None
        };

        match eoa {
            Some(signature)
                if signature
                    .recover_address_from_prehash(digest)
                    .is_ok_and(|recovered| recovered == expected_signer) =>
            {
                Ok(Self::Eoa(signature))
            }
            _ => Ok(Self::Contract(bytes)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::b256;
    use alloy_signer::SignerSync;
    use alloy_signer_local::PrivateKeySigner;

    const DIGEST: B256 =
        b256!("0x00000000000000000000000000000000000000000000000000000000deadbeef");

    #[test]
    fn eoa_signature_recovers_to_signer() {
        let signer = PrivateKeySigner::random();
        let signature = signer.sign_hash_sync(&DIGEST).unwrap();
        let parsed = PaymentSignature::parse(
            signature.as_bytes().to_vec().into(),
            signer.address(),
            &DIGEST,
        )
        .unwrap();
        assert!(matches!(parsed, PaymentSignature::Eoa(_)));
    }

    #[test]
    fn wrong_signer_falls_back_to_contract_signature() {
        let signer = PrivateKeySigner::random();
        let other = PrivateKeySigner::random();
        let signature = signer.sign_hash_sync(&DIGEST).unwrap();
        let parsed = PaymentSignature::parse(
            signature.as_bytes().to_vec().into(),
            other.address(),
            &DIGEST,
        )
        .unwrap();
        assert!(matches!(parsed, PaymentSignature::Contract(_)));
    }

    #[test]
    fn odd_length_bytes_are_contract_signatures() {
        let parsed =
            PaymentSignature::parse(vec![0xab; 20].into(), Address::ZERO, &DIGEST).unwrap();
        assert!(matches!(parsed, PaymentSignature::Contract(_)));
    }

    #[test]
    fn magic_suffix_marks_deploy_wrapped() {
        // A wrapped signature is ABI-encoded (factory, calldata, innerSig)
        // followed by the magic suffix.
        let wrapper = Sig6492 {
            factory: Address::repeat_byte(0x11),
            factoryCalldata: vec![0xde, 0xad].into(),
            innerSig: vec![0xbe, 0xef].into(),
        };
        let mut bytes = Sig6492::abi_encode_params(&wrapper);
        bytes.extend_from_slice(&EIP6492_MAGIC_SUFFIX);
        let parsed =
            PaymentSignature::parse(bytes.into(), Address::ZERO, &DIGEST).unwrap();
        match parsed {
            PaymentSignature::DeployWrapped { factory, inner, .. } => {
                assert_eq!(factory, Address::repeat_byte(0x11));
                assert_eq!(inner, Bytes::from(vec![0xbe, 0xef]));
            }
            other => panic!("expected DeployWrapped, got {other:?}"),
        }
    }

    #[test]
    fn truncated_wrapper_is_an_error() {
        let mut bytes = vec![0x01, 0x02, 0x03];
        bytes.extend_from_slice(&EIP6492_MAGIC_SUFFIX);
        assert!(PaymentSignature::parse(bytes.into(), Address::ZERO, &DIGEST).is_err());
    }
}

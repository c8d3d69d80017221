//! EVM (EIP-155) chain support for the b402 facilitator.
//!
//! Implements the `exact` payment scheme on EVM chains: ERC-3009
//! `transferWithAuthorization` lets a buyer sign a token transfer off-chain
//! which the facilitator submits and pays gas for.
//!
//! # Modules
//!
//! - [`chain`] — chain references, providers, and nonce discipline
//! - [`exact`] — the EIP-3009 exact scheme (verify + settle)
//! - [`networks`] — USDC deployments per supported chain
//!
//! # Signature handling
//!
//! The scheme accepts three signature shapes, dispatched by structure:
//!
//! - **EOA** (64-65 bytes): split into `(v, r, s)` and sent to the standard
//!   `transferWithAuthorization` overload
//! - **Contract** (ERC-1271, any other length): sent as raw bytes to the
//!   bytes-signature overload
//! - **Deploy-wrapped** (EIP-6492 magic suffix): the embedded factory call
//!   deploys the counterfactual wallet before settlement

pub mod chain;
pub mod exact;
pub mod networks;

pub use chain::{Eip155ChainProvider, Eip155ChainReference, PendingNonceManager, TokenAmount};
pub use exact::facilitator::Eip155ExactFacilitator;

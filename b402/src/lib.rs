//! Core protocol crate for the b402 cross-chain payment facilitator.
//!
//! b402 is an x402-family payment facilitator: a buyer signs an EIP-3009
//! token-transfer authorization on one EVM chain, the facilitator settles it
//! there, and — when the payment carries a cross-chain routing extension —
//! bridges the funds to the merchant's address on another chain.
//!
//! This crate holds the chain-agnostic pieces:
//!
//! - [`proto`] — wire format types for verify/settle/supported messages
//! - [`facilitator`] — the dyn-compatible [`Facilitator`](facilitator::Facilitator) trait
//! - [`hooks`] — typed lifecycle hooks around verify and settle
//! - [`extension`] — the `cross-chain` payment extension (declare + extract)
//! - [`chain`] — CAIP-2 chain identifiers
//! - [`networks`] — well-known network name table

pub mod chain;
pub mod extension;
pub mod facilitator;
pub mod hooks;
pub mod networks;
pub mod proto;
pub mod timestamp;

pub use chain::ChainId;
pub use extension::CrossChainExtensionInfo;
pub use facilitator::{Facilitator, FacilitatorError};
pub use proto::{
    FailureReason, PaymentPayload, PaymentRequirements, SettleRequest, SettleResponse,
    SupportedPaymentKind, SupportedResponse, VerifyRequest, VerifyResponse,
};
pub use timestamp::UnixTimestamp;

//! The bridge capability interface.
//!
//! [`BridgeProvider`] abstracts the burn-and-mint USDC bridge network. The
//! worker drives it; the orchestrator consults it during cross-chain
//! pre-verify validation (chain support, asset allowlist, liquidity, rate).

use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use b402::ChainId;

use crate::job::BridgeJob;

/// How a bridge error should be handled by the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recoverability {
    /// Retry with backoff up to the attempt budget.
    Transient,
    /// Do not retry; park the job as failed.
    Fatal,
}

impl Recoverability {
    /// Storage/logging string for this classification.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Transient => "TRANSIENT",
            Self::Fatal => "FATAL",
        }
    }
}

/// An error from the bridge provider, classified for the retry policy.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct BridgeError {
    /// Human-readable description.
    pub message: String,
    /// Optional machine-readable code from the bridge network.
    pub code: Option<String>,
    /// Whether the worker should retry.
    pub recoverability: Recoverability,
}

impl BridgeError {
    /// A retryable error.
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            recoverability: Recoverability::Transient,
        }
    }

    /// A permanent error.
    #[must_use]
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            recoverability: Recoverability::Fatal,
        }
    }

    /// Classifies a raw error message.
    ///
    /// Insufficient balance is permanent — retrying cannot conjure funds.
    /// Nonce races, fetch failures, and gateway timeouts resolve themselves;
    /// unclassified messages default to transient so one odd error string
    /// cannot park a recoverable job.
    #[must_use]
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lowered = message.to_lowercase();
        if lowered.contains("insufficient balance") || lowered.contains("insufficient funds") {
            return Self::fatal(message);
        }
        Self::transient(message)
    }
}

/// Parameters for a bridge submission.
#[derive(Debug, Clone)]
pub struct BridgeRequest {
    /// Chain the funds were settled on.
    pub source_network: ChainId,
    /// The settlement transaction on the source chain.
    pub source_tx_hash: String,
    /// Chain the funds should arrive on.
    pub destination_network: ChainId,
    /// Token contract on the destination chain.
    pub destination_asset: Address,
    /// Amount to bridge, atomic units.
    pub amount: U256,
    /// Recipient on the destination chain.
    pub recipient: Address,
}

/// Outcome of a bridge submission.
#[derive(Debug, Clone)]
pub struct BridgeResult {
    /// The burn transaction on the source chain.
    pub bridge_tx_hash: String,
    /// The mint transaction on the destination chain, when already
    /// confirmed. Absent when the mint is still pending — the worker
    /// reconciles asynchronously.
    pub destination_tx_hash: Option<String>,
    /// Bridge-network message identifier, for reconciliation.
    pub message_id: Option<String>,
    /// Source chain.
    pub source_network: ChainId,
    /// Destination chain.
    pub destination_network: ChainId,
}

/// Capability interface over the burn-and-mint bridge network.
#[async_trait]
pub trait BridgeProvider: Send + Sync {
    /// Whether the provider can bridge to/from `network`.
    fn supports_chain(&self, network: &ChainId) -> bool;

    /// Whether `asset` is USDC on `network`, per the strict allowlist.
    fn is_usdc(&self, network: &ChainId, asset: Address) -> bool;

    /// Whether the bridge can currently move `amount` from `source` to
    /// `destination`.
    async fn check_liquidity(
        &self,
        source: &ChainId,
        destination: &ChainId,
        asset: Address,
        amount: U256,
    ) -> Result<bool, BridgeError>;

    /// Exchange rate between the two assets. 1.0 for USDC to USDC under
    /// burn-and-mint.
    fn exchange_rate(
        &self,
        source: &ChainId,
        destination: &ChainId,
        source_asset: Address,
        destination_asset: Address,
    ) -> f64;

    /// Waits for the source-chain settlement transaction to be confirmed.
    async fn await_source_confirmation(
        &self,
        network: &ChainId,
        tx_hash: &str,
    ) -> Result<(), BridgeError>;

    /// Burns on the source chain and mints on the destination.
    ///
    /// May return before the mint confirms; in that case
    /// [`BridgeResult::destination_tx_hash`] is `None` and
    /// [`reconcile`](Self::reconcile) picks up from the recorded
    /// `message_id`.
    async fn bridge(&self, request: &BridgeRequest) -> Result<BridgeResult, BridgeError>;

    /// Attempts to complete a job whose burn was already submitted.
    ///
    /// Returns `Ok(None)` while the bridge network has not yet finalized
    /// the transfer. Never re-burns: this is what makes worker retries safe
    /// after a crash between burn and mint.
    async fn reconcile(&self, job: &BridgeJob) -> Result<Option<BridgeResult>, BridgeError>;
}

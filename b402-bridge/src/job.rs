//! The durable unit of cross-chain work.
//!
//! One [`BridgeJob`] exists per settled cross-chain payment, keyed by
//! `sourceNetwork:sourceTxHash:destinationNetwork`. Jobs move through a
//! small monotonic state machine; terminal states are never left.

use alloy_primitives::Address;
use b402::ChainId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Lifecycle state of a bridge job.
///
/// ```text
/// pending → bridging → { completed, failed }
/// pending → cancelled          (admin action only)
/// bridging → bridging          (retry loop)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeJobStatus {
    /// Created, not yet picked up by the worker.
    Pending,
    /// An attempt is in flight or scheduled for retry.
    Bridging,
    /// Funds minted on the destination chain.
    Completed,
    /// Attempts exhausted or a permanent error occurred.
    Failed,
    /// Cancelled by an operator before processing started.
    Cancelled,
}

impl BridgeJobStatus {
    /// Returns `true` for states that are never left.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Returns the stable storage string for this status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Bridging => "bridging",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether the state machine allows moving from `self` to `next`.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        match (self, next) {
            (Self::Pending, Self::Bridging | Self::Cancelled)
            | (Self::Bridging, Self::Bridging | Self::Completed | Self::Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for BridgeJobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BridgeJobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "bridging" => Ok(Self::Bridging),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown bridge job status {other:?}")),
        }
    }
}

/// Attempted transition that the state machine forbids.
#[derive(Debug, thiserror::Error)]
#[error("bridge job {id}: illegal transition {from} -> {to}")]
pub struct IllegalTransition {
    /// The job id.
    pub id: String,
    /// Current status.
    pub from: BridgeJobStatus,
    /// Requested status.
    pub to: BridgeJobStatus,
}

/// A durable bridge job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeJob {
    /// Opaque job id.
    pub id: String,
    /// `sourceNetwork:sourceTxHash:destinationNetwork` — unique per job.
    pub idempotency_key: String,
    /// Chain the payment settled on.
    pub source_network: ChainId,
    /// Chain the merchant receives on.
    pub destination_network: ChainId,
    /// The settlement transaction on the source chain.
    pub source_tx_hash: String,
    /// Amount to bridge, atomic units as a decimal string.
    pub amount: String,
    /// Token contract on the destination chain.
    pub destination_asset: Address,
    /// Merchant address on the destination chain.
    pub destination_pay_to: Address,
    /// Lifecycle state.
    pub status: BridgeJobStatus,
    /// Number of processing attempts so far. Non-decreasing.
    pub attempts: u32,
    /// Last error message; only meaningful while failed or retrying.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// The burn transaction on the source chain, once submitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bridge_tx_hash: Option<String>,
    /// The mint transaction on the destination chain; set iff completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_tx_hash: Option<String>,
    /// Bridge-network message identifier, for reconciliation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    /// Creation time, Unix seconds.
    pub created_at: u64,
    /// Last update time, Unix seconds.
    pub updated_at: u64,
}

/// Builds the idempotency key for a (source, sourceTx, destination) triple.
#[must_use]
pub fn idempotency_key(source: &ChainId, source_tx_hash: &str, destination: &ChainId) -> String {
    format!("{source}:{source_tx_hash}:{destination}")
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

impl BridgeJob {
    /// Creates a fresh `pending` job.
    #[must_use]
    pub fn new(
        source_network: ChainId,
        destination_network: ChainId,
        source_tx_hash: String,
        amount: String,
        destination_asset: Address,
        destination_pay_to: Address,
    ) -> Self {
        let now = unix_now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            idempotency_key: idempotency_key(&source_network, &source_tx_hash, &destination_network),
            source_network,
            destination_network,
            source_tx_hash,
            amount,
            destination_asset,
            destination_pay_to,
            status: BridgeJobStatus::Pending,
            attempts: 0,
            last_error: None,
            bridge_tx_hash: None,
            destination_tx_hash: None,
            message_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Moves the job to `next`, bumping `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns [`IllegalTransition`] when the state machine forbids the
    /// move — in particular any transition out of a terminal state.
    pub fn transition(&mut self, next: BridgeJobStatus) -> Result<(), IllegalTransition> {
        if !self.status.can_transition_to(next) {
            return Err(IllegalTransition {
                id: self.id.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.touch();
        Ok(())
    }

    /// Bumps `updated_at` to now.
    pub fn touch(&mut self) {
        self.updated_at = unix_now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> BridgeJob {
        BridgeJob::new(
            ChainId::eip155(84_532),
            ChainId::eip155(11_155_111),
            "0xsource".into(),
            "10000".into(),
            Address::repeat_byte(0x33),
            Address::repeat_byte(0x44),
        )
    }

    #[test]
    fn idempotency_key_format() {
        let j = job();
        assert_eq!(j.idempotency_key, "eip155:84532:0xsource:eip155:11155111");
    }

    #[test]
    fn happy_path_transitions() {
        let mut j = job();
        j.transition(BridgeJobStatus::Bridging).unwrap();
        // Retry loop stays in bridging.
        j.transition(BridgeJobStatus::Bridging).unwrap();
        j.transition(BridgeJobStatus::Completed).unwrap();
        assert!(j.status.is_terminal());
    }

    #[test]
    fn terminal_states_are_sticky() {
        let mut j = job();
        j.transition(BridgeJobStatus::Bridging).unwrap();
        j.transition(BridgeJobStatus::Failed).unwrap();
        for next in [
            BridgeJobStatus::Pending,
            BridgeJobStatus::Bridging,
            BridgeJobStatus::Completed,
            BridgeJobStatus::Cancelled,
        ] {
            assert!(j.clone().transition(next).is_err());
        }
    }

    #[test]
    fn cancel_only_from_pending() {
        let mut j = job();
        j.transition(BridgeJobStatus::Cancelled).unwrap();

        let mut j = job();
        j.transition(BridgeJobStatus::Bridging).unwrap();
        assert!(j.transition(BridgeJobStatus::Cancelled).is_err());
    }

    #[test]
    fn no_skipping_pending_to_completed() {
        let mut j = job();
        assert!(j.transition(BridgeJobStatus::Completed).is_err());
    }

    #[test]
    fn status_round_trips_through_storage_string() {
        for status in [
            BridgeJobStatus::Pending,
            BridgeJobStatus::Bridging,
            BridgeJobStatus::Completed,
            BridgeJobStatus::Failed,
            BridgeJobStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<BridgeJobStatus>().unwrap(), status);
        }
    }
}

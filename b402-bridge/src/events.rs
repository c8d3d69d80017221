//! Audit events for bridge lifecycle transitions.
//!
//! Every transition emits one structured event through an [`EventSink`].
//! The envelope is forward-compatible: consumers must ignore unknown
//! fields, and `event_version` gates breaking changes.

use serde::Serialize;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;

use crate::job::BridgeJob;
use crate::provider::Recoverability;

/// Bridge lifecycle event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeEventType {
    /// Job accepted and persisted.
    BridgeStart,
    /// A processing attempt began.
    BridgeAttempt,
    /// Funds minted on the destination chain.
    BridgeSuccess,
    /// An attempt (or the whole job) failed.
    BridgeFailure,
}

impl BridgeEventType {
    /// Stable wire string for this event type.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::BridgeStart => "bridge_start",
            Self::BridgeAttempt => "bridge_attempt",
            Self::BridgeSuccess => "bridge_success",
            Self::BridgeFailure => "bridge_failure",
        }
    }
}

/// At-least-once audit event envelope.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeEvent {
    /// Unique event id.
    pub event_id: String,
    /// Event type.
    pub event_type: BridgeEventType,
    /// Envelope version.
    pub event_version: u8,
    /// Emission time, Unix seconds.
    pub occurred_at: u64,
    /// The job's idempotency key.
    pub idempotency_key: String,
    /// Event-type-specific payload.
    pub payload: serde_json::Value,
}

/// Details carried by failure events.
#[derive(Debug, Clone)]
pub struct FailureDetails {
    /// Error description.
    pub error: String,
    /// Optional machine-readable error code.
    pub code: Option<String>,
    /// Retry classification, when known.
    pub recoverability: Option<Recoverability>,
}

impl BridgeEvent {
    /// Builds an event for a job transition.
    #[must_use]
    pub fn for_job(
        event_type: BridgeEventType,
        job: &BridgeJob,
        max_attempts: u32,
        failure: Option<&FailureDetails>,
    ) -> Self {
        let mut payload = serde_json::json!({
            "jobId": job.id,
            "sourceTx": job.source_tx_hash,
            "sourceNetwork": job.source_network.to_string(),
            "destinationNetwork": job.destination_network.to_string(),
            "amount": job.amount,
            "attempt": job.attempts,
            "maxAttempts": max_attempts,
        });
        if let Some(failure) = failure {
            payload["error"] = serde_json::Value::String(failure.error.clone());
            if let Some(code) = &failure.code {
                payload["errorCode"] = serde_json::Value::String(code.clone());
            }
            if let Some(recoverability) = failure.recoverability {
                payload["recoverability"] =
                    serde_json::Value::String(recoverability.as_str().to_owned());
            }
        }
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            event_type,
            event_version: 1,
            occurred_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default(),
            idempotency_key: job.idempotency_key.clone(),
            payload,
        }
    }
}

/// Destination for audit events.
pub trait EventSink: Send + Sync {
    /// Emits one event. Must not block on downstream consumers.
    fn emit(&self, event: BridgeEvent);
}

/// Default sink: structured tracing records under the `bridge_audit`
/// target, one line per event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: BridgeEvent) {
        let payload = serde_json::to_string(&event.payload).unwrap_or_default();
        info!(
            target: "bridge_audit",
            event = event.event_type.as_str(),
            event_id = %event.event_id,
            event_version = event.event_version,
            occurred_at = event.occurred_at,
            idempotency_key = %event.idempotency_key,
            payload = %payload,
            "bridge event"
        );
    }
}

/// Sink that records events in memory, for assertions in tests.
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<BridgeEvent>>,
}

impl RecordingEventSink {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every event emitted so far.
    #[must_use]
    pub fn events(&self) -> Vec<BridgeEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl EventSink for RecordingEventSink {
    fn emit(&self, event: BridgeEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::Address;
    use b402::ChainId;

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
    fn envelope_carries_required_fields() {
        let event = BridgeEvent::for_job(BridgeEventType::BridgeAttempt, &job(), 3, None);
        assert_eq!(event.event_version, 1);
        assert!(!event.event_id.is_empty());
        assert_eq!(event.payload["sourceNetwork"], "eip155:84532");
        assert_eq!(event.payload["destinationNetwork"], "eip155:11155111");
        assert_eq!(event.payload["maxAttempts"], 3);
        assert!(event.payload.get("error").is_none());
    }

    #[test]
    fn failure_events_carry_error_fields() {
        let failure = FailureDetails {
            error: "gateway timeout".into(),
            code: Some("504".into()),
            recoverability: Some(Recoverability::Transient),
        };
        let event =
            BridgeEvent::for_job(BridgeEventType::BridgeFailure, &job(), 3, Some(&failure));
        assert_eq!(event.payload["error"], "gateway timeout");
        assert_eq!(event.payload["errorCode"], "504");
        assert_eq!(event.payload["recoverability"], "TRANSIENT");
    }

    #[test]
    fn wire_event_type_strings() {
        assert_eq!(
            serde_json::to_string(&BridgeEventType::BridgeStart).unwrap(),
            "\"bridge_start\""
        );
        assert_eq!(BridgeEventType::BridgeSuccess.as_str(), "bridge_success");
    }
}

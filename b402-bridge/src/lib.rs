//! Durable cross-chain bridging for the b402 facilitator.
//!
//! After a cross-chain payment settles on the source chain, the funds sit
//! at the facilitator's address and must reach the merchant on the
//! destination chain. This crate owns that second half:
//!
//! - [`job`] — the [`BridgeJob`](job::BridgeJob) record and its state machine
//! - [`store`] — durable job storage keyed by idempotency key
//! - [`provider`] — the [`BridgeProvider`](provider::BridgeProvider)
//!   capability abstracting the burn-and-mint bridge
//! - [`cctp`] — the concrete burn-and-mint implementation
//! - [`worker`] — the background processor: retries, reconciliation,
//!   recovery scans
//! - [`events`] — the audit event envelope emitted on every transition
//!
//! Bridge failures never propagate to the HTTP path that enqueued the job;
//! they are classified and retried (or parked as `failed`) by the worker.

pub mod cctp;
pub mod events;
pub mod job;
pub mod provider;
pub mod store;
pub mod worker;

pub use job::{BridgeJob, BridgeJobStatus};
pub use provider::{BridgeError, BridgeProvider, BridgeRequest, BridgeResult, Recoverability};
pub use store::{BridgeJobStore, InMemoryJobStore, SqliteJobStore, StoreError};
pub use worker::{BridgeWorker, BridgeWorkerConfig};

//! Core trait and error type for payment facilitators.
//!
//! [`Facilitator`] is the unified async interface for anything that can
//! verify and settle payments: the EVM exact-scheme handler, the cross-chain
//! router wrapping it, and hook decorators. It is dyn-compatible so
//! heterogeneous handlers live together in a registry.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::proto;
use crate::proto::FailureReason;

/// Boxed future returned by [`Facilitator`] methods.
pub type FacilitatorFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, FacilitatorError>> + Send + 'a>>;

/// Errors that can occur during facilitator operations.
///
/// Expected payment failures are not errors: they surface as
/// `Invalid`/`Error` variants of the response types. This error covers the
/// cases where no structured response could be produced at all.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum FacilitatorError {
    /// The request body does not decode into the handler's payload shape.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
    /// A lifecycle hook aborted the operation.
    #[error("{reason}: {message}")]
    Aborted {
        /// Machine-readable abort reason.
        reason: FailureReason,
        /// Human-readable abort message.
        message: String,
    },
    /// An unexpected internal failure (RPC transport, task panic, etc.).
    #[error("internal error: {0}")]
    Internal(String),
}

impl FacilitatorError {
    /// The failure reason to surface for this error in a structured response.
    #[must_use]
    pub const fn reason(&self) -> FailureReason {
        match self {
            Self::InvalidPayload(_) => FailureReason::InvalidPayloadFormat,
            Self::Aborted { reason, .. } => *reason,
            Self::Internal(_) => FailureReason::UnexpectedError,
        }
    }
}

impl From<serde_json::Error> for FacilitatorError {
    fn from(value: serde_json::Error) -> Self {
        Self::InvalidPayload(value.to_string())
    }
}

/// Asynchronous interface for payment facilitators.
///
/// Implementations verify payment authorizations, settle them on-chain, and
/// report their capabilities. All expected payment failures are encoded in
/// the response types; only infrastructure-level problems become `Err`.
pub trait Facilitator: Send + Sync {
    /// Verifies a proposed payment payload against its requirements.
    ///
    /// Checks payload integrity, signature validity, temporal bounds,
    /// balance sufficiency, and requirement compliance.
    fn verify(&self, request: proto::VerifyRequest) -> FacilitatorFuture<'_, proto::VerifyResponse>;

    /// Settles a payment on-chain.
    ///
    /// Re-verifies the payload and, if valid, submits the settlement
    /// transaction and waits for its receipt.
    fn settle(&self, request: proto::SettleRequest) -> FacilitatorFuture<'_, proto::SettleResponse>;

    /// Returns the payment kinds this facilitator can process.
    fn supported(&self) -> FacilitatorFuture<'_, proto::SupportedResponse>;
}

impl<T: Facilitator> Facilitator for Arc<T> {
    fn verify(&self, request: proto::VerifyRequest) -> FacilitatorFuture<'_, proto::VerifyResponse> {
        self.as_ref().verify(request)
    }

    fn settle(&self, request: proto::SettleRequest) -> FacilitatorFuture<'_, proto::SettleResponse> {
        self.as_ref().settle(request)
    }

    fn supported(&self) -> FacilitatorFuture<'_, proto::SupportedResponse> {
        self.as_ref().supported()
    }
}

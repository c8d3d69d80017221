//! Axum route handlers for the facilitator HTTP surface.
//!
//! - `POST /verify` — verify a payment (200 with `{isValid, ...}`)
//! - `POST /settle` — settle a payment (200 with `{success, ...}`)
//! - `GET /supported` — supported kinds, extensions, signers
//! - `GET /health` — liveness
//! - `GET /bridge-status/{id}` — bridge job inspection
//! - `POST /bridge-cancel/{id}` — admin cancellation of a pending job
//!
//! Expected payment failures always come back as 200 with a structured
//! body; only malformed bodies (400) and infrastructure errors (500)
//! deviate.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use b402::facilitator::FacilitatorError;
use b402::proto::{
    FailureReason, SettleRequest, SettleResponse, SupportedResponse, VerifyRequest, VerifyResponse,
};
use b402_bridge::worker::CancelError;
use b402_bridge::{BridgeJob, BridgeWorker};

use crate::error::ApiError;
use crate::registry::SchemeRegistry;

/// Service name reported by `/health`.
const FACILITATOR_NAME: &str = "b402-facilitator";

/// Shared state behind the routes.
pub struct AppState {
    /// Scheme handlers keyed by `(scheme, network)`.
    pub registry: SchemeRegistry,
    /// The bridge worker, for the admin endpoints.
    pub worker: Option<Arc<BridgeWorker>>,
}

/// Shared state handle.
pub type FacilitatorState = Arc<AppState>;

/// Builds the facilitator router.
pub fn facilitator_router(state: FacilitatorState) -> Router {
    Router::new()
        .route("/verify", post(post_verify))
        .route("/settle", post(post_settle))
        .route("/supported", get(get_supported))
        .route("/health", get(get_health))
        .route("/bridge-status/{id}", get(get_bridge_status))
        .route("/bridge-cancel/{id}", post(post_bridge_cancel))
        .with_state(state)
}

/// `POST /verify`
async fn post_verify(
    State(state): State<FacilitatorState>,
    body: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<Json<VerifyResponse>, ApiError> {
    let Json(body) = body.map_err(|e| ApiError::MalformedBody(e.to_string()))?;
    let request = VerifyRequest::from(body);
    let Some(key) = request.dispatch_key() else {
        return Err(ApiError::MalformedBody(
            "paymentRequirements.scheme/network missing".into(),
        ));
    };
    let Some(handler) = state.registry.by_key(&key) else {
        return Ok(Json(VerifyResponse::invalid(
            FailureReason::UnsupportedScheme,
        )));
    };
    match handler.verify(request).await {
        Ok(response) => Ok(Json(response)),
        Err(FacilitatorError::Aborted { reason, .. }) => {
            Ok(Json(VerifyResponse::invalid(reason)))
        }
        Err(FacilitatorError::InvalidPayload(e)) => Err(ApiError::MalformedBody(e)),
        Err(FacilitatorError::Internal(e)) => Err(ApiError::Internal(e)),
        Err(e) => Err(ApiError::Internal(e.to_string())),
    }
}

/// `POST /settle`
async fn post_settle(
    State(state): State<FacilitatorState>,
    body: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<Json<SettleResponse>, ApiError> {
    let Json(body) = body.map_err(|e| ApiError::MalformedBody(e.to_string()))?;
    let request = SettleRequest::from(body);
    let Some(key) = request.dispatch_key() else {
        return Err(ApiError::MalformedBody(
            "paymentRequirements.scheme/network missing".into(),
        ));
    };
    let network = key.network.clone();
    let Some(handler) = state.registry.by_key(&key) else {
        return Ok(Json(SettleResponse::Error {
            reason: FailureReason::UnsupportedScheme,
            network,
            payer: None,
        }));
    };
    match handler.settle(request).await {
        Ok(response) => Ok(Json(response)),
        Err(FacilitatorError::Aborted { reason, .. }) => Ok(Json(SettleResponse::Error {
            reason,
            network,
            payer: None,
        })),
        Err(FacilitatorError::InvalidPayload(e)) => Err(ApiError::MalformedBody(e)),
        Err(FacilitatorError::Internal(e)) => Err(ApiError::Internal(e)),
        Err(e) => Err(ApiError::Internal(e.to_string())),
    }
}

/// `GET /supported`
async fn get_supported(State(state): State<FacilitatorState>) -> Json<SupportedResponse> {
    Json(state.registry.supported().await)
}

/// `GET /health`
async fn get_health() -> Json<serde_json::Value> {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": timestamp,
        "facilitator": FACILITATOR_NAME,
    }))
}

/// `GET /bridge-status/{id}`
async fn get_bridge_status(
    State(state): State<FacilitatorState>,
    Path(id): Path<String>,
) -> Result<Json<BridgeJob>, ApiError> {
    let worker = state
        .worker
        .as_ref()
        .ok_or_else(|| ApiError::NotFound("bridging is not enabled".into()))?;
    let job = worker
        .store()
        .get_by_id(&id)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound(format!("bridge job {id}")))?;
    Ok(Json(job))
}

/// `POST /bridge-cancel/{id}`
async fn post_bridge_cancel(
    State(state): State<FacilitatorState>,
    Path(id): Path<String>,
) -> Result<Json<BridgeJob>, ApiError> {
    let worker = state
        .worker
        .as_ref()
        .ok_or_else(|| ApiError::NotFound("bridging is not enabled".into()))?;
    match worker.cancel(&id).await {
        Ok(job) => Ok(Json(job)),
        Err(CancelError::NotFound(id)) => Err(ApiError::NotFound(format!("bridge job {id}"))),
        Err(e @ CancelError::NotCancellable { .. }) => Err(ApiError::MalformedBody(e.to_string())),
        Err(CancelError::Store(e)) => Err(ApiError::Internal(e.to_string())),
    }
}

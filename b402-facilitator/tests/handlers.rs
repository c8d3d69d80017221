//! HTTP surface behavior: status codes, wire shapes, dispatch.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use b402::facilitator::{Facilitator, FacilitatorFuture};
use b402::proto::{
    self, DispatchKey, SettleResponse, SupportedPaymentKind, SupportedResponse, VerifyResponse,
    X402_VERSION,
};
use b402::ChainId;
use b402_facilitator::handlers::{facilitator_router, AppState};
use b402_facilitator::registry::SchemeRegistry;
use tower::ServiceExt;

/// Handler stub that always accepts.
struct AcceptingFacilitator;

impl Facilitator for AcceptingFacilitator {
    fn verify(&self, _request: proto::VerifyRequest) -> FacilitatorFuture<'_, VerifyResponse> {
        Box::pin(async { Ok(VerifyResponse::valid("0xpayer".into())) })
    }

    fn settle(&self, _request: proto::SettleRequest) -> FacilitatorFuture<'_, SettleResponse> {
        Box::pin(async {
            Ok(SettleResponse::Success {
                payer: "0xpayer".into(),
                transaction: "0xtx".into(),
                network: ChainId::eip155(84_532),
            })
        })
    }

    fn supported(&self) -> FacilitatorFuture<'_, SupportedResponse> {
        Box::pin(async {
            Ok(SupportedResponse {
                kinds: vec![SupportedPaymentKind {
                    x402_version: X402_VERSION,
                    scheme: "exact".into(),
                    network: "eip155:84532".into(),
                    extra: None,
                }],
                extensions: vec!["cross-chain".into()],
                signers: [("eip155:*".to_owned(), vec!["0xfac".to_owned()])]
                    .into_iter()
                    .collect(),
            })
        })
    }
}

fn app() -> axum::Router {
    let mut registry = SchemeRegistry::new();
    registry.register(
        DispatchKey {
            scheme: "exact".into(),
            network: ChainId::eip155(84_532),
        },
        Arc::new(AcceptingFacilitator),
    );
    facilitator_router(Arc::new(AppState {
        registry,
        worker: None,
    }))
}

fn verify_body(scheme: &str, network: &str) -> String {
    serde_json::json!({
        "paymentPayload": {},
        "paymentRequirements": {"scheme": scheme, "network": network},
    })
    .to_string()
}

async fn json_of(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn malformed_body_is_400() {
    let response = app()
        .oneshot(
            Request::post("/verify")
                .header("content-type", "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_scheme_is_200_with_reason() {
    let response = app()
        .oneshot(
            Request::post("/verify")
                .header("content-type", "application/json")
                .body(Body::from(verify_body("lightning", "eip155:84532")))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_of(response).await;
    assert_eq!(body["isValid"], false);
    assert_eq!(body["invalidReason"], "unsupported_scheme");
}

#[tokio::test]
async fn unknown_network_is_200_with_reason() {
    let response = app()
        .oneshot(
            Request::post("/verify")
                .header("content-type", "application/json")
                .body(Body::from(verify_body("exact", "eip155:999999")))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_of(response).await;
    assert_eq!(body["invalidReason"], "unsupported_scheme");
}

#[tokio::test]
async fn verify_dispatches_to_registered_handler() {
    let response = app()
        .oneshot(
            Request::post("/verify")
                .header("content-type", "application/json")
                .body(Body::from(verify_body("exact", "eip155:84532")))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_of(response).await;
    assert_eq!(body["isValid"], true);
    assert_eq!(body["payer"], "0xpayer");
}

#[tokio::test]
async fn settle_returns_transaction_and_network() {
    let response = app()
        .oneshot(
            Request::post("/settle")
                .header("content-type", "application/json")
                .body(Body::from(verify_body("exact", "eip155:84532")))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_of(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["transaction"], "0xtx");
    assert_eq!(body["network"], "eip155:84532");
}

#[tokio::test]
async fn supported_lists_kinds_extensions_signers() {
    let response = app()
        .oneshot(Request::get("/supported").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_of(response).await;
    assert_eq!(body["kinds"][0]["scheme"], "exact");
    assert_eq!(body["kinds"][0]["x402Version"], 2);
    assert_eq!(body["extensions"][0], "cross-chain");
    assert_eq!(body["signers"]["eip155:*"][0], "0xfac");
}

#[tokio::test]
async fn health_reports_status_and_timestamp() {
    let response = app()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_of(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["facilitator"], "b402-facilitator");
    assert!(body["timestamp"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn bridge_status_without_worker_is_404() {
    let response = app()
        .oneshot(
            Request::get("/bridge-status/some-id")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

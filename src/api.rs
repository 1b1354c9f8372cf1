//! HTTP surface
//!
//! | Method | Path                                      | Description                          |
//! |--------|-------------------------------------------|--------------------------------------|
//! | POST   | `/api/create-purchase-transaction`        | Build and co-sign a purchase         |
//! | POST   | `/api/complete-purchase`                  | Record a landed purchase             |
//! | GET    | `/api/purchase-status/:walletAddress`     | Purchases of a wallet with lock state |
//! | GET    | `/health`                                 | Liveness probe                       |
//! | GET    | `/metrics`                                | Prometheus text format               |
//!
//! The purchase routes are also served without the `/api` prefix.
//!
//! Every JSON response carries `success`. Failures add `message` and `error`;
//! malformed input is a 400, everything else a 500.

use crate::metrics::metrics;
use crate::observability::{CorrelationId, PurchaseLogger};
use crate::service::{CompletePurchaseRequest, CreatePurchaseRequest, PurchaseService, ServiceError};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::Instrument;

pub const CORRELATION_HEADER: &str = "x-request-id";

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<PurchaseService>,
    pub metrics_enabled: bool,
}

impl AppState {
    pub fn new(service: Arc<PurchaseService>) -> Self {
        Self {
            service,
            metrics_enabled: true,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    let purchase_routes = Router::new()
        .route("/create-purchase-transaction", post(create_purchase_handler))
        .route("/complete-purchase", post(complete_purchase_handler))
        .route("/purchase-status/:wallet_address", get(purchase_status_handler));

    Router::new()
        .nest("/api", purchase_routes.clone())
        .merge(purchase_routes)
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn correlation(headers: &HeaderMap) -> PurchaseLogger {
    let id = headers
        .get(CORRELATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(CorrelationId::from)
        .unwrap_or_default();
    PurchaseLogger::new(id)
}

fn failure(status: StatusCode, message: &str, error: impl ToString) -> Response {
    (
        status,
        Json(json!({
            "success": false,
            "message": message,
            "error": error.to_string(),
        })),
    )
        .into_response()
}

fn service_failure(err: &ServiceError, server_message: &str) -> Response {
    if err.is_client_error() {
        failure(StatusCode::BAD_REQUEST, &err.to_string(), err)
    } else {
        failure(StatusCode::INTERNAL_SERVER_ERROR, server_message, err)
    }
}

fn bad_body(rejection: JsonRejection) -> Response {
    failure(
        StatusCode::BAD_REQUEST,
        "Missing required fields or malformed request body",
        rejection.body_text(),
    )
}

async fn create_purchase_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<CreatePurchaseRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_body(rejection),
    };
    let log = correlation(&headers);
    let span = tracing::info_span!("create_purchase", correlation_id = %log.correlation_id());

    match state
        .service
        .create_purchase_transaction(&request, &log)
        .instrument(span)
        .await
    {
        Ok(created) => Json(json!({
            "success": true,
            "message": "Transaction created successfully",
            "transaction": created.transaction,
            "metadata": created.metadata,
        }))
        .into_response(),
        Err(e) => service_failure(&e, "Failed to create purchase transaction"),
    }
}

async fn complete_purchase_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<CompletePurchaseRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_body(rejection),
    };
    let log = correlation(&headers);
    let span = tracing::info_span!("complete_purchase", correlation_id = %log.correlation_id());

    match state
        .service
        .complete_purchase(&request, &log)
        .instrument(span)
        .await
    {
        Ok(done) => {
            let message = if done.already_recorded {
                "Purchase already recorded"
            } else if done.recorded {
                "Purchase completion recorded"
            } else {
                "Purchase confirmed on-chain but could not be recorded"
            };
            Json(json!({
                "success": true,
                "message": message,
                "recorded": done.recorded,
                "purchaseRecord": done.record,
            }))
            .into_response()
        }
        Err(e) => service_failure(&e, "Failed to complete purchase"),
    }
}

async fn purchase_status_handler(
    State(state): State<AppState>,
    Path(wallet_address): Path<String>,
) -> Response {
    match state.service.purchase_status(&wallet_address).await {
        Ok(purchases) => Json(json!({
            "success": true,
            "purchases": purchases,
        }))
        .into_response(),
        Err(e) => service_failure(&e, "Failed to get purchase status"),
    }
}

async fn health_handler(State(state): State<AppState>) -> Response {
    let facilitator = state.service.facilitator().ok().map(|f| f.pubkey().to_string());
    Json(json!({
        "status": "ok",
        "facilitator": facilitator,
        "realm": state.service.realm().to_string(),
    }))
    .into_response()
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    if !state.metrics_enabled {
        return StatusCode::NOT_FOUND.into_response();
    }
    match metrics().render() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;
    use crate::compat;
    use crate::ledger::PurchaseLedger;
    use crate::rpc::LandedTransaction;
    use crate::signer::{FacilitatorSigner, SigningError};
    use crate::test_utils::{test_program, MockRpc};
    use crate::tx_builder::{ProgramInterface, PurchaseTxBuilder};
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use solana_sdk::{pubkey::Pubkey, signature::Keypair, signature::Signature};
    use tower::ServiceExt;

    fn router_with(rpc: Arc<MockRpc>, facilitator: Result<FacilitatorSigner, SigningError>) -> Router {
        let builder = PurchaseTxBuilder::new(test_program(), Arc::new(ProgramInterface::builtin()), rpc.clone());
        let service = PurchaseService::new(builder, facilitator, rpc, PurchaseLedger::default());
        create_router(AppState::new(Arc::new(service)))
    }

    fn router(rpc: Arc<MockRpc>) -> Router {
        router_with(rpc, Ok(FacilitatorSigner::from_keypair(Keypair::new())))
    }

    async fn send(router: &Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    async fn get(router: &Router, path: &str) -> (StatusCode, serde_json::Value) {
        send(router, Request::builder().uri(path).body(Body::empty()).unwrap()).await
    }

    async fn post_json(router: &Router, path: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        let req = Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap();
        send(router, req).await
    }

    #[tokio::test]
    async fn test_create_returns_transaction_and_metadata() {
        let router = router(Arc::new(MockRpc::new()));
        let wallet = Pubkey::new_unique();
        let (status, json) = post_json(
            &router,
            "/api/create-purchase-transaction",
            json!({ "walletAddress": wallet.to_string(), "solAmount": 2.0, "lockDurationMonths": 3 }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], true);
        assert!((json["metadata"]["tokenAmount"].as_f64().unwrap() - 212.0).abs() < 1e-9);
        assert_eq!(json["metadata"]["isLocked"], true);
        assert_eq!(json["metadata"]["buildPath"], "programCall");
        let tx = codec::decode(json["transaction"].as_str().unwrap()).unwrap();
        assert_eq!(compat::pending_signers(&tx), vec![wallet]);
    }

    #[tokio::test]
    async fn test_missing_field_is_bad_request() {
        let router = router(Arc::new(MockRpc::new()));
        let (status, json) = post_json(
            &router,
            "/api/create-purchase-transaction",
            json!({ "walletAddress": Pubkey::new_unique().to_string(), "lockDurationMonths": 1 }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["success"], false);
        assert!(json["error"].as_str().unwrap().contains("solAmount"));

        let (status, _) = post_json(
            &router,
            "/api/create-purchase-transaction",
            json!({ "walletAddress": "x", "solAmount": "lots", "lockDurationMonths": 1 }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_missing_facilitator_is_server_error() {
        let router = router_with(
            Arc::new(MockRpc::new()),
            Err(SigningError::FacilitatorUnavailable("admin-keypair.json: not found".into())),
        );
        let (status, json) = post_json(
            &router,
            "/api/create-purchase-transaction",
            json!({ "walletAddress": Pubkey::new_unique().to_string(), "solAmount": 1.0, "lockDurationMonths": 1 }),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["success"], false);
        assert_eq!(json["message"], "Failed to create purchase transaction");
    }

    #[tokio::test]
    async fn test_complete_then_status() {
        let rpc = Arc::new(MockRpc::new());
        let router = router(rpc.clone());
        let wallet = Pubkey::new_unique();
        let sig = Signature::new_unique();
        let body = json!({
            "walletAddress": wallet.to_string(),
            "solAmount": 0.005,
            "lockDurationMonths": 1,
            "transactionSignature": sig.to_string(),
        });

        let (status, json) = post_json(&router, "/api/complete-purchase", body.clone()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "Transaction not found on-chain");

        rpc.insert_transaction(sig, LandedTransaction { slot: 3, block_time: None, err: None });
        let (status, json) = post_json(&router, "/api/complete-purchase", body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["message"], "Purchase completion recorded");
        assert_eq!(json["purchaseRecord"]["transactionSignature"], sig.to_string());

        let (status, json) = get(&router, &format!("/api/purchase-status/{}", wallet)).await;
        assert_eq!(status, StatusCode::OK);
        let purchases = json["purchases"].as_array().unwrap();
        assert_eq!(purchases.len(), 1);
        assert!((purchases[0]["amount"].as_f64().unwrap() - 0.51).abs() < 1e-9);
        assert_eq!(purchases[0]["status"], "notLocked");
    }

    #[tokio::test]
    async fn test_routes_served_without_prefix() {
        let router = router(Arc::new(MockRpc::new()));
        let (status, json) = post_json(
            &router,
            "/create-purchase-transaction",
            json!({ "walletAddress": Pubkey::new_unique().to_string(), "solAmount": 1.0, "lockDurationMonths": 12 }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], true);
    }

    #[tokio::test]
    async fn test_status_of_unknown_wallet_is_empty() {
        let router = router(Arc::new(MockRpc::new()));
        let (status, json) = get(&router, &format!("/api/purchase-status/{}", Pubkey::new_unique())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["purchases"], json!([]));
    }

    #[tokio::test]
    async fn test_health_and_metrics() {
        let router = router(Arc::new(MockRpc::new()));
        let (status, json) = get(&router, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
        assert!(json["facilitator"].is_string());

        let resp = router
            .clone()
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let text = resp.into_body().collect().await.unwrap().to_bytes();
        assert!(String::from_utf8_lossy(&text).contains("purchase_tx_created_total"));
    }
}

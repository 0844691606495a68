//! # Payments API
//!
//! Builds the axum router for the payments authorization service. Handlers
//! share application state through axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path                                    | Signed | Description                     |
//! |--------|-----------------------------------------|--------|---------------------------------|
//! | GET    | `/health`                               |        | Liveness probe                  |
//! | GET    | `/v1/payments/info`                     |        | Environment, threshold, keys    |
//! | POST   | `/v1/payments/prepare`                  |        | Record payments idempotently    |
//! | POST   | `/v1/payments/authorize`                |        | Per-document authorizer sign-off|
//! | POST   | `/v1/payments/submit`                   | yes    | Hand a document to its custodian|
//! | GET    | `/v1/payments/transactions/:document_id`|        | Ledger record                   |
//! | GET    | `/v1/payments/payout-status`            |        | Current payout status           |
//! | PUT    | `/v1/payments/payout-status`            | yes    | Replace payout status           |
//! | POST   | `/v1/payments/secrets`                  | yes    | Import a sealed wallet bundle   |

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Path, State},
    http::{Method, StatusCode},
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use settlement::authorization::Keystore;
use settlement::payments::{AuthorizeOutcome, PaymentsService, PayoutStatus, SealedWalletSecret, ServiceInfo};
use settlement::transaction::{PaymentDetails, Transaction};
use settlement::SettlementError;

use crate::metrics::SharedMetrics;
use crate::middleware::require_signature;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared state for every handler. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<PaymentsService>,
    /// Keys allowed to sign operator requests.
    pub keystore: Arc<dyn Keystore>,
    pub metrics: SharedMetrics,
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full [`Router`] with CORS, tracing and signature enforcement
/// on the mutating operator routes.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers(Any);
    let signed = from_fn_with_state(state.clone(), require_signature);

    Router::new()
        .route("/health", get(health_handler))
        .route("/v1/payments/info", get(info_handler))
        .route("/v1/payments/prepare", post(prepare_handler))
        .route("/v1/payments/authorize", post(authorize_handler))
        .route(
            "/v1/payments/submit",
            post(submit_handler).route_layer(signed.clone()),
        )
        .route("/v1/payments/transactions/:document_id", get(transaction_handler))
        .route(
            "/v1/payments/payout-status",
            get(payout_status_handler).merge(put(set_payout_status_handler).route_layer(signed.clone())),
        )
        .route(
            "/v1/payments/secrets",
            post(import_secret_handler).route_layer(signed),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizeRequest {
    pub document_id: String,
    /// Authorizer's Ed25519 public key, hex or `ssh-ed25519`.
    pub public_key: String,
    /// Base64 signature over the document id.
    pub signature: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub document_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSecretResponse {
    pub wallet_key: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Error body: the message and whether an identical retry may succeed.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub retriable: bool,
}

/// [`SettlementError`] rendered as an HTTP response.
pub struct ApiError(SettlementError);

impl From<SettlementError> for ApiError {
    fn from(e: SettlementError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(error = %self.0, status = status.as_u16(), "request failed");
        } else {
            tracing::debug!(error = %self.0, status = status.as_u16(), "request rejected");
        }
        let body = ErrorBody {
            error: self.0.to_string(),
            retriable: self.0.is_retriable(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
    })
}

async fn info_handler(State(state): State<AppState>) -> Json<ServiceInfo> {
    Json(state.service.info())
}

async fn prepare_handler(
    State(state): State<AppState>,
    Json(payments): Json<Vec<PaymentDetails>>,
) -> ApiResult<Vec<Transaction>> {
    let txs = state.service.prepare(payments).await?;
    state.metrics.transactions_prepared_total.inc_by(txs.len() as u64);
    tracing::info!(transactions = txs.len(), "payments prepared");
    Ok(Json(txs))
}

async fn authorize_handler(
    State(state): State<AppState>,
    Json(req): Json<AuthorizeRequest>,
) -> ApiResult<AuthorizeOutcome> {
    let outcome = state
        .service
        .authorize(&req.document_id, &req.public_key, &req.signature)
        .await?;
    state.metrics.authorizations_total.inc();
    Ok(Json(outcome))
}

async fn submit_handler(State(state): State<AppState>, Json(req): Json<SubmitRequest>) -> ApiResult<Transaction> {
    let started = Instant::now();
    let result = state.service.submit(&req.document_id).await;
    state
        .metrics
        .submit_latency_seconds
        .observe(started.elapsed().as_secs_f64());

    let outcome = match &result {
        Ok(_) => "submitted",
        Err(SettlementError::CustodianApi(e)) if e.retriable => "retriable",
        Err(SettlementError::CustodianApi(_)) => "failed",
        Err(_) => "refused",
    };
    state.metrics.submissions_total.with_label_values(&[outcome]).inc();
    Ok(Json(result?))
}

async fn transaction_handler(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
) -> ApiResult<Transaction> {
    Ok(Json(state.service.transaction(&document_id)?))
}

async fn payout_status_handler(State(state): State<AppState>) -> Json<PayoutStatus> {
    Json(state.service.payout_status())
}

async fn set_payout_status_handler(
    State(state): State<AppState>,
    Json(status): Json<PayoutStatus>,
) -> Json<PayoutStatus> {
    state.service.set_payout_status(status);
    Json(state.service.payout_status())
}

async fn import_secret_handler(
    State(state): State<AppState>,
    Json(sealed): Json<SealedWalletSecret>,
) -> ApiResult<ImportSecretResponse> {
    let wallet_key = state.service.import_sealed_secret(&sealed)?;
    Ok(Json(ImportSecretResponse {
        wallet_key: wallet_key.to_string(),
    }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use axum::body::Body;
    use axum::http::Request;
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use settlement::authorization::{AuthorizationVerifier, AuthorizedKeystore, RequestParts, SignatureParams};
    use settlement::config::{AuthorizedKeys, ServiceConfig, SIGNED_REQUEST_HEADERS};
    use settlement::crypto::encryption::generate_key;
    use settlement::crypto::exchange::seal;
    use settlement::crypto::keys::SigningKeypair;
    use settlement::custodian::DryRunCustodianClient;
    use settlement::payments::PayoutState;
    use settlement::storage::{SettlementDb, TransactionLedger};
    use settlement::transaction::TransactionStatus;
    use settlement::vault::VaultSecretStore;

    const ENVIRONMENT: &str = "test";

    struct TestNode {
        router: Router,
        state: AppState,
        signers: Vec<SigningKeypair>,
    }

    fn test_node() -> TestNode {
        let signers: Vec<SigningKeypair> = (0..3).map(|_| SigningKeypair::generate()).collect();
        let mut envs = HashMap::new();
        envs.insert(
            ENVIRONMENT.to_string(),
            signers.iter().map(|s| s.public_key_bytes()).collect(),
        );
        let keys = Arc::new(AuthorizedKeys::new(envs));

        let vault = VaultSecretStore::open_temporary(generate_key()).unwrap();
        vault.generate_mounts().unwrap();
        let service = PaymentsService::new(
            ServiceConfig::new(ENVIRONMENT, 2).unwrap(),
            TransactionLedger::new(SettlementDb::open_temporary().unwrap()),
            AuthorizationVerifier::new(Arc::clone(&keys), 2).unwrap(),
            vault,
            Arc::new(DryRunCustodianClient),
        );
        let state = AppState {
            service: Arc::new(service),
            keystore: Arc::new(AuthorizedKeystore::new(keys, ENVIRONMENT)),
            metrics: Arc::new(crate::metrics::NodeMetrics::new().unwrap()),
        };
        TestNode {
            router: create_router(state.clone()),
            state,
            signers,
        }
    }

    /// Sends a request and returns (status, body_bytes).
    async fn send(router: &Router, req: Request<Body>) -> (StatusCode, Vec<u8>) {
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let body = resp
            .into_body()
            .collect()
            .await
            .unwrap()
            .to_bytes()
            .to_vec();
        (status, body)
    }

    async fn get(router: &Router, path: &str) -> (StatusCode, Vec<u8>) {
        let req = Request::builder().uri(path).body(Body::empty()).unwrap();
        send(router, req).await
    }

    async fn post_json(router: &Router, path: &str, body: serde_json::Value) -> (StatusCode, Vec<u8>) {
        let req = Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap();
        send(router, req).await
    }

    /// Builds a request carrying an HTTP signature over the required headers.
    fn signed_request(signer: &SigningKeypair, method: &str, path: &str, body: serde_json::Value) -> Request<Body> {
        let bytes = serde_json::to_vec(&body).unwrap();
        let mut parts = RequestParts::new(method, path, bytes.clone())
            .with_header("host", "payments.local")
            .with_header("date", "Fri, 16 Oct 2026 12:00:00 GMT")
            .with_header("content-length", bytes.len().to_string())
            .with_header("content-type", "application/json");
        SignatureParams::ed25519(signer.public_key_hex(), &SIGNED_REQUEST_HEADERS)
            .sign(signer, &mut parts)
            .unwrap();

        let mut builder = Request::builder().method(method).uri(path);
        for (name, value) in &parts.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder.body(Body::from(bytes)).unwrap()
    }

    fn payment_json() -> serde_json::Value {
        serde_json::json!([{
            "amount": "12.5",
            "to": "dest-1",
            "from": "origin-1",
            "custodian": "gemini",
            "walletType": "contribution",
            "settlementId": "settlement-1"
        }])
    }

    async fn prepare_one(node: &TestNode) -> String {
        let (status, body) = post_json(&node.router, "/v1/payments/prepare", payment_json()).await;
        assert_eq!(status, StatusCode::OK);
        let txs: Vec<Transaction> = serde_json::from_slice(&body).unwrap();
        txs[0].document_id.clone()
    }

    async fn authorize(node: &TestNode, signer: &SigningKeypair, doc: &str) -> (StatusCode, Vec<u8>) {
        let body = serde_json::json!({
            "documentId": doc,
            "publicKey": signer.public_key_hex(),
            "signature": STANDARD.encode(signer.sign(doc.as_bytes())),
        });
        post_json(&node.router, "/v1/payments/authorize", body).await
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let node = test_node();
        let (status, body) = get(&node.router, "/health").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn info_reports_environment_and_threshold() {
        let node = test_node();
        let (status, body) = get(&node.router, "/v1/payments/info").await;
        assert_eq!(status, StatusCode::OK);
        let info: ServiceInfo = serde_json::from_slice(&body).unwrap();
        assert_eq!(info.environment, ENVIRONMENT);
        assert_eq!(info.authorization_threshold, 2);
        assert_eq!(info.secret_exchange_public_key.len(), 64);
    }

    #[tokio::test]
    async fn prepare_is_idempotent_over_http() {
        let node = test_node();
        let first = prepare_one(&node).await;
        let second = prepare_one(&node).await;
        assert_eq!(first, second);
        assert_eq!(node.state.metrics.transactions_prepared_total.get(), 2);
    }

    #[tokio::test]
    async fn prepare_rejects_empty_batch() {
        let node = test_node();
        let (status, body) = post_json(&node.router, "/v1/payments/prepare", serde_json::json!([])).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let err: ErrorBody = serde_json::from_slice(&body).unwrap();
        assert!(!err.retriable);
    }

    #[tokio::test]
    async fn full_flow_prepare_authorize_submit() {
        let node = test_node();
        let doc = prepare_one(&node).await;

        let (status, body) = authorize(&node, &node.signers[0], &doc).await;
        assert_eq!(status, StatusCode::OK);
        let outcome: AuthorizeOutcome = serde_json::from_slice(&body).unwrap();
        assert_eq!(outcome.distinct_authorizers, 1);
        assert_eq!(outcome.transaction.status, TransactionStatus::Prepared);

        let (status, body) = authorize(&node, &node.signers[1], &doc).await;
        assert_eq!(status, StatusCode::OK);
        let outcome: AuthorizeOutcome = serde_json::from_slice(&body).unwrap();
        assert_eq!(outcome.transaction.status, TransactionStatus::Authorized);

        let req = signed_request(
            &node.signers[2],
            "POST",
            "/v1/payments/submit",
            serde_json::json!({ "documentId": doc }),
        );
        let (status, body) = send(&node.router, req).await;
        assert_eq!(status, StatusCode::OK);
        let tx: Transaction = serde_json::from_slice(&body).unwrap();
        assert_eq!(tx.status, TransactionStatus::Submitted);
        assert_eq!(
            node.state.metrics.submissions_total.with_label_values(&["submitted"]).get(),
            1
        );

        let (status, body) = get(&node.router, &format!("/v1/payments/transactions/{doc}")).await;
        assert_eq!(status, StatusCode::OK);
        let tx: Transaction = serde_json::from_slice(&body).unwrap();
        assert_eq!(tx.status, TransactionStatus::Submitted);
    }

    #[tokio::test]
    async fn submit_below_threshold_is_forbidden() {
        let node = test_node();
        let doc = prepare_one(&node).await;
        authorize(&node, &node.signers[0], &doc).await;

        let req = signed_request(
            &node.signers[0],
            "POST",
            "/v1/payments/submit",
            serde_json::json!({ "documentId": doc }),
        );
        let (status, _) = send(&node.router, req).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(
            node.state.metrics.submissions_total.with_label_values(&["refused"]).get(),
            1
        );
    }

    #[tokio::test]
    async fn unsigned_submit_is_unauthorized() {
        let node = test_node();
        let (status, _) = post_json(
            &node.router,
            "/v1/payments/submit",
            serde_json::json!({ "documentId": "anything" }),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(node.state.metrics.signature_rejections_total.get(), 1);
    }

    #[tokio::test]
    async fn submit_signed_by_unlisted_key_is_unauthorized() {
        let node = test_node();
        let outsider = SigningKeypair::generate();
        let req = signed_request(
            &outsider,
            "POST",
            "/v1/payments/submit",
            serde_json::json!({ "documentId": "anything" }),
        );
        let (status, _) = send(&node.router, req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn tampered_body_fails_digest() {
        let node = test_node();
        let req = signed_request(
            &node.signers[0],
            "POST",
            "/v1/payments/submit",
            serde_json::json!({ "documentId": "a" }),
        );
        let (parts, _) = req.into_parts();
        let tampered = Request::from_parts(parts, Body::from(r#"{"documentId":"b"}"#));
        let (status, _) = send(&node.router, tampered).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn authorize_with_bad_signature_is_forbidden() {
        let node = test_node();
        let doc = prepare_one(&node).await;
        let body = serde_json::json!({
            "documentId": doc,
            "publicKey": node.signers[0].public_key_hex(),
            "signature": STANDARD.encode([0u8; 64]),
        });
        let (status, _) = post_json(&node.router, "/v1/payments/authorize", body).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn unknown_transaction_is_not_found() {
        let node = test_node();
        let (status, _) = get(&node.router, "/v1/payments/transactions/missing").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn payout_status_read_and_signed_replace() {
        let node = test_node();
        let (status, body) = get(&node.router, "/v1/payments/payout-status").await;
        assert_eq!(status, StatusCode::OK);
        let current: PayoutStatus = serde_json::from_slice(&body).unwrap();
        assert_eq!(current.gemini, PayoutState::Off);

        let next = serde_json::json!({
            "unverified": "off",
            "uphold": "processing",
            "gemini": "complete",
            "bitflyer": "off",
            "payoutDate": "2026-10-13"
        });
        let unsigned = Request::builder()
            .method("PUT")
            .uri("/v1/payments/payout-status")
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&next).unwrap()))
            .unwrap();
        let (status, _) = send(&node.router, unsigned).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let req = signed_request(&node.signers[1], "PUT", "/v1/payments/payout-status", next);
        let (status, _) = send(&node.router, req).await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = get(&node.router, "/v1/payments/payout-status").await;
        let current: PayoutStatus = serde_json::from_slice(&body).unwrap();
        assert_eq!(current.uphold, PayoutState::Processing);
        assert_eq!(current.gemini, PayoutState::Complete);
    }

    #[tokio::test]
    async fn sealed_secret_import() {
        let node = test_node();
        let info = node.state.service.info();
        let recipient: [u8; 32] = hex::decode(&info.secret_exchange_public_key)
            .unwrap()
            .try_into()
            .unwrap();
        let bundle = serde_json::json!({
            "providerId": "gemini-provider",
            "clientId": "client-1",
            "clientKey": "key-1",
            "sharedSecret": STANDARD.encode(b"hmac secret"),
        });
        let (sender, sealed) = seal(&recipient, &serde_json::to_vec(&bundle).unwrap()).unwrap();
        let body = serde_json::json!({
            "walletKey": "gemini-contribution",
            "senderPublicKey": hex::encode(sender),
            "sealed": STANDARD.encode(sealed),
        });

        let req = signed_request(&node.signers[0], "POST", "/v1/payments/secrets", body);
        let (status, body) = send(&node.router, req).await;
        assert_eq!(status, StatusCode::OK);
        let resp: ImportSecretResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(resp.wallet_key, "gemini-contribution");
    }
}

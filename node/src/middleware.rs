//! HTTP message signature enforcement for mutating operator routes.

use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};

use settlement::authorization::{verify_request, RequestParts};
use settlement::config::SIGNED_REQUEST_HEADERS;

use crate::api::AppState;

/// Signed bodies are small JSON documents.
const MAX_SIGNED_BODY_BYTES: usize = 1024 * 1024;

/// `keyId` of the signer a request was verified against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedSigner(pub String);

/// Rejects requests whose signature does not cover the required headers
/// with an authorized key. The buffered body is handed on unchanged.
pub async fn require_signature(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let (mut parts, body) = req.into_parts();
    let bytes = match to_bytes(body, MAX_SIGNED_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(_) => return reject(StatusCode::PAYLOAD_TOO_LARGE, "request body too large"),
    };

    let uri = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| parts.uri.path().to_string());
    let mut signed = RequestParts::new(parts.method.as_str(), &uri, bytes.to_vec());
    for (name, value) in &parts.headers {
        if let Ok(value) = value.to_str() {
            signed.set_header(name.as_str(), value);
        }
    }

    match verify_request(state.keystore.as_ref(), &SIGNED_REQUEST_HEADERS, &signed) {
        Ok(key_id) => {
            tracing::debug!(key_id = %key_id, path = %uri, "request signature verified");
            parts.extensions.insert(VerifiedSigner(key_id));
            next.run(Request::from_parts(parts, Body::from(bytes))).await
        }
        Err(e) => {
            state.metrics.signature_rejections_total.inc();
            tracing::warn!(error = %e, path = %uri, "request signature rejected");
            reject(StatusCode::UNAUTHORIZED, &e.to_string())
        }
    }
}

fn reject(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(serde_json::json!({ "error": message, "retriable": false })),
    )
        .into_response()
}

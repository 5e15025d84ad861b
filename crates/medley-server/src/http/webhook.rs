//! The asynchronous reconciliation path.
//!
//! The gateway delivers signed event envelopes at least once, in any order
//! relative to the client redirect. Nothing in the payload is trusted
//! until the signature over the raw body verifies; unsigned requests are
//! rejected before any business logic runs.

use crate::http::checkout::reconcile_response;
use crate::http::handlers::api_error_response;
use crate::services::reconciliation::extract_order;
use crate::AppState;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use medley_api::{ApiError, ApiErrorCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

pub const SIGNATURE_HEADER: &str = "x-checkout-signature";
pub const EVENT_SESSION_COMPLETED: &str = "checkout.session.completed";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    MissingHeader,
    Malformed,
    SkewTooLarge,
    Mismatch,
}

impl std::fmt::Display for SignatureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            Self::MissingHeader => "missing signature header",
            Self::Malformed => "malformed signature header",
            Self::SkewTooLarge => "signature timestamp outside tolerance",
            Self::Mismatch => "signature mismatch",
        };
        f.write_str(reason)
    }
}

/// Verifies `t=<unix>,v1=<hex hmac-sha256>` over `"<t>.<raw body>"`.
/// Timestamp skew is bounded to blunt replay; the comparison is
/// constant-time.
pub fn verify_signature(
    secret: &str,
    header: Option<&str>,
    body: &[u8],
    now_unix: i64,
    max_skew_secs: u64,
) -> Result<(), SignatureError> {
    let header = header.ok_or(SignatureError::MissingHeader)?;
    let mut timestamp: Option<&str> = None;
    let mut provided: Option<&str> = None;
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value),
            Some(("v1", value)) => provided = Some(value),
            _ => {}
        }
    }
    let (timestamp, provided) = match (timestamp, provided) {
        (Some(t), Some(v)) => (t, v),
        _ => return Err(SignatureError::Malformed),
    };
    let ts: i64 = timestamp.parse().map_err(|_| SignatureError::Malformed)?;
    if (now_unix - ts).unsigned_abs() > max_skew_secs {
        return Err(SignatureError::SkewTooLarge);
    }

    let mut payload = Vec::with_capacity(timestamp.len() + 1 + body.len());
    payload.extend_from_slice(timestamp.as_bytes());
    payload.push(b'.');
    payload.extend_from_slice(body);
    let expected = medley_core::hmac_sha256_hex(secret.as_bytes(), &payload)
        .ok_or(SignatureError::Malformed)?;
    if medley_core::signatures_match(&expected, provided) {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: WebhookData,
}

#[derive(Debug, Deserialize)]
pub struct WebhookData {
    pub object: crate::gateway::WireSession,
}

pub async fn webhook_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request_id = state.next_request_id();

    // Fail closed: no configured secret means no trusted webhooks.
    let Some(secret) = state.api.webhook_secret.as_deref() else {
        state.metrics.bump_webhook_rejected();
        warn!(%request_id, "webhook rejected: no secret configured");
        return signature_rejection(&request_id);
    };
    let header = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    let now_unix = chrono::Utc::now().timestamp();
    if let Err(err) = verify_signature(
        secret,
        header,
        &body,
        now_unix,
        state.api.webhook_max_skew_secs,
    ) {
        state.metrics.bump_webhook_rejected();
        // Security event, not a data error: log and stop before any
        // payload inspection.
        warn!(%request_id, reason = %err, "webhook signature rejected");
        return signature_rejection(&request_id);
    }

    let event: WebhookEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            return api_error_response(
                ApiError::validation_failed(json!([{"reason": e.to_string()}]))
                    .with_request_id(&request_id),
            )
        }
    };
    if event.kind != EVENT_SESSION_COMPLETED {
        info!(%request_id, event_id = %event.id, kind = %event.kind, "webhook event ignored");
        return Json(json!({"received": true, "ignored": event.kind})).into_response();
    }

    let session = match event.data.object.into_session() {
        Ok(session) => session,
        Err(e) => {
            return api_error_response(
                ApiError::validation_failed(json!([{"reason": e.to_string()}]))
                    .with_request_id(&request_id),
            )
        }
    };
    let (transaction_id, order) = match extract_order(&session) {
        Ok(pair) => pair,
        Err(reason) => {
            warn!(%request_id, event_id = %event.id, %reason, "webhook metadata rejected");
            return api_error_response(
                ApiError::validation_failed(json!([{"reason": reason}]))
                    .with_request_id(&request_id),
            );
        }
    };

    let reconcile = state.reconciliation.reconcile(
        &transaction_id,
        &order,
        &state.api.default_payment_method,
    );
    let outcome = match tokio::time::timeout(state.api.request_timeout, reconcile).await {
        Ok(outcome) => outcome,
        Err(_) => {
            return crate::http::handlers::internal_error(&request_id, "reconcile timed out")
        }
    };
    reconcile_response(outcome, &transaction_id, &request_id)
}

fn signature_rejection(request_id: &str) -> Response {
    api_error_response(ApiError::new(
        ApiErrorCode::SignatureInvalid,
        "webhook signature could not be verified",
        json!({}),
        request_id,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, ts: i64, body: &[u8]) -> String {
        let mut payload = Vec::new();
        payload.extend_from_slice(ts.to_string().as_bytes());
        payload.push(b'.');
        payload.extend_from_slice(body);
        let mac = medley_core::hmac_sha256_hex(secret.as_bytes(), &payload).expect("hmac");
        format!("t={ts},v1={mac}")
    }

    #[test]
    fn valid_signatures_verify_within_skew() {
        let body = br#"{"id":"evt_1"}"#;
        let header = sign("whsec_test", 1_700_000_000, body);
        assert_eq!(
            verify_signature("whsec_test", Some(&header), body, 1_700_000_010, 300),
            Ok(())
        );
    }

    #[test]
    fn tampered_bodies_and_wrong_secrets_are_rejected() {
        let body = br#"{"id":"evt_1"}"#;
        let header = sign("whsec_test", 1_700_000_000, body);
        assert_eq!(
            verify_signature("whsec_test", Some(&header), b"{}", 1_700_000_000, 300),
            Err(SignatureError::Mismatch)
        );
        assert_eq!(
            verify_signature("whsec_other", Some(&header), body, 1_700_000_000, 300),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn stale_timestamps_and_malformed_headers_are_rejected() {
        let body = b"{}";
        let header = sign("whsec_test", 1_700_000_000, body);
        assert_eq!(
            verify_signature("whsec_test", Some(&header), body, 1_700_009_999, 300),
            Err(SignatureError::SkewTooLarge)
        );
        assert_eq!(
            verify_signature("whsec_test", None, body, 1_700_000_000, 300),
            Err(SignatureError::MissingHeader)
        );
        assert_eq!(
            verify_signature("whsec_test", Some("v1=abc"), body, 1_700_000_000, 300),
            Err(SignatureError::Malformed)
        );
        assert_eq!(
            verify_signature("whsec_test", Some("t=zzz,v1=abc"), body, 1_700_000_000, 300),
            Err(SignatureError::Malformed)
        );
    }
}

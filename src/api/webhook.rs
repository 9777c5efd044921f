// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Inbound bridge webhook.
//!
//! The provider signs each delivery with HMAC-SHA256 over the raw request
//! body; the signature is verified against the configured secret BEFORE
//! the payload is parsed or any state is touched. The bridge's
//! `transferId` is the source-chain transaction hash, matched against the
//! transfer store's hash index; an unmatched delivery answers
//! `{success:false, message:"Transaction not found"}` without side
//! effects and without an error status.

use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::bridge::BridgeTxStatus;
use crate::error::ApiError;
use crate::reconcile::{ReconcileOutcome, StatusMetadata};
use crate::state::AppState;
use crate::storage::TransferStatus;

type HmacSha256 = Hmac<Sha256>;

/// Signature header set by the bridge provider.
const SIGNATURE_HEADER: &str = "x-debridge-signature";

/// Webhook payload pushed by the bridge.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DebridgeWebhookPayload {
    /// Source-chain transaction hash of the transfer.
    pub transfer_id: String,
    /// Bridge-reported status string (closed vocabulary).
    pub status: String,
    #[serde(default)]
    pub chain_id: Option<u64>,
    #[serde(default)]
    pub debridge_id: Option<String>,
    #[serde(default)]
    pub receiver: Option<String>,
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub amount: Option<serde_json::Value>,
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub metadata: Option<WebhookMetadata>,
}

/// Free-form metadata attached by the bridge.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct WebhookMetadata {
    /// Failure reason, when the bridge reports one.
    #[serde(default)]
    pub reason: Option<String>,
}

/// Webhook processing result.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WebhookResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub internal_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TransferStatus>,
}

/// Verify the provider signature over the raw body.
fn verify_signature(
    secret: Option<&str>,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<(), ApiError> {
    let Some(secret) = secret else {
        if cfg!(feature = "dev") {
            warn!("Webhook secret not configured; accepting unsigned webhook (dev build)");
            return Ok(());
        }
        return Err(ApiError::unauthorized(
            "Webhook signature verification is not configured",
        ));
    };

    let signature = headers
        .get(SIGNATURE_HEADER)
        .ok_or_else(|| ApiError::unauthorized("Missing webhook signature"))?
        .to_str()
        .map_err(|_| ApiError::unauthorized("Malformed webhook signature"))?;
    let signature = alloy::hex::decode(signature.trim_start_matches("0x"))
        .map_err(|_| ApiError::unauthorized("Malformed webhook signature"))?;

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(body);
    mac.verify_slice(&signature)
        .map_err(|_| ApiError::unauthorized("Invalid webhook signature"))
}

#[utoipa::path(
    post,
    path = "/v1/webhook/debridge",
    request_body = DebridgeWebhookPayload,
    tag = "Webhook",
    responses(
        (status = 200, description = "Processed (success:false when no record matches)", body = WebhookResponse),
        (status = 400, description = "Malformed payload or unknown status value"),
        (status = 401, description = "Missing or invalid signature")
    )
)]
pub async fn debridge_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, ApiError> {
    verify_signature(state.config.webhook_secret.as_deref(), &headers, &body)?;

    let payload: DebridgeWebhookPayload = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("malformed webhook payload: {e}")))?;

    // Unknown status strings are rejected loudly, never defaulted.
    let observed: BridgeTxStatus = payload.status.parse()?;
    let metadata = StatusMetadata {
        reason: payload.metadata.and_then(|m| m.reason),
    };

    info!(
        transfer_id = %payload.transfer_id,
        status = observed.as_str(),
        "Processing bridge webhook"
    );

    let outcome = state
        .engine
        .apply_by_tx_hash(&payload.transfer_id, observed, &metadata)?;

    let response = match outcome {
        ReconcileOutcome::NotFound => {
            warn!(transfer_id = %payload.transfer_id, "Webhook for unknown transfer");
            WebhookResponse {
                success: false,
                message: Some("Transaction not found".to_string()),
                internal_id: None,
                status: None,
            }
        }
        ReconcileOutcome::Transitioned(status) => WebhookResponse {
            success: true,
            message: None,
            internal_id: None,
            status: Some(status),
        },
        // Idempotent skips still acknowledge the delivery.
        ReconcileOutcome::Unchanged
        | ReconcileOutcome::AlreadyTerminal
        | ReconcileOutcome::Ignored => WebhookResponse {
            success: true,
            message: None,
            internal_id: None,
            status: None,
        },
    };

    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_state;
    use crate::storage::transfer_db::test_fixtures::pending_transfer;
    use axum::http::StatusCode;

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        alloy::hex::encode(mac.finalize().into_bytes())
    }

    fn signed_headers(body: &[u8]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            SIGNATURE_HEADER,
            sign("test-webhook-secret", body).parse().unwrap(),
        );
        headers
    }

    fn webhook_body(transfer_id: &str, status: &str) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "transferId": transfer_id,
            "status": status,
            "chainId": 137,
            "receiver": "0x2222222222222222222222222222222222222222",
            "amount": "100",
        }))
        .unwrap()
    }

    fn seed_processing_transfer(state: &AppState, hash: &str) -> String {
        let record = pending_transfer("alice", None);
        state.transfers.create(&record).unwrap();
        state
            .transfers
            .update_transfer(&record.internal_id, 0, |r| {
                r.mark_processing(hash.to_string(), "0xbridgeid".to_string())
            })
            .unwrap();
        record.internal_id
    }

    #[tokio::test]
    async fn confirmed_webhook_completes_the_transfer() {
        let (state, _dir) = test_state();
        let internal_id = seed_processing_transfer(&state, "0xabc");

        let body = webhook_body("0xabc", "confirmed");
        let response = debridge_webhook(
            State(state.clone()),
            signed_headers(&body),
            Bytes::from(body),
        )
        .await
        .unwrap()
        .0;

        assert!(response.success);
        assert_eq!(response.status, Some(TransferStatus::Completed));
        assert_eq!(
            state.transfers.get(&internal_id).unwrap().unwrap().status,
            TransferStatus::Completed
        );
    }

    #[tokio::test]
    async fn unknown_transfer_answers_success_false() {
        let (state, _dir) = test_state();

        let body = webhook_body("0xmissing", "confirmed");
        let response = debridge_webhook(
            State(state.clone()),
            signed_headers(&body),
            Bytes::from(body),
        )
        .await
        .unwrap()
        .0;

        assert!(!response.success);
        assert_eq!(response.message.as_deref(), Some("Transaction not found"));
    }

    #[tokio::test]
    async fn missing_or_wrong_signature_is_unauthorized() {
        let (state, _dir) = test_state();
        let body = webhook_body("0xabc", "confirmed");

        let missing = debridge_webhook(
            State(state.clone()),
            HeaderMap::new(),
            Bytes::from(body.clone()),
        )
        .await
        .unwrap_err();
        assert_eq!(missing.status, StatusCode::UNAUTHORIZED);

        let mut headers = HeaderMap::new();
        headers.insert(
            SIGNATURE_HEADER,
            sign("wrong-secret", &body).parse().unwrap(),
        );
        let wrong = debridge_webhook(State(state.clone()), headers, Bytes::from(body))
            .await
            .unwrap_err();
        assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn signature_must_cover_the_delivered_body() {
        let (state, _dir) = test_state();
        let signed_over = webhook_body("0xabc", "confirmed");
        let delivered = webhook_body("0xabc", "failed");

        let tampered = debridge_webhook(
            State(state.clone()),
            signed_headers(&signed_over),
            Bytes::from(delivered),
        )
        .await
        .unwrap_err();
        assert_eq!(tampered.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unknown_status_value_is_rejected() {
        let (state, _dir) = test_state();
        seed_processing_transfer(&state, "0xabc");

        let body = webhook_body("0xabc", "finalized");
        let err = debridge_webhook(
            State(state.clone()),
            signed_headers(&body),
            Bytes::from(body),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn failed_webhook_records_the_reason() {
        let (state, _dir) = test_state();
        let internal_id = seed_processing_transfer(&state, "0xabc");

        let body = serde_json::to_vec(&serde_json::json!({
            "transferId": "0xabc",
            "status": "failed",
            "metadata": { "reason": "slippage exceeded" },
        }))
        .unwrap();
        let response = debridge_webhook(
            State(state.clone()),
            signed_headers(&body),
            Bytes::from(body),
        )
        .await
        .unwrap()
        .0;
        assert!(response.success);

        let record = state.transfers.get(&internal_id).unwrap().unwrap();
        assert_eq!(record.status, TransferStatus::Failed);
        assert_eq!(record.failure_reason.as_deref(), Some("slippage exceeded"));
    }

    #[tokio::test]
    async fn duplicate_webhook_is_acknowledged_idempotently() {
        let (state, _dir) = test_state();
        let internal_id = seed_processing_transfer(&state, "0xabc");

        let body = webhook_body("0xabc", "confirmed");
        for _ in 0..2 {
            let response = debridge_webhook(
                State(state.clone()),
                signed_headers(&body),
                Bytes::from(body.clone()),
            )
            .await
            .unwrap()
            .0;
            assert!(response.success);
        }

        // One real transition, one notification.
        assert_eq!(
            state.transfers.get(&internal_id).unwrap().unwrap().status,
            TransferStatus::Completed
        );
        assert_eq!(
            state.transfers.notifications_for_user("alice").unwrap().len(),
            1
        );
    }
}

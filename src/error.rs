// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! HTTP boundary error type.
//!
//! Domain modules carry their own error enums; this module folds them into
//! a single `{status, message}` response shape. The mapping follows the
//! service taxonomy: validation → 400, authentication → 401, missing
//! resources → 404, bridge/chain unavailability → 502. Raw upstream RPC
//! error text is never surfaced to callers.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::bridge::{BridgeError, UnknownBridgeStatus};
use crate::resolver::ResolveError;
use crate::storage::StoreError;
use crate::transfers::TransferError;
use crate::vault::VaultError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

impl From<ResolveError> for ApiError {
    fn from(e: ResolveError) -> Self {
        match e {
            ResolveError::InvalidFormat(_) => ApiError::bad_request(e.to_string()),
            ResolveError::TagNotFound(_) | ResolveError::NoActiveWalletForChain { .. } => {
                ApiError::not_found(e.to_string())
            }
            ResolveError::Store(inner) => inner.into(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(_) => ApiError::not_found(e.to_string()),
            StoreError::AlreadyExists(_) => ApiError::conflict(e.to_string()),
            // Version conflicts are transient; callers may retry.
            StoreError::VersionConflict(_) => ApiError::conflict(e.to_string()),
            other => {
                tracing::error!(error = %other, "Storage failure");
                ApiError::internal("Internal storage error")
            }
        }
    }
}

impl From<BridgeError> for ApiError {
    fn from(e: BridgeError) -> Self {
        match &e {
            BridgeError::Disabled { .. }
            | BridgeError::AmountTooSmall { .. }
            | BridgeError::AmountTooLarge { .. }
            | BridgeError::InvalidAmount(_)
            | BridgeError::InvalidAddress(_) => ApiError::bad_request(e.to_string()),
            // Upstream chain trouble: keep the raw RPC text out of the response.
            BridgeError::Rpc(_) | BridgeError::Timeout(_) | BridgeError::Contract(_) => {
                tracing::error!(error = %e, "Bridge call failed");
                ApiError::bad_gateway("Bridge is temporarily unavailable")
            }
            BridgeError::TransactionFailed(_) => {
                tracing::error!(error = %e, "Bridge transaction failed");
                ApiError::bad_gateway("Bridge transaction failed")
            }
            BridgeError::InvalidRpcUrl(_) | BridgeError::InvalidPrivateKey => {
                tracing::error!(error = %e, "Bridge misconfiguration");
                ApiError::internal("Internal configuration error")
            }
        }
    }
}

impl From<VaultError> for ApiError {
    fn from(e: VaultError) -> Self {
        match e {
            // A decrypt failure IS the password check for this path.
            VaultError::WrongPassword => ApiError::unauthorized("Invalid credentials"),
            other => {
                tracing::error!(error = %other, "Vault failure");
                ApiError::internal("Internal key management error")
            }
        }
    }
}

impl From<UnknownBridgeStatus> for ApiError {
    fn from(e: UnknownBridgeStatus) -> Self {
        ApiError::bad_request(e.to_string())
    }
}

impl From<TransferError> for ApiError {
    fn from(e: TransferError) -> Self {
        match e {
            TransferError::Validation(_) => ApiError::bad_request(e.to_string()),
            TransferError::SessionKeyMissing => ApiError::unauthorized(e.to_string()),
            TransferError::NotFound(_) => ApiError::not_found(e.to_string()),
            TransferError::Resolve(inner) => inner.into(),
            TransferError::Bridge(inner) => inner.into(),
            TransferError::Store(inner) => inner.into(),
            TransferError::Vault(inner) => inner.into(),
        }
    }
}

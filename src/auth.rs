// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session authentication.
//!
//! Login mints a compact HMAC-SHA256 session token
//! (`base64url(user_id:expiry).base64url(tag)`); the [`Auth`] extractor
//! verifies it on every authenticated route. Identity providers and KYC
//! live in separate services; this layer only answers "which user id is
//! calling".

use std::time::Duration;

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;

use crate::state::AppState;

type HmacSha256 = Hmac<Sha256>;

/// Default session token lifetime.
pub const DEFAULT_SESSION_TOKEN_TTL: Duration = Duration::from_secs(24 * 3600);

/// An authenticated caller.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: String,
}

/// Authentication error type.
#[derive(Debug)]
pub enum AuthError {
    /// No authorization header present
    MissingAuthHeader,
    /// Invalid authorization header format
    InvalidAuthHeader,
    /// Token is malformed
    MalformedToken,
    /// Token signature is invalid
    InvalidSignature,
    /// Token has expired
    TokenExpired,
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
    error_code: String,
}

impl AuthError {
    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::MissingAuthHeader => "missing_auth_header",
            AuthError::InvalidAuthHeader => "invalid_auth_header",
            AuthError::MalformedToken => "malformed_token",
            AuthError::InvalidSignature => "invalid_signature",
            AuthError::TokenExpired => "token_expired",
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MissingAuthHeader => write!(f, "Authorization header is required"),
            AuthError::InvalidAuthHeader => {
                write!(f, "Invalid authorization header format (expected 'Bearer <token>')")
            }
            AuthError::MalformedToken => write!(f, "Token is malformed"),
            AuthError::InvalidSignature => write!(f, "Token signature is invalid"),
            AuthError::TokenExpired => write!(f, "Token has expired"),
        }
    }
}

impl std::error::Error for AuthError {}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = Json(AuthErrorBody {
            error: self.to_string(),
            error_code: self.error_code().to_string(),
        });
        (StatusCode::UNAUTHORIZED, body).into_response()
    }
}

/// Mints and verifies HMAC-signed session tokens.
pub struct SessionTokens {
    secret: Vec<u8>,
    ttl: Duration,
}

impl SessionTokens {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            ttl,
        }
    }

    fn tag(&self, payload: &str) -> Vec<u8> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .expect("HMAC accepts keys of any length");
        mac.update(payload.as_bytes());
        mac.finalize().into_bytes().to_vec()
    }

    /// Mint a session token for a user.
    pub fn mint(&self, user_id: &str) -> String {
        let expiry = Utc::now().timestamp() + self.ttl.as_secs() as i64;
        let payload = format!("{user_id}:{expiry}");
        let tag = self.tag(&payload);
        format!(
            "{}.{}",
            Base64UrlUnpadded::encode_string(payload.as_bytes()),
            Base64UrlUnpadded::encode_string(&tag)
        )
    }

    /// Verify a token and return the authenticated user id.
    pub fn verify(&self, token: &str) -> Result<String, AuthError> {
        let (payload_b64, tag_b64) = token.split_once('.').ok_or(AuthError::MalformedToken)?;

        let payload_bytes = Base64UrlUnpadded::decode_vec(payload_b64)
            .map_err(|_| AuthError::MalformedToken)?;
        let tag = Base64UrlUnpadded::decode_vec(tag_b64).map_err(|_| AuthError::MalformedToken)?;
        let payload = String::from_utf8(payload_bytes).map_err(|_| AuthError::MalformedToken)?;

        // Constant-time comparison via the Mac verifier.
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .expect("HMAC accepts keys of any length");
        mac.update(payload.as_bytes());
        mac.verify_slice(&tag)
            .map_err(|_| AuthError::InvalidSignature)?;

        let (user_id, expiry) = payload.rsplit_once(':').ok_or(AuthError::MalformedToken)?;
        let expiry: i64 = expiry.parse().map_err(|_| AuthError::MalformedToken)?;
        if expiry < Utc::now().timestamp() {
            return Err(AuthError::TokenExpired);
        }

        Ok(user_id.to_string())
    }
}

/// Extractor for authenticated users.
///
/// # Example
///
/// ```rust,ignore
/// async fn my_handler(Auth(user): Auth) -> impl IntoResponse {
///     // user.user_id contains the authenticated user's ID
/// }
/// ```
pub struct Auth(pub AuthenticatedUser);

impl FromRequestParts<AppState> for Auth {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or(AuthError::MissingAuthHeader)?
            .to_str()
            .map_err(|_| AuthError::InvalidAuthHeader)?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(AuthError::InvalidAuthHeader)?;

        let user_id = state.session_tokens.verify(token)?;

        Ok(Auth(AuthenticatedUser { user_id }))
    }
}

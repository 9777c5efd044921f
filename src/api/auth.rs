// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Registration, login, and logout.
//!
//! Registration generates the user's private key, encrypts it under a
//! password-derived key, and derives one wallet per supported chain from
//! it. Login reproduces the derivation and decrypts the stored secret: a
//! decryption failure is the password check. The decrypted key is cached
//! for the session and never logged.

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::Auth;
use crate::bridge::Chain;
use crate::error::ApiError;
use crate::state::AppState;
use crate::storage::{UserRecord, UserSecret, WalletRecord};
use crate::vault;

/// Minimum accepted password length.
const MIN_PASSWORD_LEN: usize = 8;

/// Request to register a new user.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RegisterRequest {
    /// Desired bank tag, with or without the leading `@`.
    pub bank_tag: String,
    pub password: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

/// Registration result.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RegisterResponse {
    pub user_id: String,
    pub bank_tag: String,
    /// The wallet address shared by all supported chains.
    pub address: String,
    pub chains: Vec<Chain>,
    pub session_token: String,
}

/// Request to log in.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct LoginRequest {
    /// Bank tag, with or without the leading `@`.
    pub bank_tag: String,
    pub password: String,
}

/// Login result.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LoginResponse {
    pub user_id: String,
    pub session_token: String,
}

/// Normalize and validate a bank tag (leading `@` optional).
fn normalize_tag(raw: &str) -> Result<String, ApiError> {
    let tag = raw.trim().strip_prefix('@').unwrap_or(raw.trim());
    if tag.len() < 3 || tag.len() > 20 {
        return Err(ApiError::bad_request("bank tag must be 3-20 characters"));
    }
    if !tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ApiError::bad_request(
            "bank tag may only contain letters, digits, and underscores",
        ));
    }
    Ok(tag.to_lowercase())
}

#[utoipa::path(
    post,
    path = "/v1/auth/register",
    request_body = RegisterRequest,
    tag = "Auth",
    responses(
        (status = 200, description = "User registered", body = RegisterResponse),
        (status = 400, description = "Invalid tag or password"),
        (status = 409, description = "Bank tag already taken")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, ApiError> {
    let bank_tag = normalize_tag(&request.bank_tag)?;
    if request.password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::bad_request(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    let salt = vault::generate_salt()?;
    let private_key = vault::generate_private_key()?;
    let derived = vault::derive_key(&request.password, &salt);
    let (encrypted_private_key, iv) = vault::encrypt_private_key(&private_key, &derived)?;
    let address = vault::address_from_private_key(&private_key)?;

    let user_id = Uuid::new_v4().to_string();
    let now = Utc::now();
    let user = UserRecord {
        user_id: user_id.clone(),
        bank_tag: bank_tag.clone(),
        first_name: request.first_name,
        last_name: request.last_name,
        secret: UserSecret {
            encrypted_private_key,
            salt,
            iv,
        },
        created_at: now,
    };
    let wallets: Vec<WalletRecord> = Chain::ALL
        .into_iter()
        .map(|chain| WalletRecord {
            user_id: user_id.clone(),
            chain,
            address: address.clone(),
            is_active: true,
            created_at: now,
        })
        .collect();

    state.directory.create_user(&user, &wallets)?;
    tracing::info!(user_id, bank_tag, "Registered user");

    // Registration proved the password: start the session immediately.
    state.session_keys.put(&user_id, private_key);
    let session_token = state.session_tokens.mint(&user_id);

    Ok(Json(RegisterResponse {
        user_id,
        bank_tag,
        address,
        chains: Chain::ALL.to_vec(),
        session_token,
    }))
}

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    tag = "Auth",
    responses(
        (status = 200, description = "Logged in", body = LoginResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let bank_tag = normalize_tag(&request.bank_tag)?;

    // An unknown tag and a wrong password answer identically.
    let user = state
        .directory
        .user_by_tag(&bank_tag)?
        .ok_or_else(|| ApiError::unauthorized("Invalid credentials"))?;

    let derived = vault::derive_key(&request.password, &user.secret.salt);
    let private_key = vault::decrypt_private_key(
        &user.secret.encrypted_private_key,
        &derived,
        &user.secret.iv,
    )?;

    state.session_keys.put(&user.user_id, private_key);
    let session_token = state.session_tokens.mint(&user.user_id);
    tracing::info!(user_id = %user.user_id, "User logged in");

    Ok(Json(LoginResponse {
        user_id: user.user_id,
        session_token,
    }))
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    tag = "Auth",
    security(("bearer" = [])),
    responses((status = 200, description = "Session key cleared"))
)]
pub async fn logout(
    State(state): State<AppState>,
    Auth(user): Auth,
) -> Result<StatusCode, ApiError> {
    state.session_keys.clear(&user.user_id);
    tracing::info!(user_id = %user.user_id, "User logged out");
    Ok(StatusCode::OK)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_state;

    fn register_request(tag: &str) -> RegisterRequest {
        RegisterRequest {
            bank_tag: tag.to_string(),
            password: "a strong password".to_string(),
            first_name: None,
            last_name: None,
        }
    }

    #[tokio::test]
    async fn register_creates_user_wallets_and_session() {
        let (state, _dir) = test_state();

        let response = register(State(state.clone()), Json(register_request("@alice")))
            .await
            .expect("register succeeds")
            .0;

        assert_eq!(response.bank_tag, "alice");
        assert_eq!(response.chains.len(), 3);
        assert!(response.address.starts_with("0x"));

        // One active wallet per chain, all sharing the derived address.
        for chain in Chain::ALL {
            let wallet = state
                .directory
                .active_wallet(&response.user_id, chain)
                .unwrap()
                .unwrap();
            assert_eq!(wallet.address, response.address);
        }

        // Session key cached, token verifies.
        assert!(state.session_keys.exists(&response.user_id));
        assert_eq!(
            state.session_tokens.verify(&response.session_token).unwrap(),
            response.user_id
        );
    }

    #[tokio::test]
    async fn register_rejects_bad_tags_and_short_passwords() {
        let (state, _dir) = test_state();

        let short_tag = register(State(state.clone()), Json(register_request("@ab"))).await;
        assert!(short_tag.is_err());

        let mut weak = register_request("@valid_tag");
        weak.password = "short".to_string();
        let weak_password = register(State(state.clone()), Json(weak)).await;
        assert!(weak_password.is_err());
    }

    #[tokio::test]
    async fn duplicate_tag_conflicts() {
        let (state, _dir) = test_state();
        register(State(state.clone()), Json(register_request("alice")))
            .await
            .unwrap();

        let err = register(State(state.clone()), Json(register_request("@ALICE")))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn login_round_trip_and_wrong_password() {
        let (state, _dir) = test_state();
        let registered = register(State(state.clone()), Json(register_request("alice")))
            .await
            .unwrap()
            .0;
        state.session_keys.clear(&registered.user_id);

        let logged_in = login(
            State(state.clone()),
            Json(LoginRequest {
                bank_tag: "alice".to_string(),
                password: "a strong password".to_string(),
            }),
        )
        .await
        .expect("login succeeds")
        .0;
        assert_eq!(logged_in.user_id, registered.user_id);
        assert!(state.session_keys.exists(&registered.user_id));

        state.session_keys.clear(&registered.user_id);
        let err = login(
            State(state.clone()),
            Json(LoginRequest {
                bank_tag: "alice".to_string(),
                password: "wrong password!".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
        assert!(!state.session_keys.exists(&registered.user_id));
    }

    #[tokio::test]
    async fn unknown_tag_logs_in_as_invalid_credentials() {
        let (state, _dir) = test_state();
        let err = login(
            State(state),
            Json(LoginRequest {
                bank_tag: "ghost".to_string(),
                password: "whatever pass".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
        assert_eq!(err.message, "Invalid credentials");
    }

    #[tokio::test]
    async fn logout_clears_the_session_key() {
        let (state, _dir) = test_state();
        let registered = register(State(state.clone()), Json(register_request("alice")))
            .await
            .unwrap()
            .0;
        assert!(state.session_keys.exists(&registered.user_id));

        let status = logout(
            State(state.clone()),
            Auth(crate::auth::AuthenticatedUser {
                user_id: registered.user_id.clone(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::OK);
        assert!(!state.session_keys.exists(&registered.user_id));
    }
}

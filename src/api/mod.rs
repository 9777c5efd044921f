// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    bridge::{BridgeTxStatus, Chain},
    resolver::{RecipientOwner, RecipientSource, ResolvedRecipient},
    state::AppState,
    storage::{TransferKind, TransferRecord, TransferStatus},
};

pub mod auth;
pub mod health;
pub mod transfer;
pub mod webhook;

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route(
            "/transfer/cross-chain",
            post(transfer::initiate_cross_chain),
        )
        .route("/transfer/calculate-fee", post(transfer::calculate_fee))
        .route(
            "/transfer/validate-recipient",
            post(transfer::validate_recipient),
        )
        .route("/transfer/history", get(transfer::transfer_history))
        .route("/transfer/{internal_id}", get(transfer::get_transfer))
        .route("/webhook/debridge", post(webhook::debridge_webhook))
        .with_state(state);

    Router::new()
        .nest("/v1", v1_routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        health::liveness,
        auth::register,
        auth::login,
        auth::logout,
        transfer::initiate_cross_chain,
        transfer::calculate_fee,
        transfer::validate_recipient,
        transfer::transfer_history,
        transfer::get_transfer,
        webhook::debridge_webhook
    ),
    components(
        schemas(
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse,
            auth::RegisterRequest,
            auth::RegisterResponse,
            auth::LoginRequest,
            auth::LoginResponse,
            transfer::CrossChainTransferRequest,
            transfer::CrossChainTransferResponse,
            transfer::CalculateFeeRequest,
            transfer::CalculateFeeResponse,
            transfer::ValidateRecipientRequest,
            transfer::TransferDetailResponse,
            transfer::HistoryResponse,
            transfer::PaginationMeta,
            webhook::DebridgeWebhookPayload,
            webhook::WebhookMetadata,
            webhook::WebhookResponse,
            Chain,
            BridgeTxStatus,
            TransferStatus,
            TransferKind,
            TransferRecord,
            ResolvedRecipient,
            RecipientOwner,
            RecipientSource
        )
    ),
    tags(
        (name = "Health", description = "Service health probes"),
        (name = "Auth", description = "Registration, login, and session management"),
        (name = "Transfer", description = "Cross-chain stablecoin transfers"),
        (name = "Webhook", description = "Bridge status callbacks")
    )
)]
struct ApiDoc;

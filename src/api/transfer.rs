// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Cross-chain transfer endpoints: initiation, fee preview, recipient
//! validation, detail, and history.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::auth::Auth;
use crate::bridge::{format_amount, BridgeTxStatus, Chain, ESTIMATED_TRANSFER_TIME};
use crate::error::ApiError;
use crate::resolver::ResolvedRecipient;
use crate::state::AppState;
use crate::storage::{HistoryFilter, TransferKind, TransferRecord, TransferStatus};
use crate::transfers::TransferRequest;

// =============================================================================
// Request/Response Types
// =============================================================================

/// Request to initiate a cross-chain transfer.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CrossChainTransferRequest {
    /// Source chain name (e.g., "polygon")
    pub from_chain: String,
    /// Destination chain name (e.g., "arbitrum")
    pub to_chain: String,
    /// Stablecoin symbol: USDC, USDT, or DAI
    pub token_symbol: String,
    /// Amount in human-readable token units (e.g., "100")
    pub amount: String,
    /// Recipient: `@tag` or `0x` address
    pub recipient: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Unlocks the session key when it is not already cached
    #[serde(default)]
    pub password: Option<String>,
}

/// Successful initiation response.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CrossChainTransferResponse {
    pub internal_id: String,
    pub bridge_transfer_id: String,
    pub status: TransferStatus,
    /// Bridge fee in token units
    pub fee: String,
    pub fee_usd: f64,
    pub estimated_time: String,
    pub transaction_hash: String,
    pub to_address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_bank_tag: Option<String>,
}

/// Request for a fee preview.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CalculateFeeRequest {
    pub from_chain: String,
    pub to_chain: String,
    pub token_symbol: String,
    pub amount: String,
}

/// Fee preview response.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CalculateFeeResponse {
    pub token_symbol: String,
    /// Amount to bridge, in token units
    pub amount: String,
    /// Bridge fee, in token units
    pub fee: String,
    /// Total debit from the sender: amount + fee
    pub total_debit: String,
    pub fee_usd: f64,
    pub estimated_time: String,
}

/// Request to validate a recipient.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ValidateRecipientRequest {
    /// `@tag` or `0x` address
    pub recipient: String,
    /// Destination chain name
    pub chain: String,
}

/// Transfer detail response: the record plus a live bridge status when
/// one could be fetched.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TransferDetailResponse {
    pub transfer: TransferRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub live_status: Option<BridgeTxStatus>,
}

/// Query parameters for transfer history.
#[derive(Debug, Deserialize, IntoParams)]
pub struct HistoryQuery {
    /// Status filter: pending, processing, completed, failed
    pub status: Option<String>,
    /// Kind filter (e.g., "cross_chain")
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// Chain filter, matching either side of the transfer
    pub chain: Option<String>,
    /// 1-based page number (default: 1)
    #[param(default = 1)]
    pub page: Option<usize>,
    /// Page size (default: 20, max: 100)
    #[param(default = 20)]
    pub limit: Option<usize>,
}

/// Pagination metadata.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PaginationMeta {
    pub page: usize,
    pub limit: usize,
    pub total: usize,
    pub pages: usize,
}

/// Transfer history response.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HistoryResponse {
    pub transfers: Vec<TransferRecord>,
    pub pagination: PaginationMeta,
}

// =============================================================================
// Parsing Helpers
// =============================================================================

fn parse_chain(name: &str) -> Result<Chain, ApiError> {
    Chain::from_name(name)
        .ok_or_else(|| ApiError::bad_request(format!("unsupported chain: {name}")))
}

fn parse_status(raw: &str) -> Result<TransferStatus, ApiError> {
    match raw.to_ascii_lowercase().as_str() {
        "pending" => Ok(TransferStatus::Pending),
        "processing" => Ok(TransferStatus::Processing),
        "completed" => Ok(TransferStatus::Completed),
        "failed" => Ok(TransferStatus::Failed),
        "cancelled" => Ok(TransferStatus::Cancelled),
        other => Err(ApiError::bad_request(format!("unknown status: {other}"))),
    }
}

fn parse_kind(raw: &str) -> Result<TransferKind, ApiError> {
    match raw.to_ascii_lowercase().as_str() {
        "cross_chain" => Ok(TransferKind::CrossChain),
        other => Err(ApiError::bad_request(format!("unknown type: {other}"))),
    }
}

// =============================================================================
// Handlers
// =============================================================================

#[utoipa::path(
    post,
    path = "/v1/transfer/cross-chain",
    request_body = CrossChainTransferRequest,
    tag = "Transfer",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Transfer broadcast", body = CrossChainTransferResponse),
        (status = 400, description = "Validation failure"),
        (status = 401, description = "Session key missing or wrong password"),
        (status = 502, description = "Bridge unavailable")
    )
)]
pub async fn initiate_cross_chain(
    State(state): State<AppState>,
    Auth(user): Auth,
    Json(request): Json<CrossChainTransferRequest>,
) -> Result<Json<CrossChainTransferResponse>, ApiError> {
    let from_chain = parse_chain(&request.from_chain)?;
    let to_chain = parse_chain(&request.to_chain)?;

    let receipt = state
        .service
        .initiate(
            &user.user_id,
            TransferRequest {
                from_chain,
                to_chain,
                token_symbol: request.token_symbol,
                amount: request.amount,
                recipient: request.recipient,
                description: request.description,
                password: request.password,
            },
        )
        .await?;

    Ok(Json(CrossChainTransferResponse {
        internal_id: receipt.internal_id,
        bridge_transfer_id: receipt.bridge_transfer_id,
        status: receipt.status,
        fee: receipt.fee,
        fee_usd: receipt.fee_usd,
        estimated_time: receipt.estimated_time.to_string(),
        transaction_hash: receipt.transaction_hash,
        to_address: receipt.to_address,
        to_bank_tag: receipt.to_bank_tag,
    }))
}

#[utoipa::path(
    post,
    path = "/v1/transfer/calculate-fee",
    request_body = CalculateFeeRequest,
    tag = "Transfer",
    responses(
        (status = 200, description = "Fee quote", body = CalculateFeeResponse),
        (status = 400, description = "Validation failure or amount out of bounds")
    )
)]
pub async fn calculate_fee(
    State(state): State<AppState>,
    Json(request): Json<CalculateFeeRequest>,
) -> Result<Json<CalculateFeeResponse>, ApiError> {
    let from_chain = parse_chain(&request.from_chain)?;
    let to_chain = parse_chain(&request.to_chain)?;

    let quoted = state
        .service
        .quote_fee(from_chain, to_chain, &request.token_symbol, &request.amount)
        .await?;
    let decimals = quoted.token.decimals;

    Ok(Json(CalculateFeeResponse {
        token_symbol: quoted.token.symbol.to_string(),
        amount: format_amount(quoted.quote.amount, decimals),
        fee: format_amount(quoted.quote.fee, decimals),
        total_debit: format_amount(quoted.quote.total_debit, decimals),
        fee_usd: quoted.quote.fee_usd(decimals),
        estimated_time: ESTIMATED_TRANSFER_TIME.to_string(),
    }))
}

#[utoipa::path(
    post,
    path = "/v1/transfer/validate-recipient",
    request_body = ValidateRecipientRequest,
    tag = "Transfer",
    responses(
        (status = 200, description = "Recipient resolved", body = ResolvedRecipient),
        (status = 400, description = "Malformed tag or address"),
        (status = 404, description = "Tag unknown or no active wallet on chain")
    )
)]
pub async fn validate_recipient(
    State(state): State<AppState>,
    Json(request): Json<ValidateRecipientRequest>,
) -> Result<Json<ResolvedRecipient>, ApiError> {
    let chain = parse_chain(&request.chain)?;
    let resolved = state.service.validate_recipient(&request.recipient, chain)?;
    Ok(Json(resolved))
}

#[utoipa::path(
    get,
    path = "/v1/transfer/{internal_id}",
    params(("internal_id" = String, Path, description = "Internal transfer id")),
    tag = "Transfer",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Transfer detail", body = TransferDetailResponse),
        (status = 404, description = "Unknown id or caller is not a participant")
    )
)]
pub async fn get_transfer(
    State(state): State<AppState>,
    Auth(user): Auth,
    Path(internal_id): Path<String>,
) -> Result<Json<TransferDetailResponse>, ApiError> {
    let (transfer, live_status) = state.service.detail(&user.user_id, &internal_id).await?;
    Ok(Json(TransferDetailResponse {
        transfer,
        live_status,
    }))
}

#[utoipa::path(
    get,
    path = "/v1/transfer/history",
    params(HistoryQuery),
    tag = "Transfer",
    security(("bearer" = [])),
    responses((status = 200, description = "Paginated transfer history", body = HistoryResponse))
)]
pub async fn transfer_history(
    State(state): State<AppState>,
    Auth(user): Auth,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let filter = HistoryFilter {
        status: query.status.as_deref().map(parse_status).transpose()?,
        kind: query.kind.as_deref().map(parse_kind).transpose()?,
        chain: query.chain.as_deref().map(parse_chain).transpose()?,
    };
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(20).clamp(1, 100);

    let (transfers, total) = state.service.history(&user.user_id, &filter, page, limit)?;

    Ok(Json(HistoryResponse {
        transfers,
        pagination: PaginationMeta {
            page,
            limit,
            total,
            pages: total.div_ceil(limit),
        },
    }))
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Recipient resolution: bank tags and raw addresses to canonical targets.
//!
//! Two accepted shapes:
//!
//! 1. **Tag**: `@` followed by 3-20 alphanumeric/underscore characters,
//!    resolved through the directory to the owner's active wallet on the
//!    requested chain.
//! 2. **Address**: `0x` + 40 hex characters, passed through canonicalized
//!    (EIP-55), optionally enriched with the owning identity when the
//!    address belongs to a known wallet.
//!
//! Resolution never mutates state and is safe to call speculatively for
//! UI previews.

use std::str::FromStr;
use std::sync::Arc;

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::bridge::Chain;
use crate::storage::{Directory, StoreError, WalletRecord};

/// Tag length bounds (excluding the `@`).
const TAG_MIN_LEN: usize = 3;
const TAG_MAX_LEN: usize = 20;

/// How the recipient was specified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RecipientSource {
    Tag,
    Address,
}

/// The identity owning a resolved recipient, for display.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RecipientOwner {
    pub user_id: String,
    pub bank_tag: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

/// A resolved transfer target.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ResolvedRecipient {
    /// Canonical (EIP-55) destination address on the requested chain.
    pub address: String,
    pub source_type: RecipientSource,
    /// Owning identity, when the target is known to the system.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<RecipientOwner>,
    /// Destination wallet record, when the target is known to the system.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Object)]
    pub wallet: Option<WalletRecord>,
}

/// Errors from recipient resolution.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("Invalid recipient format: {0}")]
    InvalidFormat(String),

    #[error("Bank tag @{0} not found")]
    TagNotFound(String),

    #[error("No active wallet for @{tag} on {chain}")]
    NoActiveWalletForChain { tag: String, chain: Chain },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Resolves transfer targets against the user/wallet directory.
pub struct RecipientResolver {
    directory: Arc<Directory>,
}

impl RecipientResolver {
    pub fn new(directory: Arc<Directory>) -> Self {
        Self { directory }
    }

    /// Resolve a recipient string for a destination chain.
    pub fn resolve(&self, recipient: &str, chain: Chain) -> Result<ResolvedRecipient, ResolveError> {
        let recipient = recipient.trim();

        if let Some(tag) = recipient.strip_prefix('@') {
            return self.resolve_tag(tag, chain);
        }
        self.resolve_address(recipient, chain)
    }

    fn resolve_tag(&self, tag: &str, chain: Chain) -> Result<ResolvedRecipient, ResolveError> {
        if tag.len() < TAG_MIN_LEN || tag.len() > TAG_MAX_LEN {
            return Err(ResolveError::InvalidFormat(format!(
                "bank tag must be {TAG_MIN_LEN}-{TAG_MAX_LEN} characters"
            )));
        }
        if !tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(ResolveError::InvalidFormat(
                "bank tag may only contain letters, digits, and underscores".to_string(),
            ));
        }

        let user = self
            .directory
            .user_by_tag(tag)?
            .ok_or_else(|| ResolveError::TagNotFound(tag.to_lowercase()))?;

        let wallet = self
            .directory
            .active_wallet(&user.user_id, chain)?
            .ok_or_else(|| ResolveError::NoActiveWalletForChain {
                tag: user.bank_tag.clone(),
                chain,
            })?;

        Ok(ResolvedRecipient {
            address: wallet.address.clone(),
            source_type: RecipientSource::Tag,
            owner: Some(RecipientOwner {
                user_id: user.user_id,
                bank_tag: user.bank_tag,
                first_name: user.first_name,
                last_name: user.last_name,
            }),
            wallet: Some(wallet),
        })
    }

    fn resolve_address(
        &self,
        recipient: &str,
        chain: Chain,
    ) -> Result<ResolvedRecipient, ResolveError> {
        if recipient.len() != 42 || !recipient.starts_with("0x") {
            return Err(ResolveError::InvalidFormat(
                "address must be 0x followed by 40 hex characters".to_string(),
            ));
        }
        let parsed = Address::from_str(recipient).map_err(|_| {
            ResolveError::InvalidFormat("address must be 0x followed by 40 hex characters".to_string())
        })?;
        let canonical = parsed.to_string();

        // Enrichment is best-effort for display: resolution succeeds even
        // when the address is unknown to the system.
        let known = self.directory.wallet_by_address(chain, &canonical)?;
        let (wallet, owner) = match known {
            Some((wallet, user)) => (
                Some(wallet),
                Some(RecipientOwner {
                    user_id: user.user_id,
                    bank_tag: user.bank_tag,
                    first_name: user.first_name,
                    last_name: user.last_name,
                }),
            ),
            None => (None, None),
        };

        Ok(ResolvedRecipient {
            address: canonical,
            source_type: RecipientSource::Address,
            owner,
            wallet,
        })
    }
}

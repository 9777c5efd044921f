// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Cross-chain transfer initiation and read paths.
//!
//! The initiation flow validates everything it can before touching the
//! chain or the store: chains, token, amount, recipient, sender wallet,
//! and the session key. Bridge parameter or bound failures happen before a
//! record exists (fail before `pending`); once the `pending` record is
//! created, the approve + send sequence runs under the per-sender
//! broadcast lock, and a clean submission moves the record to
//! `processing`. A bridge failure after creation leaves the record for the
//! reconciliation engine rather than failing it out-of-band.

use std::str::FromStr;
use std::sync::Arc;

use alloy::primitives::Address;
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::bridge::{
    self, parse_amount, quote, stablecoin, stablecoin_address, Bridge, BridgeError, BridgeTxStatus,
    Chain, FeeQuote, SenderLocks, StablecoinInfo,
};
use crate::resolver::{RecipientResolver, ResolveError, ResolvedRecipient};
use crate::session_keys::{SessionKey, SessionKeyCache};
use crate::storage::{
    Directory, HistoryFilter, StoreError, TransferDb, TransferKind, TransferRecord, TransferStatus,
};
use crate::vault::{self, VaultError};

/// Errors from the transfer flow, mapped to the API taxonomy at the
/// HTTP boundary.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Authentication required: no active session key, log in again")]
    SessionKeyMissing,

    #[error("{0} not found")]
    NotFound(String),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Vault(#[from] VaultError),
}

/// A validated initiation request.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub from_chain: Chain,
    pub to_chain: Chain,
    pub token_symbol: String,
    pub amount: String,
    pub recipient: String,
    pub description: Option<String>,
    /// Unlocks the session key when it is not already cached.
    pub password: Option<String>,
}

/// What the caller gets back from a successful initiation.
#[derive(Debug, Clone)]
pub struct TransferReceipt {
    pub internal_id: String,
    pub bridge_transfer_id: String,
    pub status: TransferStatus,
    /// Bridge fee in human-readable token units.
    pub fee: String,
    pub fee_usd: f64,
    pub estimated_time: &'static str,
    pub transaction_hash: String,
    pub to_address: String,
    pub to_bank_tag: Option<String>,
}

/// A quoted fee together with the token it was quoted for.
#[derive(Debug, Clone, Copy)]
pub struct QuotedFee {
    pub quote: FeeQuote,
    pub token: &'static StablecoinInfo,
}

/// Orchestrates recipient resolution, quoting, key access, and broadcast.
pub struct TransferService<B: Bridge> {
    directory: Arc<Directory>,
    transfers: Arc<TransferDb>,
    session_keys: Arc<SessionKeyCache>,
    resolver: Arc<RecipientResolver>,
    bridge: Arc<B>,
    sender_locks: SenderLocks,
}

impl<B: Bridge> TransferService<B> {
    pub fn new(
        directory: Arc<Directory>,
        transfers: Arc<TransferDb>,
        session_keys: Arc<SessionKeyCache>,
        resolver: Arc<RecipientResolver>,
        bridge: Arc<B>,
    ) -> Self {
        Self {
            directory,
            transfers,
            session_keys,
            resolver,
            bridge,
            sender_locks: SenderLocks::new(),
        }
    }

    /// Validate chains/token/amount and quote the bridge fee.
    ///
    /// Backs both the fee-preview endpoint and the initiation flow; pure
    /// given the fetched bridge parameters.
    pub async fn quote_fee(
        &self,
        from_chain: Chain,
        to_chain: Chain,
        token_symbol: &str,
        amount: &str,
    ) -> Result<QuotedFee, TransferError> {
        if from_chain == to_chain {
            return Err(TransferError::Validation(
                "source and destination chains must be different".to_string(),
            ));
        }

        let token = stablecoin(token_symbol).ok_or_else(|| {
            TransferError::Validation(format!("unsupported token: {token_symbol}"))
        })?;
        let token_addr = stablecoin_address(token.symbol, from_chain).ok_or_else(|| {
            TransferError::Validation(format!(
                "token {} not available on {from_chain}",
                token.symbol
            ))
        })?;

        let amount_units = parse_amount(amount, token.decimals)?;
        let params = self.bridge.token_params(from_chain, token_addr).await?;
        let quote = quote::quote(&params, amount_units, token.symbol, from_chain, token.decimals)?;

        Ok(QuotedFee { quote, token })
    }

    /// Validate a recipient without side effects (preview endpoint).
    pub fn validate_recipient(
        &self,
        recipient: &str,
        chain: Chain,
    ) -> Result<ResolvedRecipient, TransferError> {
        Ok(self.resolver.resolve(recipient, chain)?)
    }

    /// Execute a cross-chain transfer for an authenticated user.
    pub async fn initiate(
        &self,
        user_id: &str,
        request: TransferRequest,
    ) -> Result<TransferReceipt, TransferError> {
        // Everything that can fail validation does so before any record
        // exists or any chain call is made.
        let resolved = self.resolver.resolve(&request.recipient, request.to_chain)?;

        let sender = self
            .directory
            .user_by_id(user_id)?
            .ok_or_else(|| TransferError::NotFound(format!("user {user_id}")))?;
        let from_wallet = self
            .directory
            .active_wallet(user_id, request.from_chain)?
            .ok_or_else(|| {
                TransferError::NotFound(format!("active wallet on {}", request.from_chain))
            })?;
        let sender_address = Address::from_str(&from_wallet.address)
            .map_err(|_| TransferError::Validation("stored sender address is malformed".into()))?;
        let receiver_address = Address::from_str(&resolved.address)
            .map_err(|_| TransferError::Validation("resolved recipient address is malformed".into()))?;

        let session_key = self.unlock_session_key(user_id, request.password.as_deref())?;

        let quoted = self
            .quote_fee(
                request.from_chain,
                request.to_chain,
                &request.token_symbol,
                &request.amount,
            )
            .await?;
        let token = quoted.token;
        let token_addr = stablecoin_address(token.symbol, request.from_chain).ok_or_else(|| {
            TransferError::Validation(format!(
                "token {} not available on {}",
                token.symbol, request.from_chain
            ))
        })?;

        let now = Utc::now();
        let record = TransferRecord {
            internal_id: Uuid::new_v4().to_string(),
            version: 0,
            kind: TransferKind::CrossChain,
            status: TransferStatus::Pending,
            from_user_id: user_id.to_string(),
            to_user_id: resolved.owner.as_ref().map(|o| o.user_id.clone()),
            from_address: from_wallet.address.clone(),
            to_address: resolved.address.clone(),
            from_bank_tag: Some(sender.bank_tag.clone()),
            to_bank_tag: resolved.owner.as_ref().map(|o| o.bank_tag.clone()),
            token_symbol: token.symbol.to_string(),
            amount: bridge::format_amount(quoted.quote.amount, token.decimals),
            amount_usd: request.amount.parse().unwrap_or(0.0),
            fee_usd: quoted.quote.fee_usd(token.decimals),
            from_chain: request.from_chain,
            to_chain: request.to_chain,
            description: request.description.clone(),
            transaction_hash: None,
            bridge_transfer_id: None,
            confirmed_at: None,
            failed_at: None,
            failure_reason: None,
            last_status_check_at: None,
            created_at: now,
            updated_at: now,
        };
        self.transfers.create(&record)?;
        info!(
            internal_id = %record.internal_id,
            from_chain = %request.from_chain,
            to_chain = %request.to_chain,
            token = token.symbol,
            "Created transfer record"
        );

        // One broadcast per sending account at a time. The lock covers
        // only the approve + send sequence; store and cache are not held
        // across this await.
        let submission = {
            let _broadcast_guard = self
                .sender_locks
                .acquire(request.from_chain, sender_address)
                .await;
            let result = self
                .bridge
                .send_transfer(
                    request.from_chain,
                    request.to_chain,
                    token_addr,
                    quoted.quote.amount,
                    quoted.quote.total_debit,
                    receiver_address,
                    session_key.expose(),
                )
                .await;
            match result {
                Ok(submission) => submission,
                Err(e) => {
                    // Nothing we know to be broadcast: the record stays
                    // pending (no hash) and is surfaced to the caller.
                    warn!(
                        internal_id = %record.internal_id,
                        error = %e,
                        "Bridge send failed during initiation"
                    );
                    return Err(e.into());
                }
            }
        };

        let updated = self.transfers.update_transfer(&record.internal_id, 0, |r| {
            r.mark_processing(
                submission.transaction_hash.clone(),
                submission.bridge_transfer_id.clone(),
            )
        })?;
        info!(
            internal_id = %updated.internal_id,
            tx_hash = %submission.transaction_hash,
            "Transfer broadcast, now processing"
        );

        Ok(TransferReceipt {
            internal_id: updated.internal_id,
            bridge_transfer_id: submission.bridge_transfer_id,
            status: updated.status,
            fee: bridge::format_amount(quoted.quote.fee, token.decimals),
            fee_usd: quoted.quote.fee_usd(token.decimals),
            estimated_time: bridge::ESTIMATED_TRANSFER_TIME,
            transaction_hash: submission.transaction_hash,
            to_address: resolved.address,
            to_bank_tag: updated.to_bank_tag,
        })
    }

    /// A transfer record plus a live bridge status when fetchable.
    ///
    /// Access is restricted to the sender and the recipient; anyone else
    /// sees "not found".
    pub async fn detail(
        &self,
        caller_user_id: &str,
        internal_id: &str,
    ) -> Result<(TransferRecord, Option<BridgeTxStatus>), TransferError> {
        let record = self
            .transfers
            .get(internal_id)?
            .filter(|r| {
                r.from_user_id == caller_user_id
                    || r.to_user_id.as_deref() == Some(caller_user_id)
            })
            .ok_or_else(|| TransferError::NotFound(format!("transfer {internal_id}")))?;

        let live_status = match &record.transaction_hash {
            Some(hash) => self
                .bridge
                .transfer_status(record.from_chain, hash)
                .await
                .ok(),
            None => None,
        };

        Ok((record, live_status))
    }

    /// Paginated history for a user, newest first.
    pub fn history(
        &self,
        user_id: &str,
        filter: &HistoryFilter,
        page: usize,
        limit: usize,
    ) -> Result<(Vec<TransferRecord>, usize), TransferError> {
        Ok(self.transfers.list_by_user(user_id, filter, page, limit)?)
    }

    /// Fetch the cached session key, or decrypt and cache it when a
    /// password is supplied. Absent both, the caller must log in again.
    fn unlock_session_key(
        &self,
        user_id: &str,
        password: Option<&str>,
    ) -> Result<SessionKey, TransferError> {
        if let Some(key) = self.session_keys.get(user_id) {
            return Ok(key);
        }

        let Some(password) = password else {
            return Err(TransferError::SessionKeyMissing);
        };

        let user = self
            .directory
            .user_by_id(user_id)?
            .ok_or_else(|| TransferError::NotFound(format!("user {user_id}")))?;

        let derived = vault::derive_key(password, &user.secret.salt);
        let private_key = vault::decrypt_private_key(
            &user.secret.encrypted_private_key,
            &derived,
            &user.secret.iv,
        )?;

        self.session_keys.put(user_id, private_key);
        self.session_keys
            .get(user_id)
            .ok_or(TransferError::SessionKeyMissing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::testing::MockBridge;
    use crate::notify::Notifier;
    use crate::reconcile::{ReconcileEngine, StatusMetadata};
    use crate::session_keys::{SessionKeyCache, DEFAULT_SESSION_KEY_TTL};
    use crate::storage::{test_database, UserRecord, UserSecret, WalletRecord};

    const PASSWORD: &str = "correct horse battery staple";

    struct Fixture {
        service: TransferService<MockBridge>,
        transfers: Arc<TransferDb>,
        session_keys: Arc<SessionKeyCache>,
        bridge: Arc<MockBridge>,
        alice_id: String,
        _dir: tempfile::TempDir,
    }

    /// Register a user the way the auth flow does: real salt, real
    /// encrypted secret, wallets derived from the generated key.
    fn register(directory: &Directory, tag: &str, password: &str) -> String {
        let salt = vault::generate_salt().unwrap();
        let private_key = vault::generate_private_key().unwrap();
        let derived = vault::derive_key(password, &salt);
        let (encrypted, iv) = vault::encrypt_private_key(&private_key, &derived).unwrap();
        let address = vault::address_from_private_key(&private_key).unwrap();

        let user_id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let user = UserRecord {
            user_id: user_id.clone(),
            bank_tag: tag.to_string(),
            first_name: None,
            last_name: None,
            secret: UserSecret {
                encrypted_private_key: encrypted,
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
        directory.create_user(&user, &wallets).unwrap();
        user_id
    }

    fn setup() -> Fixture {
        let (db, dir) = test_database();
        let directory = Arc::new(Directory::new(Arc::clone(&db)));
        let transfers = Arc::new(TransferDb::new(Arc::clone(&db)));
        let session_keys = Arc::new(SessionKeyCache::new(DEFAULT_SESSION_KEY_TTL));
        let resolver = Arc::new(RecipientResolver::new(Arc::clone(&directory)));
        let bridge = Arc::new(MockBridge::new());

        let alice_id = register(&directory, "alice", PASSWORD);
        register(&directory, "bob", "bobs password");

        let service = TransferService::new(
            Arc::clone(&directory),
            Arc::clone(&transfers),
            Arc::clone(&session_keys),
            resolver,
            Arc::clone(&bridge),
        );

        Fixture {
            service,
            transfers,
            session_keys,
            bridge,
            alice_id,
            _dir: dir,
        }
    }

    fn request(password: Option<&str>) -> TransferRequest {
        TransferRequest {
            from_chain: Chain::Polygon,
            to_chain: Chain::Arbitrum,
            token_symbol: "USDC".to_string(),
            amount: "100".to_string(),
            recipient: "@bob".to_string(),
            description: None,
            password: password.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn end_to_end_transfer_lifecycle() {
        let fx = setup();

        let receipt = fx
            .service
            .initiate(&fx.alice_id, request(Some(PASSWORD)))
            .await
            .unwrap();

        assert_eq!(receipt.status, TransferStatus::Processing);
        assert_eq!(receipt.transaction_hash, "0xabc");
        assert_eq!(receipt.fee, "0.1"); // 10 bps of 100 USDC
        assert_eq!(receipt.to_bank_tag.as_deref(), Some("bob"));

        let record = fx.transfers.get(&receipt.internal_id).unwrap().unwrap();
        assert_eq!(record.status, TransferStatus::Processing);
        assert_eq!(record.transaction_hash.as_deref(), Some("0xabc"));
        assert_eq!(record.amount, "100");
        assert_eq!(record.to_bank_tag.as_deref(), Some("bob"));

        // The bridge saw exactly one send: amount + fee debited.
        let sends = fx.bridge.sends.lock().unwrap();
        assert_eq!(sends.len(), 1);
        assert_eq!(sends[0].amount, alloy::primitives::U256::from(100_000_000u64));
        assert_eq!(
            sends[0].total_debit,
            alloy::primitives::U256::from(100_100_000u64)
        );
        drop(sends);

        // Webhook confirms the hash: record completes, one notification.
        let engine = ReconcileEngine::new(
            Arc::clone(&fx.transfers),
            Notifier::new(Arc::clone(&fx.transfers)),
        );
        engine
            .apply_by_tx_hash("0xabc", BridgeTxStatus::Confirmed, &StatusMetadata::default())
            .unwrap();

        let completed = fx.transfers.get(&receipt.internal_id).unwrap().unwrap();
        assert_eq!(completed.status, TransferStatus::Completed);
        assert!(completed.confirmed_at.is_some());
        assert_eq!(
            fx.transfers
                .notifications_for_user(&fx.alice_id)
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn cached_session_key_allows_initiation_without_password() {
        let fx = setup();

        // First transfer unlocks and caches the key.
        fx.service
            .initiate(&fx.alice_id, request(Some(PASSWORD)))
            .await
            .unwrap();
        assert!(fx.session_keys.exists(&fx.alice_id));

        // Second transfer needs no password.
        *fx.bridge.next_hash.lock().unwrap() = "0xdef".to_string();
        let receipt = fx.service.initiate(&fx.alice_id, request(None)).await.unwrap();
        assert_eq!(receipt.transaction_hash, "0xdef");
    }

    #[tokio::test]
    async fn missing_session_key_requires_login() {
        let fx = setup();
        let result = fx.service.initiate(&fx.alice_id, request(None)).await;
        assert!(matches!(result, Err(TransferError::SessionKeyMissing)));
    }

    #[tokio::test]
    async fn wrong_password_is_invalid_credentials() {
        let fx = setup();
        let result = fx
            .service
            .initiate(&fx.alice_id, request(Some("wrong password")))
            .await;
        assert!(matches!(
            result,
            Err(TransferError::Vault(VaultError::WrongPassword))
        ));
        // No record was created.
        let (history, total) = fx
            .service
            .history(&fx.alice_id, &HistoryFilter::default(), 1, 20)
            .unwrap();
        assert!(history.is_empty());
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn disabled_bridge_fails_before_record_creation() {
        let fx = setup();
        fx.bridge.params.lock().unwrap().is_enabled = false;

        let result = fx
            .service
            .initiate(&fx.alice_id, request(Some(PASSWORD)))
            .await;
        assert!(matches!(
            result,
            Err(TransferError::Bridge(BridgeError::Disabled { .. }))
        ));

        let (history, _) = fx
            .service
            .history(&fx.alice_id, &HistoryFilter::default(), 1, 20)
            .unwrap();
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn amount_bounds_fail_before_record_creation() {
        let fx = setup();

        let mut too_small = request(Some(PASSWORD));
        too_small.amount = "0.5".to_string(); // below the 1 USDC minimum
        let result = fx.service.initiate(&fx.alice_id, too_small).await;
        assert!(matches!(
            result,
            Err(TransferError::Bridge(BridgeError::AmountTooSmall { .. }))
        ));

        let (history, _) = fx
            .service
            .history(&fx.alice_id, &HistoryFilter::default(), 1, 20)
            .unwrap();
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn send_failure_leaves_pending_record_without_hash() {
        let fx = setup();
        *fx.bridge.fail_send.lock().unwrap() = Some("rpc down".to_string());

        let result = fx
            .service
            .initiate(&fx.alice_id, request(Some(PASSWORD)))
            .await;
        assert!(matches!(result, Err(TransferError::Bridge(_))));

        let (history, _) = fx
            .service
            .history(&fx.alice_id, &HistoryFilter::default(), 1, 20)
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, TransferStatus::Pending);
        assert!(history[0].transaction_hash.is_none());
    }

    #[tokio::test]
    async fn same_chain_transfer_is_rejected() {
        let fx = setup();
        let mut req = request(Some(PASSWORD));
        req.to_chain = Chain::Polygon;
        let result = fx.service.initiate(&fx.alice_id, req).await;
        assert!(matches!(result, Err(TransferError::Validation(_))));
    }

    #[tokio::test]
    async fn detail_is_restricted_to_participants() {
        let fx = setup();
        let receipt = fx
            .service
            .initiate(&fx.alice_id, request(Some(PASSWORD)))
            .await
            .unwrap();

        // Sender sees it; an unrelated caller does not.
        fx.bridge.set_status("0xabc", BridgeTxStatus::Processing);
        let (record, live) = fx
            .service
            .detail(&fx.alice_id, &receipt.internal_id)
            .await
            .unwrap();
        assert_eq!(record.internal_id, receipt.internal_id);
        assert_eq!(live, Some(BridgeTxStatus::Processing));

        let stranger = fx.service.detail("someone-else", &receipt.internal_id).await;
        assert!(matches!(stranger, Err(TransferError::NotFound(_))));
    }

    #[tokio::test]
    async fn recipient_by_raw_address_has_no_recipient_user() {
        let fx = setup();
        let mut req = request(Some(PASSWORD));
        req.recipient = "0x00000000000000000000000000000000000000aa".to_string();

        let receipt = fx.service.initiate(&fx.alice_id, req).await.unwrap();
        assert!(receipt.to_bank_tag.is_none());

        let record = fx.transfers.get(&receipt.internal_id).unwrap().unwrap();
        assert!(record.to_user_id.is_none());
    }
}

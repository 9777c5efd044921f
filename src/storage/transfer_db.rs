// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Transfer records, their state machine, and notification records.
//!
//! ## State machine
//!
//! `pending → processing → {completed, failed}`. Terminal states are
//! sticky: once a record is completed or failed its status never changes
//! again, and repeated updates are no-ops rather than errors so the two
//! reconciliation feeds stay idempotent. A `cancelled` status exists in the
//! persisted vocabulary but no transition produces it.
//!
//! ## Optimistic concurrency
//!
//! Every record carries a `version` counter. Updates go through
//! [`TransferDb::update_transfer`], which re-reads the record inside the
//! write transaction and fails with `VersionConflict` when the caller's
//! snapshot is stale, so the webhook and poller feeds cannot both win a
//! torn write.

use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use super::{StoreError, StoreResult};
use crate::bridge::Chain;

/// Primary table: internal_id → serialized TransferRecord (JSON bytes).
pub(super) const TRANSFERS: TableDefinition<&str, &[u8]> = TableDefinition::new("transfers");

/// Index: lowercase source-chain tx hash → internal_id.
pub(super) const TRANSFER_TX_HASHES: TableDefinition<&str, &str> =
    TableDefinition::new("transfer_tx_hashes");

/// Index: composite key `user_id|!timestamp_be|internal_id` → internal_id.
/// The inverted timestamp yields newest-first ordering on forward scans.
pub(super) const USER_TRANSFERS: TableDefinition<&[u8], &str> =
    TableDefinition::new("user_transfers");

/// Notifications: notification id → serialized NotificationRecord.
pub(super) const NOTIFICATIONS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("notifications");

// =============================================================================
// Status & Record Types
// =============================================================================

/// Transfer status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    /// Record created, nothing broadcast yet
    Pending,
    /// Source-chain transaction broadcast, bridge settlement in flight
    Processing,
    /// Bridge confirmed delivery on the destination chain
    Completed,
    /// Bridge reported failure or revert
    Failed,
    /// Reserved in the persisted vocabulary; unreachable from this flow
    Cancelled,
}

impl TransferStatus {
    /// Whether this status is terminal (sticky).
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TransferStatus::Completed | TransferStatus::Failed | TransferStatus::Cancelled
        )
    }

    /// Whether the state machine permits moving from `self` to `next`.
    pub fn can_advance_to(self, next: TransferStatus) -> bool {
        matches!(
            (self, next),
            (TransferStatus::Pending, TransferStatus::Processing)
                | (TransferStatus::Processing, TransferStatus::Completed)
                | (TransferStatus::Processing, TransferStatus::Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransferStatus::Pending => "pending",
            TransferStatus::Processing => "processing",
            TransferStatus::Completed => "completed",
            TransferStatus::Failed => "failed",
            TransferStatus::Cancelled => "cancelled",
        }
    }
}

/// Kind of transfer. Only cross-chain transfers flow through this service;
/// the enum keeps the persisted vocabulary closed and extensible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TransferKind {
    CrossChain,
}

/// Persistent record of one cross-chain transfer.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TransferRecord {
    /// System-assigned identity, stable across the record's whole life.
    pub internal_id: String,
    /// Optimistic-lock counter, bumped on every persisted mutation.
    pub version: u64,
    pub kind: TransferKind,
    pub status: TransferStatus,
    pub from_user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_user_id: Option<String>,
    pub from_address: String,
    pub to_address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_bank_tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_bank_tag: Option<String>,
    pub token_symbol: String,
    /// Amount in human-readable token units (e.g., "100.5").
    pub amount: String,
    /// Amount in USD (1:1 for supported stablecoins).
    pub amount_usd: f64,
    pub fee_usd: f64,
    pub from_chain: Chain,
    pub to_chain: Chain,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Source-chain transaction hash, known only after broadcast.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bridge_transfer_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    /// Last time a reconciliation feed observed this record (bookkeeping).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_status_check_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TransferRecord {
    /// Record the pending → processing edge after broadcast.
    pub fn mark_processing(&mut self, transaction_hash: String, bridge_transfer_id: String) {
        self.status = TransferStatus::Processing;
        self.transaction_hash = Some(transaction_hash);
        self.bridge_transfer_id = Some(bridge_transfer_id);
    }

    /// Record the processing → completed edge.
    pub fn mark_completed(&mut self) {
        self.status = TransferStatus::Completed;
        self.confirmed_at = Some(Utc::now());
    }

    /// Record the processing → failed edge.
    pub fn mark_failed(&mut self, reason: String) {
        self.status = TransferStatus::Failed;
        self.failed_at = Some(Utc::now());
        self.failure_reason = Some(reason);
    }
}

/// A user-facing notification written on each status transition.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NotificationRecord {
    pub id: String,
    pub user_id: String,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub transfer_id: String,
    pub status: TransferStatus,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Index Key Helpers
// =============================================================================

/// Build a composite key for the user_transfers index.
///
/// Format: `user_id | inverted_timestamp_be_bytes | internal_id`.
fn make_index_key(user_id: &str, timestamp: i64, internal_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(user_id.len() + 1 + 8 + 1 + internal_id.len());
    key.extend_from_slice(user_id.as_bytes());
    key.push(b'|');
    // Invert timestamp for descending order (newest first)
    key.extend_from_slice(&(!timestamp as u64).to_be_bytes());
    key.push(b'|');
    key.extend_from_slice(internal_id.as_bytes());
    key
}

/// Build a prefix for range scanning all transfers of a user.
fn make_prefix(user_id: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(user_id.len() + 1);
    prefix.extend_from_slice(user_id.as_bytes());
    prefix.push(b'|');
    prefix
}

/// Build the upper bound for a range scan (prefix with 0xFF bytes appended).
fn make_prefix_end(user_id: &str) -> Vec<u8> {
    let mut end = make_prefix(user_id);
    end.extend_from_slice(&[0xFF; 20]);
    end
}

// =============================================================================
// History Filter
// =============================================================================

/// Filters for transfer history queries.
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub status: Option<TransferStatus>,
    pub kind: Option<TransferKind>,
    /// Matches either side of the transfer.
    pub chain: Option<Chain>,
}

impl HistoryFilter {
    fn matches(&self, record: &TransferRecord) -> bool {
        if let Some(status) = self.status {
            if record.status != status {
                return false;
            }
        }
        if let Some(kind) = self.kind {
            if record.kind != kind {
                return false;
            }
        }
        if let Some(chain) = self.chain {
            if record.from_chain != chain && record.to_chain != chain {
                return false;
            }
        }
        true
    }
}

// =============================================================================
// TransferDb
// =============================================================================

/// Embedded ACID store for transfer and notification records.
pub struct TransferDb {
    db: Arc<Database>,
}

impl TransferDb {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Persist a freshly created `pending` record and its index entries.
    pub fn create(&self, record: &TransferRecord) -> StoreResult<()> {
        let json = serde_json::to_vec(record)?;
        let timestamp = record.created_at.timestamp();

        let write_txn = self.db.begin_write()?;
        {
            let mut transfers = write_txn.open_table(TRANSFERS)?;
            if transfers.get(record.internal_id.as_str())?.is_some() {
                return Err(StoreError::AlreadyExists(format!(
                    "transfer {}",
                    record.internal_id
                )));
            }
            transfers.insert(record.internal_id.as_str(), json.as_slice())?;

            let mut index = write_txn.open_table(USER_TRANSFERS)?;
            let key = make_index_key(&record.from_user_id, timestamp, &record.internal_id);
            index.insert(key.as_slice(), record.internal_id.as_str())?;
            if let Some(to_user) = &record.to_user_id {
                let key = make_index_key(to_user, timestamp, &record.internal_id);
                index.insert(key.as_slice(), record.internal_id.as_str())?;
            }

            if let Some(hash) = &record.transaction_hash {
                let mut hashes = write_txn.open_table(TRANSFER_TX_HASHES)?;
                hashes.insert(hash.to_lowercase().as_str(), record.internal_id.as_str())?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Look up a record by internal id.
    pub fn get(&self, internal_id: &str) -> StoreResult<Option<TransferRecord>> {
        let read_txn = self.db.begin_read()?;
        let transfers = read_txn.open_table(TRANSFERS)?;
        match transfers.get(internal_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Look up a record by its source-chain transaction hash.
    pub fn get_by_tx_hash(&self, tx_hash: &str) -> StoreResult<Option<TransferRecord>> {
        let read_txn = self.db.begin_read()?;
        let hashes = read_txn.open_table(TRANSFER_TX_HASHES)?;
        let internal_id = match hashes.get(tx_hash.to_lowercase().as_str())? {
            Some(value) => value.value().to_string(),
            None => return Ok(None),
        };
        drop(hashes);
        let transfers = read_txn.open_table(TRANSFERS)?;
        match transfers.get(internal_id.as_str())? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Apply a mutation under an optimistic version check.
    ///
    /// The record is re-read inside the write transaction; if its version
    /// no longer matches `expected_version` the update fails with
    /// `VersionConflict` and nothing is written. On success the version is
    /// bumped, `updated_at` refreshed, and any newly set transaction hash
    /// indexed.
    pub fn update_transfer<F>(
        &self,
        internal_id: &str,
        expected_version: u64,
        mutate: F,
    ) -> StoreResult<TransferRecord>
    where
        F: FnOnce(&mut TransferRecord),
    {
        let write_txn = self.db.begin_write()?;
        let updated = {
            let mut transfers = write_txn.open_table(TRANSFERS)?;
            let mut record: TransferRecord = match transfers.get(internal_id)? {
                Some(value) => serde_json::from_slice(value.value())?,
                None => return Err(StoreError::NotFound(format!("transfer {internal_id}"))),
            };

            if record.version != expected_version {
                return Err(StoreError::VersionConflict(internal_id.to_string()));
            }

            let hash_before = record.transaction_hash.clone();
            mutate(&mut record);
            record.version += 1;
            record.updated_at = Utc::now();

            let json = serde_json::to_vec(&record)?;
            transfers.insert(internal_id, json.as_slice())?;

            if hash_before.is_none() {
                if let Some(hash) = &record.transaction_hash {
                    let mut hashes = write_txn.open_table(TRANSFER_TX_HASHES)?;
                    hashes.insert(hash.to_lowercase().as_str(), internal_id)?;
                }
            }

            record
        };
        write_txn.commit()?;
        Ok(updated)
    }

    /// All non-terminal records with a known transaction hash, oldest first,
    /// capped at `limit`. This is the poller's work list.
    pub fn list_open_transfers(&self, limit: usize) -> StoreResult<Vec<TransferRecord>> {
        let read_txn = self.db.begin_read()?;
        let transfers = read_txn.open_table(TRANSFERS)?;

        let mut open = Vec::new();
        for entry in transfers.iter()? {
            let (_, value) = entry?;
            let record: TransferRecord = serde_json::from_slice(value.value())?;
            if matches!(
                record.status,
                TransferStatus::Pending | TransferStatus::Processing
            ) && record.transaction_hash.is_some()
            {
                open.push(record);
            }
        }

        open.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        open.truncate(limit);
        Ok(open)
    }

    /// Paginated, filterable history for a user (as sender or recipient),
    /// newest first. Returns `(page_of_records, total_matching)`.
    pub fn list_by_user(
        &self,
        user_id: &str,
        filter: &HistoryFilter,
        page: usize,
        limit: usize,
    ) -> StoreResult<(Vec<TransferRecord>, usize)> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(USER_TRANSFERS)?;
        let transfers = read_txn.open_table(TRANSFERS)?;

        let start = make_prefix(user_id);
        let end = make_prefix_end(user_id);

        let mut matching = Vec::new();
        for entry in index.range(start.as_slice()..end.as_slice())? {
            let (_, value) = entry?;
            let internal_id = value.value();
            if let Some(raw) = transfers.get(internal_id)? {
                let record: TransferRecord = serde_json::from_slice(raw.value())?;
                if filter.matches(&record) {
                    matching.push(record);
                }
            }
        }

        let total = matching.len();
        let page = page.max(1);
        let start_idx = (page - 1).saturating_mul(limit);
        let page_items = matching
            .into_iter()
            .skip(start_idx)
            .take(limit)
            .collect();

        Ok((page_items, total))
    }

    // =========================================================================
    // Notifications
    // =========================================================================

    /// Persist a notification record.
    pub fn insert_notification(&self, notification: &NotificationRecord) -> StoreResult<()> {
        let json = serde_json::to_vec(notification)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(NOTIFICATIONS)?;
            table.insert(notification.id.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// All notifications for a user, newest first.
    pub fn notifications_for_user(&self, user_id: &str) -> StoreResult<Vec<NotificationRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(NOTIFICATIONS)?;

        let mut notifications = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            let record: NotificationRecord = serde_json::from_slice(value.value())?;
            if record.user_id == user_id {
                notifications.push(record);
            }
        }
        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(notifications)
    }
}

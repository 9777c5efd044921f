// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Persistent Storage Module
//!
//! All durable state lives in a single embedded redb database (pure Rust,
//! ACID):
//!
//! - [`directory`] - users (with their encrypted key secrets), bank tags,
//!   and per-chain wallets
//! - [`transfer_db`] - transfer records, their state machine, secondary
//!   indexes, and notification records
//!
//! ## Table Layout
//!
//! | Table | Key | Value |
//! |-------|-----|-------|
//! | `users` | user_id | serialized UserRecord |
//! | `bank_tags` | lowercase tag | user_id |
//! | `wallets` | `user_id\|chain_id` | serialized WalletRecord |
//! | `wallet_addresses` | `chain_id\|lowercase address` | user_id |
//! | `transfers` | internal_id | serialized TransferRecord |
//! | `transfer_tx_hashes` | lowercase tx_hash | internal_id |
//! | `user_transfers` | `user_id\|!timestamp_be\|internal_id` | internal_id |
//! | `notifications` | notification id | serialized NotificationRecord |
//!
//! The `user_transfers` composite key inverts the timestamp so a forward
//! range scan yields newest-first ordering, and indexes both the sender and
//! the recipient of each transfer.

use std::path::Path;
use std::sync::Arc;

use redb::Database;

pub mod directory;
pub mod transfer_db;

pub use directory::{Directory, UserRecord, UserSecret, WalletRecord};
pub use transfer_db::{
    HistoryFilter, NotificationRecord, TransferDb, TransferKind, TransferRecord, TransferStatus,
};

/// Errors from persistent storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("version conflict on {0}")]
    VersionConflict(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Open (or create) the database at the given path, pre-creating all tables
/// so later read transactions don't fail.
pub fn open_database(path: &Path) -> StoreResult<Arc<Database>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let db = Database::create(path)?;

    let write_txn = db.begin_write()?;
    {
        let _ = write_txn.open_table(directory::USERS)?;
        let _ = write_txn.open_table(directory::BANK_TAGS)?;
        let _ = write_txn.open_table(directory::WALLETS)?;
        let _ = write_txn.open_table(directory::WALLET_ADDRESSES)?;
        let _ = write_txn.open_table(transfer_db::TRANSFERS)?;
        let _ = write_txn.open_table(transfer_db::TRANSFER_TX_HASHES)?;
        let _ = write_txn.open_table(transfer_db::USER_TRANSFERS)?;
        let _ = write_txn.open_table(transfer_db::NOTIFICATIONS)?;
    }
    write_txn.commit()?;

    Ok(Arc::new(db))
}

#[cfg(test)]
pub(crate) fn test_database() -> (Arc<Database>, tempfile::TempDir) {
    let dir = tempfile::TempDir::new().expect("temp dir");
    let db = open_database(&dir.path().join("test.redb")).expect("open test db");
    (db, dir)
}

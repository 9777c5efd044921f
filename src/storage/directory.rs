// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User, bank-tag, and wallet directory.
//!
//! The directory owns the user records (including each user's encrypted key
//! secret), the unique bank-tag namespace, and the per-chain wallets. A user
//! and their wallets are created in a single write transaction at
//! registration; the secret's three fields are only ever written together.

use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{StoreError, StoreResult};
use crate::bridge::Chain;

/// Primary table: user_id → serialized UserRecord (JSON bytes).
pub(super) const USERS: TableDefinition<&str, &[u8]> = TableDefinition::new("users");

/// Unique tag namespace: lowercase tag (without `@`) → user_id.
pub(super) const BANK_TAGS: TableDefinition<&str, &str> = TableDefinition::new("bank_tags");

/// Wallets: composite key `user_id|chain_id` → serialized WalletRecord.
pub(super) const WALLETS: TableDefinition<&str, &[u8]> = TableDefinition::new("wallets");

/// Reverse index: `chain_id|lowercase address` → user_id.
pub(super) const WALLET_ADDRESSES: TableDefinition<&str, &str> =
    TableDefinition::new("wallet_addresses");

/// Encrypted private-key material stored on the user record.
///
/// The three fields are written together at registration and never
/// mutated afterwards (key rotation is not supported). The raw private key
/// is never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserSecret {
    /// AES-256-CBC ciphertext of the hex private key, hex-encoded.
    pub encrypted_private_key: String,
    /// PBKDF2 salt, hex-encoded, unique per user.
    pub salt: String,
    /// AES initialization vector, hex-encoded, unique per encryption.
    pub iv: String,
}

/// A registered user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: String,
    /// Bank tag without the leading `@`, stored lowercase.
    pub bank_tag: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    pub secret: UserSecret,
    pub created_at: DateTime<Utc>,
}

/// A user's wallet on one chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletRecord {
    pub user_id: String,
    pub chain: Chain,
    /// On-chain address, EIP-55 checksummed.
    pub address: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

fn wallet_key(user_id: &str, chain: Chain) -> String {
    format!("{}|{}", user_id, chain.id())
}

fn address_key(chain: Chain, address: &str) -> String {
    format!("{}|{}", chain.id(), address.to_lowercase())
}

/// Directory over the embedded database.
pub struct Directory {
    db: Arc<Database>,
}

impl Directory {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Create a user together with their wallets, atomically.
    ///
    /// Fails with `AlreadyExists` if the bank tag is taken.
    pub fn create_user(&self, user: &UserRecord, wallets: &[WalletRecord]) -> StoreResult<()> {
        let tag = user.bank_tag.to_lowercase();
        let user_json = serde_json::to_vec(user)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut tags = write_txn.open_table(BANK_TAGS)?;
            if tags.get(tag.as_str())?.is_some() {
                return Err(StoreError::AlreadyExists(format!("bank tag @{tag}")));
            }
            tags.insert(tag.as_str(), user.user_id.as_str())?;

            let mut users = write_txn.open_table(USERS)?;
            if users.get(user.user_id.as_str())?.is_some() {
                return Err(StoreError::AlreadyExists(format!("user {}", user.user_id)));
            }
            users.insert(user.user_id.as_str(), user_json.as_slice())?;

            let mut wallet_table = write_txn.open_table(WALLETS)?;
            let mut address_table = write_txn.open_table(WALLET_ADDRESSES)?;
            for wallet in wallets {
                let json = serde_json::to_vec(wallet)?;
                wallet_table.insert(wallet_key(&wallet.user_id, wallet.chain).as_str(), json.as_slice())?;
                address_table.insert(
                    address_key(wallet.chain, &wallet.address).as_str(),
                    wallet.user_id.as_str(),
                )?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Look up a user by id.
    pub fn user_by_id(&self, user_id: &str) -> StoreResult<Option<UserRecord>> {
        let read_txn = self.db.begin_read()?;
        let users = read_txn.open_table(USERS)?;
        match users.get(user_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Look up a user by bank tag (without `@`, case-insensitive).
    pub fn user_by_tag(&self, tag: &str) -> StoreResult<Option<UserRecord>> {
        let tag = tag.to_lowercase();
        let read_txn = self.db.begin_read()?;
        let tags = read_txn.open_table(BANK_TAGS)?;
        let user_id = match tags.get(tag.as_str())? {
            Some(value) => value.value().to_string(),
            None => return Ok(None),
        };
        drop(tags);
        let users = read_txn.open_table(USERS)?;
        match users.get(user_id.as_str())? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// A user's wallet on a chain, regardless of active flag.
    pub fn wallet(&self, user_id: &str, chain: Chain) -> StoreResult<Option<WalletRecord>> {
        let read_txn = self.db.begin_read()?;
        let wallets = read_txn.open_table(WALLETS)?;
        match wallets.get(wallet_key(user_id, chain).as_str())? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// A user's *active* wallet on a chain.
    pub fn active_wallet(&self, user_id: &str, chain: Chain) -> StoreResult<Option<WalletRecord>> {
        Ok(self.wallet(user_id, chain)?.filter(|w| w.is_active))
    }

    /// Resolve an on-chain address to its owning wallet and user, if any.
    pub fn wallet_by_address(
        &self,
        chain: Chain,
        address: &str,
    ) -> StoreResult<Option<(WalletRecord, UserRecord)>> {
        let read_txn = self.db.begin_read()?;
        let addresses = read_txn.open_table(WALLET_ADDRESSES)?;
        let user_id = match addresses.get(address_key(chain, address).as_str())? {
            Some(value) => value.value().to_string(),
            None => return Ok(None),
        };
        drop(addresses);

        let wallets = read_txn.open_table(WALLETS)?;
        let wallet: WalletRecord = match wallets.get(wallet_key(&user_id, chain).as_str())? {
            Some(value) => serde_json::from_slice(value.value())?,
            None => return Ok(None),
        };
        drop(wallets);

        let users = read_txn.open_table(USERS)?;
        let user: UserRecord = match users.get(user_id.as_str())? {
            Some(value) => serde_json::from_slice(value.value())?,
            None => return Ok(None),
        };

        Ok(Some((wallet, user)))
    }
}


#[cfg(test)]
mod tests {
    use super::test_fixtures::sample_user;
    use super::*;
    use crate::storage::test_database;

    const ADDR: &str = "0x742d35Cc6634C0532925a3b844Bc9e7595f4aB12";

    #[test]
    fn create_and_fetch_user_by_id_and_tag() {
        let (db, _dir) = test_database();
        let directory = Directory::new(db);
        let (user, wallets) = sample_user("alice", ADDR);

        directory.create_user(&user, &wallets).unwrap();

        let by_id = directory.user_by_id(&user.user_id).unwrap().unwrap();
        assert_eq!(by_id.bank_tag, "alice");
        assert_eq!(by_id.secret, user.secret);

        // Tag lookup is case-insensitive.
        let by_tag = directory.user_by_tag("ALICE").unwrap().unwrap();
        assert_eq!(by_tag.user_id, user.user_id);
    }

    #[test]
    fn duplicate_tag_is_rejected() {
        let (db, _dir) = test_database();
        let directory = Directory::new(db);
        let (alice, wallets) = sample_user("alice", ADDR);
        directory.create_user(&alice, &wallets).unwrap();

        let (imposter, wallets2) = sample_user("Alice", ADDR);
        let result = directory.create_user(&imposter, &wallets2);
        assert!(matches!(result, Err(StoreError::AlreadyExists(_))));
    }

    #[test]
    fn active_wallet_filters_inactive() {
        let (db, _dir) = test_database();
        let directory = Directory::new(db);
        let (user, mut wallets) = sample_user("bob", ADDR);
        // Deactivate the polygon wallet.
        for w in wallets.iter_mut() {
            if w.chain == Chain::Polygon {
                w.is_active = false;
            }
        }
        directory.create_user(&user, &wallets).unwrap();

        assert!(directory
            .active_wallet(&user.user_id, Chain::Arbitrum)
            .unwrap()
            .is_some());
        assert!(directory
            .active_wallet(&user.user_id, Chain::Polygon)
            .unwrap()
            .is_none());
        // The wallet itself still exists.
        assert!(directory.wallet(&user.user_id, Chain::Polygon).unwrap().is_some());
    }

    #[test]
    fn wallet_by_address_is_case_insensitive() {
        let (db, _dir) = test_database();
        let directory = Directory::new(db);
        let (user, wallets) = sample_user("carol", ADDR);
        directory.create_user(&user, &wallets).unwrap();

        let found = directory
            .wallet_by_address(Chain::Polygon, &ADDR.to_uppercase().replace("0X", "0x"))
            .unwrap();
        let (wallet, owner) = found.unwrap();
        assert_eq!(wallet.user_id, user.user_id);
        assert_eq!(owner.bank_tag, "carol");
    }

    #[test]
    fn unknown_lookups_return_none() {
        let (db, _dir) = test_database();
        let directory = Directory::new(db);

        assert!(directory.user_by_id("missing").unwrap().is_none());
        assert!(directory.user_by_tag("missing").unwrap().is_none());
        assert!(directory
            .wallet_by_address(Chain::Polygon, ADDR)
            .unwrap()
            .is_none());
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shared application state.
//!
//! Every component is constructed once at startup with its dependencies
//! passed in explicitly (no module-level singletons), then shared through
//! `Arc` handles so handlers and background tasks see the same stores,
//! caches, and bridge client.

use std::sync::Arc;

use redb::Database;

use crate::auth::{SessionTokens, DEFAULT_SESSION_TOKEN_TTL};
use crate::bridge::{BridgeError, DebridgeGateway};
use crate::config::Config;
use crate::notify::Notifier;
use crate::reconcile::ReconcileEngine;
use crate::resolver::RecipientResolver;
use crate::session_keys::SessionKeyCache;
use crate::storage::{Directory, TransferDb};
use crate::transfers::TransferService;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Arc<Database>,
    pub directory: Arc<Directory>,
    pub transfers: Arc<TransferDb>,
    pub session_keys: Arc<SessionKeyCache>,
    pub session_tokens: Arc<SessionTokens>,
    pub engine: Arc<ReconcileEngine>,
    pub bridge: Arc<DebridgeGateway>,
    pub service: Arc<TransferService<DebridgeGateway>>,
}

impl AppState {
    /// Wire up all components over an opened database.
    pub fn new(config: Config, db: Arc<Database>) -> Result<Self, BridgeError> {
        let bridge = Arc::new(DebridgeGateway::new(&config.rpc_urls)?);

        let directory = Arc::new(Directory::new(Arc::clone(&db)));
        let transfers = Arc::new(TransferDb::new(Arc::clone(&db)));
        let session_keys = Arc::new(SessionKeyCache::new(config.session_key_ttl));
        let session_tokens = Arc::new(SessionTokens::new(
            &config.session_secret,
            DEFAULT_SESSION_TOKEN_TTL,
        ));
        let resolver = Arc::new(RecipientResolver::new(Arc::clone(&directory)));
        let engine = Arc::new(ReconcileEngine::new(
            Arc::clone(&transfers),
            Notifier::new(Arc::clone(&transfers)),
        ));
        let service = Arc::new(TransferService::new(
            Arc::clone(&directory),
            Arc::clone(&transfers),
            Arc::clone(&session_keys),
            resolver,
            Arc::clone(&bridge),
        ));

        Ok(Self {
            config: Arc::new(config),
            db,
            directory,
            transfers,
            session_keys,
            session_tokens,
            engine,
            bridge,
            service,
        })
    }
}

#[cfg(test)]
pub(crate) fn test_state() -> (AppState, tempfile::TempDir) {
    let dir = tempfile::TempDir::new().expect("temp dir");
    let config = crate::config::test_config(dir.path().to_path_buf());
    let db = crate::storage::open_database(&dir.path().join("test.redb")).expect("open db");
    let state = AppState::new(config, db).expect("build state");
    (state, dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_wires_up_all_components() {
        let (state, _dir) = test_state();
        assert!(state.directory.user_by_id("nobody").unwrap().is_none());
        assert!(state.transfers.get("nobody").unwrap().is_none());
        assert!(!state.session_keys.exists("nobody"));
    }
}

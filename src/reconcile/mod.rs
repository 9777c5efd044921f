// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Reconciliation of transfer records against bridge-observed status.
//!
//! Two independent feeds call the same [`ReconcileEngine::apply_status_update`]
//! operation: webhook pushes from the bridge and the periodic
//! [`poller::TransferPoller`]. The operation is idempotent and
//! order-tolerant:
//!
//! 1. A record already in a terminal status is never touched (terminal
//!    states are sticky).
//! 2. The observed status maps onto the internal vocabulary through the
//!    closed [`map_observed_status`] table.
//! 3. An observation matching the current status updates only bookkeeping
//!    metadata, not status fields, and fires no notification.
//! 4. Otherwise the transition is applied under an optimistic version
//!    check (retrying on conflict against the other feed) and the user is
//!    notified exactly once per real transition.
//!
//! Whichever feed arrives first drives the transition; the later arrival
//! is a no-op, so no ordering between webhook and poll is assumed.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::bridge::BridgeTxStatus;
use crate::notify::Notifier;
use crate::storage::{StoreError, StoreResult, TransferDb, TransferStatus};

pub mod poller;

pub use poller::TransferPoller;

/// Map a bridge-observed status onto the internal vocabulary.
pub fn map_observed_status(observed: BridgeTxStatus) -> TransferStatus {
    match observed {
        BridgeTxStatus::Confirmed | BridgeTxStatus::Completed => TransferStatus::Completed,
        BridgeTxStatus::Failed | BridgeTxStatus::Reverted => TransferStatus::Failed,
        BridgeTxStatus::Pending | BridgeTxStatus::Processing => TransferStatus::Processing,
    }
}

/// Extra context accompanying an observed status.
#[derive(Debug, Clone, Default)]
pub struct StatusMetadata {
    /// Bridge-supplied failure reason, when available.
    pub reason: Option<String>,
}

/// What an `apply_status_update` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The record transitioned to the given status; one notification fired.
    Transitioned(TransferStatus),
    /// Observed status matched the current one; bookkeeping only.
    Unchanged,
    /// The record is already terminal; nothing written.
    AlreadyTerminal,
    /// The observed transition is not permitted from the current status.
    Ignored,
    /// No record matches the given identity.
    NotFound,
}

/// Applies idempotent, order-tolerant status updates from both feeds.
pub struct ReconcileEngine {
    transfers: Arc<TransferDb>,
    notifier: Notifier,
}

impl ReconcileEngine {
    pub fn new(transfers: Arc<TransferDb>, notifier: Notifier) -> Self {
        Self {
            transfers,
            notifier,
        }
    }

    /// Apply an observed status to the record with the given internal id.
    pub fn apply_status_update(
        &self,
        internal_id: &str,
        observed: BridgeTxStatus,
        metadata: &StatusMetadata,
    ) -> StoreResult<ReconcileOutcome> {
        loop {
            let Some(record) = self.transfers.get(internal_id)? else {
                return Ok(ReconcileOutcome::NotFound);
            };

            // Terminal states never regress.
            if record.status.is_terminal() {
                return Ok(ReconcileOutcome::AlreadyTerminal);
            }

            let mapped = map_observed_status(observed);

            // Same status: bookkeeping only, no notification.
            if mapped == record.status {
                match self.transfers.update_transfer(internal_id, record.version, |r| {
                    r.last_status_check_at = Some(Utc::now());
                }) {
                    Ok(_) => return Ok(ReconcileOutcome::Unchanged),
                    Err(StoreError::VersionConflict(_)) => continue,
                    Err(e) => return Err(e),
                }
            }

            if !record.status.can_advance_to(mapped) {
                warn!(
                    internal_id,
                    current = record.status.as_str(),
                    observed = observed.as_str(),
                    "Ignoring bridge status outside the transition table"
                );
                return Ok(ReconcileOutcome::Ignored);
            }

            let reason = metadata
                .reason
                .clone()
                .unwrap_or_else(|| "Transfer failed on bridge".to_string());

            match self.transfers.update_transfer(internal_id, record.version, move |r| {
                match mapped {
                    TransferStatus::Completed => r.mark_completed(),
                    TransferStatus::Failed => r.mark_failed(reason),
                    TransferStatus::Processing => r.status = TransferStatus::Processing,
                    _ => {}
                }
                r.last_status_check_at = Some(Utc::now());
            }) {
                Ok(updated) => {
                    info!(
                        internal_id,
                        status = mapped.as_str(),
                        "Transfer status updated"
                    );
                    self.notifier.notify(&updated, mapped);
                    return Ok(ReconcileOutcome::Transitioned(mapped));
                }
                // The other feed won the write; re-evaluate from the new state.
                Err(StoreError::VersionConflict(_)) => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Apply an observed status to the record matching a source-chain
    /// transaction hash (the webhook feed's identity). Unmatched hashes
    /// produce [`ReconcileOutcome::NotFound`] without side effects.
    pub fn apply_by_tx_hash(
        &self,
        tx_hash: &str,
        observed: BridgeTxStatus,
        metadata: &StatusMetadata,
    ) -> StoreResult<ReconcileOutcome> {
        match self.transfers.get_by_tx_hash(tx_hash)? {
            Some(record) => self.apply_status_update(&record.internal_id, observed, metadata),
            None => Ok(ReconcileOutcome::NotFound),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_database;
    use crate::storage::transfer_db::test_fixtures::pending_transfer;
    use crate::storage::TransferRecord;

    fn engine_with_processing_record() -> (ReconcileEngine, Arc<TransferDb>, TransferRecord, tempfile::TempDir)
    {
        let (db, dir) = test_database();
        let transfers = Arc::new(TransferDb::new(db));
        let engine = ReconcileEngine::new(
            Arc::clone(&transfers),
            Notifier::new(Arc::clone(&transfers)),
        );

        let record = pending_transfer("alice", Some("bob"));
        transfers.create(&record).unwrap();
        let record = transfers
            .update_transfer(&record.internal_id, 0, |r| {
                r.mark_processing("0xabc".to_string(), "0xbridgeid".to_string())
            })
            .unwrap();

        (engine, transfers, record, dir)
    }

    #[test]
    fn status_mapping_table() {
        assert_eq!(
            map_observed_status(BridgeTxStatus::Confirmed),
            TransferStatus::Completed
        );
        assert_eq!(
            map_observed_status(BridgeTxStatus::Completed),
            TransferStatus::Completed
        );
        assert_eq!(
            map_observed_status(BridgeTxStatus::Failed),
            TransferStatus::Failed
        );
        assert_eq!(
            map_observed_status(BridgeTxStatus::Reverted),
            TransferStatus::Failed
        );
        assert_eq!(
            map_observed_status(BridgeTxStatus::Pending),
            TransferStatus::Processing
        );
        assert_eq!(
            map_observed_status(BridgeTxStatus::Processing),
            TransferStatus::Processing
        );
    }

    #[test]
    fn confirmation_completes_and_notifies_once() {
        let (engine, transfers, record, _dir) = engine_with_processing_record();

        let outcome = engine
            .apply_status_update(
                &record.internal_id,
                BridgeTxStatus::Confirmed,
                &StatusMetadata::default(),
            )
            .unwrap();
        assert_eq!(
            outcome,
            ReconcileOutcome::Transitioned(TransferStatus::Completed)
        );

        let updated = transfers.get(&record.internal_id).unwrap().unwrap();
        assert_eq!(updated.status, TransferStatus::Completed);
        assert!(updated.confirmed_at.is_some());
        assert_eq!(transfers.notifications_for_user("alice").unwrap().len(), 1);
    }

    #[test]
    fn repeated_observation_is_idempotent() {
        let (engine, transfers, record, _dir) = engine_with_processing_record();
        let meta = StatusMetadata::default();

        engine
            .apply_status_update(&record.internal_id, BridgeTxStatus::Confirmed, &meta)
            .unwrap();
        let second = engine
            .apply_status_update(&record.internal_id, BridgeTxStatus::Confirmed, &meta)
            .unwrap();
        assert_eq!(second, ReconcileOutcome::AlreadyTerminal);

        let final_record = transfers.get(&record.internal_id).unwrap().unwrap();
        assert_eq!(final_record.status, TransferStatus::Completed);
        // Exactly one notification for the single real transition.
        assert_eq!(transfers.notifications_for_user("alice").unwrap().len(), 1);
    }

    #[test]
    fn terminal_state_never_regresses_in_either_order() {
        let (engine, transfers, record, _dir) = engine_with_processing_record();
        let meta = StatusMetadata::default();

        // Webhook reports failed, then a stale poll reports processing.
        engine
            .apply_status_update(&record.internal_id, BridgeTxStatus::Failed, &meta)
            .unwrap();
        let late_poll = engine
            .apply_status_update(&record.internal_id, BridgeTxStatus::Processing, &meta)
            .unwrap();
        assert_eq!(late_poll, ReconcileOutcome::AlreadyTerminal);

        // Even a conflicting terminal observation is ignored.
        let conflicting = engine
            .apply_status_update(&record.internal_id, BridgeTxStatus::Confirmed, &meta)
            .unwrap();
        assert_eq!(conflicting, ReconcileOutcome::AlreadyTerminal);

        let final_record = transfers.get(&record.internal_id).unwrap().unwrap();
        assert_eq!(final_record.status, TransferStatus::Failed);
        assert!(final_record.failed_at.is_some());
        assert_eq!(transfers.notifications_for_user("alice").unwrap().len(), 1);
    }

    #[test]
    fn same_status_updates_bookkeeping_only() {
        let (engine, transfers, record, _dir) = engine_with_processing_record();

        let outcome = engine
            .apply_status_update(
                &record.internal_id,
                BridgeTxStatus::Processing,
                &StatusMetadata::default(),
            )
            .unwrap();
        assert_eq!(outcome, ReconcileOutcome::Unchanged);

        let updated = transfers.get(&record.internal_id).unwrap().unwrap();
        assert_eq!(updated.status, TransferStatus::Processing);
        assert!(updated.last_status_check_at.is_some());
        assert!(transfers.notifications_for_user("alice").unwrap().is_empty());
    }

    #[test]
    fn failure_reason_from_metadata_is_kept() {
        let (engine, transfers, record, _dir) = engine_with_processing_record();

        engine
            .apply_status_update(
                &record.internal_id,
                BridgeTxStatus::Reverted,
                &StatusMetadata {
                    reason: Some("insufficient liquidity".to_string()),
                },
            )
            .unwrap();

        let updated = transfers.get(&record.internal_id).unwrap().unwrap();
        assert_eq!(
            updated.failure_reason.as_deref(),
            Some("insufficient liquidity")
        );
    }

    #[test]
    fn webhook_feed_matches_by_tx_hash() {
        let (engine, transfers, record, _dir) = engine_with_processing_record();

        let outcome = engine
            .apply_by_tx_hash("0xABC", BridgeTxStatus::Confirmed, &StatusMetadata::default())
            .unwrap();
        assert_eq!(
            outcome,
            ReconcileOutcome::Transitioned(TransferStatus::Completed)
        );
        assert_eq!(
            transfers.get(&record.internal_id).unwrap().unwrap().status,
            TransferStatus::Completed
        );
    }

    #[test]
    fn unmatched_tx_hash_has_no_side_effects() {
        let (engine, transfers, record, _dir) = engine_with_processing_record();

        let outcome = engine
            .apply_by_tx_hash(
                "0xdoesnotexist",
                BridgeTxStatus::Confirmed,
                &StatusMetadata::default(),
            )
            .unwrap();
        assert_eq!(outcome, ReconcileOutcome::NotFound);
        assert_eq!(
            transfers.get(&record.internal_id).unwrap().unwrap().status,
            TransferStatus::Processing
        );
    }

    #[test]
    fn out_of_table_transition_is_ignored() {
        let (db, _dir) = test_database();
        let transfers = Arc::new(TransferDb::new(db));
        let engine = ReconcileEngine::new(
            Arc::clone(&transfers),
            Notifier::new(Arc::clone(&transfers)),
        );

        // Still pending, no hash: a completed observation cannot apply.
        let record = pending_transfer("alice", None);
        transfers.create(&record).unwrap();

        let outcome = engine
            .apply_status_update(
                &record.internal_id,
                BridgeTxStatus::Confirmed,
                &StatusMetadata::default(),
            )
            .unwrap();
        assert_eq!(outcome, ReconcileOutcome::Ignored);
        assert_eq!(
            transfers.get(&record.internal_id).unwrap().unwrap().status,
            TransferStatus::Pending
        );
    }
}

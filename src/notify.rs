// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Best-effort user notifications on transfer status transitions.
//!
//! Notification creation is fire-and-forget: a failure is logged and
//! swallowed, never rolling back or blocking the status transition that
//! triggered it. Delivery (email/SMS/push) is a separate service's job;
//! this module only persists the notification record.

use std::sync::Arc;

use chrono::Utc;
use tracing::warn;
use uuid::Uuid;

use crate::storage::{NotificationRecord, TransferDb, TransferRecord, TransferStatus};

/// Writes notification records for transfer status transitions.
pub struct Notifier {
    transfers: Arc<TransferDb>,
}

impl Notifier {
    pub fn new(transfers: Arc<TransferDb>) -> Self {
        Self { transfers }
    }

    /// Record a status-transition notification for the sending user.
    ///
    /// Never fails: storage errors are logged at `warn` and dropped.
    pub fn notify(&self, record: &TransferRecord, status: TransferStatus) {
        let notification = NotificationRecord {
            id: Uuid::new_v4().to_string(),
            user_id: record.from_user_id.clone(),
            kind: "transfer_status".to_string(),
            title: "Transfer Status Update".to_string(),
            message: status_message(record, status),
            transfer_id: record.internal_id.clone(),
            status,
            created_at: Utc::now(),
        };

        if let Err(e) = self.transfers.insert_notification(&notification) {
            warn!(
                transfer_id = %record.internal_id,
                status = status.as_str(),
                error = %e,
                "Failed to record transfer notification"
            );
        }
    }
}

/// User-facing message for a status transition.
fn status_message(record: &TransferRecord, status: TransferStatus) -> String {
    let amount = record.amount_usd;
    let token = &record.token_symbol;
    let from_chain = record.from_chain;
    let to_chain = record.to_chain;

    match status {
        TransferStatus::Completed => format!(
            "Your transfer of ${amount} {token} from {from_chain} to {to_chain} has been completed successfully."
        ),
        TransferStatus::Failed => format!(
            "Your transfer of ${amount} {token} from {from_chain} to {to_chain} has failed. Please contact support."
        ),
        TransferStatus::Processing => format!(
            "Your transfer of ${amount} {token} from {from_chain} to {to_chain} is being processed."
        ),
        other => format!(
            "Your transfer of ${amount} {token} from {from_chain} to {to_chain} status has been updated to {}.",
            other.as_str()
        ),
    }
}

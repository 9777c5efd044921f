// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Transfer Status Poller
//!
//! Background task that periodically queries the bridge for every
//! non-terminal transfer with a known transaction hash and feeds the
//! observations into the reconciliation engine. This drives records to a
//! terminal state even when the bridge's webhook never arrives.
//!
//! ## Strategy
//!
//! Every `poll_interval` (default 30 s) the poller:
//! 1. Lists up to `batch_limit` open records (pending/processing with a
//!    transaction hash), oldest first.
//! 2. Queries the bridge for each record's current status.
//! 3. Calls the same `apply_status_update` operation the webhook feed
//!    uses, so races between the two feeds resolve idempotently.
//!
//! One record's error never aborts the batch; it is logged and retried on
//! the next tick.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken` for graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{ReconcileEngine, StatusMetadata};
use crate::bridge::Bridge;
use crate::storage::TransferDb;

/// Default interval between polling sweeps.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Default maximum records examined per sweep.
const DEFAULT_BATCH_LIMIT: usize = 50;

/// Background poller that reconciles open transfers with the bridge.
pub struct TransferPoller<B: Bridge> {
    transfers: Arc<TransferDb>,
    engine: Arc<ReconcileEngine>,
    bridge: Arc<B>,
    poll_interval: Duration,
    batch_limit: usize,
}

impl<B: Bridge> TransferPoller<B> {
    pub fn new(transfers: Arc<TransferDb>, engine: Arc<ReconcileEngine>, bridge: Arc<B>) -> Self {
        Self {
            transfers,
            engine,
            bridge,
            poll_interval: DEFAULT_POLL_INTERVAL,
            batch_limit: DEFAULT_BATCH_LIMIT,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_batch_limit(mut self, limit: usize) -> Self {
        self.batch_limit = limit;
        self
    }

    /// Run the poller loop until the cancellation token is triggered.
    ///
    /// Should be spawned as a background task:
    /// ```rust,ignore
    /// tokio::spawn(poller.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.poll_interval.as_secs(),
            batch_limit = self.batch_limit,
            "Transfer status poller starting"
        );

        loop {
            if shutdown.is_cancelled() {
                info!("Transfer status poller shutting down");
                return;
            }

            self.poll_step().await;

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Transfer status poller shutting down");
                    return;
                }
            }
        }
    }

    /// Execute one polling sweep over the open records.
    pub async fn poll_step(&self) {
        let open = match self.transfers.list_open_transfers(self.batch_limit) {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "Transfer poller: failed to list open transfers");
                return;
            }
        };

        if open.is_empty() {
            return;
        }

        info!(count = open.len(), "Transfer poller: reconciling open transfers");

        for record in open {
            let Some(tx_hash) = record.transaction_hash.as_deref() else {
                continue;
            };

            let observed = match self.bridge.transfer_status(record.from_chain, tx_hash).await {
                Ok(observed) => observed,
                Err(e) => {
                    warn!(
                        internal_id = %record.internal_id,
                        tx_hash,
                        error = %e,
                        "Transfer poller: bridge status query failed"
                    );
                    continue;
                }
            };

            match self.engine.apply_status_update(
                &record.internal_id,
                observed,
                &StatusMetadata::default(),
            ) {
                Ok(outcome) => {
                    debug!(
                        internal_id = %record.internal_id,
                        observed = observed.as_str(),
                        ?outcome,
                        "Transfer poller: reconciled record"
                    );
                }
                Err(e) => {
                    warn!(
                        internal_id = %record.internal_id,
                        error = %e,
                        "Transfer poller: failed to apply status update"
                    );
                }
            }
        }
    }
}

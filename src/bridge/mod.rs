// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Cross-chain bridge integration.
//!
//! The [`Bridge`] trait is the seam between the transfer flow and the
//! on-chain world: fetching per-token bridge parameters, executing the
//! approve + send sequence, and querying the status of a broadcast
//! transfer. Production uses [`DebridgeGateway`]; tests substitute doubles.
//!
//! ## Concurrency
//!
//! Two concurrent transfers from the same sending address would race on the
//! account's transaction nonce, so broadcasts are serialized per
//! `(chain, sender address)` through [`SenderLocks`]. The lock is held only
//! across the approve + send sequence, never across store or cache access.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::primitives::Address;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::warn;

pub mod debridge;
pub mod quote;
pub mod types;

pub use debridge::DebridgeGateway;
pub use quote::{FeeQuote, ESTIMATED_TRANSFER_TIME};
pub use types::{
    format_amount, parse_amount, stablecoin, stablecoin_address, BridgeTokenParams, BridgeTxStatus,
    Chain, StablecoinInfo, TransferSubmission, UnknownBridgeStatus,
};

/// Errors that can occur during bridge operations.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Invalid RPC URL: {0}")]
    InvalidRpcUrl(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid private key")]
    InvalidPrivateKey,

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Bridge transfers are disabled for {token} on {chain}")]
    Disabled { token: String, chain: Chain },

    #[error("Amount too small. Minimum: {min}")]
    AmountTooSmall { min: String },

    #[error("Amount too large. Maximum: {max}")]
    AmountTooLarge { max: String },

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Contract error: {0}")]
    Contract(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    #[error("Bridge call timed out: {0}")]
    Timeout(&'static str),
}

impl BridgeError {
    /// Whether a retry with backoff could plausibly succeed.
    fn is_retryable(&self) -> bool {
        matches!(self, BridgeError::Rpc(_) | BridgeError::Timeout(_))
    }
}

// =============================================================================
// Bridge Trait
// =============================================================================

/// On-chain actions required to move value cross-chain.
///
/// Implementations must be cheap to share (`Arc`) and safe to call
/// concurrently; per-sender serialization is the caller's responsibility
/// via [`SenderLocks`].
pub trait Bridge: Send + Sync + 'static {
    /// Fetch the gate's registered parameters for a token on the source chain.
    fn token_params(
        &self,
        chain: Chain,
        token: Address,
    ) -> impl Future<Output = Result<BridgeTokenParams, BridgeError>> + Send;

    /// Approve the gate's allowance and invoke the gate's transfer
    /// entrypoint. Returns once the send transaction is broadcast.
    fn send_transfer(
        &self,
        from_chain: Chain,
        to_chain: Chain,
        token: Address,
        amount: alloy::primitives::U256,
        total_debit: alloy::primitives::U256,
        receiver: Address,
        private_key_hex: &str,
    ) -> impl Future<Output = Result<TransferSubmission, BridgeError>> + Send;

    /// Query the current status of a broadcast transfer by its source-chain
    /// transaction hash.
    fn transfer_status(
        &self,
        chain: Chain,
        transaction_hash: &str,
    ) -> impl Future<Output = Result<BridgeTxStatus, BridgeError>> + Send;
}

// =============================================================================
// Retry Policy
// =============================================================================

/// Explicit retry policy for a bridge call site.
///
/// Each attempt runs under `attempt_timeout`; transient failures (RPC,
/// timeout) are retried with exponential backoff, other errors are returned
/// immediately.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            attempt_timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Run `op` under this policy. `op_name` labels timeouts and log lines.
    pub async fn run<T, F, Fut>(&self, op_name: &'static str, op: F) -> Result<T, BridgeError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, BridgeError>>,
    {
        let mut attempt = 1u32;
        loop {
            let result = match tokio::time::timeout(self.attempt_timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(BridgeError::Timeout(op_name)),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.base_delay * 2u32.saturating_pow(attempt - 1);
                    warn!(
                        op = op_name,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "Bridge call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

// =============================================================================
// Per-Sender Broadcast Locks
// =============================================================================

/// Async mutexes keyed by `(chain, sender address)`.
///
/// At most one approve + send sequence per sending account is in flight at
/// a time; a second transfer from the same account waits rather than racing
/// on the nonce.
#[derive(Default)]
pub struct SenderLocks {
    locks: Mutex<HashMap<(Chain, Address), Arc<AsyncMutex<()>>>>,
}

impl SenderLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the broadcast lock for a sending account, waiting if another
    /// broadcast from the same account is in flight.
    pub async fn acquire(&self, chain: Chain, sender: Address) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().expect("sender lock map poisoned");
            Arc::clone(locks.entry((chain, sender)).or_default())
        };
        lock.lock_owned().await
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names and default values used
//! throughout the application. Configuration is loaded from the environment
//! once at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DATA_DIR` | Root directory for the embedded database | `/data` |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `ETHEREUM_RPC_URL` | Ethereum JSON-RPC endpoint | public endpoint |
//! | `POLYGON_RPC_URL` | Polygon JSON-RPC endpoint | public endpoint |
//! | `ARBITRUM_RPC_URL` | Arbitrum JSON-RPC endpoint | public endpoint |
//! | `WEBHOOK_SECRET` | HMAC secret for bridge webhook signatures | Required for production |
//! | `SESSION_SECRET` | HMAC secret for session tokens | Random per process |
//! | `SESSION_KEY_TTL_SECS` | Sliding TTL for cached decrypted keys | `3600` |
//! | `POLL_INTERVAL_SECS` | Seconds between poller sweeps | `30` |
//! | `POLL_BATCH_LIMIT` | Max records reconciled per sweep | `50` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use ring::rand::{SecureRandom, SystemRandom};
use tracing::warn;

use crate::bridge::Chain;

/// Environment variable name for the data directory path.
pub const DATA_DIR_ENV: &str = "DATA_DIR";

/// Environment variable name for the webhook HMAC secret.
pub const WEBHOOK_SECRET_ENV: &str = "WEBHOOK_SECRET";

/// Environment variable name for the session token secret.
pub const SESSION_SECRET_ENV: &str = "SESSION_SECRET";

/// Runtime configuration, loaded from the environment at startup and
/// injected into components (no module-level globals).
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub rpc_urls: HashMap<Chain, String>,
    /// HMAC secret for bridge webhook signature verification. Webhooks are
    /// rejected when unset (unless the `dev` feature is enabled).
    pub webhook_secret: Option<String>,
    /// HMAC secret for session tokens.
    pub session_secret: String,
    /// Sliding TTL for cached decrypted session keys.
    pub session_key_ttl: Duration,
    pub poll_interval: Duration,
    pub poll_batch_limit: usize,
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

impl Config {
    /// Load configuration from the environment, applying defaults.
    pub fn from_env() -> Self {
        let mut rpc_urls = HashMap::new();
        rpc_urls.insert(
            Chain::Ethereum,
            env_or("ETHEREUM_RPC_URL", "https://eth.llamarpc.com"),
        );
        rpc_urls.insert(
            Chain::Polygon,
            env_or("POLYGON_RPC_URL", "https://polygon-rpc.com"),
        );
        rpc_urls.insert(
            Chain::Arbitrum,
            env_or("ARBITRUM_RPC_URL", "https://arb1.arbitrum.io/rpc"),
        );

        let session_secret = match std::env::var(SESSION_SECRET_ENV) {
            Ok(secret) if !secret.is_empty() => secret,
            _ => {
                warn!(
                    "{SESSION_SECRET_ENV} not set; using a random per-process secret \
                     (sessions will not survive a restart)"
                );
                random_secret()
            }
        };

        Self {
            data_dir: PathBuf::from(env_or(DATA_DIR_ENV, "/data")),
            host: env_or("HOST", "0.0.0.0"),
            port: env_or("PORT", "8080").parse().unwrap_or(8080),
            rpc_urls,
            webhook_secret: std::env::var(WEBHOOK_SECRET_ENV).ok().filter(|s| !s.is_empty()),
            session_secret,
            session_key_ttl: Duration::from_secs(
                env_or("SESSION_KEY_TTL_SECS", "3600").parse().unwrap_or(3600),
            ),
            poll_interval: Duration::from_secs(
                env_or("POLL_INTERVAL_SECS", "30").parse().unwrap_or(30),
            ),
            poll_batch_limit: env_or("POLL_BATCH_LIMIT", "50").parse().unwrap_or(50),
        }
    }
}

/// Generate a random hex secret for session signing.
fn random_secret() -> String {
    let mut bytes = [0u8; 32];
    // SystemRandom failure here means the platform RNG is broken; there is
    // no useful fallback for a signing secret.
    SystemRandom::new()
        .fill(&mut bytes)
        .expect("system randomness unavailable");
    alloy::hex::encode(bytes)
}

/// A configuration pointing at unroutable endpoints, for handler tests.
#[cfg(test)]
pub(crate) fn test_config(data_dir: PathBuf) -> Config {
    let mut rpc_urls = HashMap::new();
    for chain in Chain::ALL {
        rpc_urls.insert(chain, "http://localhost:1".to_string());
    }
    Config {
        data_dir,
        host: "127.0.0.1".to_string(),
        port: 0,
        rpc_urls,
        webhook_secret: Some("test-webhook-secret".to_string()),
        session_secret: "test-session-secret".to_string(),
        session_key_ttl: Duration::from_secs(3600),
        poll_interval: Duration::from_secs(30),
        poll_batch_limit: 50,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_secret_is_unique_hex() {
        let a = random_secret();
        let b = random_secret();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
    }

    #[test]
    fn test_config_covers_all_chains() {
        let config = test_config(std::env::temp_dir());
        for chain in Chain::ALL {
            assert!(config.rpc_urls.contains_key(&chain));
        }
    }
}

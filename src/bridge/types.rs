// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Chain, token, and bridge-status vocabulary shared across the service.
//!
//! The supported chain set and the stablecoin registry are closed: requests
//! naming anything outside them are rejected during validation, before any
//! record is created or any RPC call is made.

use std::fmt;
use std::str::FromStr;

use alloy::primitives::{address, Address, U256};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::BridgeError;

// =============================================================================
// Chains
// =============================================================================

/// EVM chain supported for cross-chain transfers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    Ethereum,
    Polygon,
    Arbitrum,
}

impl Chain {
    /// All supported chains, in registry order.
    pub const ALL: [Chain; 3] = [Chain::Ethereum, Chain::Polygon, Chain::Arbitrum];

    /// Numeric chain id as used on-chain and in webhook payloads.
    pub fn id(self) -> u64 {
        match self {
            Chain::Ethereum => 1,
            Chain::Polygon => 137,
            Chain::Arbitrum => 42161,
        }
    }

    /// Lowercase chain name as used in API requests.
    pub fn name(self) -> &'static str {
        match self {
            Chain::Ethereum => "ethereum",
            Chain::Polygon => "polygon",
            Chain::Arbitrum => "arbitrum",
        }
    }

    pub fn from_name(name: &str) -> Option<Chain> {
        match name.to_ascii_lowercase().as_str() {
            "ethereum" => Some(Chain::Ethereum),
            "polygon" => Some(Chain::Polygon),
            "arbitrum" => Some(Chain::Arbitrum),
            _ => None,
        }
    }

    pub fn from_id(id: u64) -> Option<Chain> {
        Chain::ALL.into_iter().find(|c| c.id() == id)
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// DeBridge gate contract address (identical on all supported chains).
pub const DEBRIDGE_GATE: Address = address!("43dE2d77bf8027e25dD1794aD5b6b29a47456b10");

// =============================================================================
// Stablecoin Registry
// =============================================================================

/// Static metadata for a supported stablecoin.
#[derive(Debug, Clone, Copy)]
pub struct StablecoinInfo {
    pub symbol: &'static str,
    pub name: &'static str,
    pub decimals: u8,
}

const USDC: StablecoinInfo = StablecoinInfo {
    symbol: "USDC",
    name: "USD Coin",
    decimals: 6,
};

const USDT: StablecoinInfo = StablecoinInfo {
    symbol: "USDT",
    name: "Tether USD",
    decimals: 6,
};

const DAI: StablecoinInfo = StablecoinInfo {
    symbol: "DAI",
    name: "Dai Stablecoin",
    decimals: 18,
};

/// Look up a supported stablecoin by symbol (case-insensitive).
pub fn stablecoin(symbol: &str) -> Option<&'static StablecoinInfo> {
    match symbol.to_ascii_uppercase().as_str() {
        "USDC" => Some(&USDC),
        "USDT" => Some(&USDT),
        "DAI" => Some(&DAI),
        _ => None,
    }
}

/// Contract address of a supported stablecoin on a given chain.
pub fn stablecoin_address(symbol: &str, chain: Chain) -> Option<Address> {
    let addr = match (symbol.to_ascii_uppercase().as_str(), chain) {
        ("USDC", Chain::Ethereum) => address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"),
        ("USDC", Chain::Polygon) => address!("2791Bca1f2de4661ED88A30C99A7a9449Aa84174"),
        ("USDC", Chain::Arbitrum) => address!("FF970A61A04b1cA14834A43f5dE4533eBDDB5CC8"),
        ("USDT", Chain::Ethereum) => address!("dAC17F958D2ee523a2206206994597C13D831ec7"),
        ("USDT", Chain::Polygon) => address!("c2132D05D31c914a87C6611C10748AEb04B58e8F"),
        ("USDT", Chain::Arbitrum) => address!("Fd086bC7CD5C481DCC9C85ebE478A1C0b69FCbb9"),
        ("DAI", Chain::Ethereum) => address!("6B175474E89094C44Da98b954EedeAC495271d0F"),
        ("DAI", Chain::Polygon) => address!("8f3Cf7ad23Cd3CaDbD9735AFf958023239c6A063"),
        ("DAI", Chain::Arbitrum) => address!("DA10009cBd5D07dd0CeCc66161FC93D7c9000da1"),
        _ => return None,
    };
    Some(addr)
}

// =============================================================================
// Bridge Parameters & Submissions
// =============================================================================

/// Per-token parameters registered with the bridge gate on the source chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeTokenParams {
    /// Smallest transferable amount (token base units).
    pub min_amount: U256,
    /// Largest transferable amount (token base units).
    pub max_amount: U256,
    /// Fee in basis points, applied on top of the transferred amount.
    pub fee_bps: U256,
    /// Whether the gate currently accepts this token.
    pub is_enabled: bool,
}

/// Result of a successful approve + send sequence on the source chain.
#[derive(Debug, Clone)]
pub struct TransferSubmission {
    /// Source-chain transaction hash of the gate `send` call.
    pub transaction_hash: String,
    /// Bridge-assigned transfer identifier (the gate's asset id).
    pub bridge_transfer_id: String,
}

// =============================================================================
// Observed Bridge Status
// =============================================================================

/// Status vocabulary the bridge reports through webhooks and polling.
///
/// Parsing is strict: an unrecognized status string is an error, never a
/// silent default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum BridgeTxStatus {
    Pending,
    Processing,
    Confirmed,
    Completed,
    Failed,
    Reverted,
}

/// Error for an observed status string outside the known vocabulary.
#[derive(Debug, thiserror::Error)]
#[error("unknown bridge status: {0:?}")]
pub struct UnknownBridgeStatus(pub String);

impl FromStr for BridgeTxStatus {
    type Err = UnknownBridgeStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(BridgeTxStatus::Pending),
            "processing" => Ok(BridgeTxStatus::Processing),
            "confirmed" => Ok(BridgeTxStatus::Confirmed),
            "completed" => Ok(BridgeTxStatus::Completed),
            "failed" => Ok(BridgeTxStatus::Failed),
            "reverted" => Ok(BridgeTxStatus::Reverted),
            other => Err(UnknownBridgeStatus(other.to_string())),
        }
    }
}

impl BridgeTxStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BridgeTxStatus::Pending => "pending",
            BridgeTxStatus::Processing => "processing",
            BridgeTxStatus::Confirmed => "confirmed",
            BridgeTxStatus::Completed => "completed",
            BridgeTxStatus::Failed => "failed",
            BridgeTxStatus::Reverted => "reverted",
        }
    }
}

// =============================================================================
// Amount Parsing & Formatting
// =============================================================================

/// Parse a human-readable amount to token base units.
///
/// # Arguments
/// * `amount` - Amount as a string (e.g., "1.5")
/// * `decimals` - Number of decimals (6 for USDC/USDT, 18 for DAI)
pub fn parse_amount(amount: &str, decimals: u8) -> Result<U256, BridgeError> {
    let parts: Vec<&str> = amount.split('.').collect();

    if parts.len() > 2 || parts[0].is_empty() {
        return Err(BridgeError::InvalidAmount(amount.to_string()));
    }

    let whole = parts[0]
        .parse::<u128>()
        .map_err(|_| BridgeError::InvalidAmount(amount.to_string()))?;

    let decimal_part = if parts.len() == 2 {
        let dec_str = parts[1];
        if dec_str.is_empty() || dec_str.len() > decimals as usize {
            return Err(BridgeError::InvalidAmount(format!(
                "{} (max {} decimal places)",
                amount, decimals
            )));
        }
        // Pad with zeros to match decimals
        let padded = format!("{:0<width$}", dec_str, width = decimals as usize);
        padded
            .parse::<u128>()
            .map_err(|_| BridgeError::InvalidAmount(amount.to_string()))?
    } else {
        0u128
    };

    let multiplier = 10u128.pow(decimals as u32);
    let total = whole
        .checked_mul(multiplier)
        .and_then(|w| w.checked_add(decimal_part))
        .ok_or_else(|| BridgeError::InvalidAmount(format!("{} overflows", amount)))?;

    Ok(U256::from(total))
}

/// Format token base units to a human-readable amount.
pub fn format_amount(amount: U256, decimals: u8) -> String {
    if amount.is_zero() {
        return "0".to_string();
    }

    let divisor = U256::from(10u64).pow(U256::from(decimals));
    let whole = amount / divisor;
    let remainder = amount % divisor;

    if remainder.is_zero() {
        whole.to_string()
    } else {
        let decimal_str = format!("{:0>width$}", remainder, width = decimals as usize);
        let trimmed = decimal_str.trim_end_matches('0');
        if trimmed.is_empty() {
            whole.to_string()
        } else {
            format!("{}.{}", whole, trimmed)
        }
    }
}

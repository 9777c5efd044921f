// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Fee and rate quoting against the bridge's registered token parameters.
//!
//! Quoting is a pure function of the fetched [`BridgeTokenParams`] so the
//! same computation backs both the fee-preview endpoint and the actual
//! transfer flow.

use alloy::primitives::U256;

use super::types::{format_amount, BridgeTokenParams};
use super::BridgeError;

/// Advisory transfer duration surfaced to users. Not a guarantee.
pub const ESTIMATED_TRANSFER_TIME: &str = "5-15 minutes";

/// Fee basis-point denominator.
const BPS_DENOMINATOR: u64 = 10_000;

/// A validated fee quote for a cross-chain transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeQuote {
    /// Amount to be bridged (token base units).
    pub amount: U256,
    /// Bridge fee (token base units).
    pub fee: U256,
    /// Total debit from the sender: `amount + fee`.
    pub total_debit: U256,
}

impl FeeQuote {
    /// Fee expressed in USD, assuming a 1:1 stablecoin peg.
    pub fn fee_usd(&self, decimals: u8) -> f64 {
        format_amount(self.fee, decimals).parse().unwrap_or(0.0)
    }
}

/// Quote the fee for transferring `amount` given the bridge's parameters.
///
/// Rejects when the gate is disabled or `amount` falls outside
/// `[min_amount, max_amount]`. Pure: no side effects, deterministic for the
/// same inputs.
pub fn quote(
    params: &BridgeTokenParams,
    amount: U256,
    token_symbol: &str,
    chain: super::Chain,
    decimals: u8,
) -> Result<FeeQuote, BridgeError> {
    if !params.is_enabled {
        return Err(BridgeError::Disabled {
            token: token_symbol.to_string(),
            chain,
        });
    }

    if amount < params.min_amount {
        return Err(BridgeError::AmountTooSmall {
            min: format_amount(params.min_amount, decimals),
        });
    }

    if amount > params.max_amount {
        return Err(BridgeError::AmountTooLarge {
            max: format_amount(params.max_amount, decimals),
        });
    }

    let fee = amount * params.fee_bps / U256::from(BPS_DENOMINATOR);
    let total_debit = amount + fee;

    Ok(FeeQuote {
        amount,
        fee,
        total_debit,
    })
}

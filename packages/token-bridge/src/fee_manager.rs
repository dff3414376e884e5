//! Fee Splitter
//!
//! Transfers carry two flat fees:
//!
//! | Fee           | Asset                 | Withheld by          | Applied to              |
//! |---------------|-----------------------|----------------------|-------------------------|
//! | Primary fee   | sending chain asset   | sending instance     | gross amount, pre-send  |
//! | Secondary fee | receiving chain asset | receiving instance   | scaled amount, on receive |
//!
//! On a multihop path the secondary fee is not withheld by the intermediate
//! instance; it becomes the primary fee of the next hop.
//!
//! Fees are all-or-nothing: a fee that would consume the whole amount is
//! rejected before any state changes.

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

use crate::error::BridgeError;

/// Outcome of deducting a fee from an amount
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSplit {
    /// Amount left after the fee
    pub net: U256,
    /// Fee withheld
    pub fee: U256,
}

/// Deduct the primary fee from the gross amount at send time
pub fn apply_primary_fee(gross: U256, primary_fee: U256) -> Result<FeeSplit, BridgeError> {
    split(gross, primary_fee)
}

/// Deduct the secondary fee from the scaled amount at receive time
pub fn apply_secondary_fee(scaled: U256, secondary_fee: U256) -> Result<FeeSplit, BridgeError> {
    split(scaled, secondary_fee)
}

/// Both fees at once, for callers that know the scaled amount up front.
///
/// Returns the amount left for the recipient and the total fees collected.
pub fn apply_fees(
    gross: U256,
    primary_fee: U256,
    secondary_fee: U256,
) -> Result<(U256, U256), BridgeError> {
    let primary = apply_primary_fee(gross, primary_fee)?;
    let secondary = apply_secondary_fee(primary.net, secondary_fee)?;
    let collected = primary
        .fee
        .checked_add(secondary.fee)
        .ok_or(BridgeError::Overflow)?;
    Ok((secondary.net, collected))
}

fn split(amount: U256, fee: U256) -> Result<FeeSplit, BridgeError> {
    if fee >= amount {
        return Err(BridgeError::InsufficientAmount { amount, fee });
    }
    Ok(FeeSplit {
        net: amount - fee,
        fee,
    })
}

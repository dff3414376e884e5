//! Fixed-point scaling between chains with different token decimals
//!
//! Amounts crossing a pairing are converted with an integer power of ten.
//! Scaling up is exact (and checked for overflow); scaling down truncates and
//! the remainder is lost on the receiving side. Both ends of a pairing hold
//! mutually inverse [`Scaling`] values so a round trip never creates value.

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

use crate::error::BridgeError;

/// Largest supported difference in decimals between two paired assets
pub const MAX_DECIMALS_SHIFT: u8 = 18;

/// How amounts arriving over a pairing are converted into local units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Scaling {
    /// Magnitude of the decimals difference (`|local - remote|`)
    pub decimals_shift: u8,
    /// Multiply by `10^shift` on receive when true, divide when false
    pub multiply_on_receive: bool,
}

/// Result of a scaling that may truncate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scaled {
    pub amount: U256,
    /// Part of the input lost to truncation, in input units
    pub remainder: U256,
}

impl Scaling {
    pub const IDENTITY: Scaling = Scaling {
        decimals_shift: 0,
        multiply_on_receive: false,
    };

    pub fn new(decimals_shift: u8, multiply_on_receive: bool) -> Result<Self, BridgeError> {
        if decimals_shift > MAX_DECIMALS_SHIFT {
            return Err(BridgeError::InvalidConfig {
                reason: format!(
                    "decimals shift {} exceeds max {}",
                    decimals_shift, MAX_DECIMALS_SHIFT
                ),
            });
        }
        // The direction flag is meaningless without a shift
        Ok(Self {
            decimals_shift,
            multiply_on_receive: decimals_shift > 0 && multiply_on_receive,
        })
    }

    /// Scaling for receiving `remote_decimals` amounts into `local_decimals`
    pub fn between(remote_decimals: u8, local_decimals: u8) -> Result<Self, BridgeError> {
        if local_decimals >= remote_decimals {
            Self::new(local_decimals - remote_decimals, true)
        } else {
            Self::new(remote_decimals - local_decimals, false)
        }
    }

    /// Scaling for the opposite direction of the same pairing
    pub fn inverse(&self) -> Self {
        if self.decimals_shift == 0 {
            return Self::IDENTITY;
        }
        Self {
            decimals_shift: self.decimals_shift,
            multiply_on_receive: !self.multiply_on_receive,
        }
    }

    pub fn is_identity(&self) -> bool {
        self.decimals_shift == 0
    }

    /// Whether this scaling can truncate
    pub fn scales_down(&self) -> bool {
        self.decimals_shift > 0 && !self.multiply_on_receive
    }

    pub fn apply(&self, amount: U256) -> Result<U256, BridgeError> {
        scale(amount, self.decimals_shift, self.multiply_on_receive)
    }

    pub fn apply_with_remainder(&self, amount: U256) -> Result<Scaled, BridgeError> {
        scale_with_remainder(amount, self.decimals_shift, self.multiply_on_receive)
    }
}

/// `10^shift`
pub fn pow10(shift: u8) -> Result<U256, BridgeError> {
    U256::from(10u64)
        .checked_pow(U256::from(shift))
        .ok_or(BridgeError::Overflow)
}

/// Convert `amount` by `10^shift`, multiplying or truncating-dividing.
///
/// A nonzero amount that would truncate to zero is rejected with
/// [`BridgeError::PrecisionLoss`].
pub fn scale(amount: U256, shift: u8, multiply: bool) -> Result<U256, BridgeError> {
    scale_with_remainder(amount, shift, multiply).map(|scaled| scaled.amount)
}

/// Like [`scale`], also reporting the truncated remainder
pub fn scale_with_remainder(
    amount: U256,
    shift: u8,
    multiply: bool,
) -> Result<Scaled, BridgeError> {
    if shift == 0 {
        return Ok(Scaled {
            amount,
            remainder: U256::ZERO,
        });
    }

    let factor = pow10(shift)?;
    if multiply {
        let scaled = amount.checked_mul(factor).ok_or(BridgeError::Overflow)?;
        return Ok(Scaled {
            amount: scaled,
            remainder: U256::ZERO,
        });
    }

    let scaled = amount / factor;
    if scaled.is_zero() && !amount.is_zero() {
        return Err(BridgeError::PrecisionLoss { amount, shift });
    }
    Ok(Scaled {
        amount: scaled,
        remainder: amount % factor,
    })
}

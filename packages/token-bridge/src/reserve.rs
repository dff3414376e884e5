//! Reserve Ledger (Destination role only)
//!
//! A destination chain may already carry supply of the bridged asset before
//! any transfer arrives (for example a native token allocated at genesis).
//! That supply is recorded as an initial imbalance; inbound value first pays
//! it down and only the excess is minted to recipients. Once the imbalance
//! reaches zero it never changes again.

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

/// Reserve imbalance tracking for one destination instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveState {
    initial_imbalance: U256,
    imbalance_remaining: U256,
}

/// Split of an inbound amount between the reserve and the recipient
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveOutcome {
    pub minted: U256,
    pub consumed: U256,
}

impl ReserveState {
    pub fn new(initial_imbalance: U256) -> Self {
        Self {
            initial_imbalance,
            imbalance_remaining: initial_imbalance,
        }
    }

    pub fn initial_imbalance(&self) -> U256 {
        self.initial_imbalance
    }

    pub fn imbalance_remaining(&self) -> U256 {
        self.imbalance_remaining
    }

    pub fn is_collateralized(&self) -> bool {
        self.imbalance_remaining.is_zero()
    }

    /// What `consume` would return, without mutating
    pub fn preview(&self, incoming: U256) -> ReserveOutcome {
        let consumed = incoming.min(self.imbalance_remaining);
        ReserveOutcome {
            minted: incoming - consumed,
            consumed,
        }
    }

    /// Pay down the imbalance with `incoming`, returning what is left to mint
    pub fn consume(&mut self, incoming: U256) -> ReserveOutcome {
        let outcome = self.preview(incoming);
        self.imbalance_remaining -= outcome.consumed;
        outcome
    }
}

//! Custody hooks per instance role
//!
//! A source instance locks sent value in its escrow account and releases it
//! on receive. A destination instance burns on send and mints on receive.
//! Both strategies act on the instance's own [`Ledger`]; the escrow account
//! is the instance contract address.

use alloy_primitives::{Address, U256};

use crate::error::BridgeError;
use crate::ledger::Ledger;
use crate::types::Role;

pub trait Custody {
    fn name(&self) -> &'static str;

    /// Take `amount` from `sender` for an outbound transfer
    fn take_outbound(
        &self,
        ledger: &mut Ledger,
        escrow: Address,
        sender: Address,
        amount: U256,
    ) -> Result<(), BridgeError>;

    /// Pay `amount` of inbound value to `recipient`
    fn release_inbound(
        &self,
        ledger: &mut Ledger,
        escrow: Address,
        recipient: Address,
        amount: U256,
    ) -> Result<(), BridgeError>;

    /// Fail unless `amount` could be released right now
    fn ensure_releasable(
        &self,
        ledger: &Ledger,
        escrow: Address,
        amount: U256,
    ) -> Result<(), BridgeError>;
}

/// Lock on send, release on receive
#[derive(Debug, Clone, Copy, Default)]
pub struct LockRelease;

/// Burn on send, mint on receive
#[derive(Debug, Clone, Copy, Default)]
pub struct BurnMint;

impl Custody for LockRelease {
    fn name(&self) -> &'static str {
        "lock_release"
    }

    fn take_outbound(
        &self,
        ledger: &mut Ledger,
        escrow: Address,
        sender: Address,
        amount: U256,
    ) -> Result<(), BridgeError> {
        ledger.transfer(sender, escrow, amount)
    }

    fn release_inbound(
        &self,
        ledger: &mut Ledger,
        escrow: Address,
        recipient: Address,
        amount: U256,
    ) -> Result<(), BridgeError> {
        ledger.transfer(escrow, recipient, amount)
    }

    fn ensure_releasable(
        &self,
        ledger: &Ledger,
        escrow: Address,
        amount: U256,
    ) -> Result<(), BridgeError> {
        ledger.ensure_balance(&escrow, amount)
    }
}

impl Custody for BurnMint {
    fn name(&self) -> &'static str {
        "burn_mint"
    }

    fn take_outbound(
        &self,
        ledger: &mut Ledger,
        _escrow: Address,
        sender: Address,
        amount: U256,
    ) -> Result<(), BridgeError> {
        ledger.burn(sender, amount)
    }

    fn release_inbound(
        &self,
        ledger: &mut Ledger,
        _escrow: Address,
        recipient: Address,
        amount: U256,
    ) -> Result<(), BridgeError> {
        ledger.mint(recipient, amount)
    }

    fn ensure_releasable(
        &self,
        ledger: &Ledger,
        _escrow: Address,
        amount: U256,
    ) -> Result<(), BridgeError> {
        ledger
            .total_supply()
            .checked_add(amount)
            .map(|_| ())
            .ok_or(BridgeError::Overflow)
    }
}

impl Role {
    /// Custody strategy for this role
    pub fn custody(&self) -> &'static dyn Custody {
        match self {
            Role::Source => &LockRelease,
            Role::Destination => &BurnMint,
        }
    }
}

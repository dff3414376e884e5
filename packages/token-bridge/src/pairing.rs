//! Pairing registry entries
//!
//! A pairing links a local instance to one bridge contract on another chain.
//! It fixes the remote contract address (registered once), the scaling for
//! amounts arriving over it, and how much value this instance has sent across
//! it that has not come back.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::error::BridgeError;
use crate::scaler::{Scaled, Scaling};
use crate::types::ChainId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pairing {
    pub chain_id: ChainId,
    /// Remote contract, `None` until registered
    pub contract: Option<Address>,
    /// Applied to amounts received from the remote
    pub scaling: Scaling,
    /// Inbound value over a backing pairing is new supply, not returning value
    pub backing: bool,
    /// Value sent to the remote and not yet received back, in local units
    pub outstanding: U256,
}

/// What a counterparty needs to register a pairing with an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingRegistration {
    pub chain_id: ChainId,
    pub contract: Address,
    /// Scaling the counterparty applies when receiving from the registering instance
    pub scaling: Scaling,
}

impl Pairing {
    /// Home pairing of a destination, awaiting the source contract address
    pub fn home(chain_id: ChainId, scaling: Scaling) -> Self {
        Self {
            chain_id,
            contract: None,
            scaling,
            backing: true,
            outstanding: U256::ZERO,
        }
    }

    pub fn registered(chain_id: ChainId, contract: Address, scaling: Scaling) -> Self {
        Self {
            chain_id,
            contract: Some(contract),
            scaling,
            backing: false,
            outstanding: U256::ZERO,
        }
    }

    pub fn is_registered(&self) -> bool {
        self.contract.is_some()
    }

    /// Registered remote contract
    pub fn remote_contract(&self) -> Result<Address, BridgeError> {
        self.contract.ok_or(BridgeError::UnknownPairing {
            chain_id: self.chain_id,
        })
    }

    /// Whether `contract` on this pairing's chain is the registered counterpart
    pub fn accepts(&self, contract: &Address) -> bool {
        self.contract.as_ref() == Some(contract)
    }

    /// Scaling the remote applies to amounts this instance sends
    pub fn remote_scaling(&self) -> Scaling {
        self.scaling.inverse()
    }

    /// What `local` amounts to once received by the remote
    pub fn to_remote(&self, local: U256) -> Result<U256, BridgeError> {
        self.remote_scaling().apply(local)
    }

    /// Convert an inbound amount into local units
    pub fn to_local(&self, remote: U256) -> Result<Scaled, BridgeError> {
        self.scaling.apply_with_remainder(remote)
    }

    /// Fail unless `amount` of returning value is covered by what was sent out
    pub fn ensure_outstanding(&self, amount: U256) -> Result<(), BridgeError> {
        if !self.backing && self.outstanding < amount {
            return Err(BridgeError::InsufficientEscrow {
                chain_id: self.chain_id,
                outstanding: self.outstanding,
                requested: amount,
            });
        }
        Ok(())
    }

    pub(crate) fn record_outbound(&mut self, amount: U256) -> Result<(), BridgeError> {
        if self.backing {
            return Ok(());
        }
        self.outstanding = self
            .outstanding
            .checked_add(amount)
            .ok_or(BridgeError::Overflow)?;
        Ok(())
    }

    pub(crate) fn record_inbound(&mut self, amount: U256) -> Result<(), BridgeError> {
        if self.backing {
            return Ok(());
        }
        self.ensure_outstanding(amount)?;
        self.outstanding -= amount;
        Ok(())
    }
}

//! Multihop Router
//!
//! Picks the next hop for an outbound transfer and guards inbound messages
//! against cycles. A transfer whose final chain has no direct pairing is sent
//! to the destination's home chain, which then forwards it.

use std::collections::BTreeMap;

use alloy_primitives::{Address, U256};

use crate::error::BridgeError;
use crate::message::{TransferIntent, TransferPayload};
use crate::pairing::Pairing;
use crate::types::ChainId;

/// Next hop for an outbound transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub next_chain: ChainId,
    pub next_contract: Address,
    /// The next hop is not the final chain
    pub multihop: bool,
}

/// Choose how to reach `final_chain` from `own_chain`
///
/// Direct pairings win. Otherwise the transfer goes through `home`, the
/// chain backing this instance, if one is registered.
pub fn select_route(
    own_chain: ChainId,
    pairings: &BTreeMap<ChainId, Pairing>,
    home: Option<ChainId>,
    final_chain: ChainId,
    final_contract: Address,
) -> Result<Route, BridgeError> {
    if final_chain == own_chain {
        return Err(BridgeError::InvalidPairing {
            reason: format!("cannot send to own chain {}", own_chain),
        });
    }

    if let Some(pairing) = pairings.get(&final_chain).filter(|p| p.is_registered()) {
        let expected = pairing.remote_contract()?;
        if expected != final_contract {
            return Err(BridgeError::InvalidDestinationContract {
                expected,
                got: final_contract,
            });
        }
        return Ok(Route {
            next_chain: final_chain,
            next_contract: expected,
            multihop: false,
        });
    }

    let hub = home
        .and_then(|chain| pairings.get(&chain))
        .filter(|p| p.is_registered())
        .ok_or(BridgeError::UnknownPairing {
            chain_id: final_chain,
        })?;

    Ok(Route {
        next_chain: hub.chain_id,
        next_contract: hub.remote_contract()?,
        multihop: true,
    })
}

/// Fail if `chain` already appears on the path
pub fn ensure_not_visited(hops: &[ChainId], chain: ChainId) -> Result<(), BridgeError> {
    if hops.contains(&chain) {
        return Err(BridgeError::RoutingCycle { chain_id: chain });
    }
    Ok(())
}

/// Whether a payload has reached the chain that pays the recipient
pub fn is_final_hop(payload: &TransferPayload, own_chain: ChainId) -> bool {
    payload.final_chain == own_chain
}

/// The onward leg of a transfer arriving at an intermediate hop
///
/// The secondary fee becomes this hop's primary fee, paid in the local asset,
/// and the second leg's gas budget becomes the required gas.
pub fn forward_intent(payload: &TransferPayload, scaled: U256, fee_asset: Address) -> TransferIntent {
    TransferIntent {
        destination_chain_id: payload.final_chain,
        destination_contract: payload.final_contract,
        recipient: payload.recipient,
        primary_fee_asset: fee_asset,
        primary_fee: payload.secondary_fee,
        secondary_fee: U256::ZERO,
        required_gas_limit: payload.secondary_gas_limit,
        secondary_gas_limit: 0,
        amount: scaled,
    }
}

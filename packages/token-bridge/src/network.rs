//! In-memory multi-chain network
//!
//! Holds one [`BridgeInstance`] per chain and a [`MemoryRelay`] between them.
//! Deliveries are driven explicitly with [`LocalNetwork::relay_next`] and
//! [`LocalNetwork::relay_all`], so tests can interleave, delay, drop and
//! repeat messages.

use std::collections::BTreeMap;

use alloy_primitives::{Address, U256};
use tracing::debug;

use crate::config::InstanceConfig;
use crate::error::BridgeError;
use crate::instance::BridgeInstance;
use crate::message::{BridgeMessage, Delivery, SendReceipt, TransferIntent};
use crate::relay::MemoryRelay;
use crate::scaler::Scaling;
use crate::types::{ChainId, MessageId};
use crate::verifier::TransferTrace;

#[derive(Debug, Default)]
pub struct LocalNetwork {
    instances: BTreeMap<ChainId, BridgeInstance>,
    relay: MemoryRelay,
}

impl LocalNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deploy an instance with genesis balances
    pub fn deploy<I>(&mut self, config: InstanceConfig, genesis: I) -> Result<ChainId, BridgeError>
    where
        I: IntoIterator<Item = (Address, U256)>,
    {
        let chain_id = config.chain_id;
        if self.instances.contains_key(&chain_id) {
            return Err(BridgeError::InvalidConfig {
                reason: format!("chain {} already has an instance", chain_id),
            });
        }
        let instance = BridgeInstance::new(config, genesis)?;
        self.instances.insert(chain_id, instance);
        Ok(chain_id)
    }

    /// Pair a destination with its home instance, both ways
    pub fn connect(&mut self, destination: ChainId) -> Result<(), BridgeError> {
        let dest = self.get(&destination)?;
        let registration = dest.registration()?;
        let home_chain = dest
            .home_chain()
            .ok_or(BridgeError::UnknownPairing { chain_id: destination })?;
        let home_scaling = registration.scaling.inverse();

        let home_contract = self.get(&home_chain)?.contract();
        self.get_mut(&home_chain)?.register_pairing(
            registration.chain_id,
            registration.contract,
            registration.scaling,
        )?;
        self.get_mut(&destination)?
            .register_pairing(home_chain, home_contract, home_scaling)
    }

    /// Pair two instances directly; `scaling` applies on arrival at `b`
    pub fn pair(&mut self, a: ChainId, b: ChainId, scaling: Scaling) -> Result<(), BridgeError> {
        let a_contract = self.get(&a)?.contract();
        let b_contract = self.get(&b)?.contract();
        self.get_mut(&a)?
            .register_pairing(b, b_contract, scaling.inverse())?;
        self.get_mut(&b)?.register_pairing(a, a_contract, scaling)
    }

    pub fn instance(&self, chain_id: &ChainId) -> Option<&BridgeInstance> {
        self.instances.get(chain_id)
    }

    pub fn instance_mut(&mut self, chain_id: &ChainId) -> Option<&mut BridgeInstance> {
        self.instances.get_mut(chain_id)
    }

    pub fn relay(&self) -> &MemoryRelay {
        &self.relay
    }

    pub fn relay_mut(&mut self) -> &mut MemoryRelay {
        &mut self.relay
    }

    pub fn send(
        &mut self,
        chain_id: ChainId,
        sender: Address,
        intent: TransferIntent,
    ) -> Result<SendReceipt, BridgeError> {
        let instance = self
            .instances
            .get_mut(&chain_id)
            .ok_or(BridgeError::UnknownPairing { chain_id })?;
        instance.send(sender, intent, &mut self.relay)
    }

    /// Deliver the oldest queued message; `None` when the queue is empty
    pub fn relay_next(&mut self) -> Result<Option<Delivery>, BridgeError> {
        let message = match self.relay.pop() {
            Some(message) => message,
            None => return Ok(None),
        };
        debug!(
            message_id = %message.message_id,
            from = %message.source_chain,
            to = %message.destination_chain,
            "Relaying message"
        );
        self.deliver(&message).map(Some)
    }

    /// Deliver until the queue is empty, including forwarded legs
    pub fn relay_all(&mut self) -> Result<Vec<Delivery>, BridgeError> {
        let mut deliveries = Vec::new();
        while let Some(delivery) = self.relay_next()? {
            deliveries.push(delivery);
        }
        Ok(deliveries)
    }

    /// Deliver an already relayed message again
    pub fn redeliver(&mut self, message_id: &MessageId) -> Result<Delivery, BridgeError> {
        let message = self
            .relay
            .find(message_id)
            .cloned()
            .ok_or(BridgeError::TransferNotFound {
                message_id: *message_id,
            })?;
        self.deliver(&message)
    }

    /// Re-emit every held message on `chain_id`, returning how many went out
    pub fn retry_pending(&mut self, chain_id: ChainId) -> Result<usize, BridgeError> {
        let instance = self
            .instances
            .get_mut(&chain_id)
            .ok_or(BridgeError::UnknownPairing { chain_id })?;
        let pending = instance.pending_emission();
        for message_id in &pending {
            instance.retry_emit(message_id, &mut self.relay)?;
        }
        Ok(pending.len())
    }

    /// Re-emit every unconfirmed send on `chain_id`, emitted or not
    pub fn resume(&mut self, chain_id: ChainId) -> Result<usize, BridgeError> {
        let instance = self
            .instances
            .get_mut(&chain_id)
            .ok_or(BridgeError::UnknownPairing { chain_id })?;
        let unconfirmed = instance.unconfirmed();
        for message_id in &unconfirmed {
            instance.reemit(message_id, &mut self.relay)?;
        }
        Ok(unconfirmed.len())
    }

    fn deliver(&mut self, message: &BridgeMessage) -> Result<Delivery, BridgeError> {
        let instance = self
            .instances
            .get_mut(&message.destination_chain)
            .ok_or(BridgeError::UnknownPairing {
                chain_id: message.destination_chain,
            })?;
        let delivery = instance.deliver(message, &mut self.relay)?;

        // A repeat carries the first outcome, which closes a send whose
        // confirmation never arrived
        if let Some(sender) = self.instances.get_mut(&message.source_chain) {
            sender.confirm_delivery(delivery.receipt())?;
        }
        debug!(message_id = %message.message_id, duplicate = delivery.is_duplicate(), "Delivered");
        Ok(delivery)
    }

    /// Follow a transfer through every chain it touched
    pub fn trace(&self, origin: &SendReceipt) -> eyre::Result<TransferTrace> {
        TransferTrace::follow(origin, |chain, id| {
            self.instances
                .get(chain)
                .and_then(|instance| instance.inbound(id))
                .cloned()
        })
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn get_reserve_remaining(&self, chain_id: &ChainId) -> Result<U256, BridgeError> {
        Ok(self.get(chain_id)?.reserve_remaining())
    }

    /// Balance of `account` on `chain_id`; zero for unknown chains
    pub fn get_balance(&self, chain_id: &ChainId, account: &Address) -> U256 {
        self.instances
            .get(chain_id)
            .map(|instance| instance.balance_of(account))
            .unwrap_or(U256::ZERO)
    }

    pub fn is_processed(&self, chain_id: &ChainId, message_id: &MessageId) -> bool {
        self.instances
            .get(chain_id)
            .map_or(false, |instance| instance.is_processed(message_id))
    }

    pub fn chains(&self) -> impl Iterator<Item = &ChainId> {
        self.instances.keys()
    }

    fn get(&self, chain_id: &ChainId) -> Result<&BridgeInstance, BridgeError> {
        self.instances
            .get(chain_id)
            .ok_or(BridgeError::UnknownPairing {
                chain_id: *chain_id,
            })
    }

    fn get_mut(&mut self, chain_id: &ChainId) -> Result<&mut BridgeInstance, BridgeError> {
        self.instances
            .get_mut(chain_id)
            .ok_or(BridgeError::UnknownPairing {
                chain_id: *chain_id,
            })
    }
}

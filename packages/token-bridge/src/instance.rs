//! Transfer State Machine
//!
//! A [`BridgeInstance`] is one bridge deployment on one chain. It owns the
//! chain's ledger of the bridged asset, its pairings, the reserve state (for
//! destinations) and the records of every transfer it has sent or received.
//!
//! Sending validates everything first, then commits fees and custody in one
//! step and finally hands the message to the relay:
//!
//! ```text
//! send:    validate -> Created -> FeesEscrowed -> (relay.emit) -> MessageEmitted
//! deliver: scale -> reserve -> secondary fee -> release        -> Settled
//!                                                  \-> forward -> Settled (+ onward send)
//!          any rejection                                       -> Failed (nothing moved)
//! ```
//!
//! Inbound receipts are keyed by message ID, so a redelivered message is
//! answered from the record without touching balances.

use std::collections::BTreeMap;

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::InstanceConfig;
use crate::error::BridgeError;
use crate::fee_manager::{apply_primary_fee, apply_secondary_fee, FeeSplit};
use crate::hash::compute_message_id;
use crate::ledger::Ledger;
use crate::message::{
    BridgeEvent, BridgeMessage, Delivery, DeliveryReceipt, FailedTransfer, Failure,
    OutboundTransfer, SendReceipt, TransferIntent, TransferPayload,
};
use crate::pairing::{Pairing, PairingRegistration};
use crate::relay::Relay;
use crate::reserve::{ReserveOutcome, ReserveState};
use crate::router::{self, Route};
use crate::scaler::{Scaled, Scaling};
use crate::types::{ChainId, MessageId, Role, TransferState};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeInstance {
    config: InstanceConfig,
    ledger: Ledger,
    reserve: Option<ReserveState>,
    pairings: BTreeMap<ChainId, Pairing>,
    nonce: u64,
    outbound: BTreeMap<MessageId, OutboundTransfer>,
    inbound: BTreeMap<MessageId, DeliveryReceipt>,
    events: Vec<BridgeEvent>,
}

/// Who pays for an outbound transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Funding {
    /// A user balance on this chain
    Sender(Address),
    /// Value that just arrived and is routed onward
    Inbound,
}

#[derive(Debug, Clone)]
struct PreparedSend {
    funding: Funding,
    route: Route,
    split: FeeSplit,
    outstanding_after: Option<U256>,
    message: BridgeMessage,
    receipt: SendReceipt,
}

#[derive(Debug, Clone)]
enum DeliveryPlan {
    Settle {
        scaled: Scaled,
        reserve: ReserveOutcome,
        fee: U256,
        released: U256,
    },
    Forward {
        scaled: Scaled,
        prepared: Box<PreparedSend>,
    },
}

impl BridgeInstance {
    /// Deploy an instance with pre-existing balances on its chain
    pub fn new<I>(config: InstanceConfig, genesis: I) -> Result<Self, BridgeError>
    where
        I: IntoIterator<Item = (Address, U256)>,
    {
        config.validate()?;

        let ledger = Ledger::with_genesis(config.chain_id, genesis)?;
        let mut pairings = BTreeMap::new();
        let reserve = match config.role {
            Role::Source => None,
            Role::Destination => Some(ReserveState::new(config.initial_reserve_imbalance)),
        };
        if let Some(home) = &config.home {
            pairings.insert(home.chain_id, Pairing::home(home.chain_id, home.scaling()?));
        }

        info!(
            chain_id = %config.chain_id,
            contract = %config.contract,
            role = %config.role,
            symbol = %config.asset.symbol,
            "Bridge instance deployed"
        );

        Ok(Self {
            config,
            ledger,
            reserve,
            pairings,
            nonce: 0,
            outbound: BTreeMap::new(),
            inbound: BTreeMap::new(),
            events: Vec::new(),
        })
    }

    // ========================================================================
    // Pairing
    // ========================================================================

    /// Register the bridge contract on `chain_id`
    ///
    /// `scaling` applies to amounts received from that contract. A pairing can
    /// only be registered once, and never after this instance has sent or
    /// received a transfer. A destination only pairs with its home chain, and
    /// the scaling must match the deployed one.
    pub fn register_pairing(
        &mut self,
        chain_id: ChainId,
        contract: Address,
        scaling: Scaling,
    ) -> Result<(), BridgeError> {
        if self.has_activity() {
            return Err(BridgeError::AlreadyPaired { chain_id });
        }
        if chain_id == self.chain_id() || chain_id.is_zero() {
            return Err(BridgeError::InvalidPairing {
                reason: format!("cannot pair chain {} with chain {}", self.chain_id(), chain_id),
            });
        }
        if contract == Address::ZERO {
            return Err(BridgeError::InvalidPairing {
                reason: "remote contract cannot be zero".to_string(),
            });
        }
        let scaling = Scaling::new(scaling.decimals_shift, scaling.multiply_on_receive)?;
        let own_chain = self.chain_id();
        let is_destination = self.role() == Role::Destination;

        match self.pairings.get_mut(&chain_id) {
            Some(pairing) if pairing.is_registered() => {
                return Err(BridgeError::AlreadyPaired { chain_id });
            }
            Some(pairing) => {
                if pairing.scaling != scaling {
                    return Err(BridgeError::ScalingMismatch {
                        deployed: pairing.scaling,
                        registered: scaling,
                    });
                }
                pairing.contract = Some(contract);
            }
            // Nothing on a destination backs value arriving from a sibling
            None if is_destination => {
                return Err(BridgeError::InvalidPairing {
                    reason: format!(
                        "destination chain {} can only pair with its home chain",
                        own_chain
                    ),
                });
            }
            None => {
                self.pairings
                    .insert(chain_id, Pairing::registered(chain_id, contract, scaling));
            }
        }

        info!(
            chain_id = %self.chain_id(),
            remote_chain = %chain_id,
            remote_contract = %contract,
            decimals_shift = scaling.decimals_shift,
            multiply_on_receive = scaling.multiply_on_receive,
            "Pairing registered"
        );
        self.events
            .push(BridgeEvent::PairingRegistered { chain_id, contract });
        Ok(())
    }

    /// What this destination's home instance registers to pair with it
    pub fn registration(&self) -> Result<PairingRegistration, BridgeError> {
        let home = self.config.home.ok_or_else(|| BridgeError::InvalidPairing {
            reason: format!("chain {} has no home chain", self.chain_id()),
        })?;
        Ok(PairingRegistration {
            chain_id: self.chain_id(),
            contract: self.contract(),
            scaling: home.scaling()?.inverse(),
        })
    }

    // ========================================================================
    // Send
    // ========================================================================

    /// Send `intent.amount` of `sender`'s balance across the bridge
    ///
    /// Every check runs before any balance moves; a rejected send leaves the
    /// instance untouched. If the relay refuses the message the transfer stays
    /// escrowed in [`TransferState::FeesEscrowed`] for [`Self::retry_emit`].
    pub fn send(
        &mut self,
        sender: Address,
        intent: TransferIntent,
        relay: &mut dyn Relay,
    ) -> Result<SendReceipt, BridgeError> {
        let prepared = self.prepare_send(
            Funding::Sender(sender),
            &intent,
            self.chain_id(),
            sender,
            Vec::new(),
        )?;
        let receipt = self.commit_send(prepared)?;

        if let Err(err) = self.emit_outbound(&receipt.message_id, relay) {
            warn!(
                message_id = %receipt.message_id,
                error = %err,
                "Relay refused message, transfer held for retry"
            );
        }
        Ok(receipt)
    }

    /// Hand a held message to the relay again
    pub fn retry_emit(
        &mut self,
        message_id: &MessageId,
        relay: &mut dyn Relay,
    ) -> Result<(), BridgeError> {
        let record = self
            .outbound
            .get(message_id)
            .ok_or(BridgeError::TransferNotFound {
                message_id: *message_id,
            })?;
        if record.state != TransferState::FeesEscrowed {
            return Err(BridgeError::InvalidTransition {
                from: record.state,
                to: TransferState::MessageEmitted,
            });
        }
        self.emit_outbound(message_id, relay)
    }

    /// Hand an unconfirmed send to the relay again
    ///
    /// A message already emitted may have been lost with the relay's queue,
    /// e.g. across a restart from a snapshot. The receiver answers a repeat
    /// from its record, so emitting again never moves value twice.
    pub fn reemit(
        &mut self,
        message_id: &MessageId,
        relay: &mut dyn Relay,
    ) -> Result<(), BridgeError> {
        let record = self
            .outbound
            .get(message_id)
            .ok_or(BridgeError::TransferNotFound {
                message_id: *message_id,
            })?;
        match record.state {
            TransferState::FeesEscrowed => self.emit_outbound(message_id, relay),
            TransferState::MessageEmitted => {
                relay.emit(&record.message)?;
                debug!(
                    message_id = %message_id,
                    destination_chain = %record.message.destination_chain,
                    "Message re-emitted"
                );
                Ok(())
            }
            state => Err(BridgeError::InvalidTransition {
                from: state,
                to: TransferState::MessageEmitted,
            }),
        }
    }

    fn prepare_send(
        &self,
        funding: Funding,
        intent: &TransferIntent,
        origin_chain: ChainId,
        origin_sender: Address,
        mut hops: Vec<ChainId>,
    ) -> Result<PreparedSend, BridgeError> {
        if intent.recipient == Address::ZERO {
            return Err(BridgeError::InvalidRecipient);
        }
        if intent.required_gas_limit == 0 {
            return Err(BridgeError::InvalidGasLimit);
        }
        if !intent.primary_fee.is_zero() && intent.primary_fee_asset != self.config.asset.token {
            return Err(BridgeError::UnsupportedFeeAsset {
                asset: intent.primary_fee_asset,
            });
        }

        let route = router::select_route(
            self.chain_id(),
            &self.pairings,
            self.home_chain(),
            intent.destination_chain_id,
            intent.destination_contract,
        )?;
        if route.multihop && intent.secondary_gas_limit == 0 {
            return Err(BridgeError::InvalidGasLimit);
        }
        hops.push(self.chain_id());
        router::ensure_not_visited(&hops, route.next_chain)?;

        let split = apply_primary_fee(intent.amount, intent.primary_fee)?;
        match funding {
            Funding::Sender(sender) => {
                if let Some(reserve) = &self.reserve {
                    if !reserve.is_collateralized() {
                        return Err(BridgeError::Undercollateralized {
                            remaining: reserve.imbalance_remaining(),
                        });
                    }
                }
                self.ledger.ensure_balance(&sender, intent.amount)?;
            }
            Funding::Inbound => {
                self.custody()
                    .ensure_releasable(&self.ledger, self.contract(), split.fee)?;
            }
        }

        let pairing = self
            .pairings
            .get(&route.next_chain)
            .ok_or(BridgeError::UnknownPairing {
                chain_id: route.next_chain,
            })?;
        let remote_amount = pairing.to_remote(split.net)?;
        apply_secondary_fee(remote_amount, intent.secondary_fee)?;
        let outstanding_after = if pairing.backing {
            None
        } else {
            Some(
                pairing
                    .outstanding
                    .checked_add(split.net)
                    .ok_or(BridgeError::Overflow)?,
            )
        };

        let message_id =
            compute_message_id(&self.chain_id(), &self.contract(), &route.next_chain, self.nonce);
        let sender = match funding {
            Funding::Sender(sender) => sender,
            Funding::Inbound => self.contract(),
        };

        let message = BridgeMessage {
            message_id,
            source_chain: self.chain_id(),
            source_contract: self.contract(),
            destination_chain: route.next_chain,
            destination_contract: route.next_contract,
            required_gas_limit: intent.required_gas_limit,
            payload: TransferPayload {
                origin_chain,
                origin_sender,
                final_chain: intent.destination_chain_id,
                final_contract: intent.destination_contract,
                recipient: intent.recipient,
                amount: split.net,
                secondary_fee: intent.secondary_fee,
                secondary_gas_limit: intent.secondary_gas_limit,
                hops,
            },
        };
        let receipt = SendReceipt {
            message_id,
            source_chain: self.chain_id(),
            destination_chain: route.next_chain,
            final_chain: intent.destination_chain_id,
            sender,
            gross: intent.amount,
            primary_fee: split.fee,
            net: split.net,
            remote_scaling: pairing.remote_scaling(),
            multihop: route.multihop,
            forwarded: funding == Funding::Inbound,
        };

        Ok(PreparedSend {
            funding,
            route,
            split,
            outstanding_after,
            message,
            receipt,
        })
    }

    fn commit_send(&mut self, prepared: PreparedSend) -> Result<SendReceipt, BridgeError> {
        let custody = self.custody();
        let contract = self.contract();
        let fee_collector = self.config.fee_collector;

        match prepared.funding {
            Funding::Sender(sender) => {
                self.ledger
                    .transfer(sender, fee_collector, prepared.split.fee)?;
                custody.take_outbound(&mut self.ledger, contract, sender, prepared.split.net)?;
            }
            Funding::Inbound => {
                custody.release_inbound(
                    &mut self.ledger,
                    contract,
                    fee_collector,
                    prepared.split.fee,
                )?;
            }
        }
        if let (Some(outstanding), Some(pairing)) = (
            prepared.outstanding_after,
            self.pairings.get_mut(&prepared.route.next_chain),
        ) {
            pairing.outstanding = outstanding;
        }
        self.nonce += 1;

        let receipt = prepared.receipt;
        let mut state = TransferState::Created;
        advance(&mut state, TransferState::FeesEscrowed)?;

        info!(
            message_id = %receipt.message_id,
            next_chain = %receipt.destination_chain,
            final_chain = %receipt.final_chain,
            gross = %receipt.gross,
            fee = %receipt.primary_fee,
            net = %receipt.net,
            multihop = receipt.multihop,
            "Tokens sent"
        );
        self.events.push(BridgeEvent::TokensSent {
            message_id: receipt.message_id,
            destination_chain: receipt.destination_chain,
            recipient: prepared.message.payload.recipient,
            amount: receipt.net,
            primary_fee: receipt.primary_fee,
        });
        self.outbound.insert(
            receipt.message_id,
            OutboundTransfer {
                receipt: receipt.clone(),
                message: prepared.message,
                state,
                failure: None,
            },
        );
        Ok(receipt)
    }

    fn emit_outbound(
        &mut self,
        message_id: &MessageId,
        relay: &mut dyn Relay,
    ) -> Result<(), BridgeError> {
        let record = self
            .outbound
            .get_mut(message_id)
            .ok_or(BridgeError::TransferNotFound {
                message_id: *message_id,
            })?;
        relay.emit(&record.message)?;
        advance(&mut record.state, TransferState::MessageEmitted)?;
        debug!(
            message_id = %message_id,
            destination_chain = %record.message.destination_chain,
            gas_limit = record.message.required_gas_limit,
            "Message emitted"
        );
        Ok(())
    }

    // ========================================================================
    // Delivery
    // ========================================================================

    /// Process a message delivered by the relay
    ///
    /// Only a message addressed to another instance is an error. Every other
    /// outcome, including a rejection, is recorded under the message ID and
    /// returned as a receipt; later deliveries of the same ID return that
    /// receipt as [`Delivery::Duplicate`].
    pub fn deliver(
        &mut self,
        message: &BridgeMessage,
        relay: &mut dyn Relay,
    ) -> Result<Delivery, BridgeError> {
        if message.destination_chain != self.chain_id()
            || message.destination_contract != self.contract()
        {
            return Err(BridgeError::WrongDestination {
                expected: self.contract(),
                got: message.destination_contract,
            });
        }

        if let Some(prior) = self.inbound.get(&message.message_id) {
            debug!(
                message_id = %message.message_id,
                state = %prior.state,
                "Duplicate delivery ignored"
            );
            return Ok(Delivery::Duplicate(prior.clone()));
        }

        let receipt = match self.plan_delivery(message) {
            Ok(plan) => self.commit_delivery(message, plan, relay)?,
            Err(err) => self.record_failure(message, err),
        };
        self.inbound.insert(message.message_id, receipt.clone());
        Ok(Delivery::Processed(receipt))
    }

    fn plan_delivery(&self, message: &BridgeMessage) -> Result<DeliveryPlan, BridgeError> {
        let pairing = self
            .pairings
            .get(&message.source_chain)
            .filter(|p| p.accepts(&message.source_contract))
            .ok_or(BridgeError::UnknownPairing {
                chain_id: message.source_chain,
            })?;

        let scaled = pairing.to_local(message.raw_amount())?;
        pairing.ensure_outstanding(scaled.amount)?;

        let payload = &message.payload;
        apply_secondary_fee(scaled.amount, payload.secondary_fee)?;

        if !router::is_final_hop(payload, self.chain_id()) {
            router::ensure_not_visited(&payload.hops, self.chain_id())?;
            let intent = router::forward_intent(payload, scaled.amount, self.config.asset.token);
            let prepared = self.prepare_send(
                Funding::Inbound,
                &intent,
                payload.origin_chain,
                payload.origin_sender,
                payload.hops.clone(),
            )?;
            return Ok(DeliveryPlan::Forward {
                scaled,
                prepared: Box::new(prepared),
            });
        }

        if payload.final_contract != self.contract() {
            return Err(BridgeError::InvalidDestinationContract {
                expected: self.contract(),
                got: payload.final_contract,
            });
        }
        if payload.recipient == Address::ZERO {
            return Err(BridgeError::InvalidRecipient);
        }

        let reserve = match &self.reserve {
            Some(reserve) => reserve.preview(scaled.amount),
            None => ReserveOutcome {
                minted: scaled.amount,
                consumed: U256::ZERO,
            },
        };
        // The reserve is paid first; the fee only comes out of what is left
        let fee = payload.secondary_fee.min(reserve.minted);
        let released = reserve.minted - fee;
        self.custody()
            .ensure_releasable(&self.ledger, self.contract(), reserve.minted)?;

        Ok(DeliveryPlan::Settle {
            scaled,
            reserve,
            fee,
            released,
        })
    }

    fn commit_delivery(
        &mut self,
        message: &BridgeMessage,
        plan: DeliveryPlan,
        relay: &mut dyn Relay,
    ) -> Result<DeliveryReceipt, BridgeError> {
        let (scaled, scaling) = {
            let scaled = match &plan {
                DeliveryPlan::Settle { scaled, .. } | DeliveryPlan::Forward { scaled, .. } => {
                    *scaled
                }
            };
            let pairing = self.pairings.get_mut(&message.source_chain).ok_or(
                BridgeError::UnknownPairing {
                    chain_id: message.source_chain,
                },
            )?;
            pairing.record_inbound(scaled.amount)?;
            (scaled, pairing.scaling)
        };

        let mut receipt = DeliveryReceipt {
            message_id: message.message_id,
            source_chain: message.source_chain,
            destination_chain: self.chain_id(),
            origin_chain: message.payload.origin_chain,
            origin_sender: message.payload.origin_sender,
            recipient: message.payload.recipient,
            raw_amount: message.raw_amount(),
            scaling,
            scaled_amount: scaled.amount,
            truncated: scaled.remainder,
            reserve_consumed: U256::ZERO,
            secondary_fee: U256::ZERO,
            released: U256::ZERO,
            forwarded: None,
            state: TransferState::Settled,
            failure: None,
            claimed: false,
        };

        match plan {
            DeliveryPlan::Settle {
                reserve,
                fee,
                released,
                ..
            } => {
                let custody = self.custody();
                let contract = self.contract();
                if let Some(state) = self.reserve.as_mut() {
                    state.consume(scaled.amount);
                    if !reserve.consumed.is_zero() {
                        let remaining = state.imbalance_remaining();
                        info!(
                            message_id = %message.message_id,
                            consumed = %reserve.consumed,
                            remaining = %remaining,
                            "Reserve imbalance paid down"
                        );
                        self.events.push(BridgeEvent::ReserveConsumed {
                            message_id: message.message_id,
                            consumed: reserve.consumed,
                            remaining,
                        });
                    }
                }
                custody.release_inbound(
                    &mut self.ledger,
                    contract,
                    message.payload.recipient,
                    released,
                )?;
                custody.release_inbound(&mut self.ledger, contract, self.config.fee_collector, fee)?;

                info!(
                    message_id = %message.message_id,
                    source_chain = %message.source_chain,
                    recipient = %message.payload.recipient,
                    scaled = %scaled.amount,
                    fee = %fee,
                    released = %released,
                    "Tokens withdrawn"
                );
                self.events.push(BridgeEvent::TokensWithdrawn {
                    message_id: message.message_id,
                    recipient: message.payload.recipient,
                    amount: released,
                });

                receipt.reserve_consumed = reserve.consumed;
                receipt.secondary_fee = fee;
                receipt.released = released;
            }
            DeliveryPlan::Forward { prepared, .. } => {
                let send = self.commit_send(*prepared)?;
                if let Err(err) = self.emit_outbound(&send.message_id, relay) {
                    warn!(
                        message_id = %send.message_id,
                        error = %err,
                        "Relay refused forwarded message, held for retry"
                    );
                }

                info!(
                    message_id = %message.message_id,
                    next_message_id = %send.message_id,
                    next_chain = %send.destination_chain,
                    amount = %send.net,
                    "Tokens routed"
                );
                self.events.push(BridgeEvent::TokensRouted {
                    message_id: message.message_id,
                    next_message_id: send.message_id,
                    next_chain: send.destination_chain,
                    amount: send.net,
                });

                receipt.secondary_fee = send.primary_fee;
                receipt.forwarded = Some(send);
            }
        }

        Ok(receipt)
    }

    fn record_failure(&mut self, message: &BridgeMessage, err: BridgeError) -> DeliveryReceipt {
        let kind = err.kind();
        let reason = err.to_string();
        warn!(
            message_id = %message.message_id,
            source_chain = %message.source_chain,
            kind = %kind,
            reason = %reason,
            "Delivery failed"
        );
        self.events.push(BridgeEvent::DeliveryFailed {
            message_id: message.message_id,
            kind,
            reason: reason.clone(),
        });

        let scaling = self
            .pairings
            .get(&message.source_chain)
            .map(|p| p.scaling)
            .unwrap_or_default();
        DeliveryReceipt {
            message_id: message.message_id,
            source_chain: message.source_chain,
            destination_chain: self.chain_id(),
            origin_chain: message.payload.origin_chain,
            origin_sender: message.payload.origin_sender,
            recipient: message.payload.recipient,
            raw_amount: message.raw_amount(),
            scaling,
            scaled_amount: U256::ZERO,
            truncated: U256::ZERO,
            reserve_consumed: U256::ZERO,
            secondary_fee: U256::ZERO,
            released: U256::ZERO,
            forwarded: None,
            state: TransferState::Failed,
            failure: Some(Failure { kind, reason }),
            claimed: false,
        }
    }

    // ========================================================================
    // Lifecycle follow-up
    // ========================================================================

    /// Close out an outbound transfer with the receiving side's receipt
    ///
    /// Confirming an already closed transfer is a no-op.
    pub fn confirm_delivery(
        &mut self,
        receipt: &DeliveryReceipt,
    ) -> Result<TransferState, BridgeError> {
        let record = self
            .outbound
            .get_mut(&receipt.message_id)
            .filter(|r| r.message.destination_chain == receipt.destination_chain)
            .ok_or(BridgeError::TransferNotFound {
                message_id: receipt.message_id,
            })?;
        if record.state.is_terminal() {
            return Ok(record.state);
        }

        advance(&mut record.state, TransferState::Delivered)?;
        if receipt.is_failed() {
            advance(&mut record.state, TransferState::Failed)?;
            record.failure = receipt.failure.clone();
        } else {
            advance(&mut record.state, TransferState::Settled)?;
        }
        debug!(
            message_id = %receipt.message_id,
            state = %record.state,
            "Outbound transfer confirmed"
        );
        Ok(record.state)
    }

    /// Hand a failed inbound transfer to remediation, once
    pub fn claim_failure(&mut self, message_id: &MessageId) -> Result<FailedTransfer, BridgeError> {
        let receipt = self
            .inbound
            .get_mut(message_id)
            .ok_or(BridgeError::TransferNotFound {
                message_id: *message_id,
            })?;
        let failure = match (&receipt.failure, receipt.state) {
            (Some(failure), TransferState::Failed) => failure.clone(),
            _ => {
                return Err(BridgeError::InvalidTransition {
                    from: receipt.state,
                    to: TransferState::Failed,
                })
            }
        };
        if receipt.claimed {
            return Err(BridgeError::FailureAlreadyClaimed {
                message_id: *message_id,
            });
        }
        receipt.claimed = true;

        info!(message_id = %message_id, kind = %failure.kind, "Failed transfer claimed");
        Ok(FailedTransfer {
            message_id: *message_id,
            source_chain: receipt.source_chain,
            origin_chain: receipt.origin_chain,
            origin_sender: receipt.origin_sender,
            escrowed: receipt.raw_amount,
            failure,
        })
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn config(&self) -> &InstanceConfig {
        &self.config
    }

    pub fn chain_id(&self) -> ChainId {
        self.config.chain_id
    }

    pub fn contract(&self) -> Address {
        self.config.contract
    }

    pub fn role(&self) -> Role {
        self.config.role
    }

    pub fn fee_collector(&self) -> Address {
        self.config.fee_collector
    }

    pub fn home_chain(&self) -> Option<ChainId> {
        self.config.home.map(|home| home.chain_id)
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn balance_of(&self, account: &Address) -> U256 {
        self.ledger.balance_of(account)
    }

    pub fn total_supply(&self) -> U256 {
        self.ledger.total_supply()
    }

    /// Value held in this instance's escrow account
    pub fn escrow_balance(&self) -> U256 {
        self.ledger.balance_of(&self.contract())
    }

    pub fn reserve(&self) -> Option<&ReserveState> {
        self.reserve.as_ref()
    }

    /// Reserve imbalance still to be paid down; zero for sources
    pub fn reserve_remaining(&self) -> U256 {
        self.reserve
            .map(|r| r.imbalance_remaining())
            .unwrap_or(U256::ZERO)
    }

    pub fn is_collateralized(&self) -> bool {
        self.reserve.map_or(true, |r| r.is_collateralized())
    }

    pub fn pairing(&self, chain_id: &ChainId) -> Option<&Pairing> {
        self.pairings.get(chain_id)
    }

    pub fn pairings(&self) -> impl Iterator<Item = &Pairing> {
        self.pairings.values()
    }

    /// Value sent over non-backing pairings and not yet returned
    pub fn total_outstanding(&self) -> U256 {
        self.pairings
            .values()
            .filter(|p| !p.backing)
            .fold(U256::ZERO, |acc, p| acc.saturating_add(p.outstanding))
    }

    /// Whether a message ID has been delivered here, settled or failed
    pub fn is_processed(&self, message_id: &MessageId) -> bool {
        self.inbound.contains_key(message_id)
    }

    pub fn inbound(&self, message_id: &MessageId) -> Option<&DeliveryReceipt> {
        self.inbound.get(message_id)
    }

    pub fn inbound_receipts(&self) -> impl Iterator<Item = &DeliveryReceipt> {
        self.inbound.values()
    }

    pub fn outbound(&self, message_id: &MessageId) -> Option<&OutboundTransfer> {
        self.outbound.get(message_id)
    }

    pub fn outbound_transfers(&self) -> impl Iterator<Item = &OutboundTransfer> {
        self.outbound.values()
    }

    /// Net value of sends not yet confirmed settled or failed
    pub fn in_flight_amount(&self) -> U256 {
        self.outbound
            .values()
            .filter(|t| t.is_in_flight())
            .fold(U256::ZERO, |acc, t| acc.saturating_add(t.receipt.net))
    }

    /// Sends not yet confirmed settled or failed, emitted or not
    pub fn unconfirmed(&self) -> Vec<MessageId> {
        self.outbound
            .values()
            .filter(|t| t.is_in_flight())
            .map(|t| t.receipt.message_id)
            .collect()
    }

    /// Sends held because the relay refused them
    pub fn pending_emission(&self) -> Vec<MessageId> {
        self.outbound
            .values()
            .filter(|t| t.state == TransferState::FeesEscrowed)
            .map(|t| t.receipt.message_id)
            .collect()
    }

    pub fn events(&self) -> &[BridgeEvent] {
        &self.events
    }

    /// Take the event log, leaving it empty
    pub fn drain_events(&mut self) -> Vec<BridgeEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    /// Whether any transfer has been sent or received
    pub fn has_activity(&self) -> bool {
        self.nonce > 0 || !self.inbound.is_empty()
    }

    // ========================================================================
    // Durable state
    // ========================================================================

    /// Serialize the full instance state
    pub fn snapshot(&self) -> Result<String, BridgeError> {
        serde_json::to_string_pretty(self).map_err(|e| BridgeError::Snapshot {
            reason: e.to_string(),
        })
    }

    /// Resume from a snapshot taken with [`Self::snapshot`]
    pub fn restore(snapshot: &str) -> Result<Self, BridgeError> {
        let instance: Self = serde_json::from_str(snapshot).map_err(|e| BridgeError::Snapshot {
            reason: e.to_string(),
        })?;
        instance.config.validate()?;
        debug!(
            chain_id = %instance.chain_id(),
            nonce = instance.nonce,
            processed = instance.inbound.len(),
            "Bridge instance restored"
        );
        Ok(instance)
    }

    fn custody(&self) -> &'static dyn crate::custody::Custody {
        self.config.role.custody()
    }
}

fn advance(state: &mut TransferState, next: TransferState) -> Result<(), BridgeError> {
    if !state.can_advance_to(next) {
        return Err(BridgeError::InvalidTransition {
            from: *state,
            to: next,
        });
    }
    *state = next;
    Ok(())
}

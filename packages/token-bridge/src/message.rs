//! Transfer intents, cross-chain messages and receipts
//!
//! A [`TransferIntent`] is what a caller submits; the sending instance turns
//! it into a [`BridgeMessage`] for the relay and a [`SendReceipt`] for the
//! caller. The receiving instance records a [`DeliveryReceipt`] per message
//! ID, which doubles as its processed set.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::scaler::Scaling;
use crate::types::{ChainId, MessageId, TransferState};

/// Gas budget used when a caller does not pick one
pub const DEFAULT_REQUIRED_GAS_LIMIT: u64 = 250_000;

// ============================================================================
// Intent
// ============================================================================

/// A caller's request to move `amount` to `recipient` on another chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferIntent {
    /// Final chain the recipient lives on
    pub destination_chain_id: ChainId,
    /// Bridge contract on the final chain
    pub destination_contract: Address,
    pub recipient: Address,
    /// Asset the primary fee is paid in (must be the bridged asset)
    pub primary_fee_asset: Address,
    pub primary_fee: U256,
    /// Fee in the receiving chain's units; rolled forward on multihop paths
    pub secondary_fee: U256,
    pub required_gas_limit: u64,
    /// Gas for the second leg when the transfer is routed through a hub
    pub secondary_gas_limit: u64,
    /// Gross amount debited from the sender, primary fee included
    pub amount: U256,
}

impl TransferIntent {
    pub fn new(
        destination_chain_id: ChainId,
        destination_contract: Address,
        recipient: Address,
        amount: U256,
    ) -> Self {
        Self {
            destination_chain_id,
            destination_contract,
            recipient,
            primary_fee_asset: Address::ZERO,
            primary_fee: U256::ZERO,
            secondary_fee: U256::ZERO,
            required_gas_limit: DEFAULT_REQUIRED_GAS_LIMIT,
            secondary_gas_limit: DEFAULT_REQUIRED_GAS_LIMIT,
            amount,
        }
    }

    pub fn with_primary_fee(mut self, asset: Address, fee: U256) -> Self {
        self.primary_fee_asset = asset;
        self.primary_fee = fee;
        self
    }

    pub fn with_secondary_fee(mut self, fee: U256) -> Self {
        self.secondary_fee = fee;
        self
    }

    pub fn with_gas_limits(mut self, required: u64, secondary: u64) -> Self {
        self.required_gas_limit = required;
        self.secondary_gas_limit = secondary;
        self
    }
}

// ============================================================================
// Wire message
// ============================================================================

/// Body of a cross-chain transfer message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferPayload {
    pub origin_chain: ChainId,
    pub origin_sender: Address,
    /// Chain where the recipient is paid
    pub final_chain: ChainId,
    pub final_contract: Address,
    pub recipient: Address,
    /// Net amount in the sending instance's units, before receive-side scaling
    pub amount: U256,
    pub secondary_fee: U256,
    pub secondary_gas_limit: u64,
    /// Chains already traversed, origin first
    pub hops: Vec<ChainId>,
}

/// A message as handed to and delivered by the relay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeMessage {
    pub message_id: MessageId,
    pub source_chain: ChainId,
    pub source_contract: Address,
    pub destination_chain: ChainId,
    pub destination_contract: Address,
    pub required_gas_limit: u64,
    pub payload: TransferPayload,
}

impl BridgeMessage {
    /// Amount carried, in the sender's units
    pub fn raw_amount(&self) -> U256 {
        self.payload.amount
    }

    /// Whether this leg ends at the recipient's chain
    pub fn is_final_leg(&self) -> bool {
        self.payload.final_chain == self.destination_chain
    }
}

// ============================================================================
// Receipts
// ============================================================================

/// What a send did on the sending chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReceipt {
    pub message_id: MessageId,
    pub source_chain: ChainId,
    /// Next hop the message is addressed to
    pub destination_chain: ChainId,
    pub final_chain: ChainId,
    pub sender: Address,
    pub gross: U256,
    pub primary_fee: U256,
    pub net: U256,
    /// Scaling the next hop applies on receive
    pub remote_scaling: Scaling,
    /// Routed through a hub rather than sent directly
    pub multihop: bool,
    /// Produced by routing an inbound message onward
    pub forwarded: bool,
}

/// Why a delivery did not settle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub kind: ErrorKind,
    pub reason: String,
}

/// What a delivery did on the receiving chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub message_id: MessageId,
    pub source_chain: ChainId,
    pub destination_chain: ChainId,
    pub origin_chain: ChainId,
    pub origin_sender: Address,
    pub recipient: Address,
    /// Amount as carried by the message, in sender units
    pub raw_amount: U256,
    pub scaling: Scaling,
    pub scaled_amount: U256,
    /// Lost to truncation, in sender units
    pub truncated: U256,
    pub reserve_consumed: U256,
    pub secondary_fee: U256,
    /// Minted or released to the recipient
    pub released: U256,
    /// The onward send, when this chain was an intermediate hop
    pub forwarded: Option<SendReceipt>,
    pub state: TransferState,
    pub failure: Option<Failure>,
    /// Failure handed to a remediation path
    pub claimed: bool,
}

impl DeliveryReceipt {
    pub fn is_settled(&self) -> bool {
        self.state == TransferState::Settled
    }

    pub fn is_failed(&self) -> bool {
        self.state == TransferState::Failed
    }

    pub fn failure_kind(&self) -> Option<ErrorKind> {
        self.failure.as_ref().map(|f| f.kind)
    }
}

/// Result of handing a message to [`crate::BridgeInstance::deliver`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// First delivery of this message ID
    Processed(DeliveryReceipt),
    /// Redelivery; nothing changed and the prior receipt is returned
    Duplicate(DeliveryReceipt),
}

impl Delivery {
    pub fn receipt(&self) -> &DeliveryReceipt {
        match self {
            Delivery::Processed(receipt) | Delivery::Duplicate(receipt) => receipt,
        }
    }

    pub fn into_receipt(self) -> DeliveryReceipt {
        match self {
            Delivery::Processed(receipt) | Delivery::Duplicate(receipt) => receipt,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, Delivery::Duplicate(_))
    }

    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Delivery::Duplicate(_) => Some(ErrorKind::DuplicateDelivery),
            Delivery::Processed(receipt) => receipt.failure_kind(),
        }
    }
}

/// A failed inbound transfer handed to remediation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedTransfer {
    pub message_id: MessageId,
    pub source_chain: ChainId,
    pub origin_chain: ChainId,
    pub origin_sender: Address,
    /// Amount still escrowed on the sending side, in sender units
    pub escrowed: U256,
    pub failure: Failure,
}

/// Sender-side record of an outbound transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundTransfer {
    pub receipt: SendReceipt,
    /// Retained so the emission can be retried
    pub message: BridgeMessage,
    pub state: TransferState,
    pub failure: Option<Failure>,
}

impl OutboundTransfer {
    /// Escrowed value not yet known to have settled
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self.state,
            TransferState::FeesEscrowed | TransferState::MessageEmitted
        )
    }
}

// ============================================================================
// Events
// ============================================================================

/// Instance event log entries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BridgeEvent {
    PairingRegistered {
        chain_id: ChainId,
        contract: Address,
    },
    TokensSent {
        message_id: MessageId,
        destination_chain: ChainId,
        recipient: Address,
        amount: U256,
        primary_fee: U256,
    },
    TokensRouted {
        message_id: MessageId,
        next_message_id: MessageId,
        next_chain: ChainId,
        amount: U256,
    },
    ReserveConsumed {
        message_id: MessageId,
        consumed: U256,
        remaining: U256,
    },
    TokensWithdrawn {
        message_id: MessageId,
        recipient: Address,
        amount: U256,
    },
    DeliveryFailed {
        message_id: MessageId,
        kind: ErrorKind,
        reason: String,
    },
}

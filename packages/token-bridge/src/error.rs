//! Error types for the bridge accounting core
//!
//! Every fallible operation returns [`BridgeError`]. [`ErrorKind`] is the
//! coarse, serializable classification recorded on failed deliveries.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::scaler::Scaling;
use crate::types::{ChainId, MessageId, TransferState};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BridgeError {
    // ========================================================================
    // Configuration & Pairing Errors
    // ========================================================================
    #[error("Invalid config: {reason}")]
    InvalidConfig { reason: String },

    #[error("Pairing with chain {chain_id} is already registered or the instance is in use")]
    AlreadyPaired { chain_id: ChainId },

    #[error("Invalid pairing: {reason}")]
    InvalidPairing { reason: String },

    #[error("Scaling mismatch: deployed {deployed:?}, registered {registered:?}")]
    ScalingMismatch {
        deployed: Scaling,
        registered: Scaling,
    },

    #[error("No pairing registered for chain {chain_id}")]
    UnknownPairing { chain_id: ChainId },

    #[error("Destination contract mismatch: expected {expected}, got {got}")]
    InvalidDestinationContract { expected: Address, got: Address },

    // ========================================================================
    // Amount & Funds Errors
    // ========================================================================
    #[error("Precision loss: {amount} scales to zero with shift {shift}")]
    PrecisionLoss { amount: U256, shift: u8 },

    #[error("Insufficient amount: fee {fee} must be below amount {amount}")]
    InsufficientAmount { amount: U256, fee: U256 },

    #[error("Arithmetic overflow")]
    Overflow,

    #[error("Unsupported fee asset: {asset}")]
    UnsupportedFeeAsset { asset: Address },

    #[error("Invalid recipient: zero address")]
    InvalidRecipient,

    #[error("Invalid gas limit: must be greater than zero")]
    InvalidGasLimit,

    #[error("Instance undercollateralized: {remaining} reserve imbalance remaining")]
    Undercollateralized { remaining: U256 },

    #[error("Insufficient balance for {account}: have {balance}, need {required}")]
    InsufficientBalance {
        account: Address,
        balance: U256,
        required: U256,
    },

    #[error("Insufficient escrow for chain {chain_id}: outstanding {outstanding}, requested {requested}")]
    InsufficientEscrow {
        chain_id: ChainId,
        outstanding: U256,
        requested: U256,
    },

    // ========================================================================
    // Delivery Errors
    // ========================================================================
    #[error("Message addressed to {got}, this instance is {expected}")]
    WrongDestination { expected: Address, got: Address },

    #[error("Message {message_id} already processed")]
    DuplicateDelivery { message_id: MessageId },

    #[error("Routing cycle: chain {chain_id} already traversed")]
    RoutingCycle { chain_id: ChainId },

    // ========================================================================
    // Lifecycle Errors
    // ========================================================================
    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition {
        from: TransferState,
        to: TransferState,
    },

    #[error("Transfer not found: {message_id}")]
    TransferNotFound { message_id: MessageId },

    #[error("Failure for {message_id} already claimed")]
    FailureAlreadyClaimed { message_id: MessageId },

    #[error("Relay unavailable: {reason}")]
    RelayUnavailable { reason: String },

    #[error("Snapshot error: {reason}")]
    Snapshot { reason: String },
}

impl BridgeError {
    /// Coarse classification of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            BridgeError::PrecisionLoss { .. } => ErrorKind::PrecisionLoss,
            BridgeError::InsufficientAmount { .. } => ErrorKind::InsufficientAmount,
            BridgeError::UnknownPairing { .. }
            | BridgeError::InvalidDestinationContract { .. } => ErrorKind::UnknownPairing,
            BridgeError::DuplicateDelivery { .. } => ErrorKind::DuplicateDelivery,
            BridgeError::RoutingCycle { .. } => ErrorKind::RoutingCycle,
            BridgeError::AlreadyPaired { .. } => ErrorKind::AlreadyPaired,
            BridgeError::InsufficientEscrow { .. } => ErrorKind::InsufficientEscrow,
            BridgeError::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            BridgeError::Undercollateralized { .. } => ErrorKind::Undercollateralized,
            BridgeError::Overflow => ErrorKind::Overflow,
            BridgeError::InvalidConfig { .. }
            | BridgeError::InvalidPairing { .. }
            | BridgeError::ScalingMismatch { .. }
            | BridgeError::UnsupportedFeeAsset { .. }
            | BridgeError::InvalidRecipient
            | BridgeError::InvalidGasLimit
            | BridgeError::WrongDestination { .. } => ErrorKind::InvalidInput,
            BridgeError::InvalidTransition { .. }
            | BridgeError::TransferNotFound { .. }
            | BridgeError::FailureAlreadyClaimed { .. } => ErrorKind::Lifecycle,
            BridgeError::RelayUnavailable { .. } => ErrorKind::Relay,
            BridgeError::Snapshot { .. } => ErrorKind::Snapshot,
        }
    }
}

/// Serializable error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    PrecisionLoss,
    InsufficientAmount,
    UnknownPairing,
    DuplicateDelivery,
    RoutingCycle,
    AlreadyPaired,
    InsufficientEscrow,
    InsufficientBalance,
    Undercollateralized,
    Overflow,
    InvalidInput,
    Lifecycle,
    Relay,
    Snapshot,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::PrecisionLoss => "precision_loss",
            ErrorKind::InsufficientAmount => "insufficient_amount",
            ErrorKind::UnknownPairing => "unknown_pairing",
            ErrorKind::DuplicateDelivery => "duplicate_delivery",
            ErrorKind::RoutingCycle => "routing_cycle",
            ErrorKind::AlreadyPaired => "already_paired",
            ErrorKind::InsufficientEscrow => "insufficient_escrow",
            ErrorKind::InsufficientBalance => "insufficient_balance",
            ErrorKind::Undercollateralized => "undercollateralized",
            ErrorKind::Overflow => "overflow",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::Lifecycle => "lifecycle",
            ErrorKind::Relay => "relay",
            ErrorKind::Snapshot => "snapshot",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

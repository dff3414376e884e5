//! Relay interface
//!
//! Message transport is an external collaborator. The core hands every
//! emitted message to a [`Relay`] and resumes only when the relay calls
//! [`crate::BridgeInstance::deliver`] on the far side. No ordering or
//! latency is assumed; delivery may be delayed, repeated or never happen.

use std::collections::VecDeque;

use crate::error::BridgeError;
use crate::message::BridgeMessage;
use crate::types::MessageId;

/// Core -> relay handoff
pub trait Relay {
    /// Accept a message for delivery to `message.destination_contract` on
    /// `message.destination_chain`, within `message.required_gas_limit`.
    fn emit(&mut self, message: &BridgeMessage) -> Result<(), BridgeError>;
}

impl<R: Relay + ?Sized> Relay for &mut R {
    fn emit(&mut self, message: &BridgeMessage) -> Result<(), BridgeError> {
        (**self).emit(message)
    }
}

/// FIFO relay kept in memory
///
/// Messages are queued on emit and popped by whoever drives delivery.
/// Everything ever emitted is kept so a message can be redelivered.
#[derive(Debug, Default)]
pub struct MemoryRelay {
    queue: VecDeque<BridgeMessage>,
    history: Vec<BridgeMessage>,
    offline: bool,
}

impl MemoryRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// While offline every emit is refused
    pub fn set_offline(&mut self, offline: bool) {
        self.offline = offline;
    }

    pub fn pop(&mut self) -> Option<BridgeMessage> {
        self.queue.pop_front()
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn is_idle(&self) -> bool {
        self.queue.is_empty()
    }

    /// A previously emitted message, for redelivery
    pub fn find(&self, message_id: &MessageId) -> Option<&BridgeMessage> {
        self.history.iter().find(|m| &m.message_id == message_id)
    }

    pub fn history(&self) -> &[BridgeMessage] {
        &self.history
    }
}

impl Relay for MemoryRelay {
    fn emit(&mut self, message: &BridgeMessage) -> Result<(), BridgeError> {
        if self.offline {
            return Err(BridgeError::RelayUnavailable {
                reason: "relay offline".to_string(),
            });
        }
        self.queue.push_back(message.clone());
        self.history.push(message.clone());
        Ok(())
    }
}

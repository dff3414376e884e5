//! Common types for cross-chain transfers
//!
//! Chain and message identifiers, the instance role, and the transfer
//! lifecycle states shared by every bridge instance.

use eyre::{eyre, Result};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

// ============================================================================
// Chain ID (4 bytes)
// ============================================================================

/// Represents a 4-byte chain ID
///
/// Every chain hosting a bridge instance is identified by a fixed-width ID
/// that is carried in message payloads and hop lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ChainId(pub [u8; 4]);

impl ChainId {
    /// Create from u32
    pub fn from_u32(id: u32) -> Self {
        ChainId(id.to_be_bytes())
    }

    /// Convert to u32
    pub fn to_u32(&self) -> u32 {
        u32::from_be_bytes(self.0)
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    /// Create from hex string (with or without 0x prefix)
    pub fn from_hex(hex: &str) -> Result<Self> {
        let hex = hex.strip_prefix("0x").unwrap_or(hex);
        let bytes = hex::decode(hex)?;
        if bytes.len() != 4 {
            return Err(eyre!("ChainId must be 4 bytes, got {}", bytes.len()));
        }
        let mut result = [0u8; 4];
        result.copy_from_slice(&bytes);
        Ok(ChainId(result))
    }

    /// Convert to hex string with 0x prefix
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// The all-zero ID is reserved and never names a real chain
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 4]
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_u32())
    }
}

impl From<u32> for ChainId {
    fn from(id: u32) -> Self {
        ChainId::from_u32(id)
    }
}

// Hex strings so IDs can key JSON maps in snapshots
impl Serialize for ChainId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ChainId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        ChainId::from_hex(&raw).map_err(de::Error::custom)
    }
}

// ============================================================================
// Message ID (32 bytes)
// ============================================================================

/// Unique identifier of a cross-chain message
///
/// Derived deterministically from the sending instance and its outbound
/// nonce, see [`crate::hash::compute_message_id`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageId(pub [u8; 32]);

impl MessageId {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        MessageId(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string with 0x prefix
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Create from hex string (with or without 0x prefix)
    pub fn from_hex(hex: &str) -> Result<Self> {
        let hex = hex.strip_prefix("0x").unwrap_or(hex);
        let bytes = hex::decode(hex)?;
        if bytes.len() != 32 {
            return Err(eyre!("MessageId must be 32 bytes"));
        }
        let mut result = [0u8; 32];
        result.copy_from_slice(&bytes);
        Ok(MessageId(result))
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for MessageId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for MessageId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        MessageId::from_hex(&raw).map_err(de::Error::custom)
    }
}

// ============================================================================
// Instance Role
// ============================================================================

/// Role of a bridge instance on its chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Backs a chain-native or pre-existing asset: locks on send, releases on receive
    Source,
    /// Holds a derived representation: burns on send, mints on receive
    Destination,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Source => "source",
            Role::Destination => "destination",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Transfer Lifecycle
// ============================================================================

/// Lifecycle state of a single transfer
///
/// ```text
/// Created -> FeesEscrowed -> MessageEmitted -> Delivered -> Settled
///    \            \               \               \
///     `------------`---------------`---------------`--> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferState {
    Created,
    FeesEscrowed,
    MessageEmitted,
    Delivered,
    Settled,
    Failed,
}

impl TransferState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferState::Created => "created",
            TransferState::FeesEscrowed => "fees_escrowed",
            TransferState::MessageEmitted => "message_emitted",
            TransferState::Delivered => "delivered",
            TransferState::Settled => "settled",
            TransferState::Failed => "failed",
        }
    }

    /// Settled and Failed accept no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferState::Settled | TransferState::Failed)
    }

    /// Whether `next` is a legal successor of this state
    pub fn can_advance_to(&self, next: TransferState) -> bool {
        use TransferState::*;
        match (self, next) {
            (Created, FeesEscrowed)
            | (FeesEscrowed, MessageEmitted)
            | (MessageEmitted, Delivered)
            | (MessageEmitted, Settled)
            | (Delivered, Settled) => true,
            (state, Failed) => !state.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_id_from_u32() {
        let id = ChainId::from_u32(1);
        assert_eq!(id.to_u32(), 1);
        assert_eq!(id.0, [0, 0, 0, 1]);
    }

    #[test]
    fn test_chain_id_from_hex() {
        let id = ChainId::from_hex("0x00000001").unwrap();
        assert_eq!(id.to_u32(), 1);

        let id2 = ChainId::from_hex("00000002").unwrap();
        assert_eq!(id2.to_u32(), 2);

        assert!(ChainId::from_hex("0x0001").is_err());
    }

    #[test]
    fn test_chain_id_display() {
        let id = ChainId::from_u32(43114);
        assert_eq!(format!("{}", id), "43114");
        assert_eq!(id.to_hex(), "0x0000a86a");
    }

    #[test]
    fn test_message_id_hex_roundtrip() {
        let id = MessageId::from_bytes([7u8; 32]);
        let hex = id.to_hex();
        assert!(hex.starts_with("0x"));
        assert_eq!(hex.len(), 66);
        assert_eq!(MessageId::from_hex(&hex).unwrap(), id);
    }

    #[test]
    fn test_ids_serialize_as_hex_strings() {
        let json = serde_json::to_string(&ChainId::from_u32(2)).unwrap();
        assert_eq!(json, "\"0x00000002\"");
        let back: ChainId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ChainId::from_u32(2));

        let id = MessageId::from_bytes([9u8; 32]);
        let back: MessageId = serde_json::from_str(&serde_json::to_string(&id).unwrap()).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_role_as_str() {
        assert_eq!(Role::Source.as_str(), "source");
        assert_eq!(format!("{}", Role::Destination), "destination");
    }

    #[test]
    fn test_transfer_state_happy_path() {
        use TransferState::*;
        assert!(Created.can_advance_to(FeesEscrowed));
        assert!(FeesEscrowed.can_advance_to(MessageEmitted));
        assert!(MessageEmitted.can_advance_to(Delivered));
        assert!(Delivered.can_advance_to(Settled));
    }

    #[test]
    fn test_transfer_state_rejects_skips_and_terminal_moves() {
        use TransferState::*;
        assert!(!Created.can_advance_to(MessageEmitted));
        assert!(!Settled.can_advance_to(Failed));
        assert!(!Failed.can_advance_to(Settled));
        assert!(Created.can_advance_to(Failed));
        assert!(Delivered.can_advance_to(Failed));
        assert!(Settled.is_terminal());
    }
}

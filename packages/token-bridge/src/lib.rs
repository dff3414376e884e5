//! Token-Bridge: Accounting core for a cross-chain token bridge
//!
//! This crate provides the value-accounting rules every bridge instance follows:
//!
//! - **Scaler** - Fixed-point decimal conversion between paired chains
//! - **Fee Manager** - Primary (send-side) and secondary (receive-side) fee splits
//! - **Reserve** - Pre-existing supply paid down by inbound transfers on destinations
//! - **Instance** - The transfer state machine, custody hooks and pairing registry
//! - **Router** - Next-hop selection and cycle checks for multihop transfers
//! - **Verifier** - Conservation and balance checks over receipts and ledgers
//! - **Network** - An in-memory multi-chain network driven by a memory relay
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! token-bridge = { path = "../token-bridge" }
//! ```
//!
//! ```
//! use alloy_primitives::{Address, U256};
//! use token_bridge::{
//!     AssetMetadata, ChainId, HomeConfig, InstanceConfig, LocalNetwork, TransferIntent,
//! };
//!
//! # fn main() -> Result<(), token_bridge::BridgeError> {
//! let asset = |token: u8| AssetMetadata {
//!     name: "Test".to_string(),
//!     symbol: "TST".to_string(),
//!     decimals: 18,
//!     token: Address::repeat_byte(token),
//! };
//! let (home, remote) = (ChainId::from_u32(1), ChainId::from_u32(2));
//! let alice = Address::repeat_byte(0xa1);
//!
//! let mut network = LocalNetwork::new();
//! network.deploy(
//!     InstanceConfig::source(home, Address::repeat_byte(1), asset(0x10), Address::repeat_byte(0xf1)),
//!     [(alice, U256::from(1_000u64))],
//! )?;
//! network.deploy(
//!     InstanceConfig::destination(
//!         remote,
//!         Address::repeat_byte(2),
//!         asset(0x20),
//!         Address::repeat_byte(0xf2),
//!         HomeConfig { chain_id: home, decimals_shift: 0, multiply_on_receive: false },
//!     ),
//!     [],
//! )?;
//! network.connect(remote)?;
//!
//! let intent = TransferIntent::new(remote, Address::repeat_byte(2), alice, U256::from(400u64));
//! network.send(home, alice, intent)?;
//! network.relay_all()?;
//! assert_eq!(network.get_balance(&remote, &alice), U256::from(400u64));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod custody;
pub mod error;
pub mod fee_manager;
pub mod hash;
pub mod instance;
pub mod ledger;
pub mod message;
pub mod network;
pub mod pairing;
pub mod relay;
pub mod reserve;
pub mod router;
pub mod scaler;
pub mod types;
pub mod verifier;

// Re-export commonly used items at the crate root
pub use config::{AssetMetadata, HomeConfig, InstanceConfig};
pub use custody::{BurnMint, Custody, LockRelease};
pub use error::{BridgeError, ErrorKind};
pub use fee_manager::{apply_fees, apply_primary_fee, apply_secondary_fee, FeeSplit};
pub use hash::{compute_message_id, keccak256};
pub use instance::BridgeInstance;
pub use ledger::Ledger;
pub use message::{
    BridgeEvent, BridgeMessage, Delivery, DeliveryReceipt, FailedTransfer, Failure,
    OutboundTransfer, SendReceipt, TransferIntent, TransferPayload, DEFAULT_REQUIRED_GAS_LIMIT,
};
pub use network::LocalNetwork;
pub use pairing::{Pairing, PairingRegistration};
pub use relay::{MemoryRelay, Relay};
pub use reserve::{ReserveOutcome, ReserveState};
pub use scaler::{scale, scale_with_remainder, Scaled, Scaling, MAX_DECIMALS_SHIFT};
pub use types::{ChainId, MessageId, Role, TransferState};
pub use verifier::{
    verify_recipient_delta, verify_source_escrow, verify_trace, ConservationReport, TransferTrace,
};

//! Shared fixtures for the integration tests
//!
//! Chain `n` hosts its bridge contract at `0x0n0n..`, its token at
//! `0x1n1n..` and its fee collector at `0xfn..` (for n < 16).

#![allow(dead_code)]

use alloy_primitives::{Address, U256};
use token_bridge::{
    AssetMetadata, BridgeMessage, ChainId, HomeConfig, InstanceConfig, LocalNetwork, MessageId,
    Scaling, TransferIntent, TransferPayload,
};

pub const HUB: u32 = 1;
pub const SPOKE_A: u32 = 2;
pub const SPOKE_C: u32 = 3;

/// Log through `RUST_LOG` when set; later calls are no-ops
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init()
        .ok();
}

pub fn u(v: u64) -> U256 {
    U256::from(v)
}

pub fn chain(id: u32) -> ChainId {
    ChainId::from_u32(id)
}

pub fn contract(id: u32) -> Address {
    Address::repeat_byte(id as u8)
}

pub fn token(id: u32) -> Address {
    Address::repeat_byte(0x10 + id as u8)
}

pub fn collector(id: u32) -> Address {
    Address::repeat_byte(0xf0 + id as u8)
}

pub fn alice() -> Address {
    Address::repeat_byte(0xa1)
}

pub fn bob() -> Address {
    Address::repeat_byte(0xb0)
}

pub fn carol() -> Address {
    Address::repeat_byte(0xc0)
}

pub fn asset(id: u32, decimals: u8) -> AssetMetadata {
    AssetMetadata {
        name: format!("Bridged Token {}", id),
        symbol: format!("BT{}", id),
        decimals,
        token: token(id),
    }
}

pub fn source_config(id: u32, decimals: u8) -> InstanceConfig {
    InstanceConfig::source(chain(id), contract(id), asset(id, decimals), collector(id))
}

/// Destination whose home is `home`; `scaling` applies to amounts from home
pub fn destination_config(id: u32, decimals: u8, home: u32, scaling: Scaling) -> InstanceConfig {
    InstanceConfig::destination(
        chain(id),
        contract(id),
        asset(id, decimals),
        collector(id),
        HomeConfig {
            chain_id: chain(home),
            decimals_shift: scaling.decimals_shift,
            multiply_on_receive: scaling.multiply_on_receive,
        },
    )
}

/// Plain transfer to `recipient` on `to`, fees paid in `from`'s token
pub fn intent(from: u32, to: u32, recipient: Address, amount: u64) -> TransferIntent {
    TransferIntent::new(chain(to), contract(to), recipient, u(amount))
        .with_primary_fee(token(from), U256::ZERO)
}

/// Hub source on chain 1 with `alice` holding `funds`, and one connected
/// destination on chain 2, both 6 decimals.
pub fn pair_network(funds: u64) -> LocalNetwork {
    init_tracing();
    let mut network = LocalNetwork::new();
    network
        .deploy(source_config(HUB, 6), [(alice(), u(funds))])
        .unwrap();
    network
        .deploy(destination_config(SPOKE_A, 6, HUB, Scaling::IDENTITY), [])
        .unwrap();
    network.connect(chain(SPOKE_A)).unwrap();
    network
}

/// Hub source on chain 1 with two destinations (chains 2 and 3), no
/// direct pairing between the destinations.
pub fn hub_network(funds: u64, a_scaling: Scaling, c_scaling: Scaling) -> LocalNetwork {
    init_tracing();
    let mut network = LocalNetwork::new();
    network
        .deploy(source_config(HUB, 6), [(alice(), u(funds))])
        .unwrap();
    network
        .deploy(destination_config(SPOKE_A, 6, HUB, a_scaling), [])
        .unwrap();
    network
        .deploy(destination_config(SPOKE_C, 6, HUB, c_scaling), [])
        .unwrap();
    network.connect(chain(SPOKE_A)).unwrap();
    network.connect(chain(SPOKE_C)).unwrap();
    network
}

/// A message as if sent by `from`'s contract, bypassing its send checks
pub fn forged_message(
    from: u32,
    to: u32,
    final_chain: u32,
    recipient: Address,
    amount: u64,
    hops: Vec<u32>,
) -> BridgeMessage {
    BridgeMessage {
        message_id: MessageId::from_bytes([0xee; 32]),
        source_chain: chain(from),
        source_contract: contract(from),
        destination_chain: chain(to),
        destination_contract: contract(to),
        required_gas_limit: 250_000,
        payload: TransferPayload {
            origin_chain: chain(from),
            origin_sender: alice(),
            final_chain: chain(final_chain),
            final_contract: contract(final_chain),
            recipient,
            amount: u(amount),
            secondary_fee: U256::ZERO,
            secondary_gas_limit: 250_000,
            hops: hops.into_iter().map(chain).collect(),
        },
    }
}

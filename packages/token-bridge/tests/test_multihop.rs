//! Transfers routed through the hub between destinations
//!
//! Run with: cargo test --test test_multihop

mod common;

use alloy_primitives::U256;
use common::*;
use token_bridge::{
    verify_source_escrow, verify_trace, BridgeError, BridgeEvent, ErrorKind, LocalNetwork,
    MemoryRelay, MessageId, Scaling, TransferState,
};

/// Move `amount` from the hub to alice on spoke A
fn fund_spoke(network: &mut LocalNetwork, amount: u64) {
    network
        .send(chain(HUB), alice(), intent(HUB, SPOKE_A, alice(), amount))
        .unwrap();
    network.relay_all().unwrap();
}

#[test]
fn test_spoke_to_spoke_through_hub() {
    let mut network = hub_network(10_000, Scaling::IDENTITY, Scaling::IDENTITY);
    fund_spoke(&mut network, 1_000);
    assert_eq!(network.get_balance(&chain(SPOKE_A), &alice()), u(1_000));

    let receipt = network
        .send(
            chain(SPOKE_A),
            alice(),
            intent(SPOKE_A, SPOKE_C, carol(), 600)
                .with_primary_fee(token(SPOKE_A), u(10))
                .with_secondary_fee(u(20)),
        )
        .unwrap();
    assert!(receipt.multihop);
    assert_eq!(receipt.destination_chain, chain(HUB));
    assert_eq!(receipt.final_chain, chain(SPOKE_C));

    let deliveries = network.relay_all().unwrap();
    assert_eq!(deliveries.len(), 2);
    assert!(deliveries[0].receipt().forwarded.is_some());

    assert_eq!(network.get_balance(&chain(SPOKE_A), &alice()), u(400));
    assert_eq!(network.get_balance(&chain(SPOKE_A), &collector(SPOKE_A)), u(10));
    assert_eq!(network.get_balance(&chain(HUB), &collector(HUB)), u(20));
    assert_eq!(network.get_balance(&chain(SPOKE_C), &carol()), u(570));

    // Value moved from A's escrow share to C's, minus the hub's fee
    let hub = network.instance(&chain(HUB)).unwrap();
    assert_eq!(hub.pairing(&chain(SPOKE_A)).unwrap().outstanding, u(410));
    assert_eq!(hub.pairing(&chain(SPOKE_C)).unwrap().outstanding, u(570));
    assert_eq!(hub.escrow_balance(), u(980));
    verify_source_escrow(hub).unwrap();
    assert!(hub.events().iter().any(|e| matches!(
        e,
        BridgeEvent::TokensRouted { next_chain, amount, .. }
            if *next_chain == chain(SPOKE_C) && *amount == u(570)
    )));

    let trace = network.trace(&receipt).unwrap();
    assert_eq!(trace.hops.len(), 2);
    assert!(trace.is_complete());
    let report = verify_trace(&trace).unwrap();
    assert!(report.settled);
    assert_eq!(report.origin_amount, u(600));
    assert_eq!(report.final_released, u(570));
    assert_eq!(report.fees_by_chain.get(&chain(SPOKE_A)), Some(&u(10)));
    assert_eq!(report.fees_by_chain.get(&chain(HUB)), Some(&u(20)));

    // Both legs are closed out on their senders
    let spoke = network.instance(&chain(SPOKE_A)).unwrap();
    assert_eq!(
        spoke.outbound(&receipt.message_id).unwrap().state,
        TransferState::Settled
    );
    assert_eq!(spoke.in_flight_amount(), U256::ZERO);
    assert_eq!(hub.in_flight_amount(), U256::ZERO);
}

#[test]
fn test_multihop_with_scaling_on_both_legs() {
    // A keeps two more decimals than the hub, C one fewer
    let mut network = hub_network(
        10_000,
        Scaling::new(2, true).unwrap(),
        Scaling::new(1, false).unwrap(),
    );
    fund_spoke(&mut network, 1_000);
    assert_eq!(network.get_balance(&chain(SPOKE_A), &alice()), u(100_000));

    let receipt = network
        .send(
            chain(SPOKE_A),
            alice(),
            intent(SPOKE_A, SPOKE_C, carol(), 50_099),
        )
        .unwrap();
    let deliveries = network.relay_all().unwrap();

    let at_hub = deliveries[0].receipt();
    assert_eq!(at_hub.scaled_amount, u(500));
    assert_eq!(at_hub.truncated, u(99));
    let at_spoke = deliveries[1].receipt();
    assert_eq!(at_spoke.scaled_amount, u(50));
    assert_eq!(at_spoke.truncated, U256::ZERO);
    assert_eq!(network.get_balance(&chain(SPOKE_C), &carol()), u(50));

    let report = verify_trace(&network.trace(&receipt).unwrap()).unwrap();
    assert!(report.settled);
    assert_eq!(report.hops[0].truncated, u(99));
    verify_source_escrow(network.instance(&chain(HUB)).unwrap()).unwrap();
}

#[test]
fn test_multihop_send_checks() {
    let mut network = hub_network(10_000, Scaling::IDENTITY, Scaling::IDENTITY);
    fund_spoke(&mut network, 1_000);
    let before = network.instance(&chain(SPOKE_A)).unwrap().clone();

    // Secondary fee must stay below what reaches the hub
    let err = network
        .send(
            chain(SPOKE_A),
            alice(),
            intent(SPOKE_A, SPOKE_C, carol(), 100).with_secondary_fee(u(100)),
        )
        .unwrap_err();
    assert_eq!(
        err,
        BridgeError::InsufficientAmount {
            amount: u(100),
            fee: u(100)
        }
    );

    // The second leg needs its own gas budget
    let err = network
        .send(
            chain(SPOKE_A),
            alice(),
            intent(SPOKE_A, SPOKE_C, carol(), 100).with_gas_limits(250_000, 0),
        )
        .unwrap_err();
    assert_eq!(err, BridgeError::InvalidGasLimit);

    // Cannot route back to itself through the hub
    let err = network
        .send(chain(SPOKE_A), alice(), intent(SPOKE_A, SPOKE_A, carol(), 100))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    assert_eq!(network.instance(&chain(SPOKE_A)).unwrap(), &before);
}

#[test]
fn test_forward_failure_leaves_hub_untouched() {
    // C has two fewer decimals, so small amounts vanish on the second leg
    let mut network = hub_network(10_000, Scaling::IDENTITY, Scaling::new(2, false).unwrap());
    fund_spoke(&mut network, 1_000);
    let hub_before = network.instance(&chain(HUB)).unwrap().clone();

    let receipt = network
        .send(
            chain(SPOKE_A),
            alice(),
            intent(SPOKE_A, SPOKE_C, carol(), 50),
        )
        .unwrap();
    let delivery = network.relay_next().unwrap().unwrap().into_receipt();
    assert!(network.relay().is_idle());

    assert!(delivery.is_failed());
    assert_eq!(delivery.failure_kind(), Some(ErrorKind::PrecisionLoss));
    assert!(delivery.forwarded.is_none());

    let hub = network.instance(&chain(HUB)).unwrap();
    assert_eq!(hub.ledger(), hub_before.ledger());
    assert_eq!(hub.pairing(&chain(SPOKE_A)), hub_before.pairing(&chain(SPOKE_A)));
    assert_eq!(hub.nonce(), hub_before.nonce());
    verify_source_escrow(hub).unwrap();

    // The sender sees the failure and the escrowed value is claimable once
    let spoke = network.instance(&chain(SPOKE_A)).unwrap();
    let record = spoke.outbound(&receipt.message_id).unwrap();
    assert_eq!(record.state, TransferState::Failed);
    assert_eq!(record.failure.as_ref().map(|f| f.kind), Some(ErrorKind::PrecisionLoss));

    let report = verify_trace(&network.trace(&receipt).unwrap()).unwrap();
    assert!(!report.settled);
    assert_eq!(report.in_flight, u(50));

    let hub = network.instance_mut(&chain(HUB)).unwrap();
    let claim = hub.claim_failure(&receipt.message_id).unwrap();
    assert_eq!(claim.origin_chain, chain(SPOKE_A));
    assert_eq!(claim.origin_sender, alice());
    assert_eq!(claim.escrowed, u(50));
    assert_eq!(
        hub.claim_failure(&receipt.message_id).unwrap_err(),
        BridgeError::FailureAlreadyClaimed {
            message_id: receipt.message_id
        }
    );
}

#[test]
fn test_routing_cycles_rejected() {
    let mut network = hub_network(10_000, Scaling::IDENTITY, Scaling::IDENTITY);
    fund_spoke(&mut network, 1_000);
    let mut relay = MemoryRelay::new();

    // Path already went through the hub
    let message = forged_message(SPOKE_A, HUB, SPOKE_C, carol(), 100, vec![SPOKE_A, HUB]);
    let hub = network.instance_mut(&chain(HUB)).unwrap();
    let delivery = hub.deliver(&message, &mut relay).unwrap();
    assert_eq!(delivery.receipt().failure_kind(), Some(ErrorKind::RoutingCycle));

    // Path already went through the next hop
    let mut message = forged_message(SPOKE_A, HUB, SPOKE_C, carol(), 100, vec![SPOKE_C, SPOKE_A]);
    message.message_id = MessageId::from_bytes([0xef; 32]);
    let delivery = hub.deliver(&message, &mut relay).unwrap();
    assert_eq!(delivery.receipt().failure_kind(), Some(ErrorKind::RoutingCycle));

    assert!(relay.is_idle());
    assert_eq!(hub.pairing(&chain(SPOKE_A)).unwrap().outstanding, u(1_000));
    assert_eq!(hub.pairing(&chain(SPOKE_C)).unwrap().outstanding, U256::ZERO);
    verify_source_escrow(hub).unwrap();
}

#[test]
fn test_destinations_cannot_pair_directly() {
    let mut network = hub_network(10_000, Scaling::IDENTITY, Scaling::IDENTITY);
    let err = network
        .pair(chain(SPOKE_A), chain(SPOKE_C), Scaling::IDENTITY)
        .unwrap_err();
    assert!(matches!(err, BridgeError::InvalidPairing { .. }));
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert!(network
        .instance(&chain(SPOKE_A))
        .unwrap()
        .pairing(&chain(SPOKE_C))
        .is_none());
    assert!(network
        .instance(&chain(SPOKE_C))
        .unwrap()
        .pairing(&chain(SPOKE_A))
        .is_none());

    // Spoke to spoke still goes through the hub and settles
    fund_spoke(&mut network, 1_000);
    let receipt = network
        .send(
            chain(SPOKE_A),
            alice(),
            intent(SPOKE_A, SPOKE_C, carol(), 100),
        )
        .unwrap();
    assert!(receipt.multihop);
    assert_eq!(receipt.destination_chain, chain(HUB));

    network.relay_all().unwrap();
    assert_eq!(network.get_balance(&chain(SPOKE_C), &carol()), u(100));
    assert_eq!(
        network.instance(&chain(SPOKE_A)).unwrap().in_flight_amount(),
        U256::ZERO
    );
}

//! Duplicate deliveries, rejected messages and durable state
//!
//! Run with: cargo test --test test_idempotency_and_failures

mod common;

use alloy_primitives::U256;
use common::*;
use token_bridge::{
    verify_source_escrow, verify_trace, BridgeError, BridgeEvent, BridgeInstance, ErrorKind,
    MemoryRelay, TransferState,
};

#[test]
fn test_redelivery_returns_prior_receipt() {
    let mut network = pair_network(1_000);
    let receipt = network
        .send(chain(HUB), alice(), intent(HUB, SPOKE_A, bob(), 300))
        .unwrap();
    let first = network.relay_all().unwrap().remove(0);
    let spoke_before = network.instance(&chain(SPOKE_A)).unwrap().clone();

    for _ in 0..3 {
        let again = network.redeliver(&receipt.message_id).unwrap();
        assert!(again.is_duplicate());
        assert_eq!(again.receipt(), first.receipt());
    }

    assert_eq!(network.get_balance(&chain(SPOKE_A), &bob()), u(300));
    assert_eq!(network.instance(&chain(SPOKE_A)).unwrap(), &spoke_before);
    assert!(network.is_processed(&chain(SPOKE_A), &receipt.message_id));

    // The sender already closed the transfer; confirming again changes nothing
    let hub = network.instance_mut(&chain(HUB)).unwrap();
    assert_eq!(
        hub.confirm_delivery(first.receipt()).unwrap(),
        TransferState::Settled
    );
}

#[test]
fn test_fee_equal_to_amount_rejected() {
    let mut network = pair_network(1_000);
    let before = network.instance(&chain(HUB)).unwrap().clone();

    let err = network
        .send(
            chain(HUB),
            alice(),
            intent(HUB, SPOKE_A, bob(), 400).with_primary_fee(token(HUB), u(400)),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientAmount);
    assert_eq!(network.instance(&chain(HUB)).unwrap(), &before);
    assert_eq!(network.get_balance(&chain(HUB), &alice()), u(1_000));
}

#[test]
fn test_unknown_source_fails_and_is_claimed_once() {
    let mut network = pair_network(1_000);
    let mut relay = MemoryRelay::new();
    let message = forged_message(7, SPOKE_A, SPOKE_A, bob(), 500, vec![7]);

    let spoke = network.instance_mut(&chain(SPOKE_A)).unwrap();
    let delivery = spoke.deliver(&message, &mut relay).unwrap();
    assert!(!delivery.is_duplicate());
    let receipt = delivery.into_receipt();
    assert_eq!(receipt.state, TransferState::Failed);
    assert_eq!(receipt.failure_kind(), Some(ErrorKind::UnknownPairing));
    assert_eq!(spoke.balance_of(&bob()), U256::ZERO);
    assert_eq!(spoke.total_supply(), U256::ZERO);
    assert!(matches!(
        spoke.events().last(),
        Some(BridgeEvent::DeliveryFailed { kind: ErrorKind::UnknownPairing, .. })
    ));

    let claim = spoke.claim_failure(&message.message_id).unwrap();
    assert_eq!(claim.source_chain, chain(7));
    assert_eq!(claim.escrowed, u(500));
    assert_eq!(claim.failure.kind, ErrorKind::UnknownPairing);
    assert_eq!(
        spoke.claim_failure(&message.message_id).unwrap_err(),
        BridgeError::FailureAlreadyClaimed {
            message_id: message.message_id
        }
    );

    // The failure is final; redelivery does not retry it
    let again = spoke.deliver(&message, &mut relay).unwrap();
    assert!(again.is_duplicate());
    assert!(again.receipt().claimed);
    assert!(relay.is_idle());
}

#[test]
fn test_claim_requires_failed_delivery() {
    let mut network = pair_network(1_000);
    let receipt = network
        .send(chain(HUB), alice(), intent(HUB, SPOKE_A, bob(), 300))
        .unwrap();
    network.relay_all().unwrap();

    let spoke = network.instance_mut(&chain(SPOKE_A)).unwrap();
    assert_eq!(
        spoke.claim_failure(&receipt.message_id).unwrap_err(),
        BridgeError::InvalidTransition {
            from: TransferState::Settled,
            to: TransferState::Failed
        }
    );
    let unknown = token_bridge::MessageId::from_bytes([0x42; 32]);
    assert_eq!(
        spoke.claim_failure(&unknown).unwrap_err(),
        BridgeError::TransferNotFound {
            message_id: unknown
        }
    );
}

#[test]
fn test_return_beyond_outstanding_rejected() {
    let mut network = pair_network(1_000);
    network
        .send(chain(HUB), alice(), intent(HUB, SPOKE_A, bob(), 300))
        .unwrap();
    network.relay_all().unwrap();

    // Only 300 was ever sent to A, so 500 cannot come back
    let mut relay = MemoryRelay::new();
    let message = forged_message(SPOKE_A, HUB, HUB, bob(), 500, vec![SPOKE_A]);
    let hub = network.instance_mut(&chain(HUB)).unwrap();
    let receipt = hub.deliver(&message, &mut relay).unwrap().into_receipt();

    assert_eq!(receipt.failure_kind(), Some(ErrorKind::InsufficientEscrow));
    assert_eq!(hub.escrow_balance(), u(300));
    assert_eq!(hub.balance_of(&bob()), U256::ZERO);
    verify_source_escrow(hub).unwrap();
}

#[test]
fn test_misaddressed_message_not_recorded() {
    let mut network = pair_network(1_000);
    let mut relay = MemoryRelay::new();
    let message = forged_message(SPOKE_A, SPOKE_A, HUB, bob(), 100, vec![SPOKE_A]);

    let hub = network.instance_mut(&chain(HUB)).unwrap();
    let err = hub.deliver(&message, &mut relay).unwrap_err();
    assert_eq!(
        err,
        BridgeError::WrongDestination {
            expected: contract(HUB),
            got: contract(SPOKE_A)
        }
    );
    assert!(!hub.is_processed(&message.message_id));
    assert!(hub.events().iter().all(|e| !matches!(e, BridgeEvent::DeliveryFailed { .. })));
}

#[test]
fn test_undelivered_transfer_stays_in_flight() {
    let mut network = pair_network(1_000);
    let receipt = network
        .send(
            chain(HUB),
            alice(),
            intent(HUB, SPOKE_A, bob(), 300).with_primary_fee(token(HUB), u(5)),
        )
        .unwrap();

    let hub = network.instance(&chain(HUB)).unwrap();
    assert_eq!(hub.in_flight_amount(), u(295));
    assert_eq!(
        hub.outbound(&receipt.message_id).unwrap().state,
        TransferState::MessageEmitted
    );
    verify_source_escrow(hub).unwrap();

    let trace = network.trace(&receipt).unwrap();
    assert!(!trace.is_complete());
    let report = verify_trace(&trace).unwrap();
    assert!(!report.settled);
    assert_eq!(report.in_flight, u(295));
    assert_eq!(network.get_balance(&chain(SPOKE_A), &bob()), U256::ZERO);
}

#[test]
fn test_snapshot_restore_resumes_transfers() {
    let mut network = pair_network(1_000);
    let receipt = network
        .send(chain(HUB), alice(), intent(HUB, SPOKE_A, bob(), 300))
        .unwrap();

    // Hub restarts with the transfer in flight
    let snapshot = network.instance(&chain(HUB)).unwrap().snapshot().unwrap();
    let restored = BridgeInstance::restore(&snapshot).unwrap();
    assert_eq!(&restored, network.instance(&chain(HUB)).unwrap());
    *network.instance_mut(&chain(HUB)).unwrap() = restored;

    network.relay_all().unwrap();
    assert_eq!(network.get_balance(&chain(SPOKE_A), &bob()), u(300));
    assert_eq!(
        network
            .instance(&chain(HUB))
            .unwrap()
            .outbound(&receipt.message_id)
            .unwrap()
            .state,
        TransferState::Settled
    );

    // Spoke restarts after settling; the processed set survives
    let snapshot = network.instance(&chain(SPOKE_A)).unwrap().snapshot().unwrap();
    *network.instance_mut(&chain(SPOKE_A)).unwrap() = BridgeInstance::restore(&snapshot).unwrap();
    assert!(network.redeliver(&receipt.message_id).unwrap().is_duplicate());
    assert_eq!(network.get_balance(&chain(SPOKE_A), &bob()), u(300));
}

#[test]
fn test_resume_reemits_unconfirmed_sends() {
    let mut network = pair_network(1_000);
    let delivered = network
        .send(chain(HUB), alice(), intent(HUB, SPOKE_A, bob(), 300))
        .unwrap();
    let lost = network
        .send(chain(HUB), alice(), intent(HUB, SPOKE_A, bob(), 200))
        .unwrap();

    // The first arrives but its confirmation never reaches the hub
    let message = network.relay_mut().pop().unwrap();
    assert_eq!(message.message_id, delivered.message_id);
    let mut side_relay = MemoryRelay::new();
    network
        .instance_mut(&chain(SPOKE_A))
        .unwrap()
        .deliver(&message, &mut side_relay)
        .unwrap();
    // The second is dropped with the queue
    assert!(network.relay_mut().pop().is_some());
    assert!(network.relay().is_idle());

    // Hub restarts from its snapshot with both sends still emitted
    let snapshot = network.instance(&chain(HUB)).unwrap().snapshot().unwrap();
    *network.instance_mut(&chain(HUB)).unwrap() = BridgeInstance::restore(&snapshot).unwrap();
    let mut unconfirmed = network.instance(&chain(HUB)).unwrap().unconfirmed();
    unconfirmed.sort();
    let mut expected = vec![delivered.message_id, lost.message_id];
    expected.sort();
    assert_eq!(unconfirmed, expected);

    assert_eq!(network.resume(chain(HUB)).unwrap(), 2);
    let deliveries = network.relay_all().unwrap();
    assert_eq!(deliveries.iter().filter(|d| d.is_duplicate()).count(), 1);

    assert_eq!(network.get_balance(&chain(SPOKE_A), &bob()), u(500));
    let hub = network.instance(&chain(HUB)).unwrap();
    for id in [delivered.message_id, lost.message_id] {
        assert_eq!(hub.outbound(&id).unwrap().state, TransferState::Settled);
    }
    assert_eq!(hub.in_flight_amount(), U256::ZERO);
    assert!(hub.unconfirmed().is_empty());
    assert_eq!(network.resume(chain(HUB)).unwrap(), 0);
}

#[test]
fn test_restore_rejects_bad_snapshots() {
    let err = BridgeInstance::restore("{ not json").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Snapshot);

    let network = pair_network(1_000);
    let snapshot = network.instance(&chain(HUB)).unwrap().snapshot().unwrap();
    let mut value: serde_json::Value = serde_json::from_str(&snapshot).unwrap();
    value["config"]["fee_collector"] = serde_json::json!(format!("{}", contract(HUB)));
    let err = BridgeInstance::restore(&value.to_string()).unwrap_err();
    assert!(matches!(err, BridgeError::InvalidConfig { .. }));
}

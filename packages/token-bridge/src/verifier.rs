//! Withdrawal/Balance Verifier
//!
//! Read-only checks over receipts and ledger state, used by integration tests
//! and audits. Nothing here is on the transfer path.
//!
//! # Per-hop rules
//!
//! For every hop of a [`TransferTrace`]:
//!
//! 1. `gross == primary_fee + net` on the sending side
//! 2. the message carried `net`, and the receiver scaled it with the inverse
//!    of the sender's scaling, losing exactly the truncation remainder
//! 3. on a settled final hop `reserve_consumed + secondary_fee + released == scaled`
//! 4. on a forwarded hop the onward send's gross equals the scaled amount
//!
//! Chained together these give conservation across the whole path, with each
//! amount expressed in the units of the chain it was taken on.

use std::collections::BTreeMap;

use alloy_primitives::{Address, U256};
use eyre::{eyre, Result};
use serde::{Deserialize, Serialize};

use crate::instance::BridgeInstance;
use crate::message::{DeliveryReceipt, SendReceipt};
use crate::types::{ChainId, MessageId, Role, TransferState};

/// One leg of a transfer: what was sent and what the next chain did with it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceHop {
    pub send: SendReceipt,
    pub delivery: Option<DeliveryReceipt>,
}

/// Every leg of a transfer, origin first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferTrace {
    pub hops: Vec<TraceHop>,
}

impl TransferTrace {
    /// Follow a transfer from its origin receipt
    ///
    /// `lookup` returns the delivery receipt recorded for a message ID, if
    /// the message has been delivered. Forwarded legs are taken from the
    /// onward send embedded in each delivery receipt.
    pub fn follow<F>(origin: &SendReceipt, lookup: F) -> Result<Self>
    where
        F: Fn(&ChainId, &MessageId) -> Option<DeliveryReceipt>,
    {
        let mut hops = Vec::new();
        let mut next = Some(origin.clone());
        while let Some(send) = next.take() {
            if hops.iter().any(|h: &TraceHop| h.send.message_id == send.message_id) {
                return Err(eyre!("Trace revisits message {}", send.message_id));
            }
            let delivery = lookup(&send.destination_chain, &send.message_id);
            next = delivery.as_ref().and_then(|d| d.forwarded.clone());
            hops.push(TraceHop { send, delivery });
        }
        Ok(Self { hops })
    }

    pub fn origin(&self) -> Option<&SendReceipt> {
        self.hops.first().map(|h| &h.send)
    }

    /// Receipt of the last delivered leg
    pub fn final_delivery(&self) -> Option<&DeliveryReceipt> {
        self.hops.last().and_then(|h| h.delivery.as_ref())
    }

    pub fn is_complete(&self) -> bool {
        self.final_delivery()
            .map_or(false, |d| d.is_settled() && d.forwarded.is_none())
    }
}

/// Re-derived amounts for one hop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HopReport {
    pub message_id: MessageId,
    pub from_chain: ChainId,
    pub to_chain: ChainId,
    /// Sender units
    pub gross: U256,
    pub primary_fee: U256,
    pub net: U256,
    pub truncated: U256,
    /// Receiver units
    pub scaled: U256,
    pub reserve_consumed: U256,
    pub secondary_fee: U256,
    pub released: U256,
    pub state: Option<TransferState>,
}

/// Outcome of [`verify_trace`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConservationReport {
    /// Gross amount debited at the origin, origin units
    pub origin_amount: U256,
    /// Paid to the recipient on the final chain, final-chain units
    pub final_released: U256,
    /// Fees withheld per chain, in that chain's units
    pub fees_by_chain: BTreeMap<ChainId, U256>,
    pub reserve_consumed: U256,
    pub hops: Vec<HopReport>,
    pub settled: bool,
    /// Net amount still escrowed on the sender of an undelivered or failed leg
    pub in_flight: U256,
}

/// Check every hop of `trace` and total it up
pub fn verify_trace(trace: &TransferTrace) -> Result<ConservationReport> {
    let origin = trace
        .origin()
        .ok_or_else(|| eyre!("Empty transfer trace"))?;

    let mut report = ConservationReport {
        origin_amount: origin.gross,
        final_released: U256::ZERO,
        fees_by_chain: BTreeMap::new(),
        reserve_consumed: U256::ZERO,
        hops: Vec::new(),
        settled: false,
        in_flight: U256::ZERO,
    };

    for (index, hop) in trace.hops.iter().enumerate() {
        let send = &hop.send;
        if send.primary_fee.checked_add(send.net) != Some(send.gross) {
            return Err(eyre!(
                "Hop {} ({}): gross {} != fee {} + net {}",
                index,
                send.message_id,
                send.gross,
                send.primary_fee,
                send.net
            ));
        }
        add_fee(&mut report, send.source_chain, send.primary_fee)?;

        let mut hop_report = HopReport {
            message_id: send.message_id,
            from_chain: send.source_chain,
            to_chain: send.destination_chain,
            gross: send.gross,
            primary_fee: send.primary_fee,
            net: send.net,
            truncated: U256::ZERO,
            scaled: U256::ZERO,
            reserve_consumed: U256::ZERO,
            secondary_fee: U256::ZERO,
            released: U256::ZERO,
            state: None,
        };

        let delivery = match &hop.delivery {
            Some(delivery) => delivery,
            None => {
                report.in_flight = send.net;
                report.hops.push(hop_report);
                break;
            }
        };
        hop_report.state = Some(delivery.state);

        if delivery.message_id != send.message_id || delivery.raw_amount != send.net {
            return Err(eyre!(
                "Hop {}: delivery {} carried {}, send {} escrowed {}",
                index,
                delivery.message_id,
                delivery.raw_amount,
                send.message_id,
                send.net
            ));
        }

        if delivery.is_failed() {
            report.in_flight = send.net;
            report.hops.push(hop_report);
            break;
        }

        if delivery.scaling != send.remote_scaling {
            return Err(eyre!(
                "Hop {}: receiver scaling {:?} is not the inverse of sender scaling {:?}",
                index,
                delivery.scaling,
                send.remote_scaling
            ));
        }
        let expected = delivery
            .scaling
            .apply_with_remainder(send.net)
            .map_err(|e| eyre!("Hop {}: {}", index, e))?;
        if expected.amount != delivery.scaled_amount || expected.remainder != delivery.truncated {
            return Err(eyre!(
                "Hop {}: expected scaled {} (truncated {}), receipt shows {} (truncated {})",
                index,
                expected.amount,
                expected.remainder,
                delivery.scaled_amount,
                delivery.truncated
            ));
        }

        hop_report.truncated = delivery.truncated;
        hop_report.scaled = delivery.scaled_amount;
        hop_report.reserve_consumed = delivery.reserve_consumed;
        hop_report.secondary_fee = delivery.secondary_fee;
        hop_report.released = delivery.released;

        match &delivery.forwarded {
            Some(onward) => {
                if onward.gross != delivery.scaled_amount {
                    return Err(eyre!(
                        "Hop {}: forwarded {} but received {}",
                        index,
                        onward.gross,
                        delivery.scaled_amount
                    ));
                }
                if !delivery.released.is_zero() || !delivery.reserve_consumed.is_zero() {
                    return Err(eyre!(
                        "Hop {}: forwarding hop paid out {} locally",
                        index,
                        delivery.released
                    ));
                }
            }
            None => {
                let accounted = delivery
                    .reserve_consumed
                    .checked_add(delivery.secondary_fee)
                    .and_then(|v| v.checked_add(delivery.released));
                if accounted != Some(delivery.scaled_amount) {
                    return Err(eyre!(
                        "Hop {}: reserve {} + fee {} + released {} != scaled {}",
                        index,
                        delivery.reserve_consumed,
                        delivery.secondary_fee,
                        delivery.released,
                        delivery.scaled_amount
                    ));
                }
                add_fee(&mut report, delivery.destination_chain, delivery.secondary_fee)?;
                report.reserve_consumed = delivery.reserve_consumed;
                report.final_released = delivery.released;
                report.settled = true;
            }
        }
        report.hops.push(hop_report);
    }

    // Without rescaling every amount is in one unit and must add up exactly
    let unscaled = report.hops.iter().all(|h| h.truncated.is_zero())
        && trace.hops.iter().all(|h| h.send.remote_scaling.is_identity());
    if unscaled {
        let total_fees = report
            .fees_by_chain
            .values()
            .try_fold(U256::ZERO, |acc, fee| acc.checked_add(*fee))
            .ok_or_else(|| eyre!("Fee total overflows"))?;
        let accounted = report
            .final_released
            .checked_add(total_fees)
            .and_then(|v| v.checked_add(report.reserve_consumed))
            .and_then(|v| v.checked_add(report.in_flight))
            .ok_or_else(|| eyre!("Conservation total overflows"))?;
        if accounted != report.origin_amount {
            return Err(eyre!(
                "Conservation violated: released {} + fees {} + reserve {} + in flight {} != sent {}",
                report.final_released,
                total_fees,
                report.reserve_consumed,
                report.in_flight,
                report.origin_amount
            ));
        }
    }

    Ok(report)
}

fn add_fee(report: &mut ConservationReport, chain: ChainId, fee: U256) -> Result<()> {
    let entry = report.fees_by_chain.entry(chain).or_insert(U256::ZERO);
    *entry = entry
        .checked_add(fee)
        .ok_or_else(|| eyre!("Fee total on chain {} overflows", chain))?;
    Ok(())
}

/// Compare a recipient's observed balance change against the trace
pub fn verify_recipient_delta(report: &ConservationReport, before: U256, after: U256) -> Result<()> {
    let delta = after
        .checked_sub(before)
        .ok_or_else(|| eyre!("Recipient balance decreased: {} -> {}", before, after))?;
    if delta != report.final_released {
        return Err(eyre!(
            "Recipient delta mismatch: expected {}, got {}",
            report.final_released,
            delta
        ));
    }
    Ok(())
}

/// Audit an instance's custody account
///
/// A source's escrow must equal what it has sent out and not received back.
/// A destination burns and mints, so its contract account must be empty.
pub fn verify_source_escrow(instance: &BridgeInstance) -> Result<()> {
    let escrow = instance.escrow_balance();
    match instance.role() {
        Role::Source => {
            let outstanding = instance.total_outstanding();
            if escrow != outstanding {
                return Err(eyre!(
                    "Escrow mismatch on chain {}: escrow {}, outstanding {}",
                    instance.chain_id(),
                    escrow,
                    outstanding
                ));
            }
        }
        Role::Destination => {
            if !escrow.is_zero() {
                return Err(eyre!(
                    "Destination {} holds {} in its contract account",
                    instance.chain_id(),
                    escrow
                ));
            }
        }
    }
    Ok(())
}

/// Assert an account's balance on an instance
pub fn assert_balance(instance: &BridgeInstance, account: &Address, expected: U256) -> Result<()> {
    let actual = instance.balance_of(account);
    if actual != expected {
        return Err(eyre!(
            "Balance mismatch for {} on chain {}: expected {}, got {}",
            account,
            instance.chain_id(),
            expected,
            actual
        ));
    }
    Ok(())
}

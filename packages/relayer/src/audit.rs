//! Post-run checks over every chain's final state

use alloy_primitives::U256;
use eyre::{Result, WrapErr};
use std::collections::BTreeMap;

use token_bridge::{
    verify_source_escrow, verify_trace, BridgeInstance, ChainId, SendReceipt, TransferTrace,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditSummary {
    pub transfers: usize,
    pub settled: usize,
    pub failed: usize,
    pub in_flight: usize,
    /// Paid to recipients, per final chain
    pub released: BTreeMap<ChainId, U256>,
    pub fees: BTreeMap<ChainId, U256>,
}

/// Check escrow on every chain and conservation along every transfer
pub fn audit(
    states: &BTreeMap<ChainId, BridgeInstance>,
    sends: &[SendReceipt],
) -> Result<AuditSummary> {
    for instance in states.values() {
        verify_source_escrow(instance)
            .wrap_err_with(|| format!("Escrow check failed on chain {}", instance.chain_id()))?;
    }

    let mut summary = AuditSummary {
        transfers: sends.len(),
        ..AuditSummary::default()
    };
    for send in sends {
        let trace = TransferTrace::follow(send, |chain, id| {
            states
                .get(chain)
                .and_then(|instance| instance.inbound(id))
                .cloned()
        })?;
        let report = verify_trace(&trace)
            .wrap_err_with(|| format!("Conservation check failed for {}", send.message_id))?;

        for (chain, fee) in &report.fees_by_chain {
            let total = summary.fees.entry(*chain).or_default();
            *total = total.saturating_add(*fee);
        }

        match trace.final_delivery() {
            Some(delivery) if report.settled => {
                summary.settled += 1;
                let total = summary
                    .released
                    .entry(delivery.destination_chain)
                    .or_default();
                *total = total.saturating_add(report.final_released);
            }
            Some(delivery) if delivery.is_failed() => summary.failed += 1,
            _ => summary.in_flight += 1,
        }
    }

    Ok(summary)
}

// Eligibility Filter - pure decision per candidate
//
// The decision carries the actuation mode so the actuator never re-derives
// create-vs-retry from metadata.

use crate::ledger::models::{SettlementKind, SettlementRecord};
use crate::provider::models::{is_failure_marker, is_payout_settled, is_refund_settled};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActuationMode {
    /// No provider object exists yet
    Create,
    /// A provider object exists and failed; act on the same id
    Retry { external_reference: String },
}

impl ActuationMode {
    pub fn is_retry(&self) -> bool {
        matches!(self, ActuationMode::Retry { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    AlreadyResolved,
    NoSourceCharge,
    /// Provider has the object in a non-terminal state we do not act on
    InFlight(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Actuate(ActuationMode),
    /// Settled at the provider but not locally; record resolution without acting
    Sync { status: String },
    Skip(SkipReason),
}

/// Payouts with a transfer on file are decided against the provider's live status
pub fn needs_live_status(record: &SettlementRecord) -> bool {
    record.kind == SettlementKind::Payout && !record.resolved && record.external_reference.is_some()
}

pub fn decide(record: &SettlementRecord, live_status: Option<&str>) -> Decision {
    match record.kind {
        SettlementKind::Payout => decide_payout(record, live_status),
        SettlementKind::Refund => decide_refund(record),
    }
}

fn decide_payout(record: &SettlementRecord, live_status: Option<&str>) -> Decision {
    if record.resolved {
        return Decision::Skip(SkipReason::AlreadyResolved);
    }

    let Some(reference) = &record.external_reference else {
        return Decision::Actuate(ActuationMode::Create);
    };

    let status = live_status.or(record.external_status.as_deref()).unwrap_or_default();
    if is_payout_settled(status) {
        Decision::Sync {
            status: status.to_string(),
        }
    } else if is_failure_marker(status) {
        Decision::Actuate(ActuationMode::Retry {
            external_reference: reference.clone(),
        })
    } else {
        Decision::Skip(SkipReason::InFlight(status.to_string()))
    }
}

fn decide_refund(record: &SettlementRecord) -> Decision {
    if record.resolved {
        return Decision::Skip(SkipReason::AlreadyResolved);
    }
    if record.source_charge.is_none() {
        return Decision::Skip(SkipReason::NoSourceCharge);
    }

    let Some(reference) = &record.external_reference else {
        return Decision::Actuate(ActuationMode::Create);
    };

    match record.external_status.as_deref() {
        Some(status) if is_failure_marker(status) => Decision::Actuate(ActuationMode::Retry {
            external_reference: reference.clone(),
        }),
        Some(status) if is_refund_settled(status) => Decision::Sync {
            status: status.to_string(),
        },
        other => Decision::Skip(SkipReason::InFlight(other.unwrap_or_default().to_string())),
    }
}

// Ledger Projector - writes actuation outcomes back onto the ledger record

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::error;

use super::actuator::Actuation;
use crate::error::LedgerError;
use crate::ledger::models::{ErrorLogEntry, MetadataPatch, SettlementKind, SettlementRecord};
use crate::ledger::LedgerService;
use crate::provider::models::{is_payout_settled, is_refund_settled, LOCAL_FAILURE};

fn is_settled(kind: SettlementKind, status: &str) -> bool {
    match kind {
        SettlementKind::Payout => is_payout_settled(status),
        SettlementKind::Refund => is_refund_settled(status),
    }
}

pub struct LedgerProjector {
    ledger: Arc<dyn LedgerService>,
}

impl LedgerProjector {
    pub fn new(ledger: Arc<dyn LedgerService>) -> Self {
        Self { ledger }
    }

    /// Persist status and timestamp; the provider id only when this was a create
    pub async fn project_success(
        &self,
        record: &SettlementRecord,
        actuation: &Actuation,
        now: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        let status = &actuation.outcome.status;

        let mut patch = MetadataPatch::new(record.kind);
        patch.status = Some(status.clone());
        patch.processed_at = Some(now);
        patch.resolved = Some(is_settled(record.kind, status));
        if record.external_reference.is_none() {
            patch.reference = actuation.new_reference().map(str::to_string);
        }

        self.ledger.update_metadata(record.id, patch.to_map()).await
    }

    /// Record a resolution observed at the provider, without any actuation
    pub async fn project_sync(&self, record: &SettlementRecord, status: &str) -> Result<(), LedgerError> {
        let mut patch = MetadataPatch::new(record.kind);
        patch.status = Some(status.to_string());
        patch.resolved = Some(true);

        self.ledger.update_metadata(record.id, patch.to_map()).await
    }

    /// Append to the record's error log and mark it failed at our layer.
    ///
    /// The new log is the previously stored log plus one entry. When the provider
    /// already accepted the action (`actuation` is set) the failure came after it,
    /// so the provider id and status are kept instead of the local failure marker.
    /// A failure to write any of it goes to the operator log only.
    pub async fn project_failure(
        &self,
        record: &SettlementRecord,
        message: &str,
        actuation: Option<&Actuation>,
        now: DateTime<Utc>,
    ) {
        let mut log = record.error_log.clone();
        log.push(ErrorLogEntry {
            date: now,
            error: message.to_string(),
        });

        let mut patch = MetadataPatch::new(record.kind);
        patch.error_log = Some(log);
        match actuation {
            Some(actuation) => {
                patch.status = Some(actuation.outcome.status.clone());
                if record.external_reference.is_none() {
                    patch.reference = actuation.new_reference().map(str::to_string);
                }
            }
            None => patch.status = Some(LOCAL_FAILURE.to_string()),
        }

        if let Err(e) = self.ledger.update_metadata(record.id, patch.to_map()).await {
            error!(
                "{}: Failed to update error metadata for {}: {}",
                record.kind.worker_name(),
                record.id,
                e
            );
        }
    }
}

// Settlement Actuator - performs the external action for one candidate
//
// Create requests carry a reference derived only from the ledger id, so a
// re-submission after a crash is deduplicated by the provider instead of
// moving funds twice.

use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::eligibility::ActuationMode;
use crate::error::SettlementError;
use crate::ledger::models::{SettlementKind, SettlementRecord};
use crate::provider::models::{ProviderOutcome, RefundRequest, TransferRequest};
use crate::provider::PaymentProvider;

/// Idempotency reference for creating the provider object of `id`
pub fn create_reference(kind: SettlementKind, id: Uuid) -> String {
    format!("{}_{}", kind.as_str(), id)
}

/// Normalized result of an actuation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actuation {
    pub mode: ActuationMode,
    pub outcome: ProviderOutcome,
}

impl Actuation {
    /// Provider id to persist; only a create may set it
    pub fn new_reference(&self) -> Option<&str> {
        match self.mode {
            ActuationMode::Create => Some(self.outcome.id.as_str()),
            ActuationMode::Retry { .. } => None,
        }
    }
}

pub struct SettlementActuator {
    provider: Arc<dyn PaymentProvider>,
    callback_url: String,
}

impl SettlementActuator {
    pub fn new(provider: Arc<dyn PaymentProvider>, callback_url: String) -> Self {
        Self {
            provider,
            callback_url,
        }
    }

    pub async fn actuate(
        &self,
        record: &SettlementRecord,
        mode: &ActuationMode,
    ) -> Result<Actuation, SettlementError> {
        let outcome = match (record.kind, mode) {
            (SettlementKind::Payout, ActuationMode::Create) => {
                let request = self.transfer_request(record)?;
                self.provider.create_transfer(&request).await?
            }
            (SettlementKind::Payout, ActuationMode::Retry { external_reference }) => {
                info!("Retrying failed transfer {} for {}", external_reference, record.id);
                self.provider.retry_transfer(external_reference).await?
            }
            (SettlementKind::Refund, ActuationMode::Create) => {
                let request = refund_request(record)?;
                self.provider.create_refund(&request).await?
            }
            (SettlementKind::Refund, ActuationMode::Retry { external_reference }) => {
                info!("Retrying failed refund {} for {}", external_reference, record.id);
                let request = refund_request(record)?;
                self.provider.retry_refund(external_reference, &request).await?
            }
        };

        Ok(Actuation {
            mode: mode.clone(),
            outcome,
        })
    }

    fn transfer_request(&self, record: &SettlementRecord) -> Result<TransferRequest, SettlementError> {
        let destination = record
            .payout_destination
            .as_ref()
            .filter(|d| d.is_complete())
            .ok_or(SettlementError::MissingPayoutDetails(record.id))?;

        Ok(TransferRequest {
            account_bank: destination.account_bank.clone().unwrap_or_default(),
            account_number: destination.account_number.clone().unwrap_or_default(),
            amount: record.amount.to_major(),
            currency: record.amount.currency.clone(),
            debit_currency: record.amount.currency.clone(),
            narration: format!("Payout for transaction {}", record.id),
            reference: create_reference(SettlementKind::Payout, record.id),
            callback_url: self.callback_url.clone(),
        })
    }
}

fn refund_request(record: &SettlementRecord) -> Result<RefundRequest, SettlementError> {
    let source_charge_id = record
        .source_charge
        .clone()
        .ok_or(SettlementError::MissingSourceCharge(record.id))?;

    Ok(RefundRequest {
        source_charge_id,
        amount: record.amount.to_major(),
        comments: format!("Refund for transaction {}", record.id),
        reference: create_reference(SettlementKind::Refund, record.id),
    })
}

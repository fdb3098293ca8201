use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Status the provider reports for settled payouts
pub const STATUS_SUCCESSFUL: &str = "SUCCESSFUL";
/// Accepted by the provider, settlement still in flight
pub const STATUS_PENDING: &str = "PENDING";
/// Provider-side failure, eligible for retry
pub const STATUS_FAILED: &str = "FAILED";
/// Written by the reconciler when the failure happened on our side
pub const LOCAL_FAILURE: &str = "failed";

/// Is `status` one of the failure markers, provider-cased or local
pub fn is_failure_marker(status: &str) -> bool {
    status == STATUS_FAILED || status == LOCAL_FAILURE
}

/// Payout statuses that need no further action
pub fn is_payout_settled(status: &str) -> bool {
    status == STATUS_SUCCESSFUL || status == STATUS_PENDING
}

/// Refund statuses come back lower-cased; anything but a failure counts
pub fn is_refund_settled(status: &str) -> bool {
    !is_failure_marker(status)
}

/// Create-transfer request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferRequest {
    pub account_bank: String,
    pub account_number: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub currency: String,
    pub debit_currency: String,
    pub narration: String,
    pub reference: String,
    pub callback_url: String,
}

/// Create-refund request against an original charge
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefundRequest {
    #[serde(skip)]
    pub source_charge_id: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub comments: String,
    pub reference: String,
}

/// Normalized provider answer for any settlement action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderOutcome {
    pub id: String,
    pub status: String,
}

/// Standard response envelope: `{ status, message, data }`
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    pub data: Option<T>,
}

#[derive(Debug, Deserialize)]
pub struct BalanceData {
    #[serde(with = "rust_decimal::serde::float")]
    pub available_balance: Decimal,
}

/// Transfer, retry and refund payloads all carry an id and a status
#[derive(Debug, Deserialize)]
pub struct ActionData {
    pub id: serde_json::Value,
    pub status: String,
}

impl ActionData {
    pub fn into_outcome(self) -> ProviderOutcome {
        let id = match self.id {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        ProviderOutcome {
            id,
            status: self.status,
        }
    }
}

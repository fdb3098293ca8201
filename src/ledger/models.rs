use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

use crate::error::LedgerError;

pub const STATE_PENDING_PAYMENT: &str = "state/pending-payment";
pub const STATE_PURCHASED: &str = "state/purchased";
pub const STATE_COMPLETED: &str = "state/completed";
pub const STATE_PAYMENT_EXPIRED: &str = "state/payment-expired";
pub const STATE_CANCELED: &str = "state/canceled";

/// Metadata key under which the checkout path stores the provider charge id
pub const SOURCE_CHARGE_KEY: &str = "flutterwaveTransactionId";

/// Which direction funds move for a record under reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettlementKind {
    Payout,
    Refund,
}

impl fmt::Display for SettlementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl SettlementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettlementKind::Payout => "payout",
            SettlementKind::Refund => "refund",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "payout" => Some(SettlementKind::Payout),
            "refund" => Some(SettlementKind::Refund),
            _ => None,
        }
    }

    /// Operator-facing prefix used on every log line
    pub fn worker_name(&self) -> &'static str {
        match self {
            SettlementKind::Payout => "PayoutWorker",
            SettlementKind::Refund => "RefundWorker",
        }
    }

    /// Ledger states whose transactions are candidates for this kind
    pub fn candidate_states(&self) -> Vec<String> {
        match self {
            SettlementKind::Payout => vec![STATE_COMPLETED.to_string()],
            SettlementKind::Refund => vec![
                STATE_PAYMENT_EXPIRED.to_string(),
                STATE_CANCELED.to_string(),
            ],
        }
    }

    pub fn keys(&self) -> MetadataKeys {
        match self {
            SettlementKind::Payout => MetadataKeys {
                reference: "transferId",
                status: "transferStatus",
                resolved: "transferred",
                processed_at: "transferProcessedAt",
                error_logs: "payoutErrorLogs",
            },
            SettlementKind::Refund => MetadataKeys {
                reference: "refundId",
                status: "refundStatus",
                resolved: "refunded",
                processed_at: "refundProcessedAt",
                error_logs: "refundErrorLogs",
            },
        }
    }
}

/// Ledger metadata keys used by one settlement kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetadataKeys {
    pub reference: &'static str,
    pub status: &'static str,
    pub resolved: &'static str,
    pub processed_at: &'static str,
    pub error_logs: &'static str,
}

/// Amount in minor units plus ISO currency code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    pub amount: i64,
    pub currency: String,
}

impl Money {
    pub fn new(amount: i64, currency: impl Into<String>) -> Self {
        Self {
            amount,
            currency: currency.into(),
        }
    }

    /// Provider APIs take major units
    pub fn to_major(&self) -> Decimal {
        Decimal::new(self.amount, 2)
    }
}

/// Bank details a provider user registered for payouts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutDestination {
    pub account_bank: Option<String>,
    pub account_number: Option<String>,
}

impl PayoutDestination {
    pub fn is_complete(&self) -> bool {
        let filled = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        filled(&self.account_bank) && filled(&self.account_number)
    }
}

/// Transaction as returned by the ledger, metadata still untyped
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub id: Uuid,
    pub state: String,
    pub created_at: DateTime<Utc>,
    pub last_transitioned_at: DateTime<Utc>,
    pub payout_total: Option<Money>,
    pub payin_total: Option<Money>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub payout_destination: Option<PayoutDestination>,
}

/// One page of a ledger query
#[derive(Debug, Clone)]
pub struct TransactionPage {
    pub records: Vec<LedgerTransaction>,
    pub total_pages: u32,
}

/// Entry in a record's append-only error log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorLogEntry {
    pub date: DateTime<Utc>,
    pub error: String,
}

/// Typed view of a ledger transaction under reconciliation
#[derive(Debug, Clone)]
pub struct SettlementRecord {
    pub id: Uuid,
    pub kind: SettlementKind,
    pub amount: Money,
    pub last_transitioned_at: DateTime<Utc>,
    pub external_reference: Option<String>,
    pub external_status: Option<String>,
    pub resolved: bool,
    pub error_log: Vec<ErrorLogEntry>,
    pub source_charge: Option<String>,
    pub payout_destination: Option<PayoutDestination>,
}

impl SettlementRecord {
    /// Validate metadata shape at the ledger-read boundary
    pub fn from_ledger(kind: SettlementKind, tx: &LedgerTransaction) -> Result<Self, LedgerError> {
        let invalid = |reason: String| LedgerError::InvalidRecord { id: tx.id, reason };
        let keys = kind.keys();

        let amount = match kind {
            SettlementKind::Payout => tx.payout_total.clone(),
            SettlementKind::Refund => tx.payin_total.clone(),
        }
        .ok_or_else(|| invalid(format!("missing {} total", kind)))?;

        let external_reference = id_like(&tx.metadata, keys.reference).map_err(&invalid)?;
        let source_charge = id_like(&tx.metadata, SOURCE_CHARGE_KEY).map_err(&invalid)?;

        let external_status = match tx.metadata.get(keys.status) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => return Err(invalid(format!("{} is not a string: {}", keys.status, other))),
        };

        let resolved = match tx.metadata.get(keys.resolved) {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(other) => return Err(invalid(format!("{} is not a bool: {}", keys.resolved, other))),
        };

        let error_log = match tx.metadata.get(keys.error_logs) {
            None | Some(Value::Null) => Vec::new(),
            Some(value) => serde_json::from_value(value.clone())
                .map_err(|e| invalid(format!("{} is malformed: {}", keys.error_logs, e)))?,
        };

        Ok(Self {
            id: tx.id,
            kind,
            amount,
            last_transitioned_at: tx.last_transitioned_at,
            external_reference,
            external_status,
            resolved,
            error_log,
            source_charge,
            payout_destination: tx.payout_destination.clone(),
        })
    }
}

/// Provider ids show up as strings or bare numbers depending on who wrote them
fn id_like(metadata: &Map<String, Value>, key: &str) -> Result<Option<String>, String> {
    match metadata.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(format!("{} is not an id: {}", key, other)),
    }
}

/// Partial metadata write, serialized with the kind's key vocabulary
#[derive(Debug, Clone)]
pub struct MetadataPatch {
    kind: SettlementKind,
    pub reference: Option<String>,
    pub status: Option<String>,
    pub resolved: Option<bool>,
    pub processed_at: Option<DateTime<Utc>>,
    pub error_log: Option<Vec<ErrorLogEntry>>,
}

impl MetadataPatch {
    pub fn new(kind: SettlementKind) -> Self {
        Self {
            kind,
            reference: None,
            status: None,
            resolved: None,
            processed_at: None,
            error_log: None,
        }
    }

    pub fn to_map(&self) -> Map<String, Value> {
        let keys = self.kind.keys();
        let mut map = Map::new();

        if let Some(reference) = &self.reference {
            map.insert(keys.reference.into(), Value::String(reference.clone()));
        }
        if let Some(status) = &self.status {
            map.insert(keys.status.into(), Value::String(status.clone()));
        }
        if let Some(resolved) = self.resolved {
            map.insert(keys.resolved.into(), Value::Bool(resolved));
        }
        if let Some(at) = self.processed_at {
            map.insert(keys.processed_at.into(), Value::String(at.to_rfc3339()));
        }
        if let Some(log) = &self.error_log {
            let entries = log
                .iter()
                .map(|e| serde_json::json!({ "date": e.date, "error": e.error }))
                .collect();
            map.insert(keys.error_logs.into(), Value::Array(entries));
        }

        map
    }
}

/// Named ledger transitions this service knows how to apply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerTransition {
    ConfirmPaymentViaWebhook,
}

impl LedgerTransition {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "transition/confirm-payment-via-webhook" => Some(Self::ConfirmPaymentViaWebhook),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::ConfirmPaymentViaWebhook => "transition/confirm-payment-via-webhook",
        }
    }

    /// Target state, or an error when the transition does not start from `state`
    pub fn apply(&self, state: &str) -> Result<&'static str, LedgerError> {
        match (self, state) {
            (Self::ConfirmPaymentViaWebhook, STATE_PENDING_PAYMENT) => Ok(STATE_PURCHASED),
            _ => Err(LedgerError::InvalidTransition {
                transition: self.name().to_string(),
                state: state.to_string(),
            }),
        }
    }
}

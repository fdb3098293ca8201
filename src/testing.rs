// In-memory ledger and scripted provider shared by unit tests

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use uuid::Uuid;

use crate::config::WorkerConfig;
use crate::error::{LedgerError, ProviderError};
use crate::ledger::models::*;
use crate::ledger::LedgerService;
use crate::provider::models::{ProviderOutcome, RefundRequest, TransferRequest};
use crate::provider::PaymentProvider;

pub fn destination() -> PayoutDestination {
    PayoutDestination {
        account_bank: Some("044".into()),
        account_number: Some("0690000031".into()),
    }
}

/// Ledger transaction whose transition time increases with `seq`
pub fn ledger_tx(state: &str, seq: i64) -> LedgerTransaction {
    let base = Utc::now() - ChronoDuration::days(1);
    LedgerTransaction {
        id: Uuid::new_v4(),
        state: state.to_string(),
        created_at: base,
        last_transitioned_at: base + ChronoDuration::minutes(seq),
        payout_total: Some(Money::new(150_000, "NGN")),
        payin_total: Some(Money::new(150_000, "NGN")),
        metadata: Map::new(),
        payout_destination: Some(destination()),
    }
}

pub fn record(kind: SettlementKind) -> SettlementRecord {
    SettlementRecord {
        id: Uuid::new_v4(),
        kind,
        amount: Money::new(150_000, "NGN"),
        last_transitioned_at: Utc::now(),
        external_reference: None,
        external_status: None,
        resolved: false,
        error_log: Vec::new(),
        source_charge: None,
        payout_destination: Some(destination()),
    }
}

pub fn worker_config() -> WorkerConfig {
    WorkerConfig {
        enabled: true,
        schedule: "hourly:00".into(),
        run_on_startup: false,
        created_at_start: Utc::now() - ChronoDuration::days(30),
        page_size: 2,
        candidate_timeout_secs: 5,
    }
}

#[derive(Default)]
struct LedgerState {
    transactions: Vec<LedgerTransaction>,
    failing_pages: HashSet<u32>,
    failing_writes: HashSet<Uuid>,
    transient_write_failures: usize,
    write_delay: Option<Duration>,
    page_requests: usize,
}

#[derive(Default)]
pub struct InMemoryLedger {
    state: Mutex<LedgerState>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, tx: LedgerTransaction) {
        self.state.lock().transactions.push(tx);
    }

    /// Stores a bare transaction carrying the record's id and kind total
    pub fn insert_record(&self, record: &SettlementRecord) {
        let mut tx = ledger_tx(STATE_COMPLETED, 0);
        tx.id = record.id;
        self.insert(tx);
    }

    pub fn metadata(&self, id: Uuid) -> Map<String, Value> {
        self.state
            .lock()
            .transactions
            .iter()
            .find(|t| t.id == id)
            .map(|t| t.metadata.clone())
            .unwrap_or_default()
    }

    pub fn fail_page(&self, page: u32) {
        self.state.lock().failing_pages.insert(page);
    }

    pub fn fail_writes_for(&self, id: Uuid) {
        self.state.lock().failing_writes.insert(id);
    }

    /// The next `count` metadata writes fail, whatever record they target
    pub fn fail_next_writes(&self, count: usize) {
        self.state.lock().transient_write_failures = count;
    }

    pub fn delay_writes(&self, delay: Duration) {
        self.state.lock().write_delay = Some(delay);
    }

    pub fn page_requests(&self) -> usize {
        self.state.lock().page_requests
    }
}

#[async_trait]
impl LedgerService for InMemoryLedger {
    async fn list_transactions(
        &self,
        states: &[String],
        created_at_start: chrono::DateTime<Utc>,
        page: u32,
        per_page: u32,
    ) -> Result<TransactionPage, LedgerError> {
        let mut state = self.state.lock();
        state.page_requests += 1;
        if state.failing_pages.contains(&page) {
            return Err(LedgerError::Query(format!("page {} unavailable", page)));
        }

        let matching: Vec<_> = state
            .transactions
            .iter()
            .filter(|t| states.contains(&t.state) && t.created_at >= created_at_start)
            .cloned()
            .collect();

        let per_page = per_page.max(1) as usize;
        let total_pages = matching.len().div_ceil(per_page).max(1) as u32;
        let records = matching
            .into_iter()
            .skip((page.saturating_sub(1) as usize) * per_page)
            .take(per_page)
            .collect();

        Ok(TransactionPage { records, total_pages })
    }

    async fn update_metadata(&self, id: Uuid, patch: Map<String, Value>) -> Result<(), LedgerError> {
        let delay = self.state.lock().write_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        if state.transient_write_failures > 0 {
            state.transient_write_failures -= 1;
            return Err(LedgerError::Write {
                id,
                message: "transient".into(),
            });
        }
        if state.failing_writes.contains(&id) {
            return Err(LedgerError::Write {
                id,
                message: "ledger unavailable".into(),
            });
        }

        let tx = state
            .transactions
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(LedgerError::NotFound(id))?;
        tx.metadata.extend(patch);
        Ok(())
    }

    async fn transition(
        &self,
        id: Uuid,
        transition: &str,
        _params: Value,
    ) -> Result<LedgerTransaction, LedgerError> {
        let mut state = self.state.lock();
        let tx = state
            .transactions
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(LedgerError::NotFound(id))?;

        let next = LedgerTransition::from_name(transition)
            .ok_or_else(|| LedgerError::InvalidTransition {
                transition: transition.to_string(),
                state: tx.state.clone(),
            })?
            .apply(&tx.state)?;
        tx.state = next.to_string();
        tx.last_transitioned_at = Utc::now();
        Ok(tx.clone())
    }
}

/// Per-operation call counters
#[derive(Debug, Clone, Default)]
pub struct ProviderCalls {
    pub balance: usize,
    pub create_transfer: usize,
    pub retry_transfer: usize,
    pub transfer_status: usize,
    pub create_refund: usize,
    pub retry_refund: usize,
}

#[derive(Default)]
struct ProviderState {
    balances: HashMap<String, Decimal>,
    statuses: HashMap<String, String>,
    failures: HashMap<String, ProviderError>,
    /// Create references already accepted
    references: HashSet<String>,
    transfers: Vec<TransferRequest>,
    refunds: Vec<RefundRequest>,
    retried: Vec<String>,
    last_outcome: Option<ProviderOutcome>,
    calls: ProviderCalls,
    unauthorized: bool,
    delay: Option<Duration>,
    next_id: u64,
}

/// Scripted provider; created transfers draw down the balance and a create
/// reference is accepted once, like the real provider
#[derive(Default)]
pub struct FakeProvider {
    state: Mutex<ProviderState>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_balance(&self, currency: &str, amount: Decimal) {
        self.state.lock().balances.insert(currency.to_string(), amount);
    }

    pub fn set_transfer_status(&self, transfer_id: &str, status: &str) {
        self.state
            .lock()
            .statuses
            .insert(transfer_id.to_string(), status.to_string());
    }

    /// Fail any create for the record `id`, payout or refund
    pub fn fail_transfer_for(&self, id: Uuid, error: ProviderError) {
        let mut state = self.state.lock();
        for kind in [SettlementKind::Payout, SettlementKind::Refund] {
            state
                .failures
                .insert(crate::settlement::actuator::create_reference(kind, id), error.clone());
        }
    }

    pub fn set_unauthorized(&self) {
        self.state.lock().unauthorized = true;
    }

    pub fn set_delay(&self, delay: Duration) {
        self.state.lock().delay = Some(delay);
    }

    pub fn calls(&self) -> ProviderCalls {
        self.state.lock().calls.clone()
    }

    pub fn transfers(&self) -> Vec<TransferRequest> {
        self.state.lock().transfers.clone()
    }

    pub fn refunds(&self) -> Vec<RefundRequest> {
        self.state.lock().refunds.clone()
    }

    pub fn retried(&self) -> Vec<String> {
        self.state.lock().retried.clone()
    }

    pub fn last_outcome(&self) -> Option<ProviderOutcome> {
        self.state.lock().last_outcome.clone()
    }

    async fn enter(&self) -> Result<(), ProviderError> {
        let delay = self.state.lock().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.state.lock().unauthorized {
            return Err(ProviderError::Unauthorized);
        }
        Ok(())
    }
}

fn duplicate_reference(reference: &str) -> ProviderError {
    ProviderError::Http {
        status: 400,
        message: format!("Duplicate reference {}", reference),
    }
}

#[async_trait]
impl PaymentProvider for FakeProvider {
    async fn balance(&self, currency: &str) -> Result<Decimal, ProviderError> {
        self.enter().await?;
        let mut state = self.state.lock();
        state.calls.balance += 1;
        Ok(state.balances.get(currency).copied().unwrap_or(Decimal::ZERO))
    }

    async fn create_transfer(&self, request: &TransferRequest) -> Result<ProviderOutcome, ProviderError> {
        self.enter().await?;
        let mut state = self.state.lock();
        state.calls.create_transfer += 1;
        if let Some(error) = state.failures.get(&request.reference) {
            return Err(error.clone());
        }
        if !state.references.insert(request.reference.clone()) {
            return Err(duplicate_reference(&request.reference));
        }

        state.next_id += 1;
        let outcome = ProviderOutcome {
            id: (190_000 + state.next_id).to_string(),
            status: "NEW".into(),
        };
        state.statuses.insert(outcome.id.clone(), outcome.status.clone());
        if let Some(balance) = state.balances.get_mut(&request.currency) {
            *balance -= request.amount;
        }
        state.transfers.push(request.clone());
        state.last_outcome = Some(outcome.clone());
        Ok(outcome)
    }

    async fn retry_transfer(&self, transfer_id: &str) -> Result<ProviderOutcome, ProviderError> {
        self.enter().await?;
        let mut state = self.state.lock();
        state.calls.retry_transfer += 1;
        state.retried.push(transfer_id.to_string());
        Ok(ProviderOutcome {
            id: format!("{}-retry-{}", transfer_id, state.calls.retry_transfer),
            status: "NEW".into(),
        })
    }

    async fn transfer_status(&self, transfer_id: &str) -> Result<String, ProviderError> {
        self.enter().await?;
        let mut state = self.state.lock();
        state.calls.transfer_status += 1;
        state
            .statuses
            .get(transfer_id)
            .cloned()
            .ok_or_else(|| ProviderError::Http {
                status: 404,
                message: format!("Transfer {} not found", transfer_id),
            })
    }

    async fn create_refund(&self, request: &RefundRequest) -> Result<ProviderOutcome, ProviderError> {
        self.enter().await?;
        let mut state = self.state.lock();
        state.calls.create_refund += 1;
        if let Some(error) = state.failures.get(&request.reference) {
            return Err(error.clone());
        }
        if !state.references.insert(request.reference.clone()) {
            return Err(duplicate_reference(&request.reference));
        }

        state.next_id += 1;
        let outcome = ProviderOutcome {
            id: format!("rf_{}", state.next_id),
            status: "completed".into(),
        };
        state.refunds.push(request.clone());
        state.last_outcome = Some(outcome.clone());
        Ok(outcome)
    }

    async fn retry_refund(
        &self,
        refund_id: &str,
        _request: &RefundRequest,
    ) -> Result<ProviderOutcome, ProviderError> {
        self.enter().await?;
        let mut state = self.state.lock();
        state.calls.retry_refund += 1;
        state.retried.push(refund_id.to_string());
        Ok(ProviderOutcome {
            id: refund_id.to_string(),
            status: "completed".into(),
        })
    }
}

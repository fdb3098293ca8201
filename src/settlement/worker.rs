use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

use super::actuator::{Actuation, SettlementActuator};
use super::balance::{BalanceCheck, BalanceGate};
use super::eligibility::{decide, needs_live_status, ActuationMode, Decision, SkipReason};
use super::lister::CandidateLister;
use super::projector::LedgerProjector;
use crate::config::WorkerConfig;
use crate::error::SettlementError;
use crate::ledger::models::{SettlementKind, SettlementRecord};
use crate::ledger::LedgerService;
use crate::provider::PaymentProvider;

/// What happened to one candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateOutcome {
    Actuated(ActuationMode),
    Synced,
    /// Not enough provider balance, picked up again next run
    Deferred,
    Skipped(SkipReason),
}

/// Summary of a single run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub kind: SettlementKind,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub candidates: usize,
    pub actuated: usize,
    pub synced: usize,
    pub deferred: usize,
    pub skipped: usize,
    pub invalid: usize,
    pub failed: usize,
}

impl RunReport {
    fn begin(kind: SettlementKind) -> Self {
        Self {
            kind,
            started_at: Utc::now(),
            finished_at: None,
            candidates: 0,
            actuated: 0,
            synced: 0,
            deferred: 0,
            skipped: 0,
            invalid: 0,
            failed: 0,
        }
    }

    fn count(&mut self, outcome: &CandidateOutcome) {
        match outcome {
            CandidateOutcome::Actuated(_) => self.actuated += 1,
            CandidateOutcome::Synced => self.synced += 1,
            CandidateOutcome::Deferred => self.deferred += 1,
            CandidateOutcome::Skipped(_) => self.skipped += 1,
        }
    }

    fn finish(mut self) -> Self {
        self.finished_at = Some(Utc::now());
        self
    }
}

/// One reconciliation pipeline: list, filter, gate, actuate, project
pub struct ReconciliationWorker {
    kind: SettlementKind,
    lister: CandidateLister,
    provider: Arc<dyn PaymentProvider>,
    balance_gate: Option<BalanceGate>,
    actuator: SettlementActuator,
    projector: LedgerProjector,
    created_at_start: DateTime<Utc>,
    candidate_timeout: Duration,
}

impl ReconciliationWorker {
    pub fn new(
        kind: SettlementKind,
        config: &WorkerConfig,
        ledger: Arc<dyn LedgerService>,
        provider: Arc<dyn PaymentProvider>,
        callback_url: String,
    ) -> Self {
        let balance_gate = match kind {
            SettlementKind::Payout => Some(BalanceGate::new(provider.clone())),
            SettlementKind::Refund => None,
        };

        Self {
            kind,
            lister: CandidateLister::new(ledger.clone(), config.page_size),
            provider: provider.clone(),
            balance_gate,
            actuator: SettlementActuator::new(provider, callback_url),
            projector: LedgerProjector::new(ledger),
            created_at_start: config.created_at_start,
            candidate_timeout: Duration::from_secs(config.candidate_timeout_secs),
        }
    }

    pub fn kind(&self) -> SettlementKind {
        self.kind
    }

    /// Process every candidate once, oldest first and strictly one at a time.
    ///
    /// Per-candidate failures land in that record's error log and the run moves on.
    /// Only fatal errors (ledger query, provider credentials) end the run early.
    #[instrument(skip(self), fields(worker = self.kind.worker_name()))]
    pub async fn run(&self) -> Result<RunReport, SettlementError> {
        let name = self.kind.worker_name();
        info!("{}: Checking for transactions needing {}...", name, self.kind);

        let mut report = RunReport::begin(self.kind);
        let transactions = self
            .lister
            .list(&self.kind.candidate_states(), self.created_at_start)
            .await?;
        report.candidates = transactions.len();

        if transactions.is_empty() {
            info!("{}: No pending {}s found.", name, self.kind);
            return Ok(report.finish());
        }

        info!("{}: Found {} candidate transactions.", name, transactions.len());

        for tx in &transactions {
            let record = match SettlementRecord::from_ledger(self.kind, tx) {
                Ok(record) => record,
                Err(e) => {
                    warn!("{}: Skipping unreadable transaction {}: {}", name, tx.id, e);
                    report.invalid += 1;
                    continue;
                }
            };

            // Survives the timeout, so a provider action that already happened is never forgotten
            let mut actuated = None;
            let result = match tokio::time::timeout(
                self.candidate_timeout,
                self.process(&record, &mut actuated),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(SettlementError::Timeout(self.candidate_timeout)),
            };

            match result {
                Ok(outcome) => report.count(&outcome),
                Err(e) if e.is_fatal() => {
                    error!("{}: Aborting run at {}: {}", name, record.id, e);
                    if actuated.is_some() {
                        self.projector
                            .project_failure(&record, &e.to_string(), actuated.as_ref(), Utc::now())
                            .await;
                    }
                    return Err(e);
                }
                Err(e) => {
                    error!("{}: Failed to process {} for {}: {}", name, self.kind, record.id, e);
                    self.projector
                        .project_failure(&record, &e.to_string(), actuated.as_ref(), Utc::now())
                        .await;
                    report.failed += 1;
                }
            }
        }

        let report = report.finish();
        info!(
            "{}: Finished. actuated={} synced={} deferred={} skipped={} invalid={} failed={}",
            name,
            report.actuated,
            report.synced,
            report.deferred,
            report.skipped,
            report.invalid,
            report.failed
        );
        Ok(report)
    }

    /// `actuated` is filled as soon as the provider accepts the action, before projection
    async fn process(
        &self,
        record: &SettlementRecord,
        actuated: &mut Option<Actuation>,
    ) -> Result<CandidateOutcome, SettlementError> {
        let name = self.kind.worker_name();

        let live_status = match (&record.external_reference, needs_live_status(record)) {
            (Some(reference), true) => Some(self.provider.transfer_status(reference).await?),
            _ => None,
        };

        let mode = match decide(record, live_status.as_deref()) {
            Decision::Skip(reason) => return Ok(CandidateOutcome::Skipped(reason)),
            Decision::Sync { status } => {
                info!("{}: {} for {} is already {}.", name, self.kind, record.id, status);
                self.projector.project_sync(record, &status).await?;
                return Ok(CandidateOutcome::Synced);
            }
            Decision::Actuate(mode) => mode,
        };

        if let Some(gate) = &self.balance_gate {
            let required = record.amount.to_major();
            if let BalanceCheck::Insufficient { .. } = gate.check(&record.amount.currency, required).await? {
                return Ok(CandidateOutcome::Deferred);
            }
        }

        let actuation = actuated.insert(self.actuator.actuate(record, &mode).await?);
        self.projector
            .project_success(record, actuation, Utc::now())
            .await?;

        info!(
            "{}: Successfully {} {} for {}. Provider id: {}, status: {}",
            name,
            if mode.is_retry() { "retried" } else { "initiated" },
            self.kind,
            record.id,
            actuation.outcome.id,
            actuation.outcome.status
        );

        Ok(CandidateOutcome::Actuated(mode))
    }
}

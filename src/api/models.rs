use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::ledger::models::SettlementKind;
use crate::settlement::guard::WorkerState;
use crate::settlement::RunReport;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub workers: Vec<WorkerStatus>,
}

/// Per-worker status
#[derive(Debug, Serialize)]
pub struct WorkerStatus {
    pub kind: SettlementKind,
    pub name: String,
    pub state: WorkerState,
    pub schedule: String,
    pub last_report: Option<RunReport>,
}

#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub kind: SettlementKind,
    pub state: WorkerState,
    pub message: String,
}

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use super::models::*;
use crate::{
    error::{AppError, AppResult},
    ledger::models::SettlementKind,
    settlement::{TriggerOutcome, WorkerScheduler},
};

#[derive(Clone)]
pub struct AppState {
    /// Enabled workers only
    pub schedulers: Arc<BTreeMap<SettlementKind, Arc<WorkerScheduler>>>,
}

impl AppState {
    fn scheduler(&self, kind: &str) -> AppResult<&Arc<WorkerScheduler>> {
        SettlementKind::parse(kind)
            .and_then(|kind| self.schedulers.get(&kind))
            .ok_or_else(|| AppError::NotFound(format!("No enabled worker '{}'", kind)))
    }

    fn worker_statuses(&self) -> Vec<WorkerStatus> {
        self.schedulers
            .values()
            .map(|scheduler| WorkerStatus {
                kind: scheduler.kind(),
                name: scheduler.kind().worker_name().to_string(),
                state: scheduler.state(),
                schedule: scheduler.cadence().to_string(),
                last_report: scheduler.last_report(),
            })
            .collect()
    }
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> AppResult<Json<HealthResponse>> {
    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now(),
        workers: state.worker_statuses(),
    }))
}

/// GET /api/v1/workers
pub async fn list_workers(State(state): State<AppState>) -> AppResult<Json<Vec<WorkerStatus>>> {
    Ok(Json(state.worker_statuses()))
}

/// POST /api/v1/workers/:kind/trigger - start a run now, unless one is in flight
pub async fn trigger_worker(
    State(state): State<AppState>,
    Path(kind): Path<String>,
) -> AppResult<(StatusCode, Json<TriggerResponse>)> {
    let scheduler = state.scheduler(&kind)?;
    let name = scheduler.kind().worker_name();

    match scheduler.trigger() {
        TriggerOutcome::Started(_) => {
            info!("{}: Manual run requested", name);
            Ok((
                StatusCode::ACCEPTED,
                Json(TriggerResponse {
                    kind: scheduler.kind(),
                    state: scheduler.state(),
                    message: format!("{} run started", name),
                }),
            ))
        }
        TriggerOutcome::Skipped => Err(AppError::WorkerBusy(name.to_string())),
    }
}

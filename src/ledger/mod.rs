// Ledger service boundary - the system of record for marketplace transactions
pub mod models;
pub mod repository;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::LedgerError;
use models::{LedgerTransaction, TransactionPage};

/// Operations the reconciler consumes from the ledger
///
/// INVARIANTS:
/// - `update_metadata` merges keys into the stored metadata, never replaces it
/// - pages are 1-based
#[async_trait]
pub trait LedgerService: Send + Sync {
    async fn list_transactions(
        &self,
        states: &[String],
        created_at_start: DateTime<Utc>,
        page: u32,
        per_page: u32,
    ) -> Result<TransactionPage, LedgerError>;

    async fn update_metadata(&self, id: Uuid, patch: Map<String, Value>) -> Result<(), LedgerError>;

    /// Used by the payment confirmation path, not by the reconciler
    // The workers only read states and merge metadata
    #[allow(dead_code)]
    async fn transition(
        &self,
        id: Uuid,
        transition: &str,
        params: Value,
    ) -> Result<LedgerTransaction, LedgerError>;
}

// Candidate Lister - pages through the ledger for one run
//
// Every run starts from page 1; nothing is carried over between runs.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use crate::error::LedgerError;
use crate::ledger::{models::LedgerTransaction, LedgerService};

/// Pagination state scoped to a single listing pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconciliationCursor {
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
}

impl ReconciliationCursor {
    pub fn new(page_size: u32) -> Self {
        Self {
            page: 1,
            page_size: page_size.max(1),
            total_pages: 1,
        }
    }

    pub fn has_more(&self) -> bool {
        self.page <= self.total_pages
    }
}

pub struct CandidateLister {
    ledger: Arc<dyn LedgerService>,
    page_size: u32,
}

impl CandidateLister {
    pub fn new(ledger: Arc<dyn LedgerService>, page_size: u32) -> Self {
        Self { ledger, page_size }
    }

    /// Every transaction in `states` created at or after `created_at_start`,
    /// oldest `last_transitioned_at` first.
    ///
    /// Any failed page fails the whole listing; a partial set would let newer
    /// candidates jump the queue for balance.
    pub async fn list(
        &self,
        states: &[String],
        created_at_start: DateTime<Utc>,
    ) -> Result<Vec<LedgerTransaction>, LedgerError> {
        let mut cursor = ReconciliationCursor::new(self.page_size);
        let mut seen = HashSet::new();
        let mut candidates = Vec::new();

        while cursor.has_more() {
            let page = self
                .ledger
                .list_transactions(states, created_at_start, cursor.page, cursor.page_size)
                .await
                .map_err(|e| match e {
                    LedgerError::Query(_) => e,
                    other => LedgerError::Query(other.to_string()),
                })?;

            debug!(
                "Fetched ledger page {}/{} ({} records)",
                cursor.page,
                page.total_pages,
                page.records.len()
            );

            for tx in page.records {
                if seen.insert(tx.id) {
                    candidates.push(tx);
                }
            }

            cursor.total_pages = page.total_pages;
            cursor.page += 1;
        }

        sort_oldest_first(&mut candidates);
        Ok(candidates)
    }
}

/// Stable, so equal timestamps keep ledger order
pub fn sort_oldest_first(candidates: &mut [LedgerTransaction]) {
    candidates.sort_by_key(|tx| tx.last_transitioned_at);
}

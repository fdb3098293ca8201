use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::{prelude::FromRow, types::Json, PgPool};
use tracing::{debug, info};
use uuid::Uuid;

use super::models::*;
use super::LedgerService;
use crate::error::LedgerError;

const SELECT_TRANSACTION: &str = r#"
    SELECT
        t.id, t.state, t.created_at, t.last_transitioned_at,
        t.currency, t.payout_total_minor, t.payin_total_minor, t.metadata,
        pa.account_bank, pa.account_number
    FROM ledger_transactions t
    LEFT JOIN payout_accounts pa ON pa.provider_id = t.provider_id
"#;

#[derive(Debug, FromRow)]
struct TransactionRow {
    id: Uuid,
    state: String,
    created_at: DateTime<Utc>,
    last_transitioned_at: DateTime<Utc>,
    currency: String,
    payout_total_minor: Option<i64>,
    payin_total_minor: Option<i64>,
    metadata: Json<Map<String, Value>>,
    account_bank: Option<String>,
    account_number: Option<String>,
}

impl From<TransactionRow> for LedgerTransaction {
    fn from(row: TransactionRow) -> Self {
        let payout_destination = if row.account_bank.is_some() || row.account_number.is_some() {
            Some(PayoutDestination {
                account_bank: row.account_bank,
                account_number: row.account_number,
            })
        } else {
            None
        };

        LedgerTransaction {
            id: row.id,
            state: row.state,
            created_at: row.created_at,
            last_transitioned_at: row.last_transitioned_at,
            payout_total: row.payout_total_minor.map(|a| Money::new(a, row.currency.clone())),
            payin_total: row.payin_total_minor.map(|a| Money::new(a, row.currency.clone())),
            metadata: row.metadata.0,
            payout_destination,
        }
    }
}

/// Postgres-backed ledger - the source of truth for transaction state
pub struct PgLedger {
    pub pool: PgPool,
}

impl PgLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // Only reached through `transition`
    #[allow(dead_code)]
    async fn get_transaction(&self, id: Uuid) -> Result<LedgerTransaction, LedgerError> {
        let sql = format!("{} WHERE t.id = $1", SELECT_TRANSACTION);
        sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| LedgerError::Query(e.to_string()))?
            .map(LedgerTransaction::from)
            .ok_or(LedgerError::NotFound(id))
    }
}

/// Number of pages needed for `total` rows, never less than one
fn page_count(total: i64, per_page: u32) -> u32 {
    let per_page = i64::from(per_page.max(1));
    (((total.max(0) + per_page - 1) / per_page).max(1)) as u32
}

#[async_trait]
impl LedgerService for PgLedger {
    async fn list_transactions(
        &self,
        states: &[String],
        created_at_start: DateTime<Utc>,
        page: u32,
        per_page: u32,
    ) -> Result<TransactionPage, LedgerError> {
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM ledger_transactions
            WHERE state = ANY($1) AND created_at >= $2
            "#,
        )
        .bind(states)
        .bind(created_at_start)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| LedgerError::Query(e.to_string()))?;

        // Stable order by id so page boundaries do not shift between fetches
        let sql = format!(
            "{} WHERE t.state = ANY($1) AND t.created_at >= $2 ORDER BY t.id LIMIT $3 OFFSET $4",
            SELECT_TRANSACTION
        );
        let offset = i64::from(page.saturating_sub(1)) * i64::from(per_page);
        let rows = sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(states)
            .bind(created_at_start)
            .bind(i64::from(per_page))
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| LedgerError::Query(e.to_string()))?;

        debug!("Ledger page {} returned {} of {} rows", page, rows.len(), total);

        Ok(TransactionPage {
            records: rows.into_iter().map(LedgerTransaction::from).collect(),
            total_pages: page_count(total, per_page),
        })
    }

    async fn update_metadata(&self, id: Uuid, patch: Map<String, Value>) -> Result<(), LedgerError> {
        let result = sqlx::query(
            r#"
            UPDATE ledger_transactions
            SET metadata = metadata || $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(Json(patch))
        .execute(&self.pool)
        .await
        .map_err(|e| LedgerError::Write {
            id,
            message: e.to_string(),
        })?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::NotFound(id));
        }

        Ok(())
    }

    async fn transition(
        &self,
        id: Uuid,
        transition: &str,
        params: Value,
    ) -> Result<LedgerTransaction, LedgerError> {
        let current = self.get_transaction(id).await?;
        let next_state = LedgerTransition::from_name(transition)
            .ok_or_else(|| LedgerError::InvalidTransition {
                transition: transition.to_string(),
                state: current.state.clone(),
            })?
            .apply(&current.state)?;

        // Guard on the observed state so a concurrent transition loses cleanly
        let result = sqlx::query(
            r#"
            UPDATE ledger_transactions
            SET state = $3, last_transitioned_at = NOW(), updated_at = NOW(),
                transition_params = $4
            WHERE id = $1 AND state = $2
            "#,
        )
        .bind(id)
        .bind(&current.state)
        .bind(next_state)
        .bind(Json(params))
        .execute(&self.pool)
        .await
        .map_err(|e| LedgerError::Write {
            id,
            message: e.to_string(),
        })?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::InvalidTransition {
                transition: transition.to_string(),
                state: current.state,
            });
        }

        info!("Ledger transaction {} moved to {} via {}", id, next_state, transition);

        self.get_transaction(id).await
    }
}

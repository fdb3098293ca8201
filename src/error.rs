use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Top-level error type for the reconciler process
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Settlement error: {0}")]
    Settlement(#[from] SettlementError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Worker already running: {0}")]
    WorkerBusy(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors raised by the ledger service
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Ledger query failed: {0}")]
    Query(String),

    #[error("Ledger write failed for {id}: {message}")]
    Write { id: Uuid, message: String },

    #[error("Transaction not found: {0}")]
    NotFound(Uuid),

    #[error("Transaction {id} has an invalid shape: {reason}")]
    InvalidRecord { id: Uuid, reason: String },

    #[error("Transition {transition} not allowed from {state}")]
    InvalidTransition { transition: String, state: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Errors raised by the payment provider client
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    #[error("Provider rejected credentials")]
    Unauthorized,

    #[error("Provider responded {status}: {message}")]
    Http { status: u16, message: String },

    #[error("No response received from provider: {0}")]
    Transport(String),

    #[error("Unexpected provider response: {0}")]
    Decode(String),
}

/// Errors raised while settling a single candidate
#[derive(Error, Debug)]
pub enum SettlementError {
    #[error("Provider payout details missing or incomplete for {0}")]
    MissingPayoutDetails(Uuid),

    #[error("No source charge recorded for {0}")]
    MissingSourceCharge(Uuid),

    #[error("Provider call failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("Ledger call failed: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Candidate processing timed out after {0:?}")]
    Timeout(Duration),
}

impl SettlementError {
    /// Run-level failures abort the whole run instead of being logged on the record.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SettlementError::Provider(ProviderError::Unauthorized)
                | SettlementError::Ledger(LedgerError::Query(_))
                | SettlementError::Ledger(LedgerError::Database(_))
        )
    }
}

/// API error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code) = match &self {
            AppError::WorkerBusy(_) => (StatusCode::CONFLICT, "WORKER_BUSY"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            AppError::Provider(ProviderError::Unauthorized) => {
                (StatusCode::BAD_GATEWAY, "PROVIDER_UNAUTHORIZED")
            }
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        let body = Json(ErrorResponse {
            error: self.to_string(),
            error_code: error_code.to_string(),
        });

        (status, body).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(error: sqlx::Error) -> Self {
        AppError::Ledger(LedgerError::Database(error))
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(error: sqlx::migrate::MigrateError) -> Self {
        AppError::Internal(format!("Migration error: {:?}", error))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(error: config::ConfigError) -> Self {
        AppError::Config(error.to_string())
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            return ProviderError::Decode(error.to_string());
        }
        match error.status() {
            Some(status) if status.as_u16() == 401 => ProviderError::Unauthorized,
            Some(status) => ProviderError::Http {
                status: status.as_u16(),
                message: error.to_string(),
            },
            None => ProviderError::Transport(error.to_string()),
        }
    }
}

/// Result type alias for the application
pub type AppResult<T> = Result<T, AppError>;

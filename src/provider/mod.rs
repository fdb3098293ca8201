// Payment provider boundary - executes transfers and refunds
pub mod flutterwave;
pub mod models;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::error::ProviderError;
use models::{ProviderOutcome, RefundRequest, TransferRequest};

/// Settlement actions the reconciler needs from a payment provider
///
/// SECURITY: `create_*` calls carry a reference derived from the ledger id.
/// Providers must reject a second create with the same reference.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Available balance for `currency`, major units
    async fn balance(&self, currency: &str) -> Result<Decimal, ProviderError>;

    async fn create_transfer(&self, request: &TransferRequest) -> Result<ProviderOutcome, ProviderError>;

    /// Re-attempt a failed transfer under its existing id
    async fn retry_transfer(&self, transfer_id: &str) -> Result<ProviderOutcome, ProviderError>;

    /// Current status of an existing transfer
    async fn transfer_status(&self, transfer_id: &str) -> Result<String, ProviderError>;

    async fn create_refund(&self, request: &RefundRequest) -> Result<ProviderOutcome, ProviderError>;

    /// Re-attempt a failed refund that already has a provider id
    async fn retry_refund(
        &self,
        refund_id: &str,
        request: &RefundRequest,
    ) -> Result<ProviderOutcome, ProviderError>;
}

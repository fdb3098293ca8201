// Balance Gate - payout worker only

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::warn;

use crate::error::ProviderError;
use crate::provider::PaymentProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceCheck {
    Sufficient,
    Insufficient { available: Decimal, required: Decimal },
}

pub struct BalanceGate {
    provider: Arc<dyn PaymentProvider>,
}

impl BalanceGate {
    pub fn new(provider: Arc<dyn PaymentProvider>) -> Self {
        Self { provider }
    }

    /// Queries the live balance on every call so earlier payouts in the same run are reflected
    pub async fn check(&self, currency: &str, required: Decimal) -> Result<BalanceCheck, ProviderError> {
        let available = self.provider.balance(currency).await?;

        if available < required {
            warn!(
                "Insufficient balance for {}. Available: {}, Required: {}",
                currency, available, required
            );
            return Ok(BalanceCheck::Insufficient { available, required });
        }

        Ok(BalanceCheck::Sufficient)
    }
}

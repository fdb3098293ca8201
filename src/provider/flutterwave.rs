use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, instrument};

use super::models::*;
use super::PaymentProvider;
use crate::config::FlutterwaveConfig;
use crate::error::{AppError, AppResult, ProviderError};

/// Flutterwave v3 REST client
pub struct FlutterwaveClient {
    client: Client,
    base_url: String,
    secret_key: String,
}

impl FlutterwaveClient {
    pub fn new(config: &FlutterwaveConfig) -> AppResult<Self> {
        if config.secret_key.trim().is_empty() {
            return Err(AppError::Config("Flutterwave secret key is not configured".into()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| AppError::Config(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            secret_key: config.secret_key.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ProviderError> {
        let response = request
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(ProviderError::Unauthorized);
        }

        if !status.is_success() {
            // Prefer the provider's own message over the HTTP reason phrase
            let message = response
                .json::<Envelope<serde_json::Value>>()
                .await
                .ok()
                .and_then(|e| e.message)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());
            return Err(ProviderError::Http {
                status: status.as_u16(),
                message,
            });
        }

        let envelope: Envelope<T> = response.json().await?;
        debug!("Flutterwave responded {} ({:?})", status, envelope.status);
        envelope
            .data
            .ok_or_else(|| ProviderError::Decode(envelope.message.unwrap_or_else(|| "missing data".into())))
    }
}

#[async_trait]
impl PaymentProvider for FlutterwaveClient {
    #[instrument(skip(self))]
    async fn balance(&self, currency: &str) -> Result<Decimal, ProviderError> {
        let data: BalanceData = self
            .send(self.client.get(self.url(&format!("/balances/{}", currency))))
            .await?;
        Ok(data.available_balance)
    }

    #[instrument(skip(self, request), fields(reference = %request.reference))]
    async fn create_transfer(&self, request: &TransferRequest) -> Result<ProviderOutcome, ProviderError> {
        let data: ActionData = self
            .send(self.client.post(self.url("/transfers")).json(request))
            .await?;
        Ok(data.into_outcome())
    }

    #[instrument(skip(self))]
    async fn retry_transfer(&self, transfer_id: &str) -> Result<ProviderOutcome, ProviderError> {
        let data: ActionData = self
            .send(
                self.client
                    .post(self.url(&format!("/transfers/{}/retries", transfer_id)))
                    .json(&serde_json::json!({})),
            )
            .await?;
        Ok(data.into_outcome())
    }

    #[instrument(skip(self))]
    async fn transfer_status(&self, transfer_id: &str) -> Result<String, ProviderError> {
        let data: ActionData = self
            .send(self.client.get(self.url(&format!("/transfers/{}", transfer_id))))
            .await?;
        Ok(data.status)
    }

    #[instrument(skip(self, request), fields(charge = %request.source_charge_id))]
    async fn create_refund(&self, request: &RefundRequest) -> Result<ProviderOutcome, ProviderError> {
        let path = format!("/transactions/{}/refund", request.source_charge_id);
        let data: ActionData = self
            .send(self.client.post(self.url(&path)).json(request))
            .await?;
        Ok(data.into_outcome())
    }

    /// Flutterwave has no refund retry endpoint. The refund is re-submitted on the
    /// same charge under the same reference, which the provider deduplicates.
    #[instrument(skip(self, request), fields(charge = %request.source_charge_id))]
    async fn retry_refund(
        &self,
        refund_id: &str,
        request: &RefundRequest,
    ) -> Result<ProviderOutcome, ProviderError> {
        debug!("Re-submitting refund {} on charge {}", refund_id, request.source_charge_id);
        self.create_refund(request).await
    }
}

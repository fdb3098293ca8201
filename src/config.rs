use chrono::{DateTime, Utc};
use config::{Environment, Map as ConfigMap, Value as ConfigValue};
use serde::Deserialize;

use crate::ledger::models::SettlementKind;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_address: String,
    /// Public root of the marketplace, used to build the payout callback URL
    pub marketplace_root_url: String,
    pub flutterwave: FlutterwaveConfig,
    pub payout: WorkerConfig,
    pub refund: WorkerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FlutterwaveConfig {
    pub secret_key: String,
    pub base_url: String,
    pub request_timeout_secs: u64,
}

/// Per-worker schedule and scan settings
#[derive(Debug, Deserialize, Clone)]
pub struct WorkerConfig {
    pub enabled: bool,
    /// Cadence expression, e.g. `hourly:30`, `daily:02`, `every:15m`
    pub schedule: String,
    pub run_on_startup: bool,
    /// Transactions created before this instant are never scanned
    pub created_at_start: DateTime<Utc>,
    pub page_size: u32,
    pub candidate_timeout_secs: u64,
}

impl Config {
    /// Defaults, then `RECONCILER__*` environment (e.g. `RECONCILER__PAYOUT__SCHEDULE`)
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder()
            .set_default("database_url", "postgresql://localhost/reconciler")?
            .set_default("bind_address", "0.0.0.0:8080")?
            .set_default("marketplace_root_url", "http://localhost:3000")?
            .set_default("flutterwave.secret_key", "")?
            .set_default("flutterwave.base_url", "https://api.flutterwave.com/v3")?
            .set_default("flutterwave.request_timeout_secs", 30)?
            .set_default("payout", worker_defaults(SettlementKind::Payout))?
            .set_default("refund", worker_defaults(SettlementKind::Refund))?
            .add_source(
                Environment::with_prefix("RECONCILER")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        // Conventional names win over the prefixed ones when both are set
        if let Ok(url) = std::env::var("DATABASE_URL") {
            builder = builder.set_override("database_url", url)?;
        }
        if let Ok(key) = std::env::var("FLUTTERWAVE_SECRET_KEY") {
            builder = builder.set_override("flutterwave.secret_key", key)?;
        }

        builder.build()?.try_deserialize()
    }

    pub fn worker(&self, kind: SettlementKind) -> &WorkerConfig {
        match kind {
            SettlementKind::Payout => &self.payout,
            SettlementKind::Refund => &self.refund,
        }
    }

    pub fn payout_callback_url(&self) -> String {
        format!(
            "{}/api/payments/payout-webhook",
            self.marketplace_root_url.trim_end_matches('/')
        )
    }
}

/// Payout fires on the hour and refund on the half hour so they never hit the provider together
fn worker_defaults(kind: SettlementKind) -> ConfigMap<String, ConfigValue> {
    let (schedule, created_at_start) = match kind {
        SettlementKind::Payout => ("hourly:00", "2025-12-26T07:14:00Z"),
        SettlementKind::Refund => ("hourly:30", "2025-12-26T06:59:00Z"),
    };

    let mut map = ConfigMap::new();
    map.insert("enabled".into(), true.into());
    map.insert("schedule".into(), schedule.into());
    map.insert("run_on_startup".into(), false.into());
    map.insert("created_at_start".into(), created_at_start.into());
    map.insert("page_size".into(), 100_i64.into());
    map.insert("candidate_timeout_secs".into(), 60_i64.into());
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_staggered() {
        let config = Config::from_env().unwrap();

        assert_eq!(config.worker(SettlementKind::Payout).page_size, 100);
        assert_ne!(config.payout.schedule, config.refund.schedule);
        assert!(config.refund.created_at_start < config.payout.created_at_start);
    }

    #[test]
    fn test_callback_url() {
        let mut config = Config::from_env().unwrap();
        config.marketplace_root_url = "https://market.example/".into();
        assert_eq!(
            config.payout_callback_url(),
            "https://market.example/api/payments/payout-webhook"
        );
    }
}

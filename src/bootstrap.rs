use std::{collections::BTreeMap, sync::Arc, time::Duration};
use sqlx::{PgPool, postgres::PgPoolOptions};
use tracing::{info, warn};
use crate::{
    api::handler::AppState,
    config::Config,
    error::AppResult,
    ledger::{LedgerService, models::SettlementKind, repository::PgLedger},
    provider::{PaymentProvider, flutterwave::FlutterwaveClient},
    settlement::{ReconciliationWorker, WorkerScheduler},
};

pub async fn initialize_app_state(config: &Config) -> AppResult<AppState> {
    info!("Initializing application components ...");

    // Database pool
    let pool = initialize_database(&config.database_url).await?;

    // Core components
    let ledger: Arc<dyn LedgerService> = Arc::new(PgLedger::new(pool));

    let provider: Arc<dyn PaymentProvider> = Arc::new(FlutterwaveClient::new(&config.flutterwave)?);
    info!("✅ Flutterwave client initialized: {}", config.flutterwave.base_url);

    let callback_url = config.payout_callback_url();
    let mut schedulers = BTreeMap::new();

    for kind in [SettlementKind::Payout, SettlementKind::Refund] {
        let name = kind.worker_name();
        let worker_config = config.worker(kind);
        if !worker_config.enabled {
            warn!("⚠️  {} disabled by configuration", name);
            continue;
        }

        let worker = ReconciliationWorker::new(
            kind,
            worker_config,
            ledger.clone(),
            provider.clone(),
            callback_url.clone(),
        );
        let scheduler = Arc::new(WorkerScheduler::new(Arc::new(worker), worker_config)?);
        info!(
            "✅ {} registered (schedule: {}, scanning from {})",
            name,
            scheduler.cadence(),
            worker_config.created_at_start
        );
        schedulers.insert(kind, scheduler);
    }

    // Start background schedulers
    for scheduler in schedulers.values() {
        scheduler.start();
    }
    info!("✅ {} worker scheduler(s) started", schedulers.len());

    Ok(AppState {
        schedulers: Arc::new(schedulers),
    })
}

async fn initialize_database(database_url: &str) -> AppResult<PgPool> {
    info!("📊 Connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await?;

    info!("✓ Database pool configured: 10 max connections");

    // Run migrations
    info!("🔄 Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;

    info!("✓ Database initialized");
    Ok(pool)
}

// Worker Scheduler - fires reconciliation runs on a cadence
//
// Cadence strings:
// - "hourly" / "hourly:MM"   once an hour at minute MM (default :00)
// - "daily:HH" / "daily:HH:MM"
// - "every:<n>s|m|h"         fixed interval
//
// A firing that lands while the previous run is still going is skipped, not queued.

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Timelike, Utc};
use parking_lot::RwLock;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{error, info, warn};

use super::guard::{RunGuard, RunPermit, WorkerState};
use super::worker::{ReconciliationWorker, RunReport};
use crate::config::WorkerConfig;
use crate::error::{AppError, AppResult};
use crate::ledger::models::SettlementKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    Hourly { minute: u32 },
    Daily { hour: u32, minute: u32 },
    Every(Duration),
}

impl Cadence {
    /// First firing strictly after `now`
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match *self {
            Cadence::Hourly { minute } => {
                let slot = now
                    .date_naive()
                    .and_hms_opt(now.hour(), minute, 0)
                    .map(|naive| Utc.from_utc_datetime(&naive));
                match slot {
                    Some(slot) if slot > now => slot,
                    Some(slot) => slot + ChronoDuration::hours(1),
                    None => now + ChronoDuration::hours(1),
                }
            }
            Cadence::Daily { hour, minute } => {
                let slot = now
                    .date_naive()
                    .and_hms_opt(hour, minute, 0)
                    .map(|naive| Utc.from_utc_datetime(&naive));
                // If execution time has passed today, schedule for tomorrow
                match slot {
                    Some(slot) if slot > now => slot,
                    Some(slot) => slot + ChronoDuration::days(1),
                    None => now + ChronoDuration::days(1),
                }
            }
            Cadence::Every(interval) => {
                now + ChronoDuration::from_std(interval).unwrap_or_else(|_| ChronoDuration::hours(1))
            }
        }
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cadence::Hourly { minute } => write!(f, "hourly:{:02}", minute),
            Cadence::Daily { hour, minute } => write!(f, "daily:{:02}:{:02}", hour, minute),
            Cadence::Every(interval) => write!(f, "every:{}s", interval.as_secs()),
        }
    }
}

fn parse_field(value: &str, max: u32, schedule: &str) -> AppResult<u32> {
    value
        .parse::<u32>()
        .ok()
        .filter(|v| *v <= max)
        .ok_or_else(|| AppError::Config(format!("Invalid schedule '{}'", schedule)))
}

impl FromStr for Cadence {
    type Err = AppError;

    fn from_str(schedule: &str) -> Result<Self, Self::Err> {
        let invalid = || AppError::Config(format!("Invalid schedule '{}'", schedule));
        let parts: Vec<&str> = schedule.trim().split(':').collect();

        match parts.as_slice() {
            ["hourly"] => Ok(Cadence::Hourly { minute: 0 }),
            ["hourly", minute] => Ok(Cadence::Hourly {
                minute: parse_field(minute, 59, schedule)?,
            }),
            ["daily", hour] => Ok(Cadence::Daily {
                hour: parse_field(hour, 23, schedule)?,
                minute: 0,
            }),
            ["daily", hour, minute] => Ok(Cadence::Daily {
                hour: parse_field(hour, 23, schedule)?,
                minute: parse_field(minute, 59, schedule)?,
            }),
            ["every", interval] => {
                let (count, unit_secs) = [("s", 1u64), ("m", 60), ("h", 3600)]
                    .iter()
                    .find_map(|(unit, secs)| interval.strip_suffix(unit).map(|count| (count, *secs)))
                    .ok_or_else(invalid)?;
                let count: u64 = count.parse().ok().filter(|c| *c > 0).ok_or_else(invalid)?;
                Ok(Cadence::Every(Duration::from_secs(count.saturating_mul(unit_secs))))
            }
            _ => Err(invalid()),
        }
    }
}

#[derive(Debug)]
pub enum TriggerOutcome {
    Started(JoinHandle<()>),
    /// A run was already in flight
    Skipped,
}

/// Owns one worker's cadence, run guard and last report
pub struct WorkerScheduler {
    worker: Arc<ReconciliationWorker>,
    cadence: Cadence,
    run_on_startup: bool,
    guard: Arc<RunGuard>,
    last_report: Arc<RwLock<Option<RunReport>>>,
}

impl WorkerScheduler {
    pub fn new(worker: Arc<ReconciliationWorker>, config: &WorkerConfig) -> AppResult<Self> {
        Ok(Self {
            worker,
            cadence: config.schedule.parse()?,
            run_on_startup: config.run_on_startup,
            guard: Arc::new(RunGuard::new()),
            last_report: Arc::new(RwLock::new(None)),
        })
    }

    pub fn kind(&self) -> SettlementKind {
        self.worker.kind()
    }

    pub fn cadence(&self) -> Cadence {
        self.cadence
    }

    pub fn state(&self) -> WorkerState {
        self.guard.state()
    }

    pub fn last_report(&self) -> Option<RunReport> {
        self.last_report.read().clone()
    }

    /// Start the scheduler loop (runs in background)
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let scheduler = self.clone();

        tokio::spawn(async move {
            let name = scheduler.kind().worker_name();
            if scheduler.run_on_startup {
                info!("{}: Running on startup", name);
                scheduler.trigger();
            }

            loop {
                let now = Utc::now();
                let next = scheduler.cadence.next_after(now);
                info!("{}: Next run scheduled for {} UTC", name, next.format("%Y-%m-%d %H:%M:%S"));

                let wait = next.signed_duration_since(now).to_std().unwrap_or(Duration::ZERO);
                tokio::time::sleep(wait).await;

                scheduler.trigger();
            }
        })
    }

    /// Start a run unless one is already in flight.
    ///
    /// The permit lives inside the run task, so the guard goes back to idle
    /// however the run ends.
    pub fn trigger(&self) -> TriggerOutcome {
        let name = self.kind().worker_name();
        let Some(permit) = RunPermit::acquire(&self.guard) else {
            warn!("{}: Job is already running. Skipping this run.", name);
            return TriggerOutcome::Skipped;
        };

        let worker = self.worker.clone();
        let run = tokio::spawn(async move {
            let _permit = permit;
            worker.run().await
        });

        let last_report = self.last_report.clone();
        let handle = tokio::spawn(async move {
            match run.await {
                Ok(Ok(report)) => *last_report.write() = Some(report),
                Ok(Err(e)) => error!("{}: Critical error during run: {}", name, e),
                Err(e) => error!("{}: Run aborted: {}", name, e),
            }
        });

        TriggerOutcome::Started(handle)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, Timelike};
    use rust_decimal_macros::dec;

    use super::*;
    use crate::ledger::models::STATE_COMPLETED;
    use crate::testing::{ledger_tx, worker_config, FakeProvider, InMemoryLedger};

    fn scheduler(ledger: &Arc<InMemoryLedger>, provider: &Arc<FakeProvider>) -> WorkerScheduler {
        let config = worker_config();
        let worker = ReconciliationWorker::new(
            SettlementKind::Payout,
            &config,
            ledger.clone(),
            provider.clone(),
            "https://market.example/api/payments/payout-webhook".into(),
        );
        WorkerScheduler::new(Arc::new(worker), &config).unwrap()
    }

    #[test]
    fn test_calculate_next_execution() {
        // Current time: 2024-01-01 10:20:00 UTC
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 10, 20, 0).unwrap();

        let next = Cadence::Hourly { minute: 30 }.next_after(now);
        assert_eq!((next.hour(), next.minute()), (10, 30));

        // Minute 00 already passed this hour
        let next = Cadence::Hourly { minute: 0 }.next_after(now);
        assert_eq!((next.hour(), next.minute()), (11, 0));

        let next = Cadence::Daily { hour: 14, minute: 0 }.next_after(now);
        assert_eq!((next.day(), next.hour()), (1, 14));

        // 09:00 already passed, so tomorrow
        let next = Cadence::Daily { hour: 9, minute: 0 }.next_after(now);
        assert_eq!((next.day(), next.hour()), (2, 9));

        let next = Cadence::Every(Duration::from_secs(90)).next_after(now);
        assert_eq!((next.minute(), next.second()), (21, 30));
    }

    #[test]
    fn test_firing_exactly_on_slot_moves_to_next() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        let next = Cadence::Hourly { minute: 0 }.next_after(now);
        assert_eq!(next.hour(), 11);
    }

    #[test]
    fn test_parse_cadence() {
        assert_eq!("hourly".parse::<Cadence>().unwrap(), Cadence::Hourly { minute: 0 });
        assert_eq!("hourly:30".parse::<Cadence>().unwrap(), Cadence::Hourly { minute: 30 });
        assert_eq!(
            "daily:2".parse::<Cadence>().unwrap(),
            Cadence::Daily { hour: 2, minute: 0 }
        );
        assert_eq!(
            "daily:23:45".parse::<Cadence>().unwrap(),
            Cadence::Daily { hour: 23, minute: 45 }
        );
        assert_eq!(
            "every:15m".parse::<Cadence>().unwrap(),
            Cadence::Every(Duration::from_secs(900))
        );

        assert_eq!("daily:2".parse::<Cadence>().unwrap().to_string(), "daily:02:00");

        for bad in ["", "hourly:60", "daily:24", "every:0s", "every:5d", "weekly", "0 * * * *"] {
            assert!(matches!(bad.parse::<Cadence>(), Err(AppError::Config(_))), "{}", bad);
        }
    }

    #[test]
    fn test_non_ascii_interval_is_rejected() {
        for bad in ["every:5é", "every:é", "every:", "every:s", "every:5 m"] {
            assert!(matches!(bad.parse::<Cadence>(), Err(AppError::Config(_))), "{}", bad);
        }
        assert_eq!(
            "every:2h".parse::<Cadence>().unwrap(),
            Cadence::Every(Duration::from_secs(7200))
        );
    }

    #[tokio::test]
    async fn test_overlapping_trigger_is_skipped() {
        let ledger = Arc::new(InMemoryLedger::new());
        let provider = Arc::new(FakeProvider::new());
        provider.set_balance("NGN", dec!(1_000_000));
        provider.set_delay(Duration::from_millis(100));
        ledger.insert(ledger_tx(STATE_COMPLETED, 1));

        let s = scheduler(&ledger, &provider);

        let TriggerOutcome::Started(first) = s.trigger() else {
            panic!("first trigger should start a run");
        };
        assert_eq!(s.state(), WorkerState::Running);
        assert!(matches!(s.trigger(), TriggerOutcome::Skipped));

        first.await.unwrap();
        assert_eq!(s.state(), WorkerState::Idle);
        assert_eq!(provider.calls().create_transfer, 1);
        assert_eq!(s.last_report().unwrap().actuated, 1);

        // Next run sees the transfer in flight and leaves it alone
        let TriggerOutcome::Started(second) = s.trigger() else {
            panic!("idle worker should start a run");
        };
        second.await.unwrap();
        assert_eq!(provider.calls().create_transfer, 1);
        assert_eq!(s.last_report().unwrap().skipped, 1);
    }

    #[tokio::test]
    async fn test_fatal_run_returns_worker_to_idle() {
        let ledger = Arc::new(InMemoryLedger::new());
        let provider = Arc::new(FakeProvider::new());
        provider.set_unauthorized();
        ledger.insert(ledger_tx(STATE_COMPLETED, 1));

        let s = scheduler(&ledger, &provider);
        let TriggerOutcome::Started(handle) = s.trigger() else {
            panic!("idle worker should start a run");
        };
        handle.await.unwrap();

        assert_eq!(s.state(), WorkerState::Idle);
        assert!(s.last_report().is_none());
        assert!(matches!(s.trigger(), TriggerOutcome::Started(_)));
    }

    #[test]
    fn test_invalid_schedule_rejected_at_construction() {
        let ledger = Arc::new(InMemoryLedger::new());
        let provider = Arc::new(FakeProvider::new());
        let mut config = worker_config();
        config.schedule = "sometimes".into();
        let worker = ReconciliationWorker::new(
            SettlementKind::Payout,
            &config,
            ledger,
            provider,
            String::new(),
        );
        assert!(WorkerScheduler::new(Arc::new(worker), &config).is_err());
    }
}

// Settlement reconciliation: drives ledger records to a terminal provider outcome
pub mod actuator;
pub mod balance;
pub mod eligibility;
pub mod guard;
pub mod lister;
pub mod projector;
pub mod scheduler;
pub mod worker;

pub use scheduler::{Cadence, TriggerOutcome, WorkerScheduler};
pub use worker::{ReconciliationWorker, RunReport};

// Run Guard - per-worker Idle/Running state machine
//
// Process-local only. Two processes can still act on the same candidate;
// the deterministic create reference is what keeps that from moving funds twice.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Idle,
    Running,
}

#[derive(Debug, Default)]
pub struct RunGuard {
    running: AtomicBool,
}

impl RunGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idle -> Running. False when a run is already in flight.
    pub fn try_acquire(&self) -> bool {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Running -> Idle
    pub fn release(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub fn state(&self) -> WorkerState {
        if self.running.load(Ordering::Acquire) {
            WorkerState::Running
        } else {
            WorkerState::Idle
        }
    }
}

/// Held for the duration of a run; releases the guard when dropped, including on panic
#[derive(Debug)]
pub struct RunPermit {
    guard: Arc<RunGuard>,
}

impl RunPermit {
    pub fn acquire(guard: &Arc<RunGuard>) -> Option<Self> {
        guard.try_acquire().then(|| Self {
            guard: guard.clone(),
        })
    }
}

impl Drop for RunPermit {
    fn drop(&mut self) {
        self.guard.release();
    }
}

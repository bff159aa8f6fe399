//! Shared observability state and the global shutdown signal.
//!
//! [`NodeState`] is the read surface the HTTP handlers render from.
//! Writer discipline: the mode snapshot has exactly one writer (the mode
//! controller); earnings and reporting health have exactly one writer
//! (the result reporter). Everything else reads.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Notify;

use hnh_common::task::{unix_now, Task};

use crate::earnings::EarningsLedger;

/// The node's current workload mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Routine default workload.
    Mining,
    /// Coordinator-offered high-value task is active.
    Security,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Mining => write!(f, "mining"),
            Mode::Security => write!(f, "security"),
        }
    }
}

/// Display copy of the task currently bound in `Security` mode.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundTask {
    pub id: u64,
    pub reward: f64,
    pub algorithm: String,
}

/// Point-in-time view of the controller's mode.
#[derive(Debug, Clone, PartialEq)]
pub struct ModeSnapshot {
    pub mode: Mode,
    /// Present only in `Security`.
    pub task: Option<BoundTask>,
}

/// Process-scoped state shared between the control loop, the reporter,
/// and the HTTP surface.
pub struct NodeState {
    start_time: u64,
    mode: RwLock<ModeSnapshot>,
    earnings: RwLock<EarningsLedger>,
    /// False after a report was dropped; true again after a delivery.
    report_health: AtomicBool,
}

impl NodeState {
    pub fn new() -> Arc<Self> {
        Arc::new(NodeState {
            start_time: unix_now(),
            mode: RwLock::new(ModeSnapshot {
                mode: Mode::Mining,
                task: None,
            }),
            earnings: RwLock::new(EarningsLedger::new()),
            report_health: AtomicBool::new(true),
        })
    }

    /// Controller only: record the return to mining.
    pub fn set_mining(&self) {
        *self.mode.write() = ModeSnapshot {
            mode: Mode::Mining,
            task: None,
        };
    }

    /// Controller only: record the switch to a security task.
    pub fn set_security(&self, task: &Task) {
        *self.mode.write() = ModeSnapshot {
            mode: Mode::Security,
            task: Some(BoundTask {
                id: task.id,
                reward: task.reward,
                algorithm: task.algorithm.clone(),
            }),
        };
    }

    pub fn snapshot(&self) -> ModeSnapshot {
        self.mode.read().clone()
    }

    /// Reporter only: credit delivered earnings.
    pub fn credit_earnings(&self, amount: f64) {
        self.earnings.write().credit(amount, unix_now());
    }

    pub fn earnings_today(&self) -> f64 {
        self.earnings.read().today(unix_now())
    }

    /// Reporter only.
    pub fn set_report_health(&self, healthy: bool) {
        self.report_health.store(healthy, Ordering::Relaxed);
    }

    pub fn report_healthy(&self) -> bool {
        self.report_health.load(Ordering::Relaxed)
    }

    pub fn uptime_secs(&self) -> u64 {
        unix_now().saturating_sub(self.start_time)
    }
}

/// Global shutdown signal.
///
/// A plain `Notify` can miss a wakeup fired while no task is parked on
/// it, so the trigger also latches a flag that [`Shutdown::wait`] checks
/// before parking.
pub struct Shutdown {
    notify: Notify,
    triggered: AtomicBool,
}

impl Shutdown {
    pub fn new() -> Arc<Self> {
        Arc::new(Shutdown {
            notify: Notify::new(),
            triggered: AtomicBool::new(false),
        })
    }

    /// Latches the signal and wakes every waiter. Idempotent.
    pub fn trigger(&self) {
        self.triggered.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Completes once the signal has been triggered. Safe against the
    /// trigger racing the park: the waiter is enlisted before the flag
    /// is re-checked.
    pub async fn wait(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.is_triggered() {
            return;
        }
        notified.await;
    }
}

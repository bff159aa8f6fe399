//! Day-scoped earnings accumulator for status display.
//!
//! Not authoritative accounting: the coordinator owns the ledger of
//! record. This only aggregates the amounts this node has successfully
//! reported today so the presentation layer can show them.

/// Seconds per ledger day bucket.
const SECS_PER_DAY: u64 = 86_400;

/// Accumulates reported earnings for the current unix day.
#[derive(Debug, Clone, Default)]
pub struct EarningsLedger {
    day: u64,
    total: f64,
}

impl EarningsLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credits `amount` at time `now` (unix seconds). A day rollover
    /// discards the previous day's total.
    pub fn credit(&mut self, amount: f64, now: u64) {
        let day = now / SECS_PER_DAY;
        if day != self.day {
            self.day = day;
            self.total = 0.0;
        }
        self.total += amount;
    }

    /// Total credited during the day containing `now`; zero if the last
    /// credit was on an earlier day.
    pub fn today(&self, now: u64) -> f64 {
        if now / SECS_PER_DAY == self.day {
            self.total
        } else {
            0.0
        }
    }
}

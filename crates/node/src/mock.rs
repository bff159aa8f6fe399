//! Scripted in-memory implementations of the coordinator seams.
//!
//! Always compiled (not `cfg(test)`): the integration tests drive the
//! full control loop through these, and a `mock` coordinator mode is
//! useful when running a node against no infrastructure.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use hnh_common::Task;

use crate::reporter::{ReportError, ReportSink, TaskReport};
use crate::task_source::{PollError, TaskFeed};

/// Task feed that replays scripted responses, then returns empty listings.
#[derive(Default)]
pub struct MockTaskFeed {
    responses: Mutex<VecDeque<Result<Vec<Task>, PollError>>>,
    polls: AtomicUsize,
}

impl MockTaskFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a successful listing.
    pub fn push_tasks(&self, tasks: Vec<Task>) {
        self.responses.lock().push_back(Ok(tasks));
    }

    /// Queues a failed poll.
    pub fn push_error(&self, error: PollError) {
        self.responses.lock().push_back(Err(error));
    }

    /// Number of polls observed so far.
    pub fn poll_count(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskFeed for MockTaskFeed {
    async fn list_tasks(&self, _node_id: &str) -> Result<Vec<Task>, PollError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        self.responses.lock().pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }
}

/// Report sink that records deliveries and can be told to fail.
#[derive(Default)]
pub struct MockReportSink {
    delivered: Mutex<Vec<TaskReport>>,
    fail_next: AtomicU32,
}

impl MockReportSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` deliveries fail with a transport error.
    pub fn fail_next(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Makes every delivery fail until reset.
    pub fn fail_always(&self) {
        self.fail_next.store(u32::MAX, Ordering::SeqCst);
    }

    /// Reports delivered so far, in order.
    pub fn delivered(&self) -> Vec<TaskReport> {
        self.delivered.lock().clone()
    }
}

#[async_trait]
impl ReportSink for MockReportSink {
    async fn deliver(&self, report: &TaskReport) -> Result<(), ReportError> {
        let remaining = self.fail_next.load(Ordering::SeqCst);
        if remaining > 0 {
            if remaining != u32::MAX {
                self.fail_next.store(remaining - 1, Ordering::SeqCst);
            }
            return Err(ReportError::Transport("mock delivery failure".to_string()));
        }
        self.delivered.lock().push(report.clone());
        Ok(())
    }
}

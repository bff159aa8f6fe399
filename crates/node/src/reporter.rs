//! Progress and result reporting back to the coordinator.
//!
//! Delivery goes through the [`ReportSink`] seam; [`HttpReportSink`] is
//! the production implementation. Failures are retried with bounded
//! exponential backoff and then dropped with a warning: reporting must
//! never block or deadlock the mode-switch loop, since the workload has
//! to proceed regardless of reporting success.
//!
//! A terminal `completed` report carries the result artifact reference;
//! if delivery fails past the retry budget the artifact stays on disk for
//! out-of-band reconciliation. The coordinator treats resent terminal
//! reports as idempotent, so retrying them is safe.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use hnh_common::{ProgressEvent, TaskStatus};

use crate::retry::{retry_with_backoff, RetryConfig, RetryResult};
use crate::state::NodeState;

/// A failed delivery attempt.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("report transport error: {0}")]
    Transport(String),
    #[error("report rejected with status {0}")]
    Status(u16),
}

impl From<reqwest::Error> for ReportError {
    fn from(e: reqwest::Error) -> Self {
        ReportError::Transport(e.to_string())
    }
}

/// Wire shape of a progress/result report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskReport {
    pub node_id: String,
    pub task_id: u64,
    pub timestamp: u64,
    pub status: TaskStatus,
    /// Result artifact reference, present on `completed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

/// Destination for task reports.
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn deliver(&self, report: &TaskReport) -> Result<(), ReportError>;
}

/// Production sink: `POST {base}/tasks/{id}/report`.
pub struct HttpReportSink {
    base: String,
    client: Client,
}

impl HttpReportSink {
    pub fn new(base: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("reqwest client");
        HttpReportSink {
            base: base.into(),
            client,
        }
    }
}

#[async_trait]
impl ReportSink for HttpReportSink {
    async fn deliver(&self, report: &TaskReport) -> Result<(), ReportError> {
        let url = format!("{}/tasks/{}/report", self.base, report.task_id);
        let resp = self.client.post(&url).json(report).send().await?;
        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ReportError::Status(status.as_u16()))
        }
    }
}

/// Pushes progress events to the coordinator and keeps the local
/// earnings/health view current.
pub struct ResultReporter {
    sink: Arc<dyn ReportSink>,
    node_id: String,
    retry: RetryConfig,
    state: Arc<NodeState>,
}

impl ResultReporter {
    pub fn new(sink: Arc<dyn ReportSink>, node_id: String, state: Arc<NodeState>) -> Self {
        ResultReporter {
            sink,
            node_id,
            retry: RetryConfig::default(),
            state,
        }
    }

    /// Overrides the retry budget (tests use near-zero delays).
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Delivers `event`, retrying within the budget, then dropping.
    ///
    /// Never fails: an exhausted budget logs a warning, clears the health
    /// flag, and returns. `credit` is the node's share of the task reward
    /// and is booked only when a `completed` terminal report is actually
    /// delivered — an undelivered report pays nothing yet.
    pub async fn report(&self, event: &ProgressEvent, credit: Option<f64>) {
        let report = TaskReport {
            node_id: self.node_id.clone(),
            task_id: event.task_id,
            timestamp: event.timestamp,
            status: event.status,
            result: event
                .result_path
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned()),
        };

        match retry_with_backoff(&self.retry, || self.sink.deliver(&report)).await {
            RetryResult::Success { attempts, .. } => {
                debug!(
                    "reported task {} {:?} (attempt {})",
                    report.task_id, report.status, attempts
                );
                self.state.set_report_health(true);
                if event.status == TaskStatus::Completed {
                    if let Some(amount) = credit {
                        self.state.credit_earnings(amount);
                    }
                }
            }
            RetryResult::Exhausted { last_error, attempts } => {
                warn!(
                    "dropping report for task {} ({:?}) after {} attempts: {}",
                    report.task_id, report.status, attempts, last_error
                );
                self.state.set_report_health(false);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockReportSink;
    use std::path::PathBuf;
    use std::time::Instant;

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            initial_delay_ms: 0,
            max_delay_ms: 0,
            backoff_multiplier: 2.0,
        }
    }

    fn reporter_with(sink: Arc<MockReportSink>) -> (ResultReporter, Arc<NodeState>) {
        let state = NodeState::new();
        let reporter = ResultReporter::new(sink, "node-test".to_string(), state.clone())
            .with_retry(fast_retry());
        (reporter, state)
    }

    // ── 1) successful terminal delivery credits earnings ─────────────────

    #[tokio::test]
    async fn completed_delivery_credits_earnings() {
        let sink = Arc::new(MockReportSink::new());
        let (reporter, state) = reporter_with(sink.clone());

        let event = ProgressEvent::completed(7, PathBuf::from("work/results_7.txt"));
        reporter.report(&event, Some(434.0)).await;

        let delivered = sink.delivered();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].task_id, 7);
        assert_eq!(delivered[0].status, TaskStatus::Completed);
        assert_eq!(delivered[0].result.as_deref(), Some("work/results_7.txt"));
        assert_eq!(state.earnings_today(), 434.0);
        assert!(state.report_healthy());
    }

    // ── 2) failed terminal never credits ─────────────────────────────────

    #[tokio::test]
    async fn failed_terminal_does_not_credit() {
        let sink = Arc::new(MockReportSink::new());
        let (reporter, state) = reporter_with(sink.clone());

        reporter.report(&ProgressEvent::failed(8), None).await;

        assert_eq!(sink.delivered().len(), 1);
        assert_eq!(state.earnings_today(), 0.0);
    }

    // ── 3) transient failure is retried within the budget ────────────────

    #[tokio::test]
    async fn transient_failure_retried() {
        let sink = Arc::new(MockReportSink::new());
        sink.fail_next(2);
        let (reporter, state) = reporter_with(sink.clone());

        let event = ProgressEvent::completed(7, PathBuf::from("r.txt"));
        reporter.report(&event, Some(100.0)).await;

        assert_eq!(sink.delivered().len(), 1, "third attempt must land");
        assert_eq!(state.earnings_today(), 100.0);
        assert!(state.report_healthy());
    }

    // ── 4) exhausted budget drops the event and flags health ─────────────

    #[tokio::test]
    async fn exhausted_budget_drops_and_flags_health() {
        let sink = Arc::new(MockReportSink::new());
        sink.fail_always();
        let (reporter, state) = reporter_with(sink.clone());

        let event = ProgressEvent::completed(7, PathBuf::from("r.txt"));
        reporter.report(&event, Some(100.0)).await;

        assert!(sink.delivered().is_empty());
        assert_eq!(state.earnings_today(), 0.0, "undelivered report pays nothing");
        assert!(!state.report_healthy());
    }

    // ── 5) delivery after a drop restores the health flag ────────────────

    #[tokio::test]
    async fn delivery_restores_health_flag() {
        let sink = Arc::new(MockReportSink::new());
        sink.fail_always();
        let (reporter, state) = reporter_with(sink.clone());

        reporter.report(&ProgressEvent::running(1), None).await;
        assert!(!state.report_healthy());

        sink.fail_next(0);
        reporter.report(&ProgressEvent::running(1), None).await;
        assert!(state.report_healthy());
    }

    // ── 6) report latency is bounded by the retry budget ─────────────────

    #[tokio::test]
    async fn report_latency_bounded_by_budget() {
        let sink = Arc::new(MockReportSink::new());
        sink.fail_always();
        let state = NodeState::new();
        let reporter = ResultReporter::new(sink, "node-test".to_string(), state)
            .with_retry(RetryConfig {
                max_attempts: 3,
                initial_delay_ms: 50,
                max_delay_ms: 50,
                backoff_multiplier: 1.0,
            });

        let started = Instant::now();
        reporter.report(&ProgressEvent::running(1), None).await;
        // two inter-attempt delays of 50ms each, plus slack
        assert!(started.elapsed() < Duration::from_millis(500));
    }
}

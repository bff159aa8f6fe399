//! Coordinator task listing and qualifying-task selection.
//!
//! The coordinator seam is the [`TaskFeed`] trait; [`HttpTaskFeed`] is the
//! production implementation and [`crate::mock::MockTaskFeed`] the scripted
//! one for tests.
//!
//! Polling failures are never fatal: [`poll_qualifying`] absorbs transport,
//! status, and decode errors into "no task available" with a warning, so
//! the control loop keeps running through coordinator outages.
//!
//! ## Selection policy
//!
//! Among the listed tasks, a task qualifies when its reward is strictly
//! greater than the switch threshold and its advertised algorithm is on
//! the node's permitted list. Of the qualifying tasks the maximum-reward
//! one is selected; ties break to the lowest task id so that two nodes
//! with the same listing make the same deterministic choice.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tracing::warn;

use hnh_common::Task;

/// A failed attempt to list tasks. Always recovered as "no task".
#[derive(Debug, Error)]
pub enum PollError {
    #[error("task listing transport error: {0}")]
    Transport(String),
    #[error("task listing returned status {0}")]
    Status(u16),
    #[error("task listing body malformed: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for PollError {
    fn from(e: reqwest::Error) -> Self {
        PollError::Transport(e.to_string())
    }
}

/// Source of coordinator task listings.
#[async_trait]
pub trait TaskFeed: Send + Sync {
    /// Lists the tasks currently offered to `node_id`.
    async fn list_tasks(&self, node_id: &str) -> Result<Vec<Task>, PollError>;
}

/// Production feed: `GET {base}/tasks?node_id=...`.
pub struct HttpTaskFeed {
    base: String,
    client: Client,
}

impl HttpTaskFeed {
    pub fn new(base: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("reqwest client");
        HttpTaskFeed {
            base: base.into(),
            client,
        }
    }
}

#[async_trait]
impl TaskFeed for HttpTaskFeed {
    async fn list_tasks(&self, node_id: &str) -> Result<Vec<Task>, PollError> {
        let url = format!("{}/tasks", self.base);
        let resp = self
            .client
            .get(&url)
            .query(&[("node_id", node_id)])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(PollError::Status(status.as_u16()));
        }

        // Decode entry by entry: one unknown task kind must not discard
        // the rest of the listing.
        let entries = resp
            .json::<Vec<serde_json::Value>>()
            .await
            .map_err(|e| PollError::Decode(e.to_string()))?;

        let mut tasks = Vec::with_capacity(entries.len());
        for entry in entries {
            match serde_json::from_value::<Task>(entry) {
                Ok(task) => tasks.push(task),
                Err(e) => warn!("skipping unrecognized task entry: {}", e),
            }
        }
        Ok(tasks)
    }
}

/// Selects the qualifying task to switch to, if any.
///
/// Qualifying: `reward > threshold` (strict) and `algorithm` permitted.
/// Winner: maximum reward, ties broken by lowest id.
pub fn select_qualifying<'a>(tasks: &'a [Task], threshold: f64, permitted: &[String]) -> Option<&'a Task> {
    let mut best: Option<&Task> = None;
    for task in tasks {
        if !task.qualifies(threshold) {
            continue;
        }
        if !permitted.iter().any(|a| a == &task.algorithm) {
            warn!(
                "task {} pays ${} but algorithm {:?} is not permitted, skipping",
                task.id, task.reward, task.algorithm
            );
            continue;
        }
        best = match best {
            None => Some(task),
            Some(b) if task.reward > b.reward => Some(task),
            Some(b) if task.reward == b.reward && task.id < b.id => Some(task),
            keep => keep,
        };
    }
    best
}

/// One poll cycle: list tasks and pick the qualifying one.
///
/// Returns `None` on empty listings and on any [`PollError`]; failures
/// are logged and treated identically to "no task available".
pub async fn poll_qualifying(
    feed: &dyn TaskFeed,
    node_id: &str,
    threshold: f64,
    permitted: &[String],
) -> Option<Task> {
    match feed.list_tasks(node_id).await {
        Ok(tasks) => select_qualifying(&tasks, threshold, permitted).cloned(),
        Err(e) => {
            warn!("task poll failed, treating as no task: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTaskFeed;

    fn task(id: u64, reward: f64, algorithm: &str) -> Task {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "reward": reward,
            "algorithm": algorithm,
            "type": "hashcat",
            "hash_type": 0,
            "attack_mode": 0,
            "hash_file": "h.txt",
            "wordlist": "w.txt",
            "hash_count": 10
        }))
        .expect("test task")
    }

    fn permitted() -> Vec<String> {
        vec!["md5".to_string(), "ntlm".to_string()]
    }

    // ── 1) single qualifying task is selected ────────────────────────────

    #[test]
    fn qualifying_task_selected() {
        let tasks = vec![task(7, 620.0, "md5")];
        let picked = select_qualifying(&tasks, 500.0, &permitted());
        assert_eq!(picked.map(|t| t.id), Some(7));
    }

    // ── 2) reward must strictly exceed the threshold ─────────────────────

    #[test]
    fn threshold_is_strict() {
        let tasks = vec![task(1, 500.0, "md5")];
        assert!(select_qualifying(&tasks, 500.0, &permitted()).is_none());
    }

    // ── 3) maximum reward wins ───────────────────────────────────────────

    #[test]
    fn maximum_reward_wins() {
        let tasks = vec![task(2, 510.0, "md5"), task(9, 800.0, "ntlm"), task(4, 700.0, "md5")];
        let picked = select_qualifying(&tasks, 500.0, &permitted());
        assert_eq!(picked.map(|t| t.id), Some(9));
    }

    // ── 4) ties break to the lowest id ───────────────────────────────────

    #[test]
    fn ties_break_to_lowest_id() {
        let tasks = vec![task(5, 510.0, "md5"), task(3, 510.0, "md5")];
        let picked = select_qualifying(&tasks, 500.0, &permitted());
        assert_eq!(picked.map(|t| t.id), Some(3));
    }

    // ── 5) non-permitted algorithms are skipped ──────────────────────────

    #[test]
    fn non_permitted_algorithm_skipped() {
        let tasks = vec![task(1, 900.0, "wpa2"), task(2, 600.0, "md5")];
        let picked = select_qualifying(&tasks, 500.0, &permitted());
        assert_eq!(picked.map(|t| t.id), Some(2));
    }

    // ── 6) empty and non-qualifying listings yield none ──────────────────

    #[test]
    fn empty_listing_yields_none() {
        assert!(select_qualifying(&[], 500.0, &permitted()).is_none());
        let tasks = vec![task(1, 100.0, "md5"), task(2, 499.9, "ntlm")];
        assert!(select_qualifying(&tasks, 500.0, &permitted()).is_none());
    }

    // ── 7) poll absorbs feed errors as no-task ───────────────────────────

    #[tokio::test]
    async fn poll_absorbs_feed_errors() {
        let feed = MockTaskFeed::new();
        feed.push_error(PollError::Status(503));
        let got = poll_qualifying(&feed, "node-1", 500.0, &permitted()).await;
        assert!(got.is_none());
    }

    // ── 8) poll returns the selected task ────────────────────────────────

    #[tokio::test]
    async fn poll_returns_selected_task() {
        let feed = MockTaskFeed::new();
        feed.push_tasks(vec![task(3, 510.0, "md5"), task(5, 510.0, "md5")]);
        let got = poll_qualifying(&feed, "node-1", 500.0, &permitted()).await;
        assert_eq!(got.map(|t| t.id), Some(3));
    }
}

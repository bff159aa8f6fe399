//! Coordinator task model and progress events.
//!
//! A [`Task`] is immutable once received from the coordinator and is owned
//! exclusively by the controller/supervisor pair for the duration of a mode
//! switch. Task kinds are a closed tagged enum: a listing entry with an
//! unknown `type` fails deserialization loudly and is skipped, instead of
//! silently mis-launching a worker.
//!
//! [`ProgressEvent`]s flow one way, supervisor → reporter, and are not
//! persisted beyond the report. For a given task the `completed`/`failed`
//! terminal event is always the last event produced.

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Seconds since the unix epoch. Saturates to 0 before the epoch.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Kind-specific parameters of a coordinator task.
///
/// Closed set: the wire `type` tag must be one of the known kinds.
/// Each variant carries only the parameters its worker invocation needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TaskKind {
    /// Dictionary-based hash recovery (hashcat straight attack).
    #[serde(rename = "hashcat")]
    HashRecovery {
        /// Hash type selector (`-m`).
        hash_type: u32,
        /// Attack mode selector (`-a`).
        attack_mode: u32,
        /// Path/reference to the target hash file.
        hash_file: String,
        /// Path/reference to the wordlist.
        wordlist: String,
    },
    /// Mask/charset brute force.
    #[serde(rename = "bruteforce")]
    BruteForce {
        /// Hash type selector (`-m`).
        hash_type: u32,
        /// Candidate character set.
        charset: String,
        /// Minimum candidate length.
        min_len: u32,
        /// Maximum candidate length.
        max_len: u32,
        /// Path/reference to the target hash file.
        hash_file: String,
    },
}

/// A high-value task offered by the coordinator.
///
/// Immutable once received. Qualifies for a mode switch only if its reward
/// strictly exceeds the configured switch threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Coordinator-assigned unique identifier.
    pub id: u64,
    /// Reward in USD.
    pub reward: f64,
    /// Advertised algorithm name (`md5`, `ntlm`, ...). Checked against the
    /// node's permitted security algorithms during selection.
    pub algorithm: String,
    /// Kind-specific worker parameters.
    #[serde(flatten)]
    pub kind: TaskKind,
    /// Number of targets (hashes) in the task.
    #[serde(rename = "hash_count", default)]
    pub target_count: u64,
}

impl Task {
    /// Whether this task's reward clears the switch threshold.
    /// Strictly greater: a task paying exactly the threshold does not qualify.
    pub fn qualifies(&self, threshold: f64) -> bool {
        self.reward > threshold
    }
}

/// Lifecycle status carried by a progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Worker process alive, task in progress.
    Running,
    /// Worker exited successfully and produced its declared results.
    Completed,
    /// Worker failed to launch, exited non-zero, or produced no results.
    Failed,
}

impl TaskStatus {
    /// `Completed` and `Failed` end a task's event stream.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

/// A single progress report for a task, produced by the worker supervisor
/// and consumed by the result reporter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Task this event belongs to.
    pub task_id: u64,
    /// Unix timestamp of the observation.
    pub timestamp: u64,
    /// Observed status.
    pub status: TaskStatus,
    /// Result artifact, present on `completed` events.
    pub result_path: Option<PathBuf>,
}

impl ProgressEvent {
    /// A `running` heartbeat for an alive worker.
    pub fn running(task_id: u64) -> Self {
        ProgressEvent {
            task_id,
            timestamp: unix_now(),
            status: TaskStatus::Running,
            result_path: None,
        }
    }

    /// Terminal `completed` event carrying the result artifact.
    pub fn completed(task_id: u64, result_path: PathBuf) -> Self {
        ProgressEvent {
            task_id,
            timestamp: unix_now(),
            status: TaskStatus::Completed,
            result_path: Some(result_path),
        }
    }

    /// Terminal `failed` event.
    pub fn failed(task_id: u64) -> Self {
        ProgressEvent {
            task_id,
            timestamp: unix_now(),
            status: TaskStatus::Failed,
            result_path: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hashcat_json() -> &'static str {
        r#"{
            "id": 7,
            "reward": 620.0,
            "algorithm": "md5",
            "type": "hashcat",
            "hash_type": 0,
            "attack_mode": 0,
            "hash_file": "hashes/batch7.txt",
            "wordlist": "wordlists/rockyou.txt",
            "hash_count": 1500
        }"#
    }

    #[test]
    fn hashcat_task_deserializes() {
        let task: Task = serde_json::from_str(hashcat_json()).expect("parse");
        assert_eq!(task.id, 7);
        assert_eq!(task.reward, 620.0);
        assert_eq!(task.target_count, 1500);
        match &task.kind {
            TaskKind::HashRecovery { hash_type, wordlist, .. } => {
                assert_eq!(*hash_type, 0);
                assert_eq!(wordlist, "wordlists/rockyou.txt");
            }
            other => panic!("expected HashRecovery, got {:?}", other),
        }
    }

    #[test]
    fn bruteforce_task_deserializes() {
        let json = r#"{
            "id": 9,
            "reward": 900.0,
            "algorithm": "ntlm",
            "type": "bruteforce",
            "hash_type": 1000,
            "charset": "?l?d",
            "min_len": 1,
            "max_len": 8,
            "hash_file": "hashes/ntlm.txt"
        }"#;
        let task: Task = serde_json::from_str(json).expect("parse");
        assert!(matches!(task.kind, TaskKind::BruteForce { .. }));
        // hash_count absent → defaults to 0
        assert_eq!(task.target_count, 0);
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let json = r#"{
            "id": 1,
            "reward": 700.0,
            "algorithm": "md5",
            "type": "ddos",
            "target": "10.0.0.1"
        }"#;
        assert!(serde_json::from_str::<Task>(json).is_err());
    }

    #[test]
    fn qualification_is_strictly_greater() {
        let task: Task = serde_json::from_str(hashcat_json()).expect("parse");
        assert!(task.qualifies(500.0));
        assert!(!task.qualifies(620.0));
        assert!(!task.qualifies(621.0));
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&TaskStatus::Running).unwrap(), "\"running\"");
        assert_eq!(serde_json::to_string(&TaskStatus::Completed).unwrap(), "\"completed\"");
        assert_eq!(serde_json::to_string(&TaskStatus::Failed).unwrap(), "\"failed\"");
    }

    #[test]
    fn terminal_statuses() {
        assert!(!TaskStatus::Running.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
    }

    #[test]
    fn event_constructors() {
        let e = ProgressEvent::completed(4, PathBuf::from("results_4.txt"));
        assert_eq!(e.status, TaskStatus::Completed);
        assert_eq!(e.result_path.as_deref(), Some(std::path::Path::new("results_4.txt")));

        let f = ProgressEvent::failed(4);
        assert!(f.result_path.is_none());
        assert!(f.status.is_terminal());
    }
}

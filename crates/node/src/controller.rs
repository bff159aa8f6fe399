//! # Mode Controller
//!
//! The decision state machine that drives the node between its two
//! workload modes:
//!
//! ```text
//!              qualifying task offered
//!   ┌────────┐ ──────────────────────► ┌──────────┐
//!   │ Mining │                          │ Security │ (task bound)
//!   └────────┘ ◄────────────────────── └──────────┘
//!              terminal event (completed / failed)
//!              or admin cancel
//! ```
//!
//! A single control loop owns every transition. Polling only happens in
//! `Mining`; while a switch is in flight or a security task is running no
//! poll is issued, so rapid task offers cannot thrash the node. A stop is
//! always confirmed (process exited or killed) before the next workload
//! is started, which is what keeps the one-workload-at-a-time invariant.
//!
//! The controller is deliberately hard to kill: poll failures read as "no
//! task", launch failures of the security worker synthesize a terminal
//! `failed` event, and `Mining` is always the state fallen back to.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use hnh_common::{NodeConfig, ProgressEvent, Task, TaskStatus};

use crate::reporter::ResultReporter;
use crate::state::{NodeState, Shutdown};
use crate::supervisor::{WorkerHandle, WorkerSpec, WorkerSupervisor};
use crate::task_source::{poll_qualifying, TaskFeed};

/// Operator commands consumed from the admin channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminCommand {
    /// Abandon the bound security task and force a return to mining.
    Cancel,
    /// Re-load the configuration file and swap it in.
    Reload,
}

/// Owns the mode state machine and the active worker handle.
pub struct ModeController {
    config_path: PathBuf,
    config: RwLock<Arc<NodeConfig>>,
    feed: Arc<dyn TaskFeed>,
    reporter: ResultReporter,
    state: Arc<NodeState>,
}

impl ModeController {
    pub fn new(
        config_path: PathBuf,
        config: NodeConfig,
        feed: Arc<dyn TaskFeed>,
        reporter: ResultReporter,
        state: Arc<NodeState>,
    ) -> Self {
        ModeController {
            config_path,
            config: RwLock::new(Arc::new(config)),
            feed,
            reporter,
            state,
        }
    }

    /// Current configuration. Cheap Arc clone; reloads swap the whole Arc
    /// so readers never observe a partially updated config.
    pub fn config(&self) -> Arc<NodeConfig> {
        self.config.read().clone()
    }

    /// Runs the control loop until `shutdown` is triggered.
    ///
    /// Starts in `Mining`. Each poll tick checks the coordinator for a
    /// qualifying task; a hit drives the full Mining → Security →
    /// Mining cycle inline before the next poll is issued.
    pub async fn run(
        self,
        mut admin_rx: mpsc::Receiver<AdminCommand>,
        shutdown: Arc<Shutdown>,
    ) -> Result<()> {
        let mut admin_open = true;
        self.state.set_mining();
        let mut mining = self.ensure_mining(None);
        info!("controller started in mining mode");

        loop {
            let poll_interval = self.config().poll_interval();
            tokio::select! {
                _ = shutdown.wait() => {
                    info!("shutdown: stopping active workload");
                    self.stop_mining(&mut mining).await;
                    break;
                }
                cmd = admin_rx.recv(), if admin_open => match cmd {
                    Some(AdminCommand::Reload) => self.reload_config(),
                    Some(AdminCommand::Cancel) => {
                        debug!("cancel ignored: no security task bound")
                    }
                    None => admin_open = false,
                },
                _ = sleep(poll_interval) => {
                    mining = self.ensure_mining(mining);
                    let cfg = self.config();
                    let offered = tokio::select! {
                        _ = shutdown.wait() => None,
                        offered = poll_qualifying(
                            self.feed.as_ref(),
                            &cfg.node_id,
                            cfg.switch_threshold,
                            &cfg.security_algorithms,
                        ) => offered,
                    };

                    // a shutdown raced against the poll wins over any offer:
                    // no new worker is ever launched past the trigger
                    if shutdown.is_triggered() {
                        continue;
                    }

                    if let Some(task) = offered {
                        info!(
                            "qualifying task {} (${} > ${}) offered, preempting mining",
                            task.id, task.reward, cfg.switch_threshold
                        );
                        // stop must be confirmed before the security start
                        self.stop_mining(&mut mining).await;
                        let keep_running = self
                            .run_security(task, &mut admin_rx, &mut admin_open, &shutdown)
                            .await;
                        if !keep_running {
                            break;
                        }
                        mining = self.ensure_mining(None);
                    }
                }
            }
        }

        info!("controller stopped");
        Ok(())
    }

    /// Drives one security task to its terminal event, forwarding every
    /// progress event to the reporter in order. Returns `false` when the
    /// loop should shut down instead of resuming mining.
    async fn run_security(
        &self,
        task: Task,
        admin_rx: &mut mpsc::Receiver<AdminCommand>,
        admin_open: &mut bool,
        shutdown: &Arc<Shutdown>,
    ) -> bool {
        let cfg = self.config();
        self.state.set_security(&task);
        let credit = task.reward * cfg.revenue_share;

        let spec = WorkerSpec::security(&cfg, &task);
        let handle = match WorkerSupervisor::start(&spec) {
            Ok(handle) => handle,
            Err(e) => {
                // surface as an immediate terminal failure so the node
                // never sits in Security with nothing running
                warn!("security worker launch failed for task {}: {}", task.id, e);
                self.reporter.report(&ProgressEvent::failed(task.id), None).await;
                self.state.set_mining();
                return true;
            }
        };

        let cancel = Shutdown::new();
        let mut events = WorkerSupervisor::watch(
            handle,
            task.id,
            cfg.progress_cadence(),
            cfg.stop_grace(),
            cancel.clone(),
        );

        let mut keep_running = true;
        loop {
            tokio::select! {
                _ = shutdown.wait(), if keep_running => {
                    info!("shutdown during task {}: stopping security worker", task.id);
                    cancel.trigger();
                    keep_running = false;
                    // keep draining until the terminal event confirms the stop
                }
                cmd = admin_rx.recv(), if *admin_open => match cmd {
                    Some(AdminCommand::Cancel) => {
                        info!("admin cancel: abandoning task {}", task.id);
                        cancel.trigger();
                    }
                    Some(AdminCommand::Reload) => self.reload_config(),
                    None => *admin_open = false,
                },
                event = events.recv() => match event {
                    Some(event) => {
                        let terminal = event.status.is_terminal();
                        let credit_arg =
                            (event.status == TaskStatus::Completed).then_some(credit);
                        self.reporter.report(&event, credit_arg).await;
                        if terminal {
                            break;
                        }
                    }
                    None => {
                        warn!("watch stream for task {} ended without terminal event", task.id);
                        self.reporter.report(&ProgressEvent::failed(task.id), None).await;
                        break;
                    }
                }
            }
        }

        self.state.set_mining();
        keep_running
    }

    /// Makes sure the mining workload is running: keeps a live handle,
    /// restarts a dead one, and tolerates launch failures (the next tick
    /// tries again).
    fn ensure_mining(&self, current: Option<WorkerHandle>) -> Option<WorkerHandle> {
        if let Some(mut handle) = current {
            if handle.is_running() {
                return Some(handle);
            }
            warn!("mining worker exited unexpectedly, restarting");
        }

        let spec = WorkerSpec::mining(&self.config());
        match WorkerSupervisor::start(&spec) {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("mining worker launch failed: {}", e);
                None
            }
        }
    }

    async fn stop_mining(&self, mining: &mut Option<WorkerHandle>) {
        if let Some(handle) = mining.take() {
            WorkerSupervisor::stop(handle, self.config().stop_grace()).await;
        }
    }

    /// Re-loads the config file and swaps it in. The node identity is
    /// per-installation and survives reloads even when the file has lost
    /// (or never had) a `node_id`.
    fn reload_config(&self) {
        let current = self.config();
        let mut fresh = NodeConfig::load(&self.config_path);
        fresh.node_id = current.node_id.clone();
        info!(
            "configuration reloaded (threshold ${}, poll every {}s)",
            fresh.switch_threshold, fresh.poll_interval_secs
        );
        *self.config.write() = Arc::new(fresh);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockReportSink, MockTaskFeed};
    use crate::state::Mode;
    use crate::task_source::PollError;
    use std::io::Write;
    use std::time::{Duration, Instant};

    fn controller_for(path: PathBuf, config: NodeConfig) -> ModeController {
        let state = NodeState::new();
        let sink = Arc::new(MockReportSink::new());
        let reporter = ResultReporter::new(sink, config.node_id.clone(), state.clone());
        ModeController::new(path, config, Arc::new(MockTaskFeed::new()), reporter, state)
    }

    #[test]
    fn reload_preserves_node_identity() {
        let mut tmp = tempfile::NamedTempFile::new().expect("temp file");
        write!(tmp, "switch_threshold = 900.0").expect("write");

        let mut config = NodeConfig::load(tmp.path());
        config.node_id = "node-keep-me".to_string();
        let controller = controller_for(tmp.path().to_path_buf(), config);

        controller.reload_config();
        let cfg = controller.config();
        assert_eq!(cfg.node_id, "node-keep-me");
        assert_eq!(cfg.switch_threshold, 900.0);
    }

    #[test]
    fn reload_of_missing_file_keeps_identity_with_defaults() {
        let mut config = NodeConfig::load("/nonexistent/config.toml");
        config.node_id = "node-keep-me".to_string();
        config.switch_threshold = 999.0;
        let controller =
            controller_for(PathBuf::from("/nonexistent/config.toml"), config);

        controller.reload_config();
        let cfg = controller.config();
        assert_eq!(cfg.node_id, "node-keep-me");
        // everything else falls back to documented defaults
        assert_eq!(cfg.switch_threshold, hnh_common::config::DEFAULT_SWITCH_THRESHOLD);
    }

    /// Feed that takes a long time to answer, like a coordinator on a
    /// stalled link inside the client timeout.
    struct SlowFeed {
        delay: Duration,
        task: Task,
    }

    #[async_trait::async_trait]
    impl TaskFeed for SlowFeed {
        async fn list_tasks(&self, _node_id: &str) -> Result<Vec<Task>, PollError> {
            tokio::time::sleep(self.delay).await;
            Ok(vec![self.task.clone()])
        }
    }

    #[tokio::test]
    async fn shutdown_cancels_in_flight_poll() {
        let mut config = NodeConfig::load("/nonexistent/config.toml");
        config.node_id = "node-slow-feed".to_string();
        config.miner_program = "/nonexistent/hnh-miner".to_string();
        config.poll_interval_secs = 1;

        let task: Task = serde_json::from_value(serde_json::json!({
            "id": 42,
            "reward": 620.0,
            "algorithm": "md5",
            "type": "hashcat",
            "hash_type": 0,
            "attack_mode": 0,
            "hash_file": "h.txt",
            "wordlist": "w.txt"
        }))
        .expect("task");

        let state = NodeState::new();
        let sink = Arc::new(MockReportSink::new());
        let reporter = ResultReporter::new(sink.clone(), config.node_id.clone(), state.clone());
        let feed = Arc::new(SlowFeed {
            delay: Duration::from_secs(30),
            task,
        });
        let controller = ModeController::new(
            "/nonexistent/config.toml".into(),
            config,
            feed,
            reporter,
            state.clone(),
        );

        let (_admin_tx, admin_rx) = mpsc::channel(1);
        let shutdown = Shutdown::new();
        let handle = tokio::spawn(controller.run(admin_rx, shutdown.clone()));

        // let the loop commit to a poll, then pull the plug mid-flight
        tokio::time::sleep(Duration::from_millis(1500)).await;
        let asked = Instant::now();
        shutdown.trigger();

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("controller must exit promptly instead of waiting out the poll")
            .expect("controller task panicked")
            .expect("controller loop errored");
        assert!(asked.elapsed() < Duration::from_secs(2));

        // the late offer must not have driven a switch or any reporting
        assert!(sink.delivered().is_empty());
        assert_eq!(state.snapshot().mode, Mode::Mining);
    }

    #[test]
    fn ensure_mining_tolerates_missing_miner_binary() {
        let mut config = NodeConfig::load("/nonexistent/config.toml");
        config.miner_program = "/nonexistent/hnh-miner".to_string();
        let controller = controller_for(PathBuf::from("/nonexistent/config.toml"), config);

        // must not panic or error the loop; it just tries again next tick
        assert!(controller.ensure_mining(None).is_none());
    }
}

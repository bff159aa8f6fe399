//! # Worker Supervisor
//!
//! Launches, observes, and terminates the external worker process for the
//! active mode. The worker is an opaque subprocess with a small contract:
//! it is invoked with kind-specific arguments, writes its results to a
//! predictable output path, and its exit status tells us success/failure.
//!
//! ```text
//! start(spec) ──► WorkerHandle ──┬─► stop(handle, grace)   confirmed dead
//!                                └─► watch(handle, ...)    ProgressEvents
//!
//! watch: running, running, ... , completed | failed     (terminal, once)
//! ```
//!
//! ## Guarantees
//!
//! - After [`WorkerSupervisor::stop`] returns, the process is no longer
//!   running: it is asked to terminate (SIGTERM), given the grace period
//!   to exit, then killed and reaped. The one-workload-at-a-time
//!   invariant rests on this.
//! - A [`WorkerSupervisor::watch`] stream emits `running` on a fixed
//!   cadence while the process is alive and ends with exactly one
//!   terminal event. It is not restartable; a new watch needs a new start.
//! - A worker that exits zero but leaves no declared result file maps to
//!   `failed`, never to a supervisor error.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tracing::{info, warn};

use hnh_common::{NodeConfig, ProgressEvent, Task, TaskKind};

use crate::state::Shutdown;

/// The worker process could not be created.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("worker {program:?} could not be started: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Fully resolved invocation of a worker binary.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Where the worker is told to write its results. `Some` for security
    /// workloads; its presence after exit decides completed vs failed.
    pub result_path: Option<PathBuf>,
}

impl WorkerSpec {
    /// Mining invocation: miner binary, preferred algorithm, pool, wallet.
    pub fn mining(config: &NodeConfig) -> Self {
        let mut args = Vec::new();
        if let Some(algo) = config.mining_algorithms.first() {
            args.push("-a".to_string());
            args.push(algo.clone());
        }
        args.push("-o".to_string());
        args.push(config.pool_url.clone());
        if !config.wallet.is_empty() {
            args.push("-u".to_string());
            args.push(config.wallet.clone());
        }
        WorkerSpec {
            program: config.miner_program.clone(),
            args,
            result_path: None,
        }
    }

    /// Security invocation: hashcat-style arguments built from the task
    /// kind, writing to `{work_dir}/results_{id}.txt`.
    pub fn security(config: &NodeConfig, task: &Task) -> Self {
        let result_path = config.work_dir.join(format!("results_{}.txt", task.id));
        let result_arg = result_path.to_string_lossy().into_owned();

        let args = match &task.kind {
            TaskKind::HashRecovery {
                hash_type,
                attack_mode,
                hash_file,
                wordlist,
            } => vec![
                "-m".to_string(),
                hash_type.to_string(),
                "-a".to_string(),
                attack_mode.to_string(),
                hash_file.clone(),
                wordlist.clone(),
                "--potfile-disable".to_string(),
                "-o".to_string(),
                result_arg,
            ],
            TaskKind::BruteForce {
                hash_type,
                charset,
                min_len,
                max_len,
                hash_file,
            } => {
                // mask attack with a single custom charset
                let mask = "?1".repeat(*max_len as usize);
                vec![
                    "-m".to_string(),
                    hash_type.to_string(),
                    "-a".to_string(),
                    "3".to_string(),
                    "-1".to_string(),
                    charset.clone(),
                    hash_file.clone(),
                    mask,
                    "--increment".to_string(),
                    "--increment-min".to_string(),
                    min_len.to_string(),
                    "--increment-max".to_string(),
                    max_len.to_string(),
                    "--potfile-disable".to_string(),
                    "-o".to_string(),
                    result_arg,
                ]
            }
        };

        WorkerSpec {
            program: config.cracker_program.clone(),
            args,
            result_path: Some(result_path),
        }
    }
}

/// Handle to a launched worker process. Owned exclusively by the
/// supervisor's caller; consumed by `stop` or `watch`.
pub struct WorkerHandle {
    child: Child,
    program: String,
    result_path: Option<PathBuf>,
}

impl WorkerHandle {
    /// OS pid, if the process has not been reaped yet.
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Whether the process is still alive.
    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }
}

/// How a stop concluded.
#[derive(Debug)]
pub enum StopOutcome {
    /// The process exited within the grace period, voluntarily or in
    /// response to the termination request.
    Exited(ExitStatus),
    /// The grace period lapsed and the process was killed.
    Killed,
}

/// Stateless supervisor over external worker processes.
pub struct WorkerSupervisor;

impl WorkerSupervisor {
    /// Launches the worker described by `spec`.
    ///
    /// The child is spawned with nulled stdio and `kill_on_drop`, so a
    /// dropped handle cannot leak a running process past shutdown.
    pub fn start(spec: &WorkerSpec) -> Result<WorkerHandle, LaunchError> {
        if let Some(parent) = spec.result_path.as_ref().and_then(|p| p.parent()) {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!("could not create work dir {}: {}", parent.display(), e);
            }
        }

        let child = Command::new(&spec.program)
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| LaunchError::Spawn {
                program: spec.program.clone(),
                source,
            })?;

        info!("started worker {} (pid {:?})", spec.program, child.id());
        Ok(WorkerHandle {
            child,
            program: spec.program.clone(),
            result_path: spec.result_path.clone(),
        })
    }

    /// Stops the worker: asks it to terminate, waits up to `grace` for
    /// the exit, then kills and reaps it. The process is guaranteed
    /// non-running on return.
    pub async fn stop(mut handle: WorkerHandle, grace: Duration) -> StopOutcome {
        let outcome = shutdown_child(&mut handle.child, grace).await;
        match &outcome {
            StopOutcome::Exited(status) => {
                info!("worker {} exited during grace: {}", handle.program, status)
            }
            StopOutcome::Killed => warn!("worker {} killed after {:?} grace", handle.program, grace),
        }
        outcome
    }

    /// Observes the worker until it terminates.
    ///
    /// Emits [`ProgressEvent::running`] for `task_id` every `cadence`
    /// while the process is alive, then exactly one terminal event:
    /// `completed` when the process exits zero and its declared result
    /// file exists, `failed` otherwise. Triggering `cancel` stops the
    /// process (termination request, grace, then kill) and yields a
    /// `failed` terminal.
    ///
    /// Consumes the handle: the stream is finite and not restartable.
    pub fn watch(
        handle: WorkerHandle,
        task_id: u64,
        cadence: Duration,
        grace: Duration,
        cancel: Arc<Shutdown>,
    ) -> mpsc::Receiver<ProgressEvent> {
        let (tx, rx) = mpsc::channel(16);
        let WorkerHandle {
            mut child,
            program,
            result_path,
        } = handle;

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.wait() => {
                        shutdown_child(&mut child, grace).await;
                        let _ = tx.send(ProgressEvent::failed(task_id)).await;
                        break;
                    }
                    status = child.wait() => {
                        let event = match (&status, &result_path) {
                            (Ok(st), Some(path)) if st.success() && path.exists() => {
                                ProgressEvent::completed(task_id, path.clone())
                            }
                            (Ok(st), _) => {
                                warn!(
                                    "worker {} for task {} ended without usable results: {}",
                                    program, task_id, st
                                );
                                ProgressEvent::failed(task_id)
                            }
                            (Err(e), _) => {
                                warn!("wait on worker {} failed: {}", program, e);
                                ProgressEvent::failed(task_id)
                            }
                        };
                        let _ = tx.send(event).await;
                        break;
                    }
                    _ = sleep(cadence) => {
                        if tx.send(ProgressEvent::running(task_id)).await.is_err() {
                            // receiver gone: nobody can see a terminal
                            // event, just make sure the worker dies
                            shutdown_child(&mut child, grace).await;
                            break;
                        }
                    }
                }
            }
        });

        rx
    }
}

/// Requests termination (SIGTERM on unix), waits up to `grace` for the
/// exit, then force-kills and reaps.
async fn shutdown_child(child: &mut Child, grace: Duration) -> StopOutcome {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        // best effort; a pid that is already gone needs nothing more
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        }
    }

    match timeout(grace, child.wait()).await {
        Ok(Ok(status)) => StopOutcome::Exited(status),
        Ok(Err(_)) | Err(_) => {
            let _ = child.kill().await;
            let _ = child.wait().await;
            StopOutcome::Killed
        }
    }
}

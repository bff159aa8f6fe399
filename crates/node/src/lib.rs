//! # HNH Node Controller
//!
//! Client agent for the HNH compute network. The node mines by default
//! and preempts mining when the coordinator offers a security task whose
//! reward clears the configured threshold; the external worker process
//! for the active mode is supervised, its progress reported back, and on
//! completion the node falls back to mining.
//!
//! ```text
//!   poll ──► ModeController ──► WorkerSupervisor ──► worker process
//!                │                    │
//!                ▼                    ▼
//!            NodeState ◄──── ResultReporter ──► coordinator
//! ```
//!
//! ## Modules
//! - `task_source`: coordinator polling and qualifying-task selection
//! - `controller`: the Mining/Security state machine and control loop
//! - `supervisor`: external worker launch, watch, and confirmed stop
//! - `reporter`: progress/result delivery with bounded backoff
//! - `retry`: the backoff primitive
//! - `earnings`: day-scoped earnings display aggregate
//! - `state`: shared observability snapshot + shutdown signal
//! - `handlers`: HTTP status surface and admin channel
//! - `mock`: scripted implementations of the coordinator seams

pub mod controller;
pub mod earnings;
pub mod handlers;
pub mod mock;
pub mod reporter;
pub mod retry;
pub mod state;
pub mod supervisor;
pub mod task_source;

pub use controller::{AdminCommand, ModeController};
pub use handlers::AppState;
pub use reporter::{HttpReportSink, ReportError, ReportSink, ResultReporter, TaskReport};
pub use retry::{RetryConfig, RetryResult};
pub use state::{Mode, ModeSnapshot, NodeState, Shutdown};
pub use supervisor::{LaunchError, StopOutcome, WorkerHandle, WorkerSpec, WorkerSupervisor};
pub use task_source::{HttpTaskFeed, PollError, TaskFeed};

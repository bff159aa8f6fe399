//! # HNH Common Crate
//!
//! Shared types for the HNH node controller.
//!
//! ## Modules
//! - `config`: node configuration (TOML, never-fail loading)
//! - `task`: coordinator task model and progress events
//!
//! These types cross the seams between the mode controller, the worker
//! supervisor, and the result reporter. They are all owned/immutable
//! values, so no component ever shares a mutable reference with another.

pub mod config;
pub mod task;

pub use config::NodeConfig;
pub use task::{ProgressEvent, Task, TaskKind, TaskStatus};

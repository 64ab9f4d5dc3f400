//! Structured cancellation for stage workers.
//!
//! This module provides:
//! - CancellationToken for cooperative cancellation
//! - WorkerGroup for spawning workers and shutting them down together

mod task_group;
mod token;

pub use task_group::{WorkerGroup, WorkerScope};
pub use token::CancellationToken;

//! Pipeline validation and execution.
//!
//! This module provides:
//! - The ordered stage table and the declared transition graph
//! - Pre-run validation of the declared graph
//! - The queue-per-stage runtime and its transition counts
//! - Queue configuration (declared, not yet enforced)

mod config;
mod counter;
mod declared;
mod queue;
mod table;
mod tree;
mod validate;
mod worker;

pub use config::{Limiter, PipelineConfig, QueueConfig, QueueOverrides};
pub use counter::TransitionCounts;
pub use declared::DeclaredGraph;
pub use table::{SharedHandler, StageTable};
pub use tree::PipeTree;
pub use validate::{StageEnumerationMismatch, ValidationReport, ValidationWarning};

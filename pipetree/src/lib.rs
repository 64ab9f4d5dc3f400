//! # Pipetree
//!
//! Pipelines work items through a DAG of stage queues.
//!
//! Each stage owns one queue and one worker. A worker takes an item, runs the
//! stage's handler, and either forwards the result to another stage's queue or
//! ends the item's journey. Pipetree provides:
//!
//! - **Graph checks**: a small multigraph library for degrees, sources and
//!   sinks, and cycle search, used to validate a declared stage graph
//! - **Execution**: one tokio task per stage, fed in order and shut down once
//!   every queue has drained
//! - **Accounting**: per-edge transition counts for every run
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use pipetree::prelude::*;
//!
//! let table = StageTable::new()
//!     .with_fn(Stage::Parse, |line| Step::Next(Stage::Store, line))
//!     .with_fn(Stage::Store, |_| Step::Terminal);
//! let declared = DeclaredGraph::new()
//!     .edge(Stage::Parse, Stage::Store)
//!     .terminal(Stage::Store);
//!
//! let tree = PipeTree::new(table);
//! tree.validate(&declared)?;
//! let counts = tree.run_with_defaults(lines).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod errors;
pub mod graph;
pub mod pipeline;
pub mod stages;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::{CancellationToken, WorkerGroup, WorkerScope};
    pub use crate::errors::{
        ContractErrorInfo, ContractSuggestions, CycleDetectedError, GraphShapeError,
        PipetreeError,
    };
    pub use crate::graph::{CycleEdge, Degree, GraphError, Minigraph, SourceSink};
    pub use crate::pipeline::{
        DeclaredGraph, Limiter, PipeTree, PipelineConfig, QueueConfig, QueueOverrides,
        StageTable, TransitionCounts, ValidationReport, ValidationWarning,
    };
    pub use crate::stages::{
        AsyncFnHandler, FnHandler, StageHandler, StageLabel, Step, Target,
    };
}

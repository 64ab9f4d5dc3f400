//! Testing utilities for pipetree pipelines.
//!
//! This module provides:
//! - The modular-arithmetic tree fixture (stages, handlers, declared graph)
//! - Recording and failing mock handlers
//! - A tracing subscriber for test output

mod fixtures;
mod mocks;

pub use fixtures::{tree_graph, tree_table, ShortStage, TreeStage};
pub use mocks::{FailingHandler, RecordingHandler};

use tracing_subscriber::EnvFilter;

/// Installs a test-friendly tracing subscriber.
///
/// Honours `RUST_LOG` and defaults to `warn`. Safe to call from every test;
/// only the first call installs anything.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

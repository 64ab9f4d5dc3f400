//! Error types for pipetree.
//!
//! Everything fatal surfaces as a [`PipetreeError`]. Graph-shape and cycle
//! failures carry a [`ContractErrorInfo`] with a stable code so callers can
//! branch on the failure without parsing messages.

use crate::graph::GraphError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Display;
use thiserror::Error;

/// The main error type for pipetree operations.
#[derive(Debug, Error)]
pub enum PipetreeError {
    /// The declared graph does not have exactly one source matching the entry stage.
    #[error("{0}")]
    GraphShape(#[from] GraphShapeError),

    /// The declared graph contains one or more cycles.
    #[error("{0}")]
    Cycle(#[from] CycleDetectedError),

    /// The cycle search tripped its step guard.
    ///
    /// This is an internal consistency failure, not a cycle report.
    #[error("Cycle search exceeded its step budget of {budget}")]
    TraversalBudgetExceeded {
        /// The budget that was exhausted.
        budget: usize,
    },

    /// A queue override asked for behaviour that does not exist yet.
    #[error("Queue setting '{feature}' for stage '{stage}' is not implemented")]
    UnimplementedFeature {
        /// The stage the override was given for.
        stage: String,
        /// The first non-default setting found.
        feature: String,
    },

    /// A route points at a stage that has no handler (and therefore no queue).
    #[error("Stage '{stage}' routes to '{target}', which has no handler")]
    HandlerResultShape {
        /// The routing stage.
        stage: String,
        /// The unknown destination.
        target: String,
    },

    /// A stage handler returned an error or panicked.
    #[error("Handler for stage '{stage}' failed: {source}")]
    Handler {
        /// The failing stage.
        stage: String,
        /// The handler's error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    /// Workers were still running when the shutdown timeout elapsed.
    #[error("Workers did not stop within the shutdown timeout: {}", stages.join(", "))]
    ShutdownTimeout {
        /// Stages whose workers had to be aborted.
        stages: Vec<String>,
    },

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipetreeError {
    /// Wraps a handler failure for `stage`.
    pub fn handler(stage: impl Display, source: anyhow::Error) -> Self {
        Self::Handler {
            stage: stage.to_string(),
            source: source.into(),
        }
    }

    /// Builds a routing error for `stage` pointing at `target`.
    pub fn result_shape(stage: impl Display, target: impl Display) -> Self {
        Self::HandlerResultShape {
            stage: stage.to_string(),
            target: target.to_string(),
        }
    }

    /// Returns the contract code for this error, if it has one.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::GraphShape(err) => Some(err.error_info.code.as_str()),
            Self::Cycle(err) => Some(err.error_info.code.as_str()),
            Self::UnimplementedFeature { .. } => Some(codes::QUEUE_UNIMPLEMENTED),
            _ => None,
        }
    }

    /// Returns the hint for fixing this error, if it has a contract code.
    #[must_use]
    pub fn fix_hint(&self) -> Option<&str> {
        match self {
            Self::GraphShape(err) => err.error_info.fix_hint.as_deref(),
            Self::Cycle(err) => err.error_info.fix_hint.as_deref(),
            Self::UnimplementedFeature { .. } => ContractSuggestions::get(codes::QUEUE_UNIMPLEMENTED),
            _ => None,
        }
    }
}

impl From<GraphError> for PipetreeError {
    fn from(err: GraphError) -> Self {
        match err {
            GraphError::NoSources => Self::GraphShape(GraphShapeError::source_count(Vec::new())),
            GraphError::TraversalBudgetExceeded { budget } => {
                Self::TraversalBudgetExceeded { budget }
            }
        }
    }
}

/// Stable contract codes.
pub mod codes {
    /// Wrong number of sources.
    pub const GRAPH_SOURCES: &str = "PIPETREE-GRAPH-SOURCES";
    /// The single source is not the entry stage.
    pub const GRAPH_ENTRY: &str = "PIPETREE-GRAPH-ENTRY";
    /// The graph has a cycle.
    pub const GRAPH_CYCLE: &str = "PIPETREE-GRAPH-CYCLE";
    /// A queue override was supplied.
    pub const QUEUE_UNIMPLEMENTED: &str = "PIPETREE-QUEUE-UNIMPLEMENTED";
}

/// Metadata about a contract error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "PIPETREE-GRAPH-CYCLE").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Sets the fix hint to the stock suggestion for this error's code.
    ///
    /// Leaves the hint untouched when the code has no suggestion.
    #[must_use]
    pub fn with_suggested_fix(mut self) -> Self {
        if let Some(hint) = ContractSuggestions::get(&self.code) {
            self.fix_hint = Some(hint.to_string());
        }
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("code".to_string(), serde_json::json!(self.code));
        map.insert("summary".to_string(), serde_json::json!(self.summary));

        if let Some(ref hint) = self.fix_hint {
            map.insert("fix_hint".to_string(), serde_json::json!(hint));
        }
        if !self.context.is_empty() {
            map.insert("context".to_string(), serde_json::json!(self.context));
        }

        map
    }
}

/// Error raised when the declared graph's sources are wrong.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct GraphShapeError {
    /// The error message.
    pub message: String,
    /// The sources that were found.
    pub sources: Vec<String>,
    /// Contract error info.
    pub error_info: ContractErrorInfo,
}

impl GraphShapeError {
    /// The stage table is empty, so there is no entry stage.
    #[must_use]
    pub fn no_entry() -> Self {
        Self {
            message: "Stage table is empty; there is no entry stage".to_string(),
            sources: Vec::new(),
            error_info: ContractErrorInfo::new(codes::GRAPH_ENTRY, "No entry stage")
                .with_suggested_fix(),
        }
    }

    /// The graph has zero or several sources.
    #[must_use]
    pub fn source_count(sources: Vec<String>) -> Self {
        let info = ContractErrorInfo::new(
            codes::GRAPH_SOURCES,
            format!("Want exactly one source, got {}", sources.len()),
        )
        .with_suggested_fix()
        .with_context_entry("sources", sources.join(", "));

        Self {
            message: format!(
                "Want exactly one source, got {} ({})",
                sources.len(),
                sources.join(", ")
            ),
            sources,
            error_info: info,
        }
    }

    /// The single source is not the first stage in the table.
    #[must_use]
    pub fn entry_mismatch(source: impl Into<String>, entry: impl Into<String>) -> Self {
        let source = source.into();
        let entry = entry.into();
        let info = ContractErrorInfo::new(
            codes::GRAPH_ENTRY,
            format!("Graph source '{source}' is not the entry stage '{entry}'"),
        )
        .with_suggested_fix()
        .with_context_entry("source", source.clone())
        .with_context_entry("entry", entry.clone());

        Self {
            message: format!("Graph source '{source}' does not match entry stage '{entry}'"),
            sources: vec![source],
            error_info: info,
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("message".to_string(), serde_json::json!(self.message));
        map.insert("sources".to_string(), serde_json::json!(self.sources));
        map.insert("error_info".to_string(), serde_json::json!(self.error_info.to_dict()));
        map
    }
}

/// Error raised when the declared graph has cycles.
#[derive(Debug, Clone, Error)]
#[error("Cycle detected in stage graph: {}", format_edges(cycle_edges))]
pub struct CycleDetectedError {
    /// Every back-edge found, as `(from, to)`.
    pub cycle_edges: Vec<(String, String)>,
    /// Contract error info.
    pub error_info: ContractErrorInfo,
}

impl CycleDetectedError {
    /// Creates a new cycle detected error.
    #[must_use]
    pub fn new(cycle_edges: Vec<(String, String)>) -> Self {
        let info = ContractErrorInfo::new(
            codes::GRAPH_CYCLE,
            format!("Stage graph contains cycles: {}", format_edges(&cycle_edges)),
        )
        .with_suggested_fix();

        Self {
            cycle_edges,
            error_info: info,
        }
    }
}

fn format_edges(edges: &[(String, String)]) -> String {
    edges
        .iter()
        .map(|(from, to)| format!("{from} -> {to}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Provides default suggestions for contract error codes.
pub struct ContractSuggestions;

impl ContractSuggestions {
    /// Gets a suggestion for a given error code.
    #[must_use]
    pub fn get(code: &str) -> Option<&'static str> {
        match code {
            codes::GRAPH_SOURCES => Some(
                "A stage graph needs one entry point. Stages nothing routes to are extra \
                 sources; connect them or drop their handlers.",
            ),
            codes::GRAPH_ENTRY => Some(
                "The entry stage is the first handler inserted into the stage table. \
                 Add at least one handler, and insert the graph's source first.",
            ),
            codes::GRAPH_CYCLE => Some(
                "Stages may converge but never loop back. Route the back-edge forward \
                 or to a terminal step.",
            ),
            codes::QUEUE_UNIMPLEMENTED => Some(
                "Concurrency, capacity and rate limits are not enforced yet. \
                 Drop the queue overrides to run.",
            ),
            _ => None,
        }
    }
}

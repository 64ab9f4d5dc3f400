//! Pre-run checks on a declared stage graph.

use super::{DeclaredGraph, StageTable};
use crate::errors::{CycleDetectedError, GraphShapeError, PipetreeError};
use crate::stages::{StageLabel, Target};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// The stage enumeration and the stage table disagree in size.
///
/// Never returned as an error; see [`ValidationReport::warnings`].
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error(
    "Stage enumeration has {declared} members but the table handles {handled} (unhandled: {})",
    unhandled.join(", ")
)]
pub struct StageEnumerationMismatch {
    /// Members of the enumeration.
    pub declared: usize,
    /// Stages with a handler.
    pub handled: usize,
    /// Members without a handler, in declaration order.
    pub unhandled: Vec<String>,
}

/// A non-fatal finding from validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationWarning {
    /// See [`StageEnumerationMismatch`].
    StageEnumerationMismatch(StageEnumerationMismatch),
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StageEnumerationMismatch(mismatch) => mismatch.fmt(f),
        }
    }
}

/// Outcome of a successful validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport<S> {
    /// The graph's single source, which is also the table's entry stage.
    pub entry: S,
    /// Where items leave the graph.
    pub sinks: Vec<Target<S>>,
    /// Number of declared transitions.
    pub edge_count: usize,
    /// Non-fatal findings.
    pub warnings: Vec<ValidationWarning>,
}

impl<S> ValidationReport<S> {
    /// Returns true if validation found nothing worth mentioning.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

pub(crate) fn validate<S, T>(
    table: &StageTable<S, T>,
    declared: &DeclaredGraph<S>,
) -> Result<ValidationReport<S>, PipetreeError>
where
    S: StageLabel,
    T: Send + 'static,
{
    let entry = table.entry().ok_or_else(GraphShapeError::no_entry)?;

    // A route into a stage without a handler would have no queue to land on.
    for (from, to) in declared.edges() {
        if let Target::Stage(next) = to {
            if !table.contains(*next) {
                return Err(PipetreeError::result_shape(from, next));
            }
        }
    }

    let graph = declared.to_minigraph();
    let degrees = graph.degrees();
    let source_sink = graph.source_sink(Some(&degrees));

    match source_sink.sources.as_slice() {
        [Target::Stage(source)] if *source == entry => {}
        [single] => {
            return Err(GraphShapeError::entry_mismatch(single.to_string(), entry.to_string()).into())
        }
        sources => {
            let names = sources.iter().map(ToString::to_string).collect();
            return Err(GraphShapeError::source_count(names).into());
        }
    }

    let cycles = graph.cycles(Some(&source_sink), Some(&degrees))?;
    if !cycles.is_empty() {
        let edges = cycles
            .into_iter()
            .map(|edge| (edge.from.to_string(), edge.to.to_string()))
            .collect();
        return Err(CycleDetectedError::new(edges).into());
    }

    let mut warnings = Vec::new();
    let declared_stages = S::all();
    if declared_stages.len() != table.len() {
        let mismatch = StageEnumerationMismatch {
            declared: declared_stages.len(),
            handled: table.len(),
            unhandled: declared_stages
                .iter()
                .filter(|stage| !table.contains(**stage))
                .map(ToString::to_string)
                .collect(),
        };
        warn!(
            declared = mismatch.declared,
            handled = mismatch.handled,
            unhandled = ?mismatch.unhandled,
            "Stage enumeration does not match the stage table"
        );
        warnings.push(ValidationWarning::StageEnumerationMismatch(mismatch));
    }

    debug!(%entry, edges = declared.len(), "Stage graph validated");

    Ok(ValidationReport {
        entry,
        sinks: source_sink.sinks,
        edge_count: declared.len(),
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::codes;
    use crate::stages::Step;
    use crate::testing::{tree_graph, tree_table, TreeStage};

    #[test]
    fn test_tree_validates_with_mismatch_warning() {
        let report = validate(&tree_table(), &tree_graph()).unwrap();

        assert_eq!(report.entry, TreeStage::Start);
        assert_eq!(report.sinks, vec![Target::Terminal]);
        assert_eq!(report.edge_count, 7);
        assert!(!report.is_clean());
        assert_eq!(
            report.warnings,
            vec![ValidationWarning::StageEnumerationMismatch(StageEnumerationMismatch {
                declared: 6,
                handled: 5,
                unhandled: vec!["cached".to_string()],
            })]
        );
    }

    #[test]
    fn test_route_to_unhandled_stage() {
        let graph = tree_graph().edge(TreeStage::Apply, TreeStage::Cached);
        let err = validate(&tree_table(), &graph).unwrap_err();

        assert!(matches!(
            err,
            PipetreeError::HandlerResultShape { ref stage, ref target }
                if stage == "apply" && target == "cached"
        ));
    }

    #[test]
    fn test_source_must_be_entry() {
        let table = tree_table().with_fn(TreeStage::Cached, |x| Step::Next(TreeStage::Start, x));
        let graph = tree_graph().edge(TreeStage::Cached, TreeStage::Start);

        // Cached is now the only source, but Start was inserted first.
        let err = validate(&table, &graph).unwrap_err();
        assert_eq!(err.code(), Some(codes::GRAPH_ENTRY));
    }

    #[test]
    fn test_two_sources() {
        let table = tree_table().with_fn(TreeStage::Cached, |x| Step::Next(TreeStage::Apply, x));
        let graph = tree_graph().edge(TreeStage::Cached, TreeStage::Apply);

        match validate(&table, &graph).unwrap_err() {
            PipetreeError::GraphShape(err) => {
                assert_eq!(err.sources, vec!["start", "cached"]);
                assert_eq!(err.error_info.code, codes::GRAPH_SOURCES);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_graph_has_no_sources() {
        let err = validate(&tree_table(), &DeclaredGraph::new()).unwrap_err();
        assert_eq!(err.code(), Some(codes::GRAPH_SOURCES));
    }

    #[test]
    fn test_empty_table() {
        let table: StageTable<TreeStage, u64> = StageTable::new();
        let err = validate(&table, &tree_graph()).unwrap_err();
        assert_eq!(err.code(), Some(codes::GRAPH_ENTRY));
    }

    #[test]
    fn test_cycle_reports_back_edge() {
        let graph = tree_graph().edge(TreeStage::Insert, TreeStage::Lookup);

        match validate(&tree_table(), &graph).unwrap_err() {
            PipetreeError::Cycle(err) => {
                assert_eq!(err.cycle_edges, vec![("insert".to_string(), "lookup".to_string())]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_warning_serializes_with_kind() {
        let warning = ValidationWarning::StageEnumerationMismatch(StageEnumerationMismatch {
            declared: 3,
            handled: 2,
            unhandled: vec!["c".to_string()],
        });
        let json = serde_json::to_value(&warning).unwrap();

        assert_eq!(json["kind"], "stage_enumeration_mismatch");
        assert_eq!(json["unhandled"], serde_json::json!(["c"]));
        assert_eq!(
            warning.to_string(),
            "Stage enumeration has 3 members but the table handles 2 (unhandled: c)"
        );
    }
}

//! The declared stage-transition graph.

use crate::graph::Minigraph;
use crate::stages::{StageLabel, Target};
use serde::{Deserialize, Serialize};

/// Every `(stage, next)` transition the handlers can make.
///
/// Produced upstream (by whatever inspects the handlers) and checked by
/// [`PipeTree::validate`](super::PipeTree::validate) before a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredGraph<S> {
    edges: Vec<(S, Target<S>)>,
}

impl<S> Default for DeclaredGraph<S> {
    fn default() -> Self {
        Self { edges: Vec::new() }
    }
}

impl<S: StageLabel> DeclaredGraph<S> {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares that `from` may forward to `to`.
    #[must_use]
    pub fn edge(mut self, from: S, to: S) -> Self {
        self.push(from, Target::Stage(to));
        self
    }

    /// Declares that `from` may end an item's journey.
    #[must_use]
    pub fn terminal(mut self, from: S) -> Self {
        self.push(from, Target::Terminal);
        self
    }

    /// Appends one transition.
    pub fn push(&mut self, from: S, to: Target<S>) {
        self.edges.push((from, to));
    }

    /// Returns the transitions in declaration order.
    #[must_use]
    pub fn edges(&self) -> &[(S, Target<S>)] {
        &self.edges
    }

    /// Returns the number of transitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// Returns true if nothing was declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Builds the multigraph the validator analyses.
    ///
    /// The terminal marker becomes an ordinary sink node.
    #[must_use]
    pub fn to_minigraph(&self) -> Minigraph<Target<S>> {
        Minigraph::new(self.edges.iter().map(|(from, to)| (Target::Stage(*from), *to)))
    }
}

impl<S: StageLabel> FromIterator<(S, Target<S>)> for DeclaredGraph<S> {
    fn from_iter<I: IntoIterator<Item = (S, Target<S>)>>(iter: I) -> Self {
        Self {
            edges: iter.into_iter().collect(),
        }
    }
}

impl<S: StageLabel> From<Vec<(S, Target<S>)>> for DeclaredGraph<S> {
    fn from(edges: Vec<(S, Target<S>)>) -> Self {
        Self { edges }
    }
}

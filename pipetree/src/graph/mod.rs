//! A miniature directed multigraph.
//!
//! Just enough graph to sanity-check a stage graph before running it:
//! degrees, sources and sinks, cycle search from the sources, and a dot-style
//! dump for diagnostics. Nodes are classified by key; the first node seen for
//! a key is kept as its representative.

mod cycles;

pub use cycles::CycleEdge;

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt::{Display, Write as _};
use std::hash::Hash;
use thiserror::Error;

/// In/out edge counts for one node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Degree<N> {
    /// The representative node for this key.
    pub node: N,
    /// Number of edges pointing at the node.
    pub inbound: usize,
    /// Number of edges leaving the node.
    pub outbound: usize,
}

impl<N> Degree<N> {
    /// Creates a new degree record.
    #[must_use]
    pub const fn new(node: N, inbound: usize, outbound: usize) -> Self {
        Self {
            node,
            inbound,
            outbound,
        }
    }

    /// Returns true if no edge touches the node.
    #[must_use]
    pub const fn is_isolated(&self) -> bool {
        self.inbound == 0 && self.outbound == 0
    }
}

/// Nodes nothing points into (sources) and nodes that point nowhere (sinks).
///
/// Isolated nodes are in neither list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSink<N> {
    /// Nodes with no inbound edges.
    pub sources: Vec<N>,
    /// Nodes with no outbound edges.
    pub sinks: Vec<N>,
}

impl<N> Default for SourceSink<N> {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            sinks: Vec::new(),
        }
    }
}

/// Errors from graph analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GraphError {
    /// Cycle search starts from the sources, and there are none.
    #[error("Cycle search needs at least one source; the graph has none")]
    NoSources,

    /// The traversal took more steps than the graph has edges.
    #[error("Cycle search exceeded its step budget of {budget}")]
    TraversalBudgetExceeded {
        /// The budget that was exhausted.
        budget: usize,
    },
}

/// A directed multigraph stored as an edge list.
///
/// Parallel edges and self-loops are allowed. `node_to_key` projects each node
/// onto the key used for classification; [`Minigraph::new`] uses the node
/// itself.
#[derive(Debug, Clone)]
pub struct Minigraph<N, K = N> {
    edges: Vec<(N, N)>,
    node_to_key: fn(&N) -> K,
}

impl<N: Clone> Minigraph<N, N> {
    /// Creates a graph keyed by the nodes themselves.
    #[must_use]
    pub fn new(edges: impl IntoIterator<Item = (N, N)>) -> Self {
        Self::with_key(edges, N::clone)
    }
}

impl<N, K> Minigraph<N, K> {
    /// Creates a graph whose nodes are classified by `node_to_key`.
    #[must_use]
    pub fn with_key(edges: impl IntoIterator<Item = (N, N)>, node_to_key: fn(&N) -> K) -> Self {
        Self {
            edges: edges.into_iter().collect(),
            node_to_key,
        }
    }

    /// Returns the edges in insertion order.
    #[must_use]
    pub fn edges(&self) -> &[(N, N)] {
        &self.edges
    }

    /// Returns the number of edges, counting parallel edges individually.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Returns true if the graph has no edges.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Returns the key for a node.
    pub fn key(&self, node: &N) -> K {
        (self.node_to_key)(node)
    }
}

impl<N, K> Minigraph<N, K>
where
    N: Clone,
    K: Clone + Eq + Hash,
{
    /// Computes in/out degrees for every node that appears on an edge.
    ///
    /// Records come out in order of each key's first appearance.
    #[must_use]
    pub fn degrees(&self) -> Vec<Degree<N>> {
        let mut slots: HashMap<K, usize> = HashMap::new();
        let mut degrees: Vec<Degree<N>> = Vec::new();

        for (from, to) in &self.edges {
            let from_slot = self.slot(&mut slots, &mut degrees, from);
            degrees[from_slot].outbound += 1;
            let to_slot = self.slot(&mut slots, &mut degrees, to);
            degrees[to_slot].inbound += 1;
        }

        degrees
    }

    fn slot(&self, slots: &mut HashMap<K, usize>, degrees: &mut Vec<Degree<N>>, node: &N) -> usize {
        *slots.entry(self.key(node)).or_insert_with(|| {
            degrees.push(Degree::new(node.clone(), 0, 0));
            degrees.len() - 1
        })
    }

    /// Maps each key to the keys one edge away, in edge order.
    ///
    /// Parallel edges show up as repeated destinations.
    #[must_use]
    pub fn outlinks(&self) -> HashMap<K, Vec<K>> {
        let mut outlinks: HashMap<K, Vec<K>> = HashMap::new();
        for (from, to) in &self.edges {
            outlinks.entry(self.key(from)).or_default().push(self.key(to));
        }
        outlinks
    }

    /// Splits nodes into sources and sinks.
    ///
    /// Pass previously computed `degrees` to skip recomputing them.
    #[must_use]
    pub fn source_sink(&self, degrees: Option<&[Degree<N>]>) -> SourceSink<N> {
        let computed;
        let degrees = if let Some(degrees) = degrees {
            degrees
        } else {
            computed = self.degrees();
            &computed
        };

        let mut ret = SourceSink::default();
        for degree in degrees {
            if degree.is_isolated() {
                continue;
            }
            if degree.inbound == 0 {
                ret.sources.push(degree.node.clone());
            }
            if degree.outbound == 0 {
                ret.sinks.push(degree.node.clone());
            }
        }
        ret
    }

    /// Finds every back-edge reachable from the sources.
    ///
    /// An edge into a node still on the current descent path is a cycle; an
    /// edge into a node that was already fully explored is a convergence and
    /// is skipped. Each source's traversal may take at most `edge_count() + 1`
    /// steps.
    ///
    /// # Errors
    ///
    /// [`GraphError::NoSources`] if there is nowhere to start, and
    /// [`GraphError::TraversalBudgetExceeded`] if the step guard trips.
    pub fn cycles(
        &self,
        source_sink: Option<&SourceSink<N>>,
        degrees: Option<&[Degree<N>]>,
    ) -> Result<Vec<CycleEdge<K>>, GraphError> {
        let computed;
        let source_sink = if let Some(source_sink) = source_sink {
            source_sink
        } else {
            computed = self.source_sink(degrees);
            &computed
        };

        if source_sink.sources.is_empty() {
            return Err(GraphError::NoSources);
        }

        let links = self.outlinks();
        let budget = self.edges.len() + 1;
        let mut explored = HashSet::new();
        let mut found = Vec::new();

        for source in &source_sink.sources {
            cycles::walk_outlinks(self.key(source), &links, &mut explored, budget, &mut found)?;
        }

        Ok(found)
    }
}

impl<N, K: Display> Minigraph<N, K> {
    /// Renders the edges in graphviz dot syntax.
    ///
    /// Keys are written with `Display` and are not escaped, so keys with
    /// spaces or quotes produce invalid dot.
    #[must_use]
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph {\n");
        for (from, to) in &self.edges {
            let _ = writeln!(out, "  {} -> {}", self.key(from), self.key(to));
        }
        out.push('}');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn single() -> Minigraph<&'static str> {
        Minigraph::new([("x", "y")])
    }

    fn cyclic() -> Minigraph<&'static str> {
        Minigraph::new([("a", "b"), ("b", "c"), ("c", "d"), ("c", "b")])
    }

    fn converge() -> Minigraph<&'static str> {
        Minigraph::new([("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")])
    }

    fn edge(from: &'static str, to: &'static str) -> CycleEdge<&'static str> {
        CycleEdge::new(from, to)
    }

    #[test]
    fn test_degree() {
        let mg = single();
        let degrees: HashSet<_> = mg.degrees().into_iter().collect();

        assert_eq!(
            degrees,
            HashSet::from([Degree::new("x", 0, 1), Degree::new("y", 1, 0)])
        );
        assert_eq!(
            mg.source_sink(None),
            SourceSink {
                sources: vec!["x"],
                sinks: vec!["y"],
            }
        );
    }

    #[test]
    fn test_degree_counts_parallel_edges() {
        let mg = Minigraph::new([("a", "b"), ("a", "b"), ("b", "b")]);

        assert_eq!(
            mg.degrees(),
            vec![Degree::new("a", 0, 2), Degree::new("b", 3, 1)]
        );
    }

    #[test]
    fn test_source_sink_skips_isolated() {
        let mg = single();
        let degrees = vec![
            Degree::new("x", 0, 1),
            Degree::new("y", 1, 0),
            Degree::new("z", 0, 0),
        ];

        let ss = mg.source_sink(Some(&degrees));
        assert_eq!(ss.sources, vec!["x"]);
        assert_eq!(ss.sinks, vec!["y"]);
    }

    #[test]
    fn test_outlinks() {
        assert_eq!(single().outlinks(), HashMap::from([("x", vec!["y"])]));

        let parallel = Minigraph::new([("a", "b"), ("a", "c"), ("a", "b")]);
        assert_eq!(parallel.outlinks()["a"], vec!["b", "c", "b"]);
    }

    #[test]
    fn test_cycles() {
        assert!(single().cycles(None, None).unwrap().is_empty());
        assert_eq!(cyclic().cycles(None, None).unwrap(), vec![edge("c", "b")]);
        assert!(converge().cycles(None, None).unwrap().is_empty());
    }

    #[test]
    fn test_self_loop_reported_once() {
        let mg = Minigraph::new([("x", "y"), ("y", "y")]);
        assert_eq!(mg.cycles(None, None).unwrap(), vec![edge("y", "y")]);
    }

    #[test]
    fn test_cycles_with_precomputed_inputs() {
        let mg = cyclic();
        let degrees = mg.degrees();
        let ss = mg.source_sink(Some(&degrees));

        assert_eq!(mg.cycles(Some(&ss), None).unwrap(), vec![edge("c", "b")]);
        assert_eq!(mg.cycles(None, Some(&degrees)).unwrap(), vec![edge("c", "b")]);
    }

    #[test]
    fn test_convergence_from_two_sources() {
        let mg = Minigraph::new([("a", "c"), ("b", "c"), ("c", "d")]);
        let ss = mg.source_sink(None);

        assert_eq!(ss.sources, vec!["a", "b"]);
        assert!(mg.cycles(Some(&ss), None).unwrap().is_empty());
    }

    #[test]
    fn test_cycles_without_sources() {
        let mg = Minigraph::new([("a", "b"), ("b", "a")]);
        assert_eq!(mg.cycles(None, None), Err(GraphError::NoSources));

        let empty: Minigraph<&str> = Minigraph::new([]);
        assert_eq!(empty.cycles(None, None), Err(GraphError::NoSources));
    }

    #[test]
    fn test_keyed_graph_keeps_first_representative() {
        let mg = Minigraph::with_key(
            [((1, "first"), (2, "two")), ((1, "again"), (2, "dup"))],
            |node: &(u32, &str)| node.0,
        );

        assert_eq!(
            mg.degrees(),
            vec![Degree::new((1, "first"), 0, 2), Degree::new((2, "two"), 2, 0)]
        );
        assert_eq!(mg.outlinks()[&1], vec![2, 2]);
    }

    #[test]
    fn test_to_dot() {
        assert_eq!(single().to_dot(), "digraph {\n  x -> y\n}");
        assert!(cyclic().to_dot().contains("  c -> b\n"));
    }
}

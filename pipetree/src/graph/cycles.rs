//! Back-edge search over an outlink map.

use super::GraphError;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;

/// An edge that closes a cycle: `to` was still on the descent path when
/// `from` reached it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CycleEdge<K> {
    /// Where the back-edge starts.
    pub from: K,
    /// The ancestor it points back to.
    pub to: K,
}

impl<K> CycleEdge<K> {
    /// Creates a new cycle edge.
    #[must_use]
    pub const fn new(from: K, to: K) -> Self {
        Self { from, to }
    }
}

impl<K: fmt::Display> fmt::Display for CycleEdge<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}

/// Depth-first walk from `start`, appending every back-edge to `found`.
///
/// `explored` holds nodes whose outlinks are exhausted and is shared across
/// walks so a node reachable from several sources is searched once. The walk
/// may descend into at most `budget` nodes.
pub(crate) fn walk_outlinks<K>(
    start: K,
    links: &HashMap<K, Vec<K>>,
    explored: &mut HashSet<K>,
    budget: usize,
    found: &mut Vec<CycleEdge<K>>,
) -> Result<(), GraphError>
where
    K: Clone + Eq + Hash,
{
    if explored.contains(&start) {
        return Ok(());
    }

    let mut remaining = budget;
    let mut on_path: HashSet<K> = HashSet::new();
    // (node, index of its next outlink)
    let mut stack: Vec<(K, usize)> = Vec::new();
    descend(start, &mut stack, &mut on_path, &mut remaining, budget)?;

    loop {
        let Some(frame) = stack.last_mut() else {
            break;
        };
        let next = links.get(&frame.0).and_then(|dests| dests.get(frame.1)).cloned();

        if let Some(dest) = next {
            frame.1 += 1;
            if on_path.contains(&dest) {
                found.push(CycleEdge::new(frame.0.clone(), dest));
            } else if !explored.contains(&dest) {
                descend(dest, &mut stack, &mut on_path, &mut remaining, budget)?;
            }
        } else if let Some((done, _)) = stack.pop() {
            on_path.remove(&done);
            explored.insert(done);
        }
    }

    Ok(())
}

fn descend<K>(
    node: K,
    stack: &mut Vec<(K, usize)>,
    on_path: &mut HashSet<K>,
    remaining: &mut usize,
    budget: usize,
) -> Result<(), GraphError>
where
    K: Clone + Eq + Hash,
{
    if *remaining == 0 {
        return Err(GraphError::TraversalBudgetExceeded { budget });
    }
    *remaining -= 1;
    on_path.insert(node.clone());
    stack.push((node, 0));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn links(edges: &[(&'static str, &'static str)]) -> HashMap<&'static str, Vec<&'static str>> {
        let mut links: HashMap<_, Vec<_>> = HashMap::new();
        for (from, to) in edges {
            links.entry(*from).or_default().push(*to);
        }
        links
    }

    #[test]
    fn test_walk_reports_back_edge() {
        let links = links(&[("a", "b"), ("b", "c"), ("c", "a")]);
        let mut explored = HashSet::new();
        let mut found = Vec::new();

        walk_outlinks("a", &links, &mut explored, 4, &mut found).unwrap();

        assert_eq!(found, vec![CycleEdge::new("c", "a")]);
        assert_eq!(explored.len(), 3);
    }

    #[test]
    fn test_walk_budget_exceeded() {
        let links = links(&[("a", "b"), ("b", "c"), ("c", "d")]);
        let mut explored = HashSet::new();
        let mut found = Vec::new();

        let result = walk_outlinks("a", &links, &mut explored, 2, &mut found);

        assert_eq!(result, Err(GraphError::TraversalBudgetExceeded { budget: 2 }));
        assert!(found.is_empty());
    }

    #[test]
    fn test_walk_skips_explored_start() {
        let links = links(&[("a", "a")]);
        let mut explored = HashSet::from(["a"]);
        let mut found = Vec::new();

        walk_outlinks("a", &links, &mut explored, 2, &mut found).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn test_parallel_back_edges_each_reported() {
        let links = links(&[("a", "b"), ("b", "a"), ("b", "a")]);
        let mut explored = HashSet::new();
        let mut found = Vec::new();

        walk_outlinks("a", &links, &mut explored, 4, &mut found).unwrap();
        assert_eq!(found, vec![CycleEdge::new("b", "a"), CycleEdge::new("b", "a")]);
    }

    #[test]
    fn test_cycle_edge_display() {
        assert_eq!(CycleEdge::new("c", "b").to_string(), "c -> b");
    }
}

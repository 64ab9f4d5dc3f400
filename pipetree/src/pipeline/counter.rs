//! Per-edge transition counting.

use crate::stages::{StageLabel, Target};
use dashmap::DashMap;
use std::collections::HashMap;

/// Concurrent `(from, to)` counter shared by a run's workers.
#[derive(Debug)]
pub(crate) struct TransitionCounter<S: StageLabel> {
    counts: DashMap<(S, Target<S>), u64>,
}

impl<S: StageLabel> TransitionCounter<S> {
    pub(crate) fn new() -> Self {
        Self {
            counts: DashMap::new(),
        }
    }

    /// Counts one item moving from `from` to `to`.
    pub(crate) fn record(&self, from: S, to: Target<S>) {
        *self.counts.entry((from, to)).or_insert(0) += 1;
    }

    /// Copies the current counts out.
    pub(crate) fn snapshot(&self) -> TransitionCounts<S> {
        TransitionCounts {
            counts: self
                .counts
                .iter()
                .map(|entry| (*entry.key(), *entry.value()))
                .collect(),
        }
    }
}

/// How many items took each edge during one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionCounts<S: StageLabel> {
    counts: HashMap<(S, Target<S>), u64>,
}

impl<S: StageLabel> Default for TransitionCounts<S> {
    fn default() -> Self {
        Self {
            counts: HashMap::new(),
        }
    }
}

impl<S: StageLabel> TransitionCounts<S> {
    /// Returns the count for one edge, zero if it was never taken.
    #[must_use]
    pub fn get(&self, from: S, to: impl Into<Target<S>>) -> u64 {
        self.counts.get(&(from, to.into())).copied().unwrap_or(0)
    }

    /// Returns how many items ended their journey.
    #[must_use]
    pub fn terminal_total(&self) -> u64 {
        self.counts
            .iter()
            .filter(|((_, to), _)| to.is_terminal())
            .map(|(_, count)| count)
            .sum()
    }

    /// Returns the number of transitions of any kind.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    /// Returns the number of distinct edges taken.
    #[must_use]
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Returns true if nothing moved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Iterates over `((from, to), count)` in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&(S, Target<S>), &u64)> {
        self.counts.iter()
    }

    /// Unwraps the underlying map.
    #[must_use]
    pub fn into_inner(self) -> HashMap<(S, Target<S>), u64> {
        self.counts
    }

    /// Renders the counts as a JSON object keyed by `"from -> to"`.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let map: serde_json::Map<String, serde_json::Value> = self
            .counts
            .iter()
            .map(|((from, to), count)| (format!("{from} -> {to}"), serde_json::json!(count)))
            .collect();
        serde_json::Value::Object(map)
    }
}

impl<S: StageLabel> FromIterator<((S, Target<S>), u64)> for TransitionCounts<S> {
    fn from_iter<I: IntoIterator<Item = ((S, Target<S>), u64)>>(iter: I) -> Self {
        Self {
            counts: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TreeStage;
    use std::sync::Arc;

    #[test]
    fn test_record_and_snapshot() {
        let counter = TransitionCounter::new();
        counter.record(TreeStage::Start, TreeStage::Lookup.into());
        counter.record(TreeStage::Start, TreeStage::Lookup.into());
        counter.record(TreeStage::Apply, Target::Terminal);

        let counts = counter.snapshot();
        assert_eq!(counts.get(TreeStage::Start, TreeStage::Lookup), 2);
        assert_eq!(counts.get(TreeStage::Apply, Target::Terminal), 1);
        assert_eq!(counts.get(TreeStage::Start, TreeStage::Apply), 0);
        assert_eq!(counts.terminal_total(), 1);
        assert_eq!(counts.total(), 3);
        assert_eq!(counts.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_records_are_not_lost() {
        let counter = Arc::new(TransitionCounter::new());
        let mut handles = Vec::new();

        for _ in 0..8 {
            let counter = counter.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..500 {
                    counter.record(TreeStage::Insert, TreeStage::Apply.into());
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(counter.snapshot().get(TreeStage::Insert, TreeStage::Apply), 4000);
    }

    #[test]
    fn test_to_json() {
        let counts: TransitionCounts<TreeStage> = [
            ((TreeStage::Start, Target::Stage(TreeStage::Apply)), 3),
            ((TreeStage::Apply, Target::Terminal), 3),
        ]
        .into_iter()
        .collect();

        let json = counts.to_json();
        assert_eq!(json["start -> apply"], 3);
        assert_eq!(json["apply -> terminal"], 3);
    }

    #[test]
    fn test_empty_counts() {
        let counts = TransitionCounter::<TreeStage>::new().snapshot();
        assert!(counts.is_empty());
        assert_eq!(counts.terminal_total(), 0);
        assert!(counts.into_inner().is_empty());
    }
}

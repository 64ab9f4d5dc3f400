//! Stage fixtures for pipeline testing.

use crate::pipeline::{DeclaredGraph, StageTable};
use crate::stages::{StageLabel, Step};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stages of a small lookup-and-insert tree.
///
/// `Cached` is deliberately left without a handler in [`tree_table`], so the
/// enumeration is one larger than the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeStage {
    /// Entry stage.
    Start,
    /// Never handled.
    Cached,
    /// First lookup.
    Lookup,
    /// Fallback lookup.
    SlowLookup,
    /// Stores the item.
    Insert,
    /// Final stage.
    Apply,
}

impl fmt::Display for TreeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Start => "start",
            Self::Cached => "cached",
            Self::Lookup => "lookup",
            Self::SlowLookup => "slow_lookup",
            Self::Insert => "insert",
            Self::Apply => "apply",
        };
        f.write_str(name)
    }
}

impl StageLabel for TreeStage {
    fn all() -> &'static [Self] {
        &[
            Self::Start,
            Self::Cached,
            Self::Lookup,
            Self::SlowLookup,
            Self::Insert,
            Self::Apply,
        ]
    }
}

/// The tree's handlers, routing by modular arithmetic.
///
/// Multiples of 4 skip straight to `Apply`; of the rest, multiples of 3 go
/// to `Insert` and everything else takes the `SlowLookup` detour.
#[must_use]
pub fn tree_table() -> StageTable<TreeStage, u64> {
    StageTable::new()
        .with_fn(TreeStage::Start, |x| {
            if x % 4 == 0 {
                Step::Next(TreeStage::Apply, x)
            } else {
                Step::Next(TreeStage::Lookup, x)
            }
        })
        .with_fn(TreeStage::Lookup, |x| {
            if x % 3 == 0 {
                Step::Next(TreeStage::Insert, x)
            } else {
                Step::Next(TreeStage::SlowLookup, x)
            }
        })
        .with_fn(TreeStage::SlowLookup, |x| Step::Next(TreeStage::Insert, x))
        .with_fn(TreeStage::Insert, |x| Step::Next(TreeStage::Apply, x))
        .with_fn(TreeStage::Apply, |_| Step::Terminal)
}

/// Every transition [`tree_table`]'s handlers can make.
#[must_use]
pub fn tree_graph() -> DeclaredGraph<TreeStage> {
    DeclaredGraph::new()
        .edge(TreeStage::Start, TreeStage::Apply)
        .edge(TreeStage::Start, TreeStage::Lookup)
        .edge(TreeStage::Lookup, TreeStage::Insert)
        .edge(TreeStage::Lookup, TreeStage::SlowLookup)
        .edge(TreeStage::SlowLookup, TreeStage::Insert)
        .edge(TreeStage::Insert, TreeStage::Apply)
        .terminal(TreeStage::Apply)
}

/// A two-stage label whose [`StageLabel::all`] omits `Store`.
///
/// Tables and overrides may still use `Store`; it only shows up as an
/// enumeration-size warning during validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShortStage {
    /// Entry stage, the only enumerated one.
    Fetch,
    /// Handled but not enumerated.
    Store,
}

impl fmt::Display for ShortStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Fetch => "fetch",
            Self::Store => "store",
        })
    }
}

impl StageLabel for ShortStage {
    fn all() -> &'static [Self] {
        &[Self::Fetch]
    }
}

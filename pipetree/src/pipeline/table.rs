//! Ordered stage-to-handler table.

use crate::stages::{AsyncFnHandler, FnHandler, StageHandler, StageLabel, Step};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// A handler shared between a table and the workers of its runs.
pub type SharedHandler<S, T> = Arc<dyn StageHandler<S, T>>;

/// Maps each stage to its handler, remembering insertion order.
///
/// The first stage inserted is the entry stage: every run feeds its inputs
/// there. Inserting a stage again replaces its handler but keeps its position.
pub struct StageTable<S: StageLabel, T: Send + 'static> {
    entries: Vec<(S, SharedHandler<S, T>)>,
}

impl<S: StageLabel, T: Send + 'static> StageTable<S, T> {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Adds a handler for `stage`.
    #[must_use]
    pub fn stage(self, stage: S, handler: impl StageHandler<S, T> + 'static) -> Self {
        self.shared(stage, Arc::new(handler))
    }

    /// Adds an already shared handler for `stage`.
    #[must_use]
    pub fn shared(mut self, stage: S, handler: SharedHandler<S, T>) -> Self {
        self.insert(stage, handler);
        self
    }

    /// Adds a synchronous closure handler for `stage`.
    #[must_use]
    pub fn with_fn<F>(self, stage: S, func: F) -> Self
    where
        F: Fn(T) -> Step<S, T> + Send + Sync + 'static,
    {
        self.stage(stage, FnHandler::new(func))
    }

    /// Adds an async, fallible closure handler for `stage`.
    #[must_use]
    pub fn with_async_fn<F, Fut>(self, stage: S, func: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Step<S, T>>> + Send + 'static,
    {
        self.stage(stage, AsyncFnHandler::new(func))
    }

    /// Inserts or replaces the handler for `stage`.
    pub fn insert(&mut self, stage: S, handler: SharedHandler<S, T>) {
        if let Some(slot) = self.entries.iter_mut().find(|(existing, _)| *existing == stage) {
            slot.1 = handler;
        } else {
            self.entries.push((stage, handler));
        }
    }

    /// Returns the entry stage, if any stage was added.
    #[must_use]
    pub fn entry(&self) -> Option<S> {
        self.entries.first().map(|(stage, _)| *stage)
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no stage was added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the stages in insertion order.
    #[must_use]
    pub fn stages(&self) -> Vec<S> {
        self.entries.iter().map(|(stage, _)| *stage).collect()
    }

    /// Returns the handler for `stage`.
    #[must_use]
    pub fn get(&self, stage: S) -> Option<&SharedHandler<S, T>> {
        self.entries
            .iter()
            .find(|(existing, _)| *existing == stage)
            .map(|(_, handler)| handler)
    }

    /// Returns true if `stage` has a handler.
    #[must_use]
    pub fn contains(&self, stage: S) -> bool {
        self.get(stage).is_some()
    }

    /// Iterates over `(stage, handler)` in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (S, &SharedHandler<S, T>)> {
        self.entries.iter().map(|(stage, handler)| (*stage, handler))
    }
}

impl<S: StageLabel, T: Send + 'static> Default for StageTable<S, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: StageLabel, T: Send + 'static> Clone for StageTable<S, T> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<S: StageLabel, T: Send + 'static> fmt::Debug for StageTable<S, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageTable")
            .field("stages", &self.stages())
            .finish()
    }
}

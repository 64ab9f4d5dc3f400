//! The pipeline runtime.

use super::config::{reject_overrides, PipelineConfig, QueueOverrides};
use super::counter::{TransitionCounter, TransitionCounts};
use super::queue::{Backlog, StageQueue};
use super::validate::{validate, ValidationReport};
use super::worker::{QueueMap, Worker};
use super::{DeclaredGraph, StageTable};
use crate::cancellation::{CancellationToken, WorkerGroup};
use crate::errors::{GraphShapeError, PipetreeError};
use crate::stages::StageLabel;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

/// Pipelines items through a DAG of per-stage queues.
///
/// A `PipeTree` is only configuration: every [`run`](Self::run) builds its own
/// queues, workers and counter, and tears them down before returning, so runs
/// never share state.
///
/// # Example
///
/// ```rust,ignore
/// let tree = PipeTree::new(tree_table());
/// tree.validate(&tree_graph())?;
/// let counts = tree.run_with_defaults(0..1000).await?;
/// assert_eq!(counts.terminal_total(), 1000);
/// ```
pub struct PipeTree<S: StageLabel, T: Send + 'static> {
    table: StageTable<S, T>,
    config: PipelineConfig,
}

impl<S: StageLabel, T: Send + 'static> PipeTree<S, T> {
    /// Creates a pipeline over `table` with the default configuration.
    #[must_use]
    pub fn new(table: StageTable<S, T>) -> Self {
        Self {
            table,
            config: PipelineConfig::default(),
        }
    }

    /// Replaces the configuration.
    #[must_use]
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the stage table.
    #[must_use]
    pub fn table(&self) -> &StageTable<S, T> {
        &self.table
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Returns the entry stage.
    #[must_use]
    pub fn entry(&self) -> Option<S> {
        self.table.entry()
    }

    /// Checks that `declared` is a graph this pipeline can run.
    ///
    /// The graph must have exactly one source, equal to the entry stage, no
    /// cycles, and no route into a stage without a handler. A stage
    /// enumeration larger or smaller than the table is only a warning.
    pub fn validate(&self, declared: &DeclaredGraph<S>) -> Result<ValidationReport<S>, PipetreeError> {
        validate(&self.table, declared)
    }

    /// Runs every input through the pipeline and returns the transition counts.
    ///
    /// Inputs are fed to the entry stage in order. The run returns once every
    /// queue has drained and no item is in flight, or as soon as a stage fails.
    ///
    /// # Errors
    ///
    /// - [`PipetreeError::UnimplementedFeature`] if any override differs from
    ///   the defaults; nothing is spawned in that case.
    /// - [`PipetreeError::GraphShape`] if the table is empty.
    /// - [`PipetreeError::Handler`] or [`PipetreeError::HandlerResultShape`]
    ///   for the first stage that failed.
    /// - [`PipetreeError::ShutdownTimeout`] if a shutdown timeout is configured
    ///   and workers outlive it.
    pub async fn run<I>(&self, inputs: I, overrides: &QueueOverrides<S>) -> Result<TransitionCounts<S>, PipetreeError>
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send,
    {
        reject_overrides(overrides)?;
        let entry = self.table.entry().ok_or_else(GraphShapeError::no_entry)?;

        let run_id = Uuid::new_v4();
        let span = info_span!("pipetree.run", pipeline = %self.config.name, %run_id);
        self.execute(entry, inputs.into_iter()).instrument(span).await
    }

    /// Runs with no queue overrides.
    pub async fn run_with_defaults<I>(&self, inputs: I) -> Result<TransitionCounts<S>, PipetreeError>
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send,
    {
        self.run(inputs, &QueueOverrides::new()).await
    }

    async fn execute(&self, entry: S, inputs: impl Iterator<Item = T> + Send) -> Result<TransitionCounts<S>, PipetreeError> {
        let started = Instant::now();
        let backlog = Arc::new(Backlog::default());
        let queues: Arc<QueueMap<S, T>> = Arc::new(
            self.table
                .stages()
                .into_iter()
                .map(|stage| (stage, Arc::new(StageQueue::unbounded(backlog.clone()))))
                .collect(),
        );
        let counter = Arc::new(TransitionCounter::new());

        let mut group = WorkerGroup::new();
        for (stage, handler) in self.table.iter() {
            let worker = Worker {
                stage,
                handler: handler.clone(),
                queues: queues.clone(),
                counter: counter.clone(),
            };
            group.spawn(stage.to_string(), move |scope| worker.run(scope).in_current_span());
        }
        debug!(stages = group.len(), %entry, "Workers spawned");

        let entry_queue = queues
            .get(&entry)
            .ok_or_else(|| PipetreeError::Internal(format!("No queue for entry stage '{entry}'")))?;
        let fed = feed(entry_queue, inputs, group.cancel_token()).await;

        if !group.has_failed() {
            drain(&self.table.stages(), &queues, &backlog, group.cancel_token()).await;
        }

        let outputs = group
            .shutdown("pipeline drained", self.config.shutdown_timeout)
            .await?;
        let processed: u64 = outputs.iter().map(|(_, stats)| stats.processed).sum();
        let counts = counter.snapshot();

        info!(
            fed,
            processed,
            terminated = counts.terminal_total(),
            duration_ms = started.elapsed().as_secs_f64() * 1000.0,
            "Pipeline run complete"
        );

        Ok(counts)
    }
}

impl<S: StageLabel, T: Send + 'static> std::fmt::Debug for PipeTree<S, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeTree")
            .field("table", &self.table)
            .field("config", &self.config)
            .finish()
    }
}

/// How many inputs the feed pushes before yielding to the workers.
const FEED_YIELD_INTERVAL: u64 = 64;

/// Pushes inputs onto the entry queue until they run out or the run fails.
///
/// Pushing to an unbounded queue never suspends, so the feed yields every
/// [`FEED_YIELD_INTERVAL`] items to let workers run on a current-thread
/// runtime.
async fn feed<T>(queue: &StageQueue<T>, inputs: impl Iterator<Item = T>, token: &CancellationToken) -> u64 {
    let mut fed = 0;
    for item in inputs {
        tokio::select! {
            biased;
            () = token.cancelled() => break,
            () = queue.push(item) => fed += 1,
        }
        if fed % FEED_YIELD_INTERVAL == 0 {
            tokio::task::yield_now().await;
        }
    }
    fed
}

/// Waits until every queue is empty and nothing is in flight.
///
/// Joining the queues one after another can miss an item moving from a queue
/// not yet joined to one already joined, so the final check is the run-wide
/// backlog, repeated until it holds.
async fn drain<S: StageLabel, T>(order: &[S], queues: &QueueMap<S, T>, backlog: &Backlog, token: &CancellationToken) {
    let mut rounds = 0_u32;
    loop {
        rounds += 1;
        for stage in order {
            let Some(queue) = queues.get(stage) else {
                continue;
            };
            tokio::select! {
                biased;
                () = token.cancelled() => return,
                () = queue.join() => {}
            }
        }

        if backlog.is_idle() && queues.values().all(|queue| queue.is_empty()) {
            debug!(rounds, "Queues drained");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::QueueConfig;
    use crate::stages::{Step, Target};
    use crate::testing::{tree_graph, tree_table, TreeStage};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[tokio::test]
    async fn test_small_tree_run() {
        let tree = PipeTree::new(tree_table());
        let counts = tree.run_with_defaults(0..12).await.unwrap();

        assert_eq!(counts.get(TreeStage::Start, TreeStage::Apply), 3);
        assert_eq!(counts.get(TreeStage::Start, TreeStage::Lookup), 9);
        assert_eq!(counts.get(TreeStage::Apply, Target::Terminal), 12);
        assert_eq!(counts.terminal_total(), 12);
    }

    #[tokio::test]
    async fn test_validate_delegates() {
        let tree = PipeTree::new(tree_table());
        let report = tree.validate(&tree_graph()).unwrap();

        assert_eq!(report.entry, TreeStage::Start);
        assert_eq!(tree.entry(), Some(TreeStage::Start));
    }

    #[tokio::test]
    async fn test_default_override_is_accepted() {
        let tree = PipeTree::new(tree_table());
        let mut overrides = QueueOverrides::new();
        overrides.insert(TreeStage::Lookup, QueueConfig::default());

        let counts = tree.run(0..4, &overrides).await.unwrap();
        assert_eq!(counts.terminal_total(), 4);
    }

    #[tokio::test]
    async fn test_empty_table_is_graph_shape() {
        let tree: PipeTree<TreeStage, u64> = PipeTree::new(StageTable::new());
        let err = tree.run_with_defaults(0..3).await.unwrap_err();

        assert!(matches!(err, PipetreeError::GraphShape(_)));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_workers_run_while_feeding() {
        let handled = Arc::new(AtomicU64::new(0));
        let handled_before_last = Arc::new(AtomicU64::new(0));

        let table = StageTable::new().with_fn(TreeStage::Start, {
            let handled = handled.clone();
            move |_: u64| {
                handled.fetch_add(1, Ordering::SeqCst);
                Step::Terminal
            }
        });
        let tree = PipeTree::new(table);

        let inputs = (0..1000_u64).map({
            let handled = handled.clone();
            let handled_before_last = handled_before_last.clone();
            move |x| {
                if x == 999 {
                    handled_before_last.store(handled.load(Ordering::SeqCst), Ordering::SeqCst);
                }
                x
            }
        });

        let counts = tree.run_with_defaults(inputs).await.unwrap();

        assert_eq!(counts.terminal_total(), 1000);
        assert!(handled_before_last.load(Ordering::SeqCst) > 0);
    }

    #[tokio::test]
    async fn test_single_stage_pipeline() {
        let table = StageTable::new().with_fn(TreeStage::Apply, |_: u64| Step::Terminal);
        let tree = PipeTree::new(table).with_config(PipelineConfig::new("single"));

        let counts = tree.run_with_defaults(vec![1, 2, 3]).await.unwrap();
        assert_eq!(counts.len(), 1);
        assert_eq!(counts.get(TreeStage::Apply, Target::Terminal), 3);
        assert_eq!(tree.config().name, "single");
    }
}

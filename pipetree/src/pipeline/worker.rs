//! The per-stage worker loop.

use super::counter::TransitionCounter;
use super::queue::StageQueue;
use super::table::SharedHandler;
use crate::cancellation::WorkerScope;
use crate::errors::PipetreeError;
use crate::stages::{StageLabel, Step, Target};
use futures::FutureExt;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Every queue of one run, by stage.
pub(crate) type QueueMap<S, T> = HashMap<S, Arc<StageQueue<T>>>;

/// What a worker did before it stopped.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct WorkerStats {
    pub(crate) processed: u64,
    pub(crate) forwarded: u64,
    pub(crate) terminated: u64,
}

pub(crate) struct Worker<S: StageLabel, T: Send + 'static> {
    pub(crate) stage: S,
    pub(crate) handler: SharedHandler<S, T>,
    pub(crate) queues: Arc<QueueMap<S, T>>,
    pub(crate) counter: Arc<TransitionCounter<S>>,
}

impl<S: StageLabel, T: Send + 'static> Worker<S, T> {
    /// Handles items from the stage's queue until the group is cancelled or
    /// an item fails.
    ///
    /// Cancellation is only noticed while waiting for the next item; a
    /// handler that has started always runs to completion.
    pub(crate) async fn run(self, scope: WorkerScope) -> WorkerStats {
        let mut stats = WorkerStats::default();
        let Some(queue) = self.queues.get(&self.stage).cloned() else {
            scope.fail(PipetreeError::Internal(format!(
                "No queue was created for stage '{}'",
                self.stage
            )));
            return stats;
        };

        debug!(stage = %self.stage, "Worker started");

        loop {
            let item = tokio::select! {
                biased;
                () = scope.cancelled() => break,
                item = queue.pop() => item,
            };

            let outcome = self.process(item).await;
            // Acknowledge after any downstream push so the backlog never
            // dips to zero while the item is still in flight.
            queue.task_done();

            match outcome {
                Ok(target) => {
                    stats.processed += 1;
                    if target.is_terminal() {
                        stats.terminated += 1;
                    } else {
                        stats.forwarded += 1;
                    }
                }
                Err(err) => {
                    warn!(stage = %self.stage, error = %err, "Stage worker failed");
                    scope.fail(err);
                    break;
                }
            }
        }

        debug!(
            stage = %self.stage,
            processed = stats.processed,
            forwarded = stats.forwarded,
            terminated = stats.terminated,
            "Worker stopped"
        );
        stats
    }

    async fn process(&self, item: T) -> Result<Target<S>, PipetreeError> {
        let step = match AssertUnwindSafe(self.handler.handle(item)).catch_unwind().await {
            Ok(Ok(step)) => step,
            Ok(Err(err)) => return Err(PipetreeError::handler(self.stage, err)),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                return Err(PipetreeError::handler(
                    self.stage,
                    anyhow::anyhow!("handler panicked: {message}"),
                ));
            }
        };

        match step {
            Step::Terminal => {
                self.counter.record(self.stage, Target::Terminal);
                trace!(stage = %self.stage, "Item terminated");
                Ok(Target::Terminal)
            }
            Step::Next(next, value) => {
                let Some(downstream) = self.queues.get(&next) else {
                    return Err(PipetreeError::result_shape(self.stage, next));
                };
                self.counter.record(self.stage, Target::Stage(next));
                downstream.push(value).await;
                trace!(stage = %self.stage, %next, "Item forwarded");
                Ok(Target::Stage(next))
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellation::WorkerGroup;
    use crate::pipeline::queue::Backlog;
    use crate::stages::FnHandler;
    use crate::testing::TreeStage;
    use std::time::Duration;

    fn queues(stages: &[TreeStage], backlog: &Arc<Backlog>) -> Arc<QueueMap<TreeStage, u64>> {
        Arc::new(
            stages
                .iter()
                .map(|stage| (*stage, Arc::new(StageQueue::unbounded(backlog.clone()))))
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_worker_forwards_then_acknowledges() {
        let backlog = Arc::new(Backlog::default());
        let queues = queues(&[TreeStage::Insert, TreeStage::Apply], &backlog);
        let counter = Arc::new(TransitionCounter::new());

        let worker = Worker {
            stage: TreeStage::Insert,
            handler: Arc::new(FnHandler::new(|x: u64| Step::Next(TreeStage::Apply, x + 1))),
            queues: queues.clone(),
            counter: counter.clone(),
        };

        let mut group = WorkerGroup::new();
        group.spawn("insert", |scope| worker.run(scope));

        queues[&TreeStage::Insert].push(1).await;
        queues[&TreeStage::Insert].join().await;

        // Forwarded item is still unacknowledged downstream.
        assert_eq!(backlog.unfinished(), 1);
        assert_eq!(queues[&TreeStage::Apply].try_pop(), Some(2));

        let outputs = group.shutdown("done", Some(Duration::from_secs(1))).await.unwrap();
        assert_eq!(
            outputs[0].1,
            WorkerStats {
                processed: 1,
                forwarded: 1,
                terminated: 0
            }
        );
        assert_eq!(counter.snapshot().get(TreeStage::Insert, TreeStage::Apply), 1);
    }

    #[tokio::test]
    async fn test_worker_fails_on_missing_queue() {
        let backlog = Arc::new(Backlog::default());
        let queues = queues(&[TreeStage::Lookup], &backlog);

        let worker = Worker {
            stage: TreeStage::Lookup,
            handler: Arc::new(FnHandler::new(|x: u64| Step::Next(TreeStage::SlowLookup, x))),
            queues: queues.clone(),
            counter: Arc::new(TransitionCounter::new()),
        };

        let mut group = WorkerGroup::new();
        group.spawn("lookup", |scope| worker.run(scope));
        queues[&TreeStage::Lookup].push(7).await;

        tokio::time::timeout(Duration::from_secs(1), group.cancel_token().cancelled())
            .await
            .unwrap();
        assert!(backlog.is_idle());

        let err = group.shutdown("done", Some(Duration::from_secs(1))).await.unwrap_err();
        assert_eq!(err.to_string(), "Stage 'lookup' routes to 'slow_lookup', which has no handler");
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");

        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");

        let payload: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic payload");
    }
}

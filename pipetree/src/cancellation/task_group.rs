//! Group of stage workers sharing one cancellation token.

use super::CancellationToken;
use crate::errors::PipetreeError;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

struct GroupState {
    cancel_token: CancellationToken,
    first_error: Mutex<Option<PipetreeError>>,
}

/// A worker's view of its group.
///
/// Workers use it to wait for cancellation and to report a fatal error, which
/// cancels the rest of the group.
#[derive(Clone)]
pub struct WorkerScope {
    state: Arc<GroupState>,
}

impl WorkerScope {
    /// Waits until the group is cancelled.
    pub async fn cancelled(&self) {
        self.state.cancel_token.cancelled().await;
    }

    /// Returns whether the group has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state.cancel_token.is_cancelled()
    }

    /// Records a fatal error and cancels the group.
    ///
    /// Only the first error is kept.
    pub fn fail(&self, error: PipetreeError) {
        let reason = error.to_string();
        {
            let mut first_error = self.state.first_error.lock();
            if first_error.is_none() {
                *first_error = Some(error);
            }
        }
        self.state.cancel_token.cancel(reason);
    }
}

impl std::fmt::Debug for WorkerScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerScope")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// A group of named worker tasks with structured shutdown.
///
/// Any worker can fail the group through its [`WorkerScope`]; the group keeps
/// the first error and reports it from [`WorkerGroup::shutdown`].
pub struct WorkerGroup<R> {
    state: Arc<GroupState>,
    handles: Vec<(String, JoinHandle<R>)>,
}

impl<R: Send + 'static> WorkerGroup<R> {
    /// Creates a new, empty group.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(GroupState {
                cancel_token: CancellationToken::new(),
                first_error: Mutex::new(None),
            }),
            handles: Vec::new(),
        }
    }

    /// Returns the group's cancellation token.
    #[must_use]
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.state.cancel_token
    }

    /// Returns a scope for code outside the workers that may fail the group.
    #[must_use]
    pub fn scope(&self) -> WorkerScope {
        WorkerScope {
            state: self.state.clone(),
        }
    }

    /// Spawns a worker in the group.
    pub fn spawn<F, Fut>(&mut self, name: impl Into<String>, task: F)
    where
        F: FnOnce(WorkerScope) -> Fut,
        Fut: Future<Output = R> + Send + 'static,
    {
        let handle = tokio::spawn(task(self.scope()));
        self.handles.push((name.into(), handle));
    }

    /// Cancels all workers in the group.
    pub fn cancel_all(&self, reason: &str) {
        self.state.cancel_token.cancel(reason);
    }

    /// Returns true if a worker has failed the group.
    #[must_use]
    pub fn has_failed(&self) -> bool {
        self.state.first_error.lock().is_some()
    }

    /// Returns the number of spawned workers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Returns true if no workers were spawned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Cancels every worker and waits for them to stop.
    ///
    /// Workers finish the item they are handling before they notice the
    /// cancellation. With `timeout` set, workers still running once it has
    /// elapsed are aborted; with `None` shutdown waits as long as they take.
    /// Returns each worker's output by name, or the first recorded error, or
    /// [`PipetreeError::ShutdownTimeout`] naming the aborted workers.
    pub async fn shutdown(
        self,
        reason: &str,
        timeout: Option<Duration>,
    ) -> Result<Vec<(String, R)>, PipetreeError> {
        self.cancel_all(reason);

        let deadline = timeout.map(|timeout| tokio::time::Instant::now() + timeout);
        let mut finished = Vec::with_capacity(self.handles.len());
        let mut stragglers = Vec::new();

        for (name, mut handle) in self.handles {
            let joined = match deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, &mut handle).await.ok(),
                None => Some((&mut handle).await),
            };

            match joined {
                Some(Ok(output)) => {
                    debug!(worker = %name, "Worker stopped");
                    finished.push((name, output));
                }
                Some(Err(join_error)) => {
                    let error = PipetreeError::Internal(format!("Worker '{name}' panicked: {join_error}"));
                    let mut first_error = self.state.first_error.lock();
                    if first_error.is_none() {
                        *first_error = Some(error);
                    }
                }
                None => {
                    handle.abort();
                    stragglers.push(name);
                }
            }
        }

        if let Some(error) = self.state.first_error.lock().take() {
            return Err(error);
        }

        if !stragglers.is_empty() {
            warn!(workers = ?stragglers, "Workers aborted after shutdown timeout");
            return Err(PipetreeError::ShutdownTimeout { stages: stragglers });
        }

        Ok(finished)
    }
}

impl<R: Send + 'static> Default for WorkerGroup<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> std::fmt::Debug for WorkerGroup<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerGroup")
            .field("workers", &self.handles.len())
            .field("cancelled", &self.state.cancel_token.is_cancelled())
            .finish()
    }
}

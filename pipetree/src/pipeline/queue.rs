//! Per-stage FIFO queues with acknowledgement tracking.
//!
//! Every item pushed onto a [`StageQueue`] stays "unfinished" until its
//! consumer calls [`StageQueue::task_done`]. All queues of a run also share a
//! [`Backlog`] counting unfinished items run-wide, which is what shutdown
//! trusts: a forwarding worker pushes downstream before acknowledging
//! upstream, so the backlog only reaches zero once nothing is queued or in a
//! handler anywhere.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::warn;

/// Run-wide count of unfinished items.
#[derive(Debug, Default)]
pub(crate) struct Backlog {
    unfinished: AtomicUsize,
}

impl Backlog {
    /// Returns the number of items queued or being handled.
    pub(crate) fn unfinished(&self) -> usize {
        self.unfinished.load(Ordering::SeqCst)
    }

    /// Returns true if nothing is queued or being handled.
    pub(crate) fn is_idle(&self) -> bool {
        self.unfinished() == 0
    }
}

#[derive(Debug)]
struct QueueState<T> {
    items: VecDeque<T>,
    unfinished: usize,
}

/// A FIFO queue feeding one stage's worker.
pub(crate) struct StageQueue<T> {
    state: Mutex<QueueState<T>>,
    capacity: Option<usize>,
    backlog: Arc<Backlog>,
    item_ready: Notify,
    space_ready: Notify,
    all_done: Notify,
}

impl<T> StageQueue<T> {
    /// Creates an unbounded queue.
    pub(crate) fn unbounded(backlog: Arc<Backlog>) -> Self {
        Self::with_capacity(None, backlog)
    }

    /// Creates a queue holding at most `capacity` items, or unbounded for `None`.
    pub(crate) fn with_capacity(capacity: Option<usize>, backlog: Arc<Backlog>) -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                unfinished: 0,
            }),
            capacity,
            backlog,
            item_ready: Notify::new(),
            space_ready: Notify::new(),
            all_done: Notify::new(),
        }
    }

    /// Returns the number of items waiting to be popped.
    pub(crate) fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    /// Returns true if no items are waiting.
    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of pushed items not yet acknowledged.
    pub(crate) fn unfinished(&self) -> usize {
        self.state.lock().unfinished
    }

    /// Pushes without waiting, handing the item back if the queue is full.
    pub(crate) fn try_push(&self, item: T) -> Result<(), T> {
        {
            let mut state = self.state.lock();
            if self.capacity.is_some_and(|capacity| state.items.len() >= capacity) {
                return Err(item);
            }
            state.items.push_back(item);
            state.unfinished += 1;
            self.backlog.unfinished.fetch_add(1, Ordering::SeqCst);
        }
        self.item_ready.notify_one();
        Ok(())
    }

    /// Pushes an item, waiting for space if the queue is bounded and full.
    pub(crate) async fn push(&self, mut item: T) {
        loop {
            let space = self.space_ready.notified();
            tokio::pin!(space);
            space.as_mut().enable();

            match self.try_push(item) {
                Ok(()) => return,
                Err(rejected) => item = rejected,
            }
            space.await;
        }
    }

    /// Pops the oldest item if there is one.
    pub(crate) fn try_pop(&self) -> Option<T> {
        let item = self.state.lock().items.pop_front();
        if item.is_some() && self.capacity.is_some() {
            self.space_ready.notify_one();
        }
        item
    }

    /// Waits for and pops the oldest item.
    ///
    /// Cancel safe: an item is only removed when the future completes.
    pub(crate) async fn pop(&self) -> T {
        loop {
            if let Some(item) = self.try_pop() {
                return item;
            }
            self.item_ready.notified().await;
        }
    }

    /// Acknowledges one popped item.
    pub(crate) fn task_done(&self) {
        let drained = {
            let mut state = self.state.lock();
            if state.unfinished == 0 {
                warn!("Queue acknowledged more items than were pushed");
                return;
            }
            state.unfinished -= 1;
            state.unfinished == 0
        };
        self.backlog.unfinished.fetch_sub(1, Ordering::SeqCst);

        if drained {
            self.all_done.notify_waiters();
        }
    }

    /// Waits until every pushed item has been acknowledged.
    pub(crate) async fn join(&self) {
        loop {
            let done = self.all_done.notified();
            tokio::pin!(done);
            done.as_mut().enable();

            if self.unfinished() == 0 {
                return;
            }
            done.await;
        }
    }
}

impl<T> std::fmt::Debug for StageQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("StageQueue")
            .field("len", &state.items.len())
            .field("unfinished", &state.unfinished)
            .field("capacity", &self.capacity)
            .finish()
    }
}

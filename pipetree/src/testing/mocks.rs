//! Mock handlers for testing.

use crate::stages::{StageHandler, StageLabel, Step, Target};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::Duration;

/// A handler that records every item and routes them all the same way.
#[derive(Debug)]
pub struct RecordingHandler<S, T> {
    route: Target<S>,
    delay: Option<Duration>,
    items: Mutex<Vec<T>>,
}

impl<S, T> RecordingHandler<S, T> {
    /// Creates a handler forwarding every item to `route`.
    #[must_use]
    pub fn new(route: impl Into<Target<S>>) -> Self {
        Self {
            route: route.into(),
            delay: None,
            items: Mutex::new(Vec::new()),
        }
    }

    /// Creates a handler that ends every item's journey.
    #[must_use]
    pub fn terminal() -> Self {
        Self::new(Target::Terminal)
    }

    /// Sleeps for `delay` before handling each item.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Returns the number of items handled.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.items.lock().len()
    }

    /// Resets call tracking.
    pub fn reset(&self) {
        self.items.lock().clear();
    }
}

impl<S, T: Clone> RecordingHandler<S, T> {
    /// Returns the items handled, in arrival order.
    #[must_use]
    pub fn items(&self) -> Vec<T> {
        self.items.lock().clone()
    }
}

#[async_trait]
impl<S, T> StageHandler<S, T> for RecordingHandler<S, T>
where
    S: StageLabel,
    T: Clone + Send + 'static,
{
    async fn handle(&self, item: T) -> anyhow::Result<Step<S, T>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.items.lock().push(item.clone());

        Ok(match self.route {
            Target::Stage(next) => Step::Next(next, item),
            Target::Terminal => Step::Terminal,
        })
    }
}

/// A handler that fails every item.
#[derive(Debug)]
pub struct FailingHandler {
    message: String,
    panic: bool,
}

impl FailingHandler {
    /// Creates a handler returning an error with `message`.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            panic: false,
        }
    }

    /// Creates a handler that panics with `message` instead.
    #[must_use]
    pub fn panicking(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            panic: true,
        }
    }
}

#[async_trait]
impl<S, T> StageHandler<S, T> for FailingHandler
where
    S: StageLabel,
    T: Send + 'static,
{
    async fn handle(&self, _item: T) -> anyhow::Result<Step<S, T>> {
        if self.panic {
            panic!("{}", self.message);
        }
        anyhow::bail!("{}", self.message)
    }
}

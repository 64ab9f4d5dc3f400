//! Stage labels and handlers.
//!
//! A pipeline's state space is a closed `enum` implementing [`StageLabel`].
//! Each stage has one [`StageHandler`] that takes an item and says where it
//! goes next with a [`Step`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug, Display};
use std::future::Future;
use std::hash::Hash;
use std::marker::PhantomData;

/// A closed enumeration of pipeline stages.
pub trait StageLabel: Copy + Eq + Hash + Debug + Display + Send + Sync + 'static {
    /// Every member of the enumeration, in declaration order.
    fn all() -> &'static [Self];
}

/// Where a routed item goes: another stage, or nowhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target<S> {
    /// Forward to this stage's queue.
    Stage(S),
    /// The item's journey ends.
    Terminal,
}

impl<S> Target<S> {
    /// Returns the stage, unless this is the terminal marker.
    pub fn stage(self) -> Option<S> {
        match self {
            Self::Stage(stage) => Some(stage),
            Self::Terminal => None,
        }
    }

    /// Returns true for the terminal marker.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminal)
    }
}

impl<S> From<S> for Target<S> {
    fn from(stage: S) -> Self {
        Self::Stage(stage)
    }
}

impl<S: Display> Display for Target<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stage(stage) => stage.fmt(f),
            Self::Terminal => f.write_str("terminal"),
        }
    }
}

/// What a handler decided for one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step<S, T> {
    /// Enqueue the value on the given stage.
    Next(S, T),
    /// Stop routing the item.
    Terminal,
}

impl<S: Copy, T> Step<S, T> {
    /// Returns where this step sends the item.
    #[must_use]
    pub fn target(&self) -> Target<S> {
        match self {
            Self::Next(stage, _) => Target::Stage(*stage),
            Self::Terminal => Target::Terminal,
        }
    }
}

/// Processes items for one stage.
///
/// A handler runs to completion once started; cancellation is only observed
/// between items.
#[async_trait]
pub trait StageHandler<S, T>: Send + Sync
where
    S: StageLabel,
    T: Send + 'static,
{
    /// Handles one item and returns where it goes next.
    async fn handle(&self, item: T) -> anyhow::Result<Step<S, T>>;
}

/// A handler backed by a plain closure.
pub struct FnHandler<F> {
    func: F,
}

impl<F> FnHandler<F> {
    /// Creates a new closure handler.
    pub const fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> Debug for FnHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHandler").finish_non_exhaustive()
    }
}

#[async_trait]
impl<S, T, F> StageHandler<S, T> for FnHandler<F>
where
    S: StageLabel,
    T: Send + 'static,
    F: Fn(T) -> Step<S, T> + Send + Sync,
{
    async fn handle(&self, item: T) -> anyhow::Result<Step<S, T>> {
        Ok((self.func)(item))
    }
}

/// A handler backed by an async closure that may fail.
pub struct AsyncFnHandler<F, Fut> {
    func: F,
    _phantom: PhantomData<fn() -> Fut>,
}

impl<F, Fut> AsyncFnHandler<F, Fut> {
    /// Creates a new async closure handler.
    pub const fn new(func: F) -> Self {
        Self {
            func,
            _phantom: PhantomData,
        }
    }
}

impl<F, Fut> Debug for AsyncFnHandler<F, Fut> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncFnHandler").finish_non_exhaustive()
    }
}

#[async_trait]
impl<S, T, F, Fut> StageHandler<S, T> for AsyncFnHandler<F, Fut>
where
    S: StageLabel,
    T: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Step<S, T>>> + Send + 'static,
{
    async fn handle(&self, item: T) -> anyhow::Result<Step<S, T>> {
        (self.func)(item).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Hop {
        First,
        Second,
    }

    impl Display for Hop {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                Self::First => f.write_str("first"),
                Self::Second => f.write_str("second"),
            }
        }
    }

    impl StageLabel for Hop {
        fn all() -> &'static [Self] {
            &[Self::First, Self::Second]
        }
    }

    #[test]
    fn test_target_display() {
        assert_eq!(Target::Stage(Hop::Second).to_string(), "second");
        assert_eq!(Target::<Hop>::Terminal.to_string(), "terminal");
        assert_eq!(Target::from(Hop::First).stage(), Some(Hop::First));
        assert!(Target::<Hop>::Terminal.is_terminal());
    }

    #[test]
    fn test_step_target() {
        assert_eq!(Step::Next(Hop::Second, 1).target(), Target::Stage(Hop::Second));
        assert_eq!(Step::<Hop, i32>::Terminal.target(), Target::Terminal);
    }

    #[tokio::test]
    async fn test_fn_handler() {
        let handler = FnHandler::new(|x: i32| {
            if x > 0 {
                Step::Next(Hop::Second, x * 2)
            } else {
                Step::Terminal
            }
        });

        assert_eq!(handler.handle(2).await.unwrap(), Step::Next(Hop::Second, 4));
        assert_eq!(handler.handle(0).await.unwrap(), Step::Terminal);
    }

    #[tokio::test]
    async fn test_async_fn_handler() {
        let handler = AsyncFnHandler::new(|x: i32| async move {
            tokio::task::yield_now().await;
            if x < 0 {
                anyhow::bail!("negative input {x}");
            }
            Ok(Step::<Hop, i32>::Terminal)
        });

        assert_eq!(handler.handle(1).await.unwrap(), Step::Terminal);
        let err = handler.handle(-1).await.unwrap_err();
        assert_eq!(err.to_string(), "negative input -1");
    }
}

//! Pipeline and per-queue configuration.
//!
//! [`QueueConfig`] and [`Limiter`] describe concurrency, capacity and rate
//! limits per stage. None of that is enforced yet: a run given anything other
//! than the defaults fails with [`PipetreeError::UnimplementedFeature`] rather
//! than pretending to apply it.

use crate::errors::PipetreeError;
use crate::stages::StageLabel;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Per-stage queue overrides for one run.
pub type QueueOverrides<S> = HashMap<S, QueueConfig>;

/// Rate limit for a stage's queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limiter {
    /// Items allowed per `interval`.
    pub per_interval: Option<u32>,
    /// Window for `per_interval`.
    pub interval: Option<Duration>,
    /// Minimum delay between two items.
    pub min_delay: Option<Duration>,
}

impl Default for Limiter {
    fn default() -> Self {
        Self {
            per_interval: None,
            interval: Some(Duration::from_secs(1)),
            min_delay: None,
        }
    }
}

impl Limiter {
    /// Creates an unlimited limiter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allows `count` items per `interval`.
    #[must_use]
    pub fn with_rate(mut self, count: u32, interval: Duration) -> Self {
        self.per_interval = Some(count);
        self.interval = Some(interval);
        self
    }

    /// Sets the minimum delay between items.
    #[must_use]
    pub fn with_min_delay(mut self, delay: Duration) -> Self {
        self.min_delay = Some(delay);
        self
    }

    /// Returns true if the limiter would never delay anything.
    #[must_use]
    pub fn is_unlimited(&self) -> bool {
        self.per_interval.is_none() && self.min_delay.is_none()
    }
}

/// Queue settings for one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Number of workers draining the stage's queue.
    pub concurrency: usize,
    /// Maximum queued items; `None` is unbounded.
    pub capacity: Option<usize>,
    /// Rate limit.
    pub limiter: Limiter,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            capacity: None,
            limiter: Limiter::default(),
        }
    }
}

impl QueueConfig {
    /// Creates the default queue configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the worker count.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Bounds the queue.
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Sets the rate limit.
    #[must_use]
    pub fn with_limiter(mut self, limiter: Limiter) -> Self {
        self.limiter = limiter;
        self
    }

    /// Returns true if nothing differs from the defaults.
    #[must_use]
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }

    /// Names the first setting that differs from the defaults.
    #[must_use]
    pub fn first_override(&self) -> Option<&'static str> {
        let defaults = Self::default();
        if self.concurrency != defaults.concurrency {
            Some("concurrency")
        } else if self.capacity != defaults.capacity {
            Some("capacity")
        } else if self.limiter != defaults.limiter {
            Some("limiter")
        } else {
            None
        }
    }
}

/// Fails on the first override that asks for anything but the defaults.
pub(crate) fn reject_overrides<S: StageLabel>(overrides: &QueueOverrides<S>) -> Result<(), PipetreeError> {
    // Report in enumeration order, then by name for stages the enumeration omits.
    let rank = |stage: &S| S::all().iter().position(|s| s == stage).unwrap_or(usize::MAX);
    let rejected = overrides
        .iter()
        .filter_map(|(stage, config)| config.first_override().map(|feature| (*stage, feature)))
        .min_by_key(|(stage, _)| (rank(stage), stage.to_string()));

    match rejected {
        Some((stage, feature)) => Err(PipetreeError::UnimplementedFeature {
            stage: stage.to_string(),
            feature: feature.to_string(),
        }),
        None => Ok(()),
    }
}

/// Configuration for a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Name used in logs.
    pub name: String,
    /// How long shutdown waits for workers to finish their current item
    /// before aborting them. `None` waits for every in-flight handler.
    pub shutdown_timeout: Option<Duration>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            name: "pipetree".to_string(),
            shutdown_timeout: None,
        }
    }
}

impl PipelineConfig {
    /// Creates a configuration with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Aborts workers still running `timeout` after shutdown starts.
    ///
    /// Aborting interrupts handlers mid-item, so only set this when a stuck
    /// handler is worse than a half-finished one.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = Some(timeout);
        self
    }
}

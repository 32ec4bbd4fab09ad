//! Bounded, order-preserving fan-out for upstream calls
//!
//! Every pipeline stage pushes its per-item upstream calls through a
//! [`WorkerPool`]: at most `workers` calls in flight, results returned in input
//! order, and every call abandoned as soon as the request is cancelled or the
//! pipeline deadline passes.

use futures::stream::{self, StreamExt};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Deadline sizing for one pipeline run
#[derive(Debug, Clone, Copy)]
pub struct PipelineBudget {
    pub workers: usize,
    /// Per upstream call timeout
    pub per_call: Duration,
    /// Hard upper bound regardless of input size
    pub ceiling: Duration,
}

impl PipelineBudget {
    /// Time allowed for `songs × 2 + conversions` round trips
    ///
    /// Calls are spread over `workers` lanes; one extra wave covers the
    /// adapters that need a lookup before their main call.
    pub fn deadline_for(&self, songs: usize, conversions: usize) -> Duration {
        let calls = songs.saturating_mul(2).saturating_add(conversions);
        let waves = calls.div_ceil(self.workers.max(1)).saturating_add(1);
        let waves = u32::try_from(waves).unwrap_or(u32::MAX);
        self.per_call.saturating_mul(waves).min(self.ceiling)
    }
}

/// Bounded worker pool scoped to one request
#[derive(Debug, Clone)]
pub struct WorkerPool {
    workers: usize,
    cancel: CancellationToken,
    deadline: Instant,
}

impl WorkerPool {
    pub fn new(workers: usize, cancel: CancellationToken, deadline: Instant) -> Self {
        Self {
            workers: workers.max(1),
            cancel,
            deadline,
        }
    }

    /// Cancelled or past the deadline
    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled() || Instant::now() >= self.deadline
    }

    /// Run `task` over `items` with bounded concurrency
    ///
    /// The output has one slot per input, in input order. A slot is `None`
    /// when its call was stopped by cancellation or the deadline before
    /// completing.
    pub async fn run<I, T, F, Fut, R>(&self, items: I, task: F) -> Vec<Option<R>>
    where
        I: IntoIterator<Item = T>,
        F: Fn(T) -> Fut,
        Fut: Future<Output = R>,
    {
        if self.is_stopped() {
            return items.into_iter().map(|_| None).collect();
        }

        let cancel = &self.cancel;
        let deadline = self.deadline;

        stream::iter(items)
            .map(|item| {
                let call = task(item);
                async move {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => None,
                        _ = tokio::time::sleep_until(deadline) => None,
                        result = call => Some(result),
                    }
                }
            })
            .buffered(self.workers)
            .collect()
            .await
    }
}

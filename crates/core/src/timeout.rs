//! Timeout-with-fallback combinator
//!
//! Every I/O-bearing stage runs under a budget. When the budget trips, the
//! stage falls back locally (empty list or pre-stage result) and the
//! outcome records `timed_out`; siblings are unaffected.

use std::future::Future;
use std::time::Duration;

use crate::error::{Result, RetrievalError, Stage};

/// Outcome of a budgeted stage.
#[derive(Debug, Clone)]
pub struct StageOutcome<T> {
    pub value: T,
    /// The stage exceeded its budget and the fallback was used
    pub timed_out: bool,
    /// The stage failed hard and the fallback was used
    pub fallback_used: bool,
    /// Wall time spent in the stage
    pub elapsed_ms: u64,
}

impl<T> StageOutcome<T> {
    pub fn clean(value: T, elapsed_ms: u64) -> Self {
        Self {
            value,
            timed_out: false,
            fallback_used: false,
            elapsed_ms,
        }
    }

    /// Whether the stage degraded in any way.
    pub fn degraded(&self) -> bool {
        self.timed_out || self.fallback_used
    }
}

/// Run `op` under `budget`. On timeout or failure, resolve to `fallback`
/// and record what happened; the slow path is dropped with the future.
pub async fn with_timeout_and_fallback<T, F>(
    stage: Stage,
    budget: Duration,
    op: F,
    fallback: T,
) -> StageOutcome<T>
where
    F: Future<Output = Result<T>>,
{
    let started = std::time::Instant::now();
    match tokio::time::timeout(budget, op).await {
        Ok(Ok(value)) => StageOutcome::clean(value, started.elapsed().as_millis() as u64),
        Ok(Err(err)) => {
            tracing::warn!(stage = %stage, error = %err, "stage failed, using fallback");
            StageOutcome {
                value: fallback,
                timed_out: false,
                fallback_used: true,
                elapsed_ms: started.elapsed().as_millis() as u64,
            }
        }
        Err(_) => {
            tracing::warn!(stage = %stage, budget_ms = budget.as_millis() as u64, "stage timed out");
            StageOutcome {
                value: fallback,
                timed_out: true,
                fallback_used: true,
                elapsed_ms: started.elapsed().as_millis() as u64,
            }
        }
    }
}

/// Run `op` under `budget`, surfacing timeout and failure as errors.
/// Used for stages with no fallback (embedding).
pub async fn with_timeout<T, F>(stage: Stage, budget: Duration, op: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(budget, op).await {
        Ok(result) => result,
        Err(_) => Err(RetrievalError::UpstreamTimeout { stage }),
    }
}

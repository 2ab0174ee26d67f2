use std::{future, time::Duration};

use thiserror::Error;
use tokio::time::{Instant, sleep, sleep_until};

use super::{Counter, ExecutionClient, WaitError};
use crate::Context;

#[derive(Debug, Error)]
#[error("no response within {0:?}")]
struct NoResponse(Duration);

/// Last distinct height and when it was first seen.
struct StallTracker {
    height: u64,
    since: Instant,
}

impl StallTracker {
    const fn new(height: u64, now: Instant) -> Self {
        Self { height, since: now }
    }

    /// Records a sample and returns how long the height has been unchanged.
    fn observe(&mut self, height: u64, now: Instant) -> Duration {
        if height != self.height {
            self.height = height;
            self.since = now;
        }
        now.duration_since(self.since)
    }
}

/// Polls the execution client until its block number reaches `target`.
///
/// Fails with [`WaitError::Stalled`] once the reported height has not changed
/// for longer than `stall_window`, however far away the target still is. A
/// read that hangs counts towards the same window. A failed read is returned
/// right away.
pub async fn wait_for_block_height<C>(
    ctx: &Context,
    client: &C,
    target: u64,
    poll_interval: Duration,
    stall_window: Duration,
) -> Result<(), WaitError>
where
    C: ExecutionClient + ?Sized,
{
    tracing::info!(
        target_height = target,
        ?poll_interval,
        ?stall_window,
        "waiting for block height"
    );

    let started = Instant::now();
    let mut tracker: Option<StallTracker> = None;
    let deadline_error = |last_observed, reason| WaitError::DeadlineExceeded {
        counter: Counter::BlockNumber,
        target,
        last_observed,
        reason,
    };

    loop {
        let last_observed = tracker.as_ref().map(|t| t.height);
        if let Some(reason) = ctx.done_reason() {
            return Err(deadline_error(last_observed, reason));
        }

        // before the first sample the window runs from the start of the wait
        let stall_at = tracker
            .as_ref()
            .map_or(started, |tracker| tracker.since)
            .checked_add(stall_window);
        let stall_deadline = async {
            match stall_at {
                Some(at) => sleep_until(at).await,
                None => future::pending().await,
            }
        };

        let height = tokio::select! {
            biased;
            reason = ctx.done() => return Err(deadline_error(last_observed, reason)),
            result = client.block_number() => {
                result.map_err(|source| WaitError::QueryFailed {
                    counter: Counter::BlockNumber,
                    last_observed,
                    source,
                })?
            }
            () = stall_deadline => {
                tracing::warn!(?last_observed, ?stall_window, "block number read is hanging");
                return Err(match last_observed {
                    Some(value) => WaitError::Stalled {
                        counter: Counter::BlockNumber,
                        value,
                        target,
                        stall_window,
                    },
                    None => WaitError::QueryFailed {
                        counter: Counter::BlockNumber,
                        last_observed: None,
                        source: Box::new(NoResponse(stall_window)),
                    },
                });
            }
        };

        if height >= target {
            tracing::info!(height, target_height = target, "block height reached");
            return Ok(());
        }

        let now = Instant::now();
        let unchanged_for = match tracker.as_mut() {
            Some(tracker) => tracker.observe(height, now),
            None => {
                tracker = Some(StallTracker::new(height, now));
                Duration::ZERO
            }
        };
        if unchanged_for > stall_window {
            tracing::warn!(height, ?unchanged_for, "chain is stalled");
            return Err(WaitError::Stalled {
                counter: Counter::BlockNumber,
                value: height,
                target,
                stall_window,
            });
        }
        if unchanged_for.is_zero() {
            tracing::debug!(height, target_height = target, "block height advanced");
        }

        tokio::select! {
            biased;
            reason = ctx.done() => return Err(deadline_error(Some(height), reason)),
            () = sleep(poll_interval) => {}
        }
    }
}

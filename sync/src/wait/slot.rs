use std::time::Duration;

use tokio::time::sleep;

use super::{BeaconChainClient, BlockId, Counter, WaitError};
use crate::Context;

/// Polls the beacon node's head header once per slot until its slot reaches
/// `target`.
///
/// There is no stall detection here: the only way to give up is `ctx` being
/// cancelled or passing its deadline, which yields
/// [`WaitError::DeadlineExceeded`].
pub async fn wait_for_slot<C>(
    ctx: &Context,
    client: &C,
    target: u64,
    slot_duration: Duration,
) -> Result<(), WaitError>
where
    C: BeaconChainClient + ?Sized,
{
    tracing::info!(target_slot = target, ?slot_duration, "waiting for head slot");

    let deadline_error = |last_observed, reason| WaitError::DeadlineExceeded {
        counter: Counter::HeadSlot,
        target,
        last_observed,
        reason,
    };
    let mut last_observed: Option<u64> = None;

    loop {
        if let Some(reason) = ctx.done_reason() {
            return Err(deadline_error(last_observed, reason));
        }

        let header = tokio::select! {
            biased;
            reason = ctx.done() => return Err(deadline_error(last_observed, reason)),
            result = client.block_header(BlockId::Head) => {
                result.map_err(|source| WaitError::QueryFailed {
                    counter: Counter::HeadSlot,
                    last_observed,
                    source,
                })?
            }
        };

        if header.slot >= target {
            tracing::info!(slot = header.slot, target_slot = target, "head slot reached");
            return Ok(());
        }
        tracing::debug!(slot = header.slot, target_slot = target, "head slot behind target");
        last_observed = Some(header.slot);

        tokio::select! {
            biased;
            reason = ctx.done() => return Err(deadline_error(last_observed, reason)),
            () = sleep(slot_duration) => {}
        }
    }
}

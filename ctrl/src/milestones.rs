//! Waits for fork activation on either layer of the devnet.

use devnet_sync::{
    BeaconChainClient, Context, ExecutionClient, WaitError, wait_for_block_height, wait_for_slot,
};

use crate::{config::BeaconChainConfig, env::TestEnvironment};

/// First slot of the EIP-4844 fork epoch.
#[must_use]
pub const fn eip4844_fork_slot(config: &BeaconChainConfig) -> u64 {
    config.epoch_start_slot(config.eip4844_fork_epoch)
}

/// Blocks until geth has produced the sharding fork block, failing early if
/// the execution chain stalls.
pub async fn wait_for_sharding_fork(
    env: &TestEnvironment,
    ctx: &Context,
) -> Result<(), WaitError> {
    wait_for_sharding_fork_with_client(env, &env.execution_client(), ctx).await
}

pub async fn wait_for_sharding_fork_with_client<C>(
    env: &TestEnvironment,
    client: &C,
    ctx: &Context,
) -> Result<(), WaitError>
where
    C: ExecutionClient + ?Sized,
{
    let fork_block = env.geth_chain_config().sharding_fork_block;
    let settings = env.wait_settings();
    tracing::info!(fork_block, "waiting for sharding fork block");

    wait_for_block_height(
        ctx,
        client,
        fork_block,
        settings.block_poll_interval,
        settings.stall_window,
    )
    .await
}

/// Blocks until the beacon head reaches the EIP-4844 fork epoch, giving up
/// after the configured fork-epoch timeout.
pub async fn wait_for_eip4844_fork_epoch(
    env: &TestEnvironment,
    ctx: &Context,
) -> Result<(), WaitError> {
    wait_for_eip4844_fork_epoch_with_client(env, &env.beacon_client(), ctx).await
}

pub async fn wait_for_eip4844_fork_epoch_with_client<C>(
    env: &TestEnvironment,
    client: &C,
    ctx: &Context,
) -> Result<(), WaitError>
where
    C: BeaconChainClient + ?Sized,
{
    let config = env.beacon_chain_config();
    let fork_slot = eip4844_fork_slot(config);
    tracing::info!(
        fork_epoch = config.eip4844_fork_epoch,
        fork_slot,
        "waiting for eip4844 fork epoch"
    );

    let ctx = ctx.with_timeout(env.wait_settings().fork_epoch_timeout);
    wait_for_slot(&ctx, client, fork_slot, config.slot_duration()).await
}

//! Startup coordination and chain-progress waiting shared by devnet tests.

pub mod context;
pub mod launch;
pub mod wait;

use std::{env, ops::Mul as _, sync::LazyLock, time::Duration};

pub use context::Context;
pub use launch::{LaunchError, NamedService, Service, start_all};
pub use wait::{
    BeaconChainClient, BlockHeader, BlockId, Counter, ExecutionClient, WaitError,
    wait_for_block_height, wait_for_slot,
};

pub type DynError = Box<dyn std::error::Error + Send + Sync + 'static>;

static IS_SLOW_TEST_ENV: LazyLock<bool> =
    LazyLock::new(|| env::var("SLOW_TEST_ENV").is_ok_and(|s| s == "true"));

/// In slow test environments like CI runners, use 2x timeout.
#[must_use]
pub fn adjust_timeout(d: Duration) -> Duration {
    if *IS_SLOW_TEST_ENV { d.mul(2) } else { d }
}

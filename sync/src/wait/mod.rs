//! Pollers that block until an external chain counter reaches a target.
//!
//! Two policies are offered on purpose. [`wait_for_block_height`] fails fast
//! when the execution chain stops producing blocks, without any upper bound on
//! total time. [`wait_for_slot`] only gives up when the caller's context is
//! done, since slots keep ticking even when no block is proposed.

mod height;
mod slot;

#[cfg(test)]
mod scripted;

use std::{fmt, time::Duration};

use async_trait::async_trait;
use thiserror::Error;

pub use self::{height::wait_for_block_height, slot::wait_for_slot};
use crate::{DynError, context::DoneReason};

#[async_trait]
pub trait ExecutionClient: Send + Sync {
    async fn block_number(&self) -> Result<u64, DynError>;
}

#[async_trait]
pub trait BeaconChainClient: Send + Sync {
    async fn block_header(&self, id: BlockId) -> Result<BlockHeader, DynError>;
}

/// Block selector of the beacon headers endpoint.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BlockId {
    Head,
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Head => f.write_str("head"),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BlockHeader {
    pub root: String,
    pub slot: u64,
    pub proposer_index: u64,
}

/// The progress counter a wait is observing.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Counter {
    BlockNumber,
    HeadSlot,
}

impl fmt::Display for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BlockNumber => f.write_str("block number"),
            Self::HeadSlot => f.write_str("head slot"),
        }
    }
}

#[derive(Debug, Error)]
pub enum WaitError {
    #[error("failed to query {counter} (last observed {}): {source}", observed(.last_observed))]
    QueryFailed {
        counter: Counter,
        last_observed: Option<u64>,
        #[source]
        source: DynError,
    },
    #[error("chain is stalled: {counter} stuck at {value} for more than {stall_window:?} (target {target})")]
    Stalled {
        counter: Counter,
        value: u64,
        target: u64,
        stall_window: Duration,
    },
    #[error("{reason} while waiting for {counter} {target} (last observed {})", observed(.last_observed))]
    DeadlineExceeded {
        counter: Counter,
        target: u64,
        last_observed: Option<u64>,
        reason: DoneReason,
    },
}

impl WaitError {
    #[must_use]
    pub const fn counter(&self) -> Counter {
        match self {
            Self::QueryFailed { counter, .. }
            | Self::Stalled { counter, .. }
            | Self::DeadlineExceeded { counter, .. } => *counter,
        }
    }

    /// The last counter value seen before the wait failed.
    #[must_use]
    pub const fn last_observed(&self) -> Option<u64> {
        match self {
            Self::QueryFailed { last_observed, .. }
            | Self::DeadlineExceeded { last_observed, .. } => *last_observed,
            Self::Stalled { value, .. } => Some(*value),
        }
    }
}

fn observed(value: &Option<u64>) -> String {
    value.map_or_else(|| "nothing".to_owned(), |value| value.to_string())
}

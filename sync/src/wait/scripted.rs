//! Canned chain clients for poller tests.

use std::{
    future,
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use tokio::time::Instant;

use super::{BeaconChainClient, BlockHeader, BlockId, ExecutionClient};
use crate::DynError;

type Sample = Result<u64, &'static str>;

/// Replays samples in order, repeating the last one once exhausted.
pub struct Script {
    samples: Vec<Sample>,
    calls: AtomicUsize,
}

impl Script {
    fn new(samples: impl IntoIterator<Item = Sample>) -> Self {
        let samples: Vec<_> = samples.into_iter().collect();
        assert!(!samples.is_empty(), "script needs at least one sample");
        Self {
            samples,
            calls: AtomicUsize::new(0),
        }
    }

    fn next(&self) -> Result<u64, DynError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let index = call.min(self.samples.len() - 1);
        self.samples[index].map_err(Into::into)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub struct ScriptedExecution(Script);

impl ScriptedExecution {
    pub fn new(samples: impl IntoIterator<Item = Sample>) -> Self {
        Self(Script::new(samples))
    }

    pub fn calls(&self) -> usize {
        self.0.calls()
    }
}

#[async_trait]
impl ExecutionClient for ScriptedExecution {
    async fn block_number(&self) -> Result<u64, DynError> {
        self.0.next()
    }
}

/// Reports a height that follows a schedule of `(offset, height)` pairs
/// relative to its creation time.
pub struct TimedExecution {
    started: Instant,
    schedule: Vec<(Duration, u64)>,
}

impl TimedExecution {
    pub fn new(schedule: impl IntoIterator<Item = (Duration, u64)>) -> Self {
        Self {
            started: Instant::now(),
            schedule: schedule.into_iter().collect(),
        }
    }
}

#[async_trait]
impl ExecutionClient for TimedExecution {
    async fn block_number(&self) -> Result<u64, DynError> {
        let elapsed = self.started.elapsed();
        Ok(self
            .schedule
            .iter()
            .take_while(|(offset, _)| *offset <= elapsed)
            .last()
            .map_or(0, |(_, height)| *height))
    }
}

/// Answers with `heights` in order, then never replies again.
pub struct HangingExecution {
    heights: Vec<u64>,
    calls: AtomicUsize,
}

impl HangingExecution {
    pub fn after(heights: impl IntoIterator<Item = u64>) -> Self {
        Self {
            heights: heights.into_iter().collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExecutionClient for HangingExecution {
    async fn block_number(&self) -> Result<u64, DynError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        match self.heights.get(call) {
            Some(height) => Ok(*height),
            None => future::pending().await,
        }
    }
}

pub struct ScriptedBeacon(Script);

impl ScriptedBeacon {
    pub fn new(slots: impl IntoIterator<Item = Sample>) -> Self {
        Self(Script::new(slots))
    }

    pub fn calls(&self) -> usize {
        self.0.calls()
    }
}

#[async_trait]
impl BeaconChainClient for ScriptedBeacon {
    async fn block_header(&self, id: BlockId) -> Result<BlockHeader, DynError> {
        assert_eq!(id, BlockId::Head, "pollers only ask for the head");
        let slot = self.0.next()?;
        Ok(BlockHeader {
            root: format!("0x{slot:064x}"),
            slot,
            proposer_index: slot % 64,
        })
    }
}

use std::{
    env, fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use devnet_sync::adjust_timeout;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::env::ConsensusClient;

const DEVNET_CONFIG_DIR_VAR: &str = "DEVNET_CONFIG_DIR";
const DEFAULT_DEVNET_CONFIG_DIR: &str = "devnet";

const DEFAULT_BLOCK_POLL_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_STALL_WINDOW: Duration = Duration::from_secs(60);
const DEFAULT_FORK_EPOCH_TIMEOUT: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read {kind} config file at {}: {source}", .path.display())]
    Read {
        kind: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid geth chain config at {}: {source}", .path.display())]
    Genesis {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid beacon chain config file at {}: {source}", .path.display())]
    Beacon {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid beacon chain config file at {}: {reason}", .path.display())]
    Invalid { path: PathBuf, reason: String },
    #[error("invalid {kind} endpoint {url}: {source}")]
    Endpoint {
        kind: &'static str,
        url: Url,
        #[source]
        source: url::ParseError,
    },
}

/// Execution-layer fork schedule, taken from the `config` section of a geth
/// genesis file. Only the keys the waits need are read; geth keeps the rest
/// as big integers.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChainConfig {
    pub sharding_fork_block: u64,
}

#[derive(Deserialize)]
struct Genesis {
    config: ChainConfig,
}

impl ChainConfig {
    pub fn from_genesis_json(path: &Path, raw: &str) -> Result<Self, ConfigError> {
        serde_json::from_str::<Genesis>(raw)
            .map(|genesis| genesis.config)
            .map_err(|source| ConfigError::Genesis {
                path: path.to_owned(),
                source,
            })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = read_config("geth chain", path)?;
        Self::from_genesis_json(path, &raw)
    }
}

/// Consensus-layer parameters. Every key is mandatory.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct BeaconChainConfig {
    pub altair_fork_epoch: u64,
    pub bellatrix_fork_epoch: u64,
    pub eip4844_fork_epoch: u64,
    pub seconds_per_slot: u64,
    pub slots_per_epoch: u64,
    pub terminal_total_difficulty: u128,
}

impl BeaconChainConfig {
    pub fn from_yaml(path: &Path, raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(raw).map_err(|source| ConfigError::Beacon {
            path: path.to_owned(),
            source,
        })?;

        let invalid = |reason: &str| ConfigError::Invalid {
            path: path.to_owned(),
            reason: reason.to_owned(),
        };
        if config.seconds_per_slot == 0 {
            return Err(invalid("SECONDS_PER_SLOT must be positive"));
        }
        if config.slots_per_epoch == 0 {
            return Err(invalid("SLOTS_PER_EPOCH must be positive"));
        }
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = read_config("beacon chain", path)?;
        Self::from_yaml(path, &raw)
    }

    #[must_use]
    pub const fn slot_duration(&self) -> Duration {
        Duration::from_secs(self.seconds_per_slot)
    }

    /// First slot of `epoch`. Unscheduled forks use the far-future epoch,
    /// which saturates to a slot that is never reached.
    #[must_use]
    pub const fn epoch_start_slot(&self, epoch: u64) -> u64 {
        epoch.saturating_mul(self.slots_per_epoch)
    }
}

fn read_config(kind: &'static str, path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Read {
        kind,
        path: path.to_owned(),
        source,
    })
}

/// Where the devnet keeps its generated configuration.
///
/// ```text
/// <root>/docker-compose.yml
/// <root>/geth/genesis.json
/// <root>/<client>/chain-config.yml
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DevnetLayout {
    root: PathBuf,
}

impl DevnetLayout {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Uses `DEVNET_CONFIG_DIR` when set, `./devnet` otherwise.
    #[must_use]
    pub fn from_env() -> Self {
        let root = env::var_os(DEVNET_CONFIG_DIR_VAR)
            .filter(|value| !value.is_empty())
            .map_or_else(|| PathBuf::from(DEFAULT_DEVNET_CONFIG_DIR), PathBuf::from);
        Self::new(root)
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn compose_file(&self) -> PathBuf {
        self.root.join("docker-compose.yml")
    }

    #[must_use]
    pub fn geth_chain_config(&self) -> PathBuf {
        self.root.join("geth").join("genesis.json")
    }

    #[must_use]
    pub fn beacon_chain_config(&self, client: ConsensusClient) -> PathBuf {
        self.root.join(client.name()).join("chain-config.yml")
    }
}

/// Polling knobs for the milestone waits.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct WaitSettings {
    pub block_poll_interval: Duration,
    /// How long the execution chain may sit on the same block before the
    /// wait gives up.
    pub stall_window: Duration,
    pub fork_epoch_timeout: Duration,
}

impl Default for WaitSettings {
    fn default() -> Self {
        Self {
            block_poll_interval: DEFAULT_BLOCK_POLL_INTERVAL,
            stall_window: adjust_timeout(DEFAULT_STALL_WINDOW),
            fork_epoch_timeout: adjust_timeout(DEFAULT_FORK_EPOCH_TIMEOUT),
        }
    }
}

impl WaitSettings {
    #[must_use]
    pub const fn with_stall_window(mut self, stall_window: Duration) -> Self {
        self.stall_window = stall_window;
        self
    }

    #[must_use]
    pub const fn with_fork_epoch_timeout(mut self, timeout: Duration) -> Self {
        self.fork_epoch_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_block_poll_interval(mut self, interval: Duration) -> Self {
        self.block_poll_interval = interval;
        self
    }
}

//! Bootstrap control for execution/consensus interop devnets: load the chain
//! configs, bring the nodes up and wait for fork milestones.

pub mod clients;
pub mod config;
pub mod env;
pub mod logging;
pub mod milestones;
pub mod services;

pub use config::{BeaconChainConfig, ChainConfig, ConfigError, DevnetLayout, WaitSettings};
pub use devnet_sync::{Context, DynError, LaunchError, WaitError, adjust_timeout};
pub use env::{
    ConsensusClient, DevnetControl, DevnetServices, Endpoints, SetupError, TestEnvironment,
    init_e2e_test,
};
pub use milestones::{
    eip4844_fork_slot, wait_for_eip4844_fork_epoch, wait_for_eip4844_fork_epoch_with_client,
    wait_for_sharding_fork, wait_for_sharding_fork_with_client,
};

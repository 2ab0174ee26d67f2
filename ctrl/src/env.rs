use std::{fmt, str::FromStr, sync::Arc};

use async_trait::async_trait;
use devnet_sync::{Context, DynError, LaunchError, NamedService, Service, start_all};
use thiserror::Error;
use url::Url;

use crate::{
    clients::{HttpBeaconClient, HttpExecutionClient},
    config::{BeaconChainConfig, ChainConfig, ConfigError, DevnetLayout, WaitSettings},
    services::{ComposeDevnet, ComposeProject, ComposeService, Readiness},
};

pub const BEACON_NODE: &str = "beacon-node";
pub const GETH_NODE: &str = "geth-node";
pub const VALIDATOR_NODE: &str = "validator-node";
pub const BEACON_NODE_FOLLOWER: &str = "beacon-node-follower";
pub const GETH_NODE_2: &str = "geth-node-2";

/// Consensus client implementation the devnet is built around.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ConsensusClient {
    Prysm,
    Lodestar,
    Lighthouse,
}

impl ConsensusClient {
    pub const ALL: [Self; 3] = [Self::Prysm, Self::Lodestar, Self::Lighthouse];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Prysm => "prysm",
            Self::Lodestar => "lodestar",
            Self::Lighthouse => "lighthouse",
        }
    }

    /// Only prysm runs its validator as a separate process in the devnet;
    /// the others drive validators from inside the beacon node.
    #[must_use]
    pub const fn runs_separate_validator(self) -> bool {
        matches!(self, Self::Prysm)
    }
}

impl fmt::Display for ConsensusClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error)]
#[error("unknown consensus client {0:?}, expected one of prysm, lodestar, lighthouse")]
pub struct UnknownClientError(String);

impl FromStr for ConsensusClient {
    type Err = UnknownClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|client| client.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownClientError(s.to_owned()))
    }
}

/// Tears down whatever devnet a previous run left behind.
#[async_trait]
pub trait DevnetControl: Send + Sync {
    async fn stop(&self) -> Result<(), DynError>;
}

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("unable to stop devnet: {source}")]
    StopDevnet {
        #[source]
        source: DynError,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Launch(#[from] LaunchError),
}

/// RPC endpoints of the primary nodes, used to observe chain progress.
#[derive(Clone, Debug)]
pub struct Endpoints {
    pub execution_rpc: Url,
    pub execution_rpc_2: Url,
    pub beacon_api: Url,
    pub beacon_api_follower: Url,
}

/// The nodes of one devnet. The validator is absent for clients that run
/// validators inside the beacon node.
pub struct DevnetServices {
    pub beacon_node: Arc<dyn Service>,
    pub geth_node: Arc<dyn Service>,
    pub validator_node: Option<Arc<dyn Service>>,
    pub beacon_node_follower: Arc<dyn Service>,
    pub geth_node_2: Arc<dyn Service>,
}

impl DevnetServices {
    fn launch_group(&self) -> [NamedService; 5] {
        [
            NamedService::new(BEACON_NODE, Arc::clone(&self.beacon_node)),
            NamedService::new(GETH_NODE, Arc::clone(&self.geth_node)),
            NamedService::optional(VALIDATOR_NODE, self.validator_node.clone()),
            NamedService::new(BEACON_NODE_FOLLOWER, Arc::clone(&self.beacon_node_follower)),
            NamedService::new(GETH_NODE_2, Arc::clone(&self.geth_node_2)),
        ]
    }
}

/// Everything a test needs to drive one client's devnet. Built explicitly per
/// client and passed around; nothing is looked up through global state.
pub struct TestEnvironment {
    client: ConsensusClient,
    geth_chain_config: ChainConfig,
    beacon_chain_config: BeaconChainConfig,
    services: DevnetServices,
    endpoints: Endpoints,
    wait_settings: WaitSettings,
}

impl TestEnvironment {
    #[must_use]
    pub fn new(
        client: ConsensusClient,
        geth_chain_config: ChainConfig,
        beacon_chain_config: BeaconChainConfig,
        services: DevnetServices,
        endpoints: Endpoints,
    ) -> Self {
        Self {
            client,
            geth_chain_config,
            beacon_chain_config,
            services,
            endpoints,
            wait_settings: WaitSettings::default(),
        }
    }

    /// Reads both chain configs from `layout` and pairs them with `services`.
    pub fn load(
        client: ConsensusClient,
        layout: &DevnetLayout,
        services: DevnetServices,
        endpoints: Endpoints,
    ) -> Result<Self, ConfigError> {
        let beacon_chain_config = BeaconChainConfig::load(&layout.beacon_chain_config(client))?;
        let geth_chain_config = ChainConfig::load(&layout.geth_chain_config())?;
        Ok(Self::new(
            client,
            geth_chain_config,
            beacon_chain_config,
            services,
            endpoints,
        ))
    }

    /// Builds the environment for a devnet described by the compose file in
    /// `layout`. Compose services are named `<client>-<node>`.
    pub fn compose(
        client: ConsensusClient,
        layout: &DevnetLayout,
        endpoints: Endpoints,
    ) -> Result<(Self, ComposeDevnet), ConfigError> {
        let project = Arc::new(ComposeProject::new(
            layout.compose_file(),
            format!("interop-{client}"),
        ));
        let node = |name: &str, readiness: Readiness| -> Arc<dyn Service> {
            Arc::new(ComposeService::new(
                Arc::clone(&project),
                format!("{client}-{name}"),
                readiness,
            ))
        };
        let health = |api: &Url| {
            HttpBeaconClient::new(api.clone())
                .health_url()
                .map(Readiness::HttpGet)
                .map_err(|source| ConfigError::Endpoint {
                    kind: "beacon api",
                    url: api.clone(),
                    source,
                })
        };

        let services = DevnetServices {
            beacon_node: node(BEACON_NODE, health(&endpoints.beacon_api)?),
            geth_node: node(
                GETH_NODE,
                Readiness::ExecutionRpc(endpoints.execution_rpc.clone()),
            ),
            validator_node: client
                .runs_separate_validator()
                .then(|| node(VALIDATOR_NODE, Readiness::Immediate)),
            beacon_node_follower: node(
                BEACON_NODE_FOLLOWER,
                health(&endpoints.beacon_api_follower)?,
            ),
            geth_node_2: node(
                GETH_NODE_2,
                Readiness::ExecutionRpc(endpoints.execution_rpc_2.clone()),
            ),
        };

        let env = Self::load(client, layout, services, endpoints)?;
        Ok((env, ComposeDevnet::new(project)))
    }

    #[must_use]
    pub const fn with_wait_settings(mut self, wait_settings: WaitSettings) -> Self {
        self.wait_settings = wait_settings;
        self
    }

    #[must_use]
    pub const fn client(&self) -> ConsensusClient {
        self.client
    }

    #[must_use]
    pub const fn geth_chain_config(&self) -> &ChainConfig {
        &self.geth_chain_config
    }

    #[must_use]
    pub const fn beacon_chain_config(&self) -> &BeaconChainConfig {
        &self.beacon_chain_config
    }

    #[must_use]
    pub const fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    #[must_use]
    pub const fn wait_settings(&self) -> &WaitSettings {
        &self.wait_settings
    }

    #[must_use]
    pub fn execution_client(&self) -> HttpExecutionClient {
        HttpExecutionClient::new(self.endpoints.execution_rpc.clone())
    }

    #[must_use]
    pub fn beacon_client(&self) -> HttpBeaconClient {
        HttpBeaconClient::new(self.endpoints.beacon_api.clone())
    }

    /// Starts every node of the devnet concurrently; see
    /// [`devnet_sync::start_all`] for the failure semantics.
    pub async fn start_all(&self, ctx: &Context) -> Result<(), LaunchError> {
        start_all(ctx, self.services.launch_group()).await
    }
}

/// Stops any previous devnet and brings up all nodes of `env`.
pub async fn init_e2e_test(
    env: &TestEnvironment,
    devnet: &dyn DevnetControl,
    ctx: &Context,
) -> Result<(), SetupError> {
    tracing::info!(client = %env.client(), "initializing e2e test");
    devnet
        .stop()
        .await
        .map_err(|source| SetupError::StopDevnet { source })?;
    env.start_all(ctx).await?;
    tracing::info!(client = %env.client(), "devnet is up");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_names_round_trip_case_insensitively() {
        for client in ConsensusClient::ALL {
            assert_eq!(client.name().parse::<ConsensusClient>().unwrap(), client);
        }
        assert_eq!(
            " Lodestar ".parse::<ConsensusClient>().unwrap(),
            ConsensusClient::Lodestar
        );
    }

    #[test]
    fn unknown_client_is_rejected() {
        let error = "teku".parse::<ConsensusClient>().unwrap_err();

        assert!(error.to_string().contains("\"teku\""));
    }

    #[test]
    fn only_prysm_runs_a_separate_validator() {
        assert!(ConsensusClient::Prysm.runs_separate_validator());
        assert!(!ConsensusClient::Lodestar.runs_separate_validator());
        assert!(!ConsensusClient::Lighthouse.runs_separate_validator());
    }
}

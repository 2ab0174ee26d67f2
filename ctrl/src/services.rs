//! Devnet nodes run as docker compose services.

use std::{
    io,
    path::{Path, PathBuf},
    process,
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use devnet_sync::{Context, DynError, Service, adjust_timeout, context::DoneReason};
use reqwest::Client;
use thiserror::Error;
use tokio::{
    process::Command,
    time::{Instant, sleep, timeout, timeout_at},
};
use url::Url;

use crate::{
    clients::{HttpExecutionClient, http_client},
    env::DevnetControl,
};

const COMPOSE_UP_TIMEOUT: Duration = Duration::from_secs(120);
const COMPOSE_DOWN_TIMEOUT: Duration = Duration::from_secs(60);
const READINESS_TIMEOUT: Duration = Duration::from_secs(90);
const READINESS_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("{command} exited with status {status}")]
    Failed {
        command: String,
        status: process::ExitStatus,
    },
    #[error("failed to spawn {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("{command} timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },
    #[error("{service} did not become ready at {url} within {timeout:?}")]
    NotReady {
        service: String,
        url: Url,
        timeout: Duration,
    },
    #[error("start of {service} aborted: {reason}")]
    Aborted { service: String, reason: DoneReason },
}

/// How to tell that a started container is serving.
#[derive(Clone, Debug)]
pub enum Readiness {
    /// The container being up is enough.
    Immediate,
    /// Any successful response to a GET, e.g. a beacon node health endpoint.
    HttpGet(Url),
    /// The JSON-RPC endpoint answers `eth_blockNumber`.
    ExecutionRpc(Url),
}

/// One compose project holding the whole devnet.
#[derive(Clone, Debug)]
pub struct ComposeProject {
    compose_file: PathBuf,
    project_name: String,
    root: PathBuf,
}

impl ComposeProject {
    #[must_use]
    pub fn new(compose_file: impl Into<PathBuf>, project_name: impl Into<String>) -> Self {
        let compose_file = compose_file.into();
        let root = compose_file
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        Self {
            compose_file,
            project_name: project_name.into(),
            root,
        }
    }

    #[must_use]
    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new("docker");
        cmd.arg("compose")
            .arg("-f")
            .arg(&self.compose_file)
            .arg("-p")
            .arg(&self.project_name)
            .current_dir(&self.root)
            .kill_on_drop(true);
        cmd
    }

    fn up_command(&self, service: &str) -> Command {
        let mut cmd = self.command();
        cmd.arg("up").arg("-d").arg(service);
        cmd
    }

    fn down_command(&self) -> Command {
        let mut cmd = self.command();
        cmd.arg("down").arg("--volumes");
        cmd
    }

    pub async fn up(&self, service: &str) -> Result<(), ComposeError> {
        run_compose_command(
            self.up_command(service),
            adjust_timeout(COMPOSE_UP_TIMEOUT),
            &format!("docker compose up {service}"),
        )
        .await
    }

    pub async fn down(&self) -> Result<(), ComposeError> {
        run_compose_command(
            self.down_command(),
            adjust_timeout(COMPOSE_DOWN_TIMEOUT),
            "docker compose down",
        )
        .await
    }
}

async fn run_compose_command(
    mut command: Command,
    timeout_duration: Duration,
    description: &str,
) -> Result<(), ComposeError> {
    match timeout(timeout_duration, command.status()).await {
        Ok(Ok(status)) if status.success() => Ok(()),
        Ok(Ok(status)) => Err(ComposeError::Failed {
            command: description.to_owned(),
            status,
        }),
        Ok(Err(err)) => Err(ComposeError::Spawn {
            command: description.to_owned(),
            source: err,
        }),
        Err(_) => Err(ComposeError::Timeout {
            command: description.to_owned(),
            timeout: timeout_duration,
        }),
    }
}

/// A single node of the devnet, started with `docker compose up -d <service>`.
pub struct ComposeService {
    project: Arc<ComposeProject>,
    service: String,
    readiness: Readiness,
    readiness_timeout: Duration,
}

impl ComposeService {
    #[must_use]
    pub fn new(
        project: Arc<ComposeProject>,
        service: impl Into<String>,
        readiness: Readiness,
    ) -> Self {
        Self {
            project,
            service: service.into(),
            readiness,
            readiness_timeout: adjust_timeout(READINESS_TIMEOUT),
        }
    }

    fn aborted(&self, reason: DoneReason) -> ComposeError {
        ComposeError::Aborted {
            service: self.service.clone(),
            reason,
        }
    }

    async fn wait_ready(&self, ctx: &Context) -> Result<(), ComposeError> {
        let (url, probe) = match &self.readiness {
            Readiness::Immediate => return Ok(()),
            Readiness::HttpGet(url) => (url.clone(), Probe::Get(http_client())),
            Readiness::ExecutionRpc(url) => (
                url.clone(),
                Probe::Rpc(HttpExecutionClient::new(url.clone())),
            ),
        };

        let give_up_at = Instant::now() + self.readiness_timeout;
        loop {
            let ready = tokio::select! {
                reason = ctx.done() => return Err(self.aborted(reason)),
                probed = timeout_at(give_up_at, probe.is_ready(&url)) => probed.unwrap_or(false),
            };
            if ready {
                tracing::debug!(service = %self.service, %url, "readiness probe succeeded");
                return Ok(());
            }
            if Instant::now() >= give_up_at {
                return Err(ComposeError::NotReady {
                    service: self.service.clone(),
                    url,
                    timeout: self.readiness_timeout,
                });
            }
            tokio::select! {
                reason = ctx.done() => return Err(self.aborted(reason)),
                () = sleep(READINESS_POLL_INTERVAL) => {}
            }
        }
    }
}

enum Probe {
    Get(Client),
    Rpc(HttpExecutionClient),
}

impl Probe {
    async fn is_ready(&self, url: &Url) -> bool {
        match self {
            Self::Get(client) => client
                .get(url.clone())
                .send()
                .await
                .is_ok_and(|response| response.status().is_success()),
            Self::Rpc(client) => client.block_number().await.is_ok(),
        }
    }
}

#[async_trait]
impl Service for ComposeService {
    async fn start(&self, ctx: &Context) -> Result<(), DynError> {
        if let Some(reason) = ctx.done_reason() {
            return Err(self.aborted(reason).into());
        }

        tokio::select! {
            reason = ctx.done() => return Err(self.aborted(reason).into()),
            result = self.project.up(&self.service) => result?,
        }

        self.wait_ready(ctx).await?;
        Ok(())
    }
}

/// Tears the whole compose project down before a new run.
pub struct ComposeDevnet {
    project: Arc<ComposeProject>,
}

impl ComposeDevnet {
    #[must_use]
    pub const fn new(project: Arc<ComposeProject>) -> Self {
        Self { project }
    }
}

#[async_trait]
impl DevnetControl for ComposeDevnet {
    async fn stop(&self) -> Result<(), DynError> {
        tracing::info!(project = self.project.project_name(), "stopping devnet");
        self.project.down().await?;
        Ok(())
    }
}

use async_trait::async_trait;
use devnet_sync::{BeaconChainClient, BlockHeader, BlockId, DynError};
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_with::{DisplayFromStr, serde_as};
use thiserror::Error;

const HEADERS_PATH: &str = "eth/v1/beacon/headers";
const HEALTH_PATH: &str = "eth/v1/node/health";

#[derive(Debug, Error)]
pub enum BeaconError {
    #[error("invalid beacon api url: {0}")]
    Url(#[from] url::ParseError),
    #[error("beacon api request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Client for the standard beacon node REST API.
#[derive(Clone)]
pub struct HttpBeaconClient {
    client: Client,
    base_url: Url,
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct HeaderData {
    root: String,
    header: SignedHeader,
}

#[derive(Deserialize)]
struct SignedHeader {
    message: HeaderMessage,
}

#[serde_as]
#[derive(Deserialize)]
struct HeaderMessage {
    #[serde_as(as = "DisplayFromStr")]
    slot: u64,
    #[serde_as(as = "DisplayFromStr")]
    proposer_index: u64,
}

impl From<HeaderData> for BlockHeader {
    fn from(data: HeaderData) -> Self {
        Self {
            root: data.root,
            slot: data.header.message.slot,
            proposer_index: data.header.message.proposer_index,
        }
    }
}

impl HttpBeaconClient {
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self::with_client(super::http_client(), base_url)
    }

    #[must_use]
    pub const fn with_client(client: Client, base_url: Url) -> Self {
        Self { client, base_url }
    }

    pub fn health_url(&self) -> Result<Url, url::ParseError> {
        self.endpoint(HEALTH_PATH)
    }

    fn endpoint(&self, path: &str) -> Result<Url, url::ParseError> {
        self.base_url.join(path.trim_start_matches('/'))
    }

    pub async fn get_block_header(&self, id: BlockId) -> Result<BlockHeader, BeaconError> {
        let url = self.endpoint(&format!("{HEADERS_PATH}/{id}"))?;
        let envelope: Envelope<HeaderData> = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(envelope.data.into())
    }
}

#[async_trait]
impl BeaconChainClient for HttpBeaconClient {
    async fn block_header(&self, id: BlockId) -> Result<BlockHeader, DynError> {
        Ok(self.get_block_header(id).await?)
    }
}

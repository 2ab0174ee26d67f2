use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use devnet_sync::{DynError, ExecutionClient};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("{method} request failed: {source}")]
    Transport {
        method: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{method} returned error {code}: {message}")]
    Rpc {
        method: &'static str,
        code: i64,
        message: String,
    },
    #[error("{method} returned neither result nor error")]
    EmptyResponse { method: &'static str },
    #[error("invalid hex quantity {0:?}")]
    InvalidQuantity(String),
}

#[derive(Serialize)]
struct Request<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: &'a [Value],
    id: u64,
}

#[derive(Deserialize)]
struct Response<T> {
    result: Option<T>,
    error: Option<ErrorObject>,
}

#[derive(Deserialize)]
struct ErrorObject {
    code: i64,
    message: String,
}

/// Minimal JSON-RPC client for a geth node.
pub struct HttpExecutionClient {
    client: Client,
    url: Url,
    next_id: AtomicU64,
}

impl HttpExecutionClient {
    #[must_use]
    pub fn new(url: Url) -> Self {
        Self::with_client(super::http_client(), url)
    }

    #[must_use]
    pub const fn with_client(client: Client, url: Url) -> Self {
        Self {
            client,
            url,
            next_id: AtomicU64::new(1),
        }
    }

    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    async fn call<T>(&self, method: &'static str, params: &[Value]) -> Result<T, RpcError>
    where
        T: DeserializeOwned,
    {
        let request = Request {
            jsonrpc: "2.0",
            method,
            params,
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
        };
        let transport = |source| RpcError::Transport { method, source };

        let response: Response<T> = self
            .client
            .post(self.url.clone())
            .json(&request)
            .send()
            .await
            .map_err(transport)?
            .error_for_status()
            .map_err(transport)?
            .json()
            .await
            .map_err(transport)?;

        match response {
            Response {
                error: Some(error), ..
            } => Err(RpcError::Rpc {
                method,
                code: error.code,
                message: error.message,
            }),
            Response {
                result: Some(result),
                ..
            } => Ok(result),
            Response { result: None, .. } => Err(RpcError::EmptyResponse { method }),
        }
    }

    pub async fn block_number(&self) -> Result<u64, RpcError> {
        let quantity: String = self.call("eth_blockNumber", &[]).await?;
        parse_quantity(&quantity)
    }
}

#[async_trait]
impl ExecutionClient for HttpExecutionClient {
    async fn block_number(&self) -> Result<u64, DynError> {
        Ok(Self::block_number(self).await?)
    }
}

fn parse_quantity(raw: &str) -> Result<u64, RpcError> {
    raw.strip_prefix("0x")
        .filter(|digits| !digits.is_empty())
        .and_then(|digits| u64::from_str_radix(digits, 16).ok())
        .ok_or_else(|| RpcError::InvalidQuantity(raw.to_owned()))
}

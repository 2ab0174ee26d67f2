//! HTTP clients for the devnet's execution and beacon nodes.

mod beacon;
mod execution;

use std::time::Duration;

pub use beacon::{BeaconError, HttpBeaconClient};
pub use execution::{HttpExecutionClient, RpcError};
use reqwest::Client;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);
const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Client with bounded request and connect timeouts, so a node that accepts
/// a connection but never answers cannot hang a wait.
#[must_use]
pub fn http_client() -> Client {
    Client::builder()
        .timeout(HTTP_TIMEOUT)
        .connect_timeout(HTTP_CONNECT_TIMEOUT)
        .build()
        .expect("constructing reqwest client")
}

//! HTTP transport: ethers' `Http` client over a configured reqwest `Client`

use crate::config::NodeConfig;
use crate::error::TransportError;

use ethers::providers::{Http, HttpClientError};
use reqwest::{redirect, Client, Url};
use std::time::Duration;
use tracing::debug;

/// Build the node's HTTP client with the configured request timeout and redirect limit
pub fn http_client(config: &NodeConfig) -> Result<Http, TransportError> {
    let url = Url::parse(&config.rpc_url)
        .map_err(|e| TransportError::Connection(format!("Invalid RPC URL: {}", e)))?;

    let client = Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .redirect(redirect::Policy::limited(config.max_redirects))
        .build()
        .map_err(|e| TransportError::Connection(format!("Failed to build HTTP client: {}", e)))?;

    debug!(
        "HTTP client for {} (timeout {}s, {} redirects)",
        url, config.request_timeout_secs, config.max_redirects
    );
    Ok(Http::new_with_client(url, client))
}

impl From<HttpClientError> for TransportError {
    fn from(e: HttpClientError) -> Self {
        match e {
            HttpClientError::ReqwestError(e) => {
                if e.is_timeout() {
                    TransportError::Timeout
                } else if e.is_redirect() {
                    TransportError::TooManyRedirects(e.to_string())
                } else if e.status().is_some() {
                    TransportError::Http(e.to_string())
                } else {
                    TransportError::Connection(e.to_string())
                }
            }
            HttpClientError::JsonRpcError(e) => TransportError::Rpc {
                code: e.code,
                message: e.message,
            },
            // The body was not a JSON-RPC envelope, e.g. a gateway error page
            HttpClientError::SerdeJson { err, text } => {
                TransportError::Http(format!("{}: {}", err, text))
            }
        }
    }
}

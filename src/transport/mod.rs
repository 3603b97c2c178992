//! JSON-RPC transport layer
//!
//! Every node request goes through an ethers [`JsonRpcClient`]:
//! - [`http_client`]: ethers' `Http` over a reqwest client with request timeout and redirect limit
//! - [`RetryingTransport`]: wraps any client with a [`RetryPolicy`] and reports [`TransportError`]
//!
//! A `null` result is a valid response and means "absent".
//!
//! [`TransportError`]: crate::error::TransportError

mod http;
mod retry;

#[cfg(test)]
pub(crate) mod scripted;

pub use ethers::providers::JsonRpcClient;
pub use http::http_client;
pub use retry::{RetryPolicy, RetryingTransport};

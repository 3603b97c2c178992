//! Bounded retry for transient transport failures
//!
//! One policy, two terminal behaviours:
//! - `Propagate`: after the last failed attempt the error is returned to the caller
//! - `Swallow`: after the last failed attempt the call yields an absent result
//!
//! Errors outside the configured transient categories (including JSON-RPC
//! application errors) are never retried and are returned immediately.

use super::JsonRpcClient;
use crate::config::{OnExhausted, RetryConfig};
use crate::error::{TransientKind, TransportError};

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, warn};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    retry_on: Vec<TransientKind>,
    max_attempts: u32,
    delay: Duration,
    on_exhausted: OnExhausted,
}

impl RetryPolicy {
    /// Retry every transient category, re-raising the last error
    pub fn propagate(max_attempts: u32) -> Self {
        Self {
            retry_on: TransientKind::ALL.to_vec(),
            max_attempts: max_attempts.max(1),
            delay: Duration::ZERO,
            on_exhausted: OnExhausted::Propagate,
        }
    }

    /// Retry every transient category spaced by `delay`, yielding an absent result
    pub fn swallow(max_attempts: u32, delay: Duration) -> Self {
        Self {
            retry_on: TransientKind::ALL.to_vec(),
            max_attempts: max_attempts.max(1),
            delay,
            on_exhausted: OnExhausted::Swallow,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            retry_on: config.retry_on.clone(),
            max_attempts: config.max_attempts.max(1),
            delay: Duration::from_millis(config.delay_ms),
            on_exhausted: config.policy,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn retry_on(mut self, kinds: &[TransientKind]) -> Self {
        self.retry_on = kinds.to_vec();
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn on_exhausted(&self) -> OnExhausted {
        self.on_exhausted
    }

    pub fn is_retryable(&self, err: &TransportError) -> bool {
        err.transient_kind()
            .map(|kind| self.retry_on.contains(&kind))
            .unwrap_or(false)
    }

    /// Run `op` under this policy.
    ///
    /// `Ok(None)` is only produced by the swallow behaviour once all attempts failed.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<Option<T>, TransportError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let mut attempt = 0;

        loop {
            attempt += 1;

            let err = match op().await {
                Ok(value) => return Ok(Some(value)),
                Err(e) => e,
            };

            if !self.is_retryable(&err) {
                debug!("{} failed with non-retryable error: {}", label, err);
                return Err(err);
            }

            if attempt >= self.max_attempts {
                crate::metrics::record_rpc_exhausted(label);
                return match self.on_exhausted {
                    OnExhausted::Propagate => {
                        error!(
                            "{} failed after {} attempts: {}",
                            label, self.max_attempts, err
                        );
                        Err(err)
                    }
                    OnExhausted::Swallow => {
                        error!(
                            "{} failed after {} attempts, returning empty result: {}",
                            label, self.max_attempts, err
                        );
                        Ok(None)
                    }
                };
            }

            warn!(
                "{} failed (attempt {}/{}), retrying: {}",
                label, attempt, self.max_attempts, err
            );
            crate::metrics::record_rpc_retry(label);

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Client wrapper applying a [`RetryPolicy`] to every request.
///
/// The inner client's errors are mapped onto [`TransportError`] so the policy can
/// classify them. Once the swallow behaviour gives up, the response is decoded
/// from `null`.
#[derive(Debug)]
pub struct RetryingTransport<C> {
    inner: C,
    policy: RetryPolicy,
}

impl<C> RetryingTransport<C>
where
    C: JsonRpcClient,
    C::Error: Into<TransportError>,
{
    pub fn new(inner: C, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }
}

#[async_trait]
impl<C> JsonRpcClient for RetryingTransport<C>
where
    C: JsonRpcClient,
    C::Error: Into<TransportError>,
{
    type Error = TransportError;

    async fn request<T, R>(&self, method: &str, params: T) -> Result<R, TransportError>
    where
        T: Debug + Serialize + Send + Sync,
        R: DeserializeOwned + Send,
    {
        let inner = &self.inner;
        let params = &params;
        let result = self
            .policy
            .run(method, move || async move {
                inner
                    .request::<&T, Value>(method, params)
                    .await
                    .map_err(Into::into)
            })
            .await?;

        serde_json::from_value(result.unwrap_or(Value::Null))
            .map_err(|e| TransportError::InvalidResponse(format!("{}: {}", method, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::scripted::ScriptedClient;
    use serde_json::json;

    fn connection_reset() -> TransportError {
        TransportError::Connection("connection reset by peer".to_string())
    }

    #[tokio::test]
    async fn test_propagate_succeeds_on_last_attempt() {
        let client = ScriptedClient::new(vec![
            Err(connection_reset()),
            Err(connection_reset()),
            Err(connection_reset()),
            Ok(json!("0x1")),
        ]);

        let transport = RetryingTransport::new(client, RetryPolicy::propagate(4));
        let value: Value = transport.request("eth_gasPrice", json!([])).await.unwrap();
        assert_eq!(value, json!("0x1"));
        assert_eq!(transport.inner().calls(), 4);
    }

    #[tokio::test]
    async fn test_propagate_reraises_after_budget() {
        let client = ScriptedClient::always(Err(TransportError::Timeout));

        let transport = RetryingTransport::new(client, RetryPolicy::propagate(3));
        let err = transport
            .request::<_, Value>("eth_gasPrice", json!([]))
            .await
            .unwrap_err();
        assert_eq!(err, TransportError::Timeout);
        assert_eq!(transport.inner().calls(), 3);
    }

    #[tokio::test]
    async fn test_swallow_returns_absent_after_budget() {
        let client =
            ScriptedClient::always(Err(TransportError::Http("503 unavailable".to_string())));

        let transport = RetryingTransport::new(
            client,
            RetryPolicy::swallow(5, Duration::from_millis(1)),
        );
        let value: Option<Value> = transport
            .request("eth_getTransactionReceipt", json!(["0x00"]))
            .await
            .unwrap();
        assert!(value.is_none());
        assert_eq!(transport.inner().calls(), 5);
    }

    #[tokio::test]
    async fn test_swallowed_result_must_allow_absence() {
        let client = ScriptedClient::always(Err(TransportError::Timeout));

        let transport = RetryingTransport::new(
            client,
            RetryPolicy::swallow(2, Duration::from_millis(1)),
        );
        let err = transport
            .request::<_, u64>("eth_chainId", json!([]))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_rpc_error_is_not_retried() {
        let client = ScriptedClient::always(Err(TransportError::Rpc {
            code: 3,
            message: "execution reverted".to_string(),
        }));

        let transport = RetryingTransport::new(
            client,
            RetryPolicy::swallow(10, Duration::from_millis(1)),
        );
        let err = transport
            .request::<_, Value>("eth_call", json!([]))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Rpc { code: 3, .. }));
        assert_eq!(transport.inner().calls(), 1);
    }

    #[tokio::test]
    async fn test_category_outside_retry_set_is_not_retried() {
        let client = ScriptedClient::always(Err(TransportError::Timeout));

        let policy = RetryPolicy::propagate(5).retry_on(&[TransientKind::Connection]);
        let transport = RetryingTransport::new(client, policy);
        assert!(transport
            .request::<_, Value>("eth_call", json!([]))
            .await
            .is_err());
        assert_eq!(transport.inner().calls(), 1);
    }

    #[tokio::test]
    async fn test_delay_spaces_attempts() {
        let policy = RetryPolicy::propagate(3).with_delay(Duration::from_millis(15));
        let started = std::time::Instant::now();
        let result: Result<Option<()>, _> = policy
            .run("eth_blockNumber", || async { Err(connection_reset()) })
            .await;

        assert!(result.is_err());
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_policy_from_config() {
        let config = RetryConfig {
            policy: OnExhausted::Swallow,
            max_attempts: 0,
            delay_ms: 250,
            retry_on: vec![TransientKind::Http],
        };
        let policy = RetryPolicy::from_config(&config);
        assert_eq!(policy.max_attempts(), 1);
        assert_eq!(policy.on_exhausted(), OnExhausted::Swallow);
        assert!(policy.is_retryable(&TransportError::Http("500".to_string())));
        assert!(!policy.is_retryable(&TransportError::Timeout));
    }
}

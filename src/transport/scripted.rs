//! Scripted JSON-RPC client for unit tests

use super::JsonRpcClient;
use crate::error::TransportError;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::fmt::Debug;
use std::sync::Mutex;

/// Answers each request with the next scripted result and records what was asked.
/// The last result repeats once the script runs out.
#[derive(Debug, Default)]
pub(crate) struct ScriptedClient {
    script: Mutex<VecDeque<Result<Value, TransportError>>>,
    requests: Mutex<Vec<(String, Value)>>,
}

impl ScriptedClient {
    pub fn new(script: Vec<Result<Value, TransportError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::default(),
        }
    }

    pub fn always(result: Result<Value, TransportError>) -> Self {
        Self::new(vec![result])
    }

    pub fn requests(&self) -> Vec<(String, Value)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn next(&self) -> Result<Value, TransportError> {
        let mut script = self.script.lock().unwrap();
        if script.len() > 1 {
            script.pop_front().unwrap()
        } else {
            script.front().cloned().unwrap_or(Ok(Value::Null))
        }
    }
}

#[async_trait]
impl JsonRpcClient for ScriptedClient {
    type Error = TransportError;

    async fn request<T, R>(&self, method: &str, params: T) -> Result<R, TransportError>
    where
        T: Debug + Serialize + Send + Sync,
        R: DeserializeOwned + Send,
    {
        let params = serde_json::to_value(params)
            .map_err(|e| TransportError::InvalidResponse(e.to_string()))?;
        self.requests
            .lock()
            .unwrap()
            .push((method.to_string(), params));

        let value = self.next()?;
        serde_json::from_value(value).map_err(|e| TransportError::InvalidResponse(e.to_string()))
    }
}

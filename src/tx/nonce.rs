//! Per-sender nonce cache
//!
//! Owned by the sequencer worker and never shared, so it needs no locking.
//! Each sender is seeded from the node's transaction count on first use and
//! afterwards only advanced after a successful send. The cache is never
//! reconciled with chain state: transactions sent from the same account by
//! anything else will desynchronise it.
//!
//! A send is retried like any other call. If the node accepted a send whose
//! response was lost (e.g. a timeout), the retry reuses the nonce and the node
//! rejects it, so the submission is answered with a `Send` rejection while the
//! first attempt is mined. The cache is not advanced in that case and the next
//! submission from that sender reuses the consumed nonce. Restrict `retry_on`
//! to `connection` when that matters.

use ethers::types::{Address, U256};
use std::collections::HashMap;
use std::future::Future;
use tracing::debug;

#[derive(Debug, Default)]
pub struct NonceCache {
    next: HashMap<Address, U256>,
}

impl NonceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next unused nonce for `sender`, seeding it with `seed` on first use.
    ///
    /// A failed seed leaves the cache untouched.
    pub async fn resolve<F, Fut, E>(&mut self, sender: Address, seed: F) -> Result<U256, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<U256, E>>,
    {
        if let Some(nonce) = self.next.get(&sender) {
            return Ok(*nonce);
        }

        let nonce = seed().await?;
        debug!("Seeded nonce for {:?}: {}", sender, nonce);
        self.next.insert(sender, nonce);
        Ok(nonce)
    }

    /// Mark the current nonce of `sender` as used
    pub fn advance(&mut self, sender: Address) -> Option<U256> {
        let nonce = self.next.get_mut(&sender)?;
        *nonce += U256::one();
        Some(*nonce)
    }

    pub fn peek(&self, sender: &Address) -> Option<U256> {
        self.next.get(sender).copied()
    }

    pub fn len(&self) -> usize {
        self.next.len()
    }

    pub fn is_empty(&self) -> bool {
        self.next.is_empty()
    }
}

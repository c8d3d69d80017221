//! Nonce issuance for transaction signers.
//!
//! One [`PendingNonceManager`] serves one logical signer set. The settlement
//! path and the bridge-burn path MUST share the instance when they share a
//! signer address; giving each path its own manager causes sporadic
//! `nonce too low` failures under concurrent submission. A dedicated bridge
//! signer gets its own manager.

use std::collections::HashMap;
use std::sync::Arc;

use alloy_network::Network;
use alloy_primitives::Address;
use alloy_provider::fillers::NonceManager;
use alloy_provider::Provider;
use alloy_transport::TransportResult;
use tokio::sync::Mutex;

/// Nonce manager that reconciles a local cache with the chain's `pending`
/// transaction count.
///
/// Issuance happens inside a per-manager critical section:
///
/// - first use for an address queries the chain's pending nonce;
/// - afterwards the issued nonce is `max(cached + 1, pending)`, so a
///   transaction landed out-of-band (or dropped from the mempool) cannot
///   desynchronize the cache permanently;
/// - [`reset_nonce`](Self::reset_nonce) drops the cache entry, forcing a
///   fresh query — callers invoke it whenever a submission or receipt wait
///   fails, which covers `nonce too low` responses.
#[derive(Clone, Debug, Default)]
pub struct PendingNonceManager {
    nonces: Arc<Mutex<HashMap<Address, u64>>>,
}

impl PendingNonceManager {
    /// Creates an empty nonce manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops the cached nonce for `address`, forcing a chain query on the
    /// next issuance.
    pub async fn reset_nonce(&self, address: Address) {
        self.nonces.lock().await.remove(&address);
    }

    /// Issues the next nonce for `address`, reconciling with the chain's
    /// pending count.
    pub async fn next_nonce<P, N>(&self, provider: &P, address: Address) -> TransportResult<u64>
    where
        P: Provider<N>,
        N: Network,
    {
        let mut nonces = self.nonces.lock().await;
        let pending = provider
            .get_transaction_count(address)
            .pending()
            .await?;
        let next = match nonces.get(&address) {
            Some(cached) => (cached + 1).max(pending),
            None => pending,
        };
        nonces.insert(address, next);
        Ok(next)
    }
}

#[cfg_attr(target_family = "wasm", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_family = "wasm"), async_trait::async_trait)]
impl NonceManager for PendingNonceManager {
    async fn get_next_nonce<P, N>(&self, provider: &P, address: Address) -> TransportResult<u64>
    where
        P: Provider<N>,
        N: Network,
    {
        self.next_nonce(provider, address).await
    }
}

//! Burn-and-mint bridge provider.
//!
//! Implements [`BridgeProvider`] over a CCTP-style circle of contracts: USDC
//! is burned through the source chain's TokenMessenger, the bridge network
//! attests the burn message off-chain, and the attested message is delivered
//! to the destination chain's MessageTransmitter, which mints to the
//! recipient. No pooled liquidity is involved.
//!
//! The burn transactions go through the same
//! [`Eip155SettlementProvider`] instances (and therefore the same nonce
//! managers) as payment settlement, so burns and settlements on one signer
//! never race each other's nonces.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{hex, keccak256, Address, Bytes, TxHash, B256, U256};
use alloy_provider::Provider;
use alloy_sol_types::{sol, sol_data, SolCall, SolType};
use async_trait::async_trait;
use b402::ChainId;
use b402_evm::chain::{Eip155ChainReference, Eip155SettlementProvider, MetaTransaction};
use b402_evm::networks;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::job::BridgeJob;
use crate::provider::{BridgeError, BridgeProvider, BridgeRequest, BridgeResult};

sol! {
    /// Burn entry point of the bridge.
    #[allow(missing_docs)]
    interface ITokenMessenger {
        function depositForBurn(
            uint256 amount,
            uint32 destinationDomain,
            bytes32 mintRecipient,
            address burnToken
        ) external returns (uint64 nonce);
    }

    /// Mint entry point of the bridge.
    #[allow(missing_docs)]
    interface IMessageTransmitter {
        function receiveMessage(bytes message, bytes attestation) external returns (bool success);
    }

    /// ERC-20 subset used for burn allowances.
    #[allow(missing_docs)]
    #[sol(rpc)]
    interface IERC20 {
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);
    }
}

/// Per-chain bridge route: the bridge's domain id and contract addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeRoute {
    /// The chain this route serves.
    pub chain: Eip155ChainReference,
    /// Bridge-network domain identifier for the chain.
    pub domain: u32,
    /// Burn entry point.
    pub token_messenger: Address,
    /// Mint entry point / message source.
    pub message_transmitter: Address,
}

/// Known bridge routes.
///
/// Source: <https://developers.circle.com/stablecoins/evm-smart-contracts>
#[must_use]
pub fn known_routes() -> Vec<BridgeRoute> {
    use alloy_primitives::address;
    vec![
        BridgeRoute {
            chain: Eip155ChainReference::new(1),
            domain: 0,
            token_messenger: address!("0xBd3fa81B58Ba92a82136038B25aDec7066af3155"),
            message_transmitter: address!("0x0a992d191DEeC32aFe36203Ad87D7d289a738F81"),
        },
        BridgeRoute {
            chain: Eip155ChainReference::new(11_155_111),
            domain: 0,
            token_messenger: address!("0x9f3B8679c73C2Fef8b59B4f3444d4e156fb70AA5"),
            message_transmitter: address!("0x7865fAfC2db2093669d92c0F33AeEF291086BEFD"),
        },
        BridgeRoute {
            chain: Eip155ChainReference::new(8453),
            domain: 6,
            token_messenger: address!("0x1682Ae6375C4E4A97e4B583BC394c861A46D8962"),
            message_transmitter: address!("0xAD09780d193884d503182aD4588450C416D6F9D4"),
        },
        BridgeRoute {
            chain: Eip155ChainReference::new(84_532),
            domain: 6,
            token_messenger: address!("0x9f3B8679c73C2Fef8b59B4f3444d4e156fb70AA5"),
            message_transmitter: address!("0x7865fAfC2db2093669d92c0F33AeEF291086BEFD"),
        },
        BridgeRoute {
            chain: Eip155ChainReference::new(42_161),
            domain: 3,
            token_messenger: address!("0x19330d10D9Cc8751218eaf51E8885D058642E08A"),
            message_transmitter: address!("0xC30362313FBBA5cf9163F0bb16a0e01f01A896ca"),
        },
        BridgeRoute {
            chain: Eip155ChainReference::new(421_614),
            domain: 3,
            token_messenger: address!("0x9f3B8679c73C2Fef8b59B4f3444d4e156fb70AA5"),
            message_transmitter: address!("0xaCF1ceeF35caAc005e15888dDb8A3515C41B4872"),
        },
        BridgeRoute {
            chain: Eip155ChainReference::new(137),
            domain: 7,
            token_messenger: address!("0x9daF8c91AEFAE50b9c0E69629D3F6Ca40cA3B3FE"),
            message_transmitter: address!("0xF3be9355363857F3e001be68856A2f96b4C39Ba9"),
        },
        BridgeRoute {
            chain: Eip155ChainReference::new(80_002),
            domain: 7,
            token_messenger: address!("0x9f3B8679c73C2Fef8b59B4f3444d4e156fb70AA5"),
            message_transmitter: address!("0x7865fAfC2db2093669d92c0F33AeEF291086BEFD"),
        },
    ]
}

/// Tuning for the burn-and-mint provider.
#[derive(Debug, Clone)]
pub struct BurnMintConfig {
    /// Base URL of the attestation service.
    pub attestation_url: String,
    /// Poll interval while waiting for an attestation.
    pub attestation_poll_interval: Duration,
    /// How long `bridge` waits for the attestation before handing the job
    /// back for asynchronous reconciliation.
    pub attestation_deadline: Duration,
    /// How long to wait for the source settlement transaction.
    pub source_confirmation_deadline: Duration,
    /// Largest single burn accepted; the liquidity check enforces it.
    pub max_burn_amount: U256,
}

impl Default for BurnMintConfig {
    fn default() -> Self {
        Self {
            attestation_url: "https://iris-api.circle.com".to_owned(),
            attestation_poll_interval: Duration::from_secs(2),
            attestation_deadline: Duration::from_secs(60),
            source_confirmation_deadline: Duration::from_secs(120),
            // 1M USDC in atomic units.
            max_burn_amount: U256::from(1_000_000_000_000u64),
        }
    }
}

struct ChainHandle<P> {
    provider: Arc<P>,
    route: BridgeRoute,
}

/// Burn-and-mint [`BridgeProvider`] over per-chain settlement providers.
pub struct BurnMintBridgeProvider<P> {
    chains: HashMap<u64, ChainHandle<P>>,
    http: reqwest::Client,
    config: BurnMintConfig,
}

impl<P> std::fmt::Debug for BurnMintBridgeProvider<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BurnMintBridgeProvider")
            .field("chains", &self.chains.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct AttestationMessages {
    messages: Vec<AttestationMessage>,
}

#[derive(Debug, Deserialize)]
struct AttestationMessage {
    message: String,
    attestation: String,
    status: String,
}

impl<P: Eip155SettlementProvider> BurnMintBridgeProvider<P> {
    /// Creates a provider over the given per-chain settlement providers.
    ///
    /// Chains without a known bridge route are skipped with a warning: the
    /// facilitator can still settle same-chain payments there.
    #[must_use]
    pub fn new(providers: Vec<Arc<P>>, config: BurnMintConfig) -> Self {
        let routes: HashMap<u64, BridgeRoute> = known_routes()
            .into_iter()
            .map(|route| (route.chain.inner(), route))
            .collect();
        let mut chains = HashMap::new();
        for provider in providers {
            let chain = *provider.chain();
            match routes.get(&chain.inner()) {
                Some(route) => {
                    chains.insert(
                        chain.inner(),
                        ChainHandle {
                            provider,
                            route: *route,
                        },
                    );
                }
                None => {
                    warn!(chain = %chain, "no bridge route for chain, cross-chain disabled there");
                }
            }
        }
        Self {
            chains,
            http: reqwest::Client::new(),
            config,
        }
    }

    fn handle(&self, network: &ChainId) -> Result<&ChainHandle<P>, BridgeError> {
        let reference = network
            .as_eip155()
            .ok_or_else(|| BridgeError::fatal(format!("unsupported network {network}")))?;
        self.chains
            .get(&reference)
            .ok_or_else(|| BridgeError::fatal(format!("no bridge route for {network}")))
    }

    /// Fetches the attested burn message for a source transaction.
    ///
    /// Returns `Ok(None)` while the attestation is still pending.
    async fn fetch_attestation(
        &self,
        source_domain: u32,
        burn_tx_hash: &str,
    ) -> Result<Option<(Bytes, Bytes)>, BridgeError> {
        let url = format!(
            "{}/v2/messages/{}?transactionHash={}",
            self.config.attestation_url, source_domain, burn_tx_hash
        );
        let response = self
            .http
            .get(&url)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| BridgeError::transient(format!("failed to fetch attestation: {e}")))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(BridgeError::transient(format!(
                "attestation service returned {}",
                response.status()
            )));
        }
        let body: AttestationMessages = response
            .json()
            .await
            .map_err(|e| BridgeError::transient(format!("malformed attestation response: {e}")))?;
        let Some(message) = body.messages.first() else {
            return Ok(None);
        };
        if message.status != "complete" {
            debug!(status = %message.status, burn_tx_hash, "attestation not ready");
            return Ok(None);
        }
        let message_bytes = hex::decode(message.message.trim_start_matches("0x"))
            .map_err(|e| BridgeError::transient(format!("undecodable bridge message: {e}")))?;
        let attestation_bytes = hex::decode(message.attestation.trim_start_matches("0x"))
            .map_err(|e| BridgeError::transient(format!("undecodable attestation: {e}")))?;
        Ok(Some((message_bytes.into(), attestation_bytes.into())))
    }

    /// Submits the attested message to the destination chain's transmitter.
    async fn mint_on_destination(
        &self,
        destination: &ChainId,
        message: Bytes,
        attestation: Bytes,
    ) -> Result<String, BridgeError> {
        let handle = self.handle(destination)?;
        let call = IMessageTransmitter::receiveMessageCall {
            message,
            attestation,
        };
        let receipt = handle
            .provider
            .send_transaction(MetaTransaction {
                to: handle.route.message_transmitter,
                calldata: call.abi_encode().into(),
                confirmations: 1,
            })
            .await
            .map_err(|e| BridgeError::classify(format!("mint submission failed: {e}")))?;
        if !receipt.status() {
            return Err(BridgeError::transient(format!(
                "mint transaction {} reverted",
                receipt.transaction_hash
            )));
        }
        Ok(receipt.transaction_hash.to_string())
    }

    /// Grants the token messenger an allowance when the current one cannot
    /// cover `amount`.
    async fn ensure_burn_allowance(
        &self,
        handle: &ChainHandle<P>,
        token: Address,
        amount: U256,
    ) -> Result<(), BridgeError> {
        let owner = handle.provider.signer_address();
        let erc20 = IERC20::new(token, handle.provider.inner());
        let allowance = erc20
            .allowance(owner, handle.route.token_messenger)
            .call()
            .await
            .map_err(|e| BridgeError::transient(format!("allowance read failed: {e}")))?;
        if allowance >= amount {
            return Ok(());
        }
        let call = IERC20::approveCall {
            spender: handle.route.token_messenger,
            amount: U256::MAX,
        };
        let receipt = handle
            .provider
            .send_transaction(MetaTransaction {
                to: token,
                calldata: call.abi_encode().into(),
                confirmations: 1,
            })
            .await
            .map_err(|e| BridgeError::classify(format!("approve failed: {e}")))?;
        if !receipt.status() {
            return Err(BridgeError::transient("approve transaction reverted"));
        }
        info!(token = %token, spender = %handle.route.token_messenger, "granted burn allowance");
        Ok(())
    }
}

/// Extracts the bridge message emitted by the transmitter from burn logs.
fn extract_bridge_message(
    receipt: &alloy_rpc_types_eth::TransactionReceipt,
    transmitter: Address,
) -> Option<Bytes> {
    let message_sent_topic = keccak256("MessageSent(bytes)".as_bytes());
    receipt.inner.logs().iter().find_map(|log| {
        if log.address() != transmitter || log.topic0() != Some(&message_sent_topic) {
            return None;
        }
        sol_data::Bytes::abi_decode(&log.data().data).ok()
    })
}

#[async_trait]
impl<P: Eip155SettlementProvider + 'static> BridgeProvider for BurnMintBridgeProvider<P> {
    fn supports_chain(&self, network: &ChainId) -> bool {
        network
            .as_eip155()
            .is_some_and(|reference| self.chains.contains_key(&reference))
    }

    fn is_usdc(&self, network: &ChainId, asset: Address) -> bool {
        let Some(reference) = network.as_eip155() else {
            return false;
        };
        networks::is_usdc(Eip155ChainReference::new(reference), asset)
    }

    async fn check_liquidity(
        &self,
        source: &ChainId,
        destination: &ChainId,
        _asset: Address,
        amount: U256,
    ) -> Result<bool, BridgeError> {
        // Burn-and-mint needs no pooled liquidity; what bounds a transfer
        // is the route existing on both ends and the per-burn cap.
        if !self.supports_chain(source) || !self.supports_chain(destination) {
            return Ok(false);
        }
        Ok(amount > U256::ZERO && amount <= self.config.max_burn_amount)
    }

    fn exchange_rate(
        &self,
        source: &ChainId,
        destination: &ChainId,
        source_asset: Address,
        destination_asset: Address,
    ) -> f64 {
        if self.is_usdc(source, source_asset) && self.is_usdc(destination, destination_asset) {
            1.0
        } else {
            0.0
        }
    }

    async fn await_source_confirmation(
        &self,
        network: &ChainId,
        tx_hash: &str,
    ) -> Result<(), BridgeError> {
        let handle = self.handle(network)?;
        let hash = TxHash::from_str(tx_hash)
            .map_err(|e| BridgeError::fatal(format!("malformed source tx hash: {e}")))?;
        let deadline = tokio::time::Instant::now() + self.config.source_confirmation_deadline;
        loop {
            match handle.provider.inner().get_transaction_receipt(hash).await {
                Ok(Some(receipt)) if receipt.status() => return Ok(()),
                Ok(Some(receipt)) => {
                    return Err(BridgeError::fatal(format!(
                        "source transaction {} reverted",
                        receipt.transaction_hash
                    )));
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(tx = %tx_hash, error = %e, "receipt poll failed");
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(BridgeError::transient(format!(
                    "source transaction {tx_hash} not confirmed within deadline"
                )));
            }
            tokio::time::sleep(Duration::from_secs(2)).await;
        }
    }

    async fn bridge(&self, request: &BridgeRequest) -> Result<BridgeResult, BridgeError> {
        let source = self.handle(&request.source_network)?;
        let destination_route = self.handle(&request.destination_network)?.route;

        let source_chain = *source.provider.chain();
        let burn_token = networks::usdc_on_chain(source_chain)
            .ok_or_else(|| BridgeError::fatal(format!("no USDC deployment on {source_chain}")))?
            .address;

        self.ensure_burn_allowance(source, burn_token, request.amount)
            .await?;

        let mint_recipient = B256::left_padding_from(request.recipient.as_slice());
        let call = ITokenMessenger::depositForBurnCall {
            amount: request.amount,
            destinationDomain: destination_route.domain,
            mintRecipient: mint_recipient,
            burnToken: burn_token,
        };
        let receipt = source
            .provider
            .send_transaction(MetaTransaction {
                to: source.route.token_messenger,
                calldata: call.abi_encode().into(),
                confirmations: 1,
            })
            .await
            .map_err(|e| BridgeError::classify(format!("burn submission failed: {e}")))?;
        if !receipt.status() {
            return Err(BridgeError::classify(format!(
                "burn transaction {} reverted",
                receipt.transaction_hash
            )));
        }
        let bridge_tx_hash = receipt.transaction_hash.to_string();
        info!(
            burn_tx = %bridge_tx_hash,
            amount = %request.amount,
            recipient = %request.recipient,
            "burn submitted"
        );

        let message_id = extract_bridge_message(&receipt, source.route.message_transmitter)
            .map(|message| keccak256(&message).to_string());

        // Wait a bounded interval for the attestation; past the deadline the
        // worker reconciles asynchronously from the recorded burn hash.
        let deadline = tokio::time::Instant::now() + self.config.attestation_deadline;
        loop {
            match self
                .fetch_attestation(source.route.domain, &bridge_tx_hash)
                .await
            {
                Ok(Some((message, attestation))) => {
                    let destination_tx = self
                        .mint_on_destination(&request.destination_network, message, attestation)
                        .await?;
                    return Ok(BridgeResult {
                        bridge_tx_hash,
                        destination_tx_hash: Some(destination_tx),
                        message_id,
                        source_network: request.source_network.clone(),
                        destination_network: request.destination_network.clone(),
                    });
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(burn_tx = %bridge_tx_hash, error = %e.message, "attestation poll failed");
                }
            }
            if tokio::time::Instant::now() >= deadline {
                debug!(burn_tx = %bridge_tx_hash, "attestation pending past deadline");
                return Ok(BridgeResult {
                    bridge_tx_hash,
                    destination_tx_hash: None,
                    message_id,
                    source_network: request.source_network.clone(),
                    destination_network: request.destination_network.clone(),
                });
            }
            tokio::time::sleep(self.config.attestation_poll_interval).await;
        }
    }

    async fn reconcile(&self, job: &BridgeJob) -> Result<Option<BridgeResult>, BridgeError> {
        let Some(bridge_tx_hash) = &job.bridge_tx_hash else {
            return Ok(None);
        };
        let source = self.handle(&job.source_network)?;
        let Some((message, attestation)) = self
            .fetch_attestation(source.route.domain, bridge_tx_hash)
            .await?
        else {
            return Ok(None);
        };
        let destination_tx = self
            .mint_on_destination(&job.destination_network, message, attestation)
            .await?;
        Ok(Some(BridgeResult {
            bridge_tx_hash: bridge_tx_hash.clone(),
            destination_tx_hash: Some(destination_tx),
            message_id: job.message_id.clone(),
            source_network: job.source_network.clone(),
            destination_network: job.destination_network.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_cover_all_usdc_chains() {
        let routes = known_routes();
        for deployment in networks::usdc_deployments() {
            assert!(
                routes.iter().any(|r| r.chain == deployment.chain),
                "no bridge route for chain {}",
                deployment.chain
            );
        }
    }

    #[test]
    fn testnet_and_mainnet_share_domains() {
        let routes = known_routes();
        let domain_of = |id: u64| {
            routes
                .iter()
                .find(|r| r.chain.inner() == id)
                .map(|r| r.domain)
                .unwrap()
        };
        assert_eq!(domain_of(1), domain_of(11_155_111));
        assert_eq!(domain_of(8453), domain_of(84_532));
        assert_eq!(domain_of(42_161), domain_of(421_614));
    }

    #[test]
    fn mint_recipient_is_left_padded_address() {
        let recipient = Address::repeat_byte(0xab);
        let padded = B256::left_padding_from(recipient.as_slice());
        assert_eq!(&padded[12..], recipient.as_slice());
        assert!(padded[..12].iter().all(|b| *b == 0));
    }
}

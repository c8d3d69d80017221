//! Cross-chain payment facilitator HTTP server.
//!
//! # Usage
//!
//! ```bash
//! EVM_PRIVATE_KEY=0x... EVM_RPC_URL=https://sepolia.base.org \
//!     cargo run -p b402-facilitator --release
//! ```
//!
//! Chains come from `config.toml` (see `CONFIG`); operational settings come
//! from the environment — see [`b402_facilitator::config`]. Exit code 1
//! means fatal configuration (missing `EVM_PRIVATE_KEY`, no reachable
//! chain).

use std::collections::HashMap;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use alloy_network::EthereumWallet;
use alloy_primitives::Address;
use alloy_provider::Provider;
use alloy_rpc_client::RpcClient;
use alloy_signer_local::PrivateKeySigner;
use alloy_transport_http::reqwest::{Client as ReqwestClient, Url};
use alloy_transport_http::Http;
use axum::http::Method;
use axum::Router;
use b402::hooks::{FacilitatorHooks, HookedFacilitator};
use b402::proto::DispatchKey;
use b402::ChainId;
use b402_bridge::cctp::{BurnMintBridgeProvider, BurnMintConfig};
use b402_bridge::{BridgeProvider, BridgeWorker, BridgeWorkerConfig, SqliteJobStore};
use b402_evm::chain::{ChainTimeouts, Eip155SettlementProvider};
use b402_evm::exact::facilitator::ExactEvmConfig;
use b402_evm::{Eip155ChainProvider, Eip155ChainReference, Eip155ExactFacilitator};
use tower_http::cors;
use tower_http::timeout::TimeoutLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use b402_facilitator::config::{ChainConfig, FacilitatorConfig};
use b402_facilitator::handlers::{facilitator_router, AppState};
use b402_facilitator::registry::SchemeRegistry;
use b402_facilitator::router::{CrossChainFacilitator, CROSS_CHAIN_SCHEME};

/// Deadline for chain-facing read calls.
const RPC_READ_TIMEOUT: Duration = Duration::from_secs(30);
/// Request-level deadline for HTTP handlers.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run().await {
        error!("facilitator failed: {e}");
        std::process::exit(1);
    }
}

#[allow(clippy::cognitive_complexity)]
async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = FacilitatorConfig::load()?;
    info!(
        host = %config.host,
        port = config.port,
        chains = config.chains.len(),
        cross_chain = config.cross_chain_enabled,
        "loaded configuration"
    );

    let settlement_signer: PrivateKeySigner = config
        .evm_private_key
        .trim()
        .parse()
        .map_err(|e| format!("invalid EVM_PRIVATE_KEY: {e}"))?;
    let settlement_address = settlement_signer.address();

    let bridge_signer: Option<PrivateKeySigner> = config
        .bridge_evm_private_key
        .as_deref()
        .map(|key| {
            key.trim()
                .parse()
                .map_err(|e| format!("invalid BRIDGE_EVM_PRIVATE_KEY: {e}"))
        })
        .transpose()?;
    info!(
        settlement_signer = %settlement_address,
        bridge_signer = ?bridge_signer.as_ref().map(PrivateKeySigner::address),
        "loaded signers"
    );

    // Resolve the chain set: explicit config, or the single chain behind
    // EVM_RPC_URL.
    let mut chains: Vec<(Eip155ChainReference, ChainConfig)> = Vec::new();
    for (network_id, chain_config) in &config.chains {
        let Some(reference) = ChainId::from_str(network_id)
            .ok()
            .as_ref()
            .and_then(Eip155ChainReference::from_chain_id)
        else {
            warn!(network = %network_id, "skipping chain: invalid CAIP-2 identifier");
            continue;
        };
        chains.push((reference, chain_config.clone()));
    }
    if chains.is_empty() {
        if let Some(rpc_url) = &config.default_rpc_url {
            match discover_chain(rpc_url).await {
                Ok(reference) => {
                    info!(chain = %reference, rpc = %rpc_url, "discovered chain from EVM_RPC_URL");
                    chains.push((reference, ChainConfig::default()));
                }
                Err(e) => return Err(format!("cannot reach EVM_RPC_URL: {e}").into()),
            }
        }
    }
    if chains.is_empty() {
        return Err("no chains configured: provide config.toml chains or EVM_RPC_URL".into());
    }

    // One settlement provider per chain; a distinct bridge signer gets its
    // own provider (and nonce manager), a shared signer shares the instance
    // so settlements and burns stay nonce-ordered.
    let mut settlement_providers: HashMap<u64, Arc<Eip155ChainProvider>> = HashMap::new();
    let mut bridge_providers: Vec<Arc<Eip155ChainProvider>> = Vec::new();
    for (reference, chain_config) in &chains {
        let rpc_url = chain_config
            .rpc_url
            .clone()
            .or_else(|| config.default_rpc_url.clone())
            .ok_or_else(|| format!("no RPC URL for chain {reference}"))?;
        let timeouts = ChainTimeouts {
            receipt: Duration::from_secs(chain_config.receipt_timeout_secs),
        };

        let provider = build_provider(
            *reference,
            &rpc_url,
            EthereumWallet::from(settlement_signer.clone()),
            chain_config,
            timeouts,
        )
        .await?;
        let provider = Arc::new(provider);
        settlement_providers.insert(reference.inner(), Arc::clone(&provider));

        match &bridge_signer {
            Some(signer) => {
                let bridge_provider = build_provider(
                    *reference,
                    &rpc_url,
                    EthereumWallet::from(signer.clone()),
                    chain_config,
                    timeouts,
                )
                .await?;
                bridge_providers.push(Arc::new(bridge_provider));
            }
            None => bridge_providers.push(Arc::clone(&provider)),
        }
    }

    // Bridge subsystem: provider, durable store, worker, recovery loop.
    let mut burn_mint_config = BurnMintConfig::default();
    if let Some(url) = &config.bridge_attestation_url {
        burn_mint_config.attestation_url = url.clone();
    }
    let bridge: Arc<dyn BridgeProvider> = Arc::new(BurnMintBridgeProvider::new(
        bridge_providers,
        burn_mint_config,
    ));
    let store = SqliteJobStore::open(&config.bridge_db_path)
        .map_err(|e| format!("cannot open bridge job store: {e}"))?;
    let worker = BridgeWorker::new(
        Arc::new(store),
        Arc::clone(&bridge),
        BridgeWorkerConfig::default(),
    );
    worker.start_recovery_loop();

    // Scheme registry: exact plus cross-chain per configured chain.
    let evm_config = ExactEvmConfig {
        deploy_erc4337_with_eip6492: config.deploy_erc4337_with_eip6492,
    };
    let hooks = observability_hooks();
    let mut registry = SchemeRegistry::new();
    for (reference, _) in &chains {
        let provider = Arc::clone(&settlement_providers[&reference.inner()]);
        let network = reference.as_chain_id();
        let exact: Arc<dyn b402::Facilitator> = Arc::new(HookedFacilitator::new(
            Box::new(Eip155ExactFacilitator::with_config(provider, evm_config)),
            hooks.clone(),
        ));
        registry.register(
            DispatchKey {
                scheme: "exact".to_owned(),
                network: network.clone(),
            },
            Arc::clone(&exact),
        );
        registry.register(
            DispatchKey {
                scheme: CROSS_CHAIN_SCHEME.to_owned(),
                network: network.clone(),
            },
            Arc::new(CrossChainFacilitator::new(
                exact,
                Arc::clone(&bridge),
                Arc::clone(&worker),
                network.clone(),
                facilitator_address_on(&settlement_providers, *reference, settlement_address),
                config.cross_chain_enabled,
            )),
        );
        info!(network = %network, "registered exact and cross-chain schemes");
    }

    let state = Arc::new(AppState {
        registry,
        worker: Some(worker),
    });

    let app = Router::new()
        .merge(facilitator_router(state))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(
            cors::CorsLayer::new()
                .allow_origin(cors::Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers(cors::Any),
        );

    let addr = SocketAddr::new(config.host, config.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("facilitator listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("facilitator shut down gracefully");
    Ok(())
}

/// Lifecycle hooks attached to every exact handler: one structured log
/// line per verification and settlement outcome.
fn observability_hooks() -> FacilitatorHooks {
    FacilitatorHooks::default()
        .on_after_verify(|ctx| async move {
            info!(valid = ctx.response.is_valid(), "payment verified");
            Ok(())
        })
        .on_after_settle(|ctx| async move {
            info!(success = ctx.response.is_success(), "payment settled");
            Ok(())
        })
}

/// The facilitator's settlement address on a chain.
///
/// One wallet serves every chain today; the indirection keeps per-chain
/// signers possible without touching the router.
fn facilitator_address_on(
    providers: &HashMap<u64, Arc<Eip155ChainProvider>>,
    reference: Eip155ChainReference,
    fallback: Address,
) -> Address {
    providers
        .get(&reference.inner())
        .map_or(fallback, |p| p.signer_address())
}

/// Builds a chain provider and runs the startup health check.
async fn build_provider(
    reference: Eip155ChainReference,
    rpc_url: &str,
    wallet: EthereumWallet,
    chain_config: &ChainConfig,
    timeouts: ChainTimeouts,
) -> Result<Eip155ChainProvider, Box<dyn std::error::Error>> {
    let url: Url = rpc_url
        .parse()
        .map_err(|e| format!("invalid RPC URL {rpc_url}: {e}"))?;
    let http_client = ReqwestClient::builder()
        .timeout(RPC_READ_TIMEOUT)
        .build()?;
    let transport = Http::with_client(http_client, url);
    let client = RpcClient::new(transport, false);
    let provider = Eip155ChainProvider::new(
        reference,
        client,
        wallet,
        chain_config.eip1559,
        timeouts,
    );

    if chain_config.health_check {
        let actual = provider.inner().get_chain_id().await.map_err(|e| {
            format!("RPC health check failed for {reference} at {rpc_url}: {e}")
        })?;
        if actual != reference.inner() {
            return Err(format!(
                "chain id mismatch at {rpc_url}: expected {reference}, got {actual}"
            )
            .into());
        }
        info!(chain = %reference, rpc = %rpc_url, "RPC health check passed");
    }

    Ok(provider)
}

/// Queries `eth_chainId` at `rpc_url` to identify the chain behind it.
async fn discover_chain(
    rpc_url: &str,
) -> Result<Eip155ChainReference, Box<dyn std::error::Error>> {
    let url: Url = rpc_url.parse()?;
    let http_client = ReqwestClient::builder()
        .timeout(RPC_READ_TIMEOUT)
        .build()?;
    let transport = Http::with_client(http_client, url);
    let client = RpcClient::new(transport, false);
    let provider = alloy_provider::RootProvider::<alloy_network::Ethereum>::new(client);
    let chain_id = provider.get_chain_id().await?;
    Ok(Eip155ChainReference::new(chain_id))
}

/// Waits for Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("received Ctrl-C, shutting down"),
            _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.expect("failed to listen for Ctrl-C");
        info!("received Ctrl-C, shutting down");
    }
}

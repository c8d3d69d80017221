//! Per-chain RPC facade.
//!
//! [`Eip155ChainProvider`] wraps an alloy provider composed of fill layers
//! (gas, blob gas, nonce, chain id, wallet) and exposes the operations the
//! facilitator needs: contract reads, transaction submission with receipt
//! deadlines, and nonce recovery on failure.

use std::sync::Arc;
use std::time::Duration;

use alloy_network::{Ethereum, EthereumWallet, NetworkWallet, TransactionBuilder};
use alloy_primitives::{Address, Bytes};
use alloy_provider::fillers::{
    BlobGasFiller, ChainIdFiller, FillProvider, GasFiller, JoinFill, NonceFiller, WalletFiller,
};
use alloy_provider::{Identity, PendingTransactionError, Provider, ProviderBuilder, RootProvider};
use alloy_rpc_client::RpcClient;
use alloy_rpc_types_eth::{TransactionReceipt, TransactionRequest};
use alloy_transport::TransportError;

use super::nonce::PendingNonceManager;
use super::Eip155ChainReference;

/// Filler stack applied to every outgoing transaction.
pub type ChainFiller = JoinFill<
    GasFiller,
    JoinFill<BlobGasFiller, JoinFill<NonceFiller<PendingNonceManager>, ChainIdFiller>>,
>;

/// The fully composed provider type: fillers plus wallet over a root
/// JSON-RPC provider.
pub type InnerProvider = FillProvider<
    JoinFill<JoinFill<Identity, ChainFiller>, WalletFiller<EthereumWallet>>,
    RootProvider,
>;

/// Timeouts applied to chain-facing calls.
#[derive(Debug, Clone, Copy)]
pub struct ChainTimeouts {
    /// Deadline for waiting on a transaction receipt.
    pub receipt: Duration,
}

impl Default for ChainTimeouts {
    fn default() -> Self {
        Self {
            receipt: Duration::from_secs(120),
        }
    }
}

/// A transaction prepared by a scheme or bridge: target, calldata, and the
/// confirmations to wait for.
#[derive(Debug)]
pub struct MetaTransaction {
    /// Target contract address.
    pub to: Address,
    /// Encoded function call.
    pub calldata: Bytes,
    /// Block confirmations to wait for.
    pub confirmations: u64,
}

/// Errors from submitting a transaction and waiting for its receipt.
#[derive(Debug, thiserror::Error)]
pub enum TransactionSendError {
    /// RPC transport failure during submission (includes gas-estimation
    /// reverts).
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The transaction was submitted but its receipt did not arrive within
    /// the deadline. Retryable: the transaction may still land.
    #[error(transparent)]
    Pending(#[from] PendingTransactionError),
}

/// Capability trait for submitting prepared transactions on an EVM chain.
///
/// Both the exact-scheme settlement path and the bridge-burn path go through
/// this trait, so they share one nonce discipline per provider instance.
pub trait Eip155SettlementProvider: Send + Sync {
    /// The read-side provider type.
    type Inner: Provider;

    /// Returns the read-side provider.
    fn inner(&self) -> &Self::Inner;

    /// Returns the chain this provider serves.
    fn chain(&self) -> &Eip155ChainReference;

    /// Returns the address transactions are signed with.
    fn signer_address(&self) -> Address;

    /// Submits a prepared transaction and waits for its receipt.
    fn send_transaction(
        &self,
        tx: MetaTransaction,
    ) -> impl std::future::Future<Output = Result<TransactionReceipt, TransactionSendError>> + Send;
}

impl<T: Eip155SettlementProvider> Eip155SettlementProvider for Arc<T> {
    type Inner = T::Inner;

    fn inner(&self) -> &Self::Inner {
        (**self).inner()
    }

    fn chain(&self) -> &Eip155ChainReference {
        (**self).chain()
    }

    fn signer_address(&self) -> Address {
        (**self).signer_address()
    }

    fn send_transaction(
        &self,
        tx: MetaTransaction,
    ) -> impl std::future::Future<Output = Result<TransactionReceipt, TransactionSendError>> + Send
    {
        (**self).send_transaction(tx)
    }
}

/// Provider for a single EVM chain.
///
/// Holds the signing wallet, the filler stack, and the nonce manager. The
/// nonce manager is shared with anything else that submits transactions for
/// the same signer on this chain — that is what keeps settlement and bridge
/// burns strictly nonce-ordered.
#[derive(Debug)]
pub struct Eip155ChainProvider {
    chain: Eip155ChainReference,
    eip1559: bool,
    timeouts: ChainTimeouts,
    inner: InnerProvider,
    signer_address: Address,
    nonce_manager: PendingNonceManager,
}

impl Eip155ChainProvider {
    /// Creates a provider for `chain` over the given RPC client and wallet.
    ///
    /// The wallet's default signer is used for all submissions.
    #[must_use]
    pub fn new(
        chain: Eip155ChainReference,
        client: RpcClient,
        wallet: EthereumWallet,
        eip1559: bool,
        timeouts: ChainTimeouts,
    ) -> Self {
        let signer_address = NetworkWallet::<Ethereum>::default_signer_address(&wallet);
        let nonce_manager = PendingNonceManager::new();
        let filler = JoinFill::new(
            GasFiller,
            JoinFill::new(
                BlobGasFiller::default(),
                JoinFill::new(
                    NonceFiller::new(nonce_manager.clone()),
                    ChainIdFiller::default(),
                ),
            ),
        );
        let inner: InnerProvider = ProviderBuilder::default()
            .filler(filler)
            .wallet(wallet)
            .connect_client(client);

        Self {
            chain,
            eip1559,
            timeouts,
            inner,
            signer_address,
            nonce_manager,
        }
    }

    /// Returns the nonce manager backing this provider.
    ///
    /// Hand this to anything else that signs with the same address on the
    /// same chain.
    #[must_use]
    pub fn nonce_manager(&self) -> &PendingNonceManager {
        &self.nonce_manager
    }

    /// Returns the configured receipt deadline.
    #[must_use]
    pub const fn receipt_timeout(&self) -> Duration {
        self.timeouts.receipt
    }
}

impl Eip155SettlementProvider for Eip155ChainProvider {
    type Inner = InnerProvider;

    fn inner(&self) -> &Self::Inner {
        &self.inner
    }

    fn chain(&self) -> &Eip155ChainReference {
        &self.chain
    }

    fn signer_address(&self) -> Address {
        self.signer_address
    }

    /// Submits a prepared transaction from the provider's signer.
    ///
    /// Legacy chains get an explicit gas price; EIP-1559 chains rely on the
    /// fillers. On any failure — submission or receipt deadline — the
    /// signer's cached nonce is reset so the next transaction re-queries the
    /// chain. This keeps the cache correct even when a transaction was
    /// submitted but its receipt never arrived.
    async fn send_transaction(
        &self,
        tx: MetaTransaction,
    ) -> Result<TransactionReceipt, TransactionSendError> {
        let from = self.signer_address;
        let mut request = TransactionRequest::default()
            .with_to(tx.to)
            .with_from(from)
            .with_input(tx.calldata);

        if !self.eip1559 {
            let gas_price = match self.inner.get_gas_price().await {
                Ok(price) => price,
                Err(e) => {
                    self.nonce_manager.reset_nonce(from).await;
                    return Err(TransactionSendError::Transport(e));
                }
            };
            request.set_gas_price(gas_price);
        }

        let pending = match self.inner.send_transaction(request).await {
            Ok(pending) => pending,
            Err(e) => {
                self.nonce_manager.reset_nonce(from).await;
                return Err(TransactionSendError::Transport(e));
            }
        };

        let watcher = pending
            .with_required_confirmations(tx.confirmations)
            .with_timeout(Some(self.timeouts.receipt));

        match watcher.get_receipt().await {
            Ok(receipt) => Ok(receipt),
            Err(e) => {
                self.nonce_manager.reset_nonce(from).await;
                Err(TransactionSendError::Pending(e))
            }
        }
    }
}

// src/blockchain/rpc_client.rs
//! JSON-RPC chain transport.
//!
//! Provides the production [`ChainTransport`] backed by an ethers HTTP
//! provider: transaction filling, raw transaction broadcast with receipt
//! polling, and read-only contract calls.

use crate::blockchain::transport::{ChainTransport, NativeTransaction, TransportError};
use async_trait::async_trait;
use ethers::providers::{Http, Middleware, Provider, ProviderError, RpcError};
use ethers::types::{transaction::eip2718::TypedTransaction, Address, Bytes, TransactionRequest};
use log::{debug, warn};
use std::{sync::Arc, time::Duration};

/// Chain transport talking to a single RPC endpoint.
///
/// This client provides:
/// - Nonce, gas price and gas limit estimation through the node
/// - Broadcast of locally signed transactions
/// - Receipt polling bounded by a timeout
#[derive(Clone)]
pub struct RpcTransport {
    /// RPC provider
    provider: Arc<Provider<Http>>,
    /// Chain id reported by the node at connection time
    chain_id: u64,
    /// Confirmations to wait for; zero returns as soon as the node accepts
    confirmations: usize,
    /// Upper bound on receipt polling
    receipt_timeout: Duration,
}

impl RpcTransport {
    /// Connects to an RPC endpoint and records its chain id.
    ///
    /// # Arguments
    /// * `rpc_url` - HTTP(S) RPC endpoint URL
    /// * `confirmations` - Blocks to wait for before a submission resolves
    /// * `receipt_timeout` - Maximum time spent waiting for a receipt
    ///
    /// # Errors
    /// Returns error if the URL is invalid or the chain id cannot be retrieved
    pub async fn connect(
        rpc_url: &str,
        confirmations: usize,
        receipt_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| TransportError::Provider(format!("Invalid RPC url: {}", e)))?;
        let chain_id = provider.get_chainid().await.map_err(provider_error)?.as_u64();
        debug!("connected to {} (chain id {})", rpc_url, chain_id);

        Ok(Self {
            provider: Arc::new(provider),
            chain_id,
            confirmations,
            receipt_timeout,
        })
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }
}

#[async_trait]
impl ChainTransport for RpcTransport {
    async fn fill_transaction(&self, mut tx: TypedTransaction) -> Result<TypedTransaction, TransportError> {
        tx.set_chain_id(self.chain_id);
        self.provider
            .fill_transaction(&mut tx, None)
            .await
            .map_err(provider_error)?;
        Ok(tx)
    }

    async fn submit_transaction(&self, signed: Bytes) -> Result<NativeTransaction, TransportError> {
        let pending = self
            .provider
            .send_raw_transaction(signed)
            .await
            .map_err(provider_error)?;
        let hash = pending.tx_hash();

        if self.confirmations == 0 {
            return match self.provider.get_transaction(hash).await.map_err(provider_error)? {
                Some(transaction) => Ok(NativeTransaction::Pending(transaction)),
                None => Ok(NativeTransaction::Broadcast(hash)),
            };
        }

        let receipt = tokio::time::timeout(
            self.receipt_timeout,
            pending.confirmations(self.confirmations),
        )
        .await
        .map_err(|_| TransportError::Timeout(format!("receipt of {:?}", hash)))?
        .map_err(provider_error)?;

        match receipt {
            Some(receipt) => Ok(NativeTransaction::Mined(receipt)),
            None => {
                warn!("transaction {:?} dropped from the mempool", hash);
                Err(TransportError::Cancelled)
            }
        }
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, TransportError> {
        let tx: TypedTransaction = TransactionRequest::new().to(to).data(data).into();
        self.provider.call(&tx, None).await.map_err(provider_error)
    }
}

/// Separates reverts from transport failures in a provider error.
fn provider_error(err: ProviderError) -> TransportError {
    if let Some(response) = err.as_error_response() {
        if response.message.contains("revert") {
            return TransportError::Reverted(Some(response.message.clone()));
        }
    }
    TransportError::Provider(err.to_string())
}

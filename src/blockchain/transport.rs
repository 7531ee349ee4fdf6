// src/blockchain/transport.rs
//! Chain transport capability consumed by the registrar.
//!
//! The registrar never talks to a node directly. It hands locally signed
//! payloads and read-only calldata to a [`ChainTransport`], which owns
//! connection management, gas estimation and receipt polling.

use async_trait::async_trait;
use ethers::types::{
    transaction::eip2718::TypedTransaction, Address, Bytes, Transaction, TransactionReceipt, H256,
};
use thiserror::Error;

/// Failures reported by a transport implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Node or connection level failure
    #[error("RPC provider error: {0}")]
    Provider(String),

    /// The chain refused the transaction or call (revert, require failure)
    #[error("execution reverted: {}", .0.as_deref().unwrap_or("unknown reason"))]
    Reverted(Option<String>),

    /// No receipt within the configured window
    #[error("timed out waiting for {0}")]
    Timeout(String),

    /// The request was dropped before it completed
    #[error("request cancelled before completion")]
    Cancelled,

    /// The payload handed to the transport could not be interpreted
    #[error("invalid transaction payload: {0}")]
    InvalidPayload(String),
}

/// Transaction object as returned by the transport.
///
/// Depending on how long the transport waits, a submission yields a mined
/// receipt, the pending transaction as seen by the node, or only the hash.
#[derive(Debug, Clone)]
pub enum NativeTransaction {
    Mined(TransactionReceipt),
    Pending(Transaction),
    Broadcast(H256),
}

impl NativeTransaction {
    /// Hash of the submitted transaction, whatever the shape.
    pub fn hash(&self) -> H256 {
        match self {
            NativeTransaction::Mined(receipt) => receipt.transaction_hash,
            NativeTransaction::Pending(transaction) => transaction.hash,
            NativeTransaction::Broadcast(hash) => *hash,
        }
    }

    /// True when the transaction was mined with a failure status.
    pub fn is_reverted(&self) -> bool {
        matches!(self, NativeTransaction::Mined(receipt) if receipt.status.map(|s| s.is_zero()).unwrap_or(false))
    }
}

/// Request/response access to the chain hosting the registry contract.
#[async_trait]
pub trait ChainTransport: Send + Sync {
    /// Fills nonce, gas and chain id on an unsigned transaction.
    ///
    /// The `from` field is set by the caller and must be preserved.
    async fn fill_transaction(&self, tx: TypedTransaction) -> Result<TypedTransaction, TransportError>;

    /// Broadcasts an RLP-encoded signed transaction.
    async fn submit_transaction(&self, signed: Bytes) -> Result<NativeTransaction, TransportError>;

    /// Executes a read-only contract call and returns the raw return data.
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::U64;

    #[test]
    fn test_reverted_receipt_detected() {
        let receipt = TransactionReceipt {
            status: Some(U64::zero()),
            ..Default::default()
        };
        assert!(NativeTransaction::Mined(receipt).is_reverted());
    }

    #[test]
    fn test_pending_and_broadcast_never_reverted() {
        let hash = H256::repeat_byte(0x11);
        assert!(!NativeTransaction::Broadcast(hash).is_reverted());
        assert_eq!(NativeTransaction::Broadcast(hash).hash(), hash);

        let receipt = TransactionReceipt {
            transaction_hash: hash,
            status: Some(U64::one()),
            ..Default::default()
        };
        let mined = NativeTransaction::Mined(receipt);
        assert!(!mined.is_reverted());
        assert_eq!(mined.hash(), hash);
    }
}

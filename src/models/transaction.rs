// src/models/transaction.rs
//! Normalized transaction result.
//!
//! Transports return receipts, pending transactions or bare hashes. Those
//! shapes are folded into one [`TransactionResult`] the moment a submission
//! returns, so callers always find `txnHash.hash`.

use crate::blockchain::transport::NativeTransaction;
use ethers::types::{transaction::eip2718::TypedTransaction, Address, Bytes, Signature, H256, U256, U64};
use serde::{Deserialize, Serialize};

/// Result of every write operation.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TransactionResult {
    #[serde(rename = "txnHash")]
    pub txn_hash: TxnDetails,
}

/// Details of a submitted transaction.
///
/// Everything up to `signature` is known before submission because the
/// registrar built and signed the transaction itself; block data is present
/// once the transaction is mined.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TxnDetails {
    pub hash: H256,
    /// EIP-2718 envelope type: 0 legacy, 1 access list, 2 dynamic fee
    #[serde(rename = "type")]
    pub kind: U64,
    pub from: Option<Address>,
    pub to: Option<Address>,
    pub nonce: Option<U256>,
    pub gas_limit: Option<U256>,
    pub gas_price: Option<U256>,
    pub value: U256,
    pub data: Bytes,
    pub chain_id: Option<U64>,
    pub signature: TxnSignature,
    pub block_number: Option<U64>,
    pub block_hash: Option<H256>,
    pub gas_used: Option<U256>,
    pub status: Option<U64>,
}

/// ECDSA signature components of the submitted transaction.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxnSignature {
    pub r: U256,
    pub s: U256,
    pub v: u64,
}

impl From<&Signature> for TxnSignature {
    fn from(signature: &Signature) -> Self {
        TxnSignature {
            r: signature.r,
            s: signature.s,
            v: signature.v,
        }
    }
}

impl TransactionResult {
    /// Folds a transport response with the transaction and signature that
    /// produced it.
    pub fn from_native(native: NativeTransaction, sent: &TypedTransaction, signature: &Signature) -> Self {
        let kind = match sent {
            TypedTransaction::Legacy(_) => 0u64,
            TypedTransaction::Eip2930(_) => 1,
            TypedTransaction::Eip1559(_) => 2,
        };
        let mut details = TxnDetails {
            hash: native.hash(),
            kind: U64::from(kind),
            from: sent.from().copied(),
            to: sent.to_addr().copied(),
            nonce: sent.nonce().copied(),
            gas_limit: sent.gas().copied(),
            gas_price: sent.gas_price(),
            value: sent.value().copied().unwrap_or_default(),
            data: sent.data().cloned().unwrap_or_default(),
            chain_id: sent.chain_id(),
            signature: TxnSignature::from(signature),
            block_number: None,
            block_hash: None,
            gas_used: None,
            status: None,
        };

        match native {
            NativeTransaction::Mined(receipt) => {
                details.from = Some(receipt.from);
                details.to = receipt.to.or(details.to);
                details.block_number = receipt.block_number;
                details.block_hash = receipt.block_hash;
                details.gas_used = receipt.gas_used;
                details.status = receipt.status;
            }
            NativeTransaction::Pending(transaction) => {
                details.from = Some(transaction.from);
                details.to = transaction.to.or(details.to);
                details.nonce = Some(transaction.nonce);
                details.block_number = transaction.block_number;
                details.block_hash = transaction.block_hash;
            }
            NativeTransaction::Broadcast(_) => {}
        }

        TransactionResult { txn_hash: details }
    }

    pub fn hash(&self) -> H256 {
        self.txn_hash.hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::{Transaction, TransactionReceipt, TransactionRequest};

    fn sent() -> TypedTransaction {
        let mut tx: TypedTransaction = TransactionRequest::new()
            .from(Address::repeat_byte(1))
            .to(Address::repeat_byte(2))
            .nonce(7)
            .gas(90_000)
            .gas_price(30)
            .data(vec![0xde, 0xad])
            .into();
        tx.set_chain_id(80002u64);
        tx
    }

    fn signature() -> Signature {
        Signature {
            r: U256::from(11),
            s: U256::from(22),
            v: 160_039,
        }
    }

    #[test]
    fn test_broadcast_keeps_sent_fields() {
        let hash = H256::repeat_byte(9);
        let result = TransactionResult::from_native(NativeTransaction::Broadcast(hash), &sent(), &signature());
        assert_eq!(result.hash(), hash);
        assert_eq!(result.txn_hash.nonce, Some(U256::from(7)));
        assert_eq!(result.txn_hash.chain_id, Some(U64::from(80002)));
        assert_eq!(result.txn_hash.block_number, None);
        assert_eq!(result.txn_hash.kind, U64::zero());
        assert_eq!(result.txn_hash.gas_limit, Some(U256::from(90_000)));
        assert_eq!(result.txn_hash.gas_price, Some(U256::from(30)));
        assert_eq!(result.txn_hash.value, U256::zero());
        assert_eq!(result.txn_hash.data, Bytes::from(vec![0xde, 0xad]));
        assert_eq!(result.txn_hash.signature, TxnSignature { r: U256::from(11), s: U256::from(22), v: 160_039 });
    }

    #[test]
    fn test_receipt_adds_block_data() {
        let receipt = TransactionReceipt {
            transaction_hash: H256::repeat_byte(3),
            from: Address::repeat_byte(1),
            block_number: Some(U64::from(12)),
            status: Some(U64::one()),
            ..Default::default()
        };
        let result = TransactionResult::from_native(NativeTransaction::Mined(receipt), &sent(), &signature());
        assert_eq!(result.txn_hash.block_number, Some(U64::from(12)));
        assert_eq!(result.txn_hash.to, Some(Address::repeat_byte(2)));
        assert_eq!(result.txn_hash.status, Some(U64::one()));
    }

    #[test]
    fn test_pending_transaction_normalizes() {
        let transaction = Transaction {
            hash: H256::repeat_byte(4),
            from: Address::repeat_byte(1),
            nonce: U256::from(7),
            ..Default::default()
        };
        let result = TransactionResult::from_native(NativeTransaction::Pending(transaction), &sent(), &signature());
        let json = serde_json::to_value(&result).unwrap();
        assert!(json["txnHash"]["hash"].is_string());
        assert!(json["txnHash"]["blockNumber"].is_null());
        for key in ["type", "gasLimit", "gasPrice", "value", "data", "chainId", "from"] {
            assert!(!json["txnHash"][key].is_null(), "missing {key}");
        }
        assert!(json["txnHash"]["signature"]["r"].is_string());
        assert_eq!(json["txnHash"]["signature"]["v"], 160_039);
    }
}

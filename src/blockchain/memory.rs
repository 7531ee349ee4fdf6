// src/blockchain/memory.rs
//! In-process chain emulating the DID registry contract.
//!
//! Decodes signed RLP transactions exactly as a node would, recovers the
//! sender, enforces nonces and applies the registry's storage rules. Used as
//! the transport in tests and for local experimentation without a node.
//!
//! Failures can be scheduled per contract method to exercise the registrar's
//! error paths (transport outage, revert, mined-but-failed).

use crate::blockchain::transport::{ChainTransport, NativeTransaction, TransportError};
use crate::contracts::did_registry::{
    registry_abi, ADD_RESOURCE, CREATE_DID, GET_ALL_RESOURCES, GET_DID_DOC, GET_RESOURCE,
    UPDATE_DID_DOC, UPDATE_RESOURCE,
};
use crate::error::RegistrarResult;
use crate::utils::crypto::hash_data;
use async_trait::async_trait;
use ethers::abi::{Abi, Function, Token};
use ethers::types::{
    transaction::eip2718::TypedTransaction, Address, Bytes, TransactionReceipt, H256, U256, U64,
};
use ethers::utils::rlp::Rlp;
use log::debug;
use std::collections::HashMap;
use std::sync::Mutex;

const GAS_LIMIT: u64 = 3_000_000;
const GAS_PRICE_WEI: u64 = 30_000_000_000;

/// Outcome forced on the next transaction calling a given method.
#[derive(Debug, Clone)]
pub enum ScheduledFailure {
    /// Submission fails with this transport error; state is untouched
    Transport(TransportError),
    /// Transaction is mined with status 0; state is untouched
    MinedReverted,
    /// Transaction is mined and applied, but submission still fails with
    /// this error (a receipt lost to a timeout)
    MinedThenLost(TransportError),
}

#[derive(Default)]
struct DidRecord {
    owner: Address,
    document: String,
}

#[derive(Default)]
struct ChainState {
    dids: HashMap<Address, DidRecord>,
    /// Insertion-ordered resource records per DID address
    resources: HashMap<Address, Vec<(String, String)>>,
    nonces: HashMap<Address, U256>,
    block_number: u64,
    scheduled: HashMap<String, ScheduledFailure>,
    submitted: Vec<String>,
}

/// Registry contract emulation behind the [`ChainTransport`] interface.
pub struct InMemoryChain {
    contract_address: Address,
    chain_id: u64,
    abi: Abi,
    state: Mutex<ChainState>,
}

impl InMemoryChain {
    pub fn new(contract_address: Address, chain_id: u64) -> RegistrarResult<Self> {
        Ok(InMemoryChain {
            contract_address,
            chain_id,
            abi: registry_abi()?,
            state: Mutex::new(ChainState::default()),
        })
    }

    pub fn contract_address(&self) -> Address {
        self.contract_address
    }

    /// Forces the outcome of the next transaction that calls `method`.
    pub fn fail_next(&self, method: &str, failure: ScheduledFailure) {
        self.lock().scheduled.insert(method.to_string(), failure);
    }

    /// Method names of every accepted transaction, in order.
    pub fn submitted_methods(&self) -> Vec<String> {
        self.lock().submitted.clone()
    }

    /// Raw stored resource record, bypassing the registrar.
    pub fn raw_resource(&self, id: Address, resource_id: &str) -> Option<String> {
        self.lock()
            .resources
            .get(&id)
            .and_then(|records| records.iter().find(|(rid, _)| rid == resource_id))
            .map(|(_, payload)| payload.clone())
    }

    /// Overwrites a stored resource record, bypassing the registrar.
    pub fn put_raw_resource(&self, id: Address, resource_id: &str, payload: &str) {
        let mut state = self.lock();
        let records = state.resources.entry(id).or_default();
        match records.iter_mut().find(|(rid, _)| rid == resource_id) {
            Some(record) => record.1 = payload.to_string(),
            None => records.push((resource_id.to_string(), payload.to_string())),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ChainState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn function_for(&self, data: &[u8]) -> Result<&Function, TransportError> {
        if data.len() < 4 {
            return Err(TransportError::InvalidPayload("calldata shorter than a selector".into()));
        }
        self.abi
            .functions()
            .find(|f| f.short_signature()[..] == data[..4])
            .ok_or_else(|| TransportError::InvalidPayload("unknown function selector".into()))
    }

    fn decode_call(&self, data: &[u8]) -> Result<(String, Vec<Token>), TransportError> {
        let function = self.function_for(data)?;
        let tokens = function
            .decode_input(&data[4..])
            .map_err(|e| TransportError::InvalidPayload(e.to_string()))?;
        Ok((function.name.clone(), tokens))
    }

    /// Applies a state-changing registry method.
    fn execute(
        state: &mut ChainState,
        sender: Address,
        method: &str,
        args: &[Token],
    ) -> Result<(), TransportError> {
        let id = address_arg(args, 0)?;
        match method {
            CREATE_DID => {
                if state.dids.contains_key(&id) {
                    return Err(revert("DID already exists"));
                }
                state.dids.insert(
                    id,
                    DidRecord {
                        owner: sender,
                        document: string_arg(args, 1)?,
                    },
                );
            }
            UPDATE_DID_DOC => {
                let record = owned_did(state, id, sender)?;
                record.document = string_arg(args, 1)?;
            }
            ADD_RESOURCE => {
                owned_did(state, id, sender)?;
                let resource_id = string_arg(args, 1)?;
                let records = state.resources.entry(id).or_default();
                if records.iter().any(|(rid, _)| *rid == resource_id) {
                    return Err(revert("Resource already exists"));
                }
                records.push((resource_id, string_arg(args, 2)?));
            }
            UPDATE_RESOURCE => {
                owned_did(state, id, sender)?;
                let resource_id = string_arg(args, 1)?;
                let record = state
                    .resources
                    .get_mut(&id)
                    .and_then(|records| records.iter_mut().find(|(rid, _)| *rid == resource_id))
                    .ok_or_else(|| revert("Resource does not exist"))?;
                record.1 = string_arg(args, 2)?;
            }
            other => {
                return Err(TransportError::InvalidPayload(format!(
                    "{} is not a state-changing method",
                    other
                )))
            }
        }
        Ok(())
    }

    /// Evaluates a registry view method.
    fn view(state: &ChainState, method: &str, args: &[Token]) -> Result<Vec<Token>, TransportError> {
        let id = address_arg(args, 0)?;
        let output = match method {
            GET_DID_DOC => Token::String(
                state
                    .dids
                    .get(&id)
                    .map(|record| record.document.clone())
                    .unwrap_or_default(),
            ),
            GET_RESOURCE => {
                let resource_id = string_arg(args, 1)?;
                Token::String(
                    state
                        .resources
                        .get(&id)
                        .and_then(|records| records.iter().find(|(rid, _)| *rid == resource_id))
                        .map(|(_, payload)| payload.clone())
                        .unwrap_or_default(),
                )
            }
            GET_ALL_RESOURCES => Token::Array(
                state
                    .resources
                    .get(&id)
                    .map(|records| {
                        records
                            .iter()
                            .map(|(_, payload)| Token::String(payload.clone()))
                            .collect()
                    })
                    .unwrap_or_default(),
            ),
            other => {
                return Err(TransportError::InvalidPayload(format!("{} is not a view method", other)))
            }
        };
        Ok(vec![output])
    }
}

#[async_trait]
impl ChainTransport for InMemoryChain {
    async fn fill_transaction(&self, mut tx: TypedTransaction) -> Result<TypedTransaction, TransportError> {
        let from = *tx
            .from()
            .ok_or_else(|| TransportError::InvalidPayload("transaction has no sender".into()))?;
        let nonce = self.lock().nonces.get(&from).copied().unwrap_or_default();
        tx.set_nonce(nonce);
        tx.set_gas(GAS_LIMIT);
        tx.set_gas_price(GAS_PRICE_WEI);
        tx.set_chain_id(self.chain_id);
        Ok(tx)
    }

    async fn submit_transaction(&self, signed: Bytes) -> Result<NativeTransaction, TransportError> {
        let (tx, signature) = TypedTransaction::decode_signed(&Rlp::new(signed.as_ref()))
            .map_err(|e| TransportError::InvalidPayload(e.to_string()))?;
        let sender = signature
            .recover(tx.sighash())
            .map_err(|e| TransportError::InvalidPayload(e.to_string()))?;

        if tx.chain_id() != Some(U64::from(self.chain_id)) {
            return Err(TransportError::InvalidPayload("wrong chain id".into()));
        }
        if tx.to_addr() != Some(&self.contract_address) {
            return Err(TransportError::InvalidPayload("not addressed to the registry".into()));
        }
        let data = tx
            .data()
            .ok_or_else(|| TransportError::InvalidPayload("transaction has no calldata".into()))?;
        let (method, args) = self.decode_call(data)?;

        let mut state = self.lock();
        let expected_nonce = state.nonces.get(&sender).copied().unwrap_or_default();
        if tx.nonce() != Some(&expected_nonce) {
            return Err(TransportError::Provider("nonce too low".into()));
        }

        let hash = H256::from(hash_data(signed.as_ref()));
        let mut status = U64::one();
        let mut lost = None;
        match state.scheduled.remove(&method) {
            Some(ScheduledFailure::Transport(err)) => return Err(err),
            Some(ScheduledFailure::MinedReverted) => status = U64::zero(),
            Some(ScheduledFailure::MinedThenLost(err)) => {
                Self::execute(&mut state, sender, &method, &args)?;
                lost = Some(err);
            }
            None => Self::execute(&mut state, sender, &method, &args)?,
        }

        state.nonces.insert(sender, expected_nonce + 1);
        state.block_number += 1;
        state.submitted.push(method.clone());
        debug!("mined {} in block {} ({:?})", method, state.block_number, hash);
        if let Some(err) = lost {
            return Err(err);
        }

        let block_number = state.block_number;
        Ok(NativeTransaction::Mined(TransactionReceipt {
            transaction_hash: hash,
            transaction_index: U64::zero(),
            block_hash: Some(H256::from(hash_data(&block_number.to_be_bytes()))),
            block_number: Some(U64::from(block_number)),
            from: sender,
            to: Some(self.contract_address),
            gas_used: Some(U256::from(GAS_LIMIT / 10)),
            effective_gas_price: Some(U256::from(GAS_PRICE_WEI)),
            status: Some(status),
            ..Default::default()
        }))
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, TransportError> {
        if to != self.contract_address {
            return Err(TransportError::InvalidPayload("not addressed to the registry".into()));
        }
        let (method, args) = self.decode_call(data.as_ref())?;
        let output = Self::view(&self.lock(), &method, &args)?;
        Ok(ethers::abi::encode(&output).into())
    }
}

fn revert(reason: &str) -> TransportError {
    TransportError::Reverted(Some(reason.to_string()))
}

fn owned_did(state: &mut ChainState, id: Address, sender: Address) -> Result<&mut DidRecord, TransportError> {
    let record = state.dids.get_mut(&id).ok_or_else(|| revert("DID does not exist"))?;
    if record.owner != sender {
        return Err(revert("Caller is not the DID owner"));
    }
    Ok(record)
}

fn address_arg(args: &[Token], index: usize) -> Result<Address, TransportError> {
    match args.get(index) {
        Some(Token::Address(address)) => Ok(*address),
        _ => Err(TransportError::InvalidPayload(format!("argument {} is not an address", index))),
    }
}

fn string_arg(args: &[Token], index: usize) -> Result<String, TransportError> {
    match args.get(index) {
        Some(Token::String(value)) => Ok(value.clone()),
        _ => Err(TransportError::InvalidPayload(format!("argument {} is not a string", index))),
    }
}

// src/contracts/did_registry.rs
//! DID Registry smart contract interface.
//!
//! Encodes calldata for the registry's write methods and decodes the return
//! data of its view methods. The contract stores one JSON document per DID
//! address and a keyed collection of JSON resource records.

use crate::error::{RegistrarError, RegistrarResult};
use ethers::abi::{parse_abi, Abi, Detokenize, Tokenize};
use ethers::types::{Address, Bytes};
use ethers_contract::BaseContract;

/// Human-readable ABI of the deployed registry.
pub const DID_REGISTRY_ABI: &[&str] = &[
    "function createDID(address _id, string _doc) returns (address, string)",
    "function updateDIDDoc(address _id, string _doc) returns (address, string)",
    "function getDIDDoc(address _id) view returns (string)",
    "function addResource(address _id, string _resourceId, string _resourcePayload) returns (address, string)",
    "function updateResource(address _id, string _resourceId, string _resourcePayload) returns (address, string)",
    "function getResource(address _id, string _resourceId) view returns (string)",
    "function getAllResources(address _id) view returns (string[])",
];

pub const CREATE_DID: &str = "createDID";
pub const UPDATE_DID_DOC: &str = "updateDIDDoc";
pub const GET_DID_DOC: &str = "getDIDDoc";
pub const ADD_RESOURCE: &str = "addResource";
pub const UPDATE_RESOURCE: &str = "updateResource";
pub const GET_RESOURCE: &str = "getResource";
pub const GET_ALL_RESOURCES: &str = "getAllResources";

/// Parses [`DID_REGISTRY_ABI`].
pub fn registry_abi() -> RegistrarResult<Abi> {
    parse_abi(DID_REGISTRY_ABI).map_err(|e| RegistrarError::Abi(e.to_string()))
}

/// Calldata builder for a registry deployed at a fixed address.
#[derive(Debug, Clone)]
pub struct DidRegistry {
    /// Address of the deployed contract
    address: Address,
    /// ABI wrapper used for encoding and decoding
    contract: BaseContract,
}

impl DidRegistry {
    pub fn new(address: Address) -> RegistrarResult<Self> {
        Ok(DidRegistry {
            address,
            contract: BaseContract::from(registry_abi()?),
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Calldata registering `document_json` under `id`.
    pub fn create_did(&self, id: Address, document_json: &str) -> RegistrarResult<Bytes> {
        self.encode(CREATE_DID, (id, document_json.to_string()))
    }

    /// Calldata replacing the stored document of `id`.
    pub fn update_did_doc(&self, id: Address, document_json: &str) -> RegistrarResult<Bytes> {
        self.encode(UPDATE_DID_DOC, (id, document_json.to_string()))
    }

    pub fn get_did_doc(&self, id: Address) -> RegistrarResult<Bytes> {
        self.encode(GET_DID_DOC, (id,))
    }

    pub fn add_resource(&self, id: Address, resource_id: &str, payload_json: &str) -> RegistrarResult<Bytes> {
        self.encode(ADD_RESOURCE, (id, resource_id.to_string(), payload_json.to_string()))
    }

    /// Calldata overwriting an existing resource record (used to relink heads).
    pub fn update_resource(&self, id: Address, resource_id: &str, payload_json: &str) -> RegistrarResult<Bytes> {
        self.encode(UPDATE_RESOURCE, (id, resource_id.to_string(), payload_json.to_string()))
    }

    pub fn get_resource(&self, id: Address, resource_id: &str) -> RegistrarResult<Bytes> {
        self.encode(GET_RESOURCE, (id, resource_id.to_string()))
    }

    pub fn get_all_resources(&self, id: Address) -> RegistrarResult<Bytes> {
        self.encode(GET_ALL_RESOURCES, (id,))
    }

    /// Decodes the return data of a view method.
    pub fn decode_output<D: Detokenize>(&self, method: &str, raw: &Bytes) -> RegistrarResult<D> {
        self.contract
            .decode_output(method, raw)
            .map_err(|e| RegistrarError::Abi(format!("{}: {}", method, e)))
    }

    fn encode(&self, method: &str, args: impl Tokenize) -> RegistrarResult<Bytes> {
        self.contract
            .encode(method, args)
            .map_err(|e| RegistrarError::Abi(format!("{}: {}", method, e)))
    }
}

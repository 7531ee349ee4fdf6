// src/error.rs
//! Error taxonomy for the registrar.
//!
//! Every failure that leaves the engine carries the operation name and the DID
//! it was working on, so callers can decide whether a retry makes sense.

use crate::blockchain::transport::TransportError;
use thiserror::Error;

/// Errors surfaced by the registrar and resolver.
#[derive(Error, Debug)]
pub enum RegistrarError {
    /// The randomness source could not produce a usable secret key
    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    /// A DID string that does not follow `did:polygon[:network]:<address>`
    #[error("Invalid DID '{did}': {reason}")]
    InvalidDid { did: String, reason: String },

    /// A DID document that is not valid JSON or lacks required keys
    #[error("Malformed DID document: {0}")]
    MalformedDocument(String),

    /// A linked resource payload or chain record that cannot be interpreted
    #[error("Malformed resource: {0}")]
    MalformedResource(String),

    /// The transport failed before the chain produced a verdict
    #[error("{operation} failed for {did}: {source}")]
    Submission {
        operation: &'static str,
        did: String,
        #[source]
        source: TransportError,
    },

    /// The transaction was mined but reverted, or the call was rejected
    #[error("{operation} rejected by chain for {did}: {}", reason.as_deref().unwrap_or("no reason given"))]
    ChainRejected {
        operation: &'static str,
        did: String,
        reason: Option<String>,
    },

    #[error("DID not found: {0}")]
    DidNotFound(String),

    #[error("Resource {resource_id} not found for {did}")]
    ResourceNotFound { did: String, resource_id: String },

    /// Two heads, a dangling forward pointer or a cycle in one lineage
    #[error("Inconsistent lineage '{resource_name}' for {did}: {reason}")]
    InconsistentLineage {
        did: String,
        resource_name: String,
        reason: String,
    },

    /// The new version was written but the previous head could not be patched
    #[error("Relink of {previous_id} -> {resource_id} failed for {did}: {source}")]
    RelinkFailed {
        did: String,
        previous_id: String,
        resource_id: String,
        #[source]
        source: Box<RegistrarError>,
    },

    /// Calldata or return data that does not match the registry ABI
    #[error("Contract ABI error: {0}")]
    Abi(String),

    #[error("Transaction signing failed: {0}")]
    Signing(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl RegistrarError {
    /// Maps a transport failure into the registrar taxonomy.
    ///
    /// Reverts become `ChainRejected`; everything else is a submission failure.
    pub fn from_transport(operation: &'static str, did: &str, err: TransportError) -> Self {
        match err {
            TransportError::Reverted(reason) => RegistrarError::ChainRejected {
                operation,
                did: did.to_string(),
                reason,
            },
            other => RegistrarError::Submission {
                operation,
                did: did.to_string(),
                source: other,
            },
        }
    }
}

pub type RegistrarResult<T> = Result<T, RegistrarError>;

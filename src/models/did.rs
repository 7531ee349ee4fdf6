// src/models/did.rs
//! DID Document data model.
//!
//! Follows the [DID Core Specification](https://www.w3.org/TR/did-core/)
//! shape used by the `did:polygon` registry: required `@context`, `id` and
//! `verificationMethod`, optional relationships and services, and any other
//! top-level keys carried through untouched.

use crate::error::{RegistrarError, RegistrarResult};
use crate::wallet::key_management::PolygonDid;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const DID_V1_CONTEXT: &str = "https://w3id.org/did/v1";
pub const SECP256K1_2019_CONTEXT: &str = "https://w3id.org/security/suites/secp256k1-2019/v1";
pub const SECP256K1_VERIFICATION_KEY_2019: &str = "EcdsaSecp256k1VerificationKey2019";
pub const LINKED_DOMAINS: &str = "LinkedDomains";

/// A DID Document as stored on chain.
///
/// # Fields
/// - `context`: JSON-LD contexts (`@context`)
/// - `id`: The owning DID string
/// - `verification_method`: Keys able to act for the DID
/// - `authentication` / `assertion_method`: references or embedded methods
/// - `service`: Service endpoints
/// - `extra`: Any other top-level keys, preserved on round trip
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DidDocument {
    #[serde(rename = "@context")]
    pub context: Vec<String>,

    pub id: String,

    #[serde(rename = "verificationMethod")]
    pub verification_method: Vec<VerificationMethod>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authentication: Vec<Value>,

    #[serde(rename = "assertionMethod", default, skip_serializing_if = "Vec::is_empty")]
    pub assertion_method: Vec<Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub service: Vec<Service>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A verification method entry.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct VerificationMethod {
    pub id: String,

    #[serde(rename = "type")]
    pub kind: String,

    pub controller: String,

    #[serde(rename = "publicKeyBase58", default, skip_serializing_if = "Option::is_none")]
    pub public_key_base58: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A service endpoint entry.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Service {
    pub id: String,

    #[serde(rename = "type")]
    pub kind: String,

    /// URI string or structured endpoint description
    #[serde(rename = "serviceEndpoint")]
    pub service_endpoint: Value,
}

impl DidDocument {
    /// Minimal document for a freshly registered DID.
    ///
    /// One secp256k1 key (`#key-1`) referenced from `authentication` and
    /// `assertionMethod`, plus a `LinkedDomains` service.
    pub fn new(did: &str, public_key_base58: &str, service_endpoint: &str) -> Self {
        let key_id = format!("{}#key-1", did);
        DidDocument {
            context: vec![DID_V1_CONTEXT.to_string(), SECP256K1_2019_CONTEXT.to_string()],
            id: did.to_string(),
            verification_method: vec![VerificationMethod {
                id: key_id.clone(),
                kind: SECP256K1_VERIFICATION_KEY_2019.to_string(),
                controller: did.to_string(),
                public_key_base58: Some(public_key_base58.to_string()),
                extra: Map::new(),
            }],
            authentication: vec![Value::String(key_id.clone())],
            assertion_method: vec![Value::String(key_id)],
            service: vec![Service {
                id: format!("{}#linked-domain", did),
                kind: LINKED_DOMAINS.to_string(),
                service_endpoint: Value::String(service_endpoint.to_string()),
            }],
            extra: Map::new(),
        }
    }

    /// Checks that this document describes `did`.
    ///
    /// Address comparison ignores checksum casing.
    pub fn validate_for(&self, did: &PolygonDid) -> RegistrarResult<()> {
        let document_did = PolygonDid::parse(&self.id).map_err(|_| {
            RegistrarError::MalformedDocument(format!("document id '{}' is not a did:polygon DID", self.id))
        })?;
        if &document_did != did {
            return Err(RegistrarError::MalformedDocument(format!(
                "document id '{}' does not match {}",
                self.id, did
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DID: &str = "did:polygon:testnet:0x2f65b6a8C1bE1A7fA6A0f2c3F6bE5D7E8a9B0c1D";

    #[test]
    fn test_template_references_key() {
        let doc = DidDocument::new(DID, "z6Mkabc", "https://example.com");
        assert_eq!(doc.id, DID);
        assert_eq!(doc.verification_method.len(), 1);
        assert_eq!(doc.verification_method[0].controller, DID);
        assert_eq!(doc.authentication[0], Value::String(format!("{DID}#key-1")));
        assert_eq!(doc.service[0].service_endpoint, "https://example.com");
    }

    #[test]
    fn test_validate_for() {
        let did = PolygonDid::parse(DID).unwrap();
        let doc = DidDocument::new(&DID.to_lowercase(), "z6Mkabc", "https://example.com");
        assert!(doc.validate_for(&did).is_ok());

        let other = DidDocument::new("did:polygon:0x2f65b6a8C1bE1A7fA6A0f2c3F6bE5D7E8a9B0c1D", "z", "x");
        assert!(matches!(other.validate_for(&did), Err(RegistrarError::MalformedDocument(_))));

        let foreign = DidDocument::new("did:web:example.com", "z", "x");
        assert!(matches!(foreign.validate_for(&did), Err(RegistrarError::MalformedDocument(_))));
    }

    #[test]
    fn test_required_keys_serialize_first() {
        let doc = DidDocument::new(DID, "z6Mkabc", "https://example.com");
        let json = serde_json::to_string(&doc).unwrap();
        let context = json.find("\"@context\"").unwrap();
        let id = json.find("\"id\"").unwrap();
        let vm = json.find("\"verificationMethod\"").unwrap();
        assert!(context < id && id < vm);
    }
}

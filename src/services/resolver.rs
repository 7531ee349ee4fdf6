// src/services/resolver.rs
//! Read path of the registry.
//!
//! Resolves DID documents and linked resources from contract view calls.
//! Nothing here signs or submits; every method is a pure read of chain state.

use crate::blockchain::transport::ChainTransport;
use crate::contracts::did_registry::{DidRegistry, GET_ALL_RESOURCES, GET_DID_DOC, GET_RESOURCE};
use crate::error::{RegistrarError, RegistrarResult};
use crate::models::did::DidDocument;
use crate::models::resource::{LinkedResource, LinkedResourceList};
use crate::services::versioning::{order_by_lineage, Lineage};
use crate::utils::serialization::{decode_document, decode_resource};
use crate::wallet::key_management::PolygonDid;
use ethers::types::Bytes;
use log::debug;
use std::sync::Arc;

/// Resolver for `did:polygon` documents and resources.
#[derive(Clone)]
pub struct Resolver {
    /// Transport used for view calls
    transport: Arc<dyn ChainTransport>,
    /// Registry calldata builder
    registry: Arc<DidRegistry>,
}

impl Resolver {
    pub fn new(transport: Arc<dyn ChainTransport>, registry: Arc<DidRegistry>) -> Self {
        Resolver { transport, registry }
    }

    /// Reads the current DID document.
    ///
    /// # Errors
    /// - `DidNotFound` if the DID was never registered
    /// - `MalformedDocument` if the stored document does not parse
    pub async fn resolve_did_document(&self, did: &str) -> RegistrarResult<DidDocument> {
        let parsed = PolygonDid::parse(did)?;
        let raw = self
            .read("resolveDidDocument", did, self.registry.get_did_doc(parsed.address())?)
            .await?;
        let document_json: String = self.registry.decode_output(GET_DID_DOC, &raw)?;

        if document_json.trim().is_empty() {
            return Err(RegistrarError::DidNotFound(did.to_string()));
        }
        decode_document(&document_json)
    }

    /// All linked resources of a DID, grouped by lineage from origin to head.
    pub async fn get_resources_by_did(&self, did: &str) -> RegistrarResult<LinkedResourceList> {
        let parsed = PolygonDid::parse(did)?;
        let resources = self.fetch_resources(&parsed).await?;
        debug!("resolved {} resources for {}", resources.len(), parsed);
        Ok(LinkedResourceList {
            linked_resource: order_by_lineage(resources),
        })
    }

    /// A single resource version.
    ///
    /// # Errors
    /// `ResourceNotFound` if no record with `resource_id` exists for the DID.
    pub async fn get_resource_by_did_and_resource_id(
        &self,
        did: &str,
        resource_id: &str,
    ) -> RegistrarResult<LinkedResource> {
        let parsed = PolygonDid::parse(did)?;
        let raw = self
            .read(
                "getResourceByDidAndResourceId",
                did,
                self.registry.get_resource(parsed.address(), resource_id)?,
            )
            .await?;
        let payload: String = self.registry.decode_output(GET_RESOURCE, &raw)?;

        if payload.trim().is_empty() {
            return Err(RegistrarError::ResourceNotFound {
                did: did.to_string(),
                resource_id: resource_id.to_string(),
            });
        }
        decode_resource(&payload)
    }

    /// The lineage of `resource_name`, including any relinks still pending.
    ///
    /// # Errors
    /// `InconsistentLineage` when the lineage is forked or otherwise broken.
    pub async fn resolve_lineage(&self, did: &str, resource_name: &str) -> RegistrarResult<Lineage> {
        let parsed = PolygonDid::parse(did)?;
        let resources = self.fetch_resources(&parsed).await?;
        Lineage::inspect(&resources, &parsed.address_string(), resource_name).map_err(|fault| {
            RegistrarError::InconsistentLineage {
                did: parsed.to_string(),
                resource_name: resource_name.to_string(),
                reason: fault.to_string(),
            }
        })
    }

    /// Every resource record stored for `did`, in contract order.
    pub(crate) async fn fetch_resources(&self, did: &PolygonDid) -> RegistrarResult<Vec<LinkedResource>> {
        let did_string = did.to_string();
        let raw = self
            .read(
                "getResourcesByDid",
                &did_string,
                self.registry.get_all_resources(did.address())?,
            )
            .await?;
        let payloads: Vec<String> = self.registry.decode_output(GET_ALL_RESOURCES, &raw)?;
        payloads.iter().map(|payload| decode_resource(payload)).collect()
    }

    async fn read(&self, operation: &'static str, did: &str, calldata: Bytes) -> RegistrarResult<Bytes> {
        self.transport
            .call(self.registry.address(), calldata)
            .await
            .map_err(|e| RegistrarError::from_transport(operation, did, e))
    }
}

// src/services/registrar.rs
//! `did:polygon` registrar.
//!
//! Translates DID lifecycle operations into registry contract transactions:
//! - DID creation from a public key and service endpoint
//! - Whole-document updates
//! - Linked resource versions, including the forward relink of the previous head
//!
//! Every transaction is built here, filled by the transport, signed locally
//! with the configured key and submitted as raw bytes. Reads go through the
//! embedded [`Resolver`].

use crate::blockchain::rpc_client::RpcTransport;
use crate::blockchain::transport::ChainTransport;
use crate::config::RegistrarConfig;
use crate::contracts::did_registry::DidRegistry;
use crate::error::{RegistrarError, RegistrarResult};
use crate::models::did::DidDocument;
use crate::models::resource::{LinkedResource, LinkedResourceList};
use crate::models::transaction::TransactionResult;
use crate::services::resolver::Resolver;
use crate::services::versioning::{link_as_head, prepare_resource, Lineage, PendingRelink};
use crate::utils::serialization::{decode_document, decode_resource_payload, encode_document, encode_resource};
use crate::utils::crypto::sha256_hex;
use crate::wallet::key_management::{self, KeyManager, KeyPair, PolygonDid};
use chrono::Utc;
use ethers::types::{transaction::eip2718::TypedTransaction, Bytes, TransactionRequest};
use log::{debug, info, warn};
use std::sync::Arc;

/// Registrar bound to one registry contract and one signing key.
///
/// Holds no chain state between calls. Concurrent `add_resource` calls on the
/// same lineage are ordered only by the chain's nonces; a race shows up as a
/// forked lineage (`InconsistentLineage`) on the next write rather than as
/// silent loss.
#[derive(Clone)]
pub struct PolygonDidRegistrar {
    transport: Arc<dyn ChainTransport>,
    registry: Arc<DidRegistry>,
    signer: KeyManager,
    resolver: Resolver,
}

impl PolygonDidRegistrar {
    /// Creates a registrar over an injected transport.
    ///
    /// # Errors
    /// `Config` if the contract address or private key is invalid.
    pub fn new(config: &RegistrarConfig, transport: Arc<dyn ChainTransport>) -> RegistrarResult<Self> {
        let registry = Arc::new(DidRegistry::new(config.contract_address()?)?);
        let signer = KeyManager::from_private_key(&config.private_key)?;
        info!(
            "registrar for contract {:?} signing as {:?}",
            registry.address(),
            signer.address()
        );

        Ok(PolygonDidRegistrar {
            resolver: Resolver::new(transport.clone(), registry.clone()),
            transport,
            registry,
            signer,
        })
    }

    /// Creates a registrar over the JSON-RPC endpoint in `config`.
    pub async fn connect(config: &RegistrarConfig) -> RegistrarResult<Self> {
        let transport = RpcTransport::connect(&config.rpc_url, config.confirmations, config.receipt_timeout())
            .await
            .map_err(|e| RegistrarError::Config(format!("Cannot reach {}: {}", config.rpc_url, e)))?;
        Self::new(config, Arc::new(transport))
    }

    /// Generates a fresh identity; no network access.
    pub fn create_key_pair(network: &str) -> RegistrarResult<KeyPair> {
        key_management::create_key_pair(network)
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Registers `did` with a minimal document.
    ///
    /// # Arguments
    /// * `did` - DID to register
    /// * `public_key_base58` - Key published as `#key-1`
    /// * `service_endpoint` - URI published as the `LinkedDomains` service
    pub async fn create(
        &self,
        did: &str,
        public_key_base58: &str,
        service_endpoint: &str,
    ) -> RegistrarResult<TransactionResult> {
        let parsed = PolygonDid::parse(did)?;
        let did_string = parsed.to_string();
        let document = DidDocument::new(&did_string, public_key_base58, service_endpoint);
        let calldata = self
            .registry
            .create_did(parsed.address(), &encode_document(&document)?)?;

        self.submit("create", &did_string, calldata).await
    }

    /// Replaces the stored document of `did` with `document_json`.
    ///
    /// # Errors
    /// `MalformedDocument` if the document does not parse or its `id` is not
    /// `did`; nothing is submitted in that case.
    pub async fn update(&self, did: &str, document_json: &str) -> RegistrarResult<TransactionResult> {
        let parsed = PolygonDid::parse(did)?;
        let document = decode_document(document_json)?;
        document.validate_for(&parsed)?;

        let calldata = self
            .registry
            .update_did_doc(parsed.address(), &encode_document(&document)?)?;
        self.submit("update", &parsed.to_string(), calldata).await
    }

    /// Adds a new version of a linked resource.
    ///
    /// The new version becomes the lineage head; the previous head is then
    /// patched to point forward. An interrupted earlier write on the same
    /// lineage is completed first. Content identical to the current head never
    /// adds a version: the call completes any pending relink, or otherwise
    /// rewrites the head record unchanged so the caller still gets a mined
    /// transaction.
    ///
    /// # Errors
    /// - `MalformedResource` for an invalid payload (nothing submitted)
    /// - `InconsistentLineage` for a forked or broken lineage
    /// - `RelinkFailed` if the new version was written but the previous head
    ///   could not be patched; the lineage is left in a repairable state
    pub async fn add_resource(&self, did: &str, resource_json: &str) -> RegistrarResult<TransactionResult> {
        let parsed = PolygonDid::parse(did)?;
        let (payload, canonical) = decode_resource_payload(resource_json)?;
        let did_string = parsed.to_string();

        let lineage = self.lineage(&parsed, &payload.resource_name).await?;
        let repaired = if lineage.is_consistent() {
            None
        } else {
            warn!(
                "lineage '{}' of {} has {} pending relinks, repairing",
                payload.resource_name,
                did_string,
                lineage.pending_relinks.len()
            );
            self.apply_relinks(&parsed, &lineage.pending_relinks).await?
        };

        let checksum = sha256_hex(canonical.as_bytes());
        if let Some(head) = lineage.head().filter(|head| head.checksum == checksum) {
            info!(
                "resource {} ('{}') already holds this content, no new version",
                head.resource_id, payload.resource_name
            );
            return match repaired {
                Some(result) => Ok(result),
                None => self.write_resource("confirmResource", &parsed, head).await,
            };
        }

        let resource = prepare_resource(&parsed, &payload, &canonical, lineage.head(), Utc::now());
        let calldata = self.registry.add_resource(
            parsed.address(),
            &resource.resource_id,
            &encode_resource(&resource)?,
        )?;
        let result = self.submit("addResource", &did_string, calldata).await?;

        if let Some(previous) = lineage.head() {
            let patched = link_as_head(previous, &resource);
            if let Err(err) = self.write_resource("relinkResource", &parsed, &patched).await {
                return Err(RegistrarError::RelinkFailed {
                    did: did_string,
                    previous_id: previous.resource_id.clone(),
                    resource_id: resource.resource_id,
                    source: Box::new(err),
                });
            }
        }

        info!(
            "added resource {} ('{}') to {}",
            resource.resource_id, resource.resource_name, did_string
        );
        Ok(result)
    }

    /// Completes any interrupted relinks of `resource_name`.
    ///
    /// Returns the lineage as it stands afterwards.
    pub async fn repair_lineage(&self, did: &str, resource_name: &str) -> RegistrarResult<Lineage> {
        let parsed = PolygonDid::parse(did)?;
        let mut lineage = self.lineage(&parsed, resource_name).await?;
        self.apply_relinks(&parsed, &lineage.pending_relinks).await?;

        for relink in lineage.pending_relinks.drain(..) {
            let patched = relink.patched();
            if let Some(version) = lineage
                .versions
                .iter_mut()
                .find(|v| v.resource_id == patched.resource_id)
            {
                *version = patched;
            }
        }
        Ok(lineage)
    }

    pub async fn resolve_did_document(&self, did: &str) -> RegistrarResult<DidDocument> {
        self.resolver.resolve_did_document(did).await
    }

    pub async fn get_resources_by_did(&self, did: &str) -> RegistrarResult<LinkedResourceList> {
        self.resolver.get_resources_by_did(did).await
    }

    pub async fn get_resource_by_did_and_resource_id(
        &self,
        did: &str,
        resource_id: &str,
    ) -> RegistrarResult<LinkedResource> {
        self.resolver
            .get_resource_by_did_and_resource_id(did, resource_id)
            .await
    }

    pub async fn resolve_lineage(&self, did: &str, resource_name: &str) -> RegistrarResult<Lineage> {
        self.resolver.resolve_lineage(did, resource_name).await
    }

    async fn lineage(&self, did: &PolygonDid, resource_name: &str) -> RegistrarResult<Lineage> {
        let resources = self.resolver.fetch_resources(did).await?;
        Lineage::inspect(&resources, &did.address_string(), resource_name).map_err(|fault| {
            RegistrarError::InconsistentLineage {
                did: did.to_string(),
                resource_name: resource_name.to_string(),
                reason: fault.to_string(),
            }
        })
    }

    /// Writes pending forward pointers oldest first; returns the last result.
    async fn apply_relinks(
        &self,
        did: &PolygonDid,
        relinks: &[PendingRelink],
    ) -> RegistrarResult<Option<TransactionResult>> {
        let mut last = None;
        for relink in relinks {
            last = Some(self.write_resource("repairResource", did, &relink.patched()).await?);
        }
        Ok(last)
    }

    async fn write_resource(
        &self,
        operation: &'static str,
        did: &PolygonDid,
        resource: &LinkedResource,
    ) -> RegistrarResult<TransactionResult> {
        let calldata = self.registry.update_resource(
            did.address(),
            &resource.resource_id,
            &encode_resource(resource)?,
        )?;
        self.submit(operation, &did.to_string(), calldata).await
    }

    /// Fills, signs and submits one registry call, then normalizes the result.
    async fn submit(&self, operation: &'static str, did: &str, calldata: Bytes) -> RegistrarResult<TransactionResult> {
        let request: TypedTransaction = TransactionRequest::new()
            .from(self.signer.address())
            .to(self.registry.address())
            .data(calldata)
            .into();

        let tx = self
            .transport
            .fill_transaction(request)
            .await
            .map_err(|e| RegistrarError::from_transport(operation, did, e))?;
        let signature = self.signer.sign(&tx)?;
        let signed = tx.rlp_signed(&signature);
        debug!("{} for {}: submitting {} signed bytes", operation, did, signed.len());

        let native = self
            .transport
            .submit_transaction(signed)
            .await
            .map_err(|e| RegistrarError::from_transport(operation, did, e))?;
        if native.is_reverted() {
            return Err(RegistrarError::ChainRejected {
                operation,
                did: did.to_string(),
                reason: None,
            });
        }

        let result = TransactionResult::from_native(native, &tx, &signature);
        info!("{} for {} confirmed in {:?}", operation, did, result.hash());
        Ok(result)
    }
}

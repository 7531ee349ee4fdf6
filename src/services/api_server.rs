// src/services/api_server.rs
//! HTTP API for the registrar.
//!
//! Exposes the registrar's public operations over JSON:
//! - Key pair generation
//! - DID creation, update and resolution
//! - Linked resource registration and resolution

use crate::error::RegistrarError;
use crate::models::did::DidDocument;
use crate::models::resource::{LinkedResource, LinkedResourceList};
use crate::models::transaction::TransactionResult;
use crate::services::registrar::PolygonDidRegistrar;
use crate::wallet::key_management::KeyPair;
use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Router,
};
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;

/// Request payload for generating a key pair
#[derive(Serialize, Deserialize, Default)]
struct CreateKeyPairRequest {
    network: Option<String>,
}

/// Request payload for registering a DID
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateDidRequest {
    did: String,
    public_key_base58: String,
    service_endpoint: String,
}

/// Request payload for replacing a DID document
#[derive(Serialize, Deserialize)]
struct UpdateDidRequest {
    did: String,
    document: serde_json::Value,
}

/// Request payload for adding a linked resource version
#[derive(Serialize, Deserialize)]
struct AddResourceRequest {
    did: String,
    resource: serde_json::Value,
}

/// Error body returned with every non-2xx status
#[derive(Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

/// API server state
pub struct ApiServer {
    registrar: Arc<PolygonDidRegistrar>,
    /// Network label used when a key pair request does not name one
    default_network: String,
}

impl ApiServer {
    pub fn new(registrar: PolygonDidRegistrar, default_network: &str) -> Self {
        ApiServer {
            registrar: Arc::new(registrar),
            default_network: default_network.to_string(),
        }
    }

    /// Route table shared by `run` and embedding applications.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/create-key-pair", post(Self::create_key_pair_handler))
            .route("/create-did", post(Self::create_did_handler))
            .route("/update-did", put(Self::update_did_handler))
            .route("/resolve-did/:did", get(Self::resolve_did_handler))
            .route("/add-resource", post(Self::add_resource_handler))
            .route("/resources/:did", get(Self::resources_by_did_handler))
            .route("/resources/:did/:resource_id", get(Self::resource_by_id_handler))
            .with_state(Arc::new(self.clone()))
    }

    /// Serves the API until the listener fails.
    pub async fn run(&self, addr: SocketAddr) -> std::io::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("API server listening on http://{}", addr);
        axum::serve(listener, self.router()).await
    }

    /// POST /create-key-pair
    async fn create_key_pair_handler(
        State(state): State<Arc<ApiServer>>,
        payload: Option<Json<CreateKeyPairRequest>>,
    ) -> ApiResult<KeyPair> {
        let request = payload.map(|Json(p)| p).unwrap_or_default();
        let network = request.network.unwrap_or_else(|| state.default_network.clone());
        PolygonDidRegistrar::create_key_pair(&network)
            .map(Json)
            .map_err(error_response)
    }

    /// POST /create-did
    async fn create_did_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<CreateDidRequest>,
    ) -> ApiResult<TransactionResult> {
        state
            .registrar
            .create(&payload.did, &payload.public_key_base58, &payload.service_endpoint)
            .await
            .map(Json)
            .map_err(error_response)
    }

    /// PUT /update-did
    async fn update_did_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<UpdateDidRequest>,
    ) -> ApiResult<TransactionResult> {
        state
            .registrar
            .update(&payload.did, &payload.document.to_string())
            .await
            .map(Json)
            .map_err(error_response)
    }

    /// GET /resolve-did/:did
    async fn resolve_did_handler(
        State(state): State<Arc<ApiServer>>,
        Path(did): Path<String>,
    ) -> ApiResult<DidDocument> {
        state
            .registrar
            .resolve_did_document(&did)
            .await
            .map(Json)
            .map_err(error_response)
    }

    /// POST /add-resource
    async fn add_resource_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<AddResourceRequest>,
    ) -> ApiResult<TransactionResult> {
        state
            .registrar
            .add_resource(&payload.did, &payload.resource.to_string())
            .await
            .map(Json)
            .map_err(error_response)
    }

    /// GET /resources/:did
    async fn resources_by_did_handler(
        State(state): State<Arc<ApiServer>>,
        Path(did): Path<String>,
    ) -> ApiResult<LinkedResourceList> {
        state
            .registrar
            .get_resources_by_did(&did)
            .await
            .map(Json)
            .map_err(error_response)
    }

    /// GET /resources/:did/:resource_id
    async fn resource_by_id_handler(
        State(state): State<Arc<ApiServer>>,
        Path((did, resource_id)): Path<(String, String)>,
    ) -> ApiResult<LinkedResource> {
        state
            .registrar
            .get_resource_by_did_and_resource_id(&did, &resource_id)
            .await
            .map(Json)
            .map_err(error_response)
    }
}

impl Clone for ApiServer {
    fn clone(&self) -> Self {
        ApiServer {
            registrar: Arc::clone(&self.registrar),
            default_network: self.default_network.clone(),
        }
    }
}

/// HTTP status for each registrar failure.
pub fn status_for(err: &RegistrarError) -> StatusCode {
    match err {
        RegistrarError::InvalidDid { .. }
        | RegistrarError::MalformedDocument(_)
        | RegistrarError::MalformedResource(_) => StatusCode::BAD_REQUEST,
        RegistrarError::DidNotFound(_) | RegistrarError::ResourceNotFound { .. } => StatusCode::NOT_FOUND,
        RegistrarError::InconsistentLineage { .. } => StatusCode::CONFLICT,
        RegistrarError::ChainRejected { .. }
        | RegistrarError::Submission { .. }
        | RegistrarError::RelinkFailed { .. } => StatusCode::BAD_GATEWAY,
        RegistrarError::KeyGeneration(_)
        | RegistrarError::Abi(_)
        | RegistrarError::Signing(_)
        | RegistrarError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: RegistrarError) -> (StatusCode, Json<ErrorResponse>) {
    let status = status_for(&err);
    if status.is_server_error() {
        error!("request failed: {}", err);
    }
    (status, Json(ErrorResponse { error: err.to_string() }))
}

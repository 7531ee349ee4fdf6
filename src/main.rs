// src/main.rs

//! # did:polygon Registrar - Main Entry Point
//!
//! Loads configuration, connects to the configured JSON-RPC endpoint and
//! serves the registrar over HTTP.
//!
//! ## Environment Variables Required
//! - `POLYGON_DID_CONTRACT_ADDRESS`: Deployed registry contract address
//! - `POLYGON_DID_RPC_URL`: JSON-RPC endpoint of the Polygon network
//! - `POLYGON_DID_PRIVATE_KEY`: Key that signs every write
//!
//! See [`RegistrarConfig`] for the optional settings.

use anyhow::Context;
use log::info;
use polygon_did_registrar::{ApiServer, PolygonDidRegistrar, RegistrarConfig};
use std::net::SocketAddr;

/// # Initialization Sequence
/// 1. Load environment configuration
/// 2. Connect to the chain
/// 3. Start API server
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = RegistrarConfig::from_env().context("Failed to load POLYGON_DID_* configuration")?;
    info!("starting with {:?}", config);

    let registrar = PolygonDidRegistrar::connect(&config)
        .await
        .context("Failed to initialize registrar - check RPC endpoint, contract address and private key")?;

    let addr: SocketAddr = config
        .listen_addr
        .parse()
        .with_context(|| format!("Invalid listen address '{}'", config.listen_addr))?;

    let api_server = ApiServer::new(registrar, &config.network);
    info!("Available endpoints:");
    info!("- POST /create-key-pair");
    info!("- POST /create-did");
    info!("- PUT  /update-did");
    info!("- GET  /resolve-did/:did");
    info!("- POST /add-resource");
    info!("- GET  /resources/:did");
    info!("- GET  /resources/:did/:resource_id");

    api_server.run(addr).await.context("API server stopped")?;
    Ok(())
}

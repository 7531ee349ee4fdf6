// src/config.rs
//! Registrar configuration.
//!
//! Values come from the environment (optionally via a `.env` file), all
//! prefixed with `POLYGON_DID_`:
//! - `POLYGON_DID_CONTRACT_ADDRESS`: Deployed registry contract address
//! - `POLYGON_DID_RPC_URL`: JSON-RPC endpoint
//! - `POLYGON_DID_PRIVATE_KEY`: Hex private key used to sign transactions
//! - `POLYGON_DID_NETWORK`: (Optional) network label, default `testnet`
//! - `POLYGON_DID_CONFIRMATIONS`: (Optional) blocks to wait per write, default 1
//! - `POLYGON_DID_RECEIPT_TIMEOUT_SECS`: (Optional) default 120
//! - `POLYGON_DID_LISTEN_ADDR`: (Optional) HTTP bind address, default `127.0.0.1:3000`

use crate::error::{RegistrarError, RegistrarResult};
use config::{Config, Environment};
use ethers::types::Address;
use serde::Deserialize;
use std::{fmt, str::FromStr, time::Duration};

pub const ENV_PREFIX: &str = "POLYGON_DID";

#[derive(Deserialize, Clone)]
pub struct RegistrarConfig {
    pub contract_address: String,
    pub rpc_url: String,
    pub private_key: String,
    #[serde(default = "default_network")]
    pub network: String,
    #[serde(default = "default_confirmations")]
    pub confirmations: usize,
    #[serde(default = "default_receipt_timeout_secs")]
    pub receipt_timeout_secs: u64,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

fn default_network() -> String {
    "testnet".to_string()
}

fn default_confirmations() -> usize {
    1
}

fn default_receipt_timeout_secs() -> u64 {
    120
}

fn default_listen_addr() -> String {
    "127.0.0.1:3000".to_string()
}

impl RegistrarConfig {
    /// Configuration with defaults for everything but the three required values.
    pub fn new(contract_address: &str, rpc_url: &str, private_key: &str) -> Self {
        RegistrarConfig {
            contract_address: contract_address.to_string(),
            rpc_url: rpc_url.to_string(),
            private_key: private_key.to_string(),
            network: default_network(),
            confirmations: default_confirmations(),
            receipt_timeout_secs: default_receipt_timeout_secs(),
            listen_addr: default_listen_addr(),
        }
    }

    /// Loads `.env` if present, then reads `POLYGON_DID_*` variables.
    pub fn from_env() -> RegistrarResult<Self> {
        dotenv::dotenv().ok();
        Config::builder()
            .add_source(Environment::with_prefix(ENV_PREFIX))
            .build()
            .and_then(|settings| settings.try_deserialize())
            .map_err(|e| RegistrarError::Config(e.to_string()))
    }

    pub fn contract_address(&self) -> RegistrarResult<Address> {
        Address::from_str(&self.contract_address)
            .map_err(|e| RegistrarError::Config(format!("Invalid contract address: {}", e)))
    }

    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_secs(self.receipt_timeout_secs)
    }
}

impl fmt::Debug for RegistrarConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrarConfig")
            .field("contract_address", &self.contract_address)
            .field("rpc_url", &self.rpc_url)
            .field("private_key", &"<redacted>")
            .field("network", &self.network)
            .field("confirmations", &self.confirmations)
            .field("receipt_timeout_secs", &self.receipt_timeout_secs)
            .field("listen_addr", &self.listen_addr)
            .finish()
    }
}

//! Registrar and resolver for `did:polygon` identifiers.
//!
//! DID documents and versioned linked resources are stored by a registry
//! contract on a Polygon network; this crate builds, signs and submits the
//! writes and decodes the reads.

pub mod blockchain;    // Chain transport seam, JSON-RPC and in-memory backends
pub mod config;        // Environment-driven settings
pub mod contracts;     // Registry ABI and calldata
pub mod error;         // Registrar error type
pub mod models;        // DID documents, linked resources, transaction results
pub mod services;      // Registrar, resolver, lineage logic and HTTP API
pub mod utils;         // Hashing and JSON helpers
pub mod wallet;        // Key pairs, DID parsing and transaction signing

pub use config::RegistrarConfig;
pub use error::{RegistrarError, RegistrarResult};
pub use services::api_server::ApiServer;
pub use services::{PolygonDidRegistrar, Resolver};

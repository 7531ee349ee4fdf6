// src/wallet/mod.rs
pub mod key_management;

pub use key_management::{create_key_pair, KeyManager, KeyPair, PolygonDid};

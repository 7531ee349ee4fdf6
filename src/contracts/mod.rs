// src/contracts/mod.rs
pub mod did_registry;

pub use did_registry::DidRegistry;

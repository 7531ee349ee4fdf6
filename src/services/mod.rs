// src/services/mod.rs
pub mod api_server;
pub mod registrar;
pub mod resolver;
pub mod versioning;

pub use registrar::PolygonDidRegistrar;
pub use resolver::Resolver;

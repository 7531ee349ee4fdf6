// src/blockchain/mod.rs
//! Chain access: the transport capability and its implementations.

pub mod memory;
pub mod rpc_client;
pub mod transport;

pub use memory::InMemoryChain;
pub use rpc_client::RpcTransport;
pub use transport::{ChainTransport, NativeTransaction, TransportError};

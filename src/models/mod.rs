// src/models/mod.rs
pub mod did;
pub mod resource;
pub mod transaction;

pub use did::{DidDocument, Service, VerificationMethod};
pub use resource::{LinkedResource, LinkedResourceList, ResourcePayload};
pub use transaction::{TransactionResult, TxnDetails};

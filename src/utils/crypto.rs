// src/utils/crypto.rs
//! Hashing utilities.
//!
//! Keccak-256 for anything the chain itself hashes (transaction hashes),
//! SHA-256 for linked resource checksums.

use ethers::utils::{hex, keccak256};
use sha2::{Digest, Sha256};

/// Computes a Keccak-256 hash of the input data (Ethereum-compatible).
pub fn hash_data(data: &[u8]) -> [u8; 32] {
    keccak256(data)
}

/// Lowercase hex SHA-256 digest, the checksum format of linked resources.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_keccak_empty_input() {
        assert_eq!(
            ethers::utils::hex::encode(hash_data(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }
}

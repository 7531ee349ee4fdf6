// src/wallet/key_management.rs
//! Key material and `did:polygon` identifiers.
//!
//! Provides:
//! - Fresh secp256k1 key pairs with their address, base58 public key and DID
//! - Parsing and formatting of `did:polygon[:network]:<address>`
//! - Local transaction signing with a caller-supplied private key
//!
//! Uses the following cryptographic primitives:
//! - secp256k1 curve (via `k256` crate)
//! - Keccak-256 address derivation and EIP-155 signing (via `ethers` crate)
//! - The operating system's cryptographically secure random number generator

use crate::error::{RegistrarError, RegistrarResult};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{transaction::eip2718::TypedTransaction, Address, Bytes, Signature};
use ethers::utils::{hex, secret_key_to_address, to_checksum};
use k256::ecdsa::SigningKey;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use rand::{rngs::OsRng, CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};
use std::{fmt, str::FromStr};

pub const DID_METHOD_PREFIX: &str = "did:polygon";
pub const MAINNET: &str = "mainnet";

/// Rejection sampling bound for secret scalars outside the curve order.
const MAX_KEY_ATTEMPTS: usize = 8;

/// Identity key material handed back to the caller.
///
/// The private key is the caller's secret; nothing in this crate stores it.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct KeyPair {
    /// EIP-55 checksummed `0x` address (42 characters)
    pub address: String,
    /// `0x`-prefixed hex secret scalar
    pub private_key: String,
    /// Base58 of the uncompressed SEC1 public key
    pub public_key_base58: String,
    pub did: String,
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("address", &self.address)
            .field("private_key", &"<redacted>")
            .field("public_key_base58", &self.public_key_base58)
            .field("did", &self.did)
            .finish()
    }
}

/// Generates a key pair for `network` from the OS random source.
///
/// `mainnet` (or an empty label) yields `did:polygon:<address>`; any other
/// label yields `did:polygon:<network>:<address>`.
pub fn create_key_pair(network: &str) -> RegistrarResult<KeyPair> {
    create_key_pair_with_rng(network, &mut OsRng)
}

/// Same as [`create_key_pair`] with an explicit random source.
pub fn create_key_pair_with_rng<R: RngCore + CryptoRng>(
    network: &str,
    rng: &mut R,
) -> RegistrarResult<KeyPair> {
    let mut secret = [0u8; 32];
    for _ in 0..MAX_KEY_ATTEMPTS {
        rng.try_fill_bytes(&mut secret)
            .map_err(|e| RegistrarError::KeyGeneration(e.to_string()))?;
        if let Ok(signing_key) = SigningKey::from_slice(&secret) {
            return Ok(key_pair_from_signing_key(network, &signing_key));
        }
    }
    Err(RegistrarError::KeyGeneration(format!(
        "no valid secp256k1 scalar after {} attempts",
        MAX_KEY_ATTEMPTS
    )))
}

/// Re-derives the public half of an existing hex private key.
pub fn key_pair_from_private_key(network: &str, private_key: &str) -> RegistrarResult<KeyPair> {
    Ok(key_pair_from_signing_key(network, &parse_signing_key(private_key)?))
}

fn key_pair_from_signing_key(network: &str, signing_key: &SigningKey) -> KeyPair {
    let address = secret_key_to_address(signing_key);
    let public_key = signing_key.verifying_key().as_affine().to_encoded_point(false);

    KeyPair {
        address: to_checksum(&address, None),
        private_key: format!("0x{}", hex::encode(signing_key.to_bytes())),
        public_key_base58: bs58::encode(public_key.as_bytes()).into_string(),
        did: PolygonDid::new(network, address).to_string(),
    }
}

/// Parses a hex private key with or without `0x`.
fn parse_signing_key(private_key: &str) -> RegistrarResult<SigningKey> {
    let bytes = hex::decode(private_key.trim().trim_start_matches("0x"))
        .map_err(|e| RegistrarError::Config(format!("Invalid private key hex: {}", e)))?;
    SigningKey::from_slice(&bytes)
        .map_err(|_| RegistrarError::Config("Invalid secp256k1 private key".into()))
}

/// A parsed `did:polygon` identifier.
///
/// Displays as the string it was parsed from, so documents and resource URIs
/// carry the caller's spelling. Equality compares network and address only.
#[derive(Debug, Clone)]
pub struct PolygonDid {
    /// `None` on mainnet
    network: Option<String>,
    address: Address,
    did: String,
}

impl PartialEq for PolygonDid {
    fn eq(&self, other: &Self) -> bool {
        self.network == other.network && self.address == other.address
    }
}

impl Eq for PolygonDid {}

impl Hash for PolygonDid {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.network.hash(state);
        self.address.hash(state);
    }
}

impl PolygonDid {
    pub fn new(network: &str, address: Address) -> Self {
        let network = match network.trim() {
            "" | MAINNET => None,
            label => Some(label.to_string()),
        };
        let checksummed = to_checksum(&address, None);
        let did = match &network {
            Some(network) => format!("{}:{}:{}", DID_METHOD_PREFIX, network, checksummed),
            None => format!("{}:{}", DID_METHOD_PREFIX, checksummed),
        };
        PolygonDid { network, address, did }
    }

    /// Parses `did:polygon:<address>` or `did:polygon:<network>:<address>`.
    pub fn parse(did: &str) -> RegistrarResult<Self> {
        let invalid = |reason: &str| RegistrarError::InvalidDid {
            did: did.to_string(),
            reason: reason.to_string(),
        };

        let segments: Vec<&str> = did.split(':').collect();
        let (network, address) = match segments.as_slice() {
            ["did", "polygon", address] => (None, *address),
            ["did", "polygon", network, address] if !network.is_empty() && *network != MAINNET => {
                (Some(network.to_string()), *address)
            }
            ["did", "polygon", ..] => return Err(invalid("expected did:polygon[:network]:<address>")),
            _ => return Err(invalid("not a did:polygon identifier")),
        };

        if !address.starts_with("0x") || address.len() != 42 {
            return Err(invalid("address must be 0x followed by 40 hex digits"));
        }
        let address = Address::from_str(address).map_err(|e| invalid(&e.to_string()))?;

        Ok(PolygonDid {
            network,
            address,
            did: did.to_string(),
        })
    }

    pub fn network(&self) -> Option<&str> {
        self.network.as_deref()
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Checksummed address, also the resource collection id of this DID.
    pub fn address_string(&self) -> String {
        to_checksum(&self.address, None)
    }
}

impl fmt::Display for PolygonDid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.did)
    }
}

/// Local transaction signer.
///
/// Holds the registrar's signing key for the lifetime of the registrar; the
/// key never leaves this struct except as signatures.
#[derive(Clone)]
pub struct KeyManager {
    wallet: LocalWallet,
}

impl KeyManager {
    pub fn from_private_key(private_key: &str) -> RegistrarResult<Self> {
        Ok(KeyManager {
            wallet: LocalWallet::from(parse_signing_key(private_key)?),
        })
    }

    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    /// Signs a filled transaction and returns its RLP encoding.
    ///
    /// The chain id must already be set so the EIP-155 signature matches the
    /// network the transport submits to.
    pub fn sign_transaction(&self, tx: &TypedTransaction) -> RegistrarResult<Bytes> {
        Ok(tx.rlp_signed(&self.sign(tx)?))
    }

    /// EIP-155 signature over a filled transaction.
    pub fn sign(&self, tx: &TypedTransaction) -> RegistrarResult<Signature> {
        if tx.chain_id().is_none() {
            return Err(RegistrarError::Signing("transaction has no chain id".into()));
        }
        self.wallet
            .sign_transaction_sync(tx)
            .map_err(|e| RegistrarError::Signing(e.to_string()))
    }
}

impl fmt::Debug for KeyManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyManager").field("address", &self.address()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::TransactionRequest;
    use ethers::utils::rlp::Rlp;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_address_shape() {
        let pair = create_key_pair("testnet").unwrap();
        assert_eq!(&pair.address[..2], "0x");
        assert_eq!(pair.address.len(), 42);
        assert!(!pair.public_key_base58.is_empty());
    }

    #[test]
    fn test_testnet_did_segments() {
        let pair = create_key_pair("testnet").unwrap();
        let segments: Vec<&str> = pair.did.split(':').collect();
        assert_eq!(&pair.did[..19], "did:polygon:testnet");
        assert_eq!(&pair.did[20..22], "0x");
        assert_eq!(segments[2], "testnet");
        assert_eq!(segments[3], pair.address);
        assert_eq!(segments[3].len(), 42);
    }

    #[test]
    fn test_mainnet_did_has_no_network_segment() {
        let pair = create_key_pair(MAINNET).unwrap();
        let segments: Vec<&str> = pair.did.split(':').collect();
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[2], pair.address);
    }

    #[test]
    fn test_seeded_rng_is_deterministic() {
        let a = create_key_pair_with_rng("testnet", &mut StdRng::seed_from_u64(7)).unwrap();
        let b = create_key_pair_with_rng("testnet", &mut StdRng::seed_from_u64(7)).unwrap();
        assert_eq!(a, b);

        let again = key_pair_from_private_key("testnet", &a.private_key).unwrap();
        assert_eq!(again, a);
    }

    #[test]
    fn test_public_key_is_uncompressed_sec1() {
        let pair = create_key_pair("testnet").unwrap();
        let bytes = bs58::decode(&pair.public_key_base58).into_vec().unwrap();
        assert_eq!(bytes.len(), 65);
        assert_eq!(bytes[0], 0x04);
    }

    #[test]
    fn test_debug_redacts_private_key() {
        let pair = create_key_pair("testnet").unwrap();
        let printed = format!("{:?}", pair);
        assert!(!printed.contains(&pair.private_key[2..]));
        assert!(printed.contains("<redacted>"));
    }

    #[test]
    fn test_parse_round_trip() {
        let pair = create_key_pair("testnet").unwrap();
        let did = PolygonDid::parse(&pair.did).unwrap();
        assert_eq!(did.network(), Some("testnet"));
        assert_eq!(did.address_string(), pair.address);
        assert_eq!(did.to_string(), pair.did);

        let lower = pair.did.to_lowercase();
        let parsed_lower = PolygonDid::parse(&lower).unwrap();
        assert_eq!(parsed_lower, did);
        assert_eq!(parsed_lower.to_string(), lower);
        assert_eq!(parsed_lower.address_string(), pair.address);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for did in [
            "did:ethr:0x2f65b6a8c1be1a7fa6a0f2c3f6be5d7e8a9b0c1d",
            "did:polygon:testnet:0x1234",
            "did:polygon:testnet:2f65b6a8c1be1a7fa6a0f2c3f6be5d7e8a9b0c1d00",
            "did:polygon:testnet:0xZZ65b6a8c1be1a7fa6a0f2c3f6be5d7e8a9b0c1d",
            "did:polygon:a:b:0x2f65b6a8c1be1a7fa6a0f2c3f6be5d7e8a9b0c1d",
            "did:polygon",
        ] {
            assert!(
                matches!(PolygonDid::parse(did), Err(RegistrarError::InvalidDid { .. })),
                "accepted {did}"
            );
        }
    }

    #[test]
    fn test_signed_transaction_recovers_signer() {
        let pair = create_key_pair("testnet").unwrap();
        let signer = KeyManager::from_private_key(&pair.private_key).unwrap();
        assert_eq!(to_checksum(&signer.address(), None), pair.address);

        let mut tx: TypedTransaction = TransactionRequest::new()
            .from(signer.address())
            .to(Address::repeat_byte(2))
            .nonce(0)
            .gas(100_000)
            .gas_price(1)
            .into();
        assert!(matches!(signer.sign_transaction(&tx), Err(RegistrarError::Signing(_))));

        tx.set_chain_id(80002u64);
        let signed = signer.sign_transaction(&tx).unwrap();
        let (decoded, signature) = TypedTransaction::decode_signed(&Rlp::new(&signed)).unwrap();
        assert_eq!(signature.recover(decoded.sighash()).unwrap(), signer.address());
    }

    #[test]
    fn test_invalid_private_key_is_config_error() {
        assert!(matches!(
            KeyManager::from_private_key("0xnothex"),
            Err(RegistrarError::Config(_))
        ));
        assert!(matches!(
            KeyManager::from_private_key(&"00".repeat(32)),
            Err(RegistrarError::Config(_))
        ));
    }
}

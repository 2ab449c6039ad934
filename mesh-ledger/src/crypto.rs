//! Cryptographic operations for the DAG ledger
//!
//! This module provides:
//! - Ed25519 key pair generation, signing, and verification
//! - SHA-256 content hashing for transactions
//! - The BLAKE3 rolling accumulated hash for the transaction index chain
//! - Checksummed address derivation from public keys

use crate::types::{Address, Hash};
use crate::{Error, Result};
use ed25519_dalek::{Signature as DalekSignature, Signer, SigningKey, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};

/// Seed material for the accumulated hash before any transaction is indexed.
const GENESIS_SEED: &[u8] = b"GENESIS";

/// Ed25519 key pair for signing
#[derive(Debug)]
pub struct KeyPair {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl KeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        let signing_key = SigningKey::from_bytes(&rand::random::<[u8; 32]>());
        let verifying_key = signing_key.verifying_key();

        Self {
            signing_key,
            verifying_key,
        }
    }

    /// Create from seed (32 bytes) - deterministic generation
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(seed);
        let verifying_key = signing_key.verifying_key();

        Self {
            signing_key,
            verifying_key,
        }
    }

    /// Get public key bytes
    pub fn public_key(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }

    /// Get private key bytes (USE WITH CAUTION - should be protected)
    pub fn secret_key(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    /// Checksummed address controlled by this key pair
    pub fn address(&self) -> Address {
        derive_address(&self.public_key())
    }

    /// Sign a message
    pub fn sign(&self, message: &[u8]) -> crate::types::Signature {
        let signature = self.signing_key.sign(message);
        crate::types::Signature::from_bytes(signature.to_bytes())
    }

    /// Verify a signature
    pub fn verify(&self, message: &[u8], signature: &crate::types::Signature) -> Result<()> {
        let dalek_sig = DalekSignature::from_bytes(signature.as_bytes());
        self.verifying_key
            .verify(message, &dalek_sig)
            .map_err(|e| Error::Other(format!("Signature verification failed: {}", e)))
    }
}

/// Verify a signature with a public key
pub fn verify_signature(
    message: &[u8],
    signature: &crate::types::Signature,
    public_key: &[u8; 32],
) -> bool {
    let dalek_sig = DalekSignature::from_bytes(signature.as_bytes());

    let verifying_key = match VerifyingKey::from_bytes(public_key) {
        Ok(key) => key,
        Err(_) => return false,
    };

    verifying_key.verify(message, &dalek_sig).is_ok()
}

/// Hash arbitrary content using SHA-256
pub fn content_hash(data: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(data);
    Hash::from_bytes(hasher.finalize().into())
}

/// Accumulated hash value of the empty index chain
pub fn genesis_accumulated_hash() -> Hash {
    content_hash(GENESIS_SEED)
}

/// Roll the index-chain accumulated hash forward by one entry
///
/// BLAKE3 over `previous || transaction_hash || index` (big-endian index).
/// Sensitive to all three inputs, so any reordering, substitution, or
/// renumbering of the chain changes every later accumulated hash.
pub fn accumulated_hash(previous: &Hash, transaction_hash: &Hash, index: u64) -> Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(previous.as_bytes());
    hasher.update(transaction_hash.as_bytes());
    hasher.update(&index.to_be_bytes());
    Hash::from_bytes(*hasher.finalize().as_bytes())
}

/// Derive the checksummed address for a public key
pub fn derive_address(public_key: &[u8; 32]) -> Address {
    Address::from_digest(*blake3::hash(public_key).as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keypair_generation() {
        let keypair = KeyPair::generate();
        let public_key = keypair.public_key();

        // Public key should be 32 bytes
        assert_eq!(public_key.len(), 32);
    }

    #[test]
    fn test_keypair_from_seed() {
        let seed = [42u8; 32];
        let keypair1 = KeyPair::from_seed(&seed);
        let keypair2 = KeyPair::from_seed(&seed);

        // Same seed should produce same keys
        assert_eq!(keypair1.public_key(), keypair2.public_key());
        assert_eq!(keypair1.address(), keypair2.address());
    }

    #[test]
    fn test_sign_and_verify() {
        let keypair = KeyPair::generate();
        let message = b"test message";

        let signature = keypair.sign(message);
        assert!(keypair.verify(message, &signature).is_ok());

        // Wrong message should fail
        let wrong_message = b"wrong message";
        assert!(keypair.verify(wrong_message, &signature).is_err());
    }

    #[test]
    fn test_verify_signature() {
        let keypair = KeyPair::generate();
        let message = b"test message";
        let signature = keypair.sign(message);
        let public_key = keypair.public_key();

        assert!(verify_signature(message, &signature, &public_key));

        // Wrong public key should fail
        let wrong_keypair = KeyPair::generate();
        let wrong_public_key = wrong_keypair.public_key();
        assert!(!verify_signature(message, &signature, &wrong_public_key));
    }

    #[test]
    fn test_content_hash_deterministic() {
        let data = b"test data";
        let hash1 = content_hash(data);
        let hash2 = content_hash(data);
        assert_eq!(hash1, hash2);

        let hash3 = content_hash(b"different data");
        assert_ne!(hash1, hash3);
    }

    #[test]
    fn test_accumulated_hash_sensitivity() {
        let genesis = genesis_accumulated_hash();
        let transaction = content_hash(b"tx-0");

        let base = accumulated_hash(&genesis, &transaction, 0);

        // Each input changes the result
        assert_ne!(base, accumulated_hash(&transaction, &transaction, 0));
        assert_ne!(base, accumulated_hash(&genesis, &content_hash(b"tx-1"), 0));
        assert_ne!(base, accumulated_hash(&genesis, &transaction, 1));

        // Deterministic
        assert_eq!(base, accumulated_hash(&genesis, &transaction, 0));
    }

    #[test]
    fn test_accumulated_hash_chain_order_matters() {
        let genesis = genesis_accumulated_hash();
        let a = content_hash(b"a");
        let b = content_hash(b"b");

        let chain_ab = accumulated_hash(&accumulated_hash(&genesis, &a, 0), &b, 1);
        let chain_ba = accumulated_hash(&accumulated_hash(&genesis, &b, 0), &a, 1);
        assert_ne!(chain_ab, chain_ba);
    }

    #[test]
    fn test_derive_address_is_checksummed() {
        let keypair = KeyPair::from_seed(&[7u8; 32]);
        let address = derive_address(&keypair.public_key());
        assert!(address.checksum_valid());

        // Different keys map to different addresses
        let other = derive_address(&KeyPair::from_seed(&[8u8; 32]).public_key());
        assert_ne!(address, other);
    }
}

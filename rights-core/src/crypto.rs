//! Cryptographic operations for clause snapshots
//!
//! This module provides:
//! - Ed25519 key pair generation, signing, and verification
//! - SHA-256 digests of clause text
//! - Deterministic key derivation from a configured seed

use crate::{types::Signature, Error, Result};
use ed25519_dalek::{Signature as DalekSignature, Signer, SigningKey, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};

/// Ed25519 key pair used by the registry operator to sign clauses
#[derive(Debug)]
pub struct KeyPair {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl KeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        Self::from_seed(&rand::random::<[u8; 32]>())
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

    /// Parse a 64-character hex seed (as found in configuration)
    pub fn from_hex_seed(seed_hex: &str) -> Result<Self> {
        let bytes = hex::decode(seed_hex.trim().trim_start_matches("0x"))
            .map_err(|e| Error::Config(format!("Invalid signing seed: {}", e)))?;
        let seed = <[u8; 32]>::try_from(bytes.as_slice()).map_err(|_| {
            Error::Config(format!(
                "signing seed must be 32 bytes of hex, found {}",
                bytes.len()
            ))
        })?;

        Ok(Self::from_seed(&seed))
    }

    /// Get public key bytes
    pub fn public_key(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }

    /// Sign a message
    pub fn sign(&self, message: &[u8]) -> Signature {
        let signature = self.signing_key.sign(message);
        Signature::from_bytes(signature.to_bytes())
    }

    /// Verify a signature made by this key pair
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<()> {
        let dalek_sig = to_dalek(signature)?;
        self.verifying_key
            .verify(message, &dalek_sig)
            .map_err(|e| Error::SignatureError(format!("Verification failed: {}", e)))
    }
}

fn to_dalek(signature: &Signature) -> Result<DalekSignature> {
    let bytes: [u8; 64] = signature
        .as_bytes()
        .try_into()
        .map_err(|_| Error::SignatureError("signature must be 64 bytes".to_string()))?;
    Ok(DalekSignature::from_bytes(&bytes))
}

/// Verify a signature with a public key
pub fn verify_signature(message: &[u8], signature: &Signature, public_key: &[u8; 32]) -> bool {
    let dalek_sig = match to_dalek(signature) {
        Ok(sig) => sig,
        Err(_) => return false,
    };

    let verifying_key = match VerifyingKey::from_bytes(public_key) {
        Ok(key) => key,
        Err(_) => return false,
    };

    verifying_key.verify(message, &dalek_sig).is_ok()
}

/// Hash arbitrary bytes using SHA-256
pub fn hash_bytes(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Digest of a clause snapshot
pub fn clause_digest(clause: &str) -> [u8; 32] {
    hash_bytes(clause.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keypair_from_seed() {
        let seed = [42u8; 32];
        let keypair1 = KeyPair::from_seed(&seed);
        let keypair2 = KeyPair::from_seed(&seed);

        assert_eq!(keypair1.public_key(), keypair2.public_key());
    }

    #[test]
    fn test_keypair_from_hex_seed() {
        let seed_hex = "2a".repeat(32);
        let from_hex = KeyPair::from_hex_seed(&seed_hex).unwrap();
        let from_bytes = KeyPair::from_seed(&[0x2a; 32]);
        assert_eq!(from_hex.public_key(), from_bytes.public_key());

        let prefixed = KeyPair::from_hex_seed(&format!(" 0x{} ", seed_hex)).unwrap();
        assert_eq!(prefixed.public_key(), from_bytes.public_key());

        assert!(matches!(KeyPair::from_hex_seed("abcd"), Err(Error::Config(_))));
        assert!(matches!(
            KeyPair::from_hex_seed(&"2a".repeat(33)),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            KeyPair::from_hex_seed(&"zz".repeat(32)),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_sign_and_verify() {
        let keypair = KeyPair::generate();
        let digest = clause_digest("The Artist: 0xa11ce");

        let signature = keypair.sign(&digest);
        assert!(keypair.verify(&digest, &signature).is_ok());
        assert!(verify_signature(&digest, &signature, &keypair.public_key()));

        let other = clause_digest("The Artist: 0xb0b");
        assert!(keypair.verify(&other, &signature).is_err());

        let wrong_keypair = KeyPair::generate();
        assert!(!verify_signature(&digest, &signature, &wrong_keypair.public_key()));
    }

    #[test]
    fn test_clause_digest_deterministic() {
        assert_eq!(clause_digest("terms"), clause_digest("terms"));
        assert_ne!(clause_digest("terms"), clause_digest("other terms"));
    }
}

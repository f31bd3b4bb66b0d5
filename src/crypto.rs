//! Cryptographic primitives for RelayChain
//!
//! Accounts are identified by their hex-encoded compressed secp256k1 public
//! key. Clients sign a SHA-256 message digest; the balance service verifies
//! that signature against the sender's key.

use crate::error::ChainError;
use once_cell::sync::Lazy;
use rand::rngs::OsRng;
use secp256k1::{
    constants::{COMPACT_SIGNATURE_SIZE, PUBLIC_KEY_SIZE, SECRET_KEY_SIZE},
    ecdsa::Signature,
    All, Message, PublicKey, Secp256k1, SecretKey,
};
use sha2::{Digest, Sha256};

/// A thread-safe, lazily initialized Secp256k1 context.
static SECP256K1_CONTEXT: Lazy<Secp256k1<All>> = Lazy::new(Secp256k1::new);

/// Hex-encoded compressed public key.
pub type Address = String;

/// SHA-256 of `data`, hex encoded.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Checks that `address` decodes to a valid compressed public key.
pub fn validate_address(address: &str) -> Result<(), ChainError> {
    parse_public_key(address).map(|_| ())
}

fn parse_public_key(address: &str) -> Result<PublicKey, ChainError> {
    let bytes = hex::decode(address)
        .map_err(|e| ChainError::CryptoError(format!("Invalid hex address: {}", e)))?;
    if bytes.len() != PUBLIC_KEY_SIZE {
        return Err(ChainError::CryptoError(format!(
            "Public key must be exactly {} bytes (compressed), got {}",
            PUBLIC_KEY_SIZE,
            bytes.len()
        )));
    }
    PublicKey::from_slice(&bytes)
        .map_err(|e| ChainError::CryptoError(format!("Invalid public key: {}", e)))
}

fn parse_digest(message_hash: &str) -> Result<Message, ChainError> {
    let digest = hex::decode(message_hash)
        .map_err(|e| ChainError::CryptoError(format!("Invalid message hash: {}", e)))?;
    Message::from_digest_slice(&digest)
        .map_err(|e| ChainError::CryptoError(format!("Failed to create message: {}", e)))
}

#[derive(Debug, Clone)]
pub struct KeyPair {
    pub secret_key: SecretKey,
    pub public_key: PublicKey,
}

impl KeyPair {
    /// Generates a new random KeyPair using the OS random number generator.
    pub fn generate() -> Self {
        let secret_key = SecretKey::new(&mut OsRng);
        Self::from_secret_key(secret_key)
    }

    pub fn from_secret_key(secret_key: SecretKey) -> Self {
        let public_key = PublicKey::from_secret_key(&SECP256K1_CONTEXT, &secret_key);
        KeyPair {
            secret_key,
            public_key,
        }
    }

    /// Creates a KeyPair from raw secret key bytes.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, ChainError> {
        let secret_key = SecretKey::from_slice(bytes).map_err(|e| {
            if bytes.len() != SECRET_KEY_SIZE {
                ChainError::CryptoError(format!(
                    "Secret key must be {} bytes, got {}",
                    SECRET_KEY_SIZE,
                    bytes.len()
                ))
            } else {
                ChainError::CryptoError(format!("Invalid secret key bytes: {}", e))
            }
        })?;

        Ok(Self::from_secret_key(secret_key))
    }

    pub fn from_secret_hex(secret_hex: &str) -> Result<Self, ChainError> {
        let bytes = hex::decode(secret_hex.trim())
            .map_err(|e| ChainError::CryptoError(format!("Invalid secret key hex: {}", e)))?;
        Self::from_secret_bytes(&bytes)
    }

    /// The account address: hex of the compressed public key.
    pub fn address(&self) -> Address {
        hex::encode(self.public_key.serialize())
    }

    pub fn secret_hex(&self) -> String {
        hex::encode(self.secret_key.secret_bytes())
    }

    /// Signs a 32-byte digest given as hex and returns the compact signature as hex.
    pub fn sign_digest(&self, message_hash: &str) -> Result<String, ChainError> {
        let message = parse_digest(message_hash)?;
        let signature = SECP256K1_CONTEXT.sign_ecdsa(&message, &self.secret_key);
        Ok(hex::encode(signature.serialize_compact()))
    }

    /// Hashes `message` and signs the digest. Returns `(message_hash, signature)`.
    pub fn sign(&self, message: &[u8]) -> Result<(String, String), ChainError> {
        let message_hash = sha256_hex(message);
        let signature = self.sign_digest(&message_hash)?;
        Ok((message_hash, signature))
    }
}

/// Verifies a hex signature (compact or DER) over a hex digest against the
/// hex-encoded public key of `address`.
pub fn verify_signature(
    address: &str,
    message_hash: &str,
    signature_hex: &str,
) -> Result<(), ChainError> {
    let public_key = parse_public_key(address)?;
    let message = parse_digest(message_hash)?;

    let signature_bytes = hex::decode(signature_hex)
        .map_err(|e| ChainError::CryptoError(format!("Invalid signature hex: {}", e)))?;
    let signature = if signature_bytes.len() == COMPACT_SIGNATURE_SIZE {
        Signature::from_compact(&signature_bytes)
    } else {
        Signature::from_der(&signature_bytes)
    }
    .map_err(|e| ChainError::CryptoError(format!("Invalid signature: {}", e)))?;

    SECP256K1_CONTEXT
        .verify_ecdsa(&message, &signature, &public_key)
        .map_err(|_| ChainError::CryptoError("Signature verification failed".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_is_compressed_public_key() {
        let keypair = KeyPair::generate();
        let address = keypair.address();
        assert_eq!(address.len(), PUBLIC_KEY_SIZE * 2);
        assert!(validate_address(&address).is_ok());
    }

    #[test]
    fn test_secret_hex_round_trip() {
        let keypair = KeyPair::generate();
        let restored = KeyPair::from_secret_hex(&keypair.secret_hex()).unwrap();
        assert_eq!(keypair.address(), restored.address());
    }

    #[test]
    fn test_signing_and_verification() {
        let keypair = KeyPair::generate();
        let (message_hash, signature) = keypair.sign(b"send 10 to bob").unwrap();

        assert_eq!(signature.len(), COMPACT_SIGNATURE_SIZE * 2);
        assert!(verify_signature(&keypair.address(), &message_hash, &signature).is_ok());
    }

    #[test]
    fn test_der_signature_accepted() {
        let keypair = KeyPair::generate();
        let message_hash = sha256_hex(b"der encoded");
        let message = parse_digest(&message_hash).unwrap();
        let der = SECP256K1_CONTEXT
            .sign_ecdsa(&message, &keypair.secret_key)
            .serialize_der();

        let result = verify_signature(&keypair.address(), &message_hash, &hex::encode(&der[..]));
        assert!(result.is_ok());
    }

    #[test]
    fn test_wrong_key_rejected() {
        let alice = KeyPair::generate();
        let mallory = KeyPair::generate();
        let (message_hash, signature) = alice.sign(b"payload").unwrap();

        let result = verify_signature(&mallory.address(), &message_hash, &signature);
        assert_eq!(
            result.unwrap_err().to_string(),
            "Cryptographic error: Signature verification failed"
        );
    }

    #[test]
    fn test_tampered_digest_rejected() {
        let keypair = KeyPair::generate();
        let (_, signature) = keypair.sign(b"original").unwrap();
        let tampered = sha256_hex(b"tampered");

        assert!(verify_signature(&keypair.address(), &tampered, &signature).is_err());
    }

    #[test]
    fn test_malformed_inputs() {
        let keypair = KeyPair::generate();
        let (message_hash, signature) = keypair.sign(b"x").unwrap();

        let short_key = &keypair.address()[2..];
        assert!(verify_signature(short_key, &message_hash, &signature)
            .unwrap_err()
            .to_string()
            .contains("Public key must be exactly"));
        assert!(verify_signature(&keypair.address(), "zz", &signature).is_err());
        assert!(verify_signature(&keypair.address(), &message_hash, "00").is_err());
    }

    #[test]
    fn test_from_secret_bytes_invalid_length() {
        let short_bytes = [0u8; SECRET_KEY_SIZE - 1];
        let result = KeyPair::from_secret_bytes(&short_bytes);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Secret key must be"));
    }
}

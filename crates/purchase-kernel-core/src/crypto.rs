//! Ed25519 key material for receipt signatures.
//!
//! The store signs each receipt with its private key and the developer ships
//! the matching public key. Only the public half is needed to verify; the
//! [`Keypair`] exists so fakes and tests can produce signed receipts.

use std::fmt;

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Key receipts are checked against.
///
/// Serialized as hex. Deserializing goes through [`Ed25519PublicKey::from_hex`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ed25519PublicKey([u8; 32]);

impl Ed25519PublicKey {
    /// Accept `bytes` only if they encode a usable verifying key.
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self> {
        VerifyingKey::from_bytes(&bytes).map_err(|_| CoreError::InvalidPublicKey)?;
        Ok(Self(bytes))
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let bytes: [u8; 32] = bytes.try_into().map_err(|_| CoreError::InvalidPublicKey)?;
        Self::from_bytes(bytes)
    }

    /// Parse the hex form developers usually paste into their config.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s.trim()).map_err(|_| CoreError::InvalidPublicKey)?;
        Self::from_slice(&bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Strict Ed25519 verification of `signature` over `message`.
    pub fn verify(&self, message: &[u8], signature: &Ed25519Signature) -> Result<()> {
        let key = VerifyingKey::from_bytes(&self.0).map_err(|_| CoreError::InvalidPublicKey)?;
        key.verify_strict(message, &Signature::from_bytes(&signature.0))
            .map_err(|_| CoreError::InvalidSignature)
    }
}

impl TryFrom<String> for Ed25519PublicKey {
    type Error = CoreError;

    fn try_from(s: String) -> Result<Self> {
        Self::from_hex(&s)
    }
}

impl From<Ed25519PublicKey> for String {
    fn from(key: Ed25519PublicKey) -> Self {
        key.to_hex()
    }
}

impl fmt::Debug for Ed25519PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ed25519PublicKey({}..)", hex::encode(&self.0[..6]))
    }
}

impl fmt::Display for Ed25519PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Detached signature as carried next to a receipt.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Ed25519Signature([u8; 64]);

impl Ed25519Signature {
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        bytes
            .try_into()
            .map(Self)
            .map_err(|_| CoreError::InvalidSignature)
    }

    pub const fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Ed25519Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ed25519Signature({}..)", hex::encode(&self.0[..6]))
    }
}

/// A store signing key.
#[derive(Clone)]
pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut rand::thread_rng()),
        }
    }

    /// Deterministic keypair, for fixtures.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    pub fn public_key(&self) -> Ed25519PublicKey {
        Ed25519PublicKey(self.signing_key.verifying_key().to_bytes())
    }

    pub fn sign(&self, message: &[u8]) -> Ed25519Signature {
        Ed25519Signature(self.signing_key.sign(message).to_bytes())
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("public", &self.public_key())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_then_verify() {
        let keypair = Keypair::from_seed(&[0x42; 32]);
        let receipt = br#"{"productId":"gold"}"#;
        let signature = keypair.sign(receipt);

        assert!(keypair.public_key().verify(receipt, &signature).is_ok());
        assert!(matches!(
            keypair.public_key().verify(br#"{"productId":"Gold"}"#, &signature),
            Err(CoreError::InvalidSignature)
        ));
    }

    #[test]
    fn test_from_seed_is_deterministic() {
        assert_eq!(
            Keypair::from_seed(&[7; 32]).public_key(),
            Keypair::from_seed(&[7; 32]).public_key()
        );
        assert_ne!(
            Keypair::from_seed(&[7; 32]).public_key(),
            Keypair::from_seed(&[8; 32]).public_key()
        );
    }

    #[test]
    fn test_hex_key_with_whitespace() {
        let key = Keypair::generate().public_key();
        let pasted = format!("  {}\n", key.to_hex());
        assert_eq!(Ed25519PublicKey::from_hex(&pasted).unwrap(), key);
        assert!(Ed25519PublicKey::from_hex("zz").is_err());
    }

    #[test]
    fn test_wrong_lengths_rejected() {
        assert!(matches!(
            Ed25519PublicKey::from_slice(&[0u8; 31]),
            Err(CoreError::InvalidPublicKey)
        ));
        assert!(matches!(
            Ed25519Signature::from_slice(&[0u8; 63]),
            Err(CoreError::InvalidSignature)
        ));
    }

    #[test]
    fn test_deserialized_key_is_validated() {
        let key = Keypair::from_seed(&[3; 32]).public_key();
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, format!("\"{}\"", key.to_hex()));
        assert_eq!(serde_json::from_str::<Ed25519PublicKey>(&json).unwrap(), key);

        // y = 2 is not the encoding of any curve point.
        let off_curve = format!("\"02{}\"", "00".repeat(31));
        assert!(serde_json::from_str::<Ed25519PublicKey>(&off_curve).is_err());
        assert!(serde_json::from_str::<Ed25519PublicKey>(&format!("{:?}", [0u8; 32])).is_err());
    }

    #[test]
    fn test_debug_does_not_dump_key() {
        let key = Keypair::from_seed(&[1; 32]).public_key();
        let debug = format!("{key:?}");
        assert!(debug.len() < key.to_hex().len());
    }
}

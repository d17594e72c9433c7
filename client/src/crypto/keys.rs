//! # Ed25519 Keys
//!
//! Thin wrappers over `ed25519-dalek` used by every secret manager backend.
//! The keypair never leaves the backend that derived it; what crosses module
//! boundaries is an [`Ed25519PublicKey`] and an [`Ed25519Signature`].
//!
//! Key bytes are never logged. The `Debug` impl of [`Ed25519Keypair`] prints
//! the public half only.

use ed25519_dalek::{Signature as DalekSignature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::config::SIGNATURE_LENGTH;
use crate::utils::serde_hex;

/// Errors that can occur during key operations.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid public key bytes: not a valid Ed25519 point")]
    InvalidPublicKey,

    #[error("invalid signature bytes")]
    InvalidSignature,
}

// ---------------------------------------------------------------------------
// Keypair
// ---------------------------------------------------------------------------

/// An Ed25519 signing key derived by a secret manager.
///
/// Intentionally not `Serialize`: the only way out of this type is
/// [`sign`](Self::sign) and [`public_key`](Self::public_key).
pub struct Ed25519Keypair {
    signing_key: SigningKey,
}

impl Ed25519Keypair {
    /// Builds a keypair from a 32-byte secret scalar seed, as produced by
    /// SLIP-10 derivation.
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

impl fmt::Debug for Ed25519Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ed25519Keypair")
            .field("public_key", &self.public_key())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Public Key
// ---------------------------------------------------------------------------

/// The public half of an Ed25519 key, hex-encoded on the wire.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ed25519PublicKey(#[serde(with = "serde_hex")] pub [u8; 32]);

impl Ed25519PublicKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Verify a signature over `message`. Malformed points simply fail.
    pub fn verify(&self, message: &[u8], signature: &Ed25519Signature) -> bool {
        let Ok(verifying_key) = VerifyingKey::from_bytes(&self.0) else {
            return false;
        };
        let sig = DalekSignature::from_bytes(&signature.0);
        verifying_key.verify(message, &sig).is_ok()
    }

    /// Parses a `0x`-prefixed or bare hex public key and checks it is a
    /// valid curve point.
    pub fn from_hex(hex_str: &str) -> Result<Self, KeyError> {
        let bytes = crate::utils::decode_hex_array::<32>(hex_str)
            .map_err(|_| KeyError::InvalidPublicKey)?;
        VerifyingKey::from_bytes(&bytes).map_err(|_| KeyError::InvalidPublicKey)?;
        Ok(Self(bytes))
    }

    pub fn to_hex(&self) -> String {
        crate::utils::encode_hex(&self.0)
    }
}

impl fmt::Debug for Ed25519PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ed25519PublicKey({})", self.to_hex())
    }
}

// ---------------------------------------------------------------------------
// Signature
// ---------------------------------------------------------------------------

/// A 64-byte Ed25519 signature.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ed25519Signature(#[serde(with = "serde_hex")] pub [u8; SIGNATURE_LENGTH]);

impl Ed25519Signature {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, KeyError> {
        let arr: [u8; SIGNATURE_LENGTH] =
            bytes.try_into().map_err(|_| KeyError::InvalidSignature)?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LENGTH] {
        &self.0
    }
}

impl fmt::Debug for Ed25519Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ed25519Signature({})", crate::utils::encode_hex(&self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify() {
        let kp = Ed25519Keypair::from_seed(&[7u8; 32]);
        let sig = kp.sign(b"essence");
        assert!(kp.public_key().verify(b"essence", &sig));
        assert!(!kp.public_key().verify(b"tampered", &sig));
    }

    #[test]
    fn signatures_are_deterministic() {
        let kp = Ed25519Keypair::from_seed(&[1u8; 32]);
        assert_eq!(kp.sign(b"m"), kp.sign(b"m"));
    }

    #[test]
    fn public_key_hex_round_trip() {
        let pk = Ed25519Keypair::from_seed(&[3u8; 32]).public_key();
        let parsed = Ed25519PublicKey::from_hex(&pk.to_hex()).unwrap();
        assert_eq!(parsed, pk);
        assert!(pk.to_hex().starts_with("0x"));
    }

    #[test]
    fn rejects_wrong_length_public_key() {
        assert!(Ed25519PublicKey::from_hex("0xabcd").is_err());
    }

    #[test]
    fn debug_never_prints_secret() {
        let kp = Ed25519Keypair::from_seed(&[0x42u8; 32]);
        let debug = format!("{kp:?}");
        assert!(!debug.contains(&hex::encode([0x42u8; 32])));
    }
}

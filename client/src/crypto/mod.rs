//! # Cryptographic Primitives
//!
//! Everything secret-adjacent in the client flows through here:
//!
//! - **Ed25519** signatures over transaction essences.
//! - **SLIP-10** hardened derivation of those keys from a BIP39 seed.
//! - **BLAKE3** for every identifier and the proof-of-work digest.
//! - **AES-256-GCM + Argon2id** for the encrypted vault.
//!
//! All of it wraps audited crates; nothing here implements a primitive.

pub mod encryption;
pub mod hash;
pub mod keys;
pub mod slip10;

pub use encryption::{decrypt, encrypt};
pub use hash::{blake3_hash, blake3_hash_parts};
pub use keys::{Ed25519Keypair, Ed25519PublicKey, Ed25519Signature};
pub use slip10::{derive_keypair, Bip44};

//! # SLIP-10 Ed25519 Derivation
//!
//! Hierarchical key derivation for Ed25519. Only hardened children exist on
//! this curve, so every path segment is hardened:
//!
//! ```text
//! m / 44' / coin_type' / account' / internal' / address_index'
//! ```
//!
//! Each step is `HMAC-SHA512(chain_code, 0x00 || key || ser32(index | 2^31))`,
//! split into the child key (left 32 bytes) and child chain code (right 32).

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha512;
use zeroize::Zeroizing;

use super::keys::Ed25519Keypair;
use crate::error::{Error, Result};

type HmacSha512 = Hmac<Sha512>;

const ED25519_CURVE_KEY: &[u8] = b"ed25519 seed";
const HARDENED: u32 = 1 << 31;
const BIP44_PURPOSE: u32 = 44;

/// Coordinates of a key on the BIP44 tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bip44 {
    pub coin_type: u32,
    pub account: u32,
    /// 0 for public addresses, 1 for internal (change) addresses.
    pub change: u32,
    pub address_index: u32,
}

impl Bip44 {
    pub fn new(coin_type: u32) -> Self {
        Self {
            coin_type,
            account: 0,
            change: 0,
            address_index: 0,
        }
    }

    pub fn with_account(mut self, account: u32) -> Self {
        self.account = account;
        self
    }

    pub fn with_change(mut self, internal: bool) -> Self {
        self.change = internal as u32;
        self
    }

    pub fn with_address_index(mut self, index: u32) -> Self {
        self.address_index = index;
        self
    }

    /// The full path as segment indices before hardening.
    pub fn segments(&self) -> [u32; 5] {
        [
            BIP44_PURPOSE,
            self.coin_type,
            self.account,
            self.change,
            self.address_index,
        ]
    }

    /// Fails if any segment cannot be hardened.
    pub fn validate(&self) -> Result<()> {
        for segment in self.segments() {
            if segment >= HARDENED {
                return Err(Error::Derivation(format!(
                    "path segment {segment} exceeds the hardened index range"
                )));
            }
        }
        Ok(())
    }
}

impl std::fmt::Display for Bip44 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "m/44'/{}'/{}'/{}'/{}'",
            self.coin_type, self.account, self.change, self.address_index
        )
    }
}

/// An extended private key: key bytes plus chain code, wiped on drop.
struct ExtendedKey {
    key: Zeroizing<[u8; 32]>,
    chain_code: Zeroizing<[u8; 32]>,
}

impl ExtendedKey {
    fn from_hmac(output: &[u8]) -> Self {
        let mut key = Zeroizing::new([0u8; 32]);
        let mut chain_code = Zeroizing::new([0u8; 32]);
        key.copy_from_slice(&output[..32]);
        chain_code.copy_from_slice(&output[32..64]);
        Self { key, chain_code }
    }

    fn master(seed: &[u8]) -> Result<Self> {
        let mut mac = HmacSha512::new_from_slice(ED25519_CURVE_KEY)
            .map_err(|_| Error::Derivation("hmac initialisation failed".into()))?;
        mac.update(seed);
        Ok(Self::from_hmac(&mac.finalize().into_bytes()))
    }

    fn child(&self, index: u32) -> Result<Self> {
        let mut mac = HmacSha512::new_from_slice(&self.chain_code[..])
            .map_err(|_| Error::Derivation("hmac initialisation failed".into()))?;
        mac.update(&[0u8]);
        mac.update(&self.key[..]);
        mac.update(&(index | HARDENED).to_be_bytes());
        Ok(Self::from_hmac(&mac.finalize().into_bytes()))
    }
}

/// Derives the Ed25519 keypair at `chain` from a BIP39 seed.
pub fn derive_keypair(seed: &[u8], chain: &Bip44) -> Result<Ed25519Keypair> {
    chain.validate()?;
    let mut node = ExtendedKey::master(seed)?;
    for segment in chain.segments() {
        node = node.child(segment)?;
    }
    Ok(Ed25519Keypair::from_seed(&node.key))
}

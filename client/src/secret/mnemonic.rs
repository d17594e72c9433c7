//! Seed-backed secret manager, built from a BIP39 mnemonic or a raw hex
//! seed. The seed lives in memory for the lifetime of the manager and is
//! wiped on drop.

use std::fmt;

use bip39::{Language, Mnemonic, MnemonicType, Seed};
use zeroize::Zeroizing;

use crate::crypto::keys::Ed25519Keypair;
use crate::crypto::slip10::{derive_keypair, Bip44};
use crate::error::{Error, Result};
use crate::utils::{decode_hex, encode_hex};

pub struct MnemonicSecretManager {
    seed: Zeroizing<Vec<u8>>,
}

impl fmt::Debug for MnemonicSecretManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MnemonicSecretManager(<redacted>)")
    }
}

impl MnemonicSecretManager {
    pub fn try_from_mnemonic(mnemonic: &str) -> Result<Self> {
        Ok(Self {
            seed: mnemonic_to_seed(mnemonic)?,
        })
    }

    pub fn try_from_hex_seed(hex_seed: &str) -> Result<Self> {
        let seed = Zeroizing::new(decode_hex(hex_seed).map_err(|_| invalid_seed())?);
        if !(16..=64).contains(&seed.len()) {
            return Err(invalid_seed());
        }
        Ok(Self { seed })
    }

    pub(crate) fn keypair(&self, chain: &Bip44) -> Result<Ed25519Keypair> {
        derive_keypair(&self.seed, chain)
    }
}

fn invalid_seed() -> Error {
    Error::Validation("hex seed must be 16 to 64 bytes of hex".into())
}

/// Parses a phrase, tolerating extra whitespace. The phrase never appears
/// in the error.
fn parse_mnemonic(mnemonic: &str) -> Result<Mnemonic> {
    let normalized = Zeroizing::new(mnemonic.split_whitespace().collect::<Vec<_>>().join(" "));
    Mnemonic::from_phrase(&normalized, Language::English)
        .map_err(|_| Error::Validation("invalid mnemonic".into()))
}

pub(crate) fn mnemonic_to_seed(mnemonic: &str) -> Result<Zeroizing<Vec<u8>>> {
    let mnemonic = parse_mnemonic(mnemonic)?;
    let seed = Seed::new(&mnemonic, "");
    Ok(Zeroizing::new(seed.as_bytes().to_vec()))
}

/// Checks that a phrase is a valid English BIP39 mnemonic.
pub fn verify_mnemonic(mnemonic: &str) -> Result<()> {
    parse_mnemonic(mnemonic).map(|_| ())
}

/// A fresh 24-word English mnemonic.
pub fn generate_mnemonic() -> String {
    Mnemonic::new(MnemonicType::Words24, Language::English)
        .phrase()
        .to_string()
}

/// The BIP39 seed of a mnemonic as `0x` hex.
pub fn mnemonic_to_hex_seed(mnemonic: &str) -> Result<String> {
    Ok(encode_hex(&mnemonic_to_seed(mnemonic)?))
}

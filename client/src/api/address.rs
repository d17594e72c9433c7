//! Address generation and Bech32 conversions.

use crate::address::{Address, Ed25519Address};
use crate::block::id::BlockId;
use crate::block::Block;
use crate::client::Client;
use crate::crypto::keys::Ed25519PublicKey;
use crate::error::{Error, Result};
use crate::secret::{GenerateAddressesOptions, SecretManager};
use crate::utils::{decode_hex_array, encode_hex};

/// Hex of the hash part of a Bech32 address, without the kind byte.
pub fn bech32_to_hex(bech32: &str) -> Result<String> {
    let (_, address) = Address::try_from_bech32(bech32)?;
    Ok(encode_hex(&address.to_raw()[1..]))
}

/// Bech32 of an Ed25519 address given as 32 bytes of hex.
pub fn hex_to_bech32(hex: &str, bech32_hrp: &str) -> Result<String> {
    let address = Address::Ed25519(Ed25519Address(decode_hex_array(hex)?));
    Ok(address.to_bech32(bech32_hrp)?)
}

/// Bech32 of the Ed25519 address of a hex public key.
pub fn hex_public_key_to_bech32_address(hex: &str, bech32_hrp: &str) -> Result<String> {
    let public_key = Ed25519PublicKey(decode_hex_array(hex)?);
    let address = Address::Ed25519(Ed25519Address::from_public_key(&public_key));
    Ok(address.to_bech32(bech32_hrp)?)
}

pub fn is_address_valid(address: &str) -> bool {
    Address::is_valid_bech32(address)
}

pub fn block_id(block: &Block) -> BlockId {
    block.id()
}

impl Client {
    /// Bech32 addresses of `secret_manager`, under `options.bech32_hrp` or
    /// the network's HRP.
    pub async fn generate_addresses(
        &self,
        secret_manager: &SecretManager,
        options: &GenerateAddressesOptions,
    ) -> Result<Vec<String>> {
        let hrp = match &options.bech32_hrp {
            Some(hrp) => hrp.clone(),
            None => self.get_bech32_hrp().await?,
        };
        let _device = self.lock_device(secret_manager)?;
        secret_manager.generate_addresses(options, &hrp).await
    }

    pub async fn hex_to_bech32(&self, hex: &str, bech32_hrp: Option<&str>) -> Result<String> {
        match bech32_hrp {
            Some(hrp) => hex_to_bech32(hex, hrp),
            None => hex_to_bech32(hex, &self.get_bech32_hrp().await?),
        }
    }

    pub async fn hex_public_key_to_bech32_address(
        &self,
        hex: &str,
        bech32_hrp: Option<&str>,
    ) -> Result<String> {
        match bech32_hrp {
            Some(hrp) => hex_public_key_to_bech32_address(hex, hrp),
            None => hex_public_key_to_bech32_address(hex, &self.get_bech32_hrp().await?),
        }
    }

    /// Parses a Bech32 address and checks it belongs to this network.
    pub async fn parse_bech32_address(&self, address: &str) -> Result<Address> {
        let hrp = self.get_bech32_hrp().await?;
        Address::try_from_bech32_with_hrp(address, &hrp).map_err(|e| match e {
            crate::address::AddressError::HrpMismatch { .. } => {
                Error::Validation(format!("{address} is not an address of this network ({hrp})"))
            }
            other => other.into(),
        })
    }
}

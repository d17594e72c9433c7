//! # Addresses
//!
//! An address is who can unlock an output: an Ed25519 key hash, an alias or
//! an NFT. On the wire it is Bech32 with a network-specific HRP:
//!
//! ```text
//! rms1 qz...      hrp "rms", data = [kind] ++ 32 bytes
//! ```
//!
//! | kind | variant  | 32 bytes                        |
//! |------|----------|---------------------------------|
//! | 0    | Ed25519  | BLAKE3 of the public key        |
//! | 8    | Alias    | alias id                        |
//! | 16   | Nft      | nft id                          |

use bech32::{Bech32, Hrp};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::block::id::{AliasId, NftId};
use crate::block::packable::{Packable, UnpackError, Unpacker};
use crate::crypto::hash::blake3_hash;
use crate::crypto::keys::Ed25519PublicKey;
use crate::utils::serde_hex;

/// Errors from parsing or encoding addresses.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("bech32 decode error: {0}")]
    Bech32Decode(String),

    #[error("invalid bech32 hrp `{0}`")]
    InvalidHrp(String),

    #[error("unexpected hrp: expected `{expected}`, got `{actual}`")]
    HrpMismatch { expected: String, actual: String },

    #[error("unknown address kind {0}")]
    InvalidKind(u8),

    #[error("invalid address length: expected 33 bytes, got {0}")]
    InvalidLength(usize),
}

// ---------------------------------------------------------------------------
// Address variants
// ---------------------------------------------------------------------------

/// BLAKE3 hash of an Ed25519 public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Ed25519Address(#[serde(with = "serde_hex")] pub [u8; 32]);

impl Ed25519Address {
    pub const KIND: u8 = 0;

    pub fn from_public_key(public_key: &Ed25519PublicKey) -> Self {
        Self(blake3_hash(public_key.as_bytes()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AliasAddress(pub AliasId);

impl AliasAddress {
    pub const KIND: u8 = 8;

    pub fn alias_id(&self) -> &AliasId {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NftAddress(pub NftId);

impl NftAddress {
    pub const KIND: u8 = 16;
}

/// Any address that can own an output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "AddressRepr", into = "AddressDto")]
pub enum Address {
    Ed25519(Ed25519Address),
    Alias(AliasAddress),
    Nft(NftAddress),
}

impl Address {
    pub fn kind(&self) -> u8 {
        match self {
            Address::Ed25519(_) => Ed25519Address::KIND,
            Address::Alias(_) => AliasAddress::KIND,
            Address::Nft(_) => NftAddress::KIND,
        }
    }

    fn hash_bytes(&self) -> &[u8; 32] {
        match self {
            Address::Ed25519(a) => &a.0,
            Address::Alias(a) => a.0.as_bytes(),
            Address::Nft(a) => a.0.as_bytes(),
        }
    }

    fn from_parts(kind: u8, bytes: [u8; 32]) -> Result<Self, AddressError> {
        match kind {
            Ed25519Address::KIND => Ok(Address::Ed25519(Ed25519Address(bytes))),
            AliasAddress::KIND => Ok(Address::Alias(AliasAddress(AliasId(bytes)))),
            NftAddress::KIND => Ok(Address::Nft(NftAddress(NftId(bytes)))),
            other => Err(AddressError::InvalidKind(other)),
        }
    }

    /// `[kind] ++ 32 bytes`, the payload inside the Bech32 string.
    pub fn to_raw(&self) -> [u8; 33] {
        let mut raw = [0u8; 33];
        raw[0] = self.kind();
        raw[1..].copy_from_slice(self.hash_bytes());
        raw
    }

    pub fn from_raw(raw: &[u8]) -> Result<Self, AddressError> {
        if raw.len() != 33 {
            return Err(AddressError::InvalidLength(raw.len()));
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&raw[1..]);
        Self::from_parts(raw[0], bytes)
    }

    /// Encodes the address for the network identified by `hrp`.
    pub fn to_bech32(&self, hrp: &str) -> Result<String, AddressError> {
        let hrp = Hrp::parse(hrp).map_err(|_| AddressError::InvalidHrp(hrp.to_string()))?;
        bech32::encode::<Bech32>(hrp, &self.to_raw())
            .map_err(|e| AddressError::Bech32Decode(e.to_string()))
    }

    /// Decodes a Bech32 address, returning its HRP alongside.
    pub fn try_from_bech32(addr: &str) -> Result<(String, Self), AddressError> {
        let (hrp, data) =
            bech32::decode(addr).map_err(|e| AddressError::Bech32Decode(e.to_string()))?;
        Ok((hrp.to_lowercase(), Self::from_raw(&data)?))
    }

    /// Decodes a Bech32 address and checks it belongs to the expected network.
    pub fn try_from_bech32_with_hrp(addr: &str, expected_hrp: &str) -> Result<Self, AddressError> {
        let (hrp, address) = Self::try_from_bech32(addr)?;
        if hrp != expected_hrp {
            return Err(AddressError::HrpMismatch {
                expected: expected_hrp.to_string(),
                actual: hrp,
            });
        }
        Ok(address)
    }

    pub fn is_valid_bech32(addr: &str) -> bool {
        Self::try_from_bech32(addr).is_ok()
    }

    pub fn as_ed25519(&self) -> Option<&Ed25519Address> {
        match self {
            Address::Ed25519(a) => Some(a),
            _ => None,
        }
    }
}

impl From<Ed25519Address> for Address {
    fn from(a: Ed25519Address) -> Self {
        Address::Ed25519(a)
    }
}

impl From<AliasAddress> for Address {
    fn from(a: AliasAddress) -> Self {
        Address::Alias(a)
    }
}

impl From<NftAddress> for Address {
    fn from(a: NftAddress) -> Self {
        Address::Nft(a)
    }
}

impl Packable for Address {
    fn pack(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.to_raw());
    }

    fn unpack(unpacker: &mut Unpacker<'_>) -> Result<Self, UnpackError> {
        let kind = unpacker.read_u8()?;
        let bytes = unpacker.read_array::<32>()?;
        Self::from_parts(kind, bytes).map_err(|_| UnpackError::InvalidTag {
            what: "address",
            tag: kind,
        })
    }
}

impl Packable for AliasAddress {
    fn pack(&self, buf: &mut Vec<u8>) {
        Address::Alias(*self).pack(buf);
    }

    fn unpack(unpacker: &mut Unpacker<'_>) -> Result<Self, UnpackError> {
        match Address::unpack(unpacker)? {
            Address::Alias(alias) => Ok(alias),
            other => Err(UnpackError::InvalidTag {
                what: "alias address",
                tag: other.kind(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// JSON form
// ---------------------------------------------------------------------------

/// Tagged JSON form of an address.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AddressDto {
    #[serde(rename_all = "camelCase")]
    Ed25519 { pub_key_hash: String },
    #[serde(rename_all = "camelCase")]
    Alias { alias_id: AliasId },
    #[serde(rename_all = "camelCase")]
    Nft { nft_id: NftId },
}

/// Accepted inputs: a Bech32 string of any network, or the tagged form.
#[derive(Deserialize)]
#[serde(untagged)]
enum AddressRepr {
    Bech32(String),
    Tagged(AddressDto),
}

impl From<Address> for AddressDto {
    fn from(address: Address) -> Self {
        match address {
            Address::Ed25519(a) => AddressDto::Ed25519 {
                pub_key_hash: crate::utils::encode_hex(&a.0),
            },
            Address::Alias(a) => AddressDto::Alias { alias_id: a.0 },
            Address::Nft(a) => AddressDto::Nft { nft_id: a.0 },
        }
    }
}

impl TryFrom<AddressDto> for Address {
    type Error = crate::error::Error;

    fn try_from(dto: AddressDto) -> Result<Self, Self::Error> {
        Ok(match dto {
            AddressDto::Ed25519 { pub_key_hash } => Address::Ed25519(Ed25519Address(
                crate::utils::decode_hex_array::<32>(&pub_key_hash)?,
            )),
            AddressDto::Alias { alias_id } => Address::Alias(AliasAddress(alias_id)),
            AddressDto::Nft { nft_id } => Address::Nft(NftAddress(nft_id)),
        })
    }
}

impl TryFrom<AddressRepr> for Address {
    type Error = crate::error::Error;

    fn try_from(repr: AddressRepr) -> Result<Self, Self::Error> {
        match repr {
            AddressRepr::Bech32(s) => Ok(Address::try_from_bech32(&s)?.1),
            AddressRepr::Tagged(dto) => dto.try_into(),
        }
    }
}

impl Serialize for AliasAddress {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        Address::Alias(*self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for AliasAddress {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Address::deserialize(deserializer)? {
            Address::Alias(alias) => Ok(alias),
            _ => Err(serde::de::Error::custom("expected an alias address")),
        }
    }
}

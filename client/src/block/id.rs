//! Identifiers of blocks, transactions, outputs and chain outputs.
//!
//! Everything is a fixed-size byte array printed as `0x`-prefixed hex.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::packable::{Packable, UnpackError, Unpacker};
use crate::config::{HASH_LENGTH, OUTPUT_ID_LENGTH};
use crate::crypto::hash::blake3_hash_parts;
use crate::error::{Error, Result};
use crate::utils::{decode_hex_array, encode_hex};

macro_rules! impl_id {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            pub const LENGTH: usize = $len;

            pub const fn null() -> Self {
                Self([0u8; $len])
            }

            pub fn is_null(&self) -> bool {
                self.0 == [0u8; $len]
            }

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::null()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&encode_hex(&self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                Ok(Self(decode_hex_array::<$len>(s)?))
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }

        impl Packable for $name {
            fn pack(&self, buf: &mut Vec<u8>) {
                buf.extend_from_slice(&self.0);
            }

            fn unpack(unpacker: &mut Unpacker<'_>) -> std::result::Result<Self, UnpackError> {
                Ok(Self(unpacker.read_array()?))
            }
        }
    };
}

impl_id!(
    /// BLAKE3 hash of a packed block.
    BlockId,
    HASH_LENGTH
);
impl_id!(
    /// BLAKE3 hash of a packed transaction payload.
    TransactionId,
    HASH_LENGTH
);
impl_id!(
    /// Identity of an alias chain. All zeros while the alias is being minted.
    AliasId,
    HASH_LENGTH
);
impl_id!(
    /// Identity of an NFT chain. All zeros while the NFT is being minted.
    NftId,
    HASH_LENGTH
);
impl_id!(
    /// Controlling alias address, serial number and token scheme kind.
    FoundryId,
    FOUNDRY_ID_LENGTH
);
impl_id!(
    /// Native token identifier: the id of the foundry that minted it.
    TokenId,
    FOUNDRY_ID_LENGTH
);

/// Alias address (33 bytes) + serial number (4) + token scheme kind (1).
pub const FOUNDRY_ID_LENGTH: usize = 38;

impl AliasId {
    /// The id an alias receives when the output minting it is consumed.
    pub fn from_output_id(output_id: &OutputId) -> Self {
        Self(blake3_hash_parts(&[&output_id.to_bytes()]))
    }

    /// Returns the real id, deriving it for a freshly minted alias.
    pub fn or_from_output_id(self, output_id: &OutputId) -> Self {
        if self.is_null() {
            Self::from_output_id(output_id)
        } else {
            self
        }
    }
}

impl NftId {
    pub fn from_output_id(output_id: &OutputId) -> Self {
        Self(blake3_hash_parts(&[&output_id.to_bytes()]))
    }

    pub fn or_from_output_id(self, output_id: &OutputId) -> Self {
        if self.is_null() {
            Self::from_output_id(output_id)
        } else {
            self
        }
    }
}

impl FoundryId {
    /// Builds a foundry id from its controlling alias, serial number and
    /// token scheme kind.
    pub fn build(alias_id: &AliasId, serial_number: u32, token_scheme_kind: u8) -> Self {
        let mut bytes = [0u8; FOUNDRY_ID_LENGTH];
        bytes[0] = crate::address::AliasAddress::KIND;
        bytes[1..33].copy_from_slice(alias_id.as_bytes());
        bytes[33..37].copy_from_slice(&serial_number.to_le_bytes());
        bytes[37] = token_scheme_kind;
        Self(bytes)
    }
}

impl From<FoundryId> for TokenId {
    fn from(id: FoundryId) -> Self {
        Self(id.0)
    }
}

// ---------------------------------------------------------------------------
// Output Id
// ---------------------------------------------------------------------------

/// Points at one output of one transaction.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutputId {
    transaction_id: TransactionId,
    index: u16,
}

impl OutputId {
    pub fn new(transaction_id: TransactionId, index: u16) -> Self {
        Self {
            transaction_id,
            index,
        }
    }

    pub fn transaction_id(&self) -> &TransactionId {
        &self.transaction_id
    }

    pub fn index(&self) -> u16 {
        self.index
    }

    pub fn to_bytes(&self) -> [u8; OUTPUT_ID_LENGTH] {
        let mut bytes = [0u8; OUTPUT_ID_LENGTH];
        bytes[..HASH_LENGTH].copy_from_slice(self.transaction_id.as_bytes());
        bytes[HASH_LENGTH..].copy_from_slice(&self.index.to_le_bytes());
        bytes
    }
}

impl fmt::Display for OutputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&encode_hex(&self.to_bytes()))
    }
}

impl fmt::Debug for OutputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OutputId({self})")
    }
}

impl FromStr for OutputId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = decode_hex_array::<OUTPUT_ID_LENGTH>(s)?;
        let mut tx = [0u8; HASH_LENGTH];
        tx.copy_from_slice(&bytes[..HASH_LENGTH]);
        let index = u16::from_le_bytes([bytes[HASH_LENGTH], bytes[HASH_LENGTH + 1]]);
        Ok(Self::new(TransactionId(tx), index))
    }
}

impl Serialize for OutputId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for OutputId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl Packable for OutputId {
    fn pack(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.to_bytes());
    }

    fn unpack(unpacker: &mut Unpacker<'_>) -> std::result::Result<Self, UnpackError> {
        let transaction_id = TransactionId::unpack(unpacker)?;
        let index = unpacker.read_u16()?;
        Ok(Self::new(transaction_id, index))
    }
}

//! Hex helpers and serde adapters shared by the DTOs.
//!
//! Identifiers travel as `0x`-prefixed lowercase hex; large token amounts
//! travel as decimal strings so JavaScript callers do not lose precision.

use crate::error::{Error, Result};

/// Encodes bytes as `0x`-prefixed lowercase hex.
pub fn encode_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Decodes hex with or without the `0x` prefix.
pub fn decode_hex(s: &str) -> Result<Vec<u8>> {
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    hex::decode(stripped).map_err(|e| Error::Validation(format!("invalid hex `{s}`: {e}")))
}

/// Decodes hex into a fixed-size array, rejecting any other length.
pub fn decode_hex_array<const N: usize>(s: &str) -> Result<[u8; N]> {
    let bytes = decode_hex(s)?;
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| Error::Validation(format!("expected {N} bytes of hex, got {len}")))
}

/// `#[serde(with = "serde_hex")]` for fixed-size byte arrays.
pub mod serde_hex {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer, const N: usize>(
        bytes: &[u8; N],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::encode_hex(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>, const N: usize>(
        deserializer: D,
    ) -> Result<[u8; N], D::Error> {
        let s = String::deserialize(deserializer)?;
        super::decode_hex_array::<N>(&s).map_err(de::Error::custom)
    }
}

/// `#[serde(with = "serde_hex_vec")]` for variable-length byte strings.
pub mod serde_hex_vec {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::encode_hex(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::decode_hex(&s).map_err(de::Error::custom)
    }
}

/// `#[serde(with = "serde_string")]` for integers wider than a JS number.
pub mod serde_string {
    use std::fmt::Display;
    use std::str::FromStr;

    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<T: Display, S: Serializer>(value: &T, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        T: FromStr,
        T::Err: Display,
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// `#[serde(with = "serde_amount")]` for token amounts. Writes decimal
/// strings; reads decimal strings or `0x` hex as sent by U256-based callers.
pub mod serde_amount {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        let s = String::deserialize(deserializer)?;
        match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(digits) => u128::from_str_radix(digits, 16),
            None => s.parse(),
        }
        .map_err(|_| de::Error::custom("invalid token amount"))
    }
}

//! # Canonical Packing
//!
//! Every ledger record has exactly one byte representation: a tag byte for
//! each variant, little-endian fixed-width integers, and length prefixes in
//! front of variable-length data. Identifiers (block id, transaction id,
//! essence hash) are hashes of these bytes, so the encoding never depends on
//! serde field order.
//!
//! Unpacking re-runs the same validation the builders run. Bytes that decode
//! therefore always describe a valid record, and packing that record again
//! reproduces the input byte for byte.

use thiserror::Error;

/// Errors raised while decoding canonical bytes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnpackError {
    #[error("unexpected end of input: needed {needed} more bytes, {remaining} left")]
    UnexpectedEnd { needed: usize, remaining: usize },

    #[error("{0} trailing bytes after the record")]
    TrailingBytes(usize),

    #[error("invalid {what} tag {tag}")]
    InvalidTag { what: &'static str, tag: u8 },

    #[error("invalid option flag {0}")]
    InvalidOptionFlag(u8),

    #[error("{0}")]
    Invalid(String),
}

/// A record with a canonical byte form.
pub trait Packable: Sized {
    /// Appends the canonical bytes of `self` to `buf`.
    fn pack(&self, buf: &mut Vec<u8>);

    /// Reads one record from `unpacker`, validating it.
    fn unpack(unpacker: &mut Unpacker<'_>) -> Result<Self, UnpackError>;

    fn pack_to_vec(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.pack(&mut buf);
        buf
    }

    fn packed_len(&self) -> usize {
        self.pack_to_vec().len()
    }

    /// Decodes `bytes` as exactly one record.
    fn unpack_exact(bytes: &[u8]) -> Result<Self, UnpackError> {
        let mut unpacker = Unpacker::new(bytes);
        let value = Self::unpack(&mut unpacker)?;
        unpacker.finish()?;
        Ok(value)
    }
}

// ---------------------------------------------------------------------------
// Unpacker
// ---------------------------------------------------------------------------

/// Cursor over a byte slice with typed little-endian reads.
#[derive(Debug)]
pub struct Unpacker<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Unpacker<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], UnpackError> {
        if self.remaining() < len {
            return Err(UnpackError::UnexpectedEnd {
                needed: len,
                remaining: self.remaining(),
            });
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], UnpackError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, UnpackError> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, UnpackError> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32, UnpackError> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64, UnpackError> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    pub fn read_u128(&mut self) -> Result<u128, UnpackError> {
        Ok(u128::from_le_bytes(self.read_array()?))
    }

    /// Reads a presence flag: 0 = absent, 1 = present.
    pub fn read_option_flag(&mut self) -> Result<bool, UnpackError> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(UnpackError::InvalidOptionFlag(other)),
        }
    }

    /// Reads a byte string with a u8 length prefix.
    pub fn read_u8_prefixed(&mut self) -> Result<Vec<u8>, UnpackError> {
        let len = self.read_u8()? as usize;
        Ok(self.read_bytes(len)?.to_vec())
    }

    /// Reads a byte string with a u16 length prefix.
    pub fn read_u16_prefixed(&mut self) -> Result<Vec<u8>, UnpackError> {
        let len = self.read_u16()? as usize;
        Ok(self.read_bytes(len)?.to_vec())
    }

    /// Reads a byte string with a u32 length prefix.
    pub fn read_u32_prefixed(&mut self) -> Result<Vec<u8>, UnpackError> {
        let len = self.read_u32()? as usize;
        Ok(self.read_bytes(len)?.to_vec())
    }

    /// Reads a u8 count followed by that many records.
    pub fn read_vec_u8<T: Packable>(&mut self) -> Result<Vec<T>, UnpackError> {
        let count = self.read_u8()? as usize;
        (0..count).map(|_| T::unpack(self)).collect()
    }

    /// Reads a u16 count followed by that many records.
    pub fn read_vec_u16<T: Packable>(&mut self) -> Result<Vec<T>, UnpackError> {
        let count = self.read_u16()? as usize;
        (0..count).map(|_| T::unpack(self)).collect()
    }

    /// Fails if any input is left over.
    pub fn finish(self) -> Result<(), UnpackError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(UnpackError::TrailingBytes(n)),
        }
    }
}

// ---------------------------------------------------------------------------
// Packing helpers
// ---------------------------------------------------------------------------

/// Writes a byte string with a u8 length prefix. Callers validate the length.
pub fn pack_u8_prefixed(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.push(bytes.len() as u8);
    buf.extend_from_slice(bytes);
}

/// Writes a byte string with a u16 length prefix.
pub fn pack_u16_prefixed(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u16).to_le_bytes());
    buf.extend_from_slice(bytes);
}

/// Writes a byte string with a u32 length prefix.
pub fn pack_u32_prefixed(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    buf.extend_from_slice(bytes);
}

/// Writes a u8 count followed by each record.
pub fn pack_vec_u8<T: Packable>(buf: &mut Vec<u8>, items: &[T]) {
    buf.push(items.len() as u8);
    for item in items {
        item.pack(buf);
    }
}

/// Writes a u16 count followed by each record.
pub fn pack_vec_u16<T: Packable>(buf: &mut Vec<u8>, items: &[T]) {
    buf.extend_from_slice(&(items.len() as u16).to_le_bytes());
    for item in items {
        item.pack(buf);
    }
}

/// Writes an optional record behind a presence flag.
pub fn pack_option<T: Packable>(buf: &mut Vec<u8>, item: Option<&T>) {
    match item {
        Some(item) => {
            buf.push(1);
            item.pack(buf);
        }
        None => buf.push(0),
    }
}

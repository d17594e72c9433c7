//! # Blocks
//!
//! The unit a node accepts: a set of parents from the tangle, an optional
//! payload, and a proof-of-work nonce.
//!
//! ```text
//! ┌───────────────────────────────────────┐
//! │ protocol_version  u8                  │
//! │ parents           u8 count, 32 B each │ sorted, unique, 1..=8
//! │ payload           u32 len, bytes      │ 0 = no payload
//! │ nonce             u64                 │
//! └───────────────────────────────────────┘
//! ```
//!
//! The block id is the BLAKE3 hash of these bytes, nonce included.

pub mod id;
pub mod output;
pub mod packable;
pub mod payload;
pub mod pow;

use serde::{Deserialize, Serialize};

use self::id::BlockId;
use self::packable::{pack_u32_prefixed, pack_vec_u8, Packable, UnpackError, Unpacker};
use self::payload::Payload;
use crate::config::{MAX_BLOCK_LENGTH, MAX_PARENTS, MIN_PARENTS};
use crate::crypto::hash::blake3_hash;
use crate::error::{Error, Result};
use crate::utils::serde_string;

// ---------------------------------------------------------------------------
// Parents
// ---------------------------------------------------------------------------

/// The blocks a new block approves. Kept sorted and free of duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<BlockId>", into = "Vec<BlockId>")]
pub struct Parents(Vec<BlockId>);

impl Parents {
    /// Sorts and deduplicates `ids`. Tips lists longer than the maximum are
    /// rejected, not truncated.
    pub fn from_vec(mut ids: Vec<BlockId>) -> Result<Self> {
        ids.sort();
        ids.dedup();
        if ids.len() < MIN_PARENTS || ids.len() > MAX_PARENTS {
            return Err(Error::Validation(format!(
                "a block needs {MIN_PARENTS} to {MAX_PARENTS} parents, got {}",
                ids.len()
            )));
        }
        Ok(Self(ids))
    }

    pub fn iter(&self) -> impl Iterator<Item = &BlockId> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl TryFrom<Vec<BlockId>> for Parents {
    type Error = Error;

    fn try_from(ids: Vec<BlockId>) -> Result<Self> {
        Self::from_vec(ids)
    }
}

impl From<Parents> for Vec<BlockId> {
    fn from(parents: Parents) -> Self {
        parents.0
    }
}

impl Packable for Parents {
    fn pack(&self, buf: &mut Vec<u8>) {
        pack_vec_u8(buf, &self.0);
    }

    fn unpack(unpacker: &mut Unpacker<'_>) -> std::result::Result<Self, UnpackError> {
        let ids = unpacker.read_vec_u8::<BlockId>()?;
        let sorted = ids.windows(2).all(|p| p[0] < p[1]);
        if !sorted || ids.len() < MIN_PARENTS || ids.len() > MAX_PARENTS {
            return Err(UnpackError::Invalid(
                "parents must be sorted, unique and between 1 and 8".into(),
            ));
        }
        Ok(Self(ids))
    }
}

// ---------------------------------------------------------------------------
// Block
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    protocol_version: u8,
    parents: Parents,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payload: Option<Payload>,
    #[serde(with = "serde_string")]
    nonce: u64,
}

impl Block {
    /// An unmined block (nonce 0).
    pub fn new(protocol_version: u8, parents: Parents, payload: Option<Payload>) -> Result<Self> {
        let block = Self {
            protocol_version,
            parents,
            payload,
            nonce: 0,
        };
        let len = block.packed_len();
        if len > MAX_BLOCK_LENGTH {
            return Err(Error::Validation(format!(
                "block is {len} bytes, the limit is {MAX_BLOCK_LENGTH}"
            )));
        }
        Ok(block)
    }

    pub fn protocol_version(&self) -> u8 {
        self.protocol_version
    }

    pub fn parents(&self) -> &Parents {
        &self.parents
    }

    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn with_nonce(mut self, nonce: u64) -> Self {
        self.nonce = nonce;
        self
    }

    pub fn id(&self) -> BlockId {
        BlockId(blake3_hash(&self.pack_to_vec()))
    }

    /// Packed bytes up to, not including, the nonce. This is what PoW hashes.
    pub fn bytes_without_nonce(&self) -> Vec<u8> {
        let mut bytes = self.pack_to_vec();
        bytes.truncate(bytes.len() - std::mem::size_of::<u64>());
        bytes
    }

    /// Whether the nonce reaches `min_pow_score`.
    pub fn has_valid_pow(&self, min_pow_score: u32) -> bool {
        pow::verify_nonce(&self.bytes_without_nonce(), self.nonce, min_pow_score)
    }
}

impl Packable for Block {
    fn pack(&self, buf: &mut Vec<u8>) {
        buf.push(self.protocol_version);
        self.parents.pack(buf);
        match &self.payload {
            Some(payload) => pack_u32_prefixed(buf, &payload.pack_to_vec()),
            None => buf.extend_from_slice(&0u32.to_le_bytes()),
        }
        buf.extend_from_slice(&self.nonce.to_le_bytes());
    }

    fn unpack(unpacker: &mut Unpacker<'_>) -> std::result::Result<Self, UnpackError> {
        let protocol_version = unpacker.read_u8()?;
        let parents = Parents::unpack(unpacker)?;
        let payload_bytes = unpacker.read_u32_prefixed()?;
        let payload = if payload_bytes.is_empty() {
            None
        } else {
            Some(Payload::unpack_exact(&payload_bytes)?)
        };
        let nonce = unpacker.read_u64()?;
        Ok(Self {
            protocol_version,
            parents,
            payload,
            nonce,
        })
    }
}

use serde::{Deserialize, Serialize};

use crate::block::packable::{pack_u32_prefixed, pack_u8_prefixed, Packable, UnpackError, Unpacker};
use crate::config::{MAX_TAGGED_DATA_LENGTH, MAX_TAG_LENGTH};
use crate::error::{Error, Result};
use crate::utils::serde_hex_vec;

/// Arbitrary data indexed by an optional tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TaggedDataDto")]
pub struct TaggedDataPayload {
    #[serde(with = "serde_hex_vec")]
    tag: Vec<u8>,
    #[serde(with = "serde_hex_vec")]
    data: Vec<u8>,
}

#[derive(Deserialize)]
struct TaggedDataDto {
    #[serde(with = "serde_hex_vec", default)]
    tag: Vec<u8>,
    #[serde(with = "serde_hex_vec", default)]
    data: Vec<u8>,
}

impl TryFrom<TaggedDataDto> for TaggedDataPayload {
    type Error = Error;

    fn try_from(dto: TaggedDataDto) -> Result<Self> {
        Self::new(dto.tag, dto.data)
    }
}

impl TaggedDataPayload {
    pub const KIND: u8 = 5;

    pub fn new(tag: Vec<u8>, data: Vec<u8>) -> Result<Self> {
        if tag.len() > MAX_TAG_LENGTH {
            return Err(Error::Validation(format!(
                "tag is {} bytes, the limit is {MAX_TAG_LENGTH}",
                tag.len()
            )));
        }
        if data.len() > MAX_TAGGED_DATA_LENGTH {
            return Err(Error::Validation(format!(
                "tagged data is {} bytes, the limit is {MAX_TAGGED_DATA_LENGTH}",
                data.len()
            )));
        }
        Ok(Self { tag, data })
    }

    pub fn tag(&self) -> &[u8] {
        &self.tag
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl Packable for TaggedDataPayload {
    fn pack(&self, buf: &mut Vec<u8>) {
        pack_u8_prefixed(buf, &self.tag);
        pack_u32_prefixed(buf, &self.data);
    }

    fn unpack(unpacker: &mut Unpacker<'_>) -> std::result::Result<Self, UnpackError> {
        let tag = unpacker.read_u8_prefixed()?;
        let data = unpacker.read_u32_prefixed()?;
        Self::new(tag, data).map_err(|e| UnpackError::Invalid(e.to_string()))
    }
}

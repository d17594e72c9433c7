//! Block payloads.

pub mod tagged_data;
pub mod transaction;
pub mod unlock;

use serde::{Deserialize, Serialize};

pub use tagged_data::TaggedDataPayload;
pub use transaction::{inputs_commitment, Input, TransactionEssence, TransactionPayload, UtxoInput};
pub use unlock::{SignatureUnlock, Unlock};

use super::packable::{Packable, UnpackError, Unpacker};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Payload {
    Transaction(Box<TransactionPayload>),
    TaggedData(Box<TaggedDataPayload>),
}

impl Payload {
    pub fn kind(&self) -> u8 {
        match self {
            Payload::Transaction(_) => TransactionPayload::KIND,
            Payload::TaggedData(_) => TaggedDataPayload::KIND,
        }
    }

    pub fn as_transaction(&self) -> Option<&TransactionPayload> {
        match self {
            Payload::Transaction(tx) => Some(tx),
            Payload::TaggedData(_) => None,
        }
    }
}

impl From<TransactionPayload> for Payload {
    fn from(payload: TransactionPayload) -> Self {
        Payload::Transaction(Box::new(payload))
    }
}

impl From<TaggedDataPayload> for Payload {
    fn from(payload: TaggedDataPayload) -> Self {
        Payload::TaggedData(Box::new(payload))
    }
}

impl Packable for Payload {
    fn pack(&self, buf: &mut Vec<u8>) {
        buf.push(self.kind());
        match self {
            Payload::Transaction(tx) => tx.pack(buf),
            Payload::TaggedData(tagged) => tagged.pack(buf),
        }
    }

    fn unpack(unpacker: &mut Unpacker<'_>) -> Result<Self, UnpackError> {
        Ok(match unpacker.read_u8()? {
            TransactionPayload::KIND => TransactionPayload::unpack(unpacker)?.into(),
            TaggedDataPayload::KIND => TaggedDataPayload::unpack(unpacker)?.into(),
            tag => return Err(UnpackError::InvalidTag { what: "payload", tag }),
        })
    }
}

//! Output features: optional data attached to an output.

use serde::{Deserialize, Serialize};

use super::OutputError;
use crate::address::Address;
use crate::block::packable::{
    pack_u16_prefixed, pack_u8_prefixed, pack_vec_u8, Packable, UnpackError, Unpacker,
};
use crate::config::{MAX_METADATA_LENGTH, MAX_TAG_LENGTH};
use crate::utils::serde_hex_vec;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Feature {
    /// Proves the output was created by `address`.
    Sender { address: Address },
    /// Proves the chain was minted by `address`. Immutable only.
    Issuer { address: Address },
    /// Arbitrary binary data.
    Metadata {
        #[serde(with = "serde_hex_vec")]
        data: Vec<u8>,
    },
    /// Indexation tag.
    Tag {
        #[serde(with = "serde_hex_vec")]
        tag: Vec<u8>,
    },
}

impl Feature {
    pub const SENDER: u8 = 0;
    pub const ISSUER: u8 = 1;
    pub const METADATA: u8 = 2;
    pub const TAG: u8 = 3;

    pub fn kind(&self) -> u8 {
        match self {
            Feature::Sender { .. } => Self::SENDER,
            Feature::Issuer { .. } => Self::ISSUER,
            Feature::Metadata { .. } => Self::METADATA,
            Feature::Tag { .. } => Self::TAG,
        }
    }

    pub fn kind_name(kind: u8) -> &'static str {
        match kind {
            Self::SENDER => "sender",
            Self::ISSUER => "issuer",
            Self::METADATA => "metadata",
            Self::TAG => "tag",
            _ => "unknown",
        }
    }

    /// Length rules of the byte-carrying features.
    pub fn verify(&self) -> Result<(), OutputError> {
        match self {
            Feature::Metadata { data } if data.is_empty() => {
                Err(OutputError::MalformedFeature("metadata must not be empty".into()))
            }
            Feature::Metadata { data } if data.len() > MAX_METADATA_LENGTH => {
                Err(OutputError::MalformedFeature(format!(
                    "metadata is {} bytes, the limit is {MAX_METADATA_LENGTH}",
                    data.len()
                )))
            }
            Feature::Tag { tag } if tag.is_empty() => {
                Err(OutputError::MalformedFeature("tag must not be empty".into()))
            }
            Feature::Tag { tag } if tag.len() > MAX_TAG_LENGTH => {
                Err(OutputError::MalformedFeature(format!(
                    "tag is {} bytes, the limit is {MAX_TAG_LENGTH}",
                    tag.len()
                )))
            }
            _ => Ok(()),
        }
    }
}

impl Packable for Feature {
    fn pack(&self, buf: &mut Vec<u8>) {
        buf.push(self.kind());
        match self {
            Feature::Sender { address } | Feature::Issuer { address } => address.pack(buf),
            Feature::Metadata { data } => pack_u16_prefixed(buf, data),
            Feature::Tag { tag } => pack_u8_prefixed(buf, tag),
        }
    }

    fn unpack(unpacker: &mut Unpacker<'_>) -> Result<Self, UnpackError> {
        let feature = match unpacker.read_u8()? {
            Self::SENDER => Feature::Sender {
                address: Address::unpack(unpacker)?,
            },
            Self::ISSUER => Feature::Issuer {
                address: Address::unpack(unpacker)?,
            },
            Self::METADATA => Feature::Metadata {
                data: unpacker.read_u16_prefixed()?,
            },
            Self::TAG => Feature::Tag {
                tag: unpacker.read_u8_prefixed()?,
            },
            tag => return Err(UnpackError::InvalidTag { what: "feature", tag }),
        };
        feature
            .verify()
            .map_err(|e| UnpackError::Invalid(e.to_string()))?;
        Ok(feature)
    }
}

// ---------------------------------------------------------------------------
// Features
// ---------------------------------------------------------------------------

/// Sorted, duplicate-free, well-formed features of one output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Feature>", into = "Vec<Feature>")]
pub struct Features(Vec<Feature>);

impl Features {
    pub fn from_vec(mut features: Vec<Feature>) -> Result<Self, OutputError> {
        for feature in &features {
            feature.verify()?;
        }
        features.sort_by_key(Feature::kind);
        for pair in features.windows(2) {
            if pair[0].kind() == pair[1].kind() {
                return Err(OutputError::DuplicateFeature(Feature::kind_name(pair[0].kind())));
            }
        }
        Ok(Self(features))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, kind: u8) -> Option<&Feature> {
        self.0.iter().find(|f| f.kind() == kind)
    }

    pub fn metadata(&self) -> Option<&[u8]> {
        match self.get(Feature::METADATA)? {
            Feature::Metadata { data } => Some(data),
            _ => None,
        }
    }

    pub(crate) fn verify_allowed(
        &self,
        output: &'static str,
        allowed: &[u8],
    ) -> Result<(), OutputError> {
        for feature in &self.0 {
            if !allowed.contains(&feature.kind()) {
                return Err(OutputError::DisallowedFeature {
                    feature: Feature::kind_name(feature.kind()),
                    output,
                });
            }
        }
        Ok(())
    }
}

impl TryFrom<Vec<Feature>> for Features {
    type Error = OutputError;

    fn try_from(features: Vec<Feature>) -> Result<Self, Self::Error> {
        Self::from_vec(features)
    }
}

impl From<Features> for Vec<Feature> {
    fn from(features: Features) -> Self {
        features.0
    }
}

impl Packable for Features {
    fn pack(&self, buf: &mut Vec<u8>) {
        pack_vec_u8(buf, &self.0);
    }

    fn unpack(unpacker: &mut Unpacker<'_>) -> Result<Self, UnpackError> {
        let features = unpacker.read_vec_u8::<Feature>()?;
        if !features.windows(2).all(|p| p[0].kind() < p[1].kind()) {
            return Err(UnpackError::Invalid(
                "features are not sorted by kind or repeat a kind".into(),
            ));
        }
        Ok(Self(features))
    }
}

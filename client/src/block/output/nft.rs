//! NFT outputs: a unique chain owned by an address, with immutable metadata
//! fixed at minting.

use serde::{Deserialize, Serialize};

use super::{
    resolve_amount, verify_common, Feature, Features, NativeToken, NativeTokens, Output,
    OutputError, RentStructure, UnlockCondition, UnlockConditions,
};
use crate::address::Address;
use crate::block::id::NftId;
use crate::block::packable::{Packable, UnpackError, Unpacker};

const ALLOWED_UNLOCK_CONDITIONS: &[u8] = &[
    UnlockCondition::ADDRESS,
    UnlockCondition::STORAGE_DEPOSIT_RETURN,
    UnlockCondition::TIMELOCK,
    UnlockCondition::EXPIRATION,
];
const REQUIRED_UNLOCK_CONDITIONS: &[u8] = &[UnlockCondition::ADDRESS];
const ALLOWED_FEATURES: &[u8] = &[Feature::SENDER, Feature::METADATA, Feature::TAG];
const ALLOWED_IMMUTABLE_FEATURES: &[u8] = &[Feature::ISSUER, Feature::METADATA];

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NftOutputBuilder {
    amount: Option<u64>,
    native_tokens: Vec<NativeToken>,
    nft_id: Option<NftId>,
    unlock_conditions: Vec<UnlockCondition>,
    features: Vec<Feature>,
    immutable_features: Vec<Feature>,
}

impl NftOutputBuilder {
    /// Pass [`NftId::null()`] to mint.
    pub fn new_with_amount(amount: u64, nft_id: NftId) -> Self {
        Self {
            amount: Some(amount),
            nft_id: Some(nft_id),
            ..Self::default()
        }
    }

    pub fn new_with_minimum_storage_deposit(nft_id: NftId) -> Self {
        Self {
            nft_id: Some(nft_id),
            ..Self::default()
        }
    }

    pub fn with_amount(mut self, amount: u64) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn add_native_token(mut self, token: NativeToken) -> Self {
        self.native_tokens.push(token);
        self
    }

    pub fn add_unlock_condition(mut self, condition: UnlockCondition) -> Self {
        self.unlock_conditions.push(condition);
        self
    }

    pub fn add_feature(mut self, feature: Feature) -> Self {
        self.features.push(feature);
        self
    }

    pub fn add_immutable_feature(mut self, feature: Feature) -> Self {
        self.immutable_features.push(feature);
        self
    }

    pub fn finish(self) -> Result<NftOutput, OutputError> {
        let amount = self.amount.ok_or(OutputError::MissingAmount)?;
        let nft_id = self.nft_id.ok_or(OutputError::MissingId("nft id"))?;
        let unlock_conditions = UnlockConditions::from_vec(self.unlock_conditions)?;
        unlock_conditions.verify("nft", ALLOWED_UNLOCK_CONDITIONS, REQUIRED_UNLOCK_CONDITIONS)?;
        verify_common(amount, &unlock_conditions)?;

        let features = Features::from_vec(self.features)?;
        features.verify_allowed("nft", ALLOWED_FEATURES)?;
        let immutable_features = Features::from_vec(self.immutable_features)?;
        immutable_features.verify_allowed("nft", ALLOWED_IMMUTABLE_FEATURES)?;

        Ok(NftOutput {
            amount,
            native_tokens: NativeTokens::from_vec(self.native_tokens)?,
            nft_id,
            unlock_conditions,
            features,
            immutable_features,
        })
    }

    pub fn finish_with_rent(self, rent: &RentStructure) -> Result<NftOutput, OutputError> {
        let explicit = self.amount;
        let mut output = self.with_amount(explicit.unwrap_or(u64::MAX)).finish()?;
        let required = rent.minimum_deposit(&Output::Nft(output.clone()));
        output.amount = resolve_amount(explicit, required)?;
        verify_common(output.amount, &output.unlock_conditions)?;
        Ok(output)
    }

    pub fn finish_output(self, rent: &RentStructure) -> Result<Output, OutputError> {
        Ok(Output::Nft(self.finish_with_rent(rent)?))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "NftOutputBuilder")]
pub struct NftOutput {
    amount: u64,
    native_tokens: NativeTokens,
    nft_id: NftId,
    unlock_conditions: UnlockConditions,
    features: Features,
    immutable_features: Features,
}

impl NftOutput {
    pub const KIND: u8 = 6;

    pub fn amount(&self) -> u64 {
        self.amount
    }

    pub fn native_tokens(&self) -> &NativeTokens {
        &self.native_tokens
    }

    pub fn nft_id(&self) -> NftId {
        self.nft_id
    }

    pub fn unlock_conditions(&self) -> &UnlockConditions {
        &self.unlock_conditions
    }

    pub fn features(&self) -> &Features {
        &self.features
    }

    pub fn immutable_features(&self) -> &Features {
        &self.immutable_features
    }

    pub fn address(&self) -> &Address {
        match self.unlock_conditions.get(UnlockCondition::ADDRESS) {
            Some(UnlockCondition::Address { address }) => address,
            _ => unreachable!("nft outputs are built with an address unlock condition"),
        }
    }

    pub(crate) fn pack_fields(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.amount.to_le_bytes());
        self.native_tokens.pack(buf);
        self.nft_id.pack(buf);
        self.unlock_conditions.pack(buf);
        self.features.pack(buf);
        self.immutable_features.pack(buf);
    }

    pub(crate) fn unpack_fields(unpacker: &mut Unpacker<'_>) -> Result<Self, UnpackError> {
        let amount = unpacker.read_u64()?;
        let native_tokens = NativeTokens::unpack(unpacker)?;
        let nft_id = NftId::unpack(unpacker)?;
        let unlock_conditions = UnlockConditions::unpack(unpacker)?;
        let features = Features::unpack(unpacker)?;
        let immutable_features = Features::unpack(unpacker)?;

        Ok(NftOutputBuilder {
            amount: Some(amount),
            native_tokens: native_tokens.into(),
            nft_id: Some(nft_id),
            unlock_conditions: unlock_conditions.into(),
            features: features.into(),
            immutable_features: immutable_features.into(),
        }
        .finish()?)
    }
}

impl TryFrom<NftOutputBuilder> for NftOutput {
    type Error = OutputError;

    fn try_from(builder: NftOutputBuilder) -> Result<Self, Self::Error> {
        builder.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    #[test]
    fn minting_keeps_the_null_id() {
        let output = NftOutputBuilder::new_with_amount(1_000, NftId::null())
            .add_unlock_condition(address_condition(1))
            .add_immutable_feature(Feature::Issuer { address: ed25519(1) })
            .finish()
            .unwrap();
        assert!(output.nft_id().is_null());
        assert_eq!(output.address(), &ed25519(1));
        assert_eq!(output.immutable_features().iter().count(), 1);
    }

    #[test]
    fn tag_is_not_an_immutable_feature() {
        let err = NftOutputBuilder::new_with_amount(1_000, NftId::null())
            .add_unlock_condition(address_condition(1))
            .add_immutable_feature(Feature::Tag { tag: b"t".to_vec() })
            .finish()
            .unwrap_err();
        assert!(matches!(err, OutputError::DisallowedFeature { feature: "tag", output: "nft" }));
    }

    #[test]
    fn needs_an_address() {
        let err = NftOutputBuilder::new_with_amount(1_000, NftId::null())
            .add_unlock_condition(UnlockCondition::Timelock { unix_time: 10 })
            .finish()
            .unwrap_err();
        assert_eq!(err, OutputError::MissingUnlockCondition("address"));
    }

    #[test]
    fn expiration_is_allowed() {
        NftOutputBuilder::new_with_amount(1_000, NftId::null())
            .add_unlock_condition(address_condition(1))
            .add_unlock_condition(UnlockCondition::Expiration {
                return_address: ed25519(2),
                unix_time: 100,
            })
            .finish()
            .unwrap();
    }
}

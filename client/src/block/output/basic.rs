//! Basic outputs: base tokens and native tokens owned by an address.

use serde::{Deserialize, Serialize};

use super::{
    resolve_amount, verify_common, Feature, Features, NativeToken, NativeTokens, Output,
    OutputError, RentStructure, UnlockCondition, UnlockConditions,
};
use crate::address::Address;
use crate::block::packable::{Packable, UnpackError, Unpacker};

const ALLOWED_UNLOCK_CONDITIONS: &[u8] = &[
    UnlockCondition::ADDRESS,
    UnlockCondition::STORAGE_DEPOSIT_RETURN,
    UnlockCondition::TIMELOCK,
    UnlockCondition::EXPIRATION,
];
const REQUIRED_UNLOCK_CONDITIONS: &[u8] = &[UnlockCondition::ADDRESS];
const ALLOWED_FEATURES: &[u8] = &[Feature::SENDER, Feature::METADATA, Feature::TAG];

/// Builder for [`BasicOutput`]. Also the JSON shape of `BuildBasicOutput`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BasicOutputBuilder {
    amount: Option<u64>,
    native_tokens: Vec<NativeToken>,
    unlock_conditions: Vec<UnlockCondition>,
    features: Vec<Feature>,
}

impl BasicOutputBuilder {
    pub fn new_with_amount(amount: u64) -> Self {
        Self {
            amount: Some(amount),
            ..Self::default()
        }
    }

    /// The amount is filled in with the storage deposit by
    /// [`finish_with_rent`](Self::finish_with_rent).
    pub fn new_with_minimum_storage_deposit() -> Self {
        Self::default()
    }

    pub fn with_amount(mut self, amount: u64) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn add_native_token(mut self, token: NativeToken) -> Self {
        self.native_tokens.push(token);
        self
    }

    pub fn with_native_tokens(mut self, tokens: impl IntoIterator<Item = NativeToken>) -> Self {
        self.native_tokens = tokens.into_iter().collect();
        self
    }

    pub fn add_unlock_condition(mut self, condition: UnlockCondition) -> Self {
        self.unlock_conditions.push(condition);
        self
    }

    pub fn with_unlock_conditions(
        mut self,
        conditions: impl IntoIterator<Item = UnlockCondition>,
    ) -> Self {
        self.unlock_conditions = conditions.into_iter().collect();
        self
    }

    pub fn add_feature(mut self, feature: Feature) -> Self {
        self.features.push(feature);
        self
    }

    pub fn with_features(mut self, features: impl IntoIterator<Item = Feature>) -> Self {
        self.features = features.into_iter().collect();
        self
    }

    /// Structural validation only. An amount must have been set.
    pub fn finish(self) -> Result<BasicOutput, OutputError> {
        let amount = self.amount.ok_or(OutputError::MissingAmount)?;
        let unlock_conditions = UnlockConditions::from_vec(self.unlock_conditions)?;
        unlock_conditions.verify("basic", ALLOWED_UNLOCK_CONDITIONS, REQUIRED_UNLOCK_CONDITIONS)?;
        verify_common(amount, &unlock_conditions)?;
        let features = Features::from_vec(self.features)?;
        features.verify_allowed("basic", ALLOWED_FEATURES)?;

        Ok(BasicOutput {
            amount,
            native_tokens: NativeTokens::from_vec(self.native_tokens)?,
            unlock_conditions,
            features,
        })
    }

    /// Structural validation plus the storage deposit. Without an explicit
    /// amount the output gets exactly the minimum deposit.
    pub fn finish_with_rent(self, rent: &RentStructure) -> Result<BasicOutput, OutputError> {
        let explicit = self.amount;
        let mut output = self.with_amount(explicit.unwrap_or(u64::MAX)).finish()?;
        let required = rent.minimum_deposit(&Output::Basic(output.clone()));
        output.amount = resolve_amount(explicit, required)?;
        verify_common(output.amount, &output.unlock_conditions)?;
        Ok(output)
    }

    pub fn finish_output(self, rent: &RentStructure) -> Result<Output, OutputError> {
        Ok(Output::Basic(self.finish_with_rent(rent)?))
    }
}

/// An output holding funds for a single address, optionally time-locked or
/// with a storage deposit to return.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "BasicOutputBuilder")]
pub struct BasicOutput {
    amount: u64,
    native_tokens: NativeTokens,
    unlock_conditions: UnlockConditions,
    features: Features,
}

impl BasicOutput {
    pub const KIND: u8 = 3;

    pub fn amount(&self) -> u64 {
        self.amount
    }

    pub fn native_tokens(&self) -> &NativeTokens {
        &self.native_tokens
    }

    pub fn unlock_conditions(&self) -> &UnlockConditions {
        &self.unlock_conditions
    }

    pub fn features(&self) -> &Features {
        &self.features
    }

    /// The owner. Always present: the builder requires it.
    pub fn address(&self) -> &Address {
        match self.unlock_conditions.get(UnlockCondition::ADDRESS) {
            Some(UnlockCondition::Address { address }) => address,
            _ => unreachable!("basic outputs are built with an address unlock condition"),
        }
    }

    pub(crate) fn pack_fields(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.amount.to_le_bytes());
        self.native_tokens.pack(buf);
        self.unlock_conditions.pack(buf);
        self.features.pack(buf);
    }

    pub(crate) fn unpack_fields(unpacker: &mut Unpacker<'_>) -> Result<Self, UnpackError> {
        let amount = unpacker.read_u64()?;
        let native_tokens = NativeTokens::unpack(unpacker)?;
        let unlock_conditions = UnlockConditions::unpack(unpacker)?;
        let features = Features::unpack(unpacker)?;
        Ok(BasicOutputBuilder::new_with_amount(amount)
            .with_native_tokens(native_tokens.iter().copied())
            .with_unlock_conditions(unlock_conditions.iter().cloned())
            .with_features(features.iter().cloned())
            .finish()?)
    }
}

impl TryFrom<BasicOutputBuilder> for BasicOutput {
    type Error = OutputError;

    fn try_from(builder: BasicOutputBuilder) -> Result<Self, Self::Error> {
        builder.finish()
    }
}

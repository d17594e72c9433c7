//! Alias outputs: a chain with a state controller and a governor that can
//! own other outputs and control foundries.

use serde::{Deserialize, Serialize};

use super::{
    resolve_amount, verify_common, Feature, Features, NativeToken, NativeTokens, Output,
    OutputError, RentStructure, UnlockCondition, UnlockConditions,
};
use crate::address::Address;
use crate::block::id::AliasId;
use crate::block::packable::{pack_u16_prefixed, Packable, UnpackError, Unpacker};
use crate::config::MAX_METADATA_LENGTH;
use crate::utils::serde_hex_vec;

const ALLOWED_UNLOCK_CONDITIONS: &[u8] = &[
    UnlockCondition::STATE_CONTROLLER_ADDRESS,
    UnlockCondition::GOVERNOR_ADDRESS,
];
const ALLOWED_FEATURES: &[u8] = &[Feature::SENDER, Feature::METADATA];
const ALLOWED_IMMUTABLE_FEATURES: &[u8] = &[Feature::ISSUER, Feature::METADATA];

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AliasOutputBuilder {
    amount: Option<u64>,
    native_tokens: Vec<NativeToken>,
    alias_id: Option<AliasId>,
    state_index: u32,
    #[serde(with = "serde_hex_vec")]
    state_metadata: Vec<u8>,
    foundry_counter: u32,
    unlock_conditions: Vec<UnlockCondition>,
    features: Vec<Feature>,
    immutable_features: Vec<Feature>,
}

impl AliasOutputBuilder {
    /// A null `alias_id` mints a new alias; its id is derived from the output
    /// id once the output is on the ledger.
    pub fn new_with_amount(amount: u64, alias_id: AliasId) -> Self {
        Self {
            amount: Some(amount),
            alias_id: Some(alias_id),
            ..Self::default()
        }
    }

    pub fn new_with_minimum_storage_deposit(alias_id: AliasId) -> Self {
        Self {
            alias_id: Some(alias_id),
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

    pub fn with_state_index(mut self, state_index: u32) -> Self {
        self.state_index = state_index;
        self
    }

    pub fn with_state_metadata(mut self, state_metadata: Vec<u8>) -> Self {
        self.state_metadata = state_metadata;
        self
    }

    pub fn with_foundry_counter(mut self, foundry_counter: u32) -> Self {
        self.foundry_counter = foundry_counter;
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

    pub fn finish(self) -> Result<AliasOutput, OutputError> {
        let amount = self.amount.ok_or(OutputError::MissingAmount)?;
        let alias_id = self.alias_id.ok_or(OutputError::MissingId("alias id"))?;
        if self.state_metadata.len() > MAX_METADATA_LENGTH {
            return Err(OutputError::StateMetadataTooLong(self.state_metadata.len()));
        }

        let unlock_conditions = UnlockConditions::from_vec(self.unlock_conditions)?;
        unlock_conditions.verify("alias", ALLOWED_UNLOCK_CONDITIONS, ALLOWED_UNLOCK_CONDITIONS)?;
        verify_common(amount, &unlock_conditions)?;

        let features = Features::from_vec(self.features)?;
        features.verify_allowed("alias", ALLOWED_FEATURES)?;
        let immutable_features = Features::from_vec(self.immutable_features)?;
        immutable_features.verify_allowed("alias", ALLOWED_IMMUTABLE_FEATURES)?;

        Ok(AliasOutput {
            amount,
            native_tokens: NativeTokens::from_vec(self.native_tokens)?,
            alias_id,
            state_index: self.state_index,
            state_metadata: self.state_metadata,
            foundry_counter: self.foundry_counter,
            unlock_conditions,
            features,
            immutable_features,
        })
    }

    pub fn finish_with_rent(self, rent: &RentStructure) -> Result<AliasOutput, OutputError> {
        let explicit = self.amount;
        let mut output = self.with_amount(explicit.unwrap_or(u64::MAX)).finish()?;
        let required = rent.minimum_deposit(&Output::Alias(output.clone()));
        output.amount = resolve_amount(explicit, required)?;
        Ok(output)
    }

    pub fn finish_output(self, rent: &RentStructure) -> Result<Output, OutputError> {
        Ok(Output::Alias(self.finish_with_rent(rent)?))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "AliasOutputBuilder")]
pub struct AliasOutput {
    amount: u64,
    native_tokens: NativeTokens,
    alias_id: AliasId,
    state_index: u32,
    #[serde(with = "serde_hex_vec")]
    state_metadata: Vec<u8>,
    foundry_counter: u32,
    unlock_conditions: UnlockConditions,
    features: Features,
    immutable_features: Features,
}

impl AliasOutput {
    pub const KIND: u8 = 4;

    pub fn amount(&self) -> u64 {
        self.amount
    }

    pub fn native_tokens(&self) -> &NativeTokens {
        &self.native_tokens
    }

    pub fn alias_id(&self) -> AliasId {
        self.alias_id
    }

    pub fn state_index(&self) -> u32 {
        self.state_index
    }

    pub fn state_metadata(&self) -> &[u8] {
        &self.state_metadata
    }

    pub fn foundry_counter(&self) -> u32 {
        self.foundry_counter
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

    pub fn state_controller_address(&self) -> &Address {
        match self
            .unlock_conditions
            .get(UnlockCondition::STATE_CONTROLLER_ADDRESS)
        {
            Some(UnlockCondition::StateControllerAddress { address }) => address,
            _ => unreachable!("alias outputs are built with a state controller"),
        }
    }

    pub fn governor_address(&self) -> &Address {
        match self.unlock_conditions.get(UnlockCondition::GOVERNOR_ADDRESS) {
            Some(UnlockCondition::GovernorAddress { address }) => address,
            _ => unreachable!("alias outputs are built with a governor"),
        }
    }

    pub(crate) fn pack_fields(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.amount.to_le_bytes());
        self.native_tokens.pack(buf);
        self.alias_id.pack(buf);
        buf.extend_from_slice(&self.state_index.to_le_bytes());
        pack_u16_prefixed(buf, &self.state_metadata);
        buf.extend_from_slice(&self.foundry_counter.to_le_bytes());
        self.unlock_conditions.pack(buf);
        self.features.pack(buf);
        self.immutable_features.pack(buf);
    }

    pub(crate) fn unpack_fields(unpacker: &mut Unpacker<'_>) -> Result<Self, UnpackError> {
        let amount = unpacker.read_u64()?;
        let native_tokens = NativeTokens::unpack(unpacker)?;
        let alias_id = AliasId::unpack(unpacker)?;
        let state_index = unpacker.read_u32()?;
        let state_metadata = unpacker.read_u16_prefixed()?;
        let foundry_counter = unpacker.read_u32()?;
        let unlock_conditions = UnlockConditions::unpack(unpacker)?;
        let features = Features::unpack(unpacker)?;
        let immutable_features = Features::unpack(unpacker)?;

        Ok(AliasOutputBuilder {
            amount: Some(amount),
            native_tokens: native_tokens.into(),
            alias_id: Some(alias_id),
            state_index,
            state_metadata,
            foundry_counter,
            unlock_conditions: unlock_conditions.into(),
            features: features.into(),
            immutable_features: immutable_features.into(),
        }
        .finish()?)
    }
}

impl TryFrom<AliasOutputBuilder> for AliasOutput {
    type Error = OutputError;

    fn try_from(builder: AliasOutputBuilder) -> Result<Self, Self::Error> {
        builder.finish()
    }
}

//! Foundry outputs: controlled by one alias, they mint and melt a native
//! token under a token scheme.

use serde::{Deserialize, Serialize};

use super::{
    resolve_amount, verify_common, Feature, Features, NativeToken, NativeTokens, Output,
    OutputError, RentStructure, TokenScheme, UnlockCondition, UnlockConditions,
};
use crate::address::AliasAddress;
use crate::block::id::{FoundryId, TokenId};
use crate::block::packable::{Packable, UnpackError, Unpacker};

const ALLOWED_UNLOCK_CONDITIONS: &[u8] = &[UnlockCondition::IMMUTABLE_ALIAS_ADDRESS];
const ALLOWED_FEATURES: &[u8] = &[Feature::METADATA];

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FoundryOutputBuilder {
    amount: Option<u64>,
    #[serde(alias = "native_tokens")]
    native_tokens: Vec<NativeToken>,
    #[serde(alias = "serial_number")]
    serial_number: Option<u32>,
    #[serde(alias = "token_scheme")]
    token_scheme: Option<TokenScheme>,
    #[serde(alias = "unlock_conditions")]
    unlock_conditions: Vec<UnlockCondition>,
    features: Vec<Feature>,
    #[serde(alias = "immutable_features")]
    immutable_features: Vec<Feature>,
}

impl FoundryOutputBuilder {
    pub fn new_with_amount(amount: u64, serial_number: u32, token_scheme: TokenScheme) -> Self {
        Self {
            amount: Some(amount),
            serial_number: Some(serial_number),
            token_scheme: Some(token_scheme),
            ..Self::default()
        }
    }

    pub fn new_with_minimum_storage_deposit(serial_number: u32, token_scheme: TokenScheme) -> Self {
        Self {
            serial_number: Some(serial_number),
            token_scheme: Some(token_scheme),
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

    pub fn finish(self) -> Result<FoundryOutput, OutputError> {
        let amount = self.amount.ok_or(OutputError::MissingAmount)?;
        let serial_number = self.serial_number.ok_or(OutputError::MissingId("serial number"))?;
        let token_scheme = self
            .token_scheme
            .ok_or_else(|| OutputError::InvalidTokenScheme("token scheme is missing".into()))?;
        token_scheme.verify()?;

        let unlock_conditions = UnlockConditions::from_vec(self.unlock_conditions)?;
        unlock_conditions.verify("foundry", ALLOWED_UNLOCK_CONDITIONS, ALLOWED_UNLOCK_CONDITIONS)?;
        verify_common(amount, &unlock_conditions)?;

        let features = Features::from_vec(self.features)?;
        features.verify_allowed("foundry", ALLOWED_FEATURES)?;
        let immutable_features = Features::from_vec(self.immutable_features)?;
        immutable_features.verify_allowed("foundry", ALLOWED_FEATURES)?;

        Ok(FoundryOutput {
            amount,
            native_tokens: NativeTokens::from_vec(self.native_tokens)?,
            serial_number,
            token_scheme,
            unlock_conditions,
            features,
            immutable_features,
        })
    }

    pub fn finish_with_rent(self, rent: &RentStructure) -> Result<FoundryOutput, OutputError> {
        let explicit = self.amount;
        let mut output = self.with_amount(explicit.unwrap_or(u64::MAX)).finish()?;
        let required = rent.minimum_deposit(&Output::Foundry(output.clone()));
        output.amount = resolve_amount(explicit, required)?;
        Ok(output)
    }

    pub fn finish_output(self, rent: &RentStructure) -> Result<Output, OutputError> {
        Ok(Output::Foundry(self.finish_with_rent(rent)?))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "FoundryOutputBuilder")]
pub struct FoundryOutput {
    amount: u64,
    native_tokens: NativeTokens,
    serial_number: u32,
    token_scheme: TokenScheme,
    unlock_conditions: UnlockConditions,
    features: Features,
    immutable_features: Features,
}

impl FoundryOutput {
    pub const KIND: u8 = 5;

    pub fn amount(&self) -> u64 {
        self.amount
    }

    pub fn native_tokens(&self) -> &NativeTokens {
        &self.native_tokens
    }

    pub fn serial_number(&self) -> u32 {
        self.serial_number
    }

    pub fn token_scheme(&self) -> &TokenScheme {
        &self.token_scheme
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

    /// The alias that controls this foundry.
    pub fn alias_address(&self) -> &AliasAddress {
        match self
            .unlock_conditions
            .get(UnlockCondition::IMMUTABLE_ALIAS_ADDRESS)
        {
            Some(UnlockCondition::ImmutableAliasAddress { address }) => address,
            _ => unreachable!("foundry outputs are built with an immutable alias address"),
        }
    }

    pub fn id(&self) -> FoundryId {
        FoundryId::build(
            self.alias_address().alias_id(),
            self.serial_number,
            self.token_scheme.kind(),
        )
    }

    /// Id of the native token this foundry mints.
    pub fn token_id(&self) -> TokenId {
        self.id().into()
    }

    pub(crate) fn pack_fields(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.amount.to_le_bytes());
        self.native_tokens.pack(buf);
        buf.extend_from_slice(&self.serial_number.to_le_bytes());
        self.token_scheme.pack(buf);
        self.unlock_conditions.pack(buf);
        self.features.pack(buf);
        self.immutable_features.pack(buf);
    }

    pub(crate) fn unpack_fields(unpacker: &mut Unpacker<'_>) -> Result<Self, UnpackError> {
        let amount = unpacker.read_u64()?;
        let native_tokens = NativeTokens::unpack(unpacker)?;
        let serial_number = unpacker.read_u32()?;
        let token_scheme = TokenScheme::unpack(unpacker)?;
        let unlock_conditions = UnlockConditions::unpack(unpacker)?;
        let features = Features::unpack(unpacker)?;
        let immutable_features = Features::unpack(unpacker)?;

        Ok(FoundryOutputBuilder {
            amount: Some(amount),
            native_tokens: native_tokens.into(),
            serial_number: Some(serial_number),
            token_scheme: Some(token_scheme),
            unlock_conditions: unlock_conditions.into(),
            features: features.into(),
            immutable_features: immutable_features.into(),
        }
        .finish()?)
    }
}

impl TryFrom<FoundryOutputBuilder> for FoundryOutput {
    type Error = OutputError;

    fn try_from(builder: FoundryOutputBuilder) -> Result<Self, Self::Error> {
        builder.finish()
    }
}

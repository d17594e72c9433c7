//! # Outputs
//!
//! Typed, fund-holding records of the UTXO ledger. Four variants share a
//! common core (amount, native tokens, unlock conditions, features) and add
//! their own fields:
//!
//! | variant | kind | adds                                                   |
//! |---------|------|--------------------------------------------------------|
//! | Basic   | 3    | nothing                                                |
//! | Alias   | 4    | alias id, state index/metadata, foundry counter, immut.|
//! | Foundry | 5    | serial number, token scheme, immutable features        |
//! | Nft     | 6    | nft id, immutable features                             |
//!
//! Outputs are only created through their builders (or by unpacking, which
//! runs the same checks), so holding an [`Output`] means holding a
//! structurally valid one. The storage deposit depends on network
//! parameters and is checked separately with [`Output::verify_storage_deposit`].

pub mod alias;
pub mod basic;
pub mod feature;
pub mod foundry;
pub mod native_token;
pub mod nft;
pub mod rent;
pub mod unlock_condition;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use alias::{AliasOutput, AliasOutputBuilder};
pub use basic::{BasicOutput, BasicOutputBuilder};
pub use feature::{Feature, Features};
pub use foundry::{FoundryOutput, FoundryOutputBuilder};
pub use native_token::{NativeToken, NativeTokens, SimpleTokenScheme, TokenScheme};
pub use nft::{NftOutput, NftOutputBuilder};
pub use rent::RentStructure;
pub use unlock_condition::{UnlockCondition, UnlockConditions};

use super::id::{OutputId, TokenId};
use super::packable::{Packable, UnpackError, Unpacker};
use crate::address::{Address, AliasAddress, NftAddress};

// ---------------------------------------------------------------------------
// Output Error
// ---------------------------------------------------------------------------

/// Structural and storage-deposit violations. Each variant names the rule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OutputError {
    #[error("amount must be greater than zero")]
    ZeroAmount,

    #[error("amount is missing")]
    MissingAmount,

    #[error("{0} is missing")]
    MissingId(&'static str),

    #[error("amount {amount} is below the minimum storage deposit {required}")]
    InsufficientStorageDeposit { amount: u64, required: u64 },

    #[error("at least one unlock condition is required")]
    EmptyUnlockConditions,

    #[error("missing {0} unlock condition")]
    MissingUnlockCondition(&'static str),

    #[error("{condition} unlock condition is not allowed on a {output} output")]
    DisallowedUnlockCondition {
        condition: &'static str,
        output: &'static str,
    },

    #[error("duplicate {0} unlock condition")]
    DuplicateUnlockCondition(&'static str),

    #[error("storage deposit return of {returned} exceeds the output amount {amount}")]
    StorageDepositReturnExceedsAmount { returned: u64, amount: u64 },

    #[error("{feature} feature is not allowed on a {output} output")]
    DisallowedFeature {
        feature: &'static str,
        output: &'static str,
    },

    #[error("duplicate {0} feature")]
    DuplicateFeature(&'static str),

    #[error("malformed feature: {0}")]
    MalformedFeature(String),

    #[error("duplicate native token {0}")]
    DuplicateNativeToken(TokenId),

    #[error("native token {0} has a zero amount")]
    ZeroNativeTokenAmount(TokenId),

    #[error("{0} native tokens exceed the limit of 64")]
    TooManyNativeTokens(usize),

    #[error("invalid token scheme: {0}")]
    InvalidTokenScheme(String),

    #[error("state metadata is {0} bytes, the limit is 8192")]
    StateMetadataTooLong(usize),
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Any ledger output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Output {
    Basic(BasicOutput),
    Alias(AliasOutput),
    Foundry(FoundryOutput),
    Nft(NftOutput),
}

impl Output {
    pub fn kind(&self) -> u8 {
        match self {
            Output::Basic(_) => BasicOutput::KIND,
            Output::Alias(_) => AliasOutput::KIND,
            Output::Foundry(_) => FoundryOutput::KIND,
            Output::Nft(_) => NftOutput::KIND,
        }
    }

    pub fn kind_str(&self) -> &'static str {
        match self {
            Output::Basic(_) => "basic",
            Output::Alias(_) => "alias",
            Output::Foundry(_) => "foundry",
            Output::Nft(_) => "nft",
        }
    }

    pub fn amount(&self) -> u64 {
        match self {
            Output::Basic(o) => o.amount(),
            Output::Alias(o) => o.amount(),
            Output::Foundry(o) => o.amount(),
            Output::Nft(o) => o.amount(),
        }
    }

    pub fn native_tokens(&self) -> &NativeTokens {
        match self {
            Output::Basic(o) => o.native_tokens(),
            Output::Alias(o) => o.native_tokens(),
            Output::Foundry(o) => o.native_tokens(),
            Output::Nft(o) => o.native_tokens(),
        }
    }

    pub fn unlock_conditions(&self) -> &UnlockConditions {
        match self {
            Output::Basic(o) => o.unlock_conditions(),
            Output::Alias(o) => o.unlock_conditions(),
            Output::Foundry(o) => o.unlock_conditions(),
            Output::Nft(o) => o.unlock_conditions(),
        }
    }

    pub fn features(&self) -> &Features {
        match self {
            Output::Basic(o) => o.features(),
            Output::Alias(o) => o.features(),
            Output::Foundry(o) => o.features(),
            Output::Nft(o) => o.features(),
        }
    }

    pub fn immutable_features(&self) -> Option<&Features> {
        match self {
            Output::Basic(_) => None,
            Output::Alias(o) => Some(o.immutable_features()),
            Output::Foundry(o) => Some(o.immutable_features()),
            Output::Nft(o) => Some(o.immutable_features()),
        }
    }

    /// The address whose owner must unlock this output when it is consumed
    /// by a state transition.
    pub fn required_address(&self) -> Address {
        match self {
            Output::Basic(o) => *o.address(),
            Output::Alias(o) => *o.state_controller_address(),
            Output::Foundry(o) => Address::Alias(*o.alias_address()),
            Output::Nft(o) => *o.address(),
        }
    }

    /// The address this output turns into once it exists on the ledger,
    /// for chain outputs that can own other outputs.
    pub fn chain_address(&self, output_id: &OutputId) -> Option<Address> {
        match self {
            Output::Alias(o) => Some(Address::Alias(AliasAddress(
                o.alias_id().or_from_output_id(output_id),
            ))),
            Output::Nft(o) => Some(Address::Nft(NftAddress(
                o.nft_id().or_from_output_id(output_id),
            ))),
            Output::Basic(_) | Output::Foundry(_) => None,
        }
    }

    /// Fails when the amount does not cover the storage deposit.
    pub fn verify_storage_deposit(&self, rent: &RentStructure) -> Result<(), OutputError> {
        let required = rent.minimum_deposit(self);
        if self.amount() < required {
            return Err(OutputError::InsufficientStorageDeposit {
                amount: self.amount(),
                required,
            });
        }
        Ok(())
    }

    pub fn as_basic(&self) -> Option<&BasicOutput> {
        match self {
            Output::Basic(o) => Some(o),
            _ => None,
        }
    }
}

impl From<BasicOutput> for Output {
    fn from(o: BasicOutput) -> Self {
        Output::Basic(o)
    }
}

impl From<AliasOutput> for Output {
    fn from(o: AliasOutput) -> Self {
        Output::Alias(o)
    }
}

impl From<FoundryOutput> for Output {
    fn from(o: FoundryOutput) -> Self {
        Output::Foundry(o)
    }
}

impl From<NftOutput> for Output {
    fn from(o: NftOutput) -> Self {
        Output::Nft(o)
    }
}

impl Packable for Output {
    fn pack(&self, buf: &mut Vec<u8>) {
        buf.push(self.kind());
        match self {
            Output::Basic(o) => o.pack_fields(buf),
            Output::Alias(o) => o.pack_fields(buf),
            Output::Foundry(o) => o.pack_fields(buf),
            Output::Nft(o) => o.pack_fields(buf),
        }
    }

    fn unpack(unpacker: &mut Unpacker<'_>) -> Result<Self, UnpackError> {
        Ok(match unpacker.read_u8()? {
            BasicOutput::KIND => Output::Basic(BasicOutput::unpack_fields(unpacker)?),
            AliasOutput::KIND => Output::Alias(AliasOutput::unpack_fields(unpacker)?),
            FoundryOutput::KIND => Output::Foundry(FoundryOutput::unpack_fields(unpacker)?),
            NftOutput::KIND => Output::Nft(NftOutput::unpack_fields(unpacker)?),
            tag => return Err(UnpackError::InvalidTag { what: "output", tag }),
        })
    }
}

impl From<OutputError> for UnpackError {
    fn from(err: OutputError) -> Self {
        UnpackError::Invalid(err.to_string())
    }
}

/// Picks the amount of a builder: the explicit one if it covers the storage
/// deposit, the deposit itself if none was given.
pub(crate) fn resolve_amount(explicit: Option<u64>, required: u64) -> Result<u64, OutputError> {
    match explicit {
        None => Ok(required),
        Some(amount) if amount < required => {
            Err(OutputError::InsufficientStorageDeposit { amount, required })
        }
        Some(amount) => Ok(amount),
    }
}

/// Checks shared by every variant.
pub(crate) fn verify_common(amount: u64, unlock_conditions: &UnlockConditions) -> Result<(), OutputError> {
    if amount == 0 {
        return Err(OutputError::ZeroAmount);
    }
    if let Some(UnlockCondition::StorageDepositReturn { amount: returned, .. }) =
        unlock_conditions.get(UnlockCondition::STORAGE_DEPOSIT_RETURN)
    {
        if *returned > amount {
            return Err(OutputError::StorageDepositReturnExceedsAmount {
                returned: *returned,
                amount,
            });
        }
    }
    Ok(())
}

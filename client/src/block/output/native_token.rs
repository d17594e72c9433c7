//! Native tokens carried by outputs and the scheme that mints them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::OutputError;
use crate::block::id::TokenId;
use crate::block::packable::{pack_vec_u8, Packable, UnpackError, Unpacker};
use crate::config::MAX_NATIVE_TOKENS;
use crate::utils::serde_amount;

/// An amount of one native token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeToken {
    pub id: TokenId,
    #[serde(with = "serde_amount")]
    pub amount: u128,
}

impl NativeToken {
    pub fn new(id: TokenId, amount: u128) -> Result<Self, OutputError> {
        if amount == 0 {
            return Err(OutputError::ZeroNativeTokenAmount(id));
        }
        Ok(Self { id, amount })
    }
}

impl Packable for NativeToken {
    fn pack(&self, buf: &mut Vec<u8>) {
        self.id.pack(buf);
        buf.extend_from_slice(&self.amount.to_le_bytes());
    }

    fn unpack(unpacker: &mut Unpacker<'_>) -> Result<Self, UnpackError> {
        let id = TokenId::unpack(unpacker)?;
        let amount = unpacker.read_u128()?;
        Self::new(id, amount).map_err(|e| UnpackError::Invalid(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Native Tokens
// ---------------------------------------------------------------------------

/// Native tokens of one output: unique ids, sorted, non-zero, at most 64.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<NativeToken>", into = "Vec<NativeToken>")]
pub struct NativeTokens(Vec<NativeToken>);

impl NativeTokens {
    pub fn from_vec(mut tokens: Vec<NativeToken>) -> Result<Self, OutputError> {
        if tokens.len() > MAX_NATIVE_TOKENS {
            return Err(OutputError::TooManyNativeTokens(tokens.len()));
        }
        for token in &tokens {
            if token.amount == 0 {
                return Err(OutputError::ZeroNativeTokenAmount(token.id));
            }
        }
        tokens.sort_by_key(|t| t.id);
        for pair in tokens.windows(2) {
            if pair[0].id == pair[1].id {
                return Err(OutputError::DuplicateNativeToken(pair[0].id));
            }
        }
        Ok(Self(tokens))
    }

    pub fn iter(&self) -> impl Iterator<Item = &NativeToken> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Sums another token set into a running balance map.
    pub fn add_to(&self, balance: &mut BTreeMap<TokenId, u128>) {
        for token in &self.0 {
            *balance.entry(token.id).or_default() += token.amount;
        }
    }

    /// Builds a token set from a balance map, dropping zero entries.
    pub fn from_balance(balance: &BTreeMap<TokenId, u128>) -> Result<Self, OutputError> {
        let tokens = balance
            .iter()
            .filter(|(_, amount)| **amount > 0)
            .map(|(id, amount)| NativeToken {
                id: *id,
                amount: *amount,
            })
            .collect();
        Self::from_vec(tokens)
    }
}

impl TryFrom<Vec<NativeToken>> for NativeTokens {
    type Error = OutputError;

    fn try_from(tokens: Vec<NativeToken>) -> Result<Self, Self::Error> {
        Self::from_vec(tokens)
    }
}

impl From<NativeTokens> for Vec<NativeToken> {
    fn from(tokens: NativeTokens) -> Self {
        tokens.0
    }
}

impl Packable for NativeTokens {
    fn pack(&self, buf: &mut Vec<u8>) {
        pack_vec_u8(buf, &self.0);
    }

    fn unpack(unpacker: &mut Unpacker<'_>) -> Result<Self, UnpackError> {
        let tokens = unpacker.read_vec_u8::<NativeToken>()?;
        if tokens.len() > MAX_NATIVE_TOKENS || !tokens.windows(2).all(|p| p[0].id < p[1].id) {
            return Err(UnpackError::Invalid(
                "native tokens must be sorted, unique and at most 64".into(),
            ));
        }
        Ok(Self(tokens))
    }
}

// ---------------------------------------------------------------------------
// Token Scheme
// ---------------------------------------------------------------------------

/// Supply rules of a foundry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TokenScheme {
    Simple(SimpleTokenScheme),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleTokenScheme {
    #[serde(with = "serde_amount")]
    pub minted_tokens: u128,
    #[serde(with = "serde_amount")]
    pub melted_tokens: u128,
    #[serde(with = "serde_amount")]
    pub maximum_supply: u128,
}

impl TokenScheme {
    pub const SIMPLE: u8 = 0;

    pub fn kind(&self) -> u8 {
        match self {
            TokenScheme::Simple(_) => Self::SIMPLE,
        }
    }

    pub fn verify(&self) -> Result<(), OutputError> {
        match self {
            TokenScheme::Simple(s) => {
                if s.maximum_supply == 0 {
                    return Err(OutputError::InvalidTokenScheme(
                        "maximum supply must be positive".into(),
                    ));
                }
                if s.melted_tokens > s.minted_tokens {
                    return Err(OutputError::InvalidTokenScheme(
                        "melted tokens exceed minted tokens".into(),
                    ));
                }
                if s.minted_tokens - s.melted_tokens > s.maximum_supply {
                    return Err(OutputError::InvalidTokenScheme(
                        "circulating supply exceeds maximum supply".into(),
                    ));
                }
                Ok(())
            }
        }
    }

    /// Tokens minted and not melted.
    pub fn circulating_supply(&self) -> u128 {
        match self {
            TokenScheme::Simple(s) => s.minted_tokens - s.melted_tokens,
        }
    }
}

impl Packable for TokenScheme {
    fn pack(&self, buf: &mut Vec<u8>) {
        buf.push(self.kind());
        match self {
            TokenScheme::Simple(s) => {
                buf.extend_from_slice(&s.minted_tokens.to_le_bytes());
                buf.extend_from_slice(&s.melted_tokens.to_le_bytes());
                buf.extend_from_slice(&s.maximum_supply.to_le_bytes());
            }
        }
    }

    fn unpack(unpacker: &mut Unpacker<'_>) -> Result<Self, UnpackError> {
        let scheme = match unpacker.read_u8()? {
            Self::SIMPLE => TokenScheme::Simple(SimpleTokenScheme {
                minted_tokens: unpacker.read_u128()?,
                melted_tokens: unpacker.read_u128()?,
                maximum_supply: unpacker.read_u128()?,
            }),
            tag => {
                return Err(UnpackError::InvalidTag {
                    what: "token scheme",
                    tag,
                })
            }
        };
        scheme
            .verify()
            .map_err(|e| UnpackError::Invalid(e.to_string()))?;
        Ok(scheme)
    }
}

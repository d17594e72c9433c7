//! Unlock conditions: the rules that must hold to spend an output.
//!
//! An output carries at most one condition of each kind, kept sorted by kind
//! so the packed bytes are canonical.

use serde::{Deserialize, Serialize};

use super::OutputError;
use crate::address::{Address, AliasAddress};
use crate::block::packable::{pack_vec_u8, Packable, UnpackError, Unpacker};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum UnlockCondition {
    /// Whoever controls `address` may spend the output.
    Address { address: Address },
    /// Spender must return `amount` to `return_address` in the same transaction.
    #[serde(rename_all = "camelCase")]
    StorageDepositReturn { return_address: Address, amount: u64 },
    /// Output cannot be spent before `unix_time`.
    #[serde(rename_all = "camelCase")]
    Timelock { unix_time: u32 },
    /// After `unix_time` only `return_address` may spend the output.
    #[serde(rename_all = "camelCase")]
    Expiration {
        return_address: Address,
        unix_time: u32,
    },
    /// Alias state transitions.
    StateControllerAddress { address: Address },
    /// Alias governance transitions.
    GovernorAddress { address: Address },
    /// Foundries belong to exactly one alias, forever.
    ImmutableAliasAddress { address: AliasAddress },
}

impl UnlockCondition {
    pub const ADDRESS: u8 = 0;
    pub const STORAGE_DEPOSIT_RETURN: u8 = 1;
    pub const TIMELOCK: u8 = 2;
    pub const EXPIRATION: u8 = 3;
    pub const STATE_CONTROLLER_ADDRESS: u8 = 4;
    pub const GOVERNOR_ADDRESS: u8 = 5;
    pub const IMMUTABLE_ALIAS_ADDRESS: u8 = 6;

    pub fn kind(&self) -> u8 {
        match self {
            UnlockCondition::Address { .. } => Self::ADDRESS,
            UnlockCondition::StorageDepositReturn { .. } => Self::STORAGE_DEPOSIT_RETURN,
            UnlockCondition::Timelock { .. } => Self::TIMELOCK,
            UnlockCondition::Expiration { .. } => Self::EXPIRATION,
            UnlockCondition::StateControllerAddress { .. } => Self::STATE_CONTROLLER_ADDRESS,
            UnlockCondition::GovernorAddress { .. } => Self::GOVERNOR_ADDRESS,
            UnlockCondition::ImmutableAliasAddress { .. } => Self::IMMUTABLE_ALIAS_ADDRESS,
        }
    }

    pub fn kind_name(kind: u8) -> &'static str {
        match kind {
            Self::ADDRESS => "address",
            Self::STORAGE_DEPOSIT_RETURN => "storage deposit return",
            Self::TIMELOCK => "timelock",
            Self::EXPIRATION => "expiration",
            Self::STATE_CONTROLLER_ADDRESS => "state controller address",
            Self::GOVERNOR_ADDRESS => "governor address",
            Self::IMMUTABLE_ALIAS_ADDRESS => "immutable alias address",
            _ => "unknown",
        }
    }
}

impl Packable for UnlockCondition {
    fn pack(&self, buf: &mut Vec<u8>) {
        buf.push(self.kind());
        match self {
            UnlockCondition::Address { address }
            | UnlockCondition::StateControllerAddress { address }
            | UnlockCondition::GovernorAddress { address } => address.pack(buf),
            UnlockCondition::StorageDepositReturn {
                return_address,
                amount,
            } => {
                return_address.pack(buf);
                buf.extend_from_slice(&amount.to_le_bytes());
            }
            UnlockCondition::Timelock { unix_time } => {
                buf.extend_from_slice(&unix_time.to_le_bytes());
            }
            UnlockCondition::Expiration {
                return_address,
                unix_time,
            } => {
                return_address.pack(buf);
                buf.extend_from_slice(&unix_time.to_le_bytes());
            }
            UnlockCondition::ImmutableAliasAddress { address } => address.pack(buf),
        }
    }

    fn unpack(unpacker: &mut Unpacker<'_>) -> Result<Self, UnpackError> {
        Ok(match unpacker.read_u8()? {
            Self::ADDRESS => UnlockCondition::Address {
                address: Address::unpack(unpacker)?,
            },
            Self::STORAGE_DEPOSIT_RETURN => UnlockCondition::StorageDepositReturn {
                return_address: Address::unpack(unpacker)?,
                amount: unpacker.read_u64()?,
            },
            Self::TIMELOCK => UnlockCondition::Timelock {
                unix_time: unpacker.read_u32()?,
            },
            Self::EXPIRATION => UnlockCondition::Expiration {
                return_address: Address::unpack(unpacker)?,
                unix_time: unpacker.read_u32()?,
            },
            Self::STATE_CONTROLLER_ADDRESS => UnlockCondition::StateControllerAddress {
                address: Address::unpack(unpacker)?,
            },
            Self::GOVERNOR_ADDRESS => UnlockCondition::GovernorAddress {
                address: Address::unpack(unpacker)?,
            },
            Self::IMMUTABLE_ALIAS_ADDRESS => UnlockCondition::ImmutableAliasAddress {
                address: AliasAddress::unpack(unpacker)?,
            },
            tag => {
                return Err(UnpackError::InvalidTag {
                    what: "unlock condition",
                    tag,
                })
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Unlock Conditions
// ---------------------------------------------------------------------------

/// Sorted, duplicate-free unlock conditions of one output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<UnlockCondition>", into = "Vec<UnlockCondition>")]
pub struct UnlockConditions(Vec<UnlockCondition>);

impl UnlockConditions {
    /// Sorts the conditions by kind and rejects repeated kinds.
    pub fn from_vec(mut conditions: Vec<UnlockCondition>) -> Result<Self, OutputError> {
        conditions.sort_by_key(UnlockCondition::kind);
        for pair in conditions.windows(2) {
            if pair[0].kind() == pair[1].kind() {
                return Err(OutputError::DuplicateUnlockCondition(
                    UnlockCondition::kind_name(pair[0].kind()),
                ));
            }
        }
        Ok(Self(conditions))
    }

    pub fn iter(&self) -> impl Iterator<Item = &UnlockCondition> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, kind: u8) -> Option<&UnlockCondition> {
        self.0.iter().find(|c| c.kind() == kind)
    }

    pub fn address(&self) -> Option<&Address> {
        match self.get(UnlockCondition::ADDRESS)? {
            UnlockCondition::Address { address } => Some(address),
            _ => None,
        }
    }

    pub fn state_controller_address(&self) -> Option<&Address> {
        match self.get(UnlockCondition::STATE_CONTROLLER_ADDRESS)? {
            UnlockCondition::StateControllerAddress { address } => Some(address),
            _ => None,
        }
    }

    pub fn immutable_alias_address(&self) -> Option<&AliasAddress> {
        match self.get(UnlockCondition::IMMUTABLE_ALIAS_ADDRESS)? {
            UnlockCondition::ImmutableAliasAddress { address } => Some(address),
            _ => None,
        }
    }

    /// Only an address condition: nothing time-locked or returnable.
    pub fn is_plain_address(&self) -> bool {
        self.0.len() == 1 && self.address().is_some()
    }

    /// Checks the set against what an output variant permits.
    pub(crate) fn verify(
        &self,
        output: &'static str,
        allowed: &[u8],
        required: &[u8],
    ) -> Result<(), OutputError> {
        if self.0.is_empty() {
            return Err(OutputError::EmptyUnlockConditions);
        }
        for condition in &self.0 {
            if !allowed.contains(&condition.kind()) {
                return Err(OutputError::DisallowedUnlockCondition {
                    condition: UnlockCondition::kind_name(condition.kind()),
                    output,
                });
            }
        }
        for kind in required {
            if self.get(*kind).is_none() {
                return Err(OutputError::MissingUnlockCondition(
                    UnlockCondition::kind_name(*kind),
                ));
            }
        }
        Ok(())
    }
}

impl TryFrom<Vec<UnlockCondition>> for UnlockConditions {
    type Error = OutputError;

    fn try_from(conditions: Vec<UnlockCondition>) -> Result<Self, Self::Error> {
        Self::from_vec(conditions)
    }
}

impl From<UnlockConditions> for Vec<UnlockCondition> {
    fn from(conditions: UnlockConditions) -> Self {
        conditions.0
    }
}

impl Packable for UnlockConditions {
    fn pack(&self, buf: &mut Vec<u8>) {
        pack_vec_u8(buf, &self.0);
    }

    fn unpack(unpacker: &mut Unpacker<'_>) -> Result<Self, UnpackError> {
        let conditions = unpacker.read_vec_u8::<UnlockCondition>()?;
        let sorted = conditions.windows(2).all(|p| p[0].kind() < p[1].kind());
        if !sorted {
            return Err(UnpackError::Invalid(
                "unlock conditions are not sorted by kind or repeat a kind".into(),
            ));
        }
        Ok(Self(conditions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Ed25519Address;

    fn address() -> Address {
        Address::Ed25519(Ed25519Address([1; 32]))
    }

    #[test]
    fn conditions_are_sorted_by_kind() {
        let set = UnlockConditions::from_vec(vec![
            UnlockCondition::Timelock { unix_time: 10 },
            UnlockCondition::Address { address: address() },
        ])
        .unwrap();
        let kinds: Vec<u8> = set.iter().map(UnlockCondition::kind).collect();
        assert_eq!(kinds, vec![0, 2]);
    }

    #[test]
    fn duplicate_kind_is_rejected() {
        let err = UnlockConditions::from_vec(vec![
            UnlockCondition::Address { address: address() },
            UnlockCondition::Address { address: address() },
        ])
        .unwrap_err();
        assert_eq!(err, OutputError::DuplicateUnlockCondition("address"));
    }

    #[test]
    fn verify_reports_missing_and_disallowed() {
        let set = UnlockConditions::from_vec(vec![UnlockCondition::Timelock { unix_time: 1 }])
            .unwrap();
        assert_eq!(
            set.verify("basic", &[0, 2], &[0]),
            Err(OutputError::MissingUnlockCondition("address"))
        );
        assert!(matches!(
            set.verify("alias", &[4, 5], &[]),
            Err(OutputError::DisallowedUnlockCondition { .. })
        ));
    }

    #[test]
    fn json_form() {
        let json = serde_json::json!([
            { "type": "timelock", "unixTime": 5 },
            { "type": "address", "address": { "type": "ed25519", "pubKeyHash": format!("0x{}", "01".repeat(32)) } }
        ]);
        let set: UnlockConditions = serde_json::from_value(json).unwrap();
        assert_eq!(set.address(), Some(&address()));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn unsorted_bytes_are_rejected() {
        let mut buf = vec![2u8];
        UnlockCondition::Timelock { unix_time: 1 }.pack(&mut buf);
        UnlockCondition::Address { address: address() }.pack(&mut buf);
        assert!(UnlockConditions::unpack_exact(&buf).is_err());
    }
}

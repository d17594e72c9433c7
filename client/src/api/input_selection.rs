//! Greedy input selection.
//!
//! Candidates are taken largest first until they cover the base-token and
//! native-token amounts of the outputs. Whatever is left over goes to a
//! remainder output, which must itself cover its storage deposit; if it
//! cannot, selection keeps adding inputs until the surplus is zero or big
//! enough.

use std::collections::{BTreeMap, HashSet};

use tracing::debug;

use super::types::{InputSigningData, RemainderData};
use crate::address::Address;
use crate::block::id::TokenId;
use crate::block::output::{BasicOutputBuilder, NativeTokens, Output, RentStructure, UnlockCondition};
use crate::config::MAX_INPUTS;
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct Selection {
    pub inputs: Vec<InputSigningData>,
    pub remainder: Option<RemainderData>,
}

#[derive(Default)]
struct Balance {
    amount: u64,
    tokens: BTreeMap<TokenId, u128>,
}

impl Balance {
    fn of<'a>(outputs: impl IntoIterator<Item = &'a Output>) -> Result<Self> {
        let mut balance = Balance::default();
        for output in outputs {
            balance.add(output)?;
        }
        Ok(balance)
    }

    fn add(&mut self, output: &Output) -> Result<()> {
        self.amount = self
            .amount
            .checked_add(output.amount())
            .ok_or_else(|| Error::Validation("amounts overflow".into()))?;
        output.native_tokens().add_to(&mut self.tokens);
        Ok(())
    }

    /// The first token `required` holds more of than `self`.
    fn missing_token(&self, required: &Balance) -> Option<(TokenId, u128, u128)> {
        required.tokens.iter().find_map(|(id, needed)| {
            let found = self.tokens.get(id).copied().unwrap_or_default();
            (found < *needed).then_some((*id, found, *needed))
        })
    }

    fn token_surplus(&self, required: &Balance) -> BTreeMap<TokenId, u128> {
        self.tokens
            .iter()
            .map(|(id, amount)| {
                let needed = required.tokens.get(id).copied().unwrap_or_default();
                (*id, amount.saturating_sub(needed))
            })
            .filter(|(_, surplus)| *surplus > 0)
            .collect()
    }
}

fn remainder_output(address: Address, amount: u64, tokens: &BTreeMap<TokenId, u128>) -> Result<Output> {
    let output = BasicOutputBuilder::new_with_amount(amount)
        .add_unlock_condition(UnlockCondition::Address { address })
        .with_native_tokens(NativeTokens::from_balance(tokens)?.iter().cloned())
        .finish()?;
    Ok(Output::Basic(output))
}

enum Outcome {
    Covered(Option<Output>),
    Short,
}

fn evaluate(
    selected: &Balance,
    required: &Balance,
    remainder_address: Address,
    rent: &RentStructure,
) -> Result<Outcome> {
    if selected.amount < required.amount || selected.missing_token(required).is_some() {
        return Ok(Outcome::Short);
    }
    let surplus = selected.amount - required.amount;
    let tokens = selected.token_surplus(required);
    if surplus == 0 && tokens.is_empty() {
        return Ok(Outcome::Covered(None));
    }
    if surplus == 0 {
        return Ok(Outcome::Short);
    }
    let remainder = remainder_output(remainder_address, surplus, &tokens)?;
    if surplus < rent.minimum_deposit(&remainder) {
        return Ok(Outcome::Short);
    }
    Ok(Outcome::Covered(Some(remainder)))
}

/// Picks inputs from `available` for `outputs`. Change goes to
/// `remainder_address`, or to the owner of the first selected input.
pub fn select_inputs(
    mut available: Vec<InputSigningData>,
    outputs: &[Output],
    remainder_address: Option<Address>,
    rent: &RentStructure,
) -> Result<Selection> {
    let required = Balance::of(outputs)?;

    let mut seen = HashSet::new();
    available.retain(|i| seen.insert(i.output_id()));
    // Inputs carrying a wanted native token first, then largest first.
    available.sort_by_key(|i| {
        let wanted = i
            .output
            .native_tokens()
            .iter()
            .any(|t| required.tokens.contains_key(&t.id));
        (!wanted, std::cmp::Reverse(i.output.amount()))
    });

    let mut selected: Vec<InputSigningData> = Vec::new();
    let mut balance = Balance::default();
    for candidate in available {
        if selected.len() == MAX_INPUTS {
            break;
        }
        balance.add(&candidate.output)?;
        selected.push(candidate);

        let (address, chain) = remainder_target(&selected, remainder_address)?;
        if let Outcome::Covered(remainder) = evaluate(&balance, &required, address, rent)? {
            debug!(inputs = selected.len(), remainder = remainder.is_some(), "inputs selected");
            return Ok(Selection {
                inputs: selected,
                remainder: remainder.map(|output| RemainderData {
                    output,
                    chain,
                    address,
                }),
            });
        }
    }

    Err(shortfall(&balance, &required, &selected, remainder_address, rent)?)
}

/// Spends every one of `inputs`, as when the caller names them.
pub fn consume_all(
    inputs: Vec<InputSigningData>,
    outputs: &[Output],
    remainder_address: Option<Address>,
    rent: &RentStructure,
) -> Result<Selection> {
    let mut seen = HashSet::new();
    if let Some(duplicate) = inputs.iter().find(|i| !seen.insert(i.output_id())) {
        return Err(Error::Validation(format!(
            "input {} is given twice",
            duplicate.output_id()
        )));
    }
    if inputs.len() > MAX_INPUTS {
        return Err(Error::Validation(format!("more than {MAX_INPUTS} inputs")));
    }
    let required = Balance::of(outputs)?;
    let balance = Balance::of(inputs.iter().map(|i| &i.output))?;
    let (address, chain) = remainder_target(&inputs, remainder_address)?;
    match evaluate(&balance, &required, address, rent)? {
        Outcome::Covered(remainder) => Ok(Selection {
            inputs,
            remainder: remainder.map(|output| RemainderData {
                output,
                chain,
                address,
            }),
        }),
        Outcome::Short => Err(shortfall(&balance, &required, &inputs, remainder_address, rent)?),
    }
}

/// The error for inputs that do not cover `required`.
fn shortfall(
    balance: &Balance,
    required: &Balance,
    selected: &[InputSigningData],
    remainder_address: Option<Address>,
    rent: &RentStructure,
) -> Result<Error> {
    if balance.amount < required.amount {
        return Ok(Error::InsufficientFunds {
            found: balance.amount,
            required: required.amount,
        });
    }
    if let Some((token_id, found, needed)) = balance.missing_token(required) {
        return Ok(Error::InsufficientNativeTokens {
            token_id: token_id.to_string(),
            found,
            required: needed,
        });
    }
    // Covered, but the change cannot pay its own storage deposit.
    let (address, _) = remainder_target(selected, remainder_address)?;
    let tokens = balance.token_surplus(required);
    let deposit = rent.minimum_deposit(&remainder_output(address, 1, &tokens)?);
    Ok(Error::InsufficientFunds {
        found: balance.amount,
        required: required.amount.saturating_add(deposit),
    })
}

fn remainder_target(
    selected: &[InputSigningData],
    custom: Option<Address>,
) -> Result<(Address, Option<crate::crypto::slip10::Bip44>)> {
    if let Some(address) = custom {
        return Ok((address, None));
    }
    selected
        .iter()
        .find(|i| i.chain.is_some())
        .or_else(|| selected.first())
        .map(|i| (i.output.required_address(), i.chain))
        .ok_or_else(|| Error::InsufficientFunds {
            found: 0,
            required: 0,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Ed25519Address;
    use crate::block::id::{BlockId, TransactionId};
    use crate::block::output::NativeToken;
    use crate::crypto::slip10::Bip44;
    use crate::node_manager::api::OutputMetadata;

    fn owner() -> Address {
        Address::Ed25519(Ed25519Address([1; 32]))
    }

    fn basic(amount: u64, tokens: Vec<NativeToken>) -> Output {
        Output::Basic(
            BasicOutputBuilder::new_with_amount(amount)
                .add_unlock_condition(UnlockCondition::Address { address: owner() })
                .with_native_tokens(tokens)
                .finish()
                .unwrap(),
        )
    }

    fn input(index: u8, output: Output) -> InputSigningData {
        InputSigningData {
            output,
            output_metadata: OutputMetadata {
                block_id: BlockId([index; 32]),
                transaction_id: TransactionId([index; 32]),
                output_index: 0,
                is_spent: false,
                transaction_id_spent: None,
            },
            chain: Some(Bip44::new(4219)),
        }
    }

    fn recipient(amount: u64) -> Output {
        Output::Basic(
            BasicOutputBuilder::new_with_amount(amount)
                .add_unlock_condition(UnlockCondition::Address {
                    address: Address::Ed25519(Ed25519Address([9; 32])),
                })
                .finish()
                .unwrap(),
        )
    }

    #[test]
    fn exact_amount_has_no_remainder() {
        let available = vec![input(1, basic(1_000_000, vec![]))];
        let selection =
            select_inputs(available, &[recipient(1_000_000)], None, &RentStructure::default()).unwrap();
        assert_eq!(selection.inputs.len(), 1);
        assert!(selection.remainder.is_none());
    }

    #[test]
    fn surplus_goes_to_the_first_input_owner() {
        let available = vec![input(1, basic(3_000_000, vec![])), input(2, basic(500_000, vec![]))];
        let selection =
            select_inputs(available, &[recipient(1_000_000)], None, &RentStructure::default()).unwrap();
        assert_eq!(selection.inputs.len(), 1);
        let remainder = selection.remainder.unwrap();
        assert_eq!(remainder.output.amount(), 2_000_000);
        assert_eq!(remainder.address, owner());
        assert!(remainder.chain.is_some());
    }

    #[test]
    fn not_enough_base_tokens() {
        let available = vec![input(1, basic(500_000, vec![]))];
        let err = select_inputs(available, &[recipient(1_000_000)], None, &RentStructure::default())
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InsufficientFunds {
                found: 500_000,
                required: 1_000_000
            }
        ));
    }

    #[test]
    fn dust_remainder_pulls_in_another_input() {
        let rent = RentStructure::default();
        let available = vec![input(1, basic(1_000_001, vec![])), input(2, basic(1_000_000, vec![]))];
        let selection = select_inputs(available, &[recipient(1_000_000)], None, &rent).unwrap();
        assert_eq!(selection.inputs.len(), 2);
        assert_eq!(selection.remainder.unwrap().output.amount(), 1_000_001);
    }

    #[test]
    fn dust_remainder_without_more_inputs_fails() {
        let available = vec![input(1, basic(1_000_001, vec![]))];
        let err = select_inputs(available, &[recipient(1_000_000)], None, &RentStructure::default())
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InsufficientFundsError);
    }

    #[test]
    fn surplus_native_tokens_need_a_remainder() {
        let token = NativeToken::new(TokenId([5; 38]), 10).unwrap();
        let available = vec![input(1, basic(2_000_000, vec![token]))];
        let selection =
            select_inputs(available, &[recipient(1_000_000)], None, &RentStructure::default()).unwrap();
        let remainder = selection.remainder.unwrap();
        assert_eq!(remainder.output.native_tokens().len(), 1);
    }

    #[test]
    fn missing_native_tokens() {
        let wanted = NativeToken::new(TokenId([5; 38]), 10).unwrap();
        let output = Output::Basic(
            BasicOutputBuilder::new_with_amount(1_000_000)
                .add_unlock_condition(UnlockCondition::Address { address: owner() })
                .add_native_token(wanted)
                .finish()
                .unwrap(),
        );
        let available = vec![input(1, basic(5_000_000, vec![]))];
        let err = select_inputs(available, &[output], None, &RentStructure::default()).unwrap_err();
        assert!(matches!(err, Error::InsufficientNativeTokens { .. }));
    }

    #[test]
    fn consume_all_keeps_every_input() {
        let available = vec![input(1, basic(3_000_000, vec![])), input(2, basic(500_000, vec![]))];
        let selection =
            consume_all(available, &[recipient(1_000_000)], None, &RentStructure::default()).unwrap();
        assert_eq!(selection.inputs.len(), 2);
        assert_eq!(selection.remainder.unwrap().output.amount(), 2_500_000);
    }

    #[test]
    fn consume_all_rejects_repeated_inputs() {
        let available = vec![input(1, basic(3_000_000, vec![])), input(1, basic(3_000_000, vec![]))];
        let err = consume_all(available, &[recipient(1_000_000)], None, &RentStructure::default())
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ValidationError);
    }

    #[test]
    fn duplicate_candidates_are_counted_once() {
        let available = vec![input(1, basic(600_000, vec![])), input(1, basic(600_000, vec![]))];
        let err = select_inputs(available, &[recipient(1_000_000)], None, &RentStructure::default())
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientFunds { found: 600_000, .. }));
    }
}
